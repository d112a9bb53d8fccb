//! Subscription adapter glue: pumps an external event source into the engine.
//!
//! # Invariants
//! - Detaching stops consumption but keeps all reconciled state.
//! - Read-state writes queued before detaching complete independently.

use crate::engine::NotificationEngine;
use crate::model::event::RawEvent;
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const PUMP_THREAD_NAME: &str = "notifeed-feed";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of polling an event source once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePoll {
    Event(RawEvent),
    /// Nothing arrived within the timeout.
    Idle,
    /// The source will never deliver again.
    Closed,
}

/// Live, possibly gap-y and duplicating, source of raw events.
///
/// Connection lifecycle belongs to the implementor.
pub trait EventSource: Send + 'static {
    fn poll_event(&mut self, timeout: Duration) -> SourcePoll;
}

impl EventSource for Receiver<RawEvent> {
    fn poll_event(&mut self, timeout: Duration) -> SourcePoll {
        match self.recv_timeout(timeout) {
            Ok(event) => SourcePoll::Event(event),
            Err(RecvTimeoutError::Timeout) => SourcePoll::Idle,
            Err(RecvTimeoutError::Disconnected) => SourcePoll::Closed,
        }
    }
}

/// Running attachment of an event source to an engine.
pub struct FeedSubscription {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<u64>>,
}

impl FeedSubscription {
    /// Whether the pump has stopped (source closed or detached).
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Stops consuming and returns how many events were consumed.
    pub fn detach(mut self) -> u64 {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> u64 {
        self.stop.store(true, Ordering::SeqCst);
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(consumed)) => consumed,
            Some(Err(_)) => {
                error!("event=feed_detach module=engine status=error reason=pump_panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop_and_join();
        }
    }
}

impl NotificationEngine {
    /// Starts consuming `source` on a dedicated thread.
    ///
    /// # Errors
    /// - Returns an error when the pump thread cannot be spawned.
    pub fn attach(&self, mut source: impl EventSource) -> std::io::Result<FeedSubscription> {
        let stop = Arc::new(AtomicBool::new(false));
        let pump_stop = Arc::clone(&stop);
        let engine = self.clone();

        let handle = thread::Builder::new()
            .name(PUMP_THREAD_NAME.to_string())
            .spawn(move || {
                let mut consumed = 0u64;
                while !pump_stop.load(Ordering::SeqCst) {
                    match source.poll_event(POLL_INTERVAL) {
                        SourcePoll::Event(event) => {
                            engine.on_event(event);
                            consumed += 1;
                        }
                        SourcePoll::Idle => {}
                        SourcePoll::Closed => break,
                    }
                }
                info!("event=feed_detach module=engine status=ok consumed={consumed}");
                consumed
            })?;

        info!("event=feed_attach module=engine status=ok");
        Ok(FeedSubscription {
            stop,
            handle: Some(handle),
        })
    }
}
