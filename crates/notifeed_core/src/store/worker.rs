//! Background single worker for read-state loads and writes.
//!
//! # Responsibility
//! - Take read-state hydration and persistence off the caller's path.
//! - Retry failed writes with capped exponential backoff.
//!
//! # Invariants
//! - Jobs run in submission order, so a load never overtakes an earlier write.
//! - Callers submit while holding the map lock; submission itself never does
//!   store I/O. Inline jobs are handed back to run after the lock is released.
//! - Inline writes never overwrite a newer write for the same key.
//! - Queued jobs still run to completion during shutdown.
//! - Exhausted retries and failed loads are reported as diagnostics, never as
//!   caller errors.

use crate::diagnostics::{Diagnostic, DiagnosticsLog};
use crate::model::notification::NotificationKey;
use crate::store::ReadStateStore;
use log::{debug, error, warn};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const WORKER_THREAD_NAME: &str = "notifeed-read-state";

/// Receives a stored read flag for a key that was created unread.
pub type HydrationSink = Arc<dyn Fn(&NotificationKey, bool) + Send + Sync>;

/// Retry schedule for read-state writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `0` is treated as `1`.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), doubling and capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

#[derive(Debug)]
enum Job {
    Hydrate {
        key: NotificationKey,
    },
    Persist {
        keys: Vec<NotificationKey>,
        read: bool,
        seq: u64,
    },
}

struct WorkerContext {
    store: Arc<dyn ReadStateStore>,
    retry: RetryPolicy,
    diagnostics: Arc<DiagnosticsLog>,
    sink: HydrationSink,
    /// Sequence of the last inline write per key.
    inline_written: Mutex<HashMap<NotificationKey, u64>>,
}

impl WorkerContext {
    fn run(&self, job: Job) {
        match job {
            Job::Hydrate { key } => self.hydrate(&key),
            Job::Persist { keys, read, .. } => self.persist(&keys, read),
        }
    }

    fn run_inline(&self, job: Job) {
        match job {
            Job::Hydrate { key } => self.hydrate(&key),
            Job::Persist { keys, read, seq } => {
                let mut written = self.inline_written.lock();
                let keys: Vec<NotificationKey> = keys
                    .into_iter()
                    .filter(|key| written.get(key).map_or(true, |last| *last < seq))
                    .collect();
                if keys.is_empty() {
                    debug!("event=read_state_persist module=store status=skip reason=superseded seq={seq}");
                    return;
                }
                for key in &keys {
                    written.insert(key.clone(), seq);
                }
                self.persist(&keys, read);
            }
        }
    }

    fn hydrate(&self, key: &NotificationKey) {
        match self.store.get(key) {
            Ok(Some(read)) => {
                debug!("event=read_state_load module=store status=ok key={key} read={read}");
                (self.sink)(key, read);
            }
            Ok(None) => {}
            Err(err) => {
                self.diagnostics.report(Diagnostic::ReadStateLoadFailed {
                    key: key.storage_key(),
                    error: err.to_string(),
                });
            }
        }
    }

    fn persist(&self, keys: &[NotificationKey], read: bool) {
        let attempts = self.retry.attempts();
        for attempt in 1..=attempts {
            match self.store.set_many(keys, read) {
                Ok(()) => {
                    debug!(
                        "event=read_state_persist module=store status=ok keys={} read={read} attempt={attempt}",
                        keys.len()
                    );
                    return;
                }
                Err(err) if attempt < attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "event=read_state_persist module=store status=retry keys={} attempt={attempt} backoff_ms={} error={err}",
                        keys.len(),
                        delay.as_millis()
                    );
                    thread::sleep(delay);
                }
                Err(err) => {
                    self.diagnostics.report(Diagnostic::ReadStatePersistFailed {
                        keys: keys.len(),
                        attempts,
                        error: err.to_string(),
                    });
                }
            }
        }
    }
}

#[derive(Default)]
struct PendingJobs {
    count: Mutex<usize>,
    idle: Condvar,
}

impl PendingJobs {
    fn add(&self) {
        *self.count.lock() += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }
}

/// Job the worker could not take; run it once the map lock is released.
#[must_use = "an inline job does nothing until `run` is called"]
pub struct InlineJob {
    context: Arc<WorkerContext>,
    pending: Arc<PendingJobs>,
    job: Job,
}

impl InlineJob {
    /// Waits for queued jobs, then performs the store call on this thread.
    pub fn run(self) {
        self.pending.wait_idle();
        self.context.run_inline(self.job);
    }
}

/// Queue-backed worker in front of a `ReadStateStore`.
///
/// Without a worker thread (spawn failure or after `shutdown`) submissions
/// come back as `InlineJob`s.
pub struct ReadStateWorker {
    context: Arc<WorkerContext>,
    pending: Arc<PendingJobs>,
    next_seq: AtomicU64,
    sender: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ReadStateWorker {
    pub fn spawn(
        store: Arc<dyn ReadStateStore>,
        retry: RetryPolicy,
        diagnostics: Arc<DiagnosticsLog>,
        sink: HydrationSink,
    ) -> Self {
        let context = Arc::new(WorkerContext {
            store,
            retry,
            diagnostics,
            sink,
            inline_written: Mutex::new(HashMap::new()),
        });
        let pending = Arc::new(PendingJobs::default());
        let (sender, receiver) = mpsc::channel::<Job>();

        let worker_context = Arc::clone(&context);
        let worker_pending = Arc::clone(&pending);
        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                for job in receiver {
                    worker_context.run(job);
                    worker_pending.done();
                }
            });

        let (sender, worker) = match spawned {
            Ok(handle) => (Some(sender), Some(handle)),
            Err(err) => {
                error!(
                    "event=read_state_worker module=store status=error mode=inline error={err}"
                );
                (None, None)
            }
        };

        Self {
            context,
            pending,
            next_seq: AtomicU64::new(0),
            sender: Mutex::new(sender),
            worker: Mutex::new(worker),
        }
    }

    /// Queues a load of the stored flag for a freshly created key.
    pub fn hydrate(&self, key: NotificationKey) -> Option<InlineJob> {
        self.submit(Job::Hydrate { key })
    }

    /// Queues one batch write. Never waits for the store.
    pub fn persist(&self, keys: Vec<NotificationKey>, read: bool) -> Option<InlineJob> {
        if keys.is_empty() {
            return None;
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.submit(Job::Persist { keys, read, seq })
    }

    fn submit(&self, job: Job) -> Option<InlineJob> {
        let rejected = {
            let sender = self.sender.lock();
            match sender.as_ref() {
                Some(sender) => {
                    self.pending.add();
                    match sender.send(job) {
                        Ok(()) => None,
                        Err(mpsc::SendError(job)) => {
                            self.pending.done();
                            Some(job)
                        }
                    }
                }
                None => Some(job),
            }
        };

        rejected.map(|job| InlineJob {
            context: Arc::clone(&self.context),
            pending: Arc::clone(&self.pending),
            job,
        })
    }

    /// Blocks until every queued job has finished (or exhausted retries).
    pub fn flush(&self) {
        self.pending.wait_idle();
    }

    /// Drains queued jobs and stops the worker. Idempotent.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            // The last engine handle may be dropped by an observer running on
            // the worker itself.
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("event=read_state_worker module=store status=error reason=worker_panicked");
            }
        }
    }
}

impl Drop for ReadStateWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
