//! Replays a JSON-lines event file through the notification engine.
//!
//! # Responsibility
//! - Exercise the engine end to end: feed attach, fold, feed listing.
//! - Keep output deterministic for quick local sanity checks.

use clap::Parser;
use log::warn;
use notifeed_core::{
    init_logging, EngineConfig, FeedFilter, FeedQuery, LogLevel, MemoryReadStateStore,
    NotificationEngine, RawEvent, ReadStateStore, SqliteReadStateStore,
};
use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "notifeed", version, about = "Reconcile a raw event file into a notification feed")]
struct Args {
    /// JSON-lines file, one raw event per line.
    events: PathBuf,
    /// Engine config JSON (priorities, retention, retry).
    #[arg(long)]
    config: Option<PathBuf>,
    /// SQLite file for durable read state; in-memory when omitted.
    #[arg(long)]
    db: Option<PathBuf>,
    /// Read-state scope.
    #[arg(long, default_value = "local")]
    user: String,
    /// Absolute directory for rolling log files.
    #[arg(long)]
    log_dir: Option<PathBuf>,
    #[arg(long)]
    log_level: Option<String>,
    /// Show unread notifications only.
    #[arg(long)]
    unread_only: bool,
    #[arg(long)]
    limit: Option<usize>,
    /// Mark everything read after replay.
    #[arg(long)]
    mark_all_read: bool,
}

fn main() -> ExitCode {
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("notifeed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    if let Some(log_dir) = &args.log_dir {
        let level = args
            .log_level
            .clone()
            .unwrap_or_else(|| LogLevel::default_for_build().as_str().to_string());
        init_logging(&level, &log_dir.to_string_lossy())?;
    }

    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let store: Arc<dyn ReadStateStore> = match &args.db {
        Some(path) => Arc::new(SqliteReadStateStore::open(path, args.user.as_str())?),
        None => Arc::new(MemoryReadStateStore::new()),
    };
    let engine = NotificationEngine::new(config, store);

    let (sender, receiver) = mpsc::channel::<RawEvent>();
    let subscription = engine.attach(receiver)?;

    let reader = BufReader::new(File::open(&args.events)?);
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RawEvent>(&line) {
            Ok(event) => sender.send(event)?,
            Err(err) => {
                warn!("event=replay_line module=cli status=skip line={} error={err}", index + 1);
                eprintln!("line {}: skipped unparsable event: {err}", index + 1);
            }
        }
    }
    drop(sender);

    while !subscription.is_finished() {
        thread::sleep(Duration::from_millis(10));
    }
    let consumed = subscription.detach();
    engine.flush_read_state();

    if args.mark_all_read {
        engine.mark_all_read();
    }

    let query = FeedQuery {
        filter: FeedFilter {
            unread_only: args.unread_only,
            ..FeedFilter::default()
        },
        limit: args.limit,
        ..FeedQuery::default()
    };
    for notification in engine.list_notifications(&query) {
        println!(
            "{}\t{}\t{}\t{}\trevisions={}\t{}",
            if notification.read { " " } else { "*" },
            notification.latest_occurred_at,
            notification.key,
            notification.latest_state,
            notification.revision_count,
            notification.display_payload.title.as_deref().unwrap_or(""),
        );
    }
    println!("consumed={consumed} notifications={} unread={}", engine.len(), engine.unread_count());

    for diagnostic in engine.recent_diagnostics() {
        eprintln!("diagnostic: {diagnostic}");
    }

    engine.shutdown();
    Ok(())
}
