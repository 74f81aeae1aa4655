//! Scheduled publishing
//!
//! [`ScheduleService`] records "publish this page at that time" entries.
//! [`Scheduler`] is the background task that scans them and publishes the
//! pages that are due.
//!
//! # Design Notes
//!
//! - An entry is consumed by deleting it; only the caller whose delete
//!   succeeds publishes, so an entry never publishes twice
//! - Failures are logged and the loop keeps going
//! - Graceful shutdown via an atomic flag plus a wakeup

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use trellis_core::json::REF_FIELD;
use trellis_core::{
    with_version, Address, BatchOp, Error, ListEntry, ListOptions, RecordKind, Result, StorageExt,
    SCHEDULED,
};
use uuid::Uuid;

use crate::engine::Engine;
use crate::records::Records;

/// A pending publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Due time, unix milliseconds
    pub at: i64,
    /// Page to publish
    pub publish: String,
}

impl ScheduleEntry {
    /// Due time, if representable
    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.at).single()
    }

    /// True if the entry is due at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.at <= now.timestamp_millis()
    }
}

/// Operations on schedule entries
#[derive(Debug, Clone, Copy)]
pub struct ScheduleService<'a> {
    records: &'a Records,
}

impl<'a> ScheduleService<'a> {
    pub(crate) fn new(records: &'a Records) -> Self {
        Self { records }
    }

    /// Schedule `page` to be published at `at`, returning the entry's address
    ///
    /// A page has at most one pending entry; scheduling it again replaces
    /// the previous one.
    pub async fn schedule(&self, page: &str, at: DateTime<Utc>) -> Result<String> {
        let parsed = Address::parse(page)?;
        if parsed.kind != RecordKind::Page {
            return Err(Error::client(format!("'{}' is not a page", page)));
        }

        let db = self.records.storage();
        let entry_address = format!("{}/{}/{}", parsed.prefix, RecordKind::Schedule, new_id());
        let marker = with_version(page, Some(SCHEDULED));
        let entry = ScheduleEntry {
            at: at.timestamp_millis(),
            publish: with_version(page, None),
        };

        let mut ops = Vec::with_capacity(3);
        if let Some(previous) = db.get_json_opt(&marker).await? {
            if let Some(previous) = previous.get(REF_FIELD).and_then(Value::as_str) {
                debug!(page, replaced = previous, "replacing schedule entry");
                ops.push(BatchOp::del(previous));
            }
        }
        ops.push(BatchOp::put_json(&entry_address, &serde_json::to_value(&entry)?)?);
        ops.push(BatchOp::put_json(
            &marker,
            &json!({ REF_FIELD: entry_address, "at": entry.at }),
        )?);
        db.batch(ops).await?;

        info!(page, entry = %entry_address, at = %at, "scheduled publish");
        Ok(entry_address)
    }

    /// Remove a pending entry, returning it
    ///
    /// # Errors
    ///
    /// Returns not found if the entry was already consumed.
    pub async fn unschedule(&self, entry_address: &str) -> Result<ScheduleEntry> {
        let db = self.records.storage();
        let entry: ScheduleEntry = serde_json::from_value(db.get_json(entry_address).await?)?;

        let mut ops = vec![BatchOp::del(entry_address)];
        let marker = with_version(&entry.publish, Some(SCHEDULED));
        if self.marker_points_at(&marker, entry_address).await? {
            ops.push(BatchOp::del(marker));
        }
        db.batch(ops).await?;

        info!(entry = entry_address, page = %entry.publish, "unscheduled publish");
        Ok(entry)
    }

    /// Every pending entry under `prefix`, sorted by address
    pub async fn list(&self, prefix: &str) -> Result<Vec<(String, ScheduleEntry)>> {
        let options = ListOptions::prefix(format!("{}/{}/", prefix, RecordKind::Schedule));
        let entries = self.records.storage().list_entries(options).await?;

        let mut pending = Vec::with_capacity(entries.len());
        for entry in entries {
            let (key, value) = match entry {
                ListEntry::Pair { key, value } => (key, value),
                other => {
                    return Err(Error::storage(format!(
                        "schedule listing returned {:?}",
                        other
                    )))
                }
            };
            match serde_json::from_str::<ScheduleEntry>(&value) {
                Ok(parsed) => pending.push((key, parsed)),
                Err(e) => warn!(entry = %key, error = %e, "skipping malformed schedule entry"),
            }
        }
        Ok(pending)
    }

    async fn marker_points_at(&self, marker: &str, entry_address: &str) -> Result<bool> {
        let current = self.records.storage().get_json_opt(marker).await?;
        Ok(current
            .as_ref()
            .and_then(|marker| marker.get(REF_FIELD))
            .and_then(Value::as_str)
            == Some(entry_address))
    }

    /// Consume the entry at `entry_address`
    ///
    /// Returns `false` if another caller consumed it first.
    async fn consume(&self, entry_address: &str, entry: &ScheduleEntry) -> Result<bool> {
        let db = self.records.storage();
        if db.del_opt(entry_address).await?.is_none() {
            return Ok(false);
        }
        let marker = with_version(&entry.publish, Some(SCHEDULED));
        if self.marker_points_at(&marker, entry_address).await? {
            db.del_opt(&marker).await?;
        }
        Ok(true)
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Publish every entry under the engine's site that is due at `now`
///
/// Returns how many pages were published.
pub async fn run_due(engine: &Engine, now: DateTime<Utc>) -> Result<usize> {
    let schedule = engine.schedule();
    let ctx = engine.context();
    let due: Vec<(String, ScheduleEntry)> = schedule
        .list(&ctx.prefix())
        .await?
        .into_iter()
        .filter(|(_, entry)| entry.is_due(now))
        .collect();

    let mut published = 0;
    for (address, entry) in due {
        match schedule.consume(&address, &entry).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(entry = %address, "entry already consumed");
                continue;
            }
            Err(e) => {
                error!(entry = %address, error = %e, "failed to consume schedule entry");
                continue;
            }
        }

        match engine.pages().publish(&entry.publish, None, &ctx).await {
            Ok(_) => {
                info!(entry = %address, page = %entry.publish, "published scheduled page");
                published += 1;
            }
            Err(e) => {
                error!(
                    entry = %address,
                    page = %entry.publish,
                    error = %e,
                    "scheduled publish failed"
                );
            }
        }
    }
    Ok(published)
}

/// Background task publishing due pages
///
/// # Example
///
/// ```ignore
/// let scheduler = Scheduler::new(Arc::clone(&engine), Duration::from_secs(30));
/// let handle = scheduler.start();
///
/// // ... serve requests ...
///
/// scheduler.shutdown();
/// handle.await?;
/// ```
pub struct Scheduler {
    engine: Arc<Engine>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl Scheduler {
    /// Scheduler scanning every `interval`
    pub fn new(engine: Arc<Engine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Scheduler using the engine's configured interval
    pub fn from_config(engine: Arc<Engine>) -> Self {
        let interval = engine.config().scheduler_interval();
        Self::new(engine, interval)
    }

    /// Publish everything due at `now` once, outside the background loop
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<usize> {
        run_due(&self.engine, now).await
    }

    /// Start the background loop on the current runtime
    ///
    /// The first scan happens one interval after start. The task runs until
    /// `shutdown()` is called.
    pub fn start(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let shutdown = Arc::clone(&self.shutdown);
        let wake = Arc::clone(&self.wake);
        let interval = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            while !shutdown.load(Ordering::Relaxed) {
                tokio::select! {
                    _ = wake.notified() => continue,
                    _ = ticker.tick() => {}
                }

                match run_due(&engine, Utc::now()).await {
                    Ok(0) => {}
                    Ok(count) => debug!(count, "scheduler pass published pages"),
                    Err(e) => error!(error = %e, "scheduler pass failed"),
                }
            }
            debug!("scheduler stopped");
        })
    }

    /// Signal shutdown; the loop exits without waiting for the next tick
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.wake.notify_one();
    }

    /// Check if shutdown has been signaled
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("interval", &self.interval)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
