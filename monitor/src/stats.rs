//! Per-source operational counters.
//!
//! Counters are written only by the owning tailer and read by the periodic
//! reporter, so they are plain atomics; no lock is shared with the tailer's
//! offset or file state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

/// Monotonic counters of one source.
#[derive(Debug)]
pub struct SourceStats {
    started: DateTime<Utc>,
    bytes_read: AtomicU64,
    lines_read: AtomicU64,
    addresses_added: AtomicU64,
    events_received: AtomicU64,
    passes: AtomicU64,
}

impl Default for SourceStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceStats {
    /// Creates zeroed counters starting now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Utc::now(),
            bytes_read: AtomicU64::new(0),
            lines_read: AtomicU64::new(0),
            addresses_added: AtomicU64::new(0),
            events_received: AtomicU64::new(0),
            passes: AtomicU64::new(0),
        }
    }

    /// Records a completed read pass.
    pub fn record_pass(&self, bytes: u64, lines: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
        self.lines_read.fetch_add(lines, Ordering::Relaxed);
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records addresses the sink reported as added.
    pub fn record_added(&self, count: u64) {
        self.addresses_added.fetch_add(count, Ordering::Relaxed);
    }

    /// Records one consumed change notification.
    pub fn record_event(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let now = Utc::now();
        StatsSnapshot {
            started: self.started,
            uptime_secs: (now - self.started).num_seconds().max(0).unsigned_abs(),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            lines_read: self.lines_read.load(Ordering::Relaxed),
            addresses_added: self.addresses_added.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
        }
    }
}

/// Copy of a source's counters at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub started: DateTime<Utc>,
    pub uptime_secs: u64,
    pub bytes_read: u64,
    pub lines_read: u64,
    pub addresses_added: u64,
    pub events_received: u64,
    pub passes: u64,
}

impl StatsSnapshot {
    /// Emits the snapshot at info level.
    pub fn log(&self, source: &str, set: &str) {
        info!(
            source,
            set,
            running_time = %humanize(Duration::from_secs(self.uptime_secs)),
            bytes_read = self.bytes_read,
            lines_read = self.lines_read,
            addresses_added = self.addresses_added,
            events_received = self.events_received,
            passes = self.passes,
            "Source statistics"
        );
    }
}

/// A source registered with the reporter.
#[derive(Debug, Clone)]
pub struct StatsEntry {
    pub source: String,
    /// Sink target the source feeds, e.g. `@blacklist`.
    pub set: String,
    pub stats: Arc<SourceStats>,
}

/// Logs a snapshot of every entry each `interval` until shutdown, then once
/// more on the way out.
pub async fn report_periodically(
    entries: Vec<StatsEntry>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => log_all(&entries),
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    log_all(&entries);
}

/// Logs the current snapshot of every entry.
pub fn log_all(entries: &[StatsEntry]) {
    for entry in entries {
        entry.stats.snapshot().log(&entry.source, &entry.set);
    }
}

fn humanize(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    if days > 0 {
        format!("{days}d{hours}h{minutes}m{seconds}s")
    } else if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = SourceStats::new();
        stats.record_pass(120, 3);
        stats.record_pass(40, 1);
        stats.record_added(2);
        stats.record_event();
        stats.record_event();

        let snap = stats.snapshot();
        assert_eq!(snap.bytes_read, 160);
        assert_eq!(snap.lines_read, 4);
        assert_eq!(snap.passes, 2);
        assert_eq!(snap.addresses_added, 2);
        assert_eq!(snap.events_received, 2);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let snap = SourceStats::new().snapshot();
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["bytesRead"], 0);
        assert!(json.get("addressesAdded").is_some());
        assert!(json.get("uptimeSecs").is_some());
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let stats = Arc::new(SourceStats::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_event();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.snapshot().events_received, 4000);
    }

    #[test]
    fn humanize_durations() {
        assert_eq!(humanize(Duration::from_secs(42)), "42s");
        assert_eq!(humanize(Duration::from_secs(61)), "1m1s");
        assert_eq!(humanize(Duration::from_secs(3_661)), "1h1m1s");
        assert_eq!(humanize(Duration::from_secs(90_061)), "1d1h1m1s");
    }

    #[tokio::test]
    async fn reporter_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let entries = vec![StatsEntry {
            source: "test".to_string(),
            set: "@blacklist".to_string(),
            stats: Arc::new(SourceStats::new()),
        }];
        let handle = tokio::spawn(report_periodically(entries, Duration::from_millis(10), rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("reporter did not stop")
            .unwrap();
    }
}
