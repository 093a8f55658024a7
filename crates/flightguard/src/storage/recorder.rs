//! Bounded hand-off from the sampling loop to the flight log.
//!
//! The sampling loop calls [`RecordSink::offer`], which never waits: a full
//! queue drops the record and bumps a counter. [`run_recorder`] drains the
//! queue on a blocking worker, writing in batches and pruning to the
//! configured size.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use super::{FlightLog, LoggedRecord};
use crate::error::Result;

/// Records written per transaction at most.
const BATCH_SIZE: usize = 64;

/// Prune after this many inserts.
const PRUNE_EVERY: u64 = 1_000;

/// Producer side of the recorder queue.
#[derive(Debug, Clone)]
pub struct RecordSink {
    tx: mpsc::Sender<LoggedRecord>,
    dropped: Arc<AtomicU64>,
}

impl RecordSink {
    /// Create a sink and the receiver to hand to [`run_recorder`].
    #[must_use]
    pub fn channel(depth: usize) -> (Self, mpsc::Receiver<LoggedRecord>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Queue a record without waiting. Returns `false` if it was dropped.
    pub fn offer(&self, record: LoggedRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if n.is_power_of_two() {
                    warn!(dropped = n, "flight log queue full, dropping records");
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Records dropped so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// What a recorder run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderSummary {
    /// Records written.
    pub written: u64,
    /// Records removed by pruning.
    pub pruned: u64,
}

/// Drain `rx` into `log` until every sender is gone.
///
/// Blocks the calling thread; run it under `spawn_blocking`. With
/// `max_records` of 0 the log is never pruned.
///
/// # Errors
///
/// Returns an error if a write or prune fails.
pub fn run_recorder(
    mut log: FlightLog,
    mut rx: mpsc::Receiver<LoggedRecord>,
    max_records: usize,
) -> Result<RecorderSummary> {
    info!(path = %log.path().display(), max_records, "flight recorder started");

    let mut summary = RecorderSummary::default();
    let mut since_prune = 0_u64;
    let mut batch = Vec::with_capacity(BATCH_SIZE);

    while let Some(first) = rx.blocking_recv() {
        batch.push(first);
        while batch.len() < BATCH_SIZE {
            match rx.try_recv() {
                Ok(next) => batch.push(next),
                Err(_) => break,
            }
        }

        let written = log.insert_batch(&batch)? as u64;
        batch.clear();
        summary.written += written;
        since_prune += written;
        debug!(written, "flight log batch written");

        if max_records > 0 && since_prune >= PRUNE_EVERY {
            summary.pruned += log.prune_keep_recent(max_records)? as u64;
            since_prune = 0;
        }
    }

    if max_records > 0 {
        summary.pruned += log.prune_keep_recent(max_records)? as u64;
    }

    info!(
        written = summary.written,
        pruned = summary.pruned,
        "flight recorder stopped"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusRecord;
    use crate::telemetry::SafetyStatus;

    fn entry(score: f32) -> LoggedRecord {
        LoggedRecord::now(
            StatusRecord {
                roll: 0.0,
                pitch: 0.0,
                lat: 0.0,
                lon: 0.0,
                alt: 0.0,
                safety_score: score,
                status: SafetyStatus::Nominal,
                armed: false,
                noise: 0.0,
            },
            None,
        )
    }

    #[test]
    fn test_offer_drops_when_full() {
        let (sink, _rx) = RecordSink::channel(2);
        assert!(sink.offer(entry(1.0)));
        assert!(sink.offer(entry(2.0)));
        assert!(!sink.offer(entry(3.0)));
        assert_eq!(sink.dropped(), 1);
    }

    #[test]
    fn test_offer_after_close_is_dropped() {
        let (sink, rx) = RecordSink::channel(4);
        drop(rx);
        assert!(!sink.offer(entry(1.0)));
        assert_eq!(sink.dropped(), 1);
    }

    #[test]
    fn test_run_recorder_writes_until_senders_close() {
        let (sink, rx) = RecordSink::channel(16);
        for i in 0..10 {
            assert!(sink.offer(entry(f32::from(u8::try_from(i).unwrap()))));
        }
        drop(sink);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.sqlite");
        let log = FlightLog::open(&path).unwrap();

        let summary = run_recorder(log, rx, 0).unwrap();
        assert_eq!(summary.written, 10);
        assert_eq!(summary.pruned, 0);
        assert_eq!(FlightLog::open(&path).unwrap().count().unwrap(), 10);
    }

    #[test]
    fn test_run_recorder_prunes_on_exit() {
        let (sink, rx) = RecordSink::channel(16);
        for _ in 0..12 {
            sink.offer(entry(50.0));
        }
        drop(sink);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.sqlite");
        let summary = run_recorder(FlightLog::open(&path).unwrap(), rx, 5).unwrap();

        assert_eq!(summary.written, 12);
        assert_eq!(summary.pruned, 7);
        assert_eq!(FlightLog::open(&path).unwrap().count().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_recorder_on_blocking_worker() {
        let (sink, rx) = RecordSink::channel(8);
        let worker = tokio::task::spawn_blocking(move || {
            run_recorder(FlightLog::open_in_memory().unwrap(), rx, 0)
        });

        for _ in 0..5 {
            while !sink.offer(entry(75.0)) {
                tokio::task::yield_now().await;
            }
        }
        drop(sink);

        let summary = worker.await.unwrap().unwrap();
        assert_eq!(summary.written, 5);
    }
}
