//! Shared telemetry record exchanged between the sampling and inference loops.
//!
//! The store holds exactly two values, the latest [`FusedReading`] and the
//! latest [`InferenceResult`], behind a single lock. Every access is a
//! bounded-wait `try_lock_for`: a context that cannot get the lock in time
//! skips its publish or falls back to the last value it saw. A missed publish
//! is acceptable; a stalled sampling loop is not.
//!
//! Each execution context talks to the store through its own
//! [`TelemetryPort`], which carries that context's timeout, its last-known
//! values and its contention counters.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::orientation::Orientation;

/// Discrete risk tier reported by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyStatus {
    /// No elevated risk.
    #[default]
    Nominal,
    /// Elevated risk.
    Caution,
    /// High risk.
    Critical,
}

impl SafetyStatus {
    /// Numeric code used on the status line.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Nominal => 0,
            Self::Caution => 1,
            Self::Critical => 2,
        }
    }

    /// Inverse of [`SafetyStatus::code`].
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Nominal),
            1 => Some(Self::Caution),
            2 => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for SafetyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nominal => write!(f, "nominal"),
            Self::Caution => write!(f, "caution"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Latest fused sensor state, published by the sampling loop.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FusedReading {
    /// Roll in degrees.
    pub roll: f32,
    /// Pitch in degrees.
    pub pitch: f32,
    /// Acceleration magnitude in g.
    pub accel_magnitude: f32,
    /// Acoustic level, 0 to 100.
    pub noise_level: f32,
}

impl FusedReading {
    /// Combine an orientation with the acoustic level from the same cycle.
    #[must_use]
    pub fn new(orientation: Orientation, noise_level: f32) -> Self {
        Self {
            roll: orientation.roll,
            pitch: orientation.pitch,
            accel_magnitude: orientation.accel_magnitude,
            noise_level,
        }
    }
}

/// Latest classifier verdict, published by the inference loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    /// Safety score, 0 (unsafe) to 100 (safe).
    pub safety_score: f32,
    /// Risk tier.
    pub status: SafetyStatus,
}

impl InferenceResult {
    /// Reported before the first inference and whenever no model is available.
    pub const SAFE_DEFAULT: Self = Self {
        safety_score: 100.0,
        status: SafetyStatus::Nominal,
    };
}

impl Default for InferenceResult {
    fn default() -> Self {
        Self::SAFE_DEFAULT
    }
}

/// The guarded contents of the store.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Snapshot {
    fused: FusedReading,
    result: InferenceResult,
}

/// The single shared mutable resource between the two loops.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    inner: Mutex<Snapshot>,
}

impl TelemetryStore {
    /// Create a store holding zeroed readings and the safe default result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store ready to be shared between contexts.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Replace the fused reading. Returns `false` if the lock was not
    /// acquired within `timeout`.
    pub fn try_write_fused(&self, reading: FusedReading, timeout: Duration) -> bool {
        match self.inner.try_lock_for(timeout) {
            Some(mut guard) => {
                guard.fused = reading;
                true
            }
            None => false,
        }
    }

    /// Read the fused reading, or `None` if the lock was not acquired
    /// within `timeout`.
    #[must_use]
    pub fn try_read_fused(&self, timeout: Duration) -> Option<FusedReading> {
        self.inner.try_lock_for(timeout).map(|guard| guard.fused)
    }

    /// Replace the inference result. Returns `false` if the lock was not
    /// acquired within `timeout`.
    pub fn try_write_result(&self, result: InferenceResult, timeout: Duration) -> bool {
        match self.inner.try_lock_for(timeout) {
            Some(mut guard) => {
                guard.result = result;
                true
            }
            None => false,
        }
    }

    /// Read the inference result, or `None` if the lock was not acquired
    /// within `timeout`.
    #[must_use]
    pub fn try_read_result(&self, timeout: Duration) -> Option<InferenceResult> {
        self.inner.try_lock_for(timeout).map(|guard| guard.result)
    }

    /// Hold the lock, simulating a context that is slow to release it.
    #[cfg(test)]
    pub(crate) fn hold(&self) -> parking_lot::MutexGuard<'_, Snapshot> {
        self.inner.lock()
    }
}

/// Contention counters for one port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortStats {
    /// Accesses that acquired the lock.
    pub acquired: u64,
    /// Accesses that timed out.
    pub missed: u64,
}

/// One execution context's view of the [`TelemetryStore`].
///
/// Reads never fail: if the lock is busy the port returns the last value it
/// successfully read, starting from a zeroed reading and
/// [`InferenceResult::SAFE_DEFAULT`].
#[derive(Debug, Clone)]
pub struct TelemetryPort {
    store: Arc<TelemetryStore>,
    timeout: Duration,
    last_fused: FusedReading,
    last_result: InferenceResult,
    stats: PortStats,
}

impl TelemetryPort {
    /// Create a port with the given acquisition bound.
    #[must_use]
    pub fn new(store: Arc<TelemetryStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            last_fused: FusedReading::default(),
            last_result: InferenceResult::SAFE_DEFAULT,
            stats: PortStats::default(),
        }
    }

    /// The store this port talks to.
    #[must_use]
    pub fn store(&self) -> Arc<TelemetryStore> {
        Arc::clone(&self.store)
    }

    /// Acquisition bound for this port.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Contention counters so far.
    #[must_use]
    pub fn stats(&self) -> PortStats {
        self.stats
    }

    /// Publish a fused reading. Returns `false` if this cycle's publish was
    /// skipped because the lock was busy.
    pub fn write_fused(&mut self, reading: FusedReading) -> bool {
        let ok = self.store.try_write_fused(reading, self.timeout);
        self.record("write_fused", ok);
        ok
    }

    /// Latest published fused reading, or the last-known one.
    pub fn read_fused(&mut self) -> FusedReading {
        match self.store.try_read_fused(self.timeout) {
            Some(reading) => {
                self.record("read_fused", true);
                self.last_fused = reading;
            }
            None => self.record("read_fused", false),
        }
        self.last_fused
    }

    /// Publish an inference result. Returns `false` if skipped.
    pub fn write_result(&mut self, result: InferenceResult) -> bool {
        let ok = self.store.try_write_result(result, self.timeout);
        self.record("write_result", ok);
        ok
    }

    /// Latest published inference result, or the last-known one.
    pub fn read_result(&mut self) -> InferenceResult {
        match self.store.try_read_result(self.timeout) {
            Some(result) => {
                self.record("read_result", true);
                self.last_result = result;
            }
            None => self.record("read_result", false),
        }
        self.last_result
    }

    fn record(&mut self, op: &'static str, acquired: bool) {
        if acquired {
            self.stats.acquired += 1;
        } else {
            self.stats.missed += 1;
            trace!(op, missed = self.stats.missed, "telemetry lock busy");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    use super::*;

    const BOUND: Duration = Duration::from_millis(20);

    fn reading(roll: f32) -> FusedReading {
        FusedReading {
            roll,
            pitch: -3.5,
            accel_magnitude: 1.02,
            noise_level: 40.0,
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(SafetyStatus::Nominal.code(), 0);
        assert_eq!(SafetyStatus::Caution.code(), 1);
        assert_eq!(SafetyStatus::Critical.code(), 2);
        for status in [
            SafetyStatus::Nominal,
            SafetyStatus::Caution,
            SafetyStatus::Critical,
        ] {
            assert_eq!(SafetyStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(SafetyStatus::from_code(3), None);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SafetyStatus::Critical.to_string(), "critical");
        assert_eq!(SafetyStatus::default(), SafetyStatus::Nominal);
    }

    #[test]
    fn test_new_store_holds_defaults() {
        let store = TelemetryStore::new();
        assert_eq!(store.try_read_fused(BOUND), Some(FusedReading::default()));
        assert_eq!(
            store.try_read_result(BOUND),
            Some(InferenceResult::SAFE_DEFAULT)
        );
    }

    #[test]
    fn test_write_then_read() {
        let store = TelemetryStore::shared();
        let mut producer = TelemetryPort::new(Arc::clone(&store), BOUND);
        let mut consumer = TelemetryPort::new(store, BOUND);

        assert!(producer.write_fused(reading(12.5)));
        assert_eq!(consumer.read_fused(), reading(12.5));

        let verdict = InferenceResult {
            safety_score: 42.0,
            status: SafetyStatus::Caution,
        };
        assert!(consumer.write_result(verdict));
        assert_eq!(producer.read_result(), verdict);
    }

    #[test]
    fn test_repeated_reads_are_identical() {
        let store = TelemetryStore::shared();
        let mut port = TelemetryPort::new(store, BOUND);
        port.write_fused(reading(7.0));

        let first = port.read_fused();
        for _ in 0..100 {
            assert_eq!(port.read_fused(), first);
        }
        let result = port.read_result();
        for _ in 0..100 {
            assert_eq!(port.read_result(), result);
        }
    }

    #[test]
    fn test_busy_store_returns_last_known_within_bound() {
        let store = TelemetryStore::shared();
        let mut port = TelemetryPort::new(Arc::clone(&store), BOUND);
        port.write_fused(reading(1.0));
        assert_eq!(port.read_fused(), reading(1.0));

        let guard = store.hold();
        let start = Instant::now();
        let seen = port.read_fused();
        let elapsed = start.elapsed();
        drop(guard);

        assert_eq!(seen, reading(1.0));
        assert!(elapsed < BOUND * 10, "blocked for {elapsed:?}");
        assert_eq!(port.stats().missed, 1);
    }

    #[test]
    fn test_busy_store_startup_result_is_safe_default() {
        let store = TelemetryStore::shared();
        let mut port = TelemetryPort::new(Arc::clone(&store), BOUND);

        let _guard = store.hold();
        assert_eq!(port.read_result(), InferenceResult::SAFE_DEFAULT);
        assert_eq!(port.read_fused(), FusedReading::default());
    }

    #[test]
    fn test_busy_store_skips_publish() {
        let store = TelemetryStore::shared();
        let mut port = TelemetryPort::new(Arc::clone(&store), BOUND);

        {
            let _guard = store.hold();
            assert!(!port.write_fused(reading(99.0)));
            assert!(!port.write_result(InferenceResult {
                safety_score: 0.0,
                status: SafetyStatus::Critical,
            }));
        }

        assert_eq!(port.read_fused(), FusedReading::default());
        assert_eq!(port.read_result(), InferenceResult::SAFE_DEFAULT);
        assert_eq!(port.stats(), PortStats { acquired: 2, missed: 2 });
    }

    #[test]
    fn test_contention_from_another_thread() {
        let store = TelemetryStore::shared();
        let mut port = TelemetryPort::new(Arc::clone(&store), BOUND);
        port.write_result(InferenceResult {
            safety_score: 55.0,
            status: SafetyStatus::Caution,
        });
        let expected = port.read_result();

        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let holder_store = Arc::clone(&store);
        let holder = thread::spawn(move || {
            let _guard = holder_store.hold();
            held_tx.send(()).unwrap();
            let _ = release_rx.recv();
        });

        held_rx.recv().unwrap();
        let start = Instant::now();
        let seen = port.read_result();
        let elapsed = start.elapsed();
        release_tx.send(()).unwrap();
        holder.join().unwrap();

        assert_eq!(seen, expected);
        assert!(elapsed < BOUND * 10, "blocked for {elapsed:?}");
        assert_eq!(port.stats().missed, 1);

        // Once released, fresh reads go through again.
        assert_eq!(port.read_result(), expected);
        assert_eq!(port.stats().missed, 1);
    }

    #[test]
    fn test_fused_reading_from_orientation() {
        let o = Orientation {
            roll: 10.0,
            pitch: -5.0,
            accel_magnitude: 0.98,
        };
        let r = FusedReading::new(o, 33.0);
        assert_eq!(r.roll, 10.0);
        assert_eq!(r.pitch, -5.0);
        assert_eq!(r.accel_magnitude, 0.98);
        assert_eq!(r.noise_level, 33.0);
    }
}
