//! The inference loop.
//!
//! Loads the model once when its thread starts, then every period reads the
//! latest fused reading, classifies it and publishes the verdict. With no
//! model the loop keeps running and publishes the safe default.

use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

use crate::classifier::{ModelLoader, SafetyClassifier};
use crate::schedule::PeriodicTask;
use crate::telemetry::{InferenceResult, TelemetryPort};

/// Default period between inference cycles.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(20);

/// Default bound on telemetry lock acquisition for this loop.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10);

/// Lifecycle of the inference loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceState {
    /// Model not yet loaded.
    Loading,
    /// Model loaded and classifying.
    Ready,
    /// Model unavailable; publishing the safe default.
    Degraded,
}

/// Counters for one inference loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InferenceStats {
    /// Cycles run.
    pub cycles: u64,
    /// Results published.
    pub published: u64,
    /// Cycles whose publish was skipped (lock busy or model failure).
    pub skipped: u64,
}

/// Periodic classifier driver.
pub struct InferenceLoop {
    loader: Option<ModelLoader>,
    classifier: Option<SafetyClassifier>,
    port: TelemetryPort,
    period: Duration,
    stats: InferenceStats,
}

impl fmt::Debug for InferenceLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceLoop")
            .field("loader_pending", &self.loader.is_some())
            .field("classifier", &self.classifier)
            .field("port", &self.port)
            .field("period", &self.period)
            .field("stats", &self.stats)
            .finish()
    }
}

impl InferenceLoop {
    /// Create a loop that runs `loader` on its first cycle.
    #[must_use]
    pub fn new(loader: ModelLoader, port: TelemetryPort) -> Self {
        Self {
            loader: Some(loader),
            classifier: None,
            port,
            period: DEFAULT_PERIOD,
            stats: InferenceStats::default(),
        }
    }

    /// Create a loop around an already constructed classifier.
    #[must_use]
    pub fn with_classifier(classifier: SafetyClassifier, port: TelemetryPort) -> Self {
        Self {
            loader: None,
            classifier: Some(classifier),
            port,
            period: DEFAULT_PERIOD,
            stats: InferenceStats::default(),
        }
    }

    /// Override the cycle period.
    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> InferenceState {
        match &self.classifier {
            None => InferenceState::Loading,
            Some(c) if c.is_available() => InferenceState::Ready,
            Some(_) => InferenceState::Degraded,
        }
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> InferenceStats {
        self.stats
    }

    /// Load the model if that has not happened yet.
    pub fn ensure_loaded(&mut self) {
        if self.classifier.is_some() {
            return;
        }
        let classifier = match self.loader.take() {
            Some(loader) => SafetyClassifier::load(loader),
            None => SafetyClassifier::unavailable("no model loader"),
        };
        self.classifier = Some(classifier);
        info!(state = ?self.state(), "inference loop initialized");
    }

    /// Run one cycle: read, classify, publish.
    ///
    /// Returns the result published, or `None` if nothing was published.
    pub fn run_cycle(&mut self) -> Option<InferenceResult> {
        self.ensure_loaded();
        self.stats.cycles += 1;

        let reading = self.port.read_fused();
        let classifier = self.classifier.as_mut()?;
        let result = match classifier.classify_reading(&reading) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "inference cycle skipped");
                self.stats.skipped += 1;
                return None;
            }
        };

        if self.port.write_result(result) {
            self.stats.published += 1;
            Some(result)
        } else {
            self.stats.skipped += 1;
            None
        }
    }
}

impl PeriodicTask for InferenceLoop {
    fn name(&self) -> &'static str {
        "inference"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn on_start(&mut self) {
        self.ensure_loaded();
    }

    fn tick(&mut self) {
        self.run_cycle();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::classifier::stub::{FailingModel, FixedModel};
    use crate::classifier::SafetyModel;
    use crate::error::{Error, Result};
    use crate::telemetry::{FusedReading, SafetyStatus, TelemetryStore};

    const BOUND: Duration = Duration::from_millis(20);

    fn port(store: &Arc<TelemetryStore>) -> TelemetryPort {
        TelemetryPort::new(Arc::clone(store), BOUND)
    }

    #[test]
    fn test_starts_in_loading_state() {
        let store = TelemetryStore::shared();
        let loader: ModelLoader =
            Box::new(|| -> Result<Box<dyn SafetyModel>> { Ok(Box::new(FixedModel::new([0.0; 3]))) });
        let lp = InferenceLoop::new(loader, port(&store));
        assert_eq!(lp.state(), InferenceState::Loading);
        assert_eq!(lp.period(), DEFAULT_PERIOD);
    }

    #[test]
    fn test_load_success_is_ready() {
        let store = TelemetryStore::shared();
        let loader: ModelLoader =
            Box::new(|| -> Result<Box<dyn SafetyModel>> { Ok(Box::new(FixedModel::new([0.0; 3]))) });
        let mut lp = InferenceLoop::new(loader, port(&store));
        lp.on_start();
        assert_eq!(lp.state(), InferenceState::Ready);
    }

    #[test]
    fn test_degraded_publishes_safe_default() {
        let store = TelemetryStore::shared();
        let mut sampler = port(&store);
        sampler.write_result(InferenceResult {
            safety_score: 3.0,
            status: SafetyStatus::Critical,
        });
        sampler.write_fused(FusedReading {
            roll: 170.0,
            pitch: 80.0,
            accel_magnitude: 3.0,
            noise_level: 90.0,
        });

        let loader: ModelLoader = Box::new(|| -> Result<Box<dyn SafetyModel>> {
            Err(Error::model_load("guard.json", "missing"))
        });
        let mut lp = InferenceLoop::new(loader, port(&store));
        lp.on_start();
        assert_eq!(lp.state(), InferenceState::Degraded);

        for _ in 0..3 {
            assert_eq!(lp.run_cycle(), Some(InferenceResult::SAFE_DEFAULT));
            assert_eq!(sampler.read_result(), InferenceResult::SAFE_DEFAULT);
        }
        assert_eq!(lp.stats().published, 3);
    }

    #[test]
    fn test_ready_classifies_latest_reading() {
        let store = TelemetryStore::shared();
        let mut sampler = port(&store);
        sampler.write_fused(FusedReading {
            roll: 90.0,
            pitch: 0.0,
            accel_magnitude: 1.0,
            noise_level: 0.0,
        });

        let model = FixedModel::new([0.1, 0.2, 0.75]);
        let calls = Arc::clone(&model.calls);
        let classifier = SafetyClassifier::new(Box::new(model));
        let mut lp = InferenceLoop::with_classifier(classifier, port(&store));

        let published = lp.run_cycle().unwrap();
        assert_eq!(published.status, SafetyStatus::Critical);
        assert_eq!(sampler.read_result(), published);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_model_failure_skips_publish() {
        let store = TelemetryStore::shared();
        let mut sampler = port(&store);
        let previous = InferenceResult {
            safety_score: 61.0,
            status: SafetyStatus::Caution,
        };
        sampler.write_result(previous);

        let mut lp =
            InferenceLoop::with_classifier(SafetyClassifier::new(Box::new(FailingModel)), port(&store));
        assert_eq!(lp.state(), InferenceState::Ready);
        assert_eq!(lp.run_cycle(), None);
        assert_eq!(sampler.read_result(), previous);
        assert_eq!(lp.stats().skipped, 1);
    }

    #[test]
    fn test_busy_store_skips_publish() {
        let store = TelemetryStore::shared();
        let mut lp = InferenceLoop::with_classifier(
            SafetyClassifier::new(Box::new(FixedModel::new([0.0, 0.0, 0.9]))),
            port(&store),
        );

        {
            let _guard = store.hold();
            assert_eq!(lp.run_cycle(), None);
        }
        assert_eq!(lp.stats().skipped, 1);
        assert_eq!(
            store.try_read_result(BOUND),
            Some(InferenceResult::SAFE_DEFAULT)
        );
    }

    #[test]
    fn test_with_period_override() {
        let store = TelemetryStore::shared();
        let lp = InferenceLoop::with_classifier(SafetyClassifier::unavailable("none"), port(&store))
            .with_period(Duration::from_millis(50));
        assert_eq!(lp.period(), Duration::from_millis(50));
        assert_eq!(lp.name(), "inference");
    }
}
