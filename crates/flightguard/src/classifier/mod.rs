//! Learned risk classification.
//!
//! A [`SafetyModel`] is any 3-in/3-out function: inputs are roll, pitch and
//! acceleration magnitude, outputs are likelihood-style scores for three risk
//! tiers in fixed order `[tier0, tier1, tier2]`. The [`SafetyClassifier`]
//! turns those outputs into an [`InferenceResult`] with a fixed threshold
//! policy, and stands in with the safe default when no model could be loaded.

pub mod dense;

use std::fmt;

use tracing::{error, info};

use crate::error::{Error, Result};
use crate::telemetry::{FusedReading, InferenceResult, SafetyStatus};

pub use dense::{Activation, DenseLayer, DenseModel};

/// Number of model inputs (roll, pitch, acceleration magnitude).
pub const MODEL_INPUTS: usize = 3;

/// Number of model outputs (one per risk tier).
pub const MODEL_OUTPUTS: usize = 3;

/// Tier 2 output above which the status is [`SafetyStatus::Critical`].
pub const CRITICAL_THRESHOLD: f32 = 0.7;

/// Tier 1 output above which the status is [`SafetyStatus::Caution`].
pub const CAUTION_THRESHOLD: f32 = 0.6;

/// A fixed-shape numeric model.
///
/// Implementations must be deterministic: the same input with the same
/// weights yields the same output.
pub trait SafetyModel: Send + fmt::Debug {
    /// Short human-readable description for diagnostics.
    fn describe(&self) -> String;

    /// Run one prediction.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot produce an output for `input`.
    fn predict(&mut self, input: [f32; MODEL_INPUTS]) -> Result<[f32; MODEL_OUTPUTS]>;
}

/// Boxed constructor for a model, run once when inference starts.
pub type ModelLoader = Box<dyn FnOnce() -> Result<Box<dyn SafetyModel>> + Send>;

/// Derive score and status from raw model outputs.
///
/// Critical takes precedence over Caution whenever both thresholds are
/// exceeded. The score is `(1 - tier2) * 100`, clamped to `[0, 100]`.
#[must_use]
pub fn derive_result(outputs: [f32; MODEL_OUTPUTS]) -> InferenceResult {
    let status = if outputs[2] > CRITICAL_THRESHOLD {
        SafetyStatus::Critical
    } else if outputs[1] > CAUTION_THRESHOLD {
        SafetyStatus::Caution
    } else {
        SafetyStatus::Nominal
    };

    InferenceResult {
        safety_score: ((1.0 - outputs[2]) * 100.0).clamp(0.0, 100.0),
        status,
    }
}

enum ClassifierState {
    Ready(Box<dyn SafetyModel>),
    Unavailable { reason: String },
}

impl fmt::Debug for ClassifierState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(model) => f.debug_tuple("Ready").field(model).finish(),
            Self::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Wraps a [`SafetyModel`] and applies the status policy.
#[derive(Debug)]
pub struct SafetyClassifier {
    state: ClassifierState,
    predictions: u64,
}

impl SafetyClassifier {
    /// Create a classifier around a loaded model.
    #[must_use]
    pub fn new(model: Box<dyn SafetyModel>) -> Self {
        Self {
            state: ClassifierState::Ready(model),
            predictions: 0,
        }
    }

    /// Create a classifier with no model. It reports the safe default.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: ClassifierState::Unavailable {
                reason: reason.into(),
            },
            predictions: 0,
        }
    }

    /// Run `loader` once. A load failure is logged and yields an unavailable
    /// classifier rather than an error.
    #[must_use]
    pub fn load(loader: ModelLoader) -> Self {
        match loader() {
            Ok(model) => {
                info!(model = %model.describe(), "classifier online");
                Self::new(model)
            }
            Err(e) => {
                error!(error = %e, "classifier load failed, reporting safe default");
                Self::unavailable(e.to_string())
            }
        }
    }

    /// Whether a model is loaded.
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self.state, ClassifierState::Ready(_))
    }

    /// Why no model is loaded, if that is the case.
    #[must_use]
    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.state {
            ClassifierState::Ready(_) => None,
            ClassifierState::Unavailable { reason } => Some(reason.as_str()),
        }
    }

    /// Number of successful predictions so far.
    #[must_use]
    pub fn predictions(&self) -> u64 {
        self.predictions
    }

    /// Classify one attitude.
    ///
    /// Without a model this returns [`InferenceResult::SAFE_DEFAULT`].
    ///
    /// # Errors
    ///
    /// Returns an error if the model fails or produces non-finite outputs.
    pub fn classify(
        &mut self,
        roll: f32,
        pitch: f32,
        accel_magnitude: f32,
    ) -> Result<InferenceResult> {
        let ClassifierState::Ready(model) = &mut self.state else {
            return Ok(InferenceResult::SAFE_DEFAULT);
        };

        let outputs = model.predict([roll, pitch, accel_magnitude])?;
        if outputs.iter().any(|v| !v.is_finite()) {
            return Err(Error::inference(format!(
                "non-finite model output {outputs:?}"
            )));
        }

        self.predictions += 1;
        Ok(derive_result(outputs))
    }

    /// Classify a fused reading. The noise level is not a model input.
    ///
    /// # Errors
    ///
    /// See [`SafetyClassifier::classify`].
    pub fn classify_reading(&mut self, reading: &FusedReading) -> Result<InferenceResult> {
        self.classify(reading.roll, reading.pitch, reading.accel_magnitude)
    }
}

/// Deterministic models for tests.
#[cfg(test)]
pub(crate) mod stub {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use super::{SafetyModel, MODEL_INPUTS, MODEL_OUTPUTS};
    use crate::error::{Error, Result};

    /// Always returns the same outputs and counts calls.
    #[derive(Debug, Clone)]
    pub struct FixedModel {
        pub outputs: [f32; MODEL_OUTPUTS],
        pub calls: Arc<AtomicU64>,
    }

    impl FixedModel {
        pub fn new(outputs: [f32; MODEL_OUTPUTS]) -> Self {
            Self {
                outputs,
                calls: Arc::new(AtomicU64::new(0)),
            }
        }
    }

    impl SafetyModel for FixedModel {
        fn describe(&self) -> String {
            format!("fixed {:?}", self.outputs)
        }

        fn predict(&mut self, _input: [f32; MODEL_INPUTS]) -> Result<[f32; MODEL_OUTPUTS]> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outputs)
        }
    }

    /// Flags Critical when |roll| exceeds a limit, otherwise nominal.
    #[derive(Debug, Clone)]
    pub struct RollLimitModel {
        pub limit: f32,
    }

    impl SafetyModel for RollLimitModel {
        fn describe(&self) -> String {
            format!("roll limit {}", self.limit)
        }

        fn predict(&mut self, input: [f32; MODEL_INPUTS]) -> Result<[f32; MODEL_OUTPUTS]> {
            if input[0].abs() > self.limit {
                Ok([0.0, 0.0, 1.0])
            } else {
                Ok([1.0, 0.0, 0.0])
            }
        }
    }

    /// Fails every prediction.
    #[derive(Debug)]
    pub struct FailingModel;

    impl SafetyModel for FailingModel {
        fn describe(&self) -> String {
            "failing".to_string()
        }

        fn predict(&mut self, _input: [f32; MODEL_INPUTS]) -> Result<[f32; MODEL_OUTPUTS]> {
            Err(Error::inference("stub failure"))
        }
    }
}
