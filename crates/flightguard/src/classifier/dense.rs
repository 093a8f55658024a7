//! Fully connected network loaded from a JSON weight file.
//!
//! File layout:
//!
//! ```json
//! {
//!   "layers": [
//!     { "weights": [[...], ...], "bias": [...], "activation": "relu" },
//!     { "weights": [[...], ...], "bias": [...], "activation": "softmax" }
//!   ]
//! }
//! ```
//!
//! `weights` is row-major `[outputs][inputs]`. The first layer must take
//! three inputs and the last must produce three outputs.

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ModelLoader, SafetyModel, MODEL_INPUTS, MODEL_OUTPUTS};
use crate::error::{Error, Result};

/// Per-layer activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Identity.
    #[default]
    Linear,
    /// `max(0, x)`.
    Relu,
    /// Logistic function.
    Sigmoid,
    /// Normalized exponential over the layer.
    Softmax,
}

impl Activation {
    fn apply(self, values: &mut Array1<f32>) {
        match self {
            Self::Linear => {}
            Self::Relu => values.mapv_inplace(|v| v.max(0.0)),
            Self::Sigmoid => values.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Self::Softmax => {
                let max = values.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                values.mapv_inplace(|v| (v - max).exp());
                let sum = values.sum();
                if sum > 0.0 {
                    *values /= sum;
                }
            }
        }
    }
}

/// One dense layer: `activation(weights . x + bias)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LayerFile", into = "LayerFile")]
pub struct DenseLayer {
    weights: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

/// On-disk form of a layer: nested rows rather than ndarray's own encoding.
#[derive(Serialize, Deserialize)]
struct LayerFile {
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
    #[serde(default)]
    activation: Activation,
}

impl TryFrom<LayerFile> for DenseLayer {
    type Error = Error;

    fn try_from(file: LayerFile) -> Result<Self> {
        let rows = file.weights.len();
        let cols = file.weights.first().map_or(0, Vec::len);
        if file.weights.iter().any(|row| row.len() != cols) {
            return Err(Error::model_shape("every weight row must have the same width"));
        }
        let flat: Vec<f32> = file.weights.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((rows, cols), flat)
            .map_err(|e| Error::model_shape(e.to_string()))?;
        Ok(Self::new(weights, Array1::from(file.bias), file.activation))
    }
}

impl From<DenseLayer> for LayerFile {
    fn from(layer: DenseLayer) -> Self {
        Self {
            weights: layer.weights.outer_iter().map(|row| row.to_vec()).collect(),
            bias: layer.bias.to_vec(),
            activation: layer.activation,
        }
    }
}

impl DenseLayer {
    /// Create a layer. `weights` is `(outputs, inputs)`.
    #[must_use]
    pub fn new(weights: Array2<f32>, bias: Array1<f32>, activation: Activation) -> Self {
        Self {
            weights,
            bias,
            activation,
        }
    }

    /// Weight matrix, `(outputs, inputs)`.
    #[must_use]
    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    /// Bias vector.
    #[must_use]
    pub fn bias(&self) -> &Array1<f32> {
        &self.bias
    }

    /// Activation applied after the affine step.
    #[must_use]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    fn forward(&self, input: &Array1<f32>) -> Array1<f32> {
        let mut out = self.weights.dot(input) + &self.bias;
        self.activation.apply(&mut out);
        out
    }
}

/// A validated 3-in/3-out dense network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseModel {
    layers: Vec<DenseLayer>,
}

impl DenseModel {
    /// Build a model from layers, checking the shape chain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelShape`] if the layers do not form a 3-in/3-out
    /// network or contain non-finite parameters.
    pub fn from_layers(layers: Vec<DenseLayer>) -> Result<Self> {
        let model = Self { layers };
        model.validate()?;
        Ok(model)
    }

    /// Parse a model from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the shape is wrong.
    pub fn from_json(text: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(text)?;
        model.validate()?;
        Ok(model)
    }

    /// Load a model file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelLoad`] if the file cannot be read or parsed, or
    /// [`Error::ModelShape`] if it has the wrong shape.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| Error::model_load(path, e.to_string()))?;
        let model: Self =
            serde_json::from_str(&text).map_err(|e| Error::model_load(path, e.to_string()))?;
        model.validate()?;
        debug!(
            path = %path.display(),
            layers = model.layer_count(),
            parameters = model.parameter_count(),
            "Loaded dense model"
        );
        Ok(model)
    }

    /// Deferred loader for [`SafetyClassifier::load`](super::SafetyClassifier::load).
    ///
    /// With no path the loader fails, leaving the classifier unavailable.
    #[must_use]
    pub fn loader(path: Option<PathBuf>) -> ModelLoader {
        Box::new(move || match path {
            Some(path) => Ok(Box::new(Self::load(&path)?) as Box<dyn SafetyModel>),
            None => Err(Error::model_load("<none>", "no model file configured")),
        })
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of layers.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Total weights plus biases.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weights.len() + l.bias.len())
            .sum()
    }

    fn validate(&self) -> Result<()> {
        let (Some(first), Some(last)) = (self.layers.first(), self.layers.last()) else {
            return Err(Error::model_shape("model has no layers"));
        };
        if first.weights.ncols() != MODEL_INPUTS {
            return Err(Error::model_shape(format!(
                "expected {MODEL_INPUTS} inputs, found {}",
                first.weights.ncols()
            )));
        }
        if last.weights.nrows() != MODEL_OUTPUTS {
            return Err(Error::model_shape(format!(
                "expected {MODEL_OUTPUTS} outputs, found {}",
                last.weights.nrows()
            )));
        }

        let mut width = MODEL_INPUTS;
        for (i, layer) in self.layers.iter().enumerate() {
            let (outputs, inputs) = layer.weights.dim();
            if inputs != width {
                return Err(Error::model_shape(format!(
                    "layer {i}: takes {inputs} inputs, previous layer gives {width}"
                )));
            }
            if layer.bias.len() != outputs {
                return Err(Error::model_shape(format!(
                    "layer {i}: {} biases for {outputs} outputs",
                    layer.bias.len()
                )));
            }
            if !layer.weights.iter().chain(&layer.bias).all(|v| v.is_finite()) {
                return Err(Error::model_shape(format!(
                    "layer {i}: non-finite parameter"
                )));
            }
            width = outputs;
        }
        Ok(())
    }
}

impl SafetyModel for DenseModel {
    fn describe(&self) -> String {
        format!(
            "dense {} layers, {} parameters",
            self.layer_count(),
            self.parameter_count()
        )
    }

    fn predict(&mut self, input: [f32; MODEL_INPUTS]) -> Result<[f32; MODEL_OUTPUTS]> {
        let mut values = Array1::from(input.to_vec());
        for layer in &self.layers {
            values = layer.forward(&values);
        }
        <[f32; MODEL_OUTPUTS]>::try_from(values.to_vec().as_slice())
            .map_err(|_| Error::internal("validated model produced wrong output width"))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use ndarray::{array, Array2};

    use super::*;
    use crate::classifier::SafetyClassifier;

    fn identity_layer(activation: Activation) -> DenseLayer {
        DenseLayer::new(Array2::eye(3), Array1::zeros(3), activation)
    }

    const TWO_LAYER_JSON: &str = r#"{
        "layers": [
            {
                "weights": [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
                "bias": [1.0, 0.0, 0.0, 0.0],
                "activation": "relu"
            },
            {
                "weights": [[5.0, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 0.0]],
                "bias": [0.0, 0.0, 0.0],
                "activation": "softmax"
            }
        ]
    }"#;

    #[test]
    fn test_identity_passthrough() {
        let mut model = DenseModel::from_layers(vec![identity_layer(Activation::Linear)]).unwrap();
        assert_eq!(model.predict([0.1, 0.2, 0.3]).unwrap(), [0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_relu_clips_negative() {
        let mut model = DenseModel::from_layers(vec![identity_layer(Activation::Relu)]).unwrap();
        assert_eq!(model.predict([-1.0, 0.5, -0.2]).unwrap(), [0.0, 0.5, 0.0]);
    }

    #[test]
    fn test_sigmoid_midpoint() {
        let mut model = DenseModel::from_layers(vec![identity_layer(Activation::Sigmoid)]).unwrap();
        let out = model.predict([0.0, 0.0, 0.0]).unwrap();
        assert!(out.iter().all(|v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let mut model = DenseModel::from_layers(vec![identity_layer(Activation::Softmax)]).unwrap();
        let out = model.predict([120.0, -30.0, 2.0]).unwrap();
        let sum: f32 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(out[0] > 0.99);
    }

    #[test]
    fn test_from_json_two_layers() {
        let mut model = DenseModel::from_json(TWO_LAYER_JSON).unwrap();
        assert_eq!(model.layer_count(), 2);
        assert_eq!(model.parameter_count(), 12 + 4 + 12 + 3);

        let out = model.predict([45.0, -10.0, 1.0]).unwrap();
        assert!(out[0] > 0.9);
        assert!(out[2] < 0.1);
    }

    #[test]
    fn test_activation_defaults_to_linear() {
        let json = r#"{"layers":[{"weights":[[1,0,0],[0,1,0],[0,0,1]],"bias":[0,0,0]}]}"#;
        let model = DenseModel::from_json(json).unwrap();
        assert_eq!(model.layers[0].activation(), Activation::Linear);
        assert_eq!(model.layers[0].weights().dim(), (3, 3));
    }

    #[test]
    fn test_rejects_empty_model() {
        let err = DenseModel::from_layers(Vec::new()).unwrap_err();
        assert!(err.to_string().contains("no layers"));
    }

    #[test]
    fn test_rejects_wrong_input_width() {
        let layer = DenseLayer::new(Array2::ones((3, 2)), Array1::zeros(3), Activation::Linear);
        let err = DenseModel::from_layers(vec![layer]).unwrap_err();
        assert!(err.to_string().contains("3 inputs"));
    }

    #[test]
    fn test_rejects_wrong_output_width() {
        let layer = DenseLayer::new(Array2::ones((4, 3)), Array1::zeros(4), Activation::Linear);
        let err = DenseModel::from_layers(vec![layer]).unwrap_err();
        assert!(err.to_string().contains("3 outputs"));
    }

    #[test]
    fn test_rejects_broken_chain() {
        let hidden = DenseLayer::new(Array2::ones((5, 3)), Array1::zeros(5), Activation::Relu);
        let err = DenseModel::from_layers(vec![hidden, identity_layer(Activation::Linear)])
            .unwrap_err();
        assert!(err.to_string().contains("layer 1"));
    }

    #[test]
    fn test_rejects_bias_mismatch() {
        let layer = DenseLayer::new(Array2::eye(3), Array1::zeros(2), Activation::Linear);
        let err = DenseModel::from_layers(vec![layer]).unwrap_err();
        assert!(err.to_string().contains("biases"));
    }

    #[test]
    fn test_rejects_non_finite_weight() {
        let layer = DenseLayer::new(
            array![[1.0, 0.0, 0.0], [0.0, f32::INFINITY, 0.0], [0.0, 0.0, 1.0]],
            Array1::zeros(3),
            Activation::Linear,
        );
        let err = DenseModel::from_layers(vec![layer]).unwrap_err();
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let json = r#"{"layers":[{"weights":[[1,0],[0,1,0,0],[0,0,1]],"bias":[0,0,0]}]}"#;
        let err = DenseModel::from_json(json).unwrap_err();
        assert!(err.to_string().contains("same width"), "{err}");
    }

    #[test]
    fn test_layer_json_keeps_nested_rows() {
        let model = DenseModel::from_layers(vec![identity_layer(Activation::Relu)]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&model.to_json().unwrap()).unwrap();
        assert_eq!(
            value["layers"][0]["weights"],
            serde_json::json!([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
        );
        assert_eq!(value["layers"][0]["activation"], "relu");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TWO_LAYER_JSON.as_bytes()).unwrap();

        let model = DenseModel::load(file.path()).unwrap();
        assert_eq!(model.layer_count(), 2);
        assert!(model.describe().contains("2 layers"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = DenseModel::load("/nonexistent/flightguard/model.json").unwrap_err();
        assert!(matches!(err, Error::ModelLoad { .. }));
        assert!(err.is_model_error());
    }

    #[test]
    fn test_load_garbage_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x00\x01 not a model").unwrap();

        let err = DenseModel::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::ModelLoad { .. }));
    }

    #[test]
    fn test_json_round_trip_preserves_predictions() {
        let mut model = DenseModel::from_json(TWO_LAYER_JSON).unwrap();
        let mut reloaded = DenseModel::from_json(&model.to_json().unwrap()).unwrap();
        let input = [12.0, 3.0, 0.9];
        assert_eq!(model.predict(input).unwrap(), reloaded.predict(input).unwrap());
    }

    #[test]
    fn test_loader_without_path_is_unavailable() {
        let classifier = SafetyClassifier::load(DenseModel::loader(None));
        assert!(!classifier.is_available());
        assert!(classifier
            .unavailable_reason()
            .unwrap()
            .contains("no model file configured"));
    }

    #[test]
    fn test_loader_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TWO_LAYER_JSON.as_bytes()).unwrap();

        let mut classifier =
            SafetyClassifier::load(DenseModel::loader(Some(file.path().into())));
        assert!(classifier.is_available());
        let result = classifier.classify(0.0, 0.0, 1.0).unwrap();
        assert!(result.safety_score.is_finite());
    }
}
