mod artifacts;
mod ort;
pub mod stub;

use std::path::{Path, PathBuf};

use anyhow::Result;
use ndarray::{Array2, Array3};

pub use self::artifacts::{LabelDecoder, StandardScaler};
pub use self::ort::OrtBackend;

const CLASSIFIER_MODEL_FILENAME: &str = "exercise_classifier.onnx";
const SCALER_FILENAME: &str = "scaler.json";
const LABELS_FILENAME: &str = "label_classes.json";

/// The trained pipeline the orchestrator drives: scaler, sequence classifier
/// and label decoder.
///
/// Implementations are shared by every session, so `forward` must be safe to
/// call from several threads; serializing calls internally is fine.
pub trait PredictionBackend: Send + Sync {
    /// Classifier, scaler and decoder are all loaded.
    fn is_available(&self) -> bool;

    /// Flattened input length the scaler was fit on.
    fn expected_feature_count(&self) -> Option<usize>;

    /// `(steps, features)` the classifier declares, if fixed.
    fn expected_input_shape(&self) -> Option<(usize, usize)>;

    /// `[batch, n]` in, `[batch, n]` out.
    fn transform(&self, flat: Array2<f32>) -> Result<Array2<f32>>;

    /// `[batch, steps, features]` in, raw `[batch, classes]` scores out.
    fn forward(&self, input: Array3<f32>) -> Result<Array2<f32>>;

    fn classes(&self) -> &[String];

    fn decode(&self, class_index: usize) -> Option<&str> {
        self.classes().get(class_index).map(String::as_str)
    }
}

/// Where the trained artifacts live.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    models_dir: PathBuf,
}

impl BackendConfig {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.models_dir.join(CLASSIFIER_MODEL_FILENAME)
    }

    pub fn scaler_path(&self) -> PathBuf {
        self.models_dir.join(SCALER_FILENAME)
    }

    pub fn labels_path(&self) -> PathBuf {
        self.models_dir.join(LABELS_FILENAME)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new("models")
    }
}
