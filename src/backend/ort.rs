use std::{
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use anyhow::{Context, Result, anyhow, bail};
use ndarray::{Array2, Array3, Axis, Ix2};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::{Tensor, ValueType};

use super::{BackendConfig, LabelDecoder, PredictionBackend, StandardScaler};

/// Backend built from on-disk artifacts: an ONNX sequence classifier, a
/// standard scaler and the label classes.
///
/// Each artifact loads on its own; a missing one is logged and leaves the
/// backend unavailable instead of failing startup.
pub struct OrtBackend {
    classifier: Option<Mutex<Session>>,
    input_shape: Option<(usize, usize)>,
    scaler: Option<StandardScaler>,
    decoder: Option<LabelDecoder>,
}

impl OrtBackend {
    pub fn load(config: &BackendConfig) -> Self {
        let model_path = config.model_path();
        let classifier = match load_session(&model_path) {
            Ok(session) => {
                log::info!("loaded exercise classifier from {}", model_path.display());
                Some(session)
            }
            Err(err) => {
                log::error!("failed to load exercise classifier: {err:?}");
                None
            }
        };
        let input_shape = classifier.as_ref().and_then(declared_input_shape);

        let scaler = match StandardScaler::load(&config.scaler_path()) {
            Ok(scaler) => {
                log::info!("loaded scaler expecting {} features", scaler.feature_count());
                Some(scaler)
            }
            Err(err) => {
                log::error!("failed to load scaler: {err:?}");
                None
            }
        };

        let decoder = match LabelDecoder::load(&config.labels_path()) {
            Ok(decoder) => {
                log::info!("loaded {} exercise classes", decoder.classes().len());
                Some(decoder)
            }
            Err(err) => {
                log::error!("failed to load label classes: {err:?}");
                None
            }
        };

        Self {
            classifier: classifier.map(Mutex::new),
            input_shape,
            scaler,
            decoder,
        }
    }
}

fn load_session(model_path: &Path) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ORT session from {}", model_path.display()))?;
    Ok(session)
}

/// `(steps, features)` from a `[batch, steps, features]` input with fixed
/// trailing dimensions. Dynamic dimensions are reported as negative.
fn declared_input_shape(session: &Session) -> Option<(usize, usize)> {
    let input = session.inputs.first()?;
    let ValueType::Tensor { shape, .. } = &input.input_type else {
        return None;
    };
    if shape.len() != 3 || shape[1] <= 0 || shape[2] <= 0 {
        log::info!("classifier input shape {shape:?} has no fixed window size");
        return None;
    }
    Some((shape[1] as usize, shape[2] as usize))
}

/// Lock the classifier, recovering it if an earlier forward pass panicked
/// while holding the guard.
fn lock_session(classifier: &Mutex<Session>) -> MutexGuard<'_, Session> {
    recover_poisoned(classifier, "classifier session")
}

fn recover_poisoned<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
        log::warn!("{what} lock was poisoned by a panicking forward pass; recovering");
        mutex.clear_poison();
        poisoned.into_inner()
    })
}

impl PredictionBackend for OrtBackend {
    fn is_available(&self) -> bool {
        self.classifier.is_some() && self.scaler.is_some() && self.decoder.is_some()
    }

    fn expected_feature_count(&self) -> Option<usize> {
        self.scaler.as_ref().map(StandardScaler::feature_count)
    }

    fn expected_input_shape(&self) -> Option<(usize, usize)> {
        self.input_shape
    }

    fn transform(&self, flat: Array2<f32>) -> Result<Array2<f32>> {
        self.scaler
            .as_ref()
            .ok_or_else(|| anyhow!("scaler is not loaded"))?
            .transform(flat)
    }

    fn forward(&self, input: Array3<f32>) -> Result<Array2<f32>> {
        let classifier = self
            .classifier
            .as_ref()
            .ok_or_else(|| anyhow!("classifier is not loaded"))?;
        let mut session = lock_session(classifier);

        let tensor = Tensor::from_array(input)?;
        let outputs = session
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("model returned no outputs"));
        }

        let scores = outputs[0].try_extract_array::<f32>()?.to_owned();
        let scores = match scores.ndim() {
            1 => scores.insert_axis(Axis(0)),
            2 => scores,
            n => bail!("classifier returned rank-{n} scores"),
        };
        scores
            .into_dimensionality::<Ix2>()
            .context("unexpected classifier output shape")
    }

    fn classes(&self) -> &[String] {
        self.decoder
            .as_ref()
            .map(LabelDecoder::classes)
            .unwrap_or_default()
    }
}
