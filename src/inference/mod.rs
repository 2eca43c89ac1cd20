//! Window → (label, confidence), never failing.
//!
//! A prediction walks a fixed ladder of checks. Each rung either hands its
//! output to the next one or stops the attempt with a [`PredictionStatus`];
//! stopped attempts turn into a fallback label with zero confidence.

mod record;

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Instant,
};

use ndarray::{Array2, Array3, ArrayView, ArrayViewD, Axis, Dimension, Ix3};

use crate::backend::PredictionBackend;
use crate::types::{InferenceResult, fallback};

pub use self::record::{DIAGNOSTIC_TARGET, PredictionRecord, PredictionStatus};

/// Why the ladder stopped early.
#[derive(Debug)]
struct Rejection {
    status: PredictionStatus,
    error: Option<String>,
}

impl Rejection {
    fn new(status: PredictionStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    fn exception(error: impl std::fmt::Display) -> Self {
        Self {
            status: PredictionStatus::Exception,
            error: Some(error.to_string()),
        }
    }
}

type Step<T> = Result<T, Rejection>;

pub struct InferenceOrchestrator {
    backend: Arc<dyn PredictionBackend>,
}

impl InferenceOrchestrator {
    pub fn new(backend: Arc<dyn PredictionBackend>) -> Self {
        Self { backend }
    }

    /// Input length the scaler expects; sizes per-session buffers.
    pub fn expected_feature_count(&self) -> Option<usize> {
        self.backend.expected_feature_count()
    }

    /// Classify one window. Accepts `[batch, steps, features]` or
    /// `[steps, features]`.
    pub fn predict<D: Dimension>(&self, window: ArrayView<'_, f32, D>) -> InferenceResult {
        let (result, record) = self.predict_with_record(window);
        record.emit();
        result
    }

    /// Same as [`predict`](Self::predict) but hands back the diagnostic
    /// record instead of logging it.
    pub fn predict_with_record<D: Dimension>(
        &self,
        window: ArrayView<'_, f32, D>,
    ) -> (InferenceResult, PredictionRecord) {
        let window = window.into_dyn();
        let mut record = PredictionRecord::default();

        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| self.run_ladder(window, &mut record)))
                .unwrap_or_else(|_| Err(Rejection::exception("prediction backend panicked")));

        let result = match outcome {
            Ok(result) => {
                record.status = PredictionStatus::Ok;
                record.selected_label = Some(result.label.clone());
                record.confidence = result.confidence;
                result
            }
            Err(rejection) => {
                record.status = rejection.status;
                record.error = rejection.error;
                record.confidence = 0.0;
                let label = rejection.status.fallback_label().unwrap_or(fallback::ERROR);
                InferenceResult::fallback(label)
            }
        };

        (result, record)
    }

    fn run_ladder(
        &self,
        window: ArrayViewD<'_, f32>,
        record: &mut PredictionRecord,
    ) -> Step<InferenceResult> {
        self.check_available()?;
        let input = coerce_rank(window, record)?;
        self.check_shape(&input, record)?;
        let scaled = self.scale(input, record)?;
        let scores = self.forward(scaled, record)?;
        let (class_index, confidence) = select_class(&scores, record)?;
        self.decode(class_index, confidence)
    }

    fn check_available(&self) -> Step<()> {
        if self.backend.is_available() {
            Ok(())
        } else {
            Err(Rejection::new(PredictionStatus::Unavailable))
        }
    }

    fn check_shape(&self, input: &Array3<f32>, record: &mut PredictionRecord) -> Step<()> {
        let Some((steps, features)) = self.backend.expected_input_shape() else {
            return Ok(());
        };
        record.expected_steps = Some(steps);

        let (_, actual_steps, actual_features) = input.dim();
        if actual_steps != steps || actual_features != features {
            return Err(Rejection::new(PredictionStatus::InvalidShape));
        }
        Ok(())
    }

    /// Flatten the time axis, standardize, restore `[batch, steps, features]`.
    fn scale(&self, input: Array3<f32>, record: &mut PredictionRecord) -> Step<Array3<f32>> {
        let expected = self
            .backend
            .expected_feature_count()
            .ok_or_else(|| Rejection::exception("scaler feature count is unknown"))?;
        record.scaler_expected_features = Some(expected);

        let (batch, steps, features) = input.dim();
        let flat =
            Array2::from_shape_vec((batch, steps * features), input.iter().copied().collect())
                .map_err(Rejection::exception)?;
        let scaled = self.backend.transform(flat).map_err(Rejection::exception)?;
        if scaled.dim() != (batch, steps * features) {
            return Err(Rejection::exception(format!(
                "scaler returned shape {:?} for input ({batch}, {})",
                scaled.shape(),
                steps * features
            )));
        }

        let model_input =
            Array3::from_shape_vec((batch, steps, features), scaled.iter().copied().collect())
                .map_err(Rejection::exception)?;
        record.model_input_shape = Some(model_input.shape().to_vec());
        Ok(model_input)
    }

    fn forward(&self, input: Array3<f32>, record: &mut PredictionRecord) -> Step<Array2<f32>> {
        let start = Instant::now();
        let scores = self.backend.forward(input);
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        record.latency_ms = Some((latency_ms * 100.0).round() / 100.0);

        let scores = scores.map_err(|err| Rejection::exception(format!("{err:#}")))?;
        if let Some(first) = scores.rows().into_iter().next() {
            record.raw_scores = Some(first.to_vec());
        }
        Ok(scores)
    }

    fn decode(&self, class_index: usize, confidence: f32) -> Step<InferenceResult> {
        let label = self
            .backend
            .decode(class_index)
            .ok_or_else(|| Rejection::new(PredictionStatus::LabelOutOfRange))?;

        Ok(InferenceResult {
            label: label.to_string(),
            confidence,
        })
    }
}

/// Insert a batch axis for 2-D windows; anything else must already be 3-D.
fn coerce_rank(window: ArrayViewD<'_, f32>, record: &mut PredictionRecord) -> Step<Array3<f32>> {
    let window = if window.ndim() == 2 {
        window.insert_axis(Axis(0))
    } else {
        window
    };
    record.input_shape = Some(window.shape().to_vec());

    window
        .to_owned()
        .into_dimensionality::<Ix3>()
        .map_err(|_| Rejection::new(PredictionStatus::InvalidRank))
}

/// Softmax over the first batch row, then argmax. Ties go to the lowest index.
fn select_class(scores: &Array2<f32>, record: &mut PredictionRecord) -> Step<(usize, f32)> {
    let probabilities = scores
        .rows()
        .into_iter()
        .next()
        .map(|row| softmax(row.to_vec()))
        .ok_or_else(|| Rejection::exception("classifier returned no scores"))?;
    record.probabilities = Some(probabilities.clone());

    if probabilities.is_empty() || probabilities.iter().any(|p| !p.is_finite()) {
        return Err(Rejection::exception("non-finite class probabilities"));
    }

    let (class_index, confidence) = probabilities
        .iter()
        .copied()
        .enumerate()
        .reduce(|best, cur| if cur.1 > best.1 { cur } else { best })
        .ok_or_else(|| Rejection::exception("classifier returned no classes"))?;

    Ok((class_index, confidence.clamp(0.0, 1.0)))
}

fn softmax(scores: Vec<f32>) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::stub::{StubBackend, StubFailure};
    use ndarray::{Array, Array1, IxDyn};

    const CLASSES: [&str; 3] = ["push_up", "squat", "lunge"];

    fn orchestrator(backend: StubBackend) -> InferenceOrchestrator {
        InferenceOrchestrator::new(Arc::new(backend))
    }

    fn window(steps: usize, features: usize) -> Array3<f32> {
        Array3::from_elem((1, steps, features), 0.5)
    }

    #[test]
    fn successful_prediction_picks_highest_probability() {
        let predictor = orchestrator(
            StubBackend::new(&CLASSES, 2, 22).with_logits(vec![0.0, 2.0, 1.0]),
        );
        let (result, record) = predictor.predict_with_record(window(2, 22).view());

        assert_eq!(result.label, "squat");
        let expected = 2f32.exp() / (1.0 + 2f32.exp() + 1f32.exp());
        assert!((result.confidence - expected).abs() < 1e-6);
        assert_eq!(record.status, PredictionStatus::Ok);
        assert_eq!(record.selected_label.as_deref(), Some("squat"));
        assert_eq!(record.input_shape, Some(vec![1, 2, 22]));
        assert_eq!(record.model_input_shape, Some(vec![1, 2, 22]));
        assert_eq!(record.scaler_expected_features, Some(44));
        assert_eq!(record.expected_steps, Some(2));
        assert!(record.latency_ms.is_some());
        let total: f32 = record.probabilities.unwrap().iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unavailable_backend_short_circuits() {
        let backend = Arc::new(StubBackend::new(&CLASSES, 2, 22).unavailable());
        let predictor = InferenceOrchestrator::new(backend.clone());

        for input in [window(2, 22), window(5, 3), Array3::zeros((0, 0, 0))] {
            let (result, record) = predictor.predict_with_record(input.view());
            assert_eq!(result, InferenceResult::fallback("unavailable"));
            assert_eq!(record.status, PredictionStatus::Unavailable);
        }
        assert_eq!(backend.forward_calls(), 0);
    }

    #[test]
    fn two_dimensional_window_gains_batch_axis() {
        let predictor = orchestrator(StubBackend::new(&CLASSES, 2, 22));
        let input = Array2::from_elem((2, 22), 0.5);
        let (result, record) = predictor.predict_with_record(input.view());
        assert_eq!(result.label, "push_up");
        assert_eq!(record.input_shape, Some(vec![1, 2, 22]));
    }

    #[test]
    fn wrong_rank_is_invalid_input() {
        let predictor = orchestrator(StubBackend::new(&CLASSES, 2, 22));

        let flat = Array1::from_elem(44, 0.5);
        let (result, record) = predictor.predict_with_record(flat.view());
        assert_eq!(result, InferenceResult::fallback("invalid_input"));
        assert_eq!(record.status, PredictionStatus::InvalidRank);

        let deep = Array::from_elem(IxDyn(&[1, 1, 2, 22]), 0.5);
        let (result, record) = predictor.predict_with_record(deep.view());
        assert_eq!(result.label, "invalid_input");
        assert_eq!(record.status, PredictionStatus::InvalidRank);
    }

    #[test]
    fn shape_mismatch_is_invalid_input() {
        let backend = Arc::new(StubBackend::new(&CLASSES, 2, 22));
        let predictor = InferenceOrchestrator::new(backend.clone());

        for input in [window(3, 22), window(2, 21), window(0, 22)] {
            let (result, record) = predictor.predict_with_record(input.view());
            assert_eq!(result, InferenceResult::fallback("invalid_input"));
            assert_eq!(record.status, PredictionStatus::InvalidShape);
        }
        assert_eq!(backend.forward_calls(), 0);
    }

    #[test]
    fn undeclared_shape_defers_to_scaler() {
        let predictor = orchestrator(StubBackend::new(&CLASSES, 2, 22).without_input_shape());

        let (result, record) = predictor.predict_with_record(window(1, 44).view());
        assert_eq!(result.label, "push_up");
        assert_eq!(record.expected_steps, None);

        let (result, record) = predictor.predict_with_record(window(3, 22).view());
        assert_eq!(result, InferenceResult::fallback("error"));
        assert_eq!(record.status, PredictionStatus::Exception);
        assert_eq!(
            record.error.as_deref(),
            Some("scaler expects 44 features, got 66")
        );
    }

    #[test]
    fn class_index_beyond_decoder_is_unknown() {
        let predictor = orchestrator(
            StubBackend::new(&CLASSES, 2, 22).with_logits(vec![0.0, 0.0, 0.0, 5.0]),
        );
        let (result, record) = predictor.predict_with_record(window(2, 22).view());
        assert_eq!(result, InferenceResult::fallback("unknown"));
        assert_eq!(record.status, PredictionStatus::LabelOutOfRange);
    }

    #[test]
    fn tied_probabilities_pick_first_class() {
        let predictor = orchestrator(
            StubBackend::new(&CLASSES, 2, 22).with_logits(vec![1.0, 1.0, 0.0]),
        );
        let (result, record) = predictor.predict_with_record(window(2, 22).view());
        assert_eq!(result.label, "push_up");
        assert_eq!(record.status, PredictionStatus::Ok);

        let predictor = orchestrator(
            StubBackend::new(&CLASSES, 2, 22).with_logits(vec![0.0, 0.0, 0.0, 0.0]),
        );
        let result = predictor.predict(window(2, 22).view());
        assert_eq!(result.label, "push_up");
        assert!((result.confidence - 0.25).abs() < 1e-6);
    }

    #[test]
    fn backend_errors_become_error_label() {
        let predictor =
            orchestrator(StubBackend::new(&CLASSES, 2, 22).failing(StubFailure::Error));
        let (result, record) = predictor.predict_with_record(window(2, 22).view());
        assert_eq!(result, InferenceResult::fallback("error"));
        assert_eq!(record.status, PredictionStatus::Exception);
        assert_eq!(record.error.as_deref(), Some("stub classifier failure"));
    }

    #[test]
    fn backend_panics_become_error_label() {
        let predictor =
            orchestrator(StubBackend::new(&CLASSES, 2, 22).failing(StubFailure::Panic));
        let (result, record) = predictor.predict_with_record(window(2, 22).view());
        assert_eq!(result, InferenceResult::fallback("error"));
        assert_eq!(record.status, PredictionStatus::Exception);
    }

    #[test]
    fn nan_inputs_never_escape() {
        let predictor = orchestrator(StubBackend::new(&CLASSES, 2, 22));
        let input = Array3::from_elem((1, 2, 22), f32::NAN);
        let result = predictor.predict(input.view());
        assert!(result.confidence >= 0.0 && result.confidence <= 1.0);

        let predictor = orchestrator(
            StubBackend::new(&CLASSES, 2, 22).with_logits(vec![f32::NAN, 1.0, 0.0]),
        );
        let (result, record) = predictor.predict_with_record(window(2, 22).view());
        assert_eq!(result, InferenceResult::fallback("error"));
        assert_eq!(record.status, PredictionStatus::Exception);
    }

    #[test]
    fn empty_scores_are_an_error() {
        let predictor = orchestrator(StubBackend::new(&CLASSES, 2, 22).with_logits(Vec::new()));
        let result = predictor.predict(window(2, 22).view());
        assert_eq!(result, InferenceResult::fallback("error"));

        let predictor = orchestrator(StubBackend::new(&CLASSES, 2, 22));
        let empty_batch = Array3::<f32>::zeros((0, 2, 22));
        assert_eq!(
            predictor.predict(empty_batch.view()),
            InferenceResult::fallback("error")
        );
    }

    #[test]
    fn softmax_is_shift_invariant() {
        let a = softmax(vec![1.0, 2.0, 3.0]);
        let b = softmax(vec![1001.0, 1002.0, 1003.0]);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
    }
}
