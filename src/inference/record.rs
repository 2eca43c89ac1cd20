use serde::Serialize;

use crate::types::fallback;

/// Log target for per-prediction diagnostic records.
pub const DIAGNOSTIC_TARGET: &str = "exercise_classifier::inference";

/// How a prediction attempt ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    #[default]
    Ok,
    Unavailable,
    InvalidRank,
    InvalidShape,
    LabelOutOfRange,
    Exception,
}

impl PredictionStatus {
    /// Label reported to the caller when the attempt did not succeed.
    pub fn fallback_label(&self) -> Option<&'static str> {
        match self {
            PredictionStatus::Ok => None,
            PredictionStatus::Unavailable => Some(fallback::UNAVAILABLE),
            PredictionStatus::InvalidRank | PredictionStatus::InvalidShape => {
                Some(fallback::INVALID_INPUT)
            }
            PredictionStatus::LabelOutOfRange => Some(fallback::UNKNOWN),
            PredictionStatus::Exception => Some(fallback::ERROR),
        }
    }
}

/// Structured side channel describing one prediction attempt.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PredictionRecord {
    pub input_shape: Option<Vec<usize>>,
    pub scaler_expected_features: Option<usize>,
    pub expected_steps: Option<usize>,
    pub model_input_shape: Option<Vec<usize>>,
    pub raw_scores: Option<Vec<f32>>,
    pub probabilities: Option<Vec<f32>>,
    pub selected_label: Option<String>,
    pub confidence: f32,
    pub latency_ms: Option<f64>,
    pub status: PredictionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictionRecord {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Write the record as one JSON line. Failures are swallowed.
    pub fn emit(&self) {
        match self.to_json() {
            Ok(line) => log::info!(target: DIAGNOSTIC_TARGET, "{line}"),
            Err(err) => log::debug!(target: DIAGNOSTIC_TARGET, "dropped prediction record: {err}"),
        }
    }
}
