use serde::Serialize;

/// Number of body landmarks per frame.
pub const NUM_LANDMARKS: usize = 12;

/// Coordinates per landmark (x, y, z).
pub const LANDMARK_ARITY: usize = 3;

/// Length of the per-frame feature vector.
pub const FEATURE_COUNT: usize = 22;

/// Marker for a feature that could not be computed because an input landmark
/// was missing.
pub const MISSING: f32 = -1.0;

/// Position of each landmark inside a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyPoint {
    LeftShoulder = 0,
    RightShoulder = 1,
    LeftElbow = 2,
    RightElbow = 3,
    LeftWrist = 4,
    RightWrist = 5,
    LeftHip = 6,
    RightHip = 7,
    LeftKnee = 8,
    RightKnee = 9,
    LeftAnkle = 10,
    RightAnkle = 11,
}

impl BodyPoint {
    pub const fn index(self) -> usize {
        self as usize
    }
}

pub type Landmark = [f32; LANDMARK_ARITY];

pub type FeatureVector = [f32; FEATURE_COUNT];

/// Labels returned in place of a class name when a prediction cannot be made.
pub mod fallback {
    pub const UNAVAILABLE: &str = "unavailable";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const UNKNOWN: &str = "unknown";
    pub const ERROR: &str = "error";

    pub const ALL: [&str; 4] = [UNAVAILABLE, INVALID_INPUT, UNKNOWN, ERROR];
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InferenceResult {
    pub label: String,
    pub confidence: f32,
}

impl InferenceResult {
    pub fn fallback(label: &str) -> Self {
        Self {
            label: label.to_string(),
            confidence: 0.0,
        }
    }

    pub fn is_fallback(&self) -> bool {
        fallback::ALL.contains(&self.label.as_str())
    }

    pub fn display_text(&self) -> String {
        format!("{} ({:.0}%)", self.label, self.confidence * 100.0)
    }
}
