//! Exercise classification from streamed 3D body landmarks.
//!
//! Frames flow through [`extract_features`], a per-session
//! [`SequenceBuffer`] and the [`InferenceOrchestrator`], which runs the
//! trained scaler, sequence classifier and label decoder behind a
//! [`PredictionBackend`].

pub mod backend;
pub mod buffer;
pub mod features;
pub mod inference;
pub mod session;
pub mod types;

pub use backend::{BackendConfig, OrtBackend, PredictionBackend};
pub use buffer::{BufferError, SequenceBuffer};
pub use features::extract_features;
pub use inference::{InferenceOrchestrator, PredictionRecord, PredictionStatus};
pub use session::{
    PoseFrame, SessionConfig, SessionError, SessionReply, StreamSession, start_session,
};
pub use types::{FEATURE_COUNT, FeatureVector, InferenceResult, MISSING, NUM_LANDMARKS};
