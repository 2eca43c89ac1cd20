//! One stream of pose frames, from connect to teardown.
//!
//! Every session owns its [`SequenceBuffer`]; frames from different streams
//! never meet in one window. The orchestrator is shared.

use std::{sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    buffer::{BufferError, SequenceBuffer},
    features::{extract_features, missing_count},
    inference::InferenceOrchestrator,
    types::{InferenceResult, LANDMARK_ARITY, NUM_LANDMARKS},
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("scaler is unavailable; cannot size the sequence buffer")]
    ScalerUnavailable,
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("failed to spawn session worker")]
    Spawn(#[source] std::io::Error),
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Frames with a larger share of missing features are skipped.
    pub max_missing_fraction: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_missing_fraction: 0.5,
        }
    }
}

/// One incoming frame: 12 `[x, y, z]` keypoints and a client timestamp.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PoseFrame {
    pub keypoints: Vec<Vec<f32>>,
    pub timestamp: i64,
}

impl PoseFrame {
    fn has_valid_keypoints(&self) -> bool {
        self.keypoints.len() == NUM_LANDMARKS
            && self.keypoints.iter().all(|p| p.len() == LANDMARK_ARITY)
    }
}

/// Reasons a frame produced no prediction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameRejection {
    MissingFields,
    InvalidPayload,
    InvalidLandmarks,
    TooManyMissingLandmarks,
    BufferNotFull,
}

impl FrameRejection {
    pub fn code(&self) -> &'static str {
        match self {
            FrameRejection::MissingFields => "missing_fields",
            FrameRejection::InvalidPayload => "invalid_payload",
            FrameRejection::InvalidLandmarks => "invalid_landmarks",
            FrameRejection::TooManyMissingLandmarks => "too_many_missing_landmarks",
            FrameRejection::BufferNotFull => "buffer_not_full",
        }
    }
}

/// Message sent back for every frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub exercise: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_needed: Option<usize>,
}

impl SessionReply {
    fn prediction(result: InferenceResult) -> Self {
        Self {
            error: None,
            exercise: result.label,
            confidence: result.confidence,
            frames_needed: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            exercise: String::new(),
            confidence: 0.0,
            frames_needed: None,
        }
    }

    fn rejected(reason: FrameRejection) -> Self {
        Self::error(reason.code())
    }

    fn buffer_not_full(frames_needed: Option<usize>) -> Self {
        Self {
            frames_needed,
            ..Self::rejected(FrameRejection::BufferNotFull)
        }
    }

    pub fn is_prediction(&self) -> bool {
        self.error.is_none()
    }
}

pub struct StreamSession {
    orchestrator: Arc<InferenceOrchestrator>,
    config: SessionConfig,
    buffer: SequenceBuffer,
    predictions: usize,
}

impl StreamSession {
    pub fn new(
        orchestrator: Arc<InferenceOrchestrator>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let total_feature_length = orchestrator
            .expected_feature_count()
            .ok_or(SessionError::ScalerUnavailable)?;
        let buffer = SequenceBuffer::new(total_feature_length)?;

        Ok(Self {
            orchestrator,
            config,
            buffer,
            predictions: 0,
        })
    }

    /// Handle one raw JSON message.
    pub fn handle_message(&mut self, raw: &str) -> SessionReply {
        match serde_json::from_str::<Value>(raw) {
            Ok(message) => self.handle_value(message),
            Err(err) => {
                log::warn!("frame is not valid JSON: {err}");
                SessionReply::rejected(FrameRejection::InvalidPayload)
            }
        }
    }

    pub fn handle_value(&mut self, message: Value) -> SessionReply {
        let present = |key: &str| message.get(key).is_some_and(|v| !v.is_null());
        if !present("keypoints") || !present("timestamp") {
            return SessionReply::rejected(FrameRejection::MissingFields);
        }

        let frame = match serde_json::from_value::<PoseFrame>(message) {
            Ok(frame) if frame.has_valid_keypoints() => frame,
            Ok(frame) => {
                log::warn!(
                    "frame {} has malformed keypoints ({} points)",
                    frame.timestamp,
                    frame.keypoints.len()
                );
                return SessionReply::rejected(FrameRejection::InvalidPayload);
            }
            Err(err) => {
                log::warn!("invalid frame payload: {err}");
                return SessionReply::rejected(FrameRejection::InvalidPayload);
            }
        };

        self.handle_frame(&frame)
    }

    pub fn handle_frame(&mut self, frame: &PoseFrame) -> SessionReply {
        self.handle_landmarks(&frame.keypoints)
    }

    /// Extract, buffer and, once a window is full, classify.
    pub fn handle_landmarks<P: AsRef<[f32]>>(&mut self, landmarks: &[P]) -> SessionReply {
        let features = extract_features(landmarks);

        let missing = missing_count(&features);
        if missing == features.len() {
            return SessionReply::rejected(FrameRejection::InvalidLandmarks);
        }
        if missing > self.missing_limit(features.len()) {
            log::debug!("skipping frame with {missing} missing features");
            return SessionReply::rejected(FrameRejection::TooManyMissingLandmarks);
        }

        let window = match self.buffer.append(&features) {
            Ok(Some(window)) => window,
            Ok(None) => return SessionReply::buffer_not_full(self.buffer.frames_needed()),
            Err(err) => {
                log::warn!("frame rejected by sequence buffer: {err}");
                return SessionReply::error(err.to_string());
            }
        };

        let result = self.orchestrator.predict(window.view());
        self.predictions += 1;
        if result.is_fallback() {
            log::warn!("prediction {} fell back to {}", self.predictions, result.label);
        } else {
            log::debug!(
                "prediction {}: {}",
                self.predictions,
                result.display_text()
            );
        }
        SessionReply::prediction(result)
    }

    fn missing_limit(&self, feature_count: usize) -> usize {
        (feature_count as f32 * self.config.max_missing_fraction) as usize
    }

    pub fn frames_needed(&self) -> Option<usize> {
        self.buffer.frames_needed()
    }

    pub fn predictions(&self) -> usize {
        self.predictions
    }
}

/// Run a session on its own thread. Frames are handled strictly in arrival
/// order; the thread ends, dropping the buffer, once `frame_rx` disconnects
/// or nobody listens on `reply_tx`.
pub fn start_session(
    orchestrator: Arc<InferenceOrchestrator>,
    config: SessionConfig,
    frame_rx: Receiver<String>,
    reply_tx: Sender<SessionReply>,
) -> Result<thread::JoinHandle<()>, SessionError> {
    let mut session = StreamSession::new(orchestrator, config)?;

    thread::Builder::new()
        .name("stream-session".to_string())
        .spawn(move || {
            log::info!("session started");
            for raw in frame_rx.iter() {
                let reply = session.handle_message(&raw);
                if reply_tx.send(reply).is_err() {
                    log::info!("reply channel closed");
                    break;
                }
            }
            log::info!("session closed after {} predictions", session.predictions());
        })
        .map_err(SessionError::Spawn)
}
