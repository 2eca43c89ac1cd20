//! Sliding window of per-frame feature vectors.
//!
//! The window length is derived from the scaler's flattened input length so
//! that a full window always has exactly the shape the classifier was trained
//! on. Windows are only emitted once full; after that every append emits the
//! most recent `sequence_length` frames.

use std::collections::VecDeque;

use ndarray::Array3;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("total_feature_length must be positive")]
    NonPositiveLength,
    #[error("feature vector must have positive length")]
    EmptyFrame,
    #[error(
        "scaler expects {total} features, but frame length {feature_dim} does not divide evenly"
    )]
    IndivisibleLength { total: usize, feature_dim: usize },
    #[error("inconsistent feature length: expected {expected}, got {actual}")]
    InconsistentLength { expected: usize, actual: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Dimensions {
    feature_dim: usize,
    sequence_length: usize,
}

/// Per-session frame accumulator. Never share one between streams.
#[derive(Debug)]
pub struct SequenceBuffer {
    total_feature_length: usize,
    dims: Option<Dimensions>,
    frames: VecDeque<Vec<f32>>,
}

impl SequenceBuffer {
    pub fn new(total_feature_length: usize) -> Result<Self, BufferError> {
        if total_feature_length == 0 {
            return Err(BufferError::NonPositiveLength);
        }

        Ok(Self {
            total_feature_length,
            dims: None,
            frames: VecDeque::new(),
        })
    }

    /// Push one frame. Returns the full window, shaped
    /// `[1, sequence_length, feature_dim]`, once enough frames have arrived.
    ///
    /// A rejected frame leaves the buffer untouched.
    pub fn append(&mut self, features: &[f32]) -> Result<Option<Array3<f32>>, BufferError> {
        let dims = match self.dims {
            Some(dims) => {
                if features.len() != dims.feature_dim {
                    return Err(BufferError::InconsistentLength {
                        expected: dims.feature_dim,
                        actual: features.len(),
                    });
                }
                dims
            }
            None => {
                let dims = self.infer_dimensions(features.len())?;
                self.dims = Some(dims);
                self.frames = VecDeque::with_capacity(dims.sequence_length);
                dims
            }
        };

        if self.frames.len() == dims.sequence_length {
            self.frames.pop_front();
        }
        self.frames.push_back(features.to_vec());

        if self.frames.len() < dims.sequence_length {
            return Ok(None);
        }

        let window = Array3::from_shape_fn(
            (1, dims.sequence_length, dims.feature_dim),
            |(_, step, feature)| self.frames[step][feature],
        );
        Ok(Some(window))
    }

    fn infer_dimensions(&self, feature_dim: usize) -> Result<Dimensions, BufferError> {
        if feature_dim == 0 {
            return Err(BufferError::EmptyFrame);
        }
        if self.total_feature_length % feature_dim != 0 {
            return Err(BufferError::IndivisibleLength {
                total: self.total_feature_length,
                feature_dim,
            });
        }

        Ok(Dimensions {
            feature_dim,
            sequence_length: self.total_feature_length / feature_dim,
        })
    }

    /// Frames still missing before the next window, or `None` until the first
    /// frame has fixed the dimensions.
    pub fn frames_needed(&self) -> Option<usize> {
        self.dims.map(|dims| dims.sequence_length - self.frames.len())
    }

    pub fn sequence_length(&self) -> Option<usize> {
        self.dims.map(|dims| dims.sequence_length)
    }

    pub fn feature_dim(&self) -> Option<usize> {
        self.dims.map(|dims| dims.feature_dim)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drop buffered frames. The inferred dimensions are kept.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
