//! Deterministic in-memory backend for tests and dry runs.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow, bail};
use ndarray::{Array2, Array3};

use super::PredictionBackend;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StubFailure {
    Error,
    Panic,
}

/// Scores every window with the same fixed logits.
#[derive(Debug)]
pub struct StubBackend {
    available: bool,
    feature_count: usize,
    input_shape: Option<(usize, usize)>,
    classes: Vec<String>,
    logits: Vec<f32>,
    failure: Option<StubFailure>,
    forward_calls: AtomicUsize,
}

impl StubBackend {
    /// Backend for windows of `steps` frames of `features` values whose
    /// logits favour the first class.
    pub fn new(classes: &[&str], steps: usize, features: usize) -> Self {
        let logits = (0..classes.len()).rev().map(|i| i as f32).collect();
        Self {
            available: true,
            feature_count: steps * features,
            input_shape: Some((steps, features)),
            classes: classes.iter().map(|c| c.to_string()).collect(),
            logits,
            failure: None,
            forward_calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn without_input_shape(mut self) -> Self {
        self.input_shape = None;
        self
    }

    pub fn with_logits(mut self, logits: Vec<f32>) -> Self {
        self.logits = logits;
        self
    }

    pub fn failing(mut self, failure: StubFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn forward_calls(&self) -> usize {
        self.forward_calls.load(Ordering::SeqCst)
    }
}

impl PredictionBackend for StubBackend {
    fn is_available(&self) -> bool {
        self.available
    }

    fn expected_feature_count(&self) -> Option<usize> {
        Some(self.feature_count)
    }

    fn expected_input_shape(&self) -> Option<(usize, usize)> {
        self.input_shape
    }

    fn transform(&self, flat: Array2<f32>) -> Result<Array2<f32>> {
        if flat.ncols() != self.feature_count {
            bail!(
                "scaler expects {} features, got {}",
                self.feature_count,
                flat.ncols()
            );
        }
        Ok(flat)
    }

    fn forward(&self, input: Array3<f32>) -> Result<Array2<f32>> {
        self.forward_calls.fetch_add(1, Ordering::SeqCst);
        match self.failure {
            Some(StubFailure::Error) => return Err(anyhow!("stub classifier failure")),
            Some(StubFailure::Panic) => panic!("stub classifier panicked"),
            None => {}
        }

        let batch = input.shape()[0];
        let classes = self.logits.len();
        Ok(Array2::from_shape_fn((batch, classes), |(_, class)| {
            self.logits[class]
        }))
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }
}
