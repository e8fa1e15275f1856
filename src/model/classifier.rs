// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Scoring function abstraction
//!
//! Anything that maps a preprocessed NCHW batch to per-class logits is a
//! [`Classifier`]. Native architectures implement [`Backbone`] and are
//! wrapped in a [`NativeClassifier`] that owns their parameters.

use ndarray::{Array1, Array2, Array3, Array4, ArrayView1, Axis};

use super::error::ModelError;
use super::params::{LoadReport, ParameterStore};
use crate::weights::WeightBlob;

/// Scoring function: image batch in, raw logits out
pub trait Classifier: Send + Sync {
    /// Architecture or runtime name, for logs and provenance
    fn name(&self) -> &str;

    /// Logits of shape `[batch, num_classes]`
    fn logits(&self, batch: &Array4<f32>) -> Result<Array2<f32>, ModelError>;

    /// Softmax probabilities for a single image batch
    fn probabilities(&self, batch: &Array4<f32>) -> Result<Vec<f32>, ModelError> {
        let logits = self.logits(batch)?;
        if logits.nrows() == 0 || logits.ncols() == 0 {
            return Err(ModelError::InvalidOutput(format!(
                "{} returned logits of shape {:?}",
                self.name(),
                logits.shape()
            )));
        }
        Ok(softmax(logits.row(0)))
    }
}

/// Forward pass of a native network over a single CHW image
pub trait Backbone: Send + Sync {
    fn forward(&self, params: &ParameterStore, image: &Array3<f32>) -> Result<Array1<f32>, ModelError>;
}

/// A native architecture together with its parameter values
pub struct NativeClassifier {
    name: String,
    backbone: Box<dyn Backbone>,
    params: ParameterStore,
}

impl NativeClassifier {
    pub fn new(name: impl Into<String>, backbone: Box<dyn Backbone>, params: ParameterStore) -> Self {
        Self {
            name: name.into(),
            backbone,
            params,
        }
    }

    pub fn parameters(&self) -> &ParameterStore {
        &self.params
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterStore {
        &mut self.params
    }

    /// Overwrite declared parameters from `blob`; see [`ParameterStore::load_partial`]
    pub fn load_weights(&mut self, blob: &WeightBlob) -> Result<LoadReport, ModelError> {
        self.params.load_partial(blob)
    }
}

impl std::fmt::Debug for NativeClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeClassifier")
            .field("name", &self.name)
            .field("parameters", &self.params.len())
            .finish()
    }
}

impl Classifier for NativeClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn logits(&self, batch: &Array4<f32>) -> Result<Array2<f32>, ModelError> {
        let mut rows = Vec::with_capacity(batch.len_of(Axis(0)));
        for image in batch.outer_iter() {
            rows.push(self.backbone.forward(&self.params, &image.to_owned())?);
        }

        let classes = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut out = Array2::zeros((rows.len(), classes));
        for (mut dst, row) in out.outer_iter_mut().zip(rows.iter()) {
            if row.len() != classes {
                return Err(ModelError::InvalidOutput("ragged logits".to_string()));
            }
            dst.assign(row);
        }
        Ok(out)
    }
}

/// Numerically stable softmax
pub fn softmax(logits: ArrayView1<f32>) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and value of the largest entry; ties resolve to the first index
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best
}
