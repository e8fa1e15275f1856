// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Classifier and loader error types

use std::path::PathBuf;

use thiserror::Error;

use crate::weights::WeightError;

/// Errors raised by a constructed classifier or its parameter store
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Shape mismatch for '{name}': expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Parameter '{0}' is not declared by this architecture")]
    MissingParameter(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model produced no usable output: {0}")]
    InvalidOutput(String),

    #[error("Insufficient parameter coverage: matched {matched}/{expected} (minimum fraction {minimum:.2})")]
    InsufficientCoverage {
        matched: usize,
        expected: usize,
        minimum: f32,
    },

    #[error("ONNX Runtime error: {0}")]
    Runtime(String),
}

impl From<ndarray::ShapeError> for ModelError {
    fn from(e: ndarray::ShapeError) -> Self {
        ModelError::InvalidInput(e.to_string())
    }
}

/// Errors raised by `load_model`
#[derive(Debug, Error)]
pub enum LoadError {
    /// Configuration error: the weight path does not exist
    #[error("Weight file not found: {0}")]
    WeightsMissing(PathBuf),

    /// Configuration error: the file is neither a parameter blob nor a runnable model
    #[error("Weight file {path} is unreadable: {reason}")]
    WeightsUnreadable { path: PathBuf, reason: String },

    #[error("Failed to read class list {path}: {source}")]
    ClassList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No architecture accepted the blob
    #[error("Could not load model from {path}. Tried architectures: {attempted:?}. Last error: {last_error}")]
    LoadFailure {
        path: PathBuf,
        attempted: Vec<String>,
        last_error: String,
    },
}

impl LoadError {
    /// Operator setup defects, as opposed to load attempts that ran and failed
    pub fn is_configuration_error(&self) -> bool {
        !matches!(self, LoadError::LoadFailure { .. })
    }

    pub(crate) fn unreadable(path: impl Into<PathBuf>, err: WeightError) -> Self {
        LoadError::WeightsUnreadable {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}
