// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fully serialized classifiers executed with ONNX Runtime
//!
//! An exported graph carries both architecture and weights, so it is used
//! as-is: no detection, no key normalization, no partial loading.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ndarray::{Array2, Array4};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use tracing::info;

use super::classifier::Classifier;
use super::error::ModelError;

/// ONNX classifier taking a `[N, 3, H, W]` f32 input
#[derive(Clone)]
pub struct OnnxClassifier {
    session: Arc<Mutex<Session>>,
    input_name: String,
    path: PathBuf,
}

impl OnnxClassifier {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let session = Session::builder()
            .map_err(runtime)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(runtime)?
            .with_intra_threads(4)
            .map_err(runtime)?
            .commit_from_file(path)
            .map_err(|e| ModelError::Runtime(format!("{}: {}", path.display(), e)))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| ModelError::Runtime(format!("{} declares no inputs", path.display())))?;

        info!("ONNX classifier loaded from {} (input '{}')", path.display(), input_name);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("path", &self.path)
            .field("input_name", &self.input_name)
            .finish()
    }
}

fn runtime<E: std::fmt::Display>(e: E) -> ModelError {
    ModelError::Runtime(e.to_string())
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        "onnx"
    }

    fn logits(&self, batch: &Array4<f32>) -> Result<Array2<f32>, ModelError> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::Runtime("ONNX session lock poisoned".to_string()))?;

        let input = Value::from_array(batch.clone()).map_err(runtime)?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(runtime)?;

        let logits = outputs[0].try_extract_array::<f32>().map_err(runtime)?;

        // Some exports keep trailing singleton dims, e.g. [N, C, 1, 1]
        let rows = logits.shape().first().copied().unwrap_or(0);
        let cols = if rows == 0 { 0 } else { logits.len() / rows };
        let flat = logits.iter().copied().collect::<Vec<f32>>();
        Ok(Array2::from_shape_vec((rows, cols), flat)?)
    }
}
