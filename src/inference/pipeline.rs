// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Two-stage inference: presence filter, then classifier
//!
//! Request flow:
//! `Received -> Decoded -> Filtered -> {Rejected | Classified} -> {Persisted | NotPersisted}`.
//! Decode and filter failures end the request; a failed snapshot write does
//! not.

use std::sync::Arc;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, warn};

use super::prediction::ScoredPrediction;
use super::snapshot::SnapshotStore;
use crate::model::{ClassLabelSet, LoadedModel, ModelError};
use crate::vision::{decode_image_bytes, preprocess_for_classifier, ImageError, PresenceDetector, PresenceError};

/// Default confidence at or above which damage snapshots are written
pub const DEFAULT_SNAPSHOT_MIN_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The presence filter cannot run at all; an operator must fix the setup
    #[error("Presence filter misconfigured: {0}")]
    Configuration(#[source] PresenceError),

    #[error("Presence filter failed: {0}")]
    Detection(#[source] PresenceError),

    #[error("Invalid image: {0}")]
    Decode(#[from] ImageError),

    #[error("Classification failed: {0}")]
    Classification(#[from] ModelError),
}

impl From<PresenceError> for PipelineError {
    fn from(e: PresenceError) -> Self {
        if e.is_configuration_error() {
            PipelineError::Configuration(e)
        } else {
            PipelineError::Detection(e)
        }
    }
}

/// Shared, read-only after construction
pub struct InferencePipeline {
    model: LoadedModel,
    presence: Arc<dyn PresenceDetector>,
    snapshots: Option<SnapshotStore>,
    min_confidence: f32,
}

impl InferencePipeline {
    pub fn new(model: LoadedModel, presence: Arc<dyn PresenceDetector>) -> Self {
        Self {
            model,
            presence,
            snapshots: None,
            min_confidence: DEFAULT_SNAPSHOT_MIN_CONFIDENCE,
        }
    }

    pub fn with_snapshots(mut self, store: SnapshotStore) -> Self {
        self.snapshots = Some(store);
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn model(&self) -> &LoadedModel {
        &self.model
    }

    pub fn labels(&self) -> &ClassLabelSet {
        &self.model.labels
    }

    pub fn snapshots(&self) -> Option<&SnapshotStore> {
        self.snapshots.as_ref()
    }

    /// Decode, filter, classify and maybe persist
    pub fn infer(&self, bytes: &[u8]) -> Result<ScoredPrediction, PipelineError> {
        let (frame, info) = decode_image_bytes(bytes)?;
        debug!("Decoded {:?} frame {}x{}", info.format, info.width, info.height);
        self.infer_frame(&frame)
    }

    pub fn infer_frame(&self, frame: &RgbImage) -> Result<ScoredPrediction, PipelineError> {
        let detection = self.presence.detect(frame)?;
        if !detection.found {
            debug!("No vehicle in frame, skipping classifier");
            return Ok(ScoredPrediction::no_object(self.model.labels.len()));
        }

        let mut prediction = self.classify(frame)?;

        if self.should_persist(&prediction) {
            if let Some(store) = &self.snapshots {
                match store.save(frame, &prediction.label, prediction.confidence) {
                    Ok(name) => prediction.saved_filename = Some(name),
                    Err(e) => warn!("Snapshot not saved: {}", e),
                }
            }
        }

        Ok(prediction)
    }

    /// Classifier only, without presence filtering or persistence
    pub fn classify(&self, frame: &RgbImage) -> Result<ScoredPrediction, ModelError> {
        classify_frame(&self.model, frame)
    }

    /// Damage label with confidence at or above the threshold
    pub fn should_persist(&self, prediction: &ScoredPrediction) -> bool {
        prediction.indicates_damage() && prediction.confidence >= self.min_confidence
    }
}

/// Preprocess a frame and score it with a loaded model
pub fn classify_frame(model: &LoadedModel, frame: &RgbImage) -> Result<ScoredPrediction, ModelError> {
    let input = preprocess_for_classifier(frame);
    let probs = model.classifier.probabilities(&input)?;
    ScoredPrediction::from_probabilities(probs, &model.labels)
}

impl std::fmt::Debug for InferencePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferencePipeline")
            .field("model", &self.model)
            .field("snapshots", &self.snapshots)
            .field("min_confidence", &self.min_confidence)
            .finish()
    }
}
