// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Model loading
//!
//! Load order:
//! 1. class labels (file, or the built-in default set)
//! 2. artifact: an invocable graph is returned immediately
//! 3. architectures flagged by key detection, in detector order
//! 4. every remaining architecture, unconditionally, in detector order
//!
//! The first attempt that loads with enough parameter coverage wins.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use super::architecture::{Architecture, ArchitectureDetector};
use super::artifact::Artifact;
use super::classifier::Classifier;
use super::error::LoadError;
use super::labels::ClassLabelSet;
use super::params::LoadReport;
use crate::weights::{KeyNormalizer, WeightBlob};

/// Default minimum fraction of declared parameters an attempt must match
pub const DEFAULT_MIN_MATCHED_FRACTION: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Attempts below this coverage fail; 0.0 accepts any partial load
    pub min_matched_fraction: f32,
    /// Seed for parameters the blob does not provide
    pub seed: u64,
    pub normalizer: KeyNormalizer,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            min_matched_fraction: DEFAULT_MIN_MATCHED_FRACTION,
            seed: 0,
            normalizer: KeyNormalizer::default(),
        }
    }
}

/// A ready scoring function with its labels and provenance
#[derive(Clone)]
pub struct LoadedModel {
    pub classifier: Arc<dyn Classifier>,
    pub labels: ClassLabelSet,
    /// Architecture that accepted the weights, or `onnx`
    pub architecture: String,
    /// Coverage of the winning attempt; `None` for invocable artifacts
    pub report: Option<LoadReport>,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("architecture", &self.architecture)
            .field("labels", &self.labels)
            .field("report", &self.report)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelLoader {
    detector: ArchitectureDetector,
    config: LoaderConfig,
}

impl ModelLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            detector: ArchitectureDetector::with_defaults(),
            config,
        }
    }

    pub fn with_detector(mut self, detector: ArchitectureDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn detector(&self) -> &ArchitectureDetector {
        &self.detector
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn load(&self, weights: &Path, classes: Option<&Path>) -> Result<LoadedModel, LoadError> {
        let labels = ClassLabelSet::load(classes)?;
        info!("Loaded {} class labels", labels.len());

        match Artifact::read(weights)? {
            Artifact::Invocable(model) => {
                info!("{} is a runnable graph, skipping architecture detection", weights.display());
                Ok(LoadedModel {
                    classifier: Arc::new(model),
                    labels,
                    architecture: "onnx".to_string(),
                    report: None,
                })
            }
            Artifact::Parameters(blob) => self.load_blob(&blob, labels, weights),
        }
    }

    /// Match a parameter blob against the registered architectures
    pub fn load_blob(
        &self,
        blob: &WeightBlob,
        labels: ClassLabelSet,
        origin: &Path,
    ) -> Result<LoadedModel, LoadError> {
        let num_classes = labels.len();
        let mut attempted = Vec::new();
        let mut last_error = String::from("no architectures registered");

        let flagged = self.detector.detect(blob);
        if flagged.is_empty() {
            info!("No architecture markers in {} keys", blob.len());
        }

        // A strategy that already failed is deterministic; the fallback
        // pass only runs the ones not yet tried.
        let mut tried: Vec<&Arc<dyn Architecture>> = Vec::new();
        let ordered = flagged
            .iter()
            .map(|s| (s, "detected"))
            .chain(self.detector.strategies().iter().map(|s| (s, "fallback")));

        for (strategy, phase) in ordered {
            if tried.iter().any(|t| Arc::ptr_eq(t, strategy)) {
                continue;
            }
            tried.push(strategy);
            info!("Trying {} ({})", strategy.name(), phase);
            attempted.push(strategy.name().to_string());

            match self.attempt(strategy.as_ref(), blob, num_classes) {
                Ok(model) => return Ok(LoadedModel { labels, ..model }),
                Err(e) => {
                    warn!("{} ({}) failed: {}", strategy.name(), phase, e);
                    last_error = e;
                }
            }
        }

        Err(LoadError::LoadFailure {
            path: origin.to_path_buf(),
            attempted,
            last_error,
        })
    }

    fn attempt(
        &self,
        strategy: &dyn Architecture,
        blob: &WeightBlob,
        num_classes: usize,
    ) -> Result<LoadedModel, String> {
        let attempt = strategy
            .attempt_load(
                blob,
                num_classes,
                &self.config.normalizer,
                self.config.seed,
                self.config.min_matched_fraction,
            )
            .map_err(|e| e.to_string())?;

        info!(
            "Loaded {} via {} keys: {}/{} parameters matched, {} missing, {} unexpected",
            strategy.name(),
            attempt.variant.as_str(),
            attempt.report.matched,
            attempt.report.expected,
            attempt.report.missing.len(),
            attempt.report.unexpected.len()
        );

        Ok(LoadedModel {
            classifier: Arc::new(attempt.classifier),
            labels: ClassLabelSet::default(),
            architecture: strategy.name().to_string(),
            report: Some(attempt.report),
        })
    }
}

/// Load weights and labels with the default loader
pub fn load_model(weights: impl AsRef<Path>, classes: Option<&Path>) -> Result<LoadedModel, LoadError> {
    ModelLoader::default().load(weights.as_ref(), classes)
}
