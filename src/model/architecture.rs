// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Architecture strategies and key-pattern detection
//!
//! Each supported network is an [`Architecture`]: it recognizes its own
//! parameter names, builds a fresh instance, and knows how to attempt a
//! partial load of a weight blob. The [`ArchitectureDetector`] is an ordered
//! list of strategies; detection is advisory and callers fall back to the
//! full list when nothing (or nothing useful) is flagged.

use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::classifier::NativeClassifier;
use super::efficientnet::EfficientNet;
use super::error::ModelError;
use super::params::{LoadReport, ParameterStore};
use super::resnet::ResNet;
use crate::weights::{CandidateVariant, KeyNormalizer, WeightBlob};

/// Built-in architecture families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchitectureKind {
    ResNetLike,
    EfficientNetLike,
}

impl ArchitectureKind {
    /// Fallback order
    pub const ALL: [ArchitectureKind; 2] = [ArchitectureKind::ResNetLike, ArchitectureKind::EfficientNetLike];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ResNetLike => "resnet50",
            Self::EfficientNetLike => "efficientnet_b0",
        }
    }

    pub fn strategy(&self) -> Arc<dyn Architecture> {
        match self {
            Self::ResNetLike => Arc::new(ResNetStrategy),
            Self::EfficientNetLike => Arc::new(EfficientNetStrategy),
        }
    }
}

impl fmt::Display for ArchitectureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A successful load attempt
#[derive(Debug)]
pub struct LoadAttempt {
    pub classifier: NativeClassifier,
    pub report: LoadReport,
    pub variant: CandidateVariant,
}

/// A pluggable network family
pub trait Architecture: Send + Sync {
    fn name(&self) -> &str;

    /// Whether a parameter name looks like it was produced by this family
    fn recognizes(&self, key: &str) -> bool;

    /// Fresh, deterministically initialised instance sized for `num_classes`
    fn instantiate(&self, num_classes: usize, seed: u64) -> Result<NativeClassifier, ModelError>;

    /// Try every normalizer candidate (filtered, then full) until one loads
    /// with at least `min_fraction` of the declared parameters matched.
    fn attempt_load(
        &self,
        blob: &WeightBlob,
        num_classes: usize,
        normalizer: &KeyNormalizer,
        seed: u64,
        min_fraction: f32,
    ) -> Result<LoadAttempt, ModelError> {
        let mut classifier = self.instantiate(num_classes, seed)?;
        let fresh = classifier.parameters().clone();
        let expected = fresh.expected_keys();
        let mut last_error = None;

        for candidate in normalizer.candidates(blob, &expected) {
            for weights in candidate.attempts() {
                let mut params = fresh.clone();
                match params.load_partial(weights) {
                    Ok(report) if report.expected > 0 && report.matched_fraction() >= min_fraction => {
                        if !report.is_complete() {
                            warn!(
                                "{}: partial load via {} keys, {}/{} parameters matched, {} unexpected",
                                self.name(),
                                candidate.variant.as_str(),
                                report.matched,
                                report.expected,
                                report.unexpected.len()
                            );
                        }
                        *classifier.parameters_mut() = params;
                        return Ok(LoadAttempt {
                            classifier,
                            report,
                            variant: candidate.variant,
                        });
                    }
                    Ok(report) => {
                        debug!(
                            "{}: {} keys matched {}/{}",
                            self.name(),
                            candidate.variant.as_str(),
                            report.matched,
                            report.expected
                        );
                        last_error = Some(ModelError::InsufficientCoverage {
                            matched: report.matched,
                            expected: report.expected,
                            minimum: min_fraction,
                        });
                    }
                    Err(e) => {
                        debug!("{}: {} keys rejected: {}", self.name(), candidate.variant.as_str(), e);
                        last_error = Some(e);
                    }
                }
            }
        }

        Err(last_error.unwrap_or(ModelError::InsufficientCoverage {
            matched: 0,
            expected: expected.len(),
            minimum: min_fraction,
        }))
    }
}

/// ResNet-50 with a dropout + linear head
#[derive(Debug, Clone, Copy, Default)]
pub struct ResNetStrategy;

impl Architecture for ResNetStrategy {
    fn name(&self) -> &str {
        ArchitectureKind::ResNetLike.name()
    }

    fn recognizes(&self, key: &str) -> bool {
        key.contains("layer1.")
            || key.contains("conv1.weight")
            || key.starts_with("model.layer")
            || key.contains("model.conv1")
    }

    fn instantiate(&self, num_classes: usize, seed: u64) -> Result<NativeClassifier, ModelError> {
        let net = ResNet::resnet50(num_classes);
        let mut params = ParameterStore::new();
        net.declare(&mut params, &mut StdRng::seed_from_u64(seed));
        Ok(NativeClassifier::new(self.name(), Box::new(net), params))
    }
}

/// EfficientNet-B0 held under a `model.` wrapper
#[derive(Debug, Clone, Copy, Default)]
pub struct EfficientNetStrategy;

impl Architecture for EfficientNetStrategy {
    fn name(&self) -> &str {
        ArchitectureKind::EfficientNetLike.name()
    }

    fn recognizes(&self, key: &str) -> bool {
        key.contains("features.") || key.contains("model.features") || key.contains("efficientnet")
    }

    fn instantiate(&self, num_classes: usize, seed: u64) -> Result<NativeClassifier, ModelError> {
        let net = EfficientNet::b0(num_classes);
        let mut params = ParameterStore::new();
        net.declare(&mut params, &mut StdRng::seed_from_u64(seed));
        Ok(NativeClassifier::new(self.name(), Box::new(net), params))
    }
}

/// Ordered strategy list
#[derive(Clone)]
pub struct ArchitectureDetector {
    strategies: Vec<Arc<dyn Architecture>>,
}

impl Default for ArchitectureDetector {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ArchitectureDetector {
    /// ResNetLike, then EfficientNetLike
    pub fn with_defaults() -> Self {
        Self::new(ArchitectureKind::ALL.iter().map(|k| k.strategy()).collect())
    }

    pub fn new(strategies: Vec<Arc<dyn Architecture>>) -> Self {
        Self { strategies }
    }

    /// Append a strategy after the built-in ones
    pub fn register(&mut self, strategy: Arc<dyn Architecture>) {
        self.strategies.push(strategy);
    }

    pub fn strategies(&self) -> &[Arc<dyn Architecture>] {
        &self.strategies
    }

    /// Strategies flagged by at least one key, in list order
    pub fn detect(&self, blob: &WeightBlob) -> Vec<Arc<dyn Architecture>> {
        self.strategies
            .iter()
            .filter(|s| blob.keys().any(|k| s.recognizes(k)))
            .cloned()
            .collect()
    }

    /// Built-in families flagged by `blob`
    pub fn detect_kinds(blob: &WeightBlob) -> Vec<ArchitectureKind> {
        ArchitectureKind::ALL
            .into_iter()
            .filter(|k| {
                let strategy = k.strategy();
                blob.keys().any(|key| strategy.recognizes(key))
            })
            .collect()
    }
}

impl fmt::Debug for ArchitectureDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.strategies.iter().map(|s| s.name().to_string()))
            .finish()
    }
}
