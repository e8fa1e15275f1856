// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Damage classifier: architectures, weight loading and scoring
//!
//! This module provides:
//! - Native ResNet-50 and EfficientNet-B0 graphs evaluated with ndarray
//! - ONNX Runtime execution for fully exported graphs
//! - Architecture detection from parameter names
//! - Permissive, multi-candidate weight loading with coverage reporting

pub mod architecture;
pub mod artifact;
pub mod classifier;
pub mod efficientnet;
pub mod error;
pub mod labels;
pub mod layers;
pub mod loader;
pub mod onnx;
pub mod params;
pub mod resnet;

pub use architecture::{
    Architecture, ArchitectureDetector, ArchitectureKind, EfficientNetStrategy, LoadAttempt,
    ResNetStrategy,
};
pub use artifact::Artifact;
pub use classifier::{argmax, softmax, Backbone, Classifier, NativeClassifier};
pub use error::{LoadError, ModelError};
pub use labels::{ClassLabelSet, DEFAULT_CLASSES};
pub use loader::{load_model, LoadedModel, LoaderConfig, ModelLoader, DEFAULT_MIN_MATCHED_FRACTION};
pub use onnx::OnnxClassifier;
pub use params::{LoadReport, ParameterStore};
