// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod cli;
pub mod config;
pub mod inference;
pub mod model;
pub mod monitoring;
pub mod version;
pub mod vision;
pub mod weights;

// Re-export main types for convenience
pub use inference::{InferencePipeline, PipelineError, ScoredPrediction};
pub use model::{load_model, LoadError, LoadedModel, ModelLoader};
pub use vision::{CascadePresenceFilter, DetectionParams, PresenceDetector};
pub use weights::{KeyNormalizer, WeightBlob};
