// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Export all submodules and their public types
pub mod evaluation;
pub mod pipeline;
pub mod prediction;
pub mod snapshot;

// Re-export main types for convenience
pub use evaluation::{evaluate_dataset, ClassAccuracy, EvaluationError, EvaluationReport};
pub use pipeline::{classify_frame, InferencePipeline, PipelineError, DEFAULT_SNAPSHOT_MIN_CONFIDENCE};
pub use prediction::{ScoredPrediction, NO_OBJECT_LABEL};
pub use snapshot::{SnapshotError, SnapshotStore};
