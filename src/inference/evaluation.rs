// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Offline accuracy evaluation over an image-folder dataset
//!
//! Layout: `<root>/<label>/<image>`. Directory names are matched against the
//! model's class labels; directories with no matching label are skipped.
//! Only the classifier runs, the presence filter is bypassed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::pipeline::classify_frame;
use crate::model::{LoadedModel, ModelError};
use crate::vision::decode_image_bytes;

const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "bmp", "webp", "gif", "tif", "tiff"];

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Dataset directory not readable at {}: {source}", .path.display())]
    Dataset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Classifier failed on {}: {source}", .path.display())]
    Classifier {
        path: PathBuf,
        #[source]
        source: ModelError,
    },

    #[error("Failed to write report: {0}")]
    Report(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassAccuracy {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub total: usize,
    pub correct: usize,
    /// Percentage in `[0, 100]`
    pub accuracy: f64,
    pub per_class: BTreeMap<String, ClassAccuracy>,
    /// Files or directories that could not be evaluated
    pub skipped: Vec<String>,
}

impl EvaluationReport {
    fn record(&mut self, expected: &str, hit: bool) {
        let entry = self.per_class.entry(expected.to_string()).or_default();
        entry.total += 1;
        self.total += 1;
        if hit {
            entry.correct += 1;
            self.correct += 1;
        }
    }

    fn finish(&mut self) {
        self.accuracy = percent(self.correct, self.total);
        for class in self.per_class.values_mut() {
            class.accuracy = percent(class.correct, class.total);
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<(), EvaluationError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| EvaluationError::Report(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| EvaluationError::Report(format!("{}: {}", path.display(), e)))?;
        info!("Evaluation report written to {}", path.display());
        Ok(())
    }
}

fn percent(correct: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * correct as f64 / total as f64
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, EvaluationError> {
    let entries = std::fs::read_dir(dir).map_err(|source| EvaluationError::Dataset {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| EvaluationError::Dataset {
            path: dir.to_path_buf(),
            source,
        })?;
    paths.sort();
    Ok(paths)
}

/// Classify every image under `root` and tally accuracy per class
pub fn evaluate_dataset(model: &LoadedModel, root: &Path) -> Result<EvaluationReport, EvaluationError> {
    let mut report = EvaluationReport::default();

    for class_dir in sorted_entries(root)? {
        if !class_dir.is_dir() {
            continue;
        }
        let Some(expected) = class_dir.file_name().and_then(|n| n.to_str()).map(String::from) else {
            continue;
        };
        if model.labels.position(&expected).is_none() {
            warn!("Skipping {}: not a known class", class_dir.display());
            report.skipped.push(class_dir.display().to_string());
            continue;
        }

        for path in sorted_entries(&class_dir)? {
            if !path.is_file() || !is_image(&path) {
                continue;
            }

            let frame = match std::fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| decode_image_bytes(&bytes).map_err(|e| e.to_string()))
            {
                Ok((frame, _)) => frame,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    report.skipped.push(path.display().to_string());
                    continue;
                }
            };

            let prediction = classify_frame(model, &frame).map_err(|source| EvaluationError::Classifier {
                path: path.clone(),
                source,
            })?;
            debug!("{} -> {} ({:.3})", path.display(), prediction.label, prediction.confidence);
            report.record(&expected, prediction.label == expected);
        }
    }

    report.finish();
    info!(
        "Evaluated {} images: {} correct ({:.2}%)",
        report.total, report.correct, report.accuracy
    );
    Ok(report)
}
