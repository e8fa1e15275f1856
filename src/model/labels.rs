// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Ordered class labels

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::LoadError;

/// Labels used when no class list file is available, in output-index order
pub const DEFAULT_CLASSES: [&str; 6] = [
    "Front Normal",
    "Front Breakage",
    "Front Crushed",
    "Rear Normal",
    "Rear Breakage",
    "Rear Crushed",
];

/// Index-significant label list: output `i` of the classifier is `labels[i]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassLabelSet {
    labels: Vec<String>,
}

impl Default for ClassLabelSet {
    fn default() -> Self {
        Self {
            labels: DEFAULT_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ClassLabelSet {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Read a newline-delimited list. Missing, unset or empty files give the
    /// default set; other read failures are errors.
    pub fn load(path: Option<&Path>) -> Result<Self, LoadError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Class list {} not found, using default labels", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(LoadError::ClassList {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let labels = Self::parse(&text);
        if labels.is_empty() {
            info!("Class list {} is empty, using default labels", path.display());
            return Ok(Self::default());
        }
        Ok(labels)
    }

    /// One label per line, trimmed, blank lines skipped
    pub fn parse(text: &str) -> Self {
        Self {
            labels: text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    /// Label for an output index, or the index itself when out of range
    pub fn label_for(&self, index: usize) -> String {
        self.labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| index.to_string())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }
}
