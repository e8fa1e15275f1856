// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Damage snapshot persistence
//!
//! Files are named `{YYYYMMDD_HHMMSS}_{label}_{percent}.jpg` (UTC). Names are
//! claimed with create-new semantics; a name already taken within the same
//! second gets a `_1`, `_2`, ... suffix.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::{ImageFormat, RgbImage};
use thiserror::Error;
use tracing::{info, warn};

use crate::vision::encode_image;

const MAX_SUFFIX: u32 = 10_000;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode snapshot: {0}")]
    Encode(String),

    #[error("No free snapshot name for {0}")]
    Exhausted(String),
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Spaces and path separators become underscores
    pub fn sanitize_label(label: &str) -> String {
        label
            .chars()
            .map(|c| match c {
                ' ' | '/' | '\\' => '_',
                other => other,
            })
            .collect()
    }

    /// Base name (without collision suffix or extension)
    pub fn stem(timestamp: DateTime<Utc>, label: &str, confidence: f32) -> String {
        let percent = (confidence.clamp(0.0, 1.0) * 100.0).floor() as u32;
        format!(
            "{}_{}_{}",
            timestamp.format("%Y%m%d_%H%M%S"),
            Self::sanitize_label(label),
            percent
        )
    }

    pub fn save(&self, frame: &RgbImage, label: &str, confidence: f32) -> Result<String, SnapshotError> {
        self.save_at(frame, label, confidence, Utc::now())
    }

    /// Write a JPEG snapshot, returning the file name actually used
    pub fn save_at(
        &self,
        frame: &RgbImage,
        label: &str,
        confidence: f32,
        timestamp: DateTime<Utc>,
    ) -> Result<String, SnapshotError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| SnapshotError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let bytes = encode_image(frame, ImageFormat::Jpeg).map_err(|e| SnapshotError::Encode(e.to_string()))?;
        let stem = Self::stem(timestamp, label, confidence);

        for n in 0..MAX_SUFFIX {
            let name = if n == 0 {
                format!("{}.jpg", stem)
            } else {
                format!("{}_{}.jpg", stem, n)
            };
            let path = self.dir.join(&name);

            let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(SnapshotError::Io { path, source }),
            };
            fill_claimed(&path, file, &bytes)?;

            info!("Saved snapshot {}", path.display());
            return Ok(name);
        }

        Err(SnapshotError::Exhausted(stem))
    }
}

/// Write into a freshly claimed file; on failure the name is released
fn fill_claimed<W: Write>(path: &Path, mut file: W, bytes: &[u8]) -> Result<(), SnapshotError> {
    if let Err(source) = file.write_all(bytes).and_then(|_| file.flush()) {
        drop(file);
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove partial snapshot {}: {}", path.display(), e);
        }
        return Err(SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}
