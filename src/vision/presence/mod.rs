// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vehicle presence filter
//!
//! A classical cascade detector gates the classifier: frames without a
//! vehicle are rejected before the network runs. The cascade resource is
//! loaded lazily on first use, exactly once per filter, and shared
//! read-only afterwards.

pub mod cascade;
pub mod grouping;
pub mod integral;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub use cascade::{CascadeError, HaarCascade};

/// Errors raised by a presence detector
#[derive(Debug, Error)]
pub enum PresenceError {
    /// Configuration error: the cascade file does not exist
    #[error("Car cascade not found at: {}", .0.display())]
    ResourceMissing(PathBuf),

    /// Configuration error: the cascade file is present but unusable
    #[error("Failed to load cascade classifier from {}: {reason}", .path.display())]
    ResourceInvalid { path: PathBuf, reason: String },

    #[error("Invalid detection parameters: {0}")]
    InvalidParameters(String),

    /// Runtime failure inside a detector; the request fails, the setup is fine
    #[error("Detector failed: {0}")]
    Failed(String),
}

impl PresenceError {
    /// Operator setup defects that no retry of the request will fix
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PresenceError::ResourceMissing(_)
                | PresenceError::ResourceInvalid { .. }
                | PresenceError::InvalidParameters(_)
        )
    }
}

/// Integer region `(x, y, width, height)`, serialized as `[x, y, w, h]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl From<[i32; 4]> for BoundingBox {
    fn from([x, y, width, height]: [i32; 4]) -> Self {
        Self { x, y, width, height }
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub found: bool,
    pub boxes: Vec<BoundingBox>,
}

impl DetectionResult {
    pub fn from_boxes(boxes: Vec<BoundingBox>) -> Self {
        Self {
            found: !boxes.is_empty(),
            boxes,
        }
    }
}

/// Multi-scale sliding-window parameters
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionParams {
    /// Pyramid step, must exceed 1.0
    pub scale_factor: f64,
    /// Raw hits a cluster needs beyond this count to survive grouping
    pub min_neighbors: usize,
    /// Smallest window reported, in pixels
    pub min_size: (u32, u32),
    /// Largest window searched; defaults to the frame size
    pub max_size: Option<(u32, u32)>,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 3,
            min_size: (60, 60),
            max_size: None,
        }
    }
}

impl DetectionParams {
    pub fn validate(&self) -> Result<(), PresenceError> {
        if !self.scale_factor.is_finite() || self.scale_factor <= 1.0 {
            return Err(PresenceError::InvalidParameters(format!(
                "scale_factor must be greater than 1.0, got {}",
                self.scale_factor
            )));
        }
        if self.min_size.0 == 0 || self.min_size.1 == 0 {
            return Err(PresenceError::InvalidParameters(
                "min_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// "Does this frame contain a vehicle?"
pub trait PresenceDetector: Send + Sync {
    fn detect(&self, frame: &RgbImage) -> Result<DetectionResult, PresenceError>;
}

/// Single-channel intensity with BT.601 fixed-point weights
pub fn to_grayscale(frame: &RgbImage) -> GrayImage {
    GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let p = frame.get_pixel(x, y);
        let (r, g, b) = (p[0] as u32, p[1] as u32, p[2] as u32);
        Luma([((r * 4899 + g * 9617 + b * 1868 + 8192) >> 14) as u8])
    })
}

/// Cascade-backed presence filter with lazy, once-only resource loading
pub struct CascadePresenceFilter {
    path: PathBuf,
    params: DetectionParams,
    cascade: OnceLock<Arc<HaarCascade>>,
    init_lock: Mutex<()>,
    loads: AtomicUsize,
}

impl CascadePresenceFilter {
    pub fn new(path: impl Into<PathBuf>, params: DetectionParams) -> Result<Self, PresenceError> {
        params.validate()?;
        Ok(Self {
            path: path.into(),
            params,
            cascade: OnceLock::new(),
            init_lock: Mutex::new(()),
            loads: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    pub fn is_initialized(&self) -> bool {
        self.cascade.get().is_some()
    }

    /// Number of times the resource was read from disk
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// The shared cascade, loading it on first use.
    ///
    /// Concurrent first callers serialize on the init lock; a failed load
    /// is not cached, so the next call tries again.
    pub fn cascade(&self) -> Result<Arc<HaarCascade>, PresenceError> {
        if let Some(cascade) = self.cascade.get() {
            return Ok(cascade.clone());
        }

        // the lock guards no data; a panicked loader leaves nothing to repair
        let _guard = self.init_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cascade) = self.cascade.get() {
            return Ok(cascade.clone());
        }

        if !self.path.exists() {
            return Err(PresenceError::ResourceMissing(self.path.clone()));
        }

        self.loads.fetch_add(1, Ordering::SeqCst);
        let cascade = HaarCascade::from_file(&self.path).map_err(|e| PresenceError::ResourceInvalid {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        info!(
            "Loaded car cascade from {} ({} stages, {}x{} window)",
            self.path.display(),
            cascade.stage_count(),
            cascade.window().0,
            cascade.window().1
        );

        let cascade = Arc::new(cascade);
        let _ = self.cascade.set(cascade.clone());
        Ok(cascade)
    }
}

impl PresenceDetector for CascadePresenceFilter {
    fn detect(&self, frame: &RgbImage) -> Result<DetectionResult, PresenceError> {
        let cascade = self.cascade()?;
        let gray = to_grayscale(frame);
        let boxes = cascade.detect_multi_scale(&gray, &self.params);
        debug!("Presence filter: {} regions", boxes.len());
        Ok(DetectionResult::from_boxes(boxes))
    }
}

impl std::fmt::Debug for CascadePresenceFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadePresenceFilter")
            .field("path", &self.path)
            .field("params", &self.params)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
