// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision Module
//!
//! This module provides:
//! - Upload decoding with magic-byte format detection
//! - Classifier preprocessing (224x224, ImageNet normalization)
//! - Cascade-based vehicle presence filtering

pub mod image_utils;
pub mod preprocessing;
pub mod presence;

pub use image_utils::{decode_image_bytes, detect_format, encode_image, ImageError, ImageInfo, MAX_IMAGE_SIZE};
pub use preprocessing::{preprocess_for_classifier, CLASSIFIER_INPUT_SIZE, MEAN, STD};
pub use presence::{
    to_grayscale, BoundingBox, CascadePresenceFilter, DetectionParams, DetectionResult, HaarCascade,
    PresenceDetector, PresenceError,
};
