// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Classifier input preprocessing
//!
//! Must match training-time preprocessing exactly: stretch to 224x224,
//! scale to [0, 1], then ImageNet mean/std per channel.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

/// Square input side length of both native architectures
pub const CLASSIFIER_INPUT_SIZE: u32 = 224;

/// ImageNet normalization mean values
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet normalization std values
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Frame to a `[1, 3, 224, 224]` normalized tensor
pub fn preprocess_for_classifier(frame: &RgbImage) -> Array4<f32> {
    preprocess_with_size(frame, CLASSIFIER_INPUT_SIZE)
}

pub fn preprocess_with_size(frame: &RgbImage, size: u32) -> Array4<f32> {
    let resized = if frame.dimensions() == (size, size) {
        frame.clone()
    } else {
        imageops::resize(frame, size, size, FilterType::Triangle)
    };

    let side = size as usize;
    let mut tensor = Array4::zeros((1, 3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c];
        }
    }
    tensor
}
