// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// tests/common/mod.rs - Shared fixtures for integration tests
#![allow(dead_code)]

use car_damage_node::model::layers::{global_avg_pool, Linear};
use car_damage_node::model::{
    Architecture, Backbone, ClassLabelSet, Classifier, LoadedModel, ModelError, NativeClassifier,
    ParameterStore,
};
use car_damage_node::vision::encode_image;
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::{Array1, Array2, Array3, Array4};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One stage, one stump, both leaves positive: every textured window passes
pub const ALWAYS_PASS_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>20</height>
  <width>20</width>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>0 -1 0 0.5</internalNodes>
          <leafValues>1. 1.</leafValues>
        </_>
      </weakClassifiers>
    </_>
  </stages>
  <features>
    <_>
      <rects>
        <_>0 0 20 10 -1.</_>
        <_>0 10 20 10 1.</_>
      </rects>
    </_>
  </features>
</cascade>
</opencv_storage>
"#;

/// Same shape, negative leaves: nothing ever passes
pub fn never_pass_cascade() -> String {
    ALWAYS_PASS_CASCADE.replace("<leafValues>1. 1.</leafValues>", "<leafValues>-1. -1.</leafValues>")
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write fixture");
    path
}

/// High-contrast frame; flat frames never trigger the cascade
pub fn checkerboard(width: u32, height: u32, cell: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        if ((x / cell) + (y / cell)) % 2 == 0 {
            Rgb([20, 20, 20])
        } else {
            Rgb([235, 235, 235])
        }
    })
}

pub fn png_bytes(frame: &RgbImage) -> Vec<u8> {
    encode_image(frame, ImageFormat::Png).expect("encode png")
}

pub fn jpeg_bytes(frame: &RgbImage) -> Vec<u8> {
    encode_image(frame, ImageFormat::Jpeg).expect("encode jpeg")
}

/// Classifier returning the same logits for every input
pub struct FixedLogits {
    pub logits: Vec<f32>,
    pub calls: AtomicUsize,
}

impl FixedLogits {
    pub fn new(logits: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            logits,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for FixedLogits {
    fn name(&self) -> &str {
        "fixed"
    }

    fn logits(&self, batch: &Array4<f32>) -> Result<Array2<f32>, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let rows = batch.shape()[0];
        let flat: Vec<f32> = (0..rows).flat_map(|_| self.logits.iter().copied()).collect();
        Ok(Array2::from_shape_vec((rows, self.logits.len()), flat)?)
    }
}

pub fn fixed_model(classifier: Arc<FixedLogits>) -> LoadedModel {
    LoadedModel {
        classifier,
        labels: ClassLabelSet::default(),
        architecture: "fixed".to_string(),
        report: None,
    }
}

/// Pooled RGB means through a single linear layer
pub struct PooledHead {
    head: Linear,
}

impl Backbone for PooledHead {
    fn forward(&self, params: &ParameterStore, image: &Array3<f32>) -> Result<Array1<f32>, ModelError> {
        self.head.forward(params, &global_avg_pool(image))
    }
}

/// Minimal architecture: `{layer}.weight` `[n, 3]` and `{layer}.bias` `[n]`,
/// flagged by any key containing `marker`
pub struct TinyStrategy {
    pub name: &'static str,
    pub layer: &'static str,
    pub marker: &'static str,
}

impl Architecture for TinyStrategy {
    fn name(&self) -> &str {
        self.name
    }

    fn recognizes(&self, key: &str) -> bool {
        key.contains(self.marker)
    }

    fn instantiate(&self, num_classes: usize, seed: u64) -> Result<NativeClassifier, ModelError> {
        let head = Linear::new(self.layer, 3, num_classes);
        let mut params = ParameterStore::new();
        head.declare(&mut params, &mut StdRng::seed_from_u64(seed));
        Ok(NativeClassifier::new(self.name, Box::new(PooledHead { head }), params))
    }
}
