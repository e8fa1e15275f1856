// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ResNet-50 backbone with a dropout + linear head
//!
//! Parameter names follow the torchvision layout (`conv1`, `bn1`,
//! `layer{1..4}.{i}.conv{1,2,3}`, `downsample.{0,1}`) so checkpoints exported
//! from training load without renaming. The classification head sits at
//! `fc.1` because slot `fc.0` is the (parameterless) dropout.

use ndarray::{Array1, Array3};
use rand::rngs::StdRng;

use super::classifier::Backbone;
use super::error::ModelError;
use super::layers::{global_avg_pool, max_pool2d, relu, BatchNorm2d, Conv2d, Linear};
use super::params::ParameterStore;

const EXPANSION: usize = 4;

/// Bottleneck counts per stage for ResNet-50
pub const RESNET50_BLOCKS: [usize; 4] = [3, 4, 6, 3];

struct Bottleneck {
    conv1: Conv2d,
    bn1: BatchNorm2d,
    conv2: Conv2d,
    bn2: BatchNorm2d,
    conv3: Conv2d,
    bn3: BatchNorm2d,
    downsample: Option<(Conv2d, BatchNorm2d)>,
}

impl Bottleneck {
    fn new(prefix: &str, in_channels: usize, width: usize, stride: usize) -> Self {
        let out_channels = width * EXPANSION;
        let downsample = (stride != 1 || in_channels != out_channels).then(|| {
            (
                Conv2d::new(format!("{prefix}.downsample.0"), in_channels, out_channels, 1)
                    .with_stride(stride),
                BatchNorm2d::new(format!("{prefix}.downsample.1"), out_channels),
            )
        });

        Self {
            conv1: Conv2d::new(format!("{prefix}.conv1"), in_channels, width, 1),
            bn1: BatchNorm2d::new(format!("{prefix}.bn1"), width),
            conv2: Conv2d::new(format!("{prefix}.conv2"), width, width, 3).with_stride(stride),
            bn2: BatchNorm2d::new(format!("{prefix}.bn2"), width),
            conv3: Conv2d::new(format!("{prefix}.conv3"), width, out_channels, 1),
            bn3: BatchNorm2d::new(format!("{prefix}.bn3"), out_channels),
            downsample,
        }
    }

    fn declare(&self, store: &mut ParameterStore, rng: &mut StdRng) {
        self.conv1.declare(store, rng);
        self.bn1.declare(store);
        self.conv2.declare(store, rng);
        self.bn2.declare(store);
        self.conv3.declare(store, rng);
        self.bn3.declare(store);
        if let Some((conv, bn)) = &self.downsample {
            conv.declare(store, rng);
            bn.declare(store);
        }
    }

    fn forward(&self, store: &ParameterStore, x: &Array3<f32>) -> Result<Array3<f32>, ModelError> {
        let mut out = self.conv1.forward(store, x)?;
        self.bn1.forward(store, &mut out)?;
        relu(&mut out);

        let mut out = self.conv2.forward(store, &out)?;
        self.bn2.forward(store, &mut out)?;
        relu(&mut out);

        let mut out = self.conv3.forward(store, &out)?;
        self.bn3.forward(store, &mut out)?;

        match &self.downsample {
            Some((conv, bn)) => {
                let mut identity = conv.forward(store, x)?;
                bn.forward(store, &mut identity)?;
                out += &identity;
            }
            None => out += x,
        }
        relu(&mut out);
        Ok(out)
    }
}

pub struct ResNet {
    conv1: Conv2d,
    bn1: BatchNorm2d,
    stages: Vec<Vec<Bottleneck>>,
    fc: Linear,
}

impl ResNet {
    pub fn resnet50(num_classes: usize) -> Self {
        Self::with_blocks(RESNET50_BLOCKS, num_classes)
    }

    /// Bottleneck ResNet with `blocks[i]` blocks in `layer{i+1}`
    pub fn with_blocks(blocks: [usize; 4], num_classes: usize) -> Self {
        let widths = [64, 128, 256, 512];
        let mut in_channels = 64;
        let mut stages = Vec::with_capacity(4);

        for (i, (&count, &width)) in blocks.iter().zip(widths.iter()).enumerate() {
            let stage_stride = if i == 0 { 1 } else { 2 };
            let stage = (0..count)
                .map(|b| {
                    let stride = if b == 0 { stage_stride } else { 1 };
                    let block = Bottleneck::new(&format!("layer{}.{}", i + 1, b), in_channels, width, stride);
                    in_channels = width * EXPANSION;
                    block
                })
                .collect();
            stages.push(stage);
        }

        Self {
            conv1: Conv2d::new("conv1", 3, 64, 7).with_stride(2).with_padding(3),
            bn1: BatchNorm2d::new("bn1", 64),
            stages,
            fc: Linear::new("fc.1", in_channels, num_classes),
        }
    }

    pub fn declare(&self, store: &mut ParameterStore, rng: &mut StdRng) {
        self.conv1.declare(store, rng);
        self.bn1.declare(store);
        for block in self.stages.iter().flatten() {
            block.declare(store, rng);
        }
        self.fc.declare(store, rng);
    }
}

impl Backbone for ResNet {
    fn forward(&self, params: &ParameterStore, image: &Array3<f32>) -> Result<Array1<f32>, ModelError> {
        let mut x = self.conv1.forward(params, image)?;
        self.bn1.forward(params, &mut x)?;
        relu(&mut x);
        let mut x = max_pool2d(&x, 3, 2, 1);

        for block in self.stages.iter().flatten() {
            x = block.forward(params, &x)?;
        }

        let pooled = global_avg_pool(&x);
        self.fc.forward(params, &pooled)
    }
}
