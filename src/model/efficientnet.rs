// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! EfficientNet-B0 backbone
//!
//! Mirrors the torchvision module tree held under a wrapper attribute, so
//! every parameter name starts with `model.`:
//! `model.features.{0..8}`, MBConv blocks at
//! `model.features.{stage}.{i}.block.{k}` and the head at
//! `model.classifier.1` (slot 0 is dropout).

use ndarray::{Array1, Array3, Axis};
use rand::rngs::StdRng;

use super::classifier::Backbone;
use super::error::ModelError;
use super::layers::{global_avg_pool, sigmoid, silu, BatchNorm2d, Conv2d, Linear};
use super::params::ParameterStore;

/// Width of the final feature map
pub const FEATURE_CHANNELS: usize = 1280;

/// One stage of the B0 layout
#[derive(Debug, Clone, Copy)]
pub struct StageConfig {
    pub expand_ratio: usize,
    pub kernel: usize,
    pub stride: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub layers: usize,
}

const fn stage(
    expand_ratio: usize,
    kernel: usize,
    stride: usize,
    in_channels: usize,
    out_channels: usize,
    layers: usize,
) -> StageConfig {
    StageConfig {
        expand_ratio,
        kernel,
        stride,
        in_channels,
        out_channels,
        layers,
    }
}

pub const B0_STAGES: [StageConfig; 7] = [
    stage(1, 3, 1, 32, 16, 1),
    stage(6, 3, 2, 16, 24, 2),
    stage(6, 5, 2, 24, 40, 2),
    stage(6, 3, 2, 40, 80, 3),
    stage(6, 5, 1, 80, 112, 3),
    stage(6, 5, 2, 112, 192, 4),
    stage(6, 3, 1, 192, 320, 1),
];

/// Conv + batch norm, optionally followed by SiLU
struct ConvNormAct {
    conv: Conv2d,
    bn: BatchNorm2d,
    activate: bool,
}

impl ConvNormAct {
    fn new(prefix: &str, conv: Conv2d, channels: usize, activate: bool) -> Self {
        Self {
            conv,
            bn: BatchNorm2d::new(format!("{prefix}.1"), channels),
            activate,
        }
    }

    fn declare(&self, store: &mut ParameterStore, rng: &mut StdRng) {
        self.conv.declare(store, rng);
        self.bn.declare(store);
    }

    fn forward(&self, store: &ParameterStore, x: &Array3<f32>) -> Result<Array3<f32>, ModelError> {
        let mut out = self.conv.forward(store, x)?;
        self.bn.forward(store, &mut out)?;
        if self.activate {
            silu(&mut out);
        }
        Ok(out)
    }
}

struct SqueezeExcitation {
    fc1: Conv2d,
    fc2: Conv2d,
}

impl SqueezeExcitation {
    fn forward(&self, store: &ParameterStore, x: &mut Array3<f32>) -> Result<(), ModelError> {
        let pooled = global_avg_pool(x);
        let pooled = pooled.insert_axis(Axis(1)).insert_axis(Axis(2));

        let mut scale = self.fc1.forward(store, &pooled)?;
        silu(&mut scale);
        let scale = self.fc2.forward(store, &scale)?;

        for (mut plane, s) in x.axis_iter_mut(Axis(0)).zip(scale.iter()) {
            plane *= sigmoid(*s);
        }
        Ok(())
    }
}

struct MbConv {
    expand: Option<ConvNormAct>,
    depthwise: ConvNormAct,
    se: SqueezeExcitation,
    project: ConvNormAct,
    residual: bool,
}

impl MbConv {
    fn new(prefix: &str, cfg: &StageConfig, in_channels: usize, stride: usize) -> Self {
        let expanded = in_channels * cfg.expand_ratio;
        let squeeze = (in_channels / 4).max(1);
        let mut slot = 0;
        let mut next = || {
            let name = format!("{prefix}.block.{slot}");
            slot += 1;
            name
        };

        let expand = (cfg.expand_ratio != 1).then(|| {
            let name = next();
            let conv = Conv2d::new(format!("{name}.0"), in_channels, expanded, 1);
            ConvNormAct::new(&name, conv, expanded, true)
        });

        let name = next();
        let conv = Conv2d::new(format!("{name}.0"), expanded, expanded, cfg.kernel)
            .with_stride(stride)
            .with_groups(expanded);
        let depthwise = ConvNormAct::new(&name, conv, expanded, true);

        let name = next();
        let se = SqueezeExcitation {
            fc1: Conv2d::new(format!("{name}.fc1"), expanded, squeeze, 1).with_bias(),
            fc2: Conv2d::new(format!("{name}.fc2"), squeeze, expanded, 1).with_bias(),
        };

        let name = next();
        let conv = Conv2d::new(format!("{name}.0"), expanded, cfg.out_channels, 1);
        let project = ConvNormAct::new(&name, conv, cfg.out_channels, false);

        Self {
            expand,
            depthwise,
            se,
            project,
            residual: stride == 1 && in_channels == cfg.out_channels,
        }
    }

    fn declare(&self, store: &mut ParameterStore, rng: &mut StdRng) {
        if let Some(expand) = &self.expand {
            expand.declare(store, rng);
        }
        self.depthwise.declare(store, rng);
        self.se.fc1.declare(store, rng);
        self.se.fc2.declare(store, rng);
        self.project.declare(store, rng);
    }

    fn forward(&self, store: &ParameterStore, x: &Array3<f32>) -> Result<Array3<f32>, ModelError> {
        let mut out = match &self.expand {
            Some(expand) => self.depthwise.forward(store, &expand.forward(store, x)?)?,
            None => self.depthwise.forward(store, x)?,
        };
        self.se.forward(store, &mut out)?;
        let mut out = self.project.forward(store, &out)?;
        if self.residual {
            out += x;
        }
        Ok(out)
    }
}

pub struct EfficientNet {
    stem: ConvNormAct,
    blocks: Vec<MbConv>,
    top: ConvNormAct,
    classifier: Linear,
}

impl EfficientNet {
    pub fn b0(num_classes: usize) -> Self {
        Self::with_stages(&B0_STAGES, num_classes)
    }

    pub fn with_stages(stages: &[StageConfig], num_classes: usize) -> Self {
        let stem_channels = stages.first().map(|s| s.in_channels).unwrap_or(32);
        let stem = ConvNormAct::new(
            "model.features.0",
            Conv2d::new("model.features.0.0", 3, stem_channels, 3).with_stride(2),
            stem_channels,
            true,
        );

        let mut blocks = Vec::new();
        let mut in_channels = stem_channels;
        for (s, cfg) in stages.iter().enumerate() {
            for i in 0..cfg.layers {
                let stride = if i == 0 { cfg.stride } else { 1 };
                let prefix = format!("model.features.{}.{}", s + 1, i);
                blocks.push(MbConv::new(&prefix, cfg, in_channels, stride));
                in_channels = cfg.out_channels;
            }
        }

        let top_prefix = format!("model.features.{}", stages.len() + 1);
        let top = ConvNormAct::new(
            &top_prefix,
            Conv2d::new(format!("{top_prefix}.0"), in_channels, FEATURE_CHANNELS, 1),
            FEATURE_CHANNELS,
            true,
        );

        Self {
            stem,
            blocks,
            top,
            classifier: Linear::new("model.classifier.1", FEATURE_CHANNELS, num_classes),
        }
    }

    pub fn declare(&self, store: &mut ParameterStore, rng: &mut StdRng) {
        self.stem.declare(store, rng);
        for block in &self.blocks {
            block.declare(store, rng);
        }
        self.top.declare(store, rng);
        self.classifier.declare(store, rng);
    }
}

impl Backbone for EfficientNet {
    fn forward(&self, params: &ParameterStore, image: &Array3<f32>) -> Result<Array1<f32>, ModelError> {
        let mut x = self.stem.forward(params, image)?;
        for block in &self.blocks {
            x = block.forward(params, &x)?;
        }
        let x = self.top.forward(params, &x)?;
        self.classifier.forward(params, &global_avg_pool(&x))
    }
}
