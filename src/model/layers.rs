// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Inference-only layers over `ndarray`
//!
//! Activations are single images in CHW layout (`Array3<f32>`). Each layer
//! knows its parameter names and shapes; the values live in a
//! [`ParameterStore`] so weights can be swapped by name.

use ndarray::{s, Array1, Array2, Array3, ArrayD, ArrayView3, Axis, IxDyn};
use rand::rngs::StdRng;

use super::error::ModelError;
use super::params::{fan_in_uniform, kaiming_uniform, ParameterStore};

#[derive(Debug, Clone)]
pub struct Conv2d {
    name: String,
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    groups: usize,
    bias: bool,
}

impl Conv2d {
    /// Square kernel, stride 1, "same" padding, no bias
    pub fn new(name: impl Into<String>, in_channels: usize, out_channels: usize, kernel: usize) -> Self {
        Self {
            name: name.into(),
            in_channels,
            out_channels,
            kernel,
            stride: 1,
            padding: (kernel - 1) / 2,
            groups: 1,
            bias: false,
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_bias(mut self) -> Self {
        self.bias = true;
        self
    }

    fn weight_key(&self) -> String {
        format!("{}.weight", self.name)
    }

    fn bias_key(&self) -> String {
        format!("{}.bias", self.name)
    }

    pub fn declare(&self, store: &mut ParameterStore, rng: &mut StdRng) {
        let per_group = self.in_channels / self.groups;
        let shape = [self.out_channels, per_group, self.kernel, self.kernel];
        let fan_out = self.out_channels / self.groups * self.kernel * self.kernel;
        store.insert(self.weight_key(), kaiming_uniform(&shape, fan_out, rng));
        if self.bias {
            let fan_in = per_group * self.kernel * self.kernel;
            store.insert(self.bias_key(), fan_in_uniform(&[self.out_channels], fan_in, rng));
        }
    }

    pub fn forward(&self, store: &ParameterStore, x: &Array3<f32>) -> Result<Array3<f32>, ModelError> {
        let weight = store.view4(&self.weight_key())?;
        let (c, h, w) = x.dim();
        let (o, per_group, kh, kw) = weight.dim();

        if c != per_group * self.groups || o % self.groups != 0 {
            return Err(ModelError::InvalidInput(format!(
                "{}: {} input channels for weight {:?} with {} groups",
                self.name,
                c,
                weight.shape(),
                self.groups
            )));
        }
        if h + 2 * self.padding < kh || w + 2 * self.padding < kw {
            return Err(ModelError::InvalidInput(format!(
                "{}: input {}x{} smaller than kernel",
                self.name, h, w
            )));
        }

        let ho = (h + 2 * self.padding - kh) / self.stride + 1;
        let wo = (w + 2 * self.padding - kw) / self.stride + 1;
        let out_per_group = o / self.groups;

        let mut out = Array3::<f32>::zeros((o, ho, wo));
        for g in 0..self.groups {
            let xs = x.slice(s![g * per_group..(g + 1) * per_group, .., ..]);
            let cols = im2col(xs, kh, kw, self.stride, self.padding, ho, wo);
            let wg = weight.slice(s![g * out_per_group..(g + 1) * out_per_group, .., .., ..]);
            let wg = wg.to_shape((out_per_group, per_group * kh * kw))?;
            let res = wg.dot(&cols).into_shape_with_order((out_per_group, ho, wo))?;
            out.slice_mut(s![g * out_per_group..(g + 1) * out_per_group, .., ..])
                .assign(&res);
        }

        if self.bias {
            let bias = store.view1(&self.bias_key())?;
            for (mut plane, b) in out.axis_iter_mut(Axis(0)).zip(bias.iter()) {
                plane += *b;
            }
        }

        Ok(out)
    }
}

/// Unfold patches into columns: (C*kh*kw, ho*wo)
fn im2col(
    x: ArrayView3<f32>,
    kh: usize,
    kw: usize,
    stride: usize,
    padding: usize,
    ho: usize,
    wo: usize,
) -> Array2<f32> {
    let (c, h, w) = x.dim();

    if kh == 1 && kw == 1 && stride == 1 && padding == 0 {
        let mut cols = Array2::zeros((c, h * w));
        for (mut row, plane) in cols.outer_iter_mut().zip(x.outer_iter()) {
            row.iter_mut().zip(plane.iter()).for_each(|(d, s)| *d = *s);
        }
        return cols;
    }

    let mut cols = Array2::<f32>::zeros((c * kh * kw, ho * wo));
    for ci in 0..c {
        for ki in 0..kh {
            for kj in 0..kw {
                let mut row = cols.row_mut((ci * kh + ki) * kw + kj);
                for oy in 0..ho {
                    let iy = (oy * stride + ki) as isize - padding as isize;
                    if iy < 0 || iy >= h as isize {
                        continue;
                    }
                    for ox in 0..wo {
                        let ix = (ox * stride + kj) as isize - padding as isize;
                        if ix < 0 || ix >= w as isize {
                            continue;
                        }
                        row[oy * wo + ox] = x[[ci, iy as usize, ix as usize]];
                    }
                }
            }
        }
    }
    cols
}

/// Batch norm in evaluation mode (running statistics)
#[derive(Debug, Clone)]
pub struct BatchNorm2d {
    name: String,
    channels: usize,
    eps: f32,
}

impl BatchNorm2d {
    pub fn new(name: impl Into<String>, channels: usize) -> Self {
        Self {
            name: name.into(),
            channels,
            eps: 1e-5,
        }
    }

    pub fn declare(&self, store: &mut ParameterStore) {
        let n = self.channels;
        store.insert(format!("{}.weight", self.name), ArrayD::ones(IxDyn(&[n])));
        store.insert(format!("{}.bias", self.name), ArrayD::zeros(IxDyn(&[n])));
        store.insert(format!("{}.running_mean", self.name), ArrayD::zeros(IxDyn(&[n])));
        store.insert(format!("{}.running_var", self.name), ArrayD::ones(IxDyn(&[n])));
        store.insert(format!("{}.num_batches_tracked", self.name), ArrayD::zeros(IxDyn(&[])));
    }

    pub fn forward(&self, store: &ParameterStore, x: &mut Array3<f32>) -> Result<(), ModelError> {
        let gamma = store.view1(&format!("{}.weight", self.name))?;
        let beta = store.view1(&format!("{}.bias", self.name))?;
        let mean = store.view1(&format!("{}.running_mean", self.name))?;
        let var = store.view1(&format!("{}.running_var", self.name))?;

        if x.dim().0 != gamma.len() {
            return Err(ModelError::InvalidInput(format!(
                "{}: {} channels, expected {}",
                self.name,
                x.dim().0,
                gamma.len()
            )));
        }

        for (ci, mut plane) in x.axis_iter_mut(Axis(0)).enumerate() {
            let scale = gamma[ci] / (var[ci] + self.eps).sqrt();
            let shift = beta[ci] - mean[ci] * scale;
            plane.mapv_inplace(|v| v * scale + shift);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Linear {
    name: String,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    pub fn new(name: impl Into<String>, in_features: usize, out_features: usize) -> Self {
        Self {
            name: name.into(),
            in_features,
            out_features,
        }
    }

    pub fn declare(&self, store: &mut ParameterStore, rng: &mut StdRng) {
        let shape = [self.out_features, self.in_features];
        store.insert(
            format!("{}.weight", self.name),
            fan_in_uniform(&shape, self.in_features, rng),
        );
        store.insert(
            format!("{}.bias", self.name),
            fan_in_uniform(&[self.out_features], self.in_features, rng),
        );
    }

    pub fn forward(&self, store: &ParameterStore, x: &Array1<f32>) -> Result<Array1<f32>, ModelError> {
        let weight = store.view2(&format!("{}.weight", self.name))?;
        let bias = store.view1(&format!("{}.bias", self.name))?;
        if weight.ncols() != x.len() {
            return Err(ModelError::InvalidInput(format!(
                "{}: {} features, expected {}",
                self.name,
                x.len(),
                weight.ncols()
            )));
        }
        Ok(weight.dot(x) + &bias)
    }
}

pub fn relu(x: &mut Array3<f32>) {
    x.mapv_inplace(|v| v.max(0.0));
}

pub fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

pub fn silu(x: &mut Array3<f32>) {
    x.mapv_inplace(|v| v * sigmoid(v));
}

pub fn max_pool2d(x: &Array3<f32>, kernel: usize, stride: usize, padding: usize) -> Array3<f32> {
    let (c, h, w) = x.dim();
    let ho = (h + 2 * padding - kernel) / stride + 1;
    let wo = (w + 2 * padding - kernel) / stride + 1;

    let mut out = Array3::from_elem((c, ho, wo), f32::NEG_INFINITY);
    for ci in 0..c {
        for oy in 0..ho {
            for ox in 0..wo {
                let mut best = f32::NEG_INFINITY;
                for ki in 0..kernel {
                    let iy = (oy * stride + ki) as isize - padding as isize;
                    if iy < 0 || iy >= h as isize {
                        continue;
                    }
                    for kj in 0..kernel {
                        let ix = (ox * stride + kj) as isize - padding as isize;
                        if ix < 0 || ix >= w as isize {
                            continue;
                        }
                        best = best.max(x[[ci, iy as usize, ix as usize]]);
                    }
                }
                out[[ci, oy, ox]] = best;
            }
        }
    }
    out
}

/// Adaptive average pooling to 1x1, flattened
pub fn global_avg_pool(x: &Array3<f32>) -> Array1<f32> {
    let (c, h, w) = x.dim();
    let area = (h * w).max(1) as f32;
    let mut out = Array1::zeros(c);
    for (o, plane) in out.iter_mut().zip(x.outer_iter()) {
        *o = plane.sum() / area;
    }
    out
}
