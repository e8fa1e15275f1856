// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Named parameter storage with non-strict partial loading

use std::collections::{BTreeMap, BTreeSet};

use ndarray::{ArrayD, ArrayView1, ArrayView2, ArrayView4, Ix1, Ix2, Ix4, IxDyn};
use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;

use super::error::ModelError;
use crate::weights::WeightBlob;

/// Outcome of a partial load
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    /// Parameters overwritten from the blob
    pub matched: usize,
    /// Parameters left at their initial values
    pub missing: Vec<String>,
    /// Blob keys the architecture does not declare
    pub unexpected: Vec<String>,
    /// Parameters declared by the architecture
    pub expected: usize,
}

impl LoadReport {
    pub fn matched_fraction(&self) -> f32 {
        if self.expected == 0 {
            return 0.0;
        }
        self.matched as f32 / self.expected as f32
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    tensors: BTreeMap<String, ArrayD<f32>>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Result<&ArrayD<f32>, ModelError> {
        self.tensors
            .get(name)
            .ok_or_else(|| ModelError::MissingParameter(name.to_string()))
    }

    pub fn view1(&self, name: &str) -> Result<ArrayView1<'_, f32>, ModelError> {
        Ok(self.get(name)?.view().into_dimensionality::<Ix1>()?)
    }

    pub fn view2(&self, name: &str) -> Result<ArrayView2<'_, f32>, ModelError> {
        Ok(self.get(name)?.view().into_dimensionality::<Ix2>()?)
    }

    pub fn view4(&self, name: &str) -> Result<ArrayView4<'_, f32>, ModelError> {
        Ok(self.get(name)?.view().into_dimensionality::<Ix4>()?)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn expected_keys(&self) -> BTreeSet<String> {
        self.tensors.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Total scalar count across all entries
    pub fn scalar_count(&self) -> usize {
        self.tensors.values().map(|t| t.len()).sum()
    }

    /// Non-strict load.
    ///
    /// Unexpected keys are ignored and missing keys keep their current value.
    /// A key present on both sides with a different shape fails the whole
    /// load and leaves the store untouched.
    pub fn load_partial(&mut self, blob: &WeightBlob) -> Result<LoadReport, ModelError> {
        let mut updates = Vec::new();
        let mut unexpected = Vec::new();

        for (name, tensor) in blob.iter() {
            let Some(current) = self.tensors.get(name) else {
                unexpected.push(name.to_string());
                continue;
            };

            if current.shape() == tensor.shape() {
                updates.push((name.to_string(), (**tensor).clone()));
            } else if current.ndim() == 0 && tensor.len() == 1 && tensor.ndim() == 1 {
                let value = tensor.iter().next().copied().unwrap_or_default();
                updates.push((name.to_string(), ArrayD::from_elem(IxDyn(&[]), value)));
            } else {
                return Err(ModelError::ShapeMismatch {
                    name: name.to_string(),
                    expected: current.shape().to_vec(),
                    found: tensor.shape().to_vec(),
                });
            }
        }

        let matched: BTreeSet<String> = updates.iter().map(|(n, _)| n.clone()).collect();
        let missing = self
            .tensors
            .keys()
            .filter(|k| !matched.contains(*k))
            .cloned()
            .collect();

        for (name, tensor) in updates {
            self.tensors.insert(name, tensor);
        }

        Ok(LoadReport {
            matched: matched.len(),
            missing,
            unexpected,
            expected: self.tensors.len(),
        })
    }
}

/// Uniform fan-scaled initialization (He-uniform bound)
pub(crate) fn kaiming_uniform(shape: &[usize], fan: usize, rng: &mut StdRng) -> ArrayD<f32> {
    let bound = (6.0 / fan.max(1) as f32).sqrt();
    ArrayD::from_shape_simple_fn(IxDyn(shape), || rng.gen_range(-bound..bound))
}

/// Default linear-layer initialization: U(-1/sqrt(fan_in), 1/sqrt(fan_in))
pub(crate) fn fan_in_uniform(shape: &[usize], fan_in: usize, rng: &mut StdRng) -> ArrayD<f32> {
    let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
    ArrayD::from_shape_simple_fn(IxDyn(shape), || rng.gen_range(-bound..bound))
}
