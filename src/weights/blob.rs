// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Weight blob loading from SafeTensors

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use ndarray::{ArrayD, IxDyn};
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use thiserror::Error;

/// Shared tensor handle. Renamed candidates point at the same data.
pub type Tensor = Arc<ArrayD<f32>>;

/// Errors raised while reading or writing weight blobs
#[derive(Debug, Error)]
pub enum WeightError {
    #[error("Failed to read weight file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid SafeTensors data: {0}")]
    Format(String),

    #[error("Unsupported dtype {dtype} for tensor '{name}'")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("Tensor '{name}' has {actual} bytes, expected {expected}")]
    ByteLength {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Immutable mapping from parameter name to tensor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightBlob {
    tensors: BTreeMap<String, Tensor>,
}

impl WeightBlob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a SafeTensors file, widening every dtype to f32
    pub fn from_safetensors_file<P: AsRef<Path>>(path: P) -> Result<Self, WeightError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| WeightError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_safetensors_bytes(&bytes)
    }

    /// Parse SafeTensors bytes already in memory
    pub fn from_safetensors_bytes(bytes: &[u8]) -> Result<Self, WeightError> {
        let st = SafeTensors::deserialize(bytes).map_err(|e| WeightError::Format(e.to_string()))?;

        let mut tensors = BTreeMap::new();
        for (name, view) in st.tensors() {
            let data = widen_to_f32(&name, view.dtype(), view.data())?;
            let array = ArrayD::from_shape_vec(IxDyn(view.shape()), data)
                .map_err(|e| WeightError::Format(format!("{}: {}", name, e)))?;
            tensors.insert(name, Arc::new(array));
        }

        Ok(Self { tensors })
    }

    /// Serialize as little-endian F32 SafeTensors
    pub fn to_safetensors_bytes(&self) -> Result<Vec<u8>, WeightError> {
        let raw: Vec<(String, Vec<usize>, Vec<u8>)> = self
            .tensors
            .iter()
            .map(|(name, t)| {
                let bytes = t.iter().flat_map(|v| v.to_le_bytes()).collect();
                (name.clone(), t.shape().to_vec(), bytes)
            })
            .collect();

        let mut views = Vec::with_capacity(raw.len());
        for (name, shape, bytes) in &raw {
            let view = TensorView::new(Dtype::F32, shape.clone(), bytes)
                .map_err(|e| WeightError::Format(e.to_string()))?;
            views.push((name.as_str(), view));
        }

        safetensors::serialize(views, &None).map_err(|e| WeightError::Format(e.to_string()))
    }

    pub fn save_safetensors<P: AsRef<Path>>(&self, path: P) -> Result<(), WeightError> {
        let path = path.as_ref();
        let bytes = self.to_safetensors_bytes()?;
        std::fs::write(path, bytes).map_err(|source| WeightError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) {
        self.tensors.insert(name.into(), Arc::new(tensor));
    }

    pub fn insert_shared(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    /// Key set identity, used to deduplicate normalizer candidates
    pub fn key_set(&self) -> BTreeSet<String> {
        self.tensors.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl FromIterator<(String, Tensor)> for WeightBlob {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().collect(),
        }
    }
}

fn widen_to_f32(name: &str, dtype: Dtype, data: &[u8]) -> Result<Vec<f32>, WeightError> {
    fn chunks<const N: usize>(name: &str, data: &[u8]) -> Result<Vec<[u8; N]>, WeightError> {
        if data.len() % N != 0 {
            return Err(WeightError::ByteLength {
                name: name.to_string(),
                expected: data.len() - data.len() % N,
                actual: data.len(),
            });
        }
        Ok(data
            .chunks_exact(N)
            .map(|c| {
                let mut buf = [0u8; N];
                buf.copy_from_slice(c);
                buf
            })
            .collect())
    }

    let values = match dtype {
        Dtype::F32 => chunks::<4>(name, data)?
            .into_iter()
            .map(f32::from_le_bytes)
            .collect(),
        Dtype::F64 => chunks::<8>(name, data)?
            .into_iter()
            .map(|b| f64::from_le_bytes(b) as f32)
            .collect(),
        Dtype::F16 => chunks::<2>(name, data)?
            .into_iter()
            .map(|b| half::f16::from_le_bytes(b).to_f32())
            .collect(),
        Dtype::BF16 => chunks::<2>(name, data)?
            .into_iter()
            .map(|b| half::bf16::from_le_bytes(b).to_f32())
            .collect(),
        Dtype::I64 => chunks::<8>(name, data)?
            .into_iter()
            .map(|b| i64::from_le_bytes(b) as f32)
            .collect(),
        Dtype::I32 => chunks::<4>(name, data)?
            .into_iter()
            .map(|b| i32::from_le_bytes(b) as f32)
            .collect(),
        Dtype::I16 => chunks::<2>(name, data)?
            .into_iter()
            .map(|b| i16::from_le_bytes(b) as f32)
            .collect(),
        Dtype::I8 => data.iter().map(|&b| b as i8 as f32).collect(),
        Dtype::U8 | Dtype::BOOL => data.iter().map(|&b| b as f32).collect(),
        other => {
            return Err(WeightError::UnsupportedDtype {
                name: name.to_string(),
                dtype: format!("{:?}", other),
            })
        }
    };

    Ok(values)
}
