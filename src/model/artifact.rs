// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Deserialized weight artifacts
//!
//! A weight file is either a runnable graph or a bare parameter mapping. The
//! distinction is made once, from the file header, and carried as an
//! explicit variant rather than rediscovered later.

use std::path::Path;

use tracing::debug;

use super::error::LoadError;
use super::onnx::OnnxClassifier;
use crate::weights::WeightBlob;

pub enum Artifact {
    /// Graph plus weights, usable as a scoring function directly
    Invocable(OnnxClassifier),
    /// Named tensors to be matched against a native architecture
    Parameters(WeightBlob),
}

impl Artifact {
    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::Invocable(_) => "invocable",
            Artifact::Parameters(_) => "parameters",
        }
    }

    pub fn read(path: &Path) -> Result<Self, LoadError> {
        if !path.exists() {
            return Err(LoadError::WeightsMissing(path.to_path_buf()));
        }

        let bytes = std::fs::read(path).map_err(|e| LoadError::WeightsUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        match sniff(path, &bytes) {
            Some(Format::SafeTensors) => {
                debug!("{}: SafeTensors header", path.display());
                let blob = WeightBlob::from_safetensors_bytes(&bytes)
                    .map_err(|e| LoadError::unreadable(path, e))?;
                Ok(Artifact::Parameters(blob))
            }
            Some(Format::Onnx) => {
                debug!("{}: ONNX graph", path.display());
                let model = OnnxClassifier::load(path).map_err(|e| LoadError::WeightsUnreadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
                Ok(Artifact::Invocable(model))
            }
            None => Err(LoadError::WeightsUnreadable {
                path: path.to_path_buf(),
                reason: "not a SafeTensors blob or ONNX graph".to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Artifact::Invocable(m) => f.debug_tuple("Invocable").field(m).finish(),
            Artifact::Parameters(b) => f.debug_tuple("Parameters").field(&b.len()).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    SafeTensors,
    Onnx,
}

fn sniff(path: &Path, bytes: &[u8]) -> Option<Format> {
    // u64 little-endian header length, then a JSON object
    if bytes.len() > 8 && bytes[8] == b'{' {
        let header_len = u64::from_le_bytes(bytes[..8].try_into().ok()?);
        if header_len as usize <= bytes.len() - 8 {
            return Some(Format::SafeTensors);
        }
    }

    let onnx_ext = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("onnx"))
        .unwrap_or(false);
    // ModelProto field 1 (ir_version), varint
    if onnx_ext || bytes.first() == Some(&0x08) {
        return Some(Format::Onnx);
    }

    None
}
