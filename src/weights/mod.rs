// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Serialized classifier weights
//!
//! This module provides:
//! - `WeightBlob`: parameter-name to tensor mapping read from SafeTensors
//! - `KeyNormalizer`: prefix rewriting so a blob can line up with a freshly
//!   built architecture's parameter names

pub mod blob;
pub mod normalizer;

pub use blob::{Tensor, WeightBlob, WeightError};
pub use normalizer::{Candidate, CandidateVariant, KeyNormalizer};
