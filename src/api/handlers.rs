// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use serde::{Deserialize, Serialize};

use crate::model::LoadedModel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BannerResponse {
    pub message: String,
}

impl Default for BannerResponse {
    fn default() -> Self {
        Self {
            message: "Car Damage Detection API is running".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub architecture: String,
    pub classifier: String,
    pub classes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_parameters: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_parameters: Option<usize>,
}

impl From<&LoadedModel> for ModelInfo {
    fn from(model: &LoadedModel) -> Self {
        Self {
            architecture: model.architecture.clone(),
            classifier: model.classifier.name().to_string(),
            classes: model.labels.as_slice().to_vec(),
            matched_parameters: model.report.as_ref().map(|r| r.matched),
            expected_parameters: model.report.as_ref().map(|r| r.expected),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Build metadata from [`crate::version::get_version_info`]
    pub version: serde_json::Value,
    pub model: ModelInfo,
    pub snapshots_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<String>>,
}
