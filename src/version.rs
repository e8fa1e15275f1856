// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the Car Damage Node

/// Full version string with feature description
pub const VERSION: &str = "v0.1.0-damage-classifier-2025-11-04";

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Build date
pub const BUILD_DATE: &str = "2025-11-04";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "resnet50",
    "efficientnet-b0",
    "onnx-runtime",
    "safetensors-weights",
    "key-normalization",
    "haar-presence-filter",
    "damage-snapshots",
    "prometheus-metrics",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("Car Damage Node {} ({})", VERSION_NUMBER, BUILD_DATE)
}

/// Get full version info for API responses
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION_NUMBER,
        "build": VERSION,
        "date": BUILD_DATE,
        "features": FEATURES,
    })
}
