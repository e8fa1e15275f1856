// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service Configuration Module
//!
//! Settings are read from environment variables, after an optional `.env`
//! file. Unset variables take their defaults; a value that is set but does
//! not parse is a configuration error rather than a silent default.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{LoaderConfig, DEFAULT_MIN_MATCHED_FRACTION};
use crate::vision::DetectionParams;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Weight blob or ONNX graph
    pub model_path: PathBuf,
    /// Newline-delimited class labels
    pub classes_path: PathBuf,
    /// Haar cascade XML for the presence filter
    pub cascade_path: PathBuf,
    /// Damage snapshot directory
    pub save_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub scale_factor: f64,
    pub min_neighbors: usize,
    /// Square minimum detection window, in pixels
    pub min_size: u32,
    pub snapshot_min_confidence: f32,
    pub min_matched_fraction: f32,
    pub init_seed: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./saved_model.safetensors"),
            classes_path: PathBuf::from("./classes.txt"),
            cascade_path: PathBuf::from("./cascades/car_cascade.xml"),
            save_dir: PathBuf::from("./server_captures"),
            host: "0.0.0.0".to_string(),
            port: 8000,
            scale_factor: 1.1,
            min_neighbors: 3,
            min_size: 60,
            snapshot_min_confidence: 0.5,
            min_matched_fraction: DEFAULT_MIN_MATCHED_FRACTION,
            init_seed: 0,
        }
    }
}

impl ServiceConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `MODEL_PATH`, `CLASSES_PATH`, `CASCADE_PATH`, `SAVE_DIR`
    /// - `API_HOST`, `API_PORT`
    /// - `DETECT_SCALE_FACTOR`, `DETECT_MIN_NEIGHBORS`, `DETECT_MIN_SIZE`
    /// - `SNAPSHOT_MIN_CONFIDENCE`, `MIN_MATCHED_FRACTION`, `MODEL_INIT_SEED`
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let path = |key: &str, default: PathBuf| lookup(key).map(PathBuf::from).unwrap_or(default);

        let config = Self {
            model_path: path("MODEL_PATH", defaults.model_path),
            classes_path: path("CLASSES_PATH", defaults.classes_path),
            cascade_path: path("CASCADE_PATH", defaults.cascade_path),
            save_dir: path("SAVE_DIR", defaults.save_dir),
            host: lookup("API_HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "API_PORT", defaults.port)?,
            scale_factor: parsed(&lookup, "DETECT_SCALE_FACTOR", defaults.scale_factor)?,
            min_neighbors: parsed(&lookup, "DETECT_MIN_NEIGHBORS", defaults.min_neighbors)?,
            min_size: parsed(&lookup, "DETECT_MIN_SIZE", defaults.min_size)?,
            snapshot_min_confidence: parsed(
                &lookup,
                "SNAPSHOT_MIN_CONFIDENCE",
                defaults.snapshot_min_confidence,
            )?,
            min_matched_fraction: parsed(&lookup, "MIN_MATCHED_FRACTION", defaults.min_matched_fraction)?,
            init_seed: parsed(&lookup, "MODEL_INIT_SEED", defaults.init_seed)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.snapshot_min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "snapshot_min_confidence must be within [0, 1], got {}",
                self.snapshot_min_confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.min_matched_fraction) {
            return Err(ConfigError::Invalid(format!(
                "min_matched_fraction must be within [0, 1], got {}",
                self.min_matched_fraction
            )));
        }
        self.detection_params()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            scale_factor: self.scale_factor,
            min_neighbors: self.min_neighbors,
            min_size: (self.min_size, self.min_size),
            max_size: None,
        }
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            min_matched_fraction: self.min_matched_fraction,
            seed: self.init_seed,
            ..LoaderConfig::default()
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parsed<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            value,
            reason: e.to_string(),
        }),
    }
}
