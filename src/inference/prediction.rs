// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Per-request prediction record

use serde::{Deserialize, Serialize};

use crate::model::{argmax, ClassLabelSet, ModelError};

/// Label returned when the presence filter finds no vehicle
pub const NO_OBJECT_LABEL: &str = "No Car Detected";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPrediction {
    pub label: String,
    pub confidence: f32,
    pub probs: Vec<f32>,
    pub saved_filename: Option<String>,
}

impl ScoredPrediction {
    /// Sentinel for frames rejected by the presence filter
    pub fn no_object(num_classes: usize) -> Self {
        Self {
            label: NO_OBJECT_LABEL.to_string(),
            confidence: 1.0,
            probs: vec![0.0; num_classes],
            saved_filename: None,
        }
    }

    /// Arg-max over a probability vector, mapped through the labels
    pub fn from_probabilities(probs: Vec<f32>, labels: &ClassLabelSet) -> Result<Self, ModelError> {
        let (index, confidence) = argmax(&probs)
            .ok_or_else(|| ModelError::InvalidOutput("empty probability vector".to_string()))?;
        Ok(Self {
            label: labels.label_for(index),
            confidence,
            probs,
            saved_filename: None,
        })
    }

    pub fn is_no_object(&self) -> bool {
        self.label == NO_OBJECT_LABEL && self.saved_filename.is_none() && self.probs.iter().all(|p| *p == 0.0)
    }

    /// Labels without "normal" (any case) describe damage
    pub fn indicates_damage(&self) -> bool {
        !self.label.to_lowercase().contains("normal")
    }
}
