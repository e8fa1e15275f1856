// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/monitoring/metrics.rs - Prometheus metrics for the prediction service

use std::sync::Arc;
use std::time::Duration;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Terminal state of a prediction request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Classified,
    Rejected,
    Error,
}

impl RequestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::Classified => "classified",
            RequestOutcome::Rejected => "rejected",
            RequestOutcome::Error => "error",
        }
    }
}

#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Arc<Registry>,
    pub predictions_total: IntCounterVec,
    pub snapshots_total: IntCounter,
    pub prediction_latency: HistogramVec,
}

impl ServiceMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let predictions_total = IntCounterVec::new(
            Opts::new("car_damage_predictions_total", "Prediction requests by outcome"),
            &["outcome"],
        )?;

        let snapshots_total = IntCounter::new("car_damage_snapshots_total", "Damage snapshots written")?;

        let prediction_latency = HistogramVec::new(
            HistogramOpts::new("car_damage_prediction_latency_seconds", "End-to-end prediction latency")
                .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["outcome"],
        )?;

        registry.register(Box::new(predictions_total.clone()))?;
        registry.register(Box::new(snapshots_total.clone()))?;
        registry.register(Box::new(prediction_latency.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            predictions_total,
            snapshots_total,
            prediction_latency,
        })
    }

    pub fn record(&self, outcome: RequestOutcome, elapsed: Duration) {
        self.predictions_total.with_label_values(&[outcome.as_str()]).inc();
        self.prediction_latency
            .with_label_values(&[outcome.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_snapshot(&self) {
        self.snapshots_total.inc();
    }

    pub fn predictions(&self, outcome: RequestOutcome) -> u64 {
        self.predictions_total.with_label_values(&[outcome.as_str()]).get()
    }

    /// Prometheus text exposition
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl std::fmt::Debug for ServiceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMetrics").finish_non_exhaustive()
    }
}
