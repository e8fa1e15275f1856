// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::inference::{evaluate_dataset, InferencePipeline, SnapshotStore};
use crate::model::{
    Artifact, ArchitectureDetector, ClassLabelSet, LoadedModel, LoaderConfig, ModelLoader,
    DEFAULT_MIN_MATCHED_FRACTION,
};
use crate::vision::{CascadePresenceFilter, DetectionParams};

/// Model location and loading policy shared by every command
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Weights file (SafeTensors blob or ONNX graph)
    #[arg(long, env = "MODEL_PATH", default_value = "./saved_model.safetensors")]
    pub weights: PathBuf,

    /// Newline-delimited class labels; the built-in set is used when absent
    #[arg(long, env = "CLASSES_PATH", default_value = "./classes.txt")]
    pub classes: PathBuf,

    /// Minimum fraction of architecture parameters the weights must cover
    #[arg(long, env = "MIN_MATCHED_FRACTION", default_value_t = DEFAULT_MIN_MATCHED_FRACTION)]
    pub min_matched_fraction: f32,

    /// Seed for parameters the weights do not provide
    #[arg(long, env = "MODEL_INIT_SEED", default_value_t = 0)]
    pub seed: u64,
}

impl ModelArgs {
    fn loader(&self) -> ModelLoader {
        ModelLoader::new(LoaderConfig {
            min_matched_fraction: self.min_matched_fraction,
            seed: self.seed,
            ..LoaderConfig::default()
        })
    }

    fn load(&self) -> Result<LoadedModel> {
        let model = self
            .loader()
            .load(&self.weights, Some(&self.classes))
            .with_context(|| format!("loading model from {}", self.weights.display()))?;
        info!("Model ready: {} with {} classes", model.architecture, model.labels.len());
        Ok(model)
    }
}

/// Arguments for classify command
#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Image to classify
    #[arg(long)]
    pub image: PathBuf,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Haar cascade XML for the presence filter
    #[arg(long, env = "CASCADE_PATH", default_value = "./cascades/car_cascade.xml")]
    pub cascade: PathBuf,

    #[arg(long, env = "DETECT_SCALE_FACTOR", default_value_t = 1.1)]
    pub scale_factor: f64,

    #[arg(long, env = "DETECT_MIN_NEIGHBORS", default_value_t = 3)]
    pub min_neighbors: usize,

    #[arg(long, env = "DETECT_MIN_SIZE", default_value_t = 60)]
    pub min_size: u32,

    /// Write damage snapshots here; disabled when unset
    #[arg(long)]
    pub save_dir: Option<PathBuf>,

    #[arg(long, env = "SNAPSHOT_MIN_CONFIDENCE", default_value_t = 0.5)]
    pub snapshot_min_confidence: f32,
}

/// Arguments for inspect command
#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    pub model: ModelArgs,
}

/// Arguments for evaluate command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Dataset root laid out as `<dir>/<label>/<image>`
    #[arg(long)]
    pub dataset: PathBuf,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Also write the report as JSON
    #[arg(long)]
    pub output: Option<PathBuf>,
}

pub fn classify(args: ClassifyArgs) -> Result<()> {
    let model = args.model.load()?;
    let params = DetectionParams {
        scale_factor: args.scale_factor,
        min_neighbors: args.min_neighbors,
        min_size: (args.min_size, args.min_size),
        max_size: None,
    };
    let presence = CascadePresenceFilter::new(&args.cascade, params)?;

    let mut pipeline =
        InferencePipeline::new(model, Arc::new(presence)).with_min_confidence(args.snapshot_min_confidence);
    if let Some(dir) = args.save_dir {
        pipeline = pipeline.with_snapshots(SnapshotStore::new(dir));
    }

    let bytes = std::fs::read(&args.image).with_context(|| format!("reading {}", args.image.display()))?;
    let prediction = pipeline.infer(&bytes)?;
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}

/// Coverage of one architecture against a weights file
#[derive(Debug, Clone, Serialize)]
pub struct ArchitectureReport {
    pub architecture: String,
    pub detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub matched: usize,
    pub expected: usize,
    pub missing: usize,
    pub unexpected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub path: PathBuf,
    pub artifact: String,
    pub keys: usize,
    pub detected: Vec<String>,
    pub architectures: Vec<ArchitectureReport>,
}

/// Describe a weights file without committing to an architecture
pub fn inspect_weights(path: &Path, classes: Option<&Path>, seed: u64) -> Result<InspectReport> {
    let labels = ClassLabelSet::load(classes)?;
    let artifact = Artifact::read(path)?;

    let blob = match &artifact {
        Artifact::Invocable(_) => {
            return Ok(InspectReport {
                path: path.to_path_buf(),
                artifact: artifact.kind().to_string(),
                keys: 0,
                detected: Vec::new(),
                architectures: Vec::new(),
            })
        }
        Artifact::Parameters(blob) => blob,
    };

    let detector = ArchitectureDetector::with_defaults();
    let detected: Vec<String> = detector.detect(blob).iter().map(|s| s.name().to_string()).collect();
    let normalizer = LoaderConfig::default().normalizer;

    let architectures = detector
        .strategies()
        .iter()
        .map(|strategy| {
            let name = strategy.name().to_string();
            let is_detected = detected.contains(&name);
            match strategy.attempt_load(blob, labels.len(), &normalizer, seed, 0.0) {
                Ok(attempt) => ArchitectureReport {
                    architecture: name,
                    detected: is_detected,
                    variant: Some(attempt.variant.as_str().to_string()),
                    matched: attempt.report.matched,
                    expected: attempt.report.expected,
                    missing: attempt.report.missing.len(),
                    unexpected: attempt.report.unexpected.len(),
                    error: None,
                },
                Err(e) => ArchitectureReport {
                    architecture: name,
                    detected: is_detected,
                    variant: None,
                    matched: 0,
                    expected: 0,
                    missing: 0,
                    unexpected: 0,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect();

    Ok(InspectReport {
        path: path.to_path_buf(),
        artifact: artifact.kind().to_string(),
        keys: blob.len(),
        detected,
        architectures,
    })
}

pub fn inspect(args: InspectArgs) -> Result<()> {
    let report = inspect_weights(&args.model.weights, Some(&args.model.classes), args.model.seed)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn evaluate(args: EvaluateArgs) -> Result<()> {
    let model = args.model.load()?;
    let report = evaluate_dataset(&model, &args.dataset)?;

    println!("Total: {}", report.total);
    println!("Correct: {}", report.correct);
    println!("Accuracy: {:.2}%", report.accuracy);
    for (label, class) in &report.per_class {
        println!("  {:<20} {:>4}/{:<4} {:.2}%", label, class.correct, class.total, class.accuracy);
    }
    if !report.skipped.is_empty() {
        println!("Skipped: {}", report.skipped.len());
    }

    if let Some(output) = &args.output {
        report.write_json(output)?;
    }
    Ok(())
}
