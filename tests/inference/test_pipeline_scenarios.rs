// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use car_damage_node::inference::{InferencePipeline, PipelineError, SnapshotStore, NO_OBJECT_LABEL};
use car_damage_node::vision::{CascadePresenceFilter, DetectionParams};
use image::{Rgb, RgbImage};
use std::sync::Arc;
use tempfile::tempdir;

use crate::common::{
    checkerboard, fixed_model, jpeg_bytes, never_pass_cascade, png_bytes, write_file, FixedLogits,
    ALWAYS_PASS_CASCADE,
};

fn pipeline_with(cascade: &str, logits: Vec<f32>, dir: &std::path::Path) -> (InferencePipeline, Arc<FixedLogits>) {
    let path = write_file(dir, "car.xml", cascade);
    let filter = CascadePresenceFilter::new(path, DetectionParams::default()).unwrap();
    let classifier = FixedLogits::new(logits);
    let pipeline = InferencePipeline::new(fixed_model(classifier.clone()), Arc::new(filter))
        .with_snapshots(SnapshotStore::new(dir.join("captures")));
    (pipeline, classifier)
}

#[test]
fn test_frame_without_vehicle_returns_sentinel() {
    let dir = tempdir().unwrap();
    let (pipeline, classifier) = pipeline_with(&never_pass_cascade(), vec![0.0, 0.0, 4.0, 0.0, 0.0, 0.0], dir.path());

    let prediction = pipeline.infer(&png_bytes(&checkerboard(160, 160, 20))).unwrap();
    assert_eq!(prediction.label, NO_OBJECT_LABEL);
    assert_eq!(prediction.confidence, 1.0);
    assert_eq!(prediction.probs, vec![0.0; 6]);
    assert!(prediction.saved_filename.is_none());
    assert_eq!(classifier.calls(), 0);
    assert!(!dir.path().join("captures").exists());
}

#[test]
fn test_confident_damage_is_saved() {
    let dir = tempdir().unwrap();
    let (pipeline, classifier) = pipeline_with(ALWAYS_PASS_CASCADE, vec![0.0, 0.0, 4.0, 0.0, 0.0, 0.0], dir.path());

    let prediction = pipeline.infer(&jpeg_bytes(&checkerboard(160, 160, 20))).unwrap();
    assert_eq!(prediction.label, "Front Crushed");
    assert_eq!(classifier.calls(), 1);

    let sum: f32 = prediction.probs.iter().sum();
    assert!((sum - 1.0).abs() < 1e-5);
    assert_eq!(prediction.confidence, prediction.probs[2]);

    let name = prediction.saved_filename.unwrap();
    assert!(name.ends_with(&format!("_Front_Crushed_{}.jpg", (prediction.confidence * 100.0).floor() as u32)));
    let saved = dir.path().join("captures").join(&name);
    assert!(saved.exists());
    assert!(image::open(saved).is_ok());
}

#[test]
fn test_normal_and_uncertain_predictions_are_not_saved() {
    let dir = tempdir().unwrap();
    let frame = png_bytes(&checkerboard(160, 160, 20));

    let (normal, _) = pipeline_with(ALWAYS_PASS_CASCADE, vec![0.0, 0.0, 0.0, 4.0, 0.0, 0.0], dir.path());
    let prediction = normal.infer(&frame).unwrap();
    assert_eq!(prediction.label, "Rear Normal");
    assert!(prediction.saved_filename.is_none());

    let (uncertain, _) = pipeline_with(ALWAYS_PASS_CASCADE, vec![0.0, 0.0, 0.0, 0.0, 0.5, 0.0], dir.path());
    let prediction = uncertain.infer(&frame).unwrap();
    assert_eq!(prediction.label, "Rear Breakage");
    assert!(prediction.confidence < 0.5);
    assert!(prediction.saved_filename.is_none());

    assert!(!dir.path().join("captures").exists());
}

#[test]
fn test_threshold_is_inclusive() {
    let dir = tempdir().unwrap();
    let (pipeline, _) = pipeline_with(ALWAYS_PASS_CASCADE, vec![0.0, 0.0, 0.0, 0.0, 0.0, 3.0], dir.path());
    let frame = png_bytes(&checkerboard(160, 160, 20));

    let first = pipeline.infer(&frame).unwrap();
    let pipeline = pipeline.with_min_confidence(first.confidence);
    let second = pipeline.infer(&frame).unwrap();
    assert!(second.saved_filename.is_some());
    assert_ne!(first.saved_filename, second.saved_filename);
}

#[test]
fn test_undecodable_upload_is_rejected() {
    let dir = tempdir().unwrap();
    let (pipeline, classifier) = pipeline_with(ALWAYS_PASS_CASCADE, vec![1.0; 6], dir.path());

    let err = pipeline.infer(b"GIF87a but not really").unwrap_err();
    assert!(matches!(err, PipelineError::Decode(_)));
    assert_eq!(classifier.calls(), 0);
}

#[test]
fn test_missing_cascade_fails_every_request() {
    let dir = tempdir().unwrap();
    let filter = CascadePresenceFilter::new(dir.path().join("absent.xml"), DetectionParams::default()).unwrap();
    let pipeline = InferencePipeline::new(fixed_model(FixedLogits::new(vec![1.0; 6])), Arc::new(filter));
    let frame = png_bytes(&RgbImage::from_pixel(80, 80, Rgb([1, 2, 3])));

    for _ in 0..2 {
        let err = pipeline.infer(&frame).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
