// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use car_damage_node::model::{
    ArchitectureDetector, LoadError, LoaderConfig, ModelLoader,
};
use car_damage_node::weights::WeightBlob;
use ndarray::{ArrayD, IxDyn};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

use crate::common::TinyStrategy;

// Flagged by "head." keys
fn strategy_a() -> TinyStrategy {
    TinyStrategy {
        name: "tiny_a",
        layer: "head",
        marker: "head.",
    }
}

// Never flagged; only reachable through the fallback pass
fn strategy_b() -> TinyStrategy {
    TinyStrategy {
        name: "tiny_b",
        layer: "proj",
        marker: "no-such-marker",
    }
}

fn loader(min_matched_fraction: f32) -> ModelLoader {
    ModelLoader::new(LoaderConfig {
        min_matched_fraction,
        ..LoaderConfig::default()
    })
    .with_detector(ArchitectureDetector::new(vec![
        Arc::new(strategy_a()),
        Arc::new(strategy_b()),
    ]))
}

fn tensor(shape: &[usize], value: f32) -> ArrayD<f32> {
    ArrayD::from_elem(IxDyn(shape), value)
}

fn labels(n: usize) -> car_damage_node::model::ClassLabelSet {
    car_damage_node::model::ClassLabelSet::new((0..n).map(|i| format!("class {}", i)).collect())
}

#[test]
fn test_flagged_architecture_loads_first() {
    let mut blob = WeightBlob::new();
    blob.insert("head.weight", tensor(&[6, 3], 0.5));
    blob.insert("head.bias", tensor(&[6], 0.0));
    blob.insert("proj.weight", tensor(&[6, 3], 0.5));
    blob.insert("proj.bias", tensor(&[6], 0.0));

    let model = loader(0.5).load_blob(&blob, labels(6), Path::new("mem")).unwrap();
    assert_eq!(model.architecture, "tiny_a");
    let report = model.report.unwrap();
    assert_eq!(report.matched, 2);
    assert!(report.is_complete());
}

#[test]
fn test_fallback_after_flagged_failure() {
    let mut blob = WeightBlob::new();
    // flags tiny_a, but with the wrong head width
    blob.insert("head.weight", tensor(&[6, 4], 0.5));
    blob.insert("proj.weight", tensor(&[6, 3], 0.5));
    blob.insert("proj.bias", tensor(&[6], 0.0));

    let model = loader(0.5).load_blob(&blob, labels(6), Path::new("mem")).unwrap();
    assert_eq!(model.architecture, "tiny_b");
}

#[test]
fn test_unflagged_blob_still_tries_every_architecture() {
    let mut blob = WeightBlob::new();
    blob.insert("module.proj.weight", tensor(&[4, 3], 0.5));
    blob.insert("module.proj.bias", tensor(&[4], 0.0));

    let model = loader(0.5).load_blob(&blob, labels(4), Path::new("mem")).unwrap();
    assert_eq!(model.architecture, "tiny_b");
    assert_eq!(model.labels.len(), 4);
}

#[test]
fn test_low_coverage_falls_through_to_next_architecture() {
    let mut blob = WeightBlob::new();
    // half of tiny_a, all of tiny_b
    blob.insert("head.bias", tensor(&[6], 0.0));
    blob.insert("proj.weight", tensor(&[6, 3], 0.5));
    blob.insert("proj.bias", tensor(&[6], 0.0));

    let strict = loader(0.75).load_blob(&blob, labels(6), Path::new("mem")).unwrap();
    assert_eq!(strict.architecture, "tiny_b");

    let permissive = loader(0.5).load_blob(&blob, labels(6), Path::new("mem")).unwrap();
    assert_eq!(permissive.architecture, "tiny_a");
    assert_eq!(permissive.report.unwrap().missing, vec!["head.weight".to_string()]);
}

#[test]
fn test_zero_threshold_accepts_any_partial_load() {
    let mut blob = WeightBlob::new();
    blob.insert("unrelated.tensor", tensor(&[2], 1.0));

    let model = loader(0.0).load_blob(&blob, labels(6), Path::new("mem")).unwrap();
    assert_eq!(model.architecture, "tiny_a");
    assert_eq!(model.report.unwrap().matched, 0);
}

#[test]
fn test_load_failure_lists_each_architecture_once() {
    let mut blob = WeightBlob::new();
    blob.insert("head.weight", tensor(&[6, 9], 0.5));
    blob.insert("unrelated.tensor", tensor(&[2], 1.0));

    let err = loader(0.5)
        .load_blob(&blob, labels(6), Path::new("weights.safetensors"))
        .unwrap_err();
    match err {
        LoadError::LoadFailure {
            path,
            attempted,
            last_error,
        } => {
            assert_eq!(path, Path::new("weights.safetensors"));
            assert_eq!(attempted, vec!["tiny_a".to_string(), "tiny_b".to_string()]);
            assert!(!last_error.is_empty());
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_load_from_file_with_class_list() {
    let dir = tempdir().unwrap();
    let weights = dir.path().join("model.safetensors");
    let classes = dir.path().join("classes.txt");

    let mut blob = WeightBlob::new();
    blob.insert("model.head.weight", tensor(&[2, 3], 0.5));
    blob.insert("model.head.bias", tensor(&[2], 0.0));
    blob.save_safetensors(&weights).unwrap();
    std::fs::write(&classes, "dent\nscratch\n").unwrap();

    let model = loader(0.5).load(&weights, Some(&classes)).unwrap();
    assert_eq!(model.architecture, "tiny_a");
    assert_eq!(model.labels.as_slice(), &["dent".to_string(), "scratch".to_string()]);
    assert!(model.report.unwrap().is_complete());
}

#[test]
fn test_missing_weights_is_configuration_error() {
    let dir = tempdir().unwrap();
    let err = loader(0.5)
        .load(&dir.path().join("absent.safetensors"), None)
        .unwrap_err();
    assert!(matches!(err, LoadError::WeightsMissing(_)));
    assert!(err.is_configuration_error());
}
