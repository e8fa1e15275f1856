// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use car_damage_node::model::{
    load_model, Architecture, ArchitectureDetector, ArchitectureKind, EfficientNetStrategy,
    NativeClassifier, ResNetStrategy,
};
use car_damage_node::weights::WeightBlob;
use tempfile::tempdir;

fn export(classifier: &NativeClassifier, prefix: &str) -> WeightBlob {
    let params = classifier.parameters();
    let mut blob = WeightBlob::new();
    for name in params.names() {
        blob.insert(format!("{}{}", prefix, name), params.get(name).unwrap().clone());
    }
    blob
}

#[test]
fn test_resnet_checkpoint_with_wrapper_prefix() {
    let dir = tempdir().unwrap();
    let weights = dir.path().join("resnet.safetensors");

    let trained = ResNetStrategy.instantiate(6, 42).unwrap();
    let blob = export(&trained, "module.");
    assert_eq!(ArchitectureDetector::detect_kinds(&blob), vec![ArchitectureKind::ResNetLike]);
    blob.save_safetensors(&weights).unwrap();

    let model = load_model(&weights, None).unwrap();
    assert_eq!(model.architecture, "resnet50");
    assert_eq!(model.classifier.name(), "resnet50");
    let report = model.report.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.matched, report.expected);
    assert!(report.unexpected.is_empty());
}

#[test]
fn test_efficientnet_inner_network_gets_wrapper_added() {
    let dir = tempdir().unwrap();
    let weights = dir.path().join("effnet.safetensors");

    // saved from the inner network: no "model." prefix
    let trained = EfficientNetStrategy.instantiate(6, 7).unwrap();
    let inner: WeightBlob = export(&trained, "")
        .iter()
        .map(|(k, v)| (k.strip_prefix("model.").unwrap_or(k).to_string(), v.clone()))
        .collect();
    assert_eq!(ArchitectureDetector::detect_kinds(&inner), vec![ArchitectureKind::EfficientNetLike]);
    inner.save_safetensors(&weights).unwrap();

    let model = load_model(&weights, None).unwrap();
    assert_eq!(model.architecture, "efficientnet_b0");
    let report = model.report.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.matched, trained.parameters().len());
}

#[test]
fn test_head_is_sized_to_label_count() {
    let classifier = ResNetStrategy.instantiate(3, 0).unwrap();
    let head = classifier.parameters().get("fc.1.weight").unwrap();
    assert_eq!(head.shape(), &[3, 2048]);

    let classifier = EfficientNetStrategy.instantiate(4, 0).unwrap();
    let head = classifier.parameters().get("model.classifier.1.weight").unwrap();
    assert_eq!(head.shape(), &[4, 1280]);
}

#[test]
fn test_seeded_initialisation_is_deterministic() {
    let a = ResNetStrategy.instantiate(6, 11).unwrap();
    let b = ResNetStrategy.instantiate(6, 11).unwrap();
    assert_eq!(
        a.parameters().get("conv1.weight").unwrap(),
        b.parameters().get("conv1.weight").unwrap()
    );
}
