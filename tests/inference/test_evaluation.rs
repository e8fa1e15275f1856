// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use car_damage_node::inference::{evaluate_dataset, EvaluationReport};
use std::fs;
use tempfile::tempdir;

use crate::common::{checkerboard, fixed_model, jpeg_bytes, png_bytes, FixedLogits};

#[test]
fn test_image_folder_accuracy() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("val");
    for class in ["Front Crushed", "Rear Normal", "Side Scrape"] {
        fs::create_dir_all(root.join(class)).unwrap();
    }
    let frame = checkerboard(32, 32, 4);
    fs::write(root.join("Front Crushed/a.png"), png_bytes(&frame)).unwrap();
    fs::write(root.join("Front Crushed/b.JPG"), jpeg_bytes(&frame)).unwrap();
    fs::write(root.join("Front Crushed/notes.txt"), "ignored").unwrap();
    fs::write(root.join("Rear Normal/c.png"), png_bytes(&frame)).unwrap();
    fs::write(root.join("Rear Normal/broken.jpg"), b"not a jpeg").unwrap();
    fs::write(root.join("Side Scrape/d.png"), png_bytes(&frame)).unwrap();

    // always predicts "Front Crushed"
    let classifier = FixedLogits::new(vec![0.0, 0.0, 3.0, 0.0, 0.0, 0.0]);
    let report = evaluate_dataset(&fixed_model(classifier.clone()), &root).unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.correct, 2);
    assert!((report.accuracy - 200.0 / 3.0).abs() < 1e-9);
    assert_eq!(report.per_class["Front Crushed"].correct, 2);
    assert_eq!(report.per_class["Rear Normal"].accuracy, 0.0);
    assert!(!report.per_class.contains_key("Side Scrape"));
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(classifier.calls(), 3);

    let output = dir.path().join("metrics.json");
    report.write_json(&output).unwrap();
    let reread: EvaluationReport = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(reread, report);
}

#[test]
fn test_missing_dataset_is_an_error() {
    let dir = tempdir().unwrap();
    let classifier = FixedLogits::new(vec![1.0; 6]);
    assert!(evaluate_dataset(&fixed_model(classifier), &dir.path().join("absent")).is_err());
}
