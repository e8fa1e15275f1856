// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use car_damage_node::weights::WeightBlob;
use half::f16;
use safetensors::tensor::{Dtype, TensorView};
use tempfile::tempdir;

#[test]
fn test_half_precision_checkpoint_is_widened() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("half.safetensors");

    let values = [0.5f32, -1.25, 2.0, 0.0];
    let bytes: Vec<u8> = values
        .iter()
        .flat_map(|v| f16::from_f32(*v).to_le_bytes())
        .collect();
    let counter: Vec<u8> = 12i64.to_le_bytes().to_vec();

    let views = vec![
        ("fc.1.weight", TensorView::new(Dtype::F16, vec![2, 2], &bytes).unwrap()),
        ("bn1.num_batches_tracked", TensorView::new(Dtype::I64, vec![], &counter).unwrap()),
    ];
    let serialized = safetensors::serialize(views, &None).unwrap();
    std::fs::write(&path, serialized).unwrap();

    let blob = WeightBlob::from_safetensors_file(&path).unwrap();
    let weight = blob.get("fc.1.weight").unwrap();
    assert_eq!(weight.shape(), &[2, 2]);
    assert_eq!(weight.iter().copied().collect::<Vec<_>>(), values.to_vec());

    let counter = blob.get("bn1.num_batches_tracked").unwrap();
    assert_eq!(counter.ndim(), 0);
    assert_eq!(counter.iter().next().copied(), Some(12.0));
}

#[test]
fn test_unreadable_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.safetensors");
    std::fs::write(&path, b"\x10\x00\x00\x00\x00\x00\x00\x00{not json}").unwrap();
    assert!(WeightBlob::from_safetensors_file(&path).is_err());
    assert!(WeightBlob::from_safetensors_file(dir.path().join("absent")).is_err());
}
