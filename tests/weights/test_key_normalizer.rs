// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use car_damage_node::weights::{CandidateVariant, KeyNormalizer, WeightBlob};
use ndarray::{ArrayD, IxDyn};
use std::collections::BTreeSet;

fn blob(keys: &[&str]) -> WeightBlob {
    let mut blob = WeightBlob::new();
    for key in keys {
        blob.insert(*key, ArrayD::zeros(IxDyn(&[1])));
    }
    blob
}

fn keys(blob: &WeightBlob) -> Vec<&str> {
    blob.keys().collect()
}

fn expected(keys: &[&str]) -> BTreeSet<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

#[test]
fn test_data_parallel_checkpoint_is_cleaned() {
    let normalizer = KeyNormalizer::default();
    let cleaned = normalizer.clean(&blob(&["module.conv1.weight", "module.fc.1.bias"]));
    assert_eq!(keys(&cleaned), vec!["conv1.weight", "fc.1.bias"]);
}

#[test]
fn test_wrapped_model_candidates_in_order() {
    let normalizer = KeyNormalizer::default();
    let source = blob(&["module.model.features.0.0.weight", "module.model.classifier.1.bias"]);
    let wanted = expected(&["model.features.0.0.weight", "model.classifier.1.bias"]);

    let candidates = normalizer.candidates(&source, &wanted);
    let variants: Vec<CandidateVariant> = candidates.iter().map(|c| c.variant).collect();
    assert_eq!(
        variants,
        vec![
            CandidateVariant::AsIs,
            CandidateVariant::SecondaryStripped,
            CandidateVariant::SecondaryAdded,
        ]
    );

    // the as-is candidate already lines up with the wrapped architecture
    assert_eq!(candidates[0].filtered.len(), 2);
    assert_eq!(keys(&candidates[1].full), vec!["classifier.1.bias", "features.0.0.weight"]);
    assert!(candidates[1].filtered.is_empty());
}

#[test]
fn test_filtered_candidate_keeps_only_expected_keys() {
    let normalizer = KeyNormalizer::default();
    let source = blob(&["conv1.weight", "fc.1.weight", "aux_head.weight"]);
    let wanted = expected(&["conv1.weight", "fc.1.weight", "bn1.weight"]);

    let first = &normalizer.candidates(&source, &wanted)[0];
    assert_eq!(first.variant, CandidateVariant::AsIs);
    assert_eq!(keys(&first.filtered), vec!["conv1.weight", "fc.1.weight"]);
    assert_eq!(first.full.len(), 3);
    assert_eq!(first.attempts()[0], &first.filtered);
}

#[test]
fn test_renamed_candidates_share_tensor_data() {
    let normalizer = KeyNormalizer::default();
    let source = blob(&["model.layer1.0.conv1.weight"]);
    let candidates = normalizer.candidates(&source, &BTreeSet::new());

    let original = source.get("model.layer1.0.conv1.weight").unwrap();
    let stripped = candidates[1].full.get("layer1.0.conv1.weight").unwrap();
    assert!(std::sync::Arc::ptr_eq(original, stripped));
}
