// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use car_damage_node::model::{ClassLabelSet, DEFAULT_CLASSES};
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

#[test]
fn test_default_order_is_index_significant() {
    let labels = ClassLabelSet::default();
    assert_eq!(labels.len(), 6);
    for (i, expected) in DEFAULT_CLASSES.iter().enumerate() {
        assert_eq!(labels.label_for(i), *expected);
    }
    assert_eq!(labels.label_for(1), "Front Breakage");
    assert_eq!(labels.label_for(5), "Rear Crushed");
}

#[test]
fn test_class_file_overrides_default() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Front Normal").unwrap();
    writeln!(file, "  Side Scrape  ").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "Rear Crushed").unwrap();

    let labels = ClassLabelSet::load(Some(file.path())).unwrap();
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.label_for(1), "Side Scrape");
    assert_eq!(labels.position("Rear Crushed"), Some(2));
}

#[test]
fn test_absent_file_falls_back_to_default() {
    let dir = tempdir().unwrap();
    let labels = ClassLabelSet::load(Some(&dir.path().join("classes.txt"))).unwrap();
    assert_eq!(labels, ClassLabelSet::default());

    let labels = ClassLabelSet::load(None).unwrap();
    assert_eq!(labels, ClassLabelSet::default());
}

#[test]
fn test_index_past_end_uses_number() {
    let labels = ClassLabelSet::parse("a\nb");
    assert_eq!(labels.label_for(7), "7");
}
