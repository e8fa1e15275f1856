// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use car_damage_node::vision::{
    CascadePresenceFilter, DetectionParams, PresenceDetector, PresenceError,
};
use image::{Rgb, RgbImage};
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

use crate::common::{checkerboard, never_pass_cascade, write_file, ALWAYS_PASS_CASCADE};

#[test]
fn test_textured_frame_is_found() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "car.xml", ALWAYS_PASS_CASCADE);
    let filter = CascadePresenceFilter::new(&path, DetectionParams::default()).unwrap();

    let frame = checkerboard(160, 160, 20);
    let result = filter.detect(&frame).unwrap();
    assert!(result.found);
    assert!(!result.boxes.is_empty());
    for b in &result.boxes {
        assert!(b.x >= 0 && b.y >= 0);
        assert!(b.width >= 60 && b.height >= 60);
        // scaled-frame rounding can overshoot by up to half a pyramid factor
        assert!(b.x + b.width <= 168 && b.y + b.height <= 168, "{:?}", b);
    }
}

#[test]
fn test_rejecting_cascade_finds_nothing() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "car.xml", &never_pass_cascade());
    let filter = CascadePresenceFilter::new(&path, DetectionParams::default()).unwrap();

    let result = filter.detect(&checkerboard(160, 160, 20)).unwrap();
    assert!(!result.found);
    assert!(result.boxes.is_empty());
}

#[test]
fn test_flat_frame_finds_nothing() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "car.xml", ALWAYS_PASS_CASCADE);
    let filter = CascadePresenceFilter::new(&path, DetectionParams::default()).unwrap();

    let result = filter.detect(&RgbImage::from_pixel(160, 160, Rgb([90, 90, 90]))).unwrap();
    assert!(!result.found);
}

#[test]
fn test_frame_smaller_than_min_size_finds_nothing() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "car.xml", ALWAYS_PASS_CASCADE);
    let filter = CascadePresenceFilter::new(&path, DetectionParams::default()).unwrap();

    let result = filter.detect(&checkerboard(50, 50, 5)).unwrap();
    assert!(!result.found);
}

#[test]
fn test_cascade_loaded_once_across_threads() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "car.xml", ALWAYS_PASS_CASCADE);
    let params = DetectionParams {
        min_size: (20, 20),
        ..DetectionParams::default()
    };
    let filter = Arc::new(CascadePresenceFilter::new(&path, params).unwrap());
    assert!(!filter.is_initialized());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let filter = filter.clone();
            thread::spawn(move || filter.detect(&checkerboard(48, 48, 6)).map(|r| r.found))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert!(filter.is_initialized());
    assert_eq!(filter.load_count(), 1);
}

#[test]
fn test_missing_then_provided_cascade_recovers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("car.xml");
    let filter = CascadePresenceFilter::new(&path, DetectionParams::default()).unwrap();
    let frame = checkerboard(160, 160, 20);

    let err = filter.detect(&frame).unwrap_err();
    assert!(matches!(err, PresenceError::ResourceMissing(_)));
    assert_eq!(filter.load_count(), 0);

    write_file(dir.path(), "car.xml", ALWAYS_PASS_CASCADE);
    assert!(filter.detect(&frame).unwrap().found);
    assert_eq!(filter.load_count(), 1);
}

#[test]
fn test_malformed_cascade_is_invalid_resource() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "car.xml", "<opencv_storage><cascade></cascade>");
    let filter = CascadePresenceFilter::new(&path, DetectionParams::default()).unwrap();

    let err = filter.detect(&checkerboard(80, 80, 10)).unwrap_err();
    assert!(matches!(err, PresenceError::ResourceInvalid { .. }));
    assert!(err.is_configuration_error());
    assert!(!filter.is_initialized());
}

#[test]
fn test_oversized_rect_then_fixed_cascade_recovers() {
    let dir = tempdir().unwrap();
    let oversized = ALWAYS_PASS_CASCADE.replace("<_>0 10 20 10 1.</_>", "<_>10 0 4294967295 10 -1.</_>");
    let path = write_file(dir.path(), "car.xml", &oversized);
    let filter = CascadePresenceFilter::new(&path, DetectionParams::default()).unwrap();
    let frame = checkerboard(160, 160, 20);

    let err = filter.detect(&frame).unwrap_err();
    assert!(matches!(err, PresenceError::ResourceInvalid { .. }));

    write_file(dir.path(), "car.xml", ALWAYS_PASS_CASCADE);
    assert!(filter.detect(&frame).unwrap().found);
}

#[test]
fn test_cyclic_tree_is_invalid_resource() {
    let dir = tempdir().unwrap();
    let cyclic = ALWAYS_PASS_CASCADE.replace(
        "<internalNodes>0 -1 0 0.5</internalNodes>",
        "<internalNodes>1 -1 0 1e9 1 -1 0 1e9</internalNodes>",
    );
    let path = write_file(dir.path(), "car.xml", &cyclic);
    let filter = CascadePresenceFilter::new(&path, DetectionParams::default()).unwrap();

    let err = filter.detect(&checkerboard(160, 160, 20)).unwrap_err();
    assert!(matches!(err, PresenceError::ResourceInvalid { .. }));
    assert!(!filter.is_initialized());
}

#[test]
fn test_invalid_parameters_rejected_up_front() {
    let params = DetectionParams {
        scale_factor: 0.9,
        ..DetectionParams::default()
    };
    let err = CascadePresenceFilter::new("car.xml", params).unwrap_err();
    assert!(matches!(err, PresenceError::InvalidParameters(_)));
}
