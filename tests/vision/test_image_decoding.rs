// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use car_damage_node::vision::{
    decode_image_bytes, preprocess_for_classifier, ImageError, CLASSIFIER_INPUT_SIZE, MAX_IMAGE_SIZE,
};
use image::{ImageFormat, Rgb, RgbImage};

use crate::common::{checkerboard, jpeg_bytes, png_bytes};

#[test]
fn test_png_and_jpeg_uploads_decode_to_rgb() {
    let frame = checkerboard(64, 48, 8);

    let (decoded, info) = decode_image_bytes(&png_bytes(&frame)).unwrap();
    assert_eq!(info.format, ImageFormat::Png);
    assert_eq!(decoded, frame);

    let (decoded, info) = decode_image_bytes(&jpeg_bytes(&frame)).unwrap();
    assert_eq!(info.format, ImageFormat::Jpeg);
    assert_eq!(decoded.dimensions(), (64, 48));
}

#[test]
fn test_garbage_and_oversized_uploads_rejected() {
    assert!(decode_image_bytes(b"hello world, not an image").is_err());
    assert!(matches!(decode_image_bytes(&[]), Err(ImageError::EmptyData)));

    let huge = vec![0u8; MAX_IMAGE_SIZE + 1];
    assert!(matches!(decode_image_bytes(&huge), Err(ImageError::TooLarge(_, _))));
}

#[test]
fn test_preprocessing_normalizes_to_imagenet_stats() {
    let frame = RgbImage::from_pixel(31, 17, Rgb([124, 116, 104]));
    let input = preprocess_for_classifier(&frame);
    let size = CLASSIFIER_INPUT_SIZE as usize;
    assert_eq!(input.shape(), &[1, 3, size, size]);

    // (124/255 - 0.485) / 0.229 is close to zero
    assert!(input[[0, 0, 100, 100]].abs() < 0.01);
    assert!(input[[0, 1, 0, 0]].abs() < 0.01);
    assert!(input[[0, 2, 223, 223]].abs() < 0.01);
}
