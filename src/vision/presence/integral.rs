// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Summed-area tables for constant-time rectangle sums

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image};

type Table = ImageBuffer<Luma<u64>, Vec<u64>>;

/// Integral and squared-integral images with a zero top row and left column
#[derive(Debug, Clone)]
pub struct IntegralImage {
    width: u32,
    height: u32,
    sum: Table,
    sqsum: Table,
}

impl IntegralImage {
    pub fn new(gray: &GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        Self {
            width,
            height,
            sum: integral_image::<_, u64>(gray),
            sqsum: integral_squared_image::<_, u64>(gray),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Sum of pixels in `[x, x+w) x [y, y+h)`; caller keeps it in bounds
    pub fn sum(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        Self::area(&self.sum, x, y, w, h)
    }

    pub fn sqsum(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        Self::area(&self.sqsum, x, y, w, h)
    }

    fn area(table: &Table, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let stride = table.width() as usize;
        let raw = table.as_raw();
        let top = y * stride;
        let bottom = (y + h) * stride;
        let total = raw[bottom + x + w] + raw[top + x] - raw[bottom + x] - raw[top + x + w];
        total as f64
    }
}
