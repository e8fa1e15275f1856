// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Clustering of overlapping raw detections
//!
//! Matches OpenCV's `groupRectangles`: rectangles are partitioned by a
//! similarity predicate, each cluster is averaged, clusters with too few
//! members are dropped, and small clusters nested inside stronger ones are
//! suppressed.

use super::BoundingBox;

/// Relative tolerance used by the detector
pub const GROUP_EPS: f64 = 0.2;

fn similar(a: &BoundingBox, b: &BoundingBox, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    ((a.x - b.x).abs() as f64) <= delta
        && ((a.y - b.y).abs() as f64) <= delta
        && ((a.x + a.width - b.x - b.width).abs() as f64) <= delta
        && ((a.y + a.height - b.y - b.height).abs() as f64) <= delta
}

/// Equivalence classes under `similar`; labels follow first appearance
fn partition(rects: &[BoundingBox], eps: f64) -> (Vec<usize>, usize) {
    let n = rects.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&rects[i], &rects[j], eps) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    let mut class_of_root = vec![usize::MAX; n];
    let mut labels = vec![0; n];
    let mut classes = 0;
    for i in 0..n {
        let root = find(&mut parent, i);
        if class_of_root[root] == usize::MAX {
            class_of_root[root] = classes;
            classes += 1;
        }
        labels[i] = class_of_root[root];
    }
    (labels, classes)
}

/// Merge raw detections. A `group_threshold` of 0 returns the input as-is.
pub fn group_rectangles(rects: &[BoundingBox], group_threshold: usize, eps: f64) -> Vec<BoundingBox> {
    if group_threshold == 0 || rects.is_empty() {
        return rects.to_vec();
    }

    let (labels, classes) = partition(rects, eps);

    let mut sums = vec![[0i64; 4]; classes];
    let mut counts = vec![0usize; classes];
    for (rect, &label) in rects.iter().zip(labels.iter()) {
        let s = &mut sums[label];
        s[0] += rect.x as i64;
        s[1] += rect.y as i64;
        s[2] += rect.width as i64;
        s[3] += rect.height as i64;
        counts[label] += 1;
    }

    let averaged: Vec<BoundingBox> = sums
        .iter()
        .zip(counts.iter())
        .map(|(s, &n)| {
            let inv = 1.0 / n as f64;
            BoundingBox {
                x: (s[0] as f64 * inv).round_ties_even() as i32,
                y: (s[1] as f64 * inv).round_ties_even() as i32,
                width: (s[2] as f64 * inv).round_ties_even() as i32,
                height: (s[3] as f64 * inv).round_ties_even() as i32,
            }
        })
        .collect();

    let mut out = Vec::new();
    for i in 0..classes {
        let n1 = counts[i];
        if n1 <= group_threshold {
            continue;
        }
        let r1 = &averaged[i];

        let nested = (0..classes).any(|j| {
            let n2 = counts[j];
            if j == i || n2 <= group_threshold {
                return false;
            }
            let r2 = &averaged[j];
            let dx = (r2.width as f64 * eps).round_ties_even() as i32;
            let dy = (r2.height as f64 * eps).round_ties_even() as i32;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.x + r1.width <= r2.x + r2.width + dx
                && r1.y + r1.height <= r2.y + r2.height + dy
                && (n2 > n1.max(3) || n1 < 3)
        });

        if !nested {
            out.push(*r1);
        }
    }
    out
}
