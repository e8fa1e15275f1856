// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Haar cascade resource and multi-scale sliding-window detection
//!
//! Reads OpenCV cascade XML in both the current `<cascade>` layout and the
//! legacy `opencv-haar-classifier` layout, and evaluates it the way OpenCV's
//! `detectMultiScale` does: image pyramid, variance-normalized Haar features
//! on integral images, boosted stages with early rejection, then rectangle
//! grouping.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::GrayImage;
use roxmltree::{Document, Node};
use thiserror::Error;

use super::grouping::{group_rectangles, GROUP_EPS};
use super::integral::IntegralImage;
use super::{BoundingBox, DetectionParams};

const THRESHOLD_EPS: f32 = 1e-5;

/// Windows whose intensity std-dev is at or below this are skipped
const MIN_WINDOW_STDDEV: f64 = 10.0;

#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("{0}")]
    Invalid(String),
}

fn invalid(msg: impl Into<String>) -> CascadeError {
    CascadeError::Invalid(msg.into())
}

#[derive(Debug, Clone, PartialEq)]
struct WeightedRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct Feature {
    rects: Vec<WeightedRect>,
}

/// Internal tree node. Children `<= 0` index leaves (negated), `> 0` nodes.
#[derive(Debug, Clone, PartialEq)]
struct TreeNode {
    feature: usize,
    threshold: f32,
    left: i32,
    right: i32,
}

#[derive(Debug, Clone, PartialEq)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
struct Stage {
    threshold: f32,
    classifiers: Vec<WeakClassifier>,
}

/// Outcome of evaluating one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowResult {
    /// Low-variance patch, not evaluated
    Skipped,
    /// Rejected at the given stage
    Rejected(usize),
    Accepted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HaarCascade {
    width: u32,
    height: u32,
    stages: Vec<Stage>,
    features: Vec<Feature>,
}

impl HaarCascade {
    pub fn from_file(path: &Path) -> Result<Self, CascadeError> {
        let text = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        Self::from_xml(&text)
    }

    pub fn from_xml(text: &str) -> Result<Self, CascadeError> {
        let doc = Document::parse(text)?;
        let root = doc.root_element();
        let body = if root.has_tag_name("opencv_storage") {
            root.children()
                .find(|n| n.is_element())
                .ok_or_else(|| invalid("empty opencv_storage"))?
        } else {
            root
        };

        let cascade = if body.has_tag_name("cascade") || child(body, "stageType").is_some() {
            parse_current(body)?
        } else if child(body, "size").is_some() && child(body, "stages").is_some() {
            parse_legacy(body)?
        } else {
            return Err(invalid(format!(
                "unrecognized cascade element <{}>",
                body.tag_name().name()
            )));
        };

        cascade.validate()?;
        Ok(cascade)
    }

    /// Training window size
    pub fn window(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    fn validate(&self) -> Result<(), CascadeError> {
        if self.width < 3 || self.height < 3 {
            return Err(invalid(format!("window {}x{} is too small", self.width, self.height)));
        }
        if self.stages.is_empty() {
            return Err(invalid("cascade has no stages"));
        }

        for (fi, feature) in self.features.iter().enumerate() {
            if feature.rects.is_empty() {
                return Err(invalid(format!("feature {} has no rectangles", fi)));
            }
            for r in &feature.rects {
                let right = r.x.checked_add(r.width);
                let bottom = r.y.checked_add(r.height);
                if right.map_or(true, |v| v > self.width) || bottom.map_or(true, |v| v > self.height) {
                    return Err(invalid(format!("feature {} rectangle exceeds the window", fi)));
                }
            }
        }

        for (si, stage) in self.stages.iter().enumerate() {
            if stage.classifiers.is_empty() {
                return Err(invalid(format!("stage {} has no classifiers", si)));
            }
            for weak in &stage.classifiers {
                if weak.nodes.is_empty() {
                    return Err(invalid(format!("stage {} has an empty tree", si)));
                }
                for (ni, node) in weak.nodes.iter().enumerate() {
                    if node.feature >= self.features.len() {
                        return Err(invalid(format!(
                            "stage {} references feature {} of {}",
                            si,
                            node.feature,
                            self.features.len()
                        )));
                    }
                    // internal children come after their parent, so every walk ends at a leaf
                    for childref in [node.left, node.right] {
                        if childref > 0 {
                            let child = childref as usize;
                            if child >= weak.nodes.len() {
                                return Err(invalid(format!("stage {} has a dangling tree reference", si)));
                            }
                            if child <= ni {
                                return Err(invalid(format!(
                                    "stage {}: node {} points back to node {}",
                                    si, ni, child
                                )));
                            }
                        } else if childref.unsigned_abs() as usize >= weak.leaves.len() {
                            return Err(invalid(format!("stage {} has a dangling tree reference", si)));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Raw candidate windows over the image pyramid, before grouping
    pub fn scan(&self, gray: &GrayImage, params: &DetectionParams) -> Vec<BoundingBox> {
        let (img_w, img_h) = gray.dimensions();
        let (min_w, min_h) = params.min_size;
        let (max_w, max_h) = params.max_size.unwrap_or((img_w, img_h));
        let mut found = Vec::new();

        let mut factor = 1.0f64;
        loop {
            let win_w = (self.width as f64 * factor).round_ties_even() as u32;
            let win_h = (self.height as f64 * factor).round_ties_even() as u32;
            let scaled_w = (img_w as f64 / factor).round_ties_even() as u32;
            let scaled_h = (img_h as f64 / factor).round_ties_even() as u32;

            if scaled_w <= self.width || scaled_h <= self.height {
                break;
            }
            if win_w > max_w || win_h > max_h {
                break;
            }
            if win_w >= min_w && win_h >= min_h {
                self.scan_scale(gray, factor, scaled_w, scaled_h, &mut found);
            }

            factor *= params.scale_factor;
        }

        found
    }

    /// Full detection: pyramid scan followed by grouping
    pub fn detect_multi_scale(&self, gray: &GrayImage, params: &DetectionParams) -> Vec<BoundingBox> {
        let raw = self.scan(gray, params);
        group_rectangles(&raw, params.min_neighbors, GROUP_EPS)
    }

    fn scan_scale(&self, gray: &GrayImage, factor: f64, scaled_w: u32, scaled_h: u32, out: &mut Vec<BoundingBox>) {
        let scaled;
        let image = if (scaled_w, scaled_h) == gray.dimensions() {
            gray
        } else {
            scaled = imageops::resize(gray, scaled_w, scaled_h, FilterType::Triangle);
            &scaled
        };
        let integral = IntegralImage::new(image);

        let step = if factor > 2.0 { 1 } else { 2 };
        let win_w = (self.width as f64 * factor).round_ties_even() as i32;
        let win_h = (self.height as f64 * factor).round_ties_even() as i32;
        let last_x = (scaled_w - self.width) as usize;
        let last_y = (scaled_h - self.height) as usize;

        let mut y = 0;
        while y <= last_y {
            let mut x = 0;
            while x <= last_x {
                match self.evaluate(&integral, x, y) {
                    WindowResult::Accepted => out.push(BoundingBox {
                        x: (x as f64 * factor).round_ties_even() as i32,
                        y: (y as f64 * factor).round_ties_even() as i32,
                        width: win_w,
                        height: win_h,
                    }),
                    // first-stage rejection: neighbours are unlikely too
                    WindowResult::Rejected(0) => x += step,
                    _ => {}
                }
                x += step;
            }
            y += step;
        }
    }

    fn evaluate(&self, ii: &IntegralImage, x: usize, y: usize) -> WindowResult {
        let nw = (self.width - 2) as usize;
        let nh = (self.height - 2) as usize;
        let area = (nw * nh) as f64;
        let sum = ii.sum(x + 1, y + 1, nw, nh);
        let sqsum = ii.sqsum(x + 1, y + 1, nw, nh);

        let nf = area * sqsum - sum * sum;
        if nf <= 0.0 {
            return WindowResult::Skipped;
        }
        let nf = nf.sqrt();
        // nf = area * stddev
        if nf <= area * MIN_WINDOW_STDDEV {
            return WindowResult::Skipped;
        }
        let inv_norm = 1.0 / nf;

        for (si, stage) in self.stages.iter().enumerate() {
            let mut total = 0.0f32;
            for weak in &stage.classifiers {
                let mut idx = 0i32;
                loop {
                    let node = &weak.nodes[idx as usize];
                    let value = (self.feature_value(ii, node.feature, x, y) * inv_norm) as f32;
                    idx = if value < node.threshold { node.left } else { node.right };
                    if idx <= 0 {
                        break;
                    }
                }
                total += weak.leaves[(-idx) as usize];
            }
            if total < stage.threshold {
                return WindowResult::Rejected(si);
            }
        }
        WindowResult::Accepted
    }

    fn feature_value(&self, ii: &IntegralImage, feature: usize, x: usize, y: usize) -> f64 {
        self.features[feature]
            .rects
            .iter()
            .map(|r| {
                r.weight as f64
                    * ii.sum(
                        x + r.x as usize,
                        y + r.y as usize,
                        r.width as usize,
                        r.height as usize,
                    )
            })
            .sum()
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn items<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn text<'a>(node: Node<'a, '_>) -> &'a str {
    node.text().unwrap_or("").trim()
}

fn required<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>, CascadeError> {
    child(node, name).ok_or_else(|| invalid(format!("missing <{}>", name)))
}

fn numbers<T: std::str::FromStr>(s: &str, what: &str) -> Result<Vec<T>, CascadeError> {
    s.split_whitespace()
        .map(|tok| tok.parse::<T>().map_err(|_| invalid(format!("bad number '{}' in {}", tok, what))))
        .collect()
}

fn number<T: std::str::FromStr>(node: Node, name: &str) -> Result<T, CascadeError> {
    let raw = text(required(node, name)?);
    raw.parse::<T>()
        .map_err(|_| invalid(format!("bad number '{}' in <{}>", raw, name)))
}

fn parse_feature(node: Node, window: (u32, u32)) -> Result<Feature, CascadeError> {
    if let Some(tilted) = child(node, "tilted") {
        if text(tilted) != "0" {
            return Err(invalid("tilted features are not supported"));
        }
    }

    let rects = items(required(node, "rects")?)
        .map(|r| {
            let v: Vec<f32> = numbers(text(r), "rect")?;
            if v.len() != 5 || v[..4].iter().any(|c| !c.is_finite() || *c < 0.0) {
                return Err(invalid(format!("malformed rect '{}'", text(r))));
            }
            let limit = window.0.max(window.1) as f32;
            if v[..4].iter().any(|c| *c > limit) {
                return Err(invalid(format!("rect '{}' exceeds the {}x{} window", text(r), window.0, window.1)));
            }
            Ok(WeightedRect {
                x: v[0] as u32,
                y: v[1] as u32,
                width: v[2] as u32,
                height: v[3] as u32,
                weight: v[4],
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Feature { rects })
}

fn parse_current(body: Node) -> Result<HaarCascade, CascadeError> {
    let stage_type = text(required(body, "stageType")?);
    if stage_type != "BOOST" {
        return Err(invalid(format!("unsupported stage type {}", stage_type)));
    }
    let feature_type = text(required(body, "featureType")?);
    if feature_type != "HAAR" {
        return Err(invalid(format!("unsupported feature type {}", feature_type)));
    }

    let width: u32 = number(body, "width")?;
    let height: u32 = number(body, "height")?;

    let stages = items(required(body, "stages")?)
        .enumerate()
        .map(|(si, stage)| {
            let threshold: f32 = number(stage, "stageThreshold")?;
            let classifiers = items(required(stage, "weakClassifiers")?)
                .map(|weak| {
                    let raw: Vec<f64> = numbers(text(required(weak, "internalNodes")?), "internalNodes")?;
                    let leaves: Vec<f32> = numbers(text(required(weak, "leafValues")?), "leafValues")?;
                    if raw.is_empty() || raw.len() % 4 != 0 {
                        return Err(invalid(format!("stage {}: malformed internalNodes", si)));
                    }
                    let nodes = raw
                        .chunks_exact(4)
                        .map(|c| {
                            if c[2] < 0.0 {
                                return Err(invalid(format!("stage {}: negative feature index", si)));
                            }
                            Ok(TreeNode {
                                left: c[0] as i32,
                                right: c[1] as i32,
                                feature: c[2] as usize,
                                threshold: c[3] as f32,
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(WeakClassifier { nodes, leaves })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Stage {
                threshold: threshold - THRESHOLD_EPS,
                classifiers,
            })
        })
        .collect::<Result<Vec<_>, CascadeError>>()?;

    let features = items(required(body, "features")?)
        .map(|feature| parse_feature(feature, (width, height)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HaarCascade {
        width,
        height,
        stages,
        features,
    })
}

fn parse_legacy(body: Node) -> Result<HaarCascade, CascadeError> {
    let size: Vec<u32> = numbers(text(required(body, "size")?), "size")?;
    let [width, height] = size[..] else {
        return Err(invalid("<size> must hold width and height"));
    };

    let mut features = Vec::new();
    let mut stages = Vec::new();

    for stage in items(required(body, "stages")?) {
        let threshold: f32 = number(stage, "stage_threshold")?;
        let mut classifiers = Vec::new();

        for tree in items(required(stage, "trees")?) {
            let mut nodes = Vec::new();
            let mut leaves = Vec::new();

            for node in items(tree) {
                let feature = features.len();
                features.push(parse_feature(required(node, "feature")?, (width, height))?);
                let node_threshold: f32 = number(node, "threshold")?;

                let mut branch = |val: &str, next: &str| -> Result<i32, CascadeError> {
                    if child(node, val).is_some() {
                        leaves.push(number::<f32>(node, val)?);
                        Ok(-((leaves.len() - 1) as i32))
                    } else {
                        number::<i32>(node, next)
                    }
                };
                let left = branch("left_val", "left_node")?;
                let right = branch("right_val", "right_node")?;

                nodes.push(TreeNode {
                    feature,
                    threshold: node_threshold,
                    left,
                    right,
                });
            }

            classifiers.push(WeakClassifier { nodes, leaves });
        }

        stages.push(Stage {
            threshold: threshold - THRESHOLD_EPS,
            classifiers,
        });
    }

    Ok(HaarCascade {
        width,
        height,
        stages,
        features,
    })
}
