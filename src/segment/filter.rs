use serde::{Deserialize, Serialize};

use crate::core::geometry::Rect;

/// Geometric test separating figure blocks from text lines and borders.
///
/// All comparisons are strict: a 100px wide box, or one exactly three
/// times taller than wide, is rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FigureFilter {
    pub min_width: u32,
    pub min_height: u32,
    pub max_aspect_ratio: f64,
}

impl Default for FigureFilter {
    fn default() -> Self {
        Self {
            min_width: 100,
            min_height: 100,
            max_aspect_ratio: 3.0,
        }
    }
}

impl FigureFilter {
    pub fn accepts(&self, rect: &Rect) -> bool {
        rect.width > self.min_width
            && rect.height > self.min_height
            && rect.aspect_ratio() < self.max_aspect_ratio
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegionOrder {
    /// Whatever order the contour scan produced.
    #[default]
    Discovery,
    /// Top-to-bottom, then left-to-right.
    Reading,
}

impl RegionOrder {
    pub fn apply(&self, rects: &mut [Rect]) {
        if *self == RegionOrder::Reading {
            rects.sort_by_key(|r| (r.y, r.x));
        }
    }
}

/// Overlap at or above which the later of two regions is dropped.
pub const MERGE_IOU: f64 = 0.5;

/// Drop every region contained in, or heavily overlapping, an earlier one.
pub fn merge_overlapping(rects: Vec<Rect>) -> Vec<Rect> {
    let mut kept: Vec<Rect> = Vec::with_capacity(rects.len());
    for rect in rects {
        let redundant = kept
            .iter()
            .any(|k| k.contains(&rect) || k.iou(&rect) >= MERGE_IOU);
        if !redundant {
            kept.push(rect);
        }
    }
    kept
}
