pub mod binarize;
pub mod filter;

pub use filter::{FigureFilter, RegionOrder};

use image::{DynamicImage, GrayImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::geometry::Rect;
use crate::core::model::FigureRegion;
use binarize::{smoothed_gray, threshold_inverse, DEFAULT_BLUR_SIGMA, DEFAULT_THRESHOLD};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentOptions {
    pub blur_sigma: f32,
    pub threshold: u8,
    pub filter: FigureFilter,
    pub order: RegionOrder,
    pub merge_overlapping: bool,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            blur_sigma: DEFAULT_BLUR_SIGMA,
            threshold: DEFAULT_THRESHOLD,
            filter: FigureFilter::default(),
            order: RegionOrder::Discovery,
            merge_overlapping: false,
        }
    }
}

/// Finds figure-shaped blocks of dark ink on a light page.
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    options: SegmentOptions,
}

impl Segmenter {
    pub fn new(options: SegmentOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SegmentOptions {
        &self.options
    }

    /// Foreground mask the contour scan runs on.
    pub fn binary_mask(&self, image: &DynamicImage) -> GrayImage {
        let gray = smoothed_gray(image, self.options.blur_sigma);
        threshold_inverse(&gray, self.options.threshold)
    }

    pub fn segment_figures(&self, image: &DynamicImage, page_index: usize) -> Vec<FigureRegion> {
        let mask = self.binary_mask(image);
        let contours: Vec<Contour<u32>> = find_contours(&mask);

        let mut rects: Vec<Rect> = contours
            .iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter_map(|c| Rect::bounding(c.points.iter().map(|p| (p.x, p.y))))
            .filter(|rect| self.options.filter.accepts(rect))
            .collect();
        debug!(
            page = page_index,
            contours = contours.len(),
            accepted = rects.len(),
            "segmented page"
        );

        if self.options.merge_overlapping {
            rects = filter::merge_overlapping(rects);
        }
        self.options.order.apply(&mut rects);

        rects
            .into_iter()
            .map(|bbox| FigureRegion { bbox, page_index })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn page_with_blocks(blocks: &[Rect]) -> DynamicImage {
        let mut img = RgbImage::from_pixel(800, 1000, Rgb([255, 255, 255]));
        for block in blocks {
            for y in block.y..block.bottom() {
                for x in block.x..block.right() {
                    img.put_pixel(x, y, Rgb([20, 20, 20]));
                }
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    fn near(actual: &Rect, expected: &Rect) -> bool {
        let close = |a: u32, b: u32| a.abs_diff(b) <= 2;
        close(actual.x, expected.x)
            && close(actual.y, expected.y)
            && close(actual.width, expected.width)
            && close(actual.height, expected.height)
    }

    #[test]
    fn blank_page_has_no_figures() {
        let regions = Segmenter::default().segment_figures(&page_with_blocks(&[]), 1);
        assert!(regions.is_empty());
    }

    #[test]
    fn finds_single_dark_block() {
        let block = Rect::new(200, 300, 150, 150);
        let regions = Segmenter::default().segment_figures(&page_with_blocks(&[block]), 1);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].page_index, 1);
        assert!(
            near(&regions[0].bbox, &block),
            "unexpected bbox {:?}",
            regions[0].bbox
        );
        assert!(regions[0].bbox.contains(&block));
    }

    #[test]
    fn skips_text_like_strokes() {
        let page = page_with_blocks(&[
            Rect::new(50, 50, 600, 20),
            Rect::new(50, 100, 4, 700),
            Rect::new(400, 400, 60, 60),
        ]);
        assert!(Segmenter::default().segment_figures(&page, 2).is_empty());
    }

    #[test]
    fn nested_blocks_report_only_the_outer_one() {
        // A hollow frame with a figure inside it: only the frame counts.
        let mut img = RgbImage::from_pixel(800, 800, Rgb([255, 255, 255]));
        for y in 100..600u32 {
            for x in 100..600u32 {
                let on_border = x < 110 || x >= 590 || y < 110 || y >= 590;
                let inner = (250..400).contains(&x) && (250..400).contains(&y);
                if on_border || inner {
                    img.put_pixel(x, y, Rgb([0, 0, 0]));
                }
            }
        }
        let regions = Segmenter::default().segment_figures(&DynamicImage::ImageRgb8(img), 1);
        assert_eq!(regions.len(), 1);
        assert!(near(&regions[0].bbox, &Rect::new(100, 100, 500, 500)));
    }

    #[test]
    fn reading_order_is_top_to_bottom() {
        let lower = Rect::new(100, 600, 200, 200);
        let upper = Rect::new(400, 100, 200, 200);
        let segmenter = Segmenter::new(SegmentOptions {
            order: RegionOrder::Reading,
            ..SegmentOptions::default()
        });
        let regions = segmenter.segment_figures(&page_with_blocks(&[lower, upper]), 1);
        assert_eq!(regions.len(), 2);
        assert!(near(&regions[0].bbox, &upper));
        assert!(near(&regions[1].bbox, &lower));
    }
}
