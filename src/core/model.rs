use std::path::PathBuf;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::core::geometry::Rect;

/// One rasterized page. `index` is 1-based.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub index: usize,
    pub image: DynamicImage,
}

impl PageImage {
    pub fn new(index: usize, image: DynamicImage) -> Self {
        Self { index, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendUsed {
    Primary,
    Fallback,
    Failed,
}

impl BackendUsed {
    pub fn label(&self) -> &'static str {
        match self {
            BackendUsed::Primary => "primary",
            BackendUsed::Fallback => "fallback",
            BackendUsed::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionResult {
    pub text: String,
    pub backend_used: BackendUsed,
}

impl RecognitionResult {
    pub fn primary(text: String) -> Self {
        Self {
            text,
            backend_used: BackendUsed::Primary,
        }
    }

    pub fn fallback(text: String) -> Self {
        Self {
            text,
            backend_used: BackendUsed::Fallback,
        }
    }

    pub fn failed() -> Self {
        Self {
            text: String::new(),
            backend_used: BackendUsed::Failed,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.backend_used == BackendUsed::Failed
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FigureRegion {
    pub bbox: Rect,
    pub page_index: usize,
}

/// A persisted figure crop. Pixel data lives in storage; only the path is kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedFigure {
    pub region: FigureRegion,
    /// 1-based position among the page's accepted regions.
    pub ordinal: usize,
    pub path: PathBuf,
}

impl ExtractedFigure {
    pub fn id(&self) -> (usize, usize) {
        (self.region.page_index, self.ordinal)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub page_index: usize,
    pub text: String,
    pub backend_used: BackendUsed,
    pub figures: Vec<ExtractedFigure>,
    pub width: u32,
    pub height: u32,
}

impl PageRecord {
    /// Placeholder for a page that could not be processed at all.
    pub fn empty(page_index: usize) -> Self {
        Self {
            page_index,
            text: String::new(),
            backend_used: BackendUsed::Failed,
            figures: Vec::new(),
            width: 0,
            height: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub pages: Vec<PageRecord>,
}

impl DocumentRecord {
    /// Pages are kept in ascending page order whatever order they arrive in.
    pub fn new(mut pages: Vec<PageRecord>) -> Self {
        pages.sort_by_key(|page| page.page_index);
        Self { pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn figure_count(&self) -> usize {
        self.pages.iter().map(|page| page.figures.len()).sum()
    }

    pub fn is_multi_page(&self) -> bool {
        self.pages.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_restores_page_order() {
        let document = DocumentRecord::new(vec![
            PageRecord::empty(3),
            PageRecord::empty(1),
            PageRecord::empty(2),
        ]);
        let order: Vec<_> = document.pages.iter().map(|p| p.page_index).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn failed_result_has_no_text() {
        let result = RecognitionResult::failed();
        assert!(result.is_failed());
        assert!(result.text.is_empty());
    }
}
