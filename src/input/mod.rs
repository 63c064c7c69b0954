pub mod docx_reader;
pub mod pdf_reader;
pub mod renderer;

pub use docx_reader::DocxReader;
pub use pdf_reader::PdfReader;
pub use renderer::PageRenderer;

use std::path::{Path, PathBuf};

use crate::core::model::PageImage;
use crate::error::{Result, ScanError};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Image,
    /// Text is read from the document body instead of recognized.
    Docx,
}

impl InputKind {
    /// Classify by file extension; anything unknown is a client error.
    pub fn detect(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| {
                ScanError::UnsupportedInput(format!("{} has no file extension", path.display()))
            })?;

        if ext == "pdf" {
            Ok(InputKind::Pdf)
        } else if ext == "docx" {
            Ok(InputKind::Docx)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Ok(InputKind::Image)
        } else {
            Err(ScanError::UnsupportedInput(format!(
                "'.{ext}' files are not supported (expected pdf, docx, {})",
                IMAGE_EXTENSIONS.join(", ")
            )))
        }
    }
}

/// Anything that hands out page images by 1-based index.
pub trait PageLoader: Sync {
    fn page_count(&self) -> usize;

    fn load_page(&self, index: usize) -> Result<PageImage>;
}

/// Pages of one input document, loaded lazily one at a time.
#[derive(Debug, Clone)]
pub enum PageSource {
    Pdf {
        reader: PdfReader,
        renderer: PageRenderer,
        pages: usize,
    },
    Image(PathBuf),
}

impl PageSource {
    pub fn open(path: &Path, dpi: u32) -> Result<Self> {
        match InputKind::detect(path)? {
            InputKind::Pdf => {
                let reader = PdfReader::new(path.to_path_buf())?;
                let pages = reader.page_count()?;
                Ok(PageSource::Pdf {
                    reader,
                    renderer: PageRenderer::new(dpi),
                    pages,
                })
            }
            InputKind::Image => {
                if !path.is_file() {
                    return Err(ScanError::Decode(format!(
                        "image not found: {}",
                        path.display()
                    )));
                }
                Ok(PageSource::Image(path.to_path_buf()))
            }
            InputKind::Docx => Err(ScanError::UnsupportedInput(format!(
                "{} has no page images; read it with DocxReader",
                path.display()
            ))),
        }
    }
}

impl PageLoader for PageSource {
    fn page_count(&self) -> usize {
        match self {
            PageSource::Pdf { pages, .. } => *pages,
            PageSource::Image(_) => 1,
        }
    }

    fn load_page(&self, index: usize) -> Result<PageImage> {
        match self {
            PageSource::Pdf {
                reader, renderer, ..
            } => renderer.render_page(reader.path(), index),
            PageSource::Image(path) => {
                let image = image::open(path)
                    .map_err(|e| ScanError::Decode(format!("{}: {e}", path.display())))?;
                Ok(PageImage::new(index, image))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    #[test]
    fn detects_supported_kinds() {
        assert_eq!(InputKind::detect(Path::new("scan.PDF")).unwrap(), InputKind::Pdf);
        assert_eq!(InputKind::detect(Path::new("a/b.jpeg")).unwrap(), InputKind::Image);
        assert_eq!(InputKind::detect(Path::new("x.tif")).unwrap(), InputKind::Image);
        assert_eq!(InputKind::detect(Path::new("memo.DOCX")).unwrap(), InputKind::Docx);
    }

    #[test]
    fn rejects_unknown_kinds() {
        for name in ["notes.xml", "archive.zip", "letter.doc", "README"] {
            let err = InputKind::detect(Path::new(name)).unwrap_err();
            assert!(matches!(err, ScanError::UnsupportedInput(_)), "{name}");
        }
    }

    #[test]
    fn image_source_is_single_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        DynamicImage::ImageRgb8(RgbImage::new(30, 20))
            .save(&path)
            .unwrap();

        let source = PageSource::open(&path, 300).unwrap();
        assert_eq!(source.page_count(), 1);
        let page = source.load_page(1).unwrap();
        assert_eq!(page.index, 1);
        assert_eq!((page.width(), page.height()), (30, 20));
    }

    #[test]
    fn corrupt_image_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not really a png").unwrap();

        let source = PageSource::open(&path, 300).unwrap();
        assert!(matches!(source.load_page(1), Err(ScanError::Decode(_))));
    }
}
