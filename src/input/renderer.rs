use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::core::model::PageImage;
use crate::error::{Result, ScanError};

/// Rasterizes PDF pages with `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PageRenderer {
    dpi: u32,
}

impl PageRenderer {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Render one page; `page_index` is 1-based like pdftoppm's own numbering.
    pub fn render_page(&self, pdf_path: &Path, page_index: usize) -> Result<PageImage> {
        let work_dir = tempfile::Builder::new()
            .prefix("smartscan-render-")
            .tempdir()
            .map_err(|e| ScanError::Render(format!("cannot create render directory: {e}")))?;
        let prefix = work_dir.path().join("page");

        let output = Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg(page_index.to_string())
            .arg("-l")
            .arg(page_index.to_string())
            .arg(pdf_path)
            .arg(&prefix)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    ScanError::Render("pdftoppm not found; is poppler-utils installed?".into())
                }
                _ => ScanError::Render(format!("failed to invoke pdftoppm: {e}")),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScanError::Render(format!(
                "pdftoppm failed on page {page_index}: {}",
                stderr.trim()
            )));
        }

        // pdftoppm zero-pads the page number depending on the page count,
        // so look for whatever it produced instead of guessing the name.
        let image_path = find_rendered(work_dir.path())?;
        let image = image::open(&image_path)
            .map_err(|e| ScanError::Decode(format!("{}: {e}", image_path.display())))?;
        debug!(page = page_index, dpi = self.dpi, "rendered page");

        Ok(PageImage::new(page_index, image))
    }
}

fn find_rendered(dir: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(dir).map_err(|e| ScanError::io(dir, e))?;
    entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .find(|path| path.extension().is_some_and(|ext| ext == "png"))
        .ok_or_else(|| ScanError::Render("pdftoppm produced no image".into()))
}
