use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use tracing::debug;

use crate::error::{Result, ScanError};

/// `page{page}_img{ordinal}.png`, both 1-based.
pub fn figure_file_name(page_index: usize, ordinal: usize) -> String {
    format!("page{page_index}_img{ordinal}.png")
}

/// Where figure crops go once cut out of a page.
pub trait FigureStore: Send + Sync {
    fn save_figure(&self, page_index: usize, ordinal: usize, figure: &DynamicImage)
        -> Result<PathBuf>;
}

/// Writes figures as PNG files into a single directory.
#[derive(Debug, Clone)]
pub struct DirFigureStore {
    dir: PathBuf,
}

impl DirFigureStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FigureStore for DirFigureStore {
    fn save_figure(
        &self,
        page_index: usize,
        ordinal: usize,
        figure: &DynamicImage,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| ScanError::io(&self.dir, e))?;
        let path = self.dir.join(figure_file_name(page_index, ordinal));
        save_image(figure, &path)?;
        debug!(path = %path.display(), "saved figure");
        Ok(path)
    }
}

pub fn save_image(image: &DynamicImage, path: &Path) -> Result<()> {
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| match e {
            image::ImageError::IoError(io) => ScanError::io(path, io),
            other => ScanError::Export(format!("cannot encode {}: {other}", path.display())),
        })
}
