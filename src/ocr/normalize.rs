use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NormalizeOptions {
    /// Integer upscaling factor applied to both dimensions.
    pub scale: u32,
    /// Flip polarity so light-on-dark scans become dark-on-light.
    pub invert: bool,
    /// Histogram equalization before upscaling.
    pub equalize: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            scale: 2,
            invert: true,
            equalize: false,
        }
    }
}

/// Prepares page images for recognition: grayscale, invert, upscale.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    options: NormalizeOptions,
}

impl Normalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    pub fn normalize(&self, image: &DynamicImage) -> GrayImage {
        let mut gray = image.to_luma8();
        if self.options.invert {
            imageops::invert(&mut gray);
        }
        if self.options.equalize {
            gray = imageproc::contrast::equalize_histogram(&gray);
        }

        let scale = self.options.scale.max(1);
        if scale == 1 {
            return gray;
        }
        imageops::resize(
            &gray,
            gray.width() * scale,
            gray.height() * scale,
            FilterType::CatmullRom,
        )
    }

    /// Decode an encoded image (PNG, JPEG, ...) and normalize it.
    pub fn normalize_bytes(&self, bytes: &[u8]) -> Result<GrayImage> {
        let image =
            image::load_from_memory(bytes).map_err(|e| ScanError::Decode(e.to_string()))?;
        Ok(self.normalize(&image))
    }
}
