pub mod bridge;
pub mod normalize;
pub mod process;
pub mod recognizer;
pub mod tesseract;

pub use bridge::{BridgeModel, NeuralBackend, SequenceModel};
pub use normalize::{NormalizeOptions, Normalizer};
pub use recognizer::Recognizer;
pub use tesseract::TesseractBackend;

use image::GrayImage;

use crate::error::Result;

/// A single OCR engine: image in, text out.
///
/// Implementations are shared read-only across pages (and threads when
/// pages are processed in parallel), so they must not mutate state per call.
pub trait OcrBackend: Send + Sync {
    /// Human readable engine name, used in provenance markers.
    fn name(&self) -> &str;

    /// `lang` is a Tesseract-style language code; engines that are not
    /// language-parameterized ignore it.
    fn recognize_text(&self, image: &GrayImage, lang: &str) -> Result<String>;
}

impl<T: OcrBackend + ?Sized> OcrBackend for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn recognize_text(&self, image: &GrayImage, lang: &str) -> Result<String> {
        (**self).recognize_text(image, lang)
    }
}
