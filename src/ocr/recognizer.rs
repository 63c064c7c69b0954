use image::GrayImage;
use tracing::{debug, warn};

use crate::core::model::RecognitionResult;
use crate::core::text::with_provenance;
use crate::ocr::OcrBackend;

pub const DEFAULT_LANGUAGE: &str = "eng";

enum Policy {
    Single(Box<dyn OcrBackend>),
    PrimaryFallback {
        primary: Box<dyn OcrBackend>,
        fallback: Box<dyn OcrBackend>,
    },
}

/// Outcome of one backend call.
enum Attempt {
    Text(String),
    Empty,
    Failed,
}

/// Uniform recognition entry point over one or two backends.
///
/// Never returns an error: a failed recognition is reported as
/// [`BackendUsed::Failed`](crate::core::model::BackendUsed::Failed) with
/// empty text. Each backend is called at most once per `recognize`.
pub struct Recognizer {
    policy: Policy,
    default_lang: String,
    tag_provenance: bool,
}

impl Recognizer {
    /// One backend, no provenance marker.
    pub fn single(backend: Box<dyn OcrBackend>) -> Self {
        Self {
            policy: Policy::Single(backend),
            default_lang: DEFAULT_LANGUAGE.to_string(),
            tag_provenance: false,
        }
    }

    /// Try `primary`, then `fallback` when it errors or yields only
    /// whitespace. Results carry a `[via <backend>]` marker.
    pub fn with_fallback(primary: Box<dyn OcrBackend>, fallback: Box<dyn OcrBackend>) -> Self {
        Self {
            policy: Policy::PrimaryFallback { primary, fallback },
            default_lang: DEFAULT_LANGUAGE.to_string(),
            tag_provenance: true,
        }
    }

    pub fn with_default_lang(mut self, lang: impl Into<String>) -> Self {
        self.default_lang = lang.into();
        self
    }

    pub fn with_provenance(mut self, enabled: bool) -> Self {
        self.tag_provenance = enabled;
        self
    }

    pub fn default_lang(&self) -> &str {
        &self.default_lang
    }

    pub fn describe(&self) -> String {
        match &self.policy {
            Policy::Single(backend) => backend.name().to_string(),
            Policy::PrimaryFallback { primary, fallback } => {
                format!("{} -> {}", primary.name(), fallback.name())
            }
        }
    }

    pub fn recognize(&self, image: &GrayImage, lang: Option<&str>) -> RecognitionResult {
        let lang = lang
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(&self.default_lang);

        match &self.policy {
            Policy::Single(backend) => match attempt(backend.as_ref(), image, lang) {
                Attempt::Text(text) => {
                    RecognitionResult::primary(self.tag(text, backend.as_ref()))
                }
                Attempt::Empty | Attempt::Failed => RecognitionResult::failed(),
            },
            Policy::PrimaryFallback { primary, fallback } => {
                if let Attempt::Text(text) = attempt(primary.as_ref(), image, lang) {
                    return RecognitionResult::primary(self.tag(text, primary.as_ref()));
                }
                debug!(backend = fallback.name(), "falling back");
                match attempt(fallback.as_ref(), image, lang) {
                    Attempt::Text(text) => {
                        RecognitionResult::fallback(self.tag(text, fallback.as_ref()))
                    }
                    Attempt::Empty | Attempt::Failed => RecognitionResult::failed(),
                }
            }
        }
    }

    fn tag(&self, text: String, backend: &dyn OcrBackend) -> String {
        if self.tag_provenance {
            with_provenance(&text, backend.name())
        } else {
            text
        }
    }
}

fn attempt(backend: &dyn OcrBackend, image: &GrayImage, lang: &str) -> Attempt {
    match backend.recognize_text(image, lang) {
        Ok(text) if text.trim().is_empty() => {
            debug!(backend = backend.name(), "no text recognized");
            Attempt::Empty
        }
        Ok(text) => Attempt::Text(text.trim().to_string()),
        Err(err) => {
            warn!(backend = backend.name(), "recognition failed: {err}");
            Attempt::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::BackendUsed;
    use crate::error::{Result, ScanError};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    enum Reply {
        Text(&'static str),
        Fail,
    }

    #[derive(Clone)]
    struct FakeBackend {
        name: &'static str,
        reply: Reply,
        calls: Arc<AtomicUsize>,
        langs: Arc<Mutex<Vec<String>>>,
    }

    impl FakeBackend {
        fn new(name: &'static str, reply: Reply) -> Self {
            Self {
                name,
                reply,
                calls: Arc::new(AtomicUsize::new(0)),
                langs: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl OcrBackend for FakeBackend {
        fn name(&self) -> &str {
            self.name
        }

        fn recognize_text(&self, _image: &GrayImage, lang: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.langs.lock().unwrap().push(lang.to_string());
            match self.reply {
                Reply::Text(text) => Ok(text.to_string()),
                Reply::Fail => Err(ScanError::Recognition("model crashed".into())),
            }
        }
    }

    fn page() -> GrayImage {
        GrayImage::new(4, 4)
    }

    #[test]
    fn primary_success_skips_fallback() {
        let primary = FakeBackend::new("TrOCR", Reply::Text("Hello"));
        let fallback = FakeBackend::new("Tesseract", Reply::Text("unused"));
        let recognizer =
            Recognizer::with_fallback(Box::new(primary.clone()), Box::new(fallback.clone()));

        let result = recognizer.recognize(&page(), None);

        assert_eq!(result.backend_used, BackendUsed::Primary);
        assert_eq!(result.text, "Hello\n\n[via TrOCR]");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
    }

    #[test]
    fn primary_error_tries_fallback_once() {
        let primary = FakeBackend::new("TrOCR", Reply::Fail);
        let fallback = FakeBackend::new("Tesseract", Reply::Text("Hello World"));
        let recognizer =
            Recognizer::with_fallback(Box::new(primary.clone()), Box::new(fallback.clone()));

        let result = recognizer.recognize(&page(), None);

        assert_eq!(result.backend_used, BackendUsed::Fallback);
        assert!(result.text.starts_with("Hello World"));
        assert!(result.text.ends_with("[via Tesseract]"));
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[test]
    fn whitespace_primary_tries_fallback() {
        let primary = FakeBackend::new("TrOCR", Reply::Text("  \n\t"));
        let fallback = FakeBackend::new("Tesseract", Reply::Text("text"));
        let recognizer =
            Recognizer::with_fallback(Box::new(primary.clone()), Box::new(fallback.clone()));

        let result = recognizer.recognize(&page(), None);

        assert_eq!(result.backend_used, BackendUsed::Fallback);
        assert_eq!(fallback.calls(), 1);
    }

    #[test]
    fn both_failing_yields_failed_without_panic() {
        let primary = FakeBackend::new("TrOCR", Reply::Fail);
        let fallback = FakeBackend::new("Tesseract", Reply::Fail);
        let recognizer =
            Recognizer::with_fallback(Box::new(primary.clone()), Box::new(fallback.clone()));

        let result = recognizer.recognize(&page(), None);

        assert_eq!(result, RecognitionResult::failed());
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[test]
    fn single_mode_failure_is_not_raised() {
        let backend = FakeBackend::new("Tesseract", Reply::Fail);
        let recognizer = Recognizer::single(Box::new(backend.clone()));

        let result = recognizer.recognize(&page(), Some("deu"));

        assert!(result.is_failed());
        assert!(result.text.is_empty());
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn single_mode_has_no_provenance_marker() {
        let backend = FakeBackend::new("Tesseract", Reply::Text("plain\n"));
        let recognizer = Recognizer::single(Box::new(backend));

        let result = recognizer.recognize(&page(), None);

        assert_eq!(result, RecognitionResult::primary("plain".to_string()));
    }

    #[test]
    fn empty_primary_in_single_mode_is_failed() {
        let backend = FakeBackend::new("Tesseract", Reply::Text(""));
        let result = Recognizer::single(Box::new(backend)).recognize(&page(), None);
        assert!(result.is_failed());
    }

    #[test]
    fn language_hint_defaults_and_passes_through() {
        let backend = FakeBackend::new("Tesseract", Reply::Text("x"));
        let recognizer = Recognizer::single(Box::new(backend.clone())).with_default_lang("fra");

        recognizer.recognize(&page(), None);
        recognizer.recognize(&page(), Some(" "));
        recognizer.recognize(&page(), Some("deu"));

        assert_eq!(*backend.langs.lock().unwrap(), vec!["fra", "fra", "deu"]);
    }
}
