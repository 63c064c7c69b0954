use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};
use crate::export::ExportOptions;
use crate::ocr::bridge::NeuralModel;
use crate::ocr::recognizer::DEFAULT_LANGUAGE;
use crate::ocr::{
    BridgeModel, NeuralBackend, NormalizeOptions, OcrBackend, Recognizer, TesseractBackend,
};
use crate::segment::SegmentOptions;

pub const DEFAULT_DPI: u32 = 300;

/// Which recognizer policy a run uses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Tesseract,
    Trocr,
    Donut,
    /// Neural model first, Tesseract when it fails or reads nothing.
    Fallback,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Engine::Tesseract => "tesseract",
            Engine::Trocr => "trocr",
            Engine::Donut => "donut",
            Engine::Fallback => "fallback",
        })
    }
}

impl FromStr for Engine {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tesseract" => Ok(Engine::Tesseract),
            "trocr" => Ok(Engine::Trocr),
            "donut" => Ok(Engine::Donut),
            "fallback" => Ok(Engine::Fallback),
            other => Err(ScanError::Config(format!(
                "unknown engine '{other}' (expected tesseract, trocr, donut or fallback)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognizerSettings {
    pub engine: Engine,
    /// Neural model tried first in `fallback` mode.
    pub neural_model: NeuralModel,
    pub language: String,
    /// Per-call limit for every backend process; unset means no limit.
    pub timeout_secs: Option<u64>,
    pub tesseract: PathBuf,
    pub python: PathBuf,
    pub script: PathBuf,
    pub trocr_model: String,
    pub donut_model: String,
    pub prompt: Option<String>,
    pub max_length: u32,
}

impl Default for RecognizerSettings {
    fn default() -> Self {
        Self {
            engine: Engine::Tesseract,
            neural_model: NeuralModel::TrOcr,
            language: DEFAULT_LANGUAGE.to_string(),
            timeout_secs: None,
            tesseract: PathBuf::from("tesseract"),
            python: PathBuf::from("python3"),
            script: PathBuf::from("bridge/neural_ocr.py"),
            trocr_model: NeuralModel::TrOcr.default_model_id().to_string(),
            donut_model: NeuralModel::Donut.default_model_id().to_string(),
            prompt: None,
            max_length: 512,
        }
    }
}

impl RecognizerSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }

    fn tesseract_backend(&self) -> TesseractBackend {
        TesseractBackend::new()
            .with_binary(self.tesseract.clone())
            .with_timeout(self.timeout())
    }

    fn neural_backend(&self, kind: NeuralModel) -> NeuralBackend<BridgeModel> {
        let model_id = match kind {
            NeuralModel::TrOcr => self.trocr_model.clone(),
            NeuralModel::Donut => self.donut_model.clone(),
        };
        let mut model = BridgeModel::new(kind)
            .with_interpreter(self.python.clone())
            .with_script(self.script.clone())
            .with_model_id(model_id)
            .with_max_length(self.max_length)
            .with_timeout(self.timeout());
        if let Some(prompt) = &self.prompt {
            model = model.with_prompt(Some(prompt.clone()));
        }
        NeuralBackend::new(model)
    }

    /// Construct the recognizer once for a whole run.
    pub fn build_recognizer(&self) -> Recognizer {
        let recognizer = match self.engine {
            Engine::Tesseract => Recognizer::single(Box::new(self.tesseract_backend())),
            Engine::Trocr => Recognizer::single(boxed(self.neural_backend(NeuralModel::TrOcr))),
            Engine::Donut => Recognizer::single(boxed(self.neural_backend(NeuralModel::Donut))),
            Engine::Fallback => Recognizer::with_fallback(
                boxed(self.neural_backend(self.neural_model)),
                Box::new(self.tesseract_backend()),
            ),
        };
        recognizer.with_default_lang(self.language.clone())
    }
}

fn boxed(backend: NeuralBackend<BridgeModel>) -> Box<dyn OcrBackend> {
    Box::new(backend)
}

/// Tunables loaded from an optional TOML file. Command line flags override them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub normalize: NormalizeOptions,
    pub segment: SegmentOptions,
    pub recognizer: RecognizerSettings,
    pub export: ExportOptions,
    pub dpi: u32,
    pub parallel: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            normalize: NormalizeOptions::default(),
            segment: SegmentOptions::default(),
            recognizer: RecognizerSettings::default(),
            export: ExportOptions::default(),
            dpi: DEFAULT_DPI,
            parallel: false,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        Self::from_toml(&raw).map_err(|e| match e {
            ScanError::Config(msg) => ScanError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(raw).map_err(|e| ScanError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.normalize.scale == 0 {
            return Err(ScanError::Config("normalize.scale must be at least 1".into()));
        }
        if self.dpi == 0 {
            return Err(ScanError::Config("dpi must be positive".into()));
        }
        if self.segment.filter.max_aspect_ratio <= 0.0 {
            return Err(ScanError::Config(
                "segment.filter.max_aspect_ratio must be positive".into(),
            ));
        }
        if self.recognizer.language.trim().is_empty() {
            return Err(ScanError::Config("recognizer.language is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::RegionOrder;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.dpi, 300);
        assert_eq!(settings.normalize.scale, 2);
        assert!(settings.normalize.invert);
        assert_eq!(settings.segment.threshold, 180);
        assert_eq!(settings.segment.order, RegionOrder::Discovery);
        assert_eq!(settings.recognizer.engine, Engine::Tesseract);
        assert_eq!(settings.recognizer.timeout(), None);
    }

    #[test]
    fn partial_tables_override_only_named_keys() {
        let settings = Settings::from_toml(
            r#"
            parallel = true

            [segment]
            order = "reading"

            [segment.filter]
            min_width = 50

            [recognizer]
            engine = "fallback"
            neural_model = "donut"
            timeout_secs = 30
            "#,
        )
        .unwrap();

        assert!(settings.parallel);
        assert_eq!(settings.segment.order, RegionOrder::Reading);
        assert_eq!(settings.segment.filter.min_width, 50);
        assert_eq!(settings.segment.filter.min_height, 100);
        assert_eq!(settings.recognizer.engine, Engine::Fallback);
        assert_eq!(settings.recognizer.neural_model, NeuralModel::Donut);
        assert_eq!(settings.recognizer.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(settings.export.pdf_font, None);
    }

    #[test]
    fn export_table_names_the_pdf_font() {
        let settings = Settings::from_toml(
            "[export]\npdf_font = \"/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf\"",
        )
        .unwrap();
        assert_eq!(
            settings.export.pdf_font,
            Some(PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"))
        );
    }

    #[test]
    fn rejects_invalid_values() {
        let err = Settings::from_toml("[normalize]\nscale = 0").unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
        let err = Settings::from_toml("[recognizer]\nengine = \"easyocr\"").unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn builds_the_configured_policy() {
        let mut settings = RecognizerSettings::default();
        assert_eq!(settings.build_recognizer().describe(), "Tesseract");

        settings.engine = Engine::Fallback;
        settings.language = "deu".into();
        let recognizer = settings.build_recognizer();
        assert_eq!(recognizer.describe(), "TrOCR -> Tesseract");
        assert_eq!(recognizer.default_lang(), "deu");
    }

    #[test]
    fn parses_engine_names() {
        assert_eq!("Donut".parse::<Engine>().unwrap(), Engine::Donut);
        assert_eq!(Engine::Fallback.to_string(), "fallback");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Settings::load(Path::new("/nonexistent/smartscan.toml")).unwrap_err();
        assert!(matches!(err, ScanError::Io { .. }));
    }
}
