use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use image::{GrayImage, ImageFormat};
use tracing::debug;

use crate::error::{Result, ScanError};
use crate::ocr::process::{check_status, run_command};
use crate::ocr::OcrBackend;

/// Classical engine driven through the `tesseract` command line tool.
#[derive(Debug, Clone)]
pub struct TesseractBackend {
    binary: PathBuf,
    psm: u8,
    timeout: Option<Duration>,
}

impl Default for TesseractBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TesseractBackend {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            psm: 3,
            timeout: None,
        }
    }

    pub fn with_binary(mut self, binary: PathBuf) -> Self {
        self.binary = binary;
        self
    }

    pub fn with_psm(mut self, psm: u8) -> Self {
        self.psm = psm;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }
}

impl OcrBackend for TesseractBackend {
    fn name(&self) -> &str {
        "Tesseract"
    }

    fn recognize_text(&self, image: &GrayImage, lang: &str) -> Result<String> {
        let input = tempfile::Builder::new()
            .prefix("smartscan-tess-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| ScanError::Recognition(format!("cannot create tesseract input: {e}")))?;
        image
            .save_with_format(input.path(), ImageFormat::Png)
            .map_err(|e| ScanError::Recognition(format!("cannot write tesseract input: {e}")))?;

        let mut command = Command::new(&self.binary);
        command
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(lang)
            .arg("--psm")
            .arg(self.psm.to_string());
        debug!(lang, psm = self.psm, "running tesseract");

        let output = run_command(command, None, self.timeout)?;
        check_status("tesseract", &output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
