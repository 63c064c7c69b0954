use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Result, ScanError};

#[derive(Debug, Clone)]
pub struct PdfReader {
    path: PathBuf,
}

impl PdfReader {
    pub fn new(path: PathBuf) -> Result<Self> {
        if !path.is_file() {
            return Err(ScanError::Decode(format!(
                "PDF not found: {}",
                path.display()
            )));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> Result<usize> {
        get_page_count(&self.path)
    }
}

fn get_page_count(pdf_path: &Path) -> Result<usize> {
    let output = Command::new("pdfinfo")
        .arg(pdf_path)
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                ScanError::Render("pdfinfo not found; is poppler-utils installed?".into())
            }
            _ => ScanError::Render(format!("failed to invoke pdfinfo: {e}")),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ScanError::Decode(format!(
            "pdfinfo rejected {}: {}",
            pdf_path.display(),
            stderr.trim()
        )));
    }

    parse_page_count(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
        ScanError::Decode(format!(
            "pdfinfo output did not contain a 'Pages:' line for {}",
            pdf_path.display()
        ))
    })
}

fn parse_page_count(info: &str) -> Option<usize> {
    info.lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|rest| rest.trim().parse().ok())
}
