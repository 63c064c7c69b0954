pub mod docx_export;
pub mod json_export;
pub mod markdown_export;
pub mod pdf_export;
pub mod text_export;

pub use docx_export::DocxExporter;
pub use json_export::JsonExporter;
pub use markdown_export::MarkdownExporter;
pub use pdf_export::PdfExporter;
pub use text_export::TextExporter;

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::model::{DocumentRecord, PageRecord};
use crate::error::{Result, ScanError};

/// Serializes a whole document into the bytes of one output file.
pub trait Exporter {
    fn render(&self, document: &DocumentRecord) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Txt,
    Pdf,
    Docx,
    Md,
    Json,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 5] = [
        ExportFormat::Txt,
        ExportFormat::Pdf,
        ExportFormat::Docx,
        ExportFormat::Md,
        ExportFormat::Json,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Docx => "docx",
            ExportFormat::Md => "md",
            ExportFormat::Json => "json",
        }
    }

    /// Formats that carry figures along with the text.
    pub fn embeds_figures(&self) -> bool {
        !matches!(self, ExportFormat::Txt)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().trim_start_matches('.').to_ascii_lowercase();
        match wanted.as_str() {
            "markdown" => Ok(ExportFormat::Md),
            other => ExportFormat::ALL
                .into_iter()
                .find(|f| f.extension() == other)
                .ok_or_else(|| ScanError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// `--- Page N ---` separator, only emitted for multi-page documents.
pub fn page_heading(document: &DocumentRecord, page: &PageRecord) -> Option<String> {
    document
        .is_multi_page()
        .then(|| format!("--- Page {} ---", page.page_index))
}

/// Format-specific knobs, loaded from the `[export]` settings table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExportOptions {
    /// TrueType font embedded in PDF output. Needed for text outside Latin-1.
    pub pdf_font: Option<PathBuf>,
}

fn exporter_for(format: ExportFormat, base_dir: &Path, options: &ExportOptions) -> Box<dyn Exporter> {
    match format {
        ExportFormat::Txt => Box::new(TextExporter::new()),
        ExportFormat::Pdf => Box::new(PdfExporter::new().with_font(options.pdf_font.clone())),
        ExportFormat::Docx => Box::new(DocxExporter::new()),
        ExportFormat::Md => Box::new(MarkdownExporter::new(base_dir.to_path_buf())),
        ExportFormat::Json => Box::new(JsonExporter::new()),
    }
}

/// Write `document` to `path`. Nothing is left at `path` unless the whole
/// document was produced.
pub fn export_document(document: &DocumentRecord, format: ExportFormat, path: &Path) -> Result<()> {
    export_document_with(document, format, path, &ExportOptions::default())
}

/// [`export_document`] with explicit [`ExportOptions`].
pub fn export_document_with(
    document: &DocumentRecord,
    format: ExportFormat,
    path: &Path,
    options: &ExportOptions,
) -> Result<()> {
    let base_dir = parent_dir(path);
    let bytes = exporter_for(format, base_dir, options).render(document)?;
    write_atomic(path, &bytes)?;
    info!(
        path = %path.display(),
        %format,
        pages = document.page_count(),
        figures = document.figure_count(),
        "exported document"
    );
    Ok(())
}

/// Like [`export_document`], with the format given by name (`txt`, `pdf`, ...).
pub fn export(document: &DocumentRecord, format: &str, path: &Path) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    export_document(document, format, path)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir).map_err(|e| ScanError::io(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| ScanError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| ScanError::io(tmp.path(), e))?;
    tmp.flush().map_err(|e| ScanError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| ScanError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_format_names() {
        assert_eq!("txt".parse::<ExportFormat>().unwrap(), ExportFormat::Txt);
        assert_eq!(".PDF".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
        assert_eq!("docx".parse::<ExportFormat>().unwrap(), ExportFormat::Docx);
        assert_eq!("markdown".parse::<ExportFormat>().unwrap(), ExportFormat::Md);
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = "xml".parse::<ExportFormat>().unwrap_err();
        assert!(matches!(err, ScanError::UnsupportedFormat(ref f) if f == "xml"));
    }

    #[test]
    fn unsupported_format_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xml");
        let document = DocumentRecord::new(vec![PageRecord::empty(1)]);

        let err = export(&document, "xml", &path).unwrap_err();

        assert!(matches!(err, ScanError::UnsupportedFormat(_)));
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn failed_render_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        let mut page = PageRecord::empty(1);
        page.figures.push(crate::core::model::ExtractedFigure {
            region: crate::core::model::FigureRegion {
                bbox: crate::core::geometry::Rect::new(0, 0, 120, 120),
                page_index: 1,
            },
            ordinal: 1,
            path: dir.path().join("missing.png"),
        });
        let document = DocumentRecord::new(vec![page]);

        assert!(export_document(&document, ExportFormat::Pdf, &path).is_err());
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
