use std::fs;
use std::path::PathBuf;

use docx_rs::{DocumentChild, Paragraph, ParagraphChild, RunChild};
use tracing::debug;

use crate::core::model::{BackendUsed, PageRecord};
use crate::core::text::{clean_text, with_provenance};
use crate::error::{Result, ScanError};

/// Provenance tag for text taken straight from a DOCX body.
pub const DOCX_SOURCE: &str = "DOCX extract";

/// Word documents already carry their text, so they skip recognition and
/// segmentation and become a single page.
#[derive(Debug, Clone)]
pub struct DocxReader {
    path: PathBuf,
}

impl DocxReader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Body paragraphs, one per line, in document order.
    pub fn paragraphs(&self) -> Result<Vec<String>> {
        let bytes = fs::read(&self.path).map_err(|e| ScanError::io(&self.path, e))?;
        let docx = docx_rs::read_docx(&bytes)
            .map_err(|e| ScanError::Decode(format!("{}: {e}", self.path.display())))?;

        let paragraphs: Vec<String> = docx
            .document
            .children
            .iter()
            .filter_map(|child| match child {
                DocumentChild::Paragraph(paragraph) => Some(paragraph_text(paragraph)),
                _ => None,
            })
            .collect();
        debug!(path = %self.path.display(), paragraphs = paragraphs.len(), "read docx");
        Ok(paragraphs)
    }

    /// The whole document as page 1, tagged `[via DOCX extract]`.
    pub fn read_page(&self) -> Result<PageRecord> {
        let text = self.paragraphs()?.join("\n");
        Ok(PageRecord {
            text: clean_text(&with_provenance(text.trim(), DOCX_SOURCE)),
            backend_used: BackendUsed::Primary,
            ..PageRecord::empty(1)
        })
    }
}

fn paragraph_text(paragraph: &Paragraph) -> String {
    let mut text = String::new();
    collect_text(&paragraph.children, &mut text);
    text
}

fn collect_text(children: &[ParagraphChild], out: &mut String) {
    for child in children {
        match child {
            ParagraphChild::Run(run) => {
                for part in &run.children {
                    match part {
                        RunChild::Text(t) => out.push_str(&t.text),
                        RunChild::Tab(_) => out.push('\t'),
                        _ => {}
                    }
                }
            }
            ParagraphChild::Hyperlink(link) => collect_text(&link.children, out),
            _ => {}
        }
    }
}
