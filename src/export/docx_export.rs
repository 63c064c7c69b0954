use std::fs;
use std::io::Cursor;

use docx_rs::{Docx, Paragraph, Pic, Run};

use crate::core::model::{DocumentRecord, ExtractedFigure};
use crate::core::text::paragraphs;
use crate::error::{Result, ScanError};
use crate::export::{page_heading, Exporter};

const EMU_PER_PIXEL: u32 = 9525;
// Six inches, the usable width of a letter page with default margins.
const MAX_WIDTH_EMU: u32 = 5_486_400;

/// Word document: one paragraph per recognized line, figures after the page text.
#[derive(Debug, Clone, Default)]
pub struct DocxExporter;

impl DocxExporter {
    pub fn new() -> Self {
        Self
    }
}

fn figure_size_emu(width: u32, height: u32) -> (u32, u32) {
    let width_emu = u64::from(width) * u64::from(EMU_PER_PIXEL);
    let height_emu = u64::from(height) * u64::from(EMU_PER_PIXEL);
    if width_emu <= u64::from(MAX_WIDTH_EMU) {
        return (width_emu as u32, height_emu as u32);
    }
    let scaled_height = height_emu * u64::from(MAX_WIDTH_EMU) / width_emu.max(1);
    (MAX_WIDTH_EMU, scaled_height as u32)
}

fn figure_paragraph(figure: &ExtractedFigure) -> Result<Paragraph> {
    let bytes = fs::read(&figure.path).map_err(|e| ScanError::io(&figure.path, e))?;
    let (width, height) = image::image_dimensions(&figure.path).map_err(|e| {
        ScanError::Export(format!("cannot read figure {}: {e}", figure.path.display()))
    })?;
    let (width_emu, height_emu) = figure_size_emu(width, height);
    let pic = Pic::new_with_dimensions(bytes, width, height).size(width_emu, height_emu);
    Ok(Paragraph::new().add_run(Run::new().add_image(pic)))
}

impl Exporter for DocxExporter {
    fn render(&self, document: &DocumentRecord) -> Result<Vec<u8>> {
        let mut docx = Docx::new();

        for page in &document.pages {
            if let Some(heading) = page_heading(document, page) {
                docx = docx.add_paragraph(
                    Paragraph::new().add_run(Run::new().add_text(heading).bold()),
                );
            }
            for line in paragraphs(&page.text) {
                docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)));
            }
            for figure in &page.figures {
                docx = docx
                    .add_paragraph(Paragraph::new())
                    .add_paragraph(figure_paragraph(figure)?);
            }
        }

        let mut cursor = Cursor::new(Vec::new());
        docx.build()
            .pack(&mut cursor)
            .map_err(|e| ScanError::Export(format!("cannot pack DOCX: {e}")))?;
        Ok(cursor.into_inner())
    }
}
