use std::path::{Path, PathBuf};

use crate::core::model::{DocumentRecord, ExtractedFigure};
use crate::error::Result;
use crate::export::Exporter;

/// Markdown with figures linked relative to the output file's directory.
#[derive(Debug, Clone)]
pub struct MarkdownExporter {
    out_dir: PathBuf,
}

impl MarkdownExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }

    fn figure_link(&self, figure: &ExtractedFigure) -> String {
        match figure.path.strip_prefix(&self.out_dir) {
            Ok(relative) => to_forward_slashes(relative),
            Err(_) => figure.path.display().to_string(),
        }
    }

    pub fn format_document(&self, document: &DocumentRecord) -> String {
        let mut markdown = String::from("# Document\n\n");

        for page in &document.pages {
            markdown.push_str(&format!("---\n\n## Page {}\n\n", page.page_index));

            if !page.text.is_empty() {
                // Hard line breaks keep the recognizer's line structure.
                let body = page
                    .text
                    .lines()
                    .map(|line| {
                        if line.is_empty() {
                            String::new()
                        } else {
                            format!("{line}  ")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                markdown.push_str(&body);
                markdown.push_str("\n\n");
            }

            for figure in &page.figures {
                markdown.push_str(&format!(
                    "**Figure {}:**\n\n![Figure {}]({})\n\n",
                    figure.ordinal,
                    figure.ordinal,
                    self.figure_link(figure)
                ));
            }
        }

        markdown
    }
}

fn to_forward_slashes(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl Exporter for MarkdownExporter {
    fn render(&self, document: &DocumentRecord) -> Result<Vec<u8>> {
        Ok(self.format_document(document).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::Rect;
    use crate::core::model::{FigureRegion, PageRecord};

    #[test]
    fn links_figures_after_page_text() {
        let out_dir = PathBuf::from("/tmp/scan-out");
        let mut page = PageRecord::empty(1);
        page.text = "Caption line\n\nSecond paragraph".into();
        page.figures.push(ExtractedFigure {
            region: FigureRegion {
                bbox: Rect::new(0, 0, 150, 150),
                page_index: 1,
            },
            ordinal: 1,
            path: out_dir.join("figures").join("page1_img1.png"),
        });
        let document = DocumentRecord::new(vec![page]);

        let md = MarkdownExporter::new(out_dir).format_document(&document);

        let text_at = md.find("Caption line").unwrap();
        let figure_at = md.find("![Figure 1](figures/page1_img1.png)").unwrap();
        assert!(text_at < figure_at);
        assert!(md.starts_with("# Document\n\n---\n\n## Page 1"));
    }
}
