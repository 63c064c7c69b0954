use crate::core::model::DocumentRecord;
use crate::error::Result;
use crate::export::{page_heading, Exporter};

/// Plain text; figures are dropped.
#[derive(Debug, Clone, Default)]
pub struct TextExporter;

impl TextExporter {
    pub fn new() -> Self {
        Self
    }

    pub fn format_document(document: &DocumentRecord) -> String {
        document
            .pages
            .iter()
            .map(|page| match page_heading(document, page) {
                Some(heading) => format!("{heading}\n{}", page.text),
                None => page.text.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl Exporter for TextExporter {
    fn render(&self, document: &DocumentRecord) -> Result<Vec<u8>> {
        Ok(Self::format_document(document).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::PageRecord;
    use pretty_assertions::assert_eq;

    fn page(index: usize, text: &str) -> PageRecord {
        PageRecord {
            text: text.to_string(),
            ..PageRecord::empty(index)
        }
    }

    #[test]
    fn single_page_is_just_its_text() {
        let document = DocumentRecord::new(vec![page(1, "Hello World")]);
        assert_eq!(TextExporter::format_document(&document), "Hello World");
    }

    #[test]
    fn pages_are_headed_and_ordered() {
        let document = DocumentRecord::new(vec![page(1, "A"), page(2, ""), page(3, "C")]);
        assert_eq!(
            TextExporter::format_document(&document),
            "--- Page 1 ---\nA\n\n--- Page 2 ---\n\n\n--- Page 3 ---\nC"
        );
    }
}
