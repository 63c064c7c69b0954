use unicode_normalization::UnicodeNormalization;

/// Tidy raw recognizer output: trim, NFKD-normalize, and squeeze runs of
/// blank lines down to a single empty line.
pub fn clean_text(raw: &str) -> String {
    let normalized: String = raw.trim().nfkd().collect();

    let mut out = String::with_capacity(normalized.len());
    let mut pending_blank = false;
    for line in normalized.lines() {
        if line.trim().is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if pending_blank {
                out.push('\n');
            }
        }
        out.push_str(line);
        pending_blank = false;
    }
    out
}

/// One paragraph per line; blank lines stay as empty paragraphs for spacing.
pub fn paragraphs(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split('\n').map(|line| line.trim_end_matches('\r')).collect()
}

/// Marker placed after recognized text naming the backend that produced it.
pub fn provenance_suffix(backend: &str) -> String {
    format!("[via {backend}]")
}

pub fn with_provenance(text: &str, backend: &str) -> String {
    format!("{}\n\n{}", text.trim_end(), provenance_suffix(backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn squeezes_blank_line_runs() {
        let raw = "  Title\n\n\n  \nBody line one\nBody line two\n\t\n\n";
        assert_eq!(clean_text(raw), "Title\n\nBody line one\nBody line two");
    }

    #[test]
    fn decomposes_compatibility_characters() {
        assert_eq!(clean_text("ﬁle №5"), "file No5");
    }

    #[test]
    fn keeps_blank_paragraphs() {
        assert_eq!(paragraphs("a\n\nb"), vec!["a", "", "b"]);
        assert!(paragraphs("").is_empty());
    }

    #[test]
    fn provenance_goes_last() {
        let tagged = with_provenance("Hello World\n", "Tesseract");
        assert_eq!(tagged, "Hello World\n\n[via Tesseract]");
        assert!(tagged.ends_with(&provenance_suffix("Tesseract")));
    }
}
