use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontRef};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

use crate::core::model::{DocumentRecord, ExtractedFigure};
use crate::core::text::paragraphs;
use crate::error::{Result, ScanError};
use crate::export::{page_heading, Exporter};

// A4 in points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 50;
const FONT_SIZE: i64 = 11;
const LEADING: i64 = 14;
const WRAP_COLUMNS: usize = 90;

/// Page-oriented output: text flows over A4 pages, every figure starts a new page.
///
/// Without a font file the text is set in Helvetica, which only covers
/// Latin-1; a document with other characters is rejected rather than
/// rendered with placeholders. With [`PdfExporter::with_font`] the given
/// TrueType font is embedded and any character it has a glyph for is kept.
#[derive(Debug, Clone, Default)]
pub struct PdfExporter {
    font: Option<PathBuf>,
}

impl PdfExporter {
    pub fn new() -> Self {
        Self { font: None }
    }

    pub fn with_font(mut self, font: Option<PathBuf>) -> Self {
        self.font = font;
        self
    }
}

struct PdfPage {
    operations: Vec<Operation>,
    images: Vec<(String, ObjectId)>,
}

/// Top-down cursor over a growing list of pages.
struct Layout {
    pages: Vec<PdfPage>,
    cursor_y: i64,
    image_count: usize,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            cursor_y: 0,
            image_count: 0,
        }
    }

    fn new_page(&mut self) {
        self.pages.push(PdfPage {
            operations: Vec::new(),
            images: Vec::new(),
        });
        self.cursor_y = PAGE_HEIGHT - MARGIN;
    }

    fn last_page(&mut self) -> &mut PdfPage {
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn ensure_room(&mut self, needed: i64) {
        if self.pages.is_empty() || self.cursor_y - needed < MARGIN {
            self.new_page();
        }
    }

    /// `shown` is the already encoded string operand; `None` leaves a blank line.
    fn text_line(&mut self, shown: Option<Object>) {
        self.ensure_room(LEADING);
        self.cursor_y -= LEADING;
        let y = self.cursor_y;
        let Some(shown) = shown else {
            return;
        };
        self.last_page().operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), Object::Integer(FONT_SIZE)]),
            Operation::new("Td", vec![Object::Integer(MARGIN), Object::Integer(y)]),
            Operation::new("Tj", vec![shown]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn image_page(&mut self, image_id: ObjectId, width: u32, height: u32) {
        let avail_w = (PAGE_WIDTH - 2 * MARGIN) as f64;
        let avail_h = (PAGE_HEIGHT - 2 * MARGIN) as f64;
        let scale = (avail_w / f64::from(width.max(1))).min(avail_h / f64::from(height.max(1)));
        let draw_w = ((f64::from(width) * scale).round() as i64).max(1);
        let draw_h = ((f64::from(height) * scale).round() as i64).max(1);
        let y = PAGE_HEIGHT - MARGIN - draw_h;

        self.image_count += 1;
        let name = format!("Im{}", self.image_count);
        self.new_page();
        let page = self.last_page();
        page.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Integer(draw_w),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(draw_h),
                    Object::Integer(MARGIN),
                    Object::Integer(y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.clone().into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
        page.images.push((name, image_id));
        self.cursor_y = y - LEADING;
    }
}

/// The font behind `/F1`, collecting what it needs to emit while lines are encoded.
enum TextFont<'f> {
    Helvetica,
    Embedded(EmbeddedFont<'f>),
}

impl<'f> TextFont<'f> {
    fn encode(&mut self, line: &str) -> Result<Option<Object>> {
        let shown = match self {
            TextFont::Helvetica => {
                let bytes = encode_win_ansi(line)?;
                (!bytes.is_empty()).then(|| Object::string_literal(bytes))
            }
            TextFont::Embedded(font) => {
                let bytes = font.encode(line)?;
                (!bytes.is_empty()).then(|| Object::String(bytes, StringFormat::Hexadecimal))
            }
        };
        Ok(shown)
    }

    fn add_to(self, doc: &mut Document) -> ObjectId {
        match self {
            TextFont::Helvetica => doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            }),
            TextFont::Embedded(font) => font.add_to(doc),
        }
    }
}

/// Helvetica with WinAnsiEncoding covers Latin-1. Combining marks left over
/// from NFKD are dropped; any other character fails the export.
fn encode_win_ansi(line: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(line.len());
    let mut missing = Vec::new();
    for c in visible_chars(line) {
        match u32::from(c) {
            0x09 => bytes.push(b' '),
            code @ (0x20..=0x7E | 0xA0..=0xFF) => bytes.push(code as u8),
            _ => missing.push(c),
        }
    }
    if !missing.is_empty() {
        return Err(unsupported_chars(&missing, "Helvetica (set a Unicode pdf_font)"));
    }
    Ok(bytes)
}

fn visible_chars(line: &str) -> impl Iterator<Item = char> + '_ {
    line.chars()
        .filter(|c| *c != '\r' && !('\u{300}'..='\u{36F}').contains(c))
}

fn unsupported_chars(missing: &[char], font: &str) -> ScanError {
    let mut listed: Vec<char> = missing.to_vec();
    listed.sort_unstable();
    listed.dedup();
    let shown: String = listed.iter().take(12).collect();
    ScanError::Export(format!(
        "{} character(s) cannot be set in {font}: {shown:?}",
        listed.len()
    ))
}

/// A TrueType font embedded as a Type0 font with Identity-H encoding, so that
/// character codes are glyph ids. A ToUnicode map keeps the text extractable.
struct EmbeddedFont<'f> {
    name: String,
    data: &'f [u8],
    font: FontRef<'f>,
    // glyph id -> first character drawn with it
    used: BTreeMap<u16, char>,
}

impl<'f> EmbeddedFont<'f> {
    fn parse(path: &Path, data: &'f [u8]) -> Result<Self> {
        let font = FontRef::try_from_slice(data).map_err(|e| {
            ScanError::Export(format!("cannot read font {}: {e}", path.display()))
        })?;
        let name: String = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect();
        Ok(Self {
            name: if name.is_empty() { "Embedded".to_string() } else { name },
            data,
            font,
            used: BTreeMap::new(),
        })
    }

    fn encode(&mut self, line: &str) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(line.len() * 2);
        let mut missing = Vec::new();
        for c in line.chars().filter(|c| *c != '\r') {
            let c = if c == '\t' { ' ' } else { c };
            let glyph = self.font.glyph_id(c).0;
            if glyph == 0 {
                missing.push(c);
                continue;
            }
            self.used.entry(glyph).or_insert(c);
            bytes.extend_from_slice(&glyph.to_be_bytes());
        }
        if !missing.is_empty() {
            return Err(unsupported_chars(&missing, &self.name));
        }
        Ok(bytes)
    }

    /// Glyph widths scaled to the 1000-unit text space.
    fn widths(&self) -> Vec<Object> {
        let scale = 1000.0 / self.font.units_per_em().unwrap_or(1000.0);
        let mut widths = Vec::with_capacity(self.used.len() * 2);
        for &glyph in self.used.keys() {
            let advance = self.font.h_advance_unscaled(ab_glyph::GlyphId(glyph)) * scale;
            widths.push(Object::Integer(i64::from(glyph)));
            widths.push(Object::Array(vec![Object::Integer(advance.round() as i64)]));
        }
        widths
    }

    fn to_unicode(&self) -> Vec<u8> {
        let mut cmap = String::from(
            "/CIDInit /ProcSet findresource begin\n\
             12 dict begin\n\
             begincmap\n\
             /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
             /CMapName /Adobe-Identity-UCS def\n\
             /CMapType 2 def\n\
             1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
        );
        let entries: Vec<(&u16, &char)> = self.used.iter().collect();
        // bfchar sections hold at most 100 entries.
        for chunk in entries.chunks(100) {
            let _ = writeln!(cmap, "{} beginbfchar", chunk.len());
            for (glyph, c) in chunk {
                let mut units = [0u16; 2];
                let utf16: String = c
                    .encode_utf16(&mut units)
                    .iter()
                    .map(|u| format!("{u:04X}"))
                    .collect();
                let _ = writeln!(cmap, "<{glyph:04X}> <{utf16}>");
            }
            cmap.push_str("endbfchar\n");
        }
        cmap.push_str(
            "endcmap\n\
             CMapName currentdict /CMapResource defineresource pop\n\
             end\n\
             end\n",
        );
        cmap.into_bytes()
    }

    fn add_to(self, doc: &mut Document) -> ObjectId {
        let scale = 1000.0 / self.font.units_per_em().unwrap_or(1000.0);
        let ascent = (self.font.ascent_unscaled() * scale).round() as i64;
        let descent = (self.font.descent_unscaled() * scale).round() as i64;
        debug!(font = %self.name, glyphs = self.used.len(), "embedding font");

        let file_id = doc.add_object(Stream::new(
            dictionary! { "Length1" => Object::Integer(self.data.len() as i64) },
            self.data.to_vec(),
        ));
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => Object::Name(self.name.clone().into_bytes()),
            "Flags" => Object::Integer(32),
            "FontBBox" => vec![
                Object::Integer(0),
                Object::Integer(descent),
                Object::Integer(1000),
                Object::Integer(ascent),
            ],
            "ItalicAngle" => Object::Integer(0),
            "Ascent" => Object::Integer(ascent),
            "Descent" => Object::Integer(descent),
            "CapHeight" => Object::Integer(ascent),
            "StemV" => Object::Integer(80),
            "FontFile2" => file_id,
        });
        let cid_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => Object::Name(self.name.clone().into_bytes()),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => Object::Integer(0),
            },
            "FontDescriptor" => descriptor_id,
            "CIDToGIDMap" => "Identity",
            "DW" => Object::Integer(1000),
            "W" => self.widths(),
        });
        let to_unicode_id = doc.add_object(Stream::new(dictionary! {}, self.to_unicode()));
        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => Object::Name(self.name.into_bytes()),
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(cid_font_id)],
            "ToUnicode" => to_unicode_id,
        })
    }
}

fn wrap(line: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > columns && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn embed_figure(doc: &mut Document, figure: &ExtractedFigure) -> Result<(ObjectId, u32, u32)> {
    let bytes = std::fs::read(&figure.path).map_err(|e| ScanError::io(&figure.path, e))?;
    let image = image::load_from_memory(&bytes).map_err(|e| {
        ScanError::Export(format!("cannot decode figure {}: {e}", figure.path.display()))
    })?;
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => Object::Integer(i64::from(width)),
            "Height" => Object::Integer(i64::from(height)),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => Object::Integer(8),
        },
        rgb.into_raw(),
    );
    Ok((doc.add_object(stream), width, height))
}

impl Exporter for PdfExporter {
    fn render(&self, document: &DocumentRecord) -> Result<Vec<u8>> {
        let font_data = match &self.font {
            Some(path) => Some(fs::read(path).map_err(|e| ScanError::io(path, e))?),
            None => None,
        };
        let mut font = match (&self.font, &font_data) {
            (Some(path), Some(data)) => TextFont::Embedded(EmbeddedFont::parse(path, data)?),
            _ => TextFont::Helvetica,
        };

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut layout = Layout::new();
        for page in &document.pages {
            if let Some(heading) = page_heading(document, page) {
                layout.text_line(font.encode(&heading)?);
            }
            for paragraph in paragraphs(&page.text) {
                for line in wrap(paragraph, WRAP_COLUMNS) {
                    layout.text_line(font.encode(&line)?);
                }
            }
            for figure in &page.figures {
                let (image_id, width, height) = embed_figure(&mut doc, figure)?;
                layout.image_page(image_id, width, height);
            }
        }
        if layout.pages.is_empty() {
            layout.new_page();
        }
        let font_id = font.add_to(&mut doc);

        let mut kids = Vec::with_capacity(layout.pages.len());
        for page in layout.pages {
            let content = Content {
                operations: page.operations,
            };
            let encoded = content
                .encode()
                .map_err(|e| ScanError::Export(format!("cannot encode page content: {e}")))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

            let mut xobjects = Dictionary::new();
            for (name, id) in page.images {
                xobjects.set(name, id);
            }
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                    "XObject" => xobjects,
                },
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(PAGE_WIDTH),
                    Object::Integer(PAGE_HEIGHT),
                ],
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(count),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut buf = Vec::new();
        doc.save_to(&mut buf)
            .map_err(|e| ScanError::Export(format!("cannot serialize PDF: {e}")))?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::Rect;
    use crate::core::model::{FigureRegion, PageRecord};
    use image::{DynamicImage, RgbImage};
    use pretty_assertions::assert_eq;

    #[test]
    fn wraps_on_word_boundaries() {
        assert_eq!(wrap("aa bb cc", 5), vec!["aa bb", "cc"]);
        assert_eq!(wrap("", 5), vec![""]);
    }

    #[test]
    fn encodes_latin1_and_drops_combining_marks() {
        assert_eq!(encode_win_ansi("café\t").unwrap(), b"caf\xe9 ".to_vec());
        assert_eq!(encode_win_ansi("cafe\u{301}").unwrap(), b"cafe".to_vec());
    }

    #[test]
    fn non_latin_text_needs_a_unicode_font() {
        let mut page = PageRecord::empty(1);
        page.text = "नमस्ते Привет".into();
        let document = DocumentRecord::new(vec![page]);

        let err = PdfExporter::new().render(&document).unwrap_err();

        assert!(matches!(err, ScanError::Export(_)));
        assert!(err.to_string().contains('П'), "{err}");
    }

    #[test]
    fn rejected_text_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hindi.pdf");
        let mut page = PageRecord::empty(1);
        page.text = "नमस्ते".into();

        let err = crate::export::export_document(
            &DocumentRecord::new(vec![page]),
            crate::export::ExportFormat::Pdf,
            &path,
        )
        .unwrap_err();

        assert!(matches!(err, ScanError::Export(_)));
        assert!(!path.exists());
    }

    #[test]
    fn unreadable_font_is_an_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let font = dir.path().join("broken.ttf");
        std::fs::write(&font, b"not a font").unwrap();

        let err = PdfExporter::new()
            .with_font(Some(font))
            .render(&DocumentRecord::default())
            .unwrap_err();

        assert!(matches!(err, ScanError::Export(_)));
    }

    fn system_unicode_font() -> Option<PathBuf> {
        [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/Library/Fonts/Arial Unicode.ttf",
        ]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
    }

    #[test]
    fn embedded_font_keeps_cyrillic_text() {
        let Some(font) = system_unicode_font() else {
            eprintln!("no Unicode TrueType font installed, skipping");
            return;
        };
        let mut page = PageRecord::empty(1);
        page.text = "Привет café".into();
        let document = DocumentRecord::new(vec![page]);

        let bytes = PdfExporter::new()
            .with_font(Some(font))
            .render(&document)
            .unwrap();

        let parsed = Document::load_mem(&bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), 1);
        let subtypes: Vec<Vec<u8>> = parsed
            .objects
            .values()
            .filter_map(|o| o.as_dict().ok())
            .filter_map(|d| d.get(b"Subtype").ok())
            .filter_map(|s| s.as_name().ok())
            .map(<[u8]>::to_vec)
            .collect();
        assert!(subtypes.contains(&b"Type0".to_vec()));
        assert!(subtypes.contains(&b"CIDFontType2".to_vec()));
    }

    #[test]
    fn each_figure_gets_its_own_page() {
        let dir = tempfile::tempdir().unwrap();
        let mut page = PageRecord::empty(1);
        page.text = "Hello World".into();
        for ordinal in 1..=2 {
            let path = dir.path().join(format!("page1_img{ordinal}.png"));
            DynamicImage::ImageRgb8(RgbImage::new(150, 120))
                .save(&path)
                .unwrap();
            page.figures.push(ExtractedFigure {
                region: FigureRegion {
                    bbox: Rect::new(0, 0, 150, 120),
                    page_index: 1,
                },
                ordinal,
                path,
            });
        }
        let document = DocumentRecord::new(vec![page]);

        let bytes = PdfExporter::new().render(&document).unwrap();

        assert!(bytes.starts_with(b"%PDF-1.5"));
        let parsed = Document::load_mem(&bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), 3);
    }

    #[test]
    fn empty_document_is_still_a_valid_pdf() {
        let bytes = PdfExporter::new()
            .render(&DocumentRecord::default())
            .unwrap();
        let parsed = Document::load_mem(&bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), 1);
    }
}
