//! PDF page layout extraction.
//!
//! Parses an uploaded PDF once with `lopdf` and keeps, per page, the text
//! fragments together with their vertical position so callers can inspect a
//! sub-region (the footer) or the whole page without re-parsing.

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::SourceError;

/// US Letter height, used when a page has no usable MediaBox.
const DEFAULT_PAGE_HEIGHT: f32 = 792.0;
const MAX_INHERITANCE_DEPTH: usize = 32;

/// A run of text drawn at one position.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    /// Distance from the bottom of the page in user-space units.
    pub y: f32,
}

/// Positioned text of one page.
#[derive(Debug, Clone)]
pub struct PageLayout {
    /// 1-based page number.
    pub number: u32,
    /// Lower edge of the MediaBox.
    pub bottom: f32,
    pub height: f32,
    pub fragments: Vec<TextFragment>,
    /// False when the content stream could not be decoded.
    pub readable: bool,
}

impl PageLayout {
    /// Text drawn within the bottom `fraction` of the page, joined with spaces.
    pub fn footer_text(&self, fraction: f32) -> String {
        let limit = self.bottom + self.height * fraction;
        self.fragments
            .iter()
            .filter(|f| f.y >= self.bottom && f.y <= limit)
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn full_text(&self) -> String {
        self.fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A parsed specification document.
#[derive(Debug, Clone)]
pub struct SpecDocument {
    pages: Vec<PageLayout>,
    content_hash: String,
}

impl SpecDocument {
    /// Parse PDF bytes into per-page layouts.
    pub fn parse(bytes: &[u8]) -> Result<Self, SourceError> {
        let doc = Document::load_mem(bytes)?;
        let page_ids = doc.get_pages();
        if page_ids.is_empty() {
            return Err(SourceError::Pdf("document has no pages".into()));
        }

        let pages: Vec<PageLayout> = page_ids
            .into_iter()
            .map(|(number, page_id)| read_page(&doc, number, page_id))
            .collect();

        debug!("Parsed PDF: {} pages", pages.len());

        Ok(Self {
            pages,
            content_hash: content_hash(bytes),
        })
    }

    /// Build a document from already-extracted pages.
    pub fn from_pages(pages: Vec<PageLayout>) -> Self {
        let mut hasher = Sha256::new();
        for page in &pages {
            hasher.update(page.full_text().as_bytes());
        }
        Self {
            pages,
            content_hash: hex::encode(hasher.finalize()),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[PageLayout] {
        &self.pages
    }

    pub fn page(&self, number: u32) -> Option<&PageLayout> {
        self.pages.iter().find(|p| p.number == number)
    }

    /// SHA-256 of the uploaded bytes, hex encoded.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Full text of the given pages, each prefixed with a `--- Page N ---` marker.
    pub fn section_text(&self, pages: &[u32]) -> Result<String, SourceError> {
        let mut parts = Vec::with_capacity(pages.len());
        for &number in pages {
            let page = self
                .page(number)
                .filter(|p| p.readable)
                .ok_or(SourceError::PageUnavailable(number))?;
            parts.push(format!("--- Page {} ---\n{}\n", number, page.full_text()));
        }
        Ok(parts.join("\n"))
    }
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn read_page(doc: &Document, number: u32, page_id: ObjectId) -> PageLayout {
    let (bottom, height) = media_box(doc, page_id)
        .map(|[_, lly, _, ury]| (lly, (ury - lly).abs()))
        .filter(|(_, h)| *h > 0.0)
        .unwrap_or((0.0, DEFAULT_PAGE_HEIGHT));

    let decoded = doc
        .get_page_content(page_id)
        .and_then(|data| Content::decode(&data));

    match decoded {
        Ok(content) => PageLayout {
            number,
            bottom,
            height,
            fragments: positioned_fragments(&content),
            readable: true,
        },
        Err(e) => {
            warn!("Could not decode content of page {}: {}", number, e);
            PageLayout {
                number,
                bottom,
                height,
                fragments: Vec::new(),
                readable: false,
            }
        }
    }
}

/// MediaBox of a page, following `Parent` links for inherited values.
fn media_box(doc: &Document, page_id: ObjectId) -> Option<[f32; 4]> {
    let mut dict = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(obj) = dict.get(b"MediaBox") {
            let values = resolve(doc, obj).as_array().ok()?;
            if values.len() != 4 {
                return None;
            }
            let mut rect = [0.0f32; 4];
            for (slot, value) in rect.iter_mut().zip(values) {
                *slot = number(resolve(doc, value))?;
            }
            return Some(rect);
        }
        let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Affine transform `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f32, ty: f32) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        if operands.len() < 6 {
            return None;
        }
        let mut m = [0.0f32; 6];
        for (slot, op) in m.iter_mut().zip(operands) {
            *slot = number(op)?;
        }
        Some(Matrix(m))
    }

    /// `self × other`.
    fn then(&self, other: &Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }
}

/// Text state tracked while walking a content stream.
struct TextState {
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    leading: f32,
    fragments: Vec<TextFragment>,
}

impl TextState {
    fn new() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            ctm_stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            leading: 0.0,
            fragments: Vec::new(),
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translate(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn emit(&mut self, text: String) {
        if text.trim().is_empty() {
            return;
        }
        let y = self.text_matrix.then(&self.ctm).0[5];
        self.fragments.push(TextFragment { text, y });
    }
}

fn positioned_fragments(content: &Content) -> Vec<TextFragment> {
    let mut state = TextState::new();

    for op in &content.operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => state.ctm_stack.push(state.ctm),
            "Q" => {
                if let Some(m) = state.ctm_stack.pop() {
                    state.ctm = m;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    state.ctm = m.then(&state.ctm);
                }
            }
            "BT" => {
                state.text_matrix = Matrix::IDENTITY;
                state.line_matrix = Matrix::IDENTITY;
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    state.text_matrix = m;
                    state.line_matrix = m;
                }
            }
            "Td" | "TD" => {
                let tx = operands.first().and_then(number).unwrap_or(0.0);
                let ty = operands.get(1).and_then(number).unwrap_or(0.0);
                if op.operator == "TD" {
                    state.leading = -ty;
                }
                state.move_line(tx, ty);
            }
            "TL" => {
                if let Some(l) = operands.first().and_then(number) {
                    state.leading = l;
                }
            }
            "T*" => {
                let leading = state.leading;
                state.move_line(0.0, -leading);
            }
            "Tj" => {
                if let Some(text) = operands.first().and_then(string_operand) {
                    state.emit(text);
                }
            }
            "'" => {
                let leading = state.leading;
                state.move_line(0.0, -leading);
                if let Some(text) = operands.first().and_then(string_operand) {
                    state.emit(text);
                }
            }
            "\"" => {
                let leading = state.leading;
                state.move_line(0.0, -leading);
                if let Some(text) = operands.get(2).and_then(string_operand) {
                    state.emit(text);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    state.emit(kerned_text(items));
                }
            }
            _ => {}
        }
    }

    state.fragments
}

/// Join a `TJ` array; large negative adjustments are word gaps.
fn kerned_text(items: &[Object]) -> String {
    let mut text = String::new();
    for item in items {
        match item {
            Object::String(bytes, _) => text.push_str(&decode_pdf_string(bytes)),
            other => {
                if let Some(adjust) = number(other) {
                    if adjust <= -250.0 && !text.ends_with(' ') {
                        text.push(' ');
                    }
                }
            }
        }
    }
    text
}

fn string_operand(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        _ => None,
    }
}

/// UTF-16BE when BOM-prefixed, otherwise single-byte (PDFDocEncoding / Latin-1).
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Builders for small in-memory PDFs used by tests across the workspace.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a PDF where each page is a list of `(y, text)` lines on a
    /// 612×792 MediaBox.
    pub fn build_pdf(pages: &[Vec<(i64, &str)>]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for lines in pages {
            let mut operations = Vec::new();
            for (y, text) in lines {
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new(
                    "Tf",
                    vec![Object::Name(b"F1".to_vec()), Object::Integer(10)],
                ));
                operations.push(Operation::new(
                    "Td",
                    vec![Object::Integer(72), Object::Integer(*y)],
                ));
                operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
                operations.push(Operation::new("ET", vec![]));
            }
            let content = Content { operations };
            let encoded = content.encode().expect("encode content stream");
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("serialize pdf");
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::testing::build_pdf;
    use super::*;

    #[test]
    fn test_parse_positions_and_height() {
        let bytes = build_pdf(&[vec![(700, "PART 1 GENERAL"), (40, "UNIT MASONRY 04 20 00 - 1")]]);
        let doc = SpecDocument::parse(&bytes).unwrap();
        assert_eq!(doc.page_count(), 1);

        let page = doc.page(1).unwrap();
        assert_eq!(page.height, 792.0);
        assert_eq!(page.fragments.len(), 2);
        assert_eq!(page.fragments[0].y, 700.0);
        assert_eq!(page.fragments[1].text, "UNIT MASONRY 04 20 00 - 1");
        assert_eq!(page.footer_text(0.10), "UNIT MASONRY 04 20 00 - 1");
        assert_eq!(page.full_text(), "PART 1 GENERAL UNIT MASONRY 04 20 00 - 1");
        assert_eq!(doc.content_hash().len(), 64);
    }

    #[test]
    fn test_section_text_format() {
        let bytes = build_pdf(&[vec![(500, "Alpha")], vec![(500, "Beta")]]);
        let doc = SpecDocument::parse(&bytes).unwrap();
        let text = doc.section_text(&[1, 2]).unwrap();
        assert_eq!(text, "--- Page 1 ---\nAlpha\n\n--- Page 2 ---\nBeta\n");
    }

    #[test]
    fn test_missing_page_is_error() {
        let bytes = build_pdf(&[vec![(500, "Alpha")]]);
        let doc = SpecDocument::parse(&bytes).unwrap();
        assert!(matches!(
            doc.section_text(&[3]),
            Err(SourceError::PageUnavailable(3))
        ));
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(matches!(
            SpecDocument::parse(b"definitely not a pdf"),
            Err(SourceError::Pdf(_))
        ));
    }

    fn op(operator: &str, operands: Vec<Object>) -> lopdf::content::Operation {
        lopdf::content::Operation::new(operator, operands)
    }

    fn ints(values: &[i64]) -> Vec<Object> {
        values.iter().map(|v| Object::Integer(*v)).collect()
    }

    #[test]
    fn test_text_operators() {
        let content = Content {
            operations: vec![
                op("cm", ints(&[1, 0, 0, 1, 0, 100])),
                op("BT", vec![]),
                op("TL", ints(&[12])),
                op("Tm", ints(&[1, 0, 0, 1, 50, 200])),
                op("Tj", vec![Object::string_literal("first")]),
                op("T*", vec![]),
                op(
                    "TJ",
                    vec![Object::Array(vec![
                        Object::string_literal("sec"),
                        Object::Integer(-20),
                        Object::string_literal("ond"),
                        Object::Integer(-400),
                        Object::string_literal("line"),
                    ])],
                ),
                op("ET", vec![]),
            ],
        };
        let fragments = positioned_fragments(&content);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], TextFragment { text: "first".into(), y: 300.0 });
        assert_eq!(fragments[1], TextFragment { text: "second line".into(), y: 288.0 });
    }

    #[test]
    fn test_decode_utf16() {
        let bytes = [0xFE, 0xFF, 0x00, 0x4D, 0x00, 0xE9];
        assert_eq!(decode_pdf_string(&bytes), "Mé");
        assert_eq!(decode_pdf_string(b"plain"), "plain");
    }
}
