//! Incremental PDF 1.4 writer.
//!
//! Objects are emitted as soon as they are known so a page can be handed to
//! the network before the next one is laid out. Object 2 (the page tree) is
//! reserved up front and written by [`PdfWriter::finish`] together with the
//! cross-reference table; output without that call is not a valid PDF.

use bytes::Bytes;

use super::font;
use super::layout::{DrawOp, Page, PageLayout};

const CATALOG_ID: usize = 1;
const PAGES_ID: usize = 2;
const FONT_ID: usize = 3;

pub struct PdfWriter {
    page_width: f32,
    page_height: f32,
    pending: Vec<u8>,
    flushed: usize,
    /// Byte offset per object id; index 0 is the free-list head.
    offsets: Vec<Option<usize>>,
    page_ids: Vec<usize>,
}

impl PdfWriter {
    pub fn begin(layout: &PageLayout) -> Self {
        let mut writer = Self {
            page_width: layout.page_width,
            page_height: layout.page_height,
            pending: Vec::new(),
            flushed: 0,
            offsets: vec![None; FONT_ID + 1],
            page_ids: Vec::new(),
        };

        writer.pending.extend_from_slice(b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n");
        writer.object(
            CATALOG_ID,
            format!("<< /Type /Catalog /Pages {PAGES_ID} 0 R >>").as_bytes(),
        );
        writer.object(
            FONT_ID,
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
        );
        writer
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    pub fn write_page(&mut self, page: &Page) {
        let content = self.content_stream(page);
        let content_id = self.allocate();
        let mut body = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        body.extend_from_slice(&content);
        body.extend_from_slice(b"\nendstream");
        self.object(content_id, &body);

        let page_id = self.allocate();
        let page_dict = format!(
            "<< /Type /Page /Parent {PAGES_ID} 0 R /MediaBox [0 0 {} {}] \
             /Resources << /Font << /F1 {FONT_ID} 0 R >> >> /Contents {content_id} 0 R >>",
            number(self.page_width),
            number(self.page_height),
        );
        self.object(page_id, page_dict.as_bytes());
        self.page_ids.push(page_id);
    }

    /// Bytes produced since the previous call.
    pub fn take_pending(&mut self) -> Bytes {
        let chunk = std::mem::take(&mut self.pending);
        self.flushed += chunk.len();
        Bytes::from(chunk)
    }

    /// Writes the page tree, cross-reference table and trailer, returning
    /// every byte not yet taken.
    pub fn finish(mut self) -> Bytes {
        let kids = self
            .page_ids
            .iter()
            .map(|id| format!("{id} 0 R"))
            .collect::<Vec<_>>()
            .join(" ");
        let pages = format!(
            "<< /Type /Pages /Kids [{kids}] /Count {} >>",
            self.page_ids.len()
        );
        self.object(PAGES_ID, pages.as_bytes());

        let xref_offset = self.position();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", self.offsets.len());
        for offset in self.offsets.iter().skip(1) {
            // All reserved ids have been written at this point.
            xref.push_str(&format!("{:010} 00000 n \n", offset.unwrap_or(0)));
        }
        xref.push_str(&format!(
            "trailer\n<< /Size {} /Root {CATALOG_ID} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            self.offsets.len()
        ));
        self.pending.extend_from_slice(xref.as_bytes());

        self.take_pending()
    }

    fn position(&self) -> usize {
        self.flushed + self.pending.len()
    }

    fn allocate(&mut self) -> usize {
        self.offsets.push(None);
        self.offsets.len() - 1
    }

    fn object(&mut self, id: usize, body: &[u8]) {
        self.offsets[id] = Some(self.position());
        self.pending
            .extend_from_slice(format!("{id} 0 obj\n").as_bytes());
        self.pending.extend_from_slice(body);
        self.pending.extend_from_slice(b"\nendobj\n");
    }

    fn content_stream(&self, page: &Page) -> Vec<u8> {
        let mut out = Vec::new();
        for op in &page.ops {
            match op {
                DrawOp::Text { x, y, size, text } => {
                    let baseline = self.page_height - y - size;
                    out.extend_from_slice(
                        format!(
                            "BT /F1 {} Tf {} {} Td (",
                            number(*size),
                            number(*x),
                            number(baseline)
                        )
                        .as_bytes(),
                    );
                    out.extend_from_slice(&escape(text));
                    out.extend_from_slice(b") Tj ET\n");
                }
                DrawOp::Rule {
                    x1,
                    x2,
                    y,
                    width,
                    gray,
                } => {
                    let y = self.page_height - y;
                    out.extend_from_slice(
                        format!(
                            "{} G {} w {} {} m {} {} l S\n",
                            number(*gray),
                            number(*width),
                            number(*x1),
                            number(y),
                            number(*x2),
                            number(y)
                        )
                        .as_bytes(),
                    );
                }
            }
        }
        out
    }
}

fn number(value: f32) -> String {
    let formatted = format!("{value:.2}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// WinAnsi-encodes `text` as the body of a PDF literal string.
fn escape(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for byte in font::encode(text) {
        if matches!(byte, b'(' | b')' | b'\\') {
            out.push(b'\\');
        }
        out.push(byte);
    }
    out
}
