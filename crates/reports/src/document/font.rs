//! Metrics for the standard Helvetica Type 1 font, WinAnsi encoded.

/// Advance widths in 1/1000 em for codes 32..=126.
const HELVETICA_ASCII_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32..=47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 48..=63
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 64..=79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 80..=95
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 96..=111
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 112..=126
];

const FALLBACK_WIDTH: u16 = 556;
const REPLACEMENT: u8 = b'?';

/// Maps a char onto its single-byte WinAnsi code. Only the ranges that agree
/// with Latin-1 are used; anything else becomes `?`.
pub fn encode_char(c: char) -> u8 {
    match u32::from(c) {
        code @ (0x20..=0x7e | 0xa0..=0xff) => code as u8,
        _ => REPLACEMENT,
    }
}

pub fn encode(text: &str) -> Vec<u8> {
    text.chars().map(encode_char).collect()
}

fn glyph_width(code: u8) -> u16 {
    match code {
        32..=126 => HELVETICA_ASCII_WIDTHS[usize::from(code - 32)],
        _ => FALLBACK_WIDTH,
    }
}

pub fn text_width(text: &str, size: f32) -> f32 {
    let units: u32 = text
        .chars()
        .map(|c| u32::from(glyph_width(encode_char(c))))
        .sum();
    units as f32 * size / 1000.0
}

/// Shortens `text` with a trailing `...` so it fits in `max_width`.
pub fn fit_to_width(text: &str, size: f32, max_width: f32) -> String {
    if text_width(text, size) <= max_width {
        return text.to_string();
    }

    const ELLIPSIS: &str = "...";
    let budget = max_width - text_width(ELLIPSIS, size);
    let mut used = 0.0;
    let mut fitted = String::new();
    for c in text.chars() {
        let w = f32::from(glyph_width(encode_char(c))) * size / 1000.0;
        if used + w > budget {
            break;
        }
        used += w;
        fitted.push(c);
    }
    fitted.push_str(ELLIPSIS);
    fitted
}
