//! Text measurement collaborator.

use kurbo::{Size, Vec2};

/// Measured layout of a block of text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    pub width: f64,
    pub height: f64,
    pub line_height: f64,
    pub lines: usize,
}

impl TextMetrics {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// Placement and atlas coordinates of one glyph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    /// Pen advance after this glyph.
    pub advance: f64,
    /// Quad size; zero for blank glyphs.
    pub size: Size,
    /// Offset of the quad's top-left from the pen position at the line top.
    pub bearing: Vec2,
    /// `[u0, v0, u1, v1]` in the atlas.
    pub uv: [f32; 4],
}

/// Borrowed view of the glyph atlas texture (8-bit coverage).
#[derive(Debug, Clone, Copy)]
pub struct AtlasView<'a> {
    pub bytes: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Bumped whenever `bytes` change.
    pub generation: u64,
}

/// Supplies text metrics and glyph quads. Rasterization happens elsewhere.
pub trait GlyphProvider {
    fn measure(&self, text: &str, font_id: u32, size: f64) -> TextMetrics;
    fn glyph(&self, ch: char, font_id: u32, size: f64) -> Option<Glyph>;
    fn atlas(&self) -> AtlasView<'_>;
}

const CELL: u32 = 8;
const COLUMNS: u32 = 16;
const ROWS: u32 = 6;
const FIRST: u32 = 0x20;
const LAST: u32 = 0x7E;

/// Fixed-pitch provider covering printable ASCII. Other characters map to `?`.
#[derive(Debug, Clone)]
pub struct MonospaceGlyphs {
    advance_ratio: f64,
    line_ratio: f64,
    atlas: Vec<u8>,
}

impl Default for MonospaceGlyphs {
    fn default() -> Self {
        Self::new()
    }
}

impl MonospaceGlyphs {
    pub fn new() -> Self {
        let width = COLUMNS * CELL;
        let height = ROWS * CELL;
        let mut atlas = vec![0u8; (width * height) as usize];
        // Each printable cell gets a solid block inset by one texel.
        for code in (FIRST + 1)..=LAST {
            let (cx, cy) = Self::cell_of(code);
            for y in (cy * CELL + 1)..(cy * CELL + CELL - 1) {
                for x in (cx * CELL + 1)..(cx * CELL + CELL - 1) {
                    atlas[(y * width + x) as usize] = 0xFF;
                }
            }
        }
        Self {
            advance_ratio: 0.6,
            line_ratio: 1.2,
            atlas,
        }
    }

    fn cell_of(code: u32) -> (u32, u32) {
        let index = code - FIRST;
        (index % COLUMNS, index / COLUMNS)
    }

    fn code_for(ch: char) -> u32 {
        let code = ch as u32;
        if (FIRST..=LAST).contains(&code) { code } else { '?' as u32 }
    }
}

impl GlyphProvider for MonospaceGlyphs {
    fn measure(&self, text: &str, _font_id: u32, size: f64) -> TextMetrics {
        let line_height = size * self.line_ratio;
        let mut lines = 0;
        let mut widest = 0;
        for line in text.split('\n') {
            lines += 1;
            widest = widest.max(line.chars().count());
        }
        TextMetrics {
            width: widest as f64 * size * self.advance_ratio,
            height: lines as f64 * line_height,
            line_height,
            lines,
        }
    }

    fn glyph(&self, ch: char, _font_id: u32, size: f64) -> Option<Glyph> {
        if ch == '\n' {
            return None;
        }
        let advance = size * self.advance_ratio;
        if ch.is_whitespace() {
            return Some(Glyph {
                advance,
                size: Size::ZERO,
                bearing: Vec2::ZERO,
                uv: [0.0; 4],
            });
        }
        let (cx, cy) = Self::cell_of(Self::code_for(ch));
        let w = (COLUMNS * CELL) as f32;
        let h = (ROWS * CELL) as f32;
        let u0 = (cx * CELL) as f32 / w;
        let v0 = (cy * CELL) as f32 / h;
        Some(Glyph {
            advance,
            size: Size::new(advance, size),
            bearing: Vec2::new(0.0, (self.line_ratio - 1.0) * size / 2.0),
            uv: [u0, v0, u0 + CELL as f32 / w, v0 + CELL as f32 / h],
        })
    }

    fn atlas(&self) -> AtlasView<'_> {
        AtlasView {
            bytes: &self.atlas,
            width: COLUMNS * CELL,
            height: ROWS * CELL,
            generation: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_multiline() {
        let glyphs = MonospaceGlyphs::new();
        let m = glyphs.measure("abcd\nab", 0, 10.0);
        assert_eq!(m.lines, 2);
        assert!((m.width - 24.0).abs() < 1e-9);
        assert!((m.height - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_char_maps_to_question_mark() {
        let glyphs = MonospaceGlyphs::new();
        let a = glyphs.glyph('é', 0, 12.0).unwrap();
        let b = glyphs.glyph('?', 0, 12.0).unwrap();
        assert_eq!(a.uv, b.uv);
        assert!(glyphs.glyph('\n', 0, 12.0).is_none());
    }

    #[test]
    fn test_atlas_dimensions() {
        let glyphs = MonospaceGlyphs::new();
        let atlas = glyphs.atlas();
        assert_eq!(atlas.bytes.len(), (atlas.width * atlas.height) as usize);
    }
}
