//! Built-in 5x7 bitmap glyphs for score labels.
//!
//! Score labels only ever contain digits, a decimal point and a sign, so a
//! tiny bitmap set avoids shipping a font file.

pub const GLYPH_WIDTH: u32 = 5;
pub const GLYPH_HEIGHT: u32 = 7;
const GLYPH_SPACING: u32 = 1;

/// Rows of a glyph, top to bottom; bit 4 is the leftmost column.
pub type Glyph = [u8; GLYPH_HEIGHT as usize];

pub fn glyph(c: char) -> Option<Glyph> {
    let rows = match c {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        _ => return None,
    };
    Some(rows)
}

/// Lit cells of `text` as `(column, row)` offsets in unscaled glyph units.
///
/// Unknown characters advance the cursor without drawing.
pub fn lit_cells(text: &str) -> impl Iterator<Item = (u32, u32)> + '_ {
    text.chars().enumerate().flat_map(|(index, c)| {
        let origin = index as u32 * (GLYPH_WIDTH + GLYPH_SPACING);
        glyph(c)
            .into_iter()
            .flat_map(move |rows| {
                (0..GLYPH_HEIGHT).flat_map(move |row| {
                    (0..GLYPH_WIDTH).filter_map(move |col| {
                        let bit = rows[row as usize] >> (GLYPH_WIDTH - 1 - col) & 1;
                        (bit == 1).then_some((origin + col, row))
                    })
                })
            })
    })
}

/// Rendered width of `text` in unscaled glyph units.
pub fn text_width(text: &str) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 {
        0
    } else {
        n * (GLYPH_WIDTH + GLYPH_SPACING) - GLYPH_SPACING
    }
}
