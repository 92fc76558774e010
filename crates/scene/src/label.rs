//! Procedural label textures: text rasterized into RGBA bitmaps for signs and
//! banners.
//!
//! Text is drawn with an outline font: the configured one, or DejaVu Sans
//! Bold compiled into the crate. A 5x7 bitmap face is kept for when no
//! outline font parses, so signage always renders.

use cafescene_common::{Color, SignageConfig};
use image::{Rgba, RgbaImage};
use rusttype::{point, Font, Scale};

#[derive(Debug, thiserror::Error)]
pub enum LabelError {
    #[error("failed to read font {}: {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("font data could not be parsed")]
    InvalidFont,
}

/// One horizontally centered line of text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    /// Font size in pixels (em height).
    pub size: f32,
    pub color: Color,
    /// Baseline offset from the top edge, in pixels.
    pub baseline: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelSpec {
    pub width: u32,
    pub height: u32,
    pub background: Color,
    pub lines: Vec<TextLine>,
}

impl LabelSpec {
    /// A single line of text, vertically centered on the canvas.
    pub fn single(text: &str, size: f32, foreground: Color, background: Color, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            background,
            lines: vec![TextLine {
                text: text.to_string(),
                size,
                color: foreground,
                baseline: height as f32 * 0.5 + size * 0.35,
            }],
        }
    }

    /// Title over subtitle, laid out like the shop banner.
    pub fn banner(config: &SignageConfig) -> Self {
        let h = config.banner_height as f32;
        Self {
            width: config.banner_width,
            height: config.banner_height,
            background: config.background,
            lines: vec![
                TextLine {
                    text: config.title.clone(),
                    size: config.title_size,
                    color: config.title_color,
                    baseline: h * 0.39,
                },
                TextLine {
                    text: config.subtitle.clone(),
                    size: config.subtitle_size,
                    color: config.subtitle_color,
                    baseline: h * 0.625,
                },
            ],
        }
    }
}

/// DejaVu Sans Bold; license text ships next to it in `assets/`.
const EMBEDDED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans-Bold.ttf");

enum Face {
    Outline(Font<'static>),
    Bitmap,
}

/// Rasterizes [`LabelSpec`]s. Output depends only on the spec and the face.
pub struct LabelPainter {
    face: Face,
}

impl Default for LabelPainter {
    fn default() -> Self {
        Self::embedded()
    }
}

impl LabelPainter {
    /// Painter using the built-in bitmap face.
    pub fn bitmap() -> Self {
        Self { face: Face::Bitmap }
    }

    /// Painter using the font compiled into the crate.
    pub fn embedded() -> Self {
        match Font::try_from_bytes(EMBEDDED_FONT) {
            Some(font) => Self {
                face: Face::Outline(font),
            },
            None => {
                tracing::warn!("embedded sign font did not parse; using built-in bitmap face");
                Self::bitmap()
            }
        }
    }

    pub fn from_font_bytes(bytes: Vec<u8>) -> Result<Self, LabelError> {
        let font = Font::try_from_vec(bytes).ok_or(LabelError::InvalidFont)?;
        Ok(Self {
            face: Face::Outline(font),
        })
    }

    pub fn from_font_file(path: &std::path::Path) -> Result<Self, LabelError> {
        let bytes = std::fs::read(path).map_err(|source| LabelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_font_bytes(bytes)
    }

    /// Painter for the configured font, falling back to the embedded one.
    pub fn from_config(config: &SignageConfig) -> Self {
        match &config.font_path {
            Some(path) => match Self::from_font_file(path) {
                Ok(painter) => {
                    tracing::debug!(path = %path.display(), "loaded sign font");
                    painter
                }
                Err(e) => {
                    tracing::warn!("{e}; using embedded font");
                    Self::embedded()
                }
            },
            None => Self::embedded(),
        }
    }

    pub fn is_bitmap(&self) -> bool {
        matches!(self.face, Face::Bitmap)
    }

    /// Single-line convenience over [`LabelPainter::paint`].
    pub fn render_text(
        &self,
        text: &str,
        font_size: f32,
        foreground: Color,
        background: Color,
        width: u32,
        height: u32,
    ) -> RgbaImage {
        self.paint(&LabelSpec::single(text, font_size, foreground, background, width, height))
    }

    pub fn paint(&self, spec: &LabelSpec) -> RgbaImage {
        let mut image = RgbaImage::from_pixel(
            spec.width.max(1),
            spec.height.max(1),
            Rgba(spec.background.to_rgba8(255)),
        );
        for line in &spec.lines {
            match &self.face {
                Face::Outline(font) => draw_outline(&mut image, font, line),
                Face::Bitmap => draw_bitmap(&mut image, line),
            }
        }
        image
    }
}

fn blend(image: &mut RgbaImage, x: i32, y: i32, color: Color, coverage: f32) {
    if x < 0 || y < 0 || x >= image.width() as i32 || y >= image.height() as i32 {
        return;
    }
    let coverage = coverage.clamp(0.0, 1.0);
    let fg = color.to_rgba8(255);
    let px = image.get_pixel_mut(x as u32, y as u32);
    for c in 0..3 {
        let bg = px.0[c] as f32;
        px.0[c] = (bg + (fg[c] as f32 - bg) * coverage).round() as u8;
    }
}

fn draw_outline(image: &mut RgbaImage, font: &Font<'static>, line: &TextLine) {
    let scale = Scale::uniform(line.size);
    let text_width = font
        .layout(&line.text, scale, point(0.0, 0.0))
        .last()
        .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0);
    let origin = point((image.width() as f32 - text_width) * 0.5, line.baseline);
    for glyph in font.layout(&line.text, scale, origin) {
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|x, y, v| {
                blend(image, bb.min.x + x as i32, bb.min.y + y as i32, line.color, v);
            });
        }
    }
}

const BITMAP_COLUMNS: u32 = 5;
const BITMAP_ROWS: u32 = 7;
/// Bitmap cell size as a fraction of the font size; 7 rows span a cap height of 0.7 em.
const BITMAP_CELL_PER_EM: f32 = 0.1;

fn draw_bitmap(image: &mut RgbaImage, line: &TextLine) {
    let cell = (line.size * BITMAP_CELL_PER_EM).max(1.0);
    let advance = cell * (BITMAP_COLUMNS + 1) as f32;
    let glyphs: Vec<Option<[u8; 7]>> = line
        .text
        .chars()
        .filter_map(|c| if c == ' ' { Some(None) } else { bitmap_glyph(c).map(Some) })
        .collect();
    if glyphs.is_empty() {
        return;
    }
    let text_width = glyphs.len() as f32 * advance - cell;
    let mut pen_x = (image.width() as f32 - text_width) * 0.5;
    let top = line.baseline - cell * BITMAP_ROWS as f32;

    for glyph in glyphs {
        if let Some(rows) = glyph {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..BITMAP_COLUMNS {
                    if bits & (1 << (BITMAP_COLUMNS - 1 - col)) == 0 {
                        continue;
                    }
                    let x0 = (pen_x + col as f32 * cell).floor() as i32;
                    let y0 = (top + row as f32 * cell).floor() as i32;
                    let x1 = (pen_x + (col + 1) as f32 * cell).floor() as i32;
                    let y1 = (top + (row + 1) as f32 * cell).floor() as i32;
                    for y in y0..y1.max(y0 + 1) {
                        for x in x0..x1.max(x0 + 1) {
                            blend(image, x, y, line.color, 1.0);
                        }
                    }
                }
            }
        }
        pen_x += advance;
    }
}

#[rustfmt::skip]
fn bitmap_glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c.to_ascii_uppercase() {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
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
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100],
        ',' => [0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b00100, 0b01000],
        '!' => [0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00000, 0b00100],
        '?' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b00000, 0b00100],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        '\'' => [0b01100, 0b00100, 0b01000, 0b00000, 0b00000, 0b00000, 0b00000],
        '&' => [0b01100, 0b10010, 0b10100, 0b01000, 0b10101, 0b10010, 0b01101],
        '/' => [0b00000, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b00000],
        _ => return None,
    };
    Some(rows)
}
