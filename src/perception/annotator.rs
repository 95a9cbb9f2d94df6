// Built-in marker overlay for click-history hints.
//
// Every marker becomes a yellow ringed dot with its rank next to it and the
// normalized coordinates underneath, drawn straight onto the screenshot.
use crate::errors::{ScreenPointError, ScreenPointResult};
use crate::perception::traits::Annotator;
use crate::perception::types::Marker;

const MARKER_YELLOW: [u8; 4] = [255, 214, 0, 235];
const RING_DARK: [u8; 4] = [40, 40, 40, 235];

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerOverlay;

impl MarkerOverlay {
    pub fn new() -> Self {
        Self
    }
}

impl Annotator for MarkerOverlay {
    fn annotate(&self, image: &[u8], markers: &[Marker]) -> ScreenPointResult<Vec<u8>> {
        if markers.is_empty() {
            return Ok(image.to_vec());
        }
        let img = image::load_from_memory(image)
            .map_err(|e| ScreenPointError::Annotation(format!("annotate load: {e}")))?;
        let mut canvas = img.to_rgba8();
        let (w, h) = canvas.dimensions();

        // Larger glyphs on high-res captures so the model can still read them.
        let scale: u32 = if w > 1600 { 2 } else { 1 };
        let radius = 6 * scale as i32;

        let mut drawn = 0usize;
        for marker in markers {
            if marker.x < 0 || marker.y < 0 || marker.x >= w as i32 || marker.y >= h as i32 {
                tracing::debug!(label = %marker.label, x = marker.x, y = marker.y, "marker outside image, skipped");
                continue;
            }
            draw_disc(&mut canvas, marker.x, marker.y, radius + scale as i32, RING_DARK);
            draw_disc(&mut canvas, marker.x, marker.y, radius, MARKER_YELLOW);

            let label_x = marker.x + radius + 2 * scale as i32;
            let label_y = marker.y - radius;
            draw_label(&mut canvas, label_x, label_y, &marker.label, scale);

            let norm = format!("({})", marker.norm_label);
            draw_label(&mut canvas, marker.x - radius, marker.y + radius + 2 * scale as i32, &norm, scale);
            drawn += 1;
        }
        tracing::debug!(markers = drawn, width = w, height = h, "history markers drawn");

        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(canvas)
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .map_err(|e| ScreenPointError::Annotation(format!("PNG encode: {e}")))?;
        Ok(out)
    }
}

// ── Drawing primitives ──────────────────────────────────────────────────────

fn draw_disc(canvas: &mut image::RgbaImage, cx: i32, cy: i32, r: i32, col: [u8; 4]) {
    let (w, h) = canvas.dimensions();
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy > r * r {
                continue;
            }
            let (x, y) = (cx + dx, cy + dy);
            if x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h {
                set_pixel(canvas, x as u32, y as u32, col);
            }
        }
    }
}

/// Yellow text on a darkened box, clipped to the canvas.
fn draw_label(canvas: &mut image::RgbaImage, x: i32, y: i32, text: &str, scale: u32) {
    let (w, h) = canvas.dimensions();
    let step = 5 * scale + scale;
    let pad = scale;
    let label_w = text.chars().count() as u32 * step + pad * 2;
    let label_h = 5 * scale + pad * 2;
    let x = x.clamp(0, (w as i32 - label_w as i32).max(0)) as u32;
    let y = y.clamp(0, (h as i32 - label_h as i32).max(0)) as u32;

    for dy in 0..label_h {
        for dx in 0..label_w {
            let (px, py) = (x + dx, y + dy);
            if px < w && py < h {
                let p = canvas.get_pixel_mut(px, py);
                p[0] = (p[0] as f32 * 0.25) as u8;
                p[1] = (p[1] as f32 * 0.25) as u8;
                p[2] = (p[2] as f32 * 0.25) as u8;
                p[3] = 255;
            }
        }
    }

    for (i, c) in text.chars().enumerate() {
        let gx = x + pad + i as u32 * step;
        if gx + 5 * scale > w {
            break;
        }
        draw_glyph(canvas, c, gx, y + pad, MARKER_YELLOW, scale);
    }
}

fn draw_glyph(canvas: &mut image::RgbaImage, c: char, px: u32, py: u32, col: [u8; 4], scale: u32) {
    let Some(glyph) = glyph_for(c) else {
        return;
    };
    let (w, h) = canvas.dimensions();
    for (row, &bits) in glyph.iter().enumerate() {
        for bit in 0..5u32 {
            if (bits >> (4 - bit)) & 1 == 0 {
                continue;
            }
            for sy in 0..scale {
                for sx in 0..scale {
                    let x = px + bit * scale + sx;
                    let y = py + row as u32 * scale + sy;
                    if x < w && y < h {
                        set_pixel(canvas, x, y, col);
                    }
                }
            }
        }
    }
}

fn glyph_for(c: char) -> Option<[u8; 5]> {
    Some(match c {
        '0'..='9' => DIGITS[(c as u8 - b'0') as usize],
        ',' => [0b00000, 0b00000, 0b00000, 0b00100, 0b01000],
        '(' => [0b00010, 0b00100, 0b00100, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00100, 0b00100, 0b01000],
        '#' => [0b01010, 0b11111, 0b01010, 0b11111, 0b01010],
        _ => return None,
    })
}

fn set_pixel(canvas: &mut image::RgbaImage, x: u32, y: u32, col: [u8; 4]) {
    let p = canvas.get_pixel_mut(x, y);
    let a = col[3] as f32 / 255.0;
    p[0] = (p[0] as f32 * (1.0 - a) + col[0] as f32 * a).round() as u8;
    p[1] = (p[1] as f32 * (1.0 - a) + col[1] as f32 * a).round() as u8;
    p[2] = (p[2] as f32 * (1.0 - a) + col[2] as f32 * a).round() as u8;
    p[3] = 255;
}

/// 5×5 bitmap digits.
const DIGITS: [[u8; 5]; 10] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110], // 0
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110], // 1
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111], // 2
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110], // 3
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010], // 4
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110], // 5
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110], // 6
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100], // 7
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110], // 8
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110], // 9
];
