// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Pure image transform: draws a numbered cyan rectangle over each enumerated
//! element on top of a screenshot. Never mutates the page itself.

use image::{Rgba, RgbaImage};

use crate::element::BrowserElement;
use crate::error::BrowserError;

const CYAN: Rgba<u8> = Rgba([0, 255, 255, 255]);
const GLYPH_WIDTH: u32 = 7;
const GLYPH_HEIGHT: u32 = 13;

/// 3x5 dot-matrix digits, nearest-neighbour scaled up to the 7x13 glyph
/// cell at draw time.
const DIGIT_ROWS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111], // 0
    [0b010, 0b110, 0b010, 0b010, 0b111], // 1
    [0b111, 0b001, 0b111, 0b100, 0b111], // 2
    [0b111, 0b001, 0b111, 0b001, 0b111], // 3
    [0b101, 0b101, 0b111, 0b001, 0b001], // 4
    [0b111, 0b100, 0b111, 0b001, 0b111], // 5
    [0b111, 0b100, 0b111, 0b101, 0b111], // 6
    [0b111, 0b001, 0b001, 0b001, 0b001], // 7
    [0b111, 0b101, 0b111, 0b101, 0b111], // 8
    [0b111, 0b101, 0b111, 0b001, 0b111], // 9
];

pub fn render(screenshot_png: &[u8], elements: &[BrowserElement]) -> Result<Vec<u8>, BrowserError> {
    let image = image::load_from_memory(screenshot_png).map_err(BrowserError::Overlay)?;
    let mut canvas = image.to_rgba8();

    for element in elements {
        draw_rect_outline(&mut canvas, element);
        draw_index_label(&mut canvas, element);
    }

    let mut out = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut out);
    canvas
        .write_to(&mut cursor, image::ImageFormat::Png)
        .map_err(BrowserError::Overlay)?;
    Ok(out)
}

fn draw_rect_outline(canvas: &mut RgbaImage, element: &BrowserElement) {
    let (w, h) = (canvas.width(), canvas.height());
    let x0 = element.x.max(0.0) as u32;
    let y0 = element.y.max(0.0) as u32;
    let x1 = ((element.x + element.width).max(0.0) as u32).min(w.saturating_sub(1));
    let y1 = ((element.y + element.height).max(0.0) as u32).min(h.saturating_sub(1));

    for x in x0..=x1.max(x0) {
        put_pixel(canvas, x, y0);
        put_pixel(canvas, x, y1);
    }
    for y in y0..=y1.max(y0) {
        put_pixel(canvas, x0, y);
        put_pixel(canvas, x1, y);
    }
}

fn draw_index_label(canvas: &mut RgbaImage, element: &BrowserElement) {
    let origin_x = element.x.max(0.0) as u32;
    let origin_y = element.y.max(0.0) as u32;

    for (digit_pos, ch) in element.index.to_string().chars().enumerate() {
        let Some(digit) = ch.to_digit(10) else { continue };
        let cell_x = origin_x + digit_pos as u32 * GLYPH_WIDTH;
        draw_digit(canvas, cell_x, origin_y, digit as usize);
    }
}

fn draw_digit(canvas: &mut RgbaImage, cell_x: u32, cell_y: u32, digit: usize) {
    let rows = DIGIT_ROWS[digit];
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..3 {
            if bits & (1 << (2 - col)) == 0 {
                continue;
            }
            // Each source dot covers a GLYPH_WIDTH/3 x GLYPH_HEIGHT/5 block.
            let px0 = cell_x + col * (GLYPH_WIDTH / 3);
            let py0 = cell_y + row as u32 * (GLYPH_HEIGHT / 5);
            for dx in 0..(GLYPH_WIDTH / 3).max(1) {
                for dy in 0..(GLYPH_HEIGHT / 5).max(1) {
                    put_pixel(canvas, px0 + dx, py0 + dy);
                }
            }
        }
    }
}

fn put_pixel(canvas: &mut RgbaImage, x: u32, y: u32) {
    if x < canvas.width() && y < canvas.height() {
        canvas.put_pixel(x, y, CYAN);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};

    fn blank_png(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::new(w, h);
        let mut out = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut out);
        img.write_to(&mut cursor, ImageFormat::Png).unwrap();
        out
    }

    #[test]
    fn render_produces_a_valid_png_of_the_same_dimensions() {
        let input = blank_png(200, 100);
        let elements = vec![BrowserElement {
            index: 3,
            x: 10.0,
            y: 10.0,
            width: 50.0,
            height: 20.0,
            tag: "button".into(),
            text: "Go".into(),
            clickable: true,
        }];
        let out = render(&input, &elements).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 100));
    }

    #[test]
    fn render_with_no_elements_is_a_no_op_transform() {
        let input = blank_png(50, 50);
        let out = render(&input, &[]).unwrap();
        let decoded = image::load_from_memory(&out).unwrap().to_rgba8();
        assert!(decoded.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }
}
