//! Software painting into a softbuffer frame: background, centred photo,
//! and a few lines of bitmap text for the overlays.

use crate::loader::DecodedImage;

pub const BG_COLOR: u32 = 0x001F1F1F;

// 5x7 bitmap font covering ASCII 32..127. Each glyph is 5 columns × 7 rows
// packed into 5 bytes (one byte per column, LSB = top row).
static FONT_5X7: [[u8; 5]; 96] = {
    let mut f = [[0u8; 5]; 96];
    // space
    f[0]  = [0x00, 0x00, 0x00, 0x00, 0x00];
    // !
    f[1]  = [0x00, 0x00, 0x5F, 0x00, 0x00];
    // "
    f[2]  = [0x00, 0x07, 0x00, 0x07, 0x00];
    // #
    f[3]  = [0x14, 0x7F, 0x14, 0x7F, 0x14];
    // $
    f[4]  = [0x24, 0x2A, 0x7F, 0x2A, 0x12];
    // %
    f[5]  = [0x23, 0x13, 0x08, 0x64, 0x62];
    // &
    f[6]  = [0x36, 0x49, 0x55, 0x22, 0x50];
    // '
    f[7]  = [0x00, 0x05, 0x03, 0x00, 0x00];
    // (
    f[8]  = [0x00, 0x1C, 0x22, 0x41, 0x00];
    // )
    f[9]  = [0x00, 0x41, 0x22, 0x1C, 0x00];
    // *
    f[10] = [0x14, 0x08, 0x3E, 0x08, 0x14];
    // +
    f[11] = [0x08, 0x08, 0x3E, 0x08, 0x08];
    // ,
    f[12] = [0x00, 0x50, 0x30, 0x00, 0x00];
    // -
    f[13] = [0x08, 0x08, 0x08, 0x08, 0x08];
    // .
    f[14] = [0x00, 0x60, 0x60, 0x00, 0x00];
    // /
    f[15] = [0x20, 0x10, 0x08, 0x04, 0x02];
    // 0
    f[16] = [0x3E, 0x51, 0x49, 0x45, 0x3E];
    // 1
    f[17] = [0x00, 0x42, 0x7F, 0x40, 0x00];
    // 2
    f[18] = [0x42, 0x61, 0x51, 0x49, 0x46];
    // 3
    f[19] = [0x21, 0x41, 0x45, 0x4B, 0x31];
    // 4
    f[20] = [0x18, 0x14, 0x12, 0x7F, 0x10];
    // 5
    f[21] = [0x27, 0x45, 0x45, 0x45, 0x39];
    // 6
    f[22] = [0x3C, 0x4A, 0x49, 0x49, 0x30];
    // 7
    f[23] = [0x01, 0x71, 0x09, 0x05, 0x03];
    // 8
    f[24] = [0x36, 0x49, 0x49, 0x49, 0x36];
    // 9
    f[25] = [0x06, 0x49, 0x49, 0x29, 0x1E];
    // :
    f[26] = [0x00, 0x36, 0x36, 0x00, 0x00];
    // ;
    f[27] = [0x00, 0x56, 0x36, 0x00, 0x00];
    // <
    f[28] = [0x08, 0x14, 0x22, 0x41, 0x00];
    // =
    f[29] = [0x14, 0x14, 0x14, 0x14, 0x14];
    // >
    f[30] = [0x00, 0x41, 0x22, 0x14, 0x08];
    // ?
    f[31] = [0x02, 0x01, 0x51, 0x09, 0x06];
    // @
    f[32] = [0x3E, 0x41, 0x5D, 0x55, 0x1E];
    // A
    f[33] = [0x7E, 0x11, 0x11, 0x11, 0x7E];
    // B
    f[34] = [0x7F, 0x49, 0x49, 0x49, 0x36];
    // C
    f[35] = [0x3E, 0x41, 0x41, 0x41, 0x22];
    // D
    f[36] = [0x7F, 0x41, 0x41, 0x22, 0x1C];
    // E
    f[37] = [0x7F, 0x49, 0x49, 0x49, 0x41];
    // F
    f[38] = [0x7F, 0x09, 0x09, 0x09, 0x01];
    // G
    f[39] = [0x3E, 0x41, 0x49, 0x49, 0x7A];
    // H
    f[40] = [0x7F, 0x08, 0x08, 0x08, 0x7F];
    // I
    f[41] = [0x00, 0x41, 0x7F, 0x41, 0x00];
    // J
    f[42] = [0x20, 0x40, 0x41, 0x3F, 0x01];
    // K
    f[43] = [0x7F, 0x08, 0x14, 0x22, 0x41];
    // L
    f[44] = [0x7F, 0x40, 0x40, 0x40, 0x40];
    // M
    f[45] = [0x7F, 0x02, 0x0C, 0x02, 0x7F];
    // N
    f[46] = [0x7F, 0x04, 0x08, 0x10, 0x7F];
    // O
    f[47] = [0x3E, 0x41, 0x41, 0x41, 0x3E];
    // P
    f[48] = [0x7F, 0x09, 0x09, 0x09, 0x06];
    // Q
    f[49] = [0x3E, 0x41, 0x51, 0x21, 0x5E];
    // R
    f[50] = [0x7F, 0x09, 0x19, 0x29, 0x46];
    // S
    f[51] = [0x46, 0x49, 0x49, 0x49, 0x31];
    // T
    f[52] = [0x01, 0x01, 0x7F, 0x01, 0x01];
    // U
    f[53] = [0x3F, 0x40, 0x40, 0x40, 0x3F];
    // V
    f[54] = [0x1F, 0x20, 0x40, 0x20, 0x1F];
    // W
    f[55] = [0x3F, 0x40, 0x38, 0x40, 0x3F];
    // X
    f[56] = [0x63, 0x14, 0x08, 0x14, 0x63];
    // Y
    f[57] = [0x07, 0x08, 0x70, 0x08, 0x07];
    // Z
    f[58] = [0x61, 0x51, 0x49, 0x45, 0x43];
    // [
    f[59] = [0x00, 0x7F, 0x41, 0x41, 0x00];
    // backslash
    f[60] = [0x02, 0x04, 0x08, 0x10, 0x20];
    // ]
    f[61] = [0x00, 0x41, 0x41, 0x7F, 0x00];
    // ^
    f[62] = [0x04, 0x02, 0x01, 0x02, 0x04];
    // _
    f[63] = [0x40, 0x40, 0x40, 0x40, 0x40];
    // `
    f[64] = [0x00, 0x01, 0x02, 0x04, 0x00];
    // a
    f[65] = [0x20, 0x54, 0x54, 0x54, 0x78];
    // b
    f[66] = [0x7F, 0x48, 0x44, 0x44, 0x38];
    // c
    f[67] = [0x38, 0x44, 0x44, 0x44, 0x20];
    // d
    f[68] = [0x38, 0x44, 0x44, 0x48, 0x7F];
    // e
    f[69] = [0x38, 0x54, 0x54, 0x54, 0x18];
    // f
    f[70] = [0x08, 0x7E, 0x09, 0x01, 0x02];
    // g
    f[71] = [0x0C, 0x52, 0x52, 0x52, 0x3E];
    // h
    f[72] = [0x7F, 0x08, 0x04, 0x04, 0x78];
    // i
    f[73] = [0x00, 0x44, 0x7D, 0x40, 0x00];
    // j
    f[74] = [0x20, 0x40, 0x44, 0x3D, 0x00];
    // k
    f[75] = [0x7F, 0x10, 0x28, 0x44, 0x00];
    // l
    f[76] = [0x00, 0x41, 0x7F, 0x40, 0x00];
    // m
    f[77] = [0x7C, 0x04, 0x18, 0x04, 0x78];
    // n
    f[78] = [0x7C, 0x08, 0x04, 0x04, 0x78];
    // o
    f[79] = [0x38, 0x44, 0x44, 0x44, 0x38];
    // p
    f[80] = [0x7C, 0x14, 0x14, 0x14, 0x08];
    // q
    f[81] = [0x08, 0x14, 0x14, 0x18, 0x7C];
    // r
    f[82] = [0x7C, 0x08, 0x04, 0x04, 0x08];
    // s
    f[83] = [0x48, 0x54, 0x54, 0x54, 0x20];
    // t
    f[84] = [0x04, 0x3F, 0x44, 0x40, 0x20];
    // u
    f[85] = [0x3C, 0x40, 0x40, 0x20, 0x7C];
    // v
    f[86] = [0x1C, 0x20, 0x40, 0x20, 0x1C];
    // w
    f[87] = [0x3C, 0x40, 0x30, 0x40, 0x3C];
    // x
    f[88] = [0x44, 0x28, 0x10, 0x28, 0x44];
    // y
    f[89] = [0x0C, 0x50, 0x50, 0x50, 0x3C];
    // z
    f[90] = [0x44, 0x64, 0x54, 0x4C, 0x44];
    // {
    f[91] = [0x00, 0x08, 0x36, 0x41, 0x00];
    // |
    f[92] = [0x00, 0x00, 0x7F, 0x00, 0x00];
    // }
    f[93] = [0x00, 0x41, 0x36, 0x08, 0x00];
    // ~
    f[94] = [0x10, 0x08, 0x08, 0x10, 0x08];
    // DEL (blank)
    f[95] = [0x00, 0x00, 0x00, 0x00, 0x00];
    f
};

/// Pack RGB into softbuffer u32 format: 0x00RRGGBB.
pub fn rgb(r: u8, g: u8, b: u8) -> u32 {
    (r as u32) << 16 | (g as u32) << 8 | b as u32
}

fn unpack_rgb(v: u32) -> (u8, u8, u8) {
    ((v >> 16) as u8, (v >> 8) as u8, v as u8)
}

fn blend(dst: u32, (r, g, b, a): (u8, u8, u8, u8)) -> u32 {
    let a = a as u32;
    let (dr, dg, db) = unpack_rgb(dst);
    let mix = |s: u8, d: u8| ((s as u32 * a + d as u32 * (255 - a)) / 255) as u8;
    rgb(mix(r, dr), mix(g, dg), mix(b, db))
}

// ---------------------------------------------------------------------------
// Canvas
// ---------------------------------------------------------------------------

pub struct Canvas<'a> {
    buf: &'a mut [u32],
    width: u32,
    height: u32,
}

impl<'a> Canvas<'a> {
    pub fn new(buf: &'a mut [u32], width: u32, height: u32) -> Self {
        Self { buf, width, height }
    }

    pub fn clear(&mut self, color: u32) {
        self.buf.fill(color);
    }

    fn put(&mut self, x: i32, y: i32, color: (u8, u8, u8, u8)) {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return;
        }
        let off = (y as u32 * self.width + x as u32) as usize;
        if let Some(px) = self.buf.get_mut(off) {
            *px = blend(*px, color);
        }
    }

    pub fn fill_rect(&mut self, rx: i32, ry: i32, rw: u32, rh: u32, color: (u8, u8, u8, u8)) {
        for row in 0..rh as i32 {
            for col in 0..rw as i32 {
                self.put(rx + col, ry + row, color);
            }
        }
    }

    fn draw_char(&mut self, ch: char, px: i32, py: i32, scale: u32, color: (u8, u8, u8, u8)) {
        let idx = (ch as u32).wrapping_sub(32) as usize;
        let Some(glyph) = FONT_5X7.get(idx) else { return };
        for (col, bits) in glyph.iter().enumerate() {
            for row in 0..7u32 {
                if bits & (1 << row) == 0 {
                    continue;
                }
                let x = px + (col as u32 * scale) as i32;
                let y = py + (row * scale) as i32;
                self.fill_rect(x, y, scale, scale, color);
            }
        }
    }

    /// Returns the x position after the last character.
    pub fn draw_text(&mut self, text: &str, px: i32, py: i32, scale: u32, color: (u8, u8, u8, u8)) -> i32 {
        let mut x = px;
        for ch in text.chars() {
            self.draw_char(ch, x, py, scale, color);
            x += (6 * scale) as i32;
        }
        x
    }

    /// Copy an already viewport-fitted image 1:1, centred.
    pub fn blit_centered(&mut self, img: &DecodedImage) {
        let (sw, sh) = (img.width(), img.height());
        let x0 = (self.width as i64 - sw as i64) / 2;
        let y0 = (self.height as i64 - sh as i64) / 2;
        for (sx, sy, p) in img.pixels.enumerate_pixels() {
            let [r, g, b, a] = p.0;
            self.put((x0 + sx as i64) as i32, (y0 + sy as i64) as i32, (r, g, b, a));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn blit_centres_image() {
        let mut buf = vec![BG_COLOR; 16];
        let mut canvas = Canvas::new(&mut buf, 4, 4);
        let img = DecodedImage::from_pixels(RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255])));
        canvas.blit_centered(&img);
        let red = rgb(255, 0, 0);
        assert_eq!(buf[5], red);
        assert_eq!(buf[10], red);
        assert_eq!(buf[0], BG_COLOR);
        assert_eq!(buf[15], BG_COLOR);
    }

    #[test]
    fn text_is_clipped_to_canvas() {
        let mut buf = vec![0; 20 * 10];
        let mut canvas = Canvas::new(&mut buf, 20, 10);
        let end = canvas.draw_text("P", 15, 5, 2, (255, 255, 255, 255));
        assert_eq!(end, 27);
        assert!(buf.iter().any(|&p| p == rgb(255, 255, 255)));
    }
}
