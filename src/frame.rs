//! Backend-independent 8-bit BGR image plus the few pixel operations the
//! pipeline needs (mirror, downscale, overlay drawing, JPEG).

use anyhow::{ensure, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

/// BGR24 フレーム（行優先、stride = width * 3）
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width * height * 3) as usize);
        Self { width, height, data }
    }

    /// 単色フレーム
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&bgr);
        }
        Self { width, height, data }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * self.width + x) * 3) as usize;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// 左右反転
    pub fn flip_horizontal(&mut self) {
        let stride = (self.width * 3) as usize;
        for row in self.data.chunks_exact_mut(stride) {
            let w = self.width as usize;
            for x in 0..w / 2 {
                let a = x * 3;
                let b = (w - 1 - x) * 3;
                for c in 0..3 {
                    row.swap(a + c, b + c);
                }
            }
        }
    }

    /// 最近傍リサイズ
    pub fn resize_nearest(&self, width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            let sy = (y as u64 * self.height as u64 / height as u64) as u32;
            for x in 0..width {
                let sx = (x as u64 * self.width as u64 / width as u64) as u32;
                data.extend_from_slice(&self.pixel(sx, sy));
            }
        }
        Frame { width, height, data }
    }

    /// BGR -> RGB
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.data.len());
        for px in self.data.chunks_exact(3) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        rgb
    }

    /// RGB JPEG にエンコード
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        ensure!(
            self.data.len() == (self.width * self.height * 3) as usize && !self.data.is_empty(),
            "frame buffer does not match {}x{}",
            self.width,
            self.height
        );
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode(
            &self.to_rgb(),
            self.width,
            self.height,
            ExtendedColorType::Rgb8,
        )?;
        Ok(buf)
    }

    /// Bresenhamのアルゴリズムで線を描画
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: [u8; 3], thickness: i32) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;
        let r = (thickness / 2).max(0);

        loop {
            if r == 0 {
                self.set_pixel(x, y, color);
            } else {
                self.draw_circle(x, y, r, color);
            }

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// 円を描画（塗りつぶし）
    pub fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: [u8; 3]) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.set_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// ピクセルをセット（境界チェック付き）
    pub fn set_pixel(&mut self, x: i32, y: i32, color: [u8; 3]) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            let i = ((y as u32 * self.width + x as u32) * 3) as usize;
            self.data[i..i + 3].copy_from_slice(&color);
        }
    }
}
