//! Segmentation mask -> compact JPEG bitmap for the mask channel.
//!
//! Every call yields a decodable 160x120 grayscale JPEG. When no mask is
//! available (or encoding fails) an all-zero placeholder is returned instead,
//! so the receiver sees the same payload shape every cycle.

use std::sync::Arc;

use anyhow::{ensure, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

/// 送信マスクの固定サイズ
pub const MASK_WIDTH: u32 = 160;
pub const MASK_HEIGHT: u32 = 120;

pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_QUALITY: u8 = 80;

/// Per-pixel foreground probability, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl SegmentationMask {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Self {
        Self { width, height, data }
    }

    fn at(&self, x: u32, y: u32) -> f32 {
        self.data
            .get((y * self.width + x) as usize)
            .copied()
            .unwrap_or(0.0)
    }
}

/// 160x120, 0 or 255 per pixel
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMask {
    pub data: Vec<u8>,
}

impl BinaryMask {
    pub fn zeros() -> Self {
        Self {
            data: vec![0; (MASK_WIDTH * MASK_HEIGHT) as usize],
        }
    }

    /// 閾値で二値化しつつ最近傍で 160x120 に縮小
    pub fn from_probabilities(mask: &SegmentationMask, threshold: f32) -> Self {
        if mask.width == 0 || mask.height == 0 {
            return Self::zeros();
        }
        let mut data = Vec::with_capacity((MASK_WIDTH * MASK_HEIGHT) as usize);
        for y in 0..MASK_HEIGHT {
            let sy = (y as u64 * mask.height as u64 / MASK_HEIGHT as u64) as u32;
            for x in 0..MASK_WIDTH {
                let sx = (x as u64 * mask.width as u64 / MASK_WIDTH as u64) as u32;
                data.push(if mask.at(sx, sy) > threshold { 255 } else { 0 });
            }
        }
        Self { data }
    }

    pub fn coverage(&self) -> f32 {
        let on = self.data.iter().filter(|&&v| v != 0).count();
        on as f32 / self.data.len().max(1) as f32
    }
}

#[derive(Debug, Clone)]
pub struct MaskEncoder {
    threshold: f32,
    quality: u8,
    placeholder: Arc<[u8]>,
}

impl Default for MaskEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_QUALITY)
    }
}

impl MaskEncoder {
    pub fn new(threshold: f32, quality: u8) -> Self {
        let quality = quality.clamp(1, 100);
        let placeholder = placeholder_jpeg(quality);
        Self {
            threshold,
            quality,
            placeholder: placeholder.into(),
        }
    }

    pub fn binarize(&self, mask: Option<&SegmentationMask>) -> BinaryMask {
        match mask {
            Some(m) => BinaryMask::from_probabilities(m, self.threshold),
            None => BinaryMask::zeros(),
        }
    }

    /// Never fails: absent mask or encoder error -> placeholder.
    pub fn encode(&self, mask: Option<&BinaryMask>) -> Vec<u8> {
        match mask {
            Some(m) => self
                .compress(m)
                .unwrap_or_else(|_| self.placeholder()),
            None => self.placeholder(),
        }
    }

    /// 全ゼロ 160x120 の JPEG（生成時に一度だけエンコード）
    pub fn placeholder(&self) -> Vec<u8> {
        self.placeholder.to_vec()
    }

    fn compress(&self, mask: &BinaryMask) -> Result<Vec<u8>> {
        compress(mask, self.quality)
    }
}

/// 全ゼロマスクの JPEG。指定品質で失敗したら既定品質で作り直す
fn placeholder_jpeg(quality: u8) -> Vec<u8> {
    let zeros = BinaryMask::zeros();
    let bytes = compress(&zeros, quality)
        .or_else(|_| compress(&zeros, DEFAULT_QUALITY))
        .unwrap_or_default();
    debug_assert!(!bytes.is_empty(), "placeholder mask failed to encode");
    bytes
}

fn compress(mask: &BinaryMask, quality: u8) -> Result<Vec<u8>> {
    ensure!(
        mask.data.len() == (MASK_WIDTH * MASK_HEIGHT) as usize,
        "mask has {} pixels, expected {}",
        mask.data.len(),
        MASK_WIDTH * MASK_HEIGHT
    );
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode(
        &mask.data,
        MASK_WIDTH,
        MASK_HEIGHT,
        ExtendedColorType::L8,
    )?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> image::GrayImage {
        image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
            .unwrap()
            .to_luma8()
    }

    #[test]
    fn test_placeholder_is_decodable_160x120() {
        let encoder = MaskEncoder::default();
        let bytes = encoder.encode(None);
        assert!(!bytes.is_empty());
        let img = decode(&bytes);
        assert_eq!(img.dimensions(), (160, 120));
        assert!(img.pixels().all(|p| p[0] < 16));
    }

    #[test]
    fn test_placeholder_never_empty_for_any_quality() {
        for quality in [0u8, 1, 50, 100, 255] {
            let placeholder = MaskEncoder::new(0.5, quality).placeholder();
            assert!(!placeholder.is_empty(), "quality {}", quality);
            assert_eq!(decode(&placeholder).dimensions(), (160, 120));
        }
    }

    #[test]
    fn test_placeholder_is_idempotent() {
        let encoder = MaskEncoder::default();
        let first = encoder.encode(None);
        for _ in 0..5 {
            assert_eq!(encoder.encode(None), first);
        }
        assert_eq!(encoder.encode(Some(&BinaryMask::zeros())), first);
    }

    #[test]
    fn test_threshold_and_downsample() {
        // 左半分 0.9、右半分 0.2 の 320x240
        let (w, h) = (320u32, 240u32);
        let data = (0..w * h)
            .map(|i| if i % w < w / 2 { 0.9 } else { 0.2 })
            .collect();
        let mask = SegmentationMask::new(w, h, data);
        let binary = MaskEncoder::default().binarize(Some(&mask));
        assert_eq!(binary.data.len(), (MASK_WIDTH * MASK_HEIGHT) as usize);
        assert_eq!(binary.data[0], 255);
        assert_eq!(binary.data[(MASK_WIDTH - 1) as usize], 0);
        assert!((binary.coverage() - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_exact_threshold_is_background() {
        let mask = SegmentationMask::new(2, 2, vec![0.5; 4]);
        let binary = MaskEncoder::default().binarize(Some(&mask));
        assert_eq!(binary.coverage(), 0.0);
    }

    #[test]
    fn test_real_mask_round_trips_shape() {
        let (w, h) = (256u32, 256u32);
        let data = (0..w * h)
            .map(|i| if (i / w) > h / 2 { 1.0 } else { 0.0 })
            .collect();
        let encoder = MaskEncoder::new(0.5, 90);
        let binary = encoder.binarize(Some(&SegmentationMask::new(w, h, data)));
        let img = decode(&encoder.encode(Some(&binary)));
        assert_eq!(img.dimensions(), (160, 120));
        assert!(img.get_pixel(80, 110)[0] > 200);
        assert!(img.get_pixel(80, 10)[0] < 50);
    }

    #[test]
    fn test_malformed_mask_falls_back_to_placeholder() {
        let encoder = MaskEncoder::default();
        let broken = BinaryMask { data: vec![255; 10] };
        assert_eq!(encoder.encode(Some(&broken)), encoder.placeholder());
    }

    #[test]
    fn test_empty_grid_is_zero_mask() {
        let mask = SegmentationMask::new(0, 0, Vec::new());
        assert_eq!(MaskEncoder::default().binarize(Some(&mask)), BinaryMask::zeros());
    }

    #[test]
    fn test_short_data_treated_as_background() {
        let mask = SegmentationMask::new(10, 10, vec![1.0; 5]);
        let binary = MaskEncoder::default().binarize(Some(&mask));
        assert!(binary.coverage() < 0.1);
    }
}
