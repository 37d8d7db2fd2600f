use ndarray::Array4;

use crate::frame::Frame;

/// Frame を landmark モデルの入力テンソルに変換
///
/// - BGR -> RGB
/// - size x size に最近傍リサイズ（アスペクト比は保持しない）
/// - [1, size, size, 3] の f32 テンソル (0.0-1.0)
pub fn preprocess_for_landmarks(frame: &Frame, size: u32) -> Array4<f32> {
    let n = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, n, n, 3));
    if frame.width == 0 || frame.height == 0 {
        return tensor;
    }

    for y in 0..size {
        let sy = (y as u64 * frame.height as u64 / size as u64) as u32;
        for x in 0..size {
            let sx = (x as u64 * frame.width as u64 / size as u64) as u32;
            let [b, g, r] = frame.pixel(sx, sy);
            tensor[[0, y as usize, x as usize, 0]] = r as f32 / 255.0;
            tensor[[0, y as usize, x as usize, 1]] = g as f32 / 255.0;
            tensor[[0, y as usize, x as usize, 2]] = b as f32 / 255.0;
        }
    }

    tensor
}
