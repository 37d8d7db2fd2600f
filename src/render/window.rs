use std::collections::BTreeMap;

use anyhow::Result;
use minifb::{Key, Window, WindowOptions};

use super::Presenter;
use crate::frame::Frame;
use crate::pose::PoseLabel;
use crate::session::DisplayFrame;

/// 1ソース分のウィンドウ
struct SourceWindow {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
    label: Option<PoseLabel>,
}

impl SourceWindow {
    fn new(source: usize, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            &format!("cam{}", source),
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;

        Ok(Self {
            window,
            buffer: vec![0u32; width * height],
            width,
            height,
            label: None,
        })
    }

    /// ウィンドウが開いているか
    fn is_open(&self) -> bool {
        self.window.is_open()
            && !self.window.is_key_down(Key::Escape)
            && !self.window.is_key_down(Key::Q)
    }

    /// BGR フレームをバッファにコピー
    fn draw_frame(&mut self, frame: &Frame) {
        // サイズが異なる場合はクロップ/パディング
        for y in 0..self.height.min(frame.height as usize) {
            for x in 0..self.width.min(frame.width as usize) {
                let [b, g, r] = frame.pixel(x as u32, y as u32);
                self.buffer[y * self.width + x] = ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
            }
        }
    }

    fn set_label(&mut self, source: usize, label: PoseLabel) {
        if self.label != Some(label) {
            self.window.set_title(&format!("cam{} - {}", source, label));
            self.label = Some(label);
        }
    }

    /// バッファをウィンドウに表示
    fn update(&mut self) -> Result<()> {
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)?;
        Ok(())
    }
}

/// One minifb window per source, opened on the first frame.
#[derive(Default)]
pub struct MinifbPresenter {
    windows: BTreeMap<usize, SourceWindow>,
    closed: bool,
}

impl MinifbPresenter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Presenter for MinifbPresenter {
    fn present(&mut self, source: usize, display: &DisplayFrame) -> Result<()> {
        if !self.windows.contains_key(&source) {
            let window = SourceWindow::new(source, display.frame.width as usize, display.frame.height as usize)?;
            self.windows.insert(source, window);
        }
        if let Some(window) = self.windows.get_mut(&source) {
            window.draw_frame(&display.frame);
            window.set_label(source, display.label);
            window.update()?;
            if !window.is_open() {
                self.closed = true;
            }
        }
        Ok(())
    }

    fn close_requested(&self) -> bool {
        self.closed
    }
}
