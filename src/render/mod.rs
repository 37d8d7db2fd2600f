//! Display sinks for the aggregation loop.

#[cfg(feature = "desktop")]
pub mod window;

#[cfg(feature = "desktop")]
pub use window::MinifbPresenter;

use anyhow::Result;

use crate::session::DisplayFrame;

/// Receives each source's latest display frame from the orchestrator.
pub trait Presenter {
    fn present(&mut self, source: usize, display: &DisplayFrame) -> Result<()>;

    /// UI 側の終了要求（ウィンドウを閉じた等）
    fn close_requested(&self) -> bool;
}

/// 表示なし。終了要求も出さない
#[derive(Debug, Default)]
pub struct HeadlessPresenter {
    presented: u64,
}

impl HeadlessPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 受け取ったフレーム数
    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl Presenter for HeadlessPresenter {
    fn present(&mut self, _source: usize, _display: &DisplayFrame) -> Result<()> {
        self.presented += 1;
        Ok(())
    }

    fn close_requested(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::pose::PoseLabel;

    #[test]
    fn test_headless_counts_and_never_closes() {
        let mut presenter = HeadlessPresenter::new();
        let display = DisplayFrame {
            frame: Frame::filled(4, 4, [0, 0, 0]),
            label: PoseLabel::Standing,
        };
        for i in 0..3 {
            presenter.present(i, &display).unwrap();
        }
        assert_eq!(presenter.presented(), 3);
        assert!(!presenter.close_requested());
    }
}
