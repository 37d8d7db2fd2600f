//! Per-source session: identity, endpoints and the guarded "latest" cell
//! shared by the inference callback, the worker and the display loop.
//!
//! One mutex guards the whole record. Every accessor copies in or out under
//! the lock and returns; no I/O happens while it is held.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine::{InferenceResult, ResultSink};
use crate::frame::Frame;
use crate::mask::BinaryMask;
use crate::pose::PoseLabel;
use crate::transport::SourceEndpoints;

/// 注釈付きフレームとその時点のラベル
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayFrame {
    pub frame: Frame,
    pub label: PoseLabel,
}

#[derive(Debug, Default)]
pub struct SessionState {
    pub result: Option<Arc<InferenceResult>>,
    pub display: Option<DisplayFrame>,
    pub mask: Option<BinaryMask>,
    /// worker が CLOSED に到達した
    pub closed: bool,
}

/// Latest-wins cell. Writers replace, readers copy; intermediate values may
/// be skipped but never observed half-written.
#[derive(Debug, Default)]
pub struct SessionCell {
    state: Mutex<SessionState>,
}

impl SessionCell {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // 書き込み側が panic しても値自体は常に完全に置き換わっている
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_result(&self, result: InferenceResult) {
        self.lock().result = Some(Arc::new(result));
    }

    pub fn get_result(&self) -> Option<Arc<InferenceResult>> {
        self.lock().result.clone()
    }

    pub fn set_display(&self, display: DisplayFrame, mask: Option<BinaryMask>) {
        let mut state = self.lock();
        state.display = Some(display);
        state.mask = mask;
    }

    pub fn get_display(&self) -> Option<(DisplayFrame, Option<BinaryMask>)> {
        let state = self.lock();
        state
            .display
            .as_ref()
            .map(|d| (d.clone(), state.mask.clone()))
    }

    pub fn mark_closed(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// Everything one worker owns for its source.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: usize,
    pub endpoints: SourceEndpoints,
    cell: Arc<SessionCell>,
}

impl Session {
    pub fn new(id: usize, endpoints: SourceEndpoints) -> Self {
        Self {
            id,
            endpoints,
            cell: Arc::new(SessionCell::new()),
        }
    }

    pub fn cell(&self) -> &Arc<SessionCell> {
        &self.cell
    }

    /// Callback target for this session's inference engine.
    pub fn result_sink(&self) -> ResultSink {
        ResultSink::new(Arc::clone(&self.cell))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Landmark, LandmarkSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn result_with_x(x: f32, timestamp_ms: u64) -> InferenceResult {
        InferenceResult {
            landmarks: Some(LandmarkSet::from_landmarks(vec![Landmark::new(x, 0.5, 0.0)])),
            mask: None,
            timestamp_ms,
        }
    }

    #[test]
    fn test_empty_cell() {
        let cell = SessionCell::new();
        assert!(cell.get_result().is_none());
        assert!(cell.get_display().is_none());
        assert!(!cell.is_closed());
    }

    #[test]
    fn test_latest_result_wins() {
        let cell = SessionCell::new();
        cell.set_result(result_with_x(0.1, 1));
        cell.set_result(result_with_x(0.2, 2));
        cell.set_result(result_with_x(0.3, 3));
        let r = cell.get_result().unwrap();
        assert_eq!(r.timestamp_ms, 3);
        // 読み出しは消費しない
        assert_eq!(cell.get_result().unwrap().timestamp_ms, 3);
    }

    #[test]
    fn test_display_and_mask_replaced_together() {
        let cell = SessionCell::new();
        let display = DisplayFrame {
            frame: Frame::filled(2, 2, [1, 1, 1]),
            label: PoseLabel::Squat,
        };
        cell.set_display(display.clone(), Some(BinaryMask::zeros()));
        let (d, m) = cell.get_display().unwrap();
        assert_eq!(d, display);
        assert_eq!(m, Some(BinaryMask::zeros()));

        cell.set_display(display, None);
        assert_eq!(cell.get_display().unwrap().1, None);
    }

    #[test]
    fn test_sink_writes_into_session_cell() {
        let session = Session::new(0, SourceEndpoints::for_index("127.0.0.1", 4242, 0, 100, None).unwrap());
        let sink = session.result_sink();
        sink.deliver(result_with_x(0.4, 7));
        assert_eq!(session.cell().get_result().unwrap().timestamp_ms, 7);
    }

    #[test]
    fn test_concurrent_writes_never_tear() {
        // 書き込み n ごとにフレーム値・マスク値・結果を n で揃え、読み出し側で一致を検査
        let cell = Arc::new(SessionCell::new());
        let stop = Arc::new(AtomicBool::new(false));

        let writer = {
            let cell = Arc::clone(&cell);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut n: u32 = 0;
                while !stop.load(Ordering::Relaxed) {
                    let v = (n % 251) as u8;
                    cell.set_display(
                        DisplayFrame {
                            frame: Frame::filled(8, 8, [v, v, v]),
                            label: PoseLabel::ALL[(n as usize) % PoseLabel::ALL.len()],
                        },
                        Some(BinaryMask { data: vec![v; 64] }),
                    );
                    n = n.wrapping_add(1);
                }
            })
        };

        let callback = {
            let cell = Arc::clone(&cell);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut ts = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    ts += 1;
                    cell.set_result(result_with_x(0.5, ts));
                }
            })
        };

        let mut last_ts = 0;
        for _ in 0..20_000 {
            if let Some((display, mask)) = cell.get_display() {
                let v = display.frame.data[0];
                assert!(display.frame.data.iter().all(|&b| b == v));
                let mask = mask.unwrap();
                assert!(mask.data.iter().all(|&b| b == v));
            }
            if let Some(r) = cell.get_result() {
                assert!(r.timestamp_ms >= last_ts);
                last_ts = r.timestamp_ms;
            }
        }

        stop.store(true, Ordering::Relaxed);
        writer.join().unwrap();
        callback.join().unwrap();
    }
}
