//! Interface to the external landmark-inference engine.
//!
//! Engines accept frames fire-and-forget and deliver results later from
//! their own thread through a [`ResultSink`] bound to exactly one session.

#[cfg(feature = "desktop")]
pub mod onnx;
#[cfg(feature = "desktop")]
pub mod preprocess;

use std::sync::Arc;

use anyhow::Result;

use crate::frame::Frame;
use crate::mask::SegmentationMask;
use crate::pose::LandmarkSet;
use crate::session::SessionCell;

#[cfg(feature = "desktop")]
pub use onnx::{OnnxEngineFactory, OnnxPoseEngine};

/// One engine callback payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InferenceResult {
    /// None: 人物が検出されなかった
    pub landmarks: Option<LandmarkSet>,
    pub mask: Option<SegmentationMask>,
    pub timestamp_ms: u64,
}

/// Single-slot producer side of a session cell. Each delivery overwrites
/// whatever the worker has not drained yet.
#[derive(Debug, Clone)]
pub struct ResultSink {
    cell: Arc<SessionCell>,
}

impl ResultSink {
    pub fn new(cell: Arc<SessionCell>) -> Self {
        Self { cell }
    }

    pub fn deliver(&self, result: InferenceResult) {
        self.cell.set_result(result);
    }
}

pub trait PoseEngine: Send {
    /// Must not block on inference; results arrive through the sink.
    fn submit(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<()>;
}

pub trait EngineFactory: Send + Sync {
    fn create(&self, source: usize, sink: ResultSink) -> Result<Box<dyn PoseEngine>>;
}
