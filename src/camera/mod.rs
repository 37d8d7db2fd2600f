//! Capture-source interface. The pipeline depends only on these traits;
//! the OS-specific backend is chosen once when the backend is built.

#[cfg(feature = "desktop")]
pub mod capture;

use thiserror::Error;

use crate::frame::Frame;

#[cfg(feature = "desktop")]
pub use capture::{OpenCvBackend, OpenCvCamera};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device {0} is not available")]
    DeviceUnavailable(usize),
    #[error("capture failed: {0}")]
    CaptureFailure(String),
}

/// An opened device. Dropping it releases the device.
pub trait CaptureSource: Send {
    /// May block up to the device timeout.
    fn read(&mut self) -> Result<Frame, CaptureError>;
}

pub trait CaptureBackend: Send + Sync {
    /// Ids of usable sources, at most `max`, in enumeration order.
    fn enumerate(&self, max: usize) -> Vec<usize>;

    fn open(&self, id: usize) -> Result<Box<dyn CaptureSource>, CaptureError>;
}
