use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs},
};

use super::{CaptureBackend, CaptureError, CaptureSource};
use crate::config::CaptureConfig;
use crate::frame::Frame;

/// OS ごとのキャプチャバックエンド（起動時に一度だけ決定）
fn platform_api() -> VideoCaptureAPIs {
    if cfg!(target_os = "macos") {
        VideoCaptureAPIs::CAP_AVFOUNDATION
    } else if cfg!(target_os = "windows") {
        VideoCaptureAPIs::CAP_DSHOW
    } else if cfg!(target_os = "linux") {
        VideoCaptureAPIs::CAP_V4L2
    } else {
        VideoCaptureAPIs::CAP_ANY
    }
}

fn failure(e: opencv::Error) -> CaptureError {
    CaptureError::CaptureFailure(e.to_string())
}

/// OpenCVを使用したカメラキャプチャ
pub struct OpenCvCamera {
    capture: VideoCapture,
    width: u32,
    height: u32,
}

impl OpenCvCamera {
    /// 解像度とFPSを指定してカメラを開く
    pub fn open_with_config(
        index: usize,
        api: VideoCaptureAPIs,
        width: Option<u32>,
        height: Option<u32>,
        fps: Option<u32>,
    ) -> Result<Self, CaptureError> {
        let mut capture = VideoCapture::new(index as i32, api as i32)
            .map_err(|_| CaptureError::DeviceUnavailable(index))?;

        if !capture.is_opened().unwrap_or(false) {
            return Err(CaptureError::DeviceUnavailable(index));
        }

        // 要求値はドライバが丸めることがある
        if let Some(w) = width {
            capture.set(videoio::CAP_PROP_FRAME_WIDTH, w as f64).map_err(failure)?;
        }
        if let Some(h) = height {
            capture.set(videoio::CAP_PROP_FRAME_HEIGHT, h as f64).map_err(failure)?;
        }
        if let Some(f) = fps {
            capture.set(videoio::CAP_PROP_FPS, f as f64).map_err(failure)?;
        }
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0).map_err(failure)?;

        let actual_width = capture.get(videoio::CAP_PROP_FRAME_WIDTH).map_err(failure)? as u32;
        let actual_height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT).map_err(failure)? as u32;

        Ok(Self {
            capture,
            width: actual_width,
            height: actual_height,
        })
    }

    /// 解像度を取得
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn backend_name(&self) -> String {
        self.capture.get_backend_name().unwrap_or_default()
    }
}

impl CaptureSource for OpenCvCamera {
    /// フレームを読み込む（BGR形式）
    fn read(&mut self) -> Result<Frame, CaptureError> {
        let mut mat = Mat::default();
        let ok = self.capture.read(&mut mat).map_err(failure)?;
        if !ok || mat.empty() {
            return Err(CaptureError::CaptureFailure("empty frame received".to_string()));
        }
        mat_to_frame(&mat).map_err(failure)
    }
}

/// BGR / BGRA Mat -> Frame
fn mat_to_frame(mat: &Mat) -> opencv::Result<Frame> {
    let mut bgr = if mat.channels() == 4 {
        let mut converted = Mat::default();
        imgproc::cvt_color_def(mat, &mut converted, imgproc::COLOR_BGRA2BGR)?;
        converted
    } else {
        mat.try_clone()?
    };
    if !bgr.is_continuous() {
        bgr = bgr.try_clone()?;
    }
    Ok(Frame::new(
        bgr.cols() as u32,
        bgr.rows() as u32,
        bgr.data_bytes()?.to_vec(),
    ))
}

/// Probes device indices with the platform API.
pub struct OpenCvBackend {
    api: VideoCaptureAPIs,
    width: u32,
    height: u32,
    fps: u32,
}

impl OpenCvBackend {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            api: platform_api(),
            width: config.width,
            height: config.height,
            fps: config.fps,
        }
    }

    pub fn open_camera(&self, id: usize) -> Result<OpenCvCamera, CaptureError> {
        OpenCvCamera::open_with_config(id, self.api, Some(self.width), Some(self.height), Some(self.fps))
    }
}

impl CaptureBackend for OpenCvBackend {
    fn enumerate(&self, max: usize) -> Vec<usize> {
        let mut found = Vec::new();
        for index in 0..max {
            let available = VideoCapture::new(index as i32, self.api as i32)
                .and_then(|c| c.is_opened())
                .unwrap_or(false);
            // インデックスは連番なので最初の欠番で打ち切る
            if !available {
                break;
            }
            found.push(index);
        }
        found
    }

    fn open(&self, id: usize) -> Result<Box<dyn CaptureSource>, CaptureError> {
        Ok(Box::new(self.open_camera(id)?))
    }
}
