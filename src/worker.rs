//! One worker per source: capture -> submit -> drain latest result ->
//! classify -> encode -> transmit -> store display frame.
//!
//! INIT -> RUNNING -> STOPPING -> CLOSED. A worker only ever ends itself;
//! its failures never reach other sources.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera::{CaptureBackend, CaptureError, CaptureSource};
use crate::config::Config;
use crate::engine::{EngineFactory, PoseEngine};
use crate::frame::Frame;
use crate::logging::Logger;
use crate::mask::{BinaryMask, MaskEncoder};
use crate::pose::{classify, draw_overlay, PoseLabel};
use crate::session::{DisplayFrame, Session};
use crate::transport::{SendOutcome, Transport};
use crate::{log, vlog};

/// プレビューJPEGのサイズ
pub const PREVIEW_WIDTH: u32 = 400;
pub const PREVIEW_HEIGHT: u32 = 300;
const PREVIEW_QUALITY: u8 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Init,
    Running,
    Stopping,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// stop flag observed
    Stopped,
    CaptureFailed(String),
    /// device, engine or socket could not be set up
    OpenFailed(String),
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub mirror: bool,
    pub encoder: MaskEncoder,
}

impl WorkerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mirror: config.capture.mirror,
            encoder: MaskEncoder::new(config.mask.threshold, config.mask.jpeg_quality),
        }
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            mirror: false,
            encoder: MaskEncoder::default(),
        }
    }
}

/// Strictly increasing millisecond timestamps for engine submission.
#[derive(Debug)]
pub struct MonotonicClock {
    start: Instant,
    last: Option<u64>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            last: None,
        }
    }

    pub fn next_ms(&mut self) -> u64 {
        let now = self.start.elapsed().as_millis() as u64;
        let ts = match self.last {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last = Some(ts);
        ts
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CameraWorker {
    session: Session,
    backend: Arc<dyn CaptureBackend>,
    engines: Arc<dyn EngineFactory>,
    options: WorkerOptions,
    stop: Arc<AtomicBool>,
    logger: Logger,
    state: WorkerState,
}

impl CameraWorker {
    pub fn new(
        session: Session,
        backend: Arc<dyn CaptureBackend>,
        engines: Arc<dyn EngineFactory>,
        options: WorkerOptions,
        stop: Arc<AtomicBool>,
        logger: Logger,
    ) -> Self {
        Self {
            session,
            backend,
            engines,
            options,
            stop,
            logger,
            state: WorkerState::Init,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn transition(&mut self, next: WorkerState) {
        vlog!(self.logger, "[cam{}] {:?} -> {:?}", self.session.id, self.state, next);
        self.state = next;
    }

    /// Runs to CLOSED and reports why it stopped.
    pub fn run(mut self) -> WorkerExit {
        let id = self.session.id;

        let (mut source, mut engine, transport) = match self.init() {
            Ok(parts) => parts,
            Err(reason) => {
                log!(self.logger, "[cam{}] open failed: {}", id, reason);
                self.transition(WorkerState::Closed);
                self.session.cell().mark_closed();
                return WorkerExit::OpenFailed(reason);
            }
        };
        log!(
            self.logger,
            "[cam{}] running (label {}, mask {})",
            id,
            transport.endpoints().label,
            transport.endpoints().mask
        );
        self.transition(WorkerState::Running);

        let mut clock = MonotonicClock::new();
        let mut last_label = None;
        let mut fps_counter: u32 = 0;
        let mut fps_timer = Instant::now();

        let exit = loop {
            if self.stop.load(Ordering::Relaxed) {
                break WorkerExit::Stopped;
            }

            match self.cycle(source.as_mut(), engine.as_mut(), &transport, &mut clock) {
                Ok(label) => {
                    if last_label != Some(label) {
                        log!(self.logger, "[cam{}] {}", id, label);
                        last_label = Some(label);
                    }
                }
                Err(e) => {
                    log!(self.logger, "[cam{}] {}", id, e);
                    break WorkerExit::CaptureFailed(e.to_string());
                }
            }

            fps_counter += 1;
            if fps_timer.elapsed() >= Duration::from_secs(1) {
                log!(self.logger, "[fps] cam{}: {}", id, fps_counter);
                fps_counter = 0;
                fps_timer = Instant::now();
            }
        };

        self.transition(WorkerState::Stopping);
        drop(engine);
        drop(source);
        drop(transport);
        self.session.cell().mark_closed();
        self.transition(WorkerState::Closed);
        log!(self.logger, "[cam{}] closed ({:?})", id, exit);
        exit
    }

    fn init(&self) -> Result<(Box<dyn CaptureSource>, Box<dyn PoseEngine>, Transport), String> {
        let id = self.session.id;
        let source = self.backend.open(id).map_err(|e| e.to_string())?;
        let engine = self
            .engines
            .create(id, self.session.result_sink())
            .map_err(|e| format!("engine: {:#}", e))?;
        let transport = Transport::new(self.session.endpoints).map_err(|e| format!("{:#}", e))?;
        Ok((source, engine, transport))
    }

    /// One capture cycle. Only capture errors end the loop; engine and
    /// network errors are logged and the cycle carries on.
    fn cycle(
        &self,
        source: &mut dyn CaptureSource,
        engine: &mut dyn PoseEngine,
        transport: &Transport,
        clock: &mut MonotonicClock,
    ) -> Result<PoseLabel, CaptureError> {
        let id = self.session.id;
        let mut frame = source.read()?;
        if self.options.mirror {
            frame.flip_horizontal();
        }

        let ts = clock.next_ms();
        if let Err(e) = engine.submit(&frame, ts) {
            log!(self.logger, "[cam{}] submit failed: {:#}", id, e);
        }

        let latest = self.session.cell().get_result();
        let mut label = PoseLabel::None;
        let mut binary = None;
        if let Some(result) = latest.as_deref() {
            if let Some(landmarks) = &result.landmarks {
                label = classify(landmarks);
                draw_overlay(&mut frame, landmarks);
            }
            binary = result.mask.as_ref().map(|m| self.options.encoder.binarize(Some(m)));
        }
        let jpeg = self.options.encoder.encode(binary.as_ref());

        self.transmit(transport, label, binary.as_ref(), &jpeg, &frame);
        self.session
            .cell()
            .set_display(DisplayFrame { frame, label }, binary);
        Ok(label)
    }

    fn transmit(
        &self,
        transport: &Transport,
        label: PoseLabel,
        mask: Option<&BinaryMask>,
        mask_jpeg: &[u8],
        display: &Frame,
    ) {
        let id = self.session.id;
        match transport.send_label(label) {
            Ok(SendOutcome::Sent(_)) => {}
            Ok(SendOutcome::Oversized(n)) => {
                log!(self.logger, "[tx] cam{}: label too large ({} bytes), skipping", id, n)
            }
            Err(e) => vlog!(self.logger, "[tx] cam{}: label {:#}", id, e),
        }
        match transport.send_mask(mask_jpeg) {
            Ok(SendOutcome::Sent(n)) => vlog!(
                self.logger,
                "[tx] cam{}: mask {} bytes, coverage {:.2}",
                id,
                n,
                mask.map_or(0.0, BinaryMask::coverage)
            ),
            Ok(SendOutcome::Oversized(n)) => {
                log!(self.logger, "[tx] cam{}: mask too large ({} bytes), skipping", id, n)
            }
            Err(e) => vlog!(self.logger, "[tx] cam{}: mask {:#}", id, e),
        }

        if transport.endpoints().preview.is_some() {
            let preview = display.resize_nearest(PREVIEW_WIDTH, PREVIEW_HEIGHT);
            match preview.encode_jpeg(PREVIEW_QUALITY) {
                Ok(jpeg) => match transport.send_preview(&jpeg) {
                    Ok(Some(SendOutcome::Oversized(n))) => {
                        log!(self.logger, "[tx] cam{}: frame too large ({} bytes), skipping", id, n)
                    }
                    Ok(_) => {}
                    Err(e) => vlog!(self.logger, "[tx] cam{}: preview {:#}", id, e),
                },
                Err(e) => vlog!(self.logger, "[tx] cam{}: preview encode {:#}", id, e),
            }
        }
    }
}
