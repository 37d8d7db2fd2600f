use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use anyhow::{bail, Context, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::preprocess::preprocess_for_landmarks;
use super::{EngineFactory, InferenceResult, PoseEngine, ResultSink};
use crate::config::EngineConfig;
use crate::frame::Frame;
use crate::logging::Logger;
use crate::mask::SegmentationMask;
use crate::pose::{JointIndex, Landmark, LandmarkSet};

/// ランドマーク1点あたりの値 (x, y, z, visibility, presence)
const VALUES_PER_LANDMARK: usize = 5;

/// BlazePose 系 landmark モデル（ONNX 変換版）
struct LandmarkModel {
    session: Session,
    input_size: u32,
    input_name: String,
    landmarks_output: String,
    presence_output: String,
    segmentation_output: Option<String>,
    presence_threshold: f32,
}

impl LandmarkModel {
    fn load(config: &EngineConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.model)
            .with_context(|| format!("Failed to load ONNX model {}", config.model))?;

        let has_output = |name: &str| session.outputs.iter().any(|o| o.name == name);
        for name in [&config.landmarks_output, &config.presence_output] {
            if !has_output(name) {
                bail!("model {} has no output named {}", config.model, name);
            }
        }
        // 空文字 or モデルに無い出力ならセグメンテーション無し
        let segmentation_output = config
            .segmentation_output
            .clone()
            .filter(|name| !name.is_empty() && has_output(name));

        Ok(Self {
            session,
            input_size: config.input_size,
            input_name: config.input_name.clone(),
            landmarks_output: config.landmarks_output.clone(),
            presence_output: config.presence_output.clone(),
            segmentation_output,
            presence_threshold: config.presence_threshold,
        })
    }

    fn infer(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<InferenceResult> {
        let input = preprocess_for_landmarks(frame, self.input_size);
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .context("Inference failed")?;

        let presence: ndarray::ArrayViewD<f32> = outputs[self.presence_output.as_str()]
            .try_extract_array()
            .context("Failed to extract presence tensor")?;
        let presence = presence.iter().next().copied().unwrap_or(0.0);
        if presence < self.presence_threshold {
            return Ok(InferenceResult {
                landmarks: None,
                mask: None,
                timestamp_ms,
            });
        }

        // [1, 195]: 33 x (x, y, z, visibility, presence)、入力ピクセル座標
        let raw: ndarray::ArrayViewD<f32> = outputs[self.landmarks_output.as_str()]
            .try_extract_array()
            .context("Failed to extract landmark tensor")?;
        let values: Vec<f32> = raw.iter().copied().collect();
        let size = self.input_size as f32;
        let landmarks = values
            .chunks_exact(VALUES_PER_LANDMARK)
            .take(JointIndex::COUNT)
            .map(|v| Landmark::new(v[0] / size, v[1] / size, v[2] / size))
            .collect();

        let mask = match &self.segmentation_output {
            Some(name) => {
                // [1, H, W, 1] logits
                let seg: ndarray::ArrayViewD<f32> = outputs[name.as_str()]
                    .try_extract_array()
                    .context("Failed to extract segmentation tensor")?;
                let shape = seg.shape().to_vec();
                if shape.len() >= 3 {
                    let (h, w) = (shape[1] as u32, shape[2] as u32);
                    let data = seg.iter().map(|&v| 1.0 / (1.0 + (-v).exp())).collect();
                    Some(SegmentationMask::new(w, h, data))
                } else {
                    None
                }
            }
            None => None,
        };

        Ok(InferenceResult {
            landmarks: Some(LandmarkSet::from_landmarks(landmarks)),
            mask,
            timestamp_ms,
        })
    }
}

#[derive(Default)]
struct Mailbox {
    pending: Option<(Frame, u64)>,
    closed: bool,
}

/// Runs the model on its own thread. `submit` only replaces the pending
/// frame, so a slow model skips frames instead of queueing them.
pub struct OnnxPoseEngine {
    mailbox: Arc<(Mutex<Mailbox>, Condvar)>,
}

impl OnnxPoseEngine {
    pub fn new(config: &EngineConfig, source: usize, sink: ResultSink, logger: Logger) -> Result<Self> {
        // 呼び出しスレッドでモデルを読み込みエラーを即時に返す
        let mut model = LandmarkModel::load(config)?;
        let mailbox = Arc::new((Mutex::new(Mailbox::default()), Condvar::new()));
        let inbox = Arc::clone(&mailbox);

        thread::Builder::new()
            .name(format!("infer{}", source))
            .spawn(move || {
                let (lock, cvar) = &*inbox;
                loop {
                    let job = {
                        let mut mb = lock.lock().unwrap_or_else(|e| e.into_inner());
                        while mb.pending.is_none() && !mb.closed {
                            mb = cvar.wait(mb).unwrap_or_else(|e| e.into_inner());
                        }
                        if mb.closed {
                            break;
                        }
                        mb.pending.take()
                    };
                    if let Some((frame, ts)) = job {
                        match model.infer(&frame, ts) {
                            Ok(result) => sink.deliver(result),
                            Err(e) => crate::log!(logger, "[cam{}] inference error: {:#}", source, e),
                        }
                    }
                }
            })
            .context("failed to spawn inference thread")?;

        Ok(Self { mailbox })
    }
}

impl PoseEngine for OnnxPoseEngine {
    fn submit(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<()> {
        let (lock, cvar) = &*self.mailbox;
        let mut mb = lock.lock().unwrap_or_else(|e| e.into_inner());
        mb.pending = Some((frame.clone(), timestamp_ms));
        cvar.notify_one();
        Ok(())
    }
}

impl Drop for OnnxPoseEngine {
    fn drop(&mut self) {
        // 推論中のフレームは完了後に破棄される
        let (lock, cvar) = &*self.mailbox;
        let mut mb = lock.lock().unwrap_or_else(|e| e.into_inner());
        mb.closed = true;
        mb.pending = None;
        cvar.notify_one();
    }
}

/// One ONNX session per source.
pub struct OnnxEngineFactory {
    config: EngineConfig,
    logger: Logger,
}

impl OnnxEngineFactory {
    pub fn new(config: EngineConfig, logger: Logger) -> Self {
        Self { config, logger }
    }
}

impl EngineFactory for OnnxEngineFactory {
    fn create(&self, source: usize, sink: ResultSink) -> Result<Box<dyn PoseEngine>> {
        let engine = OnnxPoseEngine::new(&self.config, source, sink, self.logger.clone())?;
        Ok(Box::new(engine))
    }
}
