use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub mask: MaskConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// 送信先ホスト
    #[serde(default = "default_host")]
    pub host: String,
    /// source i のラベルポート = base_port + i
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    /// source i のマスクポート = base_port + i + mask_port_offset
    #[serde(default = "default_mask_port_offset")]
    pub mask_port_offset: u16,
    /// 注釈付きプレビューJPEGも送信する
    #[serde(default)]
    pub preview: bool,
    #[serde(default = "default_preview_port_offset")]
    pub preview_port_offset: u16,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_base_port() -> u16 { 4242 }
fn default_mask_port_offset() -> u16 { 100 }
fn default_preview_port_offset() -> u16 { 200 }

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            base_port: default_base_port(),
            mask_port_offset: default_mask_port_offset(),
            preview: false,
            preview_port_offset: default_preview_port_offset(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// 列挙するソースの上限
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// 推論前に左右反転（鏡像表示）
    #[serde(default = "default_mirror")]
    pub mirror: bool,
}

fn default_max_sources() -> usize { 4 }
fn default_width() -> u32 { 1200 }
fn default_height() -> u32 { 900 }
fn default_fps() -> u32 { 30 }
fn default_mirror() -> bool { true }

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_sources: default_max_sources(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            mirror: default_mirror(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaskConfig {
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_mask_threshold")]
    pub threshold: f32,
}

fn default_jpeg_quality() -> u8 { 80 }
fn default_mask_threshold() -> f32 { 0.5 }

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
            threshold: default_mask_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// ONNX landmark model
    #[serde(default = "default_model")]
    pub model: String,
    /// モデル入力の一辺（正方形）
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    #[serde(default = "default_landmarks_output")]
    pub landmarks_output: String,
    #[serde(default = "default_presence_output")]
    pub presence_output: String,
    #[serde(default = "default_segmentation_output")]
    pub segmentation_output: Option<String>,
    #[serde(default = "default_presence_threshold")]
    pub presence_threshold: f32,
}

fn default_model() -> String { "models/pose_landmark_full.onnx".to_string() }
fn default_input_size() -> u32 { 256 }
fn default_input_name() -> String { "input_1".to_string() }
fn default_landmarks_output() -> String { "Identity".to_string() }
fn default_presence_output() -> String { "Identity_1".to_string() }
fn default_segmentation_output() -> Option<String> { Some("Identity_2".to_string()) }
fn default_presence_threshold() -> f32 { 0.5 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            input_size: default_input_size(),
            input_name: default_input_name(),
            landmarks_output: default_landmarks_output(),
            presence_output: default_presence_output(),
            segmentation_output: default_segmentation_output(),
            presence_threshold: default_presence_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    /// worker 1つあたりの join 待ち上限
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
    /// 集約ループの周期
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_join_timeout_ms() -> u64 { 2000 }
fn default_poll_interval_ms() -> u64 { 10 }

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            join_timeout_ms: default_join_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default)]
    pub verbose: bool,
}

fn default_log_dir() -> String { "logs".to_string() }

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            verbose: false,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// ファイルが無い・壊れている場合はデフォルト値
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("[config] {:#}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.max_sources == 0 {
            bail!("capture.max_sources must be at least 1");
        }
        if !(1..=100).contains(&self.mask.jpeg_quality) {
            bail!("mask.jpeg_quality must be in 1..=100, got {}", self.mask.jpeg_quality);
        }
        let offset = self
            .network
            .mask_port_offset
            .max(self.network.preview_port_offset) as usize;
        let highest = self.network.base_port as usize + self.capture.max_sources - 1 + offset;
        if highest > u16::MAX as usize {
            bail!(
                "port range overflows: base_port {} with {} sources reaches {}",
                self.network.base_port,
                self.capture.max_sources,
                highest
            );
        }
        Ok(())
    }
}
