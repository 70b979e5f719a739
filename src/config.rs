use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use crate::{
    alert::AlertMode,
    pipeline::{EstimatorConfig, SessionOptions},
};

#[derive(Debug, Parser)]
#[command(name = "posture-guard", version, about = "Plays an alert when you slump in front of the camera")]
pub struct Args {
    /// TOML configuration file
    #[arg(long, env = "POSTURE_GUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Camera index, overrides `camera.index`
    #[arg(long)]
    pub camera: Option<u32>,

    /// Print the available cameras and exit
    #[arg(long)]
    pub list_cameras: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CameraConfig {
    pub index: u32,
    /// Frames are scaled by this before estimation to keep the loop fast.
    pub resize_factor: f32,
    pub max_consecutive_failures: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            resize_factor: 0.5,
            max_consecutive_failures: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub path: PathBuf,
    /// Fetched into `path` when the file is missing.
    pub url: Option<String>,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models").join("pose_landmark_full.onnx"),
            url: None,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertModeKind {
    #[default]
    Blocking,
    Cooldown,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AlertConfig {
    pub sound_path: PathBuf,
    pub mode: AlertModeKind,
    pub cooldown_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            sound_path: PathBuf::from("assets").join("wrong.wav"),
            mode: AlertModeKind::Blocking,
            cooldown_ms: 3_000,
            poll_interval_ms: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    pub title: String,
    pub target_fps: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            title: "pose".to_string(),
            target_fps: 40,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Config file (if any) with command-line overrides applied.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(index) = args.camera {
            config.camera.index = index;
        }
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.camera.resize_factor > 0.0 && self.camera.resize_factor <= 4.0,
            "camera.resize_factor must be in (0, 4], got {}",
            self.camera.resize_factor
        );
        for (name, value) in [
            ("model.min_detection_confidence", self.model.min_detection_confidence),
            ("model.min_tracking_confidence", self.model.min_tracking_confidence),
        ] {
            anyhow::ensure!(
                (0.0..=1.0).contains(&value),
                "{name} must be within [0, 1], got {value}"
            );
        }
        Ok(())
    }

    pub fn alert_mode(&self) -> AlertMode {
        match self.alert.mode {
            AlertModeKind::Blocking => AlertMode::Blocking,
            AlertModeKind::Cooldown => {
                AlertMode::Cooldown(Duration::from_millis(self.alert.cooldown_ms))
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.alert.poll_interval_ms.max(1))
    }

    pub fn estimator(&self) -> EstimatorConfig {
        EstimatorConfig {
            min_detection_confidence: self.model.min_detection_confidence,
            min_tracking_confidence: self.model.min_tracking_confidence,
        }
    }

    pub fn session(&self) -> SessionOptions {
        SessionOptions {
            resize_factor: self.camera.resize_factor,
            max_consecutive_failures: self.camera.max_consecutive_failures,
        }
    }
}
