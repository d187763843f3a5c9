// TOML configuration.
// Every field is optional in the file; missing values fall back to the
// defaults below. With no file at all, `AppConfig::default()` is used.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;
use crate::orientation::Orientation;

const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_ROW_ALIGNMENT: usize = 64;
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 30;
const DEFAULT_QUEUE_DEPTH: usize = 1;
const DEFAULT_MODEL_PATH: &str = "model/seeta_fd_frontal_v1.0.bin";
const DEFAULT_MIN_FACE_SIZE: u32 = 40;
const DEFAULT_SCORE_THRESHOLD: f64 = 2.0;
const DEFAULT_TRACK_HOLD_FRAMES: u32 = 5;
const DEFAULT_STROKE_WIDTH: f32 = 30.0;
const DEFAULT_STROKE_COLOR: [u8; 3] = [255, 0, 0];
const DEFAULT_WINDOW_TITLE: &str = "Frame FX";
const DEFAULT_TARGET_FPS: usize = 60;

/// Where frames come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Camera,
    Synthetic,
}

/// Which processing strategy is wired to the frame callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Time-varying blue tint.
    Tint,
    /// Face detection with ellipse markers.
    Faces,
}

/// Face detector accuracy tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accuracy {
    Low,
    High,
}

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    source: Option<SourceKind>,
    camera: Option<CameraConfigFile>,
    processing: Option<ProcessingConfigFile>,
    tint: Option<TintConfigFile>,
    faces: Option<FacesConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    index: Option<u32>,
    name_hint: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    row_alignment: Option<usize>,
    max_consecutive_failures: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ProcessingConfigFile {
    strategy: Option<Strategy>,
    queue_depth: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TintConfigFile {
    orientation: Option<Orientation>,
}

#[derive(Debug, Deserialize, Default)]
struct FacesConfigFile {
    orientation: Option<Orientation>,
    detector_orientation: Option<Orientation>,
    model_path: Option<PathBuf>,
    accuracy: Option<Accuracy>,
    min_face_size: Option<u32>,
    score_threshold: Option<f64>,
    tracking: Option<bool>,
    track_hold_frames: Option<u32>,
    stroke_width: Option<f32>,
    stroke_color: Option<[u8; 3]>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    title: Option<String>,
    preview_orientation: Option<Orientation>,
    target_fps: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub source: SourceKind,
    pub camera: CameraSettings,
    pub processing: ProcessingSettings,
    pub tint: TintSettings,
    pub faces: FaceSettings,
    pub display: DisplaySettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub index: u32,
    /// Pick the first device whose name contains this (e.g. "front").
    pub name_hint: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Row stride alignment in bytes for delivered buffers.
    pub row_alignment: usize,
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone)]
pub struct ProcessingSettings {
    pub strategy: Strategy,
    /// Frames allowed to wait for the processor; newer frames are dropped.
    pub queue_depth: usize,
}

#[derive(Debug, Clone)]
pub struct TintSettings {
    pub orientation: Orientation,
}

#[derive(Debug, Clone)]
pub struct FaceSettings {
    pub orientation: Orientation,
    pub detector_orientation: Orientation,
    pub model_path: PathBuf,
    pub accuracy: Accuracy,
    pub min_face_size: u32,
    pub score_threshold: f64,
    pub tracking: bool,
    pub track_hold_frames: u32,
    pub stroke_width: f32,
    pub stroke_color: [u8; 3],
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub title: String,
    pub preview_orientation: Orientation,
    pub target_fps: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_file(AppConfigFile::default())
    }
}

impl AppConfig {
    /// Load from `path`, or use defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, Error> {
        let file: AppConfigFile =
            toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        let cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let processing = file.processing.unwrap_or_default();
        let tint = file.tint.unwrap_or_default();
        let faces = file.faces.unwrap_or_default();
        let display = file.display.unwrap_or_default();

        Self {
            source: file.source.unwrap_or(SourceKind::Camera),
            camera: CameraSettings {
                index: camera.index.unwrap_or(0),
                name_hint: camera.name_hint,
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                fps: camera.fps.unwrap_or(DEFAULT_CAMERA_FPS),
                row_alignment: camera.row_alignment.unwrap_or(DEFAULT_ROW_ALIGNMENT),
                max_consecutive_failures: camera
                    .max_consecutive_failures
                    .unwrap_or(DEFAULT_MAX_CONSECUTIVE_FAILURES),
            },
            processing: ProcessingSettings {
                strategy: processing.strategy.unwrap_or(Strategy::Faces),
                queue_depth: processing.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH),
            },
            tint: TintSettings {
                orientation: tint.orientation.unwrap_or(Orientation::Rotate90),
            },
            faces: FaceSettings {
                orientation: faces.orientation.unwrap_or(Orientation::Transpose),
                detector_orientation: faces.detector_orientation.unwrap_or(Orientation::Rotate90),
                model_path: faces.model_path.unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                accuracy: faces.accuracy.unwrap_or(Accuracy::High),
                min_face_size: faces.min_face_size.unwrap_or(DEFAULT_MIN_FACE_SIZE),
                score_threshold: faces.score_threshold.unwrap_or(DEFAULT_SCORE_THRESHOLD),
                tracking: faces.tracking.unwrap_or(true),
                track_hold_frames: faces.track_hold_frames.unwrap_or(DEFAULT_TRACK_HOLD_FRAMES),
                stroke_width: faces.stroke_width.unwrap_or(DEFAULT_STROKE_WIDTH),
                stroke_color: faces.stroke_color.unwrap_or(DEFAULT_STROKE_COLOR),
            },
            display: DisplaySettings {
                title: display.title.unwrap_or_else(|| DEFAULT_WINDOW_TITLE.to_string()),
                preview_orientation: display.preview_orientation.unwrap_or(Orientation::Rotate90),
                target_fps: display.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            },
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(Error::Config("camera width/height must be non-zero".into()));
        }
        if self.camera.row_alignment == 0 {
            return Err(Error::Config("camera.row_alignment must be at least 1".into()));
        }
        if self.processing.queue_depth == 0 {
            return Err(Error::Config("processing.queue_depth must be at least 1".into()));
        }
        if self.faces.stroke_width.is_nan() || self.faces.stroke_width <= 0.0 {
            return Err(Error::Config("faces.stroke_width must be positive".into()));
        }
        Ok(())
    }
}
