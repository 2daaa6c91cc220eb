//! scenepipe-pipeline
//!
//! Art pipeline tools around the scene exporter:
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | YAML pipeline configuration |
//! | [`compress`] | recursive `.mov` to `.mp4` batch compression |
//! | [`frames`] | frame extraction from video folders for photogrammetry |
//! | [`photogrammetry`] | batch reconstruction runs |
//! | [`camera_stream`] | live camera pose broadcast over TCP |
//! | [`media`] / [`process`] | external tool seams |

pub mod camera_stream;
pub mod compress;
pub mod config;
pub mod frames;
pub mod media;
pub mod photogrammetry;
pub mod process;

use std::path::PathBuf;

use thiserror::Error;

pub use camera_stream::{CameraBroadcaster, CameraPose, StreamHandle};
pub use compress::{compress_tree, CompressOptions, CompressSummary};
pub use config::PipelineConfig;
pub use frames::{FrameExtractor, VideoSettings};
pub use media::{FfmpegTool, MediaTool, VideoInfo};
pub use photogrammetry::{PhotogrammetryJob, PhotogrammetrySummary};
pub use process::{ProcessOutput, ProcessRunner, SystemRunner};

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tool not found: {}", .0.display())]
    ToolNotFound(PathBuf),

    #[error("{tool} failed ({}): {stderr}", exit_status(.status))]
    ToolFailed {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] scenepipe_core::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

fn exit_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}
