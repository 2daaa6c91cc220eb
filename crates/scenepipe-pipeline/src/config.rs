//! Pipeline configuration
//!
//! Loaded from YAML; every field has a default so a partial file (or none
//! at all) is valid.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{PipelineError, PipelineResult};

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tools: ToolPaths,
    pub compress: CompressSettings,
    pub frames: FrameSettings,
    pub photogrammetry: PhotogrammetrySettings,
    pub camera_stream: CameraStreamSettings,
}

impl PipelineConfig {
    /// Load from a YAML file
    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml_str(&text)?;
        tracing::debug!(path = %path.display(), "Loaded pipeline configuration");
        Ok(config)
    }

    /// Parse from a YAML string
    pub fn from_yaml_str(text: &str) -> PipelineResult<Self> {
        let config: PipelineConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML
    pub fn to_yaml_string(&self) -> PipelineResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn validate(&self) -> PipelineResult<()> {
        if self.frames.total_frames == 0 {
            return Err(PipelineError::Config("frames.total_frames must be at least 1".into()));
        }
        if self.camera_stream.tick_ms <= 0.0 || !self.camera_stream.tick_ms.is_finite() {
            return Err(PipelineError::Config("camera_stream.tick_ms must be positive".into()));
        }
        if self.compress.crf > 51 {
            return Err(PipelineError::Config(format!(
                "compress.crf {} is outside 0..=51",
                self.compress.crf
            )));
        }
        Ok(())
    }
}

/// Locations of external executables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub meshroom_batch: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            meshroom_batch: PathBuf::from("Meshroom-2023.3.0/meshroom_batch.exe"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressSettings {
    /// Video codec passed to `-c:v`
    pub codec: String,
    /// Constant rate factor, lower is better quality
    pub crf: u32,
    /// Optional rate cap in Mbit/s
    pub max_bitrate_mbps: Option<u32>,
}

impl Default for CompressSettings {
    fn default() -> Self {
        Self {
            codec: "hevc".into(),
            crf: 23,
            max_bitrate_mbps: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Frames per folder when the folder has no `settings.json`
    pub total_frames: u32,
    /// Remove output folders with no matching input folder
    pub clean: bool,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            input: PathBuf::from("raw_videos"),
            output: PathBuf::from("extracted_frames"),
            total_frames: 180,
            clean: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotogrammetrySettings {
    pub input: PathBuf,
    pub output: PathBuf,
    pub template: PathBuf,
    pub cache: PathBuf,
    pub projects: PathBuf,
    pub verbosity: String,
}

impl Default for PhotogrammetrySettings {
    fn default() -> Self {
        Self {
            input: PathBuf::from("extracted_frames"),
            output: PathBuf::from("meshes"),
            template: PathBuf::from("meshroom-template.mg"),
            cache: PathBuf::from("MeshroomCache"),
            projects: PathBuf::from("project-files"),
            verbosity: "info".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraStreamSettings {
    pub addr: String,
    /// Broadcast interval in milliseconds
    pub tick_ms: f64,
}

impl CameraStreamSettings {
    pub fn tick(&self) -> Duration {
        Duration::from_secs_f64(self.tick_ms / 1000.0)
    }
}

impl Default for CameraStreamSettings {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:12348".into(),
            tick_ms: 16.67,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let config = PipelineConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.frames.total_frames, 180);
        assert_eq!(config.camera_stream.addr, "127.0.0.1:12348");
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let yaml = "compress:\n  crf: 18\n  max_bitrate_mbps: 4\ntools:\n  ffmpeg: /opt/ffmpeg/bin/ffmpeg\n";
        let config = PipelineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.compress.crf, 18);
        assert_eq!(config.compress.codec, "hevc");
        assert_eq!(config.compress.max_bitrate_mbps, Some(4));
        assert_eq!(config.tools.ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.tools.ffprobe, PathBuf::from("ffprobe"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(PipelineConfig::from_yaml_str("frames:\n  total_frames: 0\n").is_err());
        assert!(PipelineConfig::from_yaml_str("camera_stream:\n  tick_ms: -1\n").is_err());
        assert!(PipelineConfig::from_yaml_str("compress:\n  crf: 99\n").is_err());
        assert!(PipelineConfig::from_yaml_str("compress: [1, 2]\n").is_err());
    }

    #[test]
    fn test_load_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        let mut config = PipelineConfig::default();
        config.photogrammetry.verbosity = "debug".into();
        std::fs::write(&path, config.to_yaml_string().unwrap()).unwrap();

        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
        assert!(PipelineConfig::load(dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn test_tick_duration() {
        let tick = CameraStreamSettings::default().tick();
        assert!((tick.as_secs_f64() - 0.01667).abs() < 1e-9);
    }
}
