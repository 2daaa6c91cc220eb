//! Video probing, frame grabbing and transcoding
//!
//! Everything touching video content goes through [`MediaTool`];
//! [`FfmpegTool`] implements it with the `ffprobe` and `ffmpeg` executables.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::compress::CompressOptions;
use crate::config::ToolPaths;
use crate::process::{ProcessRunner, SystemRunner};
use crate::{PipelineError, PipelineResult};

/// Frame count and rate of a video stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub frame_count: u64,
    pub fps: f64,
}

impl VideoInfo {
    /// Duration in seconds, zero when the rate is unknown
    pub fn duration(&self) -> f64 {
        if self.fps > 0.0 {
            self.frame_count as f64 / self.fps
        } else {
            0.0
        }
    }
}

/// Access to video content
pub trait MediaTool {
    fn probe(&self, video: &Path) -> PipelineResult<VideoInfo>;

    /// Write frame `index` of `video` as a PNG image
    fn extract_frame(&self, video: &Path, index: u64, output: &Path) -> PipelineResult<()>;

    /// Re-encode `input` into `output`, overwriting it
    fn transcode(&self, input: &Path, output: &Path, options: &CompressOptions) -> PipelineResult<()>;
}

/// [`MediaTool`] using `ffprobe` and `ffmpeg`
#[derive(Debug, Clone)]
pub struct FfmpegTool<R = SystemRunner> {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    runner: R,
}

impl FfmpegTool {
    /// Tools found on `PATH`
    pub fn new() -> Self {
        Self::from_paths(&ToolPaths::default())
    }

    pub fn from_paths(paths: &ToolPaths) -> Self {
        Self::with_runner(paths, SystemRunner)
    }
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ProcessRunner> FfmpegTool<R> {
    pub fn with_runner(paths: &ToolPaths, runner: R) -> Self {
        Self {
            ffmpeg: paths.ffmpeg.clone(),
            ffprobe: paths.ffprobe.clone(),
            runner,
        }
    }

    fn ffmpeg(&self, args: Vec<OsString>) -> PipelineResult<()> {
        self.runner.run(&self.ffmpeg, &args)?.check("ffmpeg")?;
        Ok(())
    }
}

impl<R: ProcessRunner> MediaTool for FfmpegTool<R> {
    fn probe(&self, video: &Path) -> PipelineResult<VideoInfo> {
        let args: Vec<OsString> = vec![
            "-v".into(),
            "error".into(),
            "-select_streams".into(),
            "v:0".into(),
            "-count_packets".into(),
            "-show_entries".into(),
            "stream=nb_read_packets,r_frame_rate".into(),
            "-of".into(),
            "json".into(),
            video.as_os_str().to_os_string(),
        ];
        let output = self.runner.run(&self.ffprobe, &args)?.check("ffprobe")?;
        parse_probe_output(&output.stdout)
    }

    fn extract_frame(&self, video: &Path, index: u64, output: &Path) -> PipelineResult<()> {
        self.ffmpeg(vec![
            "-v".into(),
            "error".into(),
            "-i".into(),
            video.as_os_str().to_os_string(),
            "-vf".into(),
            format!("select=eq(n\\,{})", index).into(),
            "-vsync".into(),
            "0".into(),
            "-frames:v".into(),
            "1".into(),
            "-y".into(),
            output.as_os_str().to_os_string(),
        ])
    }

    fn transcode(&self, input: &Path, output: &Path, options: &CompressOptions) -> PipelineResult<()> {
        self.ffmpeg(options.ffmpeg_args(input, output))
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    #[serde(default)]
    nb_read_packets: Option<String>,
    #[serde(default)]
    r_frame_rate: Option<String>,
}

/// Parse `ffprobe -of json` stream output
pub fn parse_probe_output(json: &str) -> PipelineResult<VideoInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)?;
    let stream = probe
        .streams
        .first()
        .ok_or_else(|| PipelineError::Config("no video stream in probe output".into()))?;

    let frame_count = stream
        .nb_read_packets
        .as_deref()
        .and_then(|n| n.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let fps = stream.r_frame_rate.as_deref().map_or(0.0, parse_rate);

    Ok(VideoInfo { frame_count, fps })
}

/// Parse a rational rate such as `30000/1001`
fn parse_rate(rate: &str) -> f64 {
    let parsed = match rate.split_once('/') {
        Some((num, den)) => match (num.trim().parse::<f64>(), den.trim().parse::<f64>()) {
            (Ok(num), Ok(den)) if den != 0.0 => num / den,
            _ => 0.0,
        },
        None => rate.trim().parse::<f64>().unwrap_or(0.0),
    };
    if parsed.is_finite() {
        parsed
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessOutput;
    use parking_lot::Mutex;

    struct Scripted {
        stdout: String,
        calls: Mutex<Vec<(PathBuf, Vec<OsString>)>>,
    }

    impl ProcessRunner for Scripted {
        fn run(&self, program: &Path, args: &[OsString]) -> PipelineResult<ProcessOutput> {
            self.calls.lock().push((program.to_path_buf(), args.to_vec()));
            Ok(ProcessOutput {
                status: Some(0),
                stdout: self.stdout.clone(),
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{ "streams": [ { "r_frame_rate": "30000/1001", "nb_read_packets": "300" } ] }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.frame_count, 300);
        assert!((info.fps - 29.97).abs() < 0.01);
        assert!((info.duration() - 10.01).abs() < 0.01);

        assert!(parse_probe_output(r#"{ "streams": [] }"#).is_err());
    }

    #[test]
    fn test_unknown_rate_has_zero_duration() {
        let json = r#"{ "streams": [ { "r_frame_rate": "0/0", "nb_read_packets": "12" } ] }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.fps, 0.0);
        assert_eq!(info.duration(), 0.0);
    }

    #[test]
    fn test_probe_uses_configured_ffprobe() {
        let paths = ToolPaths {
            ffprobe: PathBuf::from("/opt/bin/ffprobe"),
            ..ToolPaths::default()
        };
        let runner = Scripted {
            stdout: r#"{ "streams": [ { "r_frame_rate": "24/1", "nb_read_packets": "48" } ] }"#.into(),
            calls: Mutex::new(Vec::new()),
        };
        let tool = FfmpegTool::with_runner(&paths, runner);

        let info = tool.probe(Path::new("clip.mov")).unwrap();
        assert_eq!(info.duration(), 2.0);

        let calls = tool.runner.calls.lock();
        assert_eq!(calls[0].0, PathBuf::from("/opt/bin/ffprobe"));
        assert_eq!(calls[0].1.last(), Some(&OsString::from("clip.mov")));
    }

    #[test]
    fn test_extract_frame_selects_index() {
        let runner = Scripted {
            stdout: String::new(),
            calls: Mutex::new(Vec::new()),
        };
        let tool = FfmpegTool::with_runner(&ToolPaths::default(), runner);
        tool.extract_frame(Path::new("a.mp4"), 42, Path::new("frame_000000.png"))
            .unwrap();

        let calls = tool.runner.calls.lock();
        assert!(calls[0].1.contains(&OsString::from("select=eq(n\\,42)")));
        assert_eq!(calls[0].0, PathBuf::from("ffmpeg"));
    }
}
