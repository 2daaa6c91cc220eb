//! Frame extraction for photogrammetry
//!
//! Input layout: one subfolder per subject, each holding one or more videos
//! and an optional `settings.json`. Loose videos in the input root are first
//! moved into a subfolder named after their stem. Every subfolder yields an
//! output folder of `frame_{:06}.png` images numbered continuously across
//! its videos, plus a copy of the settings used, so unchanged folders are
//! skipped on the next run.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::media::MediaTool;
use crate::PipelineResult;

const SETTINGS_FILE: &str = "settings.json";
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "wmv", "flv"];

/// Per-folder extraction settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSettings {
    /// Frames to extract across all videos of the folder
    pub total_frames: u32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self { total_frames: 30 }
    }
}

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| VIDEO_EXTENSIONS.iter().any(|v| e.eq_ignore_ascii_case(v)))
}

/// `frame_000042.png`
pub fn frame_file_name(number: u64) -> String {
    format!("frame_{:06}.png", number)
}

fn is_frame_file(name: &str) -> bool {
    name.starts_with("frame_") && name.ends_with(".png")
}

/// Evenly spaced frame indices
///
/// The count is clamped to the frames available; one frame or fewer picks
/// only the first frame.
pub fn frame_indices(video_frames: u64, wanted: u64) -> Vec<u64> {
    let n = wanted.min(video_frames);
    if n <= 1 {
        return vec![0];
    }
    (0..n).map(|i| i * video_frames / n).collect()
}

/// Split `total` frames over videos by their share of the total duration
///
/// Every video gets at least one frame. When no duration is known the total
/// is split evenly.
pub fn allocate_frames(total: u32, durations: &[f64]) -> Vec<u32> {
    let total_duration: f64 = durations.iter().sum();
    durations
        .iter()
        .map(|&duration| {
            let frames = if total_duration > 0.0 {
                (f64::from(total) * (duration / total_duration)).floor() as u32
            } else {
                total / durations.len().max(1) as u32
            };
            frames.max(1)
        })
        .collect()
}

fn write_settings(path: &Path, settings: &VideoSettings) -> PipelineResult<()> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    settings.serialize(&mut serializer)?;
    fs::write(path, out)?;
    Ok(())
}

fn read_settings(path: &Path) -> Option<VideoSettings> {
    let text = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(settings) => Some(settings),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Unreadable settings file");
            None
        }
    }
}

/// Settings of an input folder, creating the file with `defaults` if absent
/// or unreadable
pub fn load_or_create_settings(folder: &Path, defaults: VideoSettings) -> PipelineResult<VideoSettings> {
    let path = folder.join(SETTINGS_FILE);
    if let Some(settings) = read_settings(&path) {
        tracing::debug!(path = %path.display(), "Loaded folder settings");
        return Ok(settings);
    }
    write_settings(&path, &defaults)?;
    tracing::info!(path = %path.display(), "Created default settings file");
    Ok(defaults)
}

/// Whether an output folder needs (re)extraction
///
/// Up to date means: it exists, holds at least one frame image, and its
/// recorded settings equal `settings`.
pub fn should_process(output: &Path, settings: &VideoSettings) -> bool {
    let Ok(entries) = fs::read_dir(output) else {
        return true;
    };
    let has_frames = entries
        .filter_map(Result::ok)
        .any(|e| e.file_name().to_str().is_some_and(is_frame_file));
    if !has_frames {
        return true;
    }
    read_settings(&output.join(SETTINGS_FILE)).as_ref() != Some(settings)
}

fn sorted_entries(dir: &Path, want_dirs: bool) -> PipelineResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if (want_dirs && file_type.is_dir()) || (!want_dirs && file_type.is_file()) {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Move videos lying directly in `input` into `<input>/<stem>/`
///
/// A video whose destination already exists is left in place. Returns the
/// number of videos moved.
pub fn organize_videos(input: &Path) -> PipelineResult<usize> {
    let mut moved = 0;
    for video in sorted_entries(input, false)?.into_iter().filter(|p| is_video_file(p)) {
        let (Some(stem), Some(name)) = (video.file_stem(), video.file_name()) else {
            continue;
        };
        let folder = input.join(stem);
        fs::create_dir_all(&folder)?;

        let destination = folder.join(name);
        if destination.exists() {
            tracing::warn!(video = %video.display(), "Already organized, leaving in place");
            continue;
        }
        fs::rename(&video, &destination)?;
        tracing::info!(video = %video.display(), folder = %folder.display(), "Moved video into its folder");
        moved += 1;
    }
    Ok(moved)
}

/// Remove output subfolders without a matching input subfolder
pub fn clean_orphans(input: &Path, output: &Path) -> PipelineResult<Vec<PathBuf>> {
    if !output.is_dir() {
        return Ok(Vec::new());
    }
    let inputs: HashSet<_> = if input.is_dir() {
        sorted_entries(input, true)?
            .into_iter()
            .filter_map(|p| p.file_name().map(|n| n.to_os_string()))
            .collect()
    } else {
        HashSet::new()
    };

    let mut removed = Vec::new();
    for folder in sorted_entries(output, true)? {
        let orphaned = folder.file_name().is_some_and(|n| !inputs.contains(n));
        if orphaned {
            tracing::info!(folder = %folder.display(), "Removing orphaned output folder");
            fs::remove_dir_all(&folder)?;
            removed.push(folder);
        }
    }
    Ok(removed)
}

/// Result for one input subfolder
#[derive(Debug, Clone, PartialEq)]
pub struct FolderOutcome {
    pub name: String,
    pub settings: VideoSettings,
    /// Up to date from an earlier run
    pub skipped: bool,
    pub videos: usize,
    pub frames_written: u64,
}

/// Result of a full extraction run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionSummary {
    pub organized: usize,
    pub removed: Vec<PathBuf>,
    pub folders: Vec<FolderOutcome>,
}

impl ExtractionSummary {
    pub fn frames_written(&self) -> u64 {
        self.folders.iter().map(|f| f.frames_written).sum()
    }
}

/// Extracts frames from every input subfolder
pub struct FrameExtractor<'a, M: MediaTool + ?Sized> {
    tool: &'a M,
    defaults: VideoSettings,
    clean: bool,
}

impl<'a, M: MediaTool + ?Sized> FrameExtractor<'a, M> {
    pub fn new(tool: &'a M) -> Self {
        Self {
            tool,
            defaults: VideoSettings::default(),
            clean: false,
        }
    }

    /// Settings written for folders that have none
    pub fn with_defaults(mut self, defaults: VideoSettings) -> Self {
        self.defaults = defaults;
        self
    }

    /// Remove orphaned output folders before extracting
    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    pub fn run(&self, input: &Path, output: &Path) -> PipelineResult<ExtractionSummary> {
        if !input.is_dir() {
            return Err(scenepipe_core::Error::DirectoryNotFound(input.to_path_buf()).into());
        }

        let mut summary = ExtractionSummary::default();
        if self.clean {
            summary.removed = clean_orphans(input, output)?;
        }
        summary.organized = organize_videos(input)?;
        fs::create_dir_all(output)?;

        for folder in sorted_entries(input, true)? {
            let Some(name) = folder.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let outcome = self.process_folder(&name, &folder, &output.join(&name))?;
            summary.folders.push(outcome);
        }

        tracing::info!(
            folders = summary.folders.len(),
            frames = summary.frames_written(),
            "Frame extraction finished"
        );
        Ok(summary)
    }

    fn process_folder(&self, name: &str, input: &Path, output: &Path) -> PipelineResult<FolderOutcome> {
        let settings = load_or_create_settings(input, self.defaults)?;
        let mut outcome = FolderOutcome {
            name: name.to_string(),
            settings,
            skipped: false,
            videos: 0,
            frames_written: 0,
        };

        if !should_process(output, &settings) {
            tracing::info!(folder = %name, "Output up to date, skipping");
            outcome.skipped = true;
            return Ok(outcome);
        }

        if output.is_dir() {
            for file in sorted_entries(output, false)? {
                fs::remove_file(file)?;
            }
        } else {
            fs::create_dir_all(output)?;
        }

        let videos: Vec<PathBuf> = sorted_entries(input, false)?
            .into_iter()
            .filter(|p| is_video_file(p))
            .collect();
        outcome.videos = videos.len();
        if videos.is_empty() {
            tracing::warn!(folder = %name, "No videos found");
            return Ok(outcome);
        }

        let infos = videos
            .iter()
            .map(|v| self.tool.probe(v))
            .collect::<PipelineResult<Vec<_>>>()?;
        let durations: Vec<f64> = infos.iter().map(|i| i.duration()).collect();
        let allocation = allocate_frames(settings.total_frames, &durations);

        let mut next = 0u64;
        for ((video, info), wanted) in videos.iter().zip(&infos).zip(allocation) {
            let mut extracted = 0;
            for index in frame_indices(info.frame_count, u64::from(wanted)) {
                let target = output.join(frame_file_name(next));
                match self.tool.extract_frame(video, index, &target) {
                    Ok(()) => {
                        next += 1;
                        extracted += 1;
                    }
                    Err(e) => {
                        tracing::warn!(video = %video.display(), index, error = %e, "Frame not extracted");
                    }
                }
            }
            tracing::info!(
                video = %video.display(),
                extracted,
                allocated = wanted,
                duration = info.duration(),
                source_frames = info.frame_count,
                "Extracted frames"
            );
        }

        write_settings(&output.join(SETTINGS_FILE), &settings)?;
        outcome.frames_written = next;
        Ok(outcome)
    }
}
