//! Batch video compression
//!
//! Walks a directory tree for `.mov` captures and re-encodes each one next
//! to itself as `<stem>_compressed.mp4`.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use scenepipe_core::logging::log_progress;
use walkdir::WalkDir;

use crate::config::CompressSettings;
use crate::media::MediaTool;
use crate::PipelineResult;

const COMPRESSED_SUFFIX: &str = "_compressed";

/// Encoder settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressOptions {
    pub codec: String,
    pub crf: u32,
    /// Rate cap in Mbit/s; the buffer is twice the cap
    pub max_bitrate_mbps: Option<u32>,
}

impl Default for CompressOptions {
    fn default() -> Self {
        CompressSettings::default().into()
    }
}

impl From<CompressSettings> for CompressOptions {
    fn from(settings: CompressSettings) -> Self {
        Self {
            codec: settings.codec,
            crf: settings.crf,
            max_bitrate_mbps: settings.max_bitrate_mbps,
        }
    }
}

impl CompressOptions {
    /// ffmpeg arguments encoding `input` into `output`
    pub fn ffmpeg_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-i".into(),
            input.as_os_str().to_os_string(),
            "-c:v".into(),
            self.codec.clone().into(),
            "-crf".into(),
            self.crf.to_string().into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-movflags".into(),
            "+faststart".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "128k".into(),
        ];
        if let Some(rate) = self.max_bitrate_mbps {
            args.push("-maxrate".into());
            args.push(format!("{}M", rate).into());
            args.push("-bufsize".into());
            args.push(format!("{}M", u64::from(rate) * 2).into());
        }
        args.push("-y".into());
        args.push(output.as_os_str().to_os_string());
        args
    }
}

/// `<stem>_compressed.mp4` beside `input`
pub fn compressed_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
    let mut name = stem;
    name.push(COMPRESSED_SUFFIX);
    name.push(".mp4");
    input.with_file_name(name)
}

fn is_mov(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mov"))
}

fn is_compressed_output(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.ends_with(COMPRESSED_SUFFIX))
}

/// All `.mov` files under `root`, sorted, excluding earlier outputs
pub fn find_mov_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_mov(path) && !is_compressed_output(path))
        .collect();
    files.sort();
    files
}

/// One successfully compressed file
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedFile {
    pub input: PathBuf,
    pub output: PathBuf,
    pub original_size: u64,
    pub compressed_size: u64,
}

impl CompressedFile {
    /// Size reduction in percent of the original
    pub fn reduction_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (self.original_size as f64 - self.compressed_size as f64) / self.original_size as f64 * 100.0
    }
}

/// Outcome of a batch run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompressSummary {
    pub found: usize,
    pub compressed: Vec<CompressedFile>,
    pub failed: Vec<PathBuf>,
}

impl CompressSummary {
    pub fn succeeded(&self) -> usize {
        self.compressed.len()
    }
}

/// Compress every `.mov` file under `root`
///
/// A failed encode, or an output that cannot be read back, is logged and
/// counted; the batch continues.
pub fn compress_tree<M: MediaTool + ?Sized>(
    tool: &M,
    root: &Path,
    options: &CompressOptions,
) -> PipelineResult<CompressSummary> {
    if !root.is_dir() {
        return Err(scenepipe_core::Error::DirectoryNotFound(root.to_path_buf()).into());
    }

    let files = find_mov_files(root);
    tracing::info!(root = %root.display(), files = files.len(), codec = %options.codec, crf = options.crf, "Compressing videos");

    let mut summary = CompressSummary {
        found: files.len(),
        ..CompressSummary::default()
    };

    for (done, input) in files.into_iter().enumerate() {
        log_progress(done, summary.found, 10);
        let output = compressed_output_path(&input);
        tracing::info!(input = %input.display(), "Processing");

        if let Err(e) = tool.transcode(&input, &output, options) {
            tracing::warn!(input = %input.display(), error = %e, "Compression failed");
            summary.failed.push(input);
            continue;
        }

        let sizes = fs::metadata(&input).and_then(|i| fs::metadata(&output).map(|o| (i.len(), o.len())));
        let (original_size, compressed_size) = match sizes {
            Ok(sizes) => sizes,
            Err(e) => {
                tracing::warn!(output = %output.display(), error = %e, "Encoder reported success but output is unreadable");
                summary.failed.push(input);
                continue;
            }
        };
        let file = CompressedFile {
            input,
            output,
            original_size,
            compressed_size,
        };
        tracing::info!(
            output = %file.output.display(),
            original_mb = original_size as f64 / (1024.0 * 1024.0),
            compressed_mb = compressed_size as f64 / (1024.0 * 1024.0),
            reduction = %format!("{:.2}%", file.reduction_percent()),
            "Compressed"
        );
        summary.compressed.push(file);
    }

    tracing::info!(
        found = summary.found,
        succeeded = summary.succeeded(),
        failed = summary.failed.len(),
        "Compression summary"
    );
    Ok(summary)
}
