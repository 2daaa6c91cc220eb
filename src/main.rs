//! scenepipe CLI
//!
//! Scene export, document inspection and the capture-to-mesh pipeline tools.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};

use scenepipe_core::logging::{init_with_config, instrument, TracingConfig};
use scenepipe_core::{mat4_from_cols, AxisConvention};
use scenepipe_export::{ExportOptions, SceneExporter, SnapshotScene};
use scenepipe_format::{read_document, validate, SceneDocument};
use scenepipe_pipeline::{
    compress_tree, CameraBroadcaster, CompressOptions, FfmpegTool, FrameExtractor,
    PhotogrammetryJob, PipelineConfig, SystemRunner, VideoSettings,
};

/// scenepipe - scene export and capture pipeline tools
#[derive(Parser)]
#[command(name = "scenepipe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format for summaries
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Pipeline configuration file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Export a scene snapshot to an interchange document
    Export(ExportArgs),

    /// Check a scene document for structural problems
    Validate(DocumentArgs),

    /// Show the contents of a scene document
    Info(DocumentArgs),

    /// Compress every .mov capture under a directory
    Compress(CompressArgs),

    /// Extract still frames from video folders
    Frames(FramesArgs),

    /// Run batch photogrammetry over image folders
    Photogrammetry(PhotogrammetryArgs),

    /// Replay recorded camera views to connected viewers
    Stream(StreamArgs),
}

#[derive(Args)]
struct ExportArgs {
    /// Scene snapshot (JSON)
    snapshot: PathBuf,

    /// Output document path (default: <source file name>.json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write compact JSON instead of four-space indentation
    #[arg(long)]
    compact: bool,

    /// Keep host axes instead of converting to left-handed Y-up
    #[arg(long)]
    native_axes: bool,

    /// Premultiply each armature's world matrix into its bones
    #[arg(long)]
    bake_armature_world: bool,
}

#[derive(Args)]
struct DocumentArgs {
    /// Scene document (JSON)
    document: PathBuf,
}

#[derive(Args)]
struct CompressArgs {
    /// Directory searched recursively for .mov files
    dir: PathBuf,

    /// Video codec
    #[arg(long)]
    codec: Option<String>,

    /// Constant rate factor (0-51)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=51))]
    crf: Option<u32>,

    /// Rate cap in Mbit/s
    #[arg(long)]
    max_bitrate: Option<u32>,
}

#[derive(Args)]
struct FramesArgs {
    /// Folder of videos, one subfolder per subject
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Folder receiving one frame folder per subject
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Frames per subject when its folder has no settings.json
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    frames: Option<u32>,

    /// Remove output folders with no matching input folder
    #[arg(long)]
    clean: bool,
}

#[derive(Args)]
struct PhotogrammetryArgs {
    /// Folder of image subfolders
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Folder receiving one mesh folder per subfolder
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pipeline template (.mg)
    #[arg(long)]
    template: Option<PathBuf>,

    /// meshroom_batch executable
    #[arg(long)]
    meshroom_batch: Option<PathBuf>,

    /// Cache folder
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Folder for saved project files
    #[arg(long)]
    projects: Option<PathBuf>,

    /// meshroom_batch log level
    #[arg(long)]
    verbosity: Option<String>,
}

#[derive(Args)]
struct StreamArgs {
    /// JSON lines file, one 16-float column-major view matrix per line
    poses: PathBuf,

    /// Listen address
    #[arg(long)]
    addr: Option<String>,

    /// Repeat the recording until interrupted
    #[arg(long = "loop")]
    repeat: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Export(args) => cmd_export(args, cli.format),
        Commands::Validate(args) => cmd_validate(args, cli.format),
        Commands::Info(args) => cmd_info(args, cli.format),
        Commands::Compress(args) => cmd_compress(args, &config, cli.format),
        Commands::Frames(args) => cmd_frames(args, &config, cli.format),
        Commands::Photogrammetry(args) => cmd_photogrammetry(args, &config, cli.format),
        Commands::Stream(args) => cmd_stream(args, &config),
    }
}

fn setup_logging(verbosity: u8) {
    init_with_config(TracingConfig::for_verbosity(verbosity));
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_export(args: ExportArgs, format: OutputFormat) -> Result<()> {
    let mut scene = SnapshotScene::load(&args.snapshot)
        .with_context(|| format!("Failed to load snapshot {}", args.snapshot.display()))?;

    let options = ExportOptions {
        axis: if args.native_axes {
            AxisConvention::Native
        } else {
            AxisConvention::YUpLeftHanded
        },
        pretty: !args.compact,
        bake_armature_world: args.bake_armature_world,
        output_path: args.output,
    };

    let exporter = SceneExporter::with_options(options);
    let report = instrument("export", || exporter.export(&mut scene)).context("Export failed")?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "output": report.output_path,
            "nodes": report.node_count,
            "meshes": report.mesh_count,
            "armatures": report.armature_count,
            "frames": report.frame_count,
            "final_frame": report.final_frame,
            "bytes": report.bytes_written,
        }))?,
        OutputFormat::Text => {
            println!("Exported: {}", report.output_path.display());
            println!("============================================");
            println!("  Nodes:        {:>12}", report.node_count);
            println!("  Meshes:       {:>12}", report.mesh_count);
            println!("  Armatures:    {:>12}", report.armature_count);
            println!("  Frames:       {:>12}", report.frame_count);
            println!("  Final frame:  {:>12}", report.final_frame);
            println!("  Size:         {:>12}", format_size(report.bytes_written));
        }
    }

    Ok(())
}

fn open_document(path: &Path) -> Result<SceneDocument> {
    read_document(path).with_context(|| format!("Failed to read document {}", path.display()))
}

fn cmd_validate(args: DocumentArgs, format: OutputFormat) -> Result<()> {
    let document = open_document(&args.document)?;
    let report = validate(&document);

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "document": args.document,
            "valid": report.is_valid(),
            "issues": report.issues().iter().map(ToString::to_string).collect::<Vec<_>>(),
        }))?,
        OutputFormat::Text => {
            if report.is_valid() {
                println!("{}: OK ({} nodes)", args.document.display(), document.nodes.len());
            } else {
                println!("{}: {} issue(s)", args.document.display(), report.len());
                for issue in report.issues() {
                    println!("  - {}", issue);
                }
            }
        }
    }

    report
        .into_result()
        .with_context(|| format!("{} is not a valid scene document", args.document.display()))
}

fn cmd_info(args: DocumentArgs, format: OutputFormat) -> Result<()> {
    let document = open_document(&args.document)?;
    let size = fs::metadata(&args.document)?.len();

    match format {
        OutputFormat::Json => {
            let nodes: Vec<_> = document
                .nodes
                .iter()
                .map(|node| {
                    serde_json::json!({
                        "name": node.name,
                        "type": node.kind.as_str(),
                        "parent": node.parent,
                        "vertices": node.mesh.as_ref().map(|m| m.vertex_count()),
                        "polygons": node.mesh.as_ref().map(|m| m.face_count()),
                        "bones": node.armature.as_ref().map(|a| a.bone_count()),
                        "frames": node.armature.as_ref().map(|a| a.frame_count()),
                    })
                })
                .collect();
            print_json(&serde_json::json!({
                "document": args.document,
                "size": size,
                "format_version": document.format_version,
                "framerate": document.framerate,
                "meshes": document.mesh_count(),
                "armatures": document.armature_count(),
                "nodes": nodes,
            }))?;
        }
        OutputFormat::Text => {
            println!("Scene Document: {}", args.document.display());
            println!("============================================");
            match document.format_version {
                Some(version) => println!("  Format version: {:>10}", version),
                None => println!("  Format version: {:>10}", "legacy"),
            }
            println!("  Framerate:      {:>10}", document.framerate);
            println!("  Nodes:          {:>10}", document.nodes.len());
            println!("  Meshes:         {:>10}", document.mesh_count());
            println!("  Armatures:      {:>10}", document.armature_count());
            println!("  Size:           {:>10}", format_size(size));

            println!("\nNodes:");
            println!("-------------------------------------------");
            for node in &document.nodes {
                let mut detail = String::new();
                if let Some(mesh) = &node.mesh {
                    detail = format!("{} verts, {} faces", mesh.vertex_count(), mesh.face_count());
                    if mesh.is_skinned() {
                        detail.push_str(", skinned");
                    }
                }
                if let Some(armature) = &node.armature {
                    detail = format!("{} bones, {} frames", armature.bone_count(), armature.frame_count());
                }
                println!(
                    "  {:<24} {:<10} {:<20} {}",
                    node.name,
                    node.kind.as_str(),
                    node.parent.as_deref().unwrap_or("-"),
                    detail
                );
            }
        }
    }

    Ok(())
}

fn cmd_compress(args: CompressArgs, config: &PipelineConfig, format: OutputFormat) -> Result<()> {
    let mut settings = config.compress.clone();
    if let Some(codec) = args.codec {
        settings.codec = codec;
    }
    if let Some(crf) = args.crf {
        settings.crf = crf;
    }
    if args.max_bitrate.is_some() {
        settings.max_bitrate_mbps = args.max_bitrate;
    }
    let options = CompressOptions::from(settings);

    let tool = FfmpegTool::from_paths(&config.tools);
    let summary = compress_tree(&tool, &args.dir, &options)
        .with_context(|| format!("Failed to compress {}", args.dir.display()))?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "found": summary.found,
            "succeeded": summary.succeeded(),
            "failed": summary.failed,
            "compressed": summary.compressed.iter().map(|c| serde_json::json!({
                "input": c.input,
                "output": c.output,
                "original_size": c.original_size,
                "compressed_size": c.compressed_size,
                "reduction_percent": c.reduction_percent(),
            })).collect::<Vec<_>>(),
        }))?,
        OutputFormat::Text => {
            println!("Compression Summary: {}", args.dir.display());
            println!("============================================");
            println!("  Found:        {:>8}", summary.found);
            println!("  Compressed:   {:>8}", summary.succeeded());
            println!("  Failed:       {:>8}", summary.failed.len());
            for file in &summary.compressed {
                println!(
                    "  {} -> {} ({} -> {}, {:.2}% smaller)",
                    file.input.display(),
                    file.output.display(),
                    format_size(file.original_size),
                    format_size(file.compressed_size),
                    file.reduction_percent()
                );
            }
            for path in &summary.failed {
                println!("  FAILED {}", path.display());
            }
        }
    }

    Ok(())
}

fn cmd_frames(args: FramesArgs, config: &PipelineConfig, format: OutputFormat) -> Result<()> {
    let settings = &config.frames;
    let input = args.input.unwrap_or_else(|| settings.input.clone());
    let output = args.output.unwrap_or_else(|| settings.output.clone());
    let defaults = VideoSettings {
        total_frames: args.frames.unwrap_or(settings.total_frames),
    };

    let tool = FfmpegTool::from_paths(&config.tools);
    let summary = FrameExtractor::new(&tool)
        .with_defaults(defaults)
        .with_clean(args.clean || settings.clean)
        .run(&input, &output)
        .with_context(|| format!("Frame extraction from {} failed", input.display()))?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "organized": summary.organized,
            "removed": summary.removed,
            "frames_written": summary.frames_written(),
            "folders": summary.folders.iter().map(|f| serde_json::json!({
                "name": f.name,
                "total_frames": f.settings.total_frames,
                "skipped": f.skipped,
                "videos": f.videos,
                "frames_written": f.frames_written,
            })).collect::<Vec<_>>(),
        }))?,
        OutputFormat::Text => {
            println!("Frame Extraction: {} -> {}", input.display(), output.display());
            println!("============================================");
            println!("  Videos organized:   {:>8}", summary.organized);
            println!("  Orphans removed:    {:>8}", summary.removed.len());
            println!("  Frames written:     {:>8}", summary.frames_written());
            for folder in &summary.folders {
                let status = if folder.skipped { "skipped" } else { "extracted" };
                println!(
                    "  {:<24} {:<10} {:>3} videos {:>6} frames",
                    folder.name, status, folder.videos, folder.frames_written
                );
            }
        }
    }

    Ok(())
}

fn cmd_photogrammetry(args: PhotogrammetryArgs, config: &PipelineConfig, format: OutputFormat) -> Result<()> {
    let mut job = PhotogrammetryJob::from_config(&config.tools, &config.photogrammetry);
    if let Some(input) = args.input {
        job.input = input;
    }
    if let Some(output) = args.output {
        job.output = output;
    }
    if let Some(template) = args.template {
        job.template = template;
    }
    if let Some(exe) = args.meshroom_batch {
        job.meshroom_batch = exe;
    }
    if let Some(cache) = args.cache {
        job.cache = cache;
    }
    if let Some(projects) = args.projects {
        job.projects = projects;
    }
    if let Some(verbosity) = args.verbosity {
        job.verbosity = verbosity;
    }

    let summary = job.run(&SystemRunner).context("Photogrammetry batch failed")?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "succeeded": summary.succeeded,
            "failed": summary.failed.iter().map(|(name, error)| serde_json::json!({
                "folder": name,
                "error": error,
            })).collect::<Vec<_>>(),
        }))?,
        OutputFormat::Text => {
            println!("Photogrammetry: {}", job.input.display());
            println!("============================================");
            println!("  Succeeded:    {:>8}", summary.succeeded.len());
            println!("  Failed:       {:>8}", summary.failed.len());
            for (name, error) in &summary.failed {
                println!("  {:<24} {}", name, error);
            }
        }
    }

    Ok(())
}

fn cmd_stream(args: StreamArgs, config: &PipelineConfig) -> Result<()> {
    let text = fs::read_to_string(&args.poses)
        .with_context(|| format!("Failed to read {}", args.poses.display()))?;

    let mut views = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let cols: [f32; 16] = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: expected 16 numbers", args.poses.display(), number + 1))?;
        views.push(mat4_from_cols(&cols));
    }
    if views.is_empty() {
        bail!("No camera views in {}", args.poses.display());
    }

    let addr = args.addr.unwrap_or_else(|| config.camera_stream.addr.clone());
    let tick = config.camera_stream.tick();
    let broadcaster = CameraBroadcaster::bind(addr.as_str())
        .with_context(|| format!("Failed to listen on {}", addr))?;
    let handle = broadcaster.spawn(tick)?;

    info!(addr = %handle.local_addr(), views = views.len(), "Replaying camera views");
    println!("Streaming {} views on {}", views.len(), handle.local_addr());

    loop {
        for view in &views {
            handle.set_view(*view);
            thread::sleep(tick);
        }
        if !args.repeat {
            break;
        }
        debug!("Restarting camera replay");
    }

    // one more tick so the last view goes out
    thread::sleep(tick * 2);
    handle.stop();
    Ok(())
}

/// Human-readable byte count in binary units
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit - 1])
    }
}
