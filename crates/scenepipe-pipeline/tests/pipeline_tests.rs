//! Integration tests for the pipeline tools
//!
//! These tests cover:
//! - Batch compression over a directory tree with a fake encoder
//! - Frame extraction: folder organization, allocation, skip and clean logic
//! - Photogrammetry batches with a scripted process runner

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use scenepipe_pipeline::frames::frame_file_name;
use scenepipe_pipeline::{
    compress_tree, CompressOptions, FrameExtractor, MediaTool, PhotogrammetryJob, PipelineError,
    PipelineResult, ProcessOutput, ProcessRunner, VideoInfo, VideoSettings,
};

/// Media tool over fake videos: probe data by file name, frames written as
/// text files naming their source
#[derive(Default)]
struct FakeMedia {
    videos: HashMap<String, VideoInfo>,
    fail_transcode: Vec<String>,
    /// Encodes that exit cleanly without writing anything
    no_output: Vec<String>,
    extracted: Mutex<Vec<(String, u64)>>,
}

impl FakeMedia {
    fn with_video(mut self, name: &str, frame_count: u64, fps: f64) -> Self {
        self.videos.insert(name.into(), VideoInfo { frame_count, fps });
        self
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

impl MediaTool for FakeMedia {
    fn probe(&self, video: &Path) -> PipelineResult<VideoInfo> {
        Ok(self.videos.get(&file_name(video)).copied().unwrap_or(VideoInfo {
            frame_count: 10,
            fps: 0.0,
        }))
    }

    fn extract_frame(&self, video: &Path, index: u64, output: &Path) -> PipelineResult<()> {
        self.extracted.lock().push((file_name(video), index));
        fs::write(output, format!("{}#{}", file_name(video), index))?;
        Ok(())
    }

    fn transcode(&self, input: &Path, output: &Path, _options: &CompressOptions) -> PipelineResult<()> {
        if self.fail_transcode.contains(&file_name(input)) {
            return Err(PipelineError::ToolFailed {
                tool: "ffmpeg".into(),
                status: Some(1),
                stderr: "Invalid data found when processing input".into(),
            });
        }
        if self.no_output.contains(&file_name(input)) {
            return Ok(());
        }
        let size = fs::metadata(input)?.len() / 4;
        fs::write(output, vec![0u8; size as usize])?;
        Ok(())
    }
}

mod compression {
    use super::*;

    #[test]
    fn test_compress_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("day1/cam")).unwrap();
        fs::write(root.join("day1/a.mov"), vec![1u8; 400]).unwrap();
        fs::write(root.join("day1/cam/B.MOV"), vec![1u8; 800]).unwrap();
        fs::write(root.join("day1/cam/broken.mov"), vec![1u8; 10]).unwrap();
        fs::write(root.join("day1/old_compressed.mov"), vec![1u8; 10]).unwrap();
        fs::write(root.join("day1/notes.txt"), b"not a video").unwrap();

        let media = FakeMedia {
            fail_transcode: vec!["broken.mov".into()],
            ..FakeMedia::default()
        };
        let summary = compress_tree(&media, root, &CompressOptions::default()).unwrap();

        assert_eq!(summary.found, 3);
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed, vec![root.join("day1/cam/broken.mov")]);

        let outputs: Vec<PathBuf> = summary.compressed.iter().map(|c| c.output.clone()).collect();
        assert!(outputs.contains(&root.join("day1/a_compressed.mp4")));
        assert!(outputs.contains(&root.join("day1/cam/B_compressed.mp4")));
        assert!(summary.compressed.iter().all(|c| c.reduction_percent() == 75.0));
    }

    #[test]
    fn test_missing_output_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.mov"), vec![1u8; 400]).unwrap();
        fs::write(root.join("b.mov"), vec![1u8; 400]).unwrap();
        fs::write(root.join("c.mov"), vec![1u8; 400]).unwrap();

        let media = FakeMedia {
            no_output: vec!["b.mov".into()],
            ..FakeMedia::default()
        };
        let summary = compress_tree(&media, root, &CompressOptions::default()).unwrap();

        assert_eq!(summary.found, 3);
        assert_eq!(summary.failed, vec![root.join("b.mov")]);
        assert_eq!(summary.succeeded(), 2);
        assert!(root.join("c_compressed.mp4").is_file());
    }

    #[test]
    fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = compress_tree(&FakeMedia::default(), &dir.path().join("nope"), &CompressOptions::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Core(_)));
    }
}

mod frame_extraction {
    use super::*;

    fn frames_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("frame_"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_extract_organizes_and_numbers_continuously() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw");
        let output = dir.path().join("frames");
        fs::create_dir_all(input.join("statue")).unwrap();
        fs::write(input.join("statue/front.mp4"), b"v").unwrap();
        fs::write(input.join("statue/back.mp4"), b"v").unwrap();
        fs::write(input.join("vase.mov"), b"v").unwrap();

        let media = FakeMedia::default()
            .with_video("back.mp4", 300, 30.0)
            .with_video("front.mp4", 100, 10.0)
            .with_video("vase.mov", 50, 25.0);
        let summary = FrameExtractor::new(&media)
            .with_defaults(VideoSettings { total_frames: 6 })
            .run(&input, &output)
            .unwrap();

        assert_eq!(summary.organized, 1);
        assert!(input.join("vase/vase.mov").is_file());
        assert!(!input.join("vase.mov").exists());
        assert!(input.join("statue/settings.json").is_file());

        // both statue videos last 10 s: three frames each, numbered 0..6
        let statue = &summary.folders[0];
        assert_eq!(statue.name, "statue");
        assert_eq!(statue.frames_written, 6);
        assert_eq!(frames_in(&output.join("statue")), (0..6).map(frame_file_name).collect::<Vec<_>>());
        assert_eq!(
            fs::read_to_string(output.join("statue").join(frame_file_name(3))).unwrap(),
            "front.mp4#0"
        );

        let vase = &summary.folders[1];
        assert_eq!(vase.frames_written, 6);
        let extracted = media.extracted.lock();
        let vase_indices: Vec<u64> = extracted
            .iter()
            .filter(|(v, _)| v == "vase.mov")
            .map(|(_, i)| *i)
            .collect();
        assert_eq!(vase_indices, vec![0, 8, 16, 25, 33, 41]);
    }

    #[test]
    fn test_unchanged_folder_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw");
        let output = dir.path().join("frames");
        fs::create_dir_all(input.join("rock")).unwrap();
        fs::write(input.join("rock/rock.mp4"), b"v").unwrap();

        let media = FakeMedia::default().with_video("rock.mp4", 20, 10.0);
        let extractor = FrameExtractor::new(&media).with_defaults(VideoSettings { total_frames: 4 });

        let first = extractor.run(&input, &output).unwrap();
        assert!(!first.folders[0].skipped);
        assert_eq!(first.frames_written(), 4);

        let second = extractor.run(&input, &output).unwrap();
        assert!(second.folders[0].skipped);
        assert_eq!(second.frames_written(), 0);

        // changed settings force a clean re-run
        fs::write(input.join("rock/settings.json"), r#"{ "total_frames": 2 }"#).unwrap();
        let third = extractor.run(&input, &output).unwrap();
        assert!(!third.folders[0].skipped);
        assert_eq!(frames_in(&output.join("rock")).len(), 2);
    }

    #[test]
    fn test_clean_removes_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw");
        let output = dir.path().join("frames");
        fs::create_dir_all(input.join("kept")).unwrap();
        fs::create_dir_all(output.join("kept")).unwrap();
        fs::create_dir_all(output.join("gone")).unwrap();

        let media = FakeMedia::default();
        let summary = FrameExtractor::new(&media)
            .with_clean(true)
            .run(&input, &output)
            .unwrap();

        assert_eq!(summary.removed, vec![output.join("gone")]);
        assert!(output.join("kept").is_dir());
        assert_eq!(summary.folders[0].videos, 0);
    }
}

mod photogrammetry {
    use super::*;

    struct ScriptedRunner {
        failing: Vec<String>,
        calls: Mutex<Vec<Vec<OsString>>>,
    }

    impl ProcessRunner for ScriptedRunner {
        fn run(&self, _program: &Path, args: &[OsString]) -> PipelineResult<ProcessOutput> {
            self.calls.lock().push(args.to_vec());
            let input = args[1].to_string_lossy().into_owned();
            let fails = self.failing.iter().any(|f| input.ends_with(f.as_str()));
            Ok(ProcessOutput {
                status: Some(if fails { 3 } else { 0 }),
                stdout: String::new(),
                stderr: if fails { "no features found".into() } else { String::new() },
            })
        }
    }

    fn job(root: &Path) -> PhotogrammetryJob {
        fs::write(root.join("meshroom_batch"), b"").unwrap();
        fs::write(root.join("template.mg"), b"{}").unwrap();
        fs::create_dir_all(root.join("images/alpha")).unwrap();
        fs::create_dir_all(root.join("images/beta")).unwrap();
        PhotogrammetryJob {
            meshroom_batch: root.join("meshroom_batch"),
            template: root.join("template.mg"),
            input: root.join("images"),
            output: root.join("meshes"),
            cache: root.join("cache"),
            projects: root.join("projects"),
            verbosity: "info".into(),
        }
    }

    #[test]
    fn test_batch_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path());
        let runner = ScriptedRunner {
            failing: vec!["beta".into()],
            calls: Mutex::new(Vec::new()),
        };

        let summary = job.run(&runner).unwrap();
        assert_eq!(summary.succeeded, vec!["alpha".to_string()]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "beta");
        assert!(summary.failed[0].1.contains("no features found"));

        assert!(dir.path().join("meshes/alpha").is_dir());
        assert!(dir.path().join("cache/beta").is_dir());

        let calls = runner.calls.lock();
        let first: Vec<String> = calls[0].iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(first[0], "-i");
        assert_eq!(first[2], "-p");
        assert_eq!(first[8], "--save");
        assert!(first[9].ends_with("alpha_project.mg"));
        assert_eq!(&first[10..], &["-v".to_string(), "info".to_string()]);
        assert!(Path::new(&first[1]).is_absolute());
    }

    #[test]
    fn test_missing_executable_or_template_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner {
            failing: Vec::new(),
            calls: Mutex::new(Vec::new()),
        };

        let mut missing_exe = job(dir.path());
        missing_exe.meshroom_batch = dir.path().join("absent.exe");
        assert!(matches!(missing_exe.run(&runner), Err(PipelineError::ToolNotFound(_))));

        let mut missing_template = job(dir.path());
        missing_template.template = dir.path().join("absent.mg");
        assert!(matches!(missing_template.run(&runner), Err(PipelineError::Config(_))));

        assert!(runner.calls.lock().is_empty());
    }
}
