//! Batch photogrammetry runs
//!
//! Runs `meshroom_batch` once per image subfolder with a shared pipeline
//! template, keeping output, cache and a saved project file per subfolder.

use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

use crate::config::{PhotogrammetrySettings, ToolPaths};
use crate::process::{display_command, ProcessRunner};
use crate::{PipelineError, PipelineResult};

/// Batch run configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PhotogrammetryJob {
    pub meshroom_batch: PathBuf,
    pub template: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub cache: PathBuf,
    pub projects: PathBuf,
    pub verbosity: String,
}

impl PhotogrammetryJob {
    pub fn from_config(tools: &ToolPaths, settings: &PhotogrammetrySettings) -> Self {
        Self {
            meshroom_batch: tools.meshroom_batch.clone(),
            template: settings.template.clone(),
            input: settings.input.clone(),
            output: settings.output.clone(),
            cache: settings.cache.clone(),
            projects: settings.projects.clone(),
            verbosity: settings.verbosity.clone(),
        }
    }

    /// Absolute paths used for one subfolder
    pub fn subfolder_paths(&self, name: &str) -> PipelineResult<SubfolderPaths> {
        Ok(SubfolderPaths {
            input: std::path::absolute(self.input.join(name))?,
            output: std::path::absolute(self.output.join(name))?,
            cache: std::path::absolute(self.cache.join(name))?,
            project_file: std::path::absolute(self.projects.join(format!("{}_project.mg", name)))?,
        })
    }

    /// Command line for one subfolder
    pub fn arguments(&self, paths: &SubfolderPaths) -> PipelineResult<Vec<OsString>> {
        Ok(vec![
            "-i".into(),
            paths.input.clone().into_os_string(),
            "-p".into(),
            std::path::absolute(&self.template)?.into_os_string(),
            "-o".into(),
            paths.output.clone().into_os_string(),
            "--cache".into(),
            paths.cache.clone().into_os_string(),
            "--save".into(),
            paths.project_file.clone().into_os_string(),
            "-v".into(),
            self.verbosity.clone().into(),
        ])
    }

    /// Check executable, template and input before any work
    pub fn check(&self) -> PipelineResult<()> {
        if !self.meshroom_batch.is_file() {
            return Err(PipelineError::ToolNotFound(self.meshroom_batch.clone()));
        }
        if !self.input.is_dir() {
            return Err(scenepipe_core::Error::DirectoryNotFound(self.input.clone()).into());
        }
        if !self.template.is_file() {
            return Err(PipelineError::Config(format!(
                "pipeline template not found: {}",
                self.template.display()
            )));
        }
        if let Some(parent) = self.output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tracing::warn!(parent = %parent.display(), "Parent of output directory does not exist");
            }
        }
        Ok(())
    }

    /// Run every subfolder of the input directory
    ///
    /// A subfolder that fails is logged and counted. A missing executable is
    /// fatal, whether found before the run or while running.
    pub fn run<R: ProcessRunner + ?Sized>(&self, runner: &R) -> PipelineResult<PhotogrammetrySummary> {
        self.check()?;

        let mut folders: Vec<String> = fs::read_dir(&self.input)?
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        folders.sort();

        tracing::info!(input = %self.input.display(), folders = folders.len(), "Starting photogrammetry batch");

        let mut summary = PhotogrammetrySummary::default();
        for name in folders {
            match self.run_subfolder(runner, &name) {
                Ok(()) => summary.succeeded.push(name),
                Err(e @ PipelineError::ToolNotFound(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(folder = %name, error = %e, "Photogrammetry failed");
                    summary.failed.push((name, e.to_string()));
                }
            }
        }

        tracing::info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "Photogrammetry batch finished"
        );
        Ok(summary)
    }

    fn run_subfolder<R: ProcessRunner + ?Sized>(&self, runner: &R, name: &str) -> PipelineResult<()> {
        let paths = self.subfolder_paths(name)?;
        fs::create_dir_all(&paths.output)?;
        fs::create_dir_all(&paths.cache)?;
        if let Some(projects) = paths.project_file.parent() {
            fs::create_dir_all(projects)?;
        }

        let program = std::path::absolute(&self.meshroom_batch)?;
        let args = self.arguments(&paths)?;
        tracing::info!(folder = %name, command = %display_command(&program, &args), "Running reconstruction");

        let output = runner.run(&program, &args)?.check("meshroom_batch")?;
        if !output.stderr.is_empty() {
            tracing::debug!(folder = %name, stderr = %output.stderr, "meshroom_batch stderr");
        }
        Ok(())
    }
}

/// Absolute per-subfolder locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubfolderPaths {
    pub input: PathBuf,
    pub output: PathBuf,
    pub cache: PathBuf,
    pub project_file: PathBuf,
}

/// Outcome of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhotogrammetrySummary {
    pub succeeded: Vec<String>,
    /// Subfolder name and error message
    pub failed: Vec<(String, String)>,
}
