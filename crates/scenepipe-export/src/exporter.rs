//! Scene exporter
//!
//! Drives a [`SceneSource`] through the walker, mesh and armature passes and
//! writes the resulting document.

use std::path::PathBuf;
use std::time::Instant;

use scenepipe_core::AxisConvention;
use scenepipe_format::{validate, NodeKind, SceneDocument};

use crate::armature::extract_armature;
use crate::mesh::extract_mesh;
use crate::source::{owning_armature, SceneSource};
use crate::walker::walk_scene;
use crate::writer::{default_output_path, write_document_atomic};
use crate::{ExportError, ExportResult};

/// Export options
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// Coordinate convention of the written document
    pub axis: AxisConvention,

    /// Pretty-print with four-space indentation
    pub pretty: bool,

    /// Premultiply each armature's world matrix into its bone transforms
    pub bake_armature_world: bool,

    /// Output path; defaults to `<source file name>.json`
    pub output_path: Option<PathBuf>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            axis: AxisConvention::YUpLeftHanded,
            pretty: true,
            bake_armature_world: false,
            output_path: None,
        }
    }
}

/// Summary of a finished export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub output_path: PathBuf,
    pub node_count: usize,
    pub mesh_count: usize,
    pub armature_count: usize,
    /// Frames sampled per armature
    pub frame_count: usize,
    /// Host frame cursor after the export
    pub final_frame: i32,
    pub bytes_written: u64,
}

/// Scene exporter
#[derive(Debug, Clone, Default)]
pub struct SceneExporter {
    options: ExportOptions,
}

impl SceneExporter {
    /// Create new exporter with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create exporter with custom options
    pub fn with_options(options: ExportOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Build the document without writing it
    ///
    /// Meshes are extracted at `frame_start` before the armature scan, so
    /// the cursor ends on `frame_end` whenever the scene has an armature.
    pub fn build_document<S: SceneSource + ?Sized>(&self, source: &mut S) -> ExportResult<SceneDocument> {
        let axis = self.options.axis;
        let info = source.scene_info();
        let objects = source.objects();

        let mut document = SceneDocument::new(info.framerate);
        document.nodes = walk_scene(&*source, axis);

        for (object, record) in objects.iter().zip(document.nodes.iter_mut()) {
            if object.kind == NodeKind::Mesh {
                let owner = owning_armature(&objects, object);
                record.mesh = Some(extract_mesh(source, object, owner, info.frame_range.start, axis)?);
            }
        }

        for (object, record) in objects.iter().zip(document.nodes.iter_mut()) {
            if object.kind == NodeKind::Armature {
                record.armature = Some(extract_armature(
                    source,
                    object,
                    info.frame_range,
                    axis,
                    self.options.bake_armature_world,
                )?);
            }
        }

        let report = validate(&document);
        for issue in report.issues() {
            tracing::warn!(%issue, "Exported document has an inconsistency");
        }

        Ok(document)
    }

    /// Export the scene and write the document
    pub fn export<S: SceneSource + ?Sized>(&self, source: &mut S) -> ExportResult<ExportReport> {
        let start = Instant::now();
        let info = source.scene_info();
        let output_path = self
            .options
            .output_path
            .clone()
            .unwrap_or_else(|| default_output_path(&info.source_path));
        if output_path.is_dir() {
            return Err(ExportError::Failed(format!(
                "output path {} is a directory",
                output_path.display()
            )));
        }

        tracing::info!(
            source = %info.source_path.display(),
            frames = %format!("{}..={}", info.frame_range.start, info.frame_range.end),
            "Exporting scene"
        );

        let document = self.build_document(source)?;
        let bytes_written = write_document_atomic(&document, &output_path, self.options.pretty)?;

        let final_frame = source.current_frame();
        tracing::info!(
            final_frame,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Export finished, host cursor left on frame {}",
            final_frame
        );

        Ok(ExportReport {
            output_path,
            node_count: document.nodes.len(),
            mesh_count: document.mesh_count(),
            armature_count: document.armature_count(),
            frame_count: info.frame_range.len(),
            final_frame,
            bytes_written,
        })
    }
}
