//! scenepipe-export
//!
//! Turns a host scene into a [`scenepipe_format::SceneDocument`] and writes
//! it atomically.
//!
//! # Example
//!
//! ```rust,ignore
//! use scenepipe_export::{SceneExporter, SnapshotScene};
//!
//! let mut scene = SnapshotScene::load("cube.snapshot.json")?;
//! let report = SceneExporter::new().export(&mut scene)?;
//! println!("wrote {} nodes to {}", report.node_count, report.output_path.display());
//! ```

pub mod armature;
pub mod exporter;
pub mod mesh;
pub mod snapshot;
pub mod source;
pub mod walker;
pub mod writer;

use thiserror::Error;

pub use armature::{bone_transform, extract_armature};
pub use exporter::{ExportOptions, ExportReport, SceneExporter};
pub use mesh::{dominant_bone, extract_mesh, GroupMapping};
pub use snapshot::{SceneSnapshot, SnapshotScene, TransformSpec};
pub use source::{
    owning_armature, GroupWeight, ModifierBake, SceneInfo, SceneObject, SceneSource, SourceBone,
    SourceVertex,
};
pub use walker::{node_transform, object_record, walk_scene};
pub use writer::{default_output_path, write_document_atomic};

/// Export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Scene source error: {0}")]
    Source(#[from] scenepipe_core::Error),

    #[error("Document error: {0}")]
    Format(#[from] scenepipe_format::FormatError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export failed: {0}")]
    Failed(String),
}

pub type ExportResult<T> = Result<T, ExportError>;
