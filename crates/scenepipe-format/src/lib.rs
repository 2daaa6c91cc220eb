//! scenepipe-format
//!
//! The scene interchange document written by the exporter and read by
//! downstream renderers.
//!
//! | Part | Contents |
//! |------|----------|
//! | [`document`] | `SceneDocument`, nodes, mesh and armature payloads |
//! | [`vertex_buffer`] | packed little-endian positions, hex at the JSON boundary |
//! | [`validate`] | invariant checks over a whole document |
//!
//! # Example
//!
//! ```rust,ignore
//! use scenepipe_format::{read_document, validate};
//!
//! let document = read_document("level.blend.json")?;
//! let report = validate(&document);
//! println!("{} nodes, {} issues", document.nodes.len(), report.len());
//! ```

pub mod document;
pub mod validate;
pub mod vertex_buffer;

use thiserror::Error;

pub use document::{
    read_document, ArmatureData, BoneRecord, FrameRecord, MeshData, NodeKind, NodeRecord,
    SceneDocument, Transform,
};
pub use validate::{validate, ValidationIssue, ValidationReport};
pub use vertex_buffer::{VertexBuffer, FLOATS_PER_VERTEX, HEX_CHARS_PER_VERTEX, VERTEX_STRIDE};

/// Format revision written by this crate
///
/// Revision 1 wrote euler rotations and plain vertex arrays, revision 2
/// introduced the packed hex buffer; neither carried a version field.
pub const FORMAT_VERSION: u32 = 3;

/// Errors reading or writing scene documents
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid hex in vertex buffer: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Vertex buffer length {len} is not a multiple of {stride}")]
    BufferLength { len: usize, stride: usize },

    #[error("Unsupported format version {found} (newest known: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Document failed validation with {count} issue(s), first: {first}")]
    Validation { count: usize, first: String },

    #[error("Invalid document: {0}")]
    Invalid(String),
}

/// Result type alias for format operations
pub type FormatResult<T> = Result<T, FormatError>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
