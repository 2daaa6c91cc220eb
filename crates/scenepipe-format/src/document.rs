// scenepipe-format/src/document.rs
//! Scene interchange document
//!
//! One JSON document per exported scene: a framerate, and one node per scene
//! object in traversal order. Mesh and armature payloads hang off their
//! nodes and are omitted when absent. Field order in the structs below is the
//! key order in the written JSON.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::vertex_buffer::VertexBuffer;
use crate::{FormatError, FormatResult, FORMAT_VERSION};

/// Root of an exported scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    /// Explicit format revision; absent in documents from older exporters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_version: Option<u32>,
    /// Scene playback rate in frames per second
    #[serde(serialize_with = "serialize_framerate")]
    pub framerate: f64,
    /// One record per scene object, in traversal order
    pub nodes: Vec<NodeRecord>,
}

/// Whole rates are written as integers (`24`), fractional ones as floats
fn serialize_framerate<S: serde::Serializer>(rate: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if rate.fract() == 0.0 && rate.abs() <= f64::from(u32::MAX) {
        serializer.serialize_i64(*rate as i64)
    } else {
        serializer.serialize_f64(*rate)
    }
}

impl SceneDocument {
    /// Create an empty document tagged with the current format version
    pub fn new(framerate: f64) -> Self {
        Self {
            format_version: Some(FORMAT_VERSION),
            framerate,
            nodes: Vec::new(),
        }
    }

    /// Find the first node with `name`
    pub fn find_node(&self, name: &str) -> Option<&NodeRecord> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Number of nodes carrying mesh data
    pub fn mesh_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.mesh.is_some()).count()
    }

    /// Number of nodes carrying armature data
    pub fn armature_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.armature.is_some()).count()
    }

    /// Nearest ancestor of `node` whose type is ARMATURE
    ///
    /// Parent links are followed by name; a cycle or dangling link ends the
    /// search.
    pub fn owning_armature(&self, node: &NodeRecord) -> Option<&NodeRecord> {
        let mut current = node.parent.as_deref();
        for _ in 0..self.nodes.len() {
            let parent = self.find_node(current?)?;
            if parent.kind == NodeKind::Armature {
                return Some(parent);
            }
            current = parent.parent.as_deref();
        }
        None
    }

    /// Whether this document declares a version this reader understands
    pub fn is_versioned(&self) -> bool {
        self.format_version.is_some()
    }

    /// Parse a document from a JSON string
    pub fn from_json_str(json: &str) -> FormatResult<Self> {
        let document: SceneDocument = serde_json::from_str(json)?;
        document.check_version()?;
        Ok(document)
    }

    /// Parse a document from a reader
    pub fn from_reader<R: Read>(reader: R) -> FormatResult<Self> {
        let document: SceneDocument = serde_json::from_reader(reader)?;
        document.check_version()?;
        Ok(document)
    }

    /// Serialize to a JSON string
    ///
    /// Pretty output uses four-space indentation.
    pub fn to_json_string(&self, pretty: bool) -> FormatResult<String> {
        let mut out = Vec::new();
        self.to_writer(&mut out, pretty)?;
        String::from_utf8(out).map_err(|e| FormatError::Invalid(e.to_string()))
    }

    /// Serialize to a writer
    pub fn to_writer<W: Write>(&self, writer: W, pretty: bool) -> FormatResult<()> {
        if pretty {
            let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
            let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
            self.serialize(&mut serializer)?;
        } else {
            serde_json::to_writer(writer, self)?;
        }
        Ok(())
    }

    fn check_version(&self) -> FormatResult<()> {
        match self.format_version {
            Some(found) if found > FORMAT_VERSION => Err(FormatError::UnsupportedVersion {
                found,
                supported: FORMAT_VERSION,
            }),
            _ => Ok(()),
        }
    }
}

/// Read a document from disk
pub fn read_document(path: impl AsRef<Path>) -> FormatResult<SceneDocument> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let document = SceneDocument::from_reader(BufReader::new(file))?;
    tracing::debug!(path = %path.display(), nodes = document.nodes.len(), "Read scene document");
    Ok(document)
}

/// Host object type tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Mesh,
    Armature,
    Empty,
    Camera,
    Light,
    Curve,
    /// Any other host type, kept verbatim
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Mesh => "MESH",
            NodeKind::Armature => "ARMATURE",
            NodeKind::Empty => "EMPTY",
            NodeKind::Camera => "CAMERA",
            NodeKind::Light => "LIGHT",
            NodeKind::Curve => "CURVE",
            NodeKind::Other(tag) => tag,
        }
    }
}

impl From<String> for NodeKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "MESH" => NodeKind::Mesh,
            "ARMATURE" => NodeKind::Armature,
            "EMPTY" => NodeKind::Empty,
            "CAMERA" => NodeKind::Camera,
            "LIGHT" => NodeKind::Light,
            "CURVE" => NodeKind::Curve,
            _ => NodeKind::Other(tag),
        }
    }
}

impl From<&str> for NodeKind {
    fn from(tag: &str) -> Self {
        NodeKind::from(tag.to_string())
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One exported scene object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Name of the parent node, if any
    pub parent: Option<String>,
    /// Local translation, `w` is padding
    pub position: [f32; 4],
    /// Local rotation quaternion (x, y, z, w)
    pub rotation: [f32; 4],
    /// Local scale, `w` is padding
    pub scale: [f32; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<MeshData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub armature: Option<ArmatureData>,
}

impl NodeRecord {
    /// Create a record with an identity transform
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        let identity = Transform::default();
        Self {
            name: name.into(),
            kind,
            parent: None,
            position: identity.position,
            rotation: identity.rotation,
            scale: identity.scale,
            mesh: None,
            armature: None,
        }
    }

    /// The local transform as a single value
    pub fn transform(&self) -> Transform {
        Transform {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.position = transform.position;
        self.rotation = transform.rotation;
        self.scale = transform.scale;
    }
}

/// Evaluated mesh of a MESH node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    /// Faces as ordered vertex indices, source winding preserved
    pub polygons: Vec<Vec<u32>>,
    /// Packed positions, hex-encoded in JSON
    pub vertices: VertexBuffer,
    /// Dominant bone per vertex, `-1` when unweighted
    #[serde(default)]
    pub bone_indices: Vec<i32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.polygons.len()
    }

    /// Whether any vertex is assigned to a bone
    pub fn is_skinned(&self) -> bool {
        self.bone_indices.iter().any(|&b| b >= 0)
    }
}

/// Skeleton and baked animation of an ARMATURE node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmatureData {
    pub bones: Vec<BoneRecord>,
    #[serde(default)]
    pub animation: Vec<FrameRecord>,
}

impl ArmatureData {
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn frame_count(&self) -> usize {
        self.animation.len()
    }

    /// Index of the bone called `name`
    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    /// Pose of `bone` at `frame`, if recorded
    pub fn pose(&self, frame: i32, bone: usize) -> Option<&Transform> {
        self.animation
            .iter()
            .find(|f| f.frame == frame)
            .and_then(|f| f.bones.get(bone))
    }
}

/// One bone with its bind-time transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneRecord {
    pub name: String,
    /// Name of the parent bone, if any
    pub parent: Option<String>,
    /// Armature-space rest transform
    pub rest: Transform,
}

/// Bone transforms at one frame, in armature bone order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame: i32,
    pub bones: Vec<Transform>,
}

/// Position, rotation and scale, each padded to four components
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: [f32; 4],
    pub rotation: [f32; 4],
    pub scale: [f32; 4],
}

impl Transform {
    /// Whether every component is finite
    pub fn is_finite(&self) -> bool {
        self.position
            .iter()
            .chain(self.rotation.iter())
            .chain(self.scale.iter())
            .all(|v| v.is_finite())
    }
}

impl Default for Transform {
    fn default() -> Self {
        use scenepipe_core::{POSITION_W, SCALE_W};
        Self {
            position: [0.0, 0.0, 0.0, POSITION_W],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0, 1.0, 1.0, SCALE_W],
        }
    }
}
