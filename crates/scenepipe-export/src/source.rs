//! Capability interface to the authoring host
//!
//! The exporter never talks to a live host directly. Everything it needs is
//! behind [`SceneSource`], so a recorded snapshot or a test double can stand
//! in for the real application.

use std::path::PathBuf;

use glam::{Mat4, Vec3};
use scenepipe_core::{FrameRange, Result};
use scenepipe_format::NodeKind;

/// Scene-wide settings
#[derive(Debug, Clone, PartialEq)]
pub struct SceneInfo {
    /// Path of the authoring file the scene was loaded from
    pub source_path: PathBuf,
    /// Playback rate in frames per second
    pub framerate: f64,
    /// Inclusive animation range
    pub frame_range: FrameRange,
}

/// One object of the host scene graph
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub name: String,
    pub kind: NodeKind,
    /// Name of the parent object, if any
    pub parent: Option<String>,
    /// Parent-relative transform
    pub matrix_local: Mat4,
    /// Scene-space transform
    pub matrix_world: Mat4,
}

/// Membership of a vertex in one vertex group
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupWeight {
    /// Index into the object's vertex group list
    pub group: usize,
    pub weight: f32,
}

/// An evaluated vertex
#[derive(Debug, Clone, PartialEq)]
pub struct SourceVertex {
    pub position: Vec3,
    /// Groups in host iteration order
    pub groups: Vec<GroupWeight>,
}

impl SourceVertex {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            groups: Vec::new(),
        }
    }
}

/// A bone with its armature-space rest matrix
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBone {
    pub name: String,
    pub parent: Option<String>,
    pub matrix_local: Mat4,
}

/// Outcome of baking an object's modifier stack
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifierBake {
    /// Render-enabled modifiers folded into the base mesh
    pub applied: Vec<String>,
    /// Modifiers dropped because they are hidden at render time
    pub discarded: Vec<String>,
}

/// Everything the exporter reads from (or changes in) the host
///
/// Methods that move host state take `&mut self`; the frame cursor set by
/// [`SceneSource::set_frame`] is global to the host, so a source must never
/// be shared between two concurrent evaluations.
pub trait SceneSource {
    /// Scene-wide settings
    fn scene_info(&self) -> SceneInfo;

    /// All objects in traversal order
    fn objects(&self) -> Vec<SceneObject>;

    /// Move the host's time cursor
    fn set_frame(&mut self, frame: i32) -> Result<()>;

    /// Current position of the time cursor
    fn current_frame(&self) -> i32;

    /// Bake render-enabled modifiers into the base mesh and drop the rest
    fn apply_render_modifiers(&mut self, object: &str) -> Result<ModifierBake>;

    /// Faces of the evaluated mesh as vertex index lists
    fn evaluate_topology(&mut self, object: &str) -> Result<Vec<Vec<u32>>>;

    /// Vertices of the mesh evaluated at the current frame
    fn evaluate_vertices(&mut self, object: &str) -> Result<Vec<SourceVertex>>;

    /// Vertex group names of an object, in group index order
    fn vertex_groups(&self, object: &str) -> Vec<String>;

    /// Bones of an armature object in host order
    fn bones(&self, armature: &str) -> Result<Vec<SourceBone>>;

    /// Armature-space pose matrix of a bone at the current frame
    ///
    /// `None` when the host has no pose channel for the bone.
    fn pose_matrix(&mut self, armature: &str, bone: &str) -> Result<Option<Mat4>>;
}

/// Nearest ancestor of `object` whose type is ARMATURE
pub fn owning_armature<'a>(objects: &'a [SceneObject], object: &SceneObject) -> Option<&'a SceneObject> {
    let mut current = object.parent.as_deref();
    for _ in 0..objects.len() {
        let parent = objects.iter().find(|o| Some(o.name.as_str()) == current)?;
        if parent.kind == NodeKind::Armature {
            return Some(parent);
        }
        current = parent.parent.as_deref();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(name: &str, kind: NodeKind, parent: Option<&str>) -> SceneObject {
        SceneObject {
            name: name.into(),
            kind,
            parent: parent.map(Into::into),
            matrix_local: Mat4::IDENTITY,
            matrix_world: Mat4::IDENTITY,
        }
    }

    #[test]
    fn test_owning_armature() {
        let objects = vec![
            object("Rig", NodeKind::Armature, None),
            object("Offset", NodeKind::Empty, Some("Rig")),
            object("Body", NodeKind::Mesh, Some("Offset")),
            object("Prop", NodeKind::Mesh, None),
        ];

        let owner = owning_armature(&objects, &objects[2]).map(|o| o.name.as_str());
        assert_eq!(owner, Some("Rig"));
        assert!(owning_armature(&objects, &objects[3]).is_none());
    }
}
