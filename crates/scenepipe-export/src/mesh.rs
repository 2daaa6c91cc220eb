//! Mesh extractor
//!
//! Bakes render modifiers, evaluates topology and vertex positions, and
//! assigns every vertex its dominant bone.

use scenepipe_core::{AxisConvention, Result, ResultExt};
use scenepipe_format::{MeshData, VertexBuffer};

use crate::source::{GroupWeight, SceneObject, SceneSource};

/// How vertex group indices translate to bone indices
#[derive(Debug, Clone, PartialEq)]
pub enum GroupMapping {
    /// Group index is used as the bone index (no owning armature)
    Raw,
    /// Group index -> bone index of the owning armature, `None` for groups
    /// that do not name a bone
    ByName(Vec<Option<i32>>),
}

impl GroupMapping {
    /// Map group names onto an armature's bone order
    pub fn by_name(groups: &[String], bones: &[String]) -> Self {
        let mapping = groups
            .iter()
            .map(|group| bones.iter().position(|b| b == group).map(|i| i as i32))
            .collect();
        GroupMapping::ByName(mapping)
    }

    pub fn bone_for(&self, group: usize) -> Option<i32> {
        match self {
            GroupMapping::Raw => i32::try_from(group).ok(),
            GroupMapping::ByName(mapping) => mapping.get(group).copied().flatten(),
        }
    }
}

/// Bone with the strictly largest positive weight, `-1` if none
///
/// Iterates groups in host order and only replaces the current best on a
/// strictly greater weight, so the first of several equal weights wins.
pub fn dominant_bone(groups: &[GroupWeight], mapping: &GroupMapping) -> i32 {
    let mut best = -1;
    let mut max_weight = 0.0f32;

    for membership in groups {
        let Some(bone) = mapping.bone_for(membership.group) else {
            continue;
        };
        if membership.weight > max_weight {
            max_weight = membership.weight;
            best = bone;
        }
    }

    best
}

/// Extract the evaluated mesh of `object`
///
/// Modifiers are baked once here; the caller must not call this twice for
/// the same object. Positions are evaluated at `frame_start`, which moves
/// the host's frame cursor.
pub fn extract_mesh<S: SceneSource + ?Sized>(
    source: &mut S,
    object: &SceneObject,
    owner: Option<&SceneObject>,
    frame_start: i32,
    axis: AxisConvention,
) -> Result<MeshData> {
    let name = object.name.as_str();

    let bake = source
        .apply_render_modifiers(name)
        .with_context(|| format!("baking modifiers of {}", name))?;
    if !bake.applied.is_empty() || !bake.discarded.is_empty() {
        tracing::debug!(
            object = %name,
            applied = ?bake.applied,
            discarded = ?bake.discarded,
            "Baked modifier stack"
        );
    }

    let polygons = source
        .evaluate_topology(name)
        .with_context(|| format!("evaluating topology of {}", name))?;

    source.set_frame(frame_start)?;
    let vertices = source
        .evaluate_vertices(name)
        .with_context(|| format!("evaluating vertices of {}", name))?;

    let buffer: VertexBuffer = vertices.iter().map(|v| axis.point(v.position)).collect();

    let mapping = match owner {
        Some(armature) => {
            let bones: Vec<String> = source
                .bones(&armature.name)?
                .into_iter()
                .map(|b| b.name)
                .collect();
            GroupMapping::by_name(&source.vertex_groups(name), &bones)
        }
        None => GroupMapping::Raw,
    };

    let bone_indices: Vec<i32> = vertices
        .iter()
        .map(|v| dominant_bone(&v.groups, &mapping))
        .collect();

    tracing::debug!(
        object = %name,
        vertices = buffer.len(),
        polygons = polygons.len(),
        skinned = bone_indices.iter().any(|&b| b >= 0),
        "Extracted mesh"
    );

    Ok(MeshData {
        polygons,
        vertices: buffer,
        bone_indices,
    })
}
