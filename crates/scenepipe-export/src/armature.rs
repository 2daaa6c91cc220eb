//! Armature extractor: rest pose plus one pose record per frame

use glam::Mat4;
use scenepipe_core::{decompose, AxisConvention, FrameRange, Result, ResultExt};
use scenepipe_format::{ArmatureData, BoneRecord, FrameRecord, Transform};

use crate::source::{SceneObject, SceneSource};

/// Decompose a bone matrix, applying the bone correction and axis remap
pub fn bone_transform(matrix: &Mat4, axis: AxisConvention) -> Transform {
    let d = decompose(matrix);
    if d.degenerate {
        tracing::trace!("Degenerate bone matrix, falling back to identity rotation");
    }
    Transform {
        position: axis.position(d.translation),
        rotation: axis.bone_rotation(d.rotation),
        scale: axis.scale(d.scale),
    }
}

/// Extract bones and animation of an armature object
///
/// Frames are visited in ascending order and the host cursor is left on
/// `frames.end`. A bone without a pose channel repeats its rest matrix.
/// With `bake_world` the armature's world matrix is premultiplied into both
/// rest and pose matrices.
pub fn extract_armature<S: SceneSource + ?Sized>(
    source: &mut S,
    object: &SceneObject,
    frames: FrameRange,
    axis: AxisConvention,
    bake_world: bool,
) -> Result<ArmatureData> {
    let name = object.name.as_str();
    let source_bones = source
        .bones(name)
        .with_context(|| format!("reading bones of {}", name))?;

    let space = if bake_world {
        object.matrix_world
    } else {
        Mat4::IDENTITY
    };

    let bones: Vec<BoneRecord> = source_bones
        .iter()
        .map(|bone| BoneRecord {
            name: bone.name.clone(),
            parent: bone.parent.clone(),
            rest: bone_transform(&(space * bone.matrix_local), axis),
        })
        .collect();

    let mut animation = Vec::with_capacity(frames.len());
    for frame in frames.frames() {
        source.set_frame(frame)?;

        let mut transforms = Vec::with_capacity(source_bones.len());
        for bone in &source_bones {
            let matrix = match source.pose_matrix(name, &bone.name)? {
                Some(pose) => pose,
                None => bone.matrix_local,
            };
            transforms.push(bone_transform(&(space * matrix), axis));
        }

        animation.push(FrameRecord {
            frame,
            bones: transforms,
        });
    }

    tracing::debug!(
        armature = %name,
        bones = bones.len(),
        frames = animation.len(),
        "Extracted armature"
    );

    Ok(ArmatureData { bones, animation })
}
