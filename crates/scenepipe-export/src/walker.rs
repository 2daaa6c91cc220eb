//! Scene walker: one node record per host object

use glam::Mat4;
use scenepipe_core::{decompose, AxisConvention};
use scenepipe_format::{NodeRecord, Transform};

use crate::source::{SceneObject, SceneSource};

/// Decompose and remap an object's local matrix
pub fn node_transform(matrix: &Mat4, axis: AxisConvention) -> Transform {
    let d = decompose(matrix);
    Transform {
        position: axis.position(d.translation),
        rotation: axis.node_rotation(d.rotation),
        scale: axis.scale(d.scale),
    }
}

/// Record for a single object, without mesh or armature payload
pub fn object_record(object: &SceneObject, axis: AxisConvention) -> NodeRecord {
    let mut record = NodeRecord::new(object.name.clone(), object.kind.clone());
    record.parent = object.parent.clone();
    record.set_transform(node_transform(&object.matrix_local, axis));
    record
}

/// Records for every object in traversal order
pub fn walk_scene<S: SceneSource + ?Sized>(source: &S, axis: AxisConvention) -> Vec<NodeRecord> {
    source
        .objects()
        .iter()
        .map(|object| {
            tracing::debug!(name = %object.name, kind = %object.kind, "Walking object");
            object_record(object, axis)
        })
        .collect()
}
