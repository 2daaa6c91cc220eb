// scenepipe-format/src/validate.rs
//! Structural checks on a scene document
//!
//! The format carries no schema, so consumers rely on these invariants
//! holding. Validation collects every violation instead of stopping at the
//! first one.

use std::collections::HashMap;

use thiserror::Error;

use crate::document::{ArmatureData, MeshData, NodeRecord, SceneDocument};
use crate::{FormatError, FormatResult};

/// A single invariant violation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    #[error("node '{node}': parent '{parent}' does not name another node")]
    DanglingParent { node: String, parent: String },

    #[error("node '{node}': parent '{parent}' is ambiguous ({count} nodes share that name)")]
    AmbiguousParent { node: String, parent: String, count: usize },

    #[error("node '{node}': bone '{bone}' has parent '{parent}' which is not a unique bone")]
    BadBoneParent { node: String, bone: String, parent: String },

    #[error("node '{node}': polygon {polygon} references vertex {index} of {vertex_count}")]
    PolygonIndexOutOfRange {
        node: String,
        polygon: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("node '{node}': {found} bone indices for {expected} vertices")]
    BoneIndexCount { node: String, expected: usize, found: usize },

    #[error("node '{node}': vertex {vertex} has bone index {index} (bones: {bone_count:?})")]
    BoneIndexOutOfRange {
        node: String,
        vertex: usize,
        index: i32,
        bone_count: Option<usize>,
    },

    #[error("node '{node}': frame {frame} does not follow frame {previous}")]
    FrameGap { node: String, previous: i32, frame: i32 },

    #[error("node '{node}': frame {frame} has {found} bone transforms, expected {expected}")]
    FrameBoneCount {
        node: String,
        frame: i32,
        expected: usize,
        found: usize,
    },

    #[error("node '{node}': non-finite value in {field}")]
    NonFinite { node: String, field: String },
}

/// Result of validating a document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Turn a failing report into an error naming the first issue
    pub fn into_result(self) -> FormatResult<()> {
        match self.issues.first() {
            None => Ok(()),
            Some(first) => Err(FormatError::Validation {
                count: self.issues.len(),
                first: first.to_string(),
            }),
        }
    }

    fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }
}

/// Check every invariant of `document`
pub fn validate(document: &SceneDocument) -> ValidationReport {
    let mut report = ValidationReport::default();

    let mut name_counts: HashMap<&str, usize> = HashMap::new();
    for node in &document.nodes {
        *name_counts.entry(node.name.as_str()).or_insert(0) += 1;
    }

    for node in &document.nodes {
        check_parent(node, &name_counts, &mut report);
        check_finite(node, &mut report);

        if let Some(armature) = &node.armature {
            check_armature(&node.name, armature, &mut report);
        }

        if let Some(mesh) = &node.mesh {
            let bone_count = document
                .owning_armature(node)
                .and_then(|owner| owner.armature.as_ref())
                .map(ArmatureData::bone_count);
            check_mesh(&node.name, mesh, bone_count, &mut report);
        }
    }

    if !report.is_valid() {
        tracing::debug!(issues = report.len(), "Document failed validation");
    }

    report
}

fn check_parent(node: &NodeRecord, name_counts: &HashMap<&str, usize>, report: &mut ValidationReport) {
    let Some(parent) = &node.parent else {
        return;
    };

    let mut count = name_counts.get(parent.as_str()).copied().unwrap_or(0);
    if parent == &node.name {
        count -= 1;
    }

    match count {
        1 => {}
        0 => report.push(ValidationIssue::DanglingParent {
            node: node.name.clone(),
            parent: parent.clone(),
        }),
        count => report.push(ValidationIssue::AmbiguousParent {
            node: node.name.clone(),
            parent: parent.clone(),
            count,
        }),
    }
}

fn check_finite(node: &NodeRecord, report: &mut ValidationReport) {
    if !node.transform().is_finite() {
        report.push(ValidationIssue::NonFinite {
            node: node.name.clone(),
            field: "transform".into(),
        });
    }

    if let Some(mesh) = &node.mesh {
        if mesh.vertices.iter().flatten().any(|v| !v.is_finite()) {
            report.push(ValidationIssue::NonFinite {
                node: node.name.clone(),
                field: "vertices".into(),
            });
        }
    }

    if let Some(armature) = &node.armature {
        for bone in &armature.bones {
            if !bone.rest.is_finite() {
                report.push(ValidationIssue::NonFinite {
                    node: node.name.clone(),
                    field: format!("bone '{}' rest", bone.name),
                });
            }
        }
        for frame in &armature.animation {
            if frame.bones.iter().any(|t| !t.is_finite()) {
                report.push(ValidationIssue::NonFinite {
                    node: node.name.clone(),
                    field: format!("frame {}", frame.frame),
                });
            }
        }
    }
}

fn check_mesh(node: &str, mesh: &MeshData, bone_count: Option<usize>, report: &mut ValidationReport) {
    let vertex_count = mesh.vertex_count();

    for (polygon, indices) in mesh.polygons.iter().enumerate() {
        for &index in indices {
            if index as usize >= vertex_count {
                report.push(ValidationIssue::PolygonIndexOutOfRange {
                    node: node.to_string(),
                    polygon,
                    index,
                    vertex_count,
                });
            }
        }
    }

    if mesh.bone_indices.len() != vertex_count {
        report.push(ValidationIssue::BoneIndexCount {
            node: node.to_string(),
            expected: vertex_count,
            found: mesh.bone_indices.len(),
        });
    }

    for (vertex, &index) in mesh.bone_indices.iter().enumerate() {
        let out_of_range = match bone_count {
            Some(count) => index < -1 || index >= count as i32,
            None => index < -1,
        };
        if out_of_range {
            report.push(ValidationIssue::BoneIndexOutOfRange {
                node: node.to_string(),
                vertex,
                index,
                bone_count,
            });
        }
    }
}

fn check_armature(node: &str, armature: &ArmatureData, report: &mut ValidationReport) {
    let mut bone_names: HashMap<&str, usize> = HashMap::new();
    for bone in &armature.bones {
        *bone_names.entry(bone.name.as_str()).or_insert(0) += 1;
    }

    for bone in &armature.bones {
        if let Some(parent) = &bone.parent {
            let mut count = bone_names.get(parent.as_str()).copied().unwrap_or(0);
            if parent == &bone.name {
                count -= 1;
            }
            if count != 1 {
                report.push(ValidationIssue::BadBoneParent {
                    node: node.to_string(),
                    bone: bone.name.clone(),
                    parent: parent.clone(),
                });
            }
        }
    }

    let expected = armature.bone_count();
    let mut previous: Option<i32> = None;
    for frame in &armature.animation {
        if let Some(prev) = previous {
            if prev.checked_add(1) != Some(frame.frame) {
                report.push(ValidationIssue::FrameGap {
                    node: node.to_string(),
                    previous: prev,
                    frame: frame.frame,
                });
            }
        }
        previous = Some(frame.frame);

        if frame.bones.len() != expected {
            report.push(ValidationIssue::FrameBoneCount {
                node: node.to_string(),
                frame: frame.frame,
                expected,
                found: frame.bones.len(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{BoneRecord, FrameRecord, NodeKind, Transform};
    use crate::vertex_buffer::VertexBuffer;

    fn triangle(bone_indices: Vec<i32>) -> MeshData {
        MeshData {
            polygons: vec![vec![0, 1, 2]],
            vertices: VertexBuffer::from_positions(&[[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
            bone_indices,
        }
    }

    fn bone(name: &str, parent: Option<&str>) -> BoneRecord {
        BoneRecord {
            name: name.into(),
            parent: parent.map(Into::into),
            rest: Transform::default(),
        }
    }

    #[test]
    fn test_clean_document_is_valid() {
        let mut doc = SceneDocument::new(24.0);
        let mut mesh = NodeRecord::new("Tri", NodeKind::Mesh);
        mesh.mesh = Some(triangle(vec![-1, -1, -1]));
        doc.nodes.push(mesh);

        let report = validate(&doc);
        assert!(report.is_valid(), "{:?}", report.issues());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_dangling_and_ambiguous_parents() {
        let mut doc = SceneDocument::new(24.0);
        let mut orphan = NodeRecord::new("Orphan", NodeKind::Empty);
        orphan.parent = Some("Missing".into());
        doc.nodes.push(orphan);
        doc.nodes.push(NodeRecord::new("Twin", NodeKind::Empty));
        doc.nodes.push(NodeRecord::new("Twin", NodeKind::Mesh));
        let mut child = NodeRecord::new("Child", NodeKind::Empty);
        child.parent = Some("Twin".into());
        doc.nodes.push(child);

        let report = validate(&doc);
        assert_eq!(report.len(), 2);
        assert!(matches!(report.issues()[0], ValidationIssue::DanglingParent { .. }));
        assert!(matches!(
            report.issues()[1],
            ValidationIssue::AmbiguousParent { count: 2, .. }
        ));
    }

    #[test]
    fn test_self_parent_is_dangling() {
        let mut doc = SceneDocument::new(24.0);
        let mut node = NodeRecord::new("Loop", NodeKind::Empty);
        node.parent = Some("Loop".into());
        doc.nodes.push(node);

        assert!(matches!(
            validate(&doc).issues()[0],
            ValidationIssue::DanglingParent { .. }
        ));
    }

    #[test]
    fn test_polygon_and_bone_index_ranges() {
        let mut doc = SceneDocument::new(24.0);
        let mut node = NodeRecord::new("Bad", NodeKind::Mesh);
        let mut mesh = triangle(vec![0, -2]);
        mesh.polygons.push(vec![0, 3, 1]);
        node.mesh = Some(mesh);
        doc.nodes.push(node);

        let issues = validate(&doc).issues().to_vec();
        assert!(issues.iter().any(|i| matches!(i, ValidationIssue::PolygonIndexOutOfRange { index: 3, .. })));
        assert!(issues.iter().any(|i| matches!(i, ValidationIssue::BoneIndexCount { expected: 3, found: 2, .. })));
        assert!(issues.iter().any(|i| matches!(i, ValidationIssue::BoneIndexOutOfRange { index: -2, .. })));
    }

    #[test]
    fn test_bone_index_checked_against_owning_armature() {
        let mut doc = SceneDocument::new(24.0);
        let mut rig = NodeRecord::new("Rig", NodeKind::Armature);
        rig.armature = Some(ArmatureData {
            bones: vec![bone("root", None)],
            animation: vec![],
        });
        doc.nodes.push(rig);

        let mut body = NodeRecord::new("Body", NodeKind::Mesh);
        body.parent = Some("Rig".into());
        body.mesh = Some(triangle(vec![0, 1, -1]));
        doc.nodes.push(body);

        let report = validate(&doc);
        assert_eq!(report.len(), 1);
        assert!(matches!(
            report.issues()[0],
            ValidationIssue::BoneIndexOutOfRange { index: 1, bone_count: Some(1), .. }
        ));
    }

    #[test]
    fn test_animation_contiguity_and_bone_count() {
        let mut doc = SceneDocument::new(24.0);
        let mut rig = NodeRecord::new("Rig", NodeKind::Armature);
        rig.armature = Some(ArmatureData {
            bones: vec![bone("root", None), bone("child", Some("root")), bone("stray", Some("nope"))],
            animation: vec![
                FrameRecord { frame: 1, bones: vec![Transform::default(); 3] },
                FrameRecord { frame: 3, bones: vec![Transform::default(); 3] },
                FrameRecord { frame: 4, bones: vec![Transform::default(); 2] },
            ],
        });
        doc.nodes.push(rig);

        let issues = validate(&doc).issues().to_vec();
        assert_eq!(issues.len(), 3);
        assert!(issues.iter().any(|i| matches!(i, ValidationIssue::BadBoneParent { .. })));
        assert!(issues.iter().any(|i| matches!(i, ValidationIssue::FrameGap { previous: 1, frame: 3, .. })));
        assert!(issues.iter().any(|i| matches!(i, ValidationIssue::FrameBoneCount { frame: 4, .. })));
    }

    #[test]
    fn test_non_finite_transform() {
        let mut doc = SceneDocument::new(24.0);
        let mut node = NodeRecord::new("Nan", NodeKind::Empty);
        node.position[0] = f32::NAN;
        doc.nodes.push(node);

        let report = validate(&doc);
        assert!(matches!(report.issues()[0], ValidationIssue::NonFinite { .. }));
        assert!(matches!(
            report.into_result(),
            Err(FormatError::Validation { count: 1, .. })
        ));
    }
}
