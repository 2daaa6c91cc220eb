//! Recorded scene snapshot
//!
//! A JSON capture of a host scene (objects, evaluated meshes, bones and
//! keyed poses) that implements [`SceneSource`] offline. Animated data holds
//! its last key: the value at a frame is the newest key at or before it,
//! and the unanimated value before the first key.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use scenepipe_core::{mat4_from_cols, mat4_from_trs, Error, FrameRange, Result};
use scenepipe_format::NodeKind;

use crate::source::{
    GroupWeight, ModifierBake, SceneInfo, SceneObject, SceneSource, SourceBone, SourceVertex,
};

// ==================== File model ====================

fn default_framerate() -> f64 {
    24.0
}

fn default_frame_start() -> i32 {
    FrameRange::default().start
}

fn default_frame_end() -> i32 {
    FrameRange::default().end
}

fn default_true() -> bool {
    true
}

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

/// Root of a snapshot file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    /// Authoring file the snapshot was taken from
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default = "default_framerate")]
    pub framerate: f64,
    #[serde(default = "default_frame_start")]
    pub frame_start: i32,
    #[serde(default = "default_frame_end")]
    pub frame_end: i32,
    #[serde(default)]
    pub objects: Vec<SnapshotObject>,
}

/// Either a column-major matrix or translation, rotation and scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformSpec {
    Matrix {
        matrix: [f32; 16],
    },
    Trs {
        #[serde(default)]
        translation: [f32; 3],
        /// Quaternion as (x, y, z, w)
        #[serde(default = "identity_rotation")]
        rotation: [f32; 4],
        #[serde(default = "unit_scale")]
        scale: [f32; 3],
    },
}

impl TransformSpec {
    pub fn to_mat4(&self) -> Mat4 {
        match self {
            TransformSpec::Matrix { matrix } => mat4_from_cols(matrix),
            TransformSpec::Trs {
                translation,
                rotation,
                scale,
            } => mat4_from_trs(*translation, *rotation, *scale),
        }
    }
}

impl Default for TransformSpec {
    fn default() -> Self {
        TransformSpec::Trs {
            translation: [0.0; 3],
            rotation: identity_rotation(),
            scale: unit_scale(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotObject {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub parent: Option<String>,
    /// Parent-relative transform
    #[serde(default)]
    pub transform: TransformSpec,
    #[serde(default)]
    pub mesh: Option<SnapshotMesh>,
    #[serde(default)]
    pub armature: Option<SnapshotArmature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMesh {
    /// Evaluated base positions
    pub vertices: Vec<[f32; 3]>,
    #[serde(default)]
    pub polygons: Vec<Vec<u32>>,
    #[serde(default)]
    pub vertex_groups: Vec<String>,
    /// Per-vertex `(group index, weight)` pairs in host order; empty for an
    /// unweighted mesh
    #[serde(default)]
    pub weights: Vec<Vec<(usize, f32)>>,
    #[serde(default)]
    pub modifiers: Vec<SnapshotModifier>,
    /// Keyed positions (shape keys, deformers) by frame
    #[serde(default)]
    pub frames: BTreeMap<i32, Vec<[f32; 3]>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotModifier {
    pub name: String,
    #[serde(default = "default_true")]
    pub show_render: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotArmature {
    pub bones: Vec<SnapshotBone>,
    #[serde(default)]
    pub poses: Vec<SnapshotPose>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotBone {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// Armature-space rest transform
    #[serde(default)]
    pub rest: TransformSpec,
}

/// Armature-space bone matrices keyed at one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPose {
    pub frame: i32,
    pub bones: BTreeMap<String, TransformSpec>,
}

// ==================== Scene source ====================

#[derive(Debug)]
struct MeshState {
    mesh: SnapshotMesh,
    bakes: usize,
}

/// [`SceneSource`] backed by a [`SceneSnapshot`]
#[derive(Debug)]
pub struct SnapshotScene {
    info: SceneInfo,
    objects: Vec<SceneObject>,
    meshes: HashMap<String, MeshState>,
    armatures: HashMap<String, SnapshotArmature>,
    current_frame: i32,
}

impl SnapshotScene {
    /// Load a snapshot file
    ///
    /// A relative `source` resolves against the snapshot's directory; with
    /// no `source` the snapshot path itself stands in for the authoring file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let json = fs::read_to_string(path)?;
        let snapshot: SceneSnapshot = serde_json::from_str(&json)
            .map_err(|e| Error::invalid_data(format!("{}: {}", path.display(), e)))?;

        let source_path = match &snapshot.source {
            Some(source) if source.is_relative() => path
                .parent()
                .map(|dir| dir.join(source))
                .unwrap_or_else(|| source.clone()),
            Some(source) => source.clone(),
            None => path.to_path_buf(),
        };

        tracing::debug!(
            path = %path.display(),
            objects = snapshot.objects.len(),
            "Loaded scene snapshot"
        );

        Self::from_snapshot(snapshot, source_path)
    }

    /// Parse a snapshot from a JSON string
    pub fn from_json_str(json: &str, source_path: impl Into<PathBuf>) -> Result<Self> {
        let snapshot: SceneSnapshot =
            serde_json::from_str(json).map_err(|e| Error::invalid_data(e.to_string()))?;
        let source_path = snapshot
            .source
            .clone()
            .unwrap_or_else(|| source_path.into());
        Self::from_snapshot(snapshot, source_path)
    }

    /// Build a scene from an in-memory snapshot
    pub fn from_snapshot(snapshot: SceneSnapshot, source_path: PathBuf) -> Result<Self> {
        check_objects(&snapshot.objects)?;
        let worlds = world_matrices(&snapshot.objects)?;

        let mut objects = Vec::with_capacity(snapshot.objects.len());
        let mut meshes = HashMap::new();
        let mut armatures = HashMap::new();

        for (object, matrix_world) in snapshot.objects.into_iter().zip(worlds) {
            objects.push(SceneObject {
                name: object.name.clone(),
                kind: object.kind.clone(),
                parent: object.parent.clone(),
                matrix_local: object.transform.to_mat4(),
                matrix_world,
            });
            if let Some(mesh) = object.mesh {
                meshes.insert(object.name.clone(), MeshState { mesh, bakes: 0 });
            }
            if let Some(armature) = object.armature {
                armatures.insert(object.name, armature);
            }
        }

        Ok(Self {
            info: SceneInfo {
                source_path,
                framerate: snapshot.framerate,
                frame_range: FrameRange::new(snapshot.frame_start, snapshot.frame_end),
            },
            objects,
            meshes,
            armatures,
            current_frame: snapshot.frame_start,
        })
    }

    /// How many times the modifier stack of `object` has been baked
    pub fn bake_count(&self, object: &str) -> usize {
        self.meshes.get(object).map_or(0, |m| m.bakes)
    }

    fn object(&self, name: &str) -> Result<&SceneObject> {
        self.objects
            .iter()
            .find(|o| o.name == name)
            .ok_or_else(|| Error::object_not_found(name))
    }

    fn mesh(&self, name: &str) -> Result<&MeshState> {
        let object = self.object(name)?;
        self.meshes.get(name).ok_or_else(|| Error::WrongObjectType {
            name: object.name.clone(),
            expected: NodeKind::Mesh.to_string(),
        })
    }

    fn armature(&self, name: &str) -> Result<&SnapshotArmature> {
        let object = self.object(name)?;
        self.armatures.get(name).ok_or_else(|| Error::WrongObjectType {
            name: object.name.clone(),
            expected: NodeKind::Armature.to_string(),
        })
    }
}

impl SceneSource for SnapshotScene {
    fn scene_info(&self) -> SceneInfo {
        self.info.clone()
    }

    fn objects(&self) -> Vec<SceneObject> {
        self.objects.clone()
    }

    fn set_frame(&mut self, frame: i32) -> Result<()> {
        self.current_frame = frame;
        Ok(())
    }

    fn current_frame(&self) -> i32 {
        self.current_frame
    }

    fn apply_render_modifiers(&mut self, object: &str) -> Result<ModifierBake> {
        self.mesh(object)?;
        let Some(state) = self.meshes.get_mut(object) else {
            return Err(Error::object_not_found(object));
        };

        state.bakes += 1;
        let mut bake = ModifierBake::default();
        for modifier in state.mesh.modifiers.drain(..) {
            if modifier.show_render {
                bake.applied.push(modifier.name);
            } else {
                bake.discarded.push(modifier.name);
            }
        }
        Ok(bake)
    }

    fn evaluate_topology(&mut self, object: &str) -> Result<Vec<Vec<u32>>> {
        Ok(self.mesh(object)?.mesh.polygons.clone())
    }

    fn evaluate_vertices(&mut self, object: &str) -> Result<Vec<SourceVertex>> {
        let mesh = &self.mesh(object)?.mesh;
        let positions = mesh
            .frames
            .range(..=self.current_frame)
            .next_back()
            .map_or(&mesh.vertices, |(_, keyed)| keyed);

        let vertices = positions
            .iter()
            .enumerate()
            .map(|(i, p)| SourceVertex {
                position: Vec3::from(*p),
                groups: mesh
                    .weights
                    .get(i)
                    .map(|pairs| {
                        pairs
                            .iter()
                            .map(|&(group, weight)| GroupWeight { group, weight })
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect();
        Ok(vertices)
    }

    fn vertex_groups(&self, object: &str) -> Vec<String> {
        self.meshes
            .get(object)
            .map(|m| m.mesh.vertex_groups.clone())
            .unwrap_or_default()
    }

    fn bones(&self, armature: &str) -> Result<Vec<SourceBone>> {
        Ok(self
            .armature(armature)?
            .bones
            .iter()
            .map(|bone| SourceBone {
                name: bone.name.clone(),
                parent: bone.parent.clone(),
                matrix_local: bone.rest.to_mat4(),
            })
            .collect())
    }

    fn pose_matrix(&mut self, armature: &str, bone: &str) -> Result<Option<Mat4>> {
        let data = self.armature(armature)?;
        if !data.bones.iter().any(|b| b.name == bone) {
            return Err(Error::BoneNotFound {
                armature: armature.to_string(),
                bone: bone.to_string(),
            });
        }

        let keyed = data
            .poses
            .iter()
            .filter(|pose| pose.frame <= self.current_frame)
            .filter_map(|pose| pose.bones.get(bone).map(|transform| (pose.frame, transform)))
            .max_by_key(|(frame, _)| *frame);

        Ok(keyed.map(|(_, transform)| transform.to_mat4()))
    }
}

// ==================== Loading checks ====================

fn check_objects(objects: &[SnapshotObject]) -> Result<()> {
    let mut names = HashSet::new();
    for object in objects {
        if !names.insert(object.name.as_str()) {
            return Err(Error::invalid_data(format!(
                "duplicate object name {}",
                object.name
            )));
        }
        if let Some(mesh) = &object.mesh {
            if object.kind != NodeKind::Mesh {
                return Err(Error::invalid_data(format!(
                    "{} carries mesh data but has type {}",
                    object.name, object.kind
                )));
            }
            check_mesh(&object.name, mesh)?;
        }
        if let Some(armature) = &object.armature {
            if object.kind != NodeKind::Armature {
                return Err(Error::invalid_data(format!(
                    "{} carries armature data but has type {}",
                    object.name, object.kind
                )));
            }
            check_armature(&object.name, armature)?;
        }
    }
    Ok(())
}

fn check_mesh(name: &str, mesh: &SnapshotMesh) -> Result<()> {
    let count = mesh.vertices.len();

    if !mesh.weights.is_empty() && mesh.weights.len() != count {
        return Err(Error::invalid_data(format!(
            "{}: {} weight lists for {} vertices",
            name,
            mesh.weights.len(),
            count
        )));
    }
    let group_count = mesh.vertex_groups.len();
    if let Some((group, _)) = mesh.weights.iter().flatten().find(|(g, _)| *g >= group_count) {
        return Err(Error::invalid_data(format!(
            "{}: weight references group {} of {}",
            name, group, group_count
        )));
    }
    if let Some(index) = mesh.polygons.iter().flatten().find(|&&i| i as usize >= count) {
        return Err(Error::invalid_data(format!(
            "{}: polygon references vertex {} of {}",
            name, index, count
        )));
    }
    if let Some((frame, keyed)) = mesh.frames.iter().find(|(_, keyed)| keyed.len() != count) {
        return Err(Error::invalid_data(format!(
            "{}: frame {} keys {} vertices, mesh has {}",
            name,
            frame,
            keyed.len(),
            count
        )));
    }
    Ok(())
}

fn check_armature(name: &str, armature: &SnapshotArmature) -> Result<()> {
    let mut bones = HashSet::new();
    for bone in &armature.bones {
        if !bones.insert(bone.name.as_str()) {
            return Err(Error::invalid_data(format!(
                "{}: duplicate bone {}",
                name, bone.name
            )));
        }
    }
    for bone in &armature.bones {
        match bone.parent.as_deref() {
            Some(parent) if parent == bone.name => {
                return Err(Error::invalid_data(format!(
                    "{}: bone {} is its own parent",
                    name, bone.name
                )));
            }
            Some(parent) if !bones.contains(parent) => {
                return Err(Error::BoneNotFound {
                    armature: name.to_string(),
                    bone: parent.to_string(),
                });
            }
            _ => {}
        }
    }
    for pose in &armature.poses {
        if let Some(unknown) = pose.bones.keys().find(|b| !bones.contains(b.as_str())) {
            return Err(Error::BoneNotFound {
                armature: name.to_string(),
                bone: unknown.clone(),
            });
        }
    }
    Ok(())
}

/// Scene-space matrices following parent links
fn world_matrices(objects: &[SnapshotObject]) -> Result<Vec<Mat4>> {
    let index: HashMap<&str, usize> = objects
        .iter()
        .enumerate()
        .map(|(i, o)| (o.name.as_str(), i))
        .collect();

    objects
        .iter()
        .map(|object| {
            let mut world = object.transform.to_mat4();
            let mut parent = object.parent.as_deref();
            let mut depth = 0;
            while let Some(name) = parent {
                let &i = index.get(name).ok_or_else(|| {
                    Error::invalid_data(format!("{} has unknown parent {}", object.name, name))
                })?;
                depth += 1;
                if depth > objects.len() {
                    return Err(Error::invalid_data(format!(
                        "parent cycle through {}",
                        object.name
                    )));
                }
                world = objects[i].transform.to_mat4() * world;
                parent = objects[i].parent.as_deref();
            }
            Ok(world)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RIGGED: &str = r#"{
        "framerate": 30,
        "frame_start": 1,
        "frame_end": 4,
        "objects": [
            { "name": "Rig", "type": "ARMATURE",
              "transform": { "translation": [0, 0, 2] },
              "armature": {
                "bones": [
                    { "name": "root" },
                    { "name": "tip", "parent": "root", "rest": { "translation": [0, 1, 0] } }
                ],
                "poses": [
                    { "frame": 2, "bones": { "tip": { "translation": [0, 2, 0] } } }
                ]
              } },
            { "name": "Body", "type": "MESH", "parent": "Rig",
              "transform": { "translation": [1, 0, 0] },
              "mesh": {
                "vertices": [[0, 0, 0], [1, 0, 0], [0, 1, 0]],
                "polygons": [[0, 1, 2]],
                "vertex_groups": ["tip", "root"],
                "weights": [[[1, 1.0]], [[0, 0.6], [1, 0.4]], []],
                "modifiers": [
                    { "name": "Subdivision" },
                    { "name": "Preview", "show_render": false }
                ],
                "frames": { "3": [[0, 0, 1], [1, 0, 1], [0, 1, 1]] }
              } }
        ]
    }"#;

    fn scene() -> SnapshotScene {
        SnapshotScene::from_json_str(RIGGED, "rigged.blend").unwrap()
    }

    #[test]
    fn test_scene_info_and_world_matrices() {
        let scene = scene();
        let info = scene.scene_info();
        assert_eq!(info.framerate, 30.0);
        assert_eq!(info.frame_range, FrameRange::new(1, 4));
        assert_eq!(info.source_path, PathBuf::from("rigged.blend"));
        assert_eq!(scene.current_frame(), 1);

        let body = scene.object("Body").unwrap();
        assert_eq!(body.matrix_world.w_axis.truncate(), Vec3::new(1.0, 0.0, 2.0));
    }

    #[test]
    fn test_modifier_bake_is_counted() {
        let mut scene = scene();
        let bake = scene.apply_render_modifiers("Body").unwrap();
        assert_eq!(bake.applied, vec!["Subdivision".to_string()]);
        assert_eq!(bake.discarded, vec!["Preview".to_string()]);
        assert_eq!(scene.bake_count("Body"), 1);

        let again = scene.apply_render_modifiers("Body").unwrap();
        assert!(again.applied.is_empty());
        assert_eq!(scene.bake_count("Body"), 2);
    }

    #[test]
    fn test_vertices_hold_last_key() {
        let mut scene = scene();
        scene.set_frame(2).unwrap();
        assert_eq!(scene.evaluate_vertices("Body").unwrap()[0].position, Vec3::ZERO);

        scene.set_frame(4).unwrap();
        let vertices = scene.evaluate_vertices("Body").unwrap();
        assert_eq!(vertices[0].position, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(vertices[1].groups.len(), 2);
        assert!(vertices[2].groups.is_empty());
    }

    #[test]
    fn test_pose_falls_back_before_first_key() {
        let mut scene = scene();
        assert_eq!(scene.pose_matrix("Rig", "tip").unwrap(), None);

        scene.set_frame(3).unwrap();
        let pose = scene.pose_matrix("Rig", "tip").unwrap().unwrap();
        assert_eq!(pose.w_axis.truncate(), Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(scene.pose_matrix("Rig", "root").unwrap(), None);

        let err = scene.pose_matrix("Rig", "ghost").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_wrong_object_type() {
        let mut scene = scene();
        assert!(matches!(
            scene.evaluate_topology("Rig"),
            Err(Error::WrongObjectType { .. })
        ));
        assert!(scene.bones("Missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_rejects_inconsistent_snapshots() {
        let duplicate = r#"{ "objects": [
            { "name": "A", "type": "EMPTY" }, { "name": "A", "type": "EMPTY" } ] }"#;
        assert!(SnapshotScene::from_json_str(duplicate, "x.blend").is_err());

        let dangling = r#"{ "objects": [ { "name": "A", "type": "EMPTY", "parent": "B" } ] }"#;
        assert!(SnapshotScene::from_json_str(dangling, "x.blend").is_err());

        let cycle = r#"{ "objects": [
            { "name": "A", "type": "EMPTY", "parent": "B" },
            { "name": "B", "type": "EMPTY", "parent": "A" } ] }"#;
        assert!(SnapshotScene::from_json_str(cycle, "x.blend").is_err());

        let short_weights = r#"{ "objects": [ { "name": "M", "type": "MESH",
            "mesh": { "vertices": [[0,0,0],[1,1,1]], "vertex_groups": ["g"],
                      "weights": [[[0, 1.0]]] } } ] }"#;
        assert!(SnapshotScene::from_json_str(short_weights, "x.blend").is_err());
    }

    #[test]
    fn test_rejects_dangling_bone_parent() {
        let dangling = r#"{ "objects": [ { "name": "Rig", "type": "ARMATURE",
            "armature": { "bones": [
                { "name": "root" },
                { "name": "hand", "parent": "forearm" } ] } } ] }"#;
        let err = SnapshotScene::from_json_str(dangling, "x.blend").unwrap_err();
        assert!(matches!(
            &err,
            Error::BoneNotFound { armature, bone } if armature == "Rig" && bone == "forearm"
        ));

        let own_parent = r#"{ "objects": [ { "name": "Rig", "type": "ARMATURE",
            "armature": { "bones": [ { "name": "root", "parent": "root" } ] } } ] }"#;
        assert!(SnapshotScene::from_json_str(own_parent, "x.blend").is_err());

        // parents may be listed after their children
        let reordered = r#"{ "objects": [ { "name": "Rig", "type": "ARMATURE",
            "armature": { "bones": [
                { "name": "hand", "parent": "root" },
                { "name": "root" } ] } } ] }"#;
        assert!(SnapshotScene::from_json_str(reordered, "x.blend").is_ok());
    }

    #[test]
    fn test_matrix_transform_spec() {
        let json = r#"{ "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 5,6,7,1] }"#;
        let transform: TransformSpec = serde_json::from_str(json).unwrap();
        assert_eq!(transform.to_mat4().w_axis.truncate(), Vec3::new(5.0, 6.0, 7.0));

        let empty: TransformSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.to_mat4(), Mat4::IDENTITY);
    }
}
