//! Common types used across scenepipe
//!
//! Transform decomposition, the axis conventions of the interchange format
//! and the inclusive frame range of a scene.

use std::f32::consts::FRAC_PI_2;
use std::ops::RangeInclusive;

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Padding written into the fourth slot of every position.
pub const POSITION_W: f32 = 1.0;

/// Padding written into the fourth slot of every scale.
pub const SCALE_W: f32 = 0.0;

/// Quaternion right-multiplied onto bone rotations before remapping.
///
/// A -90 degree turn about X: host bones point along +Y in bone space while
/// the consumer expects them along its forward axis.
pub fn bone_correction() -> Quat {
    Quat::from_rotation_x(-FRAC_PI_2)
}

/// Translation, rotation and scale pulled out of an affine matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decomposed {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// Set when the matrix was singular or non-finite and a best-effort
    /// result was substituted
    pub degenerate: bool,
}

impl Decomposed {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
        degenerate: false,
    };
}

impl Default for Decomposed {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Decompose an affine matrix into translation, unit rotation and scale.
///
/// Negative scale is folded into the X scale component so the rotation
/// stays a proper unit quaternion. Singular or non-finite input never
/// fails: the finite translation and column lengths are kept and the
/// rotation falls back to identity.
pub fn decompose(matrix: &Mat4) -> Decomposed {
    let det = matrix.determinant();

    if det != 0.0 && det.is_finite() && matrix.is_finite() {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        let length = rotation.length();
        if rotation.is_finite() && length > f32::EPSILON {
            return Decomposed {
                translation,
                rotation: rotation / length,
                scale,
                degenerate: false,
            };
        }
    }

    let finite_or_zero = |value: f32| if value.is_finite() { value } else { 0.0 };
    let translation = matrix.w_axis.truncate();
    let scale = Vec3::new(
        matrix.x_axis.truncate().length(),
        matrix.y_axis.truncate().length(),
        matrix.z_axis.truncate().length(),
    );

    tracing::debug!(determinant = %det, "Degenerate transform, substituting identity rotation");

    Decomposed {
        translation: Vec3::new(
            finite_or_zero(translation.x),
            finite_or_zero(translation.y),
            finite_or_zero(translation.z),
        ),
        rotation: Quat::IDENTITY,
        scale: Vec3::new(
            finite_or_zero(scale.x),
            finite_or_zero(scale.y),
            finite_or_zero(scale.z),
        ),
        degenerate: true,
    }
}

/// Build a matrix from a column-major array of 16 floats
pub fn mat4_from_cols(cols: &[f32; 16]) -> Mat4 {
    Mat4::from_cols_array(cols)
}

/// Build a matrix from translation, rotation (x, y, z, w) and scale
pub fn mat4_from_trs(translation: [f32; 3], rotation: [f32; 4], scale: [f32; 3]) -> Mat4 {
    let rotation = Quat::from_array(rotation);
    let rotation = if rotation.length_squared() > 0.0 {
        rotation.normalize()
    } else {
        Quat::IDENTITY
    };
    Mat4::from_scale_rotation_translation(Vec3::from(scale), rotation, Vec3::from(translation))
}

/// Coordinate convention of the exported document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisConvention {
    /// Left-handed Y-up consumer: X negated, Y and Z swapped
    #[default]
    YUpLeftHanded,
    /// Host values written untouched (right-handed Z-up, early revisions)
    Native,
}

impl AxisConvention {
    /// Remap a host-space point into document space
    pub fn point(self, v: Vec3) -> [f32; 3] {
        match self {
            AxisConvention::YUpLeftHanded => [-v.x, v.z, -v.y],
            AxisConvention::Native => [v.x, v.y, v.z],
        }
    }

    /// Remap a translation, padded with [`POSITION_W`]
    pub fn position(self, v: Vec3) -> [f32; 4] {
        let [x, y, z] = self.point(v);
        [x, y, z, POSITION_W]
    }

    /// Remap a scale, padded with [`SCALE_W`]
    pub fn scale(self, v: Vec3) -> [f32; 4] {
        match self {
            AxisConvention::YUpLeftHanded => [v.x, v.z, v.y, SCALE_W],
            AxisConvention::Native => [v.x, v.y, v.z, SCALE_W],
        }
    }

    /// Remap an object rotation
    pub fn node_rotation(self, q: Quat) -> [f32; 4] {
        match self {
            AxisConvention::YUpLeftHanded => [q.x, -q.z, q.y, q.w],
            AxisConvention::Native => [q.x, q.y, q.z, q.w],
        }
    }

    /// Correct and remap a bone rotation (rest or pose)
    ///
    /// The result is the negation of [`Self::node_rotation`] applied to the
    /// corrected quaternion; both encode the same rotation.
    pub fn bone_rotation(self, q: Quat) -> [f32; 4] {
        match self {
            AxisConvention::YUpLeftHanded => {
                let r = q * bone_correction();
                [-r.x, r.z, -r.y, -r.w]
            }
            AxisConvention::Native => [q.x, q.y, q.z, q.w],
        }
    }
}

/// Inclusive range of integer scene frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: i32,
    pub end: i32,
}

impl FrameRange {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    /// Frames in ascending order
    pub fn frames(&self) -> RangeInclusive<i32> {
        self.start..=self.end
    }

    /// Number of frames, zero when `end < start`
    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            (i64::from(self.end) - i64::from(self.start) + 1) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, frame: i32) -> bool {
        self.frames().contains(&frame)
    }
}

impl Default for FrameRange {
    fn default() -> Self {
        Self { start: 1, end: 250 }
    }
}
