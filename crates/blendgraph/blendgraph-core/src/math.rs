//! Interpolation and transform helpers.
//! - component-wise lerp for vectors
//! - quaternion NLERP with shortest-arc normalization
//! - local-space transforms (translation, rotation, scale) with blending and mirroring
//!
//! Quaternions are stored as `[x, y, z, w]`.

use serde::{Deserialize, Serialize};

pub const QUAT_IDENTITY: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Linear interpolation of scalars.
#[inline]
pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
pub fn lerp_vec3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        lerp_f32(a[0], b[0], t),
        lerp_f32(a[1], b[1], t),
        lerp_f32(a[2], b[2], t),
    ]
}

#[inline]
pub fn add_vec3(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn sub_vec3(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
fn mul_vec3(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] * b[0], a[1] * b[1], a[2] * b[2]]
}

#[inline]
fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
fn dot4(a: [f32; 4], b: [f32; 4]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3]
}

#[inline]
pub fn normalize4(mut q: [f32; 4]) -> [f32; 4] {
    let len2 = dot4(q, q);
    if len2 > 0.0 {
        let inv_len = len2.sqrt().recip();
        q[0] *= inv_len;
        q[1] *= inv_len;
        q[2] *= inv_len;
        q[3] *= inv_len;
    } else {
        q = QUAT_IDENTITY;
    }
    q
}

/// Quaternion NLERP with shortest-arc correction.
/// If dot < 0, negate the second quaternion to ensure the shortest path.
#[inline]
pub fn nlerp_quat(a: [f32; 4], mut b: [f32; 4], t: f32) -> [f32; 4] {
    if dot4(a, b) < 0.0 {
        b = [-b[0], -b[1], -b[2], -b[3]];
    }
    normalize4([
        lerp_f32(a[0], b[0], t),
        lerp_f32(a[1], b[1], t),
        lerp_f32(a[2], b[2], t),
        lerp_f32(a[3], b[3], t),
    ])
}

#[inline]
pub fn quat_mul(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    [
        a[3] * b[0] + a[0] * b[3] + a[1] * b[2] - a[2] * b[1],
        a[3] * b[1] - a[0] * b[2] + a[1] * b[3] + a[2] * b[0],
        a[3] * b[2] + a[0] * b[1] - a[1] * b[0] + a[2] * b[3],
        a[3] * b[3] - a[0] * b[0] - a[1] * b[1] - a[2] * b[2],
    ]
}

#[inline]
pub fn quat_conjugate(q: [f32; 4]) -> [f32; 4] {
    [-q[0], -q[1], -q[2], q[3]]
}

/// Rotate a vector by a unit quaternion.
#[inline]
pub fn quat_rotate(q: [f32; 4], v: [f32; 3]) -> [f32; 3] {
    let u = [q[0], q[1], q[2]];
    let t = cross(u, v);
    let t = [2.0 * t[0], 2.0 * t[1], 2.0 * t[2]];
    let c = cross(u, t);
    [
        v[0] + q[3] * t[0] + c[0],
        v[1] + q[3] * t[1] + c[1],
        v[2] + q[3] * t[2] + c[2],
    ]
}

/// Rotation of `angle` radians around the Y (up) axis.
#[inline]
pub fn quat_from_y_angle(angle: f32) -> [f32; 4] {
    let (s, c) = (angle * 0.5).sin_cos();
    [0.0, s, 0.0, c]
}

/// Local-space joint transform.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: [f32; 3],
    /// quat (x,y,z,w)
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: [0.0; 3],
        rotation: QUAT_IDENTITY,
        scale: [1.0; 3],
    };

    pub fn from_translation(translation: [f32; 3]) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Component-wise blend: lerp for translation/scale, NLERP for rotation.
    pub fn blend(&self, other: &Transform, t: f32) -> Transform {
        Transform {
            translation: lerp_vec3(self.translation, other.translation, t),
            rotation: nlerp_quat(self.rotation, other.rotation, t),
            scale: lerp_vec3(self.scale, other.scale, t),
        }
    }

    /// `self * local`: express `local` (given in this transform's space) in the parent space.
    pub fn multiply(&self, local: &Transform) -> Transform {
        Transform {
            translation: add_vec3(
                self.translation,
                quat_rotate(self.rotation, mul_vec3(self.scale, local.translation)),
            ),
            rotation: normalize4(quat_mul(self.rotation, local.rotation)),
            scale: mul_vec3(self.scale, local.scale),
        }
    }

    /// Relative transform taking `self` to `other`, expressed in `self`'s frame. Ignores scale.
    pub fn delta_to(&self, other: &Transform) -> Transform {
        let inv = quat_conjugate(self.rotation);
        Transform {
            translation: quat_rotate(inv, sub_vec3(other.translation, self.translation)),
            rotation: normalize4(quat_mul(inv, other.rotation)),
            scale: [1.0; 3],
        }
    }

    /// Mirror across the YZ plane (negates X).
    pub fn mirrored(&self) -> Transform {
        let [x, y, z] = self.translation;
        let [qx, qy, qz, qw] = self.rotation;
        Transform {
            translation: [-x, y, z],
            rotation: [qx, -qy, -qz, qw],
            scale: self.scale,
        }
    }

    /// Keep only the ground-plane displacement and the heading (rotation around Y).
    pub fn projected_to_ground(&self) -> Transform {
        let [x, _, z] = self.translation;
        let [_, qy, _, qw] = self.rotation;
        Transform {
            translation: [x, 0.0, z],
            rotation: normalize4([0.0, qy, 0.0, qw]),
            scale: [1.0; 3],
        }
    }

    pub fn is_identity(&self, eps: f32) -> bool {
        self.translation.iter().all(|c| c.abs() <= eps)
            && (1.0 - dot4(self.rotation, QUAT_IDENTITY).abs()) <= eps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx3(a: [f32; 3], b: [f32; 3]) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < 1e-5, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn nlerp_takes_shortest_arc() {
        let a = QUAT_IDENTITY;
        let b = [0.0, 0.0, 0.0, -1.0];
        let q = nlerp_quat(a, b, 0.5);
        assert!((q[3].abs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn multiply_then_delta_recovers_local() {
        let parent = Transform {
            translation: [1.0, 0.0, 2.0],
            rotation: quat_from_y_angle(std::f32::consts::FRAC_PI_2),
            scale: [1.0; 3],
        };
        let local = Transform::from_translation([0.0, 0.0, 1.0]);
        let world = parent.multiply(&local);
        approx3(world.translation, [2.0, 0.0, 2.0]);
        let back = parent.delta_to(&world);
        approx3(back.translation, local.translation);
    }

    #[test]
    fn mirroring_twice_is_identity() {
        let t = Transform {
            translation: [0.3, 1.0, -2.0],
            rotation: normalize4([0.1, 0.2, 0.3, 0.9]),
            scale: [1.0; 3],
        };
        assert_eq!(t.mirrored().mirrored(), t);
    }
}
