//! Deterministic vector/quaternion primitives for the spherical-planet simulation.
//!
//! Everything here is pure and allocation-free: no wall-clock reads, no
//! randomness, no global state. Every other crate in the workspace builds on
//! this one, so it deliberately has zero third-party dependencies.

use std::ops::{Add, Mul, Neg, Sub};

/// Closeness threshold above which `slerp` falls back to a linear blend to
/// avoid dividing by a near-zero `sin(theta)`.
pub const SLERP_LINEAR_FALLBACK_THRESHOLD: f32 = 0.9995;

/// Fallback axis used when a vector degenerates to zero length and a
/// direction is still required (e.g. normalizing the zero vector).
pub const FALLBACK_AXIS: Vec3 = Vec3::new(0.0, 1.0, 0.0);

/// A plain 3D vector. `Copy` because every operation below is cheap and
/// values are passed around by value throughout the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);
    pub const ONE: Vec3 = Vec3::new(1.0, 1.0, 1.0);
    pub const X: Vec3 = Vec3::new(1.0, 0.0, 0.0);
    pub const Y: Vec3 = Vec3::new(0.0, 1.0, 0.0);
    pub const Z: Vec3 = Vec3::new(0.0, 0.0, 1.0);

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Vec3 { x, y, z }
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    #[inline]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    #[inline]
    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    #[inline]
    pub fn scale(self, s: f32) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }

    /// Normalizes the vector. Falls back to [`FALLBACK_AXIS`] for a
    /// zero-length (or NaN-producing) input rather than returning NaN.
    #[inline]
    pub fn normalize(self) -> Vec3 {
        let len = self.length();
        if len <= f32::EPSILON || !len.is_finite() {
            return FALLBACK_AXIS;
        }
        self.scale(1.0 / len)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Projects `self` onto the plane whose normal is `normal` (assumed
    /// already normalized). Does not renormalize the result.
    #[inline]
    pub fn project_onto_plane(self, normal: Vec3) -> Vec3 {
        self - normal.scale(self.dot(normal))
    }

    pub fn distance(self, other: Vec3) -> f32 {
        (self - other).length()
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    #[inline]
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    #[inline]
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    #[inline]
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    #[inline]
    fn mul(self, rhs: f32) -> Vec3 {
        self.scale(rhs)
    }
}

/// Unit quaternion, `(x, y, z, w)` ordering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat::new(0.0, 0.0, 0.0, 1.0);

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Quat { x, y, z, w }
    }

    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Quat {
        let axis = axis.normalize();
        let half = angle * 0.5;
        let s = half.sin();
        Quat::new(axis.x * s, axis.y * s, axis.z * s, half.cos())
    }

    pub fn normalize(self) -> Quat {
        let len = (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt();
        if len <= f32::EPSILON || !len.is_finite() {
            return Quat::IDENTITY;
        }
        let inv = 1.0 / len;
        Quat::new(self.x * inv, self.y * inv, self.z * inv, self.w * inv)
    }

    pub fn dot(self, other: Quat) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    pub fn conjugate(self) -> Quat {
        Quat::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Hamilton product `self * rhs`, i.e. apply `rhs` first, then `self`.
    pub fn mul_quat(self, rhs: Quat) -> Quat {
        Quat::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }

    /// Rotates `v` by this quaternion.
    pub fn rotate_vector(self, v: Vec3) -> Vec3 {
        let qv = Vec3::new(self.x, self.y, self.z);
        let uv = qv.cross(v);
        let uuv = qv.cross(uv);
        v + (uv.scale(self.w) + uuv).scale(2.0)
    }

    /// Local `+Y` axis after rotation — the unit's "up" in world space.
    pub fn up(self) -> Vec3 {
        self.rotate_vector(Vec3::Y)
    }

    /// Local `-Z` axis after rotation — the Three.js-style forward convention
    /// used by [`look_rotation`].
    pub fn forward(self) -> Vec3 {
        self.rotate_vector(Vec3::new(0.0, 0.0, -1.0))
    }

    /// Builds a rotation so that local `-Z` maps to `forward` and local `+Y`
    /// maps to `up`, following the Three.js-compatible `lookRotation`
    /// convention named in spec §4.1. Falls back to a stable rotation when
    /// `forward` and `up` are (near) parallel.
    pub fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
        let f = forward.normalize();
        let mut right = up.cross(f);
        if right.length_squared() <= 1.0e-8 {
            // forward and up are parallel: pick an arbitrary stable up.
            let alt_up = if f.y.abs() < 0.99 { Vec3::Y } else { Vec3::X };
            right = alt_up.cross(f);
        }
        let right = right.normalize();
        let real_up = f.cross(right);

        // Build the rotation matrix with columns (right, real_up, -f) — the
        // local -Z axis then maps to `f` and local +Y maps to `real_up`.
        let back = -f;
        shepperd_from_basis(right, real_up, back)
    }

    /// Spherical linear interpolation with shortest-path sign correction and
    /// a linear fallback when the endpoints are nearly coincident.
    pub fn slerp(self, other: Quat, t: f32) -> Quat {
        let mut b = other;
        let mut cos_theta = self.dot(b);
        if cos_theta < 0.0 {
            b = Quat::new(-b.x, -b.y, -b.z, -b.w);
            cos_theta = -cos_theta;
        }

        if cos_theta > SLERP_LINEAR_FALLBACK_THRESHOLD {
            let lerp = Quat::new(
                self.x + (b.x - self.x) * t,
                self.y + (b.y - self.y) * t,
                self.z + (b.z - self.z) * t,
                self.w + (b.w - self.w) * t,
            );
            return lerp.normalize();
        }

        let theta_0 = cos_theta.clamp(-1.0, 1.0).acos();
        let theta = theta_0 * t;
        let sin_theta_0 = theta_0.sin();
        let s0 = (theta_0 - theta).sin() / sin_theta_0;
        let s1 = theta.sin() / sin_theta_0;
        Quat::new(
            self.x * s0 + b.x * s1,
            self.y * s0 + b.y * s1,
            self.z * s0 + b.z * s1,
            self.w * s0 + b.w * s1,
        )
    }
}

/// Builds a unit quaternion from an orthonormal basis using Shepperd's
/// method, which picks the numerically stable branch based on the trace of
/// the implied rotation matrix.
fn shepperd_from_basis(right: Vec3, up: Vec3, back: Vec3) -> Quat {
    // Matrix columns are (right, up, back); rows are reconstructed below.
    let m00 = right.x;
    let m10 = right.y;
    let m20 = right.z;
    let m01 = up.x;
    let m11 = up.y;
    let m21 = up.z;
    let m02 = back.x;
    let m12 = back.y;
    let m22 = back.z;

    let trace = m00 + m11 + m22;
    if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0;
        Quat::new(
            (m21 - m12) / s,
            (m02 - m20) / s,
            (m10 - m01) / s,
            0.25 * s,
        )
        .normalize()
    } else if m00 > m11 && m00 > m22 {
        let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
        Quat::new(0.25 * s, (m01 + m10) / s, (m02 + m20) / s, (m21 - m12) / s).normalize()
    } else if m11 > m22 {
        let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
        Quat::new((m01 + m10) / s, 0.25 * s, (m12 + m21) / s, (m02 - m20) / s).normalize()
    } else {
        let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
        Quat::new((m02 + m20) / s, (m12 + m21) / s, 0.25 * s, (m10 - m01) / s).normalize()
    }
}

/// Bundle of the three vectors derived from a surface normal that callers
/// (terrain patch generation, unit input mapping) reconstruct over and over.
#[derive(Debug, Clone, Copy)]
pub struct TangentFrame {
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

impl TangentFrame {
    /// Builds the tangent frame at a surface point whose outward normal is
    /// `up` (assumed normalized). `forward` is world-north projected onto the
    /// tangent plane, falling back to world `+X` near the poles where that
    /// projection degenerates.
    pub fn from_normal(up: Vec3) -> TangentFrame {
        let world_north = Vec3::Y;
        let mut forward = world_north.project_onto_plane(up);
        if forward.length_squared() <= 1.0e-8 {
            forward = Vec3::X.project_onto_plane(up);
        }
        let forward = forward.normalize();
        let right = forward.cross(up).normalize();
        TangentFrame { forward, right, up }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_zero_vector_has_no_nan() {
        let n = Vec3::ZERO.normalize();
        assert!(n.is_finite());
        assert_eq!(n, FALLBACK_AXIS);
    }

    #[test]
    fn normalize_unit_length() {
        let v = Vec3::new(3.0, 4.0, 0.0).normalize();
        assert!((v.length() - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn cross_orthogonal_to_inputs() {
        let a = Vec3::new(1.0, 0.0, 0.0);
        let b = Vec3::new(0.0, 1.0, 0.0);
        let c = a.cross(b);
        assert!(c.dot(a).abs() < 1.0e-6);
        assert!(c.dot(b).abs() < 1.0e-6);
        assert_eq!(c, Vec3::Z);
    }

    #[test]
    fn project_onto_plane_removes_normal_component() {
        let v = Vec3::new(1.0, 1.0, 0.0);
        let projected = v.project_onto_plane(Vec3::Y);
        assert!(projected.dot(Vec3::Y).abs() < 1.0e-6);
    }

    #[test]
    fn quat_identity_is_no_op() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(Quat::IDENTITY.rotate_vector(v), v);
    }

    #[test]
    fn axis_angle_rotate_90_degrees() {
        let q = Quat::from_axis_angle(Vec3::Y, std::f32::consts::FRAC_PI_2);
        let v = q.rotate_vector(Vec3::X);
        assert!(v.distance(Vec3::new(0.0, 0.0, -1.0)) < 1.0e-5);
    }

    #[test]
    fn look_rotation_maps_forward_and_up() {
        let forward = Vec3::new(1.0, 0.0, 0.0);
        let up = Vec3::Y;
        let q = Quat::look_rotation(forward, up);
        let mapped_forward = q.forward();
        assert!(mapped_forward.distance(forward) < 1.0e-4);
    }

    #[test]
    fn look_rotation_handles_parallel_forward_and_up() {
        let forward = Vec3::Y;
        let up = Vec3::Y;
        let q = Quat::look_rotation(forward, up);
        assert!(q.forward().is_finite());
        assert!((q.forward().length() - 1.0).abs() < 1.0e-4);
    }

    #[test]
    fn slerp_at_zero_and_one_returns_endpoints() {
        let a = Quat::IDENTITY;
        let b = Quat::from_axis_angle(Vec3::Y, 1.0);
        assert!(a.slerp(b, 0.0).dot(a).abs() > 0.999);
        assert!(a.slerp(b, 1.0).dot(b).abs() > 0.999);
    }

    #[test]
    fn slerp_shortest_path_when_quats_are_opposite_hemisphere() {
        let a = Quat::IDENTITY;
        let b = Quat::new(-a.x, -a.y, -a.z, -a.w); // same rotation, opposite sign
        let mid = a.slerp(b, 0.5);
        assert!(mid.dot(a) >= 0.0);
    }

    #[test]
    fn tangent_frame_at_pole_falls_back() {
        let frame = TangentFrame::from_normal(Vec3::Y);
        assert!(frame.forward.is_finite());
        assert!(frame.forward.length() > 0.0);
        assert!(frame.forward.dot(Vec3::Y).abs() < 1.0e-4);
    }
}
