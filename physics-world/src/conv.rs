//! Conversions between [`sphere_math`]'s plain vector/quaternion types and
//! the `nalgebra` types `rapier3d` expects. Kept in one place so every other
//! module in this crate reads and writes [`sphere_math::Vec3`]/[`Quat`]
//! exclusively.

use nalgebra::{Translation3, UnitQuaternion, Vector3};
use sphere_math::{Quat, Vec3};

pub fn to_na_vector(v: Vec3) -> Vector3<f32> {
    Vector3::new(v.x, v.y, v.z)
}

pub fn from_na_vector(v: &Vector3<f32>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

pub fn to_na_translation(v: Vec3) -> Translation3<f32> {
    Translation3::new(v.x, v.y, v.z)
}

pub fn to_na_rotation(q: Quat) -> UnitQuaternion<f32> {
    UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(q.w, q.x, q.y, q.z))
}

pub fn from_na_rotation(q: &UnitQuaternion<f32>) -> Quat {
    Quat::new(q.i, q.j, q.k, q.w)
}
