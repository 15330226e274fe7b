//! Pose and rotation helpers shared by the dynamics, camera and mirror code.
//!
//! Conventions (vehicle-local and camera-local): forward = +Z, up = +Y,
//! left = +X. A positive yaw about +Y turns forward toward the left.

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};

/// Rigid pose: position + orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Point3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }

    pub fn new(position: Point3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self { position, rotation }
    }

    pub fn from_isometry(iso: &Isometry3<f32>) -> Self {
        Self {
            position: Point3::from(iso.translation.vector),
            rotation: iso.rotation,
        }
    }

    pub fn isometry(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.position.coords), self.rotation)
    }

    /// Local point -> world point.
    pub fn transform_point(&self, local: &Point3<f32>) -> Point3<f32> {
        self.position + self.rotation * local.coords
    }

    pub fn forward(&self) -> Vector3<f32> {
        self.rotation * Vector3::z()
    }

    pub fn yaw(&self) -> f32 {
        yaw_of(&self.rotation)
    }
}

/// Heading angle of a rotation around world +Y (0 = facing +Z).
pub fn yaw_of(rotation: &UnitQuaternion<f32>) -> f32 {
    let f = rotation * Vector3::z();
    f.x.atan2(f.z)
}

pub fn yaw_rotation(yaw: f32) -> UnitQuaternion<f32> {
    UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw)
}

/// Euler rotation applied in X, Y, Z order (matrix `Rx * Ry * Rz`).
pub fn euler_xyz(x: f32, y: f32, z: f32) -> UnitQuaternion<f32> {
    UnitQuaternion::from_axis_angle(&Vector3::x_axis(), x)
        * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), y)
        * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), z)
}

/// Rotation whose local +Z points along `dir`, keeping world +Y as up.
///
/// Returns `None` for a zero direction. Straight up/down directions fall back
/// to +Z as the up hint.
pub fn look_rotation(dir: &Vector3<f32>) -> Option<UnitQuaternion<f32>> {
    let len = dir.norm();
    if len < 1e-6 {
        return None;
    }
    let d = dir / len;
    let up = if d.cross(&Vector3::y()).norm_squared() < 1e-8 {
        Vector3::z()
    } else {
        Vector3::y()
    };
    Some(UnitQuaternion::face_towards(&d, &up))
}

/// XZ-plane component of a vector.
#[inline]
pub fn horizontal(v: &Vector3<f32>) -> Vector3<f32> {
    Vector3::new(v.x, 0.0, v.z)
}

#[inline]
pub fn horizontal_speed(v: &Vector3<f32>) -> f32 {
    (v.x * v.x + v.z * v.z).sqrt()
}

#[inline]
pub fn v3(v: &Vector3<f32>) -> [f32; 3] {
    [v.x, v.y, v.z]
}

#[inline]
pub fn p3(p: &Point3<f32>) -> [f32; 3] {
    [p.x, p.y, p.z]
}

/// Quaternion as `[x, y, z, w]`.
#[inline]
pub fn q4(q: &UnitQuaternion<f32>) -> [f32; 4] {
    let c = q.coords;
    [c.x, c.y, c.z, c.w]
}
