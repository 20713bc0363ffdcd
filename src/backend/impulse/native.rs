//! Native object representation of the impulse backend.
//!
//! Transforms are stored as a rotation matrix plus origin, and mass as inverse
//! mass plus a principal-axis inertia, so every value crossing the backend
//! boundary goes through an actual change of representation.

use glam::{DMat3, DQuat, DVec3};

use crate::{
    core::{BodyKind, GeomShape, JointLimits, JointType},
    utils::allocator::arena_handle,
    utils::math,
};

arena_handle!(
    /// Body slot inside the impulse backend.
    NativeBodyId
);
arena_handle!(
    /// Geom slot inside the impulse backend.
    NativeGeomId
);
arena_handle!(
    /// Joint slot inside the impulse backend.
    NativeJointId
);

/// Rigid transform as rotation matrix plus origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeTransform {
    pub basis: DMat3,
    pub origin: DVec3,
}

impl Default for NativeTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl NativeTransform {
    pub const IDENTITY: Self = Self {
        basis: DMat3::IDENTITY,
        origin: DVec3::ZERO,
    };

    pub fn new(basis: DMat3, origin: DVec3) -> Self {
        Self { basis, origin }
    }

    pub fn from_rotation_translation(rotation: DQuat, origin: DVec3) -> Self {
        Self::new(DMat3::from_quat(rotation), origin)
    }

    /// Unit quaternion of the basis, in canonical sign.
    pub fn rotation(&self) -> DQuat {
        math::canonical_quat(DQuat::from_mat3(&self.basis).normalize())
    }

    pub fn transform_point(&self, local: DVec3) -> DVec3 {
        self.origin + self.basis * local
    }

    pub fn transform_vector(&self, local: DVec3) -> DVec3 {
        self.basis * local
    }

    /// World point into this frame.
    pub fn inverse_transform_point(&self, world: DVec3) -> DVec3 {
        self.basis.transpose() * (world - self.origin)
    }

    pub fn inverse_transform_vector(&self, world: DVec3) -> DVec3 {
        self.basis.transpose() * world
    }

    /// `self * local`: places a frame given relative to `self`.
    pub fn compose(&self, local: &NativeTransform) -> NativeTransform {
        NativeTransform::new(self.basis * local.basis, self.transform_point(local.origin))
    }
}

/// Inverse mass with the inertia tensor stored in its principal frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeMass {
    pub inverse_mass: f64,
    /// Centre of mass in the body frame.
    pub center_of_mass: DVec3,
    pub principal_inertia: DVec3,
    /// Rotation from the principal frame to the body frame.
    pub principal_axes: DMat3,
}

impl NativeMass {
    /// Infinite mass, used for static bodies and the world frame.
    pub const IMMOVABLE: Self = Self {
        inverse_mass: 0.0,
        center_of_mass: DVec3::ZERO,
        principal_inertia: DVec3::ZERO,
        principal_axes: DMat3::IDENTITY,
    };

    /// Inverse inertia tensor in the body frame.
    pub fn inverse_inertia_local(&self) -> DMat3 {
        if self.inverse_mass == 0.0 {
            return DMat3::ZERO;
        }
        let inverse = DMat3::from_diagonal(self.principal_inertia.recip());
        self.principal_axes * inverse * self.principal_axes.transpose()
    }
}

/// A body as the backend's dynamics world sees it.
#[derive(Debug, Clone)]
pub struct NativeBody {
    pub kind: BodyKind,
    /// Placement of the body frame.
    pub transform: NativeTransform,
    pub mass: NativeMass,
    /// Velocity of the centre of mass.
    pub linear_velocity: DVec3,
    pub angular_velocity: DVec3,
    pub force: DVec3,
    pub torque: DVec3,
    pub geoms: Vec<NativeGeomId>,
}

impl NativeBody {
    pub fn is_static(&self) -> bool {
        self.kind == BodyKind::Static
    }

    /// Effective mass seen by the solver; static bodies never move.
    pub fn effective_mass(&self) -> NativeMass {
        if self.is_static() {
            NativeMass {
                center_of_mass: self.mass.center_of_mass,
                ..NativeMass::IMMOVABLE
            }
        } else {
            self.mass
        }
    }

    pub fn world_center_of_mass(&self) -> DVec3 {
        self.transform.transform_point(self.mass.center_of_mass)
    }

    pub fn inverse_inertia_world(&self) -> DMat3 {
        let local = self.effective_mass().inverse_inertia_local();
        self.transform.basis * local * self.transform.basis.transpose()
    }
}

/// Collision shape rigidly attached to a body.
#[derive(Debug, Clone)]
pub struct NativeGeom {
    pub body: NativeBodyId,
    pub shape: GeomShape,
    pub offset: NativeTransform,
}

/// Attachment data captured when a joint is connected.
///
/// Anchors and axes are stored in each endpoint's body frame; a `None` body is
/// the world frame, in which local and world coordinates coincide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointFrame {
    pub body_a: Option<NativeBodyId>,
    pub body_b: Option<NativeBodyId>,
    pub anchor_a: DVec3,
    pub anchor_b: DVec3,
    pub axis_a: DVec3,
    pub axis_b: DVec3,
    /// Second universal axis, carried by B.
    pub axis2_b: DVec3,
    /// `q_a^-1 * q_b` at attach time.
    pub rest_rotation: DQuat,
    pub limits: Option<JointLimits>,
}

#[derive(Debug, Clone)]
pub struct NativeJoint {
    pub kind: JointType,
    pub frame: Option<JointFrame>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn compose_matches_quaternion_composition() {
        let parent = NativeTransform::from_rotation_translation(
            DQuat::from_rotation_z(0.7),
            DVec3::new(1.0, 2.0, 3.0),
        );
        let child = NativeTransform::from_rotation_translation(
            DQuat::from_rotation_x(-0.3),
            DVec3::new(0.5, 0.0, -1.0),
        );
        let combined = parent.compose(&child);
        let expected = DQuat::from_rotation_z(0.7) * DQuat::from_rotation_x(-0.3);
        assert_abs_diff_eq!(
            combined.origin.distance(parent.transform_point(child.origin)),
            0.0,
            epsilon = 1e-12
        );
        assert!(combined.rotation().angle_between(expected) < 1e-9);
    }

    #[test]
    fn inverse_transform_undoes_transform() {
        let frame = NativeTransform::from_rotation_translation(
            DQuat::from_euler(glam::EulerRot::XYZ, 0.1, 0.2, 0.3),
            DVec3::new(-4.0, 0.5, 2.0),
        );
        let p = DVec3::new(0.3, -0.7, 1.1);
        let back = frame.inverse_transform_point(frame.transform_point(p));
        assert_abs_diff_eq!(back.distance(p), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn immovable_mass_has_zero_inverse_inertia() {
        assert_eq!(NativeMass::IMMOVABLE.inverse_inertia_local(), DMat3::ZERO);
    }
}
