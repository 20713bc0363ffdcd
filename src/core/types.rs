use glam::{DMat3, DQuat, DVec3, DVec4};
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};
use crate::utils::math::{self, MIN_QUAT_NORM};

/// Opaque identity of a simulator entity that may own a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Position and orientation of a body in the simulator's world frame.
///
/// Every construction path, deserialization included, goes through
/// [`Pose::new`], so rotations are normalized and sign-canonical and two poses
/// describing the same placement compare equal component-wise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "PoseParts")]
pub struct Pose {
    position: DVec3,
    rotation: DQuat,
}

#[derive(Deserialize)]
struct PoseParts {
    position: DVec3,
    rotation: DQuat,
}

impl From<PoseParts> for Pose {
    fn from(parts: PoseParts) -> Self {
        Pose::new(parts.position, parts.rotation)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
        }
    }
}

impl Pose {
    pub fn new(position: DVec3, rotation: DQuat) -> Self {
        let norm = rotation.length();
        let rotation = if norm > MIN_QUAT_NORM && norm.is_finite() {
            math::canonical_quat(rotation / norm)
        } else {
            rotation
        };
        Self { position, rotation }
    }

    pub fn from_position(position: DVec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Checks for non-finite components and undefined orientation.
    pub fn validate(&self) -> Result<()> {
        if !self.position.is_finite() {
            return Err(PhysicsError::InvalidGeometry(format!(
                "pose position is not finite: {}",
                self.position
            )));
        }
        if !self.rotation.is_finite() {
            return Err(PhysicsError::InvalidGeometry(format!(
                "pose rotation is not finite: {}",
                self.rotation
            )));
        }
        if self.rotation.length() <= MIN_QUAT_NORM {
            return Err(PhysicsError::InvalidGeometry(
                "pose rotation has zero norm".to_string(),
            ));
        }
        Ok(())
    }

    pub fn position(&self) -> DVec3 {
        self.position
    }

    /// Unit, sign-canonical rotation unless the pose failed [`Pose::validate`].
    pub fn rotation(&self) -> DQuat {
        self.rotation
    }

    pub fn with_position(self, position: DVec3) -> Self {
        Self { position, ..self }
    }

    /// Largest per-component difference, treating `q` and `-q` as distinct.
    pub fn max_component_delta(&self, other: &Pose) -> f64 {
        let dp = (self.position - other.position).abs().max_element();
        let dq = (DVec4::from(self.rotation) - DVec4::from(other.rotation))
            .abs()
            .max_element();
        dp.max(dq)
    }
}

/// Linear and angular velocity of a rigid body in the world frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: DVec3,
    pub angular: DVec3,
}

impl Velocity {
    pub fn new(linear: DVec3, angular: DVec3) -> Self {
        Self { linear, angular }
    }

    pub fn validate(&self) -> Result<()> {
        if self.linear.is_finite() && self.angular.is_finite() {
            Ok(())
        } else {
            Err(PhysicsError::InvalidGeometry(
                "velocity is not finite".to_string(),
            ))
        }
    }
}

/// Total mass, centre of mass (body frame) and inertia tensor about the centre of mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f64,
    pub center_of_mass: DVec3,
    pub inertia: DMat3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            center_of_mass: DVec3::ZERO,
            inertia: DMat3::IDENTITY,
        }
    }
}

impl MassProperties {
    pub fn new(mass: f64, center_of_mass: DVec3, inertia: DMat3) -> Self {
        Self {
            mass,
            center_of_mass,
            inertia,
        }
    }

    pub fn solid_sphere(mass: f64, radius: f64) -> Self {
        Self::new(mass, DVec3::ZERO, math::inertia_sphere(radius, mass))
    }

    pub fn solid_box(mass: f64, half_extents: DVec3) -> Self {
        Self::new(mass, DVec3::ZERO, math::inertia_box(half_extents, mass))
    }

    /// Builds the tensor from the six independent moments `ixx, iyy, izz, ixy, ixz, iyz`.
    pub fn from_moments(mass: f64, center_of_mass: DVec3, moments: [f64; 6]) -> Self {
        let [ixx, iyy, izz, ixy, ixz, iyz] = moments;
        let inertia = DMat3::from_cols(
            DVec3::new(ixx, ixy, ixz),
            DVec3::new(ixy, iyy, iyz),
            DVec3::new(ixz, iyz, izz),
        );
        Self::new(mass, center_of_mass, inertia)
    }

    /// Checks positivity of mass and that the inertia is symmetric positive-definite.
    ///
    /// Returns the principal moments and axes on success.
    pub fn validate(&self) -> Result<(DVec3, DMat3)> {
        if !self.mass.is_finite() || self.mass <= 0.0 {
            return Err(PhysicsError::InvalidGeometry(format!(
                "mass must be positive and finite, got {}",
                self.mass
            )));
        }
        if !self.center_of_mass.is_finite() || !self.inertia.is_finite() {
            return Err(PhysicsError::InvalidGeometry(
                "mass properties contain non-finite values".to_string(),
            ));
        }
        let scale = self
            .inertia
            .to_cols_array()
            .iter()
            .fold(0.0f64, |acc, v| acc.max(v.abs()));
        if math::asymmetry(&self.inertia) > 1e-9 * scale.max(1.0) {
            return Err(PhysicsError::InvalidGeometry(
                "inertia tensor is not symmetric".to_string(),
            ));
        }
        let (moments, axes) = math::symmetric_eigen(&self.inertia);
        if moments.min_element() <= 0.0 {
            return Err(PhysicsError::InvalidGeometry(format!(
                "inertia tensor is not positive-definite (principal moments {moments})"
            )));
        }
        Ok((moments, axes))
    }
}

/// Whether a body responds to forces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BodyKind {
    #[default]
    Dynamic,
    Static,
}

/// Initial state used when registering a body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyDesc {
    pub kind: BodyKind,
    pub pose: Pose,
    pub velocity: Velocity,
    pub mass: MassProperties,
}

impl BodyDesc {
    pub fn dynamic() -> Self {
        Self::default()
    }

    pub fn fixed() -> Self {
        Self {
            kind: BodyKind::Static,
            ..Self::default()
        }
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    pub fn with_position(mut self, position: DVec3) -> Self {
        self.pose = self.pose.with_position(position);
        self
    }

    pub fn with_velocity(mut self, velocity: Velocity) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_mass(mut self, mass: MassProperties) -> Self {
        self.mass = mass;
        self
    }
}
