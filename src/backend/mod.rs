//! Backend abstraction: the capability set every native physics library must provide.
//!
//! A world never talks to a dynamics library directly. It owns one value
//! implementing [`PhysicsBackend`], which holds the native broadphase,
//! dispatcher, solver and dynamics world for that world alone. The
//! pose/mass conversion layer lives here too, as associated functions, since
//! only the backend knows its native encodings.

pub mod impulse;

use std::fmt::Debug;
use std::hash::Hash;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::{
    config::WorldConfig,
    core::{BodyKind, GeomShape, JointParams, JointType, MassProperties, Pose, ShapeType, Velocity},
    error::Result,
};

pub use impulse::ImpulseBackend;

/// Summary of one collision phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CollisionReport {
    pub pairs_tested: usize,
    pub contacts: usize,
}

/// Summary of one dynamics phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// RMS of the constraint residuals left after the last solver iteration.
    pub residual: f64,
    pub constraint_rows: usize,
    pub contacts: usize,
    pub iterations: u32,
}

/// Live object counts inside the native world.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectCounts {
    pub bodies: usize,
    pub geoms: usize,
    pub joints: usize,
}

/// Contact point between two native bodies, normal pointing from A to B.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeContact<BodyId> {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub point: DVec3,
    pub normal: DVec3,
    pub depth: f64,
}

/// Joint geometry as read back from the native world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeJointState {
    pub anchor: DVec3,
    pub axis: DVec3,
    pub position: f64,
    pub rate: f64,
    pub anchor_error: f64,
}

/// Operations a native physics library must expose to back a world.
///
/// Object lifetimes are driven entirely by the world: the backend never
/// destroys an object on its own, and the world never hands it an id it has
/// already destroyed.
pub trait PhysicsBackend: Send {
    /// The backend's native transform encoding.
    type NativePose: Clone + Debug;
    /// The backend's native mass/inertia encoding.
    type NativeMass: Clone + Debug;
    type BodyId: Copy + Eq + Hash + Debug + Send;
    type GeomId: Copy + Eq + Hash + Debug + Send;
    type JointId: Copy + Eq + Hash + Debug + Send;

    fn name(&self) -> &str;

    /// Converts a simulator pose; fails with `InvalidGeometry` on non-finite
    /// input or a zero-norm rotation.
    fn pose_to_native(pose: &Pose) -> Result<Self::NativePose>;

    fn pose_from_native(native: &Self::NativePose) -> Pose;

    /// Converts mass properties; fails with `InvalidGeometry` unless mass is
    /// positive and the inertia is symmetric positive-definite.
    fn mass_to_native(mass: &MassProperties) -> Result<Self::NativeMass>;

    fn mass_from_native(native: &Self::NativeMass) -> MassProperties;

    /// Builds the native broadphase, dispatcher, solver and dynamics world.
    fn init(&mut self, config: &WorldConfig) -> Result<()>;

    /// Thread-local setup required before the calling thread may step.
    fn init_for_thread(&self) -> Result<()>;

    /// Replaces the solver's active global parameters.
    fn apply_config(&mut self, config: &WorldConfig);

    /// Releases every native object.
    fn fini(&mut self);

    fn supports_shape(&self, shape: ShapeType) -> bool;

    fn create_body(
        &mut self,
        kind: BodyKind,
        pose: Self::NativePose,
        mass: Self::NativeMass,
        velocity: Velocity,
    ) -> Result<Self::BodyId>;

    fn destroy_body(&mut self, body: Self::BodyId);

    fn create_geom(
        &mut self,
        body: Self::BodyId,
        shape: &GeomShape,
        offset: Self::NativePose,
    ) -> Result<Self::GeomId>;

    fn destroy_geom(&mut self, geom: Self::GeomId);

    /// Allocates a joint with no endpoints.
    fn create_joint(&mut self, kind: JointType) -> Result<Self::JointId>;

    /// Connects a joint; `None` endpoints mean the static world frame.
    fn attach_joint(
        &mut self,
        joint: Self::JointId,
        body_a: Option<Self::BodyId>,
        body_b: Option<Self::BodyId>,
        params: &JointParams,
    ) -> Result<()>;

    fn detach_joint(&mut self, joint: Self::JointId);

    fn destroy_joint(&mut self, joint: Self::JointId);

    fn body_pose(&self, body: Self::BodyId) -> Option<Self::NativePose>;

    fn set_body_pose(&mut self, body: Self::BodyId, pose: Self::NativePose) -> bool;

    fn body_velocity(&self, body: Self::BodyId) -> Option<Velocity>;

    fn set_body_velocity(&mut self, body: Self::BodyId, velocity: Velocity) -> bool;

    fn body_mass(&self, body: Self::BodyId) -> Option<Self::NativeMass>;

    fn set_body_mass(&mut self, body: Self::BodyId, mass: Self::NativeMass) -> bool;

    /// Accumulates a world-frame force (through the centre of mass) and torque
    /// for the next dynamics phase.
    fn apply_force(&mut self, body: Self::BodyId, force: DVec3, torque: DVec3) -> bool;

    /// Broad and narrow phase only: refreshes the contact cache, moves nothing.
    fn update_collision(&mut self) -> Result<CollisionReport>;

    /// Solves constraints against the cached contacts and integrates one step.
    ///
    /// On error the backend must leave every body as it was before the call.
    fn update_physics(&mut self, dt: f64) -> Result<StepReport>;

    /// Drops cached contacts, e.g. after an aborted step.
    fn discard_contacts(&mut self);

    fn contacts(&self) -> Vec<NativeContact<Self::BodyId>>;

    /// `None` if the joint is unknown or not connected.
    fn joint_state(&self, joint: Self::JointId) -> Option<NativeJointState>;

    fn object_counts(&self) -> ObjectCounts;
}
