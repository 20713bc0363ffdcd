//! Physics Bridge – a pluggable rigid-body physics-engine abstraction layer.
//!
//! A [`PhysicsWorld`] owns one native backend (anything implementing
//! [`PhysicsBackend`]) and maps simulator entities, bodies, geoms and joints
//! onto it. The crate ships [`ImpulseBackend`], a sequential-impulse rigid-body
//! solver with a uniform-grid broadphase and primitive narrowphase.
//!
//! The lifecycle is `load → init → init_for_thread → step… → fini`; stepping
//! requires the [`SteppingToken`] returned by `init_for_thread`.

pub mod backend;
pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;
pub mod world;

pub use glam::{DMat3, DQuat, DVec3};

pub use backend::{
    CollisionReport, ImpulseBackend, NativeJointState, ObjectCounts, PhysicsBackend, StepReport,
};
pub use config::{ConfigNode, PhysicsParams, RangePolicy, WorldConfig};
pub use crate::core::{
    BodyDesc, BodyKind, EntityId, GeomDesc, GeomShape, JointLimits, JointParams, JointState,
    JointType, MassProperties, Pose, ShapeType, Velocity,
};
pub use dynamics::{ConvergenceMonitor, Retention};
pub use error::{PhysicsError, Result};
pub use utils::allocator::{BodyHandle, GeomHandle, JointHandle};
pub use world::{
    BodySnapshot, ContactPair, HandleCounts, PhaseTimes, PhysicsWorld, SharedWorld,
    SteppingToken, WorldState,
};

/// High-level convenience wrapper that owns a [`PhysicsWorld`].
pub struct PhysicsEngine<B: PhysicsBackend = ImpulseBackend> {
    world: PhysicsWorld<B>,
}

impl PhysicsEngine<ImpulseBackend> {
    /// Creates an engine backed by the built-in impulse solver.
    pub fn new() -> Self {
        Self::with_backend(ImpulseBackend::new())
    }
}

impl Default for PhysicsEngine<ImpulseBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: PhysicsBackend> PhysicsEngine<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            world: PhysicsWorld::new(backend),
        }
    }

    /// Loads `params` and initializes the world in one call.
    pub fn start(&mut self, params: &PhysicsParams) -> Result<()> {
        self.world.load(params)?;
        self.world.init()
    }

    pub fn load(&mut self, params: &PhysicsParams) -> Result<()> {
        self.world.load(params)
    }

    pub fn init(&mut self) -> Result<()> {
        self.world.init()
    }

    /// Prepares the calling thread and returns its stepping capability.
    pub fn init_for_thread(&self) -> Result<SteppingToken> {
        self.world.init_for_thread()
    }

    /// Advances the simulation by one configured step.
    pub fn step(&mut self, token: &SteppingToken) -> Result<StepReport> {
        self.world.step(token)
    }

    /// Registers a body for `entity` with one collision shape attached.
    pub fn add_body(
        &mut self,
        entity: EntityId,
        desc: BodyDesc,
        shape: impl Into<GeomDesc>,
    ) -> Result<BodyHandle> {
        let body = self.world.create_body_with(entity, desc)?;
        if let Err(err) = self.world.create_geom(body, shape) {
            // The entity was never announced, so listeners stay silent.
            self.world.discard_entity(entity);
            return Err(err);
        }
        Ok(body)
    }

    pub fn remove_body(&mut self, entity: EntityId) -> bool {
        self.world.remove_entity(entity)
    }

    pub fn body_pose(&self, body: BodyHandle) -> Result<Pose> {
        self.world.body_pose(body)
    }

    pub fn fini(&mut self) -> Result<()> {
        self.world.fini()
    }

    pub fn world(&self) -> &PhysicsWorld<B> {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut PhysicsWorld<B> {
        &mut self.world
    }

    /// Moves the world behind a lock for use from several threads.
    pub fn into_shared(self) -> SharedWorld<B> {
        self.world.into_shared()
    }
}
