//! The simulation context: one backend aggregate plus the handle registry that
//! ties simulator entities to native objects.
//!
//! Factory operations live in [`factory`], lifecycle and stepping in [`stepper`].

mod factory;
mod stepper;

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::DVec3;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    backend::{PhysicsBackend, StepReport},
    config::{RangePolicy, WorldConfig},
    core::{BodyKind, EntityId, JointType, MassProperties, Pose, ShapeType, Velocity},
    dynamics::ConvergenceMonitor,
    error::Result,
    utils::allocator::{Arena, BodyHandle, GeomHandle, JointHandle},
};

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(1);

/// A world behind one lock: factory and stepping calls become mutually
/// exclusive critical sections.
pub type SharedWorld<B> = Arc<Mutex<PhysicsWorld<B>>>;

/// Callback fired with the entity id after its body has been removed.
pub type RemovalListener = Box<dyn FnMut(EntityId) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorldState {
    Uninitialized,
    Initialized,
    /// Collision phase done, physics phase pending.
    Stepping,
    Finalized,
}

impl WorldState {
    pub fn is_running(self) -> bool {
        matches!(self, WorldState::Initialized | WorldState::Stepping)
    }
}

/// Capability to step one world from the thread that created it.
///
/// Not `Send`: it cannot leave the thread whose backend state was prepared by
/// [`PhysicsWorld::init_for_thread`]. It is also bound to one init generation,
/// so tokens issued before a `fini`/`init` cycle stop working.
#[derive(Debug)]
pub struct SteppingToken {
    world: u64,
    generation: u64,
    _thread_bound: PhantomData<*const ()>,
}

impl SteppingToken {
    pub fn world_id(&self) -> u64 {
        self.world
    }
}

/// Live registry sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleCounts {
    pub entities: usize,
    pub bodies: usize,
    pub geoms: usize,
    pub joints: usize,
}

/// Plain pose/velocity/mass record of one body, for external persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodySnapshot {
    pub entity: EntityId,
    pub body: BodyHandle,
    pub kind: BodyKind,
    pub pose: Pose,
    pub velocity: Velocity,
    pub mass: MassProperties,
}

/// A contact point between two registered bodies, normal pointing from A to B.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactPair {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub point: DVec3,
    pub normal: DVec3,
    pub depth: f64,
}

/// Wall-clock time spent in each phase of the last tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseTimes {
    pub collision: Duration,
    pub physics: Duration,
}

struct BodyRecord<B: PhysicsBackend> {
    entity: EntityId,
    native: B::BodyId,
    kind: BodyKind,
    geoms: Vec<GeomHandle>,
    joints: Vec<JointHandle>,
}

struct GeomRecord<B: PhysicsBackend> {
    body: BodyHandle,
    native: B::GeomId,
    shape: ShapeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JointLink {
    Unconnected,
    Connected {
        a: Option<BodyHandle>,
        b: Option<BodyHandle>,
    },
    /// An endpoint body was removed while connected.
    Disconnected,
}

struct JointRecord<B: PhysicsBackend> {
    kind: JointType,
    native: B::JointId,
    link: JointLink,
}

/// Single simulation context owning exactly one backend aggregate.
pub struct PhysicsWorld<B: PhysicsBackend> {
    id: u64,
    backend: B,
    state: WorldState,
    range_policy: RangePolicy,
    config: Option<WorldConfig>,
    pending: Option<WorldConfig>,
    generation: u64,
    bodies: Arena<BodyHandle, BodyRecord<B>>,
    geoms: Arena<GeomHandle, GeomRecord<B>>,
    joints: Arena<JointHandle, JointRecord<B>>,
    entities: HashMap<EntityId, BodyHandle>,
    natives: HashMap<B::BodyId, BodyHandle>,
    sim_time: f64,
    last_tick: Option<Instant>,
    last_tick_wall_time: Duration,
    phase_times: PhaseTimes,
    monitor: ConvergenceMonitor,
    above_tolerance: bool,
    last_report: Option<StepReport>,
    removal_listeners: Vec<RemovalListener>,
}

impl<B: PhysicsBackend + Default> Default for PhysicsWorld<B> {
    fn default() -> Self {
        Self::new(B::default())
    }
}

impl<B: PhysicsBackend> PhysicsWorld<B> {
    pub fn new(backend: B) -> Self {
        Self {
            id: NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed),
            backend,
            state: WorldState::Uninitialized,
            range_policy: RangePolicy::default(),
            config: None,
            pending: None,
            generation: 0,
            bodies: Arena::new(),
            geoms: Arena::new(),
            joints: Arena::new(),
            entities: HashMap::new(),
            natives: HashMap::new(),
            sim_time: 0.0,
            last_tick: None,
            last_tick_wall_time: Duration::ZERO,
            phase_times: PhaseTimes::default(),
            monitor: ConvergenceMonitor::default(),
            above_tolerance: false,
            last_report: None,
            removal_listeners: Vec::new(),
        }
    }

    /// Wraps the world in the shared, locked form.
    pub fn into_shared(self) -> SharedWorld<B> {
        Arc::new(Mutex::new(self))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> WorldState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// The active configuration, once loaded.
    pub fn config(&self) -> Option<&WorldConfig> {
        self.config.as_ref()
    }

    pub fn range_policy(&self) -> RangePolicy {
        self.range_policy
    }

    pub fn set_range_policy(&mut self, policy: RangePolicy) {
        self.range_policy = policy;
    }

    pub fn gravity(&self) -> Option<DVec3> {
        self.config.as_ref().map(|config| config.gravity)
    }

    /// Simulated seconds advanced since `init`.
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// Wall-clock time between the last two physics updates.
    pub fn last_tick_wall_time(&self) -> Duration {
        self.last_tick_wall_time
    }

    pub fn phase_times(&self) -> PhaseTimes {
        self.phase_times
    }

    pub fn last_report(&self) -> Option<StepReport> {
        self.last_report
    }

    pub fn convergence(&self) -> &ConvergenceMonitor {
        &self.monitor
    }

    pub fn rms_error(&self) -> f64 {
        self.monitor.rms_error()
    }

    pub fn rms_error_tolerance(&self) -> f64 {
        self.monitor.rms_error_tolerance()
    }

    /// Same validation as the `rmsErrorTolerance` configuration key.
    pub fn set_rms_error_tolerance(&mut self, tolerance: f64) -> Result<()> {
        let tolerance = crate::config::checked_rms_error_tolerance(tolerance)?;
        self.monitor.set_rms_error_tolerance(tolerance);
        Ok(())
    }

    pub fn set_rms_retention(&mut self, retention: crate::dynamics::Retention) {
        self.monitor.set_retention(retention);
    }

    /// Registers a callback fired whenever an entity's body is removed.
    pub fn on_entity_removed<F>(&mut self, listener: F)
    where
        F: FnMut(EntityId) + Send + 'static,
    {
        self.removal_listeners.push(Box::new(listener));
    }
}

impl<B: PhysicsBackend> Drop for PhysicsWorld<B> {
    fn drop(&mut self) {
        if self.state.is_running() {
            log::debug!("world {} dropped while running; finalizing", self.id);
            self.backend.fini();
        }
    }
}
