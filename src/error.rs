//! Error taxonomy shared by the world, the factory, and every backend.

use thiserror::Error;

use crate::core::EntityId;
use crate::utils::allocator::{BodyHandle, GeomHandle, JointHandle};

/// Errors reported synchronously to the caller.
///
/// Contract violations never leave the world in a partially mutated state: a
/// rejected call can be followed by further stepping.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("unsupported shape: {0}")]
    UnsupportedShape(String),

    #[error("entity {0:?} already owns a body")]
    DuplicateBody(EntityId),

    #[error("body {0:?} is not registered")]
    InvalidBody(BodyHandle),

    #[error("geom {0:?} is not registered")]
    InvalidGeom(GeomHandle),

    #[error("joint {0:?} is not registered")]
    InvalidJoint(JointHandle),

    #[error("joint {0:?} is disconnected: {1}")]
    DisconnectedJoint(JointHandle, &'static str),

    #[error("engine is not running")]
    EngineNotRunning,

    #[error("engine is already initialized")]
    AlreadyInitialized,

    #[error("engine configuration was never loaded")]
    NotLoaded,

    #[error("calling thread has no stepping capability for this world")]
    ThreadNotInitialized,

    #[error("backend solver failure: {0}")]
    SolverFailure(String),
}

impl PhysicsError {
    /// True for errors caused by the caller using a lifecycle operation out of order.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            PhysicsError::EngineNotRunning
                | PhysicsError::AlreadyInitialized
                | PhysicsError::NotLoaded
                | PhysicsError::ThreadNotInitialized
        )
    }
}

/// Result type for physics bridge operations.
pub type Result<T> = std::result::Result<T, PhysicsError>;
