//! Collision detection for the impulse backend: broad-phase grid, primitive narrow-phase, contact cache.

pub mod broadphase;
pub mod contact;
pub mod narrowphase;

pub use broadphase::{BroadPhase, Proxy};
pub use contact::{ContactCache, ContactPoint};
pub use narrowphase::NarrowPhase;
