//! Utility helpers: math extensions, handle allocation, and logging.

pub mod allocator;
pub mod logging;
pub mod math;

pub use allocator::{Arena, ArenaKey, BodyHandle, GenerationalId, GeomHandle, JointHandle};
pub use math::*;
