//! Core types shared between the world, the object factory, and backends.

pub mod collider;
pub mod constraints;
pub mod types;

pub use collider::{GeomDesc, GeomShape, ShapeType};
pub use constraints::{JointLimits, JointParams, JointState, JointType};
pub use types::{BodyDesc, BodyKind, EntityId, MassProperties, Pose, Velocity};
