use std::fmt;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};
use crate::utils::allocator::BodyHandle;

/// Closed set of joint kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointType {
    /// Shared anchor point, free rotation.
    Ball,
    /// Shared anchor, rotation about one axis.
    Hinge,
    /// Translation along one axis, no rotation.
    Slider,
    /// Shared anchor, rotation about two perpendicular axes.
    Universal,
    /// No relative motion.
    Fixed,
}

impl JointType {
    /// Whether `JointParams::axis` is meaningful.
    pub fn uses_axis(self) -> bool {
        matches!(
            self,
            JointType::Hinge | JointType::Slider | JointType::Universal
        )
    }

    /// Whether `JointParams::limits` is honoured.
    pub fn supports_limits(self) -> bool {
        matches!(self, JointType::Hinge | JointType::Slider)
    }
}

impl fmt::Display for JointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JointType::Ball => "ball",
            JointType::Hinge => "hinge",
            JointType::Slider => "slider",
            JointType::Universal => "universal",
            JointType::Fixed => "fixed",
        };
        f.write_str(name)
    }
}

/// Lower/upper bound on the joint coordinate (radians for hinges, metres for sliders).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimits {
    pub lower: f64,
    pub upper: f64,
}

impl JointLimits {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }
}

/// Endpoint-independent joint geometry, expressed in the world frame at attach time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointParams {
    pub anchor: DVec3,
    pub axis: DVec3,
    /// Second axis, used by universal joints only.
    pub axis2: DVec3,
    pub limits: Option<JointLimits>,
}

impl Default for JointParams {
    fn default() -> Self {
        Self {
            anchor: DVec3::ZERO,
            axis: DVec3::Z,
            axis2: DVec3::X,
            limits: None,
        }
    }
}

impl JointParams {
    pub fn at(anchor: DVec3) -> Self {
        Self {
            anchor,
            ..Self::default()
        }
    }

    pub fn with_axis(mut self, axis: DVec3) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_axis2(mut self, axis2: DVec3) -> Self {
        self.axis2 = axis2;
        self
    }

    pub fn with_limits(mut self, lower: f64, upper: f64) -> Self {
        self.limits = Some(JointLimits::new(lower, upper));
        self
    }

    pub fn validate(&self, kind: JointType) -> Result<()> {
        if !self.anchor.is_finite() {
            return Err(PhysicsError::InvalidGeometry(
                "joint anchor is not finite".to_string(),
            ));
        }
        if kind.uses_axis() && (!self.axis.is_finite() || self.axis.length() < 1e-12) {
            return Err(PhysicsError::InvalidGeometry(format!(
                "{kind} joint needs a finite non-zero axis"
            )));
        }
        if kind == JointType::Universal {
            if !self.axis2.is_finite() || self.axis2.length() < 1e-12 {
                return Err(PhysicsError::InvalidGeometry(
                    "universal joint needs a finite non-zero second axis".to_string(),
                ));
            }
            if self.axis.normalize().cross(self.axis2.normalize()).length() < 1e-6 {
                return Err(PhysicsError::InvalidGeometry(
                    "universal joint axes must not be parallel".to_string(),
                ));
            }
        }
        if let Some(limits) = self.limits {
            if !kind.supports_limits() {
                return Err(PhysicsError::InvalidGeometry(format!(
                    "{kind} joints do not take limits"
                )));
            }
            if !(limits.lower.is_finite() && limits.upper.is_finite())
                || limits.lower > limits.upper
            {
                return Err(PhysicsError::InvalidGeometry(format!(
                    "joint limits must be finite and ordered, got {}..{}",
                    limits.lower, limits.upper
                )));
            }
        }
        Ok(())
    }
}

/// Snapshot of a connected joint read back from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointState {
    pub kind: JointType,
    /// `None` means the static world frame.
    pub body_a: Option<BodyHandle>,
    pub body_b: Option<BodyHandle>,
    /// Anchor as seen from body A, world frame.
    pub anchor: DVec3,
    /// Primary axis as seen from body A, world frame. Zero for ball and fixed joints.
    pub axis: DVec3,
    /// Joint coordinate: hinge angle or slider displacement, zero otherwise.
    pub position: f64,
    /// Time derivative of `position`.
    pub rate: f64,
    /// Distance between the anchors as seen from each body.
    pub anchor_error: f64,
}
