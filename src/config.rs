//! World configuration: defaults, the raw parameter node, and validation.
//!
//! Parameters arrive from the `<physics>` block of a world description as an
//! already-parsed node. They are validated once into a [`WorldConfig`]; the
//! same path is used for reconfiguration while the world is running.

use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;

use glam::DVec3;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};

/// Default gravity vector applied in the physics world (Z-up).
pub const DEFAULT_GRAVITY: [f64; 3] = [0.0, 0.0, -9.8];

/// Default integration timestep (in seconds).
pub const DEFAULT_STEP_TIME: f64 = 0.025;

/// Largest accepted integration timestep (in seconds).
pub const MAX_STEP_TIME: f64 = 1.0;

/// Default global constraint force mixing.
pub const DEFAULT_CFM: f64 = 1e-5;

/// Accepted constraint force mixing values.
pub const CFM_RANGE: RangeInclusive<f64> = 1e-10..=1.0;

/// Default global error reduction parameter.
pub const DEFAULT_ERP: f64 = 0.2;

/// Accepted error reduction values.
pub const ERP_RANGE: RangeInclusive<f64> = 0.0..=1.0;

/// Default acceptable RMS solver residual.
pub const DEFAULT_RMS_ERROR_TOLERANCE: f64 = 1e-3;

/// Default number of residual samples retained by the convergence monitor.
pub const DEFAULT_RMS_ERROR_WINDOW: usize = 1024;

/// Number of constraint solver iterations performed per step.
pub const DEFAULT_SOLVER_ITERATIONS: u32 = 20;

/// Accepted solver iteration counts.
pub const SOLVER_ITERATION_RANGE: RangeInclusive<u32> = 1..=1000;

/// Default cell size for the broad-phase uniform grid.
pub const DEFAULT_BROADPHASE_CELL_SIZE: f64 = 2.0;

/// Coulomb friction coefficient used for every contact.
pub const DEFAULT_FRICTION: f64 = 0.5;

/// Penetration tolerated before ERP starts pushing bodies apart.
pub const CONTACT_SLOP: f64 = 1e-3;

/// What to do with a finite value outside its documented range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RangePolicy {
    /// Fail with [`PhysicsError::Configuration`].
    #[default]
    Reject,
    /// Clamp to the nearest bound and log a warning.
    Clamp,
}

/// Source of textual key/value pairs, e.g. the children of a `<physics>` element.
pub trait ConfigNode {
    fn value(&self, key: &str) -> Option<&str>;
}

impl ConfigNode for HashMap<String, String> {
    fn value(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

impl ConfigNode for BTreeMap<String, String> {
    fn value(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

impl ConfigNode for [(&str, &str)] {
    fn value(&self, key: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }
}

/// Raw, unvalidated physics parameters. Absent fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhysicsParams {
    pub step_time: Option<f64>,
    pub gravity: Option<[f64; 3]>,
    pub cfm: Option<f64>,
    pub erp: Option<f64>,
    pub rms_error_tolerance: Option<f64>,
    pub rms_error_window: Option<usize>,
    pub solver_iterations: Option<u32>,
}

impl PhysicsParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step_time(mut self, step_time: f64) -> Self {
        self.step_time = Some(step_time);
        self
    }

    pub fn with_gravity(mut self, gravity: [f64; 3]) -> Self {
        self.gravity = Some(gravity);
        self
    }

    pub fn with_cfm(mut self, cfm: f64) -> Self {
        self.cfm = Some(cfm);
        self
    }

    pub fn with_erp(mut self, erp: f64) -> Self {
        self.erp = Some(erp);
        self
    }

    pub fn with_rms_error_tolerance(mut self, tolerance: f64) -> Self {
        self.rms_error_tolerance = Some(tolerance);
        self
    }

    pub fn with_rms_error_window(mut self, window: usize) -> Self {
        self.rms_error_window = Some(window);
        self
    }

    pub fn with_solver_iterations(mut self, iterations: u32) -> Self {
        self.solver_iterations = Some(iterations);
        self
    }

    /// Reads the recognized keys from a textual node.
    ///
    /// `gravity` is three whitespace-separated floats. Unknown keys are ignored.
    pub fn from_node<N: ConfigNode + ?Sized>(node: &N) -> Result<Self> {
        Ok(Self {
            step_time: parse_scalar(node, "stepTime")?,
            gravity: match node.value("gravity") {
                Some(text) => Some(parse_vector(text)?),
                None => None,
            },
            cfm: parse_scalar(node, "cfm")?,
            erp: parse_scalar(node, "erp")?,
            rms_error_tolerance: parse_scalar(node, "rmsErrorTolerance")?,
            rms_error_window: parse_scalar(node, "rmsErrorWindow")?,
            solver_iterations: parse_scalar(node, "solverIterations")?,
        })
    }
}

fn parse_scalar<N, T>(node: &N, key: &str) -> Result<Option<T>>
where
    N: ConfigNode + ?Sized,
    T: std::str::FromStr,
{
    match node.value(key) {
        Some(text) => text.trim().parse::<T>().map(Some).map_err(|_| {
            PhysicsError::Configuration(format!("`{key}` is not a valid number: `{text}`"))
        }),
        None => Ok(None),
    }
}

fn parse_vector(text: &str) -> Result<[f64; 3]> {
    let values = text
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| PhysicsError::Configuration(format!("`gravity` is malformed: `{text}`")))?;
    match values.as_slice() {
        [x, y, z] => Ok([*x, *y, *z]),
        _ => Err(PhysicsError::Configuration(format!(
            "`gravity` needs three components, got {}",
            values.len()
        ))),
    }
}

/// Validated global solver parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    pub gravity: DVec3,
    pub cfm: f64,
    pub erp: f64,
    pub step_time: f64,
    pub rms_error_tolerance: f64,
    pub rms_error_window: usize,
    pub solver_iterations: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: DVec3::from_array(DEFAULT_GRAVITY),
            cfm: DEFAULT_CFM,
            erp: DEFAULT_ERP,
            step_time: DEFAULT_STEP_TIME,
            rms_error_tolerance: DEFAULT_RMS_ERROR_TOLERANCE,
            rms_error_window: DEFAULT_RMS_ERROR_WINDOW,
            solver_iterations: DEFAULT_SOLVER_ITERATIONS,
        }
    }
}

impl WorldConfig {
    /// Validates `params` against the documented ranges.
    pub fn from_params(params: &PhysicsParams, policy: RangePolicy) -> Result<Self> {
        let defaults = Self::default();

        let gravity = match params.gravity {
            Some(g) => {
                let gravity = DVec3::from_array(g);
                if !gravity.is_finite() {
                    return Err(PhysicsError::Configuration(format!(
                        "`gravity` must be finite, got {gravity}"
                    )));
                }
                gravity
            }
            None => defaults.gravity,
        };

        let cfm = match params.cfm {
            Some(v) => bounded("cfm", v, CFM_RANGE, policy)?,
            None => defaults.cfm,
        };
        let erp = match params.erp {
            Some(v) => bounded("erp", v, ERP_RANGE, policy)?,
            None => defaults.erp,
        };
        let step_time = match params.step_time {
            Some(v) if v.is_finite() && v <= 0.0 => {
                return Err(PhysicsError::Configuration(format!(
                    "`stepTime` must be positive, got {v}"
                )))
            }
            Some(v) => bounded("stepTime", v, f64::MIN_POSITIVE..=MAX_STEP_TIME, policy)?,
            None => defaults.step_time,
        };
        let rms_error_tolerance = match params.rms_error_tolerance {
            Some(v) => checked_rms_error_tolerance(v)?,
            None => defaults.rms_error_tolerance,
        };
        let rms_error_window = match params.rms_error_window {
            Some(0) => match policy {
                RangePolicy::Reject => {
                    return Err(PhysicsError::Configuration(
                        "`rmsErrorWindow` must hold at least one sample".to_string(),
                    ))
                }
                RangePolicy::Clamp => {
                    warn!("clamping `rmsErrorWindow` from 0 to 1");
                    1
                }
            },
            Some(v) => v,
            None => defaults.rms_error_window,
        };
        let solver_iterations = match params.solver_iterations {
            Some(v) if SOLVER_ITERATION_RANGE.contains(&v) => v,
            Some(v) => match policy {
                RangePolicy::Reject => {
                    return Err(PhysicsError::Configuration(format!(
                        "`solverIterations` must be within {SOLVER_ITERATION_RANGE:?}, got {v}"
                    )))
                }
                RangePolicy::Clamp => {
                    let clamped =
                        v.clamp(*SOLVER_ITERATION_RANGE.start(), *SOLVER_ITERATION_RANGE.end());
                    warn!("clamping `solverIterations` from {v} to {clamped}");
                    clamped
                }
            },
            None => defaults.solver_iterations,
        };

        Ok(Self {
            gravity,
            cfm,
            erp,
            step_time,
            rms_error_tolerance,
            rms_error_window,
            solver_iterations,
        })
    }

    /// The raw node that would validate back into this config.
    pub fn to_params(&self) -> PhysicsParams {
        PhysicsParams {
            step_time: Some(self.step_time),
            gravity: Some(self.gravity.to_array()),
            cfm: Some(self.cfm),
            erp: Some(self.erp),
            rms_error_tolerance: Some(self.rms_error_tolerance),
            rms_error_window: Some(self.rms_error_window),
            solver_iterations: Some(self.solver_iterations),
        }
    }
}

/// Tolerances must be positive and finite wherever they are set.
pub(crate) fn checked_rms_error_tolerance(value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(PhysicsError::Configuration(format!(
            "`rmsErrorTolerance` must be positive and finite, got {value}"
        )))
    }
}

fn bounded(key: &str, value: f64, range: RangeInclusive<f64>, policy: RangePolicy) -> Result<f64> {
    if !value.is_finite() {
        return Err(PhysicsError::Configuration(format!(
            "`{key}` must be finite, got {value}"
        )));
    }
    if range.contains(&value) {
        return Ok(value);
    }
    match policy {
        RangePolicy::Reject => Err(PhysicsError::Configuration(format!(
            "`{key}` = {value} is outside {}..={}",
            range.start(),
            range.end()
        ))),
        RangePolicy::Clamp => {
            let clamped = value.clamp(*range.start(), *range.end());
            warn!("clamping `{key}` from {value} to {clamped}");
            Ok(clamped)
        }
    }
}
