use std::cell::RefCell;

use glam::{DMat3, DVec3};

use crate::config::{CONTACT_SLOP, DEFAULT_FRICTION};

/// Velocity state of one body while the solver runs.
#[derive(Debug, Clone, Copy)]
pub struct SolverBody {
    pub inverse_mass: f64,
    pub inverse_inertia: DMat3,
    pub linear: DVec3,
    pub angular: DVec3,
}

impl SolverBody {
    fn apply(&mut self, linear: DVec3, angular: DVec3, impulse: f64) {
        self.linear += linear * (self.inverse_mass * impulse);
        self.angular += self.inverse_inertia * angular * impulse;
    }
}

/// One scalar velocity constraint `J v >= target` (or `==` for unbounded rows).
///
/// `None` body indices stand for the immovable world frame.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintRow {
    pub body_a: Option<usize>,
    pub body_b: Option<usize>,
    pub linear_a: DVec3,
    pub angular_a: DVec3,
    pub linear_b: DVec3,
    pub angular_b: DVec3,
    pub target: f64,
    pub lower: f64,
    pub upper: f64,
    /// Friction rows take their bounds from the impulse of this normal row.
    pub friction_of: Option<usize>,
    pub impulse: f64,
    effective_mass: f64,
}

impl ConstraintRow {
    /// Row acting on the relative velocity of B with respect to A.
    pub fn new(
        body_a: Option<usize>,
        body_b: Option<usize>,
        linear: DVec3,
        arm_a: DVec3,
        arm_b: DVec3,
        target: f64,
    ) -> Self {
        Self {
            body_a,
            body_b,
            linear_a: -linear,
            angular_a: -arm_a.cross(linear),
            linear_b: linear,
            angular_b: arm_b.cross(linear),
            target,
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
            friction_of: None,
            impulse: 0.0,
            effective_mass: 0.0,
        }
    }

    /// Purely rotational row on the relative angular velocity along `axis`.
    pub fn angular(body_a: Option<usize>, body_b: Option<usize>, axis: DVec3, target: f64) -> Self {
        Self {
            linear_a: DVec3::ZERO,
            angular_a: -axis,
            linear_b: DVec3::ZERO,
            angular_b: axis,
            ..Self::new(body_a, body_b, DVec3::ZERO, DVec3::ZERO, DVec3::ZERO, target)
        }
    }

    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    /// Flips the Jacobian, so the row constrains the negated velocity.
    pub fn negated(mut self) -> Self {
        self.linear_a = -self.linear_a;
        self.angular_a = -self.angular_a;
        self.linear_b = -self.linear_b;
        self.angular_b = -self.angular_b;
        self
    }

    pub fn velocity(&self, bodies: &[SolverBody]) -> f64 {
        let mut jv = 0.0;
        if let Some(a) = self.body_a {
            jv += self.linear_a.dot(bodies[a].linear) + self.angular_a.dot(bodies[a].angular);
        }
        if let Some(b) = self.body_b {
            jv += self.linear_b.dot(bodies[b].linear) + self.angular_b.dot(bodies[b].angular);
        }
        jv
    }
}

/// Reusable per-thread buffers for one solve.
#[derive(Debug, Default)]
pub struct SolverScratch {
    pub bodies: Vec<SolverBody>,
    pub rows: Vec<ConstraintRow>,
}

impl SolverScratch {
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.rows.clear();
    }
}

thread_local! {
    static SCRATCH: RefCell<Option<SolverScratch>> = const { RefCell::new(None) };
}

/// Allocates the calling thread's solver scratch. Idempotent.
pub fn prepare_thread() {
    SCRATCH.with(|scratch| {
        scratch.borrow_mut().get_or_insert_with(SolverScratch::default);
    });
}

pub fn thread_prepared() -> bool {
    SCRATCH.with(|scratch| scratch.borrow().is_some())
}

/// Runs `f` on the calling thread's scratch; `None` if the thread was never prepared.
pub fn with_scratch<R>(f: impl FnOnce(&mut SolverScratch) -> R) -> Option<R> {
    SCRATCH.with(|scratch| {
        let mut slot = scratch.borrow_mut();
        let buffers = slot.as_mut()?;
        buffers.clear();
        Some(f(buffers))
    })
}

/// Outcome of one solve.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolveStats {
    pub residual: f64,
    pub rows: usize,
    pub iterations: u32,
}

/// Projected Gauss-Seidel over velocity rows, softened by CFM.
#[derive(Debug, Clone)]
pub struct SequentialImpulseSolver {
    pub iterations: u32,
    pub cfm: f64,
    pub erp: f64,
    pub friction: f64,
}

impl SequentialImpulseSolver {
    pub fn new(iterations: u32, cfm: f64, erp: f64) -> Self {
        Self {
            iterations,
            cfm,
            erp,
            friction: DEFAULT_FRICTION,
        }
    }

    /// Baumgarte bias velocity that removes `erp` of an error per step.
    pub fn bias(&self, error: f64, dt: f64) -> f64 {
        self.erp * error / dt
    }

    /// Appends one normal row and two friction rows for a contact.
    #[allow(clippy::too_many_arguments)]
    pub fn push_contact(
        &self,
        rows: &mut Vec<ConstraintRow>,
        body_a: Option<usize>,
        body_b: Option<usize>,
        arm_a: DVec3,
        arm_b: DVec3,
        normal: DVec3,
        depth: f64,
        dt: f64,
    ) {
        let target = self.bias((depth - CONTACT_SLOP).max(0.0), dt);
        let normal_index = rows.len();
        rows.push(
            ConstraintRow::new(body_a, body_b, normal, arm_a, arm_b, target)
                .with_bounds(0.0, f64::INFINITY),
        );

        let (t1, t2) = normal.any_orthonormal_pair();
        for tangent in [t1, t2] {
            let mut row = ConstraintRow::new(body_a, body_b, tangent, arm_a, arm_b, 0.0);
            row.friction_of = Some(normal_index);
            rows.push(row.with_bounds(0.0, 0.0));
        }
    }

    /// Iterates over the rows, updating body velocities in place.
    ///
    /// Returns the RMS of the residuals left after the last sweep; rows resting
    /// on an active bound with the residual pushing past it count as satisfied.
    pub fn solve(&self, scratch: &mut SolverScratch, dt: f64) -> SolveStats {
        let SolverScratch { bodies, rows } = scratch;
        let softness = self.cfm / dt;

        for row in rows.iter_mut() {
            let mut k = 0.0;
            if let Some(a) = row.body_a {
                let body = &bodies[a];
                k += body.inverse_mass * row.linear_a.length_squared()
                    + row.angular_a.dot(body.inverse_inertia * row.angular_a);
            }
            if let Some(b) = row.body_b {
                let body = &bodies[b];
                k += body.inverse_mass * row.linear_b.length_squared()
                    + row.angular_b.dot(body.inverse_inertia * row.angular_b);
            }
            row.effective_mass = k;
        }

        for _ in 0..self.iterations {
            for index in 0..rows.len() {
                if let Some(normal) = rows[index].friction_of {
                    let bound = self.friction * rows[normal].impulse;
                    rows[index].lower = -bound;
                    rows[index].upper = bound;
                }
                let row = &mut rows[index];
                let denominator = row.effective_mass + softness;
                if denominator <= 0.0 {
                    continue;
                }
                let jv = row.velocity(bodies);
                let delta = (row.target - jv - softness * row.impulse) / denominator;
                let updated = (row.impulse + delta).clamp(row.lower, row.upper);
                let applied = updated - row.impulse;
                row.impulse = updated;

                if let Some(a) = row.body_a {
                    bodies[a].apply(row.linear_a, row.angular_a, applied);
                }
                if let Some(b) = row.body_b {
                    bodies[b].apply(row.linear_b, row.angular_b, applied);
                }
            }
        }

        SolveStats {
            residual: Self::residual(rows, bodies, softness),
            rows: rows.len(),
            iterations: self.iterations,
        }
    }

    fn residual(rows: &[ConstraintRow], bodies: &[SolverBody], softness: f64) -> f64 {
        if rows.is_empty() {
            return 0.0;
        }
        let sum: f64 = rows
            .iter()
            .map(|row| {
                if row.effective_mass + softness <= 0.0 {
                    return 0.0;
                }
                let error = row.target - row.velocity(bodies) - softness * row.impulse;
                let at_lower = row.impulse <= row.lower && error < 0.0;
                let at_upper = row.impulse >= row.upper && error > 0.0;
                if at_lower || at_upper {
                    0.0
                } else {
                    error * error
                }
            })
            .sum();
        (sum / rows.len() as f64).sqrt()
    }
}
