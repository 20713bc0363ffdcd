//! Constraint rows and read-back for connected joints.

use glam::{DQuat, DVec3};

use super::solver::{ConstraintRow, SequentialImpulseSolver};
use crate::{
    backend::{impulse::{JointFrame, NativeTransform}, NativeJointState},
    core::JointType,
};

/// Pose and velocity of one joint endpoint; the world frame has no index.
#[derive(Debug, Clone, Copy)]
pub struct JointEndpoint {
    pub index: Option<usize>,
    pub transform: NativeTransform,
    pub center_of_mass: DVec3,
    pub linear: DVec3,
    pub angular: DVec3,
}

impl JointEndpoint {
    pub fn world() -> Self {
        Self {
            index: None,
            transform: NativeTransform::IDENTITY,
            center_of_mass: DVec3::ZERO,
            linear: DVec3::ZERO,
            angular: DVec3::ZERO,
        }
    }

    fn rotation(&self) -> DQuat {
        DQuat::from_mat3(&self.transform.basis).normalize()
    }

    fn point_velocity(&self, world: DVec3) -> DVec3 {
        self.linear + self.angular.cross(world - self.center_of_mass)
    }
}

/// World-frame geometry of a joint at the endpoints' current poses.
struct Geometry {
    anchor_a: DVec3,
    anchor_b: DVec3,
    axis_a: DVec3,
    axis_b: DVec3,
    axis2_b: DVec3,
    /// Rotation B has picked up relative to A since attach time, world frame.
    drift: DQuat,
    rotation_error: DVec3,
}

impl Geometry {
    fn measure(frame: &JointFrame, a: &JointEndpoint, b: &JointEndpoint) -> Self {
        let target = a.rotation() * frame.rest_rotation;
        let mut drift = b.rotation() * target.inverse();
        if drift.w < 0.0 {
            drift = -drift;
        }
        Self {
            anchor_a: a.transform.transform_point(frame.anchor_a),
            anchor_b: b.transform.transform_point(frame.anchor_b),
            axis_a: a.transform.transform_vector(frame.axis_a),
            axis_b: b.transform.transform_vector(frame.axis_b),
            axis2_b: b.transform.transform_vector(frame.axis2_b),
            drift,
            rotation_error: 2.0 * DVec3::new(drift.x, drift.y, drift.z),
        }
    }

    /// Signed rotation of B about A's hinge axis.
    fn hinge_angle(&self) -> f64 {
        let along = DVec3::new(self.drift.x, self.drift.y, self.drift.z).dot(self.axis_a);
        2.0 * along.atan2(self.drift.w)
    }
}

fn relative_angular(a: &JointEndpoint, b: &JointEndpoint) -> DVec3 {
    b.angular - a.angular
}

/// Appends the rows for one connected joint.
pub fn push_rows(
    solver: &SequentialImpulseSolver,
    rows: &mut Vec<ConstraintRow>,
    kind: JointType,
    frame: &JointFrame,
    a: &JointEndpoint,
    b: &JointEndpoint,
    dt: f64,
) {
    let geometry = Geometry::measure(frame, a, b);

    match kind {
        JointType::Ball => push_point_rows(solver, rows, &geometry, a, b, dt),
        JointType::Hinge => {
            push_point_rows(solver, rows, &geometry, a, b, dt);
            push_alignment_rows(solver, rows, &geometry, a, b, dt);
            if let Some(limits) = frame.limits {
                let angle = geometry.hinge_angle();
                let axis = geometry.axis_a;
                if angle < limits.lower {
                    rows.push(
                        ConstraintRow::angular(a.index, b.index, axis, solver.bias(limits.lower - angle, dt))
                            .with_bounds(0.0, f64::INFINITY),
                    );
                } else if angle > limits.upper {
                    rows.push(
                        ConstraintRow::angular(a.index, b.index, axis, solver.bias(angle - limits.upper, dt))
                            .negated()
                            .with_bounds(0.0, f64::INFINITY),
                    );
                }
            }
        }
        JointType::Slider => {
            push_rotation_lock(solver, rows, &geometry, a, b, dt);
            let axis = geometry.axis_a;
            let offset = geometry.anchor_b - geometry.anchor_a;
            let arm_a = geometry.anchor_b - a.center_of_mass;
            let arm_b = geometry.anchor_b - b.center_of_mass;
            let (p1, p2) = axis.any_orthonormal_pair();
            for direction in [p1, p2] {
                rows.push(ConstraintRow::new(
                    a.index,
                    b.index,
                    direction,
                    arm_a,
                    arm_b,
                    solver.bias(-offset.dot(direction), dt),
                ));
            }
            if let Some(limits) = frame.limits {
                let position = offset.dot(axis);
                if position < limits.lower {
                    rows.push(
                        ConstraintRow::new(a.index, b.index, axis, arm_a, arm_b, solver.bias(limits.lower - position, dt))
                            .with_bounds(0.0, f64::INFINITY),
                    );
                } else if position > limits.upper {
                    rows.push(
                        ConstraintRow::new(a.index, b.index, axis, arm_a, arm_b, solver.bias(position - limits.upper, dt))
                            .negated()
                            .with_bounds(0.0, f64::INFINITY),
                    );
                }
            }
        }
        JointType::Universal => {
            push_point_rows(solver, rows, &geometry, a, b, dt);
            // Keep A's first axis perpendicular to B's second axis.
            let first = geometry.axis_a;
            let second = geometry.axis2_b;
            let normal = first.cross(second);
            if normal.length_squared() > 1e-12 {
                let error = first.dot(second);
                rows.push(ConstraintRow::angular(
                    a.index,
                    b.index,
                    -normal,
                    solver.bias(-error, dt),
                ));
            }
        }
        JointType::Fixed => {
            push_point_rows(solver, rows, &geometry, a, b, dt);
            push_rotation_lock(solver, rows, &geometry, a, b, dt);
        }
    }
}

/// Three rows pinning B's anchor to A's anchor.
fn push_point_rows(
    solver: &SequentialImpulseSolver,
    rows: &mut Vec<ConstraintRow>,
    geometry: &Geometry,
    a: &JointEndpoint,
    b: &JointEndpoint,
    dt: f64,
) {
    let error = geometry.anchor_b - geometry.anchor_a;
    let arm_a = geometry.anchor_a - a.center_of_mass;
    let arm_b = geometry.anchor_b - b.center_of_mass;
    for axis in [DVec3::X, DVec3::Y, DVec3::Z] {
        rows.push(ConstraintRow::new(
            a.index,
            b.index,
            axis,
            arm_a,
            arm_b,
            solver.bias(-error.dot(axis), dt),
        ));
    }
}

/// Three rows removing all relative rotation.
fn push_rotation_lock(
    solver: &SequentialImpulseSolver,
    rows: &mut Vec<ConstraintRow>,
    geometry: &Geometry,
    a: &JointEndpoint,
    b: &JointEndpoint,
    dt: f64,
) {
    for axis in [DVec3::X, DVec3::Y, DVec3::Z] {
        rows.push(ConstraintRow::angular(
            a.index,
            b.index,
            axis,
            solver.bias(-geometry.rotation_error.dot(axis), dt),
        ));
    }
}

/// Two rows keeping B's hinge axis parallel to A's.
fn push_alignment_rows(
    solver: &SequentialImpulseSolver,
    rows: &mut Vec<ConstraintRow>,
    geometry: &Geometry,
    a: &JointEndpoint,
    b: &JointEndpoint,
    dt: f64,
) {
    let misalignment = geometry.axis_b.cross(geometry.axis_a);
    let (p1, p2) = geometry.axis_a.any_orthonormal_pair();
    for axis in [p1, p2] {
        rows.push(ConstraintRow::angular(
            a.index,
            b.index,
            axis,
            solver.bias(misalignment.dot(axis), dt),
        ));
    }
}

/// Reads the joint's current anchor, axis, coordinate and rate.
pub fn measure(kind: JointType, frame: &JointFrame, a: &JointEndpoint, b: &JointEndpoint) -> NativeJointState {
    let geometry = Geometry::measure(frame, a, b);
    let separation = geometry.anchor_b - geometry.anchor_a;

    let (axis, position, rate, anchor_error) = match kind {
        JointType::Hinge => (
            geometry.axis_a,
            geometry.hinge_angle(),
            relative_angular(a, b).dot(geometry.axis_a),
            separation.length(),
        ),
        JointType::Slider => {
            let axis = geometry.axis_a;
            let along = separation.dot(axis);
            let rate = (b.point_velocity(geometry.anchor_b) - a.point_velocity(geometry.anchor_b))
                .dot(axis);
            (axis, along, rate, (separation - axis * along).length())
        }
        JointType::Universal => (geometry.axis_a, 0.0, 0.0, separation.length()),
        JointType::Ball | JointType::Fixed => (DVec3::ZERO, 0.0, 0.0, separation.length()),
    };

    NativeJointState {
        anchor: geometry.anchor_a,
        axis,
        position,
        rate,
        anchor_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::solver::{SolverBody, SolverScratch};
    use approx::assert_abs_diff_eq;
    use glam::DMat3;

    fn frame(anchor_b: DVec3) -> JointFrame {
        JointFrame {
            body_a: None,
            body_b: None,
            anchor_a: DVec3::ZERO,
            anchor_b,
            axis_a: DVec3::Z,
            axis_b: DVec3::Z,
            axis2_b: DVec3::X,
            rest_rotation: DQuat::IDENTITY,
            limits: None,
        }
    }

    fn body_at(position: DVec3, rotation: DQuat) -> JointEndpoint {
        JointEndpoint {
            index: Some(0),
            transform: NativeTransform::from_rotation_translation(rotation, position),
            center_of_mass: position,
            linear: DVec3::ZERO,
            angular: DVec3::ZERO,
        }
    }

    #[test]
    fn hinge_reports_rotation_about_its_axis() {
        let hinge = frame(DVec3::ZERO);
        let b = body_at(DVec3::ZERO, DQuat::from_rotation_z(0.4));
        let state = measure(JointType::Hinge, &hinge, &JointEndpoint::world(), &b);
        assert_abs_diff_eq!(state.position, 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(state.anchor_error, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn slider_separates_along_and_across_axis() {
        let slider = frame(DVec3::ZERO);
        let b = body_at(DVec3::new(0.1, 0.0, 0.7), DQuat::IDENTITY);
        let state = measure(JointType::Slider, &slider, &JointEndpoint::world(), &b);
        assert_abs_diff_eq!(state.position, 0.7, epsilon = 1e-12);
        assert_abs_diff_eq!(state.anchor_error, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn ball_rows_pull_anchor_back() {
        let solver = SequentialImpulseSolver::new(20, 1e-10, 0.5);
        let ball = frame(DVec3::ZERO);
        let b = body_at(DVec3::new(0.0, 0.0, -0.1), DQuat::IDENTITY);
        let mut scratch = SolverScratch::default();
        scratch.bodies.push(SolverBody {
            inverse_mass: 1.0,
            inverse_inertia: DMat3::IDENTITY,
            linear: DVec3::ZERO,
            angular: DVec3::ZERO,
        });
        push_rows(&solver, &mut scratch.rows, JointType::Ball, &ball, &JointEndpoint::world(), &b, 0.1);
        assert_eq!(scratch.rows.len(), 3);
        solver.solve(&mut scratch, 0.1);
        // ERP 0.5 over one step of 0.1 s: half of the 0.1 m error per step.
        assert_abs_diff_eq!(scratch.bodies[0].linear.z, 0.5, epsilon = 1e-6);
    }
}
