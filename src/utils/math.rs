//! Additional math helpers layered on top of `glam`'s double-precision types.

use glam::{DMat3, DQuat, DVec3};

/// Quaternions whose norm falls below this are treated as undefined orientations.
pub const MIN_QUAT_NORM: f64 = 1e-12;

/// Converts angular velocity (radians/sec) into a rotation delta over `dt`.
pub fn angular_velocity_to_quat(angular: DVec3, dt: f64) -> DQuat {
    let angle = angular.length() * dt;
    if angle.abs() < 1e-12 {
        return DQuat::IDENTITY;
    }
    DQuat::from_axis_angle(angular.normalize(), angle)
}

/// Picks the sign of `q` so that `q` and `-q` map to the same value.
///
/// The first component in `w, x, y, z` order whose magnitude exceeds
/// [`CANONICAL_SIGN_EPSILON`] is made positive, so half-turn rotations with a
/// rounding-noise `w` still resolve to one sign.
pub fn canonical_quat(q: DQuat) -> DQuat {
    for component in [q.w, q.x, q.y, q.z] {
        if component > CANONICAL_SIGN_EPSILON {
            return q;
        }
        if component < -CANONICAL_SIGN_EPSILON {
            return -q;
        }
    }
    q
}

/// Components smaller than this are treated as zero when choosing a quaternion sign.
pub const CANONICAL_SIGN_EPSILON: f64 = 1e-12;

/// Largest absolute difference between `m` and its transpose.
pub fn asymmetry(m: &DMat3) -> f64 {
    let t = m.transpose();
    let d = *m - t;
    d.x_axis
        .abs()
        .max_element()
        .max(d.y_axis.abs().max_element())
        .max(d.z_axis.abs().max_element())
}

/// Eigendecomposition of a symmetric 3x3 matrix by cyclic Jacobi rotations.
///
/// Returns the eigenvalues and a right-handed rotation whose columns are the
/// matching eigenvectors, so `m == axes * diag(values) * axes^T`.
pub fn symmetric_eigen(m: &DMat3) -> (DVec3, DMat3) {
    let mut a = m.to_cols_array_2d();
    let mut v = DMat3::IDENTITY.to_cols_array_2d();

    for _ in 0..32 {
        let off = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        let scale = a[0][0] * a[0][0] + a[1][1] * a[1][1] + a[2][2] * a[2][2];
        if off <= f64::EPSILON * f64::EPSILON * scale.max(f64::MIN_POSITIVE) {
            break;
        }

        for (p, q) in [(0usize, 1usize), (0, 2), (1, 2)] {
            // Column-major storage: a[col][row]; symmetric so either order works.
            let apq = a[q][p];
            if apq == 0.0 {
                continue;
            }
            let theta = (a[q][q] - a[p][p]) / (2.0 * apq);
            let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;

            for k in 0..3 {
                let akp = a[p][k];
                let akq = a[q][k];
                a[p][k] = c * akp - s * akq;
                a[q][k] = s * akp + c * akq;
            }
            for k in 0..3 {
                let apk = a[k][p];
                let aqk = a[k][q];
                a[k][p] = c * apk - s * aqk;
                a[k][q] = s * apk + c * aqk;
            }
            for row in 0..3 {
                let vp = v[p][row];
                let vq = v[q][row];
                v[p][row] = c * vp - s * vq;
                v[q][row] = s * vp + c * vq;
            }
        }
    }

    let values = DVec3::new(a[0][0], a[1][1], a[2][2]);
    let mut axes = DMat3::from_cols_array_2d(&v);
    if axes.determinant() < 0.0 {
        axes.z_axis = -axes.z_axis;
    }
    (values, axes)
}

/// Inertia tensor of a solid sphere.
pub fn inertia_sphere(radius: f64, mass: f64) -> DMat3 {
    DMat3::from_diagonal(DVec3::splat(0.4 * mass * radius * radius))
}

/// Inertia tensor of a solid box with the given half extents.
pub fn inertia_box(half_extents: DVec3, mass: f64) -> DMat3 {
    let l = half_extents * 2.0;
    let factor = mass / 12.0;
    DMat3::from_diagonal(DVec3::new(
        factor * (l.y * l.y + l.z * l.z),
        factor * (l.x * l.x + l.z * l.z),
        factor * (l.x * l.x + l.y * l.y),
    ))
}
