use glam::{DMat3, DQuat, DVec3};

use crate::{backend::impulse::NativeBody, utils::math};

/// Semi-implicit Euler: velocities first, then positions with the new velocities.
#[derive(Debug, Clone)]
pub struct Integrator {
    pub gravity: DVec3,
}

impl Integrator {
    pub fn new(gravity: DVec3) -> Self {
        Self { gravity }
    }

    /// Applies gravity and the accumulated force/torque to the body's velocity.
    pub fn integrate_velocity(&self, body: &mut NativeBody, dt: f64) {
        if body.is_static() {
            return;
        }

        let acceleration = self.gravity + body.force * body.mass.inverse_mass;
        body.linear_velocity += acceleration * dt;
        body.angular_velocity += body.inverse_inertia_world() * body.torque * dt;
    }

    /// Moves the centre of mass and rotates the body about it.
    pub fn integrate_position(&self, body: &mut NativeBody, dt: f64) {
        if body.is_static() {
            return;
        }

        let center = body.world_center_of_mass() + body.linear_velocity * dt;
        let delta = math::angular_velocity_to_quat(body.angular_velocity, dt);
        let rotation = (delta * DQuat::from_mat3(&body.transform.basis)).normalize();

        body.transform.basis = DMat3::from_quat(rotation);
        body.transform.origin = center - body.transform.basis * body.mass.center_of_mass;
    }

    pub fn clear_accumulators(body: &mut NativeBody) {
        body.force = DVec3::ZERO;
        body.torque = DVec3::ZERO;
    }
}
