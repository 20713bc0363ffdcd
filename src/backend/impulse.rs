//! In-tree reference backend: uniform-grid broadphase, primitive narrowphase,
//! and a sequential-impulse solver honouring CFM and ERP.
//!
//! Supports sphere, box, capsule and plane geoms. Everything it owns lives in
//! one value, so several worlds can each hold their own instance.

mod native;

use std::collections::HashMap;

use glam::{DMat3, DVec3};
use log::debug;

pub use native::{
    JointFrame, NativeBody, NativeBodyId, NativeGeom, NativeGeomId, NativeJoint, NativeJointId,
    NativeMass, NativeTransform,
};

use super::{
    CollisionReport, NativeContact, NativeJointState, ObjectCounts, PhysicsBackend, StepReport,
};
use crate::{
    collision::{BroadPhase, ContactCache, NarrowPhase, Proxy},
    config::{WorldConfig, DEFAULT_BROADPHASE_CELL_SIZE},
    core::{BodyKind, GeomShape, JointParams, JointType, MassProperties, Pose, ShapeType, Velocity},
    dynamics::{
        joints::{self, JointEndpoint},
        solver, Integrator, SequentialImpulseSolver, SolverBody, SolverScratch,
    },
    error::{PhysicsError, Result},
    utils::allocator::Arena,
};

pub struct ImpulseBackend {
    bodies: Arena<NativeBodyId, NativeBody>,
    geoms: Arena<NativeGeomId, NativeGeom>,
    joints: Arena<NativeJointId, NativeJoint>,
    broadphase: BroadPhase,
    contacts: ContactCache,
    solver: SequentialImpulseSolver,
    integrator: Integrator,
}

impl Default for ImpulseBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ImpulseBackend {
    pub fn new() -> Self {
        let config = WorldConfig::default();
        Self {
            bodies: Arena::new(),
            geoms: Arena::new(),
            joints: Arena::new(),
            broadphase: BroadPhase::new(DEFAULT_BROADPHASE_CELL_SIZE),
            contacts: ContactCache::new(),
            solver: SequentialImpulseSolver::new(config.solver_iterations, config.cfm, config.erp),
            integrator: Integrator::new(config.gravity),
        }
    }

    fn endpoint(
        &self,
        body: Option<NativeBodyId>,
        index: &HashMap<NativeBodyId, usize>,
    ) -> Option<JointEndpoint> {
        let Some(id) = body else {
            return Some(JointEndpoint::world());
        };
        let body = self.bodies.get(id)?;
        Some(JointEndpoint {
            index: index.get(&id).copied(),
            transform: body.transform,
            center_of_mass: body.world_center_of_mass(),
            linear: body.linear_velocity,
            angular: body.angular_velocity,
        })
    }

    fn transform_of(&self, body: Option<NativeBodyId>) -> Result<NativeTransform> {
        match body {
            None => Ok(NativeTransform::IDENTITY),
            Some(id) => self
                .bodies
                .get(id)
                .map(|body| body.transform)
                .ok_or_else(|| PhysicsError::InvalidGeometry(format!("unknown native body {id}"))),
        }
    }

    fn solve_step(&mut self, scratch: &mut SolverScratch, dt: f64) -> Result<StepReport> {
        let saved: Vec<_> = self
            .bodies
            .iter()
            .filter(|(_, body)| !body.is_static())
            .map(|(id, body)| (id, body.transform, body.linear_velocity, body.angular_velocity))
            .collect();

        let mut index = HashMap::new();
        for (id, body) in self.bodies.iter_mut() {
            if body.is_static() {
                continue;
            }
            self.integrator.integrate_velocity(body, dt);
            index.insert(id, scratch.bodies.len());
            scratch.bodies.push(SolverBody {
                inverse_mass: body.mass.inverse_mass,
                inverse_inertia: body.inverse_inertia_world(),
                linear: body.linear_velocity,
                angular: body.angular_velocity,
            });
        }

        for contact in self.contacts.as_slice() {
            let (Some(a), Some(b)) = (
                self.bodies.get(contact.body_a),
                self.bodies.get(contact.body_b),
            ) else {
                continue;
            };
            let ia = index.get(&contact.body_a).copied();
            let ib = index.get(&contact.body_b).copied();
            if ia.is_none() && ib.is_none() {
                continue;
            }
            self.solver.push_contact(
                &mut scratch.rows,
                ia,
                ib,
                contact.point - a.world_center_of_mass(),
                contact.point - b.world_center_of_mass(),
                contact.normal,
                contact.depth,
                dt,
            );
        }

        for (_, joint) in self.joints.iter() {
            let Some(frame) = joint.frame else { continue };
            let (Some(a), Some(b)) = (
                self.endpoint(frame.body_a, &index),
                self.endpoint(frame.body_b, &index),
            ) else {
                continue;
            };
            joints::push_rows(&self.solver, &mut scratch.rows, joint.kind, &frame, &a, &b, dt);
        }

        let stats = self.solver.solve(scratch, dt);

        let mut diverged = !stats.residual.is_finite();
        for (id, &slot) in &index {
            if let Some(body) = self.bodies.get_mut(*id) {
                body.linear_velocity = scratch.bodies[slot].linear;
                body.angular_velocity = scratch.bodies[slot].angular;
                self.integrator.integrate_position(body, dt);
                diverged |= !(body.transform.origin.is_finite()
                    && body.transform.basis.is_finite()
                    && body.linear_velocity.is_finite()
                    && body.angular_velocity.is_finite());
            }
        }

        for (_, body) in self.bodies.iter_mut() {
            Integrator::clear_accumulators(body);
        }

        if diverged {
            for (id, transform, linear, angular) in saved {
                if let Some(body) = self.bodies.get_mut(id) {
                    body.transform = transform;
                    body.linear_velocity = linear;
                    body.angular_velocity = angular;
                }
            }
            return Err(PhysicsError::SolverFailure(format!(
                "body state became non-finite after solving {} rows",
                stats.rows
            )));
        }

        Ok(StepReport {
            residual: stats.residual,
            constraint_rows: stats.rows,
            contacts: self.contacts.len(),
            iterations: stats.iterations,
        })
    }
}

impl PhysicsBackend for ImpulseBackend {
    type NativePose = NativeTransform;
    type NativeMass = NativeMass;
    type BodyId = NativeBodyId;
    type GeomId = NativeGeomId;
    type JointId = NativeJointId;

    fn name(&self) -> &str {
        "impulse"
    }

    fn pose_to_native(pose: &Pose) -> Result<NativeTransform> {
        pose.validate()?;
        Ok(NativeTransform::from_rotation_translation(
            pose.rotation(),
            pose.position(),
        ))
    }

    fn pose_from_native(native: &NativeTransform) -> Pose {
        Pose::new(native.origin, native.rotation())
    }

    fn mass_to_native(mass: &MassProperties) -> Result<NativeMass> {
        let (moments, axes) = mass.validate()?;
        let inverse_mass = mass.mass.recip();
        if !inverse_mass.is_finite() || !moments.recip().is_finite() {
            return Err(PhysicsError::InvalidGeometry(format!(
                "mass {} is too small to invert",
                mass.mass
            )));
        }
        Ok(NativeMass {
            inverse_mass,
            center_of_mass: mass.center_of_mass,
            principal_inertia: moments,
            principal_axes: axes,
        })
    }

    fn mass_from_native(native: &NativeMass) -> MassProperties {
        let axes = native.principal_axes;
        let tensor = axes * DMat3::from_diagonal(native.principal_inertia) * axes.transpose();
        // Rebuild exactly symmetric; the product above can differ in the last bit.
        let inertia = (tensor + tensor.transpose()) * 0.5;
        MassProperties::new(native.inverse_mass.recip(), native.center_of_mass, inertia)
    }

    fn init(&mut self, config: &WorldConfig) -> Result<()> {
        self.fini();
        self.apply_config(config);
        debug!(
            "impulse backend ready: {} solver iterations, cfm {}, erp {}",
            config.solver_iterations, config.cfm, config.erp
        );
        Ok(())
    }

    fn init_for_thread(&self) -> Result<()> {
        solver::prepare_thread();
        Ok(())
    }

    fn apply_config(&mut self, config: &WorldConfig) {
        self.solver.iterations = config.solver_iterations;
        self.solver.cfm = config.cfm;
        self.solver.erp = config.erp;
        self.integrator.gravity = config.gravity;
    }

    fn fini(&mut self) {
        self.joints.clear();
        self.geoms.clear();
        self.bodies.clear();
        self.contacts.clear();
    }

    fn supports_shape(&self, shape: ShapeType) -> bool {
        matches!(
            shape,
            ShapeType::Sphere | ShapeType::Box | ShapeType::Capsule | ShapeType::Plane
        )
    }

    fn create_body(
        &mut self,
        kind: BodyKind,
        pose: NativeTransform,
        mass: NativeMass,
        velocity: Velocity,
    ) -> Result<NativeBodyId> {
        let (linear_velocity, angular_velocity) = match kind {
            BodyKind::Dynamic => (velocity.linear, velocity.angular),
            BodyKind::Static => (DVec3::ZERO, DVec3::ZERO),
        };
        Ok(self.bodies.insert(NativeBody {
            kind,
            transform: pose,
            mass,
            linear_velocity,
            angular_velocity,
            force: DVec3::ZERO,
            torque: DVec3::ZERO,
            geoms: Vec::new(),
        }))
    }

    fn destroy_body(&mut self, body: NativeBodyId) {
        let Some(removed) = self.bodies.remove(body) else {
            return;
        };
        for geom in removed.geoms {
            self.geoms.remove(geom);
        }
        for (_, joint) in self.joints.iter_mut() {
            let touches = joint
                .frame
                .is_some_and(|frame| frame.body_a == Some(body) || frame.body_b == Some(body));
            if touches {
                joint.frame = None;
            }
        }
        self.contacts.forget_body(body);
    }

    fn create_geom(
        &mut self,
        body: NativeBodyId,
        shape: &GeomShape,
        offset: NativeTransform,
    ) -> Result<NativeGeomId> {
        let kind = shape.shape_type();
        if !self.supports_shape(kind) {
            return Err(PhysicsError::UnsupportedShape(format!(
                "the impulse backend has no {kind} collider"
            )));
        }
        let owner = self
            .bodies
            .get(body)
            .ok_or_else(|| PhysicsError::InvalidGeometry(format!("unknown native body {body}")))?;
        if kind == ShapeType::Plane && !owner.is_static() {
            return Err(PhysicsError::InvalidGeometry(
                "plane geoms can only be attached to static bodies".to_string(),
            ));
        }

        let geom = self.geoms.insert(NativeGeom {
            body,
            shape: shape.clone(),
            offset,
        });
        if let Some(owner) = self.bodies.get_mut(body) {
            owner.geoms.push(geom);
        }
        Ok(geom)
    }

    fn destroy_geom(&mut self, geom: NativeGeomId) {
        if let Some(removed) = self.geoms.remove(geom) {
            if let Some(owner) = self.bodies.get_mut(removed.body) {
                owner.geoms.retain(|id| *id != geom);
            }
        }
    }

    fn create_joint(&mut self, kind: JointType) -> Result<NativeJointId> {
        Ok(self.joints.insert(NativeJoint { kind, frame: None }))
    }

    fn attach_joint(
        &mut self,
        joint: NativeJointId,
        body_a: Option<NativeBodyId>,
        body_b: Option<NativeBodyId>,
        params: &JointParams,
    ) -> Result<()> {
        if body_a == body_b {
            return Err(PhysicsError::InvalidGeometry(
                "joint endpoints must be two different bodies".to_string(),
            ));
        }
        let ta = self.transform_of(body_a)?;
        let tb = self.transform_of(body_b)?;

        let axis = params.axis.try_normalize().unwrap_or(DVec3::Z);
        let axis2 = params.axis2.try_normalize().unwrap_or(DVec3::X);
        let qa = ta.rotation();
        let qb = tb.rotation();
        let frame = JointFrame {
            body_a,
            body_b,
            anchor_a: ta.inverse_transform_point(params.anchor),
            anchor_b: tb.inverse_transform_point(params.anchor),
            axis_a: ta.inverse_transform_vector(axis),
            axis_b: tb.inverse_transform_vector(axis),
            axis2_b: tb.inverse_transform_vector(axis2),
            rest_rotation: qa.inverse() * qb,
            limits: params.limits,
        };

        let target = self
            .joints
            .get_mut(joint)
            .ok_or_else(|| PhysicsError::InvalidGeometry(format!("unknown native joint {joint}")))?;
        target.frame = Some(frame);
        Ok(())
    }

    fn detach_joint(&mut self, joint: NativeJointId) {
        if let Some(joint) = self.joints.get_mut(joint) {
            joint.frame = None;
        }
    }

    fn destroy_joint(&mut self, joint: NativeJointId) {
        self.joints.remove(joint);
    }

    fn body_pose(&self, body: NativeBodyId) -> Option<NativeTransform> {
        self.bodies.get(body).map(|body| body.transform)
    }

    fn set_body_pose(&mut self, body: NativeBodyId, pose: NativeTransform) -> bool {
        match self.bodies.get_mut(body) {
            Some(body) => {
                body.transform = pose;
                true
            }
            None => false,
        }
    }

    fn body_velocity(&self, body: NativeBodyId) -> Option<Velocity> {
        self.bodies
            .get(body)
            .map(|body| Velocity::new(body.linear_velocity, body.angular_velocity))
    }

    fn set_body_velocity(&mut self, body: NativeBodyId, velocity: Velocity) -> bool {
        match self.bodies.get_mut(body) {
            Some(body) if body.is_static() => true,
            Some(body) => {
                body.linear_velocity = velocity.linear;
                body.angular_velocity = velocity.angular;
                true
            }
            None => false,
        }
    }

    fn body_mass(&self, body: NativeBodyId) -> Option<NativeMass> {
        self.bodies.get(body).map(|body| body.mass)
    }

    fn set_body_mass(&mut self, body: NativeBodyId, mass: NativeMass) -> bool {
        match self.bodies.get_mut(body) {
            Some(body) => {
                body.mass = mass;
                true
            }
            None => false,
        }
    }

    fn apply_force(&mut self, body: NativeBodyId, force: DVec3, torque: DVec3) -> bool {
        match self.bodies.get_mut(body) {
            Some(body) => {
                if !body.is_static() {
                    body.force += force;
                    body.torque += torque;
                }
                true
            }
            None => false,
        }
    }

    fn update_collision(&mut self) -> Result<CollisionReport> {
        let proxies: Vec<Proxy<'_>> = self
            .geoms
            .iter()
            .filter_map(|(id, geom)| {
                let body = self.bodies.get(geom.body)?;
                Some(Proxy {
                    geom: id,
                    body: geom.body,
                    is_static: body.is_static(),
                    transform: body.transform.compose(&geom.offset),
                    shape: &geom.shape,
                })
            })
            .collect();

        let pairs = self.broadphase.potential_pairs(&proxies);
        let contacts = NarrowPhase::run(&proxies, &pairs);
        let report = CollisionReport {
            pairs_tested: pairs.len(),
            contacts: contacts.len(),
        };
        self.contacts.replace(contacts);
        Ok(report)
    }

    fn update_physics(&mut self, dt: f64) -> Result<StepReport> {
        solver::with_scratch(|scratch| self.solve_step(scratch, dt))
            .unwrap_or(Err(PhysicsError::ThreadNotInitialized))
    }

    fn discard_contacts(&mut self) {
        self.contacts.clear();
    }

    fn contacts(&self) -> Vec<NativeContact<NativeBodyId>> {
        self.contacts.as_slice().to_vec()
    }

    fn joint_state(&self, joint: NativeJointId) -> Option<NativeJointState> {
        let joint = self.joints.get(joint)?;
        let frame = joint.frame?;
        let none = HashMap::new();
        let a = self.endpoint(frame.body_a, &none)?;
        let b = self.endpoint(frame.body_b, &none)?;
        Some(joints::measure(joint.kind, &frame, &a, &b))
    }

    fn object_counts(&self) -> ObjectCounts {
        ObjectCounts {
            bodies: self.bodies.len(),
            geoms: self.geoms.len(),
            joints: self.joints.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use glam::DQuat;

    fn ready() -> ImpulseBackend {
        let mut backend = ImpulseBackend::new();
        backend.init(&WorldConfig::default()).unwrap();
        backend.init_for_thread().unwrap();
        backend
    }

    fn dynamic_at(backend: &mut ImpulseBackend, position: DVec3) -> NativeBodyId {
        let pose = ImpulseBackend::pose_to_native(&Pose::from_position(position)).unwrap();
        let mass = ImpulseBackend::mass_to_native(&MassProperties::default()).unwrap();
        backend
            .create_body(BodyKind::Dynamic, pose, mass, Velocity::default())
            .unwrap()
    }

    #[test]
    fn pose_survives_native_round_trip() {
        let pose = Pose::new(
            DVec3::new(1.0, -2.0, 3.5),
            DQuat::from_euler(glam::EulerRot::ZYX, 2.9, -0.4, 1.2),
        );
        let native = ImpulseBackend::pose_to_native(&pose).unwrap();
        let back = ImpulseBackend::pose_from_native(&native);
        assert!(pose.max_component_delta(&back) < 1e-9);
    }

    #[test]
    fn mass_survives_native_round_trip() {
        let mass =
            MassProperties::from_moments(3.0, DVec3::new(0.1, 0.0, -0.2), [2.0, 3.0, 4.0, 0.3, -0.1, 0.2]);
        let native = ImpulseBackend::mass_to_native(&mass).unwrap();
        let back = ImpulseBackend::mass_from_native(&native);
        assert_abs_diff_eq!(back.mass, 3.0, epsilon = 1e-12);
        for (a, b) in mass
            .inertia
            .to_cols_array()
            .iter()
            .zip(back.inertia.to_cols_array().iter())
        {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
        assert_eq!(back.inertia, back.inertia.transpose());
    }

    #[test]
    fn unsupported_shapes_are_refused() {
        let mut backend = ready();
        let body = dynamic_at(&mut backend, DVec3::ZERO);
        let cylinder = GeomShape::Cylinder {
            radius: 0.5,
            length: 1.0,
        };
        assert!(matches!(
            backend.create_geom(body, &cylinder, NativeTransform::IDENTITY),
            Err(PhysicsError::UnsupportedShape(_))
        ));
        assert_eq!(backend.object_counts().geoms, 0);
    }

    #[test]
    fn stepping_on_unprepared_thread_fails() {
        let mut backend = ImpulseBackend::new();
        backend.init(&WorldConfig::default()).unwrap();
        let result = std::thread::spawn(move || backend.update_physics(0.01).map(|_| ()))
            .join()
            .unwrap();
        assert_eq!(result, Err(PhysicsError::ThreadNotInitialized));
    }

    #[test]
    fn destroying_a_body_drops_its_geoms_and_joint_frames() {
        let mut backend = ready();
        let body = dynamic_at(&mut backend, DVec3::ZERO);
        backend
            .create_geom(body, &GeomShape::sphere(0.5), NativeTransform::IDENTITY)
            .unwrap();
        let joint = backend.create_joint(JointType::Ball).unwrap();
        backend
            .attach_joint(joint, None, Some(body), &JointParams::default())
            .unwrap();
        assert!(backend.joint_state(joint).is_some());

        backend.destroy_body(body);
        assert_eq!(
            backend.object_counts(),
            ObjectCounts {
                bodies: 0,
                geoms: 0,
                joints: 1
            }
        );
        assert!(backend.joint_state(joint).is_none());
    }

    #[test]
    fn sphere_comes_to_rest_on_ground() {
        let mut backend = ready();
        let ground = backend
            .create_body(
                BodyKind::Static,
                NativeTransform::IDENTITY,
                NativeMass::IMMOVABLE,
                Velocity::default(),
            )
            .unwrap();
        backend
            .create_geom(ground, &GeomShape::ground_plane(DVec3::Z), NativeTransform::IDENTITY)
            .unwrap();
        let ball = dynamic_at(&mut backend, DVec3::new(0.0, 0.0, 1.0));
        backend
            .create_geom(ball, &GeomShape::sphere(0.5), NativeTransform::IDENTITY)
            .unwrap();

        for _ in 0..200 {
            backend.update_collision().unwrap();
            backend.update_physics(0.01).unwrap();
        }
        let z = backend.body_pose(ball).unwrap().origin.z;
        assert!((z - 0.5).abs() < 0.02, "ball settled at z = {z}");
    }
}
