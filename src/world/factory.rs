use glam::DVec3;
use log::{debug, trace};

use super::{
    BodyRecord, BodySnapshot, ContactPair, GeomRecord, HandleCounts, JointLink, JointRecord,
    PhysicsWorld,
};
use crate::{
    backend::PhysicsBackend,
    core::{
        BodyDesc, EntityId, GeomDesc, JointParams, JointState, JointType, MassProperties, Pose,
        Velocity,
    },
    error::{PhysicsError, Result},
    utils::allocator::{BodyHandle, GeomHandle, JointHandle},
};

impl<B: PhysicsBackend> PhysicsWorld<B> {
    /// Registers a dynamic unit-mass body at the origin for `entity`.
    pub fn create_body(&mut self, entity: EntityId) -> Result<BodyHandle> {
        self.create_body_with(entity, BodyDesc::default())
    }

    pub fn create_body_with(&mut self, entity: EntityId, desc: BodyDesc) -> Result<BodyHandle> {
        self.ensure_running()?;
        if self.entities.contains_key(&entity) {
            return Err(PhysicsError::DuplicateBody(entity));
        }
        desc.velocity.validate()?;
        let pose = B::pose_to_native(&desc.pose)?;
        let mass = B::mass_to_native(&desc.mass)?;
        let native = self
            .backend
            .create_body(desc.kind, pose, mass, desc.velocity)?;

        let handle = self.bodies.insert(BodyRecord {
            entity,
            native,
            kind: desc.kind,
            geoms: Vec::new(),
            joints: Vec::new(),
        });
        self.entities.insert(entity, handle);
        self.natives.insert(native, handle);
        debug!(
            "world {}: {:?} body {handle} for entity {}",
            self.id,
            desc.kind,
            entity.raw()
        );
        Ok(handle)
    }

    /// Attaches a collision shape to a registered body.
    pub fn create_geom(&mut self, body: BodyHandle, desc: impl Into<GeomDesc>) -> Result<GeomHandle> {
        self.ensure_running()?;
        let desc = desc.into();
        let native_body = self
            .bodies
            .get(body)
            .map(|record| record.native)
            .ok_or(PhysicsError::InvalidBody(body))?;

        let shape_type = desc.shape_type();
        if !self.backend.supports_shape(shape_type) {
            return Err(PhysicsError::UnsupportedShape(format!(
                "{} backend has no {shape_type} collider",
                self.backend.name()
            )));
        }
        desc.shape.validate()?;
        let offset = B::pose_to_native(&desc.offset)?;
        let native = self.backend.create_geom(native_body, &desc.shape, offset)?;

        let handle = self.geoms.insert(GeomRecord {
            body,
            native,
            shape: shape_type,
        });
        if let Some(record) = self.bodies.get_mut(body) {
            record.geoms.push(handle);
        }
        debug!("world {}: {shape_type} geom {handle} on {body}", self.id);
        Ok(handle)
    }

    pub fn destroy_geom(&mut self, geom: GeomHandle) -> Result<()> {
        self.ensure_running()?;
        let record = self.geoms.remove(geom).ok_or(PhysicsError::InvalidGeom(geom))?;
        self.backend.destroy_geom(record.native);
        if let Some(body) = self.bodies.get_mut(record.body) {
            body.geoms.retain(|&g| g != geom);
        }
        debug!("world {}: destroyed {} geom {geom}", self.id, record.shape);
        Ok(())
    }

    /// Creates a joint with no endpoints.
    pub fn create_joint(&mut self, kind: JointType) -> Result<JointHandle> {
        self.ensure_running()?;
        let native = self.backend.create_joint(kind)?;
        let handle = self.joints.insert(JointRecord {
            kind,
            native,
            link: JointLink::Unconnected,
        });
        debug!("world {}: {kind} joint {handle}", self.id);
        Ok(handle)
    }

    /// Connects a joint between two bodies; `None` is the static world frame.
    ///
    /// Reattaching a connected joint replaces its endpoints.
    pub fn attach_joint(
        &mut self,
        joint: JointHandle,
        body_a: Option<BodyHandle>,
        body_b: Option<BodyHandle>,
        params: JointParams,
    ) -> Result<()> {
        self.ensure_running()?;
        let (kind, native_joint) = self
            .joints
            .get(joint)
            .map(|record| (record.kind, record.native))
            .ok_or(PhysicsError::InvalidJoint(joint))?;
        params.validate(kind)?;
        if body_a.is_none() && body_b.is_none() {
            return Err(PhysicsError::InvalidGeometry(
                "joint needs at least one body endpoint".to_string(),
            ));
        }
        if body_a.is_some() && body_a == body_b {
            return Err(PhysicsError::InvalidGeometry(
                "joint endpoints must be distinct bodies".to_string(),
            ));
        }
        let native_a = self.endpoint(joint, body_a)?;
        let native_b = self.endpoint(joint, body_b)?;

        self.backend
            .attach_joint(native_joint, native_a, native_b, &params)?;

        self.forget_links(joint);
        for body in [body_a, body_b].into_iter().flatten() {
            if let Some(record) = self.bodies.get_mut(body) {
                record.joints.push(joint);
            }
        }
        if let Some(record) = self.joints.get_mut(joint) {
            record.link = JointLink::Connected { a: body_a, b: body_b };
        }
        debug!(
            "world {}: {kind} joint {joint} attached between {body_a:?} and {body_b:?}",
            self.id
        );
        Ok(())
    }

    /// Disconnects a joint; the joint stays allocated.
    pub fn detach_joint(&mut self, joint: JointHandle) -> Result<()> {
        self.ensure_running()?;
        if !self.joints.contains(joint) {
            return Err(PhysicsError::InvalidJoint(joint));
        }
        self.unlink_joint(joint);
        if let Some(record) = self.joints.get_mut(joint) {
            record.link = JointLink::Unconnected;
        }
        debug!("world {}: detached joint {joint}", self.id);
        Ok(())
    }

    pub fn destroy_joint(&mut self, joint: JointHandle) -> Result<()> {
        self.ensure_running()?;
        if !self.joints.contains(joint) {
            return Err(PhysicsError::InvalidJoint(joint));
        }
        self.unlink_joint(joint);
        if let Some(record) = self.joints.remove(joint) {
            self.backend.destroy_joint(record.native);
        }
        debug!("world {}: destroyed joint {joint}", self.id);
        Ok(())
    }

    /// Tears down everything the entity owns. Returns `false` if it owned nothing.
    pub fn remove_entity(&mut self, entity: EntityId) -> bool {
        if !self.discard_entity(entity) {
            return false;
        }
        for listener in &mut self.removal_listeners {
            listener(entity);
        }
        true
    }

    /// Tears down `entity` without notifying removal listeners.
    pub(crate) fn discard_entity(&mut self, entity: EntityId) -> bool {
        let Some(handle) = self.entities.remove(&entity) else {
            return false;
        };
        let Some(record) = self.bodies.remove(handle) else {
            return false;
        };

        for geom in &record.geoms {
            if let Some(geom_record) = self.geoms.remove(*geom) {
                self.backend.destroy_geom(geom_record.native);
            }
        }
        for joint in &record.joints {
            self.disconnect_joint(*joint, handle);
        }
        self.natives.remove(&record.native);
        self.backend.destroy_body(record.native);
        debug!(
            "world {}: removed entity {} ({} geoms, {} joints)",
            self.id,
            entity.raw(),
            record.geoms.len(),
            record.joints.len()
        );
        true
    }

    pub fn body_of(&self, entity: EntityId) -> Option<BodyHandle> {
        self.entities.get(&entity).copied()
    }

    pub fn entity_of(&self, body: BodyHandle) -> Option<EntityId> {
        self.bodies.get(body).map(|record| record.entity)
    }

    pub fn body_pose(&self, body: BodyHandle) -> Result<Pose> {
        let native = self.native_body(body)?;
        self.backend
            .body_pose(native)
            .map(|pose| B::pose_from_native(&pose))
            .ok_or(PhysicsError::InvalidBody(body))
    }

    /// Teleports a body; contacts are refreshed by the next collision phase.
    pub fn set_body_pose(&mut self, body: BodyHandle, pose: Pose) -> Result<()> {
        let native = self.native_body(body)?;
        let pose = B::pose_to_native(&pose)?;
        if self.backend.set_body_pose(native, pose) {
            trace!("world {}: moved {body}", self.id);
            Ok(())
        } else {
            Err(PhysicsError::InvalidBody(body))
        }
    }

    pub fn body_velocity(&self, body: BodyHandle) -> Result<Velocity> {
        let native = self.native_body(body)?;
        self.backend
            .body_velocity(native)
            .ok_or(PhysicsError::InvalidBody(body))
    }

    pub fn set_body_velocity(&mut self, body: BodyHandle, velocity: Velocity) -> Result<()> {
        let native = self.native_body(body)?;
        velocity.validate()?;
        if self.backend.set_body_velocity(native, velocity) {
            Ok(())
        } else {
            Err(PhysicsError::InvalidBody(body))
        }
    }

    pub fn body_mass(&self, body: BodyHandle) -> Result<MassProperties> {
        let native = self.native_body(body)?;
        self.backend
            .body_mass(native)
            .map(|mass| B::mass_from_native(&mass))
            .ok_or(PhysicsError::InvalidBody(body))
    }

    pub fn set_body_mass(&mut self, body: BodyHandle, mass: MassProperties) -> Result<()> {
        let native = self.native_body(body)?;
        let mass = B::mass_to_native(&mass)?;
        if self.backend.set_body_mass(native, mass) {
            debug!("world {}: new mass properties for {body}", self.id);
            Ok(())
        } else {
            Err(PhysicsError::InvalidBody(body))
        }
    }

    /// Accumulates a force through the centre of mass and a torque, both world
    /// frame, consumed by the next physics update.
    pub fn apply_force(&mut self, body: BodyHandle, force: DVec3, torque: DVec3) -> Result<()> {
        let native = self.native_body(body)?;
        if !force.is_finite() || !torque.is_finite() {
            return Err(PhysicsError::InvalidGeometry(
                "applied force is not finite".to_string(),
            ));
        }
        if self.backend.apply_force(native, force, torque) {
            Ok(())
        } else {
            Err(PhysicsError::InvalidBody(body))
        }
    }

    /// Reads back a connected joint's geometry.
    pub fn joint_state(&self, joint: JointHandle) -> Result<JointState> {
        self.ensure_running()?;
        let record = self
            .joints
            .get(joint)
            .ok_or(PhysicsError::InvalidJoint(joint))?;
        let (body_a, body_b) = match record.link {
            JointLink::Connected { a, b } => (a, b),
            JointLink::Unconnected => {
                return Err(PhysicsError::DisconnectedJoint(joint, "joint was never attached"))
            }
            JointLink::Disconnected => {
                return Err(PhysicsError::DisconnectedJoint(
                    joint,
                    "an endpoint body was removed",
                ))
            }
        };
        let native = self.backend.joint_state(record.native).ok_or(
            PhysicsError::DisconnectedJoint(joint, "backend holds no connected frame"),
        )?;
        Ok(JointState {
            kind: record.kind,
            body_a,
            body_b,
            anchor: native.anchor,
            axis: native.axis,
            position: native.position,
            rate: native.rate,
            anchor_error: native.anchor_error,
        })
    }

    /// Contacts found by the last collision phase, in registry handles.
    pub fn contacts(&self) -> Result<Vec<ContactPair>> {
        self.ensure_running()?;
        Ok(self
            .backend
            .contacts()
            .into_iter()
            .filter_map(|contact| {
                Some(ContactPair {
                    body_a: *self.natives.get(&contact.body_a)?,
                    body_b: *self.natives.get(&contact.body_b)?,
                    point: contact.point,
                    normal: contact.normal,
                    depth: contact.depth,
                })
            })
            .collect())
    }

    pub fn handle_counts(&self) -> HandleCounts {
        HandleCounts {
            entities: self.entities.len(),
            bodies: self.bodies.len(),
            geoms: self.geoms.len(),
            joints: self.joints.len(),
        }
    }

    /// Pose, velocity and mass of every body, ordered by entity.
    pub fn snapshot(&self) -> Result<Vec<BodySnapshot>> {
        self.ensure_running()?;
        let mut snapshots = self
            .bodies
            .iter()
            .map(|(handle, record)| {
                Ok(BodySnapshot {
                    entity: record.entity,
                    body: handle,
                    kind: record.kind,
                    pose: self.body_pose(handle)?,
                    velocity: self.body_velocity(handle)?,
                    mass: self.body_mass(handle)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        snapshots.sort_by_key(|snapshot| snapshot.entity);
        Ok(snapshots)
    }

    fn native_body(&self, body: BodyHandle) -> Result<B::BodyId> {
        self.ensure_running()?;
        self.bodies
            .get(body)
            .map(|record| record.native)
            .ok_or(PhysicsError::InvalidBody(body))
    }

    fn endpoint(&self, joint: JointHandle, body: Option<BodyHandle>) -> Result<Option<B::BodyId>> {
        match body {
            None => Ok(None),
            Some(handle) => self
                .bodies
                .get(handle)
                .map(|record| Some(record.native))
                .ok_or(PhysicsError::DisconnectedJoint(joint, "endpoint body is not registered")),
        }
    }

    /// Detaches a connected joint in the backend and forgets it on both bodies.
    fn unlink_joint(&mut self, joint: JointHandle) {
        let Some(record) = self.joints.get(joint) else {
            return;
        };
        if matches!(record.link, JointLink::Connected { .. }) {
            self.backend.detach_joint(record.native);
            self.forget_links(joint);
        }
    }

    fn forget_links(&mut self, joint: JointHandle) {
        let Some(JointLink::Connected { a, b }) = self.joints.get(joint).map(|record| record.link)
        else {
            return;
        };
        for body in [a, b].into_iter().flatten() {
            if let Some(body) = self.bodies.get_mut(body) {
                body.joints.retain(|&j| j != joint);
            }
        }
    }

    /// Called while `removed` is being torn down.
    fn disconnect_joint(&mut self, joint: JointHandle, removed: BodyHandle) {
        let Some(record) = self.joints.get_mut(joint) else {
            return;
        };
        let JointLink::Connected { a, b } = record.link else {
            return;
        };
        record.link = JointLink::Disconnected;
        self.backend.detach_joint(record.native);
        for body in [a, b].into_iter().flatten().filter(|&body| body != removed) {
            if let Some(other) = self.bodies.get_mut(body) {
                other.joints.retain(|&j| j != joint);
            }
        }
        debug!("world {}: joint {joint} disconnected", self.id);
    }
}
