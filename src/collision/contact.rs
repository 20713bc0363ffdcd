use glam::DVec3;

use crate::backend::{impulse::NativeBodyId, NativeContact};

/// One point of a contact manifold, normal pointing from the first shape to the second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    pub point: DVec3,
    pub normal: DVec3,
    pub depth: f64,
}

impl ContactPoint {
    pub fn flipped(self) -> Self {
        Self {
            normal: -self.normal,
            ..self
        }
    }
}

/// Contacts produced by the most recent collision phase.
///
/// They stay valid until the next collision phase replaces them, so a physics
/// update without a preceding collision update reuses them.
#[derive(Debug, Default, Clone)]
pub struct ContactCache {
    contacts: Vec<NativeContact<NativeBodyId>>,
}

impl ContactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, contacts: Vec<NativeContact<NativeBodyId>>) {
        self.contacts = contacts;
    }

    pub fn clear(&mut self) {
        self.contacts.clear();
    }

    /// Drops every contact touching `body`.
    pub fn forget_body(&mut self, body: NativeBodyId) {
        self.contacts
            .retain(|contact| contact.body_a != body && contact.body_b != body);
    }

    pub fn as_slice(&self) -> &[NativeContact<NativeBodyId>] {
        &self.contacts
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}
