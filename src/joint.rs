//! Constraints expressed as contacts.
//!
//! A [`ContactGenerator`] inspects the bodies once per step and, when its
//! constraint is violated, returns a [`Contact`] that the resolver fixes
//! like any collision.

use log::warn;
use nalgebra::Vector3;

use crate::body::{BodyId, RigidBody};
use crate::contact::Contact;

/// Produces at most one contact per step describing a constraint violation.
pub trait ContactGenerator {
    fn generate_contact(&self, bodies: &[RigidBody]) -> Option<Contact>;
}

/// Ball joint: keeps a local point on each body within `error` of the other.
///
/// The contact it produces has friction 1 and restitution 0, so the joint
/// neither slides nor bounces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Joint {
    bodies: [BodyId; 2],
    positions: [Vector3<f32>; 2],
    error: f32,
}

impl Joint {
    pub fn new(
        a: BodyId,
        a_position: Vector3<f32>,
        b: BodyId,
        b_position: Vector3<f32>,
        error: f32,
    ) -> Self {
        Self {
            bodies: [a, b],
            positions: [a_position, b_position],
            error,
        }
    }

    pub fn bodies(&self) -> [BodyId; 2] {
        self.bodies
    }

    pub fn error(&self) -> f32 {
        self.error
    }

    fn world_anchors(&self, bodies: &[RigidBody]) -> Option<[Vector3<f32>; 2]> {
        world_anchors(&self.bodies, &self.positions, bodies)
    }
}

impl ContactGenerator for Joint {
    fn generate_contact(&self, bodies: &[RigidBody]) -> Option<Contact> {
        let [a_pos_world, b_pos_world] = self.world_anchors(bodies)?;

        let a_to_b = b_pos_world - a_pos_world;
        let length = a_to_b.norm();
        if length <= self.error {
            return None;
        }

        let normal = a_to_b / length;
        let point = (a_pos_world + b_pos_world) * 0.5;
        let contact = Contact::new(
            [Some(self.bodies[0]), Some(self.bodies[1])],
            point,
            normal,
            length - self.error,
        )
        .with_friction(1.0)
        .with_restitution(0.0);
        Some(contact)
    }
}

/// Rigid rod: holds two local points at a fixed distance in both
/// directions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rod {
    bodies: [BodyId; 2],
    positions: [Vector3<f32>; 2],
    length: f32,
}

impl Rod {
    pub fn new(a: BodyId, a_position: Vector3<f32>, b: BodyId, b_position: Vector3<f32>, length: f32) -> Self {
        Self {
            bodies: [a, b],
            positions: [a_position, b_position],
            length,
        }
    }

    pub fn length(&self) -> f32 {
        self.length
    }
}

impl ContactGenerator for Rod {
    fn generate_contact(&self, bodies: &[RigidBody]) -> Option<Contact> {
        let [a_pos_world, b_pos_world] = world_anchors(&self.bodies, &self.positions, bodies)?;

        let a_to_b = b_pos_world - a_pos_world;
        let current = a_to_b.norm();
        if current <= f32::EPSILON || (current - self.length).abs() <= f32::EPSILON {
            return None;
        }

        let toward_b = a_to_b / current;
        // Too long: pull `a` toward `b`. Too short: push it away.
        let (normal, penetration) = if current > self.length {
            (toward_b, current - self.length)
        } else {
            (-toward_b, self.length - current)
        };

        let point = (a_pos_world + b_pos_world) * 0.5;
        let contact = Contact::new([Some(self.bodies[0]), Some(self.bodies[1])], point, normal, penetration)
            .with_friction(0.0)
            .with_restitution(0.0);
        Some(contact)
    }
}

fn world_anchors(
    ids: &[BodyId; 2],
    positions: &[Vector3<f32>; 2],
    bodies: &[RigidBody],
) -> Option<[Vector3<f32>; 2]> {
    let (Some(a), Some(b)) = (bodies.get(ids[0].index()), bodies.get(ids[1].index())) else {
        warn!("constraint references unknown body ({} or {})", ids[0].index(), ids[1].index());
        return None;
    };
    Some([
        a.point_in_world_space(&positions[0]),
        b.point_in_world_space(&positions[1]),
    ])
}
