//! Contacts and the fixed-capacity contact buffer.
//!
//! A [`Contact`] joins one or two bodies at a world point. The normal
//! always points toward the first body: resolving the contact pushes the
//! first body along `+normal` and the second along `-normal`. An empty
//! second slot means the contact is against immovable world geometry.
//!
//! The per-contact solver math (contact basis, closing velocity, impulse
//! and position change) lives here; the greedy ordering across contacts is
//! in [`crate::resolver`].

use heapless::Vec;
use log::{debug, trace, warn};
use nalgebra::{Matrix3, Vector3};

// ComplexField provides sqrt() for f32 in no_std via libm
#[allow(unused_imports)]
use nalgebra::ComplexField;

use crate::body::{BodyId, RigidBody};
use crate::math;

/// Contacts the buffer holds unless told otherwise.
pub const DEFAULT_CONTACT_CAPACITY: usize = 256;

/// Closing speeds below this are treated as resting contact: restitution
/// is dropped so the body does not jitter.
pub const RESTITUTION_VELOCITY_LIMIT: f32 = 0.25;

/// Fraction of the lever arm a single position correction may rotate.
pub const ANGULAR_LIMIT: f32 = 0.2;

/// Per-body linear and angular changes made while resolving one contact.
/// Index 0 belongs to the contact's first body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyChanges {
    pub linear: [Vector3<f32>; 2],
    pub angular: [Vector3<f32>; 2],
}

/// A contact between one or two bodies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Bodies involved. `bodies[1] == None` means static world.
    pub bodies: [Option<BodyId>; 2],
    /// World-space contact point.
    pub point: Vector3<f32>,
    /// Unit contact normal, pointing toward `bodies[0]`.
    pub normal: Vector3<f32>,
    /// Overlap along the normal. Positive when interpenetrating.
    pub penetration: f32,
    pub friction: f32,
    pub restitution: f32,

    // Filled by `calculate_internals`.
    contact_to_world: Matrix3<f32>,
    relative_contact_position: [Vector3<f32>; 2],
    contact_velocity: Vector3<f32>,
    desired_delta_velocity: f32,
}

impl Contact {
    /// New contact with zero friction and restitution.
    pub fn new(
        bodies: [Option<BodyId>; 2],
        point: Vector3<f32>,
        normal: Vector3<f32>,
        penetration: f32,
    ) -> Self {
        Self {
            bodies,
            point,
            normal,
            penetration,
            friction: 0.0,
            restitution: 0.0,
            contact_to_world: Matrix3::identity(),
            relative_contact_position: [Vector3::zeros(); 2],
            contact_velocity: Vector3::zeros(),
            desired_delta_velocity: 0.0,
        }
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    /// Contact basis: columns are the normal and two tangents.
    #[inline]
    pub fn contact_to_world(&self) -> &Matrix3<f32> {
        &self.contact_to_world
    }

    /// Contact point relative to the centre of body `i`.
    #[inline]
    pub fn relative_contact_position(&self, i: usize) -> Vector3<f32> {
        self.relative_contact_position[i]
    }

    /// Closing velocity in contact coordinates (x along the normal).
    #[inline]
    pub fn contact_velocity(&self) -> Vector3<f32> {
        self.contact_velocity
    }

    /// Change in normal velocity the velocity pass aims for.
    #[inline]
    pub fn desired_delta_velocity(&self) -> f32 {
        self.desired_delta_velocity
    }

    /// A contact with no bodies left after preparation does nothing.
    #[inline]
    pub fn is_inert(&self) -> bool {
        self.bodies[0].is_none()
    }

    /// Whether resolving this contact can move anything: at least one of
    /// its bodies has finite mass or a non-zero inverse inertia.
    pub fn has_movable_body(&self, bodies: &[RigidBody]) -> bool {
        (0..2)
            .filter_map(|i| self.body(bodies, i))
            .any(|b| b.has_finite_mass() || *b.inverse_inertia_tensor_world() != Matrix3::zeros())
    }

    fn body<'b>(&self, bodies: &'b [RigidBody], i: usize) -> Option<&'b RigidBody> {
        self.bodies[i].and_then(|id| bodies.get(id.index()))
    }

    fn body_mut<'b>(&self, bodies: &'b mut [RigidBody], i: usize) -> Option<&'b mut RigidBody> {
        self.bodies[i].and_then(move |id| bodies.get_mut(id.index()))
    }

    /// Swap the body slots, flipping the normal to keep it pointing at the
    /// first body.
    fn swap_bodies(&mut self) {
        self.normal = -self.normal;
        self.bodies.swap(0, 1);
    }

    /// Prepare the contact for resolution.
    ///
    /// Unknown body ids are dropped to the world slot, the bodies are
    /// swapped so the first slot is filled, and the basis, lever arms,
    /// closing velocity and desired velocity change are computed.
    pub fn calculate_internals(&mut self, bodies: &[RigidBody], dt: f32) {
        for slot in self.bodies.iter_mut() {
            if let Some(id) = *slot {
                if id.index() >= bodies.len() {
                    warn!("contact references unknown body {}, treating as world", id.index());
                    *slot = None;
                }
            }
        }
        if self.bodies[0].is_none() {
            self.swap_bodies();
        }
        if self.is_inert() {
            return;
        }

        self.contact_to_world = math::contact_basis(&self.normal);

        self.relative_contact_position = [Vector3::zeros(); 2];
        self.contact_velocity = Vector3::zeros();
        for i in 0..2 {
            if let Some(body) = self.body(bodies, i) {
                self.relative_contact_position[i] = self.point - body.position();
                let v = self.local_velocity(i, body, dt);
                if i == 0 {
                    self.contact_velocity += v;
                } else {
                    self.contact_velocity -= v;
                }
            }
        }

        self.calculate_desired_delta_velocity(bodies, dt);
    }

    /// Velocity of the contact point on body `i`, in contact coordinates.
    ///
    /// Includes the planar part of the velocity gained from last frame's
    /// acceleration, so friction can hold bodies on slopes.
    fn local_velocity(&self, i: usize, body: &RigidBody, dt: f32) -> Vector3<f32> {
        let world_to_contact = self.contact_to_world.transpose();

        let velocity = body.rotation().cross(&self.relative_contact_position[i]) + body.velocity();
        let mut contact_velocity = world_to_contact * velocity;

        let mut acc_velocity = world_to_contact * (body.last_frame_acceleration() * dt);
        acc_velocity.x = 0.0;
        contact_velocity += acc_velocity;

        contact_velocity
    }

    /// Recompute the desired normal velocity change from the current
    /// closing velocity.
    pub(crate) fn calculate_desired_delta_velocity(&mut self, bodies: &[RigidBody], dt: f32) {
        let mut velocity_from_acc = 0.0;
        if let Some(body) = self.body(bodies, 0) {
            if body.is_awake() {
                velocity_from_acc += (body.last_frame_acceleration() * dt).dot(&self.normal);
            }
        }
        if let Some(body) = self.body(bodies, 1) {
            if body.is_awake() {
                velocity_from_acc -= (body.last_frame_acceleration() * dt).dot(&self.normal);
            }
        }

        let closing = self.contact_velocity.x;
        let restitution = if closing.abs() < RESTITUTION_VELOCITY_LIMIT {
            0.0
        } else {
            self.restitution
        };

        self.desired_delta_velocity = -closing - restitution * (closing - velocity_from_acc);
    }

    /// Called by the resolver after a change elsewhere moved one of this
    /// contact's bodies.
    pub(crate) fn adjust_contact_velocity(&mut self, delta: &Vector3<f32>) {
        self.contact_velocity += self.contact_to_world.transpose() * delta;
    }

    /// If exactly one body is awake, wake the other. Contacts with the
    /// world never wake anything.
    pub fn match_awake_state(&self, bodies: &mut [RigidBody]) {
        let (Some(a), Some(b)) = (self.body(bodies, 0), self.body(bodies, 1)) else {
            return;
        };
        let (awake_a, awake_b) = (a.is_awake(), b.is_awake());
        if awake_a == awake_b {
            return;
        }
        let sleeper = if awake_a { 1 } else { 0 };
        if let Some(body) = self.body_mut(bodies, sleeper) {
            body.set_awake(true);
        }
    }

    // -----------------------------------------------------------------------
    // Velocity resolution
    // -----------------------------------------------------------------------

    /// Impulse, in contact coordinates, that produces the desired velocity
    /// change. Uses the friction model when `friction` is non-zero.
    pub fn impulse(&self, bodies: &[RigidBody]) -> Vector3<f32> {
        if self.friction == 0.0 {
            self.frictionless_impulse(bodies)
        } else {
            self.friction_impulse(bodies)
        }
    }

    fn frictionless_impulse(&self, bodies: &[RigidBody]) -> Vector3<f32> {
        let mut delta_velocity = 0.0;
        for i in 0..2 {
            if let Some(body) = self.body(bodies, i) {
                let rel = &self.relative_contact_position[i];
                let delta_vel_world = (body.inverse_inertia_tensor_world() * rel.cross(&self.normal)).cross(rel);
                delta_velocity += delta_vel_world.dot(&self.normal) + body.inverse_mass();
            }
        }

        if delta_velocity <= 0.0 {
            return Vector3::zeros();
        }
        Vector3::new(self.desired_delta_velocity / delta_velocity, 0.0, 0.0)
    }

    fn friction_impulse(&self, bodies: &[RigidBody]) -> Vector3<f32> {
        let mut inverse_mass = 0.0;
        let mut delta_vel_world = Matrix3::zeros();
        for i in 0..2 {
            if let Some(body) = self.body(bodies, i) {
                let impulse_to_torque = math::skew_symmetric(&self.relative_contact_position[i]);
                delta_vel_world -=
                    impulse_to_torque * body.inverse_inertia_tensor_world() * impulse_to_torque;
                inverse_mass += body.inverse_mass();
            }
        }

        let mut delta_velocity = self.contact_to_world.transpose() * delta_vel_world * self.contact_to_world;
        for k in 0..3 {
            delta_velocity[(k, k)] += inverse_mass;
        }

        let Some(impulse_matrix) = math::invert(&delta_velocity) else {
            debug!("singular impulse matrix, falling back to frictionless impulse");
            return self.frictionless_impulse(bodies);
        };

        let vel_kill = Vector3::new(
            self.desired_delta_velocity,
            -self.contact_velocity.y,
            -self.contact_velocity.z,
        );
        let mut impulse = impulse_matrix * vel_kill;

        // Clamp to the friction cone.
        let planar = (impulse.y * impulse.y + impulse.z * impulse.z).sqrt();
        if planar > impulse.x * self.friction {
            impulse.y /= planar;
            impulse.z /= planar;

            let normal_rate = delta_velocity[(0, 0)]
                + delta_velocity[(0, 1)] * self.friction * impulse.y
                + delta_velocity[(0, 2)] * self.friction * impulse.z;
            if normal_rate.abs() < f32::EPSILON {
                return self.frictionless_impulse(bodies);
            }
            impulse.x = self.desired_delta_velocity / normal_rate;
            impulse.y *= self.friction * impulse.x;
            impulse.z *= self.friction * impulse.x;
        }

        impulse
    }

    /// Apply the impulse for this contact to its bodies and return the
    /// velocity and rotation changes made.
    pub fn apply_velocity_change(&self, bodies: &mut [RigidBody]) -> BodyChanges {
        let mut changes = BodyChanges::default();
        if self.is_inert() {
            return changes;
        }

        let impulse = self.contact_to_world * self.impulse(bodies);

        for i in 0..2 {
            let rel = self.relative_contact_position[i];
            let Some(body) = self.body_mut(bodies, i) else {
                continue;
            };
            let (torque, linear) = if i == 0 {
                (rel.cross(&impulse), impulse)
            } else {
                (impulse.cross(&rel), -impulse)
            };
            changes.angular[i] = body.inverse_inertia_tensor_world() * torque;
            changes.linear[i] = linear * body.inverse_mass();
            body.add_velocity(&changes.linear[i]);
            body.add_rotation(&changes.angular[i]);
        }

        changes
    }

    // -----------------------------------------------------------------------
    // Position resolution
    // -----------------------------------------------------------------------

    /// Remove this contact's penetration by moving and rotating its bodies
    /// in proportion to their inertia along the normal. Returns the linear
    /// and angular displacements made.
    pub fn apply_position_change(&self, bodies: &mut [RigidBody]) -> BodyChanges {
        let mut changes = BodyChanges::default();
        if self.is_inert() {
            return changes;
        }

        let mut angular_inertia = [0.0f32; 2];
        let mut linear_inertia = [0.0f32; 2];
        let mut total_inertia = 0.0;
        for i in 0..2 {
            if let Some(body) = self.body(bodies, i) {
                let rel = &self.relative_contact_position[i];
                let angular_inertia_world =
                    (body.inverse_inertia_tensor_world() * rel.cross(&self.normal)).cross(rel);
                angular_inertia[i] = angular_inertia_world.dot(&self.normal);
                linear_inertia[i] = body.inverse_mass();
                total_inertia += angular_inertia[i] + linear_inertia[i];
            }
        }

        if total_inertia <= 0.0 {
            return changes;
        }

        for i in 0..2 {
            let rel = self.relative_contact_position[i];
            let Some(body) = self.body_mut(bodies, i) else {
                continue;
            };

            let sign = if i == 0 { 1.0 } else { -1.0 };
            let mut angular_move = sign * self.penetration * (angular_inertia[i] / total_inertia);
            let mut linear_move = sign * self.penetration * (linear_inertia[i] / total_inertia);

            // Limit the rotation so large lever arms don't overshoot.
            let projection = rel - self.normal * rel.dot(&self.normal);
            let max_magnitude = ANGULAR_LIMIT * projection.norm();
            if angular_move.abs() > max_magnitude {
                let total_move = angular_move + linear_move;
                angular_move = if angular_move < 0.0 { -max_magnitude } else { max_magnitude };
                linear_move = total_move - angular_move;
            }

            if angular_move != 0.0 && angular_inertia[i] != 0.0 {
                let target_direction = rel.cross(&self.normal);
                changes.angular[i] = body.inverse_inertia_tensor_world()
                    * target_direction
                    * (angular_move / angular_inertia[i]);
            }
            changes.linear[i] = self.normal * linear_move;

            body.translate(&changes.linear[i]);
            body.rotate_by(&changes.angular[i]);
            body.calculate_derived_data();
        }

        changes
    }
}

// ---------------------------------------------------------------------------
// Contact buffer
// ---------------------------------------------------------------------------

/// Fixed-capacity store that contact generators write into.
///
/// Generators check [`has_more_contacts`](Self::has_more_contacts) and stop
/// once the buffer is full; nothing is ever dropped mid-write or grown.
#[derive(Debug, Clone)]
pub struct ContactBuffer<const C: usize = DEFAULT_CONTACT_CAPACITY> {
    contacts: Vec<Contact, C>,
    /// Friction given to contacts written by shape generators.
    pub friction: f32,
    /// Restitution given to contacts written by shape generators.
    pub restitution: f32,
}

impl<const C: usize> Default for ContactBuffer<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const C: usize> ContactBuffer<C> {
    pub const fn new() -> Self {
        Self {
            contacts: Vec::new(),
            friction: 0.0,
            restitution: 0.0,
        }
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    /// Empty the buffer for a new step.
    pub fn reset(&mut self) {
        self.contacts.clear();
    }

    #[inline]
    pub fn has_more_contacts(&self) -> bool {
        !self.contacts.is_full()
    }

    /// Free slots left.
    #[inline]
    pub fn remaining(&self) -> usize {
        C - self.contacts.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        C
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn contacts_mut(&mut self) -> &mut [Contact] {
        &mut self.contacts
    }

    /// Write a contact using the buffer's friction and restitution.
    /// Returns `false` if the buffer is full.
    pub fn add(
        &mut self,
        bodies: [Option<BodyId>; 2],
        point: Vector3<f32>,
        normal: Vector3<f32>,
        penetration: f32,
    ) -> bool {
        let contact = Contact::new(bodies, point, normal, penetration)
            .with_friction(self.friction)
            .with_restitution(self.restitution);
        self.push_contact(contact)
    }

    /// Write a fully specified contact. Returns `false` if the buffer is full.
    pub fn push_contact(&mut self, contact: Contact) -> bool {
        if self.contacts.push(contact).is_err() {
            trace!("contact buffer full ({} contacts), dropping contact", C);
            return false;
        }
        true
    }
}
