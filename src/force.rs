//! Force generators.
//!
//! A [`ForceGenerator`] adds force to one body's accumulator each step. The
//! [`ForceRegistry`] pairs generators with the bodies they act on and runs
//! them all once per step, before integration.

use heapless::Vec;
use log::warn;
use nalgebra::Vector3;

use crate::body::{BodyId, RigidBody};

/// Something that pushes on a body.
pub trait ForceGenerator {
    /// Add this step's force to `bodies[target]`. `duration` is the step
    /// length in seconds. Unknown targets are ignored.
    fn update_force(&self, bodies: &mut [RigidBody], target: BodyId, duration: f32);
}

/// Constant acceleration applied as a force of `mass · gravity`.
///
/// Immovable and sleeping bodies are left alone, so gravity alone never
/// keeps a resting body awake.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gravity {
    pub gravity: Vector3<f32>,
}

impl Gravity {
    pub fn new(gravity: Vector3<f32>) -> Self {
        Self { gravity }
    }
}

impl ForceGenerator for Gravity {
    fn update_force(&self, bodies: &mut [RigidBody], target: BodyId, _duration: f32) {
        let Some(body) = bodies.get_mut(target.index()) else {
            return;
        };
        if !body.has_finite_mass() || !body.is_awake() {
            return;
        }
        let force = self.gravity * body.mass();
        body.add_force(&force);
    }
}

/// Hooke's-law spring between a point on the target body and a point on
/// another body. Both points are in their body's local space.
///
/// Stretched springs pull the points together, compressed springs push
/// them apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spring {
    connection_point: Vector3<f32>,
    other: BodyId,
    other_connection_point: Vector3<f32>,
    spring_constant: f32,
    rest_length: f32,
}

impl Spring {
    pub fn new(
        connection_point: Vector3<f32>,
        other: BodyId,
        other_connection_point: Vector3<f32>,
        spring_constant: f32,
        rest_length: f32,
    ) -> Self {
        Self {
            connection_point,
            other,
            other_connection_point,
            spring_constant,
            rest_length,
        }
    }

    pub fn other(&self) -> BodyId {
        self.other
    }

    pub fn rest_length(&self) -> f32 {
        self.rest_length
    }
}

impl ForceGenerator for Spring {
    fn update_force(&self, bodies: &mut [RigidBody], target: BodyId, _duration: f32) {
        let Some(other) = bodies.get(self.other.index()) else {
            warn!("spring references unknown body {}", self.other.index());
            return;
        };
        let other_ws = other.point_in_world_space(&self.other_connection_point);

        let Some(body) = bodies.get_mut(target.index()) else {
            return;
        };
        let lws = body.point_in_world_space(&self.connection_point);

        let extension = lws - other_ws;
        let length = extension.norm();
        if length <= f32::EPSILON {
            return;
        }

        let magnitude = (length - self.rest_length) * self.spring_constant;
        let force = extension * (-magnitude / length);
        body.add_force_at_point(&force, &lws);
    }
}

struct Registration<'a> {
    body: BodyId,
    generator: &'a dyn ForceGenerator,
}

/// Generator/body registrations, run once per step.
///
/// Holds up to `R` registrations. A generator may be registered for any
/// number of bodies.
pub struct ForceRegistry<'a, const R: usize> {
    registrations: Vec<Registration<'a>, R>,
}

impl<'a, const R: usize> Default for ForceRegistry<'a, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, const R: usize> ForceRegistry<'a, R> {
    pub const fn new() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// Register `generator` for `body`. Returns `false` if the registry is
    /// full.
    pub fn add(&mut self, body: BodyId, generator: &'a dyn ForceGenerator) -> bool {
        self.registrations.push(Registration { body, generator }).is_ok()
    }

    /// Remove one registration of `generator` for `body`. Returns `false` if
    /// there was none.
    pub fn remove(&mut self, body: BodyId, generator: &'a dyn ForceGenerator) -> bool {
        let position = self
            .registrations
            .iter()
            .position(|r| r.body == body && core::ptr::addr_eq(r.generator, generator));
        match position {
            Some(index) => {
                self.registrations.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.registrations.clear();
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Run every registered generator.
    pub fn update_forces(&self, bodies: &mut [RigidBody], duration: f32) {
        for registration in self.registrations.iter() {
            registration
                .generator
                .update_force(bodies, registration.body, duration);
        }
    }
}
