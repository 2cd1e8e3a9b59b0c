//! Iterative contact resolution.
//!
//! Each step the resolver prepares every contact, then runs two greedy
//! passes. The position pass repeatedly fixes the deepest contact and
//! updates the penetration of every contact sharing a moved body. The
//! velocity pass does the same with the largest desired velocity change.
//! The epsilons end both passes; the iteration caps are safety bounds.

use log::debug;
use nalgebra::Vector3;

use crate::body::{BodyId, RigidBody};
use crate::contact::{BodyChanges, Contact};
use crate::error::PhysicsError;

/// Default iteration cap for each pass.
pub const DEFAULT_ITERATIONS: usize = 2048;

/// Default penetration and velocity tolerance.
pub const DEFAULT_EPSILON: f32 = 0.01;

/// Tuning for [`ContactResolver`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverConfig {
    /// Cap on contacts resolved by the velocity pass.
    pub velocity_iterations: usize,
    /// Cap on contacts resolved by the position pass.
    pub position_iterations: usize,
    /// Desired velocity changes at or below this are ignored.
    pub velocity_epsilon: f32,
    /// Penetrations at or below this are ignored.
    pub position_epsilon: f32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            velocity_iterations: DEFAULT_ITERATIONS,
            position_iterations: DEFAULT_ITERATIONS,
            velocity_epsilon: DEFAULT_EPSILON,
            position_epsilon: DEFAULT_EPSILON,
        }
    }
}

impl ResolverConfig {
    /// Builder: same cap for both passes.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.velocity_iterations = iterations;
        self.position_iterations = iterations;
        self
    }

    pub fn with_epsilons(mut self, velocity: f32, position: f32) -> Self {
        self.velocity_epsilon = velocity;
        self.position_epsilon = position;
        self
    }

    pub fn validate(&self) -> Result<(), PhysicsError> {
        if self.velocity_iterations == 0 || self.position_iterations == 0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "iteration caps must be positive",
            });
        }
        if !(self.velocity_epsilon >= 0.0 && self.velocity_epsilon.is_finite()) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "velocity epsilon must be non-negative",
            });
        }
        if !(self.position_epsilon >= 0.0 && self.position_epsilon.is_finite()) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "position epsilon must be non-negative",
            });
        }
        Ok(())
    }
}

/// What one call to [`ContactResolver::resolve_contacts`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resolution {
    pub position_iterations_used: usize,
    pub velocity_iterations_used: usize,
}

/// Sequential-impulse contact resolver.
#[derive(Debug, Clone, Default)]
pub struct ContactResolver {
    config: ResolverConfig,
}

impl ContactResolver {
    /// Resolver with [`ResolverConfig::default`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ResolverConfig) -> Result<Self, PhysicsError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ResolverConfig) -> Result<(), PhysicsError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Resolve `contacts` against `bodies`, which their [`BodyId`]s index.
    ///
    /// Contacts are rewritten in place (penetration and velocities are
    /// updated as other contacts are resolved) and should not be reused.
    pub fn resolve_contacts(
        &mut self,
        contacts: &mut [Contact],
        bodies: &mut [RigidBody],
        dt: f32,
    ) -> Resolution {
        if contacts.is_empty() {
            return Resolution::default();
        }

        for contact in contacts.iter_mut() {
            contact.calculate_internals(bodies, dt);
        }

        Resolution {
            position_iterations_used: self.adjust_positions(contacts, bodies),
            velocity_iterations_used: self.adjust_velocities(contacts, bodies, dt),
        }
    }

    fn adjust_positions(&self, contacts: &mut [Contact], bodies: &mut [RigidBody]) -> usize {
        let mut iterations = 0;
        while iterations < self.config.position_iterations {
            let Some(index) = deepest(contacts, bodies, self.config.position_epsilon, |c| c.penetration) else {
                break;
            };

            contacts[index].match_awake_state(bodies);
            let changes = contacts[index].apply_position_change(bodies);
            let moved = contacts[index].bodies;

            for contact in contacts.iter_mut() {
                for b in 0..2 {
                    if let Some(delta) = displacement(contact, b, &moved, &changes) {
                        let sign = if b == 0 { -1.0 } else { 1.0 };
                        contact.penetration += sign * delta.dot(&contact.normal);
                    }
                }
            }
            iterations += 1;
        }

        if iterations == self.config.position_iterations {
            debug!("position pass hit its cap of {} iterations", iterations);
        }
        iterations
    }

    fn adjust_velocities(&self, contacts: &mut [Contact], bodies: &mut [RigidBody], dt: f32) -> usize {
        let mut iterations = 0;
        while iterations < self.config.velocity_iterations {
            let Some(index) =
                deepest(contacts, bodies, self.config.velocity_epsilon, |c| c.desired_delta_velocity())
            else {
                break;
            };

            contacts[index].match_awake_state(bodies);
            let changes = contacts[index].apply_velocity_change(bodies);
            let moved = contacts[index].bodies;

            for contact in contacts.iter_mut() {
                let mut touched = false;
                for b in 0..2 {
                    if let Some(delta) = displacement(contact, b, &moved, &changes) {
                        let sign = if b == 0 { 1.0 } else { -1.0 };
                        contact.adjust_contact_velocity(&(delta * sign));
                        touched = true;
                    }
                }
                if touched {
                    contact.calculate_desired_delta_velocity(bodies, dt);
                }
            }
            iterations += 1;
        }

        if iterations == self.config.velocity_iterations {
            debug!("velocity pass hit its cap of {} iterations", iterations);
        }
        iterations
    }
}

/// Index of the live contact with the largest `key` above `epsilon`.
/// Contacts whose bodies are all immovable are never picked.
fn deepest(
    contacts: &[Contact],
    bodies: &[RigidBody],
    epsilon: f32,
    key: impl Fn(&Contact) -> f32,
) -> Option<usize> {
    let mut max = epsilon;
    let mut index = None;
    for (i, contact) in contacts.iter().enumerate() {
        if contact.is_inert() || !contact.has_movable_body(bodies) {
            continue;
        }
        let value = key(contact);
        if value > max {
            max = value;
            index = Some(i);
        }
    }
    index
}

/// Motion of `contact`'s point on its body `b` caused by a change to the
/// bodies in `moved`, or `None` if that body was not moved.
///
/// Works for both passes: `changes` holds displacements in the position
/// pass and velocities in the velocity pass.
fn displacement(
    contact: &Contact,
    b: usize,
    moved: &[Option<BodyId>; 2],
    changes: &BodyChanges,
) -> Option<Vector3<f32>> {
    let id = contact.bodies[b]?;
    let mut total: Option<Vector3<f32>> = None;
    for d in 0..2 {
        if moved[d] == Some(id) {
            let delta = changes.linear[d] + changes.angular[d].cross(&contact.relative_contact_position(b));
            *total.get_or_insert_with(Vector3::zeros) += delta;
        }
    }
    total
}
