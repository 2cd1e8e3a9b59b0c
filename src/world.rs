//! Fixed-capacity simulation world.
//!
//! [`PhysicsWorld`] owns the bodies and collision primitives and wires one
//! step together: force generators and gravity, integration, contact
//! generation over every primitive pair, contact generators, then the
//! resolver.
//!
//! # Example
//! ```
//! use embedded_rigid3d::shape::{CollisionPlane, CollisionPrimitive, CollisionSphere};
//! use embedded_rigid3d::body::RigidBody;
//! use embedded_rigid3d::world::PhysicsWorld;
//! use nalgebra::Vector3;
//!
//! let mut world = PhysicsWorld::<4>::new();
//! world.set_gravity(Vector3::new(0.0, -9.81, 0.0));
//!
//! let ball = world
//!     .add_body(RigidBody::new(1.0).with_position(Vector3::new(0.0, 3.0, 0.0)))
//!     .unwrap();
//! world.add_primitive(CollisionPrimitive::Sphere(CollisionSphere::new(ball, 0.5)));
//! world.add_primitive(CollisionPrimitive::Plane(CollisionPlane::new(Vector3::y(), 0.0)));
//!
//! let report = world.step(1.0 / 60.0).unwrap();
//! assert!(report.contacted.is_empty());
//! ```

use heapless::Vec;
use log::debug;
use nalgebra::Vector3;

use crate::body::{BodyId, RigidBody};
use crate::collide;
use crate::contact::{Contact, ContactBuffer, DEFAULT_CONTACT_CAPACITY};
use crate::error::PhysicsError;
use crate::force::{ForceGenerator, ForceRegistry, Gravity};
use crate::joint::ContactGenerator;
use crate::resolver::{ContactResolver, Resolution, ResolverConfig};
use crate::shape::CollisionPrimitive;

/// World-level settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldConfig {
    /// Applied to every awake, movable body as a force each step.
    pub gravity: Vector3<f32>,
    /// Friction of contacts written by the shape generators.
    pub friction: f32,
    /// Restitution of contacts written by the shape generators.
    pub restitution: f32,
    pub resolver: ResolverConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vector3::zeros(),
            friction: 0.9,
            restitution: 0.1,
            resolver: ResolverConfig::default(),
        }
    }
}

impl WorldConfig {
    pub fn with_gravity(mut self, gravity: Vector3<f32>) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_material(mut self, friction: f32, restitution: f32) -> Self {
        self.friction = friction;
        self.restitution = restitution;
        self
    }

    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn validate(&self) -> Result<(), PhysicsError> {
        if self.friction.is_nan() || self.friction < 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "friction must be non-negative",
            });
        }
        if !(0.0..=1.0).contains(&self.restitution) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "restitution must lie in [0, 1]",
            });
        }
        if !(self.gravity.x.is_finite() && self.gravity.y.is_finite() && self.gravity.z.is_finite()) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "gravity must be finite",
            });
        }
        self.resolver.validate()
    }
}

/// Outcome of one [`PhysicsWorld::step`].
#[derive(Debug, Clone, Default)]
pub struct StepReport<const C: usize = DEFAULT_CONTACT_CAPACITY> {
    /// Each pair of bodies whose shapes touched, listed once. `None` stands
    /// for static geometry. When both sides are bodies the lower id comes
    /// first.
    pub contacted: Vec<(BodyId, Option<BodyId>), C>,
    /// Contacts handed to the resolver, joint contacts included.
    pub contact_count: usize,
    pub resolution: Resolution,
}

impl<const C: usize> StepReport<C> {
    /// Whether `a` and `b` touched this step. `b == None` asks about static
    /// geometry.
    pub fn touched(&self, a: BodyId, b: Option<BodyId>) -> bool {
        self.contacted.contains(&ordered_pair(a, b))
    }

    fn record(&mut self, pair: (BodyId, Option<BodyId>)) {
        if !self.contacted.contains(&pair) {
            // Capacity equals the contact buffer's, so this cannot overflow.
            let _ = self.contacted.push(pair);
        }
    }

    fn merge(&mut self, other: &StepReport<C>) {
        for pair in other.contacted.iter() {
            self.record(*pair);
        }
        self.contact_count += other.contact_count;
        self.resolution.position_iterations_used += other.resolution.position_iterations_used;
        self.resolution.velocity_iterations_used += other.resolution.velocity_iterations_used;
    }
}

fn ordered_pair(a: BodyId, b: Option<BodyId>) -> (BodyId, Option<BodyId>) {
    match b {
        Some(b) if b < a => (b, Some(a)),
        _ => (a, b),
    }
}

/// The physics simulation world.
///
/// # Type Parameters
/// * `N` - Maximum number of bodies, of collision primitives, and of force
///   registrations.
/// * `M` - Maximum number of contact generators (joints).
/// * `C` - Contact buffer capacity per step.
pub struct PhysicsWorld<'a, const N: usize, const M: usize = 0, const C: usize = DEFAULT_CONTACT_CAPACITY> {
    bodies: Vec<RigidBody, N>,
    primitives: Vec<CollisionPrimitive<'a>, N>,
    generators: Vec<&'a dyn ContactGenerator, M>,
    forces: ForceRegistry<'a, N>,
    buffer: ContactBuffer<C>,
    resolver: ContactResolver,
    gravity: Gravity,
}

impl<'a, const N: usize, const M: usize, const C: usize> Default for PhysicsWorld<'a, N, M, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, const N: usize, const M: usize, const C: usize> PhysicsWorld<'a, N, M, C> {
    /// Create a world with [`WorldConfig::default`]: no gravity.
    pub fn new() -> Self {
        let config = WorldConfig::default();
        Self {
            bodies: Vec::new(),
            primitives: Vec::new(),
            generators: Vec::new(),
            forces: ForceRegistry::new(),
            buffer: ContactBuffer::new()
                .with_friction(config.friction)
                .with_restitution(config.restitution),
            resolver: ContactResolver::new(),
            gravity: Gravity::new(config.gravity),
        }
    }

    pub fn with_config(config: WorldConfig) -> Result<Self, PhysicsError> {
        config.validate()?;
        let mut world = Self::new();
        world.buffer.friction = config.friction;
        world.buffer.restitution = config.restitution;
        world.resolver = ContactResolver::with_config(config.resolver)?;
        world.gravity = Gravity::new(config.gravity);
        Ok(world)
    }

    /// Set the gravity vector (e.g., `Vector3::new(0.0, -9.81, 0.0)`).
    pub fn set_gravity(&mut self, gravity: Vector3<f32>) {
        self.gravity.gravity = gravity;
    }

    pub fn gravity(&self) -> Vector3<f32> {
        self.gravity.gravity
    }

    pub fn resolver(&self) -> &ContactResolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut ContactResolver {
        &mut self.resolver
    }

    // -- Bodies --

    /// Add a body to the world. Returns its [`BodyId`], or `None` if at capacity.
    pub fn add_body(&mut self, body: RigidBody) -> Option<BodyId> {
        let id = BodyId::new(self.bodies.len());
        self.bodies.push(body).ok()?;
        Some(id)
    }

    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(id.index())
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(id.index())
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &RigidBody)> {
        self.bodies.iter().enumerate().map(|(i, b)| (BodyId::new(i), b))
    }

    pub fn bodies_mut(&mut self) -> impl Iterator<Item = (BodyId, &mut RigidBody)> {
        self.bodies.iter_mut().enumerate().map(|(i, b)| (BodyId::new(i), b))
    }

    // -- Collision geometry and generators --

    /// Add a collision primitive. Returns its index, or `None` if at
    /// capacity.
    pub fn add_primitive(&mut self, primitive: CollisionPrimitive<'a>) -> Option<usize> {
        let index = self.primitives.len();
        self.primitives.push(primitive).ok()?;
        Some(index)
    }

    pub fn primitive(&self, index: usize) -> Option<&CollisionPrimitive<'a>> {
        self.primitives.get(index)
    }

    pub fn primitive_mut(&mut self, index: usize) -> Option<&mut CollisionPrimitive<'a>> {
        self.primitives.get_mut(index)
    }

    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    /// Add a contact generator such as a [`Joint`](crate::joint::Joint).
    /// Returns `false` if at capacity.
    pub fn add_contact_generator(&mut self, generator: &'a dyn ContactGenerator) -> bool {
        self.generators.push(generator).is_ok()
    }

    /// Register `generator` to act on `body` every step. Returns `false` if
    /// at capacity.
    pub fn add_force_generator(&mut self, body: BodyId, generator: &'a dyn ForceGenerator) -> bool {
        self.forces.add(body, generator)
    }

    pub fn remove_force_generator(&mut self, body: BodyId, generator: &'a dyn ForceGenerator) -> bool {
        self.forces.remove(body, generator)
    }

    /// Contacts from the last [`generate_contacts`](Self::generate_contacts)
    /// or [`step`](Self::step). After a step they hold the resolver's
    /// updated values.
    pub fn contacts(&self) -> &[Contact] {
        self.buffer.contacts()
    }

    // -- Simulation --

    /// Refill the contact buffer from the current poses. Returns the number
    /// of contacts written.
    pub fn generate_contacts(&mut self) -> Result<usize, PhysicsError> {
        self.detect_collisions()?;
        self.run_contact_generators();
        Ok(self.buffer.len())
    }

    /// Advance the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f32) -> Result<StepReport<C>, PhysicsError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "time step must be positive and finite",
            });
        }

        // --- Forces ---
        self.forces.update_forces(&mut self.bodies, dt);
        if self.gravity.gravity != Vector3::zeros() {
            for i in 0..self.bodies.len() {
                self.gravity.update_force(&mut self.bodies, BodyId::new(i), dt);
            }
        }

        // --- Integration ---
        for body in self.bodies.iter_mut() {
            body.integrate(dt);
        }

        // --- Contacts ---
        let mut report = StepReport::default();
        let collisions = self.detect_collisions()?;
        for contact in &self.buffer.contacts()[..collisions] {
            if let Some(pair) = contacted_pair(contact) {
                report.record(pair);
            }
        }
        self.run_contact_generators();
        report.contact_count = self.buffer.len();

        // --- Resolution ---
        report.resolution = self
            .resolver
            .resolve_contacts(self.buffer.contacts_mut(), &mut self.bodies, dt);

        Ok(report)
    }

    /// Advance by `dt` in `substeps` equal steps. The report lists every pair
    /// contacted in any substep and sums the counts.
    pub fn step_fixed(&mut self, dt: f32, substeps: u32) -> Result<StepReport<C>, PhysicsError> {
        if substeps == 0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "substeps must be positive",
            });
        }
        let sub_dt = dt / substeps as f32;
        let mut total = StepReport::default();
        for _ in 0..substeps {
            let report = self.step(sub_dt)?;
            total.merge(&report);
        }
        Ok(total)
    }

    /// Shape-pair pass. Returns the number of contacts written.
    fn detect_collisions(&mut self) -> Result<usize, PhysicsError> {
        self.buffer.reset();
        for primitive in self.primitives.iter_mut() {
            primitive.update(&self.bodies);
        }

        let len = self.primitives.len();
        'outer: for i in 0..len {
            let a = &self.primitives[i];
            for j in (i + 1)..len {
                if !self.buffer.has_more_contacts() {
                    debug!("contact buffer full after {} contacts", C);
                    break 'outer;
                }
                let b = &self.primitives[j];
                if a.is_static() && b.is_static() {
                    continue;
                }
                if a.body().is_some() && a.body() == b.body() {
                    continue;
                }
                if !self.is_moving(a.body()) && !self.is_moving(b.body()) {
                    continue;
                }
                if !a.may_touch(b) {
                    continue;
                }
                collide::generate_contacts(a, b, &mut self.buffer)?;
            }
        }
        Ok(self.buffer.len())
    }

    fn run_contact_generators(&mut self) {
        for generator in self.generators.iter() {
            if !self.buffer.has_more_contacts() {
                break;
            }
            if let Some(contact) = generator.generate_contact(&self.bodies) {
                self.buffer.push_contact(contact);
            }
        }
    }

    fn is_moving(&self, id: Option<BodyId>) -> bool {
        id.and_then(|id| self.bodies.get(id.index()))
            .is_some_and(|b| b.is_awake() && b.has_finite_mass())
    }
}

fn contacted_pair(contact: &Contact) -> Option<(BodyId, Option<BodyId>)> {
    match contact.bodies {
        [Some(a), b] => Some(ordered_pair(a, b)),
        [None, Some(b)] => Some((b, None)),
        [None, None] => None,
    }
}
