//! Rigid bodies.
//!
//! A [`RigidBody`] holds mass properties, pose, velocities and force/torque
//! accumulators, and advances itself with a semi-implicit Euler integrator.
//! Bodies whose kinetic energy stays low fall asleep and are skipped by
//! [`RigidBody::integrate`] until something wakes them.
//!
//! # Example
//! ```
//! use embedded_rigid3d::body::RigidBody;
//! use nalgebra::Vector3;
//!
//! let mut ball = RigidBody::new(1.0)
//!     .with_position(Vector3::new(0.0, 10.0, 0.0))
//!     .with_acceleration(Vector3::new(0.0, -9.81, 0.0))
//!     .with_damping(1.0, 1.0);
//!
//! ball.integrate(0.5);
//! assert!(ball.position().y < 10.0);
//! ```

use log::warn;
use nalgebra::{Isometry3, Matrix3, Translation3, UnitQuaternion, Vector3};

// ComplexField provides powf() for f32 in no_std via libm
#[allow(unused_imports)]
use nalgebra::ComplexField;

use crate::error::PhysicsError;
use crate::math;

/// Kinetic-energy level below which a body may fall asleep.
pub const SLEEP_EPSILON: f32 = 0.3;

/// Default fraction of linear velocity retained per second.
pub const DEFAULT_LINEAR_DAMPING: f32 = 0.99;

/// Default fraction of angular velocity retained per second.
pub const DEFAULT_ANGULAR_DAMPING: f32 = 0.99;

/// Index of a [`RigidBody`] inside the body slice handed to the collision
/// and resolution code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(usize);

impl BodyId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

/// A rigid body with linear and angular dynamics.
///
/// The derived data (transform and world-space inverse inertia) is kept in
/// sync by every mutation path: setters, [`integrate`](Self::integrate) and
/// the resolver's position correction all call
/// [`calculate_derived_data`](Self::calculate_derived_data).
#[derive(Debug, Clone)]
pub struct RigidBody {
    // -- Mass properties --
    inverse_mass: f32,
    inverse_inertia_tensor: Matrix3<f32>,
    inverse_inertia_tensor_world: Matrix3<f32>,

    // -- Damping (fraction retained per second) --
    linear_damping: f32,
    angular_damping: f32,

    // -- State --
    position: Vector3<f32>,
    orientation: UnitQuaternion<f32>,
    velocity: Vector3<f32>,
    /// Angular velocity in world space (radians per second).
    rotation: Vector3<f32>,
    /// Constant acceleration (usually gravity), applied every step.
    acceleration: Vector3<f32>,
    /// Linear acceleration actually used by the last integration step.
    last_frame_acceleration: Vector3<f32>,

    force_accumulator: Vector3<f32>,
    torque_accumulator: Vector3<f32>,

    transform: Isometry3<f32>,

    // -- Sleep --
    is_awake: bool,
    can_sleep: bool,
    /// Exponential moving average of `v·v + ω·ω`.
    motion: f32,
    sleep_epsilon: f32,
}

impl RigidBody {
    /// Create a new dynamic rigid body with the given mass (in kg).
    ///
    /// The body starts with the inertia of a unit solid sphere. Use
    /// [`with_inertia_tensor`](Self::with_inertia_tensor) or
    /// [`CollisionBox::set_state`](crate::shape::CollisionBox::set_state)
    /// for the real shape.
    ///
    /// # Panics
    /// Panics if `mass` is not positive and finite.
    pub fn new(mass: f32) -> Self {
        assert!(mass > 0.0 && mass.is_finite(), "mass must be positive and finite");
        let inv_i = 1.0 / (0.4 * mass);
        let mut body = Self::with_inverse_mass(
            1.0 / mass,
            Matrix3::from_diagonal(&Vector3::new(inv_i, inv_i, inv_i)),
        );
        body.calculate_derived_data();
        body
    }

    /// Create a body with infinite mass. It is never moved by forces or
    /// contacts, but still integrates any velocity it is given.
    pub fn new_static() -> Self {
        let mut body = Self::with_inverse_mass(0.0, Matrix3::zeros());
        body.linear_damping = 1.0;
        body.angular_damping = 1.0;
        body.calculate_derived_data();
        body
    }

    fn with_inverse_mass(inverse_mass: f32, inverse_inertia_tensor: Matrix3<f32>) -> Self {
        Self {
            inverse_mass,
            inverse_inertia_tensor,
            inverse_inertia_tensor_world: inverse_inertia_tensor,
            linear_damping: DEFAULT_LINEAR_DAMPING,
            angular_damping: DEFAULT_ANGULAR_DAMPING,
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            velocity: Vector3::zeros(),
            rotation: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            last_frame_acceleration: Vector3::zeros(),
            force_accumulator: Vector3::zeros(),
            torque_accumulator: Vector3::zeros(),
            transform: Isometry3::identity(),
            is_awake: true,
            can_sleep: true,
            motion: SLEEP_EPSILON * 2.0,
            sleep_epsilon: SLEEP_EPSILON,
        }
    }

    /// Builder: set initial position.
    pub fn with_position(mut self, position: Vector3<f32>) -> Self {
        self.set_position(position);
        self
    }

    /// Builder: set initial orientation.
    pub fn with_orientation(mut self, orientation: UnitQuaternion<f32>) -> Self {
        self.set_orientation(orientation);
        self
    }

    /// Builder: set initial velocity.
    pub fn with_velocity(mut self, velocity: Vector3<f32>) -> Self {
        self.velocity = velocity;
        self
    }

    /// Builder: set initial angular velocity (in radians per second).
    pub fn with_rotation(mut self, rotation: Vector3<f32>) -> Self {
        self.rotation = rotation;
        self
    }

    /// Builder: set the constant acceleration (e.g. gravity).
    pub fn with_acceleration(mut self, acceleration: Vector3<f32>) -> Self {
        self.acceleration = acceleration;
        self
    }

    /// Builder: set linear and angular damping (fraction retained per second, 0.0..=1.0).
    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.set_damping(linear, angular);
        self
    }

    /// Builder: set the body-space inertia tensor.
    ///
    /// A singular tensor is logged and ignored; use
    /// [`set_inertia_tensor`](Self::set_inertia_tensor) to handle the error.
    pub fn with_inertia_tensor(mut self, tensor: Matrix3<f32>) -> Self {
        if self.set_inertia_tensor(&tensor).is_err() {
            warn!("with_inertia_tensor: singular tensor ignored");
        }
        self
    }

    /// Builder: allow or forbid sleeping.
    pub fn with_can_sleep(mut self, can_sleep: bool) -> Self {
        self.set_can_sleep(can_sleep);
        self
    }

    /// Builder: set the kinetic-energy level below which the body falls asleep.
    pub fn with_sleep_epsilon(mut self, sleep_epsilon: f32) -> Self {
        self.sleep_epsilon = sleep_epsilon.max(0.0);
        self
    }

    // -- Mass --

    /// Set the mass (in kg).
    ///
    /// # Panics
    /// Panics if `mass` is not positive and finite.
    pub fn set_mass(&mut self, mass: f32) {
        assert!(mass > 0.0 && mass.is_finite(), "mass must be positive and finite");
        self.inverse_mass = 1.0 / mass;
    }

    /// Returns the mass, or `f32::INFINITY` for immovable bodies.
    pub fn mass(&self) -> f32 {
        if self.inverse_mass == 0.0 {
            f32::INFINITY
        } else {
            1.0 / self.inverse_mass
        }
    }

    /// Set the inverse mass directly. Zero means infinite mass.
    pub fn set_inverse_mass(&mut self, inverse_mass: f32) {
        self.inverse_mass = inverse_mass.max(0.0);
    }

    #[inline]
    pub fn inverse_mass(&self) -> f32 {
        self.inverse_mass
    }

    #[inline]
    pub fn has_finite_mass(&self) -> bool {
        self.inverse_mass > 0.0
    }

    /// Set the body-space inertia tensor. Fails if it cannot be inverted.
    pub fn set_inertia_tensor(&mut self, tensor: &Matrix3<f32>) -> Result<(), PhysicsError> {
        let inverse = math::invert(tensor).ok_or(PhysicsError::SingularInertiaTensor)?;
        self.set_inverse_inertia_tensor(inverse);
        Ok(())
    }

    /// Set the body-space inverse inertia tensor. Zero makes the body
    /// rotationally immovable.
    pub fn set_inverse_inertia_tensor(&mut self, inverse: Matrix3<f32>) {
        self.inverse_inertia_tensor = inverse;
        self.inverse_inertia_tensor_world =
            math::transform_inertia_tensor(&self.inverse_inertia_tensor, &self.orientation);
    }

    #[inline]
    pub fn inverse_inertia_tensor(&self) -> &Matrix3<f32> {
        &self.inverse_inertia_tensor
    }

    /// World-space inverse inertia tensor as of the last derive step.
    #[inline]
    pub fn inverse_inertia_tensor_world(&self) -> &Matrix3<f32> {
        &self.inverse_inertia_tensor_world
    }

    /// Set linear and angular damping, each the fraction of velocity that
    /// survives one second (1.0 = no damping).
    pub fn set_damping(&mut self, linear: f32, angular: f32) {
        self.linear_damping = linear.clamp(0.0, 1.0);
        self.angular_damping = angular.clamp(0.0, 1.0);
    }

    pub fn linear_damping(&self) -> f32 {
        self.linear_damping
    }

    pub fn angular_damping(&self) -> f32 {
        self.angular_damping
    }

    // -- Pose --

    #[inline]
    pub fn position(&self) -> Vector3<f32> {
        self.position
    }

    pub fn set_position(&mut self, position: Vector3<f32>) {
        self.position = position;
        self.calculate_derived_data();
    }

    /// Translate the body. Used by the resolver's position correction.
    pub fn translate(&mut self, delta: &Vector3<f32>) {
        self.position += delta;
    }

    #[inline]
    pub fn orientation(&self) -> UnitQuaternion<f32> {
        self.orientation
    }

    pub fn set_orientation(&mut self, orientation: UnitQuaternion<f32>) {
        self.orientation = orientation;
        self.calculate_derived_data();
    }

    /// Rotate the body by the small angular displacement `delta`
    /// (axis × angle, in world space).
    pub fn rotate_by(&mut self, delta: &Vector3<f32>) {
        self.orientation = math::add_scaled_rotation(&self.orientation, delta, 1.0);
    }

    /// World transform as of the last derive step.
    #[inline]
    pub fn transform(&self) -> &Isometry3<f32> {
        &self.transform
    }

    /// Recompute the transform and world-space inverse inertia tensor from
    /// the current position and orientation.
    pub fn calculate_derived_data(&mut self) {
        self.orientation.renormalize();
        self.transform = Isometry3::from_parts(Translation3::from(self.position), self.orientation);
        self.inverse_inertia_tensor_world =
            math::transform_inertia_tensor(&self.inverse_inertia_tensor, &self.orientation);
    }

    /// Convert a body-local point to world space.
    #[inline]
    pub fn point_in_world_space(&self, point: &Vector3<f32>) -> Vector3<f32> {
        math::transform_point(&self.transform, point)
    }

    /// Convert a world point to body-local space.
    #[inline]
    pub fn point_in_local_space(&self, point: &Vector3<f32>) -> Vector3<f32> {
        math::inverse_transform_point(&self.transform, point)
    }

    #[inline]
    pub fn direction_in_world_space(&self, direction: &Vector3<f32>) -> Vector3<f32> {
        self.transform.rotation * direction
    }

    #[inline]
    pub fn direction_in_local_space(&self, direction: &Vector3<f32>) -> Vector3<f32> {
        self.transform.rotation.inverse_transform_vector(direction)
    }

    // -- Velocities --

    #[inline]
    pub fn velocity(&self) -> Vector3<f32> {
        self.velocity
    }

    /// Set the linear velocity. Wakes the body.
    pub fn set_velocity(&mut self, velocity: Vector3<f32>) {
        self.velocity = velocity;
        self.wake();
    }

    /// Add to the linear velocity without touching the sleep state.
    pub fn add_velocity(&mut self, delta: &Vector3<f32>) {
        self.velocity += delta;
    }

    /// Angular velocity in world space (radians per second).
    #[inline]
    pub fn rotation(&self) -> Vector3<f32> {
        self.rotation
    }

    /// Set the angular velocity. Wakes the body.
    pub fn set_rotation(&mut self, rotation: Vector3<f32>) {
        self.rotation = rotation;
        self.wake();
    }

    /// Add to the angular velocity without touching the sleep state.
    pub fn add_rotation(&mut self, delta: &Vector3<f32>) {
        self.rotation += delta;
    }

    #[inline]
    pub fn acceleration(&self) -> Vector3<f32> {
        self.acceleration
    }

    pub fn set_acceleration(&mut self, acceleration: Vector3<f32>) {
        self.acceleration = acceleration;
    }

    /// Linear acceleration applied during the last [`integrate`](Self::integrate).
    #[inline]
    pub fn last_frame_acceleration(&self) -> Vector3<f32> {
        self.last_frame_acceleration
    }

    /// Returns the current speed (magnitude of velocity).
    #[inline]
    pub fn speed(&self) -> f32 {
        self.velocity.norm()
    }

    /// Returns the linear kinetic energy `0.5 * m * v²` (zero for immovable bodies).
    #[inline]
    pub fn kinetic_energy(&self) -> f32 {
        if self.has_finite_mass() {
            0.5 * self.velocity.norm_squared() / self.inverse_mass
        } else {
            0.0
        }
    }

    // -- Forces --

    /// Apply a world-space force through the centre of mass. Wakes the body.
    #[inline]
    pub fn add_force(&mut self, force: &Vector3<f32>) {
        self.force_accumulator += force;
        self.wake();
    }

    /// Apply a world-space torque. Wakes the body.
    #[inline]
    pub fn add_torque(&mut self, torque: &Vector3<f32>) {
        self.torque_accumulator += torque;
        self.wake();
    }

    /// Apply a world-space force at a world-space point. Wakes the body.
    pub fn add_force_at_point(&mut self, force: &Vector3<f32>, point: &Vector3<f32>) {
        let lever = point - self.position;
        self.force_accumulator += force;
        self.torque_accumulator += lever.cross(force);
        self.wake();
    }

    /// Apply a world-space force at a body-local point. Wakes the body.
    pub fn add_force_at_body_point(&mut self, force: &Vector3<f32>, point: &Vector3<f32>) {
        let world_point = self.point_in_world_space(point);
        self.add_force_at_point(force, &world_point);
    }

    pub fn force_accumulator(&self) -> Vector3<f32> {
        self.force_accumulator
    }

    pub fn torque_accumulator(&self) -> Vector3<f32> {
        self.torque_accumulator
    }

    pub fn clear_accumulators(&mut self) {
        self.force_accumulator = Vector3::zeros();
        self.torque_accumulator = Vector3::zeros();
    }

    // -- Sleep --

    #[inline]
    pub fn is_awake(&self) -> bool {
        self.is_awake
    }

    /// Wake the body up or put it to sleep.
    ///
    /// Waking resets the motion average to twice the sleep threshold so the
    /// body stays up for a while. Sleeping zeroes both velocities.
    pub fn set_awake(&mut self, awake: bool) {
        if awake {
            self.is_awake = true;
            self.motion = self.sleep_epsilon * 2.0;
        } else {
            self.is_awake = false;
            self.velocity = Vector3::zeros();
            self.rotation = Vector3::zeros();
        }
    }

    fn wake(&mut self) {
        if !self.is_awake {
            self.set_awake(true);
        }
    }

    #[inline]
    pub fn can_sleep(&self) -> bool {
        self.can_sleep
    }

    /// Allow or forbid sleeping. Forbidding it wakes a sleeping body.
    pub fn set_can_sleep(&mut self, can_sleep: bool) {
        self.can_sleep = can_sleep;
        if !can_sleep {
            self.wake();
        }
    }

    /// Current kinetic-energy moving average.
    #[inline]
    pub fn motion(&self) -> f32 {
        self.motion
    }

    pub fn sleep_epsilon(&self) -> f32 {
        self.sleep_epsilon
    }

    /// Integrate this body forward by `dt` seconds using semi-implicit Euler.
    ///
    /// Velocity is updated first, then position and orientation. Sleeping
    /// bodies are left untouched.
    pub fn integrate(&mut self, dt: f32) {
        if !self.is_awake {
            return;
        }

        // --- Accelerations ---
        self.last_frame_acceleration = self.acceleration + self.force_accumulator * self.inverse_mass;
        let angular_acceleration = self.inverse_inertia_tensor_world * self.torque_accumulator;

        // --- Velocities ---
        self.velocity += self.last_frame_acceleration * dt;
        self.rotation += angular_acceleration * dt;

        self.velocity *= self.linear_damping.powf(dt);
        self.rotation *= self.angular_damping.powf(dt);

        // --- Pose ---
        self.position += self.velocity * dt;
        self.orientation = math::add_scaled_rotation(&self.orientation, &self.rotation, dt);

        self.calculate_derived_data();
        self.clear_accumulators();

        if self.can_sleep {
            let current_motion = self.velocity.norm_squared() + self.rotation.norm_squared();
            let bias = 0.5f32.powf(dt);
            self.motion = bias * self.motion + (1.0 - bias) * current_motion;

            if self.motion < self.sleep_epsilon {
                self.set_awake(false);
            } else if self.motion > 10.0 * self.sleep_epsilon {
                self.motion = 10.0 * self.sleep_epsilon;
            }
        }
    }
}
