//! Rigid-body dynamics for `no_std` targets.
//!
//! Bodies integrate with semi-implicit Euler, collision primitives produce
//! contacts through an exhaustive pair dispatch, and an iterative resolver
//! removes interpenetration and then applies impulses with friction.
//! Everything lives in fixed-capacity `heapless` storage.
//!
//! # Example
//! ```
//! use embedded_rigid3d::{
//!     CollisionBox, CollisionPlane, CollisionPrimitive, PhysicsWorld, RigidBody,
//! };
//! use nalgebra::Vector3;
//!
//! let mut world = PhysicsWorld::<8>::new();
//! world.set_gravity(Vector3::new(0.0, -9.81, 0.0));
//!
//! let crate_id = world
//!     .add_body(RigidBody::new(2.0).with_position(Vector3::new(0.0, 2.0, 0.0)))
//!     .unwrap();
//! world.add_primitive(CollisionPrimitive::Box(CollisionBox::new(
//!     crate_id,
//!     Vector3::new(0.5, 0.5, 0.5),
//! )));
//! world.add_primitive(CollisionPrimitive::Plane(CollisionPlane::new(Vector3::y(), 0.0)));
//!
//! for _ in 0..120 {
//!     world.step(1.0 / 60.0).unwrap();
//! }
//! assert!(world.body(crate_id).unwrap().position().y > 0.0);
//! ```
#![no_std]

pub mod body;
pub mod collide;
pub mod contact;
pub mod error;
pub mod force;
pub mod intersect;
pub mod joint;
pub mod math;
pub mod resolver;
pub mod shape;
pub mod world;

pub use body::{BodyId, RigidBody};
pub use contact::{Contact, ContactBuffer};
pub use error::PhysicsError;
pub use force::{ForceGenerator, ForceRegistry, Gravity, Spring};
pub use joint::{ContactGenerator, Joint, Rod};
pub use resolver::{ContactResolver, Resolution, ResolverConfig};
pub use shape::{
    CollisionBox, CollisionPlane, CollisionPrimitive, CollisionSphere, ShapeKind, Triangle, TriangleSoup,
};
pub use world::{PhysicsWorld, StepReport, WorldConfig};
