//! Error type for the few operations that can genuinely fail.
//!
//! Hot paths never return errors: an exhausted contact buffer or degenerate
//! geometry degrades to a defined fallback instead. What remains are
//! configuration mistakes that should surface immediately.

use core::fmt;

use crate::shape::ShapeKind;

/// Errors reported by the physics core.
#[derive(Clone, Debug, PartialEq)]
pub enum PhysicsError {
    /// The dispatch table has no contact generator for this shape pair.
    UnsupportedShapePair {
        /// Shape kind of the first primitive.
        first: ShapeKind,
        /// Shape kind of the second primitive.
        second: ShapeKind,
    },
    /// An inertia tensor could not be inverted.
    SingularInertiaTensor,
    /// A configuration parameter is out of range.
    InvalidConfiguration {
        /// Which parameter was rejected.
        reason: &'static str,
    },
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedShapePair { first, second } => {
                write!(f, "no contact generator for {first} vs {second}")
            }
            Self::SingularInertiaTensor => write!(f, "inertia tensor is singular"),
            Self::InvalidConfiguration { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
        }
    }
}

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "std")]
impl std::error::Error for PhysicsError {}
