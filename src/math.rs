//! Small linear-algebra kernel shared by the integrator, the contact basis
//! construction and the impulse solver.
//!
//! Everything here works on `nalgebra` types. Helpers only exist for the
//! operations `nalgebra` does not express directly in the form the solver
//! needs (skew matrices, inertia tensors, contact bases, the incremental
//! quaternion update).

use nalgebra::{Isometry3, Matrix3, Point3, Quaternion, UnitQuaternion, Vector3};

// ComplexField provides sqrt() for f32 in no_std via libm
#[allow(unused_imports)]
use nalgebra::ComplexField;

/// Returns the skew-symmetric matrix of `v`, such that `skew(a) * b == a × b`.
#[inline]
pub fn skew_symmetric(v: &Vector3<f32>) -> Matrix3<f32> {
    Matrix3::new(
        0.0, -v.z, v.y, //
        v.z, 0.0, -v.x, //
        -v.y, v.x, 0.0,
    )
}

/// Inverts a 3×3 matrix.
///
/// Returns `None` when the matrix is singular or when the inverse is not
/// finite (a near-zero determinant), so callers can pick a fallback instead
/// of propagating NaN/Infinity.
#[inline]
pub fn invert(m: &Matrix3<f32>) -> Option<Matrix3<f32>> {
    m.try_inverse().filter(|inv| inv.iter().all(|x| x.is_finite()))
}

/// Rotates a body-space (inverse) inertia tensor into world space:
/// `R · I · Rᵀ`.
#[inline]
pub fn transform_inertia_tensor(
    local: &Matrix3<f32>,
    orientation: &UnitQuaternion<f32>,
) -> Matrix3<f32> {
    let r = orientation.to_rotation_matrix();
    r.matrix() * local * r.matrix().transpose()
}

/// Builds an inertia tensor from principal moments and products of inertia.
pub fn inertia_tensor_coeffs(ix: f32, iy: f32, iz: f32, ixy: f32, ixz: f32, iyz: f32) -> Matrix3<f32> {
    Matrix3::new(
        ix, -ixy, -ixz, //
        -ixy, iy, -iyz, //
        -ixz, -iyz, iz,
    )
}

/// Inertia tensor of a rectangular block with the given half-extents.
///
/// Uses the `0.3 · m · (b² + c²)` coefficients per axis pair.
pub fn block_inertia_tensor(half_extents: &Vector3<f32>, mass: f32) -> Matrix3<f32> {
    let sq = half_extents.component_mul(half_extents);
    inertia_tensor_coeffs(
        0.3 * mass * (sq.y + sq.z),
        0.3 * mass * (sq.x + sq.z),
        0.3 * mass * (sq.x + sq.y),
        0.0,
        0.0,
        0.0,
    )
}

/// Inertia tensor of a solid sphere: `I = (2/5) · m · r²` on every axis.
pub fn solid_sphere_inertia_tensor(radius: f32, mass: f32) -> Matrix3<f32> {
    let i = 0.4 * mass * radius * radius;
    Matrix3::from_diagonal(&Vector3::new(i, i, i))
}

/// Builds an orthonormal basis whose first column is `normal`.
///
/// The two tangents are derived from whichever world axis the normal is
/// furthest from, which keeps the intermediate cross product away from
/// zero. `normal` must be unit length.
pub fn contact_basis(normal: &Vector3<f32>) -> Matrix3<f32> {
    let n = normal;

    let t0 = if n.x.abs() > n.y.abs() {
        // Closer to the X axis: build from world Y.
        let s = 1.0 / (n.z * n.z + n.x * n.x).sqrt();
        Vector3::new(n.z * s, 0.0, -n.x * s)
    } else {
        // Closer to the Y axis: build from world X.
        let s = 1.0 / (n.z * n.z + n.y * n.y).sqrt();
        Vector3::new(0.0, -n.z * s, n.y * s)
    };
    let t1 = n.cross(&t0);

    Matrix3::from_columns(&[*n, t0, t1])
}

/// Integrates an angular displacement `v · scale` into `q` and renormalizes:
/// `q' = q + ½ · (0, v·scale) · q`.
pub fn add_scaled_rotation(
    q: &UnitQuaternion<f32>,
    v: &Vector3<f32>,
    scale: f32,
) -> UnitQuaternion<f32> {
    let half = 0.5 * scale;
    let dq = Quaternion::new(0.0, v.x * half, v.y * half, v.z * half);
    let q = q.into_inner();
    UnitQuaternion::new_normalize(q + dq * q)
}

/// Transforms a point (stored as a vector) by an isometry.
#[inline]
pub fn transform_point(iso: &Isometry3<f32>, p: &Vector3<f32>) -> Vector3<f32> {
    iso.transform_point(&Point3::from(*p)).coords
}

/// Transforms a world point into the isometry's local frame.
#[inline]
pub fn inverse_transform_point(iso: &Isometry3<f32>, p: &Vector3<f32>) -> Vector3<f32> {
    iso.inverse_transform_point(&Point3::from(*p)).coords
}
