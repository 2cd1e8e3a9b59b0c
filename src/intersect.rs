//! Narrow-phase intersection predicates.
//!
//! These are pure boolean tests used to cull pairs before contact
//! generation. None of them write contacts or touch bodies.

use nalgebra::Vector3;

// ComplexField provides sqrt() for f32 in no_std via libm
#[allow(unused_imports)]
use nalgebra::ComplexField;

use crate::math;
use crate::shape::{CollisionBox, CollisionPlane, CollisionSphere, Triangle};

/// Squared length below which a cross-product axis is considered degenerate
/// (the two edges are near-parallel).
pub(crate) const AXIS_EPSILON: f32 = 1e-4;

/// Sphere vs half-space: does the sphere reach behind the plane?
pub fn sphere_and_half_space(sphere: &CollisionSphere, plane: &CollisionPlane) -> bool {
    plane.signed_distance(&sphere.center()) - sphere.radius <= 0.0
}

/// Sphere vs sphere.
pub fn sphere_and_sphere(one: &CollisionSphere, two: &CollisionSphere) -> bool {
    let r = one.radius + two.radius;
    (one.center() - two.center()).norm_squared() < r * r
}

/// Sphere vs triangle, using the closest point on the triangle.
pub fn sphere_and_triangle(sphere: &CollisionSphere, triangle: &Triangle) -> bool {
    let center = sphere.center();
    let closest = closest_point_on_triangle(&center, triangle);
    (closest - center).norm_squared() <= sphere.radius * sphere.radius
}

/// Box vs half-space: overlap iff the box's projected half-extent along the
/// plane normal reaches the plane from the centre.
pub fn box_and_half_space(cbox: &CollisionBox, plane: &CollisionPlane) -> bool {
    let projected_radius = cbox.projected_radius(&plane.normal);
    plane.signed_distance(&cbox.center()) - projected_radius <= 0.0
}

/// Box vs box with the separating axis theorem over the 15 candidate axes.
pub fn box_and_box(one: &CollisionBox, two: &CollisionBox) -> bool {
    let to_centre = two.center() - one.center();

    for i in 0..3 {
        if !overlap_on_axis(one, two, &one.axis(i), &to_centre) {
            return false;
        }
        if !overlap_on_axis(one, two, &two.axis(i), &to_centre) {
            return false;
        }
    }
    for i in 0..3 {
        for j in 0..3 {
            let axis = one.axis(i).cross(&two.axis(j));
            if !overlap_on_axis(one, two, &axis, &to_centre) {
                return false;
            }
        }
    }
    true
}

/// Projected overlap of two boxes along `axis` (need not be unit length).
/// Near-zero axes are inconclusive and reported as overlapping.
fn overlap_on_axis(
    one: &CollisionBox,
    two: &CollisionBox,
    axis: &Vector3<f32>,
    to_centre: &Vector3<f32>,
) -> bool {
    if axis.norm_squared() < AXIS_EPSILON {
        return true;
    }
    let axis = axis.normalize();
    let distance = to_centre.dot(&axis).abs();
    distance < one.projected_radius(&axis) + two.projected_radius(&axis)
}

/// Signed overlap of two boxes along a unit `axis`. Negative means separated.
pub(crate) fn penetration_on_axis(
    one: &CollisionBox,
    two: &CollisionBox,
    axis: &Vector3<f32>,
    to_centre: &Vector3<f32>,
) -> f32 {
    let distance = to_centre.dot(axis).abs();
    one.projected_radius(axis) + two.projected_radius(axis) - distance
}

/// Box vs triangle, SAT specialised to an axis-aligned box in box space.
pub fn box_and_triangle(cbox: &CollisionBox, triangle: &Triangle) -> bool {
    let h = cbox.half_extents();
    let v = triangle
        .vertices
        .map(|p| math::inverse_transform_point(cbox.transform(), &p));

    // Triangle bounds against the box faces.
    let mut fully_inside = true;
    for k in 0..3 {
        let min = v[0][k].min(v[1][k]).min(v[2][k]);
        let max = v[0][k].max(v[1][k]).max(v[2][k]);
        if min > h[k] || max < -h[k] {
            return false;
        }
        if min < -h[k] || max > h[k] {
            fully_inside = false;
        }
    }
    if fully_inside {
        return true;
    }

    let edges = [v[1] - v[0], v[2] - v[1], v[0] - v[2]];

    // Triangle plane against the box.
    let normal = edges[0].cross(&edges[1]);
    let r = h.x * normal.x.abs() + h.y * normal.y.abs() + h.z * normal.z.abs();
    if normal.dot(&v[0]).abs() > r {
        return false;
    }

    // Edge × box-axis cross products.
    for edge in edges.iter() {
        for k in 0..3 {
            let axis = Vector3::ith(k, 1.0).cross(edge);
            if axis.norm_squared() < AXIS_EPSILON * AXIS_EPSILON {
                continue;
            }
            let p0 = axis.dot(&v[0]);
            let p1 = axis.dot(&v[1]);
            let p2 = axis.dot(&v[2]);
            let r = h.x * axis.x.abs() + h.y * axis.y.abs() + h.z * axis.z.abs();
            if p0.min(p1).min(p2) > r || p0.max(p1).max(p2) < -r {
                return false;
            }
        }
    }

    true
}

/// Closest point on `triangle` to `p`, by clamped barycentric projection.
pub fn closest_point_on_triangle(p: &Vector3<f32>, triangle: &Triangle) -> Vector3<f32> {
    let [a, b, c] = triangle.vertices;
    let ab = b - a;
    let ac = c - a;

    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let sum = va + vb + vc;
    if sum.abs() < f32::EPSILON {
        // Degenerate triangle: every region test failed on a sliver.
        return a;
    }
    let denom = 1.0 / sum;
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

// ---------------------------------------------------------------------------
// Rays
// ---------------------------------------------------------------------------

/// How far a [`Ray`] reaches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RayExtent {
    /// Half-line starting at the origin.
    Unbounded,
    /// Segment of the given length along the direction.
    Segment(f32),
}

/// A ray with a unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vector3<f32>,
    pub direction: Vector3<f32>,
    pub extent: RayExtent,
}

impl Ray {
    /// Unbounded ray. Returns `None` for a zero direction.
    pub fn new(origin: Vector3<f32>, direction: Vector3<f32>) -> Option<Self> {
        let direction = direction.try_normalize(f32::EPSILON)?;
        Some(Self {
            origin,
            direction,
            extent: RayExtent::Unbounded,
        })
    }

    /// Segment from `from` to `to`. Returns `None` if they coincide.
    pub fn segment(from: Vector3<f32>, to: Vector3<f32>) -> Option<Self> {
        let delta = to - from;
        let length = delta.norm();
        let direction = delta.try_normalize(f32::EPSILON)?;
        Some(Self {
            origin: from,
            direction,
            extent: RayExtent::Segment(length),
        })
    }

    pub fn point_at(&self, distance: f32) -> Vector3<f32> {
        self.origin + self.direction * distance
    }
}

/// Where a ray met a triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Distance from the ray origin along its direction.
    pub distance: f32,
    pub point: Vector3<f32>,
}

/// Ray vs triangle.
///
/// Intersects the ray with the triangle's plane, then classifies the hit in
/// 2D after dropping the coordinate most aligned with the triangle normal,
/// which keeps the projected triangle as large as possible. Rays parallel
/// to the plane and degenerate triangles never hit.
pub fn ray_and_triangle(ray: &Ray, triangle: &Triangle) -> Option<RayHit> {
    let normal = triangle.scaled_normal();
    let denom = normal.dot(&ray.direction);
    if denom.abs() < f32::EPSILON * normal.norm() {
        return None;
    }

    let [a, b, c] = triangle.vertices;
    let t = normal.dot(&(a - ray.origin)) / denom;
    if t < 0.0 {
        return None;
    }
    if let RayExtent::Segment(length) = ray.extent {
        if t > length {
            return None;
        }
    }

    let point = ray.point_at(t);

    let abs_n = normal.abs();
    let (i, j) = if abs_n.x >= abs_n.y && abs_n.x >= abs_n.z {
        (1, 2)
    } else if abs_n.y >= abs_n.z {
        (0, 2)
    } else {
        (0, 1)
    };

    let u0 = point[i] - a[i];
    let v0 = point[j] - a[j];
    let u1 = b[i] - a[i];
    let v1 = b[j] - a[j];
    let u2 = c[i] - a[i];
    let v2 = c[j] - a[j];

    let det = u1 * v2 - u2 * v1;
    if det.abs() < f32::EPSILON {
        return None;
    }
    let beta = (u0 * v2 - u2 * v0) / det;
    let gamma = (u1 * v0 - u0 * v1) / det;

    if beta >= 0.0 && gamma >= 0.0 && beta + gamma <= 1.0 {
        Some(RayHit { distance: t, point })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use crate::body::{BodyId, RigidBody};
    use nalgebra::UnitQuaternion;

    const EPSILON: f32 = 1e-4;

    fn sphere_at(pos: Vector3<f32>, radius: f32) -> CollisionSphere {
        let body = RigidBody::new(1.0).with_position(pos);
        let mut s = CollisionSphere::new(BodyId::new(0), radius);
        s.update(&body);
        s
    }

    fn box_at(pos: Vector3<f32>, q: UnitQuaternion<f32>, half: Vector3<f32>) -> CollisionBox {
        let body = RigidBody::new(1.0).with_position(pos).with_orientation(q);
        let mut b = CollisionBox::new(BodyId::new(0), half);
        b.update(&body);
        b
    }

    fn floor_triangle() -> Triangle {
        Triangle::new(
            Vector3::new(-5.0, 0.0, -5.0),
            Vector3::new(0.0, 0.0, 5.0),
            Vector3::new(5.0, 0.0, -5.0),
        )
    }

    #[test]
    fn test_sphere_half_space() {
        let plane = CollisionPlane::new(Vector3::y(), 0.0);
        assert!(sphere_and_half_space(&sphere_at(Vector3::new(0.0, 0.5, 0.0), 1.0), &plane));
        assert!(!sphere_and_half_space(&sphere_at(Vector3::new(0.0, 1.5, 0.0), 1.0), &plane));
    }

    #[test]
    fn test_sphere_sphere() {
        let a = sphere_at(Vector3::zeros(), 1.0);
        assert!(sphere_and_sphere(&a, &sphere_at(Vector3::new(1.5, 0.0, 0.0), 1.0)));
        assert!(!sphere_and_sphere(&a, &sphere_at(Vector3::new(2.5, 0.0, 0.0), 1.0)));
        // Exactly touching is not an overlap.
        assert!(!sphere_and_sphere(&a, &sphere_at(Vector3::new(2.0, 0.0, 0.0), 1.0)));
    }

    #[test]
    fn test_sphere_triangle() {
        let tri = floor_triangle();
        assert!(sphere_and_triangle(&sphere_at(Vector3::new(0.0, 0.5, 0.0), 1.0), &tri));
        assert!(!sphere_and_triangle(&sphere_at(Vector3::new(0.0, 1.5, 0.0), 1.0), &tri));
        // Beside the triangle: close to the plane but far from the edge.
        assert!(!sphere_and_triangle(&sphere_at(Vector3::new(20.0, 0.0, 0.0), 1.0), &tri));
    }

    #[test]
    fn test_closest_point_regions() {
        let tri = Triangle::new(Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0));
        // Face interior
        let p = closest_point_on_triangle(&Vector3::new(0.25, 0.25, 3.0), &tri);
        assert!((p - Vector3::new(0.25, 0.25, 0.0)).norm() < EPSILON);
        // Vertex region
        let p = closest_point_on_triangle(&Vector3::new(-1.0, -1.0, 0.0), &tri);
        assert!(p.norm() < EPSILON);
        // Edge region
        let p = closest_point_on_triangle(&Vector3::new(0.5, -2.0, 0.0), &tri);
        assert!((p - Vector3::new(0.5, 0.0, 0.0)).norm() < EPSILON);
        // Hypotenuse
        let p = closest_point_on_triangle(&Vector3::new(1.0, 1.0, 0.0), &tri);
        assert!((p - Vector3::new(0.5, 0.5, 0.0)).norm() < EPSILON);
    }

    #[test]
    fn test_box_half_space() {
        let plane = CollisionPlane::new(Vector3::y(), 0.0);
        let half = Vector3::repeat(1.0);
        assert!(box_and_half_space(&box_at(Vector3::new(0.0, 0.9, 0.0), UnitQuaternion::identity(), half), &plane));
        assert!(box_and_half_space(&box_at(Vector3::new(0.0, 1.0, 0.0), UnitQuaternion::identity(), half), &plane));
        assert!(!box_and_half_space(&box_at(Vector3::new(0.0, 1.1, 0.0), UnitQuaternion::identity(), half), &plane));
        // Tilted 45° about Z: reaches down sqrt(2).
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), core::f32::consts::FRAC_PI_4);
        assert!(box_and_half_space(&box_at(Vector3::new(0.0, 1.3, 0.0), q, half), &plane));
    }

    #[test]
    fn test_box_box_face_separation() {
        let half = Vector3::repeat(1.0);
        let a = box_at(Vector3::zeros(), UnitQuaternion::identity(), half);
        assert!(box_and_box(&a, &box_at(Vector3::new(1.5, 0.0, 0.0), UnitQuaternion::identity(), half)));
        assert!(!box_and_box(&a, &box_at(Vector3::new(2.5, 0.0, 0.0), UnitQuaternion::identity(), half)));
    }

    #[test]
    fn test_box_box_edge_separation() {
        // A has an edge along Z at x = sqrt(2), B an edge along Y at
        // x = c - sqrt(2). Only the Z × Y cross axis separates them.
        let half = Vector3::repeat(1.0);
        let qa = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), core::f32::consts::FRAC_PI_4);
        let qb = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), core::f32::consts::FRAC_PI_4);
        let a = box_at(Vector3::zeros(), qa, half);
        let far = box_at(Vector3::new(2.9, 0.0, 0.0), qb, half);
        let near = box_at(Vector3::new(2.7, 0.0, 0.0), qb, half);
        assert!(!box_and_box(&a, &far));
        assert!(box_and_box(&a, &near));
    }

    #[test]
    fn test_box_triangle() {
        let tri = floor_triangle();
        let half = Vector3::repeat(0.5);
        assert!(box_and_triangle(&box_at(Vector3::new(0.0, 0.4, 0.0), UnitQuaternion::identity(), half), &tri));
        assert!(!box_and_triangle(&box_at(Vector3::new(0.0, 0.6, 0.0), UnitQuaternion::identity(), half), &tri));
        // Next to the triangle, within its plane.
        assert!(!box_and_triangle(&box_at(Vector3::new(0.0, 0.0, 7.0), UnitQuaternion::identity(), half), &tri));
    }

    #[test]
    fn test_box_triangle_fully_inside() {
        let tri = Triangle::new(
            Vector3::new(0.1, 0.0, 0.0),
            Vector3::new(0.0, 0.1, 0.0),
            Vector3::new(0.0, 0.0, 0.1),
        );
        assert!(box_and_triangle(&box_at(Vector3::zeros(), UnitQuaternion::identity(), Vector3::repeat(1.0)), &tri));
    }

    #[test]
    fn test_box_triangle_plane_rejects() {
        // Triangle slanted past the box corner: its bounds overlap the box
        // but its plane does not.
        let tri = Triangle::new(
            Vector3::new(1.8, 0.0, 0.0),
            Vector3::new(0.0, 1.8, 0.0),
            Vector3::new(1.8, 1.8, 5.0),
        );
        let cbox = box_at(Vector3::zeros(), UnitQuaternion::identity(), Vector3::repeat(0.5));
        assert!(!box_and_triangle(&cbox, &tri));
    }

    #[test]
    fn test_ray_triangle_hit_and_miss() {
        let tri = floor_triangle();
        let down = Ray::new(Vector3::new(0.0, 3.0, 0.0), Vector3::new(0.0, -1.0, 0.0)).unwrap();
        let hit = ray_and_triangle(&down, &tri).unwrap();
        assert!((hit.distance - 3.0).abs() < EPSILON);
        assert!(hit.point.norm() < EPSILON);

        let up = Ray::new(Vector3::new(0.0, 3.0, 0.0), Vector3::new(0.0, 1.0, 0.0)).unwrap();
        assert!(ray_and_triangle(&up, &tri).is_none());

        let outside = Ray::new(Vector3::new(9.0, 3.0, 9.0), Vector3::new(0.0, -1.0, 0.0)).unwrap();
        assert!(ray_and_triangle(&outside, &tri).is_none());
    }

    #[test]
    fn test_ray_triangle_parallel_misses() {
        let tri = floor_triangle();
        let ray = Ray::new(Vector3::new(-10.0, 0.0, 0.0), Vector3::x()).unwrap();
        assert!(ray_and_triangle(&ray, &tri).is_none());
    }

    #[test]
    fn test_segment_respects_length() {
        let tri = floor_triangle();
        let short = Ray::segment(Vector3::new(0.0, 3.0, 0.0), Vector3::new(0.0, 1.0, 0.0)).unwrap();
        assert!(ray_and_triangle(&short, &tri).is_none());
        let long = Ray::segment(Vector3::new(0.0, 3.0, 0.0), Vector3::new(0.0, -1.0, 0.0)).unwrap();
        assert!(ray_and_triangle(&long, &tri).is_some());
    }

    #[test]
    fn test_ray_triangle_steep_plane() {
        // Triangle in the YZ plane: the X coordinate is dropped.
        let tri = Triangle::new(
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(2.0, 1.0, 0.0),
            Vector3::new(2.0, 0.0, 1.0),
        );
        let ray = Ray::new(Vector3::new(0.0, 0.2, 0.2), Vector3::x()).unwrap();
        let hit = ray_and_triangle(&ray, &tri).unwrap();
        assert!((hit.distance - 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_zero_direction_ray_rejected() {
        assert!(Ray::new(Vector3::zeros(), Vector3::zeros()).is_none());
        assert!(Ray::segment(Vector3::x(), Vector3::x()).is_none());
    }
}
