//! Contact generation.
//!
//! One generator per supported shape pair. Each writes into a
//! [`ContactBuffer`], returns how many contacts it wrote and has no other
//! effect. A full buffer is not an error: generators check
//! [`ContactBuffer::has_more_contacts`] and stop.
//!
//! [`generate_contacts`] is the dispatch table over [`CollisionPrimitive`]
//! pairs.

use nalgebra::Vector3;

// ComplexField provides sqrt() for f32 in no_std via libm
#[allow(unused_imports)]
use nalgebra::ComplexField;

use crate::contact::ContactBuffer;
use crate::error::PhysicsError;
use crate::intersect::{self, Ray, AXIS_EPSILON};
use crate::math;
use crate::shape::{CollisionBox, CollisionPlane, CollisionPrimitive, CollisionSphere, TriangleSoup};

/// Most contacts a box produces against one triangle soup per call.
pub const MAX_BOX_SOUP_CONTACTS: usize = 4;

/// Generate contacts for any pair of primitives.
///
/// Spheres against a [two-sided](CollisionPlane::two_sided) plane use
/// [`sphere_and_true_plane`]. Every other plane pair treats the plane as a
/// half-space. Two pieces of static geometry (planes and triangle soups) have no
/// generator and yield [`PhysicsError::UnsupportedShapePair`].
pub fn generate_contacts<const C: usize>(
    a: &CollisionPrimitive<'_>,
    b: &CollisionPrimitive<'_>,
    buffer: &mut ContactBuffer<C>,
) -> Result<usize, PhysicsError> {
    use CollisionPrimitive::{Box, Plane, Sphere, TriangleSoup};

    let written = match (a, b) {
        (Sphere(s), Plane(p)) | (Plane(p), Sphere(s)) => {
            if p.two_sided {
                sphere_and_true_plane(s, p, buffer)
            } else {
                sphere_and_half_space(s, p, buffer)
            }
        }
        (Sphere(one), Sphere(two)) => sphere_and_sphere(one, two, buffer),
        (Sphere(s), TriangleSoup(t)) | (TriangleSoup(t), Sphere(s)) => {
            sphere_and_triangle_soup(s, t, buffer)
        }
        (Box(x), Plane(p)) | (Plane(p), Box(x)) => box_and_half_space(x, p, buffer),
        (Box(one), Box(two)) => box_and_box(one, two, buffer),
        (Box(x), Sphere(s)) | (Sphere(s), Box(x)) => box_and_sphere(x, s, buffer),
        (Box(x), TriangleSoup(t)) | (TriangleSoup(t), Box(x)) => box_and_triangle_soup(x, t, buffer),
        (Plane(_) | TriangleSoup(_), Plane(_) | TriangleSoup(_)) => {
            return Err(PhysicsError::UnsupportedShapePair {
                first: a.kind(),
                second: b.kind(),
            });
        }
    };
    Ok(written)
}

// ---------------------------------------------------------------------------
// Spheres
// ---------------------------------------------------------------------------

/// Sphere against the half-space behind `plane`.
pub fn sphere_and_half_space<const C: usize>(
    sphere: &CollisionSphere,
    plane: &CollisionPlane,
    buffer: &mut ContactBuffer<C>,
) -> usize {
    if !buffer.has_more_contacts() {
        return 0;
    }

    let centre = sphere.center();
    let distance = plane.signed_distance(&centre) - sphere.radius;
    if distance >= 0.0 {
        return 0;
    }

    let point = centre - plane.normal * (distance + sphere.radius);
    buffer.add([Some(sphere.body), None], point, plane.normal, -distance) as usize
}

/// Sphere against a two-sided plane. The normal flips when the centre is
/// behind the plane.
pub fn sphere_and_true_plane<const C: usize>(
    sphere: &CollisionSphere,
    plane: &CollisionPlane,
    buffer: &mut ContactBuffer<C>,
) -> usize {
    if !buffer.has_more_contacts() {
        return 0;
    }

    let centre = sphere.center();
    let centre_distance = plane.signed_distance(&centre);
    if centre_distance * centre_distance > sphere.radius * sphere.radius {
        return 0;
    }

    let (normal, penetration) = if centre_distance < 0.0 {
        (-plane.normal, sphere.radius + centre_distance)
    } else {
        (plane.normal, sphere.radius - centre_distance)
    };
    let point = centre - plane.normal * centre_distance;
    buffer.add([Some(sphere.body), None], point, normal, penetration) as usize
}

/// Sphere against sphere. Coincident centres produce nothing.
pub fn sphere_and_sphere<const C: usize>(
    one: &CollisionSphere,
    two: &CollisionSphere,
    buffer: &mut ContactBuffer<C>,
) -> usize {
    if !buffer.has_more_contacts() {
        return 0;
    }

    let position_two = two.center();
    let midline = one.center() - position_two;
    let size = midline.norm();
    if size <= 0.0 || size >= one.radius + two.radius {
        return 0;
    }

    let normal = midline / size;
    let point = position_two + midline * 0.5;
    let penetration = one.radius + two.radius - size;
    buffer.add([Some(one.body), Some(two.body)], point, normal, penetration) as usize
}

/// Sphere against every triangle of a soup it touches, one contact each.
pub fn sphere_and_triangle_soup<const C: usize>(
    sphere: &CollisionSphere,
    soup: &TriangleSoup<'_>,
    buffer: &mut ContactBuffer<C>,
) -> usize {
    match soup.bounds() {
        Some(bounds) if bounds.intersects(&sphere.aabb()) => {}
        _ => return 0,
    }

    let centre = sphere.center();
    let mut written = 0;
    for triangle in soup.triangles() {
        if !buffer.has_more_contacts() {
            break;
        }

        let closest = intersect::closest_point_on_triangle(&centre, triangle);
        let offset = centre - closest;
        let distance_sq = offset.norm_squared();
        if distance_sq > sphere.radius * sphere.radius {
            continue;
        }

        let distance = distance_sq.sqrt();
        let normal = if distance > f32::EPSILON {
            offset / distance
        } else {
            // Centre on the triangle: push out along the face normal.
            match triangle.normal() {
                Some(n) => n,
                None => continue,
            }
        };

        if buffer.add([Some(sphere.body), soup.body], closest, normal, sphere.radius - distance) {
            written += 1;
        }
    }
    written
}

// ---------------------------------------------------------------------------
// Boxes
// ---------------------------------------------------------------------------

/// Box against the half-space behind `plane`: one contact per corner at or
/// behind the plane.
pub fn box_and_half_space<const C: usize>(
    cbox: &CollisionBox,
    plane: &CollisionPlane,
    buffer: &mut ContactBuffer<C>,
) -> usize {
    if !buffer.has_more_contacts() || !intersect::box_and_half_space(cbox, plane) {
        return 0;
    }

    let mut written = 0;
    for corner in cbox.corners() {
        let distance = corner.dot(&plane.normal);
        if distance <= plane.offset {
            if !buffer.add([Some(cbox.body), None], *corner, plane.normal, plane.offset - distance) {
                break;
            }
            written += 1;
        }
    }
    written
}

/// Box against sphere, using the closest point on the box to the sphere
/// centre. A centre inside the box is pushed out through the nearest face.
pub fn box_and_sphere<const C: usize>(
    cbox: &CollisionBox,
    sphere: &CollisionSphere,
    buffer: &mut ContactBuffer<C>,
) -> usize {
    if !buffer.has_more_contacts() {
        return 0;
    }

    let centre = sphere.center();
    let rel = math::inverse_transform_point(cbox.transform(), &centre);
    let half = cbox.half_extents();
    let radius = sphere.radius;

    if rel.x.abs() - radius > half.x || rel.y.abs() - radius > half.y || rel.z.abs() - radius > half.z {
        return 0;
    }

    let closest = rel.sup(&(-half)).inf(&half);
    let distance_sq = (closest - rel).norm_squared();
    if distance_sq > radius * radius {
        return 0;
    }

    let bodies = [Some(cbox.body), Some(sphere.body)];

    if distance_sq > f32::EPSILON * f32::EPSILON {
        let closest_world = math::transform_point(cbox.transform(), &closest);
        let distance = distance_sq.sqrt();
        let normal = (closest_world - centre) / distance;
        return buffer.add(bodies, closest_world, normal, radius - distance) as usize;
    }

    // Centre inside the box: leave through the face with least depth.
    let mut axis = 0;
    let mut depth = f32::MAX;
    for k in 0..3 {
        let d = half[k] - rel[k].abs();
        if d < depth {
            depth = d;
            axis = k;
        }
    }
    let sign = if rel[axis] < 0.0 { -1.0 } else { 1.0 };
    let mut surface = rel;
    surface[axis] = sign * half[axis];

    let point = math::transform_point(cbox.transform(), &surface);
    let normal = -cbox.axis(axis) * sign;
    buffer.add(bodies, point, normal, radius + depth) as usize
}

/// Result of the box–box separating axis test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxBoxSat {
    /// Axis of least penetration: 0–2 are the first box's face axes, 3–5
    /// the second box's, and `6 + 3 * i + j` is first axis `i` crossed with
    /// second axis `j`.
    pub axis_index: usize,
    pub penetration: f32,
    /// Best face axis, recorded before the edge axes were tested.
    pub best_single_axis: usize,
}

/// Run SAT over the 15 candidate axes, tracking the least penetration.
/// Returns `None` if a separating axis exists.
pub fn box_box_sat(one: &CollisionBox, two: &CollisionBox) -> Option<BoxBoxSat> {
    let to_centre = two.center() - one.center();
    let mut best = (f32::MAX, 0);

    for i in 0..3 {
        if !try_axis(one, two, one.axis(i), i, &to_centre, &mut best) {
            return None;
        }
    }
    for i in 0..3 {
        if !try_axis(one, two, two.axis(i), i + 3, &to_centre, &mut best) {
            return None;
        }
    }

    let best_single_axis = best.1;

    for i in 0..3 {
        for j in 0..3 {
            let axis = one.axis(i).cross(&two.axis(j));
            if !try_axis(one, two, axis, 6 + i * 3 + j, &to_centre, &mut best) {
                return None;
            }
        }
    }

    Some(BoxBoxSat {
        axis_index: best.1,
        penetration: best.0,
        best_single_axis,
    })
}

/// Test one candidate axis, updating `best` (penetration, index) on a new
/// minimum. Returns `false` if the axis separates the boxes; near-zero
/// axes are skipped.
fn try_axis(
    one: &CollisionBox,
    two: &CollisionBox,
    axis: Vector3<f32>,
    index: usize,
    to_centre: &Vector3<f32>,
    best: &mut (f32, usize),
) -> bool {
    if axis.norm_squared() < AXIS_EPSILON {
        return true;
    }
    let axis = axis.normalize();
    let penetration = intersect::penetration_on_axis(one, two, &axis, to_centre);
    if penetration < 0.0 {
        return false;
    }
    if penetration < best.0 {
        *best = (penetration, index);
    }
    true
}

/// Box against box.
///
/// Writes a single contact. Its bodies are `[two, one]` and its normal
/// points from `one` toward `two`, so resolving it pushes the boxes apart.
pub fn box_and_box<const C: usize>(
    one: &CollisionBox,
    two: &CollisionBox,
    buffer: &mut ContactBuffer<C>,
) -> usize {
    if !buffer.has_more_contacts() {
        return 0;
    }
    let Some(sat) = box_box_sat(one, two) else {
        return 0;
    };

    let to_centre = two.center() - one.center();
    let bodies = [Some(two.body), Some(one.body)];

    let (point, normal) = if sat.axis_index < 3 {
        // A vertex of `two` on a face of `one`.
        let normal = toward(one.axis(sat.axis_index), &to_centre);
        (support_vertex(two, &-normal), normal)
    } else if sat.axis_index < 6 {
        // A vertex of `one` on a face of `two`.
        let normal = toward(two.axis(sat.axis_index - 3), &to_centre);
        (support_vertex(one, &normal), normal)
    } else {
        let k = sat.axis_index - 6;
        let (one_index, two_index) = (k / 3, k % 3);
        let one_axis = one.axis(one_index);
        let two_axis = two.axis(two_index);
        let normal = toward(one_axis.cross(&two_axis).normalize(), &to_centre);

        let point_on_one = support_edge_point(one, one_index, &normal);
        let point_on_two = support_edge_point(two, two_index, &-normal);

        let point = edge_contact_point(
            &point_on_one,
            &one_axis,
            one.half_extents()[one_index],
            &point_on_two,
            &two_axis,
            two.half_extents()[two_index],
            sat.best_single_axis > 2,
        );
        (point, normal)
    };

    buffer.add(bodies, point, normal, sat.penetration) as usize
}

/// Flip `axis` if needed so it points along `direction`.
fn toward(axis: Vector3<f32>, direction: &Vector3<f32>) -> Vector3<f32> {
    if axis.dot(direction) < 0.0 {
        -axis
    } else {
        axis
    }
}

/// World corner of `cbox` furthest along `direction`.
fn support_vertex(cbox: &CollisionBox, direction: &Vector3<f32>) -> Vector3<f32> {
    let mut local = cbox.half_extents();
    for i in 0..3 {
        if cbox.axis(i).dot(direction) < 0.0 {
            local[i] = -local[i];
        }
    }
    math::transform_point(cbox.transform(), &local)
}

/// Midpoint of the box edge parallel to local axis `edge_axis` that lies
/// furthest along `direction`.
fn support_edge_point(cbox: &CollisionBox, edge_axis: usize, direction: &Vector3<f32>) -> Vector3<f32> {
    let mut local = cbox.half_extents();
    for i in 0..3 {
        if i == edge_axis {
            local[i] = 0.0;
        } else if cbox.axis(i).dot(direction) < 0.0 {
            local[i] = -local[i];
        }
    }
    math::transform_point(cbox.transform(), &local)
}

/// Closest approach of two edges given by midpoint, direction and half
/// length. Parallel edges, or a closest point beyond either edge, fall back
/// to one edge's midpoint.
fn edge_contact_point(
    p_one: &Vector3<f32>,
    d_one: &Vector3<f32>,
    one_size: f32,
    p_two: &Vector3<f32>,
    d_two: &Vector3<f32>,
    two_size: f32,
    use_one: bool,
) -> Vector3<f32> {
    let fallback = if use_one { *p_one } else { *p_two };

    let sm_one = d_one.norm_squared();
    let sm_two = d_two.norm_squared();
    let dp_one_two = d_two.dot(d_one);

    let to_st = p_one - p_two;
    let dp_sta_one = d_one.dot(&to_st);
    let dp_sta_two = d_two.dot(&to_st);

    let denom = sm_one * sm_two - dp_one_two * dp_one_two;
    if denom.abs() < 1e-4 {
        return fallback;
    }

    let mua = (dp_one_two * dp_sta_two - sm_two * dp_sta_one) / denom;
    let mub = (sm_one * dp_sta_two - dp_one_two * dp_sta_one) / denom;

    if mua > one_size || mua < -one_size || mub > two_size || mub < -two_size {
        return fallback;
    }

    let c_one = p_one + d_one * mua;
    let c_two = p_two + d_two * mub;
    (c_one + c_two) * 0.5
}

/// Box against a triangle soup.
///
/// For each triangle passing the SAT test, every box corner on or behind
/// the triangle's plane is confirmed by casting a segment from the box
/// centre to the corner; the corner becomes a contact only if the segment
/// crosses the triangle itself. A corner contributes at most once per call
/// and at most [`MAX_BOX_SOUP_CONTACTS`] contacts are written.
pub fn box_and_triangle_soup<const C: usize>(
    cbox: &CollisionBox,
    soup: &TriangleSoup<'_>,
    buffer: &mut ContactBuffer<C>,
) -> usize {
    match soup.bounds() {
        Some(bounds) if bounds.intersects(&cbox.aabb()) => {}
        _ => return 0,
    }

    let centre = cbox.center();
    let mut used_corners = 0u8;
    let mut written = 0;

    'triangles: for triangle in soup.triangles() {
        if written >= MAX_BOX_SOUP_CONTACTS || !buffer.has_more_contacts() {
            break;
        }
        if !intersect::box_and_triangle(cbox, triangle) {
            continue;
        }
        let Some(face_normal) = triangle.normal() else {
            continue;
        };

        // Face the box centre.
        let face_offset = face_normal.dot(&triangle.vertices[0]);
        let (normal, offset) = if face_normal.dot(&centre) < face_offset {
            (-face_normal, -face_offset)
        } else {
            (face_normal, face_offset)
        };

        for (k, corner) in cbox.corners().iter().enumerate() {
            let bit = 1u8 << k;
            if used_corners & bit != 0 {
                continue;
            }
            let distance = normal.dot(corner) - offset;
            if distance > 0.0 {
                continue;
            }
            let Some(segment) = Ray::segment(centre, *corner) else {
                continue;
            };
            if intersect::ray_and_triangle(&segment, triangle).is_none() {
                continue;
            }

            if !buffer.add([Some(cbox.body), soup.body], *corner, normal, -distance) {
                break 'triangles;
            }
            used_corners |= bit;
            written += 1;
            if written >= MAX_BOX_SOUP_CONTACTS {
                break 'triangles;
            }
        }
    }
    written
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use crate::body::{BodyId, RigidBody};
    use crate::shape::{ShapeKind, Triangle};
    use nalgebra::UnitQuaternion;

    const EPSILON: f32 = 1e-3;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn approx_vec_eq(a: &Vector3<f32>, b: &Vector3<f32>) -> bool {
        (a - b).norm() < EPSILON
    }

    fn sphere(id: usize, pos: Vector3<f32>, radius: f32) -> CollisionSphere {
        let body = RigidBody::new(1.0).with_position(pos);
        let mut s = CollisionSphere::new(BodyId::new(id), radius);
        s.update(&body);
        s
    }

    fn cube(id: usize, pos: Vector3<f32>, q: UnitQuaternion<f32>, half: f32) -> CollisionBox {
        let body = RigidBody::new(1.0).with_position(pos).with_orientation(q);
        let mut b = CollisionBox::new(BodyId::new(id), Vector3::repeat(half));
        b.update(&body);
        b
    }

    fn floor() -> [Triangle; 2] {
        [
            Triangle::new(
                Vector3::new(-5.0, 0.0, -5.0),
                Vector3::new(-5.0, 0.0, 5.0),
                Vector3::new(5.0, 0.0, 5.0),
            ),
            Triangle::new(
                Vector3::new(-5.0, 0.0, -5.0),
                Vector3::new(5.0, 0.0, 5.0),
                Vector3::new(5.0, 0.0, -5.0),
            ),
        ]
    }

    #[test]
    fn test_disjoint_spheres_write_nothing() {
        let mut buffer: ContactBuffer<8> = ContactBuffer::new();
        let offsets = [
            Vector3::new(2.01, 0.0, 0.0),
            Vector3::new(0.0, -3.0, 0.0),
            Vector3::new(1.5, 1.5, 1.5),
        ];
        for offset in offsets.iter() {
            let a = sphere(0, Vector3::zeros(), 1.0);
            let b = sphere(1, *offset, 1.0);
            assert!(!intersect::sphere_and_sphere(&a, &b));
            assert_eq!(sphere_and_sphere(&a, &b, &mut buffer), 0);
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_overlapping_spheres() {
        let mut buffer: ContactBuffer<8> = ContactBuffer::new();
        let a = sphere(0, Vector3::new(1.5, 0.0, 0.0), 1.0);
        let b = sphere(1, Vector3::zeros(), 1.0);
        assert_eq!(sphere_and_sphere(&a, &b, &mut buffer), 1);
        let c = buffer.contacts()[0];
        assert!(approx_vec_eq(&c.normal, &Vector3::x()));
        assert!(approx_vec_eq(&c.point, &Vector3::new(0.75, 0.0, 0.0)));
        assert!(approx_eq(c.penetration, 0.5));
        assert_eq!(c.bodies, [Some(BodyId::new(0)), Some(BodyId::new(1))]);
    }

    #[test]
    fn test_coincident_spheres_write_nothing() {
        let mut buffer: ContactBuffer<8> = ContactBuffer::new();
        let a = sphere(0, Vector3::zeros(), 1.0);
        let b = sphere(1, Vector3::zeros(), 1.0);
        assert_eq!(sphere_and_sphere(&a, &b, &mut buffer), 0);
    }

    #[test]
    fn test_sphere_half_space_contact() {
        let mut buffer: ContactBuffer<8> = ContactBuffer::new();
        let plane = CollisionPlane::new(Vector3::y(), 0.0);
        let s = sphere(0, Vector3::new(2.0, 0.75, 0.0), 1.0);
        assert_eq!(sphere_and_half_space(&s, &plane, &mut buffer), 1);
        let c = buffer.contacts()[0];
        assert!(approx_eq(c.penetration, 0.25));
        assert!(approx_vec_eq(&c.point, &Vector3::new(2.0, 0.0, 0.0)));
        assert!(approx_vec_eq(&c.normal, &Vector3::y()));
        assert_eq!(c.bodies[1], None);
    }

    #[test]
    fn test_true_plane_flips_normal_behind() {
        let mut buffer: ContactBuffer<8> = ContactBuffer::new();
        let plane = CollisionPlane::new(Vector3::y(), 0.0);
        let below = sphere(0, Vector3::new(0.0, -0.5, 0.0), 1.0);
        assert_eq!(sphere_and_true_plane(&below, &plane, &mut buffer), 1);
        let c = buffer.contacts()[0];
        assert!(approx_vec_eq(&c.normal, &-Vector3::y()));
        assert!(approx_eq(c.penetration, 0.5));
        assert!(approx_vec_eq(&c.point, &Vector3::zeros()));

        let far = sphere(0, Vector3::new(0.0, -3.0, 0.0), 1.0);
        assert_eq!(sphere_and_true_plane(&far, &plane, &mut buffer), 0);
    }

    #[test]
    fn test_sphere_soup_single_triangle() {
        let mut buffer: ContactBuffer<8> = ContactBuffer::new();
        let tris = floor();
        let soup = TriangleSoup::new(&tris);
        let s = sphere(0, Vector3::new(1.0, 0.8, -2.0), 1.0);
        assert_eq!(sphere_and_triangle_soup(&s, &soup, &mut buffer), 1);
        let c = buffer.contacts()[0];
        assert!(approx_eq(c.penetration, 0.2));
        assert!(approx_vec_eq(&c.normal, &Vector3::y()));
        assert!(approx_vec_eq(&c.point, &Vector3::new(1.0, 0.0, -2.0)));
    }

    #[test]
    fn test_resting_box_yields_four_contacts() {
        let mut buffer: ContactBuffer<8> = ContactBuffer::new();
        let plane = CollisionPlane::new(Vector3::y(), 0.0);
        let b = cube(0, Vector3::new(0.0, 1.0, 0.0), UnitQuaternion::identity(), 1.0);
        assert_eq!(box_and_half_space(&b, &plane, &mut buffer), 4);
        for c in buffer.contacts() {
            assert!(c.penetration.abs() < EPSILON);
            assert!(approx_vec_eq(&c.normal, &Vector3::y()));
        }
    }

    #[test]
    fn test_box_half_space_stops_when_full() {
        let mut buffer: ContactBuffer<3> = ContactBuffer::new();
        let plane = CollisionPlane::new(Vector3::y(), 0.0);
        let b = cube(0, Vector3::new(0.0, 0.5, 0.0), UnitQuaternion::identity(), 1.0);
        assert_eq!(box_and_half_space(&b, &plane, &mut buffer), 3);
        assert_eq!(buffer.remaining(), 0);
        assert_eq!(box_and_half_space(&b, &plane, &mut buffer), 0);
    }

    #[test]
    fn test_offset_boxes_pick_face_axis() {
        let a = cube(0, Vector3::zeros(), UnitQuaternion::identity(), 1.0);
        let b = cube(1, Vector3::new(1.5, 0.1, 0.0), UnitQuaternion::identity(), 1.0);
        let sat = box_box_sat(&a, &b).unwrap();
        assert!(sat.axis_index == 0 || sat.axis_index == 3);
        assert!(approx_eq(sat.penetration, 0.5));
    }

    #[test]
    fn test_box_box_vertex_face_contact() {
        let mut buffer: ContactBuffer<8> = ContactBuffer::new();
        let one = cube(0, Vector3::zeros(), UnitQuaternion::identity(), 1.0);
        let two = cube(1, Vector3::new(1.5, 0.2, 0.3), UnitQuaternion::identity(), 1.0);
        assert_eq!(box_and_box(&one, &two, &mut buffer), 1);
        let c = buffer.contacts()[0];
        assert_eq!(c.bodies, [Some(BodyId::new(1)), Some(BodyId::new(0))]);
        assert!(approx_vec_eq(&c.normal, &Vector3::x()));
        assert!(approx_eq(c.penetration, 0.5));
        assert!(approx_vec_eq(&c.point, &Vector3::new(0.5, 1.2, 1.3)));
    }

    #[test]
    fn test_box_box_edge_edge_contact() {
        let mut buffer: ContactBuffer<8> = ContactBuffer::new();
        let qa = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), core::f32::consts::FRAC_PI_4);
        let qb = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), core::f32::consts::FRAC_PI_4);
        let one = cube(0, Vector3::zeros(), qa, 1.0);
        let two = cube(1, Vector3::new(2.7, 0.0, 0.0), qb, 1.0);

        let sat = box_box_sat(&one, &two).unwrap();
        assert_eq!(sat.axis_index, 6 + 2 * 3 + 1);
        let expected = 2.0 * core::f32::consts::SQRT_2 - 2.7;
        assert!(approx_eq(sat.penetration, expected));

        assert_eq!(box_and_box(&one, &two, &mut buffer), 1);
        let c = buffer.contacts()[0];
        assert!(approx_vec_eq(&c.normal, &Vector3::x()));
        // Midway between the edge at x = sqrt(2) and the edge at x = 2.7 - sqrt(2).
        let expected_x = 2.7 * 0.5;
        assert!(approx_vec_eq(&c.point, &Vector3::new(expected_x, 0.0, 0.0)));
    }

    #[test]
    fn test_separated_boxes_write_nothing() {
        let mut buffer: ContactBuffer<8> = ContactBuffer::new();
        let one = cube(0, Vector3::zeros(), UnitQuaternion::identity(), 1.0);
        let two = cube(1, Vector3::new(0.0, 2.5, 0.0), UnitQuaternion::identity(), 1.0);
        assert!(box_box_sat(&one, &two).is_none());
        assert_eq!(box_and_box(&one, &two, &mut buffer), 0);
    }

    #[test]
    fn test_parallel_edges_fall_back() {
        let p = edge_contact_point(
            &Vector3::zeros(),
            &Vector3::x(),
            1.0,
            &Vector3::new(0.0, 1.0, 0.0),
            &Vector3::x(),
            1.0,
            false,
        );
        assert!(approx_vec_eq(&p, &Vector3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn test_box_sphere_outside() {
        let mut buffer: ContactBuffer<8> = ContactBuffer::new();
        let b = cube(0, Vector3::zeros(), UnitQuaternion::identity(), 1.0);
        let s = sphere(1, Vector3::new(1.3, 0.0, 0.0), 0.5);
        assert_eq!(box_and_sphere(&b, &s, &mut buffer), 1);
        let c = buffer.contacts()[0];
        assert!(approx_eq(c.penetration, 0.2));
        assert!(approx_vec_eq(&c.point, &Vector3::x()));
        assert!(approx_vec_eq(&c.normal, &-Vector3::x()));
        assert_eq!(c.bodies, [Some(BodyId::new(0)), Some(BodyId::new(1))]);
    }

    #[test]
    fn test_box_sphere_centre_inside() {
        let mut buffer: ContactBuffer<8> = ContactBuffer::new();
        let b = cube(0, Vector3::zeros(), UnitQuaternion::identity(), 1.0);
        let s = sphere(1, Vector3::new(0.8, 0.0, 0.0), 0.5);
        assert_eq!(box_and_sphere(&b, &s, &mut buffer), 1);
        let c = buffer.contacts()[0];
        assert!(approx_eq(c.penetration, 0.7));
        assert!(approx_vec_eq(&c.point, &Vector3::x()));
        assert!(approx_vec_eq(&c.normal, &-Vector3::x()));
    }

    #[test]
    fn test_box_sphere_miss() {
        let mut buffer: ContactBuffer<8> = ContactBuffer::new();
        let b = cube(0, Vector3::zeros(), UnitQuaternion::identity(), 1.0);
        // Near the corner, outside along the diagonal.
        let s = sphere(1, Vector3::new(1.4, 1.4, 0.0), 0.5);
        assert_eq!(box_and_sphere(&b, &s, &mut buffer), 0);
    }

    #[test]
    fn test_box_on_soup_uses_each_corner_once() {
        let mut buffer: ContactBuffer<16> = ContactBuffer::new();
        let tris = floor();
        let soup = TriangleSoup::new(&tris);
        let b = cube(0, Vector3::new(0.1, 0.45, -0.3), UnitQuaternion::identity(), 0.5);
        assert_eq!(box_and_triangle_soup(&b, &soup, &mut buffer), 4);
        for c in buffer.contacts() {
            assert!(approx_vec_eq(&c.normal, &Vector3::y()));
            assert!(approx_eq(c.penetration, 0.05));
        }
    }

    #[test]
    fn test_box_soup_rejects_corners_outside_triangle() {
        // All four bottom corners are behind the triangle's plane, but only
        // the segment to (0.5, -0.1, 0.5) passes through the triangle.
        let mut buffer: ContactBuffer<16> = ContactBuffer::new();
        let tris = [Triangle::new(
            Vector3::new(0.2, 0.0, 0.2),
            Vector3::new(2.0, 0.0, 0.2),
            Vector3::new(0.2, 0.0, 2.0),
        )];
        let soup = TriangleSoup::new(&tris);
        let b = cube(0, Vector3::new(0.0, 0.4, 0.0), UnitQuaternion::identity(), 0.5);
        assert_eq!(box_and_triangle_soup(&b, &soup, &mut buffer), 1);
        let c = buffer.contacts()[0];
        assert!(approx_vec_eq(&c.point, &Vector3::new(0.5, -0.1, 0.5)));
        assert!(approx_eq(c.penetration, 0.1));
        // The triangle winds downward; the normal still faces the box.
        assert!(approx_vec_eq(&c.normal, &Vector3::y()));
    }

    #[test]
    fn test_box_soup_contacts_capped() {
        let mut buffer: ContactBuffer<16> = ContactBuffer::new();
        let [f0, f1] = floor();
        let tris = [
            f0,
            f1,
            Triangle::new(
                Vector3::new(0.4, -5.0, -5.0),
                Vector3::new(0.4, 5.0, -5.0),
                Vector3::new(0.4, 5.0, 5.0),
            ),
            Triangle::new(
                Vector3::new(0.4, -5.0, -5.0),
                Vector3::new(0.4, 5.0, 5.0),
                Vector3::new(0.4, -5.0, 5.0),
            ),
        ];
        let soup = TriangleSoup::new(&tris);
        // Six corners are behind the floor or the wall.
        let b = cube(0, Vector3::new(0.0, 0.45, 0.1), UnitQuaternion::identity(), 0.5);
        assert_eq!(box_and_triangle_soup(&b, &soup, &mut buffer), MAX_BOX_SOUP_CONTACTS);
        assert_eq!(buffer.len(), MAX_BOX_SOUP_CONTACTS);
    }

    #[test]
    fn test_box_above_soup_writes_nothing() {
        let mut buffer: ContactBuffer<16> = ContactBuffer::new();
        let tris = floor();
        let soup = TriangleSoup::new(&tris);
        let b = cube(0, Vector3::new(0.1, 0.6, -0.3), UnitQuaternion::identity(), 0.5);
        assert_eq!(box_and_triangle_soup(&b, &soup, &mut buffer), 0);
    }

    #[test]
    fn test_dispatch_is_order_independent() {
        let mut buffer: ContactBuffer<8> = ContactBuffer::new();
        let plane = CollisionPrimitive::Plane(CollisionPlane::new(Vector3::y(), 0.0));
        let ball = CollisionPrimitive::Sphere(sphere(0, Vector3::new(0.0, 0.5, 0.0), 1.0));
        assert_eq!(generate_contacts(&ball, &plane, &mut buffer), Ok(1));
        assert_eq!(generate_contacts(&plane, &ball, &mut buffer), Ok(1));
        let [a, b] = [buffer.contacts()[0], buffer.contacts()[1]];
        assert_eq!(a.bodies, b.bodies);
        assert!(approx_vec_eq(&a.normal, &b.normal));
    }

    #[test]
    fn test_dispatch_honours_two_sided_plane() {
        let mut buffer: ContactBuffer<8> = ContactBuffer::new();
        let below = CollisionPrimitive::Sphere(sphere(0, Vector3::new(0.0, -0.5, 0.0), 1.0));
        let sheet = CollisionPrimitive::Plane(CollisionPlane::new(Vector3::y(), 0.0).with_two_sided(true));
        assert_eq!(generate_contacts(&sheet, &below, &mut buffer), Ok(1));
        let c = buffer.contacts()[0];
        assert!(approx_vec_eq(&c.normal, &-Vector3::y()));
        assert!(approx_eq(c.penetration, 0.5));

        // The same sphere is deep inside a one-sided plane.
        buffer.reset();
        let solid = CollisionPrimitive::Plane(CollisionPlane::new(Vector3::y(), 0.0));
        assert_eq!(generate_contacts(&below, &solid, &mut buffer), Ok(1));
        let c = buffer.contacts()[0];
        assert!(approx_vec_eq(&c.normal, &Vector3::y()));
        assert!(approx_eq(c.penetration, 1.5));
    }

    #[test]
    fn test_dispatch_rejects_static_pairs() {
        let mut buffer: ContactBuffer<8> = ContactBuffer::new();
        let tris = floor();
        let plane = CollisionPrimitive::Plane(CollisionPlane::new(Vector3::y(), 0.0));
        let soup = CollisionPrimitive::TriangleSoup(TriangleSoup::new(&tris));
        assert_eq!(
            generate_contacts(&plane, &soup, &mut buffer),
            Err(PhysicsError::UnsupportedShapePair {
                first: ShapeKind::Plane,
                second: ShapeKind::TriangleSoup,
            })
        );
        assert!(generate_contacts(&plane, &plane, &mut buffer).is_err());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_full_buffer_stops_every_generator() {
        let mut buffer: ContactBuffer<1> = ContactBuffer::new();
        let plane = CollisionPlane::new(Vector3::y(), 0.0);
        let s = sphere(0, Vector3::new(0.0, 0.5, 0.0), 1.0);
        assert_eq!(sphere_and_half_space(&s, &plane, &mut buffer), 1);

        let one = cube(0, Vector3::zeros(), UnitQuaternion::identity(), 1.0);
        let two = cube(1, Vector3::new(1.5, 0.0, 0.0), UnitQuaternion::identity(), 1.0);
        assert_eq!(box_and_box(&one, &two, &mut buffer), 0);
        assert_eq!(sphere_and_sphere(&s, &sphere(1, Vector3::zeros(), 1.0), &mut buffer), 0);
        assert_eq!(box_and_sphere(&one, &s, &mut buffer), 0);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.remaining(), 0);
    }
}
