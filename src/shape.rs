//! Collision shapes.
//!
//! Each shape references the [`RigidBody`] it moves with through a
//! [`BodyId`]. Spheres and boxes cache their world transform (body
//! transform × local offset); boxes also memoize their axes, corners and
//! bounds. The cache is refreshed explicitly by `update`, never lazily.
//!
//! Planes are infinite and immovable. Triangle soups borrow world-space
//! triangles supplied by the scene and are treated as static geometry.

use core::fmt;

use log::warn;
use nalgebra::{Isometry3, UnitQuaternion, Vector3};

// ComplexField provides sqrt() for f32 in no_std via libm
#[allow(unused_imports)]
use nalgebra::ComplexField;

use crate::body::{BodyId, RigidBody};
use crate::math;

/// Sign pattern applied to the half-extents to produce the eight box corners.
pub(crate) const CORNER_SIGNS: [[f32; 3]; 8] = [
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
    [1.0, -1.0, 1.0],
    [-1.0, -1.0, 1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [1.0, -1.0, -1.0],
    [-1.0, -1.0, -1.0],
];

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Aabb {
    pub fn new(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point, or `None` for an empty iterator.
    pub fn from_points<'p, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'p Vector3<f32>>,
    {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut aabb = Self::new(first, first);
        for p in iter {
            aabb.grow(p);
        }
        Some(aabb)
    }

    /// Extend the box to contain `p`.
    pub fn grow(&mut self, p: &Vector3<f32>) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb::new(self.min.inf(&other.min), self.max.sup(&other.max))
    }

    /// Overlap test; touching boxes count as overlapping.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains(&self, p: &Vector3<f32>) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vector3<f32> {
        (self.max - self.min) * 0.5
    }
}

/// Bounding sphere in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vector3<f32>,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vector3<f32>, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn overlaps(&self, other: &BoundingSphere) -> bool {
        let r = self.radius + other.radius;
        (self.center - other.center).norm_squared() <= r * r
    }

    pub fn overlaps_aabb(&self, aabb: &Aabb) -> bool {
        let closest = self.center.sup(&aabb.min).inf(&aabb.max);
        (closest - self.center).norm_squared() <= self.radius * self.radius
    }
}

// ---------------------------------------------------------------------------
// Triangles
// ---------------------------------------------------------------------------

/// A world-space triangle. Winding is counter-clockwise seen from the front.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub vertices: [Vector3<f32>; 3],
}

impl Triangle {
    pub fn new(a: Vector3<f32>, b: Vector3<f32>, c: Vector3<f32>) -> Self {
        Self { vertices: [a, b, c] }
    }

    /// Unnormalized face normal `(b - a) × (c - a)`.
    #[inline]
    pub fn scaled_normal(&self) -> Vector3<f32> {
        let [a, b, c] = &self.vertices;
        (b - a).cross(&(c - a))
    }

    /// Unit face normal, or `None` for a degenerate triangle.
    pub fn normal(&self) -> Option<Vector3<f32>> {
        self.scaled_normal().try_normalize(f32::EPSILON)
    }

    pub fn edges(&self) -> [Vector3<f32>; 3] {
        let [a, b, c] = &self.vertices;
        [b - a, c - b, a - c]
    }

    pub fn aabb(&self) -> Aabb {
        let [a, b, c] = &self.vertices;
        Aabb::new(a.inf(b).inf(c), a.sup(b).sup(c))
    }
}

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

/// Discriminant of a [`CollisionPrimitive`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Sphere,
    Box,
    Plane,
    TriangleSoup,
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShapeKind::Sphere => "sphere",
            ShapeKind::Box => "box",
            ShapeKind::Plane => "plane",
            ShapeKind::TriangleSoup => "triangle soup",
        };
        f.write_str(name)
    }
}

/// A sphere attached to a body.
#[derive(Debug, Clone)]
pub struct CollisionSphere {
    pub body: BodyId,
    pub radius: f32,
    offset: Isometry3<f32>,
    transform: Isometry3<f32>,
}

impl CollisionSphere {
    pub fn new(body: BodyId, radius: f32) -> Self {
        Self {
            body,
            radius,
            offset: Isometry3::identity(),
            transform: Isometry3::identity(),
        }
    }

    /// Builder: place the sphere relative to its body.
    pub fn with_offset(mut self, offset: Isometry3<f32>) -> Self {
        self.offset = offset;
        self
    }

    /// Refresh the cached world transform from the body.
    pub fn update(&mut self, body: &RigidBody) {
        self.transform = body.transform() * self.offset;
    }

    #[inline]
    pub fn transform(&self) -> &Isometry3<f32> {
        &self.transform
    }

    /// World-space centre.
    #[inline]
    pub fn center(&self) -> Vector3<f32> {
        self.transform.translation.vector
    }

    pub fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere::new(self.center(), self.radius)
    }

    pub fn aabb(&self) -> Aabb {
        let r = Vector3::repeat(self.radius);
        let c = self.center();
        Aabb::new(c - r, c + r)
    }
}

/// An oriented box attached to a body.
#[derive(Debug, Clone)]
pub struct CollisionBox {
    pub body: BodyId,
    half_extents: Vector3<f32>,
    offset: Isometry3<f32>,
    transform: Isometry3<f32>,
    axes: [Vector3<f32>; 3],
    corners: [Vector3<f32>; 8],
    aabb: Aabb,
    bounding_sphere: BoundingSphere,
}

impl CollisionBox {
    pub fn new(body: BodyId, half_extents: Vector3<f32>) -> Self {
        let mut cbox = Self {
            body,
            half_extents,
            offset: Isometry3::identity(),
            transform: Isometry3::identity(),
            axes: [Vector3::x(), Vector3::y(), Vector3::z()],
            corners: [Vector3::zeros(); 8],
            aabb: Aabb::new(-half_extents, half_extents),
            bounding_sphere: BoundingSphere::new(Vector3::zeros(), half_extents.norm()),
        };
        cbox.refresh();
        cbox
    }

    /// Builder: place the box relative to its body.
    pub fn with_offset(mut self, offset: Isometry3<f32>) -> Self {
        self.offset = offset;
        self.transform = offset;
        self.refresh();
        self
    }

    /// Refresh the cached transform, axes, corners and bounds from the body.
    pub fn update(&mut self, body: &RigidBody) {
        self.transform = body.transform() * self.offset;
        self.refresh();
    }

    /// Set the pose and mass of the box's body and give it the inertia of
    /// a solid block of this size. Velocities are cleared.
    pub fn set_state(
        &mut self,
        body: &mut RigidBody,
        position: Vector3<f32>,
        orientation: UnitQuaternion<f32>,
        mass: f32,
    ) {
        body.set_mass(mass);
        let tensor = math::block_inertia_tensor(&self.half_extents, mass);
        if body.set_inertia_tensor(&tensor).is_err() {
            warn!("CollisionBox::set_state: degenerate half-extents, inertia left unchanged");
        }
        body.set_position(position);
        body.set_orientation(orientation);
        body.set_velocity(Vector3::zeros());
        body.set_rotation(Vector3::zeros());
        body.clear_accumulators();
        self.update(body);
    }

    pub fn half_extents(&self) -> Vector3<f32> {
        self.half_extents
    }

    pub fn set_half_extents(&mut self, half_extents: Vector3<f32>) {
        self.half_extents = half_extents;
        self.refresh();
    }

    fn refresh(&mut self) {
        let rotation = self.transform.rotation.to_rotation_matrix();
        for (i, axis) in self.axes.iter_mut().enumerate() {
            *axis = rotation.matrix().column(i).into_owned();
        }
        for (corner, signs) in self.corners.iter_mut().zip(CORNER_SIGNS.iter()) {
            let local = self.half_extents.component_mul(&Vector3::from(*signs));
            *corner = math::transform_point(&self.transform, &local);
        }
        if let Some(aabb) = Aabb::from_points(self.corners.iter()) {
            self.aabb = aabb;
        }
        self.bounding_sphere = BoundingSphere::new(self.center(), self.half_extents.norm());
    }

    #[inline]
    pub fn transform(&self) -> &Isometry3<f32> {
        &self.transform
    }

    /// World-space centre.
    #[inline]
    pub fn center(&self) -> Vector3<f32> {
        self.transform.translation.vector
    }

    /// World-space direction of local axis `i` (0 = X, 1 = Y, 2 = Z).
    #[inline]
    pub fn axis(&self, i: usize) -> Vector3<f32> {
        self.axes[i]
    }

    pub fn axes(&self) -> &[Vector3<f32>; 3] {
        &self.axes
    }

    /// The eight world-space corners, in [`CORNER_SIGNS`] order.
    pub fn corners(&self) -> &[Vector3<f32>; 8] {
        &self.corners
    }

    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    pub fn bounding_sphere(&self) -> BoundingSphere {
        self.bounding_sphere
    }

    /// Half-length of the box's projection onto `axis` (unit length).
    #[inline]
    pub fn projected_radius(&self, axis: &Vector3<f32>) -> f32 {
        self.half_extents.x * axis.dot(&self.axes[0]).abs()
            + self.half_extents.y * axis.dot(&self.axes[1]).abs()
            + self.half_extents.z * axis.dot(&self.axes[2]).abs()
    }
}

/// An infinite plane `normal · p = offset`.
///
/// By default it is a half-space, solid behind the normal. A two-sided
/// plane is a thin sheet instead: spheres on either side are pushed away
/// from it. Boxes always treat the plane as a half-space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionPlane {
    pub normal: Vector3<f32>,
    pub offset: f32,
    pub two_sided: bool,
}

impl CollisionPlane {
    /// Create a one-sided plane. The normal is normalized; a zero normal
    /// falls back to +Y.
    pub fn new(normal: Vector3<f32>, offset: f32) -> Self {
        let normal = normal.try_normalize(f32::EPSILON).unwrap_or_else(|| {
            warn!("CollisionPlane::new: zero normal, using +Y");
            Vector3::y()
        });
        Self {
            normal,
            offset,
            two_sided: false,
        }
    }

    /// Builder: collide spheres against both faces of the plane.
    pub fn with_two_sided(mut self, two_sided: bool) -> Self {
        self.two_sided = two_sided;
        self
    }

    /// Signed distance from the plane, positive on the normal side.
    #[inline]
    pub fn signed_distance(&self, p: &Vector3<f32>) -> f32 {
        self.normal.dot(p) - self.offset
    }
}

/// A set of static world-space triangles supplied by the scene.
#[derive(Debug, Clone)]
pub struct TriangleSoup<'a> {
    pub body: Option<BodyId>,
    triangles: &'a [Triangle],
    bounds: Option<Aabb>,
}

impl<'a> TriangleSoup<'a> {
    pub fn new(triangles: &'a [Triangle]) -> Self {
        let bounds = triangles
            .iter()
            .map(Triangle::aabb)
            .reduce(|acc, b| acc.merged(&b));
        Self {
            body: None,
            triangles,
            bounds,
        }
    }

    /// Builder: attach the soup to a (normally infinite-mass) body.
    pub fn with_body(mut self, body: BodyId) -> Self {
        self.body = Some(body);
        self
    }

    pub fn triangles(&self) -> &'a [Triangle] {
        self.triangles
    }

    /// Aggregate bounds of every triangle, `None` when empty.
    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }

    pub fn bounding_sphere(&self) -> Option<BoundingSphere> {
        self.bounds
            .map(|b| BoundingSphere::new(b.center(), b.half_extents().norm()))
    }
}

/// Closed set of collision shapes.
#[derive(Debug, Clone)]
pub enum CollisionPrimitive<'a> {
    Sphere(CollisionSphere),
    Box(CollisionBox),
    Plane(CollisionPlane),
    TriangleSoup(TriangleSoup<'a>),
}

impl<'a> CollisionPrimitive<'a> {
    pub fn kind(&self) -> ShapeKind {
        match self {
            CollisionPrimitive::Sphere(_) => ShapeKind::Sphere,
            CollisionPrimitive::Box(_) => ShapeKind::Box,
            CollisionPrimitive::Plane(_) => ShapeKind::Plane,
            CollisionPrimitive::TriangleSoup(_) => ShapeKind::TriangleSoup,
        }
    }

    /// The body this primitive moves with, if any.
    pub fn body(&self) -> Option<BodyId> {
        match self {
            CollisionPrimitive::Sphere(s) => Some(s.body),
            CollisionPrimitive::Box(b) => Some(b.body),
            CollisionPrimitive::Plane(_) => None,
            CollisionPrimitive::TriangleSoup(t) => t.body,
        }
    }

    /// Planes and triangle soups are static world geometry.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            CollisionPrimitive::Plane(_) | CollisionPrimitive::TriangleSoup(_)
        )
    }

    /// Refresh cached world geometry from the owning body.
    ///
    /// An id outside `bodies` is logged and leaves the cache untouched.
    pub fn update(&mut self, bodies: &[RigidBody]) {
        match self {
            CollisionPrimitive::Sphere(s) => match bodies.get(s.body.index()) {
                Some(body) => s.update(body),
                None => warn!("sphere references unknown body {}", s.body.index()),
            },
            CollisionPrimitive::Box(b) => match bodies.get(b.body.index()) {
                Some(body) => b.update(body),
                None => warn!("box references unknown body {}", b.body.index()),
            },
            CollisionPrimitive::Plane(_) | CollisionPrimitive::TriangleSoup(_) => {}
        }
    }

    /// World bounds; `None` for infinite or empty shapes.
    pub fn aabb(&self) -> Option<Aabb> {
        match self {
            CollisionPrimitive::Sphere(s) => Some(s.aabb()),
            CollisionPrimitive::Box(b) => Some(b.aabb()),
            CollisionPrimitive::Plane(_) => None,
            CollisionPrimitive::TriangleSoup(t) => t.bounds(),
        }
    }

    pub fn bounding_sphere(&self) -> Option<BoundingSphere> {
        match self {
            CollisionPrimitive::Sphere(s) => Some(s.bounding_sphere()),
            CollisionPrimitive::Box(b) => Some(b.bounding_sphere()),
            CollisionPrimitive::Plane(_) => None,
            CollisionPrimitive::TriangleSoup(t) => t.bounding_sphere(),
        }
    }

    /// Cheap conservative rejection on cached bounds. Infinite shapes
    /// always pass.
    pub fn may_touch(&self, other: &CollisionPrimitive<'_>) -> bool {
        match (self.aabb(), other.aabb()) {
            (Some(a), Some(b)) => a.intersects(&b),
            _ => true,
        }
    }
}
