//! Convex solids assembled from primitive surfaces.
//!
//! A [`Shape`] is the intersection of primitive half-spaces (planes,
//! spheres, infinite cylinders), optionally with explicit bare vertices.
//! Vertices and edges are derived once at construction. Shapes are
//! immutable and positionless: world placement is a per-query translation,
//! so one shape can back any number of entities.

use glam::DVec3;
use tracing::{debug, warn};

use crate::math::{epsilon_lte, Aabb, EPSILON};
use crate::query::{self, Collision};
use crate::surface::{Cylinder, Plane, Sphere, Surface};

/// One building block passed to [`Shape::new`]: either a bounding surface
/// or a bare point that becomes a vertex of the solid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Dot(DVec3),
    Surface(Surface),
}

/// A convex solid.
#[derive(Debug, Clone)]
pub struct Shape {
    surfaces: Vec<Surface>,
    vertices: Vec<DVec3>,
    edges: Vec<(DVec3, DVec3)>,
    /// Curved surfaces whose contact vertices depend on the foreign shape
    /// and are sampled per query.
    dynamic_surfaces: Vec<Surface>,
    bounding_box: Aabb,
    omni: bool,
    no_back_face_culling: bool,
}

impl Shape {
    pub fn new(primitives: Vec<Primitive>, bounding_box: Aabb) -> Self {
        Self::with_options(primitives, bounding_box, false, false)
    }

    /// `omni` marks an all-encompassing field shape (never solid-resolved);
    /// `no_back_face_culling` keeps every surface and vertex in queries
    /// regardless of facing.
    pub fn with_options(
        primitives: Vec<Primitive>,
        bounding_box: Aabb,
        omni: bool,
        no_back_face_culling: bool,
    ) -> Self {
        let mut shape = Self {
            surfaces: Vec::new(),
            vertices: Vec::new(),
            edges: Vec::new(),
            dynamic_surfaces: Vec::new(),
            bounding_box,
            omni,
            no_back_face_culling,
        };
        shape.build(primitives);
        shape
    }

    fn build(&mut self, primitives: Vec<Primitive>) {
        for primitive in primitives {
            match primitive {
                Primitive::Dot(v) => self.vertices.push(v),
                Primitive::Surface(s) => self.surfaces.push(s),
            }
        }

        for surface in &self.surfaces {
            if !surface.is_plane() {
                self.dynamic_surfaces.push(*surface);
            }
        }

        self.derive_topology();

        debug!(
            surfaces = self.surfaces.len(),
            vertices = self.vertices.len(),
            edges = self.edges.len(),
            dynamic_surfaces = self.dynamic_surfaces.len(),
            "shape built"
        );
    }

    /// Derive vertices from three-plane intersections and edges from plane
    /// pairs sharing exactly two of them.
    fn derive_topology(&mut self) {
        let planes: Vec<Plane> = self
            .surfaces
            .iter()
            .filter_map(|s| match s {
                Surface::Plane(p) => Some(*p),
                _ => None,
            })
            .collect();

        for i in 0..planes.len() {
            for j in (i + 1)..planes.len() {
                if planes[i].is_parallel_to(&planes[j]) {
                    debug!("parallel plane pair, no edge");
                    continue;
                }

                let mut pair_vertices: Vec<DVec3> = Vec::new();
                for (k, third) in planes.iter().enumerate() {
                    if k == i || k == j {
                        continue;
                    }
                    let Some(vertex) = Plane::intersect_three(&planes[i], &planes[j], third)
                    else {
                        continue;
                    };
                    if !self.is_inside_or_touching(vertex) {
                        continue;
                    }
                    push_unique(&mut self.vertices, vertex);
                    push_unique(&mut pair_vertices, vertex);
                }

                match pair_vertices.len() {
                    2 => self.edges.push((pair_vertices[0], pair_vertices[1])),
                    count @ (0 | 1) => {
                        warn!(count, "open plane pair, edge omitted");
                    }
                    count => {
                        warn!(count, "plane pair shares more than two vertices, edge omitted");
                    }
                }
            }
        }
    }

    /// No surface test epsilon-greater than zero.
    pub fn is_inside_or_touching(&self, point: DVec3) -> bool {
        self.surfaces.iter().all(|s| epsilon_lte(s.test(point), 0.0))
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    pub fn edges(&self) -> &[(DVec3, DVec3)] {
        &self.edges
    }

    pub(crate) fn dynamic_surfaces(&self) -> &[Surface] {
        &self.dynamic_surfaces
    }

    pub fn has_dynamic_surfaces(&self) -> bool {
        !self.dynamic_surfaces.is_empty()
    }

    pub fn bounding_box(&self) -> &Aabb {
        &self.bounding_box
    }

    pub fn is_omni(&self) -> bool {
        self.omni
    }

    pub fn no_back_face_culling(&self) -> bool {
        self.no_back_face_culling
    }

    /// Cheap AABB pre-check at the given placements.
    pub fn is_bbox_overlapping(
        &self,
        position: DVec3,
        foreign: &Shape,
        foreign_position: DVec3,
    ) -> bool {
        self.bounding_box
            .overlaps_at(position, &foreign.bounding_box, foreign_position)
    }

    /// True iff a vertex of either shape is strictly inside the other.
    pub fn is_overlapping(
        &self,
        position: DVec3,
        foreign: &Shape,
        foreign_position: DVec3,
    ) -> bool {
        query::overlaps(self, position, foreign, foreign_position)
    }

    /// Discrete collision at the given placements: the displacement that
    /// moves `self` out of `foreign`, or `None` when separated.
    pub fn get_collision(
        &self,
        position: DVec3,
        foreign: &Shape,
        foreign_position: DVec3,
    ) -> Option<Collision> {
        query::collision(self, position, foreign, foreign_position)
    }

    /// Swept collision over one step of both shapes, or `None` when the
    /// motion never brings them in contact.
    pub fn get_continuous_collision(
        &self,
        old_position: DVec3,
        position: DVec3,
        foreign: &Shape,
        foreign_old_position: DVec3,
        foreign_position: DVec3,
    ) -> Option<Collision> {
        query::continuous_collision(
            self,
            old_position,
            position,
            foreign,
            foreign_old_position,
            foreign_position,
        )
    }
}

fn push_unique(vertices: &mut Vec<DVec3>, vertex: DVec3) {
    if !vertices.iter().any(|v| v.abs_diff_eq(vertex, EPSILON)) {
        vertices.push(vertex);
    }
}

// Factories

impl Shape {
    /// A single point at the local origin.
    pub fn dot() -> Self {
        Self::new(vec![Primitive::Dot(DVec3::ZERO)], Aabb::point(DVec3::ZERO))
    }

    /// Half-space below the given outward normal, through the local origin.
    /// Back-face culling is disabled: the surface is one-sided by nature.
    pub fn plane(normal: DVec3) -> Self {
        let normal = normal.normalize();
        let mut min = DVec3::splat(f64::NEG_INFINITY);
        let mut max = DVec3::splat(f64::INFINITY);
        // Bounded only along a pure axis normal
        for i in 0..3 {
            let others = normal[(i + 1) % 3] != 0.0 || normal[(i + 2) % 3] != 0.0;
            if others {
                continue;
            }
            if normal[i] > 0.0 {
                max[i] = 0.0;
            } else if normal[i] < 0.0 {
                min[i] = 0.0;
            }
        }
        Self::with_options(
            vec![Primitive::Surface(Surface::Plane(Plane::new(
                DVec3::ZERO,
                normal,
            )))],
            Aabb::new(min, max),
            false,
            true,
        )
    }

    pub fn sphere(radius: f64) -> Self {
        Self::new(
            vec![Primitive::Surface(Surface::Sphere(Sphere::new(
                DVec3::ZERO,
                radius,
            )))],
            Aabb::new(DVec3::splat(-radius), DVec3::splat(radius)),
        )
    }

    /// Infinite cylinder around an axis through the local origin.
    pub fn infinite_cylinder(axis: DVec3, radius: f64) -> Self {
        let axis = axis.normalize();
        let mut min = DVec3::splat(-radius);
        let mut max = DVec3::splat(radius);
        for i in 0..3 {
            if axis[i] != 0.0 {
                min[i] = f64::NEG_INFINITY;
                max[i] = f64::INFINITY;
            }
        }
        Self::new(
            vec![Primitive::Surface(Surface::Cylinder(Cylinder::new(
                DVec3::ZERO,
                axis,
                radius,
            )))],
            Aabb::new(min, max),
        )
    }

    /// Axis-aligned box of the given side lengths, centered on the local
    /// origin.
    pub fn cuboid(x_length: f64, y_length: f64, z_length: f64) -> Self {
        let half = DVec3::new(x_length, y_length, z_length) / 2.0;
        let primitives = vec![
            plane_primitive(DVec3::new(half.x, 0.0, 0.0), DVec3::X),
            plane_primitive(DVec3::new(-half.x, 0.0, 0.0), -DVec3::X),
            plane_primitive(DVec3::new(0.0, half.y, 0.0), DVec3::Y),
            plane_primitive(DVec3::new(0.0, -half.y, 0.0), -DVec3::Y),
            plane_primitive(DVec3::new(0.0, 0.0, half.z), DVec3::Z),
            plane_primitive(DVec3::new(0.0, 0.0, -half.z), -DVec3::Z),
        ];
        Self::new(primitives, Aabb::new(-half, half))
    }

    /// Cylinder of finite length, capped by two planes orthogonal to the
    /// axis, centered on the local origin.
    pub fn cylinder(axis: DVec3, radius: f64, length: f64) -> Self {
        let axis = axis.normalize();
        let half = axis * (length / 2.0);
        let primitives = vec![
            Primitive::Surface(Surface::Cylinder(Cylinder::new(DVec3::ZERO, axis, radius))),
            plane_primitive(half, axis),
            plane_primitive(-half, -axis),
        ];
        let min = half.min(-half) - DVec3::splat(radius);
        let max = half.max(-half) + DVec3::splat(radius);
        Self::new(primitives, Aabb::new(min, max))
    }

    /// Regular octahedron with axis-aligned vertices at ±length/2.
    pub fn octahedron(length: f64) -> Self {
        let h = length / 2.0;
        let mut primitives = Vec::with_capacity(8);
        for sx in [1.0, -1.0] {
            for sy in [1.0, -1.0] {
                for sz in [1.0, -1.0] {
                    primitives.push(plane_primitive(
                        DVec3::new(sx * h, 0.0, 0.0),
                        DVec3::new(sx, sy, sz),
                    ));
                }
            }
        }
        Self::new(primitives, Aabb::new(DVec3::splat(-h), DVec3::splat(h)))
    }
}

fn plane_primitive(origin: DVec3, normal: DVec3) -> Primitive {
    Primitive::Surface(Surface::Plane(Plane::new(origin, normal)))
}
