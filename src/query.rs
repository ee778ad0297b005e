//! Shape-vs-shape queries: overlap, discrete collision and swept collision.
//!
//! Queries work on a per-pair snapshot: the surfaces and vertices of each
//! shape facing the other, plus dynamic vertices sampled from curved
//! surfaces against the foreign shape. Everything is vertex-based: a vertex
//! of one shape is tested (or traced) against the surfaces of the other, in
//! both directions. Two solids crossing without any vertex of either inside
//! the other are not detected.
//!
//! All positions handed to a query are translations of shape-local
//! coordinates; shapes never rotate.

use glam::DVec3;
use tracing::{debug, warn};

use crate::math::{
    epsilon_gte, epsilon_lt, epsilon_lte, epsilon_zero, Trace, VecExt, EPSILON, FAR_AWAY,
};
use crate::shape::Shape;
use crate::surface::{line_closest_approach, Cylinder, Plane, Sphere, Surface};

/// Result of a collision query between two placed shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collision {
    /// Normalized time of impact within the step. Always 1 for discrete
    /// queries.
    pub t: f64,
    /// Translation moving the queried shape out of the foreign one.
    pub displacement: DVec3,
    /// Unit contact normal pointing from the foreign shape toward the
    /// queried one. Null for a touching pseudo-collision.
    pub normal: DVec3,
    /// Contact point (local to the traced frame) for swept queries.
    pub contact: Option<DVec3>,
}

impl Collision {
    /// A contact without interpenetration.
    pub fn is_touching(&self) -> bool {
        self.displacement.is_near_zero()
    }
}

/// Facing subsets of both shapes for one query.
struct Interaction {
    diff: DVec3,
    inv_diff: DVec3,
    surfaces: Vec<Surface>,
    vertices: Vec<DVec3>,
    foreign_surfaces: Vec<Surface>,
    foreign_vertices: Vec<DVec3>,
}

/// `motion` is the relative motion of the queried shape for swept queries.
fn prepare(
    shape: &Shape,
    position: DVec3,
    foreign: &Shape,
    foreign_position: DVec3,
    motion: Option<DVec3>,
) -> Interaction {
    let mut diff = foreign_position - position;
    // A null diff gives no direction to push things toward; nudge it
    if diff.is_near_zero() {
        diff.x += EPSILON;
    }
    let inv_diff = -diff;

    let mut interaction = Interaction {
        diff,
        inv_diff,
        surfaces: Vec::new(),
        vertices: Vec::new(),
        foreign_surfaces: Vec::new(),
        foreign_vertices: Vec::new(),
    };

    collect_front(
        shape,
        diff,
        &mut interaction.surfaces,
        &mut interaction.vertices,
    );
    collect_front(
        foreign,
        inv_diff,
        &mut interaction.foreign_surfaces,
        &mut interaction.foreign_vertices,
    );

    if shape.has_dynamic_surfaces() {
        add_dynamic_vertices(
            shape,
            &interaction.foreign_surfaces,
            diff,
            motion,
            &mut interaction.vertices,
        );
    }
    if foreign.has_dynamic_surfaces() {
        add_dynamic_vertices(
            foreign,
            &interaction.surfaces,
            inv_diff,
            motion.map(|m| -m),
            &mut interaction.foreign_vertices,
        );
    }

    interaction
}

/// Keep the vertices and planes facing `toward`; curved surfaces are always
/// kept.
fn collect_front(shape: &Shape, toward: DVec3, surfaces: &mut Vec<Surface>, vertices: &mut Vec<DVec3>) {
    if shape.no_back_face_culling() {
        surfaces.extend_from_slice(shape.surfaces());
        vertices.extend_from_slice(shape.vertices());
        return;
    }

    for vertex in shape.vertices() {
        if epsilon_gte(vertex.dot(toward), 0.0) {
            vertices.push(*vertex);
        }
    }
    for surface in shape.surfaces() {
        match surface {
            Surface::Plane(p) => {
                if epsilon_gte(p.normal.dot(toward), 0.0) {
                    surfaces.push(*surface);
                }
            }
            _ => surfaces.push(*surface),
        }
    }
}

// Dynamic vertices: curved surfaces have no fixed contact vertex, so one is
// sampled per (own curved surface, foreign surface) pair. The discrete
// variant uses the closest feature; the swept variant intersects the
// Minkowski-inflated foreign surface with the relative motion.

fn add_dynamic_vertices(
    shape: &Shape,
    foreign_surfaces: &[Surface],
    diff: DVec3,
    motion: Option<DVec3>,
    vertices: &mut Vec<DVec3>,
) {
    for dynamic in shape.dynamic_surfaces() {
        for foreign in foreign_surfaces {
            let vertex = match (dynamic, foreign) {
                (Surface::Sphere(s), Surface::Plane(p)) => sphere_plane_vertex(shape, s, p),
                (Surface::Sphere(s), Surface::Sphere(f)) => {
                    sphere_sphere_vertex(shape, s, f, diff, motion)
                }
                (Surface::Sphere(s), Surface::Cylinder(f)) => {
                    sphere_cylinder_vertex(shape, s, f, diff, motion)
                }
                (Surface::Cylinder(c), Surface::Plane(p)) => cylinder_plane_vertex(shape, c, p),
                (Surface::Cylinder(c), Surface::Sphere(f)) => {
                    cylinder_sphere_vertex(shape, c, f, diff, motion)
                }
                (Surface::Cylinder(c), Surface::Cylinder(f)) => {
                    cylinder_cylinder_vertex(shape, c, f, diff, motion)
                }
                _ => None,
            };
            if let Some(vertex) = vertex {
                debug!(?vertex, "dynamic vertex");
                vertices.push(vertex);
            }
        }
    }
}

fn sphere_plane_vertex(shape: &Shape, sphere: &Sphere, plane: &Plane) -> Option<DVec3> {
    let vertex = sphere.center - plane.normal * sphere.radius;
    fix_vertex_along_sphere(shape, vertex, sphere)
}

fn sphere_sphere_vertex(
    shape: &Shape,
    sphere: &Sphere,
    foreign: &Sphere,
    diff: DVec3,
    motion: Option<DVec3>,
) -> Option<DVec3> {
    let vertex = if let Some(motion) = motion {
        // Foreign space: sweep the center against the foreign sphere
        // inflated by our radius
        let trace = Trace::new(sphere.center - diff, motion);
        let (hit, _) = Surface::Sphere(*foreign).trace_intersect(&trace, sphere.radius, 1.0)?;
        (foreign.center - hit).with_length(sphere.radius) + sphere.center
    } else {
        let local_center = foreign.center + diff;
        if local_center.abs_diff_eq(sphere.center, EPSILON) {
            // Coincident centers: the sphere center itself is as good as
            // any surface point
            sphere.center
        } else {
            sphere.center.move_toward(local_center, sphere.radius)
        }
    };
    fix_vertex_along_sphere(shape, vertex, sphere)
}

fn sphere_cylinder_vertex(
    shape: &Shape,
    sphere: &Sphere,
    foreign: &Cylinder,
    diff: DVec3,
    motion: Option<DVec3>,
) -> Option<DVec3> {
    let vertex = if let Some(motion) = motion {
        let trace = Trace::new(sphere.center - diff, motion);
        let (hit, _) = Surface::Cylinder(*foreign).trace_intersect(&trace, sphere.radius, 1.0)?;
        (foreign.project_on_axis(hit) - hit).with_length(sphere.radius) + sphere.center
    } else {
        let local_axis = Cylinder::new(foreign.origin + diff, foreign.axis, foreign.radius);
        local_axis
            .project_on_axis(sphere.center)
            .move_at_distance_of(sphere.center, sphere.radius)
    };
    fix_vertex_along_sphere(shape, vertex, sphere)
}

fn cylinder_plane_vertex(shape: &Shape, cylinder: &Cylinder, plane: &Plane) -> Option<DVec3> {
    let dot = epsilon_zero(cylinder.axis.dot(plane.normal));
    // Shoot from the axis toward the plane normal; toward any orthogonal
    // direction when the axis is parallel to the normal
    let direction = if (dot.abs() - 1.0).abs() <= EPSILON {
        cylinder.axis.any_orthonormal_vector()
    } else {
        plane.normal
    };
    let trace = Trace::new(cylinder.origin, direction);
    let (mut vertex, _) =
        Surface::Cylinder(*cylinder).trace_intersect(&trace, 0.0, f64::INFINITY)?;

    // The cylinder is infinite: push the vertex far down the axis, other
    // surfaces will clip it back where needed
    if dot > 0.0 {
        vertex -= cylinder.axis * FAR_AWAY;
    } else if dot < 0.0 {
        vertex += cylinder.axis * FAR_AWAY;
    }

    fix_vertex_along_axis(shape, vertex, cylinder.axis)
}

fn cylinder_sphere_vertex(
    shape: &Shape,
    cylinder: &Cylinder,
    foreign: &Sphere,
    diff: DVec3,
    motion: Option<DVec3>,
) -> Option<DVec3> {
    let vertex = if let Some(motion) = motion {
        // Local space: sweep the foreign center against our cylinder
        // inflated by the foreign radius
        let trace = Trace::new(foreign.center + diff, motion);
        let (hit, _) = Surface::Cylinder(*cylinder).trace_intersect(&trace, foreign.radius, 1.0)?;
        hit
    } else {
        let local_center = foreign.center + diff;
        cylinder
            .project_on_axis(local_center)
            .move_toward(local_center, cylinder.radius)
    };
    fix_vertex_along_axis(shape, vertex, cylinder.axis)
}

fn cylinder_cylinder_vertex(
    shape: &Shape,
    cylinder: &Cylinder,
    foreign: &Cylinder,
    diff: DVec3,
    motion: Option<DVec3>,
) -> Option<DVec3> {
    let vertex = if let Some(motion) = motion {
        let origin = cylinder.origin - diff;
        if cylinder.axis.cross(foreign.axis).length_squared() <= EPSILON {
            // Parallel axes: the Minkowski shape is the foreign cylinder
            // with the summed radius
            let trace = Trace::new(origin, motion);
            let (hit, _) =
                Surface::Cylinder(*foreign).trace_intersect(&trace, cylinder.radius, 1.0)?;
            let radial = foreign.origin - hit;
            (radial - foreign.axis * radial.dot(foreign.axis)).with_length(cylinder.radius)
                + cylinder.origin
        } else {
            // Skew axes: the Minkowski shape is a plane along both axes
            let mut normal = cylinder.axis.cross(foreign.axis);
            if normal.dot(origin - foreign.origin) < 0.0 {
                normal = -normal;
            }
            let plane = Plane::new(foreign.origin, normal);
            let trace = Trace::new(origin, motion);
            let (hit, _) = Surface::Plane(plane)
                .trace_intersect(&trace, cylinder.radius + foreign.radius, 1.0)?;
            let offset = plane.normal * cylinder.radius;
            let (closest, _) = line_closest_approach(hit, cylinder.axis, foreign.origin, foreign.axis);
            closest - hit - offset + cylinder.origin
        }
    } else {
        let local_origin = foreign.origin + diff;
        let (closest, to_foreign) =
            line_closest_approach(cylinder.origin, cylinder.axis, local_origin, foreign.axis);
        closest + to_foreign.with_length(cylinder.radius)
    };
    fix_vertex_along_axis(shape, vertex, cylinder.axis)
}

/// Clip a sampled vertex back inside the shape by sliding it along the
/// cylinder axis through clipping planes. Clipping by a curved surface
/// drops the vertex.
fn fix_vertex_along_axis(shape: &Shape, mut vertex: DVec3, axis: DVec3) -> Option<DVec3> {
    for surface in shape.surfaces() {
        if epsilon_lte(surface.test(vertex), 0.0) {
            continue;
        }
        let Surface::Plane(plane) = surface else {
            warn!("dropping a dynamic vertex: out of a curved surface");
            return None;
        };
        match plane.line_intersect(vertex, axis) {
            Some(clipped) => vertex = clipped,
            None => {
                warn!("dropping a dynamic vertex: clipping plane parallel to the axis");
                return None;
            }
        }
    }
    Some(vertex)
}

/// Clip a sampled vertex back inside the shape by projecting it onto the
/// circle where the sphere meets each clipping plane.
fn fix_vertex_along_sphere(shape: &Shape, mut vertex: DVec3, sphere: &Sphere) -> Option<DVec3> {
    for surface in shape.surfaces() {
        if epsilon_lte(surface.test(vertex), 0.0) {
            continue;
        }
        let Surface::Plane(plane) = surface else {
            warn!("dropping a dynamic vertex: out of a curved surface");
            return None;
        };
        let center_distance = plane.signed_distance(sphere.center);
        let radius_sq = sphere.radius * sphere.radius - center_distance * center_distance;
        if radius_sq < 0.0 {
            warn!("dropping a dynamic vertex: clipping plane misses the sphere");
            return None;
        }
        let circle_center = sphere.center - plane.normal * center_distance;
        let in_plane = vertex - plane.normal * plane.signed_distance(vertex);
        let radial = in_plane - circle_center;
        let direction = if radial.is_near_zero() {
            plane.normal.any_orthonormal_vector()
        } else {
            radial
        };
        vertex = circle_center + direction.with_length(radius_sq.sqrt());
    }
    Some(vertex)
}

fn point_inside(surfaces: &[Surface], point: DVec3) -> bool {
    !surfaces.is_empty() && surfaces.iter().all(|s| epsilon_lt(s.test(point), 0.0))
}

fn point_inside_or_touching(surfaces: &[Surface], point: DVec3) -> bool {
    !surfaces.is_empty() && surfaces.iter().all(|s| epsilon_lte(s.test(point), 0.0))
}

pub(crate) fn overlaps(
    shape: &Shape,
    position: DVec3,
    foreign: &Shape,
    foreign_position: DVec3,
) -> bool {
    let interaction = prepare(shape, position, foreign, foreign_position, None);

    if !interaction.surfaces.is_empty() {
        for vertex in &interaction.foreign_vertices {
            let local = *vertex + foreign_position - position;
            if point_inside(&interaction.surfaces, local) {
                return true;
            }
        }
    }
    if !interaction.foreign_surfaces.is_empty() {
        for vertex in &interaction.vertices {
            let local = *vertex + position - foreign_position;
            if point_inside(&interaction.foreign_surfaces, local) {
                return true;
            }
        }
    }
    false
}

/// One violated surface constraint of a penetrating vertex.
struct SurfaceHit {
    normal: DVec3,
    offset: f64,
    current_offset: f64,
}

/// All surface constraints of one penetrating vertex, with the index of the
/// smallest offset (the cheapest way out).
struct VertexHits {
    hits: Vec<SurfaceHit>,
    min_index: usize,
}

impl VertexHits {
    fn min_offset(&self) -> f64 {
        self.hits[self.min_index].offset
    }
}

pub(crate) fn collision(
    shape: &Shape,
    position: DVec3,
    foreign: &Shape,
    foreign_position: DVec3,
) -> Option<Collision> {
    let interaction = prepare(shape, position, foreign, foreign_position, None);

    let mut sets: Vec<VertexHits> = Vec::new();
    let mut max_offset = 0.0;
    let mut max_index = 0;

    if !interaction.foreign_surfaces.is_empty() {
        for vertex in &interaction.vertices {
            let local = *vertex + position - foreign_position;
            if let Some(set) =
                vertex_hits(local, &interaction.foreign_surfaces, interaction.inv_diff, false)
            {
                if set.min_offset() > max_offset {
                    max_offset = set.min_offset();
                    max_index = sets.len();
                }
                sets.push(set);
            }
        }
    }
    if !interaction.surfaces.is_empty() {
        for vertex in &interaction.foreign_vertices {
            let local = *vertex + foreign_position - position;
            if let Some(set) = vertex_hits(local, &interaction.surfaces, interaction.diff, true) {
                if set.min_offset() > max_offset {
                    max_offset = set.min_offset();
                    max_index = sets.len();
                }
                sets.push(set);
            }
        }
    }

    if sets.is_empty() {
        return None;
    }
    if max_offset == 0.0 {
        // Just touching
        return Some(Collision {
            t: 1.0,
            displacement: DVec3::ZERO,
            normal: DVec3::ZERO,
            contact: None,
        });
    }

    Some(solve_vertex_hits(sets, max_index))
}

/// Constraints of one vertex against a surface set, `None` when the vertex
/// is outside any surface (not penetrating).
///
/// `vertex` is local to the surface set's shape; `diff` points from that
/// shape toward the vertex's shape. `foreign` inverts the normals so they
/// always push the queried shape out.
fn vertex_hits(vertex: DVec3, surfaces: &[Surface], diff: DVec3, foreign: bool) -> Option<VertexHits> {
    if surfaces.is_empty() {
        return None;
    }

    let mut tests = Vec::with_capacity(surfaces.len());
    for surface in surfaces {
        let test = epsilon_zero(surface.test(vertex));
        if test > 0.0 {
            return None;
        }
        tests.push(test);
    }

    let mut hits = Vec::with_capacity(surfaces.len());
    let mut min_index = 0;
    let mut min_offset = f64::INFINITY;

    for (i, surface) in surfaces.iter().enumerate() {
        let (mut normal, offset) = match surface {
            Surface::Plane(p) => (p.normal, -tests[i]),
            Surface::Sphere(s) => curved_hit(surface, vertex - s.center, vertex, tests[i], diff),
            Surface::Cylinder(c) => curved_hit(
                surface,
                vertex - c.project_on_axis(vertex),
                vertex,
                tests[i],
                diff,
            ),
        };
        if foreign {
            normal = -normal;
        }
        if offset < min_offset {
            min_offset = offset;
            min_index = i;
        }
        hits.push(SurfaceHit {
            normal,
            offset,
            current_offset: offset,
        });
    }

    Some(VertexHits { hits, min_index })
}

/// Rejection normal and depth for a vertex inside a curved surface.
///
/// When the radial direction opposes the approach direction the vertex has
/// penetrated past the center line and the radial rejection would eject it
/// through the far side; reject along the position delta instead.
fn curved_hit(surface: &Surface, radial: DVec3, vertex: DVec3, test: f64, diff: DVec3) -> (DVec3, f64) {
    if radial.dot(diff) > 0.0 {
        return (radial.normalize_or(DVec3::X), -test);
    }

    let trace = Trace::new(vertex, diff);
    match surface.trace_intersect(&trace, 0.0, f64::INFINITY) {
        Some((hit, _)) if !(hit - vertex).is_near_zero() => {
            ((hit - vertex).normalize(), vertex.distance(hit))
        }
        _ => {
            // Epsilon grazing: the vertex barely touches and the trace
            // misses or exits in place
            warn!("curved surface rejection fallback");
            (-radial.normalize_or(DVec3::X), 0.0)
        }
    }
}

/// Greedy resolution: repeatedly apply the vertex with the largest minimal
/// offset, then re-evaluate what the accumulated displacement already
/// solved. Order-dependent and approximate, which is good enough for
/// vertex-based contacts.
fn solve_vertex_hits(mut sets: Vec<VertexHits>, mut max_index: usize) -> Collision {
    let mut displacement = DVec3::ZERO;

    while !sets.is_empty() {
        let set = sets.remove(max_index);
        let hit = &set.hits[set.min_index];
        displacement += hit.normal * hit.current_offset;
        debug!(offset = hit.current_offset, "applying largest vertex offset");

        let mut max_offset = 0.0;
        max_index = 0;
        let mut i = 0;
        while i < sets.len() {
            let set = &mut sets[i];
            let mut min_offset = f64::INFINITY;
            for (j, hit) in set.hits.iter_mut().enumerate() {
                let adjustment = epsilon_zero(hit.normal.dot(displacement));
                if adjustment < 0.0 {
                    // The displacement pushes against this surface; maybe
                    // another surface of the vertex fares better
                    continue;
                }
                hit.current_offset = hit.offset - adjustment;
                if hit.current_offset < min_offset {
                    min_offset = hit.current_offset;
                    // Fully solved by the accumulated displacement
                    if min_offset <= 0.0 {
                        break;
                    }
                    set.min_index = j;
                }
            }

            if min_offset == f64::INFINITY || min_offset <= 0.0 {
                sets.remove(i);
            } else {
                if min_offset > max_offset {
                    max_offset = min_offset;
                    max_index = i;
                }
                i += 1;
            }
        }
    }

    Collision {
        t: 1.0,
        displacement,
        normal: displacement.normalize_or(DVec3::ZERO),
        contact: None,
    }
}

pub(crate) fn continuous_collision(
    shape: &Shape,
    old_position: DVec3,
    position: DVec3,
    foreign: &Shape,
    foreign_old_position: DVec3,
    foreign_position: DVec3,
) -> Option<Collision> {
    // Relative motion of the queried shape over the step
    let motion = position - old_position + foreign_old_position - foreign_position;
    if motion.is_near_zero() {
        debug!("no relative motion, falling back to the discrete query");
        return collision(shape, position, foreign, foreign_position);
    }

    let interaction = prepare(shape, old_position, foreign, foreign_old_position, Some(motion));

    let mut best: Option<Collision> = None;
    let mut min_t = f64::INFINITY;

    if !interaction.foreign_surfaces.is_empty() {
        for vertex in &interaction.vertices {
            let trace = Trace::new(*vertex + old_position - foreign_old_position, motion);
            if let Some(candidate) = trace_collision(&trace, &interaction.foreign_surfaces, false) {
                if candidate.t < min_t {
                    min_t = candidate.t;
                    best = Some(candidate);
                }
            }
        }
    }
    if !interaction.surfaces.is_empty() {
        for vertex in &interaction.foreign_vertices {
            let trace = Trace::new(*vertex + foreign_old_position - old_position, -motion);
            if let Some(candidate) = trace_collision(&trace, &interaction.surfaces, true) {
                if candidate.t < min_t {
                    min_t = candidate.t;
                    best = Some(candidate);
                }
            }
        }
    }

    best
}

/// Earliest admissible hit of a swept vertex against a surface set.
fn trace_collision(trace: &Trace, surfaces: &[Surface], foreign: bool) -> Option<Collision> {
    let mut best: Option<(DVec3, f64, DVec3)> = None;
    let mut min_t = f64::INFINITY;

    for surface in surfaces {
        let Some((hit, t)) = surface.trace_intersect(trace, 0.0, 1.0) else {
            continue;
        };
        if t >= min_t || !point_inside_or_touching(surfaces, hit) {
            continue;
        }

        let normal = surface.normal_at(hit);

        if epsilon_lte(t, 0.0) && normal.dot(trace.motion) > 0.0 {
            // Immediate hit while already moving outward: stale epsilon
            // re-detection of the previous step's bounce
            continue;
        }

        best = Some((hit, t, normal));
        min_t = t;
    }

    let (contact, t, mut normal) = best?;
    let mut displacement = contact - trace.end();
    if foreign {
        normal = -normal;
        displacement = -displacement;
    }

    Some(Collision {
        t,
        displacement,
        normal,
        contact: Some(contact),
    })
}
