//! Analytic bounding primitives: signed-distance tests and swept-point
//! intersections.
//!
//! A [`Surface`] bounds a convex solid from one side: its `test` is negative
//! inside the solid, zero on the surface, positive outside. All three
//! primitives use metric signed distance, so a penetration depth is simply
//! the negated test value.

use glam::DVec3;

use crate::math::{Trace, EPSILON};

/// Oriented plane. `normal` is unit length and points outside the solid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub origin: DVec3,
    pub normal: DVec3,
}

impl Plane {
    pub fn new(origin: DVec3, normal: DVec3) -> Self {
        Self {
            origin,
            normal: normal.normalize(),
        }
    }

    /// Plane through three points; the normal follows the winding
    /// `(b - a) x (c - a)`.
    pub fn from_three_points(a: DVec3, b: DVec3, c: DVec3) -> Self {
        Self::new(a, (b - a).cross(c - a))
    }

    pub fn signed_distance(&self, point: DVec3) -> f64 {
        (point - self.origin).dot(self.normal)
    }

    pub fn is_parallel_to(&self, other: &Plane) -> bool {
        self.normal.cross(other.normal).length_squared() <= EPSILON
    }

    /// Intersection of an unbounded line with the plane. `None` when the
    /// line is parallel to it.
    pub fn line_intersect(&self, origin: DVec3, direction: DVec3) -> Option<DVec3> {
        let denom = direction.dot(self.normal);
        if denom.abs() <= EPSILON {
            return None;
        }
        let t = (self.origin - origin).dot(self.normal) / denom;
        Some(origin + direction * t)
    }

    /// Intersection point of three planes, `None` when the system is
    /// near-singular (two of them close to parallel).
    pub fn intersect_three(p1: &Plane, p2: &Plane, p3: &Plane) -> Option<DVec3> {
        let (n1, n2, n3) = (p1.normal, p2.normal, p3.normal);
        let det = n1.dot(n2.cross(n3));
        if det.abs() <= EPSILON {
            return None;
        }
        let c1 = n1.dot(p1.origin);
        let c2 = n2.dot(p2.origin);
        let c3 = n3.dot(p3.origin);
        Some((n2.cross(n3) * c1 + n3.cross(n1) * c2 + n1.cross(n2) * c3) / det)
    }
}

/// Sphere bounding its inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: DVec3,
    pub radius: f64,
}

impl Sphere {
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    pub fn signed_distance(&self, point: DVec3) -> f64 {
        point.distance(self.center) - self.radius
    }
}

/// Infinite cylinder around the line `origin + t * axis`. `axis` is unit
/// length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cylinder {
    pub origin: DVec3,
    pub axis: DVec3,
    pub radius: f64,
}

impl Cylinder {
    pub fn new(origin: DVec3, axis: DVec3, radius: f64) -> Self {
        Self {
            origin,
            axis: axis.normalize(),
            radius,
        }
    }

    /// Orthogonal projection of a point onto the cylinder axis line.
    pub fn project_on_axis(&self, point: DVec3) -> DVec3 {
        self.origin + self.axis * (point - self.origin).dot(self.axis)
    }

    pub fn signed_distance(&self, point: DVec3) -> f64 {
        point.distance(self.project_on_axis(point)) - self.radius
    }
}

/// A bounding primitive of a convex shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Surface {
    Plane(Plane),
    Sphere(Sphere),
    Cylinder(Cylinder),
}

impl Surface {
    /// Signed distance from the point to the surface, negative inside.
    pub fn test(&self, point: DVec3) -> f64 {
        match self {
            Surface::Plane(p) => p.signed_distance(point),
            Surface::Sphere(s) => s.signed_distance(point),
            Surface::Cylinder(c) => c.signed_distance(point),
        }
    }

    pub fn is_plane(&self) -> bool {
        matches!(self, Surface::Plane(_))
    }

    /// Outward direction at a point on or near the surface.
    pub fn normal_at(&self, point: DVec3) -> DVec3 {
        match self {
            Surface::Plane(p) => p.normal,
            Surface::Sphere(s) => (point - s.center).normalize_or(DVec3::X),
            Surface::Cylinder(c) => (point - c.project_on_axis(point)).normalize_or(DVec3::X),
        }
    }

    /// Earliest intersection of a swept point with the surface, as
    /// `(hit_point, t)` with `-EPSILON <= t <= max_t + EPSILON`.
    ///
    /// `inflate` grows the surface by a radius, turning the query into a
    /// sphere-swept one.
    pub fn trace_intersect(&self, trace: &Trace, inflate: f64, max_t: f64) -> Option<(DVec3, f64)> {
        match self {
            Surface::Plane(p) => {
                let denom = trace.motion.dot(p.normal);
                if denom.abs() <= EPSILON {
                    return None;
                }
                let shifted = p.origin + p.normal * inflate;
                let t = (shifted - trace.origin).dot(p.normal) / denom;
                in_range(t, max_t).map(|t| (trace.origin + trace.motion * t, t))
            }
            Surface::Sphere(s) => {
                let oc = trace.origin - s.center;
                quadratic_sweep(oc, trace.motion, s.radius + inflate, max_t)
                    .map(|t| (trace.origin + trace.motion * t, t))
            }
            Surface::Cylinder(c) => {
                // Work in the plane orthogonal to the axis
                let oc = trace.origin - c.origin;
                let oc_p = oc - c.axis * oc.dot(c.axis);
                let d_p = trace.motion - c.axis * trace.motion.dot(c.axis);
                quadratic_sweep(oc_p, d_p, c.radius + inflate, max_t)
                    .map(|t| (trace.origin + trace.motion * t, t))
            }
        }
    }
}

fn in_range(t: f64, max_t: f64) -> Option<f64> {
    if t >= -EPSILON && t <= max_t + EPSILON {
        Some(t)
    } else {
        None
    }
}

/// Smallest admissible root of `|offset + t * motion| = radius`.
fn quadratic_sweep(offset: DVec3, motion: DVec3, radius: f64, max_t: f64) -> Option<f64> {
    let a = motion.length_squared();
    if a <= EPSILON {
        return None;
    }
    let b = 2.0 * offset.dot(motion);
    let c = offset.length_squared() - radius * radius;
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }
    let sq = discriminant.sqrt();
    let t1 = (-b - sq) / (2.0 * a);
    let t2 = (-b + sq) / (2.0 * a);
    in_range(t1, max_t).or_else(|| in_range(t2, max_t))
}

/// Closest points between two lines: the point on the first line and the
/// vector from it to the closest point on the second line. Falls back to
/// the first origin's perpendicular for parallel lines.
pub(crate) fn line_closest_approach(
    origin1: DVec3,
    dir1: DVec3,
    origin2: DVec3,
    dir2: DVec3,
) -> (DVec3, DVec3) {
    let a = dir1.length_squared();
    let b = dir1.dot(dir2);
    let c = dir2.length_squared();
    let den = a * c - b * b;
    if den.abs() <= EPSILON {
        let p2 = origin2 + dir2 * ((origin1 - origin2).dot(dir2) / c);
        return (origin1, p2 - origin1);
    }
    let w = origin1 - origin2;
    let p = dir1.dot(w);
    let q = dir2.dot(w);
    let t1 = (b * q - c * p) / den;
    let t2 = (a * q - b * p) / den;
    let p1 = origin1 + dir1 * t1;
    let p2 = origin2 + dir2 * t2;
    (p1, p2 - p1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_signed_distance() {
        let plane = Plane::new(DVec3::new(0.0, 2.0, 0.0), DVec3::Y);
        assert!((plane.signed_distance(DVec3::new(5.0, 3.0, -1.0)) - 1.0).abs() < 1e-12);
        assert!((plane.signed_distance(DVec3::ZERO) + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_sphere_signed_distance() {
        let sphere = Sphere::new(DVec3::ZERO, 2.0);
        assert!((sphere.signed_distance(DVec3::new(3.0, 0.0, 0.0)) - 1.0).abs() < 1e-12);
        assert!((sphere.signed_distance(DVec3::new(0.0, 1.0, 0.0)) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cylinder_signed_distance_ignores_axis_component() {
        let cylinder = Cylinder::new(DVec3::ZERO, DVec3::Z, 1.0);
        let d = cylinder.signed_distance(DVec3::new(3.0, 0.0, 42.0));
        assert!((d - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_three_plane_intersection() {
        let px = Plane::new(DVec3::new(1.0, 0.0, 0.0), DVec3::X);
        let py = Plane::new(DVec3::new(0.0, 2.0, 0.0), DVec3::Y);
        let pz = Plane::new(DVec3::new(0.0, 0.0, 3.0), DVec3::Z);
        let p = Plane::intersect_three(&px, &py, &pz).unwrap();
        assert!((p - DVec3::new(1.0, 2.0, 3.0)).length() < 1e-12);

        let py2 = Plane::new(DVec3::new(0.0, -2.0, 0.0), DVec3::Y);
        assert!(Plane::intersect_three(&px, &py, &py2).is_none());
    }

    #[test]
    fn test_plane_trace_intersect() {
        let plane = Surface::Plane(Plane::new(DVec3::new(1.5, 0.0, 0.0), DVec3::X));
        let trace = Trace::new(DVec3::new(5.0, 0.0, 0.0), DVec3::new(-5.0, 0.0, 0.0));
        let (hit, t) = plane.trace_intersect(&trace, 0.0, 1.0).unwrap();
        assert!((t - 0.7).abs() < 1e-12);
        assert!((hit - DVec3::new(1.5, 0.0, 0.0)).length() < 1e-12);

        // Parallel motion never hits
        let tangent = Trace::new(DVec3::new(5.0, 3.0, 0.0), DVec3::new(0.0, -1.0, 0.0));
        assert!(plane.trace_intersect(&tangent, 0.0, 1.0).is_none());
    }

    #[test]
    fn test_sphere_trace_intersect_picks_near_root() {
        let sphere = Surface::Sphere(Sphere::new(DVec3::ZERO, 2.0));
        let trace = Trace::new(DVec3::new(5.0, 0.0, 0.0), DVec3::new(-5.0, 0.0, 0.0));
        let (hit, t) = sphere.trace_intersect(&trace, 0.0, 1.0).unwrap();
        assert!((t - 0.6).abs() < 1e-12);
        assert!((hit - DVec3::new(2.0, 0.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_sphere_trace_intersect_inflated() {
        let sphere = Surface::Sphere(Sphere::new(DVec3::ZERO, 2.0));
        let trace = Trace::new(DVec3::new(5.0, 0.0, 0.0), DVec3::new(-5.0, 0.0, 0.0));
        let (_, t) = sphere.trace_intersect(&trace, 1.0, 1.0).unwrap();
        // Inflated radius 3: hit at x = 3
        assert!((t - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_cylinder_trace_parallel_to_axis_misses() {
        let cylinder = Surface::Cylinder(Cylinder::new(DVec3::ZERO, DVec3::Y, 1.0));
        let trace = Trace::new(DVec3::new(3.0, -5.0, 0.0), DVec3::new(0.0, 10.0, 0.0));
        assert!(cylinder.trace_intersect(&trace, 0.0, 1.0).is_none());
    }

    #[test]
    fn test_line_closest_approach_skew() {
        // x axis and a z-directed line offset in y
        let (p1, to2) = line_closest_approach(
            DVec3::ZERO,
            DVec3::X,
            DVec3::new(2.0, 3.0, -7.0),
            DVec3::Z,
        );
        assert!((p1 - DVec3::new(2.0, 0.0, 0.0)).length() < 1e-12);
        assert!((to2 - DVec3::new(0.0, 3.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_line_closest_approach_parallel() {
        let (p1, to2) = line_closest_approach(
            DVec3::ZERO,
            DVec3::X,
            DVec3::new(5.0, 1.0, 0.0),
            DVec3::X,
        );
        assert_eq!(p1, DVec3::ZERO);
        assert!((to2 - DVec3::new(0.0, 1.0, 0.0)).length() < 1e-12);
    }
}
