//! Shared math utilities: epsilon comparisons, motion traces and bounding
//! boxes.
//!
//! Every inside/touching/outside decision in the crate goes through the
//! single [`EPSILON`] constant, so touching classifications agree between
//! surfaces, shapes and queries.

use glam::DVec3;

/// Tolerance for all approximate comparisons.
pub const EPSILON: f64 = 1e-9;

/// Large but finite stand-in for infinity, for when a real coordinate is
/// required.
pub(crate) const FAR_AWAY: f64 = 1e12;

/// Clamp a value to exactly zero when it is within [`EPSILON`] of zero.
#[inline]
pub fn epsilon_zero(value: f64) -> f64 {
    if value.abs() <= EPSILON {
        0.0
    } else {
        value
    }
}

#[inline]
pub fn epsilon_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPSILON
}

#[inline]
pub fn epsilon_lt(a: f64, b: f64) -> bool {
    a < b - EPSILON
}

#[inline]
pub fn epsilon_lte(a: f64, b: f64) -> bool {
    a <= b + EPSILON
}

#[inline]
pub fn epsilon_gte(a: f64, b: f64) -> bool {
    a >= b - EPSILON
}

/// Relative motion of a point over one step: `origin + t * motion` for
/// `t` in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trace {
    pub origin: DVec3,
    pub motion: DVec3,
}

impl Trace {
    pub fn new(origin: DVec3, motion: DVec3) -> Self {
        Self { origin, motion }
    }

    /// The point at the end of the motion (`t = 1`).
    pub fn end(&self) -> DVec3 {
        self.origin + self.motion
    }
}

/// Axis-aligned bounding box. Extents may be infinite for unbounded shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub const fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Degenerate box containing a single point.
    pub fn point(p: DVec3) -> Self {
        Self { min: p, max: p }
    }

    /// Box spanning all of space.
    pub fn infinite() -> Self {
        Self {
            min: DVec3::splat(f64::NEG_INFINITY),
            max: DVec3::splat(f64::INFINITY),
        }
    }

    /// Overlap test with both boxes translated to world positions.
    pub fn overlaps_at(&self, position: DVec3, other: &Aabb, other_position: DVec3) -> bool {
        let a_min = self.min + position;
        let a_max = self.max + position;
        let b_min = other.min + other_position;
        let b_max = other.max + other_position;

        a_min.x <= b_max.x
            && a_max.x >= b_min.x
            && a_min.y <= b_max.y
            && a_max.y >= b_min.y
            && a_min.z <= b_max.z
            && a_max.z >= b_min.z
    }
}

/// Vector helpers shared by the queries and the contact response.
pub(crate) trait VecExt {
    fn is_near_zero(self) -> bool;
    /// Same direction, given length. Zero vectors stay zero.
    fn with_length(self, length: f64) -> DVec3;
    /// Shorten by `amount`, clamping at zero.
    fn reduce_length(self, amount: f64) -> DVec3;
    /// Move from `self` toward `target` by `distance`.
    fn move_toward(self, target: DVec3, distance: f64) -> DVec3;
    /// Place at `distance` from `target`, along the `target -> self`
    /// direction.
    fn move_at_distance_of(self, target: DVec3, distance: f64) -> DVec3;
    /// Split into the component along a unit `normal` and the remainder.
    fn decompose(self, normal: DVec3) -> (DVec3, DVec3);
}

impl VecExt for DVec3 {
    #[inline]
    fn is_near_zero(self) -> bool {
        self.x.abs() <= EPSILON && self.y.abs() <= EPSILON && self.z.abs() <= EPSILON
    }

    fn with_length(self, length: f64) -> DVec3 {
        let current = self.length();
        if current <= EPSILON {
            return self;
        }
        self * (length / current)
    }

    fn reduce_length(self, amount: f64) -> DVec3 {
        let current = self.length();
        if current <= amount {
            return DVec3::ZERO;
        }
        self * ((current - amount) / current)
    }

    fn move_toward(self, target: DVec3, distance: f64) -> DVec3 {
        self + (target - self).with_length(distance)
    }

    fn move_at_distance_of(self, target: DVec3, distance: f64) -> DVec3 {
        target + (self - target).with_length(distance)
    }

    fn decompose(self, normal: DVec3) -> (DVec3, DVec3) {
        let along = normal * self.dot(normal);
        (along, self - along)
    }
}
