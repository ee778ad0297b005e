//! Materials and the rules applied when two materials meet.
//!
//! Interaction rules are directional: the rule applied to A when touching B
//! is looked up as A→B and may differ from B→A (a projectile may bounce off
//! armor while the armor barely reacts). An absent entry means the pair
//! ignores each other entirely; an explicit `None` entry means contacts are
//! still resolved, with default behavior.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::DVec3;

use crate::entity::Entity;
use crate::math::VecExt;

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(0);

/// Identifies a [`Material`] inside interaction maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(u64);

impl MaterialId {
    fn next() -> Self {
        Self(NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A per-contact effect applied to a non-static entity while its material
/// touches or overlaps another without a solid collision.
pub trait Influence {
    fn apply(&self, entity: &mut Entity, dt: f64);
}

/// Constant acceleration field (wind, conveyor, local gravity well).
#[derive(Debug, Clone, Copy)]
pub struct Accelerate {
    pub acceleration: DVec3,
}

impl Influence for Accelerate {
    fn apply(&self, entity: &mut Entity, dt: f64) {
        let velocity = entity.next_velocity() + self.acceleration * dt;
        entity.set_next_velocity(velocity);
    }
}

/// Constant friction: speed reduced by a fixed amount per second, clamped
/// at rest.
#[derive(Debug, Clone, Copy)]
pub struct Friction {
    pub deceleration: f64,
}

impl Influence for Friction {
    fn apply(&self, entity: &mut Entity, dt: f64) {
        let velocity = entity.next_velocity().reduce_length(self.deceleration * dt);
        entity.set_next_velocity(velocity);
    }
}

/// Proportional drag: a fraction of the speed lost per second.
#[derive(Debug, Clone, Copy)]
pub struct Drag {
    pub rate: f64,
}

impl Influence for Drag {
    fn apply(&self, entity: &mut Entity, dt: f64) {
        let factor = (1.0 - self.rate * dt).max(0.0);
        let velocity = entity.next_velocity() * factor;
        entity.set_next_velocity(velocity);
    }
}

/// Rule for one direction of an ordered material pair.
pub struct MaterialInteraction {
    /// Resolve contacts with the swept (continuous) query instead of the
    /// discrete one.
    pub hq: bool,
    /// Absolute normal-speed cut applied before bouncing, letting an
    /// entity settle instead of micro-bouncing forever.
    pub debounce: f64,
    /// Fraction of the normal speed kept after a bounce.
    pub normal_bounce_rate: f64,
    /// Fraction of the tangential speed kept after a bounce.
    pub tangent_bounce_rate: f64,
    /// Effects applied while touching or overlapping without a solid
    /// collision.
    pub influences: Vec<Box<dyn Influence>>,
}

impl Default for MaterialInteraction {
    fn default() -> Self {
        Self {
            hq: false,
            debounce: 0.0,
            normal_bounce_rate: 1.0,
            tangent_bounce_rate: 1.0,
            influences: Vec::new(),
        }
    }
}

/// A material: solidity plus interaction rules toward other materials.
pub struct Material {
    id: MaterialId,
    is_solid: bool,
    interactions: RefCell<HashMap<MaterialId, Option<Rc<MaterialInteraction>>>>,
}

impl Material {
    pub fn new(is_solid: bool) -> Rc<Self> {
        Rc::new(Self {
            id: MaterialId::next(),
            is_solid,
            interactions: RefCell::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }

    pub fn is_solid(&self) -> bool {
        self.is_solid
    }

    /// Register `interaction` for contacts of `self` against `other`, and
    /// `reverse` for the opposite direction.
    pub fn set_interaction_with(
        self: &Rc<Self>,
        other: &Rc<Material>,
        interaction: Option<Rc<MaterialInteraction>>,
        reverse: Option<Rc<MaterialInteraction>>,
    ) {
        self.interactions.borrow_mut().insert(other.id, interaction);
        if !Rc::ptr_eq(self, other) {
            other.interactions.borrow_mut().insert(self.id, reverse);
        }
    }

    /// Rule for contacts of this material against itself.
    pub fn set_self_interaction(self: &Rc<Self>, interaction: Option<Rc<MaterialInteraction>>) {
        self.interactions.borrow_mut().insert(self.id, interaction);
    }

    /// `None` when the pair never interacts, `Some(None)` when contacts are
    /// resolved with default behavior.
    pub fn interaction_with(&self, other: MaterialId) -> Option<Option<Rc<MaterialInteraction>>> {
        self.interactions.borrow().get(&other).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_pair_has_no_interaction() {
        let a = Material::new(true);
        let b = Material::new(true);
        assert!(a.interaction_with(b.id()).is_none());
        assert!(b.interaction_with(a.id()).is_none());
    }

    #[test]
    fn test_interactions_are_directional() {
        let a = Material::new(true);
        let b = Material::new(true);

        let bouncy = Rc::new(MaterialInteraction {
            normal_bounce_rate: 0.5,
            ..Default::default()
        });
        a.set_interaction_with(&b, Some(bouncy), None);

        let forward = a.interaction_with(b.id()).unwrap().unwrap();
        assert!((forward.normal_bounce_rate - 0.5).abs() < 1e-12);

        // Reverse direction registered but defaulted
        assert!(b.interaction_with(a.id()).unwrap().is_none());
    }

    #[test]
    fn test_self_interaction() {
        let a = Material::new(true);
        a.set_self_interaction(Some(Rc::new(MaterialInteraction {
            hq: true,
            ..Default::default()
        })));
        assert!(a.interaction_with(a.id()).unwrap().unwrap().hq);
    }

    #[test]
    fn test_interaction_defaults() {
        let rule = MaterialInteraction::default();
        assert!(!rule.hq);
        assert_eq!(rule.debounce, 0.0);
        assert_eq!(rule.normal_bounce_rate, 1.0);
        assert_eq!(rule.tangent_bounce_rate, 1.0);
        assert!(rule.influences.is_empty());
    }
}
