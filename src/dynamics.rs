//! Force generators attached to entities or to the world.
//!
//! A [`Dynamic`] runs twice per step: once against the committed state to
//! derive the predicted motion, and once against the predicted state for
//! the integrator's correction. Both times it reads next-state kinematics
//! and accumulates into next-state forces.

use glam::DVec3;

use crate::entity::EntityId;
use crate::world::Entities;

/// A per-step force generator over linked entities.
pub trait Dynamic {
    /// Accumulate this step's forces into the linked entities.
    fn apply(&mut self, dt: f64, entities: &mut Entities<'_>);

    /// Entities this dynamic acts upon.
    fn linked_entities(&self) -> &[EntityId];

    /// Link one more entity. Ignored once the fixed arity is reached.
    fn link_entity(&mut self, id: EntityId);

    /// `Some(n)` when the dynamic needs exactly `n` linked entities.
    fn fixed_entity_count(&self) -> Option<usize> {
        None
    }
}

/// Spring and damper between exactly two entities.
#[derive(Debug)]
pub struct SpringDamper {
    pub spring_k: f64,
    pub damping_factor: f64,
    pub rest_length: f64,
    entities: Vec<EntityId>,
}

impl SpringDamper {
    pub fn new(spring_k: f64, damping_factor: f64) -> Self {
        Self::with_rest_length(spring_k, damping_factor, 0.0)
    }

    pub fn with_rest_length(spring_k: f64, damping_factor: f64, rest_length: f64) -> Self {
        Self {
            spring_k,
            damping_factor,
            rest_length,
            entities: Vec::with_capacity(2),
        }
    }
}

impl Dynamic for SpringDamper {
    fn apply(&mut self, _dt: f64, entities: &mut Entities<'_>) {
        let &[a, b] = self.entities.as_slice() else {
            return;
        };
        // A spring from an entity to itself has zero length and cancels
        if a == b {
            return;
        }
        let (entity_a, entity_b) = entities.get_pair_mut(a, b);

        let mut direction = entity_b.next_position() - entity_a.next_position();
        let distance = direction.length();
        if distance > 0.0 {
            direction /= distance;
        } else {
            direction = DVec3::Y;
        }

        let relative_speed =
            direction.dot(entity_b.next_velocity() - entity_a.next_velocity());
        let force =
            (self.rest_length - distance) * self.spring_k - relative_speed * self.damping_factor;

        entity_b.add_next_force(direction * force);
        entity_a.add_next_force(direction * -force);
    }

    fn linked_entities(&self) -> &[EntityId] {
        &self.entities
    }

    fn link_entity(&mut self, id: EntityId) {
        if self.entities.len() < 2 {
            self.entities.push(id);
        }
    }

    fn fixed_entity_count(&self) -> Option<usize> {
        Some(2)
    }
}

/// Constant force applied to every linked entity, e.g. gravity.
#[derive(Debug)]
pub struct ConstantForce {
    pub force: DVec3,
    entities: Vec<EntityId>,
}

impl ConstantForce {
    pub fn new(force: DVec3) -> Self {
        Self {
            force,
            entities: Vec::new(),
        }
    }
}

impl Dynamic for ConstantForce {
    fn apply(&mut self, _dt: f64, entities: &mut Entities<'_>) {
        for &id in &self.entities {
            entities.get_mut(id).add_next_force(self.force);
        }
    }

    fn linked_entities(&self) -> &[EntityId] {
        &self.entities
    }

    fn link_entity(&mut self, id: EntityId) {
        self.entities.push(id);
    }
}

/// Drag force proportional to the entity's speed.
#[derive(Debug)]
pub struct LinearDrag {
    pub rate: f64,
    entities: Vec<EntityId>,
}

impl LinearDrag {
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            entities: Vec::new(),
        }
    }
}

impl Dynamic for LinearDrag {
    fn apply(&mut self, _dt: f64, entities: &mut Entities<'_>) {
        for &id in &self.entities {
            let entity = entities.get_mut(id);
            let force = -entity.next_velocity() * self.rate;
            entity.add_next_force(force);
        }
    }

    fn linked_entities(&self) -> &[EntityId] {
        &self.entities
    }

    fn link_entity(&mut self, id: EntityId) {
        self.entities.push(id);
    }
}
