//! Point-mass entities with double-buffered kinematic state.
//!
//! Every step phase reads the committed `current` state and writes the
//! `next` state; [`commit`](Entity::commit) then promotes it. Dynamics and
//! collision resolution therefore see a consistent snapshot no matter in
//! which order entities are processed.

use std::rc::Rc;

use glam::DVec3;

use crate::dynamics::Dynamic;
use crate::error::PhysicsError;
use crate::material::{Material, MaterialInteraction};
use crate::math::VecExt;
use crate::query::Collision;
use crate::shape::Shape;

/// Kinematic state of an entity at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Kinematics {
    pub position: DVec3,
    pub velocity: DVec3,
    pub acceleration: DVec3,
    /// Force accumulator for the step being computed.
    pub forces: DVec3,
}

/// Identifies an entity inside its [`World`](crate::World).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub(crate) usize);

impl EntityId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Parameters for [`Entity::new`].
pub struct EntityParams {
    pub shape: Option<Rc<Shape>>,
    pub material: Option<Rc<Material>>,
    /// Defaults to 1; non-positive values are treated as 1.
    pub mass: f64,
    pub is_static: bool,
    /// Constrain motion to the xy plane.
    pub is_2d: bool,
    /// All-encompassing field entity (forced static, influence-only).
    pub omni: bool,
    pub position: DVec3,
    pub velocity: DVec3,
    /// Dynamics registered and linked to the entity when it is added to a
    /// world.
    pub dynamics: Vec<Box<dyn Dynamic>>,
}

impl Default for EntityParams {
    fn default() -> Self {
        Self {
            shape: None,
            material: None,
            mass: 1.0,
            is_static: false,
            is_2d: false,
            omni: false,
            position: DVec3::ZERO,
            velocity: DVec3::ZERO,
            dynamics: Vec::new(),
        }
    }
}

/// A point mass with a shape, a material and double-buffered state.
pub struct Entity {
    pub(crate) id: Option<EntityId>,
    shape: Rc<Shape>,
    material: Rc<Material>,
    mass: f64,
    is_static: bool,
    is_2d: bool,
    omni: bool,
    pub(crate) current: Kinematics,
    pub(crate) next: Kinematics,
    /// Flat contact normals recorded during the previous step.
    frame_contacts: Vec<DVec3>,
    /// Flat contact normals recorded during the step being computed.
    next_frame_contacts: Vec<DVec3>,
    pub(crate) pending_dynamics: Vec<Box<dyn Dynamic>>,
}

impl Entity {
    pub fn new(params: EntityParams) -> Result<Self, PhysicsError> {
        let shape = params.shape.ok_or(PhysicsError::MissingShape)?;
        let material = params.material.ok_or(PhysicsError::MissingMaterial)?;

        let state = Kinematics {
            position: params.position,
            velocity: params.velocity,
            ..Default::default()
        };
        let omni = params.omni || shape.is_omni();

        Ok(Self {
            id: None,
            shape,
            material,
            mass: if params.mass > 0.0 { params.mass } else { 1.0 },
            is_static: params.is_static || omni,
            is_2d: params.is_2d,
            omni,
            current: state,
            next: state,
            frame_contacts: Vec::new(),
            next_frame_contacts: Vec::new(),
            pending_dynamics: params.dynamics,
        })
    }

    /// Id assigned when the entity was added to a world.
    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    pub fn shape(&self) -> &Rc<Shape> {
        &self.shape
    }

    pub fn material(&self) -> &Rc<Material> {
        &self.material
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn is_2d(&self) -> bool {
        self.is_2d
    }

    pub fn is_omni(&self) -> bool {
        self.omni
    }

    /// Committed state.
    pub fn state(&self) -> &Kinematics {
        &self.current
    }

    pub fn position(&self) -> DVec3 {
        self.current.position
    }

    pub fn velocity(&self) -> DVec3 {
        self.current.velocity
    }

    pub fn acceleration(&self) -> DVec3 {
        self.current.acceleration
    }

    /// State being computed for the current step.
    pub fn next_state(&self) -> &Kinematics {
        &self.next
    }

    pub fn next_position(&self) -> DVec3 {
        self.next.position
    }

    pub fn next_velocity(&self) -> DVec3 {
        self.next.velocity
    }

    /// Accumulate an external force for the step being computed.
    pub fn add_next_force(&mut self, force: DVec3) {
        self.next.forces += force;
    }

    pub fn set_next_velocity(&mut self, velocity: DVec3) {
        self.next.velocity = velocity;
    }

    pub(crate) fn begin_step(&mut self) {
        self.next = self.current;
        self.next.forces = DVec3::ZERO;
        self.next_frame_contacts.clear();
    }

    pub(crate) fn reset_next_forces(&mut self) {
        self.next.forces = DVec3::ZERO;
    }

    /// Acceleration from the accumulated forces, with components pushing
    /// into the previous step's contacts cancelled.
    pub(crate) fn derive_acceleration(&mut self) {
        if self.is_static {
            self.next.acceleration = DVec3::ZERO;
            return;
        }
        self.next.acceleration = project_on_contacts(self.next.forces / self.mass, &self.frame_contacts);
    }

    /// Same derivation against the contacts recorded this step, for the
    /// correction phase.
    pub(crate) fn corrected_acceleration(&self) -> DVec3 {
        if self.is_static {
            return DVec3::ZERO;
        }
        project_on_contacts(self.next.forces / self.mass, &self.next_frame_contacts)
    }

    /// Promote the freshly computed state.
    pub(crate) fn commit(&mut self) {
        self.current = self.next;
        std::mem::swap(&mut self.frame_contacts, &mut self.next_frame_contacts);
    }

    pub(crate) fn enforce_2d(&mut self) {
        self.next.position.z = 0.0;
        self.next.velocity.z = 0.0;
        self.next.acceleration.z = 0.0;
    }

    /// Resolve a solid collision on this entity: displace out of the
    /// foreign shape and bounce or rest depending on the normal speed.
    pub(crate) fn apply_collision(&mut self, collision: &Collision, rule: &MaterialInteraction, dt: f64) {
        let normal = collision.normal;
        self.next.position += collision.displacement;

        let (mut normal_velocity, tangent_velocity) = self.next.velocity.decompose(normal);

        if rule.debounce > 0.0 {
            normal_velocity = normal_velocity.reduce_length(rule.debounce);
        }

        if normal_velocity.is_near_zero() {
            // Resting contact
            self.next.velocity = normal_velocity + tangent_velocity;
            self.next_frame_contacts.push(normal);
            self.apply_influences(rule, dt);
            return;
        }

        if normal_velocity.dot(normal) < 0.0 {
            normal_velocity = -normal_velocity;
        }
        self.next.velocity =
            normal_velocity * rule.normal_bounce_rate + tangent_velocity * rule.tangent_bounce_rate;
        self.next_frame_contacts.push(normal);
    }

    pub(crate) fn apply_influences(&mut self, rule: &MaterialInteraction, dt: f64) {
        for influence in &rule.influences {
            influence.apply(self, dt);
        }
    }
}

fn project_on_contacts(mut acceleration: DVec3, contacts: &[DVec3]) -> DVec3 {
    for normal in contacts {
        let into = acceleration.dot(*normal);
        if into < 0.0 {
            acceleration -= *normal * into;
        }
    }
    acceleration
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialInteraction;

    fn test_entity() -> Entity {
        Entity::new(EntityParams {
            shape: Some(Rc::new(Shape::dot())),
            material: Some(Material::new(true)),
            position: DVec3::new(0.0, 2.0, 0.0),
            velocity: DVec3::new(1.0, -3.0, 0.0),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_construction_requires_shape_and_material() {
        assert!(matches!(
            Entity::new(EntityParams {
                material: Some(Material::new(true)),
                ..Default::default()
            }),
            Err(PhysicsError::MissingShape)
        ));
        assert!(matches!(
            Entity::new(EntityParams {
                shape: Some(Rc::new(Shape::dot())),
                ..Default::default()
            }),
            Err(PhysicsError::MissingMaterial)
        ));
    }

    #[test]
    fn test_non_positive_mass_defaults_to_one() {
        let entity = Entity::new(EntityParams {
            shape: Some(Rc::new(Shape::dot())),
            material: Some(Material::new(true)),
            mass: 0.0,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(entity.mass(), 1.0);
    }

    #[test]
    fn test_begin_step_copies_and_zeroes_forces() {
        let mut entity = test_entity();
        entity.next.forces = DVec3::new(0.0, 9.0, 0.0);
        entity.begin_step();
        assert_eq!(entity.next.position, entity.current.position);
        assert_eq!(entity.next.forces, DVec3::ZERO);
    }

    #[test]
    fn test_contact_projection_cancels_inward_acceleration() {
        let mut entity = test_entity();
        entity.begin_step();
        entity.frame_contacts.push(DVec3::Y);
        entity.add_next_force(DVec3::new(2.0, -9.81, 0.0));
        entity.derive_acceleration();
        assert_eq!(entity.next.acceleration, DVec3::new(2.0, 0.0, 0.0));

        // Outward acceleration is untouched
        entity.reset_next_forces();
        entity.add_next_force(DVec3::new(0.0, 5.0, 0.0));
        entity.derive_acceleration();
        assert_eq!(entity.next.acceleration, DVec3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn test_apply_collision_bounce() {
        let mut entity = test_entity();
        entity.begin_step();
        let collision = Collision {
            t: 1.0,
            displacement: DVec3::new(0.0, 0.5, 0.0),
            normal: DVec3::Y,
            contact: None,
        };
        let rule = MaterialInteraction {
            normal_bounce_rate: 0.5,
            tangent_bounce_rate: 1.0,
            ..Default::default()
        };
        entity.apply_collision(&collision, &rule, 0.1);

        assert_eq!(entity.next.position, DVec3::new(0.0, 2.5, 0.0));
        // Normal part reflected and halved, tangent kept
        assert!((entity.next.velocity - DVec3::new(1.0, 1.5, 0.0)).length() < 1e-12);
        assert_eq!(entity.next_frame_contacts.len(), 1);
    }

    #[test]
    fn test_apply_collision_debounce_rests() {
        let mut entity = test_entity();
        entity.begin_step();
        let collision = Collision {
            t: 1.0,
            displacement: DVec3::ZERO,
            normal: DVec3::Y,
            contact: None,
        };
        let rule = MaterialInteraction {
            debounce: 5.0,
            ..Default::default()
        };
        entity.apply_collision(&collision, &rule, 0.1);

        // Normal speed (3) below the debounce cut: nulled, tangent kept
        assert!((entity.next.velocity - DVec3::new(1.0, 0.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_commit_swaps_contacts() {
        let mut entity = test_entity();
        entity.begin_step();
        entity.next_frame_contacts.push(DVec3::Y);
        entity.commit();
        assert_eq!(entity.frame_contacts, vec![DVec3::Y]);
        entity.begin_step();
        assert!(entity.next_frame_contacts.is_empty());
    }
}
