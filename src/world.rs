//! The simulation world: entity storage, dynamics and the fixed-timestep
//! loop.

use tracing::debug;

use crate::dynamics::Dynamic;
use crate::entity::{Entity, EntityId, EntityParams};
use crate::error::PhysicsError;
use crate::integrator::Integrator;
use crate::material::MaterialInteraction;
use crate::math::VecExt;
use crate::query::Collision;

/// Configuration for a [`World`].
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Fixed timestep in seconds. Default: 1/30.
    pub time_step: f64,
    /// Integration scheme. Default: Verlet.
    pub integrator: Integrator,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            time_step: 1.0 / 30.0,
            integrator: Integrator::default(),
        }
    }
}

impl WorldConfig {
    /// Timestep expressed as a frame rate.
    pub fn from_fps(fps: f64) -> Self {
        Self {
            time_step: 1.0 / fps,
            ..Default::default()
        }
    }

    pub fn with_integrator(mut self, integrator: Integrator) -> Self {
        self.integrator = integrator;
        self
    }
}

/// Mutable view over the world's entities, handed to [`Dynamic::apply`].
pub struct Entities<'a> {
    slots: &'a mut [Entity],
}

impl Entities<'_> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, id: EntityId) -> &Entity {
        &self.slots[id.0]
    }

    pub fn get_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.slots[id.0]
    }

    /// Mutable access to two distinct entities at once.
    pub fn get_pair_mut(&mut self, a: EntityId, b: EntityId) -> (&mut Entity, &mut Entity) {
        pair_mut(self.slots, a, b)
    }
}

fn pair_mut(entities: &mut [Entity], a: EntityId, b: EntityId) -> (&mut Entity, &mut Entity) {
    assert_ne!(a.0, b.0, "pair access requires two distinct entities");
    if a.0 < b.0 {
        let (left, right) = entities.split_at_mut(b.0);
        (&mut left[a.0], &mut right[0])
    } else {
        let (left, right) = entities.split_at_mut(a.0);
        (&mut right[0], &mut left[b.0])
    }
}

/// The simulation world.
pub struct World {
    time: f64,
    time_step: f64,
    integrator: Integrator,
    entities: Vec<Entity>,
    dynamic_ids: Vec<EntityId>,
    static_ids: Vec<EntityId>,
    dynamics: Vec<Box<dyn Dynamic>>,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        Self {
            time: 0.0,
            time_step: config.time_step,
            integrator: config.integrator,
            entities: Vec::new(),
            dynamic_ids: Vec::new(),
            static_ids: Vec::new(),
            dynamics: Vec::new(),
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    pub fn integrator(&self) -> Integrator {
        self.integrator
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.0]
    }

    /// Add an entity built beforehand. Registers and links any dynamics the
    /// entity was constructed with.
    pub fn add_entity(&mut self, mut entity: Entity) -> EntityId {
        let id = EntityId(self.entities.len());
        entity.id = Some(id);
        let pending = std::mem::take(&mut entity.pending_dynamics);

        if entity.is_static() {
            self.static_ids.push(id);
        } else {
            self.dynamic_ids.push(id);
        }
        self.entities.push(entity);

        for mut dynamic in pending {
            dynamic.link_entity(id);
            self.dynamics.push(dynamic);
        }
        id
    }

    /// Build and add an entity in one call.
    pub fn create_entity(&mut self, params: EntityParams) -> Result<EntityId, PhysicsError> {
        Ok(self.add_entity(Entity::new(params)?))
    }

    /// Register a world-level dynamic; returns its index.
    pub fn add_dynamic(&mut self, dynamic: Box<dyn Dynamic>) -> usize {
        self.dynamics.push(dynamic);
        self.dynamics.len() - 1
    }

    pub fn create_dynamic<D: Dynamic + 'static>(&mut self, dynamic: D) -> usize {
        self.add_dynamic(Box::new(dynamic))
    }

    pub fn dynamic_mut(&mut self, index: usize) -> &mut dyn Dynamic {
        &mut *self.dynamics[index]
    }

    /// Derive forces and accelerations for the initial state without
    /// advancing time, so observers see a consistent acceleration before
    /// the first step.
    pub fn compute_initial_forces(&mut self) {
        for entity in &mut self.entities {
            entity.begin_step();
        }
        self.apply_dynamics(self.time_step);
        for entity in &mut self.entities {
            entity.derive_acceleration();
        }
        for entity in &mut self.entities {
            entity.commit();
        }
    }

    /// Advance the simulation by the configured timestep.
    pub fn update(&mut self) {
        self.step(self.time_step);
    }

    /// Advance the simulation by an explicit timestep.
    pub fn step(&mut self, dt: f64) {
        // 1. Forces and accelerations from the committed state
        for entity in &mut self.entities {
            entity.begin_step();
        }
        self.apply_dynamics(dt);
        for entity in &mut self.entities {
            entity.derive_acceleration();
        }

        // 2. Predict
        let integrator = self.integrator;
        for &id in &self.dynamic_ids {
            let entity = &mut self.entities[id.0];
            integrator.predict(entity, dt);
            if entity.is_2d() {
                entity.enforce_2d();
            }
        }

        // 3. Resolve pairwise interactions at the predicted state
        self.resolve_interactions(dt);
        for &id in &self.dynamic_ids {
            let entity = &mut self.entities[id.0];
            if entity.is_2d() {
                entity.enforce_2d();
            }
        }

        // 4. Re-derive forces at the predicted state and correct
        for entity in &mut self.entities {
            entity.reset_next_forces();
        }
        self.apply_dynamics(dt);
        for &id in &self.dynamic_ids {
            let entity = &mut self.entities[id.0];
            let corrected = entity.corrected_acceleration();
            integrator.correct(entity, corrected, dt);
            if entity.is_2d() {
                entity.enforce_2d();
            }
        }

        // 5. Commit
        for entity in &mut self.entities {
            entity.commit();
        }
        self.time += dt;
    }

    fn apply_dynamics(&mut self, dt: f64) {
        let mut view = Entities {
            slots: &mut self.entities,
        };
        for dynamic in &mut self.dynamics {
            dynamic.apply(dt, &mut view);
        }
    }

    /// Every dynamic entity against every static one, then every dynamic
    /// pair once.
    fn resolve_interactions(&mut self, dt: f64) {
        for di in 0..self.dynamic_ids.len() {
            for si in 0..self.static_ids.len() {
                self.resolve_pair(self.dynamic_ids[di], self.static_ids[si], dt);
            }
        }
        for i in 0..self.dynamic_ids.len() {
            for j in (i + 1)..self.dynamic_ids.len() {
                self.resolve_pair(self.dynamic_ids[i], self.dynamic_ids[j], dt);
            }
        }
    }

    fn resolve_pair(&mut self, a: EntityId, b: EntityId, dt: f64) {
        let (a, b) = pair_mut(&mut self.entities, a, b);

        // Directional rule lookup; an unregistered pair ignores each other
        let Some(rule) = a.material().interaction_with(b.material().id()) else {
            return;
        };
        let reverse = b.material().interaction_with(a.material().id()).flatten();

        // Omni fields act everywhere, no proximity check
        if a.is_omni() || b.is_omni() {
            influence_pair(a, b, rule.as_deref(), reverse.as_deref(), dt);
            return;
        }

        if a.material().is_solid() && b.material().is_solid() {
            let hq = rule.as_deref().is_some_and(|r| r.hq)
                || reverse.as_deref().is_some_and(|r| r.hq);

            let collision = if hq {
                a.shape().get_continuous_collision(
                    a.position(),
                    a.next_position(),
                    b.shape(),
                    b.position(),
                    b.next_position(),
                )
            } else {
                if !a
                    .shape()
                    .is_bbox_overlapping(a.next_position(), b.shape(), b.next_position())
                {
                    return;
                }
                a.shape()
                    .get_collision(a.next_position(), b.shape(), b.next_position())
            };

            let Some(collision) = collision else {
                return;
            };

            if collision.displacement.is_near_zero() {
                // Touching without interpenetration
                influence_pair(a, b, rule.as_deref(), reverse.as_deref(), dt);
                return;
            }

            debug!(
                t = collision.t,
                displacement = ?collision.displacement,
                "solid collision"
            );
            if !a.is_static() {
                if let Some(rule) = rule.as_deref() {
                    a.apply_collision(&collision, rule, dt);
                }
            }
            if !b.is_static() {
                if let Some(reverse) = reverse.as_deref() {
                    let inverted = Collision {
                        t: collision.t,
                        displacement: -collision.displacement,
                        normal: -collision.normal,
                        contact: collision.contact,
                    };
                    b.apply_collision(&inverted, reverse, dt);
                }
            }
        } else if a
            .shape()
            .is_overlapping(a.next_position(), b.shape(), b.next_position())
        {
            influence_pair(a, b, rule.as_deref(), reverse.as_deref(), dt);
        }
    }
}

fn influence_pair(
    a: &mut Entity,
    b: &mut Entity,
    rule: Option<&MaterialInteraction>,
    reverse: Option<&MaterialInteraction>,
    dt: f64,
) {
    if !a.is_static() {
        if let Some(rule) = rule {
            a.apply_influences(rule, dt);
        }
    }
    if !b.is_static() {
        if let Some(reverse) = reverse {
            b.apply_influences(reverse, dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::{ConstantForce, SpringDamper};
    use crate::material::{Drag, Material, MaterialInteraction};
    use crate::shape::Shape;
    use glam::DVec3;
    use std::rc::Rc;

    const GRAVITY: DVec3 = DVec3::new(0.0, -9.81, 0.0);

    #[test]
    fn test_free_fall() {
        let mut world = World::new(WorldConfig::from_fps(60.0).with_integrator(Integrator::Euler));
        let material = Material::new(true);
        let id = world
            .create_entity(EntityParams {
                shape: Some(Rc::new(Shape::dot())),
                material: Some(material),
                position: DVec3::new(0.0, 10.0, 0.0),
                dynamics: vec![Box::new(ConstantForce::new(GRAVITY))],
                ..Default::default()
            })
            .unwrap();

        world.compute_initial_forces();
        assert!((world.entity(id).acceleration() - GRAVITY).length() < 1e-12);

        for _ in 0..60 {
            world.update();
        }

        let y = world.entity(id).position().y;
        // Roughly 10 - g/2 after one second
        assert!(y < 6.0, "should have fallen: y = {y}");
        assert!(y > 4.0, "fell too far: y = {y}");
        assert_eq!(world.entity(id).position().x, 0.0);
        assert!((world.time() - 1.0).abs() < 1e-9);
    }

    /// Spring-damper oscillator: k = 10, c = 2, m = 1, y0 = 1.5, released
    /// at rest. Returns the y position at t = 1.
    fn run_spring(integrator: Integrator, dt: f64) -> f64 {
        let mut world = World::new(WorldConfig {
            time_step: dt,
            integrator,
        });
        let material = Material::new(false);

        let anchor = world
            .create_entity(EntityParams {
                shape: Some(Rc::new(Shape::dot())),
                material: Some(material.clone()),
                is_static: true,
                ..Default::default()
            })
            .unwrap();
        let mass = world
            .create_entity(EntityParams {
                shape: Some(Rc::new(Shape::dot())),
                material: Some(material),
                position: DVec3::new(0.0, 1.5, 0.0),
                ..Default::default()
            })
            .unwrap();

        let mut spring = SpringDamper::new(10.0, 2.0);
        spring.link_entity(anchor);
        spring.link_entity(mass);
        world.create_dynamic(spring);

        world.compute_initial_forces();
        let steps = (1.0 / dt).round() as usize;
        for _ in 0..steps {
            world.update();
        }
        world.entity(mass).position().y
    }

    // Analytic solution of the oscillator above at t = 1
    const SPRING_ANALYTIC_Y1: f64 = -0.520_339_254_768_352_7;

    fn spring_errors(integrator: Integrator) -> Vec<f64> {
        [0.02, 0.01, 0.005, 0.0025]
            .iter()
            .map(|&dt| (run_spring(integrator, dt) - SPRING_ANALYTIC_Y1).abs())
            .collect()
    }

    #[test]
    fn test_spring_damper_convergence_euler() {
        let errors = spring_errors(Integrator::Euler);
        for pair in errors.windows(2) {
            assert!(pair[1] < pair[0], "errors must decrease: {errors:?}");
        }
        assert!(errors[3] < 0.05, "final error too large: {errors:?}");
    }

    #[test]
    fn test_spring_damper_convergence_verlet() {
        let errors = spring_errors(Integrator::Verlet);
        for pair in errors.windows(2) {
            assert!(pair[1] < pair[0], "errors must decrease: {errors:?}");
        }
        assert!(errors[3] < 1e-3, "final error too large: {errors:?}");
    }

    #[test]
    fn test_spring_damper_convergence_predictor() {
        let errors = spring_errors(Integrator::Predictor);
        for pair in errors.windows(2) {
            assert!(pair[1] < pair[0], "errors must decrease: {errors:?}");
        }
        assert!(errors[3] < 1e-3, "final error too large: {errors:?}");
    }

    /// Undamped stiff spring, spring_k * dt^2 = 4: way beyond what explicit
    /// Euler can integrate. Returns the largest |y| over 1000 steps.
    fn run_stiff_spring(integrator: Integrator) -> f64 {
        let dt = 0.1;
        let mut world = World::new(WorldConfig {
            time_step: dt,
            integrator,
        });
        let material = Material::new(false);

        let anchor = world
            .create_entity(EntityParams {
                shape: Some(Rc::new(Shape::dot())),
                material: Some(material.clone()),
                is_static: true,
                ..Default::default()
            })
            .unwrap();
        let mass = world
            .create_entity(EntityParams {
                shape: Some(Rc::new(Shape::dot())),
                material: Some(material),
                position: DVec3::new(0.0, 1.0, 0.0),
                ..Default::default()
            })
            .unwrap();

        let mut spring = SpringDamper::new(400.0, 0.0);
        spring.link_entity(anchor);
        spring.link_entity(mass);
        world.create_dynamic(spring);

        world.compute_initial_forces();
        let mut max_abs = 0.0_f64;
        for _ in 0..1000 {
            world.update();
            max_abs = max_abs.max(world.entity(mass).position().y.abs());
        }
        max_abs
    }

    #[test]
    fn test_stiff_spring_predictor_bounded_where_euler_diverges() {
        let euler_max = run_stiff_spring(Integrator::Euler);
        assert!(euler_max > 1e6, "Euler should diverge: max = {euler_max}");

        let predictor_max = run_stiff_spring(Integrator::Predictor);
        assert!(
            predictor_max < 10.0,
            "Predictor should stay bounded: max = {predictor_max}"
        );
    }

    fn floor_world(hq: bool) -> (World, EntityId) {
        let mut world =
            World::new(WorldConfig::from_fps(60.0).with_integrator(Integrator::Verlet));
        let material = Material::new(true);
        material.set_self_interaction(Some(Rc::new(MaterialInteraction {
            hq,
            debounce: 10.0,
            ..Default::default()
        })));

        world
            .create_entity(EntityParams {
                shape: Some(Rc::new(Shape::plane(DVec3::Y))),
                material: Some(material.clone()),
                is_static: true,
                ..Default::default()
            })
            .unwrap();
        let ball = world
            .create_entity(EntityParams {
                shape: Some(Rc::new(Shape::dot())),
                material: Some(material),
                position: DVec3::new(0.0, 1.5, 0.0),
                dynamics: vec![Box::new(ConstantForce::new(GRAVITY))],
                ..Default::default()
            })
            .unwrap();
        (world, ball)
    }

    #[test]
    fn test_falling_entity_rests_on_floor_continuous() {
        let (mut world, ball) = floor_world(true);
        world.compute_initial_forces();
        for _ in 0..120 {
            world.update();
        }
        let state = world.entity(ball).state();
        assert!(state.position.y > -0.05, "fell through: y = {}", state.position.y);
        assert!(state.position.y < 0.2, "did not land: y = {}", state.position.y);
        assert!(state.velocity.y.abs() < 0.5, "did not settle: vy = {}", state.velocity.y);
    }

    #[test]
    fn test_falling_entity_rests_on_floor_discrete() {
        let (mut world, ball) = floor_world(false);
        world.compute_initial_forces();
        for _ in 0..120 {
            world.update();
        }
        let state = world.entity(ball).state();
        assert!(state.position.y > -0.05, "fell through: y = {}", state.position.y);
        assert!(state.position.y < 0.2, "did not land: y = {}", state.position.y);
    }

    #[test]
    fn test_unregistered_materials_pass_through() {
        let mut world = World::new(WorldConfig::from_fps(60.0));
        let a = Material::new(true);
        let b = Material::new(true);

        world
            .create_entity(EntityParams {
                shape: Some(Rc::new(Shape::cuboid(2.0, 2.0, 2.0))),
                material: Some(a),
                is_static: true,
                ..Default::default()
            })
            .unwrap();
        let mover = world
            .create_entity(EntityParams {
                shape: Some(Rc::new(Shape::dot())),
                material: Some(b),
                position: DVec3::new(0.5, 0.0, 0.0),
                velocity: DVec3::new(-1.0, 0.0, 0.0),
                ..Default::default()
            })
            .unwrap();

        world.compute_initial_forces();
        for _ in 0..30 {
            world.update();
        }
        // Overlapping all along, but no interaction was registered
        let x = world.entity(mover).position().x;
        assert!((x - 0.0).abs() < 1e-9, "should drift freely: x = {x}");
    }

    #[test]
    fn test_bounce_keeps_energy_fraction() {
        let mut world =
            World::new(WorldConfig::from_fps(60.0).with_integrator(Integrator::Verlet));
        let material = Material::new(true);
        material.set_self_interaction(Some(Rc::new(MaterialInteraction {
            hq: true,
            normal_bounce_rate: 0.5,
            ..Default::default()
        })));

        world
            .create_entity(EntityParams {
                shape: Some(Rc::new(Shape::plane(DVec3::Y))),
                material: Some(material.clone()),
                is_static: true,
                ..Default::default()
            })
            .unwrap();
        let ball = world
            .create_entity(EntityParams {
                shape: Some(Rc::new(Shape::dot())),
                material: Some(material),
                position: DVec3::new(0.0, 1.0, 0.0),
                velocity: DVec3::new(0.0, -6.0, 0.0),
                ..Default::default()
            })
            .unwrap();

        world.compute_initial_forces();
        // No gravity: constant velocity until the bounce
        for _ in 0..20 {
            world.update();
        }
        let vy = world.entity(ball).velocity().y;
        assert!((vy - 3.0).abs() < 1e-9, "bounced velocity: vy = {vy}");
        assert!(world.entity(ball).position().y > 0.0);
    }

    #[test]
    fn test_spring_linked_to_one_entity_is_inert() {
        let mut world = World::new(WorldConfig::from_fps(60.0));
        let material = Material::new(false);
        let mass = world
            .create_entity(EntityParams {
                shape: Some(Rc::new(Shape::dot())),
                material: Some(material),
                position: DVec3::new(0.0, 1.0, 0.0),
                ..Default::default()
            })
            .unwrap();

        let mut spring = SpringDamper::with_rest_length(10.0, 2.0, 0.5);
        spring.link_entity(mass);
        spring.link_entity(mass);
        world.create_dynamic(spring);

        world.compute_initial_forces();
        for _ in 0..10 {
            world.update();
        }
        let state = world.entity(mass).state();
        assert_eq!(state.position, DVec3::new(0.0, 1.0, 0.0));
        assert_eq!(state.velocity, DVec3::ZERO);
    }

    #[test]
    fn test_omni_field_ignores_distance() {
        let mut world = World::new(WorldConfig::from_fps(60.0));
        let field_material = Material::new(false);
        let ball_material = Material::new(true);
        ball_material.set_interaction_with(
            &field_material,
            Some(Rc::new(MaterialInteraction {
                influences: vec![Box::new(Drag { rate: 0.5 })],
                ..Default::default()
            })),
            None,
        );

        // Finite shape, nowhere near the ball: omni still reaches it
        world
            .create_entity(EntityParams {
                shape: Some(Rc::new(Shape::cuboid(2.0, 2.0, 2.0))),
                material: Some(field_material),
                omni: true,
                position: DVec3::new(100.0, 0.0, 0.0),
                ..Default::default()
            })
            .unwrap();
        let ball = world
            .create_entity(EntityParams {
                shape: Some(Rc::new(Shape::dot())),
                material: Some(ball_material),
                velocity: DVec3::new(2.0, 0.0, 0.0),
                ..Default::default()
            })
            .unwrap();

        world.compute_initial_forces();
        for _ in 0..60 {
            world.update();
        }
        let vx = world.entity(ball).velocity().x;
        // 2 * (1 - 0.5/60)^60 after one second of drag
        assert!((vx - 1.21052).abs() < 1e-3, "drag applied: vx = {vx}");
    }
}
