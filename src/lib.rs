//! Corpuscle
//!
//! Collision detection between convex shapes and a fixed-timestep point-mass
//! simulation on top of it.
//!
//! # Architecture
//!
//! The library is organized into layers, leaf to root:
//!
//! 1. **math** - Shared tolerance, traces, bounding boxes, vector helpers
//! 2. **surface** - Plane, sphere and cylinder primitives with signed-distance
//!    tests and ray sweeps
//! 3. **shape** - Convex shapes assembled from surfaces, with derived
//!    vertices and edges
//! 4. **material** - Materials and directional interaction rules
//! 5. **entity** - Point masses with double-buffered kinematic state
//! 6. **dynamics** - Force generators (springs, constant forces, drag)
//! 7. **integrator** - Euler, Verlet and predictor-corrector schemes
//! 8. **world** - Entity storage, pairwise resolution and the step loop

pub mod dynamics;
pub mod entity;
pub mod error;
pub mod integrator;
pub mod material;
pub mod math;
pub mod query;
pub mod shape;
pub mod surface;
pub mod world;

// Re-export commonly used types
pub use dynamics::{ConstantForce, Dynamic, LinearDrag, SpringDamper};
pub use entity::{Entity, EntityId, EntityParams, Kinematics};
pub use error::PhysicsError;
pub use integrator::Integrator;
pub use material::{
    Accelerate, Drag, Friction, Influence, Material, MaterialId, MaterialInteraction,
};
pub use math::{Aabb, Trace, EPSILON};
pub use query::Collision;
pub use shape::{Primitive, Shape};
pub use surface::{Cylinder, Plane, Sphere, Surface};
pub use world::{Entities, World, WorldConfig};

// Re-export glam for convenience
pub use glam;
