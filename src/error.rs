//! Crate error types.

use thiserror::Error;

/// Construction-time precondition failures. Queries report "no result" with
/// `Option`, not with errors.
#[derive(Debug, Error)]
pub enum PhysicsError {
    /// An entity was built without a shape.
    #[error("entity requires a shape")]
    MissingShape,
    /// An entity was built without a material.
    #[error("entity requires a material")]
    MissingMaterial,
    /// An integrator name did not match any known scheme.
    #[error("unknown integrator `{0}`")]
    UnknownIntegrator(String),
}
