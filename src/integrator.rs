//! Fixed-timestep integration schemes.
//!
//! Each step the world predicts the next state from the committed one, lets
//! collisions adjust it, then re-derives the acceleration at the predicted
//! state and folds it back in (the correction). Corrections are applied
//! incrementally on top of the possibly collision-adjusted state so that
//! impulses survive them.

use std::str::FromStr;

use glam::DVec3;

use crate::entity::Entity;
use crate::error::PhysicsError;
use crate::math::EPSILON;

/// Numerical integration scheme used by [`World`](crate::World).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Integrator {
    /// Explicit Euler. First order, diverges on stiff forces; the baseline.
    Euler,
    /// Velocity Verlet. Second order, good energy behavior.
    #[default]
    Verlet,
    /// Predictor-corrector assuming linear acceleration over the step, with
    /// a damping branch bounding stiff-force oscillation.
    Predictor,
    /// The predictor-corrector without the damping branch.
    PredictorUnstiffed,
}

impl FromStr for Integrator {
    type Err = PhysicsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "euler" => Ok(Integrator::Euler),
            "verlet" => Ok(Integrator::Verlet),
            "predictor" => Ok(Integrator::Predictor),
            "predictorUnstiffed" => Ok(Integrator::PredictorUnstiffed),
            _ => Err(PhysicsError::UnknownIntegrator(s.to_owned())),
        }
    }
}

impl Integrator {
    /// Predict the next position and velocity from the committed state and
    /// the freshly derived acceleration.
    pub(crate) fn predict(self, entity: &mut Entity, dt: f64) {
        let acceleration = entity.next.acceleration;
        let position = entity.current.position;
        let velocity = entity.current.velocity;

        match self {
            Integrator::Euler => {
                entity.next.position = position + velocity * dt;
                entity.next.velocity = velocity + acceleration * dt;
            }
            _ => {
                entity.next.position = position + velocity * dt + acceleration * (0.5 * dt * dt);
                entity.next.velocity = velocity + acceleration * dt;
            }
        }
    }

    /// Fold the acceleration re-derived at the predicted state back into
    /// the next state.
    pub(crate) fn correct(self, entity: &mut Entity, corrected: DVec3, dt: f64) {
        let predicted = entity.next.acceleration;

        match self {
            Integrator::Euler => {}
            Integrator::Verlet => {
                entity.next.velocity += (corrected - predicted) * (0.5 * dt);
            }
            Integrator::Predictor | Integrator::PredictorUnstiffed => {
                if !corrected.abs_diff_eq(predicted, EPSILON) {
                    // The acceleration varied over the step: treat it as
                    // linear and add the matching cubic and quadratic terms
                    let delta = corrected - predicted;
                    entity.next.position += delta * (dt * dt / 6.0);
                    entity.next.velocity += delta * (0.5 * dt);

                    if self == Integrator::Predictor
                        && predicted.dot(corrected) < 0.0
                        && predicted.length_squared() > 0.0
                    {
                        // The correction reversed the acceleration: the
                        // force is too stiff for this timestep. Dampen both
                        // accelerations and re-derive the state, keeping the
                        // linear-acceleration form.
                        let stiffness = -predicted.dot(corrected) / predicted.length_squared();
                        let damp = 1.0 / (1.0 + 3.0 * stiffness * stiffness);
                        let damped = predicted * damp;
                        let damped_corrected = corrected * damp;
                        let position = entity.current.position;
                        let velocity = entity.current.velocity;

                        entity.next.position = position
                            + velocity * dt
                            + (damped / 3.0 + damped_corrected / 6.0) * (dt * dt);
                        entity.next.velocity =
                            velocity + (damped + damped_corrected) * (0.5 * dt);
                        entity.next.acceleration = damped;
                        return;
                    }
                }
            }
        }

        entity.next.acceleration = corrected;
    }
}
