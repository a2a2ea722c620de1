//! Reward for the wildfire environment.
//!
//! Combines the estimation error and the movement cost.

use crate::field::FieldParameters;
use crate::types::Displacement;

/// Upper bound on the estimation-error term.
///
/// The estimator keeps covariances positive definite, so the KL divergence is
/// always finite; the cap only bounds its scale for the value network.
pub const MAX_KL: f64 = 1e6;

/// Per-step reward breakdown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardBreakdown {
    /// `KL(true || estimate)`, capped at [`MAX_KL`].
    pub kl: f64,
    /// Sum of Euclidean lengths of the applied moves.
    pub movement: f64,
    /// `-(kl + p_move * movement)`.
    pub reward: f64,
}

/// Computes rewards for the wildfire environment.
pub struct RewardComputer;

impl RewardComputer {
    /// Computes the reward for one step.
    ///
    /// # Components
    ///
    /// 1. **Estimation error**: `-KL(true || estimate)`.
    /// 2. **Movement cost**: `-p_move * sum_i |d_i|` over the moves actually
    ///    applied (rejected moves cost nothing).
    pub fn compute(
        truth: &FieldParameters,
        estimate: &FieldParameters,
        applied: &[Displacement],
        p_move: f64,
    ) -> RewardBreakdown {
        let kl = Self::estimation_error(truth, estimate);
        let movement: f64 = applied.iter().map(Displacement::length).sum();
        RewardBreakdown {
            kl,
            movement,
            reward: -(kl + p_move * movement),
        }
    }

    /// `KL(true || estimate)`, with singular or non-finite results mapped to [`MAX_KL`].
    pub fn estimation_error(truth: &FieldParameters, estimate: &FieldParameters) -> f64 {
        match truth.kl_divergence(estimate) {
            Some(kl) if kl.is_finite() => kl.min(MAX_KL),
            _ => MAX_KL,
        }
    }
}
