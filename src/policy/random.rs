//! Random policy for testing and baselines.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::trait_::Policy;

/// Uniformly random joint action.
///
/// Used for sanity checks and as a lower-bound baseline.
pub struct RandomPolicy {
    action_dim: usize,
    rng: StdRng,
}

impl RandomPolicy {
    /// Creates a new random policy.
    ///
    /// # Arguments
    ///
    /// * `action_dim` - Size of the joint action space.
    /// * `seed` - RNG seed.
    pub fn new(action_dim: usize, seed: u64) -> Self {
        assert!(action_dim > 0, "Action space must not be empty");
        Self {
            action_dim,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn act(&mut self, _state: &[f64]) -> usize {
        self.rng.gen_range(0..self.action_dim)
    }

    fn name(&self) -> &str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_policy_actions_in_range() {
        let mut policy = RandomPolicy::new(25, 0);
        for _ in 0..500 {
            assert!(policy.act(&[]) < 25);
        }
    }

    #[test]
    fn same_seed_same_actions() {
        let mut a = RandomPolicy::new(9, 3);
        let mut b = RandomPolicy::new(9, 3);
        for _ in 0..20 {
            assert_eq!(a.act(&[]), b.act(&[]));
        }
    }
}
