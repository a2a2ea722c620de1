//! Policy trait for the wildfire environment.

/// Chooses a joint action from a flattened state.
pub trait Policy {
    /// Selects one joint action index in `[0, action_dim)`.
    fn act(&mut self, state: &[f64]) -> usize;

    /// Returns a human-readable name for this policy.
    fn name(&self) -> &str;
}
