//! Greedy policy over a trained [`DqnAgent`].

use super::trait_::Policy;
use crate::agent::{DqnAgent, ValueFunction};

/// Exploit-only view of a DQN agent.
///
/// Borrows the agent immutably, so evaluating through it never changes the
/// agent's parameters, replay buffer, or exploration state.
pub struct GreedyPolicy<'a, V: ValueFunction> {
    agent: &'a DqnAgent<V>,
}

impl<'a, V: ValueFunction> GreedyPolicy<'a, V> {
    pub fn new(agent: &'a DqnAgent<V>) -> Self {
        Self { agent }
    }
}

impl<V: ValueFunction> Policy for GreedyPolicy<'_, V> {
    fn act(&mut self, state: &[f64]) -> usize {
        self.agent.greedy_action(state)
    }

    fn name(&self) -> &str {
        "greedy-dqn"
    }
}
