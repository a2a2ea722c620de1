//! Deep Q-learning agent.
//!
//! Holds a primary and a lagged target [`ValueFunction`], an experience
//! replay buffer, and the exploration schedule.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::network::{MlpValueFunction, ValueFunction};
use super::replay::{ReplayBuffer, Transition};
use crate::config::DqnConfig;
use crate::error::{AgentError, ConfigError};

/// DQN learner over a discrete joint action space.
///
/// Exploration follows [`crate::config::EpsilonSchedule`] indexed by the number
/// of finished episodes; evaluation always exploits.
pub struct DqnAgent<V: ValueFunction> {
    primary: V,
    target: V,
    replay: ReplayBuffer,
    config: DqnConfig,
    rng: StdRng,
    epsilon: f64,
    episodes: u32,
    optimize_steps: u64,
}

impl DqnAgent<MlpValueFunction> {
    /// Creates an agent backed by two [`MlpValueFunction`]s.
    pub fn new(config: DqnConfig, state_dim: usize, action_dim: usize) -> Result<Self, ConfigError> {
        config.validate()?;
        let make = |seed| {
            MlpValueFunction::new(
                state_dim,
                &config.hidden,
                action_dim,
                config.learning_rate,
                seed,
            )
        };
        let primary = make(config.seed);
        let target = make(config.seed.wrapping_add(1));
        Self::with_networks(primary, target, config)
    }
}

impl<V: ValueFunction> DqnAgent<V> {
    /// Creates an agent from an existing primary/target pair.
    ///
    /// The target is synchronized from the primary before returning.
    pub fn with_networks(primary: V, target: V, config: DqnConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if primary.state_dim() != target.state_dim() || primary.action_dim() != target.action_dim()
        {
            return Err(ConfigError::InvalidParameter {
                name: "target",
                reason: "target network shape differs from primary".into(),
            });
        }
        let rng = StdRng::seed_from_u64(config.seed ^ 0x5eed);
        let replay = ReplayBuffer::new(config.replay_capacity);
        let epsilon = config.epsilon.value(0);
        let mut agent = Self {
            primary,
            target,
            replay,
            config,
            rng,
            epsilon,
            episodes: 0,
            optimize_steps: 0,
        };
        agent.sync_target();
        Ok(agent)
    }

    pub fn state_dim(&self) -> usize {
        self.primary.state_dim()
    }

    pub fn action_dim(&self) -> usize {
        self.primary.action_dim()
    }

    /// Chooses an action.
    ///
    /// With `explore` set, a uniform random action is taken with probability
    /// epsilon; otherwise the primary network's argmax.
    pub fn select_action(&mut self, state: &[f64], explore: bool) -> usize {
        if explore && self.rng.gen::<f64>() < self.epsilon {
            return self.rng.gen_range(0..self.action_dim());
        }
        self.greedy_action(state)
    }

    /// Argmax of the primary network; ties resolve to the lowest index.
    pub fn greedy_action(&self, state: &[f64]) -> usize {
        argmax(&self.primary.predict(&to_f32(state)))
    }

    /// Primary network's action values for a state.
    pub fn q_values(&self, state: &[f64]) -> Vec<f32> {
        self.primary.predict(&to_f32(state))
    }

    /// Target network's action values for a state.
    pub fn target_q_values(&self, state: &[f64]) -> Vec<f32> {
        self.target.predict(&to_f32(state))
    }

    /// Stores a transition built from environment values.
    ///
    /// # Panics
    ///
    /// Panics if `action` is outside the action space; see
    /// [`DqnAgent::observe_and_store`].
    pub fn observe(
        &mut self,
        state: &[f64],
        action: usize,
        reward: f64,
        next_state: &[f64],
        done: bool,
    ) -> Result<(), AgentError> {
        self.observe_and_store(Transition {
            state: to_f32(state),
            action,
            reward: reward as f32,
            next_state: to_f32(next_state),
            done,
        })
    }

    /// Appends a transition to the replay buffer.
    ///
    /// # Errors
    ///
    /// Rejects transitions with non-finite values or a wrong state length, so
    /// they never reach the value function.
    ///
    /// # Panics
    ///
    /// Panics if `transition.action` is outside the action space.
    pub fn observe_and_store(&mut self, transition: Transition) -> Result<(), AgentError> {
        let expected = self.state_dim();
        for s in [&transition.state, &transition.next_state] {
            if s.len() != expected {
                return Err(AgentError::DimensionMismatch {
                    expected,
                    actual: s.len(),
                });
            }
        }
        if !transition.reward.is_finite() {
            return Err(AgentError::NonFinite("reward"));
        }
        if !transition.is_finite() {
            return Err(AgentError::NonFinite("state"));
        }
        assert!(
            transition.action < self.action_dim(),
            "Action index {} out of range for action space of size {}",
            transition.action,
            self.action_dim()
        );
        self.replay.push(transition);
        Ok(())
    }

    /// One TD update on a uniformly sampled batch.
    ///
    /// Targets are `r + gamma * max_a' Q_target(s', a') * (1 - done)`. Returns
    /// `None` without touching any parameter while the buffer holds fewer than
    /// [`DqnConfig::warmup`] transitions.
    pub fn optimize_step(&mut self) -> Option<f32> {
        if self.replay.len() < self.config.warmup() {
            return None;
        }
        let batch = self.replay.sample(self.config.batch_size, &mut self.rng)?;
        let gamma = self.config.gamma as f32;

        let next_states: Vec<&[f32]> = batch.iter().map(|t| t.next_state.as_slice()).collect();
        let next_q = self.target.predict_batch(&next_states);
        let targets: Vec<f32> = batch
            .iter()
            .zip(&next_q)
            .map(|(t, q)| {
                let bootstrap = if t.done {
                    0.0
                } else {
                    q.iter().copied().fold(f32::NEG_INFINITY, f32::max)
                };
                t.reward + gamma * bootstrap
            })
            .collect();
        let states: Vec<&[f32]> = batch.iter().map(|t| t.state.as_slice()).collect();
        let actions: Vec<usize> = batch.iter().map(|t| t.action).collect();

        let loss = self.primary.fit_actions(&states, &actions, &targets);
        self.optimize_steps += 1;
        Some(loss)
    }

    /// Copies the primary parameters into the target network.
    pub fn sync_target(&mut self) {
        self.target.copy_from(&self.primary);
    }

    /// Marks an episode finished and advances the exploration schedule.
    pub fn end_episode(&mut self) {
        self.episodes += 1;
        self.epsilon = self.config.epsilon.value(self.episodes);
    }

    /// Current exploration probability.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn episodes(&self) -> u32 {
        self.episodes
    }

    /// Number of optimization steps actually performed.
    pub fn optimize_steps(&self) -> u64 {
        self.optimize_steps
    }

    pub fn replay(&self) -> &ReplayBuffer {
        &self.replay
    }

    pub fn config(&self) -> &DqnConfig {
        &self.config
    }

    pub fn primary(&self) -> &V {
        &self.primary
    }

    pub fn primary_mut(&mut self) -> &mut V {
        &mut self.primary
    }

    pub fn target(&self) -> &V {
        &self.target
    }

    /// Digest of the primary network's parameters.
    pub fn parameter_checksum(&self) -> f64 {
        self.primary.checksum()
    }
}

fn to_f32(v: &[f64]) -> Vec<f32> {
    v.iter().map(|&x| x as f32).collect()
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        })
        .0
}
