//! DQN training loop and greedy evaluation.

use tracing::{debug, info};

use super::log::{EpisodeRecord, TrainingLog};
use crate::agent::{DqnAgent, ValueFunction};
use crate::environment::WildfireEnv;
use crate::error::{AgentError, ConfigError, Result};
use crate::policy::{GreedyPolicy, Policy};

/// Drives a [`DqnAgent`] through training episodes on a [`WildfireEnv`].
///
/// Cadences come from the agent's [`crate::config::DqnConfig`]: one
/// optimization step every `optimize_every` environment steps, a target sync
/// every `target_sync_episodes` episodes, and a progress line every
/// `log_every` episodes.
#[derive(Default)]
pub struct Trainer {
    log: Option<TrainingLog>,
    total_steps: u64,
    last_loss: Option<f32>,
}

impl Trainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes every finished episode to `log`.
    pub fn with_log(log: TrainingLog) -> Self {
        Self {
            log: Some(log),
            ..Self::default()
        }
    }

    /// Runs `agent.config().episodes` training episodes.
    ///
    /// # Returns
    ///
    /// One [`EpisodeRecord`] per episode, in order: the learning curve.
    pub fn train<V: ValueFunction>(
        &mut self,
        env: &mut WildfireEnv,
        agent: &mut DqnAgent<V>,
    ) -> Result<Vec<EpisodeRecord>> {
        check_shapes(env, agent)?;
        let episodes = agent.config().episodes;
        let log_every = agent.config().log_every.max(1);
        let mut records = Vec::with_capacity(episodes as usize);

        for _ in 0..episodes {
            let record = self.train_episode(env, agent)?;
            if let Some(log) = self.log.as_mut() {
                log.record(&record)?;
            }
            records.push(record);

            if agent.episodes() % log_every == 0 {
                let window = &records[records.len().saturating_sub(log_every as usize)..];
                let mean_reward =
                    window.iter().map(|r| r.total_reward).sum::<f64>() / window.len() as f64;
                info!(
                    "[Episode {}/{}] mean_reward={:.3} epsilon={:.3} final_kl={:.4} loss={} replay={}",
                    agent.episodes(),
                    episodes,
                    mean_reward,
                    agent.epsilon(),
                    record.final_kl,
                    self.last_loss
                        .map_or_else(|| "n/a".to_string(), |l| format!("{l:.4}")),
                    agent.replay().len(),
                );
            }
        }

        if let Some(log) = self.log.as_mut() {
            log.flush()?;
        }
        Ok(records)
    }

    /// Runs one exploring episode, storing and learning from every transition.
    pub fn train_episode<V: ValueFunction>(
        &mut self,
        env: &mut WildfireEnv,
        agent: &mut DqnAgent<V>,
    ) -> Result<EpisodeRecord, AgentError> {
        let episode = agent.episodes();
        let epsilon = agent.epsilon();
        let optimize_every = u64::from(agent.config().optimize_every.max(1));
        let sync_every = agent.config().target_sync_episodes.max(1);

        let mut state = env.reset();
        loop {
            let action = agent.select_action(&state, true);
            let result = env.step(action);
            agent.observe(&state, action, result.reward, &result.next_state, result.done)?;

            self.total_steps += 1;
            if self.total_steps % optimize_every == 0 {
                if let Some(loss) = agent.optimize_step() {
                    self.last_loss = Some(loss);
                }
            }

            state = result.next_state;
            if result.done {
                break;
            }
        }

        agent.end_episode();
        if agent.episodes() % sync_every == 0 {
            agent.sync_target();
            debug!(episode = agent.episodes(), "target network synchronized");
        }

        let record = EpisodeRecord {
            episode,
            total_reward: env.cumulative_reward(),
            steps: env.step_count(),
            epsilon,
            final_kl: env.current_kl(),
        };
        debug!("{record}");
        Ok(record)
    }

    /// Runs one greedy episode. Neither the agent nor its replay buffer is
    /// modified.
    pub fn evaluate<V: ValueFunction>(env: &mut WildfireEnv, agent: &DqnAgent<V>) -> EpisodeRecord {
        let mut policy = GreedyPolicy::new(agent);
        let mut record = rollout(env, &mut policy);
        record.episode = agent.episodes();
        record
    }

    /// Total environment steps taken across all training episodes.
    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Loss of the most recent optimization step.
    pub fn last_loss(&self) -> Option<f32> {
        self.last_loss
    }

    pub fn into_log(self) -> Option<TrainingLog> {
        self.log
    }
}

/// Runs one episode under `policy` from a fresh reset.
pub fn rollout(env: &mut WildfireEnv, policy: &mut dyn Policy) -> EpisodeRecord {
    let mut state = env.reset();
    loop {
        let result = env.step(policy.act(&state));
        state = result.next_state;
        if result.done {
            break;
        }
    }
    EpisodeRecord {
        episode: 0,
        total_reward: env.cumulative_reward(),
        steps: env.step_count(),
        epsilon: 0.0,
        final_kl: env.current_kl(),
    }
}

fn check_shapes<V: ValueFunction>(env: &WildfireEnv, agent: &DqnAgent<V>) -> Result<()> {
    if env.state_dim() != agent.state_dim() {
        return Err(AgentError::DimensionMismatch {
            expected: agent.state_dim(),
            actual: env.state_dim(),
        }
        .into());
    }
    if env.action_dim() != agent.action_dim() {
        return Err(ConfigError::InvalidParameter {
            name: "action_dim",
            reason: format!(
                "environment has {} joint actions, agent has {}",
                env.action_dim(),
                agent.action_dim()
            ),
        }
        .into());
    }
    Ok(())
}
