//! Evaluation metrics aggregated over several episodes.

use std::fmt;

use super::log::EpisodeRecord;
use super::trainer::rollout;
use crate::environment::WildfireEnv;
use crate::policy::Policy;

/// Aggregated evaluation metrics over multiple episodes.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationMetrics {
    /// Name of the evaluated policy.
    pub policy: String,
    /// Mean cumulative reward per episode.
    pub mean_reward: f64,
    /// Mean episode length.
    pub mean_steps: f64,
    /// Mean KL divergence of the estimate at episode end.
    pub mean_final_kl: f64,
    /// Lowest final KL divergence over all episodes.
    pub best_final_kl: f64,
    /// Number of episodes evaluated.
    pub n_episodes: usize,
}

impl EvaluationMetrics {
    /// Evaluates a policy over multiple episodes and returns aggregated metrics.
    ///
    /// # Arguments
    ///
    /// * `env` - The environment to evaluate in
    /// * `policy` - The policy to evaluate
    /// * `n_episodes` - Number of episodes to run
    pub fn evaluate(env: &mut WildfireEnv, policy: &mut dyn Policy, n_episodes: usize) -> Self {
        let records: Vec<EpisodeRecord> = (0..n_episodes)
            .map(|i| {
                let mut r = rollout(env, policy);
                r.episode = i as u32;
                r
            })
            .collect();
        Self::from_records(policy.name(), &records)
    }

    /// Aggregates already collected episode records.
    pub fn from_records(policy: &str, records: &[EpisodeRecord]) -> Self {
        let n = records.len();
        let mean = |f: fn(&EpisodeRecord) -> f64| {
            if n == 0 {
                0.0
            } else {
                records.iter().map(f).sum::<f64>() / n as f64
            }
        };
        Self {
            policy: policy.to_string(),
            mean_reward: mean(|r| r.total_reward),
            mean_steps: mean(|r| f64::from(r.steps)),
            mean_final_kl: mean(|r| r.final_kl),
            best_final_kl: records
                .iter()
                .map(|r| r.final_kl)
                .fold(f64::INFINITY, f64::min),
            n_episodes: n,
        }
    }
}

impl fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Evaluation of `{}` ({} episodes):",
            self.policy, self.n_episodes
        )?;
        writeln!(f, "  Mean reward:        {:.3}", self.mean_reward)?;
        writeln!(f, "  Mean steps:         {:.1}", self.mean_steps)?;
        writeln!(f, "  Mean final KL:      {:.4}", self.mean_final_kl)?;
        write!(f, "  Best final KL:      {:.4}", self.best_final_kl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WildfireConfig;
    use crate::policy::RandomPolicy;

    #[test]
    fn random_policy_evaluation() {
        let mut env = WildfireEnv::new(WildfireConfig {
            max_steps: 8,
            ..WildfireConfig::default()
        })
        .unwrap();
        let mut policy = RandomPolicy::new(env.action_dim(), 7);
        let metrics = EvaluationMetrics::evaluate(&mut env, &mut policy, 3);

        assert_eq!(metrics.n_episodes, 3);
        assert_eq!(metrics.policy, "random");
        assert_eq!(metrics.mean_steps, 8.0);
        assert!(metrics.mean_reward.is_finite());
        assert!(metrics.mean_reward < 0.0);
        assert!(metrics.best_final_kl <= metrics.mean_final_kl);
    }

    #[test]
    fn display_names_policy() {
        let metrics = EvaluationMetrics::from_records("random", &[]);
        let s = metrics.to_string();
        assert!(s.contains("`random`"));
        assert!(s.contains("0 episodes"));
    }
}
