//! Configuration for the wildfire environment and the DQN learner.

use serde::{Deserialize, Serialize};

use crate::environment::action::ActionSpace;
use crate::error::ConfigError;
use crate::field::{Covariance, FieldParameters};
use crate::types::Position;

/// Configuration for the wildfire estimation environment.
///
/// Controls grid geometry, the agent/satellite roster, movement,
/// the ground-truth field, the estimator, and reward shaping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WildfireConfig {
    // --- Grid ---
    /// Number of cells along x.
    pub width: usize,
    /// Number of cells along y.
    pub height: usize,

    // --- Roster ---
    /// Number of mobile agents controlled by the learner.
    pub n_agents: usize,
    /// Number of stationary satellites.
    pub n_sats: usize,

    // --- Movement ---
    /// Side length of each agent's square move neighborhood (odd).
    pub action_range: usize,
    /// Weight of the movement penalty relative to the estimation error.
    pub p_move: f64,
    /// Draw uniform agent positions on every reset.
    pub rand_reset: bool,

    // --- Episode ---
    /// Steps per episode.
    pub max_steps: u32,
    /// Stop early once the KL divergence falls below this value.
    pub kl_threshold: Option<f64>,

    // --- Field ---
    /// Temperature at the center of the fire.
    pub peak: f64,
    /// Ground-truth field shape. `None` uses [`WildfireConfig::default_true_field`].
    pub true_field: Option<FieldParameters>,
    /// Std-dev of agent reading noise.
    pub agent_noise_std: f64,
    /// Std-dev of satellite reading noise.
    pub satellite_noise_std: f64,

    // --- Estimator ---
    /// Estimate after reset. `None` uses [`WildfireConfig::default_prior`].
    pub prior: Option<FieldParameters>,
    /// Pseudo-count of the prior in the moment pool.
    pub prior_weight: f64,
    /// Eigenvalue floor for estimated covariances.
    pub min_variance: f64,

    /// RNG seed for readings and random resets.
    pub seed: u64,
}

impl WildfireConfig {
    /// Total number of tracked units (agents then satellites).
    pub fn n_units(&self) -> usize {
        self.n_agents + self.n_sats
    }

    /// Rows of the flattened state: one per unit, one for mu, two for Sigma.
    pub fn state_rows(&self) -> usize {
        self.n_units() + 3
    }

    /// Length of the flattened state vector.
    pub fn state_dim(&self) -> usize {
        2 * self.state_rows()
    }

    /// Size of the joint action space, `(range^2)^n_agents`.
    pub fn action_dim(&self) -> usize {
        ActionSpace::size_for(self.action_range, self.n_agents).unwrap_or(0)
    }

    /// Unit `i` starts at `(0, i)`.
    pub fn initial_positions(&self) -> Vec<Position> {
        (0..self.n_units()).map(|i| Position::new(0, i)).collect()
    }

    /// Fire centered toward the far corner with a mild positive correlation.
    pub fn default_true_field(&self) -> FieldParameters {
        let (w, h) = (self.width as f64, self.height as f64);
        let corr = 0.1 * (w * h).sqrt();
        FieldParameters::new(
            [0.7 * (w - 1.0), 0.6 * (h - 1.0)],
            Covariance::new(0.4 * w, corr, 0.4 * h),
        )
    }

    /// Estimate at the grid origin spread over half the grid.
    pub fn default_prior(&self) -> FieldParameters {
        FieldParameters::new(
            [1.0, 1.0],
            Covariance::diagonal(self.width as f64 / 2.0, self.height as f64 / 2.0),
        )
    }

    pub fn true_field(&self) -> FieldParameters {
        self.true_field.unwrap_or_else(|| self.default_true_field())
    }

    pub fn prior(&self) -> FieldParameters {
        self.prior.unwrap_or_else(|| self.default_prior())
    }

    /// Checks every parameter; any failure is fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_agents == 0 {
            return Err(ConfigError::NoAgents);
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidGrid {
                width: self.width,
                height: self.height,
            });
        }
        if self.action_range == 0 || self.action_range % 2 == 0 {
            return Err(ConfigError::InvalidActionRange(self.action_range));
        }
        if ActionSpace::size_for(self.action_range, self.n_agents).is_none() {
            return Err(ConfigError::ActionSpaceTooLarge {
                range: self.action_range,
                agents: self.n_agents,
                max: ActionSpace::MAX_ACTIONS,
            });
        }
        if self.n_units() > self.height {
            return Err(ConfigError::TemplateDoesNotFit {
                units: self.n_units(),
                height: self.height,
            });
        }
        if self.max_steps == 0 {
            return Err(invalid("max_steps", "must be at least 1"));
        }
        non_negative("p_move", self.p_move)?;
        non_negative("agent_noise_std", self.agent_noise_std)?;
        non_negative("satellite_noise_std", self.satellite_noise_std)?;
        positive("peak", self.peak)?;
        positive("prior_weight", self.prior_weight)?;
        positive("min_variance", self.min_variance)?;
        if let Some(t) = self.kl_threshold {
            non_negative("kl_threshold", t)?;
        }
        gaussian("true_field", &self.true_field())?;
        gaussian("prior", &self.prior())?;
        Ok(())
    }
}

impl Default for WildfireConfig {
    fn default() -> Self {
        Self {
            width: 10,
            height: 10,
            n_agents: 1,
            n_sats: 0,
            action_range: 5,
            p_move: 0.05,
            rand_reset: false,
            max_steps: 20,
            kl_threshold: None,
            peak: 400.0,
            true_field: None,
            agent_noise_std: 5.0,
            satellite_noise_std: 20.0,
            prior: None,
            prior_weight: 1.0,
            min_variance: 0.25,
            seed: 42,
        }
    }
}

/// Exponentially decaying exploration probability with a floor.
///
/// `epsilon(e) = max(end, start * decay^e)` for episode `e`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpsilonSchedule {
    pub start: f64,
    pub end: f64,
    pub decay: f64,
}

impl EpsilonSchedule {
    pub fn new(start: f64, end: f64, decay: f64) -> Self {
        Self { start, end, decay }
    }

    /// Exploration probability for the given episode index.
    pub fn value(&self, episode: u32) -> f64 {
        (self.start * self.decay.powf(f64::from(episode))).max(self.end)
    }

    /// Always-greedy schedule.
    pub fn greedy() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }
}

impl Default for EpsilonSchedule {
    fn default() -> Self {
        Self::new(1.0, 0.01, 0.995)
    }
}

/// Hyperparameters for the DQN learner and its training loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DqnConfig {
    /// Discount factor.
    pub gamma: f64,
    /// Adam learning rate.
    pub learning_rate: f64,
    /// Transitions per optimization step.
    pub batch_size: usize,
    /// Replay buffer capacity (FIFO eviction beyond this).
    pub replay_capacity: usize,
    /// Minimum buffer length before optimizing; the effective warm-up is
    /// `max(batch_size, min_replay)`.
    pub min_replay: usize,
    /// Hidden layer widths of the value network.
    pub hidden: Vec<usize>,
    /// Exploration schedule.
    pub epsilon: EpsilonSchedule,
    /// Copy primary into target every this many episodes.
    pub target_sync_episodes: u32,
    /// Run one optimization step every this many environment steps.
    pub optimize_every: u32,
    /// Number of training episodes.
    pub episodes: u32,
    /// Emit a progress log line every this many episodes.
    pub log_every: u32,
    /// Seed for weight init, exploration, and replay sampling.
    pub seed: u64,
}

impl DqnConfig {
    /// Buffer length at which optimization starts.
    pub fn warmup(&self) -> usize {
        self.batch_size.max(self.min_replay)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(invalid("gamma", "must lie in [0, 1]"));
        }
        positive("learning_rate", self.learning_rate)?;
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.replay_capacity < self.warmup() {
            return Err(invalid(
                "replay_capacity",
                "must be at least max(batch_size, min_replay)",
            ));
        }
        if self.hidden.iter().any(|&h| h == 0) {
            return Err(invalid("hidden", "layer widths must be positive"));
        }
        let eps = self.epsilon;
        if !(0.0..=1.0).contains(&eps.start) || !(0.0..=1.0).contains(&eps.end) {
            return Err(invalid("epsilon", "start and end must lie in [0, 1]"));
        }
        if eps.end > eps.start {
            return Err(invalid("epsilon", "end must not exceed start"));
        }
        if !(eps.decay > 0.0 && eps.decay <= 1.0) {
            return Err(invalid("epsilon", "decay must lie in (0, 1]"));
        }
        if self.target_sync_episodes == 0 {
            return Err(invalid("target_sync_episodes", "must be at least 1"));
        }
        if self.optimize_every == 0 {
            return Err(invalid("optimize_every", "must be at least 1"));
        }
        Ok(())
    }
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            learning_rate: 1e-3,
            batch_size: 64,
            replay_capacity: 10_000,
            min_replay: 0,
            hidden: vec![64, 64],
            epsilon: EpsilonSchedule::default(),
            target_sync_episodes: 10,
            optimize_every: 1,
            episodes: 10_000,
            log_every: 100,
            seed: 0,
        }
    }
}

/// Deterministic name for a run, used for logs and checkpoints.
///
/// `N_agents_{n}_p_move_{p}_rand_reset_{b}_episode_count_{e}_env_size_{w}_action_range_{r}`,
/// with `x{h}` appended to the env size for non-square grids and `_N_sats_{k}`
/// after the agent count when there are satellites.
pub fn run_name(env: &WildfireConfig, train: &DqnConfig) -> String {
    let size = if env.width == env.height {
        env.width.to_string()
    } else {
        format!("{}x{}", env.width, env.height)
    };
    let sats = if env.n_sats > 0 {
        format!("_N_sats_{}", env.n_sats)
    } else {
        String::new()
    };
    format!(
        "N_agents_{}{}_p_move_{}_rand_reset_{}_episode_count_{}_env_size_{}_action_range_{}",
        env.n_agents, sats, env.p_move, env.rand_reset, train.episodes, size, env.action_range
    )
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.to_string(),
    }
}

fn positive(name: &'static str, v: f64) -> Result<(), ConfigError> {
    if v > 0.0 && v.is_finite() {
        Ok(())
    } else {
        Err(invalid(name, &format!("must be positive and finite, got {v}")))
    }
}

fn non_negative(name: &'static str, v: f64) -> Result<(), ConfigError> {
    if v >= 0.0 && v.is_finite() {
        Ok(())
    } else {
        Err(invalid(name, &format!("must be non-negative and finite, got {v}")))
    }
}

fn gaussian(name: &'static str, p: &FieldParameters) -> Result<(), ConfigError> {
    if !p.is_finite() {
        return Err(invalid(name, "contains non-finite values"));
    }
    if !p.cov.is_positive_definite() {
        return Err(invalid(name, "covariance must be positive definite"));
    }
    Ok(())
}
