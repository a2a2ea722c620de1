//! Wildfire estimation environment.
//!
//! One step runs: decode -> move -> read -> estimate -> reward -> advance.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::action::ActionSpace;
use super::render::{Frame, FrameSink};
use super::reward::{RewardBreakdown, RewardComputer};
use super::state::SimulationState;
use crate::config::WildfireConfig;
use crate::error::ConfigError;
use crate::field::{Estimator, FieldModel, FieldParameters};
use crate::types::{Displacement, Position};

/// Result of a single environment step.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Flattened state after the step.
    pub next_state: Vec<f64>,
    /// Step reward.
    pub reward: f64,
    /// Whether the episode is done.
    pub done: bool,
    /// Step count after this step.
    pub step: u32,
    /// KL divergence of the new estimate from the truth.
    pub kl: f64,
    /// Total length of the applied moves.
    pub movement: f64,
    /// Number of agents whose move was rejected at the boundary.
    pub rejected_moves: usize,
}

/// Mobile sensors estimating a static Gaussian temperature field.
///
/// Boundary policy is reject-and-stay: an agent whose move would leave the
/// grid keeps its position and is charged no movement for that step.
/// Satellites never move but report a reading every step.
///
/// # Lifecycle
///
/// 1. Call [`WildfireEnv::new`] with a validated configuration.
/// 2. Call [`WildfireEnv::reset`] to start an episode.
/// 3. Call [`WildfireEnv::step`] with joint actions until `done`.
pub struct WildfireEnv {
    config: WildfireConfig,
    field: FieldModel,
    estimator: Estimator,
    actions: ActionSpace,
    state: SimulationState,
    step_count: u32,
    done: bool,
    cumulative_reward: f64,
    kl_history: Vec<f64>,
    rng: StdRng,
    sink: Option<Box<dyn FrameSink>>,
}

impl std::fmt::Debug for WildfireEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WildfireEnv")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("step_count", &self.step_count)
            .field("done", &self.done)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl WildfireEnv {
    /// Creates an environment in its initial (reset) state.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found by [`WildfireConfig::validate`].
    pub fn new(config: WildfireConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let actions = ActionSpace::new(config.action_range, config.n_agents)?;
        let field = FieldModel::new(config.true_field(), config.peak);
        let estimator = Estimator::new(config.peak, config.prior_weight, config.min_variance);
        let state = Self::template(&config);
        let rng = StdRng::seed_from_u64(config.seed);
        let mut env = Self {
            config,
            field,
            estimator,
            actions,
            state,
            step_count: 0,
            done: false,
            cumulative_reward: 0.0,
            kl_history: Vec::new(),
            rng,
            sink: None,
        };
        env.reset();
        Ok(env)
    }

    fn template(config: &WildfireConfig) -> SimulationState {
        let mut positions = config.initial_positions();
        let satellites = positions.split_off(config.n_agents);
        SimulationState::new(positions, satellites, config.prior())
    }

    /// Installs a frame sink that receives a [`Frame`] after every step.
    pub fn set_frame_sink(&mut self, sink: Box<dyn FrameSink>) {
        self.sink = Some(sink);
    }

    /// Removes and returns the installed frame sink.
    pub fn take_frame_sink(&mut self) -> Option<Box<dyn FrameSink>> {
        self.sink.take()
    }

    /// Starts a new episode and returns the flattened initial state.
    ///
    /// Units return to the template positions, or agents are scattered
    /// uniformly when `rand_reset` is set. The estimate returns to the prior.
    pub fn reset(&mut self) -> Vec<f64> {
        self.state = Self::template(&self.config);
        if self.config.rand_reset {
            let (w, h) = (self.config.width, self.config.height);
            for p in &mut self.state.agents {
                *p = Position::new(self.rng.gen_range(0..w), self.rng.gen_range(0..h));
            }
        }
        self.estimator.reset();
        self.step_count = 0;
        self.done = false;
        self.cumulative_reward = 0.0;
        self.kl_history.clear();
        self.flatten_state()
    }

    /// Places agents at explicit positions without touching the estimate.
    pub fn reposition(&mut self, agents: &[Position]) -> Result<(), ConfigError> {
        if agents.len() != self.config.n_agents {
            return Err(ConfigError::PositionCount {
                expected: self.config.n_agents,
                actual: agents.len(),
            });
        }
        let (w, h) = (self.config.width, self.config.height);
        if let Some(p) = agents.iter().find(|p| !p.in_bounds(w, h)) {
            return Err(ConfigError::PositionOutOfBounds {
                x: p.x as i64,
                y: p.y as i64,
                width: w,
                height: h,
            });
        }
        self.state.agents = agents.to_vec();
        Ok(())
    }

    /// Executes one step with a joint action.
    ///
    /// # Panics
    ///
    /// Panics if `action` is outside the action space, or if called after the
    /// episode is done.
    pub fn step(&mut self, action: usize) -> StepResult {
        assert!(!self.done, "step() called on a finished episode; call reset()");
        let moves = self.actions.decode(action);
        let (applied, rejected) = self.apply_moves(&moves);

        let (readings, positions) = self.read_sensors();
        let estimate = self
            .estimator
            .update(&readings, &positions, &self.state.estimate);
        self.state.estimate = estimate;

        let RewardBreakdown {
            kl,
            movement,
            reward,
        } = RewardComputer::compute(
            self.field.params(),
            &self.state.estimate,
            &applied,
            self.config.p_move,
        );
        self.cumulative_reward += reward;
        self.kl_history.push(kl);

        self.step_count += 1;
        let converged = self.config.kl_threshold.is_some_and(|t| kl < t);
        self.done = self.step_count >= self.config.max_steps || converged;

        debug!(
            step = self.step_count,
            action, reward, kl, movement, rejected, "environment step"
        );
        self.emit_frame(kl, reward);

        StepResult {
            next_state: self.flatten_state(),
            reward,
            done: self.done,
            step: self.step_count,
            kl,
            movement,
            rejected_moves: rejected,
        }
    }

    fn apply_moves(&mut self, moves: &[Displacement]) -> (Vec<Displacement>, usize) {
        let (w, h) = (self.config.width, self.config.height);
        let mut rejected = 0;
        let applied = self
            .state
            .agents
            .iter_mut()
            .zip(moves)
            .map(|(pos, &d)| match pos.offset(d, w, h) {
                Some(next) => {
                    *pos = next;
                    d
                }
                None => {
                    rejected += 1;
                    Displacement::zero()
                }
            })
            .collect();
        (applied, rejected)
    }

    fn read_sensors(&mut self) -> (Vec<f64>, Vec<Position>) {
        let mut readings = Vec::with_capacity(self.config.n_units());
        let mut positions = Vec::with_capacity(self.config.n_units());
        for &p in &self.state.agents {
            readings.push(self.field.sample(p, self.config.agent_noise_std, &mut self.rng));
            positions.push(p);
        }
        for &p in &self.state.satellites {
            readings.push(
                self.field
                    .sample(p, self.config.satellite_noise_std, &mut self.rng),
            );
            positions.push(p);
        }
        (readings, positions)
    }

    fn emit_frame(&mut self, kl: f64, reward: f64) {
        if let Some(sink) = self.sink.as_mut() {
            let frame = Frame {
                step: self.step_count,
                agents: self.state.agents.clone(),
                satellites: self.state.satellites.clone(),
                estimate: self.state.estimate,
                truth: *self.field.params(),
                kl,
                reward,
            };
            sink.emit(&frame);
        }
    }

    /// Flattened current state (see [`SimulationState::flatten`]).
    pub fn flatten_state(&self) -> Vec<f64> {
        self.state.flatten()
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn config(&self) -> &WildfireConfig {
        &self.config
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.actions
    }

    pub fn field(&self) -> &FieldModel {
        &self.field
    }

    pub fn truth(&self) -> &FieldParameters {
        self.field.params()
    }

    pub fn state_dim(&self) -> usize {
        self.config.state_dim()
    }

    pub fn action_dim(&self) -> usize {
        self.actions.size()
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Sum of rewards since the last reset.
    pub fn cumulative_reward(&self) -> f64 {
        self.cumulative_reward
    }

    /// KL divergence after each step of the current episode.
    pub fn kl_history(&self) -> &[f64] {
        &self.kl_history
    }

    /// KL divergence of the current estimate.
    pub fn current_kl(&self) -> f64 {
        RewardComputer::estimation_error(self.field.params(), &self.state.estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::render::FrameRecorder;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn make_env(max_steps: u32) -> WildfireEnv {
        WildfireEnv::new(WildfireConfig {
            max_steps,
            ..WildfireConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn new_env_starts_reset() {
        let env = make_env(5);
        assert!(!env.is_done());
        assert_eq!(env.step_count(), 0);
        assert_eq!(env.state().agents, vec![Position::new(0, 0)]);
        assert_eq!(env.state().estimate, env.config().default_prior());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = WildfireEnv::new(WildfireConfig {
            n_agents: 0,
            ..WildfireConfig::default()
        })
        .unwrap_err();
        assert_eq!(err, ConfigError::NoAgents);
    }

    #[test]
    fn step_moves_agent() {
        let mut env = make_env(5);
        let a = env.action_space().encode(&[Displacement::new(2, 1)]);
        let r = env.step(a);
        assert_eq!(env.state().agents[0], Position::new(2, 1));
        assert_eq!(r.rejected_moves, 0);
        assert!((r.movement - 5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn move_off_grid_is_rejected() {
        let mut env = make_env(5);
        let a = env.action_space().encode(&[Displacement::new(-1, 0)]);
        let r = env.step(a);
        assert_eq!(env.state().agents[0], Position::new(0, 0));
        assert_eq!(r.rejected_moves, 1);
        assert_eq!(r.movement, 0.0);
    }

    #[test]
    fn episode_terminates_at_max_steps() {
        let mut env = make_env(4);
        let stay = env.action_space().stay();
        for t in 0..4 {
            let r = env.step(stay);
            assert_eq!(r.done, t == 3);
        }
        assert_eq!(env.step_count(), 4);
        assert_eq!(env.kl_history().len(), 4);
    }

    #[test]
    fn kl_threshold_stops_early() {
        let mut env = WildfireEnv::new(WildfireConfig {
            max_steps: 100,
            kl_threshold: Some(f64::MAX),
            ..WildfireConfig::default()
        })
        .unwrap();
        let r = env.step(env.action_space().stay());
        assert!(r.done);
        assert_eq!(r.step, 1);
    }

    #[test]
    #[should_panic(expected = "finished episode")]
    fn step_after_done_panics() {
        let mut env = make_env(1);
        let stay = env.action_space().stay();
        env.step(stay);
        env.step(stay);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_action_panics() {
        let mut env = make_env(5);
        env.step(25);
    }

    #[test]
    fn reset_clears_episode() {
        let mut env = make_env(3);
        let a = env.action_space().encode(&[Displacement::new(1, 1)]);
        env.step(a);
        env.step(a);
        let s = env.reset();
        assert_eq!(env.step_count(), 0);
        assert!(!env.is_done());
        assert_eq!(env.cumulative_reward(), 0.0);
        assert!(env.kl_history().is_empty());
        assert_eq!(s, WildfireEnv::template(env.config()).flatten());
    }

    #[test]
    fn random_reset_stays_in_bounds() {
        let mut env = WildfireEnv::new(WildfireConfig {
            rand_reset: true,
            n_agents: 2,
            action_range: 3,
            ..WildfireConfig::default()
        })
        .unwrap();
        for _ in 0..50 {
            env.reset();
            assert!(env.state().agents.iter().all(|p| p.in_bounds(10, 10)));
        }
    }

    #[test]
    fn satellites_never_move() {
        let mut env = WildfireEnv::new(WildfireConfig {
            n_agents: 1,
            n_sats: 2,
            ..WildfireConfig::default()
        })
        .unwrap();
        let before = env.state().satellites.clone();
        let a = env.action_space().encode(&[Displacement::new(2, 2)]);
        env.step(a);
        assert_eq!(env.state().satellites, before);
        assert_eq!(env.flatten_state().len(), 12);
    }

    #[test]
    fn reposition_validates_input() {
        let mut env = make_env(5);
        assert!(env.reposition(&[Position::new(3, 3)]).is_ok());
        assert_eq!(env.state().agents[0], Position::new(3, 3));
        assert!(matches!(
            env.reposition(&[Position::new(10, 0)]),
            Err(ConfigError::PositionOutOfBounds { .. })
        ));
        assert!(matches!(
            env.reposition(&[]),
            Err(ConfigError::PositionCount { .. })
        ));
    }

    #[test]
    fn frames_are_emitted_each_step() {
        struct Shared(Rc<RefCell<FrameRecorder>>);
        impl FrameSink for Shared {
            fn emit(&mut self, frame: &Frame) {
                self.0.borrow_mut().emit(frame);
            }
        }

        let rec = Rc::new(RefCell::new(FrameRecorder::new()));
        let mut env = make_env(3);
        env.set_frame_sink(Box::new(Shared(rec.clone())));
        let stay = env.action_space().stay();
        while !env.is_done() {
            env.step(stay);
        }
        let rec = rec.borrow();
        assert_eq!(rec.len(), 3);
        assert_eq!(rec.frames.last().map(|f| f.step), Some(3));
    }

    #[test]
    fn rewards_are_finite() {
        let mut env = make_env(20);
        let n = env.action_dim();
        let mut a = 0;
        while !env.is_done() {
            let r = env.step(a % n);
            assert!(r.reward.is_finite());
            a += 7;
        }
    }
}
