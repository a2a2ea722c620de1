use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wildfire_rl::agent::{DqnAgent, MlpValueFunction};
use wildfire_rl::environment::{Frame, FrameRecorder, FrameSink, WildfireEnv};
use wildfire_rl::policy::{GreedyPolicy, RandomPolicy};
use wildfire_rl::training::{Checkpointer, EvaluationMetrics, Trainer, TrainingLog};
use wildfire_rl::{run_name, DqnConfig, EpsilonSchedule, Position, WildfireConfig};

/// Train a DQN to place wildfire sensors, then simulate the learned policy.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Number of mobile agents.
    #[arg(long = "num_agents", default_value_t = 1)]
    num_agents: usize,

    /// Number of stationary satellites.
    #[arg(long = "num_sats", default_value_t = 0)]
    num_sats: usize,

    /// Side of the square move grid per agent (odd).
    #[arg(long = "action_range", default_value_t = 5)]
    action_range: usize,

    /// Movement cost weight relative to the estimation error.
    #[arg(long = "p_move", default_value_t = 0.05)]
    p_move: f64,

    /// Grid width and height.
    #[arg(long = "env_size", default_value_t = 10)]
    env_size: usize,

    /// Grid width; overrides `--env_size`.
    #[arg(long)]
    width: Option<usize>,

    /// Grid height; overrides `--env_size`.
    #[arg(long)]
    height: Option<usize>,

    /// Scatter agents randomly on every reset.
    #[arg(long = "rand_reset", default_value_t = false)]
    rand_reset: bool,

    /// Number of training episodes.
    #[arg(long = "episode_count", default_value_t = 10_000)]
    episode_count: u32,

    /// Steps per episode.
    #[arg(long = "max_steps", default_value_t = 20)]
    max_steps: u32,

    /// Peak temperature at the fire's center.
    #[arg(long = "max_temp", default_value_t = 400.0)]
    max_temp: f64,

    /// End episodes early once the KL divergence drops below this.
    #[arg(long = "kl_threshold")]
    kl_threshold: Option<f64>,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Replay buffer capacity.
    #[arg(long = "replay_capacity", default_value_t = 10_000)]
    replay_capacity: usize,

    /// Transitions per optimization step.
    #[arg(long = "batch_size", default_value_t = 64)]
    batch_size: usize,

    /// Discount factor.
    #[arg(long, default_value_t = 0.99)]
    gamma: f64,

    /// Adam learning rate.
    #[arg(long = "learning_rate", default_value_t = 1e-3)]
    learning_rate: f64,

    /// Initial exploration probability.
    #[arg(long = "eps_start", default_value_t = 1.0)]
    eps_start: f64,

    /// Exploration floor.
    #[arg(long = "eps_end", default_value_t = 0.01)]
    eps_end: f64,

    /// Per-episode multiplicative exploration decay.
    #[arg(long = "eps_decay", default_value_t = 0.995)]
    eps_decay: f64,

    /// Copy the primary network into the target every this many episodes.
    #[arg(long = "target_sync", default_value_t = 10)]
    target_sync: u32,

    /// Run one optimization step every this many environment steps.
    #[arg(long = "optimize_every", default_value_t = 1)]
    optimize_every: u32,

    /// Emit a progress line every this many episodes.
    #[arg(long = "log_every", default_value_t = 100)]
    log_every: u32,

    /// Directory for per-episode CSV logs.
    #[arg(long = "log_dir", default_value = "results/training_log")]
    log_dir: PathBuf,

    /// Directory for checkpoints.
    #[arg(long = "model_dir", default_value = "models")]
    model_dir: PathBuf,

    /// Directory for the recorded simulation frames.
    #[arg(long = "render_dir", default_value = "renderings")]
    render_dir: PathBuf,

    /// Skip training and simulate an existing checkpoint.
    #[arg(long = "no_train", default_value_t = false)]
    no_train: bool,

    /// Skip the greedy simulation after training.
    #[arg(long = "no_sim", default_value_t = false)]
    no_sim: bool,

    /// Evaluation episodes for the learned and random baselines.
    #[arg(long = "eval_episodes", default_value_t = 20)]
    eval_episodes: usize,

    /// Start the simulation with agents at these positions, given as `x,y`.
    #[arg(long, value_parser = parse_position)]
    reposition: Vec<Position>,
}

fn parse_position(s: &str) -> Result<Position, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got `{s}`"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid coordinate `{v}`: {e}"))
    };
    Ok(Position::new(parse(x)?, parse(y)?))
}

impl Args {
    fn env_config(&self) -> WildfireConfig {
        WildfireConfig {
            width: self.width.unwrap_or(self.env_size),
            height: self.height.unwrap_or(self.env_size),
            n_agents: self.num_agents,
            n_sats: self.num_sats,
            action_range: self.action_range,
            p_move: self.p_move,
            rand_reset: self.rand_reset,
            max_steps: self.max_steps,
            kl_threshold: self.kl_threshold,
            peak: self.max_temp,
            seed: self.seed,
            ..WildfireConfig::default()
        }
    }

    fn dqn_config(&self) -> DqnConfig {
        DqnConfig {
            gamma: self.gamma,
            learning_rate: self.learning_rate,
            batch_size: self.batch_size,
            replay_capacity: self.replay_capacity,
            epsilon: EpsilonSchedule::new(self.eps_start, self.eps_end, self.eps_decay),
            target_sync_episodes: self.target_sync,
            optimize_every: self.optimize_every,
            episodes: self.episode_count,
            log_every: self.log_every,
            seed: self.seed,
            ..DqnConfig::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let env_config = args.env_config();
    let dqn_config = args.dqn_config();
    let name = run_name(&env_config, &dqn_config);

    info!("Number of agents: {}", env_config.n_agents);
    info!("Number of satellites: {}", env_config.n_sats);
    info!("Action range: {}", env_config.action_range);
    info!("Movement cost: {}", env_config.p_move);
    info!("Environment size: {}x{}", env_config.width, env_config.height);
    info!("Randomly reset agent positions: {}", env_config.rand_reset);
    info!("Number of episodes to train for: {}", dqn_config.episodes);

    let mut env = WildfireEnv::new(env_config).context("invalid environment configuration")?;
    let mut agent = DqnAgent::new(dqn_config, env.state_dim(), env.action_dim())
        .context("invalid learner configuration")?;
    let checkpointer = Checkpointer::new(&args.model_dir);

    if !args.no_train {
        fs::create_dir_all(&args.log_dir)
            .with_context(|| format!("creating {}", args.log_dir.display()))?;
        let log_path = args.log_dir.join(format!("{name}.csv"));
        let mut trainer = Trainer::with_log(TrainingLog::create(&log_path)?);
        let records = trainer.train(&mut env, &mut agent)?;
        info!(
            episodes = records.len(),
            steps = trainer.total_steps(),
            log = %log_path.display(),
            "training finished"
        );
        checkpointer.save(&agent, env.config(), &name)?;
    }

    if args.no_sim {
        return Ok(());
    }

    // Simulate from the persisted parameters.
    checkpointer
        .load(&mut agent, env.config(), &name)
        .with_context(|| format!("loading checkpoint for `{name}`"))?;

    let learned =
        EvaluationMetrics::evaluate(&mut env, &mut GreedyPolicy::new(&agent), args.eval_episodes);
    let mut random = RandomPolicy::new(env.action_dim(), args.seed);
    let baseline = EvaluationMetrics::evaluate(&mut env, &mut random, args.eval_episodes);
    info!("\n{learned}");
    info!("\n{baseline}");

    simulate(&mut env, &agent, &args.reposition, &args.render_dir, &name)
}

fn simulate(
    env: &mut WildfireEnv,
    agent: &DqnAgent<MlpValueFunction>,
    start: &[Position],
    render_dir: &Path,
    name: &str,
) -> Result<()> {
    let recorder = Rc::new(RefCell::new(FrameRecorder::new()));
    let sink = Rc::clone(&recorder);
    env.set_frame_sink(Box::new(move |frame: &Frame| sink.borrow_mut().emit(frame)));

    env.reset();
    if !start.is_empty() {
        env.reposition(start).context("invalid --reposition")?;
    }
    while !env.is_done() {
        info!("Simulation step: {}", env.step_count());
        info!("\n{}", env.state());
        let action = agent.greedy_action(&env.flatten_state());
        env.step(action);
    }
    info!("\n{}", env.state());
    info!(
        reward = env.cumulative_reward(),
        final_kl = env.current_kl(),
        "simulation finished"
    );
    env.take_frame_sink();

    fs::create_dir_all(render_dir).with_context(|| format!("creating {}", render_dir.display()))?;
    let frames_path = render_dir.join(format!("{name}.frames.json"));
    let json = recorder.borrow().to_json()?;
    fs::write(&frames_path, json).with_context(|| format!("writing {}", frames_path.display()))?;
    let kl_path = render_dir.join(format!("KL_{name}.json"));
    fs::write(&kl_path, serde_json::to_string(env.kl_history())?)
        .with_context(|| format!("writing {}", kl_path.display()))?;
    info!(frames = %frames_path.display(), kl = %kl_path.display(), "wrote simulation record");
    Ok(())
}
