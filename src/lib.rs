//! wildfire_rl - mobile sensor placement for wildfire field estimation.
//!
//! A team of mobile agents (plus optional stationary satellites) samples a
//! bivariate Gaussian temperature field on a grid. After every step the
//! running estimate of the field's mean and covariance is refined from the
//! noisy readings, and a DQN learner is rewarded for driving the estimate
//! toward the truth while paying for movement.
//!
//! # Components
//!
//! - [`field`]: Gaussian algebra, ground-truth [`field::FieldModel`], and the
//!   moment-matching [`field::Estimator`].
//! - [`environment`]: joint [`environment::ActionSpace`] bijection, simulation
//!   state, reward, and the stepping [`environment::WildfireEnv`].
//! - [`agent`]: value functions, replay buffer, and [`agent::DqnAgent`].
//! - [`policy`]: the [`policy::Policy`] trait with random and greedy policies.
//! - [`training`]: the training loop, CSV logs, checkpoints, and metrics.

pub mod agent;
pub mod config;
pub mod environment;
pub mod error;
pub mod field;
pub mod policy;
pub mod training;
pub mod types;

pub use config::{run_name, DqnConfig, EpsilonSchedule, WildfireConfig};
pub use error::{Error, Result};
pub use types::{Displacement, Position};
