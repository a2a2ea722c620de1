//! Value-function learner: networks, replay, and the DQN update rule.
//!
//! The libtorch network backend requires the `rl-nn` feature flag.

pub mod dqn;
pub mod network;
pub mod replay;

#[cfg(feature = "rl-nn")]
pub mod tch_network;

pub use dqn::DqnAgent;
pub use network::{Dense, MlpValueFunction, ValueFunction};
pub use replay::{ReplayBuffer, Transition};

#[cfg(feature = "rl-nn")]
pub use tch_network::TchValueFunction;
