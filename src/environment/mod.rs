//! Wildfire sensing environment.
//!
//! The joint action encoding ([`action`]) is independent of how moves are
//! applied; [`env::WildfireEnv`] owns the field, the estimator, and the
//! simulation state.

pub mod action;
pub mod env;
pub mod render;
pub mod reward;
pub mod state;

pub use action::ActionSpace;
pub use env::{StepResult, WildfireEnv};
pub use render::{Frame, FrameRecorder, FrameSink, NoopSink};
pub use reward::{RewardBreakdown, RewardComputer};
pub use state::SimulationState;
