//! Training infrastructure: the DQN loop, per-episode logs, checkpoints,
//! and evaluation metrics.

pub mod checkpoint;
pub mod log;
pub mod metrics;
pub mod trainer;

pub use checkpoint::{CheckpointMeta, Checkpointer};
pub use log::{EpisodeRecord, TrainingLog};
pub use metrics::EvaluationMetrics;
pub use trainer::{rollout, Trainer};
