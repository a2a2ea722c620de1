//! Error types for configuration, learning, and persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid startup parameters. Always fatal.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("At least one agent is required")]
    NoAgents,

    #[error("Grid dimensions must be positive, got {width}x{height}")]
    InvalidGrid { width: usize, height: usize },

    #[error("Action range must be odd and at least 1, got {0}")]
    InvalidActionRange(usize),

    #[error("Joint action space ({range}^2)^{agents} exceeds the supported maximum of {max}")]
    ActionSpaceTooLarge {
        range: usize,
        agents: usize,
        max: usize,
    },

    #[error("{units} agents and satellites do not fit in the initial column of height {height}")]
    TemplateDoesNotFit { units: usize, height: usize },

    #[error("Expected {expected} positions, got {actual}")]
    PositionCount { expected: usize, actual: usize },

    #[error("Position ({x}, {y}) lies outside the {width}x{height} grid")]
    PositionOutOfBounds {
        x: i64,
        y: i64,
        width: usize,
        height: usize,
    },

    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Failures raised by the learner.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AgentError {
    #[error("Non-finite value in transition {0}")]
    NonFinite(&'static str),

    #[error("State has dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Failures loading or saving value-function parameters.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed checkpoint {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No checkpoint found at {0}")]
    Missing(PathBuf),

    #[error("Checkpoint was trained for `{found}`, but the current configuration is `{expected}`")]
    ConfigMismatch { expected: String, found: String },

    #[error("Checkpoint shape mismatch: {0}")]
    ShapeMismatch(String),

    #[cfg(feature = "rl-nn")]
    #[error("libtorch error: {0}")]
    Tch(#[from] tch::TchError),
}

/// Failures writing the training log.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Crate-level error aggregating every subsystem.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Log(#[from] LogError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
