//! Value-function checkpoints keyed by run name.
//!
//! A checkpoint is two files in one directory:
//!
//! - `{run}.meta.json`: the run name, the full environment configuration,
//!   and the network shape it was trained with.
//! - `{run}.weights`: backend-specific parameters.
//!
//! Loading verifies the metadata against the current configuration before
//! touching any parameter, so a mismatched run fails loudly instead of
//! silently evaluating a freshly initialized network.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agent::{DqnAgent, ValueFunction};
use crate::config::WildfireConfig;
use crate::error::CheckpointError;

/// Sidecar metadata written next to the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub run_name: String,
    pub state_dim: usize,
    pub action_dim: usize,
    pub hidden: Vec<usize>,
    /// Training episodes completed when the checkpoint was written.
    pub episodes: u32,
    /// Environment the network was trained in.
    pub env: WildfireConfig,
}

/// Saves and restores [`DqnAgent`] parameters under a directory.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    dir: PathBuf,
}

impl Checkpointer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta_path(&self, run_name: &str) -> PathBuf {
        self.dir.join(format!("{run_name}.meta.json"))
    }

    pub fn weights_path(&self, run_name: &str) -> PathBuf {
        self.dir.join(format!("{run_name}.weights"))
    }

    /// Whether a checkpoint for `run_name` exists.
    pub fn exists(&self, run_name: &str) -> bool {
        self.meta_path(run_name).exists() && self.weights_path(run_name).exists()
    }

    /// Writes the agent's primary network and its metadata.
    pub fn save<V: ValueFunction>(
        &self,
        agent: &DqnAgent<V>,
        env: &WildfireConfig,
        run_name: &str,
    ) -> Result<PathBuf, CheckpointError> {
        fs::create_dir_all(&self.dir).map_err(|source| CheckpointError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let meta = CheckpointMeta {
            run_name: run_name.to_string(),
            state_dim: agent.state_dim(),
            action_dim: agent.action_dim(),
            hidden: agent.config().hidden.clone(),
            episodes: agent.episodes(),
            env: env.clone(),
        };
        let meta_path = self.meta_path(run_name);
        let json = serde_json::to_string_pretty(&meta).map_err(|source| CheckpointError::Parse {
            path: meta_path.clone(),
            source,
        })?;
        fs::write(&meta_path, json).map_err(|source| CheckpointError::Io {
            path: meta_path.clone(),
            source,
        })?;

        let weights_path = self.weights_path(run_name);
        agent.primary().save_weights(&weights_path)?;
        info!(path = %weights_path.display(), "saved checkpoint");
        Ok(weights_path)
    }

    /// Reads the metadata for `run_name`.
    pub fn read_meta(&self, run_name: &str) -> Result<CheckpointMeta, CheckpointError> {
        let path = self.meta_path(run_name);
        if !path.exists() {
            return Err(CheckpointError::Missing(path));
        }
        let text = fs::read_to_string(&path).map_err(|source| CheckpointError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| CheckpointError::Parse { path, source })
    }

    /// Restores the agent's primary network from `run_name` and syncs the
    /// target from it.
    ///
    /// # Errors
    ///
    /// - [`CheckpointError::Missing`] if either file is absent.
    /// - [`CheckpointError::ConfigMismatch`] if the stored run name or any
    ///   field of the stored environment configuration differs from `env`.
    /// - [`CheckpointError::ShapeMismatch`] if the network shape differs.
    pub fn load<V: ValueFunction>(
        &self,
        agent: &mut DqnAgent<V>,
        env: &WildfireConfig,
        run_name: &str,
    ) -> Result<CheckpointMeta, CheckpointError> {
        let meta = self.read_meta(run_name)?;
        if meta.run_name != run_name {
            return Err(CheckpointError::ConfigMismatch {
                expected: run_name.to_string(),
                found: meta.run_name,
            });
        }
        let meta_path = self.meta_path(run_name);
        if let Some((expected, found)) = config_difference(env, &meta.env, &meta_path)? {
            return Err(CheckpointError::ConfigMismatch { expected, found });
        }
        if meta.state_dim != agent.state_dim() || meta.action_dim != agent.action_dim() {
            return Err(CheckpointError::ShapeMismatch(format!(
                "checkpoint maps {} -> {}, agent maps {} -> {}",
                meta.state_dim,
                meta.action_dim,
                agent.state_dim(),
                agent.action_dim()
            )));
        }
        if meta.hidden != agent.config().hidden {
            return Err(CheckpointError::ShapeMismatch(format!(
                "checkpoint hidden layers {:?}, agent hidden layers {:?}",
                meta.hidden,
                agent.config().hidden
            )));
        }

        let weights_path = self.weights_path(run_name);
        agent.primary_mut().load_weights(&weights_path)?;
        agent.sync_target();
        info!(path = %weights_path.display(), episodes = meta.episodes, "loaded checkpoint");
        Ok(meta)
    }
}

/// First field (in key order) where `current` and `stored` disagree, rendered
/// as `name=value` for each side.
///
/// `current` goes through the same JSON text round trip `stored` went
/// through, so equal floats compare equal.
fn config_difference(
    current: &WildfireConfig,
    stored: &WildfireConfig,
    path: &Path,
) -> Result<Option<(String, String)>, CheckpointError> {
    let parse_error = |source| CheckpointError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let current: serde_json::Value = serde_json::to_string(current)
        .and_then(|text| serde_json::from_str(&text))
        .map_err(parse_error)?;
    let stored = serde_json::to_value(stored).map_err(parse_error)?;

    let (Some(current), Some(stored)) = (current.as_object(), stored.as_object()) else {
        return Ok((current != stored).then(|| (current.to_string(), stored.to_string())));
    };
    let null = serde_json::Value::Null;
    let keys = current.keys().chain(stored.keys().filter(|k| !current.contains_key(*k)));
    for key in keys {
        let (c, s) = (
            current.get(key).unwrap_or(&null),
            stored.get(key).unwrap_or(&null),
        );
        if c != s {
            return Ok(Some((format!("{key}={c}"), format!("{key}={s}"))));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MlpValueFunction;
    use crate::config::DqnConfig;

    fn env() -> WildfireConfig {
        WildfireConfig::default()
    }

    fn agent(seed: u64, action_dim: usize) -> DqnAgent<MlpValueFunction> {
        DqnAgent::new(
            DqnConfig {
                hidden: vec![8],
                seed,
                ..DqnConfig::default()
            },
            4,
            action_dim,
        )
        .unwrap()
    }

    #[test]
    fn save_then_load_restores_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path());
        let trained = agent(1, 9);
        ckpt.save(&trained, &env(), "run").unwrap();
        assert!(ckpt.exists("run"));

        let mut fresh = agent(2, 9);
        let s = [0.1, 0.2, 0.3, 0.4];
        assert_ne!(fresh.q_values(&s), trained.q_values(&s));
        let meta = ckpt.load(&mut fresh, &env(), "run").unwrap();
        assert_eq!(meta.state_dim, 4);
        assert_eq!(fresh.q_values(&s), trained.q_values(&s));
        assert_eq!(fresh.target_q_values(&s), trained.q_values(&s));
    }

    #[test]
    fn missing_checkpoint_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = agent(0, 9);
        assert!(matches!(
            Checkpointer::new(dir.path()).load(&mut a, &env(), "nothing"),
            Err(CheckpointError::Missing(_))
        ));
    }

    #[test]
    fn action_dim_mismatch_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path());
        ckpt.save(&agent(0, 9), &env(), "run").unwrap();
        let mut other = agent(0, 25);
        let before = other.parameter_checksum();
        assert!(matches!(
            ckpt.load(&mut other, &env(), "run"),
            Err(CheckpointError::ShapeMismatch(_))
        ));
        assert_eq!(other.parameter_checksum(), before);
    }

    #[test]
    fn renamed_checkpoint_is_config_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path());
        ckpt.save(&agent(0, 9), &env(), "a").unwrap();
        fs::copy(ckpt.meta_path("a"), ckpt.meta_path("b")).unwrap();
        fs::copy(ckpt.weights_path("a"), ckpt.weights_path("b")).unwrap();
        let mut a = agent(0, 9);
        match ckpt.load(&mut a, &env(), "b") {
            Err(CheckpointError::ConfigMismatch { expected, found }) => {
                assert_eq!(expected, "b");
                assert_eq!(found, "a");
            }
            other => panic!("expected a configuration mismatch, got {other:?}"),
        }
    }

    #[test]
    fn meta_is_readable_json() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path());
        ckpt.save(&agent(0, 9), &env(), "run").unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(ckpt.meta_path("run")).unwrap()).unwrap();
        assert_eq!(value["action_dim"], 9);
        assert_eq!(value["hidden"], serde_json::json!([8]));
        assert_eq!(value["env"]["peak"], 400.0);
    }

    #[test]
    fn changed_environment_field_is_config_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path());
        ckpt.save(&agent(0, 9), &env(), "run").unwrap();

        let mut a = agent(1, 9);
        let before = a.parameter_checksum();
        let hotter = WildfireConfig {
            peak: 800.0,
            ..env()
        };
        match ckpt.load(&mut a, &hotter, "run") {
            Err(CheckpointError::ConfigMismatch { expected, found }) => {
                assert_eq!(expected, "peak=800.0");
                assert_eq!(found, "peak=400.0");
            }
            other => panic!("expected a configuration mismatch, got {other:?}"),
        }
        assert_eq!(a.parameter_checksum(), before);
    }

    #[test]
    fn identical_environment_with_fractional_values_loads() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path());
        let config = WildfireConfig {
            p_move: 0.1 + 0.2,
            kl_threshold: Some(1.0 / 3.0),
            ..env()
        };
        ckpt.save(&agent(0, 9), &config, "run").unwrap();
        let mut a = agent(1, 9);
        assert!(ckpt.load(&mut a, &config, "run").is_ok());
    }
}
