//! Value network using tch-rs (PyTorch bindings).
//!
//! This module is only available with the `rl-nn` feature.

use std::path::Path;

use tch::{nn, nn::Module, nn::OptimizerConfig, Device, Kind, Tensor};

use super::network::ValueFunction;
use crate::error::CheckpointError;

/// MLP Q-network on libtorch.
///
/// Architecture: `state_dim -> hidden.. -> action_dim` with ReLU activations
/// and a linear output.
pub struct TchValueFunction {
    vs: nn::VarStore,
    net: nn::Sequential,
    opt: nn::Optimizer,
    state_dim: usize,
    action_dim: usize,
    device: Device,
}

impl TchValueFunction {
    /// Creates a new Q-network.
    pub fn new(
        state_dim: usize,
        hidden: &[usize],
        action_dim: usize,
        learning_rate: f64,
        device: Device,
    ) -> Result<Self, tch::TchError> {
        let vs = nn::VarStore::new(device);
        let p = &vs.root();
        let mut net = nn::seq();
        let mut in_dim = state_dim as i64;
        for (i, &h) in hidden.iter().enumerate() {
            net = net
                .add(nn::linear(
                    p / format!("l{}", i + 1),
                    in_dim,
                    h as i64,
                    Default::default(),
                ))
                .add_fn(|x| x.relu());
            in_dim = h as i64;
        }
        net = net.add(nn::linear(
            p / "out",
            in_dim,
            action_dim as i64,
            Default::default(),
        ));
        let opt = nn::Adam::default().build(&vs, learning_rate)?;

        Ok(Self {
            vs,
            net,
            opt,
            state_dim,
            action_dim,
            device,
        })
    }

    fn batch_tensor(&self, states: &[&[f32]]) -> Tensor {
        let flat: Vec<f32> = states.iter().flat_map(|s| s.iter().copied()).collect();
        Tensor::from_slice(&flat)
            .reshape([states.len() as i64, self.state_dim as i64])
            .to_kind(Kind::Float)
            .to_device(self.device)
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}

impl ValueFunction for TchValueFunction {
    fn state_dim(&self) -> usize {
        self.state_dim
    }

    fn action_dim(&self) -> usize {
        self.action_dim
    }

    fn predict(&self, state: &[f32]) -> Vec<f32> {
        self.predict_batch(&[state]).pop().unwrap_or_default()
    }

    fn predict_batch(&self, states: &[&[f32]]) -> Vec<Vec<f32>> {
        if states.is_empty() {
            return Vec::new();
        }
        let x = self.batch_tensor(states);
        let q = tch::no_grad(|| self.net.forward(&x)).to_device(Device::Cpu);
        let flat: Vec<f32> = Vec::try_from(&q.flatten(0, -1))
            .unwrap_or_else(|e| panic!("failed to read Q-values from libtorch: {e}"));
        assert_eq!(
            flat.len(),
            states.len() * self.action_dim,
            "Q-network returned {} values for {} states of {} actions",
            flat.len(),
            states.len(),
            self.action_dim
        );
        flat.chunks(self.action_dim).map(<[f32]>::to_vec).collect()
    }

    fn fit_actions(&mut self, states: &[&[f32]], actions: &[usize], targets: &[f32]) -> f32 {
        if states.is_empty() {
            return 0.0;
        }
        let x = self.batch_tensor(states);
        let a: Vec<i64> = actions.iter().map(|&a| a as i64).collect();
        let a = Tensor::from_slice(&a).unsqueeze(-1).to_device(self.device);
        let y = Tensor::from_slice(targets).to_device(self.device);

        let q = self.net.forward(&x).gather(1, &a, false).squeeze_dim(-1);
        let loss = (&q - &y).pow_tensor_scalar(2).mean(Kind::Float);

        self.opt.zero_grad();
        loss.backward();
        self.opt.step();

        f64::try_from(&loss).unwrap_or_else(|e| panic!("failed to read TD loss from libtorch: {e}"))
            as f32
    }

    /// # Panics
    ///
    /// Panics if the two networks do not share the same variables.
    fn copy_from(&mut self, other: &Self) {
        if let Err(e) = self.vs.copy(&other.vs) {
            panic!("failed to copy value network parameters: {e}");
        }
    }

    fn checksum(&self) -> f64 {
        let mut vars: Vec<(String, Tensor)> = self.vs.variables().into_iter().collect();
        vars.sort_by(|a, b| a.0.cmp(&b.0));
        vars.iter()
            .enumerate()
            .map(|(i, (_, t))| t.sum(Kind::Double).double_value(&[]) * (1 + i) as f64)
            .sum()
    }

    fn save_weights(&self, path: &Path) -> Result<(), CheckpointError> {
        self.vs.save(path)?;
        Ok(())
    }

    fn load_weights(&mut self, path: &Path) -> Result<(), CheckpointError> {
        if !path.exists() {
            return Err(CheckpointError::Missing(path.to_path_buf()));
        }
        self.vs.load(path)?;
        Ok(())
    }
}
