//! Value-function approximators.
//!
//! [`ValueFunction`] is the seam between the DQN update rule and the model
//! that implements it. [`MlpValueFunction`] is a dependency-free multilayer
//! perceptron trained with Adam; the libtorch-backed alternative lives in
//! `tch_network` behind the `rl-nn` feature.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::CheckpointError;

/// Maps a flattened state to one value per joint action.
pub trait ValueFunction {
    /// Input length.
    fn state_dim(&self) -> usize;

    /// Output length.
    fn action_dim(&self) -> usize;

    /// Action values for a single state.
    fn predict(&self, state: &[f32]) -> Vec<f32>;

    /// Action values for a batch of states.
    fn predict_batch(&self, states: &[&[f32]]) -> Vec<Vec<f32>> {
        states.iter().map(|s| self.predict(s)).collect()
    }

    /// One gradient step on the mean squared error between
    /// `predict(states[i])[actions[i]]` and `targets[i]`.
    ///
    /// Only the taken action's output contributes to the loss. Returns the
    /// loss before the step.
    fn fit_actions(&mut self, states: &[&[f32]], actions: &[usize], targets: &[f32]) -> f32;

    /// Overwrites every parameter with `other`'s.
    fn copy_from(&mut self, other: &Self)
    where
        Self: Sized;

    /// Order-sensitive digest of the parameters.
    fn checksum(&self) -> f64;

    /// Writes parameters to `path`.
    fn save_weights(&self, path: &Path) -> Result<(), CheckpointError>;

    /// Reads parameters from `path`, rejecting a shape mismatch.
    fn load_weights(&mut self, path: &Path) -> Result<(), CheckpointError>;
}

/// A fully connected layer, `y = W x + b` with `W` stored row-major `[out][in]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub w: Vec<f32>,
    pub b: Vec<f32>,
    pub in_dim: usize,
    pub out_dim: usize,
}

impl Dense {
    /// Glorot-uniform weights, zero bias.
    pub fn random<R: Rng>(in_dim: usize, out_dim: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (in_dim + out_dim) as f32).sqrt();
        let w = (0..in_dim * out_dim)
            .map(|_| rng.gen_range(-limit..limit))
            .collect();
        Self {
            w,
            b: vec![0.0; out_dim],
            in_dim,
            out_dim,
        }
    }

    pub fn forward(&self, x: &[f32]) -> Vec<f32> {
        debug_assert_eq!(x.len(), self.in_dim);
        (0..self.out_dim)
            .map(|o| {
                let row = &self.w[o * self.in_dim..(o + 1) * self.in_dim];
                row.iter().zip(x).map(|(w, x)| w * x).sum::<f32>() + self.b[o]
            })
            .collect()
    }
}

/// Serialized form of an [`MlpValueFunction`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MlpWeights {
    layers: Vec<Dense>,
}

#[derive(Debug, Clone)]
struct AdamState {
    t: i32,
    m_w: Vec<Vec<f32>>,
    v_w: Vec<Vec<f32>>,
    m_b: Vec<Vec<f32>>,
    v_b: Vec<Vec<f32>>,
}

impl AdamState {
    fn new(layers: &[Dense]) -> Self {
        let zeros_w = || layers.iter().map(|l| vec![0.0; l.w.len()]).collect();
        let zeros_b = || layers.iter().map(|l| vec![0.0; l.b.len()]).collect();
        Self {
            t: 0,
            m_w: zeros_w(),
            v_w: zeros_w(),
            m_b: zeros_b(),
            v_b: zeros_b(),
        }
    }
}

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const ADAM_EPS: f32 = 1e-8;

/// ReLU multilayer perceptron with a linear output layer.
#[derive(Debug, Clone)]
pub struct MlpValueFunction {
    layers: Vec<Dense>,
    adam: AdamState,
    learning_rate: f32,
    max_grad_norm: f32,
}

impl MlpValueFunction {
    /// Creates a network `state_dim -> hidden.. -> action_dim`.
    pub fn new(
        state_dim: usize,
        hidden: &[usize],
        action_dim: usize,
        learning_rate: f64,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut dims = Vec::with_capacity(hidden.len() + 2);
        dims.push(state_dim);
        dims.extend_from_slice(hidden);
        dims.push(action_dim);
        let layers: Vec<Dense> = dims
            .windows(2)
            .map(|d| Dense::random(d[0], d[1], &mut rng))
            .collect();
        let adam = AdamState::new(&layers);
        Self {
            layers,
            adam,
            learning_rate: learning_rate as f32,
            max_grad_norm: 10.0,
        }
    }

    /// Sets the global gradient-norm clip applied before each Adam step.
    pub fn with_max_grad_norm(mut self, max_grad_norm: f32) -> Self {
        self.max_grad_norm = max_grad_norm;
        self
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    /// Hidden layer widths.
    pub fn hidden(&self) -> Vec<usize> {
        self.layers[..self.layers.len() - 1]
            .iter()
            .map(|l| l.out_dim)
            .collect()
    }

    /// Forward pass keeping every layer's input (post-activation) for backprop.
    fn forward_cached(&self, x: &[f32]) -> (Vec<Vec<f32>>, Vec<f32>) {
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut a = x.to_vec();
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&a);
            inputs.push(a);
            a = if i == last {
                z
            } else {
                z.into_iter().map(|v| v.max(0.0)).collect()
            };
        }
        (inputs, a)
    }

    fn adam_step(&mut self, grads_w: &[Vec<f32>], grads_b: &[Vec<f32>]) {
        let norm_sq: f32 = grads_w
            .iter()
            .chain(grads_b)
            .flat_map(|g| g.iter())
            .map(|g| g * g)
            .sum();
        let norm = norm_sq.sqrt();
        let scale = if norm > self.max_grad_norm && norm > 0.0 {
            self.max_grad_norm / norm
        } else {
            1.0
        };

        self.adam.t += 1;
        let t = self.adam.t;
        let lr_t = self.learning_rate * (1.0 - BETA2.powi(t)).sqrt() / (1.0 - BETA1.powi(t));

        for (l, layer) in self.layers.iter_mut().enumerate() {
            adam_update(
                &mut layer.w,
                &grads_w[l],
                &mut self.adam.m_w[l],
                &mut self.adam.v_w[l],
                scale,
                lr_t,
            );
            adam_update(
                &mut layer.b,
                &grads_b[l],
                &mut self.adam.m_b[l],
                &mut self.adam.v_b[l],
                scale,
                lr_t,
            );
        }
    }
}

fn adam_update(p: &mut [f32], g: &[f32], m: &mut [f32], v: &mut [f32], scale: f32, lr_t: f32) {
    for j in 0..p.len() {
        let gj = g[j] * scale;
        m[j] = BETA1 * m[j] + (1.0 - BETA1) * gj;
        v[j] = BETA2 * v[j] + (1.0 - BETA2) * gj * gj;
        p[j] -= lr_t * m[j] / (v[j].sqrt() + ADAM_EPS);
    }
}

impl ValueFunction for MlpValueFunction {
    fn state_dim(&self) -> usize {
        self.layers[0].in_dim
    }

    fn action_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].out_dim
    }

    fn predict(&self, state: &[f32]) -> Vec<f32> {
        self.forward_cached(state).1
    }

    fn fit_actions(&mut self, states: &[&[f32]], actions: &[usize], targets: &[f32]) -> f32 {
        assert_eq!(states.len(), actions.len());
        assert_eq!(states.len(), targets.len());
        let n = states.len();
        if n == 0 {
            return 0.0;
        }

        let mut grads_w: Vec<Vec<f32>> = self.layers.iter().map(|l| vec![0.0; l.w.len()]).collect();
        let mut grads_b: Vec<Vec<f32>> = self.layers.iter().map(|l| vec![0.0; l.b.len()]).collect();
        let mut loss = 0.0;

        for ((state, &action), &target) in states.iter().zip(actions).zip(targets) {
            let (inputs, q) = self.forward_cached(state);
            let err = q[action] - target;
            loss += err * err;

            // d(loss)/dq is non-zero only at the taken action.
            let mut delta = vec![0.0; q.len()];
            delta[action] = 2.0 * err / n as f32;

            for l in (0..self.layers.len()).rev() {
                let layer = &self.layers[l];
                let input = &inputs[l];
                for o in 0..layer.out_dim {
                    let d = delta[o];
                    if d == 0.0 {
                        continue;
                    }
                    grads_b[l][o] += d;
                    let row = &mut grads_w[l][o * layer.in_dim..(o + 1) * layer.in_dim];
                    for (g, x) in row.iter_mut().zip(input) {
                        *g += d * x;
                    }
                }
                if l == 0 {
                    break;
                }
                // Back through W, then through the ReLU that produced `input`.
                let mut next = vec![0.0; layer.in_dim];
                for o in 0..layer.out_dim {
                    let d = delta[o];
                    if d == 0.0 {
                        continue;
                    }
                    let row = &layer.w[o * layer.in_dim..(o + 1) * layer.in_dim];
                    for (nx, w) in next.iter_mut().zip(row) {
                        *nx += d * w;
                    }
                }
                for (nx, a) in next.iter_mut().zip(input) {
                    if *a <= 0.0 {
                        *nx = 0.0;
                    }
                }
                delta = next;
            }
        }

        self.adam_step(&grads_w, &grads_b);
        loss / n as f32
    }

    fn copy_from(&mut self, other: &Self) {
        self.layers.clone_from(&other.layers);
    }

    fn checksum(&self) -> f64 {
        self.layers
            .iter()
            .flat_map(|l| l.w.iter().chain(l.b.iter()))
            .enumerate()
            .map(|(i, &p)| p as f64 * (1 + i % 7) as f64)
            .sum()
    }

    fn save_weights(&self, path: &Path) -> Result<(), CheckpointError> {
        let weights = MlpWeights {
            layers: self.layers.clone(),
        };
        let json = serde_json::to_string(&weights).map_err(|source| CheckpointError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn load_weights(&mut self, path: &Path) -> Result<(), CheckpointError> {
        if !path.exists() {
            return Err(CheckpointError::Missing(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path).map_err(|source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let weights: MlpWeights =
            serde_json::from_str(&json).map_err(|source| CheckpointError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let shape = |ls: &[Dense]| ls.iter().map(|l| (l.in_dim, l.out_dim)).collect::<Vec<_>>();
        let (expected, found) = (shape(&self.layers), shape(&weights.layers));
        if expected != found {
            return Err(CheckpointError::ShapeMismatch(format!(
                "expected layers {expected:?}, found {found:?}"
            )));
        }
        if weights
            .layers
            .iter()
            .any(|l| l.w.len() != l.in_dim * l.out_dim || l.b.len() != l.out_dim)
        {
            return Err(CheckpointError::ShapeMismatch(
                "layer buffers do not match their declared dimensions".into(),
            ));
        }
        self.layers = weights.layers;
        self.adam = AdamState::new(&self.layers);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net() -> MlpValueFunction {
        MlpValueFunction::new(4, &[16, 16], 3, 1e-2, 7)
    }

    #[test]
    fn forward_shape() {
        let n = net();
        assert_eq!(n.state_dim(), 4);
        assert_eq!(n.action_dim(), 3);
        assert_eq!(n.hidden(), vec![16, 16]);
        assert_eq!(n.predict(&[0.1, 0.2, 0.3, 0.4]).len(), 3);
    }

    #[test]
    fn same_seed_same_weights() {
        assert_eq!(net().checksum(), net().checksum());
        let other = MlpValueFunction::new(4, &[16, 16], 3, 1e-2, 8);
        assert_ne!(net().checksum(), other.checksum());
    }

    #[test]
    fn fitting_reduces_loss_on_taken_action() {
        let mut n = net();
        let s: &[f32] = &[0.5, -0.2, 1.0, 0.3];
        let first = n.fit_actions(&[s], &[1], &[5.0]);
        let mut last = first;
        for _ in 0..200 {
            last = n.fit_actions(&[s], &[1], &[5.0]);
        }
        assert!(last < first * 0.1, "loss {first} -> {last}");
        assert!((n.predict(s)[1] - 5.0).abs() < 0.5);
    }

    #[test]
    fn output_layer_rows_of_other_actions_are_untouched() {
        let mut n = net();
        let before = n.layers().last().unwrap().clone();
        let s: &[f32] = &[1.0, 1.0, 1.0, 1.0];
        n.fit_actions(&[s], &[0], &[3.0]);
        let after = n.layers().last().unwrap();
        let in_dim = after.in_dim;
        for o in 1..3 {
            assert_eq!(
                &before.w[o * in_dim..(o + 1) * in_dim],
                &after.w[o * in_dim..(o + 1) * in_dim]
            );
            assert_eq!(before.b[o], after.b[o]);
        }
        assert_ne!(before.b[0], after.b[0]);
    }

    #[test]
    fn copy_from_matches_outputs() {
        let mut a = net();
        let mut b = MlpValueFunction::new(4, &[16, 16], 3, 1e-2, 99);
        let s: &[f32] = &[0.3, 0.3, 0.3, 0.3];
        a.fit_actions(&[s], &[2], &[1.0]);
        b.copy_from(&a);
        assert_eq!(a.predict(s), b.predict(s));
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn save_and_load_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.json");
        let a = net();
        a.save_weights(&path).unwrap();
        let mut b = MlpValueFunction::new(4, &[16, 16], 3, 1e-2, 1234);
        b.load_weights(&path).unwrap();
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn load_rejects_other_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.json");
        net().save_weights(&path).unwrap();
        let mut other = MlpValueFunction::new(4, &[8], 3, 1e-2, 0);
        assert!(matches!(
            other.load_weights(&path),
            Err(CheckpointError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn load_missing_file() {
        let mut n = net();
        assert!(matches!(
            n.load_weights(Path::new("/nonexistent/weights.json")),
            Err(CheckpointError::Missing(_))
        ));
    }
}
