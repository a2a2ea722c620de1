//! Simulation state and its fixed-layout feature vector.

use std::fmt;

use crate::field::{Covariance, FieldParameters};
use crate::types::Position;

/// Positions of every unit plus the current field estimate.
///
/// Flattened layout (length `2 * (n_agents + n_sats + 3)`):
///
/// ```text
/// [a0.x, a0.y, .., aN.x, aN.y, s0.x, s0.y, .., mu.x, mu.y, S.xx, S.xy, S.yx, S.yy]
/// ```
///
/// The layout depends only on the roster sizes, never on the values.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    pub agents: Vec<Position>,
    pub satellites: Vec<Position>,
    pub estimate: FieldParameters,
}

impl SimulationState {
    pub fn new(agents: Vec<Position>, satellites: Vec<Position>, estimate: FieldParameters) -> Self {
        Self {
            agents,
            satellites,
            estimate,
        }
    }

    /// Length of the flattened vector for a roster.
    pub fn flat_len(n_agents: usize, n_sats: usize) -> usize {
        2 * (n_agents + n_sats + 3)
    }

    /// Agents followed by satellites.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.agents.iter().chain(self.satellites.iter())
    }

    /// Flattens into the documented fixed layout.
    pub fn flatten(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(Self::flat_len(self.agents.len(), self.satellites.len()));
        for p in self.positions() {
            out.push(p.x as f64);
            out.push(p.y as f64);
        }
        let FieldParameters { mean, cov } = self.estimate;
        out.extend_from_slice(&[mean[0], mean[1], cov.xx, cov.xy, cov.xy, cov.yy]);
        out
    }

    /// Rebuilds a state from [`SimulationState::flatten`] output.
    ///
    /// Returns `None` on a length mismatch or if a position entry is not a
    /// non-negative integer.
    pub fn unflatten(flat: &[f64], n_agents: usize, n_sats: usize) -> Option<Self> {
        if flat.len() != Self::flat_len(n_agents, n_sats) {
            return None;
        }
        let n_units = n_agents + n_sats;
        let mut positions = Vec::with_capacity(n_units);
        for chunk in flat[..2 * n_units].chunks_exact(2) {
            positions.push(Position::new(to_cell(chunk[0])?, to_cell(chunk[1])?));
        }
        let tail = &flat[2 * n_units..];
        let estimate = FieldParameters::new(
            [tail[0], tail[1]],
            Covariance::from_matrix([[tail[2], tail[3]], [tail[4], tail[5]]]),
        );
        let satellites = positions.split_off(n_agents);
        Some(Self::new(positions, satellites, estimate))
    }
}

fn to_cell(v: f64) -> Option<usize> {
    (v >= 0.0 && v.fract() == 0.0 && v.is_finite()).then_some(v as usize)
}

impl fmt::Display for SimulationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.agents.iter().enumerate() {
            writeln!(f, "agent {i}: {p}")?;
        }
        for (i, p) in self.satellites.iter().enumerate() {
            writeln!(f, "satellite {i}: {p}")?;
        }
        write!(f, "estimate: {}", self.estimate)
    }
}
