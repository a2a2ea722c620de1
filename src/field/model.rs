//! Ground-truth temperature field.

use rand::Rng;

use super::gaussian::FieldParameters;
use crate::types::Position;

/// Static bivariate-Gaussian temperature field scaled to a peak intensity.
///
/// `T(p) = peak * exp(-0.5 * (p - mu)^T Sigma^-1 (p - mu))`
#[derive(Debug, Clone)]
pub struct FieldModel {
    params: FieldParameters,
    peak: f64,
}

impl FieldModel {
    /// Creates a field. The covariance must be positive definite; this is
    /// checked by [`crate::config::WildfireConfig::validate`].
    pub fn new(params: FieldParameters, peak: f64) -> Self {
        Self { params, peak }
    }

    pub fn params(&self) -> &FieldParameters {
        &self.params
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }

    /// Noise-free temperature at an arbitrary point.
    pub fn value_at_point(&self, point: [f64; 2]) -> f64 {
        match self.params.mahalanobis_sq(point) {
            Some(m) => self.peak * (-0.5 * m).exp(),
            None => 0.0,
        }
    }

    /// Noise-free temperature at a grid cell.
    pub fn value_at(&self, position: Position) -> f64 {
        self.value_at_point(position.as_point())
    }

    /// Noisy reading at a cell, clamped to be non-negative.
    pub fn sample<R: Rng + ?Sized>(&self, position: Position, noise_std: f64, rng: &mut R) -> f64 {
        let clean = self.value_at(position);
        if noise_std <= 0.0 {
            return clean;
        }
        (clean + noise_std * standard_normal(rng)).max(0.0)
    }

    /// Full grid of noise-free values, row-major by `y` then `x`.
    pub fn grid(&self, width: usize, height: usize) -> Vec<Vec<f64>> {
        (0..height)
            .map(|y| (0..width).map(|x| self.value_at(Position::new(x, y))).collect())
            .collect()
    }
}

/// Box-Muller transform on two uniforms.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
