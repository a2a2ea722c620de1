//! Bivariate Gaussian parameters and the 2x2 covariance algebra they need.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Symmetric 2x2 covariance matrix `[[xx, xy], [xy, yy]]`.
///
/// Stored as three numbers so symmetry holds by construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Covariance {
    pub xx: f64,
    pub xy: f64,
    pub yy: f64,
}

impl Covariance {
    pub fn new(xx: f64, xy: f64, yy: f64) -> Self {
        Self { xx, xy, yy }
    }

    /// Diagonal covariance `diag(vx, vy)`.
    pub fn diagonal(vx: f64, vy: f64) -> Self {
        Self::new(vx, 0.0, vy)
    }

    /// Builds a covariance from a full 2x2 matrix, averaging the off-diagonals.
    pub fn from_matrix(m: [[f64; 2]; 2]) -> Self {
        Self::new(m[0][0], 0.5 * (m[0][1] + m[1][0]), m[1][1])
    }

    pub fn as_matrix(&self) -> [[f64; 2]; 2] {
        [[self.xx, self.xy], [self.xy, self.yy]]
    }

    pub fn determinant(&self) -> f64 {
        self.xx * self.yy - self.xy * self.xy
    }

    pub fn trace(&self) -> f64 {
        self.xx + self.yy
    }

    /// Matrix inverse, or `None` when the determinant is not strictly positive.
    pub fn inverse(&self) -> Option<Covariance> {
        let det = self.determinant();
        if !(det > 0.0) || !det.is_finite() {
            return None;
        }
        Some(Covariance::new(self.yy / det, -self.xy / det, self.xx / det))
    }

    /// Eigenvalues in descending order.
    pub fn eigenvalues(&self) -> (f64, f64) {
        let half_trace = 0.5 * (self.xx + self.yy);
        let half_diff = 0.5 * (self.xx - self.yy);
        let radius = (half_diff * half_diff + self.xy * self.xy).sqrt();
        (half_trace + radius, half_trace - radius)
    }

    /// True when both eigenvalues are strictly positive and finite.
    pub fn is_positive_definite(&self) -> bool {
        let (hi, lo) = self.eigenvalues();
        hi.is_finite() && lo.is_finite() && lo > 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.xx.is_finite() && self.xy.is_finite() && self.yy.is_finite()
    }

    /// Projects onto the set of matrices whose eigenvalues are all `>= floor`.
    ///
    /// Non-finite input collapses to `floor * I`.
    pub fn floor_eigenvalues(&self, floor: f64) -> Covariance {
        if !self.is_finite() {
            return Covariance::diagonal(floor, floor);
        }
        let (l1, l2) = self.eigenvalues();
        if l2 >= floor {
            return *self;
        }
        let (l1f, l2f) = (l1.max(floor), l2.max(floor));

        // Principal eigenvector for l1.
        let (vx, vy) = if self.xy.abs() < 1e-12 {
            if self.xx >= self.yy {
                (1.0, 0.0)
            } else {
                (0.0, 1.0)
            }
        } else {
            let (vx, vy) = (l1 - self.yy, self.xy);
            let norm = (vx * vx + vy * vy).sqrt();
            (vx / norm, vy / norm)
        };
        // Second eigenvector is the perpendicular.
        let (wx, wy) = (-vy, vx);

        Covariance::new(
            l1f * vx * vx + l2f * wx * wx,
            l1f * vx * vy + l2f * wx * wy,
            l1f * vy * vy + l2f * wy * wy,
        )
    }

    /// Quadratic form `d^T M d`.
    pub fn quadratic_form(&self, d: [f64; 2]) -> f64 {
        self.xx * d[0] * d[0] + 2.0 * self.xy * d[0] * d[1] + self.yy * d[1] * d[1]
    }

    /// `tr(self * other)` for symmetric matrices.
    pub fn trace_product(&self, other: &Covariance) -> f64 {
        self.xx * other.xx + 2.0 * self.xy * other.xy + self.yy * other.yy
    }
}

/// Mean and covariance of a bivariate Gaussian.
///
/// Describes both the ground-truth field shape and the running estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldParameters {
    pub mean: [f64; 2],
    pub cov: Covariance,
}

impl FieldParameters {
    pub fn new(mean: [f64; 2], cov: Covariance) -> Self {
        Self { mean, cov }
    }

    /// Squared Mahalanobis distance of `point` from the mean.
    ///
    /// Returns `None` if the covariance is not invertible.
    pub fn mahalanobis_sq(&self, point: [f64; 2]) -> Option<f64> {
        let inv = self.cov.inverse()?;
        let d = [point[0] - self.mean[0], point[1] - self.mean[1]];
        Some(inv.quadratic_form(d))
    }

    /// `KL(self || other)` between two bivariate Gaussians.
    ///
    /// Returns `None` if either covariance is singular.
    pub fn kl_divergence(&self, other: &FieldParameters) -> Option<f64> {
        let other_inv = other.cov.inverse()?;
        let det_self = self.cov.determinant();
        let det_other = other.cov.determinant();
        if !(det_self > 0.0) {
            return None;
        }
        let d = [other.mean[0] - self.mean[0], other.mean[1] - self.mean[1]];
        let kl = 0.5
            * (other_inv.trace_product(&self.cov) + other_inv.quadratic_form(d) - 2.0
                + (det_other / det_self).ln());
        // Rounding can push an exact match slightly below zero.
        Some(kl.max(0.0))
    }

    pub fn is_finite(&self) -> bool {
        self.mean[0].is_finite() && self.mean[1].is_finite() && self.cov.is_finite()
    }
}

impl fmt::Display for FieldParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mu=[{:.3}, {:.3}] sigma=[[{:.3}, {:.3}], [{:.3}, {:.3}]]",
            self.mean[0],
            self.mean[1],
            self.cov.xx,
            self.cov.xy,
            self.cov.xy,
            self.cov.yy
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn inverse_of_diagonal() {
        let inv = Covariance::diagonal(2.0, 4.0).inverse().unwrap();
        assert_relative_eq!(inv.xx, 0.5);
        assert_relative_eq!(inv.yy, 0.25);
        assert_relative_eq!(inv.xy, 0.0);
    }

    #[test]
    fn singular_has_no_inverse() {
        assert!(Covariance::new(1.0, 1.0, 1.0).inverse().is_none());
        assert!(Covariance::new(0.0, 0.0, 0.0).inverse().is_none());
    }

    #[test]
    fn eigenvalues_of_correlated_matrix() {
        let (hi, lo) = Covariance::new(2.0, 1.0, 2.0).eigenvalues();
        assert_relative_eq!(hi, 3.0, epsilon = 1e-12);
        assert_relative_eq!(lo, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn floor_leaves_well_conditioned_matrix_alone() {
        let c = Covariance::new(3.0, 0.5, 2.0);
        assert_eq!(c.floor_eigenvalues(0.1), c);
    }

    #[test]
    fn floor_repairs_indefinite_matrix() {
        let c = Covariance::new(1.0, 2.0, 1.0); // eigenvalues 3, -1
        let repaired = c.floor_eigenvalues(0.25);
        let (hi, lo) = repaired.eigenvalues();
        assert_relative_eq!(hi, 3.0, epsilon = 1e-9);
        assert_relative_eq!(lo, 0.25, epsilon = 1e-9);
        assert!(repaired.is_positive_definite());
    }

    #[test]
    fn floor_repairs_nan() {
        let c = Covariance::new(f64::NAN, 0.0, 1.0);
        assert_eq!(c.floor_eigenvalues(0.5), Covariance::diagonal(0.5, 0.5));
    }

    #[test]
    fn kl_of_identical_is_zero() {
        let p = FieldParameters::new([1.0, 2.0], Covariance::new(2.0, 0.3, 1.0));
        assert_relative_eq!(p.kl_divergence(&p).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn kl_of_shifted_mean() {
        // Same identity covariance: KL = 0.5 * |d|^2.
        let p = FieldParameters::new([0.0, 0.0], Covariance::diagonal(1.0, 1.0));
        let q = FieldParameters::new([3.0, 4.0], Covariance::diagonal(1.0, 1.0));
        assert_relative_eq!(p.kl_divergence(&q).unwrap(), 12.5, epsilon = 1e-12);
    }

    #[test]
    fn kl_is_asymmetric_in_covariance() {
        let p = FieldParameters::new([0.0, 0.0], Covariance::diagonal(1.0, 1.0));
        let q = FieldParameters::new([0.0, 0.0], Covariance::diagonal(4.0, 4.0));
        let pq = p.kl_divergence(&q).unwrap();
        let qp = q.kl_divergence(&p).unwrap();
        assert!(pq > 0.0 && qp > 0.0);
        assert!((pq - qp).abs() > 1e-6);
    }

    #[test]
    fn mahalanobis_on_mean_is_zero() {
        let p = FieldParameters::new([5.0, 5.0], Covariance::diagonal(2.0, 2.0));
        assert_relative_eq!(p.mahalanobis_sq([5.0, 5.0]).unwrap(), 0.0);
        assert_relative_eq!(p.mahalanobis_sq([7.0, 5.0]).unwrap(), 2.0);
    }
}
