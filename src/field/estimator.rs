//! Running estimate of the field's Gaussian shape from point readings.
//!
//! The estimator treats each reading, normalized by the peak intensity, as a
//! weight on the position it was taken at, and pools the weighted first and
//! second moments of every reading seen this episode with the current
//! estimate. The current estimate enters the pool with the total weight
//! accumulated so far, starting from a prior pseudo-count.

use tracing::debug;

use super::gaussian::{Covariance, FieldParameters};
use crate::types::Position;

/// Moment-matching estimator for `(mu, Sigma)`.
#[derive(Debug, Clone)]
pub struct Estimator {
    peak: f64,
    prior_weight: f64,
    min_variance: f64,
    accumulated_weight: f64,
}

impl Estimator {
    /// Creates an estimator.
    ///
    /// * `peak` - Peak field intensity used to normalize readings into weights
    /// * `prior_weight` - Pseudo-count given to the prior estimate at reset
    /// * `min_variance` - Eigenvalue floor applied to every returned covariance
    pub fn new(peak: f64, prior_weight: f64, min_variance: f64) -> Self {
        Self {
            peak,
            prior_weight,
            min_variance,
            accumulated_weight: prior_weight,
        }
    }

    /// Forgets all readings; the next update starts from the prior pseudo-count.
    pub fn reset(&mut self) {
        self.accumulated_weight = self.prior_weight;
    }

    /// Total weight behind the current estimate.
    pub fn accumulated_weight(&self) -> f64 {
        self.accumulated_weight
    }

    pub fn min_variance(&self) -> f64 {
        self.min_variance
    }

    /// Folds a batch of readings into `prior` and returns the new estimate.
    ///
    /// The returned covariance is always symmetric with eigenvalues at least
    /// `min_variance`. Readings that are not finite are ignored.
    ///
    /// # Panics
    ///
    /// Panics if `readings` and `positions` differ in length.
    pub fn update(
        &mut self,
        readings: &[f64],
        positions: &[Position],
        prior: &FieldParameters,
    ) -> FieldParameters {
        assert_eq!(
            readings.len(),
            positions.len(),
            "Each reading needs exactly one position"
        );

        let mut batch_weight = 0.0;
        let mut first = [0.0; 2];
        let mut second = [[0.0; 2]; 2];
        for (&t, pos) in readings.iter().zip(positions) {
            if !t.is_finite() {
                continue;
            }
            let w = (t / self.peak).clamp(0.0, 1.0);
            if w == 0.0 {
                continue;
            }
            let [x, y] = pos.as_point();
            batch_weight += w;
            first[0] += w * x;
            first[1] += w * y;
            second[0][0] += w * x * x;
            second[0][1] += w * x * y;
            second[1][1] += w * y * y;
        }

        let prior = self.sanitize(prior);
        if batch_weight == 0.0 {
            return prior;
        }

        let w_prior = self.accumulated_weight;
        let total = w_prior + batch_weight;
        let mu = prior.mean;
        let prior_second = [
            [prior.cov.xx + mu[0] * mu[0], prior.cov.xy + mu[0] * mu[1]],
            [prior.cov.xy + mu[0] * mu[1], prior.cov.yy + mu[1] * mu[1]],
        ];

        let mean = [
            (w_prior * mu[0] + first[0]) / total,
            (w_prior * mu[1] + first[1]) / total,
        ];
        let pooled = |i: usize, j: usize| (w_prior * prior_second[i][j] + second[i][j]) / total;
        let raw = Covariance::new(
            pooled(0, 0) - mean[0] * mean[0],
            pooled(0, 1) - mean[0] * mean[1],
            pooled(1, 1) - mean[1] * mean[1],
        );

        self.accumulated_weight = total;
        let cov = self.repair(raw);
        FieldParameters::new(mean, cov)
    }

    /// Replaces a non-finite prior mean with the origin and repairs its covariance.
    fn sanitize(&self, prior: &FieldParameters) -> FieldParameters {
        let mean = if prior.mean[0].is_finite() && prior.mean[1].is_finite() {
            prior.mean
        } else {
            [0.0, 0.0]
        };
        FieldParameters::new(mean, self.repair(prior.cov))
    }

    fn repair(&self, cov: Covariance) -> Covariance {
        let repaired = cov.floor_eigenvalues(self.min_variance);
        if repaired != cov {
            debug!(?cov, ?repaired, "floored covariance eigenvalues");
        }
        repaired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn prior() -> FieldParameters {
        FieldParameters::new([1.0, 1.0], Covariance::diagonal(5.0, 5.0))
    }

    #[test]
    fn zero_readings_keep_prior() {
        let mut est = Estimator::new(400.0, 1.0, 0.25);
        let out = est.update(&[0.0, 0.0], &[Position::new(0, 0), Position::new(1, 1)], &prior());
        assert_eq!(out, prior());
        assert_relative_eq!(est.accumulated_weight(), 1.0);
    }

    #[test]
    fn hot_reading_pulls_mean_toward_sample() {
        let mut est = Estimator::new(400.0, 1.0, 0.25);
        let out = est.update(&[400.0], &[Position::new(7, 5)], &prior());
        // Equal weights: mean is the midpoint of (1,1) and (7,5).
        assert_relative_eq!(out.mean[0], 4.0, epsilon = 1e-12);
        assert_relative_eq!(out.mean[1], 3.0, epsilon = 1e-12);
        assert_relative_eq!(est.accumulated_weight(), 2.0);
    }

    #[test]
    fn repeated_readings_converge_on_sampled_cell() {
        let mut est = Estimator::new(400.0, 1.0, 0.25);
        let mut e = prior();
        for _ in 0..200 {
            e = est.update(&[400.0], &[Position::new(6, 6)], &e);
        }
        assert!((e.mean[0] - 6.0).abs() < 0.1);
        assert!((e.mean[1] - 6.0).abs() < 0.1);
        let (_, lo) = e.cov.eigenvalues();
        assert!(lo >= 0.25 - 1e-9);
    }

    #[test]
    fn reset_restores_prior_weight() {
        let mut est = Estimator::new(400.0, 2.0, 0.25);
        est.update(&[200.0], &[Position::new(3, 3)], &prior());
        assert!(est.accumulated_weight() > 2.0);
        est.reset();
        assert_relative_eq!(est.accumulated_weight(), 2.0);
    }

    #[test]
    fn non_finite_readings_are_ignored() {
        let mut est = Estimator::new(400.0, 1.0, 0.25);
        let out = est.update(&[f64::NAN, f64::INFINITY], &[Position::new(2, 2), Position::new(3, 3)], &prior());
        assert_eq!(out, prior());
    }

    #[test]
    fn degenerate_prior_is_repaired() {
        let mut est = Estimator::new(400.0, 1.0, 0.25);
        let bad = FieldParameters::new([f64::NAN, 2.0], Covariance::new(1.0, 5.0, 1.0));
        let out = est.update(&[], &[], &bad);
        assert!(out.is_finite());
        assert!(out.cov.is_positive_definite());
    }

    #[test]
    #[should_panic(expected = "exactly one position")]
    fn mismatched_lengths_panic() {
        let mut est = Estimator::new(400.0, 1.0, 0.25);
        est.update(&[1.0], &[], &prior());
    }

    proptest! {
        #[test]
        fn covariance_is_always_symmetric_psd(
            readings in prop::collection::vec(0.0f64..500.0, 1..6),
            xs in prop::collection::vec(0usize..10, 6),
            ys in prop::collection::vec(0usize..10, 6),
            steps in 1usize..20,
        ) {
            let mut est = Estimator::new(400.0, 1.0, 0.25);
            let positions: Vec<Position> = (0..readings.len())
                .map(|i| Position::new(xs[i], ys[i]))
                .collect();
            let mut e = prior();
            for _ in 0..steps {
                e = est.update(&readings, &positions, &e);
                let (_, lo) = e.cov.eigenvalues();
                prop_assert!(e.is_finite());
                prop_assert!(lo >= 0.25 - 1e-9);
                let m = e.cov.as_matrix();
                prop_assert_eq!(m[0][1], m[1][0]);
            }
        }
    }
}
