//! The temperature field: ground truth, Gaussian algebra, and estimation.

pub mod estimator;
pub mod gaussian;
pub mod model;

pub use estimator::Estimator;
pub use gaussian::{Covariance, FieldParameters};
pub use model::FieldModel;
