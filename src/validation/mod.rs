//! Input checks, error types and Monte Carlo accuracy validation

pub mod accuracy;
pub mod data;
pub mod error;

pub use accuracy::{AccuracyStatistics, AccuracyValidator, DistanceNoise};
pub use error::{Result, SolverError};
