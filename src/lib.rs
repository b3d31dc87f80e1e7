//! Beacon Multilateration
//!
//! Locates a point in 2D or 3D space from its measured distances to beacons at
//! known positions. The squared-distance equations are linearized at the
//! current estimate and solved by Gauss-Jordan elimination, iterating until
//! the estimate settles. A Levenberg-Marquardt backend solves the same model
//! as an alternative.

pub mod core;
pub mod algorithms;
pub mod validation;
pub mod utils;

// Re-export commonly used types
pub use crate::core::{Beacon, CancelToken, Dimensionality, InitialGuess, PositionEstimate, SolveStrategy};
pub use crate::algorithms::{
    solve, solve_with_cancel, AugmentedMatrix, ConvergenceMode, LeastSquaresAdapter, LinearizationModel,
    Multilateration, NewtonRaphsonSolver, PositionSolver, RowReduction, SolutionSet,
};
pub use crate::validation::{AccuracyStatistics, AccuracyValidator, DistanceNoise, Result, SolverError};
pub use crate::utils::{ConfigError, ConfigurationManager, SolveOptions};
