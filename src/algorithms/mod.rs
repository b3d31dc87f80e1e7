//! Position solving: row reduction, linearization and the two solvers

pub mod augmented_matrix;
pub mod least_squares;
pub mod linearization;
pub mod newton_raphson;
pub mod solver;

pub use augmented_matrix::{AugmentedMatrix, RowReduction, SolutionSet};
pub use least_squares::LeastSquaresAdapter;
pub use linearization::LinearizationModel;
pub use newton_raphson::{ConvergenceMode, NewtonRaphsonSolver, SolverState};
pub use solver::{solve, solve_with_cancel, solver_for, Multilateration, PositionSolver};
