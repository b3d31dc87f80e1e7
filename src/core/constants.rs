//! Numerical constants and solver defaults

/// Entries of an augmented matrix whose magnitude falls below this value after a
/// row operation are snapped to exactly zero.
pub const DEFAULT_SNAP_EPSILON: f64 = 0.05;

/// Snapping threshold used by the position solvers. The matrix default above
/// caps the step resolution at a few centimetres, so solves run with a much
/// tighter value unless the caller overrides it.
pub const SOLVER_SNAP_EPSILON: f64 = 1e-9;

/// Relative per-coordinate change below which an iteration counts as converged.
pub const DEFAULT_CONVERGENCE_EPSILON: f64 = 1e-5;

/// Iteration cap for the Newton-Raphson loop.
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Magnitudes below this are treated as zero when dividing.
pub const NEAR_ZERO: f64 = 1e-12;

/// Value of every coordinate of the default seed estimate.
pub const DEFAULT_SEED_VALUE: f64 = 1.0;
