//! Error types for the multilateration solvers

use thiserror::Error;

/// Convenient `Result` alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SolverError>;

/// Every way a solve or a matrix operation can fail.
///
/// All variants are recoverable by the caller; nothing here aborts the process.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    /// Malformed request: count mismatch, empty beacon set, wrong
    /// dimensionality, non-finite values or out-of-range options.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Row or column outside the matrix.
    #[error("index ({row}, {col}) out of range for {rows}x{cols} matrix")]
    IndexOutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// The linearized system had a pivot in the constants column.
    #[error("linear system is inconsistent at iteration {iteration}")]
    Inconsistent { iteration: usize },

    /// The iteration cap was reached before the estimate settled.
    #[error("no convergence after {iterations} iterations (last estimate {last_estimate:?})")]
    MaxIterationsExceeded {
        iterations: usize,
        last_estimate: Vec<f64>,
    },

    /// The caller's cancel token was set.
    #[error("solve cancelled after {iterations} iterations")]
    Cancelled { iterations: usize },

    /// The wall-clock budget ran out.
    #[error("solve timed out after {elapsed_ms} ms ({iterations} iterations)")]
    TimedOut { iterations: usize, elapsed_ms: u64 },

    /// A computed value was NaN or infinite.
    #[error("numerical instability: {reason}")]
    NumericalInstability { reason: String },

    /// The external least-squares optimizer terminated without success.
    #[error("least-squares optimizer failed: {reason}")]
    OptimizerFailure { reason: String },
}

impl SolverError {
    pub fn invalid_input<S: Into<String>>(reason: S) -> Self {
        SolverError::InvalidInput { reason: reason.into() }
    }

    pub fn numerical<S: Into<String>>(reason: S) -> Self {
        SolverError::NumericalInstability { reason: reason.into() }
    }

    /// Whether retrying with another seed, tolerance or strategy may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SolverError::Inconsistent { .. }
                | SolverError::MaxIterationsExceeded { .. }
                | SolverError::TimedOut { .. }
                | SolverError::NumericalInstability { .. }
                | SolverError::OptimizerFailure { .. }
        )
    }
}
