//! Gauss-Newton / Newton-Raphson iteration over the row-reduction engine

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::algorithms::augmented_matrix::RowReduction;
use crate::algorithms::linearization::LinearizationModel;
use crate::core::{
    CancelToken, InitialGuess, PositionEstimate, SolveStrategy, DEFAULT_CONVERGENCE_EPSILON,
    DEFAULT_MAX_ITERATIONS, DEFAULT_SEED_VALUE, NEAR_ZERO, SOLVER_SNAP_EPSILON,
};
use crate::validation::data::validate_estimate;
use crate::validation::error::{Result, SolverError};

/// How many coordinates must settle before the iteration stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceMode {
    /// Stop as soon as one coordinate's relative change is below epsilon.
    /// Lenient; can stop early in 3D.
    #[default]
    AnyCoordinate,
    /// Every coordinate must be below epsilon
    AllCoordinates,
}

/// Lifecycle of a single solve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Initialized,
    Iterating,
    Converged,
    MaxIterationsExceeded,
    Inconsistent,
    Cancelled,
    TimedOut,
    /// The estimate stopped being finite
    Diverged,
}

impl SolverState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SolverState::Initialized | SolverState::Iterating)
    }
}

/// Everything a finished (or aborted) iteration left behind
#[derive(Debug, Clone, PartialEq)]
pub struct NewtonRaphsonRun {
    pub state: SolverState,
    /// Last finite estimate
    pub estimate: Vec<f64>,
    /// Completed iterations
    pub iterations: usize,
    /// Estimate after each completed iteration
    pub history: Vec<Vec<f64>>,
    pub elapsed: Duration,
}

/// Iterative multilateration solver.
///
/// Each iteration linearizes the squared-distance equations at the current
/// estimate, reduces `[J | -F]` (or its normal equations when there are more
/// beacons than axes) and adds the resulting step.
#[derive(Debug, Clone, PartialEq)]
pub struct NewtonRaphsonSolver {
    /// Maximum number of iterations before giving up
    pub max_iterations: usize,
    /// Relative per-coordinate change that counts as converged
    pub convergence_epsilon: f64,
    /// Snapping threshold for the step matrices
    pub snap_epsilon: f64,
    pub convergence_mode: ConvergenceMode,
    /// Wall-clock budget, checked once per iteration
    pub timeout: Option<Duration>,
}

impl Default for NewtonRaphsonSolver {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            convergence_epsilon: DEFAULT_CONVERGENCE_EPSILON,
            snap_epsilon: SOLVER_SNAP_EPSILON,
            convergence_mode: ConvergenceMode::AnyCoordinate,
            timeout: None,
        }
    }
}

impl NewtonRaphsonSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_convergence_epsilon(mut self, epsilon: f64) -> Self {
        self.convergence_epsilon = epsilon;
        self
    }

    pub fn with_snap_epsilon(mut self, epsilon: f64) -> Self {
        self.snap_epsilon = epsilon;
        self
    }

    pub fn with_convergence_mode(mut self, mode: ConvergenceMode) -> Self {
        self.convergence_mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Resolve `guess` into a concrete starting estimate for `model`
    pub fn seed(model: &LinearizationModel, guess: &InitialGuess) -> Result<Vec<f64>> {
        let seed = match guess {
            InitialGuess::Ones => vec![DEFAULT_SEED_VALUE; model.dimensionality().axes()],
            InitialGuess::Centroid => model.centroid(),
            InitialGuess::Explicit(values) => values.clone(),
        };
        validate_estimate(model.dimensionality(), &seed)?;
        Ok(seed)
    }

    /// Iterate from `seed` until a terminal state.
    ///
    /// Only an invalid seed is reported as an error; every other outcome is
    /// recorded in the returned run's `state`.
    #[instrument(skip_all, fields(beacons = model.len(), dims = %model.dimensionality()))]
    pub fn run(
        &self,
        model: &LinearizationModel,
        seed: Vec<f64>,
        cancel: Option<&CancelToken>,
    ) -> Result<NewtonRaphsonRun> {
        validate_estimate(model.dimensionality(), &seed)?;
        let started = Instant::now();
        let mut run = NewtonRaphsonRun {
            state: SolverState::Initialized,
            estimate: seed,
            iterations: 0,
            history: Vec::new(),
            elapsed: Duration::ZERO,
        };

        run.state = SolverState::Iterating;
        while run.state == SolverState::Iterating {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                run.state = SolverState::Cancelled;
                break;
            }
            if self.timeout.is_some_and(|limit| started.elapsed() >= limit) {
                run.state = SolverState::TimedOut;
                break;
            }
            if run.iterations >= self.max_iterations {
                run.state = SolverState::MaxIterationsExceeded;
                break;
            }

            let iteration = run.iterations + 1;
            let mut system = model.step_system(&run.estimate, self.snap_epsilon)?;
            if system.row_reduce() == RowReduction::Inconsistent {
                run.iterations = iteration;
                run.state = SolverState::Inconsistent;
                break;
            }

            let solution = system.solution();
            let step = solution.particular();
            let next: Vec<f64> = run.estimate.iter().zip(&step).map(|(e, d)| e + d).collect();
            run.iterations = iteration;
            if next.iter().any(|value| !value.is_finite()) {
                run.state = SolverState::Diverged;
                break;
            }

            debug!(iteration, estimate = ?next, step = ?step, "newton step");
            // a free variable's zero step says nothing about that coordinate
            let converged = solution.is_unique() && self.has_converged(&run.estimate, &next);
            run.history.push(next.clone());
            run.estimate = next;
            if converged {
                run.state = SolverState::Converged;
            }
        }

        run.elapsed = started.elapsed();
        match run.state {
            SolverState::Converged => {
                info!(iterations = run.iterations, estimate = ?run.estimate, "converged")
            }
            state => warn!(?state, iterations = run.iterations, "solve stopped without converging"),
        }
        Ok(run)
    }

    /// Per-coordinate relative change test; the absolute change stands in
    /// when the old coordinate is too close to zero to divide by.
    pub fn has_converged(&self, old: &[f64], new: &[f64]) -> bool {
        let mut changes = old.iter().zip(new).map(|(o, n)| {
            let delta = (o - n).abs();
            if o.abs() < NEAR_ZERO {
                delta
            } else {
                delta / o.abs()
            }
        });
        match self.convergence_mode {
            ConvergenceMode::AnyCoordinate => changes.any(|change| change < self.convergence_epsilon),
            ConvergenceMode::AllCoordinates => changes.all(|change| change < self.convergence_epsilon),
        }
    }

    /// Run from `guess` and turn the outcome into a position or an error
    pub fn solve(
        &self,
        model: &LinearizationModel,
        guess: &InitialGuess,
        cancel: Option<&CancelToken>,
    ) -> Result<PositionEstimate> {
        let seed = Self::seed(model, guess)?;
        let run = self.run(model, seed, cancel)?;
        match run.state {
            SolverState::Converged => Ok(PositionEstimate {
                residual_rms: model.residual_rms(&run.estimate)?,
                range_rms: model.range_rms(&run.estimate)?,
                coordinates: run.estimate,
                iterations: run.iterations,
                strategy: SolveStrategy::NewtonRaphson,
            }),
            SolverState::Inconsistent => Err(SolverError::Inconsistent {
                iteration: run.iterations,
            }),
            SolverState::Cancelled => Err(SolverError::Cancelled {
                iterations: run.iterations,
            }),
            SolverState::TimedOut => Err(SolverError::TimedOut {
                iterations: run.iterations,
                elapsed_ms: run.elapsed.as_millis() as u64,
            }),
            SolverState::Diverged => Err(SolverError::numerical(format!(
                "estimate left the finite range after {} iterations",
                run.iterations
            ))),
            SolverState::MaxIterationsExceeded | SolverState::Initialized | SolverState::Iterating => {
                Err(SolverError::MaxIterationsExceeded {
                    iterations: run.iterations,
                    last_estimate: run.estimate,
                })
            }
        }
    }
}
