//! The linearization model handed to the `levenberg-marquardt` crate

use std::time::{Duration, Instant};

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use tracing::{info, instrument, warn};

use crate::algorithms::linearization::LinearizationModel;
use crate::core::{CancelToken, InitialGuess, PositionEstimate, SolveStrategy};
use crate::validation::data::validate_estimate;
use crate::validation::error::{Result, SolverError};

/// Residual/Jacobian pair at the optimizer's current parameters
pub struct MultilaterationProblem<'a> {
    model: &'a LinearizationModel,
    params: DVector<f64>,
}

impl<'a> MultilaterationProblem<'a> {
    pub fn new(model: &'a LinearizationModel, seed: &[f64]) -> Self {
        Self {
            model,
            params: DVector::from_column_slice(seed),
        }
    }

    pub fn estimate(&self) -> Vec<f64> {
        self.params.iter().copied().collect()
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for MultilaterationProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, params: &DVector<f64>) {
        self.params.copy_from(params);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.model.residuals(self.params.as_slice()).ok()
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        self.model.jacobian(self.params.as_slice()).ok()
    }
}

/// Levenberg-Marquardt over the squared-distance residuals
#[derive(Debug, Clone, PartialEq)]
pub struct LeastSquaresAdapter {
    /// Evaluation budget, in multiples of (parameters + 1)
    pub patience: usize,
    /// Relative tolerance for both the objective and the parameters
    pub tolerance: f64,
    /// Checked once, before the optimizer starts
    pub timeout: Option<Duration>,
}

impl Default for LeastSquaresAdapter {
    fn default() -> Self {
        Self {
            patience: 100,
            tolerance: 1e-12,
            timeout: None,
        }
    }
}

impl LeastSquaresAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Seeds from the beacon centroid unless the caller gives explicit
    /// coordinates. Cancellation and the timeout are only observed before the
    /// optimizer starts.
    #[instrument(skip_all, fields(beacons = model.len(), dims = %model.dimensionality()))]
    pub fn solve(
        &self,
        model: &LinearizationModel,
        guess: &InitialGuess,
        cancel: Option<&CancelToken>,
    ) -> Result<PositionEstimate> {
        let started = Instant::now();
        let axes = model.dimensionality().axes();
        if model.len() < axes {
            return Err(SolverError::invalid_input(format!(
                "least squares needs at least {} beacons for a {} solve, got {}",
                axes,
                model.dimensionality(),
                model.len()
            )));
        }
        let seed = match guess {
            InitialGuess::Explicit(values) => values.clone(),
            InitialGuess::Ones | InitialGuess::Centroid => model.centroid(),
        };
        validate_estimate(model.dimensionality(), &seed)?;
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(SolverError::Cancelled { iterations: 0 });
        }
        if self.timeout.is_some_and(|limit| started.elapsed() >= limit) {
            return Err(SolverError::TimedOut {
                iterations: 0,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
        }

        let (problem, report) = LevenbergMarquardt::new()
            .with_patience(self.patience)
            .with_ftol(self.tolerance)
            .with_xtol(self.tolerance)
            .minimize(MultilaterationProblem::new(model, &seed));

        if !report.termination.was_successful() {
            warn!(termination = ?report.termination, "optimizer gave up");
            return Err(SolverError::OptimizerFailure {
                reason: format!("{:?}", report.termination),
            });
        }

        let coordinates = problem.estimate();
        if coordinates.iter().any(|value| !value.is_finite()) {
            return Err(SolverError::numerical("optimizer returned a non-finite estimate"));
        }
        info!(
            evaluations = report.number_of_evaluations,
            objective = report.objective_function,
            estimate = ?coordinates,
            "optimizer converged"
        );
        Ok(PositionEstimate {
            residual_rms: model.residual_rms(&coordinates)?,
            range_rms: model.range_rms(&coordinates)?,
            coordinates,
            iterations: report.number_of_evaluations,
            strategy: SolveStrategy::ExternalLeastSquares,
        })
    }
}
