//! Strategy selection and the public solve entry points

use std::time::Duration;

use crate::algorithms::least_squares::LeastSquaresAdapter;
use crate::algorithms::linearization::LinearizationModel;
use crate::algorithms::newton_raphson::NewtonRaphsonSolver;
use crate::core::{CancelToken, InitialGuess, PositionEstimate, SolveStrategy};
use crate::utils::config::SolveOptions;
use crate::validation::data::validate_measurements;
use crate::validation::error::Result;

/// A way of turning a beacon model into a position
pub trait PositionSolver: Send + Sync {
    fn strategy(&self) -> SolveStrategy;

    fn solve(
        &self,
        model: &LinearizationModel,
        initial_guess: &InitialGuess,
        cancel: Option<&CancelToken>,
    ) -> Result<PositionEstimate>;
}

impl PositionSolver for NewtonRaphsonSolver {
    fn strategy(&self) -> SolveStrategy {
        SolveStrategy::NewtonRaphson
    }

    fn solve(
        &self,
        model: &LinearizationModel,
        initial_guess: &InitialGuess,
        cancel: Option<&CancelToken>,
    ) -> Result<PositionEstimate> {
        NewtonRaphsonSolver::solve(self, model, initial_guess, cancel)
    }
}

impl PositionSolver for LeastSquaresAdapter {
    fn strategy(&self) -> SolveStrategy {
        SolveStrategy::ExternalLeastSquares
    }

    fn solve(
        &self,
        model: &LinearizationModel,
        initial_guess: &InitialGuess,
        cancel: Option<&CancelToken>,
    ) -> Result<PositionEstimate> {
        LeastSquaresAdapter::solve(self, model, initial_guess, cancel)
    }
}

impl NewtonRaphsonSolver {
    pub fn from_options(options: &SolveOptions) -> Self {
        let solver = NewtonRaphsonSolver::new()
            .with_max_iterations(options.max_iterations)
            .with_convergence_epsilon(options.convergence_epsilon)
            .with_snap_epsilon(options.snap_epsilon)
            .with_convergence_mode(options.convergence_mode);
        match options.timeout_ms {
            Some(ms) => solver.with_timeout(Duration::from_millis(ms)),
            None => solver,
        }
    }
}

impl LeastSquaresAdapter {
    /// `max_iterations` becomes the optimizer's patience
    pub fn from_options(options: &SolveOptions) -> Self {
        let adapter = LeastSquaresAdapter::new().with_patience(options.max_iterations);
        match options.timeout_ms {
            Some(ms) => adapter.with_timeout(Duration::from_millis(ms)),
            None => adapter,
        }
    }
}

/// Solver implementing `options.strategy`
pub fn solver_for(options: &SolveOptions) -> Box<dyn PositionSolver> {
    match options.strategy {
        SolveStrategy::NewtonRaphson => Box::new(NewtonRaphsonSolver::from_options(options)),
        SolveStrategy::ExternalLeastSquares => Box::new(LeastSquaresAdapter::from_options(options)),
    }
}

/// Locate the point whose distances to `positions` are `distances`.
///
/// `positions[i]` may have fewer coordinates than `options.dimensionality`;
/// the missing ones are zero.
pub fn solve(positions: &[Vec<f64>], distances: &[f64], options: &SolveOptions) -> Result<PositionEstimate> {
    solve_inner(positions, distances, options, None)
}

/// [`solve`] with a cooperative stop flag
pub fn solve_with_cancel(
    positions: &[Vec<f64>],
    distances: &[f64],
    options: &SolveOptions,
    cancel: &CancelToken,
) -> Result<PositionEstimate> {
    solve_inner(positions, distances, options, Some(cancel))
}

fn solve_inner(
    positions: &[Vec<f64>],
    distances: &[f64],
    options: &SolveOptions,
    cancel: Option<&CancelToken>,
) -> Result<PositionEstimate> {
    options.validate()?;
    validate_measurements(options.dimensionality, positions, distances)?;
    let model = LinearizationModel::new(options.dimensionality, positions, distances)?;
    solver_for(options).solve(&model, &options.initial_guess, cancel)
}

/// Beacon layout built once and solved for each new set of readings
pub struct Multilateration {
    model: LinearizationModel,
    options: SolveOptions,
    solver: Box<dyn PositionSolver>,
}

impl Multilateration {
    /// Fixed beacon positions; every distance starts at zero
    pub fn new(positions: &[Vec<f64>], options: SolveOptions) -> Result<Self> {
        let distances = vec![0.0; positions.len()];
        Self::with_distances(positions, &distances, options)
    }

    pub fn with_distances(positions: &[Vec<f64>], distances: &[f64], options: SolveOptions) -> Result<Self> {
        options.validate()?;
        let model = LinearizationModel::new(options.dimensionality, positions, distances)?;
        let solver = solver_for(&options);
        Ok(Self { model, options, solver })
    }

    pub fn options(&self) -> &SolveOptions {
        &self.options
    }

    pub fn model(&self) -> &LinearizationModel {
        &self.model
    }

    /// New measurement round for the same beacons
    pub fn set_distances(&mut self, distances: &[f64]) -> Result<()> {
        self.model.set_distances(distances)
    }

    pub fn solve(&self) -> Result<PositionEstimate> {
        self.solver.solve(&self.model, &self.options.initial_guess, None)
    }

    pub fn solve_with_cancel(&self, cancel: &CancelToken) -> Result<PositionEstimate> {
        self.solver.solve(&self.model, &self.options.initial_guess, Some(cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::newton_raphson::ConvergenceMode;
    use crate::core::Dimensionality;
    use crate::validation::error::SolverError;

    fn triangle() -> Vec<Vec<f64>> {
        vec![vec![0.0, 0.0], vec![10.0, 0.0], vec![0.0, 10.0]]
    }

    fn ranges(positions: &[Vec<f64>], truth: &[f64]) -> Vec<f64> {
        positions
            .iter()
            .map(|p| p.iter().zip(truth).map(|(a, b)| (a - b).powi(2)).sum::<f64>().sqrt())
            .collect()
    }

    #[test]
    fn test_default_options_solve() {
        let positions = triangle();
        let estimate = solve(&positions, &ranges(&positions, &[3.0, 4.0]), &SolveOptions::default()).unwrap();
        assert!(estimate.distance_to(&[3.0, 4.0]) < 1e-3);
        assert_eq!(estimate.strategy, SolveStrategy::NewtonRaphson);
    }

    #[test]
    fn test_strategies_agree() {
        let positions = vec![
            vec![0.0, 0.0],
            vec![10.0, 0.0],
            vec![0.0, 10.0],
            vec![10.0, 10.0],
        ];
        let distances = ranges(&positions, &[7.0, 2.0]);
        let newton = SolveOptions {
            convergence_mode: ConvergenceMode::AllCoordinates,
            ..SolveOptions::default()
        };
        let external = SolveOptions {
            strategy: SolveStrategy::ExternalLeastSquares,
            ..SolveOptions::default()
        };
        let a = solve(&positions, &distances, &newton).unwrap();
        let b = solve(&positions, &distances, &external).unwrap();
        assert!(a.distance_to(&b.coordinates) < 1e-2);
        assert_eq!(solver_for(&external).strategy(), SolveStrategy::ExternalLeastSquares);
    }

    #[test]
    fn test_degenerate_inputs() {
        let options = SolveOptions::default();
        let err = solve(&[], &[], &options).unwrap_err();
        assert!(matches!(err, SolverError::InvalidInput { .. }));

        let err = solve(&triangle(), &[1.0, 2.0], &options).unwrap_err();
        assert!(matches!(err, SolverError::InvalidInput { .. }));

        let err = solve(&[vec![0.0, 0.0, 0.0]], &[1.0], &options).unwrap_err();
        assert!(matches!(err, SolverError::InvalidInput { .. }));

        let bad = SolveOptions {
            max_iterations: 0,
            ..SolveOptions::default()
        };
        let err = solve(&triangle(), &[1.0, 2.0, 3.0], &bad).unwrap_err();
        assert!(matches!(err, SolverError::InvalidInput { .. }));
    }

    #[test]
    fn test_external_strategy_honours_options() {
        let options = SolveOptions {
            strategy: SolveStrategy::ExternalLeastSquares,
            max_iterations: 7,
            timeout_ms: Some(250),
            ..SolveOptions::default()
        };
        let adapter = LeastSquaresAdapter::from_options(&options);
        assert_eq!(adapter.patience, 7);
        assert_eq!(adapter.timeout, Some(Duration::from_millis(250)));

        let positions = triangle();
        let expired = SolveOptions {
            max_iterations: 1,
            timeout_ms: Some(0),
            ..options
        };
        let err = solve(&positions, &ranges(&positions, &[3.0, 4.0]), &expired).unwrap_err();
        assert!(matches!(err, SolverError::TimedOut { iterations: 0, .. }));
    }

    #[test]
    fn test_cancelled_solve() {
        let positions = triangle();
        let token = CancelToken::new();
        token.cancel();
        let err = solve_with_cancel(&positions, &ranges(&positions, &[3.0, 4.0]), &SolveOptions::default(), &token)
            .unwrap_err();
        assert_eq!(err, SolverError::Cancelled { iterations: 0 });
    }

    #[test]
    fn test_reusable_handle() {
        let positions = triangle();
        let options = SolveOptions {
            convergence_mode: ConvergenceMode::AllCoordinates,
            ..SolveOptions::default()
        };
        let mut handle = Multilateration::new(&positions, options).unwrap();
        for truth in [[3.0, 4.0], [6.0, 1.5], [2.0, 8.0]] {
            handle.set_distances(&ranges(&positions, &truth)).unwrap();
            let estimate = handle.solve().unwrap();
            assert!(estimate.distance_to(&truth) < 1e-3);
        }
        assert!(handle.set_distances(&[1.0]).is_err());
    }

    #[test]
    fn test_three_dimensional_options() {
        let positions = vec![
            vec![0.0, 0.0, 0.0],
            vec![10.0, 0.0, 0.0],
            vec![0.0, 10.0, 0.0],
            vec![0.0, 0.0, 10.0],
        ];
        let options = SolveOptions {
            dimensionality: Dimensionality::Three,
            convergence_mode: ConvergenceMode::AllCoordinates,
            ..SolveOptions::default()
        };
        let estimate = solve(&positions, &ranges(&positions, &[2.0, 3.0, 4.0]), &options).unwrap();
        assert!(estimate.distance_to(&[2.0, 3.0, 4.0]) < 1e-3);
        assert!((estimate.z() - 4.0).abs() < 1e-3);
    }
}
