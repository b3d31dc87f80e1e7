use rand::prelude::*;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::algorithms::solver::Multilateration;
use crate::core::SolveStrategy;
use crate::utils::config::SolveOptions;
use crate::validation::error::{Result, SolverError};

/// Perturbation applied to each simulated distance reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum DistanceNoise {
    #[default]
    None,
    /// Multiply by a uniform factor in `[1 - p, 1 + p)`
    Proportional(f64),
    /// Add zero-mean Gaussian noise with this standard deviation
    Gaussian(f64),
}

/// Monte Carlo accuracy check for the position solvers
#[derive(Debug, Clone)]
pub struct AccuracyValidator {
    /// Fixed beacon layout
    pub beacons: Vec<Vec<f64>>,
    /// True points are drawn from `[-h, h)` on every axis
    pub area_half_width: f64,
    /// Number of random positions per strategy
    pub trials: usize,
    /// Position error that still counts as a success
    pub tolerance: f64,
    pub noise: DistanceNoise,
    /// RNG seed, so runs are reproducible
    pub seed: u64,
    pub options: SolveOptions,
}

/// Accuracy statistics over one validation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyStatistics {
    pub strategy: SolveStrategy,
    pub noise: DistanceNoise,
    /// Trials attempted
    pub trials: usize,
    /// Trials where the solver returned an error
    pub solver_failures: usize,
    /// Solved trials within `tolerance` of the true point
    pub within_tolerance: usize,
    pub tolerance: f64,
    /// Mean position error (distance units)
    pub mean_error: f64,
    /// Standard deviation of position error
    pub std_dev_error: f64,
    /// Root Mean Square Error (RMSE)
    pub rmse: f64,
    /// 95% confidence error
    pub error_95_percentile: f64,
    pub max_error: f64,
    pub min_error: f64,
    /// Number of solved trials in the statistics
    pub sample_count: usize,
}

impl AccuracyStatistics {
    /// Fraction of all trials that solved within tolerance
    pub fn success_rate(&self) -> f64 {
        if self.trials == 0 {
            return 0.0;
        }
        self.within_tolerance as f64 / self.trials as f64
    }

    fn from_errors(
        strategy: SolveStrategy,
        noise: DistanceNoise,
        tolerance: f64,
        trials: usize,
        mut errors: Vec<f64>,
    ) -> Self {
        let n = errors.len();
        let solver_failures = trials - n;
        let within_tolerance = errors.iter().filter(|e| **e <= tolerance).count();
        if n == 0 {
            return Self {
                strategy,
                noise,
                trials,
                solver_failures,
                within_tolerance,
                tolerance,
                mean_error: 0.0,
                std_dev_error: 0.0,
                rmse: 0.0,
                error_95_percentile: 0.0,
                max_error: 0.0,
                min_error: 0.0,
                sample_count: 0,
            };
        }

        let mean_error = errors.iter().sum::<f64>() / n as f64;
        let rmse = (errors.iter().map(|e| e.powi(2)).sum::<f64>() / n as f64).sqrt();
        let variance = errors.iter().map(|e| (e - mean_error).powi(2)).sum::<f64>() / n as f64;

        errors.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let index_95 = ((n as f64 * 0.95).ceil() as usize).saturating_sub(1);
        let error_95_percentile = errors.get(index_95.min(n - 1)).copied().unwrap_or(0.0);

        Self {
            strategy,
            noise,
            trials,
            solver_failures,
            within_tolerance,
            tolerance,
            mean_error,
            std_dev_error: variance.sqrt(),
            rmse,
            error_95_percentile,
            max_error: errors.last().copied().unwrap_or(0.0),
            min_error: errors.first().copied().unwrap_or(0.0),
            sample_count: n,
        }
    }
}

impl Default for AccuracyValidator {
    fn default() -> Self {
        let half = 5.0 / 2.0;
        Self {
            beacons: vec![vec![half, half], vec![-half, half], vec![half, -half]],
            area_half_width: 5.0,
            trials: 1000,
            tolerance: 0.1,
            noise: DistanceNoise::None,
            seed: 42,
            options: SolveOptions::default(),
        }
    }
}

impl AccuracyValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    pub fn with_noise(mut self, noise: DistanceNoise) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_beacons(mut self, beacons: Vec<Vec<f64>>) -> Self {
        self.beacons = beacons;
        self
    }

    pub fn with_options(mut self, options: SolveOptions) -> Self {
        self.options = options;
        self
    }

    /// Solve `trials` random positions with `strategy`
    pub fn run(&self, strategy: SolveStrategy) -> Result<AccuracyStatistics> {
        if self.trials == 0 {
            return Err(SolverError::invalid_input("accuracy validation needs at least one trial"));
        }
        if !self.area_half_width.is_finite() || self.area_half_width <= 0.0 {
            return Err(SolverError::invalid_input(format!(
                "area half width {} must be finite and positive",
                self.area_half_width
            )));
        }
        let gaussian = match self.noise {
            DistanceNoise::Gaussian(sigma) if !sigma.is_finite() || sigma < 0.0 => {
                return Err(SolverError::invalid_input(format!(
                    "gaussian noise sigma {} must be finite and non-negative",
                    sigma
                )))
            }
            DistanceNoise::Gaussian(sigma) => Some(Normal::new(0.0, sigma).map_err(|e| {
                SolverError::invalid_input(format!("gaussian noise sigma {}: {}", sigma, e))
            })?),
            DistanceNoise::Proportional(p) if !p.is_finite() || !(0.0..1.0).contains(&p) => {
                return Err(SolverError::invalid_input(format!(
                    "proportional noise {} must be in [0, 1)",
                    p
                )))
            }
            _ => None,
        };

        let options = SolveOptions {
            strategy,
            ..self.options.clone()
        };
        let axes = options.dimensionality.axes();
        let mut handle = Multilateration::new(&self.beacons, options)?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut errors = Vec::with_capacity(self.trials);

        for trial in 0..self.trials {
            let truth: Vec<f64> = (0..axes)
                .map(|_| rng.gen_range(-self.area_half_width..self.area_half_width))
                .collect();
            let distances: Vec<f64> = handle
                .model()
                .beacons()
                .iter()
                .map(|beacon| {
                    let range = beacon.range_to(&truth);
                    let noisy = match (self.noise, &gaussian) {
                        (DistanceNoise::Proportional(p), _) if p > 0.0 => range * rng.gen_range(1.0 - p..1.0 + p),
                        (DistanceNoise::Gaussian(_), Some(normal)) => range + normal.sample(&mut rng),
                        _ => range,
                    };
                    noisy.max(0.0)
                })
                .collect();
            handle.set_distances(&distances)?;

            match handle.solve() {
                Ok(estimate) => errors.push(estimate.distance_to(&truth)),
                Err(e) => debug!(trial, error = %e, "trial failed"),
            }
        }

        let statistics = AccuracyStatistics::from_errors(strategy, self.noise, self.tolerance, self.trials, errors);
        info!(
            %strategy,
            success_rate = statistics.success_rate(),
            rmse = statistics.rmse,
            failures = statistics.solver_failures,
            "accuracy validation finished"
        );
        Ok(statistics)
    }

    /// Same trials for each strategy
    pub fn run_all_strategies(&self) -> Result<Vec<AccuracyStatistics>> {
        [SolveStrategy::NewtonRaphson, SolveStrategy::ExternalLeastSquares]
            .into_iter()
            .map(|strategy| self.run(strategy))
            .collect()
    }

    pub fn generate_report(&self, results: &[AccuracyStatistics]) -> String {
        let mut report = String::new();

        report.push_str("=== MULTILATERATION ACCURACY REPORT ===\n\n");
        report.push_str(&format!("Beacons: {}\n", self.beacons.len()));
        report.push_str(&format!("Area: +/-{:.2} on each axis\n", self.area_half_width));
        report.push_str(&format!("Tolerance: {:.3}\n", self.tolerance));
        report.push_str(&format!("Noise: {:?}\n\n", self.noise));

        for stats in results {
            report.push_str(&format!("{}:\n", stats.strategy));
            report.push_str(&format!(
                "  Success Rate: {:.2}% ({} of {})\n",
                stats.success_rate() * 100.0,
                stats.within_tolerance,
                stats.trials
            ));
            report.push_str(&format!("  Solver Failures: {}\n", stats.solver_failures));
            report.push_str(&format!("  Mean Error: {:.4}\n", stats.mean_error));
            report.push_str(&format!("  RMSE: {:.4}\n", stats.rmse));
            report.push_str(&format!("  95% Error: {:.4}\n", stats.error_95_percentile));
            report.push_str(&format!("  Max Error: {:.4}\n\n", stats.max_error));
        }

        report
    }
}
