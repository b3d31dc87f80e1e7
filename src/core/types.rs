//! Core data types for the multilateration solvers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Number of coordinates being solved for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Dimensionality {
    #[default]
    #[serde(rename = "2d")]
    Two,
    #[serde(rename = "3d")]
    Three,
}

impl Dimensionality {
    /// Length of a position vector in this space
    pub fn axes(self) -> usize {
        match self {
            Dimensionality::Two => 2,
            Dimensionality::Three => 3,
        }
    }

    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            2 => Some(Dimensionality::Two),
            3 => Some(Dimensionality::Three),
            _ => None,
        }
    }
}

impl fmt::Display for Dimensionality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}D", self.axes())
    }
}

/// Fixed reference point with a measured distance to the unknown position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beacon {
    position: Vec<f64>,
    distance: f64,
}

impl Beacon {
    pub fn new(position: Vec<f64>, distance: f64) -> Self {
        Self { position, distance }
    }

    /// Beacon in the plane
    pub fn planar(x: f64, y: f64, distance: f64) -> Self {
        Self::new(vec![x, y], distance)
    }

    pub fn spatial(x: f64, y: f64, z: f64, distance: f64) -> Self {
        Self::new(vec![x, y, z], distance)
    }

    pub fn position(&self) -> &[f64] {
        &self.position
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Coordinate `axis` of the beacon. Axes the beacon was not given are zero,
    /// so planar beacons sit at z = 0 in a 3D solve.
    pub fn coordinate(&self, axis: usize) -> f64 {
        self.position.get(axis).copied().unwrap_or(0.0)
    }

    /// Same beacon with a new distance reading
    pub fn with_distance(&self, distance: f64) -> Self {
        Self {
            position: self.position.clone(),
            distance,
        }
    }

    /// Euclidean distance from `point` to this beacon
    pub fn range_to(&self, point: &[f64]) -> f64 {
        point
            .iter()
            .enumerate()
            .map(|(axis, value)| (value - self.coordinate(axis)).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

/// Which position solver handles a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SolveStrategy {
    /// Gauss-Newton iteration over the row-reduction engine
    #[default]
    NewtonRaphson,
    /// Damped least squares from the `levenberg-marquardt` crate
    ExternalLeastSquares,
}

impl fmt::Display for SolveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStrategy::NewtonRaphson => write!(f, "Newton-Raphson"),
            SolveStrategy::ExternalLeastSquares => write!(f, "Levenberg-Marquardt"),
        }
    }
}

/// Starting point of an iterative solve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum InitialGuess {
    /// Every coordinate set to `DEFAULT_SEED_VALUE`
    #[default]
    Ones,
    /// Mean of the beacon positions
    Centroid,
    /// Caller-supplied coordinates, one per axis
    Explicit(Vec<f64>),
}

/// Final position produced by a solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEstimate {
    /// Solved coordinates, one per dimension
    pub coordinates: Vec<f64>,
    /// Iterations (or function evaluations for the external optimizer)
    pub iterations: usize,
    /// RMS of the squared-distance residuals at the solution
    pub residual_rms: f64,
    /// RMS difference between measured and solved ranges (distance units)
    pub range_rms: f64,
    pub strategy: SolveStrategy,
}

impl PositionEstimate {
    pub fn x(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn y(&self) -> f64 {
        self.coordinates[1]
    }

    /// Third coordinate, zero for planar solves
    pub fn z(&self) -> f64 {
        self.coordinates.get(2).copied().unwrap_or(0.0)
    }

    /// Euclidean distance to `point`
    pub fn distance_to(&self, point: &[f64]) -> f64 {
        self.coordinates
            .iter()
            .zip(point)
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

impl fmt::Display for PositionEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let coords: Vec<String> = self.coordinates.iter().map(|c| format!("{:.4}", c)).collect();
        write!(
            f,
            "({}) via {} after {} iterations, range RMS {:.4}",
            coords.join(", "),
            self.strategy,
            self.iterations,
            self.range_rms
        )
    }
}

/// Cooperative stop flag shared between a running solve and its owner.
///
/// The solver checks the flag once per iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_axes_are_zero() {
        let beacon = Beacon::planar(3.0, 4.0, 5.0);
        assert_eq!(beacon.coordinate(0), 3.0);
        assert_eq!(beacon.coordinate(2), 0.0);
        assert_eq!(beacon.range_to(&[0.0, 0.0, 0.0]), 5.0);
    }

    #[test]
    fn test_dimensionality_serde_names() {
        let json = serde_json::to_string(&Dimensionality::Three).unwrap();
        assert_eq!(json, "\"3d\"");
        let parsed: Dimensionality = serde_json::from_str("\"2d\"").unwrap();
        assert_eq!(parsed, Dimensionality::Two);
        assert_eq!(Dimensionality::from_len(4), None);
    }

    #[test]
    fn test_initial_guess_json_shape() {
        let explicit: InitialGuess = serde_json::from_str(r#"{"kind":"explicit","value":[2.0,3.0]}"#).unwrap();
        assert_eq!(explicit, InitialGuess::Explicit(vec![2.0, 3.0]));
        let centroid: InitialGuess = serde_json::from_str(r#"{"kind":"centroid"}"#).unwrap();
        assert_eq!(centroid, InitialGuess::Centroid);
    }

    #[test]
    fn test_cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }
}
