//! Linear approximation of the multilateration equations
//!
//! For beacon `i` at `bᵢ` with measured distance `dᵢ` and an estimate `e`, the
//! residual is `F[i] = ||e - bᵢ||² - dᵢ²` and row `i` of the Jacobian is
//! `2·(e - bᵢ)`. The squared form needs no square root and keeps the Jacobian
//! linear in `e`.

use nalgebra::{DMatrix, DVector};

use crate::algorithms::augmented_matrix::AugmentedMatrix;
use crate::core::{Beacon, Dimensionality};
use crate::validation::data::{check_distance_count, validate_beacons, validate_distances, validate_estimate};
use crate::validation::error::{Result, SolverError};

/// Residual vector and Jacobian evaluated at one estimate
#[derive(Debug, Clone, PartialEq)]
pub struct Linearization {
    pub residuals: DVector<f64>,
    pub jacobian: DMatrix<f64>,
}

/// Beacon set plus the solve dimension; produces residuals and Jacobians
#[derive(Debug, Clone, PartialEq)]
pub struct LinearizationModel {
    dimensionality: Dimensionality,
    beacons: Vec<Beacon>,
}

impl LinearizationModel {
    /// Build from parallel position and distance arrays
    pub fn new(dimensionality: Dimensionality, positions: &[Vec<f64>], distances: &[f64]) -> Result<Self> {
        check_distance_count(positions.len(), distances.len())?;
        let beacons = positions
            .iter()
            .zip(distances)
            .map(|(position, distance)| Beacon::new(position.clone(), *distance))
            .collect();
        Self::from_beacons(dimensionality, beacons)
    }

    pub fn from_beacons(dimensionality: Dimensionality, beacons: Vec<Beacon>) -> Result<Self> {
        validate_beacons(dimensionality, &beacons)?;
        Ok(Self { dimensionality, beacons })
    }

    /// Replace every distance reading, keeping the beacon positions
    pub fn set_distances(&mut self, distances: &[f64]) -> Result<()> {
        check_distance_count(self.beacons.len(), distances.len())?;
        validate_distances(distances)?;
        self.beacons = self
            .beacons
            .iter()
            .zip(distances)
            .map(|(beacon, distance)| beacon.with_distance(*distance))
            .collect();
        Ok(())
    }

    pub fn dimensionality(&self) -> Dimensionality {
        self.dimensionality
    }

    pub fn beacons(&self) -> &[Beacon] {
        &self.beacons
    }

    /// Number of equations
    pub fn len(&self) -> usize {
        self.beacons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beacons.is_empty()
    }

    /// More equations than unknowns
    pub fn is_over_determined(&self) -> bool {
        self.beacons.len() > self.dimensionality.axes()
    }

    pub fn residuals(&self, estimate: &[f64]) -> Result<DVector<f64>> {
        validate_estimate(self.dimensionality, estimate)?;
        Ok(DVector::from_iterator(
            self.beacons.len(),
            self.beacons.iter().map(|beacon| self.residual(beacon, estimate)),
        ))
    }

    /// `n x d` matrix of partial derivatives
    pub fn jacobian(&self, estimate: &[f64]) -> Result<DMatrix<f64>> {
        validate_estimate(self.dimensionality, estimate)?;
        let axes = self.dimensionality.axes();
        Ok(DMatrix::from_fn(self.beacons.len(), axes, |row, axis| {
            2.0 * (estimate[axis] - self.beacons[row].coordinate(axis))
        }))
    }

    /// Residuals and Jacobian at `estimate`; fails once either overflows
    pub fn linearize(&self, estimate: &[f64]) -> Result<Linearization> {
        let linearization = Linearization {
            residuals: self.residuals(estimate)?,
            jacobian: self.jacobian(estimate)?,
        };
        ensure_finite(linearization.residuals.iter().chain(linearization.jacobian.iter()), estimate)?;
        Ok(linearization)
    }

    /// `[J | -F]`, one row per beacon
    pub fn augmented_jacobian(&self, estimate: &[f64], snap_epsilon: f64) -> Result<AugmentedMatrix> {
        let Linearization { residuals, jacobian } = self.linearize(estimate)?;
        let axes = self.dimensionality.axes();
        let mut matrix = AugmentedMatrix::with_snap_epsilon(self.beacons.len(), axes + 1, snap_epsilon);
        for row in 0..self.beacons.len() {
            for axis in 0..axes {
                matrix.set(row, axis, jacobian[(row, axis)])?;
            }
            matrix.set(row, axes, -residuals[row])?;
        }
        Ok(matrix)
    }

    /// `[JᵀJ | -JᵀF]`, the least-squares form of `J·Δ = -F`
    pub fn normal_equations(&self, estimate: &[f64], snap_epsilon: f64) -> Result<AugmentedMatrix> {
        let Linearization { residuals, jacobian } = self.linearize(estimate)?;
        let gram = jacobian.tr_mul(&jacobian);
        let rhs = -jacobian.tr_mul(&residuals);
        ensure_finite(gram.iter().chain(rhs.iter()), estimate)?;
        let axes = self.dimensionality.axes();
        let mut matrix = AugmentedMatrix::with_snap_epsilon(axes, axes + 1, snap_epsilon);
        for row in 0..axes {
            for col in 0..axes {
                matrix.set(row, col, gram[(row, col)])?;
            }
            matrix.set(row, axes, rhs[row])?;
        }
        Ok(matrix)
    }

    /// The system handed to the elimination engine for one step: the normal
    /// equations when over-determined, the augmented Jacobian otherwise.
    pub fn step_system(&self, estimate: &[f64], snap_epsilon: f64) -> Result<AugmentedMatrix> {
        if self.is_over_determined() {
            self.normal_equations(estimate, snap_epsilon)
        } else {
            self.augmented_jacobian(estimate, snap_epsilon)
        }
    }

    /// Mean beacon position
    pub fn centroid(&self) -> Vec<f64> {
        let count = self.beacons.len().max(1) as f64;
        (0..self.dimensionality.axes())
            .map(|axis| self.beacons.iter().map(|b| b.coordinate(axis)).sum::<f64>() / count)
            .collect()
    }

    /// RMS of the squared-distance residuals
    pub fn residual_rms(&self, estimate: &[f64]) -> Result<f64> {
        let residuals = self.residuals(estimate)?;
        Ok((residuals.norm_squared() / self.beacons.len() as f64).sqrt())
    }

    /// RMS difference between measured and implied ranges
    pub fn range_rms(&self, estimate: &[f64]) -> Result<f64> {
        validate_estimate(self.dimensionality, estimate)?;
        let sum: f64 = self
            .beacons
            .iter()
            .map(|beacon| (beacon.range_to(estimate) - beacon.distance()).powi(2))
            .sum();
        Ok((sum / self.beacons.len() as f64).sqrt())
    }

    fn residual(&self, beacon: &Beacon, estimate: &[f64]) -> f64 {
        let squared_range: f64 = estimate
            .iter()
            .enumerate()
            .map(|(axis, value)| (value - beacon.coordinate(axis)).powi(2))
            .sum();
        squared_range - beacon.distance().powi(2)
    }
}

fn ensure_finite<'a>(mut values: impl Iterator<Item = &'a f64>, estimate: &[f64]) -> Result<()> {
    if values.any(|value| !value.is_finite()) {
        return Err(SolverError::numerical(format!(
            "linearization overflowed at {:?}",
            estimate
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::augmented_matrix::RowReduction;
    use crate::validation::error::SolverError;
    use approx::assert_relative_eq;

    fn triangle() -> LinearizationModel {
        let positions = vec![vec![0.0, 0.0], vec![10.0, 0.0], vec![0.0, 10.0]];
        let truth = [3.0f64, 4.0];
        let distances: Vec<f64> = positions
            .iter()
            .map(|p| ((p[0] - truth[0]).powi(2) + (p[1] - truth[1]).powi(2)).sqrt())
            .collect();
        LinearizationModel::new(Dimensionality::Two, &positions, &distances).unwrap()
    }

    #[test]
    fn test_residuals_and_jacobian() {
        let model = triangle();
        let estimate = [1.0, 1.0];
        let residuals = model.residuals(&estimate).unwrap();
        // ||(1,1)-(0,0)||² - 25
        assert_relative_eq!(residuals[0], 2.0 - 25.0, epsilon = 1e-9);
        // ||(1,1)-(10,0)||² - 65
        assert_relative_eq!(residuals[1], 82.0 - 65.0, epsilon = 1e-9);

        let jacobian = model.jacobian(&estimate).unwrap();
        assert_eq!(jacobian.shape(), (3, 2));
        assert_eq!(jacobian[(1, 0)], -18.0);
        assert_eq!(jacobian[(1, 1)], 2.0);
        assert_eq!(jacobian[(2, 1)], -18.0);
    }

    #[test]
    fn test_residuals_vanish_at_truth() {
        let model = triangle();
        let residuals = model.residuals(&[3.0, 4.0]).unwrap();
        assert!(residuals.iter().all(|r| r.abs() < 1e-9));
        assert!(model.range_rms(&[3.0, 4.0]).unwrap() < 1e-9);
    }

    #[test]
    fn test_augmented_jacobian_layout() {
        let model = triangle();
        let matrix = model.augmented_jacobian(&[1.0, 1.0], 0.0).unwrap();
        assert_eq!((matrix.rows(), matrix.cols()), (3, 3));
        assert_eq!(matrix.row(0).unwrap(), &[2.0, 2.0, 23.0]);
    }

    #[test]
    fn test_normal_equations_step_reduces_error() {
        let model = triangle();
        let estimate = [2.5, 3.5];
        let mut system = model.step_system(&estimate, 1e-12).unwrap();
        assert_eq!((system.rows(), system.cols()), (2, 3));
        assert_eq!(system.row_reduce(), RowReduction::Solved);
        let step = system.solution().particular();
        let next = [estimate[0] + step[0], estimate[1] + step[1]];
        let before = ((estimate[0] - 3.0f64).powi(2) + (estimate[1] - 4.0f64).powi(2)).sqrt();
        let after = ((next[0] - 3.0f64).powi(2) + (next[1] - 4.0f64).powi(2)).sqrt();
        assert!(after < before / 10.0);
    }

    #[test]
    fn test_overflowing_estimate_is_numerical_failure() {
        let model = triangle();
        let err = model.step_system(&[1e200, 1e200], 1e-9).unwrap_err();
        assert!(matches!(err, SolverError::NumericalInstability { .. }));
        // residuals and Jacobian stay finite here but JᵀF does not
        assert!(model.linearize(&[1e120, 1e120]).is_ok());
        let err = model.normal_equations(&[1e120, 1e120], 1e-9).unwrap_err();
        assert!(matches!(err, SolverError::NumericalInstability { .. }));
    }

    #[test]
    fn test_planar_beacons_in_space() {
        let positions = vec![vec![0.0, 0.0], vec![4.0, 0.0, 3.0]];
        let model = LinearizationModel::new(Dimensionality::Three, &positions, &[1.0, 1.0]).unwrap();
        let jacobian = model.jacobian(&[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(jacobian[(0, 2)], 2.0);
        assert_eq!(jacobian[(1, 2)], -4.0);
        assert_eq!(model.centroid(), vec![2.0, 0.0, 1.5]);
    }

    #[test]
    fn test_set_distances() {
        let mut model = triangle();
        model.set_distances(&[1.0, 2.0, 3.0]).unwrap();
        let distances: Vec<f64> = model.beacons().iter().map(Beacon::distance).collect();
        assert_eq!(distances, vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            model.set_distances(&[1.0]),
            Err(SolverError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_invalid_construction() {
        assert!(matches!(
            LinearizationModel::new(Dimensionality::Two, &[], &[]),
            Err(SolverError::InvalidInput { .. })
        ));
        let positions = vec![vec![0.0, 0.0]];
        assert!(matches!(
            LinearizationModel::new(Dimensionality::Two, &positions, &[1.0, 2.0]),
            Err(SolverError::InvalidInput { .. })
        ));
        assert!(matches!(
            triangle().residuals(&[1.0, 2.0, 3.0]),
            Err(SolverError::InvalidInput { .. })
        ));
    }
}
