use crate::core::{Beacon, Dimensionality};
use crate::validation::error::{Result, SolverError};

/// Check a beacon set before any computation.
///
/// Rejects empty sets, beacons without coordinates, beacons with more
/// coordinates than the solve dimension, non-finite coordinates and distances
/// that are negative or non-finite. Beacons with fewer coordinates than the
/// solve dimension are accepted; the missing axes are zero.
pub fn validate_beacons(dimensionality: Dimensionality, beacons: &[Beacon]) -> Result<()> {
    if beacons.is_empty() {
        return Err(SolverError::invalid_input("no beacons supplied"));
    }
    for (index, beacon) in beacons.iter().enumerate() {
        validate_position(dimensionality, index, beacon.position())?;
        validate_distance(index, beacon.distance())?;
    }
    Ok(())
}

/// Check parallel position and distance arrays
pub fn validate_measurements(
    dimensionality: Dimensionality,
    positions: &[Vec<f64>],
    distances: &[f64],
) -> Result<()> {
    if positions.is_empty() {
        return Err(SolverError::invalid_input("no beacons supplied"));
    }
    check_distance_count(positions.len(), distances.len())?;
    for (index, position) in positions.iter().enumerate() {
        validate_position(dimensionality, index, position)?;
    }
    validate_distances(distances)
}

/// Every distance must be finite and non-negative
pub fn validate_distances(distances: &[f64]) -> Result<()> {
    distances
        .iter()
        .enumerate()
        .try_for_each(|(index, distance)| validate_distance(index, *distance))
}

pub fn check_distance_count(beacons: usize, distances: usize) -> Result<()> {
    if beacons != distances {
        return Err(SolverError::invalid_input(format!(
            "{} distances supplied for {} beacons",
            distances, beacons
        )));
    }
    Ok(())
}

/// An estimate or seed must have one finite value per axis
pub fn validate_estimate(dimensionality: Dimensionality, estimate: &[f64]) -> Result<()> {
    if estimate.len() != dimensionality.axes() {
        return Err(SolverError::invalid_input(format!(
            "estimate has {} coordinates, solving in {}",
            estimate.len(),
            dimensionality
        )));
    }
    if estimate.iter().any(|value| !value.is_finite()) {
        return Err(SolverError::invalid_input(format!(
            "estimate {:?} is not finite",
            estimate
        )));
    }
    Ok(())
}

fn validate_position(dimensionality: Dimensionality, index: usize, position: &[f64]) -> Result<()> {
    if position.is_empty() {
        return Err(SolverError::invalid_input(format!(
            "beacon {} has no coordinates",
            index
        )));
    }
    if position.len() > dimensionality.axes() {
        return Err(SolverError::invalid_input(format!(
            "beacon {} has {} coordinates, solving in {}",
            index,
            position.len(),
            dimensionality
        )));
    }
    if position.iter().any(|value| !value.is_finite()) {
        return Err(SolverError::invalid_input(format!(
            "beacon {} position {:?} is not finite",
            index, position
        )));
    }
    Ok(())
}

fn validate_distance(index: usize, distance: f64) -> Result<()> {
    if !distance.is_finite() || distance < 0.0 {
        return Err(SolverError::invalid_input(format!(
            "beacon {} distance {} must be finite and non-negative",
            index, distance
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_invalid(result: Result<()>) -> bool {
        matches!(result, Err(SolverError::InvalidInput { .. }))
    }

    #[test]
    fn test_empty_set_rejected() {
        assert!(is_invalid(validate_beacons(Dimensionality::Two, &[])));
        assert!(is_invalid(validate_measurements(Dimensionality::Two, &[], &[])));
    }

    #[test]
    fn test_count_mismatch_rejected() {
        let positions = vec![vec![0.0, 0.0], vec![1.0, 0.0]];
        assert!(is_invalid(validate_measurements(
            Dimensionality::Two,
            &positions,
            &[1.0]
        )));
    }

    #[test]
    fn test_dimension_checks() {
        let too_many = vec![Beacon::spatial(0.0, 0.0, 1.0, 2.0)];
        assert!(is_invalid(validate_beacons(Dimensionality::Two, &too_many)));

        let planar = vec![Beacon::planar(0.0, 0.0, 2.0)];
        assert!(validate_beacons(Dimensionality::Three, &planar).is_ok());

        let empty = vec![Beacon::new(vec![], 2.0)];
        assert!(is_invalid(validate_beacons(Dimensionality::Three, &empty)));
    }

    #[test]
    fn test_bad_numbers_rejected() {
        assert!(is_invalid(validate_distances(&[1.0, -0.5])));
        assert!(is_invalid(validate_distances(&[f64::NAN])));
        let positions = vec![vec![f64::INFINITY, 0.0]];
        assert!(is_invalid(validate_measurements(
            Dimensionality::Two,
            &positions,
            &[1.0]
        )));
        assert!(is_invalid(validate_estimate(Dimensionality::Two, &[1.0])));
        assert!(is_invalid(validate_estimate(Dimensionality::Two, &[1.0, f64::NAN])));
        assert!(validate_estimate(Dimensionality::Two, &[1.0, 1.0]).is_ok());
    }
}
