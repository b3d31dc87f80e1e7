use multilateration::{solve, AccuracyValidator, Beacon, DistanceNoise, PositionEstimate, SolveOptions};
use serde::Deserialize;
use tracing_subscriber::filter::LevelFilter;

const LOG_ENV: &str = "MULTILATERATION_LOG";

/// Input file: beacon readings plus optional solve options
#[derive(Debug, Deserialize)]
struct ScenarioFile {
    beacons: Vec<Beacon>,
    #[serde(default)]
    options: SolveOptions,
}

fn solve_scenario(scenario: &ScenarioFile) -> multilateration::Result<PositionEstimate> {
    let positions: Vec<Vec<f64>> = scenario.beacons.iter().map(|b| b.position().to_vec()).collect();
    let distances: Vec<f64> = scenario.beacons.iter().map(Beacon::distance).collect();
    solve(&positions, &distances, &scenario.options)
}

fn init_logging() {
    let level = std::env::var(LOG_ENV)
        .ok()
        .and_then(|value| value.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::INFO);
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map_or("multilateration", |s| s.as_str());

    // Check for accuracy validation mode
    if args.len() >= 2 && args[1] == "--accuracy-validation" {
        let trials = match args.get(2) {
            Some(value) => value.parse::<usize>()?,
            None => 1000,
        };
        println!("Running accuracy validation ({} trials per configuration)...", trials);
        for noise in [DistanceNoise::None, DistanceNoise::Proportional(0.1)] {
            let validator = AccuracyValidator::new().with_trials(trials).with_noise(noise);
            let results = validator.run_all_strategies()?;
            println!("{}", validator.generate_report(&results));

            if noise == DistanceNoise::None && results.iter().any(|r| r.success_rate() < 0.99) {
                eprintln!("ERROR: noiseless trials missed the {:.2} tolerance", validator.tolerance);
                return Err("Accuracy validation failed".into());
            }
        }
        println!("Accuracy validation completed successfully!");
        return Ok(());
    }

    if args.len() != 2 {
        eprintln!("Usage: {} <scenario.json>", program);
        eprintln!("   or: {} --accuracy-validation [trials]", program);
        return Err("Invalid arguments".into());
    }

    let json_data = std::fs::read_to_string(&args[1])?;
    let scenario: ScenarioFile = serde_json::from_str(&json_data)?;

    match solve_scenario(&scenario) {
        Ok(estimate) => {
            println!("Estimated position: {}", estimate);
        }
        Err(e) => {
            eprintln!("Error during multilateration: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use multilateration::{Dimensionality, SolveStrategy, SolverError};

    #[test]
    fn test_scenario_with_hardcoded_data() {
        let json_data = r#"
        {
          "beacons": [
            { "position": [0.0, 0.0], "distance": 5.0 },
            { "position": [10.0, 0.0], "distance": 8.06225774829855 },
            { "position": [0.0, 10.0], "distance": 6.708203932499369 }
          ]
        }"#;
        let scenario: ScenarioFile = serde_json::from_str(json_data).unwrap();
        assert_eq!(scenario.options, SolveOptions::default());

        let estimate = solve_scenario(&scenario).unwrap();
        assert!((estimate.x() - 3.0).abs() < 1e-3);
        assert!((estimate.y() - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_scenario_with_options() {
        let json_data = r#"
        {
          "beacons": [
            { "position": [0.0, 0.0, 0.0], "distance": 7.0710678118654755 },
            { "position": [10.0, 0.0, 0.0], "distance": 9.486832980505138 },
            { "position": [0.0, 10.0], "distance": 8.366600265340756 },
            { "position": [0.0, 0.0, 10.0], "distance": 7.0710678118654755 }
          ],
          "options": {
            "dimensionality": "3d",
            "convergence_mode": "all_coordinates",
            "strategy": "external_least_squares"
          }
        }"#;
        let scenario: ScenarioFile = serde_json::from_str(json_data).unwrap();
        assert_eq!(scenario.options.dimensionality, Dimensionality::Three);

        let estimate = solve_scenario(&scenario).unwrap();
        assert_eq!(estimate.strategy, SolveStrategy::ExternalLeastSquares);
        assert!(estimate.distance_to(&[3.0, 4.0, 5.0]) < 1e-3);
    }

    #[test]
    fn test_scenario_rejects_bad_readings() {
        let json_data = r#"{ "beacons": [ { "position": [0.0, 0.0], "distance": -1.0 } ] }"#;
        let scenario: ScenarioFile = serde_json::from_str(json_data).unwrap();
        assert!(matches!(
            solve_scenario(&scenario),
            Err(SolverError::InvalidInput { .. })
        ));
    }
}
