use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::algorithms::newton_raphson::ConvergenceMode;
use crate::core::{
    Dimensionality, InitialGuess, SolveStrategy, DEFAULT_CONVERGENCE_EPSILON, DEFAULT_MAX_ITERATIONS,
    SOLVER_SNAP_EPSILON,
};
use crate::validation::data::validate_estimate;
use crate::validation::error::{Result, SolverError};

/// Parameters of a single solve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Number of coordinates solved for
    pub dimensionality: Dimensionality,
    /// Starting estimate
    pub initial_guess: InitialGuess,
    /// Iteration cap (at least 1)
    pub max_iterations: usize,
    /// Relative change below which a coordinate counts as settled
    pub convergence_epsilon: f64,
    /// Entries smaller than this are set to zero during elimination
    pub snap_epsilon: f64,
    pub convergence_mode: ConvergenceMode,
    pub strategy: SolveStrategy,
    /// Wall-clock budget per solve (milliseconds)
    pub timeout_ms: Option<u64>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            dimensionality: Dimensionality::Two,
            initial_guess: InitialGuess::Ones,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            convergence_epsilon: DEFAULT_CONVERGENCE_EPSILON,
            snap_epsilon: SOLVER_SNAP_EPSILON,
            convergence_mode: ConvergenceMode::AnyCoordinate,
            strategy: SolveStrategy::NewtonRaphson,
            timeout_ms: None,
        }
    }
}

impl SolveOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(SolverError::invalid_input("max_iterations must be at least 1"));
        }
        if !self.convergence_epsilon.is_finite() || self.convergence_epsilon <= 0.0 {
            return Err(SolverError::invalid_input(format!(
                "convergence_epsilon {} must be finite and positive",
                self.convergence_epsilon
            )));
        }
        if !self.snap_epsilon.is_finite() || self.snap_epsilon < 0.0 {
            return Err(SolverError::invalid_input(format!(
                "snap_epsilon {} must be finite and non-negative",
                self.snap_epsilon
            )));
        }
        if let InitialGuess::Explicit(values) = &self.initial_guess {
            validate_estimate(self.dimensionality, values)?;
        }
        Ok(())
    }
}

/// Configuration file errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Configuration file I/O error
    #[error("I/O error: {message}")]
    IoError { message: String },
    /// JSON serialization/deserialization error
    #[error("serialization error: {message}")]
    SerializationError { message: String },
    /// Options parsed but out of range
    #[error("invalid options: {0}")]
    InvalidOptions(#[from] SolverError),
}

/// Owns the active `SolveOptions` and the file they came from
#[derive(Debug, Clone, Default)]
pub struct ConfigurationManager {
    options: SolveOptions,
    /// Configuration file path
    config_file_path: Option<String>,
    /// Whether configuration has been modified
    is_modified: bool,
}

impl ConfigurationManager {
    /// Create a new configuration manager with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration manager and load from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let mut manager = Self::new();
        manager.load_from_file(path)?;
        Ok(manager)
    }

    pub fn options(&self) -> &SolveOptions {
        &self.options
    }

    /// Replace the options after validating them
    pub fn update_options(&mut self, options: SolveOptions) -> std::result::Result<(), ConfigError> {
        options.validate()?;
        self.options = options;
        self.is_modified = true;
        Ok(())
    }

    /// Load options from a JSON file. Nothing changes if the file fails to
    /// parse or validate.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> std::result::Result<(), ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            message: format!("Failed to read config file '{}': {}", path_str, e),
        })?;

        let options: SolveOptions = serde_json::from_str(&content).map_err(|e| ConfigError::SerializationError {
            message: format!("Failed to parse config file '{}': {}", path_str, e),
        })?;
        options.validate()?;

        self.options = options;
        self.config_file_path = Some(path_str);
        self.is_modified = false;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> std::result::Result<(), ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = serde_json::to_string_pretty(&self.options).map_err(|e| ConfigError::SerializationError {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(&path, content).map_err(|e| ConfigError::IoError {
            message: format!("Failed to write config file '{}': {}", path_str, e),
        })?;

        self.config_file_path = Some(path_str);
        self.is_modified = false;
        Ok(())
    }

    /// Save to the currently loaded file path
    pub fn save(&mut self) -> std::result::Result<(), ConfigError> {
        if let Some(path) = self.config_file_path.clone() {
            self.save_to_file(path)
        } else {
            Err(ConfigError::IoError {
                message: "No file path set for saving configuration".to_string(),
            })
        }
    }

    /// Check if configuration has been modified since last save
    pub fn is_modified(&self) -> bool {
        self.is_modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("multilateration_{}_{}.json", name, std::process::id()))
    }

    #[test]
    fn test_default_options() {
        let options = SolveOptions::default();
        assert_eq!(options.max_iterations, 50);
        assert_eq!(options.convergence_epsilon, 1e-5);
        assert_eq!(options.convergence_mode, ConvergenceMode::AnyCoordinate);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: SolveOptions =
            serde_json::from_str(r#"{"dimensionality":"3d","strategy":"external_least_squares"}"#).unwrap();
        assert_eq!(options.dimensionality, Dimensionality::Three);
        assert_eq!(options.strategy, SolveStrategy::ExternalLeastSquares);
        assert_eq!(options.max_iterations, DEFAULT_MAX_ITERATIONS);
    }

    #[test]
    fn test_invalid_options() {
        let cases = [
            SolveOptions {
                max_iterations: 0,
                ..SolveOptions::default()
            },
            SolveOptions {
                convergence_epsilon: 0.0,
                ..SolveOptions::default()
            },
            SolveOptions {
                snap_epsilon: f64::NAN,
                ..SolveOptions::default()
            },
            SolveOptions {
                initial_guess: InitialGuess::Explicit(vec![1.0, 2.0, 3.0]),
                ..SolveOptions::default()
            },
        ];
        for options in cases {
            assert!(matches!(options.validate(), Err(SolverError::InvalidInput { .. })));
        }
    }

    #[test]
    fn test_configuration_manager_creation() {
        let manager = ConfigurationManager::new();
        assert_eq!(manager.options(), &SolveOptions::default());
        assert!(!manager.is_modified());
    }

    #[test]
    fn test_update_options() {
        let mut manager = ConfigurationManager::new();
        let options = SolveOptions {
            convergence_mode: ConvergenceMode::AllCoordinates,
            ..SolveOptions::default()
        };
        manager.update_options(options.clone()).unwrap();
        assert!(manager.is_modified());
        assert_eq!(manager.options(), &options);

        let err = manager
            .update_options(SolveOptions {
                max_iterations: 0,
                ..SolveOptions::default()
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOptions(_)));
        assert_eq!(manager.options(), &options);
    }

    #[test]
    fn test_config_serialization() {
        let path = temp_path("roundtrip");
        let mut manager = ConfigurationManager::new();
        manager
            .update_options(SolveOptions {
                dimensionality: Dimensionality::Three,
                initial_guess: InitialGuess::Centroid,
                timeout_ms: Some(250),
                ..SolveOptions::default()
            })
            .unwrap();
        manager.save_to_file(&path).unwrap();
        assert!(!manager.is_modified());

        let loaded = ConfigurationManager::from_file(&path).unwrap();
        assert_eq!(loaded.options(), manager.options());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_load_errors() {
        let mut manager = ConfigurationManager::new();
        assert!(matches!(
            manager.load_from_file(temp_path("missing")),
            Err(ConfigError::IoError { .. })
        ));

        let path = temp_path("garbage");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            manager.load_from_file(&path),
            Err(ConfigError::SerializationError { .. })
        ));

        fs::write(&path, r#"{"max_iterations":0}"#).unwrap();
        assert!(matches!(
            manager.load_from_file(&path),
            Err(ConfigError::InvalidOptions(_))
        ));
        let _ = fs::remove_file(path);

        assert!(matches!(manager.save(), Err(ConfigError::IoError { .. })));
    }
}
