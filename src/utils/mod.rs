//! Solve options and their JSON configuration file

pub mod config;

pub use config::{ConfigError, ConfigurationManager, SolveOptions};
