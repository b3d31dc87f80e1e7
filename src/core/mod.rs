//! Core types and constants for the multilateration solvers

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
