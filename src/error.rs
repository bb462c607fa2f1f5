use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LdoSimError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed netlist: {0}")]
    MalformedNetlist(String),

    #[error("Missing signal: {0}")]
    MissingSignal(String),

    #[error("Bisection could not classify {voltage} V on iteration {iteration}")]
    ComparisonInconsistency { iteration: usize, voltage: f64 },

    #[error("Bisection did not converge after {iterations} simulations")]
    NonConvergence { iterations: usize },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Simulator error: {0}")]
    Simulator(String),

    #[error("Simulator timed out after {0} seconds")]
    SimulatorTimeout(u64),

    #[error("Directory already exists: {}", .0.display())]
    DirectoryExists(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, LdoSimError>;
