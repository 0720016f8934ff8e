//! Unified error type for network-level operations.
//!
//! [`GridError`] covers everything that can go wrong before the linear
//! algebra starts: malformed topology, bad parameters, unknown elements.
//! Algorithm crates define their own narrower error enums and convert into
//! this one at API boundaries.
//!
//! # Example
//!
//! ```
//! use dcsa_core::{GridError, GridResult};
//!
//! fn check_reactance(x: f64) -> GridResult<f64> {
//!     if !x.is_finite() {
//!         return Err(GridError::Network(format!("non-finite reactance {x}")));
//!     }
//!     Ok(x)
//! }
//!
//! assert!(check_reactance(f64::NAN).is_err());
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    /// Malformed topology (two reference buses, dangling branch, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// Element lookup failures
    #[error("Unknown {kind} {id}")]
    UnknownElement { kind: &'static str, id: usize },

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Parameter/configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

pub type GridResult<T> = Result<T, GridError>;

impl From<anyhow::Error> for GridError {
    fn from(err: anyhow::Error) -> Self {
        GridError::Other(err.to_string())
    }
}

impl From<String> for GridError {
    fn from(s: String) -> Self {
        GridError::Other(s)
    }
}

impl From<&str> for GridError {
    fn from(s: &str) -> Self {
        GridError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        GridError::Parse(err.to_string())
    }
}
