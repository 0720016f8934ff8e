//! Errors of a security analysis run.
//!
//! Each stage has its own error enum; [`AnalysisError`] wraps them for the
//! public entry points. Structural and capacity errors abort the run,
//! numerical errors during a scenario only fail that scenario.

use crate::contingency::{ComputedElementError, ConnectivityError, WoodburyError};
use crate::equations::EquationError;
use crate::sparse::LinearSystemError;
use dcsa_core::GridError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("Equation system: {0}")]
    Equation(#[from] EquationError),

    #[error("Linear system: {0}")]
    LinearSystem(#[from] LinearSystemError),

    #[error("Computed elements: {0}")]
    ComputedElement(#[from] ComputedElementError),

    #[error("Connectivity: {0}")]
    Connectivity(#[from] ConnectivityError),

    #[error("Woodbury: {0}")]
    Woodbury(#[from] WoodburyError),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
