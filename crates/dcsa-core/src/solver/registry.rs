use super::backend::{FaerSolver, GaussSolver, LinearSystemBackend};
use crate::{GridError, GridResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Selects the dense backend used for per-scenario transfer-factor systems.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenseSolverKind {
    Gauss,
    #[default]
    Faer,
}

impl DenseSolverKind {
    pub fn parse(input: &str) -> GridResult<Self> {
        match input.to_ascii_lowercase().as_str() {
            "gauss" => Ok(DenseSolverKind::Gauss),
            "faer" | "default" => Ok(DenseSolverKind::Faer),
            other => Err(GridError::Config(format!(
                "unknown dense solver '{}'; supported values: {}",
                other,
                Self::available().join(", ")
            ))),
        }
    }

    pub fn build_solver(self) -> Arc<dyn LinearSystemBackend> {
        match self {
            DenseSolverKind::Gauss => Arc::new(GaussSolver),
            DenseSolverKind::Faer => Arc::new(FaerSolver),
        }
    }

    pub fn available() -> &'static [&'static str] {
        &["gauss", "faer"]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DenseSolverKind::Gauss => "gauss",
            DenseSolverKind::Faer => "faer",
        }
    }
}
