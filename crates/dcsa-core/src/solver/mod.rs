//! Dense solvers for the small systems that appear per scenario.

pub mod backend;
pub mod registry;

pub use backend::{FaerSolver, GaussSolver, LinearSystemBackend};
pub use registry::DenseSolverKind;
