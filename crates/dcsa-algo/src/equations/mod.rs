//! # Equation system
//!
//! Unknowns ([`Variable`]) and residual equations ([`Equation`]) keyed by
//! `(element number, kind)`, each equation owning an insertion-ordered list of
//! affine [`EquationTerm`]s.
//!
//! Equations and terms carry an [`ElementState`]. Flipping a state is O(1)
//! and never renumbers anything: row and column numbers only exist inside an
//! [`EquationIndex`] snapshot returned by [`EquationSystem::reindex`], which
//! also refuses to produce a non-square system.
//!
//! ## Orientation
//!
//! The assembled matrix stores `∂eq/∂v` at `(row(v), column(eq))`, i.e. the
//! transpose of the usual Jacobian. Solving the physical system `J·x = b`
//! therefore goes through the transposed solve of the factorization.

pub mod equation;
pub mod index;
pub mod system;
pub mod term;
pub mod variable;

pub use equation::{ElementState, Equation, EquationId, EquationType};
pub use index::EquationIndex;
pub use system::{EquationError, EquationSystem};
pub use term::{BranchFlowTerm, EquationTerm, TermId};
pub use variable::{ElementType, Variable, VariableType};
