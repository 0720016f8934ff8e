//! # dcsa-algo: DC load flow and Woodbury security analysis
//!
//! This crate solves the linearized (DC) power flow of a [`dcsa_core::Network`]
//! and re-evaluates it under many contingencies and remedial actions without
//! refactorizing the base system.
//!
//! ## Pipeline
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | Indexing | [`lf_network`] | dense bus/branch numbers, main component only |
//! | Equations | [`equations`], [`dc`] | variables, equations, terms; square system |
//! | Factorization | [`sparse`] | `sprs` assembly, `faer` LU |
//! | Scenarios | [`contingency`] | states matrix, connectivity breaks, post-scenario flows |
//!
//! ## Example
//!
//! ```
//! use dcsa_algo::contingency::{Action, Contingency, DcSecurityAnalysis, OperatorStrategy};
//! use dcsa_algo::dc::{DcLoadFlowContext, DcLoadFlowParameters};
//! use dcsa_algo::test_utils::ring3;
//! use dcsa_core::{BranchId, Radians};
//!
//! let context = DcLoadFlowContext::new(&ring3(), DcLoadFlowParameters::default()).unwrap();
//! let contingencies = [Contingency::single("line-1", BranchId::new(1))];
//! let actions = [Action::phase_tap("shift-3", BranchId::new(3), Radians(0.05))];
//! let strategies = [OperatorStrategy::new("s", "line-1", vec!["shift-3".into()])];
//!
//! let result = DcSecurityAnalysis::new(&context)
//!     .run(&contingencies, &actions, &strategies)
//!     .unwrap();
//! let post = result.contingency("line-1").unwrap();
//! let strategy = result.operator_strategy("s").unwrap();
//! assert!(strategy.status.is_converged());
//! // with branch 1 open the network is radial: a phase shift moves no power
//! let shifted = strategy.flow(BranchId::new(3)).unwrap();
//! assert!((shifted - post.flow(BranchId::new(3)).unwrap()).abs() < 1e-9);
//! ```

pub mod contingency;
pub mod dc;
pub mod equations;
pub mod error;
pub mod lf_network;
pub mod sparse;
pub mod test_utils;

pub use contingency::{
    Action, Contingency, DcSecurityAnalysis, OperatorStrategy, PostContingencyResult,
    ScenarioStatus, SecurityAnalysisResult,
};
pub use dc::{DcLoadFlowContext, DcLoadFlowParameters, DcLoadFlowResult};
pub use error::{AnalysisError, AnalysisResult};
pub use lf_network::LfNetwork;
