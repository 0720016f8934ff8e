//! Contingency and remedial-action analysis on a factorized DC case.
//!
//! ## Key Concepts
//!
//! - **Computed element:** a branch perturbation (outage, switch toggle, tap
//!   change). Elements on the same branch share one column of the states
//!   matrix.
//! - **States matrix:** base-system response to a unit injection pair across
//!   each computed branch, `S = J⁻¹ U`, computed once per run.
//! - **Transfer factors:** per scenario, the N×N system whose solution α
//!   gives the post-scenario state `x = x0 + S α` without refactorizing.
//!
//! ## Algorithm
//!
//! 1. Resolve contingencies and actions to branch numbers; index columns
//! 2. Solve the states matrix with the base factorization
//! 3. Screen each contingency for a network split, confirm on the graph
//! 4. Solve the transfer factors per contingency and per operator strategy
//!
//! A contingency that splits the network drops the injections of the cut-off
//! buses, keeps a minimal reconnection set in the system so it stays
//! non-singular, and reports zero flow on every lost branch.
//!
//! ```
//! use dcsa_algo::contingency::{Contingency, DcSecurityAnalysis};
//! use dcsa_algo::dc::{DcLoadFlowContext, DcLoadFlowParameters};
//! use dcsa_algo::test_utils::ring3;
//! use dcsa_core::BranchId;
//!
//! let context = DcLoadFlowContext::new(&ring3(), DcLoadFlowParameters::default()).unwrap();
//! let result = DcSecurityAnalysis::new(&context)
//!     .run(&[Contingency::single("n-1", BranchId::new(1))], &[], &[])
//!     .unwrap();
//! let post = result.contingency("n-1").unwrap();
//! assert!((post.flow(BranchId::new(3)).unwrap() - 2.0).abs() < 1e-9);
//! ```

pub mod analysis;
pub mod computed;
pub mod connectivity;
pub mod model;
pub mod woodbury;

pub use analysis::{
    DcSecurityAnalysis, OperatorStrategyResult, PostContingencyResult, ScenarioStatus,
    SecurityAnalysisResult,
};
pub use computed::{
    check_states_capacity, ActiveElement, BranchParameters, ComputedElement,
    ComputedElementError, ComputedElementIndex, ComputedElementKind,
};
pub use connectivity::{ConnectivityAnalysisResult, ConnectivityBreakAnalysis, ConnectivityError};
pub use model::{Action, Contingency, OperatorStrategy};
pub use woodbury::{base_parameters, WoodburyEngine, WoodburyError};
