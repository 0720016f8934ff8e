//! # DC load flow
//!
//! Builds the DC equation system of an [`LfNetwork`](crate::lf_network::LfNetwork),
//! factorizes it once and solves the base case. The resulting
//! [`DcLoadFlowContext`] is the shared, read-only starting point of every
//! contingency scenario.
//!
//! ```
//! use dcsa_algo::dc::{DcLoadFlowContext, DcLoadFlowParameters};
//! use dcsa_algo::test_utils::ring3;
//! use dcsa_core::BranchId;
//!
//! let context = DcLoadFlowContext::new(&ring3(), DcLoadFlowParameters::default()).unwrap();
//! let base = context.solve().unwrap();
//! assert!((base.flow(BranchId::new(1)).unwrap() - 1.0).abs() < 1e-10);
//! ```

pub mod builder;
pub mod context;
pub mod parameters;

pub use builder::{
    BranchModel, BranchRows, ClosedBranchEquations, DcEquationSystem, ZeroImpedanceEquations,
};
pub use context::{BranchFlow, BusConnectivity, DcLoadFlowContext, DcLoadFlowResult};
pub use parameters::DcLoadFlowParameters;
