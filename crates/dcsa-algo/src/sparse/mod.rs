//! # Sparse assembly and factorization
//!
//! The DC matrix is very sparse: one entry per bus angle per incident branch
//! side, plus a handful for the reference bus, tap variables and
//! zero-impedance bookkeeping. It is assembled as `sprs` triplets and
//! factorized with `faer`.

pub mod linear_system;

pub use linear_system::{DcLinearSystem, LinearSystemError};
