//! Factorized DC system shared by every scenario of a case.
//!
//! The matrix is assembled sparse (`sprs`) from the active terms and
//! factorized once with faer's partial-pivoting LU. Scenarios only ever call
//! [`DcLinearSystem::solve`] / [`DcLinearSystem::solve_transposed`] on their
//! own right-hand sides, so the factorization is shared read-only.

use crate::equations::{EquationIndex, EquationSystem};
use faer::prelude::SpSolver;
use faer::solvers::PartialPivLu;
use faer::{FaerMat, Mat};
use sprs::CsMat;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LinearSystemError {
    #[error("Cannot factorize an empty system")]
    Empty,

    #[error("Singular matrix: {0}")]
    Singular(String),

    #[error("Dimension mismatch: expected {expected} rows, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

pub struct DcLinearSystem {
    index: Arc<EquationIndex>,
    matrix: CsMat<f64>,
    lu: PartialPivLu<f64>,
}

impl std::fmt::Debug for DcLinearSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DcLinearSystem")
            .field("dimension", &self.dimension())
            .field("nnz", &self.matrix.nnz())
            .finish()
    }
}

impl DcLinearSystem {
    /// Assembles and factorizes the system for `index`.
    ///
    /// faer does not report zero pivots; a singular matrix shows up as
    /// non-finite values in a trial solve.
    pub fn factorize(
        system: &EquationSystem,
        index: Arc<EquationIndex>,
    ) -> Result<Self, LinearSystemError> {
        let n = index.dimension();
        if n == 0 {
            return Err(LinearSystemError::Empty);
        }

        let matrix = system.matrix(&index);
        let mut dense = Mat::<f64>::zeros(n, n);
        for (val, (i, j)) in matrix.iter() {
            dense.write(i, j, dense.read(i, j) + *val);
        }
        let lu = dense.partial_piv_lu();

        let trial = Mat::from_fn(n, 1, |_, _| 1.0);
        let trial = lu.solve_transpose(&trial);
        if (0..n).any(|i| !trial.read(i, 0).is_finite()) {
            return Err(LinearSystemError::Singular(format!(
                "factorization of the {}x{} system has a zero pivot",
                n, n
            )));
        }

        debug!(dimension = n, nnz = matrix.nnz(), "DC system factorized");
        Ok(Self { index, matrix, lu })
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn index(&self) -> &Arc<EquationIndex> {
        &self.index
    }

    /// Assembled matrix in (variable row, equation column) orientation.
    pub fn matrix(&self) -> &CsMat<f64> {
        &self.matrix
    }

    /// Solves `M·X = B` in place, column by column.
    pub fn solve(&self, rhs: &mut Mat<f64>) -> Result<(), LinearSystemError> {
        self.check_rows(rhs)?;
        let solution = self.lu.solve(&*rhs);
        *rhs = solution;
        check_finite(rhs)
    }

    /// Solves `Mᵀ·X = B` in place. Since `M` holds `∂eq/∂v` at `(v, eq)`, this
    /// is the physical `J·x = b`.
    pub fn solve_transposed(&self, rhs: &mut Mat<f64>) -> Result<(), LinearSystemError> {
        self.check_rows(rhs)?;
        let solution = self.lu.solve_transpose(&*rhs);
        *rhs = solution;
        check_finite(rhs)
    }

    /// Convenience over [`solve_transposed`](Self::solve_transposed) for a
    /// single vector.
    pub fn solve_vector(&self, rhs: &[f64]) -> Result<Vec<f64>, LinearSystemError> {
        let mut column = Mat::from_fn(rhs.len(), 1, |i, _| rhs[i]);
        self.solve_transposed(&mut column)?;
        Ok((0..rhs.len()).map(|i| column.read(i, 0)).collect())
    }

    fn check_rows(&self, rhs: &Mat<f64>) -> Result<(), LinearSystemError> {
        if rhs.nrows() != self.dimension() {
            return Err(LinearSystemError::DimensionMismatch {
                expected: self.dimension(),
                got: rhs.nrows(),
            });
        }
        Ok(())
    }
}

fn check_finite(solution: &Mat<f64>) -> Result<(), LinearSystemError> {
    for j in 0..solution.ncols() {
        for i in 0..solution.nrows() {
            if !solution.read(i, j).is_finite() {
                return Err(LinearSystemError::Singular(format!(
                    "non-finite solution at row {}, column {}",
                    i, j
                )));
            }
        }
    }
    Ok(())
}
