use anyhow::{anyhow, Result};
use faer::{prelude::*, solvers::PartialPivLu, Mat};

/// Pivots below this magnitude are treated as a singular system.
const SINGULAR_PIVOT: f64 = 1e-12;

/// Trait for solving small dense linear systems (Ax = b).
///
/// Used for the N×N transfer-factor systems of the Woodbury engine, where N
/// is the number of simultaneously changed branches. The large sparse base
/// system has its own factorization in `dcsa-algo`.
pub trait LinearSystemBackend: Send + Sync {
    /// Solve the linear system Ax = b
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> Result<Vec<f64>>;
}

fn check_dimensions(matrix: &[Vec<f64>], rhs: &[f64]) -> Result<usize> {
    let n = matrix.len();
    if rhs.len() != n {
        return Err(anyhow!(
            "rhs length ({}) does not match matrix dimension {}",
            rhs.len(),
            n
        ));
    }
    if matrix.iter().any(|row| row.len() != n) {
        return Err(anyhow!("matrix must be square"));
    }
    Ok(n)
}

/// Gaussian elimination with partial pivoting and back substitution.
#[derive(Debug, Clone, Default)]
pub struct GaussSolver;

impl LinearSystemBackend for GaussSolver {
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> Result<Vec<f64>> {
        let n = check_dimensions(matrix, rhs)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut a = matrix.to_vec();
        let mut b = rhs.to_vec();

        for k in 0..n {
            let pivot = (k..n)
                .max_by(|&r1, &r2| a[r1][k].abs().total_cmp(&a[r2][k].abs()))
                .unwrap_or(k);
            if a[pivot][k].abs() < SINGULAR_PIVOT {
                return Err(anyhow!("singular matrix at column {}", k));
            }
            a.swap(k, pivot);
            b.swap(k, pivot);

            for row in k + 1..n {
                let factor = a[row][k] / a[k][k];
                if factor == 0.0 {
                    continue;
                }
                for col in k..n {
                    a[row][col] -= factor * a[k][col];
                }
                b[row] -= factor * b[k];
            }
        }

        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let tail: f64 = (i + 1..n).map(|j| a[i][j] * x[j]).sum();
            x[i] = (b[i] - tail) / a[i][i];
        }

        Ok(x)
    }
}

/// LU with partial pivoting from `faer`.
#[derive(Debug, Clone, Default)]
pub struct FaerSolver;

impl LinearSystemBackend for FaerSolver {
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> Result<Vec<f64>> {
        let n = check_dimensions(matrix, rhs)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let mat = Mat::from_fn(n, n, |i, j| matrix[i][j]);
        let rhs_mat = Mat::from_fn(n, 1, |i, _| rhs[i]);
        let lu = PartialPivLu::new(mat.as_ref());
        let sol = lu.solve(&rhs_mat);

        let solution: Vec<f64> = (0..n).map(|i| sol.read(i, 0)).collect();

        // faer does not report zero pivots; they surface as NaN/Inf
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(anyhow!("singular matrix (faer solver)"));
        }
        Ok(solution)
    }
}
