//! Post-scenario state by low-rank update of the base solution.
//!
//! A scenario changes the flow law of N branches from `p = b·(eᵀx + a)` to
//! `p = b'·(eᵀx + a')`. With `S_k` the base response to branch k's unit
//! injection pair (a column of the states matrix), the post state is
//!
//! ```text
//! x = x0 + Σ α_k S_k
//! ```
//!
//! where the transfer factors α solve an N×N system. For a branch whose
//! power factor changes (Δb = b' − b ≠ 0):
//!
//! ```text
//! (−1/Δb_k − e_kᵀS_k) α_k − Σ_{l≠k} e_kᵀS_l α_l = e_kᵀx0 + (b'a' − b·a)_k / Δb_k
//! ```
//!
//! and for a pure offset change (Δb = 0) the factor is explicit:
//! `α_k = −b_k (a'_k − a_k)`. A single element is a scalar division; larger
//! systems go to the configured dense backend.

use super::computed::{ActiveElement, BranchParameters};
use crate::dc::{BranchRows, DcEquationSystem};
use crate::equations::EquationIndex;
use dcsa_core::LinearSystemBackend;
use faer::Mat;
use thiserror::Error;
use tracing::trace;

/// Power-factor changes smaller than this are treated as offset-only.
const POWER_FACTOR_EPSILON: f64 = 1e-12;

/// Relative pivot below which the scalar system is singular.
const SCALAR_PIVOT: f64 = 1e-10;

#[derive(Debug, Error)]
pub enum WoodburyError {
    #[error("States matrix has no column {0}")]
    MissingColumn(usize),

    #[error("Branch {0} is not modeled through its reactance")]
    NotAClosedBranch(usize),

    #[error("Transfer-factor system is singular: {0}")]
    Singular(String),
}

/// Base flow-law parameters of a branch: zero power factor when disabled,
/// and no constant offset when the phase tap is a variable.
pub fn base_parameters(dc: &DcEquationSystem, branch_num: usize) -> Option<BranchParameters> {
    let closed = dc.closed_branch(branch_num)?;
    let power_factor = if dc.is_branch_disabled(branch_num) {
        0.0
    } else {
        closed.power_factor
    };
    let offset = if closed.alpha1.is_some() { 0.0 } else { closed.a1 };
    Some(BranchParameters {
        power_factor,
        offset,
    })
}

pub struct WoodburyEngine<'a> {
    equations: &'a DcEquationSystem,
    index: &'a EquationIndex,
    backend: &'a dyn LinearSystemBackend,
}

impl<'a> WoodburyEngine<'a> {
    pub fn new(
        equations: &'a DcEquationSystem,
        index: &'a EquationIndex,
        backend: &'a dyn LinearSystemBackend,
    ) -> Self {
        Self {
            equations,
            index,
            backend,
        }
    }

    fn rows(&self, branch_num: usize) -> Result<BranchRows, WoodburyError> {
        self.equations
            .branch_rows(branch_num, self.index)
            .ok_or(WoodburyError::NotAClosedBranch(branch_num))
    }

    /// `e_kᵀ x` at the given state.
    pub fn angle_difference(&self, branch_num: usize, state: &[f64]) -> Result<f64, WoodburyError> {
        Ok(self.rows(branch_num)?.angle_difference(|r| state[r]))
    }

    /// Side-1 flow of a changed branch at the post state.
    pub fn changed_flow(&self, element: &ActiveElement, state: &[f64]) -> Result<f64, WoodburyError> {
        let difference = self.angle_difference(element.branch_num, state)?;
        Ok(element.after.power_factor * (difference + element.after.offset))
    }

    /// Solves the transfer factors into `elements[..].alpha` and returns the
    /// post state. No elements leaves the pre state unchanged.
    pub fn compute_post_state(
        &self,
        pre_state: &[f64],
        states: &Mat<f64>,
        elements: &mut [ActiveElement],
    ) -> Result<Vec<f64>, WoodburyError> {
        if elements.is_empty() {
            return Ok(pre_state.to_vec());
        }
        for element in elements.iter() {
            if element.computed_element_index >= states.ncols() {
                return Err(WoodburyError::MissingColumn(element.computed_element_index));
            }
        }

        let rows = elements
            .iter()
            .map(|e| self.rows(e.branch_num))
            .collect::<Result<Vec<_>, _>>()?;
        for (local, element) in elements.iter_mut().enumerate() {
            element.local_index = local;
        }

        // e_kᵀ S_l for every pair
        let n = elements.len();
        let sensitivity: Vec<Vec<f64>> = rows
            .iter()
            .map(|row| {
                elements
                    .iter()
                    .map(|l| {
                        let column = l.computed_element_index;
                        row.angle_difference(|r| states.read(r, column))
                    })
                    .collect()
            })
            .collect();

        let mut matrix = vec![vec![0.0; n]; n];
        let mut rhs = vec![0.0; n];
        for (k, element) in elements.iter().enumerate() {
            let BranchParameters {
                power_factor: b,
                offset: a,
            } = element.before;
            let BranchParameters {
                power_factor: b_after,
                offset: a_after,
            } = element.after;
            let delta = b_after - b;
            if delta.abs() < POWER_FACTOR_EPSILON {
                matrix[k][k] = 1.0;
                rhs[k] = -b * (a_after - a);
            } else {
                for l in 0..n {
                    matrix[k][l] = -sensitivity[k][l];
                }
                matrix[k][k] -= 1.0 / delta;
                rhs[k] = rows[k].angle_difference(|r| pre_state[r]) + (b_after * a_after - b * a) / delta;
            }
        }

        let alphas = if n == 1 {
            let pivot = matrix[0][0];
            let scale = 1.0f64.max(sensitivity[0][0].abs()).max(pivot.abs());
            if pivot.abs() < SCALAR_PIVOT * scale || !pivot.is_finite() {
                return Err(WoodburyError::Singular(format!(
                    "pivot {:e} for branch {}",
                    pivot, elements[0].branch_num
                )));
            }
            vec![rhs[0] / pivot]
        } else {
            let solution = self
                .backend
                .solve(&matrix, &rhs)
                .map_err(|err| WoodburyError::Singular(err.to_string()))?;
            if solution.iter().any(|v| !v.is_finite()) {
                return Err(WoodburyError::Singular(
                    "non-finite transfer factor".to_string(),
                ));
            }
            solution
        };

        let mut state = pre_state.to_vec();
        for (element, alpha) in elements.iter_mut().zip(alphas) {
            element.alpha = alpha;
            trace!(branch = element.branch_num, alpha, "transfer factor");
            let column = element.computed_element_index;
            for (r, value) in state.iter_mut().enumerate() {
                *value += alpha * states.read(r, column);
            }
        }
        Ok(state)
    }
}
