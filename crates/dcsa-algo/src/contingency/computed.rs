//! Computed elements: contingencies and actions as branch perturbations.
//!
//! Every element perturbs one branch's flow term. Elements on the same
//! branch share one *computed element index*, the column of that branch's
//! unit right-hand side (+1 on the balance of bus 1, −1 on bus 2) and of its
//! response in the states matrix. Columns are assigned in first-seen order.
//!
//! Within a scenario, the elements that take part in the small dense system
//! get a *local index* `0..N`; that numbering and the solved transfer factor
//! live on [`ActiveElement`], owned by the scenario, so the shared index
//! stays read-only across threads.

use crate::dc::DcEquationSystem;
use crate::equations::EquationIndex;
use crate::lf_network::LfNetwork;
use crate::sparse::{DcLinearSystem, LinearSystemError};
use faer::Mat;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ComputedElementError {
    #[error(
        "Too many elements: a {rows}x{columns} states matrix exceeds the {limit}-byte limit"
    )]
    TooManyElements {
        rows: usize,
        columns: usize,
        limit: usize,
    },

    #[error("States solve failed: {0}")]
    LinearSystem(#[from] LinearSystemError),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ComputedElementKind {
    BranchOutage,
    SwitchToggle {
        open: bool,
    },
    /// Phase shift in radians; `None` fields keep the current value
    TapChange {
        phase_shift: Option<f64>,
        ratio: Option<f64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComputedElement {
    pub kind: ComputedElementKind,
    pub branch_num: usize,
    pub computed_element_index: usize,
}

/// The two branch quantities a perturbation changes: power factor `b`
/// (zero when open) and constant angle offset `a`, as in `p1 = b·(eᵀx + a)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BranchParameters {
    pub power_factor: f64,
    pub offset: f64,
}

/// A branch change taking part in one scenario's dense system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveElement {
    pub branch_num: usize,
    pub computed_element_index: usize,
    pub local_index: usize,
    pub before: BranchParameters,
    pub after: BranchParameters,
    /// Transfer factor, set by the Woodbury solve
    pub alpha: f64,
}

impl ActiveElement {
    pub fn new(
        branch_num: usize,
        computed_element_index: usize,
        before: BranchParameters,
        after: BranchParameters,
    ) -> Self {
        Self {
            branch_num,
            computed_element_index,
            local_index: 0,
            before,
            after,
            alpha: 0.0,
        }
    }
}

/// Branch → column map shared by every scenario of a run.
#[derive(Debug, Clone, Default)]
pub struct ComputedElementIndex {
    columns: HashMap<usize, usize>,
    branches: Vec<usize>,
}

impl ComputedElementIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column of `branch_num`, assigning the next one on first sight.
    pub fn register(&mut self, branch_num: usize) -> usize {
        if let Some(column) = self.columns.get(&branch_num) {
            return *column;
        }
        let column = self.branches.len();
        self.columns.insert(branch_num, column);
        self.branches.push(branch_num);
        column
    }

    pub fn element(&mut self, kind: ComputedElementKind, branch_num: usize) -> ComputedElement {
        ComputedElement {
            kind,
            branch_num,
            computed_element_index: self.register(branch_num),
        }
    }

    pub fn column(&self, branch_num: usize) -> Option<usize> {
        self.columns.get(&branch_num).copied()
    }

    /// Branch numbers in column order.
    pub fn branches(&self) -> &[usize] {
        &self.branches
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Unit right-hand sides, one column per branch. An inactive balance
    /// equation (reference bus) gets no entry.
    pub fn rhs(&self, network: &LfNetwork, dc: &DcEquationSystem, index: &EquationIndex) -> Mat<f64> {
        let mut rhs = Mat::<f64>::zeros(index.dimension(), self.len());
        for (column, &branch_num) in self.branches.iter().enumerate() {
            let branch = network.branch(branch_num);
            for (bus, unit) in [(branch.bus1, 1.0), (branch.bus2, -1.0)] {
                if let Some(row) = dc.balance_column(bus, index) {
                    rhs.write(row, column, rhs.read(row, column) + unit);
                }
            }
        }
        rhs
    }

    /// States matrix: the base system's response to every unit right-hand
    /// side, after checking it fits in `max_bytes`.
    pub fn compute_states(
        &self,
        network: &LfNetwork,
        dc: &DcEquationSystem,
        linear: &DcLinearSystem,
        max_bytes: usize,
    ) -> Result<Mat<f64>, ComputedElementError> {
        let rows = linear.dimension();
        check_states_capacity(rows, self.len(), max_bytes)?;
        if self.is_empty() {
            return Ok(Mat::zeros(rows, 0));
        }
        let mut states = self.rhs(network, dc, linear.index());
        linear.solve_transposed(&mut states)?;
        debug!(rows, columns = self.len(), "states matrix computed");
        Ok(states)
    }
}

/// Byte size of a `rows × columns` dense `f64` matrix, if within `limit`.
pub fn check_states_capacity(
    rows: usize,
    columns: usize,
    limit: usize,
) -> Result<usize, ComputedElementError> {
    rows.checked_mul(columns)
        .and_then(|cells| cells.checked_mul(std::mem::size_of::<f64>()))
        .filter(|bytes| *bytes <= limit)
        .ok_or(ComputedElementError::TooManyElements {
            rows,
            columns,
            limit,
        })
}
