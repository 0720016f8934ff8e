//! Contingencies, remedial actions and operator strategies.
//!
//! These are plain descriptions keyed by string ids; resolving them against
//! a load-flow network happens in the analysis.

use dcsa_core::{BranchId, Radians};
use serde::{Deserialize, Serialize};

/// Branches opened simultaneously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contingency {
    pub id: String,
    pub branches: Vec<BranchId>,
}

impl Contingency {
    pub fn new(id: impl Into<String>, branches: Vec<BranchId>) -> Self {
        Self {
            id: id.into(),
            branches,
        }
    }

    /// N-1 contingency.
    pub fn single(id: impl Into<String>, branch: BranchId) -> Self {
        Self::new(id, vec![branch])
    }

    /// Number of branches opened (k in N-k).
    pub fn order(&self) -> usize {
        self.branches.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    BranchOutage {
        id: String,
        branch: BranchId,
    },
    /// Open (`open = true`) or close a switching branch
    SwitchToggle {
        id: String,
        branch: BranchId,
        open: bool,
    },
    /// New phase shift and/or tap ratio; `None` keeps the current value
    TapChange {
        id: String,
        branch: BranchId,
        phase_shift: Option<Radians>,
        ratio: Option<f64>,
    },
}

impl Action {
    pub fn outage(id: impl Into<String>, branch: BranchId) -> Self {
        Action::BranchOutage {
            id: id.into(),
            branch,
        }
    }

    pub fn switch(id: impl Into<String>, branch: BranchId, open: bool) -> Self {
        Action::SwitchToggle {
            id: id.into(),
            branch,
            open,
        }
    }

    pub fn phase_tap(id: impl Into<String>, branch: BranchId, phase_shift: Radians) -> Self {
        Action::TapChange {
            id: id.into(),
            branch,
            phase_shift: Some(phase_shift),
            ratio: None,
        }
    }

    pub fn ratio_tap(id: impl Into<String>, branch: BranchId, ratio: f64) -> Self {
        Action::TapChange {
            id: id.into(),
            branch,
            phase_shift: None,
            ratio: Some(ratio),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Action::BranchOutage { id, .. }
            | Action::SwitchToggle { id, .. }
            | Action::TapChange { id, .. } => id,
        }
    }

    pub fn branch(&self) -> BranchId {
        match self {
            Action::BranchOutage { branch, .. }
            | Action::SwitchToggle { branch, .. }
            | Action::TapChange { branch, .. } => *branch,
        }
    }
}

/// Remedial actions applied on top of one contingency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorStrategy {
    pub id: String,
    pub contingency_id: String,
    pub action_ids: Vec<String>,
}

impl OperatorStrategy {
    pub fn new(
        id: impl Into<String>,
        contingency_id: impl Into<String>,
        action_ids: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            contingency_id: contingency_id.into(),
            action_ids,
        }
    }
}
