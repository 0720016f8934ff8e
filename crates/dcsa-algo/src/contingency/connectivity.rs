//! Does a contingency split the network?
//!
//! Two stages:
//!
//! 1. **Sensitivity screen.** For each failing branch `e`, sum over the failing
//!    branches `f` (including `e`) the flow induced on `e` by a unit transfer
//!    across `f`: `|pf_e · (S_f[φ1(e)] − S_f[φ2(e)])|`. A sum of `1 − ε` means
//!    the failing branches carry all of each other's transfers, which happens
//!    when they form a cut. Cheap, and may over-report.
//! 2. **Graph confirmation.** Flagged contingencies are replayed on the bus
//!    connectivity inside a temporary-change scope. The buses and branches
//!    cut from the reference component are recorded, together with the
//!    reconnection set: the failing branches that, added back one by one,
//!    each merge two still-separate components.
//!
//! The scope is held under the connectivity mutex and undone on every path.

use super::computed::ComputedElementIndex;
use crate::dc::{BusConnectivity, DcEquationSystem, DcLoadFlowContext};
use crate::equations::EquationIndex;
use crate::lf_network::LfNetwork;
use dcsa_core::{BranchId, BusId, GraphConnectivity, GridError, TemporaryChanges};
use faer::Mat;
use petgraph::unionfind::UnionFind;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum ConnectivityError {
    #[error(transparent)]
    Graph(#[from] GridError),

    #[error("Connectivity lock poisoned")]
    LockPoisoned,

    #[error("Branch {0} has no states column or flow terms")]
    MissingBranch(usize),

    #[error(
        "Contingency '{contingency}': reconnection set leaves {components} components instead of one"
    )]
    IncompleteReconnection {
        contingency: String,
        components: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectivityAnalysisResult {
    pub contingency_id: String,
    /// Confirmed split of the network
    pub breaking: bool,
    /// Bus numbers cut from the reference component
    pub lost_buses: BTreeSet<usize>,
    /// Remaining branches touching a lost bus
    pub lost_branches: BTreeSet<usize>,
    /// Failing branches whose reconnection merges every component back
    pub reconnection: Vec<usize>,
    /// Component that keeps the reference bus
    pub main_component: usize,
}

impl ConnectivityAnalysisResult {
    pub fn non_breaking(contingency_id: &str) -> Self {
        Self {
            contingency_id: contingency_id.to_string(),
            ..Self::default()
        }
    }

    pub fn lost_bus_ids(&self, network: &LfNetwork) -> Vec<BusId> {
        self.lost_buses.iter().map(|&b| network.bus(b).id).collect()
    }

    pub fn lost_branch_ids(&self, network: &LfNetwork) -> Vec<BranchId> {
        self.lost_branches
            .iter()
            .map(|&b| network.branch(b).id)
            .collect()
    }

    /// Whether a branch has an end on a lost bus.
    pub fn touches_lost_bus(&self, network: &LfNetwork, branch_num: usize) -> bool {
        let branch = network.branch(branch_num);
        self.lost_buses.contains(&branch.bus1) || self.lost_buses.contains(&branch.bus2)
    }
}

pub struct ConnectivityBreakAnalysis<'a> {
    network: &'a LfNetwork,
    equations: &'a DcEquationSystem,
    index: &'a EquationIndex,
    connectivity: &'a Mutex<BusConnectivity>,
    epsilon: f64,
}

impl<'a> ConnectivityBreakAnalysis<'a> {
    pub fn new(context: &'a DcLoadFlowContext) -> Self {
        Self {
            network: context.network(),
            equations: context.equations(),
            index: context.index(),
            connectivity: context.connectivity(),
            epsilon: context.parameters().connectivity_loss_threshold,
        }
    }

    /// Stage 1 on the branch numbers of one contingency.
    pub fn is_potentially_breaking(
        &self,
        elements: &[usize],
        states: &Mat<f64>,
        columns: &ComputedElementIndex,
    ) -> Result<bool, ConnectivityError> {
        let state_columns = elements
            .iter()
            .map(|&f| columns.column(f).ok_or(ConnectivityError::MissingBranch(f)))
            .collect::<Result<Vec<_>, _>>()?;

        for &e in elements {
            let rows = self
                .equations
                .branch_rows(e, self.index)
                .ok_or(ConnectivityError::MissingBranch(e))?;
            let power_factor = self
                .equations
                .closed_branch(e)
                .ok_or(ConnectivityError::MissingBranch(e))?
                .power_factor;
            let carried: f64 = state_columns
                .iter()
                .map(|&c| (power_factor * rows.angle_difference(|r| states.read(r, c))).abs())
                .sum();
            trace!(branch = e, carried, "connectivity sensitivity");
            if carried >= 1.0 - self.epsilon {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Both stages for one contingency.
    pub fn analyze(
        &self,
        contingency_id: &str,
        elements: &[usize],
        states: &Mat<f64>,
        columns: &ComputedElementIndex,
    ) -> Result<ConnectivityAnalysisResult, ConnectivityError> {
        if elements.is_empty() || !self.is_potentially_breaking(elements, states, columns)? {
            return Ok(ConnectivityAnalysisResult::non_breaking(contingency_id));
        }
        self.confirm(contingency_id, elements)
    }

    /// Stage 2: replays the outages on the bus connectivity.
    pub fn confirm(
        &self,
        contingency_id: &str,
        elements: &[usize],
    ) -> Result<ConnectivityAnalysisResult, ConnectivityError> {
        let mut guard = self
            .connectivity
            .lock()
            .map_err(|_| ConnectivityError::LockPoisoned)?;
        let mut scope = TemporaryChanges::open(&mut *guard);

        for branch in elements {
            if scope.contains_edge(branch) {
                scope.remove_edge(branch)?;
            }
        }

        let mut ends = Vec::with_capacity(elements.len());
        for &branch_num in elements {
            let branch = self.network.branch(branch_num);
            ends.push((
                branch_num,
                scope.component_number(&branch.bus1)?,
                scope.component_number(&branch.bus2)?,
            ));
        }
        if ends.iter().all(|(_, c1, c2)| c1 == c2) {
            debug!(contingency = contingency_id, "flagged contingency keeps the network connected");
            return Ok(ConnectivityAnalysisResult::non_breaking(contingency_id));
        }

        let lost_buses: BTreeSet<usize> = scope
            .vertices_removed_from_main_component()
            .into_iter()
            .collect();
        let lost_branches: BTreeSet<usize> = scope
            .edges_removed_from_main_component()
            .into_iter()
            .collect();

        let components = scope.nb_connected_components();
        let mut groups = UnionFind::<usize>::new(components);
        let reconnection: Vec<usize> = ends
            .iter()
            .filter(|(_, c1, c2)| groups.union(*c1, *c2))
            .map(|(branch, _, _)| *branch)
            .collect();

        let merged: HashSet<usize> = (0..components).map(|c| groups.find(c)).collect();
        if merged.len() != 1 {
            return Err(ConnectivityError::IncompleteReconnection {
                contingency: contingency_id.to_string(),
                components: merged.len(),
            });
        }

        debug!(
            contingency = contingency_id,
            lost_buses = lost_buses.len(),
            reconnection = reconnection.len(),
            "contingency splits the network"
        );
        Ok(ConnectivityAnalysisResult {
            contingency_id: contingency_id.to_string(),
            breaking: true,
            lost_buses,
            lost_branches,
            reconnection,
            main_component: 0,
        })
    }
}
