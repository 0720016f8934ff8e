use super::builder::DcEquationSystem;
use super::parameters::DcLoadFlowParameters;
use crate::equations::EquationIndex;
use crate::error::AnalysisError;
use crate::lf_network::LfNetwork;
use crate::sparse::{DcLinearSystem, LinearSystemError};
use dcsa_core::{BranchId, GraphConnectivity, LinearSystemBackend, NaiveGraphConnectivity, Network};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::info;

/// Bus-level connectivity of the load-flow network: vertices are bus numbers,
/// edges are branch numbers.
pub type BusConnectivity = NaiveGraphConnectivity<usize, usize>;

/// Side-1 active power of a branch, per-unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BranchFlow {
    pub branch: BranchId,
    pub p1: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DcLoadFlowResult {
    /// Solution vector in equation-index row order
    pub state: Vec<f64>,
    pub branch_flows: Vec<BranchFlow>,
}

impl DcLoadFlowResult {
    pub fn flow(&self, branch: BranchId) -> Option<f64> {
        flow_of(&self.branch_flows, branch)
    }
}

pub(crate) fn flow_of(flows: &[BranchFlow], branch: BranchId) -> Option<f64> {
    flows.iter().find(|f| f.branch == branch).map(|f| f.p1)
}

/// Long-lived state of one DC case: the load-flow network, its equation
/// system, the factorization and the connectivity structure. Shared
/// read-only by every scenario; the connectivity is locked for the duration
/// of a temporary-change scope.
pub struct DcLoadFlowContext {
    network: LfNetwork,
    parameters: DcLoadFlowParameters,
    equations: DcEquationSystem,
    linear: DcLinearSystem,
    connectivity: Mutex<BusConnectivity>,
    dense_backend: Arc<dyn LinearSystemBackend>,
}

impl std::fmt::Debug for DcLoadFlowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DcLoadFlowContext")
            .field("buses", &self.network.buses().len())
            .field("branches", &self.network.branches().len())
            .field("linear", &self.linear)
            .finish()
    }
}

impl DcLoadFlowContext {
    pub fn new(network: &Network, parameters: DcLoadFlowParameters) -> Result<Self, AnalysisError> {
        let start = Instant::now();
        parameters.validate()?;
        let lf_network = LfNetwork::from_network(network, parameters.low_impedance_threshold)?;
        let equations = DcEquationSystem::build(&lf_network, &parameters)?;
        let index = equations.reindex()?;
        let linear = DcLinearSystem::factorize(equations.system(), index)?;
        let connectivity = bus_connectivity(&lf_network)?;
        let dense_backend = parameters.dense_solver.build_solver();

        info!(
            buses = lf_network.buses().len(),
            branches = lf_network.branches().len(),
            dimension = linear.dimension(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "DC load flow context ready"
        );

        Ok(Self {
            network: lf_network,
            parameters,
            equations,
            linear,
            connectivity: Mutex::new(connectivity),
            dense_backend,
        })
    }

    pub fn network(&self) -> &LfNetwork {
        &self.network
    }

    pub fn parameters(&self) -> &DcLoadFlowParameters {
        &self.parameters
    }

    pub fn equations(&self) -> &DcEquationSystem {
        &self.equations
    }

    pub fn linear_system(&self) -> &DcLinearSystem {
        &self.linear
    }

    pub fn index(&self) -> &Arc<EquationIndex> {
        self.linear.index()
    }

    pub fn connectivity(&self) -> &Mutex<BusConnectivity> {
        &self.connectivity
    }

    pub fn dense_backend(&self) -> &Arc<dyn LinearSystemBackend> {
        &self.dense_backend
    }

    /// Base-case state and flows.
    pub fn solve(&self) -> Result<DcLoadFlowResult, LinearSystemError> {
        let state = self.solve_with_zeroed_buses(&BTreeSet::new())?;
        let branch_flows = self.branch_flows(&state);
        Ok(DcLoadFlowResult {
            state,
            branch_flows,
        })
    }

    /// Re-solves the base factorization with the injections of `buses` set to
    /// zero, as needed once those buses are cut from the main component.
    pub fn solve_with_zeroed_buses(
        &self,
        buses: &BTreeSet<usize>,
    ) -> Result<Vec<f64>, LinearSystemError> {
        let targets = self.target_vector(buses);
        self.linear.solve_vector(&targets)
    }

    pub fn target_vector(&self, zeroed_buses: &BTreeSet<usize>) -> Vec<f64> {
        self.equations.target_vector(self.index(), zeroed_buses)
    }

    /// Flows of every branch of the load-flow network at `state`.
    pub fn branch_flows(&self, state: &[f64]) -> Vec<BranchFlow> {
        self.network
            .branches()
            .iter()
            .map(|branch| BranchFlow {
                branch: branch.id,
                p1: self.equations.branch_flow(branch.num, state, self.index()),
            })
            .collect()
    }
}

fn bus_connectivity(network: &LfNetwork) -> Result<BusConnectivity, AnalysisError> {
    let mut connectivity = BusConnectivity::new();
    for bus in network.buses() {
        connectivity.add_vertex(bus.num);
    }
    for branch in network.branches().iter().filter(|b| b.enabled) {
        connectivity.add_edge(branch.bus1, branch.bus2, branch.num)?;
    }
    connectivity.set_main_component_vertex(network.reference_bus())?;
    Ok(connectivity)
}
