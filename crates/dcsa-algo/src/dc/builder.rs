//! DC equation system construction.
//!
//! Per bus: an angle variable and an active-power balance equation. The
//! reference bus additionally gets a fixed-angle equation, which replaces
//! its (redundant) balance equation.
//!
//! Per branch with a usable reactance: two flow terms added to the balance
//! equations of its buses,
//!
//! ```text
//! p1 = -pf·(φ2 − φ1 − a1)      on bus 1
//! p2 = +pf·(φ2 − φ1 − a1)      on bus 2
//! ```
//!
//! Zero-impedance branches are kept out of the matrix. Each one carries its
//! power through a `DummyP` variable (+1 on bus 1, −1 on bus 2) and owns two
//! equations, of which exactly one is active: `ZeroPhi` ties the angles of a
//! branch in the spanning forest of the enabled zero-impedance branches,
//! `DummyTargetP` pins the dummy power of every other one to zero. The forest
//! is recomputed on each transition, so a parallel branch takes over when a
//! forest branch is disabled, and the system stays square.

use super::parameters::DcLoadFlowParameters;
use crate::equations::{
    BranchFlowTerm, EquationError, EquationId, EquationIndex, EquationSystem, EquationTerm,
    EquationType, TermId, Variable, VariableType,
};
use crate::lf_network::LfNetwork;
use petgraph::unionfind::UnionFind;
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// Flow terms of a branch modeled through its reactance.
#[derive(Debug, Clone)]
pub struct ClosedBranchEquations {
    pub side1: TermId,
    pub side2: TermId,
    pub power_factor: f64,
    /// Constant side-1 phase shift (also the initial tap when it is a variable)
    pub a1: f64,
    pub alpha1: Option<Variable>,
}

#[derive(Debug, Clone)]
pub struct ZeroImpedanceEquations {
    pub bus1: usize,
    pub bus2: usize,
    pub dummy_p: Variable,
    pub dummy_target: EquationId,
    /// Angle equality, active while the branch is in the spanning forest
    pub zero_phi: EquationId,
}

#[derive(Debug, Clone)]
pub enum BranchModel {
    Closed(ClosedBranchEquations),
    ZeroImpedance(ZeroImpedanceEquations),
}

/// Rows of the variables entering `e_kᵀx = φ1 − φ2 + α1` for a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchRows {
    pub phi1: usize,
    pub phi2: usize,
    pub alpha1: Option<usize>,
}

impl BranchRows {
    pub fn angle_difference<F: Fn(usize) -> f64>(&self, value_at: F) -> f64 {
        value_at(self.phi1) - value_at(self.phi2) + self.alpha1.map_or(0.0, &value_at)
    }
}

#[derive(Debug, Clone)]
pub struct DcEquationSystem {
    system: EquationSystem,
    branches: Vec<BranchModel>,
    disabled: Vec<bool>,
    bus_count: usize,
    reference_bus: usize,
    parameters: DcLoadFlowParameters,
}

impl DcEquationSystem {
    pub fn build(
        network: &LfNetwork,
        parameters: &DcLoadFlowParameters,
    ) -> Result<Self, EquationError> {
        let mut system = EquationSystem::new(network.buses().len(), network.branches().len());

        for bus in network.buses() {
            let phi = system.create_variable(bus.num, VariableType::BusPhi)?;
            let balance = system.create_equation(bus.num, EquationType::BusTargetP)?;
            system.set_equation_target(balance, bus.injection);
            if bus.is_reference {
                let fixed = system.create_equation(bus.num, EquationType::BusTargetPhi)?;
                system.add_term(fixed, EquationTerm::variable(phi, 1.0))?;
                system.set_equation_active(balance, false);
            }
        }

        let balance = |system: &EquationSystem, bus: usize| {
            system
                .get_equation(bus, EquationType::BusTargetP)
                .ok_or(EquationError::UnknownEquation(bus))
        };

        let mut branches = Vec::with_capacity(network.branches().len());
        for branch in network.branches() {
            let phi1 = Variable::new(branch.bus1, VariableType::BusPhi);
            let phi2 = Variable::new(branch.bus2, VariableType::BusPhi);
            let balance1 = balance(&system, branch.bus1)?;
            let balance2 = balance(&system, branch.bus2)?;

            if branch.zero_impedance {
                let dummy_p = system.create_variable(branch.num, VariableType::DummyP)?;
                system.add_term(balance1, EquationTerm::variable(dummy_p, 1.0))?;
                system.add_term(balance2, EquationTerm::variable(dummy_p, -1.0))?;
                let dummy_target = system.create_equation(branch.num, EquationType::DummyTargetP)?;
                system.add_term(dummy_target, EquationTerm::variable(dummy_p, 1.0))?;
                let zero_phi = system.create_equation(branch.num, EquationType::ZeroPhi)?;
                system.add_term(zero_phi, EquationTerm::variable(phi1, 1.0))?;
                system.add_term(zero_phi, EquationTerm::variable(phi2, -1.0))?;
                // placed by the forest pass below
                system.set_equation_active(zero_phi, false);

                branches.push(BranchModel::ZeroImpedance(ZeroImpedanceEquations {
                    bus1: branch.bus1,
                    bus2: branch.bus2,
                    dummy_p,
                    dummy_target,
                    zero_phi,
                }));
            } else {
                let alpha1 = if branch.is_phase_shifter && parameters.phase_shifter_tap_as_variable
                {
                    let alpha = system.create_variable(branch.num, VariableType::BranchAlpha1)?;
                    let target =
                        system.create_equation(branch.num, EquationType::BranchTargetAlpha1)?;
                    system.add_term(target, EquationTerm::variable(alpha, 1.0))?;
                    system.set_equation_target(target, branch.phase_shift);
                    Some(alpha)
                } else {
                    None
                };

                let power_factor = branch.power_factor(parameters.use_transformer_ratio);
                let flow = BranchFlowTerm {
                    branch_num: branch.num,
                    phi1,
                    phi2,
                    alpha1,
                    power_factor,
                    a1: branch.phase_shift,
                };
                let side1 =
                    system.add_term(balance1, EquationTerm::ClosedBranchSide1Flow(flow.clone()))?;
                let side2 = system.add_term(balance2, EquationTerm::ClosedBranchSide2Flow(flow))?;
                branches.push(BranchModel::Closed(ClosedBranchEquations {
                    side1,
                    side2,
                    power_factor,
                    a1: branch.phase_shift,
                    alpha1,
                }));
            }
        }

        let mut dc = Self {
            system,
            branches,
            disabled: vec![false; network.branches().len()],
            bus_count: network.buses().len(),
            reference_bus: network.reference_bus(),
            parameters: parameters.clone(),
        };
        for branch in network.branches().iter().filter(|b| !b.enabled) {
            dc.disabled[branch.num] = true;
            if let BranchModel::Closed(closed) = &dc.branches[branch.num] {
                let (side1, side2) = (closed.side1, closed.side2);
                dc.system.set_term_active(side1, false);
                dc.system.set_term_active(side2, false);
            }
        }
        let forest_size = dc.place_zero_impedance_forest();

        debug!(
            variables = dc.system.variable_count(),
            equations = dc.system.equations().len(),
            zero_impedance_forest = forest_size,
            "DC equation system built"
        );
        Ok(dc)
    }

    /// Applies the enable/disable state machine of a branch.
    ///
    /// Closed branch: both flow terms follow the branch. Zero-impedance
    /// branch: the forest is placed again over the enabled ones.
    pub fn set_branch_disabled(&mut self, branch_num: usize, disabled: bool) {
        self.disabled[branch_num] = disabled;
        match &self.branches[branch_num] {
            BranchModel::Closed(closed) => {
                let (side1, side2) = (closed.side1, closed.side2);
                self.system.set_term_active(side1, !disabled);
                self.system.set_term_active(side2, !disabled);
            }
            BranchModel::ZeroImpedance(_) => {
                let forest_size = self.place_zero_impedance_forest();
                trace!(branch = branch_num, disabled, forest_size, "zero-impedance forest placed");
            }
        }
        debug_assert!(
            self.system.is_square(),
            "branch {} transition left the system non-square",
            branch_num
        );
    }

    /// Spanning forest over the enabled zero-impedance branches, in branch
    /// order: `ZeroPhi` for forest branches, `DummyTargetP` for the others.
    fn place_zero_impedance_forest(&mut self) -> usize {
        let mut forest = UnionFind::<usize>::new(self.bus_count);
        let mut size = 0;
        for (num, model) in self.branches.iter().enumerate() {
            if let BranchModel::ZeroImpedance(zero) = model {
                let in_forest = !self.disabled[num] && forest.union(zero.bus1, zero.bus2);
                self.system.set_equation_active(zero.zero_phi, in_forest);
                self.system.set_equation_active(zero.dummy_target, !in_forest);
                size += usize::from(in_forest);
            }
        }
        size
    }

    pub fn is_branch_disabled(&self, branch_num: usize) -> bool {
        self.disabled[branch_num]
    }

    pub fn is_zero_impedance(&self, branch_num: usize) -> bool {
        matches!(self.branches[branch_num], BranchModel::ZeroImpedance(_))
    }

    /// Whether the angle equality of a zero-impedance branch is active.
    pub fn in_zero_impedance_forest(&self, branch_num: usize) -> bool {
        match &self.branches[branch_num] {
            BranchModel::ZeroImpedance(zero) => self.system.equation(zero.zero_phi).is_active(),
            BranchModel::Closed(_) => false,
        }
    }

    pub fn is_square(&self) -> bool {
        self.system.is_square()
    }

    pub fn system(&self) -> &EquationSystem {
        &self.system
    }

    pub fn parameters(&self) -> &DcLoadFlowParameters {
        &self.parameters
    }

    pub fn reference_bus(&self) -> usize {
        self.reference_bus
    }

    pub fn branch_model(&self, branch_num: usize) -> &BranchModel {
        &self.branches[branch_num]
    }

    pub fn closed_branch(&self, branch_num: usize) -> Option<&ClosedBranchEquations> {
        match &self.branches[branch_num] {
            BranchModel::Closed(closed) => Some(closed),
            BranchModel::ZeroImpedance(_) => None,
        }
    }

    pub fn reindex(&self) -> Result<std::sync::Arc<EquationIndex>, EquationError> {
        self.system.reindex()
    }

    /// Targets in column order, with the balance targets of `zeroed_buses`
    /// set to zero.
    pub fn target_vector(&self, index: &EquationIndex, zeroed_buses: &BTreeSet<usize>) -> Vec<f64> {
        self.system.target_vector_with(index, |eq| {
            if eq.kind == EquationType::BusTargetP && zeroed_buses.contains(&eq.element_num) {
                0.0
            } else {
                eq.target()
            }
        })
    }

    /// Column of the balance equation of `bus`, if active.
    pub fn balance_column(&self, bus: usize, index: &EquationIndex) -> Option<usize> {
        self.system
            .get_equation(bus, EquationType::BusTargetP)
            .and_then(|eq| index.column(eq))
    }

    pub fn branch_rows(&self, branch_num: usize, index: &EquationIndex) -> Option<BranchRows> {
        let closed = self.closed_branch(branch_num)?;
        let EquationTerm::ClosedBranchSide1Flow(flow) = self.system.term(closed.side1) else {
            return None;
        };
        Some(BranchRows {
            phi1: index.row(&flow.phi1)?,
            phi2: index.row(&flow.phi2)?,
            alpha1: match flow.alpha1 {
                Some(alpha) => Some(index.row(&alpha)?),
                None => None,
            },
        })
    }

    /// Side-1 active power flow of a branch at `state`; zero when disabled.
    pub fn branch_flow(&self, branch_num: usize, state: &[f64], index: &EquationIndex) -> f64 {
        if self.disabled[branch_num] {
            return 0.0;
        }
        match &self.branches[branch_num] {
            BranchModel::Closed(closed) => self.system.term(closed.side1).value(state, index),
            BranchModel::ZeroImpedance(zero) => {
                index.row(&zero.dummy_p).map_or(0.0, |row| state[row])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::DcLinearSystem;
    use crate::test_utils::{ring3, NetworkBuilder};
    use dcsa_core::Radians;

    fn build(network: &dcsa_core::Network, params: &DcLoadFlowParameters) -> DcEquationSystem {
        let lf = LfNetwork::from_network(network, params.low_impedance_threshold).unwrap();
        DcEquationSystem::build(&lf, params).unwrap()
    }

    /// Ring 1-2-3 with bus 4 hanging off bus 3 through two zero-impedance
    /// branches in parallel and bus 5 off bus 4 through a third one.
    fn zero_impedance_network() -> dcsa_core::Network {
        NetworkBuilder::new()
            .reference_bus(1)
            .bus(2)
            .bus(3)
            .bus(4)
            .bus(5)
            .line(1, 1, 2, 0.1)
            .line(2, 2, 3, 0.1)
            .line(3, 1, 3, 0.1)
            .line(4, 3, 4, 0.0)
            .line(5, 3, 4, 0.0)
            .line(6, 4, 5, 0.0)
            .generator(1, 1.0)
            .load(5, 1.0)
            .build()
    }

    #[test]
    fn reference_balance_replaced_by_fixed_angle() {
        let dc = build(&ring3(), &DcLoadFlowParameters::default());
        let system = dc.system();
        let balance = system.get_equation(0, EquationType::BusTargetP).unwrap();
        let fixed = system.get_equation(0, EquationType::BusTargetPhi).unwrap();
        assert!(!system.equation(balance).is_active());
        assert!(system.equation(fixed).is_active());
        assert!(dc.is_square());
    }

    fn is_active(dc: &DcEquationSystem, branch: usize, kind: EquationType) -> bool {
        let system = dc.system();
        system.equation(system.get_equation(branch, kind).unwrap()).is_active()
    }

    fn factorizes(dc: &DcEquationSystem) -> bool {
        let index = dc.reindex().unwrap();
        DcLinearSystem::factorize(dc.system(), index).is_ok()
    }

    #[test]
    fn spanning_forest_gets_angle_equalities() {
        let dc = build(&zero_impedance_network(), &DcLoadFlowParameters::default());
        assert!(dc.in_zero_impedance_forest(3));
        assert!(!dc.in_zero_impedance_forest(4));
        assert!(dc.in_zero_impedance_forest(5));

        assert!(is_active(&dc, 4, EquationType::DummyTargetP));
        assert!(!is_active(&dc, 4, EquationType::ZeroPhi));
        assert!(!is_active(&dc, 3, EquationType::DummyTargetP));
        assert!(dc.is_square());
    }

    #[test]
    fn every_transition_keeps_system_square() {
        let mut dc = build(&zero_impedance_network(), &DcLoadFlowParameters::default());
        for branch in 0..6 {
            dc.set_branch_disabled(branch, true);
            assert!(dc.is_square(), "disabling {}", branch);
            assert!(dc.reindex().is_ok());
        }
        for branch in (0..6).rev() {
            dc.set_branch_disabled(branch, false);
            assert!(dc.is_square(), "enabling {}", branch);
        }
    }

    #[test]
    fn single_outage_keeps_connected_system_solvable() {
        let mut dc = build(&zero_impedance_network(), &DcLoadFlowParameters::default());
        // branch 5 is the only link to bus 5
        for branch in 0..5 {
            dc.set_branch_disabled(branch, true);
            assert!(dc.is_square(), "disabling {}", branch);
            assert!(factorizes(&dc), "disabling {}", branch);
            dc.set_branch_disabled(branch, false);
            assert!(factorizes(&dc), "enabling {}", branch);
        }
        dc.set_branch_disabled(5, true);
        assert!(dc.is_square());
        assert!(!factorizes(&dc));
    }

    #[test]
    fn forest_branch_swaps_equations_when_disabled() {
        let mut dc = build(&zero_impedance_network(), &DcLoadFlowParameters::default());
        dc.set_branch_disabled(3, true);
        assert!(!is_active(&dc, 3, EquationType::ZeroPhi));
        assert!(is_active(&dc, 3, EquationType::DummyTargetP));
        // the parallel branch takes over the angle equality
        assert!(dc.in_zero_impedance_forest(4));
        assert!(!is_active(&dc, 4, EquationType::DummyTargetP));

        dc.set_branch_disabled(3, false);
        assert!(dc.in_zero_impedance_forest(3));
        assert!(!dc.in_zero_impedance_forest(4));
    }

    #[test]
    fn parallel_coupler_carries_flow_after_forest_outage() {
        let network = NetworkBuilder::new()
            .reference_bus(1)
            .bus(2)
            .bus(3)
            .line(1, 1, 2, 0.1)
            .line(2, 2, 3, 0.0)
            .line(3, 2, 3, 0.0)
            .generator(1, 0.7)
            .load(3, 0.7)
            .build();
        let mut dc = build(&network, &DcLoadFlowParameters::default());
        assert!(dc.in_zero_impedance_forest(1));
        dc.set_branch_disabled(1, true);

        let index = dc.reindex().unwrap();
        let linear = DcLinearSystem::factorize(dc.system(), index.clone()).unwrap();
        let state = linear
            .solve_vector(&dc.target_vector(&index, &BTreeSet::new()))
            .unwrap();
        assert_eq!(dc.branch_flow(1, &state, &index), 0.0);
        assert!((dc.branch_flow(2, &state, &index) - 0.7).abs() < 1e-10);
        assert!((dc.branch_flow(0, &state, &index) - 0.7).abs() < 1e-10);
    }

    #[test]
    fn base_disabled_branch_has_inactive_terms() {
        let network = NetworkBuilder::new()
            .reference_bus(1)
            .bus(2)
            .line(1, 1, 2, 0.1)
            .open_line(2, 1, 2, 0.1)
            .build();
        let dc = build(&network, &DcLoadFlowParameters::default());
        let closed = dc.closed_branch(1).unwrap();
        assert!(!dc.system().term_state(closed.side1).is_active());
        assert!(dc.system().term_state(dc.closed_branch(0).unwrap().side1).is_active());
        assert!(dc.is_branch_disabled(1));
    }

    #[test]
    fn phase_shifter_tap_as_variable() {
        let network = NetworkBuilder::new()
            .reference_bus(1)
            .bus(2)
            .phase_shifter(1, 1, 2, 0.1, Radians(0.1))
            .build();
        let params = DcLoadFlowParameters::default().with_phase_shifter_tap_as_variable(true);
        let dc = build(&network, &params);
        let system = dc.system();
        assert!(system.get_variable(0, VariableType::BranchAlpha1).is_some());
        let target = system
            .get_equation(0, EquationType::BranchTargetAlpha1)
            .unwrap();
        assert!((system.equation(target).target() - 0.1).abs() < 1e-12);
        let index = dc.reindex().unwrap();
        assert!(dc.branch_rows(0, &index).unwrap().alpha1.is_some());
    }

    #[test]
    fn constant_phase_shift_stays_out_of_rows() {
        let network = NetworkBuilder::new()
            .reference_bus(1)
            .bus(2)
            .phase_shifter(1, 1, 2, 0.1, Radians(0.1))
            .build();
        let dc = build(&network, &DcLoadFlowParameters::default());
        let index = dc.reindex().unwrap();
        let rows = dc.branch_rows(0, &index).unwrap();
        assert_eq!(rows.alpha1, None);
        assert_eq!(index.dimension(), 2);
    }
}
