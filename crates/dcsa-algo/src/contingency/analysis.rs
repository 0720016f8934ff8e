//! Security analysis over one DC case.
//!
//! A run resolves contingencies and actions against the load-flow network,
//! registers their branches in one [`ComputedElementIndex`], computes the
//! states matrix once, classifies connectivity breaks and then evaluates
//! every contingency and operator strategy through the Woodbury engine.
//! Scenarios are independent and mapped in parallel with the `parallel`
//! feature.

use super::computed::{
    ActiveElement, BranchParameters, ComputedElement, ComputedElementIndex, ComputedElementKind,
};
use super::connectivity::{ConnectivityAnalysisResult, ConnectivityBreakAnalysis, ConnectivityError};
use super::model::{Action, Contingency, OperatorStrategy};
use super::woodbury::{base_parameters, WoodburyEngine, WoodburyError};
use crate::dc::context::flow_of;
use crate::dc::{BranchFlow, DcEquationSystem, DcLoadFlowContext, DcLoadFlowResult};
use crate::error::{AnalysisError, AnalysisResult};
use crate::lf_network::LfNetwork;
use crate::sparse::DcLinearSystem;
use dcsa_core::{BranchId, Diagnostics};
use faer::Mat;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ScenarioStatus {
    Converged,
    Failed(String),
}

impl ScenarioStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, ScenarioStatus::Converged)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostContingencyResult {
    pub contingency_id: String,
    pub status: ScenarioStatus,
    /// Post-contingency state, empty when the scenario failed
    pub state: Vec<f64>,
    pub branch_flows: Vec<BranchFlow>,
    pub connectivity: ConnectivityAnalysisResult,
    pub diagnostics: Diagnostics,
}

impl PostContingencyResult {
    pub fn flow(&self, branch: BranchId) -> Option<f64> {
        flow_of(&self.branch_flows, branch)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OperatorStrategyResult {
    pub strategy_id: String,
    pub contingency_id: String,
    pub status: ScenarioStatus,
    pub state: Vec<f64>,
    pub branch_flows: Vec<BranchFlow>,
    pub connectivity: ConnectivityAnalysisResult,
    pub diagnostics: Diagnostics,
}

impl OperatorStrategyResult {
    pub fn flow(&self, branch: BranchId) -> Option<f64> {
        flow_of(&self.branch_flows, branch)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityAnalysisResult {
    pub base: DcLoadFlowResult,
    pub contingencies: Vec<PostContingencyResult>,
    pub operator_strategies: Vec<OperatorStrategyResult>,
    /// Run-level warnings (network structure, duplicate ids, dangling references)
    pub diagnostics: Diagnostics,
}

impl SecurityAnalysisResult {
    pub fn contingency(&self, id: &str) -> Option<&PostContingencyResult> {
        self.contingencies.iter().find(|r| r.contingency_id == id)
    }

    pub fn operator_strategy(&self, id: &str) -> Option<&OperatorStrategyResult> {
        self.operator_strategies.iter().find(|r| r.strategy_id == id)
    }
}

/// A contingency reduced to the branch numbers it can actually open.
#[derive(Debug, Clone)]
struct ResolvedContingency {
    id: String,
    /// Branches with flow terms, opened through the Woodbury engine
    branches: Vec<usize>,
    /// Zero-impedance branches, opened by switching their equations
    zero_impedance: Vec<usize>,
    diagnostics: Diagnostics,
}

impl ResolvedContingency {
    fn opens(&self, branch_num: usize) -> bool {
        self.branches.contains(&branch_num) || self.zero_impedance.contains(&branch_num)
    }

    fn all_branches(&self) -> Vec<usize> {
        self.branches
            .iter()
            .chain(&self.zero_impedance)
            .copied()
            .collect()
    }
}

type ActionLookup<'a> = HashMap<&'a str, Result<ComputedElement, String>>;
type ConnectivityOutcome = Result<ConnectivityAnalysisResult, ConnectivityError>;

/// Factorized system a scenario is evaluated against, with the states of
/// the branches it may change.
#[derive(Clone, Copy)]
struct BaseView<'s> {
    equations: &'s DcEquationSystem,
    linear: &'s DcLinearSystem,
    states: &'s Mat<f64>,
    columns: &'s ComputedElementIndex,
}

/// The base system refactorized with some zero-impedance branches open.
struct LocalBase {
    equations: DcEquationSystem,
    linear: DcLinearSystem,
    states: Mat<f64>,
    columns: ComputedElementIndex,
}

impl LocalBase {
    fn view(&self) -> BaseView<'_> {
        BaseView {
            equations: &self.equations,
            linear: &self.linear,
            states: &self.states,
            columns: &self.columns,
        }
    }
}

/// Post state of a scenario that went through.
struct Scenario {
    state: Vec<f64>,
    branch_flows: Vec<BranchFlow>,
    connectivity: ConnectivityAnalysisResult,
}

/// Scenario outcome before it is labelled as a contingency or a strategy.
struct Outcome {
    status: ScenarioStatus,
    state: Vec<f64>,
    branch_flows: Vec<BranchFlow>,
    connectivity: ConnectivityAnalysisResult,
    diagnostics: Diagnostics,
}

pub struct DcSecurityAnalysis<'a> {
    context: &'a DcLoadFlowContext,
}

impl<'a> DcSecurityAnalysis<'a> {
    pub fn new(context: &'a DcLoadFlowContext) -> Self {
        Self { context }
    }

    pub fn run(
        &self,
        contingencies: &[Contingency],
        actions: &[Action],
        strategies: &[OperatorStrategy],
    ) -> AnalysisResult<SecurityAnalysisResult> {
        let start = Instant::now();
        let base = self.context.solve()?;
        let mut diagnostics = self.context.network().diagnostics().clone();

        let resolved: Vec<ResolvedContingency> = contingencies
            .iter()
            .map(|c| self.resolve_contingency(c))
            .collect();
        let mut columns = ComputedElementIndex::new();
        for contingency in &resolved {
            for &branch in &contingency.branches {
                columns.register(branch);
            }
        }
        let action_lookup = self.resolve_actions(actions, &mut columns, &mut diagnostics);

        let states = columns.compute_states(
            self.context.network(),
            self.context.equations(),
            self.context.linear_system(),
            self.context.parameters().max_states_matrix_bytes,
        )?;
        debug!(columns = columns.len(), "computed elements indexed");
        let shared = BaseView {
            equations: self.context.equations(),
            linear: self.context.linear_system(),
            states: &states,
            columns: &columns,
        };

        let breaks = ConnectivityBreakAnalysis::new(self.context);
        let connectivity: Vec<ConnectivityOutcome> =
            map_scenarios(&resolved, |c| classify(&breaks, c, &states, &columns));

        let scenarios: Vec<(&ResolvedContingency, &Result<_, _>)> =
            resolved.iter().zip(connectivity.iter()).collect();
        let contingency_results: Vec<PostContingencyResult> =
            map_scenarios(&scenarios, |(contingency, connectivity)| {
                let outcome = self.evaluate(&base.state, shared, contingency, connectivity, &[]);
                PostContingencyResult {
                    contingency_id: contingency.id.clone(),
                    status: outcome.status,
                    state: outcome.state,
                    branch_flows: outcome.branch_flows,
                    connectivity: outcome.connectivity,
                    diagnostics: outcome.diagnostics,
                }
            });

        let by_id: HashMap<&str, usize> = resolved
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.as_str(), i))
            .collect();
        let strategy_results: Vec<OperatorStrategyResult> = map_scenarios(strategies, |strategy| {
            self.evaluate_strategy(
                strategy,
                &base.state,
                shared,
                &by_id,
                &scenarios,
                &action_lookup,
            )
        });
        for result in &strategy_results {
            if !by_id.contains_key(result.contingency_id.as_str()) {
                diagnostics.add_warning_with_entity(
                    "contingency",
                    &format!("unknown contingency '{}'", result.contingency_id),
                    &format!("Strategy {}", result.strategy_id),
                );
            }
        }

        let failed = contingency_results
            .iter()
            .filter(|r| !r.status.is_converged())
            .count();
        info!(
            contingencies = contingency_results.len(),
            strategies = strategy_results.len(),
            failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "DC security analysis complete"
        );

        Ok(SecurityAnalysisResult {
            base,
            contingencies: contingency_results,
            operator_strategies: strategy_results,
            diagnostics,
        })
    }

    /// Connectivity classification alone, one entry per contingency.
    pub fn detect_connectivity_breaks(
        &self,
        contingencies: &[Contingency],
    ) -> AnalysisResult<Vec<Result<ConnectivityAnalysisResult, ConnectivityError>>> {
        let resolved: Vec<ResolvedContingency> = contingencies
            .iter()
            .map(|c| self.resolve_contingency(c))
            .collect();
        let columns = self.index_elements(contingencies, &[]);
        let states = columns.compute_states(
            self.context.network(),
            self.context.equations(),
            self.context.linear_system(),
            self.context.parameters().max_states_matrix_bytes,
        )?;
        let breaks = ConnectivityBreakAnalysis::new(self.context);
        Ok(map_scenarios(&resolved, |c| classify(&breaks, c, &states, &columns)))
    }

    /// Shared column index: contingency branches first, then action branches
    /// in list order. Unresolvable and zero-impedance elements get no column.
    pub fn index_elements(
        &self,
        contingencies: &[Contingency],
        actions: &[Action],
    ) -> ComputedElementIndex {
        let mut columns = ComputedElementIndex::new();
        for contingency in contingencies {
            for branch in self.resolve_contingency(contingency).branches {
                columns.register(branch);
            }
        }
        for action in actions {
            if let Ok(branch) = self.resolve_branch(action.branch()) {
                columns.register(branch);
            }
        }
        columns
    }

    fn lookup_branch(&self, id: BranchId) -> Result<usize, String> {
        self.context
            .network()
            .branch_num(id)
            .ok_or_else(|| "branch is unknown or outside the main component".to_string())
    }

    /// Branch an action can act on: one with flow terms.
    fn resolve_branch(&self, id: BranchId) -> Result<usize, String> {
        let num = self.lookup_branch(id)?;
        if self.context.equations().is_zero_impedance(num) {
            return Err("zero-impedance branch".to_string());
        }
        Ok(num)
    }

    fn resolve_contingency(&self, contingency: &Contingency) -> ResolvedContingency {
        let equations = self.context.equations();
        let mut diagnostics = Diagnostics::new();
        let mut branches = Vec::with_capacity(contingency.branches.len());
        let mut zero_impedance = Vec::new();
        for &id in &contingency.branches {
            let reason = match self.lookup_branch(id) {
                Ok(num) if equations.is_branch_disabled(num) => {
                    "branch is already open".to_string()
                }
                Ok(num) => {
                    let target = if equations.is_zero_impedance(num) {
                        &mut zero_impedance
                    } else {
                        &mut branches
                    };
                    if !target.contains(&num) {
                        target.push(num);
                    }
                    continue;
                }
                Err(reason) => reason,
            };
            warn!(contingency = %contingency.id, branch = %id, "{}, skipped", reason);
            diagnostics.add_warning_with_entity(
                "contingency",
                &format!("{}, skipped", reason),
                &format!("Branch {}", id),
            );
        }
        ResolvedContingency {
            id: contingency.id.clone(),
            branches,
            zero_impedance,
            diagnostics,
        }
    }

    fn resolve_actions<'b>(
        &self,
        actions: &'b [Action],
        columns: &mut ComputedElementIndex,
        diagnostics: &mut Diagnostics,
    ) -> ActionLookup<'b> {
        let mut lookup = HashMap::with_capacity(actions.len());
        for action in actions {
            if lookup.contains_key(action.id()) {
                warn!(action = action.id(), "duplicate action id, first definition kept");
                diagnostics.add_warning_with_entity(
                    "action",
                    "duplicate action id, first definition kept",
                    &format!("Action {}", action.id()),
                );
                continue;
            }
            let element = self
                .resolve_branch(action.branch())
                .map(|branch| columns.element(action_kind(action), branch));
            lookup.insert(action.id(), element);
        }
        lookup
    }

    fn evaluate_strategy(
        &self,
        strategy: &OperatorStrategy,
        base_state: &[f64],
        shared: BaseView<'_>,
        by_id: &HashMap<&str, usize>,
        scenarios: &[(&ResolvedContingency, &ConnectivityOutcome)],
        actions: &ActionLookup<'_>,
    ) -> OperatorStrategyResult {
        let Some(&position) = by_id.get(strategy.contingency_id.as_str()) else {
            warn!(
                strategy = %strategy.id,
                contingency = %strategy.contingency_id,
                "unknown contingency"
            );
            return OperatorStrategyResult {
                strategy_id: strategy.id.clone(),
                contingency_id: strategy.contingency_id.clone(),
                status: ScenarioStatus::Failed(format!(
                    "unknown contingency '{}'",
                    strategy.contingency_id
                )),
                state: Vec::new(),
                branch_flows: Vec::new(),
                connectivity: ConnectivityAnalysisResult::non_breaking(&strategy.contingency_id),
                diagnostics: Diagnostics::new(),
            };
        };
        let (contingency, connectivity) = scenarios[position];

        let mut skipped = Diagnostics::new();
        let mut elements = Vec::with_capacity(strategy.action_ids.len());
        for action_id in &strategy.action_ids {
            match actions.get(action_id.as_str()) {
                Some(Ok(element)) => elements.push((action_id.as_str(), *element)),
                Some(Err(reason)) => skip_action(action_id, reason, &mut skipped),
                None => skip_action(action_id, "unknown action", &mut skipped),
            }
        }

        let mut outcome = self.evaluate(base_state, shared, contingency, connectivity, &elements);
        skipped.merge(outcome.diagnostics);
        outcome.diagnostics = skipped;
        OperatorStrategyResult {
            strategy_id: strategy.id.clone(),
            contingency_id: contingency.id.clone(),
            status: outcome.status,
            state: outcome.state,
            branch_flows: outcome.branch_flows,
            connectivity: outcome.connectivity,
            diagnostics: outcome.diagnostics,
        }
    }

    fn evaluate(
        &self,
        base_state: &[f64],
        shared: BaseView<'_>,
        contingency: &ResolvedContingency,
        connectivity: &ConnectivityOutcome,
        actions: &[(&str, ComputedElement)],
    ) -> Outcome {
        let mut diagnostics = contingency.diagnostics.clone();
        let connectivity = match connectivity {
            Ok(result) => result,
            Err(err) => {
                warn!(contingency = %contingency.id, "connectivity analysis failed: {}", err);
                return Outcome {
                    status: ScenarioStatus::Failed(err.to_string()),
                    state: Vec::new(),
                    branch_flows: Vec::new(),
                    connectivity: ConnectivityAnalysisResult::non_breaking(&contingency.id),
                    diagnostics,
                };
            }
        };

        match self.post_state(
            base_state,
            shared,
            contingency,
            connectivity,
            actions,
            &mut diagnostics,
        ) {
            Ok(scenario) => Outcome {
                status: ScenarioStatus::Converged,
                state: scenario.state,
                branch_flows: scenario.branch_flows,
                connectivity: scenario.connectivity,
                diagnostics,
            },
            Err(err) => {
                warn!(contingency = %contingency.id, "scenario failed: {}", err);
                Outcome {
                    status: ScenarioStatus::Failed(err.to_string()),
                    state: Vec::new(),
                    branch_flows: Vec::new(),
                    connectivity: connectivity.clone(),
                    diagnostics,
                }
            }
        }
    }

    fn post_state(
        &self,
        base_state: &[f64],
        shared: BaseView<'_>,
        contingency: &ResolvedContingency,
        connectivity: &ConnectivityAnalysisResult,
        actions: &[(&str, ComputedElement)],
        diagnostics: &mut Diagnostics,
    ) -> Result<Scenario, AnalysisError> {
        let network = self.context.network();
        let mut changes = ScenarioChanges::new(network, self.context.equations());
        for &branch in &contingency.branches {
            if let Err(reason) = changes.apply(ComputedElementKind::BranchOutage, branch) {
                warn!(contingency = %contingency.id, branch, "{}, skipped", reason);
                diagnostics.add_warning("contingency", &format!("{}, skipped", reason));
            }
        }
        let mut applied = Vec::with_capacity(actions.len());
        for &(action_id, element) in actions {
            let branch = element.branch_num;
            let reason = if contingency.opens(branch) {
                Some("branch is opened by the contingency".to_string())
            } else if connectivity.touches_lost_bus(network, branch) {
                Some("branch touches a bus lost by the contingency".to_string())
            } else {
                changes.apply(element.kind, branch).err()
            };
            match reason {
                Some(reason) => skip_action(action_id, &reason, diagnostics),
                None => applied.push((action_id, branch)),
            }
        }

        let opened_by_actions: Vec<usize> = changes
            .opened()
            .filter(|&num| !contingency.opens(num))
            .collect();
        let connectivity = if opened_by_actions.is_empty() {
            connectivity.clone()
        } else {
            let mut outages = contingency.all_branches();
            outages.extend(&opened_by_actions);
            let combined =
                ConnectivityBreakAnalysis::new(self.context).confirm(&contingency.id, &outages)?;
            if combined.lost_buses.len() > connectivity.lost_buses.len() {
                warn!(
                    contingency = %contingency.id,
                    lost_buses = combined.lost_buses.len(),
                    "actions open branches that split the network"
                );
                diagnostics.add_warning(
                    "action",
                    &format!(
                        "actions cut {} more bus(es) from the main component",
                        combined.lost_buses.len() - connectivity.lost_buses.len()
                    ),
                );
                for &(action_id, branch) in &applied {
                    if !opened_by_actions.contains(&branch)
                        && combined.touches_lost_bus(network, branch)
                    {
                        changes.revert(branch);
                        skip_action(
                            action_id,
                            "branch touches a bus lost once the actions are applied",
                            diagnostics,
                        );
                    }
                }
            }
            combined
        };

        let reconnection: BTreeSet<usize> = connectivity.reconnection.iter().copied().collect();
        let structural: Vec<usize> = contingency
            .zero_impedance
            .iter()
            .copied()
            .filter(|num| !reconnection.contains(num))
            .collect();
        let local = if structural.is_empty() {
            None
        } else {
            Some(self.refactorize(&structural, changes.branches())?)
        };
        let base = local.as_ref().map_or(shared, LocalBase::view);
        let index = base.linear.index();

        let pre_state = if local.is_none() && !connectivity.breaking {
            base_state.to_vec()
        } else {
            debug!(
                contingency = %contingency.id,
                lost_buses = connectivity.lost_buses.len(),
                "re-solving with lost injections removed"
            );
            let targets = base.equations.target_vector(index, &connectivity.lost_buses);
            base.linear.solve_vector(&targets)?
        };

        let mut elements = changes.active_elements(base.columns, &reconnection)?;
        let engine = WoodburyEngine::new(
            base.equations,
            index,
            self.context.dense_backend().as_ref(),
        );
        let state = engine.compute_post_state(&pre_state, base.states, &mut elements)?;

        let mut flows = Vec::with_capacity(network.branches().len());
        for branch in network.branches() {
            let num = branch.num;
            let p1 = if contingency.opens(num)
                || opened_by_actions.contains(&num)
                || connectivity.lost_branches.contains(&num)
                || connectivity.touches_lost_bus(network, num)
            {
                0.0
            } else if let Some(element) = elements.iter().find(|e| e.branch_num == num) {
                engine.changed_flow(element, &state)?
            } else {
                base.equations.branch_flow(num, &state, index)
            };
            flows.push(BranchFlow {
                branch: branch.id,
                p1,
            });
        }
        Ok(Scenario {
            state,
            branch_flows: flows,
            connectivity,
        })
    }

    /// Refactorizes the base with the zero-impedance branches `opened`
    /// disabled, and computes the states of `branches` against it.
    fn refactorize(
        &self,
        opened: &[usize],
        branches: impl IntoIterator<Item = usize>,
    ) -> Result<LocalBase, AnalysisError> {
        let mut equations = self.context.equations().clone();
        for &num in opened {
            equations.set_branch_disabled(num, true);
        }
        let linear = DcLinearSystem::factorize(equations.system(), equations.reindex()?)?;
        let mut columns = ComputedElementIndex::new();
        for num in branches {
            columns.register(num);
        }
        let states = columns.compute_states(
            self.context.network(),
            &equations,
            &linear,
            self.context.parameters().max_states_matrix_bytes,
        )?;
        debug!(
            opened = opened.len(),
            dimension = linear.dimension(),
            "base refactorized for zero-impedance outages"
        );
        Ok(LocalBase {
            equations,
            linear,
            states,
            columns,
        })
    }
}

/// Zero-impedance branches have no flow terms to screen, so contingencies
/// holding one go straight to the graph.
fn classify(
    breaks: &ConnectivityBreakAnalysis<'_>,
    contingency: &ResolvedContingency,
    states: &Mat<f64>,
    columns: &ComputedElementIndex,
) -> ConnectivityOutcome {
    if contingency.zero_impedance.is_empty() {
        breaks.analyze(&contingency.id, &contingency.branches, states, columns)
    } else {
        breaks.confirm(&contingency.id, &contingency.all_branches())
    }
}

fn skip_action(action_id: &str, reason: &str, diagnostics: &mut Diagnostics) {
    warn!(action = %action_id, "{}, skipped", reason);
    diagnostics.add_warning_with_entity(
        "action",
        &format!("{}, skipped", reason),
        &format!("Action {}", action_id),
    );
}

fn action_kind(action: &Action) -> ComputedElementKind {
    match action {
        Action::BranchOutage { .. } => ComputedElementKind::BranchOutage,
        Action::SwitchToggle { open, .. } => ComputedElementKind::SwitchToggle { open: *open },
        Action::TapChange {
            phase_shift, ratio, ..
        } => ComputedElementKind::TapChange {
            phase_shift: phase_shift.map(|p| p.value()),
            ratio: *ratio,
        },
    }
}

/// Open/closed state, closed-state power factor and offset of a branch
/// within one scenario.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BranchSetting {
    closed: bool,
    closed_power_factor: f64,
    offset: f64,
    /// A tap change was applied; the branch may no longer be opened
    tapped: bool,
}

impl BranchSetting {
    fn parameters(&self) -> BranchParameters {
        BranchParameters {
            power_factor: if self.closed {
                self.closed_power_factor
            } else {
                0.0
            },
            offset: self.offset,
        }
    }
}

/// Branch settings touched by a scenario, starting from the base case.
struct ScenarioChanges<'a> {
    network: &'a LfNetwork,
    equations: &'a DcEquationSystem,
    settings: Vec<(usize, BranchSetting)>,
}

impl<'a> ScenarioChanges<'a> {
    fn new(network: &'a LfNetwork, equations: &'a DcEquationSystem) -> Self {
        Self {
            network,
            equations,
            settings: Vec::new(),
        }
    }

    fn base(&self, branch_num: usize) -> Option<BranchSetting> {
        let closed = self.equations.closed_branch(branch_num)?;
        Some(BranchSetting {
            closed: !self.equations.is_branch_disabled(branch_num),
            closed_power_factor: closed.power_factor,
            offset: base_parameters(self.equations, branch_num)?.offset,
            tapped: false,
        })
    }

    fn current(&self, branch_num: usize) -> Option<BranchSetting> {
        self.settings
            .iter()
            .find(|(num, _)| *num == branch_num)
            .map(|(_, setting)| *setting)
            .or_else(|| self.base(branch_num))
    }

    /// Applies one element; `Err` carries the reason it was a no-op or
    /// rejected.
    fn apply(&mut self, kind: ComputedElementKind, num: usize) -> Result<(), String> {
        let current = self
            .current(num)
            .ok_or_else(|| "branch is not modeled through its reactance".to_string())?;
        let mut setting = current;
        match kind {
            ComputedElementKind::BranchOutage => {
                if !setting.closed {
                    return Err("branch is already open".to_string());
                }
                if setting.tapped {
                    return Err("cannot open a branch whose tap is changed".to_string());
                }
                setting.closed = false;
            }
            ComputedElementKind::SwitchToggle { open } => {
                if setting.closed != open {
                    return Err(format!(
                        "switch is already {}",
                        if open { "open" } else { "closed" }
                    ));
                }
                if open && setting.tapped {
                    return Err("cannot open a branch whose tap is changed".to_string());
                }
                setting.closed = !open;
            }
            ComputedElementKind::TapChange { phase_shift, ratio } => {
                if !setting.closed {
                    return Err("tap change on an open branch".to_string());
                }
                let branch = self.network.branch(num);
                let parameters = self.equations.parameters();
                if let Some(phase) = phase_shift {
                    let tap_variable = self
                        .equations
                        .closed_branch(num)
                        .is_some_and(|c| c.alpha1.is_some());
                    setting.offset = if tap_variable {
                        phase - branch.phase_shift
                    } else {
                        phase
                    };
                }
                if let (Some(ratio), true) = (ratio, parameters.use_transformer_ratio) {
                    setting.closed_power_factor = branch.power_factor_with_ratio(ratio, true);
                }
                if setting == current {
                    return Err("tap change leaves the branch unchanged".to_string());
                }
                setting.tapped = true;
            }
        }

        match self.settings.iter_mut().find(|(n, _)| *n == num) {
            Some((_, existing)) => *existing = setting,
            None => self.settings.push((num, setting)),
        }
        Ok(())
    }

    /// Drops every change made to a branch.
    fn revert(&mut self, branch_num: usize) {
        self.settings.retain(|(num, _)| *num != branch_num);
    }

    /// Branches touched so far, in first-touched order.
    fn branches(&self) -> impl Iterator<Item = usize> + '_ {
        self.settings.iter().map(|(num, _)| *num)
    }

    /// Branches closed in the base and open now.
    fn opened(&self) -> impl Iterator<Item = usize> + '_ {
        self.settings
            .iter()
            .filter(|(num, setting)| !setting.closed && self.base(*num).is_some_and(|b| b.closed))
            .map(|(num, _)| *num)
    }

    /// Woodbury elements for every branch whose parameters differ from the
    /// base, in first-touched order, leaving out `excluded`.
    fn active_elements(
        &self,
        columns: &ComputedElementIndex,
        excluded: &BTreeSet<usize>,
    ) -> Result<Vec<ActiveElement>, WoodburyError> {
        let mut elements = Vec::new();
        for &(num, setting) in &self.settings {
            if excluded.contains(&num) {
                continue;
            }
            let before = self
                .base(num)
                .ok_or(WoodburyError::NotAClosedBranch(num))?
                .parameters();
            let after = setting.parameters();
            if before == after {
                continue;
            }
            let column = columns
                .column(num)
                .ok_or(WoodburyError::NotAClosedBranch(num))?;
            elements.push(ActiveElement::new(num, column, before, after));
        }
        Ok(elements)
    }
}

/// Maps independent scenarios, in parallel when the `parallel` feature is on.
#[cfg(feature = "parallel")]
fn map_scenarios<T, R, F>(items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    items.par_iter().map(f).collect()
}

#[cfg(not(feature = "parallel"))]
fn map_scenarios<T, R, F>(items: &[T], f: F) -> Vec<R>
where
    F: Fn(&T) -> R,
{
    items.iter().map(f).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dc::DcLoadFlowParameters;
    use crate::test_utils::{ring3, split_network, NetworkBuilder};
    use dcsa_core::Radians;

    fn b(id: usize) -> BranchId {
        BranchId::new(id)
    }

    #[test]
    fn ring_outage_reroutes_through_remaining_path() {
        let context = DcLoadFlowContext::new(&ring3(), DcLoadFlowParameters::default()).unwrap();
        let result = DcSecurityAnalysis::new(&context)
            .run(&[Contingency::single("c1", b(1))], &[], &[])
            .unwrap();
        let post = result.contingency("c1").unwrap();
        assert_eq!(post.status, ScenarioStatus::Converged);
        assert!(!post.connectivity.breaking);
        assert_eq!(post.flow(b(1)), Some(0.0));
        assert!((post.flow(b(3)).unwrap() - 2.0).abs() < 1e-9);
        // |ΔP| on the neighbour equals the pre-outage flow of the opened line
        let delta = post.flow(b(2)).unwrap() - result.base.flow(b(2)).unwrap();
        assert!((delta.abs() - result.base.flow(b(1)).unwrap()).abs() < 1e-9);
    }

    #[test]
    fn unresolvable_contingency_branches_are_warned() {
        let network = NetworkBuilder::new()
            .reference_bus(1)
            .bus(2)
            .bus(3)
            .line(1, 1, 2, 0.1)
            .line(2, 2, 3, 0.1)
            .line(3, 1, 3, 0.1)
            .line(4, 1, 2, 0.0)
            .open_line(5, 1, 3, 0.1)
            .generator(1, 1.0)
            .load(3, 1.0)
            .build();
        let context = DcLoadFlowContext::new(&network, DcLoadFlowParameters::default()).unwrap();
        let contingency = Contingency::new("mixed", vec![b(4), b(5), b(99), b(2), b(2)]);
        let result = DcSecurityAnalysis::new(&context)
            .run(&[contingency], &[], &[])
            .unwrap();
        let post = result.contingency("mixed").unwrap();
        assert!(post.status.is_converged(), "{:?}", post.status);
        // 5 is already open, 99 is unknown; the zero-impedance 4 is opened
        assert_eq!(post.diagnostics.warning_count(), 2);
        assert!(!post.connectivity.breaking);
        assert_eq!(post.flow(b(2)), Some(0.0));
        assert_eq!(post.flow(b(4)), Some(0.0));
        assert!(post.flow(b(1)).unwrap().abs() < 1e-9);
        assert!((post.flow(b(3)).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_impedance_radial_outage_loses_the_bus() {
        let network = NetworkBuilder::new()
            .reference_bus(1)
            .bus(2)
            .bus(3)
            .line(1, 1, 2, 0.1)
            .line(2, 2, 3, 0.0)
            .generator(1, 0.7)
            .load(3, 0.7)
            .build();
        let context = DcLoadFlowContext::new(&network, DcLoadFlowParameters::default()).unwrap();
        let analysis = DcSecurityAnalysis::new(&context);
        let contingency = Contingency::single("coupler", b(2));

        let breaks = analysis.detect_connectivity_breaks(&[contingency.clone()]).unwrap();
        assert!(breaks[0].as_ref().unwrap().breaking);

        let result = analysis.run(&[contingency], &[], &[]).unwrap();
        let post = result.contingency("coupler").unwrap();
        assert!(post.status.is_converged(), "{:?}", post.status);
        assert!(post.connectivity.breaking);
        assert_eq!(
            post.connectivity.lost_bus_ids(context.network()),
            vec![dcsa_core::BusId::new(3)]
        );
        assert_eq!(post.flow(b(2)), Some(0.0));
        assert!(post.flow(b(1)).unwrap().abs() < 1e-9);
    }

    #[test]
    fn zero_impedance_parallel_outage_moves_flow_to_the_other_coupler() {
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
        let context = DcLoadFlowContext::new(&network, DcLoadFlowParameters::default()).unwrap();
        let result = DcSecurityAnalysis::new(&context)
            .run(
                &[
                    Contingency::single("c2", b(2)),
                    Contingency::single("c3", b(3)),
                ],
                &[],
                &[],
            )
            .unwrap();

        let c2 = result.contingency("c2").unwrap();
        assert!(c2.status.is_converged(), "{:?}", c2.status);
        assert!(!c2.connectivity.breaking);
        assert_eq!(c2.flow(b(2)), Some(0.0));
        assert!((c2.flow(b(3)).unwrap() - 0.7).abs() < 1e-9);
        assert!((c2.flow(b(1)).unwrap() - 0.7).abs() < 1e-9);

        let c3 = result.contingency("c3").unwrap();
        assert!(c3.status.is_converged(), "{:?}", c3.status);
        assert_eq!(c3.flow(b(3)), Some(0.0));
        assert!((c3.flow(b(2)).unwrap() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn zero_impedance_loop_outages_match_the_remaining_tree() {
        // 1-2-3 tree closed into a ring by the coupler 3 and the line 4
        let network = NetworkBuilder::new()
            .reference_bus(1)
            .bus(2)
            .bus(3)
            .line(1, 1, 2, 0.1)
            .line(2, 2, 3, 0.2)
            .line(3, 1, 3, 0.0)
            .line(4, 1, 3, 0.1)
            .generator(1, 1.0)
            .load(2, 0.4)
            .load(3, 0.6)
            .build();
        let context = DcLoadFlowContext::new(&network, DcLoadFlowParameters::default()).unwrap();
        let result = DcSecurityAnalysis::new(&context)
            .run(
                &[
                    Contingency::single("coupler", b(3)),
                    Contingency::new("both", vec![b(3), b(4)]),
                ],
                &[],
                &[],
            )
            .unwrap();

        // the coupler alone: 1-3 through line 4 in a ring with 1-2-3
        let coupler = result.contingency("coupler").unwrap();
        assert!(coupler.status.is_converged(), "{:?}", coupler.status);
        assert_eq!(coupler.flow(b(3)), Some(0.0));
        let total = coupler.flow(b(1)).unwrap() + coupler.flow(b(4)).unwrap();
        assert!((total - 1.0).abs() < 1e-9);
        // equal angle drop from 1 to 3 over both paths
        let via_2 = 0.1 * coupler.flow(b(1)).unwrap() + 0.2 * coupler.flow(b(2)).unwrap();
        assert!((via_2 - 0.1 * coupler.flow(b(4)).unwrap()).abs() < 1e-9);

        let both = result.contingency("both").unwrap();
        assert!(both.status.is_converged(), "{:?}", both.status);
        assert!(!both.connectivity.breaking);
        assert!((both.flow(b(1)).unwrap() - 1.0).abs() < 1e-9);
        assert!((both.flow(b(2)).unwrap() - 0.6).abs() < 1e-9);
        assert_eq!(both.flow(b(3)), Some(0.0));
        assert_eq!(both.flow(b(4)), Some(0.0));
    }

    #[test]
    fn zero_impedance_branches_are_rejected_as_actions() {
        let network = NetworkBuilder::new()
            .reference_bus(1)
            .bus(2)
            .line(1, 1, 2, 0.1)
            .line(2, 1, 2, 0.0)
            .generator(1, 1.0)
            .load(2, 1.0)
            .build();
        let context = DcLoadFlowContext::new(&network, DcLoadFlowParameters::default()).unwrap();
        let strategy = OperatorStrategy::new("s", "c", vec!["open-2".to_string()]);
        let result = DcSecurityAnalysis::new(&context)
            .run(
                &[Contingency::new("c", vec![])],
                &[Action::outage("open-2", b(2))],
                &[strategy],
            )
            .unwrap();
        let strategy = result.operator_strategy("s").unwrap();
        assert!(strategy.status.is_converged());
        assert_eq!(strategy.diagnostics.warning_count(), 1);
        assert!((strategy.flow(b(2)).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn breaking_contingency_zeroes_lost_flows() {
        let context = DcLoadFlowContext::new(&split_network(), DcLoadFlowParameters::default()).unwrap();
        let result = DcSecurityAnalysis::new(&context)
            .run(&[Contingency::new("cut", vec![b(4), b(5)])], &[], &[])
            .unwrap();
        let post = result.contingency("cut").unwrap();
        assert!(post.status.is_converged(), "{:?}", post.status);
        assert!(post.connectivity.breaking);
        for id in [4, 5, 6] {
            assert_eq!(post.flow(b(id)), Some(0.0));
        }
    }

    #[test]
    fn action_opening_a_bridge_loses_the_buses_behind_it() {
        let context = DcLoadFlowContext::new(&split_network(), DcLoadFlowParameters::default()).unwrap();
        let actions = vec![
            Action::phase_tap("shift-6", b(6), Radians(0.05)),
            Action::outage("open-5", b(5)),
        ];
        let strategy = OperatorStrategy::new(
            "s",
            "c4",
            vec!["shift-6".to_string(), "open-5".to_string()],
        );
        let result = DcSecurityAnalysis::new(&context)
            .run(&[Contingency::single("c4", b(4))], &actions, &[strategy])
            .unwrap();
        assert!(!result.contingency("c4").unwrap().connectivity.breaking);

        let strategy = result.operator_strategy("s").unwrap();
        assert!(strategy.status.is_converged(), "{:?}", strategy.status);
        assert!(strategy.connectivity.breaking);
        assert_eq!(
            strategy.connectivity.lost_bus_ids(context.network()),
            vec![dcsa_core::BusId::new(4), dcsa_core::BusId::new(5)]
        );
        // the split itself, then shift-6 dropped with bus 4 and 5
        assert_eq!(strategy.diagnostics.warning_count(), 2);
        for id in [4, 5, 6] {
            assert_eq!(strategy.flow(b(id)), Some(0.0));
        }
        // loads 2 and 3 remain in the main component
        let served = strategy.flow(b(1)).unwrap() + strategy.flow(b(3)).unwrap();
        assert!((served - 1.0).abs() < 1e-9);
    }

    fn tapped_ring() -> dcsa_core::Network {
        NetworkBuilder::new()
            .reference_bus(1)
            .bus(2)
            .bus(3)
            .line(1, 1, 2, 0.1)
            .phase_shifter(2, 2, 3, 0.1, Radians(0.0))
            .line(3, 1, 3, 0.1)
            .line(4, 2, 3, 0.1)
            .generator(1, 2.0)
            .load(2, 1.0)
            .load(3, 1.0)
            .build()
    }

    #[test]
    fn tapped_branch_cannot_be_opened_in_either_order() {
        let context = DcLoadFlowContext::new(&tapped_ring(), DcLoadFlowParameters::default()).unwrap();
        let tap = ComputedElementKind::TapChange {
            phase_shift: Some(0.1),
            ratio: None,
        };
        let open = ComputedElementKind::SwitchToggle { open: true };

        let mut changes = ScenarioChanges::new(context.network(), context.equations());
        changes.apply(tap, 1).unwrap();
        assert!(changes.apply(ComputedElementKind::BranchOutage, 1).is_err());
        assert!(changes.apply(open, 1).is_err());

        let mut changes = ScenarioChanges::new(context.network(), context.equations());
        changes.apply(open, 1).unwrap();
        assert!(changes.apply(tap, 1).is_err());

        let actions = vec![
            Action::phase_tap("tap", b(2), Radians(0.1)),
            Action::switch("open", b(2), true),
        ];
        let strategies = vec![
            OperatorStrategy::new("tap-open", "c1", vec!["tap".to_string(), "open".to_string()]),
            OperatorStrategy::new("open-tap", "c1", vec!["open".to_string(), "tap".to_string()]),
        ];
        let result = DcSecurityAnalysis::new(&context)
            .run(&[Contingency::single("c1", b(1))], &actions, &strategies)
            .unwrap();

        let tap_open = result.operator_strategy("tap-open").unwrap();
        assert!(tap_open.status.is_converged(), "{:?}", tap_open.status);
        assert_eq!(tap_open.diagnostics.warning_count(), 1);
        assert!(tap_open.flow(b(2)).unwrap().abs() > 1e-6);

        let open_tap = result.operator_strategy("open-tap").unwrap();
        assert!(open_tap.status.is_converged(), "{:?}", open_tap.status);
        assert_eq!(open_tap.diagnostics.warning_count(), 1);
        assert_eq!(open_tap.flow(b(2)), Some(0.0));
        // bus 2 is now fed from bus 3 through line 4 alone
        assert!((open_tap.flow(b(4)).unwrap() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn strategy_actions_are_validated() {
        let network = NetworkBuilder::new()
            .reference_bus(1)
            .bus(2)
            .bus(3)
            .line(1, 1, 2, 0.1)
            .line(2, 2, 3, 0.1)
            .line(3, 1, 3, 0.1)
            .open_line(4, 1, 2, 0.1)
            .generator(1, 2.0)
            .load(2, 1.0)
            .load(3, 1.0)
            .build();
        let context = DcLoadFlowContext::new(&network, DcLoadFlowParameters::default()).unwrap();
        let actions = vec![
            Action::switch("close-4", b(4), false),
            Action::switch("open-4", b(4), true),
            Action::phase_tap("tap-1", b(1), Radians(0.1)),
            Action::outage("ghost", b(42)),
        ];
        let strategy = OperatorStrategy::new(
            "s1",
            "c1",
            vec![
                "open-4".to_string(),
                "close-4".to_string(),
                "tap-1".to_string(),
                "ghost".to_string(),
                "missing".to_string(),
            ],
        );
        let result = DcSecurityAnalysis::new(&context)
            .run(&[Contingency::single("c1", b(1))], &actions, &[strategy])
            .unwrap();
        let strategy = result.operator_strategy("s1").unwrap();
        assert!(strategy.status.is_converged());
        // open-4 (already open), tap-1 (opened by c1), ghost and missing
        assert_eq!(strategy.diagnostics.warning_count(), 4);
        // branch 4 duplicates branch 1, so closing it restores the base flows
        assert_eq!(strategy.flow(b(1)), Some(0.0));
        assert!((strategy.flow(b(4)).unwrap() - 1.0).abs() < 1e-9);
        assert!((strategy.flow(b(3)).unwrap() - 1.0).abs() < 1e-9);
        assert!(strategy.flow(b(2)).unwrap().abs() < 1e-9);
    }

    #[test]
    fn unknown_strategy_contingency_fails_that_strategy() {
        let context = DcLoadFlowContext::new(&ring3(), DcLoadFlowParameters::default()).unwrap();
        let strategy = OperatorStrategy::new("s1", "nope", vec![]);
        let result = DcSecurityAnalysis::new(&context).run(&[], &[], &[strategy]).unwrap();
        assert!(matches!(
            result.operator_strategy("s1").unwrap().status,
            ScenarioStatus::Failed(_)
        ));
        assert_eq!(result.diagnostics.issues_by_category("contingency").count(), 1);
    }

    #[test]
    fn index_elements_orders_contingencies_before_actions() {
        let context = DcLoadFlowContext::new(&ring3(), DcLoadFlowParameters::default()).unwrap();
        let analysis = DcSecurityAnalysis::new(&context);
        let columns = analysis.index_elements(
            &[Contingency::single("c", b(3))],
            &[Action::outage("a", b(1)), Action::outage("a2", b(3))],
        );
        assert_eq!(columns.branches(), &[2, 0]);
    }

    #[test]
    fn scenario_changes_track_switch_state() {
        let context = DcLoadFlowContext::new(&ring3(), DcLoadFlowParameters::default()).unwrap();
        let mut changes = ScenarioChanges::new(context.network(), context.equations());
        let close = ComputedElementKind::SwitchToggle { open: false };
        let open = ComputedElementKind::SwitchToggle { open: true };
        assert!(changes.apply(close, 0).is_err());
        changes.apply(open, 0).unwrap();
        assert!(changes.apply(ComputedElementKind::BranchOutage, 0).is_err());
        changes.apply(close, 0).unwrap();

        let mut columns = ComputedElementIndex::new();
        columns.register(0);
        // closed again: nothing differs from the base
        assert!(changes.active_elements(&columns, &BTreeSet::new()).unwrap().is_empty());
    }
}
