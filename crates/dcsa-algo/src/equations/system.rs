use super::equation::{ElementState, Equation, EquationId, EquationType};
use super::index::EquationIndex;
use super::term::{EquationTerm, TermId};
use super::variable::{ElementType, Variable, VariableType};
use sprs::{CsMat, TriMat};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum EquationError {
    #[error("{element_type} {element_num} does not exist ({count} known)")]
    ElementOutOfRange {
        element_type: ElementType,
        element_num: usize,
        count: usize,
    },

    #[error("{kind:?} on element {element_num} conflicts with an existing equation: {reason}")]
    Conflict {
        kind: EquationType,
        element_num: usize,
        reason: String,
    },

    #[error("Unknown variable {0}")]
    UnknownVariable(Variable),

    #[error("Unknown equation id {0}")]
    UnknownEquation(usize),

    #[error("System is not square: {equations} active equations for {variables} variables")]
    NotSquare { equations: usize, variables: usize },
}

#[derive(Debug, Clone)]
struct TermEntry {
    term: EquationTerm,
    equation: EquationId,
    state: ElementState,
}

/// Variables, equations and terms of one case, with their activation states.
///
/// Variables are never deactivated: squareness is kept by pairing equation
/// transitions (see the DC builder).
#[derive(Debug, Clone)]
pub struct EquationSystem {
    bus_count: usize,
    branch_count: usize,
    variables: Vec<Variable>,
    known_variables: HashSet<Variable>,
    equations: Vec<Equation>,
    equation_ids: HashMap<(usize, EquationType), EquationId>,
    terms: Vec<TermEntry>,
}

impl EquationSystem {
    pub fn new(bus_count: usize, branch_count: usize) -> Self {
        Self {
            bus_count,
            branch_count,
            variables: Vec::new(),
            known_variables: HashSet::new(),
            equations: Vec::new(),
            equation_ids: HashMap::new(),
            terms: Vec::new(),
        }
    }

    fn check_element(&self, element_type: ElementType, element_num: usize) -> Result<(), EquationError> {
        let count = match element_type {
            ElementType::Bus => self.bus_count,
            ElementType::Branch => self.branch_count,
        };
        if element_num >= count {
            return Err(EquationError::ElementOutOfRange {
                element_type,
                element_num,
                count,
            });
        }
        Ok(())
    }

    /// Lookup-or-create.
    pub fn create_variable(
        &mut self,
        element_num: usize,
        kind: VariableType,
    ) -> Result<Variable, EquationError> {
        self.check_element(kind.element_type(), element_num)?;
        let variable = Variable::new(element_num, kind);
        if self.known_variables.insert(variable) {
            self.variables.push(variable);
        }
        Ok(variable)
    }

    pub fn get_variable(&self, element_num: usize, kind: VariableType) -> Option<Variable> {
        let variable = Variable::new(element_num, kind);
        self.known_variables.contains(&variable).then_some(variable)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Lookup-or-create. A second reference-angle equation on another bus is a
    /// conflict: the system can only have one fixed angle.
    pub fn create_equation(
        &mut self,
        element_num: usize,
        kind: EquationType,
    ) -> Result<EquationId, EquationError> {
        self.check_element(kind.element_type(), element_num)?;
        if let Some(id) = self.equation_ids.get(&(element_num, kind)) {
            return Ok(*id);
        }
        if kind == EquationType::BusTargetPhi {
            if let Some(existing) = self
                .equations
                .iter()
                .find(|eq| eq.kind == EquationType::BusTargetPhi)
            {
                return Err(EquationError::Conflict {
                    kind,
                    element_num,
                    reason: format!("bus {} already fixes the reference angle", existing.element_num),
                });
            }
        }

        let id = EquationId(self.equations.len());
        self.equations.push(Equation::new(element_num, kind));
        self.equation_ids.insert((element_num, kind), id);
        Ok(id)
    }

    pub fn get_equation(&self, element_num: usize, kind: EquationType) -> Option<EquationId> {
        self.equation_ids.get(&(element_num, kind)).copied()
    }

    pub fn equation(&self, id: EquationId) -> &Equation {
        &self.equations[id.0]
    }

    pub fn equations(&self) -> &[Equation] {
        &self.equations
    }

    pub fn set_equation_target(&mut self, id: EquationId, target: f64) {
        self.equations[id.0].target = target;
    }

    /// Appends a term to an equation; every variable of the term must exist.
    pub fn add_term(&mut self, equation: EquationId, term: EquationTerm) -> Result<TermId, EquationError> {
        if equation.0 >= self.equations.len() {
            return Err(EquationError::UnknownEquation(equation.0));
        }
        if let Some(missing) = term
            .variables()
            .into_iter()
            .find(|v| !self.known_variables.contains(v))
        {
            return Err(EquationError::UnknownVariable(missing));
        }
        let id = TermId(self.terms.len());
        self.terms.push(TermEntry {
            term,
            equation,
            state: ElementState::Active,
        });
        self.equations[equation.0].terms.push(id);
        Ok(id)
    }

    pub fn term(&self, id: TermId) -> &EquationTerm {
        &self.terms[id.0].term
    }

    pub fn term_state(&self, id: TermId) -> ElementState {
        self.terms[id.0].state
    }

    pub fn term_equation(&self, id: TermId) -> EquationId {
        self.terms[id.0].equation
    }

    pub fn set_equation_active(&mut self, id: EquationId, active: bool) {
        let equation = &mut self.equations[id.0];
        equation.state = ElementState::from_active(active);
        trace!(equation = %equation, active, "equation state changed");
    }

    pub fn set_term_active(&mut self, id: TermId, active: bool) {
        self.terms[id.0].state = ElementState::from_active(active);
    }

    pub fn active_equation_count(&self) -> usize {
        self.equations.iter().filter(|eq| eq.is_active()).count()
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn is_square(&self) -> bool {
        self.active_equation_count() == self.variable_count()
    }

    /// Numbers variables (rows) and active equations (columns) in creation
    /// order and returns the frozen snapshot.
    pub fn reindex(&self) -> Result<Arc<EquationIndex>, EquationError> {
        let mut next_column = 0;
        let columns: Vec<Option<usize>> = self
            .equations
            .iter()
            .map(|eq| {
                eq.is_active().then(|| {
                    next_column += 1;
                    next_column - 1
                })
            })
            .collect();

        if next_column != self.variables.len() {
            return Err(EquationError::NotSquare {
                equations: next_column,
                variables: self.variables.len(),
            });
        }
        Ok(Arc::new(EquationIndex::new(self.variables.clone(), columns)))
    }

    /// Assembles `M[row(v)][column(eq)] = ∂eq/∂v` from active terms of active
    /// equations.
    pub fn matrix(&self, index: &EquationIndex) -> CsMat<f64> {
        let n = index.dimension();
        let mut triplets = TriMat::new((n, n));
        for (column, id) in index.column_equations().iter().enumerate() {
            for term_id in &self.equations[id.0].terms {
                let entry = &self.terms[term_id.0];
                if !entry.state.is_active() {
                    continue;
                }
                for variable in entry.term.variables() {
                    let der = entry.term.der(&variable);
                    if der == 0.0 {
                        continue;
                    }
                    if let Some(row) = index.row(&variable) {
                        triplets.add_triplet(row, column, der);
                    }
                }
            }
        }
        triplets.to_csc()
    }

    /// Right-hand side per column: `target(eq) − Σ rhs(active terms)`.
    pub fn target_vector(&self, index: &EquationIndex) -> Vec<f64> {
        self.target_vector_with(index, Equation::target)
    }

    /// Same as [`target_vector`](Self::target_vector) with the equation targets
    /// supplied by `target_of`.
    pub fn target_vector_with<F>(&self, index: &EquationIndex, target_of: F) -> Vec<f64>
    where
        F: Fn(&Equation) -> f64,
    {
        index
            .column_equations()
            .iter()
            .map(|id| {
                let equation = &self.equations[id.0];
                let constants: f64 = equation
                    .terms
                    .iter()
                    .map(|t| &self.terms[t.0])
                    .filter(|entry| entry.state.is_active())
                    .map(|entry| entry.term.rhs())
                    .sum();
                target_of(equation) - constants
            })
            .collect()
    }

    /// Evaluates an active equation's left-hand side at `state`.
    pub fn evaluate(&self, id: EquationId, state: &[f64], index: &EquationIndex) -> f64 {
        self.equations[id.0]
            .terms
            .iter()
            .map(|t| &self.terms[t.0])
            .filter(|entry| entry.state.is_active())
            .map(|entry| entry.term.value(state, index))
            .sum()
    }
}
