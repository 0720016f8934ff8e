//! Linear terms contributing to an equation's left-hand side.
//!
//! Every term is affine in its variables: `value(x) = Σ der(v)·x[v] + rhs()`.
//! The constant part moves to the right-hand side when the target vector is
//! built.

use super::index::EquationIndex;
use super::variable::Variable;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TermId(pub(crate) usize);

impl TermId {
    pub fn value(self) -> usize {
        self.0
    }
}

/// DC flow through a closed branch.
///
/// With `a1` either the constant phase shift or the tap variable:
///
/// ```text
/// p1 = -pf·(φ2 − φ1 − a1)
/// p2 = +pf·(φ2 − φ1 − a1)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BranchFlowTerm {
    pub branch_num: usize,
    pub phi1: Variable,
    pub phi2: Variable,
    /// Tap angle exposed as a variable; `None` uses `a1`
    pub alpha1: Option<Variable>,
    pub power_factor: f64,
    pub a1: f64,
}

impl BranchFlowTerm {
    fn constant_a1(&self) -> f64 {
        if self.alpha1.is_some() {
            0.0
        } else {
            self.a1
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EquationTerm {
    /// `coefficient · variable`
    Variable { variable: Variable, coefficient: f64 },
    ClosedBranchSide1Flow(BranchFlowTerm),
    ClosedBranchSide2Flow(BranchFlowTerm),
}

impl EquationTerm {
    pub fn variable(variable: Variable, coefficient: f64) -> Self {
        EquationTerm::Variable {
            variable,
            coefficient,
        }
    }

    pub fn variables(&self) -> Vec<Variable> {
        match self {
            EquationTerm::Variable { variable, .. } => vec![*variable],
            EquationTerm::ClosedBranchSide1Flow(flow)
            | EquationTerm::ClosedBranchSide2Flow(flow) => {
                let mut vars = vec![flow.phi1];
                if flow.phi2 != flow.phi1 {
                    vars.push(flow.phi2);
                }
                vars.extend(flow.alpha1);
                vars
            }
        }
    }

    /// Partial derivative with respect to `variable`; zero if not involved.
    pub fn der(&self, variable: &Variable) -> f64 {
        match self {
            EquationTerm::Variable {
                variable: v,
                coefficient,
            } => {
                if v == variable {
                    *coefficient
                } else {
                    0.0
                }
            }
            EquationTerm::ClosedBranchSide1Flow(flow) => side_derivative(flow, variable),
            EquationTerm::ClosedBranchSide2Flow(flow) => -side_derivative(flow, variable),
        }
    }

    /// Constant part of the term.
    pub fn rhs(&self) -> f64 {
        match self {
            EquationTerm::Variable { .. } => 0.0,
            EquationTerm::ClosedBranchSide1Flow(flow) => flow.power_factor * flow.constant_a1(),
            EquationTerm::ClosedBranchSide2Flow(flow) => -flow.power_factor * flow.constant_a1(),
        }
    }

    pub fn value(&self, state: &[f64], index: &EquationIndex) -> f64 {
        let linear: f64 = self
            .variables()
            .iter()
            .map(|v| index.row(v).map_or(0.0, |row| self.der(v) * state[row]))
            .sum();
        linear + self.rhs()
    }
}

/// Derivative of the side-1 flow: `pf·(φ1 − φ2 + a1)`.
fn side_derivative(flow: &BranchFlowTerm, variable: &Variable) -> f64 {
    let mut der = 0.0;
    if *variable == flow.phi1 {
        der += flow.power_factor;
    }
    if *variable == flow.phi2 {
        der -= flow.power_factor;
    }
    if Some(*variable) == flow.alpha1 {
        der += flow.power_factor;
    }
    der
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equations::VariableType;

    fn flow(alpha1: Option<Variable>) -> BranchFlowTerm {
        BranchFlowTerm {
            branch_num: 0,
            phi1: Variable::new(0, VariableType::BusPhi),
            phi2: Variable::new(1, VariableType::BusPhi),
            alpha1,
            power_factor: 10.0,
            a1: 0.05,
        }
    }

    #[test]
    fn sides_have_opposite_derivatives() {
        let side1 = EquationTerm::ClosedBranchSide1Flow(flow(None));
        let side2 = EquationTerm::ClosedBranchSide2Flow(flow(None));
        let phi1 = Variable::new(0, VariableType::BusPhi);
        let phi2 = Variable::new(1, VariableType::BusPhi);
        assert_eq!(side1.der(&phi1), 10.0);
        assert_eq!(side1.der(&phi2), -10.0);
        assert_eq!(side2.der(&phi1), -10.0);
        assert_eq!(side2.der(&phi2), 10.0);
        assert_eq!(side1.der(&Variable::new(2, VariableType::BusPhi)), 0.0);
    }

    #[test]
    fn constant_shift_moves_to_rhs() {
        let side1 = EquationTerm::ClosedBranchSide1Flow(flow(None));
        let side2 = EquationTerm::ClosedBranchSide2Flow(flow(None));
        assert!((side1.rhs() - 0.5).abs() < 1e-12);
        assert!((side2.rhs() + 0.5).abs() < 1e-12);
    }

    #[test]
    fn tap_variable_replaces_constant() {
        let alpha = Variable::new(0, VariableType::BranchAlpha1);
        let side1 = EquationTerm::ClosedBranchSide1Flow(flow(Some(alpha)));
        assert_eq!(side1.rhs(), 0.0);
        assert_eq!(side1.der(&alpha), 10.0);
        assert_eq!(side1.variables().len(), 3);
    }

    #[test]
    fn self_loop_has_no_angle_sensitivity() {
        let mut looped = flow(None);
        looped.phi2 = looped.phi1;
        let side1 = EquationTerm::ClosedBranchSide1Flow(looped);
        assert_eq!(side1.variables().len(), 1);
        assert_eq!(side1.der(&Variable::new(0, VariableType::BusPhi)), 0.0);
    }
}
