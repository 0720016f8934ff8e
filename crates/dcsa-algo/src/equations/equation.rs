use super::term::TermId;
use super::variable::ElementType;
use serde::Serialize;
use std::fmt;

/// Activation state of an equation or a term.
///
/// Transitions never renumber anything; rows and columns only move at
/// [`EquationSystem::reindex`](super::EquationSystem::reindex).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ElementState {
    #[default]
    Active,
    Inactive,
}

impl ElementState {
    pub fn from_active(active: bool) -> Self {
        if active {
            ElementState::Active
        } else {
            ElementState::Inactive
        }
    }

    pub fn is_active(self) -> bool {
        self == ElementState::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EquationType {
    /// Active power balance at a bus
    BusTargetP,
    /// Fixed angle at the reference bus
    BusTargetPhi,
    /// Fixed phase-shifter tap angle
    BranchTargetAlpha1,
    /// Equal angles across a zero-impedance branch
    ZeroPhi,
    /// Zero power through a zero-impedance branch
    DummyTargetP,
}

impl EquationType {
    pub fn element_type(self) -> ElementType {
        match self {
            EquationType::BusTargetP | EquationType::BusTargetPhi => ElementType::Bus,
            EquationType::BranchTargetAlpha1
            | EquationType::ZeroPhi
            | EquationType::DummyTargetP => ElementType::Branch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EquationId(pub(crate) usize);

impl EquationId {
    pub fn value(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Equation {
    pub element_num: usize,
    pub kind: EquationType,
    pub(crate) terms: Vec<TermId>,
    pub(crate) state: ElementState,
    pub(crate) target: f64,
}

impl Equation {
    pub(crate) fn new(element_num: usize, kind: EquationType) -> Self {
        Self {
            element_num,
            kind,
            terms: Vec::new(),
            state: ElementState::Active,
            target: 0.0,
        }
    }

    /// Terms in insertion order.
    pub fn terms(&self) -> &[TermId] {
        &self.terms
    }

    pub fn state(&self) -> ElementState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn target(&self) -> f64 {
        self.target
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.element_num)
    }
}
