use serde::Serialize;
use std::fmt;

/// Kind of network element a variable or equation is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Bus,
    Branch,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Bus => write!(f, "bus"),
            ElementType::Branch => write!(f, "branch"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum VariableType {
    /// Bus voltage angle
    BusPhi,
    /// Phase-shifter tap angle on side 1
    BranchAlpha1,
    /// Power through a zero-impedance branch
    DummyP,
}

impl VariableType {
    pub fn element_type(self) -> ElementType {
        match self {
            VariableType::BusPhi => ElementType::Bus,
            VariableType::BranchAlpha1 | VariableType::DummyP => ElementType::Branch,
        }
    }
}

/// A solver unknown, identified by element number and kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Variable {
    pub element_num: usize,
    pub kind: VariableType,
}

impl Variable {
    pub fn new(element_num: usize, kind: VariableType) -> Self {
        Self { element_num, kind }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.element_num)
    }
}
