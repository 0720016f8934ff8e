//! # dcsa-core: Network Model for DC Security Analysis
//!
//! Provides the network graph, element types and the connectivity machinery
//! consumed by the DC contingency engine in `dcsa-algo`.
//!
//! ## Design Philosophy
//!
//! Networks are modeled as **undirected multigraphs** where:
//! - **Nodes**: Buses, Generators, Loads
//! - **Edges**: Branches (lines, transformers, phase shifters, switches)
//!
//! Parallel branches between the same buses are ordinary parallel edges.
//!
//! ## Quick Start
//!
//! ```rust
//! use dcsa_core::*;
//!
//! let mut network = Network::new();
//!
//! let b1 = network.graph.add_node(Node::Bus(Bus::new(BusId::new(1), "Bus 1").as_reference()));
//! let b2 = network.graph.add_node(Node::Bus(Bus::new(BusId::new(2), "Bus 2")));
//!
//! network.graph.add_node(Node::Gen(Gen::new(GenId::new(1), "Gen 1", BusId::new(1), PerUnit(1.0))));
//! network.graph.add_node(Node::Load(Load::new(LoadId::new(1), "Load 1", BusId::new(2), PerUnit(1.0))));
//!
//! network.graph.add_edge(
//!     b1,
//!     b2,
//!     Edge::Branch(Branch::new(BranchId::new(1), "Line 1-2", BusId::new(1), BusId::new(2), 0.1)),
//! );
//!
//! assert!(network.validate().is_ok());
//! ```
//!
//! ## Modules
//!
//! - [`connectivity`] - Connected components with reversible temporary edits
//! - [`diagnostics`] - Soft warnings attached to cases and scenarios
//! - [`graph_utils`] - Island detection on the raw network graph
//! - [`solver`] - Small dense linear solves

use petgraph::{prelude::*, Undirected};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub mod connectivity;
pub mod diagnostics;
pub mod error;
pub mod graph_utils;
pub mod solver;
pub mod units;

pub use connectivity::{GraphConnectivity, NaiveGraphConnectivity, TemporaryChanges};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{GridError, GridResult};
pub use graph_utils::*;
pub use petgraph::graph::NodeIndex;
pub use solver::*;
pub use units::{PerUnit, Radians};

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadId(usize);

macro_rules! impl_id {
    ($type:ident) => {
        impl $type {
            #[inline]
            pub fn new(value: usize) -> Self {
                $type(value)
            }
            #[inline]
            pub fn value(&self) -> usize {
                self.0
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

impl_id!(BusId);
impl_id!(BranchId);
impl_id!(GenId);
impl_id!(LoadId);

#[derive(Debug, Clone)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    /// Reference (slack) bus: its angle is fixed and it absorbs the imbalance
    pub is_reference: bool,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            id: BusId(0),
            name: String::new(),
            is_reference: false,
        }
    }
}

impl Bus {
    pub fn new(id: BusId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn as_reference(mut self) -> Self {
        self.is_reference = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    /// Series reactance (per-unit)
    pub reactance: f64,
    /// Multiplicative tap magnitude applied from from_bus to to_bus
    pub tap_ratio: f64,
    /// Phase shift applied on the from_bus side
    pub phase_shift: Radians,
    /// Operational status flag (false = open)
    pub status: bool,
    /// Phase-shifting transformer whose tap may be exposed as a solver variable
    pub is_phase_shifter: bool,
}

impl Default for Branch {
    fn default() -> Self {
        Self {
            id: BranchId(0),
            name: String::new(),
            from_bus: BusId(0),
            to_bus: BusId(0),
            reactance: 0.0,
            tap_ratio: 1.0,
            phase_shift: Radians(0.0),
            status: true,
            is_phase_shifter: false,
        }
    }
}

impl Branch {
    pub fn new(
        id: BranchId,
        name: impl Into<String>,
        from_bus: BusId,
        to_bus: BusId,
        reactance: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            from_bus,
            to_bus,
            reactance,
            ..Self::default()
        }
    }

    pub fn with_tap_ratio(mut self, ratio: f64) -> Self {
        self.tap_ratio = ratio;
        self
    }

    /// Mark branch as phase-shifting transformer with an initial shift.
    pub fn as_phase_shifter(mut self, phase_shift: Radians) -> Self {
        self.is_phase_shifter = true;
        self.phase_shift = phase_shift;
        self
    }

    pub fn opened(mut self) -> Self {
        self.status = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Gen {
    pub id: GenId,
    pub name: String,
    pub bus: BusId,
    /// Active power output (per-unit)
    pub active_power: PerUnit,
    pub status: bool,
}

impl Gen {
    pub fn new(id: GenId, name: impl Into<String>, bus: BusId, active_power: PerUnit) -> Self {
        Self {
            id,
            name: name.into(),
            bus,
            active_power,
            status: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Load {
    pub id: LoadId,
    pub name: String,
    pub bus: BusId,
    /// Active power demand (per-unit)
    pub active_power: PerUnit,
}

impl Load {
    pub fn new(id: LoadId, name: impl Into<String>, bus: BusId, active_power: PerUnit) -> Self {
        Self {
            id,
            name: name.into(),
            bus,
            active_power,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Bus(Bus),
    Gen(Gen),
    Load(Load),
}

#[derive(Debug, Clone)]
pub enum Edge {
    Branch(Branch),
}

/// The core power network graph
#[derive(Debug, Clone, Default)]
pub struct Network {
    pub graph: Graph<Node, Edge, Undirected>,
}

impl Network {
    pub fn new() -> Self {
        Self {
            graph: Graph::new_undirected(),
        }
    }

    /// Check the structural invariants the DC model relies on.
    ///
    /// Fails on the first structural defect: duplicate bus ids, more than one
    /// reference bus, branches or injections referencing unknown buses, and
    /// non-finite branch parameters.
    pub fn validate(&self) -> GridResult<()> {
        let mut bus_ids = HashSet::new();
        let mut reference: Option<BusId> = None;
        for bus in self.buses() {
            if !bus_ids.insert(bus.id) {
                return Err(GridError::Network(format!("duplicate bus id {}", bus.id)));
            }
            if bus.is_reference {
                if let Some(first) = reference {
                    return Err(GridError::Network(format!(
                        "more than one reference bus: {} and {}",
                        first, bus.id
                    )));
                }
                reference = Some(bus.id);
            }
        }

        for branch in self.branches() {
            for bus in [branch.from_bus, branch.to_bus] {
                if !bus_ids.contains(&bus) {
                    return Err(GridError::Network(format!(
                        "branch {} references unknown bus {}",
                        branch.id, bus
                    )));
                }
            }
            if !branch.reactance.is_finite()
                || !branch.tap_ratio.is_finite()
                || !branch.phase_shift.is_finite()
            {
                return Err(GridError::Network(format!(
                    "branch {} has non-finite parameters",
                    branch.id
                )));
            }
        }

        for node in self.graph.node_weights() {
            let (kind, bus) = match node {
                Node::Gen(g) => ("generator", g.bus),
                Node::Load(l) => ("load", l.bus),
                Node::Bus(_) => continue,
            };
            if !bus_ids.contains(&bus) {
                return Err(GridError::Network(format!(
                    "{} '{}' references unknown bus {}",
                    kind,
                    node.label(),
                    bus
                )));
            }
        }

        Ok(())
    }

    /// Net active injection (generation minus load) per bus, per-unit.
    pub fn bus_injection(&self, bus_id: BusId) -> PerUnit {
        let mut injection = PerUnit(0.0);
        for node in self.graph.node_weights() {
            match node {
                Node::Gen(g) if g.bus == bus_id && g.status => injection += g.active_power,
                Node::Load(l) if l.bus == bus_id => injection += -l.active_power,
                _ => {}
            }
        }
        injection
    }

    pub fn buses(&self) -> Vec<&Bus> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Bus(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    pub fn branches(&self) -> Vec<&Branch> {
        self.graph
            .edge_weights()
            .map(|e| match e {
                Edge::Branch(b) => b,
            })
            .collect()
    }

    pub fn branch(&self, id: BranchId) -> Option<&Branch> {
        self.branches().into_iter().find(|b| b.id == id)
    }

    pub fn branch_mut(&mut self, id: BranchId) -> Option<&mut Branch> {
        self.graph.edge_weights_mut().find_map(|e| match e {
            Edge::Branch(b) if b.id == id => Some(b),
            _ => None,
        })
    }
}

impl Node {
    /// Human-readable label for diagnostics
    pub fn label(&self) -> &str {
        match self {
            Node::Bus(bus) => &bus.name,
            Node::Gen(gen) => &gen.name,
            Node::Load(load) => &load.name,
        }
    }
}

impl Edge {
    pub fn label(&self) -> &str {
        match self {
            Edge::Branch(branch) => &branch.name,
        }
    }
}
