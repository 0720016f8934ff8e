//! Small networks for tests and doc examples.
//!
//! All reactances are per-unit; generators and loads are per-unit active
//! power. Buses are added to the graph before anything else, in the order
//! they were declared, so bus numbers follow declaration order.

use dcsa_core::{
    Branch, BranchId, Bus, BusId, Edge, Gen, GenId, Load, LoadId, Network, Node, NodeIndex,
    PerUnit, Radians,
};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct NetworkBuilder {
    buses: Vec<Bus>,
    branches: Vec<Branch>,
    injections: Vec<(usize, f64)>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reference_bus(mut self, id: usize) -> Self {
        self.buses
            .push(Bus::new(BusId::new(id), format!("Bus {}", id)).as_reference());
        self
    }

    pub fn bus(mut self, id: usize) -> Self {
        self.buses.push(Bus::new(BusId::new(id), format!("Bus {}", id)));
        self
    }

    fn branch(id: usize, from: usize, to: usize, x: f64) -> Branch {
        Branch::new(
            BranchId::new(id),
            format!("Branch {}", id),
            BusId::new(from),
            BusId::new(to),
            x,
        )
    }

    pub fn line(mut self, id: usize, from: usize, to: usize, x: f64) -> Self {
        self.branches.push(Self::branch(id, from, to, x));
        self
    }

    /// A line that is open in the base case.
    pub fn open_line(mut self, id: usize, from: usize, to: usize, x: f64) -> Self {
        self.branches.push(Self::branch(id, from, to, x).opened());
        self
    }

    pub fn transformer(mut self, id: usize, from: usize, to: usize, x: f64, ratio: f64) -> Self {
        self.branches
            .push(Self::branch(id, from, to, x).with_tap_ratio(ratio));
        self
    }

    pub fn phase_shifter(
        mut self,
        id: usize,
        from: usize,
        to: usize,
        x: f64,
        phase_shift: Radians,
    ) -> Self {
        self.branches
            .push(Self::branch(id, from, to, x).as_phase_shifter(phase_shift));
        self
    }

    pub fn generator(mut self, bus: usize, p: f64) -> Self {
        self.injections.push((bus, p));
        self
    }

    pub fn load(mut self, bus: usize, p: f64) -> Self {
        self.injections.push((bus, -p));
        self
    }

    /// Builds the graph; buses only referenced by a branch or an injection
    /// are created on the fly.
    pub fn build(self) -> Network {
        let mut network = Network::new();
        let mut nodes: HashMap<usize, NodeIndex> = HashMap::new();
        for bus in self.buses {
            let id = bus.id.value();
            nodes
                .entry(id)
                .or_insert_with(|| network.graph.add_node(Node::Bus(bus)));
        }
        let mut node_of = |network: &mut Network, id: usize| {
            *nodes.entry(id).or_insert_with(|| {
                network
                    .graph
                    .add_node(Node::Bus(Bus::new(BusId::new(id), format!("Bus {}", id))))
            })
        };

        for branch in self.branches {
            let from = node_of(&mut network, branch.from_bus.value());
            let to = node_of(&mut network, branch.to_bus.value());
            network.graph.add_edge(from, to, Edge::Branch(branch));
        }

        let (mut gens, mut loads) = (0, 0);
        for (bus, p) in self.injections {
            node_of(&mut network, bus);
            let node = if p >= 0.0 {
                gens += 1;
                Node::Gen(Gen::new(
                    GenId::new(gens),
                    format!("Gen {}", gens),
                    BusId::new(bus),
                    PerUnit(p),
                ))
            } else {
                loads += 1;
                Node::Load(Load::new(
                    LoadId::new(loads),
                    format!("Load {}", loads),
                    BusId::new(bus),
                    PerUnit(-p),
                ))
            };
            network.graph.add_node(node);
        }
        network
    }
}

/// Three buses in a ring, x = 0.1 everywhere: 2 p.u. generated at reference
/// bus 1, 1 p.u. drawn at buses 2 and 3.
///
/// Branches: 1 = 1-2, 2 = 2-3, 3 = 1-3. Base flows are 1, 0 and 1.
pub fn ring3() -> Network {
    NetworkBuilder::new()
        .reference_bus(1)
        .bus(2)
        .bus(3)
        .line(1, 1, 2, 0.1)
        .line(2, 2, 3, 0.1)
        .line(3, 1, 3, 0.1)
        .generator(1, 2.0)
        .load(2, 1.0)
        .load(3, 1.0)
        .build()
}

/// Two rings sharing reference bus 1: 1-2-3 (branches 1, 2, 3) and 1-4-5
/// (branches 4, 5, 6). Outages in different rings do not interact.
pub fn double_ring() -> Network {
    NetworkBuilder::new()
        .reference_bus(1)
        .bus(2)
        .bus(3)
        .bus(4)
        .bus(5)
        .line(1, 1, 2, 0.1)
        .line(2, 2, 3, 0.1)
        .line(3, 3, 1, 0.1)
        .line(4, 1, 4, 0.1)
        .line(5, 4, 5, 0.2)
        .line(6, 5, 1, 0.1)
        .generator(1, 4.0)
        .load(2, 1.0)
        .load(3, 1.0)
        .load(4, 1.5)
        .load(5, 0.5)
        .build()
}

/// Ring 1-2-3 (branches 1, 2, 3) with bus 4 hanging off bus 2 through
/// parallel branches 4 and 5, and bus 5 off bus 4 through branch 6.
/// Opening 4 and 5 cuts buses 4 and 5 off.
pub fn split_network() -> Network {
    NetworkBuilder::new()
        .reference_bus(1)
        .bus(2)
        .bus(3)
        .bus(4)
        .bus(5)
        .line(1, 1, 2, 0.1)
        .line(2, 2, 3, 0.1)
        .line(3, 1, 3, 0.1)
        .line(4, 2, 4, 0.1)
        .line(5, 2, 4, 0.1)
        .line(6, 4, 5, 0.1)
        .generator(1, 2.0)
        .load(2, 0.5)
        .load(3, 0.5)
        .load(4, 0.5)
        .load(5, 0.5)
        .build()
}

/// IEEE 14-bus case reduced to its DC data: reactances, off-nominal taps on
/// the three transformers, and active injections on a 100 MVA base.
///
/// Branch ids follow the usual branch order (1 = 1-2 ... 20 = 13-14). Bus 8
/// hangs off bus 7 through branch 14 alone and carries no active power.
pub fn ieee14() -> Network {
    const BRANCHES: [(usize, usize, f64, f64); 20] = [
        (1, 2, 0.05917, 1.0),
        (1, 5, 0.22304, 1.0),
        (2, 3, 0.19797, 1.0),
        (2, 4, 0.17632, 1.0),
        (2, 5, 0.17388, 1.0),
        (3, 4, 0.17103, 1.0),
        (4, 5, 0.04211, 1.0),
        (4, 7, 0.20912, 0.978),
        (4, 9, 0.55618, 0.969),
        (5, 6, 0.25202, 0.932),
        (6, 11, 0.19890, 1.0),
        (6, 12, 0.25581, 1.0),
        (6, 13, 0.13027, 1.0),
        (7, 8, 0.17615, 1.0),
        (7, 9, 0.11001, 1.0),
        (9, 10, 0.08450, 1.0),
        (9, 14, 0.27038, 1.0),
        (10, 11, 0.19207, 1.0),
        (12, 13, 0.19988, 1.0),
        (13, 14, 0.34802, 1.0),
    ];
    const LOADS: [(usize, f64); 11] = [
        (2, 0.217),
        (3, 0.942),
        (4, 0.478),
        (5, 0.076),
        (6, 0.112),
        (9, 0.295),
        (10, 0.09),
        (11, 0.035),
        (12, 0.061),
        (13, 0.135),
        (14, 0.149),
    ];

    let mut builder = NetworkBuilder::new().reference_bus(1);
    for bus in 2..=14 {
        builder = builder.bus(bus);
    }
    for (i, (from, to, x, ratio)) in BRANCHES.into_iter().enumerate() {
        builder = if ratio == 1.0 {
            builder.line(i + 1, from, to, x)
        } else {
            builder.transformer(i + 1, from, to, x, ratio)
        };
    }
    builder = builder.generator(1, 2.19).generator(2, 0.4);
    for (bus, p) in LOADS {
        builder = builder.load(bus, p);
    }
    builder.build()
}
