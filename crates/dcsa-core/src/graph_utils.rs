use crate::{BusId, Edge, Network, Node};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet, VecDeque};

/// Island summary (standard components approach, see doi:10.1016/S0378-3758(96)00112-0).
#[derive(Debug)]
pub struct IslandSummary {
    pub island_id: usize,
    pub buses: Vec<BusId>,
}

/// Aggregated island analysis result.
#[derive(Debug)]
pub struct IslandAnalysis {
    pub islands: Vec<IslandSummary>,
    pub bus_to_island: HashMap<BusId, usize>,
}

impl IslandAnalysis {
    pub fn island_of(&self, bus: BusId) -> Option<usize> {
        self.bus_to_island.get(&bus).copied()
    }
}

/// Labels connected components of buses joined by in-service branches (breadth-first search).
///
/// Islands are numbered in order of their first bus in graph order, so the
/// numbering is stable for a given network.
pub fn find_islands(network: &Network) -> IslandAnalysis {
    let graph = &network.graph;
    let mut visited = HashSet::new();
    let mut islands = Vec::new();
    let mut bus_to_island = HashMap::new();

    for start in graph.node_indices() {
        if !matches!(graph[start], Node::Bus(_)) || visited.contains(&start) {
            continue;
        }
        let mut queue = VecDeque::new();
        queue.push_back(start);
        let mut members = Vec::new();
        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            if let Node::Bus(bus) = &graph[node] {
                members.push(bus.id);
            }
            for edge in graph.edges(node) {
                let Edge::Branch(branch) = edge.weight();
                if !branch.status {
                    continue;
                }
                let neighbor = if edge.source() == node {
                    edge.target()
                } else {
                    edge.source()
                };
                if !visited.contains(&neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        let island_id = islands.len();
        for bus in &members {
            bus_to_island.insert(*bus, island_id);
        }
        islands.push(IslandSummary {
            island_id,
            buses: members,
        });
    }

    IslandAnalysis {
        islands,
        bus_to_island,
    }
}
