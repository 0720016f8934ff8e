//! Indexed load-flow view of a [`Network`].
//!
//! The equation system addresses buses and branches by dense numbers
//! (`0..n`, `0..m`) rather than by ids. [`LfNetwork`] assigns those numbers in
//! graph order and keeps only the connected component holding the reference
//! bus: buses in other islands carry no meaningful angle and would make the
//! system singular.

use dcsa_core::{
    find_islands, BranchId, BusId, Diagnostics, GridError, GridResult, Network,
};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct LfBus {
    pub num: usize,
    pub id: BusId,
    pub name: String,
    pub is_reference: bool,
    /// Net active injection (generation minus load), per-unit
    pub injection: f64,
}

#[derive(Debug, Clone)]
pub struct LfBranch {
    pub num: usize,
    pub id: BranchId,
    pub name: String,
    pub bus1: usize,
    pub bus2: usize,
    pub reactance: f64,
    pub ratio: f64,
    /// Phase shift on side 1, radians
    pub phase_shift: f64,
    pub is_phase_shifter: bool,
    /// In service in the base case
    pub enabled: bool,
    /// |x| below the low-impedance threshold
    pub zero_impedance: bool,
}

impl LfBranch {
    /// DC power factor `1/x`, scaled by the tap ratio when requested.
    pub fn power_factor(&self, use_transformer_ratio: bool) -> f64 {
        self.power_factor_with_ratio(self.ratio, use_transformer_ratio)
    }

    pub fn power_factor_with_ratio(&self, ratio: f64, use_transformer_ratio: bool) -> f64 {
        if use_transformer_ratio {
            ratio / self.reactance
        } else {
            1.0 / self.reactance
        }
    }
}

#[derive(Debug, Clone)]
pub struct LfNetwork {
    buses: Vec<LfBus>,
    branches: Vec<LfBranch>,
    reference_bus: usize,
    bus_nums: HashMap<BusId, usize>,
    branch_nums: HashMap<BranchId, usize>,
    diagnostics: Diagnostics,
}

impl LfNetwork {
    /// Build the view of the component holding the reference bus.
    ///
    /// Structural defects (two reference buses, dangling branches, non-finite
    /// parameters) are errors. A network without a flagged reference bus uses
    /// its first bus and records a warning.
    pub fn from_network(network: &Network, low_impedance_threshold: f64) -> GridResult<Self> {
        network.validate()?;

        let all_buses = network.buses();
        let first = all_buses
            .first()
            .ok_or_else(|| GridError::Network("network has no buses".to_string()))?;

        let mut diagnostics = Diagnostics::new();
        let reference_id = match all_buses.iter().find(|b| b.is_reference) {
            Some(bus) => bus.id,
            None => {
                warn!(bus = %first.id, "no reference bus flagged, using the first bus");
                diagnostics.add_warning_with_entity(
                    "structure",
                    "no reference bus flagged, using the first bus",
                    &format!("Bus {}", first.id),
                );
                first.id
            }
        };

        let islands = find_islands(network);
        let main_island = islands.island_of(reference_id).ok_or(GridError::UnknownElement {
            kind: "bus",
            id: reference_id.value(),
        })?;

        let mut buses = Vec::new();
        let mut bus_nums = HashMap::new();
        let mut dropped = 0usize;
        for bus in &all_buses {
            if islands.island_of(bus.id) != Some(main_island) {
                dropped += 1;
                continue;
            }
            let num = buses.len();
            bus_nums.insert(bus.id, num);
            buses.push(LfBus {
                num,
                id: bus.id,
                name: bus.name.clone(),
                is_reference: bus.id == reference_id,
                injection: network.bus_injection(bus.id).value(),
            });
        }
        if dropped > 0 {
            warn!(dropped, "buses outside the main component are ignored");
            diagnostics.add_warning(
                "structure",
                &format!("{} buses outside the main component ignored", dropped),
            );
        }

        let mut branches = Vec::new();
        let mut branch_nums = HashMap::new();
        for branch in network.branches() {
            let (Some(&bus1), Some(&bus2)) =
                (bus_nums.get(&branch.from_bus), bus_nums.get(&branch.to_bus))
            else {
                continue;
            };
            let num = branches.len();
            branch_nums.insert(branch.id, num);
            branches.push(LfBranch {
                num,
                id: branch.id,
                name: branch.name.clone(),
                bus1,
                bus2,
                reactance: branch.reactance,
                ratio: branch.tap_ratio,
                phase_shift: branch.phase_shift.value(),
                is_phase_shifter: branch.is_phase_shifter,
                enabled: branch.status,
                zero_impedance: branch.reactance.abs() < low_impedance_threshold,
            });
        }

        let reference_bus = bus_nums[&reference_id];
        debug!(
            buses = buses.len(),
            branches = branches.len(),
            reference = %reference_id,
            "load-flow network built"
        );

        Ok(Self {
            buses,
            branches,
            reference_bus,
            bus_nums,
            branch_nums,
            diagnostics,
        })
    }

    pub fn buses(&self) -> &[LfBus] {
        &self.buses
    }

    pub fn branches(&self) -> &[LfBranch] {
        &self.branches
    }

    pub fn bus(&self, num: usize) -> &LfBus {
        &self.buses[num]
    }

    pub fn branch(&self, num: usize) -> &LfBranch {
        &self.branches[num]
    }

    pub fn reference_bus(&self) -> usize {
        self.reference_bus
    }

    pub fn bus_num(&self, id: BusId) -> Option<usize> {
        self.bus_nums.get(&id).copied()
    }

    pub fn branch_num(&self, id: BranchId) -> Option<usize> {
        self.branch_nums.get(&id).copied()
    }

    /// Warnings recorded while building the view.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}
