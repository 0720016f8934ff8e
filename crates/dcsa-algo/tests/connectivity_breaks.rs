//! Network splits: classification, reconnection sets and post-split flows.

use dcsa_algo::contingency::{Contingency, DcSecurityAnalysis};
use dcsa_algo::dc::{DcLoadFlowContext, DcLoadFlowParameters};
use dcsa_algo::test_utils::{ieee14, split_network};
use dcsa_core::{BranchId, BusId, GraphConnectivity};

fn component_numbers(context: &DcLoadFlowContext) -> Vec<usize> {
    let mut graph = context.connectivity().lock().unwrap();
    (0..context.network().buses().len())
        .map(|bus| graph.component_number(&bus).unwrap())
        .collect()
}

#[test]
fn only_the_radial_branch_breaks_ieee14() {
    let context = DcLoadFlowContext::new(&ieee14(), DcLoadFlowParameters::default()).unwrap();
    let contingencies: Vec<Contingency> = (1..=20)
        .map(|id| Contingency::single(id.to_string(), BranchId::new(id)))
        .collect();
    let breaks = DcSecurityAnalysis::new(&context)
        .detect_connectivity_breaks(&contingencies)
        .unwrap();

    for (contingency, result) in contingencies.iter().zip(&breaks) {
        let result = result.as_ref().unwrap();
        assert_eq!(result.contingency_id, contingency.id);
        assert_eq!(result.breaking, contingency.id == "14", "{}", contingency.id);
    }
    let radial = breaks[13].as_ref().unwrap();
    assert_eq!(radial.lost_bus_ids(context.network()), vec![BusId::new(8)]);
    assert!(radial.lost_branches.is_empty());
    assert_eq!(radial.reconnection.len(), 1);
}

#[test]
fn reconnection_set_is_minimal() {
    let context = DcLoadFlowContext::new(&split_network(), DcLoadFlowParameters::default()).unwrap();
    let num = |id| context.network().branch_num(BranchId::new(id)).unwrap();
    let contingencies = [
        Contingency::new("parallel", vec![BranchId::new(4), BranchId::new(5)]),
        Contingency::new(
            "all",
            vec![BranchId::new(4), BranchId::new(5), BranchId::new(6)],
        ),
    ];
    let breaks = DcSecurityAnalysis::new(&context)
        .detect_connectivity_breaks(&contingencies)
        .unwrap();

    let parallel = breaks[0].as_ref().unwrap();
    assert!(parallel.breaking);
    assert_eq!(parallel.reconnection, vec![num(4)]);
    assert_eq!(parallel.lost_branch_ids(context.network()), vec![BranchId::new(6)]);

    // three components: one reconnection per extra component
    let all = breaks[1].as_ref().unwrap();
    assert_eq!(all.reconnection, vec![num(4), num(6)]);
    assert_eq!(
        all.lost_bus_ids(context.network()),
        vec![BusId::new(4), BusId::new(5)]
    );
    assert!(all.lost_branches.is_empty());
}

#[test]
fn connectivity_is_restored_after_every_contingency() {
    let context = DcLoadFlowContext::new(&split_network(), DcLoadFlowParameters::default()).unwrap();
    let before = component_numbers(&context);
    let contingencies = [
        Contingency::new("cut", vec![BranchId::new(4), BranchId::new(5)]),
        Contingency::single("radial", BranchId::new(6)),
        Contingency::single("ring", BranchId::new(2)),
    ];
    let result = DcSecurityAnalysis::new(&context)
        .run(&contingencies, &[], &[])
        .unwrap();
    assert_eq!(result.contingencies.len(), 3);

    assert_eq!(component_numbers(&context), before);
    let graph = context.connectivity().lock().unwrap();
    assert_eq!(graph.scope_depth(), 0);
    for branch in 0..context.network().branches().len() {
        assert!(graph.contains_edge(&branch));
    }
}

#[test]
fn split_flows_match_network_without_lost_part() {
    let network = split_network();
    let params = DcLoadFlowParameters::default();
    let context = DcLoadFlowContext::new(&network, params.clone()).unwrap();
    let result = DcSecurityAnalysis::new(&context)
        .run(
            &[Contingency::new("cut", vec![BranchId::new(4), BranchId::new(5)])],
            &[],
            &[],
        )
        .unwrap();
    let post = result.contingency("cut").unwrap();
    assert!(post.status.is_converged());

    // refactorized: buses 4 and 5 fall outside the main component
    let mut reduced = network.clone();
    for id in [4, 5] {
        reduced.branch_mut(BranchId::new(id)).unwrap().status = false;
    }
    let reference = DcLoadFlowContext::new(&reduced, params)
        .unwrap()
        .solve()
        .unwrap();
    for id in 1..=3 {
        let branch = BranchId::new(id);
        assert!(
            (post.flow(branch).unwrap() - reference.flow(branch).unwrap()).abs() < 1e-9,
            "branch {}",
            id
        );
    }
    // the reference bus now supplies only buses 2 and 3
    let out_of_reference = post.flow(BranchId::new(1)).unwrap() + post.flow(BranchId::new(3)).unwrap();
    assert!((out_of_reference - 1.0).abs() < 1e-9);
}
