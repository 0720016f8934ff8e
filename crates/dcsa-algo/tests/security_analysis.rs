//! End-to-end security analysis runs: closed forms, superposition, limits and reporting.

use dcsa_algo::contingency::{Action, Contingency, DcSecurityAnalysis, OperatorStrategy};
use dcsa_algo::dc::{DcLoadFlowContext, DcLoadFlowParameters};
use dcsa_algo::test_utils::{double_ring, ieee14, ring3, split_network};
use dcsa_algo::{AnalysisError, ScenarioStatus};
use dcsa_algo::contingency::ComputedElementError;
use dcsa_core::{BranchId, DenseSolverKind, Radians};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn b(id: usize) -> BranchId {
    BranchId::new(id)
}

#[test]
fn ring_n1_closed_form() {
    init_tracing();
    let context = DcLoadFlowContext::new(&ring3(), DcLoadFlowParameters::default()).unwrap();
    let contingencies: Vec<Contingency> = (1..=3)
        .map(|id| Contingency::single(id.to_string(), b(id)))
        .collect();
    let result = DcSecurityAnalysis::new(&context)
        .run(&contingencies, &[], &[])
        .unwrap();

    // flows on branches 1, 2, 3 after each single outage
    let expected = [
        ("1", [0.0, -1.0, 2.0]),
        ("2", [1.0, 0.0, 1.0]),
        ("3", [2.0, 1.0, 0.0]),
    ];
    for (id, flows) in expected {
        let post = result.contingency(id).unwrap();
        for (branch, flow) in (1..=3).zip(flows) {
            let actual = post.flow(b(branch)).unwrap();
            assert!((actual - flow).abs() < 1e-9, "outage {} branch {}: {}", id, branch, actual);
        }
    }
}

#[test]
fn decoupled_outages_superpose() {
    let context = DcLoadFlowContext::new(&double_ring(), DcLoadFlowParameters::default()).unwrap();
    let contingencies = [
        Contingency::single("a", b(2)),
        Contingency::single("b", b(5)),
        Contingency::new("ab", vec![b(2), b(5)]),
    ];
    let result = DcSecurityAnalysis::new(&context)
        .run(&contingencies, &[], &[])
        .unwrap();
    let base = &result.base;
    let (a, bb, ab) = (
        result.contingency("a").unwrap(),
        result.contingency("b").unwrap(),
        result.contingency("ab").unwrap(),
    );
    assert!(!ab.connectivity.breaking);

    for id in 1..=6 {
        let branch = b(id);
        let base_flow = base.flow(branch).unwrap();
        let combined = a.flow(branch).unwrap() + bb.flow(branch).unwrap() - base_flow;
        assert!(
            (ab.flow(branch).unwrap() - combined).abs() < 1e-9,
            "branch {}",
            id
        );
    }
}

#[test]
fn dense_backends_agree() {
    let contingencies = [
        Contingency::new("pair", vec![b(1), b(7)]),
        Contingency::new("triple", vec![b(2), b(10), b(16)]),
    ];
    let mut runs = Vec::new();
    for solver in [DenseSolverKind::Gauss, DenseSolverKind::Faer] {
        let params = DcLoadFlowParameters::default().with_dense_solver(solver);
        let context = DcLoadFlowContext::new(&ieee14(), params).unwrap();
        runs.push(
            DcSecurityAnalysis::new(&context)
                .run(&contingencies, &[], &[])
                .unwrap(),
        );
    }
    for (gauss, faer) in runs[0].contingencies.iter().zip(&runs[1].contingencies) {
        assert!(gauss.status.is_converged() && faer.status.is_converged());
        for (x, y) in gauss.state.iter().zip(&faer.state) {
            assert!((x - y).abs() < 1e-10);
        }
    }
}

#[test]
fn states_matrix_limit_fails_the_run() {
    let params = DcLoadFlowParameters::default().with_max_states_matrix_bytes(64);
    let context = DcLoadFlowContext::new(&ieee14(), params).unwrap();
    let err = DcSecurityAnalysis::new(&context)
        .run(&[Contingency::new("pair", vec![b(1), b(7)])], &[], &[])
        .unwrap_err();
    match err {
        AnalysisError::ComputedElement(ComputedElementError::TooManyElements {
            columns,
            limit,
            ..
        }) => {
            assert_eq!(columns, 2);
            assert_eq!(limit, 64);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn actions_on_lost_buses_are_skipped() {
    let context = DcLoadFlowContext::new(&split_network(), DcLoadFlowParameters::default()).unwrap();
    let actions = [
        Action::phase_tap("shift-6", b(6), Radians(0.05)),
        Action::phase_tap("shift-2", b(2), Radians(0.05)),
    ];
    let strategy = OperatorStrategy::new(
        "s",
        "cut",
        vec!["shift-6".to_string(), "shift-2".to_string()],
    );
    let result = DcSecurityAnalysis::new(&context)
        .run(
            &[Contingency::new("cut", vec![b(4), b(5)])],
            &actions,
            &[strategy],
        )
        .unwrap();
    let strategy = result.operator_strategy("s").unwrap();
    assert!(strategy.status.is_converged());
    assert_eq!(strategy.diagnostics.issues_by_category("action").count(), 1);
    assert_eq!(strategy.flow(b(6)), Some(0.0));

    // shift-2 is applied: 2-3 now differs from the plain contingency
    let post = result.contingency("cut").unwrap();
    assert!((strategy.flow(b(2)).unwrap() - post.flow(b(2)).unwrap()).abs() > 1e-3);
}

#[test]
fn transformer_ratio_can_be_ignored() {
    let params = DcLoadFlowParameters::from_json(r#"{ "use_transformer_ratio": false }"#).unwrap();
    let context = DcLoadFlowContext::new(&ieee14(), params).unwrap();
    let actions = [Action::ratio_tap("tap", b(8), 1.05)];
    let strategy = OperatorStrategy::new("s", "c", vec!["tap".to_string()]);
    let result = DcSecurityAnalysis::new(&context)
        .run(&[Contingency::single("c", b(1))], &actions, &[strategy])
        .unwrap();
    // the ratio does not enter the power factor, so the change is a no-op
    let strategy = result.operator_strategy("s").unwrap();
    assert_eq!(strategy.diagnostics.warning_count(), 1);
    assert_eq!(strategy.state, result.contingency("c").unwrap().state);
}

#[test]
fn results_serialize_to_json() {
    let context = DcLoadFlowContext::new(&ring3(), DcLoadFlowParameters::default()).unwrap();
    let result = DcSecurityAnalysis::new(&context)
        .run(&[Contingency::single("c", b(1))], &[], &[])
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["contingencies"][0]["contingency_id"], "c");
    assert_eq!(json["contingencies"][0]["status"], "Converged");
    assert_eq!(json["base"]["branch_flows"].as_array().unwrap().len(), 3);
    assert_eq!(result.contingencies[0].status, ScenarioStatus::Converged);
}
