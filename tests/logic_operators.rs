// tests/logic_operators.rs

use logictree::engine::CoreCommand;
use logictree::tree::NodeEvent;
use logictree::types::{Logical, LogicalState, ProcessState};
use logictree_test_utils::builders::{and, not, op, or, r, refs, JobBuilder, JobsBuilder};
use logictree_test_utils::{init_tracing, CoreHarness};

const T: Logical = Logical::True;
const F: Logical = Logical::False;
const U: Logical = Logical::Unknown;

fn harness(logical: logictree::job::SyntaxNode, checkers: &[&str]) -> CoreHarness {
    init_tracing();
    let jobs = JobsBuilder::new()
        .with_job("Main", JobBuilder::new(logical).fakes(checkers))
        .build();
    CoreHarness::new(jobs, "Main")
}

#[test]
fn and_starts_every_operand_and_waits_for_the_last_true() {
    let mut h = harness(and(refs(&["A", "B"])), &["A", "B"]);
    h.run_root();
    assert_eq!(h.pending_ids(), vec!["A", "B"]);
    assert_eq!(h.state("Main"), ProcessState::WORKING);

    h.complete("A", T);
    assert_eq!(h.root_logical(), U);

    h.complete("B", T);
    assert_eq!(h.root_logical(), T);
    assert_eq!(h.state("Main"), ProcessState::FINISHED);
    assert_eq!(h.logical_state("Main"), LogicalState::Done);
}

#[test]
fn and_decides_false_before_the_other_operand_returns() {
    let mut h = harness(and(refs(&["A", "B"])), &["A", "B"]);
    h.run_root();
    h.complete("A", F);

    assert_eq!(h.root_logical(), F);
    assert!(h.is_pending("B"));
    assert_eq!(h.state("Main"), ProcessState::WORKING);
}

#[test]
fn or_decides_true_on_first_true_operand() {
    let mut h = harness(or(refs(&["A", "B", "C"])), &["A", "B", "C"]);
    h.run_root();
    h.complete("B", F);
    assert_eq!(h.root_logical(), U);

    h.complete("C", T);
    assert_eq!(h.root_logical(), T);
}

#[test]
fn or_of_all_false_is_false() {
    let mut h = harness(or(refs(&["A", "B"])), &["A", "B"]);
    h.run_root();
    h.complete("A", F);
    h.complete("B", F);
    assert_eq!(h.root_logical(), F);
}

#[test]
fn not_inverts_a_decided_operand() {
    let mut h = harness(not(r("A")), &["A"]);
    h.run_root();
    assert_eq!(h.root_logical(), U);
    h.complete("A", T);
    assert_eq!(h.root_logical(), F);

    let mut h = harness(not(r("A")), &["A"]);
    h.run_root();
    h.complete("A", F);
    assert_eq!(h.root_logical(), T);
}

#[test]
fn xor_waits_for_every_operand_and_counts_parity() {
    let mut h = harness(op("XOR", refs(&["A", "B", "C"])), &["A", "B", "C"]);
    h.run_root();
    h.complete("A", T);
    h.complete("B", T);
    assert_eq!(h.root_logical(), U);
    h.complete("C", F);
    assert_eq!(h.root_logical(), F);

    let mut h = harness(op("XOR", refs(&["A", "B", "C"])), &["A", "B", "C"]);
    h.run_root();
    h.complete("A", T);
    h.complete("B", F);
    h.complete("C", F);
    assert_eq!(h.root_logical(), T);
}

#[test]
fn nested_lists_propagate_upwards() {
    // AND(A, OR(B, C))
    let mut h = harness(and(vec![r("A"), or(refs(&["B", "C"]))]), &["A", "B", "C"]);
    h.run_root();
    assert_eq!(h.pending_ids(), vec!["A", "B", "C"]);

    h.complete("A", T);
    h.complete("B", F);
    assert_eq!(h.logical("OR#1"), U);
    assert_eq!(h.root_logical(), U);

    h.complete("C", T);
    assert_eq!(h.logical("OR#1"), T);
    assert_eq!(h.root_logical(), T);
    assert_eq!(h.tree().path(h.node("C")), "Main/OR:OR#1/C");
}

#[test]
fn unknown_results_leave_the_list_undecided() {
    let mut h = harness(and(refs(&["A", "B"])), &["A", "B"]);
    h.run_root();
    h.complete("A", T);
    h.complete("B", U);

    assert_eq!(h.root_logical(), U);
    assert_eq!(h.state("Main"), ProcessState::FINISHED);
}

#[test]
fn constants_resolve_without_a_check() {
    let jobs = JobsBuilder::new()
        .with_job(
            "Main",
            JobBuilder::new(and(vec![r("A"), logictree::job::SyntaxNode::literal(true)])).fakes(&["A"]),
        )
        .build();
    let mut h = CoreHarness::new(jobs, "Main");
    h.run_root();

    assert_eq!(h.pending_ids(), vec!["A"]);
    assert_eq!(h.logical("Const#1"), T);
    h.complete("A", T);
    assert_eq!(h.root_logical(), T);
}

#[test]
fn root_value_is_published_once_per_change() {
    let mut h = harness(and(refs(&["A", "B", "C"])), &["A", "B", "C"]);
    h.run_root();
    h.complete("A", F);
    h.complete("B", F);
    h.complete("C", T);

    assert_eq!(h.root_logical(), F);
    assert_eq!(h.count("Main", &NodeEvent::LogicalChanged), 1);
    assert_eq!(h.count("Main", &NodeEvent::LastNotNullLogicalChanged), 1);
}

#[test]
fn a_flipped_root_is_announced_once() {
    let mut h = harness(and(refs(&["A", "B"])), &["A", "B"]);
    h.run_root();
    h.complete("A", T);
    h.complete("B", T);
    assert_eq!(h.root_logical(), T);
    assert_eq!(h.count("Main", &NodeEvent::LastNotNullLogicalChanged), 1);

    h.run("A");
    h.complete("A", F);
    assert_eq!(h.root_logical(), F);
    assert_eq!(h.count("Main", &NodeEvent::LastNotNullLogicalChanged), 2);

    h.run("B");
    h.complete("B", F);
    assert_eq!(h.root_logical(), F);
    assert_eq!(h.count("Main", &NodeEvent::LastNotNullLogicalChanged), 2);
}

#[test]
fn last_not_null_survives_an_unknown_rerun() {
    let mut h = harness(r("A"), &["A"]);
    h.run_root();
    h.complete("A", T);
    assert_eq!(h.last_not_null("A"), T);

    h.run("A");
    h.progress("A", U, 50);
    assert_eq!(h.logical("A"), U);
    assert_eq!(h.last_not_null("A"), T);
    assert_eq!(h.last_not_null("Main"), T);
}

#[test]
fn progress_is_forwarded_to_ancestors() {
    let mut h = harness(and(vec![r("A"), or(refs(&["B"]))]), &["A", "B"]);
    h.run_root();
    h.clear();
    h.progress("B", T, 40);

    assert_eq!(h.count("B", &NodeEvent::ProgressChanged), 1);
    assert_eq!(h.count("OR#1", &NodeEvent::ProgressChanged), 1);
    assert_eq!(h.count("Main", &NodeEvent::ProgressChanged), 1);
}

#[test]
fn rerunning_a_busy_leaf_is_queued_until_it_finishes() {
    let mut h = harness(r("A"), &["A"]);
    h.run_root();
    h.run("A");
    let starts = |h: &CoreHarness| {
        h.commands
            .iter()
            .filter(|c| matches!(c, CoreCommand::StartCheck(_)))
            .count()
    };
    assert_eq!(starts(&h), 1);

    h.complete("A", T);
    assert_eq!(starts(&h), 2);
    assert!(h.is_pending("A"));
}
