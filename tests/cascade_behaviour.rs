// tests/cascade_behaviour.rs

use logictree::engine::{CoreCommand, RuntimeEvent};
use logictree::plugin::CheckOutcome;
use logictree::tree::NodeEvent;
use logictree::types::{Logical, LogicalState, NodeType, ProcessState};
use logictree_test_utils::builders::{and, not, or, r, refs, JobBuilder, JobsBuilder};
use logictree_test_utils::{init_tracing, CoreHarness};

const T: Logical = Logical::True;
const F: Logical = Logical::False;
const U: Logical = Logical::Unknown;

fn start_checks(h: &CoreHarness, id: &str) -> usize {
    h.commands
        .iter()
        .filter(|c| matches!(c, CoreCommand::StartCheck(req) if req.id == id))
        .count()
}

#[test]
fn a_fault_is_raised_to_every_ancestor_and_skipped_by_the_evaluator() {
    init_tracing();
    let jobs = JobsBuilder::new()
        .with_job("Main", JobBuilder::new(or(vec![r("A"), and(refs(&["B"]))])).fakes(&["A", "B"]))
        .build();
    let mut h = CoreHarness::new(jobs, "Main");
    h.run_root();
    h.fault("B", "io");

    let raised = NodeEvent::ExceptionRaised {
        origin: "B".to_string(),
    };
    assert_eq!(h.logical_state("B"), LogicalState::Fault);
    assert_eq!(h.count("B", &raised), 1);
    assert_eq!(h.count("AND#1", &raised), 1);
    assert_eq!(h.count("Main", &raised), 1);
    assert!(h.tree().node(h.node("Main")).exceptions.contains_key("B"));
    assert_eq!(h.state("B"), ProcessState::FINISHED);

    h.complete("A", T);
    assert_eq!(h.root_logical(), T);
}

#[test]
fn a_successful_rerun_clears_the_fault_upwards() {
    let jobs = JobsBuilder::new()
        .with_job("Main", JobBuilder::new(and(refs(&["A", "B"]))).fakes(&["A", "B"]))
        .build();
    let mut h = CoreHarness::new(jobs, "Main");
    h.run_root();
    h.fault("A", "timeout");
    h.complete("B", T);
    assert_eq!(h.root_logical(), U);

    h.run("A");
    h.complete("A", T);

    let cleared = NodeEvent::ExceptionCleared {
        origin: "A".to_string(),
    };
    assert_eq!(h.count("A", &cleared), 1);
    assert_eq!(h.count("Main", &cleared), 1);
    assert!(h.tree().node(h.node("Main")).exceptions.is_empty());
    assert_eq!(h.root_logical(), T);
}

#[test]
fn reset_clears_values_and_is_idempotent() {
    let jobs = JobsBuilder::new()
        .with_job("Main", JobBuilder::new(and(refs(&["A", "B"]))).fakes(&["A", "B"]))
        .build();
    let mut h = CoreHarness::new(jobs, "Main");
    h.run_root();
    h.complete("A", T);
    h.complete("B", T);
    assert_eq!(h.last_not_null("Main"), T);

    let first = h.reset("Main");
    assert!(!first.notifications.is_empty());
    for id in ["Main", "A", "B"] {
        assert_eq!(h.logical(id), U, "{id}");
        assert_eq!(h.last_not_null(id), U, "{id}");
        assert_eq!(h.state(id), ProcessState::NONE, "{id}");
    }
    assert!(h.tree().result(h.node("A")).is_none());

    let second = h.reset("Main");
    assert!(second.notifications.is_empty());
}

#[test]
fn reset_cancels_a_running_check() {
    let jobs = JobsBuilder::new()
        .with_job("Main", JobBuilder::new(r("A")).fakes(&["A"]))
        .build();
    let mut h = CoreHarness::new(jobs, "Main");
    h.run_root();
    let step = h.reset("A");

    assert!(step
        .commands
        .iter()
        .any(|c| matches!(c, CoreCommand::CancelCheck { .. })));
    assert!(!h.is_pending("A"));
    assert_eq!(h.state("A"), ProcessState::NONE);
}

#[test]
fn a_repeated_checker_runs_once_and_feeds_both_parents() {
    // OR(A, NOT(A))
    let jobs = JobsBuilder::new()
        .with_job("Main", JobBuilder::new(or(vec![r("A"), not(r("A"))])).fakes(&["A"]))
        .build();
    let mut h = CoreHarness::new(jobs, "Main");

    let not_list = h.node("NOT#1");
    let connector = h.tree().node(not_list).children[0];
    assert_eq!(h.tree().node(connector).node_type(), NodeType::NodeConnector);

    h.run_root();
    assert_eq!(h.pending_ids(), vec!["A"]);
    assert_eq!(h.tree().state(connector), ProcessState::WORKING);

    h.complete("A", F);
    assert_eq!(start_checks(&h, "A"), 1);
    assert_eq!(h.logical("NOT#1"), T);
    assert_eq!(h.root_logical(), T);
    assert_eq!(h.state("NOT#1"), ProcessState::FINISHED);
    assert_eq!(h.state("Main"), ProcessState::FINISHED);
}

#[test]
fn breaking_and_running_through_an_alias_act_on_the_shared_checker() {
    let jobs = JobsBuilder::new()
        .with_job("Main", JobBuilder::new(or(vec![r("A"), not(r("A"))])).fakes(&["A"]))
        .build();
    let mut h = CoreHarness::new(jobs, "Main");
    let a = h.node("A");
    let alias = h.tree().node(a).aliases[0];
    h.run_root();

    let step = h.step(RuntimeEvent::UserBreak { node: alias });
    assert!(step
        .commands
        .iter()
        .any(|c| matches!(c, CoreCommand::CancelCheck { node, .. } if *node == a)));
    assert!(!h.is_pending("A"));
    assert_eq!(h.logical_state("A"), LogicalState::UserAbort);

    h.step(RuntimeEvent::UserRun { node: alias });
    assert_eq!(h.pending_ids(), vec!["A"]);
    assert_ne!(h.logical_state("A"), LogicalState::UserAbort);

    h.complete("A", T);
    assert_eq!(start_checks(&h, "A"), 2);
    assert_eq!(h.logical("NOT#1"), F);
    assert_eq!(h.root_logical(), T);
}

#[test]
fn a_repeated_sub_job_is_built_once() {
    let jobs = JobsBuilder::new()
        .with_job("Main", JobBuilder::new(and(refs(&["Sub", "Sub"]))))
        .with_job("Sub", JobBuilder::new(r("X")).fakes(&["X"]))
        .build();
    let mut h = CoreHarness::new(jobs, "Main");
    let children = h.tree().node(h.tree().root()).children.clone();
    assert_eq!(h.tree().node(children[1]).node_type(), NodeType::JobConnector);

    h.run_root();
    assert_eq!(h.pending_ids(), vec!["X"]);
    h.complete("X", T);
    assert_eq!(start_checks(&h, "X"), 1);
    assert_eq!(h.root_logical(), T);
    assert_eq!(h.tree().path(h.node("X")), "Main/Sub/X");
}

#[test]
fn sub_job_results_stay_in_their_own_registry() {
    let jobs = JobsBuilder::new()
        .with_job("Main", JobBuilder::new(and(refs(&["A", "Sub"]))).fakes(&["A"]))
        .with_job("Sub", JobBuilder::new(r("X")).fakes(&["X"]))
        .build();
    let mut h = CoreHarness::new(jobs, "Main");
    h.run_root();
    h.complete("A", T);
    h.complete("X", F);

    let main = h.tree().results_of(h.node("Main"));
    let sub = h.tree().results_of(h.node("X"));
    assert!(main.get("A").is_some());
    assert!(main.get("X").is_none());
    assert_eq!(sub.get("X").map(|r| r.logical), Some(F));
}

#[test]
fn break_with_result_cancels_undecided_siblings() {
    let jobs = JobsBuilder::new()
        .with_job(
            "Main",
            JobBuilder::new(or(refs(&["A", "B"])))
                .fakes(&["A", "B"])
                .break_with_result(),
        )
        .build();
    let mut h = CoreHarness::new(jobs, "Main");
    h.run_root();
    h.complete("A", T);

    assert_eq!(h.root_logical(), T);
    assert!(h.pending_ids().is_empty());
    assert_eq!(h.state("B"), ProcessState::FINISHED);
    assert_eq!(h.logical_state("B"), LogicalState::None);
    assert_eq!(h.state("Main"), ProcessState::FINISHED);
}

#[test]
fn volatile_lists_follow_the_live_value() {
    let jobs = JobsBuilder::new()
        .with_job("Main", JobBuilder::new(r("A")).fakes(&["A"]).volatile())
        .build();
    let mut h = CoreHarness::new(jobs, "Main");
    h.run_root();
    h.complete("A", T);
    assert_eq!(h.root_logical(), T);

    h.run("A");
    h.progress("A", U, 10);
    assert_eq!(h.root_logical(), U);
    assert_eq!(h.last_not_null("Main"), T);
}

#[test]
fn timeouts_keep_their_logical_state() {
    let jobs = JobsBuilder::new()
        .with_job("Main", JobBuilder::new(r("A")).fakes(&["A"]))
        .build();
    let mut h = CoreHarness::new(jobs, "Main");
    h.run_root();
    h.complete_with("A", CheckOutcome::timeout());

    assert_eq!(h.logical_state("A"), LogicalState::Timeout);
    assert_eq!(h.logical("A"), U);
    assert_eq!(h.state("Main"), ProcessState::FINISHED);
}

#[test]
fn stale_completions_are_dropped() {
    let jobs = JobsBuilder::new()
        .with_job("Main", JobBuilder::new(r("A")).fakes(&["A"]))
        .build();
    let mut h = CoreHarness::new(jobs, "Main");
    h.run_root();
    let (node, generation) = h
        .commands
        .iter()
        .find_map(|c| match c {
            CoreCommand::StartCheck(req) => Some((req.node, req.generation)),
            _ => None,
        })
        .expect("check started");

    h.reset("A");
    h.step(RuntimeEvent::CheckCompleted {
        node,
        generation,
        outcome: CheckOutcome::done(T, None),
    });
    assert_eq!(h.logical("A"), U);
    assert_eq!(h.state("A"), ProcessState::NONE);
}
