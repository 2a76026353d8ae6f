// tests/user_control.rs

use logictree::engine::{CoreCommand, RuntimeOptions};
use logictree::types::{Logical, LogicalState, ProcessState};
use logictree_test_utils::builders::{and, r, refs, JobBuilder, JobsBuilder};
use logictree_test_utils::CoreHarness;

const T: Logical = Logical::True;
const U: Logical = Logical::Unknown;

fn harness() -> CoreHarness {
    let jobs = JobsBuilder::new()
        .with_job("Main", JobBuilder::new(and(refs(&["A", "B"]))).fakes(&["A", "B"]))
        .build();
    CoreHarness::new(jobs, "Main")
}

#[test]
fn user_break_cancels_the_subtree_and_marks_user_abort() {
    let mut h = harness();
    h.run_root();
    let step = h.user_break("Main");

    let cancels = step
        .commands
        .iter()
        .filter(|c| matches!(c, CoreCommand::CancelCheck { .. }))
        .count();
    assert_eq!(cancels, 2);
    assert!(h.pending_ids().is_empty());
    assert_eq!(h.logical_state("Main"), LogicalState::UserAbort);
    assert_eq!(h.state("Main"), ProcessState::FINISHED);
    assert_eq!(h.logical_state("A"), LogicalState::None);
    assert_eq!(h.root_logical(), U);
}

#[test]
fn an_aborted_node_ignores_plain_runs() {
    let mut h = harness();
    h.run_root();
    h.user_break("Main");

    h.run_root();
    assert!(h.pending_ids().is_empty());

    h.run("A");
    assert!(h.pending_ids().is_empty());
}

#[test]
fn user_run_resets_and_restarts_an_aborted_node() {
    let mut h = harness();
    h.run_root();
    h.complete("A", T);
    h.user_break("Main");
    assert_eq!(h.last_not_null("A"), T);

    h.user_run("Main");
    assert_eq!(h.pending_ids(), vec!["A", "B"]);
    assert_eq!(h.last_not_null("A"), U);
    assert_eq!(h.logical_state("Main"), LogicalState::Start);

    h.complete("A", T);
    h.complete("B", T);
    assert_eq!(h.root_logical(), T);
    assert_eq!(h.logical_state("Main"), LogicalState::Done);
}

#[test]
fn user_run_on_a_busy_leaf_restarts_it() {
    let mut h = harness();
    h.run_root();
    let step = h.user_run("A");

    assert!(step
        .commands
        .iter()
        .any(|c| matches!(c, CoreCommand::CancelCheck { .. })));
    assert!(step
        .commands
        .iter()
        .any(|c| matches!(c, CoreCommand::StartCheck(req) if req.id == "A")));
    assert!(h.is_pending("A"));
}

#[test]
fn breaking_an_idle_leaf_only_marks_it() {
    let mut h = harness();
    h.run_root();
    h.complete("A", T);
    let step = h.user_break("A");

    assert!(step.commands.iter().all(|c| !matches!(c, CoreCommand::CancelCheck { .. })));
    assert_eq!(h.logical_state("A"), LogicalState::UserAbort);
    assert_eq!(h.last_not_null("A"), T);
    assert!(h.is_pending("B"));
}

#[test]
fn once_mode_requests_exit_when_the_root_finished() {
    let jobs = JobsBuilder::new()
        .with_job("Main", JobBuilder::new(r("A")).fakes(&["A"]))
        .build();
    let options = RuntimeOptions {
        exit_when_idle: true,
        ..RuntimeOptions::default()
    };
    let mut h = CoreHarness::with_options(jobs, "Main", options);
    h.run_root();
    assert!(h.keep_running);

    let step = h.complete("A", T);
    assert!(!h.keep_running);
    assert!(step
        .commands
        .iter()
        .any(|c| matches!(c, CoreCommand::RequestExit)));
}

#[test]
fn shutdown_cancels_checks_and_disarms_triggers() {
    let jobs = JobsBuilder::new()
        .with_job(
            "Main",
            JobBuilder::new(and(refs(&["A", "B"])))
                .fakes(&["A", "B"])
                .trigger("tick", "manual", "")
                .checker_trigger("A", "tick"),
        )
        .build();
    let mut h = CoreHarness::new(jobs, "Main");
    h.run_root();
    assert!(h.is_armed("tick"));

    let step = h.shutdown();
    assert!(!step.keep_running);
    assert!(h.pending_ids().is_empty());
    assert!(!h.is_armed("tick"));
}

#[test]
fn an_init_nodes_job_stays_aborted_when_its_parent_runs() {
    let jobs = JobsBuilder::new()
        .with_job("Main", JobBuilder::new(and(refs(&["A", "Sub"]))).fakes(&["A"]))
        .with_job("Sub", JobBuilder::new(r("X")).fakes(&["X"]).init_nodes())
        .build();
    let mut h = CoreHarness::new(jobs, "Main");
    h.user_break("Sub");
    assert_eq!(h.logical_state("Sub"), LogicalState::UserAbort);

    h.run_root();
    assert_eq!(h.pending_ids(), vec!["A"]);
    assert_eq!(h.logical_state("Sub"), LogicalState::UserAbort);

    h.user_run("Sub");
    assert_eq!(h.pending_ids(), vec!["A", "X"]);
    assert_eq!(h.logical_state("Sub"), LogicalState::Start);
}
