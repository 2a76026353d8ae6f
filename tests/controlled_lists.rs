// tests/controlled_lists.rs

use std::time::Duration;

use logictree::engine::{CoreCommand, RuntimeOptions};
use logictree::tree::RunLimits;
use logictree::types::{Logical, ProcessState};
use logictree_test_utils::builders::{and, refs, JobBuilder, JobsBuilder};
use logictree_test_utils::CoreHarness;

const T: Logical = Logical::True;
const F: Logical = Logical::False;

fn controlled(job: JobBuilder) -> CoreHarness {
    let jobs = JobsBuilder::new().with_job("Main", job).build();
    CoreHarness::new(jobs, "Main")
}

fn last_environment(h: &CoreHarness) -> Vec<String> {
    h.commands
        .iter()
        .rev()
        .find_map(|c| match c {
            CoreCommand::StartCheck(req) => Some(req.environment.keys().cloned().collect()),
            _ => None,
        })
        .unwrap_or_default()
}

#[test]
fn children_run_one_after_another() {
    let mut h = controlled(JobBuilder::new(and(refs(&["A", "B", "C"]))).fakes(&["A", "B", "C"]).controlled());
    h.run_root();
    assert_eq!(h.pending_ids(), vec!["A"]);

    h.complete("A", T);
    assert_eq!(h.pending_ids(), vec!["B"]);
    assert_eq!(last_environment(&h), vec!["A"]);

    h.complete("B", T);
    assert_eq!(h.pending_ids(), vec!["C"]);
    assert_eq!(last_environment(&h), vec!["A", "B"]);
    assert_eq!(h.state("Main"), ProcessState::WORKING);

    h.complete("C", T);
    assert!(h.pending_ids().is_empty());
    assert_eq!(h.root_logical(), T);
    assert_eq!(h.state("Main"), ProcessState::FINISHED);
    assert_eq!(h.scheduled_runs(), 0);
}

#[test]
fn the_round_continues_after_the_list_decided() {
    let mut h = controlled(JobBuilder::new(and(refs(&["A", "B"]))).fakes(&["A", "B"]).controlled());
    h.run_root();
    h.complete("A", F);

    assert_eq!(h.root_logical(), F);
    assert_eq!(h.pending_ids(), vec!["B"]);
}

#[test]
fn a_child_started_out_of_turn_is_retried() {
    let mut h = controlled(JobBuilder::new(and(refs(&["A", "B"]))).fakes(&["A", "B"]).controlled());
    h.run_root();
    h.run("B");

    assert_eq!(h.state("B"), ProcessState::WAITING);
    assert_eq!(h.scheduled_retries(), 1);
    assert_eq!(h.pending_ids(), vec!["A"]);

    h.complete("A", T);
    assert!(h.pending_ids().is_empty());
    h.retry("B");
    assert_eq!(h.pending_ids(), vec!["B"]);

    h.complete("B", T);
    assert_eq!(h.root_logical(), T);
    assert_eq!(h.state("Main"), ProcessState::FINISHED);
}

#[test]
fn a_child_ahead_of_an_idle_sibling_is_blocked() {
    let mut h = controlled(JobBuilder::new(and(refs(&["A", "B"]))).fakes(&["A", "B"]).controlled());
    h.run("B");

    assert!(h.pending_ids().is_empty());
    assert_eq!(h.state("B"), ProcessState::NONE);
    assert_eq!(h.scheduled_retries(), 0);
}

#[test]
fn exhausted_retries_put_the_child_into_internal_error() {
    let jobs = JobsBuilder::new()
        .with_job(
            "Main",
            JobBuilder::new(and(refs(&["A", "B"]))).fakes(&["A", "B"]).controlled(),
        )
        .build();
    let options = RuntimeOptions {
        exit_when_idle: false,
        limits: RunLimits {
            retry_interval: Duration::from_millis(1),
            max_start_retries: 1,
            loop_delay: Duration::from_millis(1),
        },
    };
    let mut h = CoreHarness::with_options(jobs, "Main", options);
    h.run_root();
    h.run("B");
    h.retry("B");

    assert_eq!(h.state("B"), ProcessState::INTERNAL_ERROR);
    assert_eq!(h.scheduled_retries(), 1);
    assert!(!h.tree().node(h.node("Main")).list().unwrap().round_active);

    h.complete("A", T);
    assert!(h.pending_ids().is_empty());
    assert_eq!(h.state("Main"), ProcessState::INTERNAL_ERROR);
}

#[test]
fn looping_lists_schedule_the_next_round() {
    let mut h = controlled(JobBuilder::new(and(refs(&["A", "B"]))).fakes(&["A", "B"]).looping());
    h.run_root();
    h.complete("A", T);
    assert_eq!(h.scheduled_runs(), 0);
    h.complete("B", T);
    assert_eq!(h.scheduled_runs(), 1);

    h.delayed_run("Main");
    assert_eq!(h.pending_ids(), vec!["A"]);
    h.complete("A", F);
    h.complete("B", T);
    assert_eq!(h.root_logical(), F);
    assert_eq!(h.scheduled_runs(), 2);
}

#[test]
fn a_user_break_stops_the_loop() {
    let mut h = controlled(JobBuilder::new(and(refs(&["A", "B"]))).fakes(&["A", "B"]).looping());
    h.run_root();
    h.user_break("Main");

    assert!(h.pending_ids().is_empty());
    assert_eq!(h.scheduled_runs(), 0);
    h.delayed_run("Main");
    assert!(h.pending_ids().is_empty());
}
