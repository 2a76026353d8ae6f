// tests/triggers_and_workers.rs

use logictree::engine::CoreCommand;
use logictree::types::{Logical, ProcessState};
use logictree_test_utils::builders::{and, r, refs, JobBuilder, JobsBuilder};
use logictree_test_utils::CoreHarness;

const T: Logical = Logical::True;
const F: Logical = Logical::False;

fn harness(job: JobBuilder) -> CoreHarness {
    let jobs = JobsBuilder::new().with_job("Main", job).build();
    CoreHarness::new(jobs, "Main")
}

fn count(h: &CoreHarness, pred: impl Fn(&CoreCommand) -> bool) -> usize {
    h.commands.iter().filter(|c| pred(c)).count()
}

#[test]
fn a_plugin_trigger_is_armed_on_first_run_and_reruns_its_node() {
    let mut h = harness(
        JobBuilder::new(r("A"))
            .fakes(&["A"])
            .trigger("tick", "manual", "")
            .checker_trigger("A", "tick"),
    );
    assert!(!h.is_armed("tick"));

    h.run_root();
    assert!(h.is_armed("tick"));
    h.complete("A", T);
    assert_eq!(h.state("A"), ProcessState::TRIGGERED);
    assert_eq!(h.state("Main"), ProcessState::FINISHED);

    h.fire("tick");
    assert!(h.is_pending("A"));
    h.complete("A", F);
    assert_eq!(h.root_logical(), F);
    assert_eq!(count(&h, |c| matches!(c, CoreCommand::ArmTrigger(_))), 1);
}

#[test]
fn a_shared_trigger_arms_once_every_client_started() {
    let mut h = harness(
        JobBuilder::new(and(refs(&["A", "B"])))
            .fakes(&["A", "B"])
            .controlled()
            .trigger("tick", "manual", "")
            .checker_trigger("A", "tick")
            .checker_trigger("B", "tick"),
    );
    h.run_root();
    assert!(!h.is_armed("tick"));

    h.complete("A", T);
    assert!(h.is_armed("tick"));
    assert_eq!(count(&h, |c| matches!(c, CoreCommand::ArmTrigger(_))), 1);
}

#[test]
fn a_user_break_disarms_and_later_fires_are_ignored() {
    let mut h = harness(
        JobBuilder::new(r("A"))
            .fakes(&["A"])
            .trigger("tick", "manual", "")
            .checker_trigger("A", "tick"),
    );
    h.run_root();
    h.complete("A", T);
    h.user_break("A");

    assert!(!h.is_armed("tick"));
    assert_eq!(count(&h, |c| matches!(c, CoreCommand::DisarmTrigger { .. })), 1);

    h.fire("tick");
    assert!(!h.is_pending("A"));
}

#[test]
fn an_event_trigger_starts_its_node_when_the_reference_dispatches() {
    let mut h = harness(
        JobBuilder::new(and(refs(&["A", "B"])))
            .fakes(&["A", "B"])
            .event_trigger("on_a_false", &["LastNotNullLogicalToFalse"], "A")
            .checker_trigger("B", "on_a_false"),
    );
    h.run_root();
    assert_eq!(h.pending_ids(), vec!["A"]);
    assert_eq!(h.state("B"), ProcessState::NONE);

    h.complete("A", F);
    assert_eq!(h.pending_ids(), vec!["B"]);
    // event sources never reach the executor
    assert_eq!(count(&h, |c| matches!(c, CoreCommand::ArmTrigger(_))), 0);
}

#[test]
fn an_event_trigger_ignores_other_events() {
    let mut h = harness(
        JobBuilder::new(and(refs(&["A", "B"])))
            .fakes(&["A", "B"])
            .event_trigger("on_a_false", &["LastNotNullLogicalToFalse"], "A")
            .checker_trigger("B", "on_a_false"),
    );
    h.run_root();
    h.complete("A", T);
    assert!(h.pending_ids().is_empty());
}

#[test]
fn workers_run_for_their_event_and_sender() {
    let mut h = harness(
        JobBuilder::new(and(refs(&["A", "B"])))
            .fakes(&["A", "B"])
            .worker("LastNotNullLogicalToTrue", Some("A"), "record", "notify"),
    );
    h.run_root();
    h.complete("B", T);
    assert!(h.worker_runs().is_empty());

    h.complete("A", T);
    assert_eq!(
        h.worker_runs(),
        vec![("LastNotNullLogicalToTrue".to_string(), "A".to_string())]
    );
}

#[test]
fn job_workers_see_any_events_of_their_descendants() {
    let mut h = harness(
        JobBuilder::new(r("A"))
            .fakes(&["A"])
            .worker("AnyException", None, "record", ""),
    );
    h.run_root();
    h.fault("A", "io");

    assert_eq!(
        h.worker_runs(),
        vec![("AnyException".to_string(), "Main".to_string())]
    );
}

#[test]
fn the_complementary_event_breaks_an_outstanding_worker() {
    let mut h = harness(
        JobBuilder::new(r("A"))
            .fakes(&["A"])
            .worker("LastNotNullLogicalToTrue", Some("A"), "record", ""),
    );
    h.run_root();
    h.complete("A", T);
    h.run("A");
    h.complete("A", F);

    let breaks: Vec<String> = h
        .commands
        .iter()
        .filter_map(|c| match c {
            CoreCommand::BreakWorker { node_id, .. } => Some(node_id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(breaks, vec!["A"]);
}

#[test]
fn a_finished_worker_is_not_broken() {
    let mut h = harness(
        JobBuilder::new(r("A"))
            .fakes(&["A"])
            .worker("LastNotNullLogicalToTrue", Some("A"), "record", ""),
    );
    h.run_root();
    h.complete("A", T);
    h.finish_workers();
    h.run("A");
    h.complete("A", F);

    assert_eq!(count(&h, |c| matches!(c, CoreCommand::BreakWorker { .. })), 0);
}

#[test]
fn a_triggered_worker_reruns_until_its_complement() {
    let mut h = harness(
        JobBuilder::new(r("A"))
            .fakes(&["A"])
            .trigger("tick", "manual", "")
            .worker("Exception", Some("A"), "record", "alert")
            .worker_trigger("tick"),
    );
    h.run_root();
    h.fault("A", "io");
    assert!(h.is_armed("tick"));
    h.finish_workers();

    h.fire("tick");
    assert_eq!(h.worker_runs().len(), 2);

    h.run("A");
    h.complete("A", T);
    assert!(!h.is_armed("tick"));
    h.fire("tick");
    assert_eq!(h.worker_runs().len(), 2);
}

#[test]
fn reset_workers_are_told_they_are_resetting() {
    let mut h = harness(
        JobBuilder::new(r("A"))
            .fakes(&["A"])
            .worker("Reset", Some("A"), "record", ""),
    );
    h.run_root();
    h.complete("A", T);
    h.reset("Main");

    let resetting: Vec<bool> = h
        .commands
        .iter()
        .filter_map(|c| match c {
            CoreCommand::ExecWorker(req) => Some(req.resetting),
            _ => None,
        })
        .collect();
    assert_eq!(resetting, vec![true]);
}

#[test]
fn workers_state_reports_missing_workers() {
    use logictree::tree::WorkersState;

    let h = harness(
        JobBuilder::new(and(refs(&["A", "B"])))
            .fakes(&["A", "B"])
            .worker("Finished", Some("A"), "record", "ok")
            .worker("Finished", Some("B"), "record", "missing"),
    );
    assert_eq!(h.tree().workers_state(h.node("A")), WorkersState::Valid);
    assert_eq!(h.tree().workers_state(h.node("B")), WorkersState::Invalid);
    assert_eq!(h.tree().workers_state(h.node("Main")), WorkersState::None);
}

#[test]
fn loggers_receive_the_events_they_ask_for() {
    let mut h = harness(
        JobBuilder::new(r("A"))
            .fakes(&["A"])
            .logger("rec", "record", "Started, Finished")
            .job_logger("rec"),
    );
    h.run_root();
    h.complete("A", T);

    let logged = h.logged();
    assert!(logged.iter().all(|e| e == "Started" || e == "Finished"));
    assert_eq!(logged.iter().filter(|e| *e == "Started").count(), 2);
    assert_eq!(logged.iter().filter(|e| *e == "Finished").count(), 2);
}

#[test]
fn a_checker_logger_overrides_the_job_logger() {
    let mut h = harness(
        JobBuilder::new(and(refs(&["A", "B"])))
            .fakes(&["A", "B"])
            .logger("all", "record", "*")
            .logger("none", "record", "Nothing")
            .job_logger("all")
            .checker_logger("B", "none"),
    );
    h.run_root();
    h.complete("A", T);
    h.complete("B", T);

    let sources: Vec<String> = h
        .commands
        .iter()
        .filter_map(|c| match c {
            CoreCommand::Log { entry, .. } => Some(entry.event.sender.clone()),
            _ => None,
        })
        .collect();
    assert!(sources.iter().any(|s| s == "A"));
    assert!(!sources.iter().any(|s| s == "B"));
}
