// tests/threshold_property.rs

use proptest::prelude::*;

use logictree::types::{Logical, ProcessState};
use logictree_test_utils::builders::{op, refs, JobBuilder, JobsBuilder};
use logictree_test_utils::CoreHarness;

fn logical() -> impl Strategy<Value = Logical> {
    prop_oneof![
        Just(Logical::True),
        Just(Logical::False),
        Just(Logical::Unknown),
    ]
}

/// Child values plus an order in which to complete them.
fn values_and_order() -> impl Strategy<Value = (Vec<Logical>, Vec<usize>)> {
    (1..7usize).prop_flat_map(|n| {
        (
            proptest::collection::vec(logical(), n),
            Just((0..n).collect::<Vec<usize>>()).prop_shuffle(),
        )
    })
}

fn operator() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("AND"), Just("OR"), Just("XOR")]
}

/// Completes `values[i]` on child `C<i>` in `order`; returns the root value.
fn run(operator: &str, values: &[Logical], order: &[usize]) -> (Logical, ProcessState) {
    let names: Vec<String> = (0..values.len()).map(|i| format!("C{i}")).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let jobs = JobsBuilder::new()
        .with_job("Main", JobBuilder::new(op(operator, refs(&names))).fakes(&names))
        .build();
    let mut h = CoreHarness::new(jobs, "Main");
    h.run_root();
    for &i in order {
        h.complete(names[i], values[i]);
    }
    (h.root_logical(), h.state("Main"))
}

fn kleene(operator: &str, values: &[Logical]) -> Option<Logical> {
    let any = |v: Logical| values.contains(&v);
    match operator {
        "AND" if any(Logical::False) => Some(Logical::False),
        "AND" if any(Logical::Unknown) => Some(Logical::Unknown),
        "AND" => Some(Logical::True),
        "OR" if any(Logical::True) => Some(Logical::True),
        "OR" if any(Logical::Unknown) => Some(Logical::Unknown),
        "OR" => Some(Logical::False),
        _ => None,
    }
}

proptest! {
    #[test]
    fn completion_order_does_not_change_the_result(
        operator in operator(),
        (values, order) in values_and_order(),
    ) {
        let in_order: Vec<usize> = (0..values.len()).collect();
        let (expected, _) = run(operator, &values, &in_order);
        let (actual, state) = run(operator, &values, &order);

        prop_assert_eq!(actual, expected);
        prop_assert_eq!(state, ProcessState::FINISHED);
        if let Some(value) = kleene(operator, &values) {
            prop_assert_eq!(actual, value);
        }
    }
}
