// src/tree/evaluator.rs

//! Threshold evaluator for internal nodes.
//!
//! Each operator is compiled into two bounds over its operand count `n`:
//!
//! | operator            | n_plus | n_minus |
//! |---------------------|--------|---------|
//! | NOT                 | -1     | 1       |
//! | OR, IS              | 0      | n + 1   |
//! | AND, XOR, compare   | n - 1  | n + 1   |
//!
//! Counting operators decide as soon as the still-pending operands can no
//! longer change the answer. XOR and comparisons wait for every operand.

use serde_json::Value;

use crate::tree::compare::compare_all;
use crate::types::{Logical, Operator};

/// Compiled decision bounds of one list node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    pub operator: Operator,
    pub operands: i64,
    pub n_plus: i64,
    pub n_minus: i64,
}

/// Tally of a list's children at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tally {
    /// Children with a decided value.
    pub results: i64,
    /// Decided children that are true.
    pub positive: i64,
    /// Return payloads in child order; only read by comparison operators.
    pub payloads: Vec<Option<Value>>,
}

impl Tally {
    pub fn push(&mut self, value: Logical, payload: Option<Value>) {
        if let Some(b) = value.as_bool() {
            self.results += 1;
            if b {
                self.positive += 1;
            }
        }
        self.payloads.push(payload);
    }

    /// Child excluded from counting (faulted). Keeps payload positions aligned.
    pub fn skip(&mut self) {
        self.payloads.push(None);
    }
}

impl Threshold {
    pub fn compile(operator: Operator, operands: usize) -> Self {
        let n = operands as i64;
        let (n_plus, n_minus) = match operator {
            Operator::Not => (-1, 1),
            Operator::Or | Operator::Is => (0, n + 1),
            _ => (n - 1, n + 1),
        };
        Self {
            operator,
            operands: n,
            n_plus,
            n_minus,
        }
    }

    /// Operators that only decide once every operand resolved.
    pub fn waits_for_all(&self) -> bool {
        self.operator == Operator::Xor || self.operator.is_comparison()
    }

    pub fn evaluate(&self, tally: &Tally) -> Logical {
        let n = self.operands;
        let results = tally.results;
        let positive = tally.positive;

        if results == 0 {
            return Logical::Unknown;
        }

        if self.waits_for_all() {
            if results < n {
                return Logical::Unknown;
            }
            if self.operator == Operator::Xor {
                return Logical::from_bool(positive % 2 == 1);
            }
            return compare_all(self.operator, &tally.payloads);
        }

        let pending = n - results;
        if positive > self.n_plus {
            if positive >= self.n_minus {
                return Logical::False;
            }
            if positive + pending < self.n_minus {
                return Logical::True;
            }
            return Logical::Unknown;
        }

        if pending <= self.n_plus - positive {
            return Logical::False;
        }
        Logical::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tally(values: &[Logical]) -> Tally {
        let mut t = Tally::default();
        for v in values {
            t.push(*v, None);
        }
        t
    }

    const T: Logical = Logical::True;
    const F: Logical = Logical::False;
    const U: Logical = Logical::Unknown;

    #[test]
    fn bounds_per_operator() {
        let and = Threshold::compile(Operator::And, 3);
        assert_eq!((and.n_plus, and.n_minus), (2, 4));
        let or = Threshold::compile(Operator::Or, 3);
        assert_eq!((or.n_plus, or.n_minus), (0, 4));
        let not = Threshold::compile(Operator::Not, 1);
        assert_eq!((not.n_plus, not.n_minus), (-1, 1));
    }

    #[test]
    fn and_decides_false_early() {
        let and = Threshold::compile(Operator::And, 3);
        assert_eq!(and.evaluate(&tally(&[F, U, U])), F);
        assert_eq!(and.evaluate(&tally(&[T, U, U])), U);
        assert_eq!(and.evaluate(&tally(&[T, T, U])), U);
        assert_eq!(and.evaluate(&tally(&[T, T, T])), T);
    }

    #[test]
    fn or_decides_true_early() {
        let or = Threshold::compile(Operator::Or, 3);
        assert_eq!(or.evaluate(&tally(&[U, T, U])), T);
        assert_eq!(or.evaluate(&tally(&[F, F, U])), U);
        assert_eq!(or.evaluate(&tally(&[F, F, F])), F);
    }

    #[test]
    fn not_inverts_single_operand() {
        let not = Threshold::compile(Operator::Not, 1);
        assert_eq!(not.evaluate(&tally(&[T])), F);
        assert_eq!(not.evaluate(&tally(&[F])), T);
        assert_eq!(not.evaluate(&tally(&[U])), U);
    }

    #[test]
    fn xor_waits_then_uses_parity() {
        let xor = Threshold::compile(Operator::Xor, 3);
        assert_eq!(xor.evaluate(&tally(&[T, F, U])), U);
        assert_eq!(xor.evaluate(&tally(&[T, F, F])), T);
        assert_eq!(xor.evaluate(&tally(&[T, T, F])), F);
        assert_eq!(xor.evaluate(&tally(&[T, T, T])), T);
    }

    #[test]
    fn comparison_reads_payloads() {
        let eq = Threshold::compile(Operator::Eq, 2);
        let mut t = Tally::default();
        t.push(T, Some(Value::from(5)));
        t.push(T, Some(Value::from("5")));
        assert_eq!(eq.evaluate(&t), T);

        let mut waiting = Tally::default();
        waiting.push(T, Some(Value::from(5)));
        waiting.push(U, None);
        assert_eq!(eq.evaluate(&waiting), U);
    }

    #[test]
    fn skipped_child_never_counts_as_negative() {
        let and = Threshold::compile(Operator::And, 2);
        let mut t = tally(&[T]);
        t.skip();
        assert_eq!(and.evaluate(&t), U);

        let or = Threshold::compile(Operator::Or, 2);
        let mut t = tally(&[F]);
        t.skip();
        assert_eq!(or.evaluate(&t), U);
    }

    fn resolution_orders() -> impl Strategy<Value = (Vec<bool>, Vec<usize>)> {
        prop::collection::vec(any::<bool>(), 1..7).prop_flat_map(|values| {
            let n = values.len();
            (Just(values), Just((0..n).collect::<Vec<_>>()).prop_shuffle())
        })
    }

    proptest! {
        #[test]
        fn and_is_order_independent((values, order) in resolution_orders()) {
            let and = Threshold::compile(Operator::And, values.len());
            let mut current = vec![U; values.len()];
            let mut seen_false = false;
            for (step, idx) in order.iter().enumerate() {
                current[*idx] = Logical::from_bool(values[*idx]);
                seen_false |= !values[*idx];
                let got = and.evaluate(&tally(&current));
                let expected = if seen_false {
                    F
                } else if step + 1 == values.len() {
                    T
                } else {
                    U
                };
                prop_assert_eq!(got, expected);
            }
        }

        #[test]
        fn or_is_order_independent((values, order) in resolution_orders()) {
            let or = Threshold::compile(Operator::Or, values.len());
            let mut current = vec![U; values.len()];
            let mut seen_true = false;
            for (step, idx) in order.iter().enumerate() {
                current[*idx] = Logical::from_bool(values[*idx]);
                seen_true |= values[*idx];
                let got = or.evaluate(&tally(&current));
                let expected = if seen_true {
                    T
                } else if step + 1 == values.len() {
                    F
                } else {
                    U
                };
                prop_assert_eq!(got, expected);
            }
        }

        #[test]
        fn xor_is_parity_once_complete((values, order) in resolution_orders()) {
            let xor = Threshold::compile(Operator::Xor, values.len());
            let mut current = vec![U; values.len()];
            for (step, idx) in order.iter().enumerate() {
                current[*idx] = Logical::from_bool(values[*idx]);
                let got = xor.evaluate(&tally(&current));
                if step + 1 < values.len() {
                    prop_assert_eq!(got, U);
                } else {
                    let parity = values.iter().filter(|v| **v).count() % 2 == 1;
                    prop_assert_eq!(got, Logical::from_bool(parity));
                }
            }
        }
    }
}
