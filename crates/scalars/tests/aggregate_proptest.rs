//! Property-based tests for the aggregate maintainers.

use proptest::prelude::*;
use std::sync::Arc;
use vista_collections::ObservableVector;
use vista_core::OperationFault;
use vista_eval::{Expression, SequenceEvaluator};
use vista_scalars::{AverageView, MaxView, MinView, SumView};

#[derive(Clone, Debug)]
enum Op {
    Add { index: usize, items: Vec<i64> },
    Remove { index: usize, count: usize },
    Replace { index: usize, count: usize, items: Vec<i64> },
    Reset { items: Vec<i64> },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<usize>(), prop::collection::vec(-50i64..50, 1..4))
            .prop_map(|(index, items)| Op::Add { index, items }),
        (any::<usize>(), 1usize..3).prop_map(|(index, count)| Op::Remove { index, count }),
        (
            any::<usize>(),
            1usize..3,
            prop::collection::vec(-50i64..50, 0..3)
        )
            .prop_map(|(index, count, items)| Op::Replace {
                index,
                count,
                items
            }),
        prop::collection::vec(-50i64..50, 0..5).prop_map(|items| Op::Reset { items }),
    ]
}

fn apply_op(source: &ObservableVector<i64>, op: &Op) {
    let len = source.len();
    match op {
        Op::Add { index, items } => {
            source.insert_all(index % (len + 1), items.clone()).unwrap();
        }
        Op::Remove { index, count } => {
            if len == 0 {
                return;
            }
            let at = index % len;
            source.remove_range(at, (*count).min(len - at)).unwrap();
        }
        Op::Replace {
            index,
            count,
            items,
        } => {
            if len == 0 {
                return;
            }
            let at = index % len;
            source
                .replace_range(at, (*count).min(len - at), items.clone())
                .unwrap();
        }
        Op::Reset { items } => source.reset(items.clone()),
    }
}

proptest! {
    /// Sum, Average, Min and Max always agree with a from-scratch
    /// recomputation, and the empty-source faults toggle exactly with
    /// emptiness.
    #[test]
    fn aggregates_agree_with_oracle(ops in prop::collection::vec(op_strategy(), 1..25)) {
        let source: Arc<ObservableVector<i64>> = Arc::new(ObservableVector::new());
        let evaluator =
            SequenceEvaluator::new(source.clone(), Expression::infallible(|x: &i64| *x));
        let sum = SumView::over_sequence(&evaluator);
        let average = AverageView::over_sequence(&evaluator);
        let min = MinView::over_sequence(&evaluator);
        let max = MaxView::over_sequence(&evaluator);

        for op in &ops {
            apply_op(&source, op);
            let values = source.snapshot();

            prop_assert_eq!(sum.get(), values.iter().sum::<i64>());

            if values.is_empty() {
                prop_assert_eq!(average.fault(), Some(OperationFault::NoElements));
                prop_assert_eq!(min.fault(), Some(OperationFault::NoElements));
                prop_assert_eq!(max.fault(), Some(OperationFault::NoElements));
            } else {
                prop_assert_eq!(average.fault(), None);
                let expected_avg =
                    values.iter().sum::<i64>() as f64 / values.len() as f64;
                prop_assert!((average.get() - expected_avg).abs() < 1e-9);

                prop_assert_eq!(min.fault(), None);
                prop_assert_eq!(min.get(), *values.iter().min().unwrap());
                prop_assert_eq!(max.get(), *values.iter().max().unwrap());
            }
        }
    }
}
