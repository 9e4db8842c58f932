//! Vista Eval - Per-element live-result evaluators.
//!
//! An evaluator sits between a source collection and the operators that
//! maintain derived views. It owns the current `(element, result)` pairs,
//! recomputes results when asked, isolates per-element faults, and
//! translates source changes into the `ElementEvent` / `EntryEvent`
//! vocabulary of `vista-core`.
//!
//! - `Expression` / `MapExpression`: a shared computation with a stable
//!   identity, so views over the same (source, expression) pair can share
//!   one evaluator
//! - `SequenceEvaluator`: evaluator over an `ObservableVector`
//! - `MapEvaluator`: evaluator over an `ObservableMap`
//! - `EvaluatorRegistry`: reference-counted sharing keyed by
//!   (source, expression)
//!
//! Results are recomputed on explicit `refresh` calls; the dependency
//! tracking that decides *when* to refresh is a concern of the caller.

mod expression;
mod map;
mod registry;
mod sequence;

pub use expression::{ExprId, Expression, MapExpression};
pub use map::MapEvaluator;
pub use registry::{EvaluatorHandle, EvaluatorRegistry};
pub use sequence::SequenceEvaluator;
