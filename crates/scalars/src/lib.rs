//! Vista Scalars - Incrementally maintained scalar views.
//!
//! Aggregates and accessors maintain one value plus an operation fault as
//! their source changes, without recomputing from scratch:
//!
//! - `SumView` / `AverageView`: running totals via elementwise deltas
//! - `MinView` / `MaxView`: extremum tracking; removing or changing away
//!   from the current extremum triggers a deliberate O(n) rescan, any other
//!   change is O(1)
//! - `FirstView` / `LastView` / `SingleView` / `ElementAtView` / `AnyView` /
//!   `AllView`: single-value views whose fault toggles with membership
//!
//! A faulted scalar still exposes its default or last-known value; consumers
//! must check the fault before trusting it. Aggregates consume the reduced
//! `ValueChange` stream, so one implementation serves sequence and map
//! sources alike.

mod accessor;
mod aggregate;
mod cell;
mod numeric;

pub use accessor::{AllView, AnyView, ElementAtView, FirstView, LastView, SingleView};
pub use aggregate::{AverageView, MaxView, MinView, SumView};
pub use cell::ScalarCell;
pub use numeric::Numeric;
