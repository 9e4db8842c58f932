//! Vista Views - Incrementally maintained collection operators.
//!
//! Each operator here consumes an upstream evaluator's event stream and
//! maintains one derived, observable output without ever recomputing from
//! scratch (a full `Reset` being the sole, explicit exception):
//!
//! - `FilteredView` (Where): the matching subsequence under a live predicate
//! - `ProjectedView` (Select): position-aligned per-element results
//! - `FlattenedView` (SelectMany): flattened nested live sequences
//! - `SortedView` (OrderBy): a totally ordered sequence under live keys
//! - `GroupedView` (GroupBy): live groups keyed by a live key
//! - `DistinctView`: multiset collapse to one occurrence per element
//! - `ConcatView`: two independently changing sources, concatenated
//! - keyed variants: `FilteredMapView`, `ProjectedMapView`, `ToMapView`,
//!   `GroupedMapView`
//!
//! Every operator follows the same shape: translate one upstream event into
//! the minimal edits on its output collection, under one state lock held for
//! the whole translation. Events are enums matched exhaustively, so no
//! operator inspects notification payloads by runtime type. Disposal
//! unsubscribes from the upstream and is idempotent; a disposed view never
//! sees another event.

mod concat;
mod distinct;
mod filter;
mod group_by;
mod keyed;
mod order_by;
mod select;
mod select_many;

pub use concat::ConcatView;
pub use distinct::DistinctView;
pub use filter::FilteredView;
pub use group_by::{Group, GroupedView};
pub use keyed::{FilteredMapView, GroupedMapView, ProjectedMapView, ToMapView};
pub use order_by::{SortOrder, SortedView};
pub use select::ProjectedView;
pub use select_many::{FlattenedView, Nested};
