//! Vista Index - Position and multiplicity bookkeeping for derived views.
//!
//! Nearly every operator needs to answer "where does this element currently
//! live in my output, and how many times?" without rescanning. This crate
//! provides the three reusable structures behind that answer:
//!
//! - `PositionIndex`: element -> every physical position it occupies
//!   (duplicates supported), with block insert/remove/move shifting
//! - `PositionedMultiset`: element -> one grouped `(start, len)` run, backed
//!   by a hash or ordered map per `IndexingStrategy`
//! - `MultiplicityMap`: element -> occurrence count with explicit
//!   first-appeared / last-vanished transitions
//!
//! Invariant shared by all three: the map reflects the current physical
//! contents of the derived view before any mutating call returns.

mod multiplicity;
mod position_index;
mod runs;

pub use multiplicity::MultiplicityMap;
pub use position_index::PositionIndex;
pub use runs::{PositionedMultiset, Run};
