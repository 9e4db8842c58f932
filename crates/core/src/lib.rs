//! Vista Core - Core types and change notification protocol for Vista.
//!
//! This crate provides the foundational types for the Vista incremental
//! view-maintenance engine:
//!
//! - `SequenceChange` / `MapChange`: coalesced change notifications emitted by
//!   the observable collection primitives
//! - `ElementEvent` / `EntryEvent`: the event vocabulary every operator
//!   consumes from its upstream evaluator
//! - `ValueChange`: the membership/value projection consumed by aggregate
//!   maintainers
//! - `ElementFault` / `OperationFault`: the two error channels of a view
//! - `IndexingStrategy`: the bookkeeping structure chosen for a view
//! - `NotifyContext`: execution-affinity marshaling for outbound notifications
//! - `Error`: error types for view construction and maintenance
//!
//! # Example
//!
//! ```rust
//! use vista_core::{ElementEvent, IndexingStrategy, OperationFault};
//!
//! let event = ElementEvent::Added {
//!     index: 0,
//!     pairs: vec![("a", 1i64)],
//! };
//!
//! assert!(event.is_membership());
//! assert_eq!(IndexingStrategy::default(), IndexingStrategy::NoneOrInherit);
//! assert_ne!(OperationFault::NoElements, OperationFault::MultipleElements);
//! ```

mod context;
mod error;
mod event;
mod fault;
mod strategy;

pub use context::{contexts_conflict, CallingThreadContext, NotifyContext};
pub use error::{Error, Result};
pub use event::{ElementEvent, EntryEvent, MapChange, SequenceChange, ValueChange};
pub use fault::{ElementFault, OperationFault};
pub use strategy::IndexingStrategy;
