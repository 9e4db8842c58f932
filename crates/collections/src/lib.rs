//! Vista Collections - Synchronized observable collection primitives.
//!
//! This crate provides the physically materialized storage behind every
//! derived view:
//!
//! - `ObservableVector<T>`: an addressable sequence with batched
//!   insert/remove/replace/move/reset, one coalesced notification per batch
//! - `ObservableMap<K, V>`: the keyed analogue
//! - `SubscriptionManager<E>`: monotonic-id subscription bookkeeping shared
//!   by everything that broadcasts events
//! - `FaultSlot`: a settable, observable operation-fault cell
//!
//! Each collection instance owns one mutex guarding its contents, held for
//! the duration of one mutation batch. Notifications are dispatched after
//! that lock is released, so a subscriber may freely read the collection or
//! mutate its own state without lock-order concerns. Collections constructed
//! with a `NotifyContext` post their outbound notifications onto it instead
//! of the mutating thread.

mod fault_slot;
mod map;
mod subscription;
mod sync;
mod vector;

pub use fault_slot::FaultSlot;
pub use map::ObservableMap;
pub use subscription::{Callback, SubscriptionId, SubscriptionManager};
pub use sync::lock;
pub use vector::{ObservableVector, SourceId};
