//! Fault types for Vista views.
//!
//! Views carry two distinct error channels that are never conflated:
//!
//! - `ElementFault`: an error raised while computing one element's result,
//!   isolated from the rest of the view
//! - `OperationFault`: a view-level condition about the aggregate or scalar
//!   result itself, represented as settable state rather than a thrown error

use crate::error::Error;
use core::fmt;

/// An error raised while evaluating one logical element's result.
///
/// An element fault never halts maintenance of the other elements; the
/// evaluator records it per element and surfaces it through the
/// `FaultChanging` / `FaultChanged` events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementFault {
    message: String,
}

impl ElementFault {
    /// Creates a new element fault with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the fault message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ElementFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element fault: {}", self.message)
    }
}

impl From<Error> for ElementFault {
    fn from(err: Error) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

/// A view-level error condition, settable and clearable over time.
///
/// A view with an active operation fault still exposes a default or
/// last-known value; consumers must check the fault before trusting it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationFault {
    /// The source contains no elements.
    NoElements,
    /// The source contains more than one element where one was required.
    MultipleElements,
    /// The requested index is outside the source's current bounds.
    IndexOutOfRange,
    /// At least one projected key is null.
    NullKey,
    /// At least one key occurs more than once.
    DuplicateKey,
    /// An element-level fault surfaced during the initial snapshot of a
    /// scalar that requires every element.
    ElementError(ElementFault),
}

impl fmt::Display for OperationFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationFault::NoElements => write!(f, "sequence contains no elements"),
            OperationFault::MultipleElements => {
                write!(f, "sequence contains more than one element")
            }
            OperationFault::IndexOutOfRange => write!(f, "index out of range"),
            OperationFault::NullKey => write!(f, "key is null"),
            OperationFault::DuplicateKey => write!(f, "duplicate key"),
            OperationFault::ElementError(fault) => write!(f, "{}", fault),
        }
    }
}
