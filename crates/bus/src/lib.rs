//! Cross-context command bus.
//!
//! UI code emits an [`Envelope`] through a [`Bus`]; the bus routes it from a
//! target [`ScopeId`] up to the root scope, invoking every capability handler
//! registered for the envelope's [`EventName`] along the way. The first handler
//! that writes a result and breaks propagation wins. If propagation completes
//! without a result the caller gets [`BusError::NoHandler`].
//!
//! Results are either immediately available ([`Dispatched::Ready`]) or pending
//! ([`Dispatched::Pending`]) when the handler delegated the work to another
//! execution context. Dispatch itself is always synchronous; callers suspend
//! only when awaiting a pending result.
//!
//! # Invariants
//!
//! - Event names are globally unique. Enforced at compile time for the
//!   built-in table and by [`check_unique`] for extension tables.
//! - Inner scopes are visited before outer scopes; within a scope handlers run
//!   in registration order.
//! - Two handlers that both write a result without breaking: the last write
//!   wins. This is the defined behavior, not a recommended pattern.

#![warn(missing_docs)]

mod dispatch;
mod envelope;
mod error;
pub mod names;
mod registry;

pub use dispatch::{Bus, Dispatched, PendingResult, answering};
pub use envelope::{Envelope, EnvelopeResult, PendingFuture};
pub use error::BusError;
pub use names::{EventName, NameTable, Namespace, builtin_tables, check_unique};
pub use registry::{CapabilityRegistry, Handler, ScopeId};
