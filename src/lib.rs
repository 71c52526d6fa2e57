//! Stampede: asynchronous coordination primitives for message-broker
//! protocol clients.
//!
//! A broker client juggles many small in-flight operations, from the
//! connect handshake to every receipt it is still owed. Stampede tracks
//! them and parks callers until they settle; a single-flight guard keeps
//! re-entrant routines honest.
//!
//! # Architecture
//!
//! - **Keyed operation tracking**: One registry per operation kind; a key
//!   is present iff that operation is in flight
//! - **Single-flight admission**: Re-runnable routines reject overlapping
//!   invocations instead of queueing them
//! - **Cooperative cancellation**: Cancelling resolves waiters; side
//!   effects already started are untouched
//! - **Endpoint descriptors**: Broker locations render to colon-delimited
//!   connector strings
//!
//! # Modules
//!
//! - [`endpoint`]: Broker endpoint descriptor rendering
//! - [`flight`]: Single-flight execution guard
//! - [`forward`]: Error-destination forwarding for failed handlers
//! - [`ops`]: In-flight operation registry and scoped acquisition

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // ops::registry::OperationRegistry is fine
    clippy::must_use_candidate       // Not all functions need #[must_use]
)]

pub mod endpoint;
pub mod flight;
pub mod forward;
pub mod ops;

// Re-export the types most callers touch
pub use endpoint::Broker;
pub use flight::{FlightHandle, SingleFlight, SingleFlightError};
pub use forward::{forward_and_raise, ErrorSink};
pub use ops::{
    OperationError, OperationKey, OperationLog, OperationRegistry, OperationScope, TracingLog,
};
