//! In-flight operation tracking.

pub mod registry;
pub mod scoped;

pub use registry::{OperationError, OperationKey, OperationRegistry};
pub use scoped::{OperationLog, OperationScope, TracingLog};
