//! Scoped operation acquisition.
//!
//! [`OperationRegistry::begin`] enters a key and returns a token whose
//! release runs on every exit path. [`complete`](OperationScope::complete)
//! resolves waiters with success; [`fail`](OperationScope::fail) cancels
//! them with the failure. Dropping the token (early return, panic) cancels
//! them with a default reason, and [`OperationRegistry::scoped`] wraps the
//! whole pattern around a closure.

use std::future::Future;

use super::registry::{OperationError, OperationKey, OperationRegistry};

/// Collaborator receiving lifecycle diagnostics from scoped operations.
///
/// Implementations must be callable from any task, hence the `Send + Sync`
/// bound.
pub trait OperationLog: Send + Sync {
    /// An operation started or completed normally.
    fn debug(&self, message: &str);
    /// An operation failed.
    fn error(&self, message: &str);
}

/// [`OperationLog`] that forwards to the `tracing` macros, for callers that
/// have no logger of their own.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLog;

impl OperationLog for TracingLog {
    fn debug(&self, message: &str) {
        tracing::debug!("{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }
}

/// Token for one scoped operation.
///
/// Hold it for as long as the operation runs, then consume it with
/// [`complete`](Self::complete) or [`fail`](Self::fail). A token that is
/// dropped instead (an early `?`, a panic) cancels the operation so no
/// waiter is ever left dangling.
#[must_use = "dropping the scope cancels the operation"]
pub struct OperationScope<'a> {
    registry: &'a OperationRegistry,
    key: OperationKey,
    log: Option<&'a dyn OperationLog>,
    armed: bool,
}

impl OperationRegistry {
    /// Enter `key` and return the scope token guarding it.
    ///
    /// Logs `"<operation> started."` through `log` when one is supplied.
    ///
    /// # Errors
    ///
    /// [`OperationError::AlreadyInProgress`] if the key is already tracked.
    pub fn begin<'a>(
        &'a self,
        key: OperationKey,
        log: Option<&'a dyn OperationLog>,
    ) -> Result<OperationScope<'a>, OperationError> {
        self.enter(key.clone())?;
        if let Some(log) = log {
            log.debug(&format!("{} started.", self.describe(&key)));
        }
        Ok(OperationScope {
            registry: self,
            key,
            log,
            armed: true,
        })
    }

    /// Run `operation` inside a scope on `key`.
    ///
    /// Enters the key, awaits the closure's future, and releases the entry
    /// on the way out: success resolves waiters with success, failure
    /// cancels them with the failure as reason and re-raises it.
    ///
    /// # Errors
    ///
    /// [`OperationError::AlreadyInProgress`] if the key is already tracked,
    /// otherwise whatever the closure fails with.
    pub async fn scoped<T, F, Fut>(
        &self,
        key: OperationKey,
        log: Option<&dyn OperationLog>,
        operation: F,
    ) -> Result<T, OperationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        let scope = self.begin(key, log)?;
        match operation().await {
            Ok(value) => {
                scope.complete();
                Ok(value)
            }
            Err(failure) => {
                scope.fail(failure.clone());
                Err(failure)
            }
        }
    }
}

impl OperationScope<'_> {
    /// The key this scope guards.
    #[must_use]
    pub fn key(&self) -> &OperationKey {
        &self.key
    }

    /// Diagnostic text for the guarded operation.
    #[must_use]
    pub fn describe(&self) -> String {
        self.registry.describe(&self.key)
    }

    /// Conclude the operation successfully, resolving every waiter parked
    /// on it. Returns the number of waiters resolved.
    pub fn complete(mut self) -> usize {
        self.armed = false;
        let resolved = self.registry.done(&self.key);
        if let Some(log) = self.log {
            log.debug(&format!("{} complete.", self.describe()));
        }
        resolved
    }

    /// Conclude the operation with `reason`, cancelling every waiter parked
    /// on it. Returns the number of waiters resolved.
    pub fn fail(mut self, reason: OperationError) -> usize {
        self.armed = false;
        if let Some(log) = self.log {
            log.error(&format!("{} failed [{reason}]", self.describe()));
        }
        self.registry.cancel(&self.key, Some(reason))
    }
}

impl Drop for OperationScope<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(log) = self.log {
            log.error(&format!("{} failed [scope dropped]", self.describe()));
        }
        self.registry.cancel(&self.key, None);
    }
}
