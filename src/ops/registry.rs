//! In-flight operation registry.
//!
//! Tracks which named operations are currently running and parks callers
//! until an operation completes or is cancelled. Entering a running key is
//! an error, so the client never runs two operations of the same kind at
//! once (e.g. two simultaneous connect attempts).

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use futures::future;
use thiserror::Error;
use tokio::sync::oneshot;

/// Identifier scoping one tracked in-flight operation.
///
/// Client-level operations that exist at most once (connecting,
/// disconnecting) use the [`Default`](OperationKey::Default) sentinel;
/// everything else is keyed by name (a receipt id, a transaction id).
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum OperationKey {
    /// Sentinel key for the client-level operation of a registry.
    #[default]
    Default,
    /// Named operation, e.g. a receipt or subscription id.
    Named(String),
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

impl From<&str> for OperationKey {
    fn from(name: &str) -> Self {
        Self::Named(name.to_owned())
    }
}

impl From<String> for OperationKey {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

/// Error type for registry operations.
///
/// Every variant carries the registry label and key (the `operation` text)
/// so failures are attributable without extra context. Timeouts are a
/// specialization of [`Cancelled`](OperationError::Cancelled), distinguished
/// by message content rather than a separate kind.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum OperationError {
    /// `enter` was called for a key that is already tracked.
    #[error("{operation} already in progress")]
    AlreadyInProgress {
        /// Registry label plus key.
        operation: String,
    },

    /// `wait` was called for a key that is not tracked.
    #[error("{operation} not in progress")]
    NotInProgress {
        /// Registry label plus key.
        operation: String,
    },

    /// The operation was cancelled or went away while waited on.
    #[error("{message}")]
    Cancelled {
        /// Human-readable cause, including the registry label and key.
        message: String,
    },
}

impl OperationError {
    /// Build a [`Cancelled`](OperationError::Cancelled) error from any
    /// printable reason.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }
}

/// A parked caller, resolved exactly once with the operation's outcome.
type Waiter = oneshot::Sender<Result<(), OperationError>>;

/// Registry of named in-flight operations.
///
/// A key is present in the registry iff its operation is currently in
/// progress. [`enter`](Self::enter) creates the entry and any number of
/// concurrent [`wait`](Self::wait) calls park on it; [`done`](Self::done)
/// or [`cancel`](Self::cancel) resolves every parked waiter and removes
/// the entry in one atomic step. Entering a key that is already present is
/// an error, which is what gives the client per-key mutual exclusion.
#[derive(Debug)]
pub struct OperationRegistry {
    /// Descriptive label used in all diagnostic and error text.
    label: String,
    /// Map of in-flight operations: key -> waiters parked on it.
    waiting: Mutex<HashMap<OperationKey, Vec<Waiter>>>,
}

impl OperationRegistry {
    /// Create an empty registry.
    ///
    /// `label` names the kind of operation being tracked and prefixes every
    /// diagnostic this registry emits (`"<label> <key>"`).
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            waiting: Mutex::new(HashMap::new()),
        }
    }

    /// The registry's diagnostic label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Diagnostic text for `key`: the label alone for the sentinel key,
    /// `"<label> <key>"` otherwise.
    #[must_use]
    pub fn describe(&self, key: &OperationKey) -> String {
        match key {
            OperationKey::Default => self.label.clone(),
            OperationKey::Named(name) => format!("{} {name}", self.label),
        }
    }

    /// Mark `key` as in progress.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::AlreadyInProgress`] if the key is already
    /// tracked.
    pub fn enter(&self, key: OperationKey) -> Result<(), OperationError> {
        let mut waiting = self.waiting.lock().unwrap();
        if waiting.contains_key(&key) {
            return Err(OperationError::AlreadyInProgress {
                operation: self.describe(&key),
            });
        }
        tracing::trace!(operation = %self.describe(&key), "operation entered");
        waiting.insert(key, Vec::new());
        Ok(())
    }

    /// Mark `key` as completed, resolving every parked waiter with success
    /// and removing the entry.
    ///
    /// Returns the number of waiters resolved. Absent keys are a no-op, and
    /// waiters that already resolved (e.g. by timing out) are skipped.
    pub fn done(&self, key: &OperationKey) -> usize {
        let mut waiting = self.waiting.lock().unwrap();
        let Some(waiters) = waiting.remove(key) else {
            return 0;
        };
        let resolved = waiters
            .into_iter()
            .filter_map(|waiter| waiter.send(Ok(())).ok())
            .count();
        tracing::trace!(operation = %self.describe(key), resolved, "operation completed");
        resolved
    }

    /// Mark `key` as cancelled, resolving every parked waiter with a failure
    /// and removing the entry.
    ///
    /// Waiters receive `reason` when one is supplied, otherwise a default
    /// [`Cancelled`](OperationError::Cancelled) error naming the operation.
    /// Returns the number of waiters resolved; absent keys are a no-op.
    /// Cancellation is cooperative: only waiters are resolved, external side
    /// effects the operation may have started are untouched.
    pub fn cancel(&self, key: &OperationKey, reason: Option<OperationError>) -> usize {
        let mut waiting = self.waiting.lock().unwrap();
        let Some(waiters) = waiting.remove(key) else {
            return 0;
        };
        let reason = reason.unwrap_or_else(|| {
            OperationError::cancelled(format!("{} cancelled", self.describe(key)))
        });
        let resolved = waiters
            .into_iter()
            .filter_map(|waiter| waiter.send(Err(reason.clone())).ok())
            .count();
        tracing::debug!(
            operation = %self.describe(key),
            resolved,
            reason = %reason,
            "operation cancelled"
        );
        resolved
    }

    /// Park until the operation tracked under `key` completes or is
    /// cancelled.
    ///
    /// Any number of callers may wait on the same key; all of them resolve
    /// when [`done`](Self::done) or [`cancel`](Self::cancel) runs. With a
    /// `timeout`, a caller that is still parked when it elapses resolves
    /// with a [`Cancelled`](OperationError::Cancelled) error instead; the
    /// timer is bound to this caller only and can never fire once the
    /// waiter has resolved by other means.
    ///
    /// # Errors
    ///
    /// [`OperationError::NotInProgress`] if `key` is not tracked when the
    /// wait begins, [`OperationError::Cancelled`] on cancellation or
    /// timeout.
    pub async fn wait(
        &self,
        key: &OperationKey,
        timeout: Option<Duration>,
    ) -> Result<(), OperationError> {
        let waiter = self.register(key)?;
        self.resolve(key, waiter, timeout).await
    }

    /// Wait for every operation currently in progress to resolve.
    ///
    /// The set of keys is snapshotted (and one waiter per key registered)
    /// in a single atomic step, then all waiters are awaited concurrently;
    /// operations entered after the snapshot do not affect this call. The
    /// optional `timeout` applies to each waiter individually. Returns only
    /// after every snapshotted waiter has resolved, reporting the first
    /// failure if any of them resolved with one.
    ///
    /// # Errors
    ///
    /// The first [`OperationError`] any snapshotted waiter resolved with.
    pub async fn wait_all(&self, timeout: Option<Duration>) -> Result<(), OperationError> {
        let waiters: Vec<_> = {
            let mut waiting = self.waiting.lock().unwrap();
            waiting
                .iter_mut()
                .map(|(key, list)| {
                    let (sender, receiver) = oneshot::channel();
                    list.push(sender);
                    (key.clone(), receiver)
                })
                .collect()
        };
        let pending = waiters
            .into_iter()
            .map(|(key, waiter)| async move { self.resolve(&key, waiter, timeout).await });
        let outcomes = future::join_all(pending).await;
        match outcomes.into_iter().find_map(Result::err) {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    /// Whether `key` is currently in progress.
    #[must_use]
    pub fn contains(&self, key: &OperationKey) -> bool {
        self.waiting.lock().unwrap().contains_key(key)
    }

    /// Number of operations currently in progress.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waiting.lock().unwrap().len()
    }

    /// Whether no operation is currently in progress.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waiting.lock().unwrap().is_empty()
    }

    /// Snapshot of the keys currently in progress, sorted for stable
    /// diagnostics.
    #[must_use]
    pub fn keys(&self) -> Vec<OperationKey> {
        let mut keys: Vec<_> = self.waiting.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of waiters parked on `key`, or `None` when the operation is
    /// not in progress.
    #[must_use]
    pub fn waiters(&self, key: &OperationKey) -> Option<usize> {
        self.waiting.lock().unwrap().get(key).map(Vec::len)
    }

    /// Append a waiter to `key`'s list and hand back the receiving half.
    fn register(
        &self,
        key: &OperationKey,
    ) -> Result<oneshot::Receiver<Result<(), OperationError>>, OperationError> {
        let mut waiting = self.waiting.lock().unwrap();
        let waiters = waiting.get_mut(key).ok_or_else(|| OperationError::NotInProgress {
            operation: self.describe(key),
        })?;
        let (sender, receiver) = oneshot::channel();
        waiters.push(sender);
        Ok(receiver)
    }

    /// Await a registered waiter, applying the optional timeout.
    ///
    /// Dropping the timed future on resolution is what cancels the timer,
    /// so a timeout can never fire after the waiter has resolved.
    async fn resolve(
        &self,
        key: &OperationKey,
        waiter: oneshot::Receiver<Result<(), OperationError>>,
        timeout: Option<Duration>,
    ) -> Result<(), OperationError> {
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, waiter).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(OperationError::cancelled(format!(
                        "waited too long for {} [timeout={limit:?}]",
                        self.describe(key)
                    )));
                }
            },
            None => waiter.await,
        };
        match outcome {
            Ok(resolution) => resolution,
            // Waiter dropped unresolved: the registry went away underneath us.
            Err(_) => Err(OperationError::cancelled(format!(
                "{} dropped before completion",
                self.describe(key)
            ))),
        }
    }
}
