//! Contract tests for the in-flight operation registry.
//!
//! Tests:
//! - Waiters park across tasks and resolve on done/cancel
//! - Wait timeouts fire for slow operations, never after resolution
//! - wait_all drains everything a session still has pending

mod common;

use std::sync::Arc;
use std::time::Duration;

use stampede::{OperationError, OperationKey, OperationRegistry};

/// Waiters parked on the connect operation all resolve when it completes.
#[tokio::test]
async fn test_connect_waiters_resolve_on_done() {
    common::init_test_tracing();
    let registry = Arc::new(OperationRegistry::new("connect"));
    registry.enter(OperationKey::Default).expect("fresh registry");

    let mut waiters = Vec::new();
    for _ in 0..4 {
        let registry = Arc::clone(&registry);
        waiters.push(tokio::spawn(async move {
            registry
                .wait(&OperationKey::Default, Some(Duration::from_secs(5)))
                .await
        }));
    }
    assert!(
        common::wait_for(Duration::from_secs(1), || {
            registry.waiters(&OperationKey::Default) == Some(4)
        })
        .await,
        "waiters should park on the connect entry"
    );

    assert_eq!(registry.done(&OperationKey::Default), 4);
    for waiter in waiters {
        waiter
            .await
            .expect("waiter task panicked")
            .expect("waiter should resolve ok");
    }
    assert!(registry.is_empty(), "connect entry should be gone");
}

/// A receipt that never arrives times out with a cancellation error.
#[tokio::test]
async fn test_receipt_wait_times_out() {
    common::init_test_tracing();
    let registry = OperationRegistry::new("receipt");
    let key = OperationKey::from("message-17");
    registry.enter(key.clone()).expect("fresh registry");

    let failure = registry
        .wait(&key, Some(Duration::from_millis(50)))
        .await
        .expect_err("no one completes the receipt");
    assert!(
        failure
            .to_string()
            .contains("waited too long for receipt message-17"),
        "unexpected timeout text: {failure}"
    );

    // The operation itself is still pending; a late broker answer finds
    // no live waiter left to resolve.
    assert!(registry.contains(&key));
    assert_eq!(registry.done(&key), 0);
}

/// Losing the connection cancels every pending receipt with the reason.
#[tokio::test]
async fn test_connection_loss_cancels_pending_receipts() {
    common::init_test_tracing();
    let registry = Arc::new(OperationRegistry::new("receipt"));
    for id in ["r-1", "r-2"] {
        registry.enter(id.into()).expect("receipt ids are distinct");
    }

    let mut waiters = Vec::new();
    for id in ["r-1", "r-2"] {
        let registry = Arc::clone(&registry);
        waiters.push(tokio::spawn(
            async move { registry.wait(&id.into(), None).await },
        ));
    }
    assert!(
        common::wait_for(Duration::from_secs(1), || {
            registry.waiters(&"r-1".into()) == Some(1)
                && registry.waiters(&"r-2".into()) == Some(1)
        })
        .await,
        "both receipt waiters should park"
    );

    let reason = OperationError::cancelled("connection lost");
    for id in ["r-1", "r-2"] {
        assert_eq!(registry.cancel(&id.into(), Some(reason.clone())), 1);
    }
    for waiter in waiters {
        let failure = waiter
            .await
            .expect("waiter task panicked")
            .expect_err("receipt should be cancelled");
        assert_eq!(failure, reason);
    }
    assert!(registry.is_empty());
}

/// wait_all holds a disconnect open until every pending receipt settles.
#[tokio::test]
async fn test_wait_all_drains_pending_receipts() {
    common::init_test_tracing();
    let registry = Arc::new(OperationRegistry::new("receipt"));
    for id in ["r-1", "r-2", "r-3"] {
        registry.enter(id.into()).expect("receipt ids are distinct");
    }

    let drain = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.wait_all(Some(Duration::from_secs(5))).await })
    };
    assert!(
        common::wait_for(Duration::from_secs(1), || {
            ["r-1", "r-2", "r-3"]
                .iter()
                .all(|id| registry.waiters(&OperationKey::from(*id)) == Some(1))
        })
        .await,
        "wait_all should register one waiter per receipt"
    );

    for id in ["r-1", "r-2", "r-3"] {
        registry.done(&id.into());
    }
    drain
        .await
        .expect("drain task panicked")
        .expect("drain should resolve ok");
    assert!(registry.is_empty());
}

/// Concurrent enters of the same key admit exactly one task.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_enter_is_mutually_exclusive_across_tasks() {
    common::init_test_tracing();
    let registry = Arc::new(OperationRegistry::new("transaction"));

    let mut attempts = Vec::new();
    for _ in 0..8 {
        let registry = Arc::clone(&registry);
        attempts.push(tokio::spawn(
            async move { registry.enter("tx-1".into()).is_ok() },
        ));
    }

    let mut admitted = 0;
    for attempt in attempts {
        if attempt.await.expect("enter task panicked") {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1, "exactly one task should enter tx-1");
    assert_eq!(registry.keys(), vec![OperationKey::from("tx-1")]);
}
