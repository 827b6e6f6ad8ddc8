//! Tests for the shared connection cache

mod common;

use common::{stub_error, stub_uri, StubConnector};
use conncache::commands::connect::connect_with;
use conncache::{ConnectError, ConnectionCache};
use futures::future::join_all;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_sequential_calls_reuse_connection() {
    let connector = StubConnector::succeeding();
    let calls = connector.calls();
    let cache = ConnectionCache::new(connector, stub_uri());

    let first = cache.get_connection().await.unwrap();
    let second = cache.get_connection().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.attempts(), 1);
}

#[tokio::test]
async fn test_cache_starts_empty() {
    let connector = StubConnector::succeeding();
    let calls = connector.calls();
    let cache = ConnectionCache::new(connector, stub_uri());

    assert!(cache.cached().is_none());
    assert!(!cache.is_connecting());
    assert_eq!(cache.attempts(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_calls_share_single_attempt() {
    let (connector, gate) = StubConnector::succeeding().gated();
    let calls = connector.calls();
    let cache = ConnectionCache::new(connector, stub_uri());

    let waiters = join_all((0..16).map(|_| cache.get_connection()));
    let release = async {
        while !cache.is_connecting() {
            tokio::task::yield_now().await;
        }
        gate.add_permits(1);
    };
    let (results, ()) = tokio::join!(waiters, release);

    let connections: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(connections.len(), 16);
    assert!(connections
        .iter()
        .all(|connection| Arc::ptr_eq(connection, &connections[0])));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!cache.is_connecting());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tasks_share_single_attempt() {
    let (connector, gate) = StubConnector::succeeding().gated();
    let calls = connector.calls();
    let cache = Arc::new(ConnectionCache::new(connector, stub_uri()));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_connection().await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.is_connecting());
    gate.add_permits(1);

    let connections: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|task| task.unwrap().unwrap())
        .collect();
    assert!(connections
        .iter()
        .all(|connection| Arc::ptr_eq(connection, &connections[0])));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failure_clears_cache_and_next_call_retries() {
    let connector = StubConnector::failing_times(1);
    let calls = connector.calls();
    let cache = ConnectionCache::new(connector, stub_uri());

    let err = cache.get_connection().await.unwrap_err();
    assert_eq!(err, stub_error(1));
    assert!(cache.cached().is_none());
    assert!(!cache.is_connecting());

    let connection = cache.get_connection().await.unwrap();
    assert_eq!(connection.attempt, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failure_is_shared_by_all_waiters() {
    let (connector, gate) = StubConnector::failing_times(1).gated();
    let calls = connector.calls();
    let cache = ConnectionCache::new(connector, stub_uri());

    let waiters = join_all((0..4).map(|_| cache.get_connection()));
    let release = async {
        while !cache.is_connecting() {
            tokio::task::yield_now().await;
        }
        gate.add_permits(1);
    };
    let (results, ()) = tokio::join!(waiters, release);

    for result in results {
        assert_eq!(result.unwrap_err(), stub_error(1));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.cached().is_none());
    assert!(!cache.is_connecting());
}

#[tokio::test]
async fn test_waiters_on_retry_receive_success() {
    let (connector, gate) = StubConnector::failing_times(1).gated();
    let calls = connector.calls();
    let cache = ConnectionCache::new(connector, stub_uri());

    gate.add_permits(1);
    assert!(cache.get_connection().await.is_err());

    let waiters = join_all((0..4).map(|_| cache.get_connection()));
    let release = async {
        while !cache.is_connecting() {
            tokio::task::yield_now().await;
        }
        gate.add_permits(1);
    };
    let (results, ()) = tokio::join!(waiters, release);

    let connections: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    assert!(connections.iter().all(|connection| connection.attempt == 2));
    assert!(connections
        .iter()
        .all(|connection| Arc::ptr_eq(connection, &connections[0])));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_fail_then_succeed_then_cached() {
    let connector = StubConnector::failing_times(1);
    let calls = connector.calls();
    let cache = ConnectionCache::new(connector, stub_uri());

    assert!(cache.get_connection().await.is_err());
    assert!(cache.cached().is_none());

    let connected = cache.get_connection().await.unwrap();
    let cached = cache.cached().expect("connection should be cached");
    assert!(Arc::ptr_eq(&connected, &cached));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let again = cache.get_connection().await.unwrap();
    assert!(Arc::ptr_eq(&connected, &again));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.attempts(), 2);
}

#[tokio::test]
async fn test_abandoned_waiter_does_not_cancel_attempt() {
    let (connector, gate) = StubConnector::succeeding().gated();
    let calls = connector.calls();
    let cache = ConnectionCache::new(connector, stub_uri());

    let timed_out = tokio::time::timeout(Duration::from_millis(10), cache.get_connection()).await;
    assert!(timed_out.is_err());
    assert!(cache.is_connecting());

    gate.add_permits(1);
    let connection = cache.get_connection().await.unwrap();
    assert_eq!(connection.attempt, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_connect_with_reports_shared_handle() {
    let connector = StubConnector::succeeding();
    let cache = Arc::new(ConnectionCache::new(connector, stub_uri()));

    let report = connect_with(&cache, 8).await.unwrap();
    assert_eq!(report.callers, 8);
    assert_eq!(report.attempts, 1);
    assert!(report.shared_handle);
}

#[tokio::test]
async fn test_connect_with_surfaces_failure() {
    let connector = StubConnector::failing_times(1);
    let cache = Arc::new(ConnectionCache::new(connector, stub_uri()));

    let err = connect_with(&cache, 3).await.unwrap_err();
    assert!(err.to_string().contains("Failed to open database connection"));
}

#[tokio::test]
async fn test_panicking_attempt_fails_and_next_call_retries() {
    let connector = StubConnector::succeeding().panicking_on(1);
    let calls = connector.calls();
    let cache = ConnectionCache::new(connector, stub_uri());

    let (first, second) = tokio::join!(cache.get_connection(), cache.get_connection());
    for result in [first, second] {
        match result {
            Err(ConnectError::Panicked { message, .. }) => {
                assert_eq!(message, "driver blew up on attempt 1");
            }
            other => panic!("expected a panicked attempt, got {other:?}"),
        }
    }
    assert!(!cache.is_connecting());
    assert!(cache.cached().is_none());

    let connection = cache.get_connection().await.unwrap();
    assert_eq!(connection.attempt, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.attempts(), 2);
}
