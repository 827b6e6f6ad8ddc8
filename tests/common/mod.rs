//! Shared test utilities for conncache integration tests
#![allow(dead_code)]

use conncache::config::ConnectionUri;
use conncache::connector::{Backend, Connector};
use conncache::ConnectError;
use futures::future::{BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Connection handed out by [`StubConnector`]
#[derive(Debug)]
pub struct StubConnection {
    /// Which connect call produced this handle (1-based)
    pub attempt: u32,
}

/// Connector that counts its calls and fails on a script
pub struct StubConnector {
    calls: Arc<AtomicU32>,
    failures: Arc<Mutex<VecDeque<bool>>>,
    gate: Option<Arc<Semaphore>>,
    panic_on: Option<u32>,
}

impl StubConnector {
    /// Every attempt succeeds
    pub fn succeeding() -> Self {
        Self::failing_times(0)
    }

    /// The first `n` attempts fail, later ones succeed
    pub fn failing_times(n: usize) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            failures: Arc::new(Mutex::new(std::iter::repeat(true).take(n).collect())),
            gate: None,
            panic_on: None,
        }
    }

    /// Make every attempt wait for one permit on the returned semaphore
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    /// Panic inside the future of connect call number `attempt`
    pub fn panicking_on(mut self, attempt: u32) -> Self {
        self.panic_on = Some(attempt);
        self
    }

    /// Counter of connect calls, readable after the connector moved into a cache
    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

impl Connector for StubConnector {
    type Connection = StubConnection;

    fn connect(&self, _uri: &ConnectionUri) -> BoxFuture<'static, Result<StubConnection, ConnectError>> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let fail = self.failures.lock().unwrap().pop_front().unwrap_or(false);
        let gate = self.gate.clone();
        let panic = self.panic_on == Some(attempt);

        async move {
            if let Some(gate) = gate {
                gate.acquire().await.expect("gate closed").forget();
            }
            if panic {
                panic!("driver blew up on attempt {attempt}");
            }
            if fail {
                Err(stub_error(attempt))
            } else {
                Ok(StubConnection { attempt })
            }
        }
        .boxed()
    }
}

/// Error the stub returns for a failed `attempt`
pub fn stub_error(attempt: u32) -> ConnectError {
    ConnectError::Unreachable {
        backend: Backend::Document,
        target: "mongodb://stub:27017/app".to_string(),
        message: format!("attempt {attempt} refused"),
    }
}

/// URI the stub caches are built with
pub fn stub_uri() -> ConnectionUri {
    ConnectionUri::parse("mongodb://stub:27017/app").unwrap()
}
