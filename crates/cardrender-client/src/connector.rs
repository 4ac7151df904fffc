use cardrender_common::protocol::error::{RenderError, Result};
use cardrender_common::protocol::RequestId;
use cardrender_common::transport::UnixTransport;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, timeout, timeout_at, Instant};

use crate::backoff::{ConnectionAttemptState, RetryPolicy};

/// Opens connections to the render server with single-flight retry.
///
/// At most one task at a time tries to establish a connection. The others
/// queue on the lock, so a failing backend sees one attempt per backoff
/// period no matter how many requests are waiting. Every wait is bounded by
/// the caller's deadline.
pub struct Connector {
    socket_path: PathBuf,
    connection_timeout: Duration,
    policy: RetryPolicy,
    state: Mutex<ConnectionAttemptState>,
    // Mirrors of the locked counters, readable without waiting on the lock.
    total_failures: AtomicU64,
    consecutive_failures: AtomicU32,
}

impl Connector {
    pub fn new(socket_path: impl Into<PathBuf>, connection_timeout: Duration, policy: RetryPolicy) -> Self {
        Self {
            socket_path: socket_path.into(),
            connection_timeout,
            policy,
            state: Mutex::new(ConnectionAttemptState::default()),
            total_failures: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Failed attempts since creation.
    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Failed attempts since the last successful connect.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Connects, retrying with backoff until `deadline`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionTimedOut` once the deadline passes. Individual
    /// attempt failures are never returned; they only push the next attempt
    /// further out.
    pub async fn connect(&self, deadline: Instant, request_id: &RequestId) -> Result<UnixStream> {
        let timed_out = || RenderError::ConnectionTimedOut(request_id.clone());

        let mut state = timeout_at(deadline, self.state.lock())
            .await
            .map_err(|_| timed_out())?;

        loop {
            if let Some(retry_next) = state.wait_at(Instant::now()) {
                tracing::debug!(
                    rqid = %request_id,
                    wait_ms = retry_next.saturating_duration_since(Instant::now()).as_millis() as u64,
                    "Waiting before reconnecting"
                );
                sleep_until(retry_next.min(deadline)).await;
            }

            let now = Instant::now();
            let remaining = deadline.saturating_duration_since(now);
            if remaining.is_zero() {
                return Err(timed_out());
            }

            let (budget, cut_short) = attempt_budget(self.connection_timeout, remaining);
            let attempt = timeout(budget, UnixTransport::connect(&self.socket_path)).await;

            let error = match attempt {
                Ok(Ok(stream)) => {
                    let previous = state.record_success();
                    self.consecutive_failures.store(0, Ordering::Relaxed);
                    if previous > 0 {
                        tracing::info!(
                            rqid = %request_id,
                            failures = previous,
                            "Reconnected to render server"
                        );
                    }
                    return Ok(stream);
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) if cut_short => {
                    // The backend never got its full connection_timeout.
                    tracing::debug!(rqid = %request_id, "Deadline reached during connect attempt");
                    return Err(timed_out());
                }
                Err(_) => "connect attempt timed out".to_string(),
            };

            let backoff = state.record_failure(Instant::now(), &self.policy);
            self.total_failures.store(state.total_failures, Ordering::Relaxed);
            self.consecutive_failures.store(state.failures, Ordering::Relaxed);
            tracing::warn!(
                rqid = %request_id,
                failures = state.failures,
                retry_in_ms = backoff.as_millis() as u64,
                error = %error,
                "Render server connection failed"
            );
        }
    }
}

/// Time allowed for one connect attempt, and whether the caller's deadline
/// rather than `connection_timeout` is what limits it.
fn attempt_budget(connection_timeout: Duration, remaining: Duration) -> (Duration, bool) {
    if remaining < connection_timeout {
        (remaining, true)
    } else {
        (connection_timeout, false)
    }
}
