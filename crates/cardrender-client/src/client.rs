use cardrender_common::config::RenderConfig;
use cardrender_common::protocol::error::{RenderError, Result};
use cardrender_common::protocol::{RenderArgs, RenderKwargs, RenderRequest, RenderResponse, RequestId};
use cardrender_common::transport::UnixTransport;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};
use tracing::Instrument;

use crate::backoff::{instant_after, RetryPolicy};
use crate::connector::Connector;
use crate::guard::{self, InFlight, SlotGuard};

/// Render client configuration.
///
/// # Default Configuration
///
/// - `socket_path`: `gui.sock`
/// - `max_concurrent`: 5
/// - `connection_timeout`: 30 seconds
/// - `request_expiry`: 30 seconds
/// - `retry`: see [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server socket
    pub socket_path: PathBuf,
    /// Maximum requests in flight at once
    pub max_concurrent: usize,
    /// Bound on one connect attempt
    pub connection_timeout: Duration,
    /// Deadline used when a request does not pass its own
    pub request_expiry: Duration,
    /// Reconnect backoff
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from(&RenderConfig::default())
    }
}

impl From<&RenderConfig> for ClientConfig {
    fn from(config: &RenderConfig) -> Self {
        Self {
            socket_path: config.socket_path.clone(),
            max_concurrent: config.client.max_concurrent,
            connection_timeout: config.client.connection_timeout(),
            request_expiry: config.client.request_expiry(),
            retry: RetryPolicy::from(&config.client.retry),
        }
    }
}

impl ClientConfig {
    /// Default configuration for the server at `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Self::default()
        }
    }
}

/// Client for the render server.
///
/// Each request opens its own connection, bounded by a shared concurrency
/// limit and an end-to-end deadline. Connection failures are retried
/// transparently until the deadline; render failures are returned at once.
///
/// Cloning is cheap and clones share the concurrency limit and the
/// reconnect state.
///
/// # Example
///
/// ```no_run
/// use cardrender_client::{ClientConfig, RenderClient};
/// use serde_json::json;
/// use std::time::Duration;
///
/// # async fn run() -> cardrender_common::protocol::Result<()> {
/// let client = RenderClient::new(ClientConfig::new("gui.sock"));
/// let png = client
///     .request("weekly", vec![json!({"guild": 42})], Default::default(), Some(Duration::from_secs(10)))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RenderClient {
    connector: Arc<Connector>,
    slots: Arc<Semaphore>,
    max_concurrent: usize,
    request_expiry: Duration,
    in_flight: InFlight,
}

impl RenderClient {
    pub fn new(config: ClientConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            connector: Arc::new(Connector::new(
                config.socket_path,
                config.connection_timeout,
                config.retry,
            )),
            slots: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            request_expiry: config.request_expiry,
            in_flight: InFlight::default(),
        }
    }

    /// Sends a render request and returns the image bytes.
    ///
    /// `timeout` defaults to the configured request expiry. It bounds the
    /// whole call: waiting for a slot, connecting, and the exchange.
    ///
    /// # Errors
    ///
    /// - `ConnectionTimedOut` when the deadline passes first
    /// - `ConnectionFailure` when the connection breaks mid-exchange
    /// - `RenderingFailure` for any non-success state or a malformed reply
    /// - `EmptyResponse` when the server closed without replying
    pub async fn request(
        &self,
        route: &str,
        args: RenderArgs,
        kwargs: RenderKwargs,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>> {
        let request_id = RequestId::generate();
        let deadline = instant_after(Instant::now(), timeout.unwrap_or(self.request_expiry));
        let request = RenderRequest {
            id: Some(request_id.clone()),
            route: route.to_string(),
            args,
            kwargs,
        };

        let span = tracing::info_span!("render", rqid = %request_id, route = %route);
        self.send(request, request_id, deadline).instrument(span).await
    }

    async fn send(&self, request: RenderRequest, request_id: RequestId, deadline: Instant) -> Result<Vec<u8>> {
        let timed_out = || RenderError::ConnectionTimedOut(request_id.clone());

        tracing::debug!(available = self.slots.available_permits(), "Waiting for a render slot");
        let permit = timeout_at(deadline, self.slots.clone().acquire_owned())
            .await
            .map_err(|_| timed_out())?
            .map_err(|_| RenderError::ConnectionFailure("render client is closed".to_string()))?;
        let _slot = SlotGuard::new(permit, self.in_flight.clone(), request_id.clone());

        let mut stream = self.connector.connect(deadline, &request_id).await?;

        let started = Instant::now();
        let response = timeout_at(deadline, UnixTransport::send_request(&mut stream, &request))
            .await
            .map_err(|_| timed_out())?
            .map_err(client_error)?;
        drop(stream);

        let data = check_response(&request_id, response)?;
        tracing::debug!(
            bytes = data.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Render request completed"
        );
        Ok(data)
    }

    /// Ids of the requests currently holding a slot.
    pub fn pending_requests(&self) -> Vec<RequestId> {
        guard::lock(&self.in_flight).iter().cloned().collect()
    }

    /// Connection failures since the client was created.
    pub fn total_failures(&self) -> u64 {
        self.connector.total_failures()
    }

    /// Connection failures since the last successful connect.
    pub fn consecutive_failures(&self) -> u32 {
        self.connector.consecutive_failures()
    }

    /// Free concurrency slots.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

/// Folds transport-level errors into the client-visible kinds.
fn client_error(e: RenderError) -> RenderError {
    match e {
        RenderError::Json(e) => RenderError::RenderingFailure {
            message: format!("malformed response: {}", e),
            response: None,
        },
        RenderError::Io(e) => RenderError::ConnectionFailure(e.to_string()),
        RenderError::InvalidMessage(msg) => RenderError::ConnectionFailure(msg),
        other => other,
    }
}

/// Checks that `response` answers `request_id` and succeeded.
fn check_response(request_id: &RequestId, response: RenderResponse) -> Result<Vec<u8>> {
    if response.request_id.is_empty() {
        return Err(RenderError::rendering_failure(
            "malformed response: missing request id",
            response,
        ));
    }
    if &response.request_id != request_id {
        let message = format!(
            "malformed response: request id {} does not match {}",
            response.request_id, request_id
        );
        return Err(RenderError::rendering_failure(message, response));
    }
    if !response.state.is_success() {
        let message = match &response.error {
            Some(error) => format!("server returned {}: {}", response.state, error),
            None => format!("server returned {}", response.state),
        };
        tracing::warn!(state = %response.state, "Render request failed");
        return Err(RenderError::rendering_failure(message, response));
    }
    Ok(response.data)
}
