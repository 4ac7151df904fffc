//! Render request types
//!
//! A request names a route and carries opaque positional and keyword
//! arguments that are forwarded verbatim to the route handler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Positional arguments forwarded to a route.
pub type RenderArgs = Vec<serde_json::Value>;

/// Keyword arguments forwarded to a route.
pub type RenderKwargs = serde_json::Map<String, serde_json::Value>;

/// Number of characters kept from a v4 uuid when generating a request id.
const REQUEST_ID_LEN: usize = 10;

/// Short, human-loggable request identifier.
///
/// Generated by the client for every request and echoed back by the server,
/// so one id correlates client, server and worker log lines. Ids are
/// truncated v4 uuids: unique in practice, not guaranteed globally.
///
/// # Example
///
/// ```
/// use cardrender_common::protocol::RequestId;
///
/// let id = RequestId::generate();
/// assert_eq!(id.as_str().len(), 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generates a fresh random request id.
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        RequestId(uuid[..REQUEST_ID_LEN].to_string())
    }

    /// Wraps an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        RequestId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the empty id, which never identifies a request.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId(id.to_string())
    }
}

/// A render request sent from the client to the server.
///
/// On the wire this is `{id, route, args, kwargs}`. The `id` is optional so
/// that peers which only send the `(route, args, kwargs)` triple are still
/// accepted; the server assigns a fresh id in that case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderRequest {
    /// Request identifier chosen by the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Route selecting the handler
    pub route: String,
    /// Positional arguments
    #[serde(default)]
    pub args: RenderArgs,
    /// Keyword arguments
    #[serde(default)]
    pub kwargs: RenderKwargs,
}

impl RenderRequest {
    /// Creates a request for `route` with a freshly generated id.
    pub fn new(route: impl Into<String>, args: RenderArgs, kwargs: RenderKwargs) -> Self {
        RenderRequest {
            id: Some(RequestId::generate()),
            route: route.into(),
            args,
            kwargs,
        }
    }

    /// Replaces the request id.
    pub fn with_id(mut self, id: RequestId) -> Self {
        self.id = Some(id);
        self
    }
}
