//! Render response types
//!
//! This module defines the response envelope returned by the render server
//! and the closed set of request states.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::RequestId;

/// Outcome of a render request.
///
/// Serialized as its integer discriminant:
/// `SUCCESS=0`, `UNKNOWN_ROUTE=1`, `SYSTEM_ERROR=2`, `RENDER_ERROR=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RequestState {
    /// Handler returned data with no error
    Success = 0,
    /// No route with the requested name is registered
    UnknownRoute = 1,
    /// Invoking the handler failed outside the route's own error reporting
    SystemError = 2,
    /// The handler ran and reported an error
    RenderError = 3,
}

impl RequestState {
    pub fn is_success(self) -> bool {
        self == RequestState::Success
    }

    /// Upper-case name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            RequestState::Success => "SUCCESS",
            RequestState::UnknownRoute => "UNKNOWN_ROUTE",
            RequestState::SystemError => "SYSTEM_ERROR",
            RequestState::RenderError => "RENDER_ERROR",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<RequestState> for u8 {
    fn from(state: RequestState) -> u8 {
        state as u8
    }
}

impl TryFrom<u8> for RequestState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RequestState::Success),
            1 => Ok(RequestState::UnknownRoute),
            2 => Ok(RequestState::SystemError),
            3 => Ok(RequestState::RenderError),
            other => Err(format!("unknown request state {}", other)),
        }
    }
}

/// A render response returned from the server to the client.
///
/// # Fields
///
/// - `request_id`: id of the request this answers
/// - `state`: outcome of the request
/// - `data`: encoded image bytes, empty unless `state` is `Success`
/// - `length`: byte count of `data`
/// - `error`: error description for failed requests
/// - `duration`: server-measured handler time in seconds
///
/// For an unknown route only `request_id` and `state` are populated.
///
/// # Example
///
/// ```
/// use cardrender_common::protocol::{RenderResponse, RequestId, RequestState};
///
/// let response = RenderResponse::unknown_route(RequestId::from("abc"));
/// assert_eq!(response.state, RequestState::UnknownRoute);
/// assert!(response.length.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderResponse {
    /// Request identifier this response corresponds to
    pub request_id: RequestId,
    /// Outcome of the request
    pub state: RequestState,
    /// Image bytes, base64 on the wire
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
    /// Byte count of `data`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    /// Error description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Handler wall-clock time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl RenderResponse {
    /// Response for a route missing from the registry.
    pub fn unknown_route(request_id: RequestId) -> Self {
        RenderResponse {
            request_id,
            state: RequestState::UnknownRoute,
            data: Vec::new(),
            length: None,
            error: None,
            duration: None,
        }
    }

    /// Response for a handler that ran to completion.
    ///
    /// The state is `Success` when `error` is `None` and `RenderError`
    /// otherwise.
    pub fn completed(
        request_id: RequestId,
        data: Vec<u8>,
        error: Option<String>,
        duration: f64,
    ) -> Self {
        let state = if error.is_none() {
            RequestState::Success
        } else {
            RequestState::RenderError
        };
        RenderResponse {
            request_id,
            state,
            length: Some(data.len()),
            data,
            error,
            duration: Some(duration),
        }
    }

    /// Response for a failure while invoking the handler.
    pub fn system_error(request_id: RequestId, error: impl Into<String>, duration: f64) -> Self {
        RenderResponse {
            request_id,
            state: RequestState::SystemError,
            data: Vec::new(),
            length: Some(0),
            error: Some(error.into()),
            duration: Some(duration),
        }
    }
}

/// Serde adapter storing byte buffers as standard base64 strings.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
