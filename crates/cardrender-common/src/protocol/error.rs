use thiserror::Error;

use super::{RenderResponse, RequestId};

/// Errors raised by the render pipeline.
///
/// `ConnectionTimedOut`, `ConnectionFailure`, `RenderingFailure` and
/// `EmptyResponse` are the kinds a client caller sees. The remaining
/// variants are transport-level and are folded into `ConnectionFailure`
/// before they leave the client.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("render request {0} timed out")]
    ConnectionTimedOut(RequestId),

    #[error("could not reach the render server: {0}")]
    ConnectionFailure(String),

    #[error("rendering failed: {message}")]
    RenderingFailure {
        message: String,
        /// The server's reply, when one was received
        response: Option<Box<RenderResponse>>,
    },

    #[error("render server sent an empty response")]
    EmptyResponse,

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Builds a `RenderingFailure` that carries the server's reply.
    pub fn rendering_failure(message: impl Into<String>, response: RenderResponse) -> Self {
        RenderError::RenderingFailure {
            message: message.into(),
            response: Some(Box::new(response)),
        }
    }

    /// True for connection timeouts and other connection failures.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            RenderError::ConnectionTimedOut(_) | RenderError::ConnectionFailure(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RenderError::ConnectionTimedOut(_))
    }

    /// The server's reply attached to a `RenderingFailure`, if any.
    pub fn response(&self) -> Option<&RenderResponse> {
        match self {
            RenderError::RenderingFailure { response, .. } => response.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;
