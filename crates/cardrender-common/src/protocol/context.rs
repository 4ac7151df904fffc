//! Request context carried across the worker pool boundary.
//!
//! Worker processes share no memory with the server, so the pieces of
//! per-request state needed for correlated logging travel explicitly with
//! every job and are re-installed inside the worker before the job runs.

use serde::{Deserialize, Serialize};

use super::RequestId;

/// Request id plus the nested logging-scope labels active at dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: RequestId,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl RequestContext {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            labels: Vec::new(),
        }
    }

    /// Appends a logging-scope label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Labels joined for display, e.g. `ROUTE ping / worker-2`.
    pub fn scope(&self) -> String {
        self.labels.join(" / ")
    }

    /// A span carrying this context.
    ///
    /// Entering the span makes every event logged inside it carry the
    /// request id and scope, in whichever process it runs.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("request", rqid = %self.request_id, scope = %self.scope())
    }
}
