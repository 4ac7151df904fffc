//! Messages exchanged between the server and its workers.
//!
//! Each message is one JSON document in one length-prefixed frame, the same
//! framing the server socket uses.

use cardrender_common::protocol::responses::base64_bytes;
use cardrender_common::protocol::{RenderArgs, RenderKwargs, RequestContext};
use serde::{Deserialize, Serialize};

/// A job dispatched to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerJob {
    /// Context re-installed in the worker before the job runs
    pub context: RequestContext,
    /// Name of the job in the worker's job table
    pub job: String,
    #[serde(default)]
    pub args: RenderArgs,
    #[serde(default)]
    pub kwargs: RenderKwargs,
}

/// Result of running a job: image bytes, or an error description.
///
/// `data` is empty whenever `error` is set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobOutcome {
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn success(data: Vec<u8>) -> Self {
        Self { data, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            data: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
