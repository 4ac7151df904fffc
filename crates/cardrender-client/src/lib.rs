pub mod backoff;
pub mod client;
pub mod connector;
mod guard;

pub use backoff::{ConnectionAttemptState, RetryPolicy};
pub use client::{ClientConfig, RenderClient};
pub use connector::Connector;
