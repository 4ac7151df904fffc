use thiserror::Error;

/// Errors raised by a worker pool while dispatching a job.
///
/// These are failures of the pool itself. A job that runs and fails is
/// not a `PoolError`; it comes back as a [`JobOutcome`](crate::JobOutcome)
/// carrying an error string.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("render queue full")]
    QueueFull,

    #[error("worker {worker} lost: {reason}")]
    WorkerLost { worker: String, reason: String },

    #[error("failed to start worker: {0}")]
    Spawn(String),

    #[error("worker pool is closed")]
    Closed,

    #[error("worker protocol error: {0}")]
    Protocol(String),
}

/// Errors raised by a route while handling a request.
///
/// Every `RouteError` is answered with a `SYSTEM_ERROR` response.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RouteError>;
