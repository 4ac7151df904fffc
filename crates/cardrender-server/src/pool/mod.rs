//! Render worker pools
//!
//! Route handlers never touch a pool directly. They receive a [`Runner`]
//! bound to their request and call `runner.run(job, args, kwargs)`; the
//! runner packs the request context with the job and hands it to an
//! [`Executor`].
//!
//! # Components
//!
//! - **[`JobTable`]**: Named synchronous jobs plus an optional init hook
//! - **[`ProcessPool`]**: Jobs run in child processes over stdin/stdout
//! - **[`LocalPool`]**: Jobs run on blocking threads in this process
//! - **[`worker`]**: Entry point of a worker process
//!
//! # Queueing
//!
//! Once every worker is busy, further jobs wait. With `max_pending` set,
//! at most `workers + max_pending` jobs are admitted at once and the rest
//! fail immediately with [`PoolError::QueueFull`].

pub mod jobs;
pub mod local;
pub mod process;
pub mod protocol;
pub mod worker;

pub use jobs::{Job, JobTable};
pub use local::LocalPool;
pub use process::{ProcessPool, WorkerCommand};
pub use protocol::{JobOutcome, WorkerJob};

use async_trait::async_trait;
use cardrender_common::protocol::{RenderArgs, RenderKwargs, RequestContext};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::PoolError;

/// Runs jobs somewhere other than the server's async tasks.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs one job to completion.
    ///
    /// A job that fails is a successful call returning a failed
    /// [`JobOutcome`]. `Err` means the pool could not run the job.
    async fn execute(&self, job: WorkerJob) -> Result<JobOutcome, PoolError>;

    /// Number of workers.
    fn size(&self) -> usize;
}

/// Runs jobs on behalf of one request.
///
/// Carries the request context captured when the request was dispatched,
/// so every job it runs logs under the same request id.
#[derive(Clone)]
pub struct Runner {
    executor: Arc<dyn Executor>,
    context: RequestContext,
}

impl Runner {
    pub fn new(executor: Arc<dyn Executor>, context: RequestContext) -> Self {
        Self { executor, context }
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Runs the job named `job` in a worker and waits for its outcome.
    pub async fn run(
        &self,
        job: &str,
        args: RenderArgs,
        kwargs: RenderKwargs,
    ) -> Result<JobOutcome, PoolError> {
        tracing::debug!(job, "Dispatching job");
        self.executor
            .execute(WorkerJob {
                context: self.context.clone(),
                job: job.to_string(),
                args,
                kwargs,
            })
            .await
    }
}

/// Bounds the number of jobs admitted to a pool.
#[derive(Debug, Clone)]
pub(crate) struct Admission {
    slots: Option<Arc<Semaphore>>,
}

impl Admission {
    /// Admits up to `workers + max_pending` jobs, or any number when
    /// `max_pending` is `None`.
    pub(crate) fn new(workers: usize, max_pending: Option<usize>) -> Self {
        Self {
            slots: max_pending.map(|pending| Arc::new(Semaphore::new(workers.saturating_add(pending)))),
        }
    }

    /// Takes an admission slot without waiting.
    pub(crate) fn admit(&self) -> Result<Option<OwnedSemaphorePermit>, PoolError> {
        match &self.slots {
            None => Ok(None),
            Some(slots) => slots.clone().try_acquire_owned().map(Some).map_err(|e| match e {
                tokio::sync::TryAcquireError::NoPermits => PoolError::QueueFull,
                tokio::sync::TryAcquireError::Closed => PoolError::Closed,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardrender_common::protocol::RequestId;
    use std::sync::Mutex;

    /// Records every job it receives
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<WorkerJob>>,
    }

    #[async_trait]
    impl Executor for Recorder {
        async fn execute(&self, job: WorkerJob) -> Result<JobOutcome, PoolError> {
            let data = job.job.clone().into_bytes();
            self.seen.lock().unwrap().push(job);
            Ok(JobOutcome::success(data))
        }

        fn size(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn test_runner_attaches_context() {
        let recorder = Arc::new(Recorder::default());
        let context = RequestContext::new(RequestId::from("r1")).with_label("ROUTE weekly");
        let runner = Runner::new(recorder.clone(), context.clone());

        let outcome = runner.run("draw", vec![], Default::default()).await.unwrap();

        assert_eq!(outcome.data, b"draw");
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].context, context);
        assert_eq!(seen[0].job, "draw");
    }

    #[test]
    fn test_unbounded_admission() {
        let admission = Admission::new(2, None);
        let permits: Vec<_> = (0..100).map(|_| admission.admit().unwrap()).collect();
        assert!(permits.iter().all(Option::is_none));
    }

    #[test]
    fn test_bounded_admission() {
        let admission = Admission::new(2, Some(1));
        let first = admission.admit().unwrap();
        let _second = admission.admit().unwrap();
        let _third = admission.admit().unwrap();
        assert!(matches!(admission.admit(), Err(PoolError::QueueFull)));

        drop(first);
        assert!(admission.admit().is_ok());
    }
}
