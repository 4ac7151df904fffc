use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::{Admission, Executor, JobOutcome, JobTable, WorkerJob};
use crate::error::PoolError;

/// Runs jobs on blocking threads inside the server process.
///
/// Same contract and failure boundary as [`ProcessPool`](super::ProcessPool)
/// without the process isolation: a job that aborts the process takes the
/// server with it.
pub struct LocalPool {
    jobs: Arc<JobTable>,
    workers: Arc<Semaphore>,
    size: usize,
    admission: Admission,
}

impl LocalPool {
    /// Creates a pool running at most `workers` jobs at once.
    ///
    /// The job table's init hook runs once, here.
    pub fn start(jobs: JobTable, workers: usize, max_pending: Option<usize>) -> Result<Self, PoolError> {
        let size = workers.max(1);
        jobs.init()
            .map_err(|e| PoolError::Spawn(format!("worker initialization failed: {:#}", e)))?;

        tracing::info!(workers = size, "Started local worker pool");
        Ok(Self {
            jobs: Arc::new(jobs),
            workers: Arc::new(Semaphore::new(size)),
            size,
            admission: Admission::new(size, max_pending),
        })
    }
}

#[async_trait]
impl Executor for LocalPool {
    async fn execute(&self, job: WorkerJob) -> Result<JobOutcome, PoolError> {
        let _admitted = self.admission.admit()?;
        let _worker = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        let jobs = self.jobs.clone();
        tokio::task::spawn_blocking(move || jobs.run(&job, "local"))
            .await
            .map_err(|e| PoolError::WorkerLost {
                worker: "local".to_string(),
                reason: e.to_string(),
            })
    }

    fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardrender_common::protocol::{RequestContext, RequestId};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn job(name: &str) -> WorkerJob {
        WorkerJob {
            context: RequestContext::new(RequestId::generate()),
            job: name.to_string(),
            args: vec![json!(50)],
            kwargs: Default::default(),
        }
    }

    fn sleepy_table(active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> JobTable {
        JobTable::new().register("nap", move |args, _| {
            let ms = args.first().and_then(|v| v.as_u64()).unwrap_or(0);
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(ms));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(b"rested".to_vec())
        })
    }

    #[tokio::test]
    async fn test_runs_job() {
        let pool = LocalPool::start(JobTable::new().register("hi", |_, _| Ok(b"hi".to_vec())), 2, None).unwrap();
        let outcome = pool.execute(job("hi")).await.unwrap();
        assert_eq!(outcome, JobOutcome::success(b"hi".to_vec()));
        assert_eq!(pool.size(), 2);
    }

    #[tokio::test]
    async fn test_parallelism_is_bounded_by_workers() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(LocalPool::start(sleepy_table(active, peak.clone()), 2, None).unwrap());

        let start = Instant::now();
        let runs = (0..6).map(|_| {
            let pool = pool.clone();
            async move { pool.execute(job("nap")).await }
        });
        let results = futures::future::join_all(runs).await;

        assert!(results.iter().all(|r| r.as_ref().map(|o| o.is_success()).unwrap_or(false)));
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_queue_full_when_admission_bounded() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(LocalPool::start(sleepy_table(active, peak), 1, Some(1)).unwrap());

        let runs = (0..3).map(|_| {
            let pool = pool.clone();
            async move { pool.execute(job("nap")).await }
        });
        let results = futures::future::join_all(runs).await;

        let full = results
            .iter()
            .filter(|r| matches!(r, Err(PoolError::QueueFull)))
            .count();
        assert_eq!(full, 1);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    }

    #[tokio::test]
    async fn test_failed_init_is_spawn_error() {
        let jobs = JobTable::new().with_init(|| Err(anyhow::anyhow!("fonts missing")));
        let result = LocalPool::start(jobs, 1, None);
        assert!(matches!(result, Err(PoolError::Spawn(msg)) if msg.contains("fonts missing")));
    }
}
