use cardrender_common::protocol::{RenderArgs, RenderKwargs};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::protocol::{JobOutcome, WorkerJob};
use crate::panics;

/// A synchronous render job run inside a worker.
pub type Job = Arc<dyn Fn(&RenderArgs, &RenderKwargs) -> anyhow::Result<Vec<u8>> + Send + Sync>;

type InitHook = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Named jobs a worker can run.
///
/// Only job names cross the process boundary, so the server and its worker
/// processes must build the same table. A host program does that by
/// building it in one function used in both modes.
///
/// # Example
///
/// ```
/// use cardrender_server::JobTable;
///
/// let jobs = JobTable::new()
///     .register("blank", |_args, _kwargs| Ok(vec![0u8; 16]))
///     .with_init(|| Ok(()));
/// assert!(jobs.contains("blank"));
/// ```
#[derive(Clone, Default)]
pub struct JobTable {
    jobs: HashMap<String, Job>,
    init: Option<InitHook>,
}

impl fmt::Debug for JobTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobTable")
            .field("jobs", &self.names())
            .field("init", &self.init.is_some())
            .finish()
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a job. A later registration under the same name replaces it.
    pub fn register<F>(mut self, name: impl Into<String>, job: F) -> Self
    where
        F: Fn(&RenderArgs, &RenderKwargs) -> anyhow::Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.jobs.insert(name.into(), Arc::new(job));
        self
    }

    /// Sets the hook run once when a worker starts, before any job.
    pub fn with_init<F>(mut self, init: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(init));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    /// Registered job names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.jobs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs the init hook, if any.
    pub fn init(&self) -> anyhow::Result<()> {
        match &self.init {
            Some(init) => init(),
            None => Ok(()),
        }
    }

    /// Runs `job` behind the failure boundary.
    ///
    /// The request context is entered before the job runs, with `worker`
    /// appended as a scope label. Unknown jobs, job errors and panics are
    /// logged and returned as a failed outcome; nothing escapes.
    pub fn run(&self, job: &WorkerJob, worker: &str) -> JobOutcome {
        let context = job.context.clone().with_label(worker);
        let span = context.span();
        let _enter = span.enter();

        let Some(f) = self.jobs.get(&job.job) else {
            tracing::error!(job = %job.job, "Unknown job");
            return JobOutcome::failed(format!("unknown job {:?}", job.job));
        };

        tracing::debug!(job = %job.job, "Running job");
        panics::capture_backtraces();
        match panic::catch_unwind(AssertUnwindSafe(|| f(&job.args, &job.kwargs))) {
            Ok(Ok(data)) => JobOutcome::success(data),
            Ok(Err(e)) => {
                tracing::error!(job = %job.job, error = ?e, "Job failed");
                JobOutcome::failed(format!("{:#}", e))
            }
            Err(payload) => {
                let message = panics::message(payload.as_ref());
                tracing::error!(
                    job = %job.job,
                    panic = %message,
                    backtrace = %panics::backtrace_text(),
                    "Job panicked"
                );
                JobOutcome::failed(format!("job panicked: {}", message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardrender_common::protocol::{RequestContext, RequestId};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn job(name: &str, args: RenderArgs) -> WorkerJob {
        WorkerJob {
            context: RequestContext::new(RequestId::from("j1")),
            job: name.to_string(),
            args,
            kwargs: Default::default(),
        }
    }

    fn table() -> JobTable {
        JobTable::new()
            .register("len", |args, _| Ok(vec![args.len() as u8]))
            .register("fail", |_, _| Err(anyhow::anyhow!("bad skin")))
            .register("panic", |_, _| panic!("exploded"))
    }

    #[test]
    fn test_successful_job() {
        let outcome = table().run(&job("len", vec![json!(1), json!(2)]), "test");
        assert_eq!(outcome, JobOutcome::success(vec![2]));
    }

    #[test]
    fn test_job_error_becomes_failed_outcome() {
        let outcome = table().run(&job("fail", vec![]), "test");
        assert!(outcome.data.is_empty());
        assert_eq!(outcome.error.as_deref(), Some("bad skin"));
    }

    #[test]
    fn test_panic_becomes_failed_outcome() {
        let jobs = table();
        let outcome = jobs.run(&job("panic", vec![]), "test");
        assert!(outcome.data.is_empty());
        assert!(outcome.error.unwrap().contains("exploded"));

        // The table is still usable afterwards
        let outcome = jobs.run(&job("len", vec![]), "test");
        assert_eq!(outcome, JobOutcome::success(vec![0]));
    }

    #[test]
    fn test_panic_backtrace_is_consumed_by_run() {
        let jobs = table();
        let outcome = jobs.run(&job("panic", vec![]), "test");

        assert!(outcome.error.is_some());
        assert!(panics::take_backtrace().is_none());
    }

    #[test]
    fn test_unknown_job() {
        let outcome = table().run(&job("missing", vec![]), "test");
        assert!(outcome.error.unwrap().contains("unknown job"));
    }

    #[test]
    fn test_init_hook_runs_on_demand() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let jobs = table().with_init(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        jobs.init().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(JobTable::new().init().is_ok());
    }

    #[test]
    fn test_names_are_sorted() {
        assert_eq!(table().names(), vec!["fail", "len", "panic"]);
    }
}
