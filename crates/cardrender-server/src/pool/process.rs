use async_trait::async_trait;
use cardrender_common::transport::{read_frame_async, write_frame_async, JsonCodec};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Semaphore;

use super::{Admission, Executor, JobOutcome, WorkerJob};
use crate::error::PoolError;

/// How to start a worker process.
///
/// Each worker is started as `<program> <args…> --index <n>`. The program
/// must answer jobs on stdin/stdout, as
/// [`worker::serve_stdio`](super::worker::serve_stdio) does.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// The running executable with the `worker` subcommand.
    pub fn current_exe() -> Result<Self, PoolError> {
        let program = std::env::current_exe()
            .map_err(|e| PoolError::Spawn(format!("cannot locate current executable: {}", e)))?;
        Ok(Self::new(program).arg("worker"))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn spawn(&self, index: usize) -> Result<WorkerProcess, PoolError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--index")
            .arg(index.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PoolError::Spawn(format!("{}: {}", self.program.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PoolError::Spawn("worker stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PoolError::Spawn("worker stdout not captured".to_string()))?;

        tracing::debug!(worker = index, pid = ?child.id(), "Spawned worker");
        Ok(WorkerProcess {
            index,
            _child: child,
            stdin,
            stdout,
        })
    }
}

/// One worker child process and its pipes.
struct WorkerProcess {
    index: usize,
    _child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl WorkerProcess {
    fn label(&self) -> String {
        format!("worker-{}", self.index)
    }

    /// Sends one job and waits for its outcome.
    async fn exchange(&mut self, job: &WorkerJob) -> Result<JobOutcome, PoolError> {
        let encoded = JsonCodec::encode(job).map_err(|e| PoolError::Protocol(e.to_string()))?;

        write_frame_async(&mut self.stdin, &encoded)
            .await
            .map_err(|e| self.lost(format!("writing job: {}", e)))?;

        let reply = read_frame_async(&mut self.stdout)
            .await
            .map_err(|e| self.lost(format!("reading outcome: {}", e)))?
            .ok_or_else(|| self.lost("worker exited".to_string()))?;

        JsonCodec::decode(&reply).map_err(|e| PoolError::Protocol(e.to_string()))
    }

    fn lost(&self, reason: String) -> PoolError {
        PoolError::WorkerLost {
            worker: self.label(),
            reason,
        }
    }
}

/// A fixed-size pool of worker processes.
///
/// Workers are spawned up front so their init hooks run at startup. A job
/// goes to an idle worker; once all are busy, further jobs wait. A worker
/// that dies or breaks the protocol is discarded and a fresh one is spawned
/// on a later dispatch. Children are killed when the pool is dropped.
pub struct ProcessPool {
    command: WorkerCommand,
    idle: Mutex<Vec<WorkerProcess>>,
    available: Arc<Semaphore>,
    size: usize,
    admission: Admission,
    next_index: AtomicUsize,
}

impl ProcessPool {
    /// Spawns `workers` worker processes.
    pub fn start(command: WorkerCommand, workers: usize, max_pending: Option<usize>) -> Result<Self, PoolError> {
        let size = workers.max(1);
        let mut idle = Vec::with_capacity(size);
        for index in 0..size {
            idle.push(command.spawn(index)?);
        }

        tracing::info!(workers = size, program = %command.program.display(), "Started worker pool");
        Ok(Self {
            command,
            idle: Mutex::new(idle),
            available: Arc::new(Semaphore::new(size)),
            size,
            admission: Admission::new(size, max_pending),
            next_index: AtomicUsize::new(size),
        })
    }

    /// Number of spawned workers currently waiting for a job.
    pub fn idle_workers(&self) -> usize {
        self.lock_idle().len()
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, Vec<WorkerProcess>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Takes an idle worker, or spawns a replacement for one that was lost.
    fn checkout(&self) -> Result<WorkerProcess, PoolError> {
        if let Some(worker) = self.lock_idle().pop() {
            return Ok(worker);
        }
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        tracing::info!(worker = index, "Replacing lost worker");
        self.command.spawn(index)
    }
}

#[async_trait]
impl Executor for ProcessPool {
    async fn execute(&self, job: WorkerJob) -> Result<JobOutcome, PoolError> {
        let _admitted = self.admission.admit()?;
        let _slot = self
            .available
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        let mut worker = self.checkout()?;
        match worker.exchange(&job).await {
            Ok(outcome) => {
                self.lock_idle().push(worker);
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(rqid = %job.context.request_id, job = %job.job, error = %e, "Worker failed");
                // Dropping the worker kills the process.
                Err(e)
            }
        }
    }

    fn size(&self) -> usize {
        self.size
    }
}
