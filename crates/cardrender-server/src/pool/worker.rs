//! Worker process entry point.
//!
//! A worker reads [`WorkerJob`] frames from stdin and answers each with a
//! [`JobOutcome`] frame on stdout until stdin closes. Stdout belongs to the
//! pool, so all logging must go to stderr.

use cardrender_common::transport::{read_frame, write_frame, JsonCodec};
use std::io::{self, Read, Write};

use super::{JobOutcome, JobTable, WorkerJob};

/// Runs the worker loop on the process's stdin and stdout.
///
/// The job table's init hook runs first; a failing hook ends the worker
/// before it accepts any job.
pub fn serve_stdio(jobs: &JobTable, index: usize) -> anyhow::Result<()> {
    jobs.init()?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(jobs, &format!("worker-{}", index), &mut stdin.lock(), &mut stdout.lock())?;
    Ok(())
}

/// Answers jobs from `reader` on `writer` until `reader` is exhausted.
pub fn serve<R: Read, W: Write>(jobs: &JobTable, label: &str, reader: &mut R, writer: &mut W) -> io::Result<()> {
    tracing::info!(worker = label, jobs = ?jobs.names(), "Worker ready");

    while let Some(frame) = read_frame(reader)? {
        let outcome = match JsonCodec::decode::<WorkerJob>(&frame) {
            Ok(job) => jobs.run(&job, label),
            Err(e) => {
                tracing::error!(worker = label, error = %e, "Malformed job");
                JobOutcome::failed(format!("malformed job: {}", e))
            }
        };

        let encoded = JsonCodec::encode(&outcome)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        write_frame(writer, &encoded)?;
    }

    tracing::info!(worker = label, "Job channel closed, worker exiting");
    Ok(())
}
