//! Diagnostic routes and jobs.
//!
//! These exercise the whole pipeline, real workers included, without a
//! drawing engine: `echo` returns its first argument, `sleep` waits then
//! echoes, `fail` reports an error and `panic` panics inside the job.
//! Routes and jobs share names.

use anyhow::{anyhow, bail};
use cardrender_common::protocol::RenderArgs;
use serde_json::Value;
use std::time::Duration;

use crate::pool::JobTable;
use crate::registry::{JobRoute, RouteRegistryBuilder};

pub const ECHO: &str = "echo";
pub const SLEEP: &str = "sleep";
pub const FAIL: &str = "fail";
pub const PANIC: &str = "panic";

/// Adds the diagnostic jobs to `jobs`.
pub fn diagnostic_jobs(jobs: JobTable) -> JobTable {
    jobs.register(ECHO, |args, _| echo_bytes(args.first()))
        .register(SLEEP, |args, _| {
            let ms = args
                .first()
                .and_then(Value::as_u64)
                .ok_or_else(|| anyhow!("sleep expects milliseconds as its first argument"))?;
            std::thread::sleep(Duration::from_millis(ms));
            echo_bytes(args.get(1))
        })
        .register(FAIL, |args, _| match first_str(args) {
            Some(message) => bail!("{}", message),
            None => bail!("requested failure"),
        })
        .register(PANIC, |args, _| match first_str(args) {
            Some(message) => panic!("{}", message),
            None => panic!("requested panic"),
        })
}

/// Registers a route forwarding to each diagnostic job.
pub fn diagnostic_routes(builder: RouteRegistryBuilder) -> RouteRegistryBuilder {
    [ECHO, SLEEP, FAIL, PANIC]
        .into_iter()
        .fold(builder, |builder, name| builder.register(name, JobRoute::new(name)))
}

fn first_str(args: &RenderArgs) -> Option<&str> {
    args.first().and_then(Value::as_str)
}

/// Bytes of a JSON value: strings as UTF-8, arrays of numbers as raw bytes.
fn echo_bytes(value: Option<&Value>) -> anyhow::Result<Vec<u8>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(s.clone().into_bytes()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| anyhow!("byte arrays may only hold integers 0-255, got {}", item))
            })
            .collect(),
        Some(other) => bail!("echo expects a string or a byte array, got {}", other),
    }
}
