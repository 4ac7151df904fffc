//! # Cardrender Entry Point
//!
//! Main binary for the cardrender render pipeline. Provides a command-line
//! interface for starting the render server, running pool workers and
//! making one-off render requests.
//!
//! ## Usage
//!
//! ```bash
//! # Start a server with 4 worker processes
//! cardrender serve -s /run/cardrender/gui.sock -w 4
//!
//! # Start a server from a config file, running jobs in-process
//! cardrender serve -c cardrender.toml --inline
//!
//! # Render once and save the image
//! cardrender call weekly -a '[{"guild": 42}]' -o weekly.png
//! ```

use anyhow::{Context, Result};
use argh::FromArgs;
use cardrender_cli::logging::{self, LogMode};
use cardrender_client::{ClientConfig, RenderClient};
use cardrender_common::config::secs;
use cardrender_common::protocol::{RenderArgs, RenderKwargs};
use cardrender_common::transport::UnixServer;
use cardrender_common::RenderConfig;
use cardrender_server::builtin::{diagnostic_jobs, diagnostic_routes};
use cardrender_server::pool::worker;
use cardrender_server::{Executor, JobTable, LocalPool, ProcessPool, RenderServer, RouteRegistry, WorkerCommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// cardrender - offloads card rendering to a pool of worker processes
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Worker(WorkerArgs),
    Call(CallArgs),
}

/// Arguments for starting the render server.
///
/// Settings come from the config file, then `CARDRENDER_SOCKET`, then these
/// flags, each overriding the last.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start the render server
struct ServeArgs {
    /// path to a TOML config file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// unix socket to listen on
    #[argh(option, short = 's')]
    socket: Option<PathBuf>,

    /// number of workers
    #[argh(option, short = 'w')]
    workers: Option<usize>,

    /// jobs allowed to wait for a busy pool before requests are refused
    #[argh(option, long = "max-pending")]
    max_pending: Option<usize>,

    /// run jobs on threads in this process instead of worker processes
    #[argh(switch)]
    inline: bool,

    /// register the echo, sleep, fail and panic routes
    #[argh(switch, long = "diagnostic-routes")]
    diagnostic_routes: bool,
}

/// Arguments for a pool worker.
///
/// Spawned by the server's process pool; not meant to be run by hand.
#[derive(FromArgs)]
#[argh(subcommand, name = "worker")]
/// run a pool worker on stdin/stdout (internal)
struct WorkerArgs {
    /// worker index, used to label log lines
    #[argh(option, default = "0")]
    index: usize,

    /// serve the echo, sleep, fail and panic jobs
    #[argh(switch, long = "diagnostic-jobs")]
    diagnostic_jobs: bool,
}

/// Arguments for a single render request.
///
/// # Examples
///
/// ```bash
/// cardrender call ping
/// cardrender call echo -a '["hello"]' | xxd
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// make one render request and write the image bytes
struct CallArgs {
    /// name of the route to call
    #[argh(positional)]
    route: String,

    /// JSON array of positional arguments
    #[argh(option, short = 'a', default = "\"[]\".into()")]
    args: String,

    /// JSON object of keyword arguments
    #[argh(option, short = 'k', default = "\"{}\".into()")]
    kwargs: String,

    /// file to write the image to (defaults to stdout)
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,

    /// request deadline in seconds
    #[argh(option, short = 't')]
    timeout: Option<f64>,

    /// unix socket of the server
    #[argh(option, short = 's')]
    socket: Option<PathBuf>,

    /// path to a TOML config file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    logging::init(match cli.command {
        Commands::Serve(_) => LogMode::Server,
        Commands::Worker(_) => LogMode::Worker,
        Commands::Call(_) => LogMode::Quiet,
    });

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Worker(args) => {
            tokio::task::spawn_blocking(move || run_worker(args))
                .await
                .context("worker thread panicked")?
        }
        Commands::Call(args) => run_call(args).await,
    }
}

/// Loads settings from `config`, letting `socket` override the socket path.
fn load_config(config: Option<&Path>, socket: Option<PathBuf>) -> Result<RenderConfig> {
    let config = RenderConfig::load(config)?.with_socket_override(socket);
    Ok(config)
}

/// Jobs known to this binary. Both the server and its workers build the
/// same table.
fn job_table(diagnostic: bool) -> JobTable {
    let jobs = JobTable::new();
    if diagnostic {
        diagnostic_jobs(jobs)
    } else {
        jobs
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref(), args.socket)?;
    if let Some(workers) = args.workers {
        config.server.workers = workers;
    }
    if args.max_pending.is_some() {
        config.server.max_pending = args.max_pending;
    }
    config.validate()?;

    let mut routes = RouteRegistry::builder();
    if args.diagnostic_routes {
        routes = diagnostic_routes(routes);
    }
    let registry = routes.build();

    let workers = config.server.workers;
    let max_pending = config.server.max_pending;
    let executor: Arc<dyn Executor> = if args.inline {
        tracing::info!(workers, "Running jobs in-process");
        Arc::new(LocalPool::start(job_table(args.diagnostic_routes), workers, max_pending)?)
    } else {
        let mut command = WorkerCommand::current_exe()?;
        if args.diagnostic_routes {
            command = command.arg("--diagnostic-jobs");
        }
        Arc::new(ProcessPool::start(command, workers, max_pending)?)
    };

    let listener = UnixServer::bind(&config.socket_path)
        .with_context(|| format!("failed to bind {}", config.socket_path.display()))?;
    let server = RenderServer::new(registry, executor);

    server
        .serve_until(&listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}

fn run_worker(args: WorkerArgs) -> Result<()> {
    let jobs = job_table(args.diagnostic_jobs);
    worker::serve_stdio(&jobs, args.index)
}

/// Executes the `call` subcommand.
///
/// Logging stays off unless `RUST_LOG` is set, so the image bytes can be
/// piped straight from stdout.
async fn run_call(args: CallArgs) -> Result<()> {
    let config = load_config(args.config.as_deref(), args.socket)?;
    config.validate()?;

    let render_args: RenderArgs =
        serde_json::from_str(&args.args).map_err(|e| anyhow::anyhow!("Invalid JSON array in args: {}", e))?;
    let render_kwargs: RenderKwargs =
        serde_json::from_str(&args.kwargs).map_err(|e| anyhow::anyhow!("Invalid JSON object in kwargs: {}", e))?;
    let timeout = args.timeout.map(secs);

    let client = RenderClient::new(ClientConfig::from(&config));
    let data = client.request(&args.route, render_args, render_kwargs, timeout).await?;

    match args.output {
        Some(path) => std::fs::write(&path, &data).with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
    }

    Ok(())
}
