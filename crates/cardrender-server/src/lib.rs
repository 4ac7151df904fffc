//! Cardrender Server
//!
//! This crate provides the render server: a registry of named routes, a
//! dispatcher answering requests from the Unix socket, and the worker pools
//! that run CPU-heavy jobs outside the server's async tasks.

pub mod builtin;
pub mod error;
pub mod panics;
pub mod pool;
pub mod registry;
pub mod server;

pub use error::{PoolError, Result, RouteError};
pub use pool::{Executor, JobOutcome, JobTable, LocalPool, ProcessPool, Runner, WorkerCommand, WorkerJob};
pub use registry::{FixedRoute, JobRoute, RenderRoute, RouteRegistry, RouteRegistryBuilder};
pub use server::RenderServer;
