use async_trait::async_trait;
use cardrender_common::protocol::{RenderArgs, RenderKwargs};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::pool::{JobOutcome, Runner};

/// Name of the health-check route present in every registry.
pub const PING_ROUTE: &str = "ping";

/// Bytes returned by the health-check route.
pub const PONG: &[u8] = b"Pong";

/// A named render entry point.
///
/// A route receives the request's arguments and a [`Runner`] for pushing
/// CPU-heavy work to the worker pool. It may do async work of its own
/// before or after.
///
/// Returning `Ok` with a failed outcome answers `RENDER_ERROR`; returning
/// `Err` answers `SYSTEM_ERROR`.
#[async_trait]
pub trait RenderRoute: Send + Sync {
    async fn render(&self, runner: &Runner, args: RenderArgs, kwargs: RenderKwargs) -> Result<JobOutcome>;
}

/// Route answering with fixed bytes without touching the pool.
pub struct FixedRoute(pub Vec<u8>);

#[async_trait]
impl RenderRoute for FixedRoute {
    async fn render(&self, _runner: &Runner, _args: RenderArgs, _kwargs: RenderKwargs) -> Result<JobOutcome> {
        Ok(JobOutcome::success(self.0.clone()))
    }
}

/// Route forwarding its arguments to a worker job.
pub struct JobRoute {
    job: String,
}

impl JobRoute {
    pub fn new(job: impl Into<String>) -> Self {
        Self { job: job.into() }
    }
}

#[async_trait]
impl RenderRoute for JobRoute {
    async fn render(&self, runner: &Runner, args: RenderArgs, kwargs: RenderKwargs) -> Result<JobOutcome> {
        Ok(runner.run(&self.job, args, kwargs).await?)
    }
}

/// Read-only mapping from route name to route.
///
/// Built once at startup with [`RouteRegistry::builder`]; there is no way
/// to add or remove routes afterwards.
///
/// # Example
///
/// ```
/// use cardrender_server::{JobRoute, RouteRegistry};
///
/// let registry = RouteRegistry::builder()
///     .register("weekly", JobRoute::new("weekly"))
///     .build();
/// assert!(registry.contains("weekly"));
/// assert!(registry.contains("ping"));
/// ```
#[derive(Clone)]
pub struct RouteRegistry {
    routes: Arc<HashMap<String, Arc<dyn RenderRoute>>>,
}

impl RouteRegistry {
    pub fn builder() -> RouteRegistryBuilder {
        RouteRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn RenderRoute>> {
        self.routes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// Registered route names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Collects routes for a [`RouteRegistry`].
#[derive(Default)]
pub struct RouteRegistryBuilder {
    routes: HashMap<String, Arc<dyn RenderRoute>>,
}

impl RouteRegistryBuilder {
    /// Adds a route. A later registration under the same name replaces it.
    pub fn register(mut self, name: impl Into<String>, route: impl RenderRoute + 'static) -> Self {
        let name = name.into();
        if self.routes.insert(name.clone(), Arc::new(route)).is_some() {
            tracing::warn!(route = %name, "Route registered twice, keeping the last one");
        }
        self
    }

    /// Freezes the routes, adding the `ping` route unless one was given.
    pub fn build(mut self) -> RouteRegistry {
        self.routes
            .entry(PING_ROUTE.to_string())
            .or_insert_with(|| Arc::new(FixedRoute(PONG.to_vec())));
        RouteRegistry {
            routes: Arc::new(self.routes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;
    use crate::pool::{Executor, WorkerJob};
    use cardrender_common::protocol::{RequestContext, RequestId};

    struct Unreachable;

    #[async_trait]
    impl Executor for Unreachable {
        async fn execute(&self, _job: WorkerJob) -> std::result::Result<JobOutcome, PoolError> {
            Err(PoolError::Closed)
        }

        fn size(&self) -> usize {
            0
        }
    }

    fn runner() -> Runner {
        Runner::new(Arc::new(Unreachable), RequestContext::new(RequestId::from("r")))
    }

    #[test]
    fn test_ping_always_present() {
        let registry = RouteRegistry::default();
        assert!(registry.contains(PING_ROUTE));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["ping"]);
    }

    #[tokio::test]
    async fn test_ping_returns_pong_without_pool() {
        let registry = RouteRegistry::default();
        let route = registry.get(PING_ROUTE).unwrap();
        let outcome = route.render(&runner(), vec![], Default::default()).await.unwrap();
        assert_eq!(outcome.data, b"Pong");
    }

    #[test]
    fn test_custom_ping_is_kept() {
        let registry = RouteRegistry::builder()
            .register(PING_ROUTE, FixedRoute(b"custom".to_vec()))
            .build();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registration() {
        let registry = RouteRegistry::builder()
            .register("weekly", JobRoute::new("draw_weekly"))
            .register("profile", JobRoute::new("draw_profile"))
            .build();

        assert_eq!(registry.names(), vec!["ping", "profile", "weekly"]);
        assert!(registry.get("monthly").is_none());
    }

    #[tokio::test]
    async fn test_job_route_surfaces_pool_errors() {
        let route = JobRoute::new("draw");
        let result = route.render(&runner(), vec![], Default::default()).await;
        assert!(matches!(result, Err(crate::error::RouteError::Pool(PoolError::Closed))));
    }
}
