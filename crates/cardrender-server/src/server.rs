use cardrender_common::protocol::{RenderRequest, RenderResponse, RequestContext, RequestId};
use cardrender_common::transport::UnixServer;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

use crate::panics;
use crate::pool::{Executor, Runner};
use crate::registry::RouteRegistry;

/// Dispatches render requests to routes and runs them on a worker pool.
///
/// Cloning is cheap; clones share the registry and the pool.
#[derive(Clone)]
pub struct RenderServer {
    registry: RouteRegistry,
    executor: Arc<dyn Executor>,
}

impl RenderServer {
    pub fn new(registry: RouteRegistry, executor: Arc<dyn Executor>) -> Self {
        panics::capture_backtraces();
        Self { registry, executor }
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    /// Handles one request and builds its response.
    ///
    /// Never fails: every outcome, including route errors, is expressed as
    /// a response state.
    pub async fn handle_request(&self, request: RenderRequest) -> RenderResponse {
        let request_id = request
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(RequestId::generate);
        let span = tracing::info_span!("request", rqid = %request_id, route = %request.route);

        self.dispatch(request_id, request).instrument(span).await
    }

    async fn dispatch(&self, request_id: RequestId, request: RenderRequest) -> RenderResponse {
        let Some(route) = self.registry.get(&request.route) else {
            tracing::warn!("Unknown route");
            return RenderResponse::unknown_route(request_id);
        };

        let context = RequestContext::new(request_id.clone()).with_label(format!("ROUTE {}", request.route));
        let runner = Runner::new(self.executor.clone(), context);

        let started = Instant::now();
        let result = AssertUnwindSafe(route.render(&runner, request.args, request.kwargs))
            .catch_unwind()
            .await;
        let duration = started.elapsed().as_secs_f64();

        let result = match result {
            Ok(result) => result,
            Err(payload) => {
                let message = panics::message(payload.as_ref());
                tracing::error!(
                    duration,
                    panic = %message,
                    backtrace = %panics::backtrace_text(),
                    "Route panicked"
                );
                return RenderResponse::system_error(request_id, format!("route panicked: {}", message), duration);
            }
        };

        match result {
            Ok(outcome) => {
                let data = if outcome.error.is_some() { Vec::new() } else { outcome.data };
                let response = RenderResponse::completed(request_id, data, outcome.error, duration);
                match &response.error {
                    None => tracing::info!(duration, bytes = response.data.len(), "Rendered"),
                    Some(error) => tracing::warn!(duration, error = %error, "Render failed"),
                }
                response
            }
            Err(e) => {
                tracing::error!(duration, error = ?e, "Route failed");
                RenderResponse::system_error(request_id, e.to_string(), duration)
            }
        }
    }

    /// Serves requests accepted by `listener` until the process ends.
    pub async fn serve(&self, listener: &UnixServer) -> cardrender_common::Result<()> {
        self.serve_until(listener, std::future::pending()).await
    }

    /// Serves requests accepted by `listener` until `shutdown` resolves.
    pub async fn serve_until<S>(&self, listener: &UnixServer, shutdown: S) -> cardrender_common::Result<()>
    where
        S: Future<Output = ()>,
    {
        tracing::info!(
            socket = %listener.path().display(),
            routes = ?self.registry.names(),
            workers = self.executor.size(),
            "Render server listening"
        );

        let server = self.clone();
        listener
            .serve_until(
                move |request| {
                    let server = server.clone();
                    async move { server.handle_request(request).await }
                },
                shutdown,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PoolError, RouteError};
    use crate::pool::{JobOutcome, JobTable, LocalPool};
    use crate::registry::{JobRoute, RenderRoute};
    use async_trait::async_trait;
    use cardrender_common::protocol::{RenderArgs, RenderKwargs, RequestState};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts invocations
    struct Spy(Arc<AtomicUsize>);

    #[async_trait]
    impl RenderRoute for Spy {
        async fn render(&self, _: &Runner, _: RenderArgs, _: RenderKwargs) -> crate::Result<JobOutcome> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(JobOutcome::success(Vec::new()))
        }
    }

    struct Broken;

    #[async_trait]
    impl RenderRoute for Broken {
        async fn render(&self, _: &Runner, _: RenderArgs, _: RenderKwargs) -> crate::Result<JobOutcome> {
            Err(RouteError::InvalidArguments("expected a guild id".to_string()))
        }
    }

    struct Exploding;

    #[async_trait]
    impl RenderRoute for Exploding {
        async fn render(&self, _: &Runner, _: RenderArgs, _: RenderKwargs) -> crate::Result<JobOutcome> {
            tokio::task::yield_now().await;
            panic!("layout overflowed");
        }
    }

    /// Reports data and an error at once
    struct Muddled;

    #[async_trait]
    impl RenderRoute for Muddled {
        async fn render(&self, _: &Runner, _: RenderArgs, _: RenderKwargs) -> crate::Result<JobOutcome> {
            Ok(JobOutcome {
                data: b"partial".to_vec(),
                error: Some("half drawn".to_string()),
            })
        }
    }

    fn server(calls: Arc<AtomicUsize>) -> RenderServer {
        let jobs = JobTable::new()
            .register("upper", |args, _| {
                let text = args.first().and_then(|v| v.as_str()).unwrap_or_default();
                Ok(text.to_uppercase().into_bytes())
            })
            .register("fail", |_, _| Err(anyhow::anyhow!("font not found")));
        let pool = LocalPool::start(jobs, 2, None).unwrap();

        let registry = RouteRegistry::builder()
            .register("upper", JobRoute::new("upper"))
            .register("fail", JobRoute::new("fail"))
            .register("spy", Spy(calls))
            .register("broken", Broken)
            .register("exploding", Exploding)
            .register("muddled", Muddled)
            .build();
        RenderServer::new(registry, Arc::new(pool))
    }

    #[tokio::test]
    async fn test_success() {
        let server = server(Arc::default());
        let request = RenderRequest::new("upper", vec![json!("abc")], Default::default());
        let id = request.id.clone().unwrap();

        let response = server.handle_request(request).await;

        assert_eq!(response.request_id, id);
        assert_eq!(response.state, RequestState::Success);
        assert_eq!(response.data, b"ABC");
        assert_eq!(response.length, Some(3));
        assert!(response.duration.is_some());
    }

    #[tokio::test]
    async fn test_unknown_route_never_invokes_a_route() {
        let calls = Arc::new(AtomicUsize::new(0));
        let server = server(calls.clone());

        let response = server
            .handle_request(RenderRequest::new("monthly", vec![], Default::default()))
            .await;

        assert_eq!(response.state, RequestState::UnknownRoute);
        assert!(response.length.is_none());
        assert!(response.duration.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_job_error_is_render_error() {
        let server = server(Arc::default());
        let response = server
            .handle_request(RenderRequest::new("fail", vec![], Default::default()))
            .await;

        assert_eq!(response.state, RequestState::RenderError);
        assert_eq!(response.error.as_deref(), Some("font not found"));
        assert!(response.data.is_empty());
    }

    #[tokio::test]
    async fn test_route_error_is_system_error() {
        let server = server(Arc::default());
        let response = server
            .handle_request(RenderRequest::new("broken", vec![], Default::default()))
            .await;

        assert_eq!(response.state, RequestState::SystemError);
        assert!(response.data.is_empty());
        assert!(response.error.unwrap().contains("guild id"));
    }

    #[tokio::test]
    async fn test_route_panic_is_system_error() {
        let server = server(Arc::default());
        let response = server
            .handle_request(RenderRequest::new("exploding", vec![], Default::default()))
            .await;

        assert_eq!(response.state, RequestState::SystemError);
        assert!(response.data.is_empty());
        assert_eq!(response.error.as_deref(), Some("route panicked: layout overflowed"));
        assert!(response.duration.is_some());

        let response = server
            .handle_request(RenderRequest::new("upper", vec![json!("still up")], Default::default()))
            .await;
        assert_eq!(response.data, b"STILL UP");
    }

    #[tokio::test]
    async fn test_error_outcome_drops_data() {
        let server = server(Arc::default());
        let response = server
            .handle_request(RenderRequest::new("muddled", vec![], Default::default()))
            .await;

        assert_eq!(response.state, RequestState::RenderError);
        assert!(response.data.is_empty());
        assert_eq!(response.length, Some(0));
    }

    #[tokio::test]
    async fn test_missing_request_id_is_generated() {
        let server = server(Arc::default());
        let request = RenderRequest {
            id: None,
            route: "ping".to_string(),
            args: vec![],
            kwargs: Default::default(),
        };

        let response = server.handle_request(request).await;

        assert!(!response.request_id.is_empty());
        assert_eq!(response.data, b"Pong");
    }

    #[tokio::test]
    async fn test_queue_full_is_system_error() {
        struct Full;

        #[async_trait]
        impl Executor for Full {
            async fn execute(&self, _job: crate::pool::WorkerJob) -> std::result::Result<JobOutcome, PoolError> {
                Err(PoolError::QueueFull)
            }

            fn size(&self) -> usize {
                1
            }
        }

        let registry = RouteRegistry::builder().register("weekly", JobRoute::new("weekly")).build();
        let server = RenderServer::new(registry, Arc::new(Full));

        let response = server
            .handle_request(RenderRequest::new("weekly", vec![], Default::default()))
            .await;

        assert_eq!(response.state, RequestState::SystemError);
        assert_eq!(response.error.as_deref(), Some("render queue full"));
    }
}
