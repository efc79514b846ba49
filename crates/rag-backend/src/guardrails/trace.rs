use std::time::Instant;

use axum::{
    extract::Request,
    http::{header::HeaderValue, HeaderMap},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

tokio::task_local! {
    static TRACE: TraceContext;
}

/// Per-request trace/span context, propagated via a task-local so that
/// downstream code can enrich logs without threading ids through every
/// call.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub user_id: Option<String>,
    pub request_id: Option<String>,
    pub start_time: Instant,
}

impl TraceContext {
    pub fn new(trace_id: Option<String>) -> Self {
        TraceContext {
            trace_id: trace_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            span_id: Uuid::new_v4().to_string(),
            user_id: None,
            request_id: None,
            start_time: Instant::now(),
        }
    }

    /// Snapshot of the ambient context, if one is installed on this task.
    pub fn current() -> Option<TraceContext> {
        TRACE.try_with(|ctx| ctx.clone()).ok()
    }

    pub fn current_trace_id() -> String {
        TRACE
            .try_with(|ctx| ctx.trace_id.clone())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    pub fn current_user_id() -> Option<String> {
        TRACE.try_with(|ctx| ctx.user_id.clone()).ok().flatten()
    }

    pub fn duration_ms(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64() * 1000.0
    }

    /// Run a future with this context installed as the ambient value.
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        TRACE.scope(self, fut).await
    }
}

fn inbound_trace_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-trace-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Accept an inbound `X-Trace-ID` (or mint a fresh one), install the trace
/// context for the request task, and echo the id on the response.
pub async fn trace_middleware(request: Request, next: Next) -> Response {
    let mut ctx = TraceContext::new(inbound_trace_id(request.headers()));
    ctx.user_id = request
        .headers()
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let trace_id = ctx.trace_id.clone();

    tracing::debug!(trace_id = %trace_id, method = %request.method(), path = %request.uri().path(), "request_started");

    let mut response = ctx.scope(next.run(request)).await;

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert("x-trace-id", value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scoped_context_is_visible() {
        let ctx = TraceContext::new(Some("trace-abc".into()));
        ctx.scope(async {
            assert_eq!(TraceContext::current_trace_id(), "trace-abc");
            assert!(TraceContext::current().is_some());
        })
        .await;
    }

    #[test]
    fn missing_context_falls_back_to_unknown() {
        assert_eq!(TraceContext::current_trace_id(), "unknown");
        assert!(TraceContext::current().is_none());
    }
}
