use std::time::Duration;

use tracing::{info, info_span, warn};

use super::Middleware;
use crate::dispatcher::{ApiRequest, ApiResponse};

/// Emits one structured event per request inside a `request` span
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn after(&self, req: &ApiRequest, res: &mut ApiResponse, latency: Duration) {
        let span = info_span!(
            "request",
            request_id = %req.request_id,
            method = %req.method,
            path = %req.path
        );
        let _guard = span.enter();
        let latency_ms = latency.as_millis() as u64;
        if res.status >= 500 {
            warn!(status = res.status, latency_ms, "Request failed");
        } else {
            info!(status = res.status, latency_ms, "Request completed");
        }
    }
}
