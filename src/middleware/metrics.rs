use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::Middleware;
use crate::dispatcher::{ApiRequest, ApiResponse};

/// Middleware for collecting Prometheus-compatible metrics
///
/// All counters use atomic operations for thread-safe updates without locks.
///
/// Metrics collected:
/// - Total request count and average latency
/// - Throttled requests (429)
/// - Authentication failures (401 and 403)
/// - Server errors (5xx)
/// - Top-level requests (`/health`, `/metrics`, `/endpoints`)
/// - Coroutine stack size
#[derive(Default)]
pub struct MetricsMiddleware {
    request_count: AtomicUsize,
    total_latency_ns: AtomicU64,
    throttled: AtomicUsize,
    auth_failures: AtomicUsize,
    server_errors: AtomicUsize,
    top_level_requests: AtomicUsize,
    stack_size: AtomicUsize,
}

impl MetricsMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Mean processing time; zero before the first request
    pub fn average_latency(&self) -> Duration {
        let count = self.request_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    pub fn throttled(&self) -> usize {
        self.throttled.load(Ordering::Relaxed)
    }

    pub fn auth_failures(&self) -> usize {
        self.auth_failures.load(Ordering::Relaxed)
    }

    pub fn server_errors(&self) -> usize {
        self.server_errors.load(Ordering::Relaxed)
    }

    /// Count an infrastructure request that bypasses the dispatcher
    pub fn inc_top_level_request(&self) {
        self.top_level_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn top_level_request_count(&self) -> usize {
        self.top_level_requests.load(Ordering::Relaxed)
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size.load(Ordering::Relaxed)
    }

    /// Prometheus text exposition of every counter
    pub fn render_prometheus(&self) -> String {
        format!(
            "# HELP autoroute_requests_total Total number of dispatched requests\n\
             # TYPE autoroute_requests_total counter\n\
             autoroute_requests_total {}\n\
             # HELP autoroute_request_latency_seconds Average request latency in seconds\n\
             # TYPE autoroute_request_latency_seconds gauge\n\
             autoroute_request_latency_seconds {}\n\
             # HELP autoroute_throttled_total Requests rejected by rate limiting\n\
             # TYPE autoroute_throttled_total counter\n\
             autoroute_throttled_total {}\n\
             # HELP autoroute_auth_failures_total Requests rejected with 401 or 403\n\
             # TYPE autoroute_auth_failures_total counter\n\
             autoroute_auth_failures_total {}\n\
             # HELP autoroute_server_errors_total Responses with a 5xx status\n\
             # TYPE autoroute_server_errors_total counter\n\
             autoroute_server_errors_total {}\n\
             # HELP autoroute_top_level_requests_total Infrastructure endpoint requests\n\
             # TYPE autoroute_top_level_requests_total counter\n\
             autoroute_top_level_requests_total {}\n\
             # HELP autoroute_coroutine_stack_bytes Configured coroutine stack size\n\
             # TYPE autoroute_coroutine_stack_bytes gauge\n\
             autoroute_coroutine_stack_bytes {}\n",
            self.request_count(),
            self.average_latency().as_secs_f64(),
            self.throttled(),
            self.auth_failures(),
            self.server_errors(),
            self.top_level_request_count(),
            self.stack_size(),
        )
    }
}

/// Passive: never short-circuits, only observes and records
impl Middleware for MetricsMiddleware {
    fn before(&self, _req: &ApiRequest) -> Option<ApiResponse> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn after(&self, _req: &ApiRequest, res: &mut ApiResponse, latency: Duration) {
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        match res.status {
            401 | 403 => {
                self.auth_failures.fetch_add(1, Ordering::Relaxed);
            }
            429 => {
                self.throttled.fetch_add(1, Ordering::Relaxed);
            }
            s if s >= 500 => {
                self.server_errors.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        let size = if may::coroutine::is_coroutine() {
            may::coroutine::current().stack_size()
        } else {
            may::config().get_stack_size()
        };
        self.stack_size.store(size, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn test_counts_by_status() {
        let m = MetricsMiddleware::new();
        let req = ApiRequest::new(Method::GET, "/x");
        for status in [200, 401, 403, 429, 500] {
            assert!(m.before(&req).is_none());
            let mut res = ApiResponse::new(status, "application/json", Vec::new());
            m.after(&req, &mut res, Duration::from_millis(2));
        }
        assert_eq!(m.request_count(), 5);
        assert_eq!(m.auth_failures(), 2);
        assert_eq!(m.throttled(), 1);
        assert_eq!(m.server_errors(), 1);
        assert_eq!(m.average_latency(), Duration::from_millis(2));
        assert!(m.render_prometheus().contains("autoroute_throttled_total 1"));
    }
}
