use std::time::Duration;

use crate::dispatcher::{ApiRequest, ApiResponse};

/// Observation hooks around every pipeline run
///
/// `before` may short-circuit with its own response; `after` sees every
/// response, including error responses, and may adjust it.
pub trait Middleware: Send + Sync {
    fn before(&self, _req: &ApiRequest) -> Option<ApiResponse> {
        None
    }
    fn after(&self, _req: &ApiRequest, _res: &mut ApiResponse, _latency: Duration) {}
}
