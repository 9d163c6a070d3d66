use super::request::{parse_request, RequestParseError};
use super::response::write_api_response;
use crate::dispatcher::{ApiResponse, Dispatcher, PipelineError};
use crate::middleware::MetricsMiddleware;
use crate::runtime_config::HttpConfig;
use http::Method;
use may_minihttp::{HttpService, Request, Response};
use serde_json::{json, Value};
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

/// `may_minihttp` service: parse, dispatch, write
///
/// Cloned once per connection; everything inside is shared.
#[derive(Clone)]
pub struct AppService {
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Option<Arc<MetricsMiddleware>>,
    pub max_body_bytes: u64,
}

impl AppService {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            metrics: None,
            max_body_bytes: HttpConfig::default().max_body_bytes,
        }
    }

    pub fn set_metrics_middleware(&mut self, metrics: Arc<MetricsMiddleware>) {
        self.metrics = Some(metrics);
    }

    pub fn with_max_body_bytes(mut self, limit: u64) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Built-in `GET` endpoints, unless the registry defines the same path
    fn infrastructure(&self, method: &Method, path: &str) -> Option<ApiResponse> {
        if method != Method::GET || self.dispatcher.registry().lookup(method, path).is_some() {
            return None;
        }
        let resp = match path {
            "/health" => health_endpoint(),
            "/metrics" => match &self.metrics {
                Some(metrics) => metrics_endpoint(metrics),
                None => PipelineError::NotFound {
                    detail: "metrics not enabled".to_string(),
                }
                .to_response(),
            },
            "/endpoints" => endpoints_endpoint(&self.dispatcher),
            _ => return None,
        };
        if let Some(metrics) = &self.metrics {
            metrics.inc_top_level_request();
        }
        Some(resp)
    }
}

/// Basic health check endpoint returning `{ "status": "ok" }`.
pub fn health_endpoint() -> ApiResponse {
    ApiResponse::json(200, &json!({ "status": "ok" }))
}

/// Metrics endpoint returning Prometheus text format statistics.
pub fn metrics_endpoint(metrics: &MetricsMiddleware) -> ApiResponse {
    ApiResponse::new(
        200,
        "text/plain; version=0.0.4",
        metrics.render_prometheus().into_bytes(),
    )
}

/// Every registered endpoint with its documentation, sorted by path then method
pub fn endpoints_endpoint(dispatcher: &Dispatcher) -> ApiResponse {
    let mut specs: Vec<_> = dispatcher
        .registry()
        .endpoints()
        .map(|e| Arc::clone(&e.spec))
        .collect();
    specs.sort_by(|a, b| (&a.path, a.method.as_str()).cmp(&(&b.path, b.method.as_str())));
    let list: Vec<Value> = specs
        .iter()
        .filter_map(|s| serde_json::to_value(s.as_ref()).ok())
        .collect();
    ApiResponse::json(200, &json!({ "count": list.len(), "endpoints": list }))
}

fn parse_error_response(err: &RequestParseError) -> ApiResponse {
    let pipeline_error = match err {
        RequestParseError::BodyTooLarge { limit } => PipelineError::PayloadTooLarge {
            field: None,
            limit: *limit,
        },
        other => PipelineError::BadRequest {
            field: None,
            reason: other.to_string(),
        },
    };
    pipeline_error.to_response()
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let api_req = match parse_request(req, self.max_body_bytes) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Rejected unparseable request");
                write_api_response(res, parse_error_response(&e));
                return Ok(());
            }
        };

        if let Some(resp) = self.infrastructure(&api_req.method, &api_req.path) {
            debug!(path = %api_req.path, "Infrastructure endpoint");
            write_api_response(res, resp);
            return Ok(());
        }

        let resp = self.dispatcher.dispatch(api_req);
        write_api_response(res, resp);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{HandlerContext, HandlerError, HandlerOutcome, HandlerTable};
    use crate::registry::Registry;
    use crate::spec::EndpointSpec;

    fn service() -> AppService {
        let mut table = HandlerTable::default();
        table.register("app.ping", |_ctx: &HandlerContext| {
            Ok::<_, HandlerError>(HandlerOutcome::json(json!({"pong": true})))
        });
        let specs = vec![
            EndpointSpec::new("ping", "/ping", Method::GET, "app.ping"),
            EndpointSpec::new("custom_health", "/health", Method::GET, "app.ping"),
        ];
        let registry = Arc::new(Registry::build(specs, &table).unwrap());
        AppService::new(Arc::new(Dispatcher::new(registry)))
    }

    #[test]
    fn test_registry_shadows_infrastructure() {
        let svc = service();
        assert!(svc.infrastructure(&Method::GET, "/health").is_none());
        assert!(svc.infrastructure(&Method::POST, "/endpoints").is_none());
        let listed = svc.infrastructure(&Method::GET, "/endpoints").unwrap();
        let body = listed.json_body().unwrap();
        assert_eq!(body["count"], 2);
        assert_eq!(body["endpoints"][1]["name"], "ping");
    }

    #[test]
    fn test_metrics_disabled_is_not_found() {
        let svc = service();
        assert_eq!(svc.infrastructure(&Method::GET, "/metrics").unwrap().status, 404);
    }

    #[test]
    fn test_parse_error_statuses() {
        let too_big = parse_error_response(&RequestParseError::BodyTooLarge { limit: 10 });
        assert_eq!(too_big.status, 413);
        let bad = parse_error_response(&RequestParseError::MalformedJson("eof".into()));
        assert_eq!(bad.status, 400);
    }
}
