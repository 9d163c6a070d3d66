//! Dispatcher core module - the request pipeline.
//!
//! Every request runs the same ordered stages:
//!
//! 1. **Route** - registry lookup (`OPTIONS` answers with metadata here)
//! 2. **Auth** - identity provider, gated by `auth_required`
//! 3. **Throttle** - per (endpoint, scope, client) rate, charged once
//! 4. **Validate** - parameter contract
//! 5. **Invoke** - the resolved handler, panics caught
//! 6. **Render** - status discipline and content negotiation
//!
//! A failing stage short-circuits every later stage.

use super::error::{PipelineError, PIPELINE_STATUSES};
use super::types::{ApiRequest, ApiResponse, RequestBody};
use crate::handlers::{HandlerContext, HandlerError, HandlerOutcome, Payload};
use crate::ids::REQUEST_ID_HEADER;
use crate::middleware::Middleware;
use crate::registry::{Registry, RouteMatch};
use crate::renderer::{negotiate, Renderer};
use crate::security::{AuthOutcome, IdentityProvider, NoAuthProvider, SecurityRequest};
use crate::spec::{EndpointSpec, Scope};
use crate::throttle::{InMemoryThrottleStore, ThrottleDecision, ThrottleStore};
use crate::validator::{validate, RawParams, UploadedFile, ValidationError};
use http::Method;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Client key used when neither a user id nor a forwarded address is known
pub const ANONYMOUS_CLIENT_KEY: &str = "anonymous";

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Route,
    Auth,
    Throttle,
    Validate,
    Invoke,
    Render,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Route => "route",
            Stage::Auth => "auth",
            Stage::Throttle => "throttle",
            Stage::Validate => "validate",
            Stage::Invoke => "invoke",
            Stage::Render => "render",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one pipeline run produced, for callers that need more than the response
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub response: ApiResponse,
    /// Stage that ended the run early, `None` when every stage passed
    pub failed_at: Option<Stage>,
    /// Matched endpoint name
    pub endpoint: Option<String>,
    /// Authenticated user id
    pub user: Option<String>,
    pub latency: Duration,
}

struct Failure {
    stage: Stage,
    error: PipelineError,
}

impl Failure {
    fn at(stage: Stage, error: PipelineError) -> Self {
        Self { stage, error }
    }
}

/// Per-run state carried between stages
#[derive(Default)]
struct RunState {
    endpoint: Option<String>,
    user: Option<String>,
}

/// Drives requests through the pipeline against an immutable [`Registry`]
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    identity: Arc<dyn IdentityProvider>,
    throttle: Arc<dyn ThrottleStore>,
    renderer: Arc<Renderer>,
    /// Ordered list of middleware applied around every run
    middlewares: Vec<Arc<dyn Middleware>>,
    /// Whether `X-Forwarded-For` / `X-Real-IP` identify anonymous callers
    trust_forwarded: bool,
}

impl Dispatcher {
    /// Dispatcher with no identity provider and an in-memory throttle store
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            identity: Arc::new(NoAuthProvider),
            throttle: Arc::new(InMemoryThrottleStore::new()),
            renderer: Arc::new(Renderer::new()),
            middlewares: Vec::new(),
            trust_forwarded: true,
        }
    }

    #[must_use]
    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = provider;
        self
    }

    #[must_use]
    pub fn with_throttle_store(mut self, store: Arc<dyn ThrottleStore>) -> Self {
        self.throttle = store;
        self
    }

    /// Trust forwarding headers when keying anonymous callers (default on).
    ///
    /// Turn this off unless a proxy that overwrites the headers sits in front;
    /// otherwise callers choose their own throttle key.
    #[must_use]
    pub fn with_trusted_forwarding(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }

    /// Middleware runs in the order it is added
    pub fn add_middleware(&mut self, mw: Arc<dyn Middleware>) {
        self.middlewares.push(mw);
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Run the pipeline and return only the response
    #[must_use]
    pub fn dispatch(&self, req: ApiRequest) -> ApiResponse {
        self.execute(req).response
    }

    /// Run the pipeline, reporting which stage (if any) ended it
    #[must_use]
    pub fn execute(&self, req: ApiRequest) -> PipelineOutcome {
        let start = Instant::now();
        let request_id = req.request_id;

        let mut early: Option<ApiResponse> = None;
        for (idx, mw) in self.middlewares.iter().enumerate() {
            if early.is_none() {
                early = mw.before(&req);
                if early.is_some() {
                    debug!(
                        request_id = %request_id,
                        middleware_idx = idx,
                        middleware_name = std::any::type_name_of_val(mw.as_ref()),
                        "Middleware returned early response"
                    );
                }
            } else if mw.before(&req).is_some() {
                debug!(
                    request_id = %request_id,
                    middleware_idx = idx,
                    middleware_name = std::any::type_name_of_val(mw.as_ref()),
                    "Discarding early response, an earlier middleware already answered"
                );
            }
        }

        let mut state = RunState::default();
        let (mut response, failed_at) = match early {
            Some(resp) => (resp, None),
            None => match self.run(&req, &mut state) {
                Ok(resp) => (resp, None),
                Err(Failure { stage, error }) => {
                    debug!(
                        request_id = %request_id,
                        stage = %stage,
                        status = error.status(),
                        reason = error.code(),
                        "Pipeline stopped"
                    );
                    (error.to_response(), Some(stage))
                }
            },
        };
        response.set_header(REQUEST_ID_HEADER, request_id.to_string());

        let latency = start.elapsed();
        for mw in &self.middlewares {
            mw.after(&req, &mut response, latency);
        }

        PipelineOutcome {
            response,
            failed_at,
            endpoint: state.endpoint,
            user: state.user,
            latency,
        }
    }

    fn run(&self, req: &ApiRequest, state: &mut RunState) -> Result<ApiResponse, Failure> {
        // Route
        if req.method == Method::OPTIONS && self.registry.lookup(&req.method, &req.path).is_none() {
            if let Some((spec, resp)) = self.options_response(&req.path) {
                // Metadata sits behind the same gates as the endpoint it describes
                state.endpoint = Some(spec.name.clone());
                let user = self.authenticate(req, &spec)?;
                state.user = user.clone();
                self.throttle(req, &spec, user.as_deref())?;
                return Ok(resp);
            }
        }
        let route = self.registry.lookup(&req.method, &req.path).ok_or_else(|| {
            Failure::at(
                Stage::Route,
                PipelineError::NotFound {
                    detail: format!("no endpoint for {} {}", req.method, req.path),
                },
            )
        })?;
        let spec = Arc::clone(&route.endpoint.spec);
        state.endpoint = Some(spec.name.clone());

        // Auth
        let user = self.authenticate(req, &spec)?;
        state.user = user.clone();

        // Throttle; accounting is final before the handler runs
        self.throttle(req, &spec, user.as_deref())?;

        // Validate
        let raw = collect_params(req, &route);
        let params = validate(&spec, raw).map_err(|e| Failure::at(Stage::Validate, validation_error(e)))?;

        // Invoke
        let ctx = HandlerContext {
            request_id: req.request_id,
            endpoint: Arc::clone(&spec),
            method: req.method.clone(),
            path: req.path.clone(),
            params,
            user,
            headers: req.headers.clone(),
        };
        let outcome = self.invoke(&route, &ctx)?;

        // Render
        self.render(req, &spec, outcome)
    }

    fn authenticate(&self, req: &ApiRequest, spec: &EndpointSpec) -> Result<Option<String>, Failure> {
        let sec_req = SecurityRequest {
            headers: &req.headers,
            query: &req.query,
            cookies: &req.cookies,
        };
        match self.identity.identify(&sec_req) {
            AuthOutcome::Authenticated(user) => Ok(Some(user)),
            AuthOutcome::Anonymous if spec.auth_required => {
                Err(Failure::at(Stage::Auth, PipelineError::Unauthorized))
            }
            AuthOutcome::Anonymous => Ok(None),
            AuthOutcome::Rejected(reason) if spec.auth_required => {
                warn!(
                    request_id = %req.request_id,
                    endpoint = %spec.name,
                    reason = %reason,
                    "Credential rejected"
                );
                Err(Failure::at(Stage::Auth, PipelineError::Forbidden { reason }))
            }
            AuthOutcome::Rejected(reason) => {
                debug!(
                    request_id = %req.request_id,
                    endpoint = %spec.name,
                    reason = %reason,
                    "Credential rejected on public endpoint, continuing as anonymous"
                );
                Ok(None)
            }
        }
    }

    fn throttle(&self, req: &ApiRequest, spec: &EndpointSpec, user: Option<&str>) -> Result<(), Failure> {
        let scope = if user.is_some() { Scope::User } else { Scope::Anon };
        let Some(rate) = spec.rate_for(scope) else {
            return Ok(());
        };
        let client_key = client_key(req, user, self.trust_forwarded);
        match self.throttle.check(&spec.name, scope, &client_key, rate) {
            ThrottleDecision::Allowed { remaining } => {
                debug!(
                    request_id = %req.request_id,
                    endpoint = %spec.name,
                    scope = %scope,
                    remaining,
                    "Throttle check passed"
                );
                Ok(())
            }
            ThrottleDecision::Denied { retry_after } => {
                info!(
                    request_id = %req.request_id,
                    endpoint = %spec.name,
                    scope = %scope,
                    client = %client_key,
                    rate = %rate,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Request throttled"
                );
                Err(Failure::at(
                    Stage::Throttle,
                    PipelineError::TooManyRequests { retry_after },
                ))
            }
        }
    }

    fn invoke(&self, route: &RouteMatch, ctx: &HandlerContext) -> Result<HandlerOutcome, Failure> {
        let spec = &ctx.endpoint;
        let handler = Arc::clone(&route.endpoint.handler);
        info!(
            request_id = %ctx.request_id,
            endpoint = %spec.name,
            handler_ref = %spec.handler_ref,
            user = ?ctx.user,
            "Handler execution start"
        );
        let started = Instant::now();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler.call(ctx)));
        let execution_time_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(outcome)) => {
                info!(
                    request_id = %ctx.request_id,
                    endpoint = %spec.name,
                    execution_time_ms,
                    "Handler execution complete"
                );
                Ok(outcome)
            }
            Ok(Err(e)) => {
                info!(
                    request_id = %ctx.request_id,
                    endpoint = %spec.name,
                    execution_time_ms,
                    error = %e,
                    "Handler returned an error"
                );
                Err(Failure::at(Stage::Invoke, handler_error(e)))
            }
            Err(panic) => {
                let panic_message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                error!(
                    request_id = %ctx.request_id,
                    endpoint = %spec.name,
                    handler_ref = %spec.handler_ref,
                    panic_message = %panic_message,
                    "Handler panicked - CRITICAL"
                );
                Err(Failure::at(
                    Stage::Invoke,
                    PipelineError::Internal {
                        reason: "handler failed".to_string(),
                    },
                ))
            }
        }
    }

    fn render(&self, req: &ApiRequest, spec: &EndpointSpec, outcome: HandlerOutcome) -> Result<ApiResponse, Failure> {
        let status = outcome.status.unwrap_or(spec.status_code);
        if !spec.documents_status(status) && !PIPELINE_STATUSES.contains(&status) {
            error!(
                request_id = %req.request_id,
                endpoint = %spec.name,
                status,
                "Handler returned an undocumented status"
            );
            return Err(Failure::at(
                Stage::Render,
                PipelineError::Internal {
                    reason: format!("undocumented status {status}"),
                },
            ));
        }

        let mut response = match outcome.body {
            Payload::Json(value) => {
                let kind = negotiate(spec, req.get_header("accept"), req.get_query("format"));
                debug!(
                    request_id = %req.request_id,
                    endpoint = %spec.name,
                    renderer = ?kind,
                    "Renderer negotiated"
                );
                self.renderer.render(spec, kind, status, &value)
            }
            Payload::Binary {
                content_type,
                bytes,
                filename,
            } => {
                let mut resp = ApiResponse::new(status, content_type, bytes);
                if let Some(name) = filename {
                    resp.set_header(
                        "Content-Disposition",
                        format!("attachment; filename=\"{}\"", name.replace('"', "")),
                    );
                }
                resp
            }
        };
        for (name, value) in outcome.headers {
            if name.eq_ignore_ascii_case("content-type") {
                response.content_type = value;
            } else {
                response.set_header(&name, value);
            }
        }
        Ok(response)
    }

    /// `OPTIONS` metadata for a registered path and the endpoint it describes,
    /// `None` when nothing lives there
    fn options_response(&self, path: &str) -> Option<(Arc<EndpointSpec>, ApiResponse)> {
        let allowed = self.registry.allowed_methods(path);
        if allowed.is_empty() {
            return None;
        }
        // Describe the GET endpoint if there is one, else the first registered
        let endpoints: Vec<_> = self.registry.endpoints_at(path).collect();
        let primary = endpoints
            .iter()
            .find(|e| e.spec.method == Method::GET)
            .or_else(|| endpoints.first())?;
        let spec = &primary.spec;

        let mut methods: Vec<String> = allowed.iter().map(|m| m.to_string()).collect();
        methods.push(Method::OPTIONS.to_string());

        let mut parses = vec!["application/json"];
        if endpoints.iter().any(|e| e.spec.file_params().next().is_some()) {
            parses.push("application/octet-stream");
        }
        let renders: Vec<&str> = spec.renderers.iter().map(|r| r.media_type()).collect();

        let body = json!({
            "name": spec.name,
            "description": spec.description,
            "renders": renders,
            "parses": parses,
            "allowed_methods": methods,
        });
        let mut resp = ApiResponse::json(200, &body);
        resp.set_header("Allow", methods.join(", "));
        Some((Arc::clone(spec), resp))
    }
}

/// Throttle key for a caller.
///
/// The user id when authenticated. Anonymous callers are keyed by the first
/// `X-Forwarded-For` hop or `X-Real-IP` when forwarding headers are trusted,
/// then by the peer address, then by one shared key.
fn client_key(req: &ApiRequest, user: Option<&str>, trust_forwarded: bool) -> String {
    if let Some(user) = user {
        return user.to_string();
    }
    let forwarded = trust_forwarded
        .then(|| {
            req.get_header("x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .or_else(|| req.get_header("x-real-ip").map(str::trim).filter(|v| !v.is_empty()))
        })
        .flatten();
    match (forwarded, req.peer_addr) {
        (Some(hop), _) => hop.to_string(),
        (None, Some(addr)) => addr.to_string(),
        (None, None) => ANONYMOUS_CLIENT_KEY.to_string(),
    }
}

/// Query string, then JSON body fields, then path segments; later sources win
fn collect_params(req: &ApiRequest, route: &RouteMatch) -> RawParams {
    let spec = route.spec();
    let mut raw = RawParams::new();
    for (name, value) in &req.query {
        raw.insert(name.to_string(), Value::String(value.clone()));
    }
    match &req.body {
        RequestBody::Json(Value::Object(fields)) => {
            for (name, value) in fields {
                raw.insert(name.clone(), value.clone());
            }
        }
        RequestBody::Json(other) => {
            debug!(
                request_id = %req.request_id,
                endpoint = %spec.name,
                kind = json_kind(other),
                "Ignoring non-object JSON body"
            );
        }
        RequestBody::Bytes(bytes) if !bytes.is_empty() => {
            // A raw body is the upload for the endpoint's first file parameter
            match spec.file_params().next() {
                Some(name) => raw.insert_file(
                    name,
                    UploadedFile {
                        filename: req.get_header("x-filename").map(str::to_string),
                        content_type: req.get_header("content-type").map(str::to_string),
                        data: bytes.clone(),
                    },
                ),
                None => debug!(
                    request_id = %req.request_id,
                    endpoint = %spec.name,
                    size = bytes.len(),
                    "Ignoring raw body on endpoint without file parameters"
                ),
            }
        }
        RequestBody::Bytes(_) | RequestBody::Empty => {}
    }
    for (name, value) in &route.path_params {
        raw.insert(name.to_string(), Value::String(value.clone()));
    }
    raw
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn validation_error(e: ValidationError) -> PipelineError {
    match e {
        ValidationError::PayloadTooLarge { ref name, limit, .. } => PipelineError::PayloadTooLarge {
            field: Some(name.clone()),
            limit,
        },
        other => PipelineError::BadRequest {
            field: Some(other.field().to_string()),
            reason: other.to_string(),
        },
    }
}

fn handler_error(e: HandlerError) -> PipelineError {
    match e {
        HandlerError::NotFound(detail) => PipelineError::NotFound { detail },
        HandlerError::BadRequest(reason) => PipelineError::BadRequest {
            field: None,
            reason,
        },
        HandlerError::Forbidden(reason) => PipelineError::Forbidden { reason },
        HandlerError::Internal(reason) => PipelineError::Internal { reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_key_precedence() {
        let req = ApiRequest::new(Method::GET, "/x").header("X-Forwarded-For", "10.0.0.1, 10.0.0.2");
        assert_eq!(client_key(&req, Some("alice"), true), "alice");
        assert_eq!(client_key(&req, None, true), "10.0.0.1");
        let bare = ApiRequest::new(Method::GET, "/x");
        assert_eq!(client_key(&bare, None, true), ANONYMOUS_CLIENT_KEY);
    }

    #[test]
    fn test_client_key_ignores_forwarding_when_untrusted() {
        let peer: std::net::IpAddr = "192.0.2.10".parse().unwrap();
        let req = ApiRequest::new(Method::GET, "/x")
            .header("X-Forwarded-For", "10.0.0.1")
            .peer_addr(peer);
        assert_eq!(client_key(&req, None, false), "192.0.2.10");
        assert_eq!(client_key(&req, None, true), "10.0.0.1");

        let spoofed = ApiRequest::new(Method::GET, "/x").header("X-Real-IP", "10.9.9.9");
        assert_eq!(client_key(&spoofed, None, false), ANONYMOUS_CLIENT_KEY);
    }

    #[test]
    fn test_stage_order() {
        assert!(Stage::Auth < Stage::Throttle);
        assert!(Stage::Throttle < Stage::Validate);
        assert!(Stage::Validate < Stage::Invoke);
        assert_eq!(Stage::Render.to_string(), "render");
    }

    #[test]
    fn test_validation_error_mapping() {
        let e = validation_error(ValidationError::PayloadTooLarge {
            name: "file".into(),
            limit: 1,
            actual: 2,
        });
        assert_eq!(e.status(), 413);
        let e = validation_error(ValidationError::MissingParam("q".into()));
        assert_eq!(e.status(), 400);
        assert_eq!(e.to_body()["field"], "q");
    }
}
