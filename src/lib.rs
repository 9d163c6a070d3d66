//! # autoroute
//!
//! **autoroute** serves HTTP endpoints that are declared in YAML rather than
//! wired in code. Each endpoint names a path, a method, a handler reference and
//! its policies (authentication, throttle rates, parameter contract, renderers,
//! documented responses); every request then runs the same enforced pipeline
//! on the `may` coroutine runtime.
//!
//! ## Architecture
//!
//! - **[`spec`]** - YAML endpoint definitions parsed into typed [`EndpointSpec`]s
//! - **[`handlers`]** - the [`Handler`] trait and the [`HandlerTable`] references resolve against
//! - **[`registry`]** - immutable (path, method) → resolved endpoint index
//! - **[`throttle`]** - fixed-window counters per (endpoint, scope, client)
//! - **[`validator`]** - required/optional parameters, defaults, coercion, file ceilings
//! - **[`security`]** - identity providers (API key, bearer token, chains)
//! - **[`renderer`]** - JSON and browsable HTML rendering with negotiation
//! - **[`dispatcher`]** - the ordered request pipeline
//! - **[`middleware`]** - tracing and metrics observers
//! - **[`server`]** - `may_minihttp` transport plus `/health`, `/metrics`, `/endpoints`
//! - **[`cli`]** - the `autoroute` binary's `serve`, `check` and `routes`
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as AppService<br/>(may_minihttp)
//!     participant Dispatcher
//!     participant Registry
//!     participant Identity as IdentityProvider
//!     participant Throttle as ThrottleStore
//!     participant Validator
//!     participant Handler
//!     participant Renderer
//!
//!     Client->>Server: HTTP request
//!     Server->>Dispatcher: ApiRequest
//!     Dispatcher->>Registry: lookup(method, path)
//!     alt no endpoint
//!         Dispatcher-->>Client: 404
//!     end
//!     Dispatcher->>Identity: identify(headers, query, cookies)
//!     alt auth required and anonymous / rejected
//!         Dispatcher-->>Client: 401 / 403
//!     end
//!     Dispatcher->>Throttle: check(endpoint, scope, client)
//!     alt over the limit
//!         Dispatcher-->>Client: 429 + Retry-After
//!     end
//!     Dispatcher->>Validator: validate(spec, raw params)
//!     alt contract violated
//!         Dispatcher-->>Client: 400 / 413
//!     end
//!     Dispatcher->>Handler: call(context)
//!     Handler-->>Dispatcher: HandlerOutcome
//!     Dispatcher->>Renderer: render(negotiated kind)
//!     Renderer-->>Client: 200 / 201 body
//! ```
//!
//! ### Endpoint Definition
//!
//! ```yaml
//! create_report:
//!   path: /reports
//!   method: POST
//!   handler: reports.create
//!   status_code: 201
//!   auth_required: true
//!   throttle_rates:
//!     anon: 10/minute
//!     user: 100/hour
//!   required_params: [title]
//!   optional_params:
//!     format: pdf
//!   params_description:
//!     title: {type: string, description: Report title}
//!   responses:
//!     201: Report created
//!   renderers: [json, browsable]
//! ```
//!
//! ### Embedding
//!
//! ```rust,ignore
//! use autoroute::cli::build_service;
//! use autoroute::handlers::{HandlerContext, HandlerError, HandlerOutcome, HandlerTable};
//! use autoroute::server::HttpServer;
//! use autoroute::{Registry, ServiceConfig};
//!
//! let mut handlers = HandlerTable::new();
//! handlers.register("reports.create", |ctx: &HandlerContext| {
//!     Ok::<_, HandlerError>(HandlerOutcome::json(serde_json::json!({"title": ctx.param("title")})))
//! });
//! let specs = autoroute::spec::load_endpoint_dir("config/endpoints")?;
//! let registry = Registry::build(specs, &handlers)?;
//! let handle = HttpServer(build_service(registry, &ServiceConfig::default())).start("0.0.0.0:8080")?;
//! handle.join().ok();
//! ```

pub mod cli;
pub mod dispatcher;
pub mod echo;
pub mod handlers;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod registry;
pub mod renderer;
pub mod runtime_config;
pub mod security;
pub mod server;
pub mod spec;
pub mod throttle;
pub mod validator;

pub use dispatcher::{ApiRequest, ApiResponse, Dispatcher, PipelineError, Stage};
pub use handlers::{Handler, HandlerContext, HandlerError, HandlerOutcome, HandlerTable, Payload};
pub use ids::RequestId;
pub use registry::{Registry, RegistryError};
pub use runtime_config::{RuntimeConfig, ServiceConfig};
pub use security::{AuthOutcome, IdentityProvider, SecurityRequest};
pub use spec::{load_endpoint_dir, load_endpoints, ConfigError, EndpointSpec};
