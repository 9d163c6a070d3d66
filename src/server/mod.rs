//! HTTP transport on `may_minihttp`.
//!
//! [`AppService`] parses each raw request into an
//! [`ApiRequest`](crate::dispatcher::ApiRequest), serves the built-in
//! `/health`, `/metrics` and `/endpoints` routes, and hands everything else
//! to the [`Dispatcher`](crate::dispatcher::Dispatcher).

pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{classify_body, parse_cookies, parse_query_params, parse_request, RequestParseError};
pub use response::{status_reason, write_api_response};
pub use service::{endpoints_endpoint, health_endpoint, metrics_endpoint, AppService};
