//! # Dispatcher Module
//!
//! The dispatcher turns a transport-neutral [`ApiRequest`] into an
//! [`ApiResponse`] by running it through the ordered [`Stage`]s of the
//! request pipeline against an immutable [`Registry`](crate::registry::Registry).
//!
//! ## Collaborators
//!
//! - an [`IdentityProvider`](crate::security::IdentityProvider) decides who is calling
//! - a [`ThrottleStore`](crate::throttle::ThrottleStore) charges rate limits
//! - the [`validator`](crate::validator) applies the parameter contract
//! - the resolved [`Handler`](crate::handlers::Handler) produces the payload
//! - the [`Renderer`](crate::renderer::Renderer) produces the body
//!
//! ## Error Handling
//!
//! Every stage failure becomes a [`PipelineError`] with a fixed status and a
//! JSON body `{"error": <code>, "detail": <message>, ...}`:
//!
//! | condition | status | code |
//! |---|---|---|
//! | no endpoint | 404 | `not_found` |
//! | auth required, no credential | 401 | `unauthorized` |
//! | credential rejected | 403 | `forbidden` |
//! | rate exceeded | 429 | `too_many_requests` |
//! | parameter contract | 400 | `bad_request` |
//! | file too large | 413 | `payload_too_large` |
//! | handler panic or failure | 500 | `internal_error` |
//!
//! Handler panics are caught with `catch_unwind`; the coroutine serving the
//! connection survives and keeps accepting requests.
//!
//! ```rust,ignore
//! use autoroute::dispatcher::{ApiRequest, Dispatcher};
//! use http::Method;
//!
//! let dispatcher = Dispatcher::new(registry);
//! let resp = dispatcher.dispatch(ApiRequest::new(Method::GET, "/ping"));
//! assert_eq!(resp.status, 200);
//! ```

mod core;
mod error;
mod types;

pub use core::{Dispatcher, PipelineOutcome, Stage, ANONYMOUS_CLIENT_KEY};
pub use error::{PipelineError, PIPELINE_STATUSES};
pub use types::{
    ApiRequest, ApiResponse, HeaderVec, ParamVec, RequestBody, MAX_INLINE_HEADERS,
    MAX_INLINE_PARAMS,
};
