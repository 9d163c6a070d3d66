use crate::dispatcher::HeaderVec;
use crate::ids::RequestId;
use crate::spec::EndpointSpec;
use crate::validator::ValidatedParams;
use http::Method;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Everything a handler may look at for one request
///
/// Handlers see parameters only after the contract has been applied, so a
/// required parameter is always present and typed as declared.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub request_id: RequestId,
    pub endpoint: Arc<EndpointSpec>,
    pub method: Method,
    /// Path as requested (not the template)
    pub path: String,
    pub params: ValidatedParams,
    /// Authenticated user id, `None` for anonymous callers
    pub user: Option<String>,
    pub headers: HeaderVec,
}

impl HandlerContext {
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Get a header by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Handler result body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Structured data, rendered through content negotiation
    Json(Value),
    /// Opaque bytes (downloads); sent as-is, negotiation is skipped
    Binary {
        content_type: String,
        bytes: Vec<u8>,
        filename: Option<String>,
    },
}

/// Successful handler result
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutcome {
    pub body: Payload,
    /// Override of the endpoint's default status; must be documented
    pub status: Option<u16>,
    pub headers: HeaderVec,
}

impl HandlerOutcome {
    #[must_use]
    pub fn json(body: Value) -> Self {
        Self {
            body: Payload::Json(body),
            status: None,
            headers: HeaderVec::new(),
        }
    }

    #[must_use]
    pub fn binary(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            body: Payload::Binary {
                content_type: content_type.into(),
                bytes,
                filename: None,
            },
            status: None,
            headers: HeaderVec::new(),
        }
    }

    /// Builder: attachment name for a binary payload
    #[must_use]
    pub fn with_filename(mut self, name: impl Into<String>) -> Self {
        if let Payload::Binary { filename, .. } = &mut self.body {
            *filename = Some(name.into());
        }
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((Arc::from(name), value.into()));
        self
    }
}

/// Conditions a handler can signal; each maps to a fixed status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// 404
    NotFound(String),
    /// 400
    BadRequest(String),
    /// 403
    Forbidden(String),
    /// 500
    Internal(String),
}

impl HandlerError {
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            HandlerError::NotFound(_) => 404,
            HandlerError::BadRequest(_) => 400,
            HandlerError::Forbidden(_) => 403,
            HandlerError::Internal(_) => 500,
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::NotFound(m) => write!(f, "not found: {m}"),
            HandlerError::BadRequest(m) => write!(f, "bad request: {m}"),
            HandlerError::Forbidden(m) => write!(f, "forbidden: {m}"),
            HandlerError::Internal(m) => write!(f, "internal error: {m}"),
        }
    }
}

impl std::error::Error for HandlerError {}

/// An invocable endpoint implementation
///
/// Implemented for every `Fn(&HandlerContext) -> Result<HandlerOutcome, HandlerError>`
/// that is `Send + Sync`, so plain functions and closures register directly.
pub trait Handler: Send + Sync {
    fn call(&self, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&HandlerContext) -> Result<HandlerOutcome, HandlerError> + Send + Sync,
{
    fn call(&self, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        self(ctx)
    }
}
