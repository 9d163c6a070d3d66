use super::types::ApiResponse;
use serde_json::{json, Map, Value};
use std::fmt;
use std::time::Duration;

/// Statuses the pipeline itself may produce, on top of each endpoint's documented ones
pub const PIPELINE_STATUSES: [u16; 7] = [400, 401, 403, 404, 413, 429, 500];

/// A request that ends before (or instead of) a successful handler result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    NotFound { detail: String },
    /// Auth required, no credential
    Unauthorized,
    /// Credential refused, or the handler denied access
    Forbidden { reason: String },
    TooManyRequests { retry_after: Duration },
    BadRequest { field: Option<String>, reason: String },
    PayloadTooLarge { field: Option<String>, limit: u64 },
    Internal { reason: String },
}

impl PipelineError {
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            PipelineError::NotFound { .. } => 404,
            PipelineError::Unauthorized => 401,
            PipelineError::Forbidden { .. } => 403,
            PipelineError::TooManyRequests { .. } => 429,
            PipelineError::BadRequest { .. } => 400,
            PipelineError::PayloadTooLarge { .. } => 413,
            PipelineError::Internal { .. } => 500,
        }
    }

    /// Machine-readable reason code carried in the `error` field
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::NotFound { .. } => "not_found",
            PipelineError::Unauthorized => "unauthorized",
            PipelineError::Forbidden { .. } => "forbidden",
            PipelineError::TooManyRequests { .. } => "too_many_requests",
            PipelineError::BadRequest { .. } => "bad_request",
            PipelineError::PayloadTooLarge { .. } => "payload_too_large",
            PipelineError::Internal { .. } => "internal_error",
        }
    }

    /// Whole seconds until retry, rounded up and never zero
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            PipelineError::TooManyRequests { retry_after } => {
                let ms = retry_after.as_millis() as u64;
                Some(ms.div_ceil(1000).max(1))
            }
            _ => None,
        }
    }

    /// JSON error body; the same shape for every endpoint
    #[must_use]
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("error".into(), json!(self.code()));
        body.insert("detail".into(), json!(self.to_string()));
        match self {
            PipelineError::BadRequest {
                field: Some(field), ..
            }
            | PipelineError::PayloadTooLarge {
                field: Some(field), ..
            } => {
                body.insert("field".into(), json!(field));
            }
            _ => {}
        }
        if let PipelineError::PayloadTooLarge { limit, .. } = self {
            body.insert("limit".into(), json!(limit));
        }
        if let Some(secs) = self.retry_after_secs() {
            body.insert("retry_after".into(), json!(secs));
        }
        Value::Object(body)
    }

    #[must_use]
    pub fn to_response(&self) -> ApiResponse {
        let mut resp = ApiResponse::json(self.status(), &self.to_body());
        if let Some(secs) = self.retry_after_secs() {
            resp.set_header("Retry-After", secs.to_string());
        }
        resp
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::NotFound { detail } => write!(f, "{detail}"),
            PipelineError::Unauthorized => write!(f, "authentication credentials were not provided"),
            PipelineError::Forbidden { reason } => {
                write!(f, "you do not have permission to perform this action: {reason}")
            }
            PipelineError::TooManyRequests { .. } => match self.retry_after_secs() {
                Some(secs) => write!(f, "request was throttled, retry in {secs} seconds"),
                None => write!(f, "request was throttled"),
            },
            PipelineError::BadRequest { reason, .. } => write!(f, "{reason}"),
            PipelineError::PayloadTooLarge { field, limit } => match field {
                Some(field) => write!(f, "'{field}' exceeds the {limit} byte limit"),
                None => write!(f, "request body exceeds the {limit} byte limit"),
            },
            PipelineError::Internal { reason } => write!(f, "internal server error: {reason}"),
        }
    }
}

impl std::error::Error for PipelineError {}
