use crate::ids::RequestId;
use http::Method;
use serde_json::Value;
use smallvec::SmallVec;
use std::net::IpAddr;
use std::sync::Arc;

/// Maximum inline headers/cookies before heap allocation
pub const MAX_INLINE_HEADERS: usize = 16;

/// Maximum inline path/query parameters before heap allocation
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated header/cookie storage for the hot path
///
/// Names are `Arc<str>` since the same few header names repeat on every request.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Stack-allocated path/query parameter storage
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Body of an incoming request as far as the transport could classify it
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Parsed `application/json` (or JSON-looking) body
    Json(Value),
    /// Anything else, kept as raw bytes
    Bytes(Vec<u8>),
}

impl RequestBody {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            RequestBody::Empty => true,
            RequestBody::Bytes(b) => b.is_empty(),
            RequestBody::Json(_) => false,
        }
    }
}

/// Transport-neutral request handed to the dispatcher
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub request_id: RequestId,
    pub method: Method,
    /// Raw path without query string
    pub path: String,
    pub headers: HeaderVec,
    pub query: ParamVec,
    pub cookies: HeaderVec,
    pub body: RequestBody,
    /// Address of the connected peer, when the transport knows it
    pub peer_addr: Option<IpAddr>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            method,
            path: path.into(),
            headers: HeaderVec::new(),
            query: ParamVec::new(),
            cookies: HeaderVec::new(),
            body: RequestBody::Empty,
            peer_addr: None,
        }
    }

    /// Builder: record the peer address
    #[must_use]
    pub fn peer_addr(mut self, addr: IpAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    /// Builder: append a header
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((Arc::from(name), value.into()));
        self
    }

    /// Builder: append a query parameter
    #[must_use]
    pub fn query_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((Arc::from(name), value.into()));
        self
    }

    /// Builder: set a JSON body
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Builder: set a raw body
    #[must_use]
    pub fn bytes(mut self, body: Vec<u8>) -> Self {
        self.body = RequestBody::Bytes(body);
        self
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get a query parameter by name, last occurrence wins
    #[inline]
    #[must_use]
    pub fn get_query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Fully rendered response, ready for the wire
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderVec,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, content_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: HeaderVec::new(),
            content_type: content_type.into(),
            body,
        }
    }

    /// JSON response; serialisation of a `Value` cannot fail
    #[must_use]
    pub fn json(status: u16, body: &Value) -> Self {
        let bytes = serde_json::to_vec(body).unwrap_or_default();
        Self::new(status, "application/json", bytes)
    }

    /// Get a header by name
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }

    /// Body parsed back as JSON, for tests and middleware that inspect it
    #[must_use]
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}
