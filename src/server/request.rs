use crate::dispatcher::{ApiRequest, HeaderVec, ParamVec, RequestBody};
use crate::ids::{RequestId, REQUEST_ID_HEADER};
use http::Method;
use may_minihttp::Request;
use serde_json::{Map, Value};
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use tracing::debug;

/// Why a raw request could not become an [`ApiRequest`]
#[derive(Debug)]
pub enum RequestParseError {
    /// Body (declared or actual) bigger than the server's ceiling
    BodyTooLarge { limit: u64 },
    InvalidMethod(String),
    /// `Content-Type: application/json` with a body that does not parse
    MalformedJson(String),
    Io(io::Error),
}

impl fmt::Display for RequestParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestParseError::BodyTooLarge { limit } => {
                write!(f, "request body exceeds {limit} bytes")
            }
            RequestParseError::InvalidMethod(m) => write!(f, "invalid method '{m}'"),
            RequestParseError::MalformedJson(e) => write!(f, "malformed JSON body: {e}"),
            RequestParseError::Io(e) => write!(f, "failed to read request body: {e}"),
        }
    }
}

impl std::error::Error for RequestParseError {}

/// Split a `Cookie` header into name/value pairs
pub fn parse_cookies(header: &str) -> HeaderVec {
    header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim().to_string();
            Some((Arc::from(name), value))
        })
        .collect()
}

/// URL-decoded query parameters of a request target, in order of appearance
pub fn parse_query_params(target: &str) -> ParamVec {
    match target.split_once('?') {
        Some((_, query)) => url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
            .collect(),
        None => ParamVec::new(),
    }
}

/// Classify a body by its content type
///
/// JSON and url-encoded forms become [`RequestBody::Json`]; everything else is
/// kept as bytes for file parameters.
pub fn classify_body(
    content_type: Option<&str>,
    bytes: Vec<u8>,
) -> Result<RequestBody, RequestParseError> {
    if bytes.is_empty() {
        return Ok(RequestBody::Empty);
    }
    let media = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if media == "application/json" || media.ends_with("+json") {
        return serde_json::from_slice(&bytes)
            .map(RequestBody::Json)
            .map_err(|e| RequestParseError::MalformedJson(e.to_string()));
    }
    if media == "application/x-www-form-urlencoded" {
        let mut form = Map::new();
        for (k, v) in url::form_urlencoded::parse(&bytes) {
            form.insert(k.into_owned(), Value::String(v.into_owned()));
        }
        return Ok(RequestBody::Json(Value::Object(form)));
    }
    if media.is_empty() {
        // Untyped bodies that happen to be JSON objects are treated as JSON
        if let Ok(value @ Value::Object(_)) = serde_json::from_slice::<Value>(&bytes) {
            return Ok(RequestBody::Json(value));
        }
    }
    Ok(RequestBody::Bytes(bytes))
}

/// Convert a `may_minihttp` request into an [`ApiRequest`]
///
/// The body is read last and never beyond `max_body_bytes`.
pub fn parse_request(req: Request, max_body_bytes: u64) -> Result<ApiRequest, RequestParseError> {
    let method = Method::from_bytes(req.method().as_bytes())
        .map_err(|_| RequestParseError::InvalidMethod(req.method().to_string()))?;
    let target = req.path();
    let path = target.split('?').next().unwrap_or("/").to_string();
    let query = parse_query_params(target);

    let mut headers = HeaderVec::new();
    let mut cookies = HeaderVec::new();
    for h in req.headers().iter() {
        let value = String::from_utf8_lossy(h.value).into_owned();
        if h.name.eq_ignore_ascii_case("cookie") {
            cookies.extend(parse_cookies(&value));
        }
        headers.push((Arc::from(h.name.to_ascii_lowercase().as_str()), value));
    }

    let find = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };
    let request_id = RequestId::from_header_or_new(find(REQUEST_ID_HEADER));
    let content_type = find("content-type").map(str::to_string);
    if let Some(declared) = find("content-length").and_then(|v| v.trim().parse::<u64>().ok()) {
        if declared > max_body_bytes {
            return Err(RequestParseError::BodyTooLarge {
                limit: max_body_bytes,
            });
        }
    }

    debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        header_count = headers.len(),
        query_count = query.len(),
        cookie_count = cookies.len(),
        "HTTP request parsed"
    );

    let mut bytes = Vec::new();
    req.body()
        .take(max_body_bytes.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(RequestParseError::Io)?;
    if bytes.len() as u64 > max_body_bytes {
        return Err(RequestParseError::BodyTooLarge {
            limit: max_body_bytes,
        });
    }
    let body = classify_body(content_type.as_deref(), bytes)?;

    Ok(ApiRequest {
        request_id,
        method,
        path,
        headers,
        query,
        cookies,
        body,
        // may_minihttp does not hand the connection's peer address to services
        peer_addr: None,
    })
}
