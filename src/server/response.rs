use crate::dispatcher::ApiResponse;
use crate::ids::REQUEST_ID_HEADER;
use dashmap::DashMap;
use may_minihttp::Response;
use std::sync::OnceLock;
use tracing::warn;

/// Distinct general header lines kept for the life of the process
pub const MAX_INTERNED_HEADERS: usize = 4096;

/// Distinct `Content-Type` lines kept; further types fall back to octet-stream
pub const MAX_INTERNED_CONTENT_TYPES: usize = 1024;

/// Largest `Retry-After` written; the longest throttle period is a day
pub const MAX_RETRY_AFTER_SECS: u64 = 86_400;

/// Header slots in a `may_minihttp` response
pub const MAX_WIRE_HEADERS: usize = 16;

const FALLBACK_CONTENT_TYPE: &str = "Content-Type: application/octet-stream";
const FALLBACK_DISPOSITION: &str = "Content-Disposition: attachment";

/// Bounded set of leaked lines
struct LineCache {
    lines: DashMap<String, &'static str>,
    cap: usize,
}

impl LineCache {
    fn new(cap: usize) -> Self {
        Self {
            lines: DashMap::new(),
            cap,
        }
    }

    fn intern(&self, line: String) -> Option<&'static str> {
        if let Some(found) = self.lines.get(&line) {
            return Some(*found);
        }
        if self.lines.len() >= self.cap {
            return None;
        }
        let leaked: &'static str = Box::leak(line.clone().into_boxed_str());
        Some(*self.lines.entry(line).or_insert(leaked))
    }
}

/// `may_minihttp` only accepts `&'static str` header lines; each distinct
/// line is leaked once and reused.
///
/// General headers share one capped cache and are dropped once it is full.
/// `Content-Type` and `Retry-After` have their own tables so they are always
/// written, and `Content-Disposition` degrades to a bare `attachment`.
struct HeaderInterner {
    general: LineCache,
    content_types: LineCache,
    retry_after: DashMap<u64, &'static str>,
}

impl HeaderInterner {
    fn new(general: usize, content_types: usize) -> Self {
        Self {
            general: LineCache::new(general),
            content_types: LineCache::new(content_types),
            retry_after: DashMap::new(),
        }
    }

    fn global() -> &'static HeaderInterner {
        static INTERNER: OnceLock<HeaderInterner> = OnceLock::new();
        INTERNER.get_or_init(|| HeaderInterner::new(MAX_INTERNED_HEADERS, MAX_INTERNED_CONTENT_TYPES))
    }

    fn retry_after_line(&self, secs: u64) -> &'static str {
        let secs = secs.min(MAX_RETRY_AFTER_SECS);
        *self
            .retry_after
            .entry(secs)
            .or_insert_with(|| Box::leak(format!("Retry-After: {secs}").into_boxed_str()))
    }

    fn line(&self, line: String) -> Option<&'static str> {
        let (name, value) = line.split_once(": ").unwrap_or((line.as_str(), ""));
        if name.eq_ignore_ascii_case("content-type") {
            return Some(self.content_types.intern(line.clone()).unwrap_or_else(|| {
                warn!(header = %line, "Content type cache full; sending octet-stream");
                FALLBACK_CONTENT_TYPE
            }));
        }
        if name.eq_ignore_ascii_case("retry-after") {
            if let Ok(secs) = value.trim().parse::<u64>() {
                return Some(self.retry_after_line(secs));
            }
        }
        let disposition = name.eq_ignore_ascii_case("content-disposition");
        match self.general.intern(line.clone()) {
            Some(found) => Some(found),
            None if disposition => Some(FALLBACK_DISPOSITION),
            None => {
                warn!(header = %line, "Header line cache full; header dropped");
                None
            }
        }
    }
}

/// Canonical reason phrase for the statuses this server emits
pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => match status / 100 {
            1 => "Informational",
            2 => "Success",
            3 => "Redirection",
            4 => "Client Error",
            _ => "Server Error",
        },
    }
}

/// Header lines as `Name: value`, content type first
///
/// The request id is per-request unique and stays out of the wire headers.
pub fn header_lines(resp: &ApiResponse) -> Vec<String> {
    let mut lines = Vec::with_capacity(resp.headers.len() + 1);
    lines.push(format!("Content-Type: {}", resp.content_type));
    // Retry-After goes right after the content type so the slot cap never cuts it
    let retry_first = resp
        .headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
        .chain(resp.headers.iter().filter(|(name, _)| !name.eq_ignore_ascii_case("retry-after")));
    for (name, value) in retry_first {
        if name.eq_ignore_ascii_case("content-type") || name.eq_ignore_ascii_case(REQUEST_ID_HEADER) {
            continue;
        }
        // CR/LF in a value would split the header block
        if value.contains(['\r', '\n']) {
            warn!(header = %name, "Header value contains line breaks; dropped");
            continue;
        }
        lines.push(format!("{name}: {value}"));
    }
    lines
}

/// Interned lines for a response, at most [`MAX_WIRE_HEADERS`]
fn wire_lines(interner: &HeaderInterner, resp: &ApiResponse) -> Vec<&'static str> {
    let mut lines: Vec<&'static str> = header_lines(resp)
        .into_iter()
        .filter_map(|line| interner.line(line))
        .collect();
    if lines.len() > MAX_WIRE_HEADERS {
        warn!(
            headers = lines.len(),
            limit = MAX_WIRE_HEADERS,
            "Too many response headers; extra headers dropped"
        );
        lines.truncate(MAX_WIRE_HEADERS);
    }
    lines
}

/// Write a rendered response onto the wire
pub fn write_api_response(res: &mut Response, resp: ApiResponse) {
    res.status_code(resp.status as usize, status_reason(resp.status));
    for line in wire_lines(HeaderInterner::global(), &resp) {
        res.header(line);
    }
    res.body_vec(resp.body);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reason() {
        assert_eq!(status_reason(200), "OK");
        assert_eq!(status_reason(413), "Payload Too Large");
        assert_eq!(status_reason(429), "Too Many Requests");
        assert_eq!(status_reason(418), "Client Error");
    }

    #[test]
    fn test_header_lines() {
        let mut resp = ApiResponse::new(429, "application/json", Vec::new());
        resp.set_header("Retry-After", "12".to_string());
        resp.set_header(REQUEST_ID_HEADER, "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string());
        resp.set_header("X-Bad", "a\r\nInjected: 1".to_string());
        let lines = header_lines(&resp);
        assert_eq!(lines, vec!["Content-Type: application/json", "Retry-After: 12"]);
    }

    #[test]
    fn test_intern_reuses_lines() {
        let interner = HeaderInterner::new(8, 8);
        let a = interner.line("Allow: GET, POST".to_string()).unwrap();
        let b = interner.line("Allow: GET, POST".to_string()).unwrap();
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn test_essential_headers_survive_a_full_cache() {
        let interner = HeaderInterner::new(4, 1);
        for i in 0..4 {
            assert!(interner
                .line(format!("Content-Disposition: attachment; filename=\"r{i}.pdf\""))
                .is_some());
        }
        assert_eq!(interner.line("X-Trace: 1".to_string()), None);
        assert_eq!(
            interner.line("Content-Disposition: attachment; filename=\"late.pdf\"".to_string()),
            Some(FALLBACK_DISPOSITION)
        );
        assert_eq!(interner.line("Retry-After: 37".to_string()), Some("Retry-After: 37"));
        assert_eq!(interner.line("Retry-After: 999999".to_string()), Some("Retry-After: 86400"));

        assert_eq!(
            interner.line("Content-Type: application/json".to_string()),
            Some("Content-Type: application/json")
        );
        assert_eq!(
            interner.line("Content-Type: text/csv".to_string()),
            Some(FALLBACK_CONTENT_TYPE)
        );
    }

    #[test]
    fn test_wire_lines_respect_slot_limit_and_keep_retry_after() {
        let interner = HeaderInterner::new(64, 8);
        let mut resp = ApiResponse::new(429, "application/json", Vec::new());
        for i in 0..20 {
            resp.set_header(&format!("X-Extra-{i}"), i.to_string());
        }
        resp.set_header("Retry-After", "5".to_string());
        let lines = wire_lines(&interner, &resp);
        assert_eq!(lines.len(), MAX_WIRE_HEADERS);
        assert_eq!(lines[0], "Content-Type: application/json");
        assert_eq!(lines[1], "Retry-After: 5");
    }
}
