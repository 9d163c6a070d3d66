use http::Method;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default ceiling for file-typed parameters (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Tag applied to endpoints that declare none
pub const DEFAULT_TAG: &str = "default";

/// Period unit of a throttle rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Second,
    Minute,
    Hour,
    Day,
}

impl Period {
    /// Length of one window of this period
    #[must_use]
    pub fn as_duration(self) -> Duration {
        match self {
            Period::Second => Duration::from_secs(1),
            Period::Minute => Duration::from_secs(60),
            Period::Hour => Duration::from_secs(60 * 60),
            Period::Day => Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => Ok(Period::Second),
            "m" | "min" | "minute" | "minutes" => Ok(Period::Minute),
            "h" | "hour" | "hours" => Ok(Period::Hour),
            "d" | "day" | "days" => Ok(Period::Day),
            other => Err(format!("unknown period unit '{other}'")),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Period::Second => "second",
            Period::Minute => "minute",
            Period::Hour => "hour",
            Period::Day => "day",
        };
        write!(f, "{s}")
    }
}

/// A parsed `count/period` throttle rate such as `100/hour`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ThrottleRate {
    /// Requests allowed per window (always > 0)
    pub count: u32,
    /// Window length
    pub period: Period,
}

impl ThrottleRate {
    #[must_use]
    pub fn new(count: u32, period: Period) -> Self {
        Self { count, period }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.period.as_duration()
    }
}

impl FromStr for ThrottleRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (count, period) = s
            .split_once('/')
            .ok_or_else(|| format!("expected '<count>/<period>', got '{s}'"))?;
        let count: u32 = count
            .trim()
            .parse()
            .map_err(|_| format!("count '{}' is not a positive integer", count.trim()))?;
        if count == 0 {
            return Err("count must be greater than zero".to_string());
        }
        let period = period.parse::<Period>()?;
        Ok(ThrottleRate { count, period })
    }
}

impl fmt::Display for ThrottleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.count, self.period)
    }
}

/// Caller class a throttle rate applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Unauthenticated callers
    Anon,
    /// Authenticated callers
    User,
}

impl Scope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Anon => "anon",
            Scope::User => "user",
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anon" => Ok(Scope::Anon),
            "user" => Ok(Scope::User),
            other => Err(format!("unknown throttle scope '{other}' (expected anon or user)")),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of a parameter, used for coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    File,
    Array,
    Object,
}

impl ParamType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::File => "file",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }
}

impl FromStr for ParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(ParamType::String),
            "integer" | "int" => Ok(ParamType::Integer),
            "number" | "float" => Ok(ParamType::Number),
            "boolean" | "bool" => Ok(ParamType::Boolean),
            "file" => Ok(ParamType::File),
            "array" | "list" => Ok(ParamType::Array),
            "object" | "dict" => Ok(ParamType::Object),
            other => Err(format!("unknown parameter type '{other}'")),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Documentation entry for one parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDoc {
    pub description: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
}

/// Documentation entry for one response status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseDoc {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

/// Output representation an endpoint can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// `application/json`, payload serialised directly
    Json,
    /// `text/html` page embedding the endpoint documentation
    Browsable,
}

impl RendererKind {
    /// Map a configured renderer name; `None` for names this runtime does not know
    #[must_use]
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => Some(RendererKind::Json),
            "browsable" | "api" | "html" | "template" => Some(RendererKind::Browsable),
            _ => None,
        }
    }

    #[must_use]
    pub fn media_type(self) -> &'static str {
        match self {
            RendererKind::Json => "application/json",
            RendererKind::Browsable => "text/html; charset=utf-8",
        }
    }
}

/// Routing key: normalized path plus method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub path: String,
    pub method: Method,
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Normalize a configured or requested path: leading `/`, no trailing `/`,
/// no query string.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let path = path.split('?').next().unwrap_or("");
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// One endpoint's full contract, immutable after load
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointSpec {
    /// Unique symbolic identifier (the configuration key)
    pub name: String,
    /// Normalized path, may contain `{param}` segments
    pub path: String,
    #[serde(serialize_with = "serialize_method")]
    pub method: Method,
    /// Dotted handler reference, resolved once at registry build
    #[serde(rename = "handler")]
    pub handler_ref: String,
    /// Default success status
    pub status_code: u16,
    /// Supported renderers in preference order, never empty
    pub renderers: Vec<RendererKind>,
    pub auth_required: bool,
    pub throttle_rates: BTreeMap<Scope, ThrottleRate>,
    pub required_params: Vec<String>,
    pub optional_params: BTreeMap<String, Value>,
    pub params_description: BTreeMap<String, ParamDoc>,
    pub responses: BTreeMap<u16, ResponseDoc>,
    pub tags: Vec<String>,
    pub description: String,
    /// Ceiling for each file-typed parameter, in bytes
    pub max_upload_bytes: u64,
}

fn serialize_method<S: serde::Serializer>(method: &Method, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(method.as_str())
}

impl EndpointSpec {
    /// Minimal spec with every optional field at its default
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        path: &str,
        method: Method,
        handler_ref: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: normalize_path(path),
            method,
            handler_ref: handler_ref.into(),
            status_code: 200,
            renderers: vec![RendererKind::Json],
            auth_required: false,
            throttle_rates: BTreeMap::new(),
            required_params: Vec::new(),
            optional_params: BTreeMap::new(),
            params_description: BTreeMap::new(),
            responses: BTreeMap::new(),
            tags: vec![DEFAULT_TAG.to_string()],
            description: String::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    #[must_use]
    pub fn route_key(&self) -> RouteKey {
        RouteKey {
            path: self.path.clone(),
            method: self.method.clone(),
        }
    }

    /// Declared type of a parameter; undocumented parameters are strings
    #[must_use]
    pub fn param_type(&self, name: &str) -> ParamType {
        self.params_description
            .get(name)
            .map(|d| d.param_type)
            .unwrap_or_default()
    }

    /// Whether the parameter is part of the contract (required or optional)
    #[must_use]
    pub fn declares_param(&self, name: &str) -> bool {
        self.required_params.iter().any(|p| p == name) || self.optional_params.contains_key(name)
    }

    /// Names of parameters declared with type `file`
    pub fn file_params(&self) -> impl Iterator<Item = &str> {
        self.params_description
            .iter()
            .filter(|(_, d)| d.param_type == ParamType::File)
            .map(|(n, _)| n.as_str())
    }

    #[must_use]
    pub fn rate_for(&self, scope: Scope) -> Option<&ThrottleRate> {
        self.throttle_rates.get(&scope)
    }

    /// The renderer used when negotiation yields nothing usable
    #[must_use]
    pub fn default_renderer(&self) -> RendererKind {
        self.renderers.first().copied().unwrap_or(RendererKind::Json)
    }

    /// Whether the status is part of this endpoint's documented contract
    #[must_use]
    pub fn documents_status(&self, status: u16) -> bool {
        status == self.status_code || self.responses.contains_key(&status)
    }

    /// Builder-style setters used by embedding code and tests
    #[must_use]
    pub fn with_auth(mut self, required: bool) -> Self {
        self.auth_required = required;
        self
    }

    #[must_use]
    pub fn with_rate(mut self, scope: Scope, rate: ThrottleRate) -> Self {
        self.throttle_rates.insert(scope, rate);
        self
    }

    #[must_use]
    pub fn with_required(mut self, name: impl Into<String>) -> Self {
        self.required_params.push(name.into());
        self
    }

    #[must_use]
    pub fn with_optional(mut self, name: impl Into<String>, default: Value) -> Self {
        self.optional_params.insert(name.into(), default);
        self
    }

    #[must_use]
    pub fn with_param_doc(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.params_description.insert(
            name.into(),
            ParamDoc {
                description: description.into(),
                param_type,
            },
        );
        self
    }

    #[must_use]
    pub fn with_response(mut self, status: u16, description: impl Into<String>) -> Self {
        self.responses.insert(
            status,
            ResponseDoc {
                description: description.into(),
                example: None,
            },
        );
        self
    }
}
