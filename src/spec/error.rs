use std::fmt;

/// What went wrong with a piece of endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// The file could not be read
    Io(String),
    /// The text is not valid YAML
    Syntax(String),
    /// The document or an endpoint record is not a mapping
    NotAMapping,
    /// A mandatory field is absent
    MissingField,
    /// A field has the wrong shape or an out-of-range value
    InvalidValue(String),
    /// A throttle rate literal does not follow `<count>/<period>`
    InvalidThrottleRate {
        /// The literal as written
        rate: String,
        /// Why it was rejected
        reason: String,
    },
    /// Another endpoint already owns this (path, method)
    DuplicateRoute {
        /// The route, formatted as `METHOD /path`
        route: String,
        /// Name of the endpoint that claimed it first
        first: String,
    },
    /// Another endpoint already uses this name
    DuplicateName,
    /// A parameter is listed as both required and optional
    ParamOverlap(String),
}

/// Structured configuration error, fatal at startup
///
/// Identifies the source (file name or caller-supplied label), the offending
/// endpoint and field where known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub source: String,
    pub endpoint: Option<String>,
    pub field: Option<String>,
    pub kind: ConfigErrorKind,
}

impl ConfigError {
    pub(crate) fn new(source: &str, kind: ConfigErrorKind) -> Self {
        Self {
            source: source.to_string(),
            endpoint: None,
            field: None,
            kind,
        }
    }

    pub(crate) fn at(
        source: &str,
        endpoint: &str,
        field: Option<&str>,
        kind: ConfigErrorKind,
    ) -> Self {
        Self {
            source: source.to_string(),
            endpoint: Some(endpoint.to_string()),
            field: field.map(str::to_string),
            kind,
        }
    }
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorKind::Io(e) => write!(f, "cannot read configuration: {e}"),
            ConfigErrorKind::Syntax(e) => write!(f, "invalid YAML: {e}"),
            ConfigErrorKind::NotAMapping => write!(f, "expected a mapping"),
            ConfigErrorKind::MissingField => write!(f, "required field is missing"),
            ConfigErrorKind::InvalidValue(e) => write!(f, "invalid value: {e}"),
            ConfigErrorKind::InvalidThrottleRate { rate, reason } => {
                write!(f, "invalid throttle rate '{rate}': {reason}")
            }
            ConfigErrorKind::DuplicateRoute { route, first } => {
                write!(f, "route {route} is already defined by endpoint '{first}'")
            }
            ConfigErrorKind::DuplicateName => write!(f, "endpoint name is defined more than once"),
            ConfigErrorKind::ParamOverlap(name) => write!(
                f,
                "parameter '{name}' is listed in both required_params and optional_params"
            ),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)?;
        if let Some(endpoint) = &self.endpoint {
            write!(f, ": endpoint '{endpoint}'")?;
        }
        if let Some(field) = &self.field {
            write!(f, ", field '{field}'")?;
        }
        write!(f, ": {}", self.kind)
    }
}

impl std::error::Error for ConfigError {}
