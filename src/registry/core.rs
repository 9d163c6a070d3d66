use crate::dispatcher::ParamVec;
use crate::handlers::{Handler, HandlerTable, UnresolvedHandler};
use crate::spec::{check_unique, normalize_path, ConfigError, ConfigErrorKind, EndpointSpec, RouteKey};
use http::Method;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Why the registry could not be built
#[derive(Debug)]
pub enum RegistryError {
    /// Duplicate names or routes among the supplied specs
    Config(ConfigError),
    /// An endpoint names a handler nobody registered
    Unresolved {
        endpoint: String,
        source: UnresolvedHandler,
    },
    /// A path template is malformed
    InvalidPath {
        endpoint: String,
        path: String,
        reason: String,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Config(e) => write!(f, "{e}"),
            RegistryError::Unresolved { endpoint, source } => {
                write!(f, "endpoint '{endpoint}': {source}")
            }
            RegistryError::InvalidPath {
                endpoint,
                path,
                reason,
            } => write!(f, "endpoint '{endpoint}': invalid path '{path}': {reason}"),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Config(e) => Some(e),
            RegistryError::Unresolved { source, .. } => Some(source),
            RegistryError::InvalidPath { .. } => None,
        }
    }
}

impl From<ConfigError> for RegistryError {
    fn from(e: ConfigError) -> Self {
        RegistryError::Config(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(Arc<str>),
}

/// A spec bound to its resolved handler
pub struct RegisteredEndpoint {
    pub spec: Arc<EndpointSpec>,
    pub handler: Arc<dyn Handler>,
    segments: Vec<Segment>,
}

impl RegisteredEndpoint {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    fn is_template(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Param(_)))
    }

    fn param_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Param(_)))
            .count()
    }

    /// Match request segments against this endpoint's template
    fn capture(&self, parts: &[&str]) -> Option<ParamVec> {
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = ParamVec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => params.push((Arc::clone(name), (*part).to_string())),
            }
        }
        Some(params)
    }
}

impl fmt::Debug for RegisteredEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredEndpoint")
            .field("name", &self.spec.name)
            .field("route", &self.spec.route_key().to_string())
            .field("handler", &self.spec.handler_ref)
            .finish()
    }
}

/// Result of a successful lookup
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub endpoint: Arc<RegisteredEndpoint>,
    /// Values captured by `{name}` segments
    pub path_params: ParamVec,
}

impl RouteMatch {
    #[must_use]
    pub fn spec(&self) -> &EndpointSpec {
        &self.endpoint.spec
    }
}

/// Immutable (path, method) → endpoint map, built once at startup
#[derive(Debug, Default)]
pub struct Registry {
    exact: HashMap<RouteKey, Arc<RegisteredEndpoint>>,
    /// Templated routes, most specific (fewest parameters) first
    templated: Vec<Arc<RegisteredEndpoint>>,
    /// Every endpoint in configuration order
    ordered: Vec<Arc<RegisteredEndpoint>>,
}

fn split(path: &str) -> Vec<&str> {
    if path == "/" {
        Vec::new()
    } else {
        path.trim_start_matches('/').split('/').collect()
    }
}

fn parse_segments(spec: &EndpointSpec) -> Result<Vec<Segment>, RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidPath {
        endpoint: spec.name.clone(),
        path: spec.path.clone(),
        reason,
    };
    let mut seen: Vec<&str> = Vec::new();
    let mut segments = Vec::new();
    for part in split(&spec.path) {
        if let Some(inner) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            let valid = !inner.is_empty()
                && inner.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(invalid(format!("bad parameter segment '{part}'")));
            }
            if seen.contains(&inner) {
                return Err(invalid(format!("parameter '{inner}' appears twice")));
            }
            seen.push(inner);
            segments.push(Segment::Param(Arc::from(inner)));
        } else if part.contains('{') || part.contains('}') {
            return Err(invalid(format!(
                "'{part}' mixes literal text and a parameter"
            )));
        } else if part.is_empty() {
            return Err(invalid("empty path segment".to_string()));
        } else {
            segments.push(Segment::Literal(part.to_string()));
        }
    }
    Ok(segments)
}

/// Template shape with parameter names erased, so `/a/{x}` and `/a/{y}` collide
fn shape(segments: &[Segment]) -> String {
    let mut out = String::new();
    for s in segments {
        out.push('/');
        match s {
            Segment::Literal(l) => out.push_str(l),
            Segment::Param(_) => out.push_str("{}"),
        }
    }
    out
}

impl Registry {
    /// Bind every spec to its handler.
    ///
    /// Fails on duplicate names or routes, malformed path templates and
    /// unresolvable handler references. Each distinct reference is resolved
    /// once.
    pub fn build(specs: Vec<EndpointSpec>, handlers: &HandlerTable) -> Result<Self, RegistryError> {
        check_unique(&specs, "registry")?;

        let mut resolved: HashMap<String, Arc<dyn Handler>> = HashMap::new();
        let mut shapes: HashMap<(String, Method), String> = HashMap::new();
        let mut registry = Registry::default();

        for spec in specs {
            let handler = match resolved.get(&spec.handler_ref) {
                Some(h) => Arc::clone(h),
                None => {
                    let h = handlers.resolve(&spec.handler_ref).map_err(|source| {
                        RegistryError::Unresolved {
                            endpoint: spec.name.clone(),
                            source,
                        }
                    })?;
                    resolved.insert(spec.handler_ref.clone(), Arc::clone(&h));
                    h
                }
            };

            let segments = parse_segments(&spec)?;
            let shape_key = (shape(&segments), spec.method.clone());
            if let Some(first) = shapes.insert(shape_key, spec.name.clone()) {
                return Err(RegistryError::Config(ConfigError::at(
                    "registry",
                    &spec.name,
                    Some("path"),
                    ConfigErrorKind::DuplicateRoute {
                        route: spec.route_key().to_string(),
                        first,
                    },
                )));
            }

            debug!(
                endpoint = %spec.name,
                method = %spec.method,
                path = %spec.path,
                handler_ref = %spec.handler_ref,
                "Endpoint registered"
            );

            let endpoint = Arc::new(RegisteredEndpoint {
                spec: Arc::new(spec),
                handler,
                segments,
            });
            if endpoint.is_template() {
                registry.templated.push(Arc::clone(&endpoint));
            } else {
                registry
                    .exact
                    .insert(endpoint.spec.route_key(), Arc::clone(&endpoint));
            }
            registry.ordered.push(endpoint);
        }

        // Stable sort keeps configuration order among equally specific templates
        registry.templated.sort_by_key(|e| e.param_count());

        info!(
            endpoints = registry.ordered.len(),
            templated = registry.templated.len(),
            handlers = resolved.len(),
            "Registry built"
        );
        Ok(registry)
    }

    /// Find the endpoint for a request; exact paths win over templates
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let path = normalize_path(path);
        let key = RouteKey {
            path,
            method: method.clone(),
        };
        if let Some(endpoint) = self.exact.get(&key) {
            return Some(RouteMatch {
                endpoint: Arc::clone(endpoint),
                path_params: ParamVec::new(),
            });
        }
        let parts = split(&key.path);
        self.templated
            .iter()
            .filter(|e| e.spec.method == *method)
            .find_map(|e| {
                e.capture(&parts).map(|path_params| RouteMatch {
                    endpoint: Arc::clone(e),
                    path_params,
                })
            })
    }

    /// Methods served at a path, in configuration order
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let path = normalize_path(path);
        let parts = split(&path);
        let mut methods: Vec<Method> = Vec::new();
        for e in &self.ordered {
            let hit = e.spec.path == path || (e.is_template() && e.capture(&parts).is_some());
            if hit && !methods.contains(&e.spec.method) {
                methods.push(e.spec.method.clone());
            }
        }
        methods
    }

    /// Endpoints registered at a path (any method)
    pub fn endpoints_at<'a>(&'a self, path: &str) -> impl Iterator<Item = &'a Arc<RegisteredEndpoint>> + 'a {
        let path = normalize_path(path);
        self.ordered.iter().filter(move |e| {
            e.spec.path == path || (e.is_template() && e.capture(&split(&path)).is_some())
        })
    }

    /// Every endpoint in configuration order
    pub fn endpoints(&self) -> impl Iterator<Item = &Arc<RegisteredEndpoint>> {
        self.ordered.iter()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<RegisteredEndpoint>> {
        self.ordered.iter().find(|e| e.spec.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
