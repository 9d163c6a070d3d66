use super::error::{ConfigError, ConfigErrorKind};
use super::types::{
    normalize_path, EndpointSpec, ParamDoc, ParamType, RendererKind, ResponseDoc, Scope,
    ThrottleRate, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_TAG,
};
use http::Method;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value as YamlValue};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

const KNOWN_FIELDS: [&str; 14] = [
    "path",
    "method",
    "handler",
    "status_code",
    "renderers",
    "auth_required",
    "throttle_rates",
    "required_params",
    "optional_params",
    "params_description",
    "responses",
    "tags",
    "description",
    "max_upload_bytes",
];

const METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::HEAD,
    Method::OPTIONS,
];

/// Parse one YAML document of endpoint records keyed by endpoint name.
///
/// `source` labels errors (usually the file name). Records are returned in
/// document order. Duplicate names and duplicate (path, method) pairs within
/// the document are rejected.
pub fn load_endpoints_from_str(text: &str, source: &str) -> Result<Vec<EndpointSpec>, ConfigError> {
    let doc: YamlValue = serde_yaml::from_str(text)
        .map_err(|e| ConfigError::new(source, ConfigErrorKind::Syntax(e.to_string())))?;

    let records = match doc {
        YamlValue::Mapping(m) => m,
        // An empty file parses as null; treat it as no endpoints
        YamlValue::Null => Mapping::new(),
        _ => return Err(ConfigError::new(source, ConfigErrorKind::NotAMapping)),
    };

    let mut specs = Vec::with_capacity(records.len());
    for (key, record) in &records {
        let name = match key {
            YamlValue::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            other => {
                return Err(ConfigError::new(
                    source,
                    ConfigErrorKind::InvalidValue(format!(
                        "endpoint names must be non-empty strings, got {other:?}"
                    )),
                ))
            }
        };
        specs.push(parse_endpoint(source, &name, record)?);
    }

    check_unique(&specs, source)?;

    debug!(source = %source, endpoints = specs.len(), "Endpoint configuration parsed");
    Ok(specs)
}

/// Read and parse a single configuration file
pub fn load_endpoints(path: impl AsRef<Path>) -> Result<Vec<EndpointSpec>, ConfigError> {
    let path = path.as_ref();
    let source = path.display().to_string();
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::new(&source, ConfigErrorKind::Io(e.to_string())))?;
    load_endpoints_from_str(&text, &source)
}

/// Read every `.yaml` / `.yml` file of a directory, in file-name order.
///
/// Endpoint names and routes must be unique across all files.
pub fn load_endpoint_dir(dir: impl AsRef<Path>) -> Result<Vec<EndpointSpec>, ConfigError> {
    let dir = dir.as_ref();
    let source = dir.display().to_string();
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ConfigError::new(&source, ConfigErrorKind::Io(e.to_string())))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::new(&source, ConfigErrorKind::Io(e.to_string())))?;
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);
        if is_yaml && path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    let mut all = Vec::new();
    for file in &files {
        all.extend(load_endpoints(file)?);
    }
    check_unique(&all, &source)?;

    if all.is_empty() {
        warn!(dir = %source, "No endpoint definitions found");
    }
    info!(
        dir = %source,
        files = files.len(),
        endpoints = all.len(),
        "Endpoint configuration loaded"
    );
    Ok(all)
}

/// Reject duplicate names and duplicate (path, method) pairs
pub(crate) fn check_unique(specs: &[EndpointSpec], source: &str) -> Result<(), ConfigError> {
    let mut names: HashMap<&str, ()> = HashMap::with_capacity(specs.len());
    let mut routes: HashMap<(String, Method), &str> = HashMap::with_capacity(specs.len());
    for spec in specs {
        if names.insert(spec.name.as_str(), ()).is_some() {
            return Err(ConfigError::at(
                source,
                &spec.name,
                None,
                ConfigErrorKind::DuplicateName,
            ));
        }
        let key = (spec.path.clone(), spec.method.clone());
        if let Some(first) = routes.insert(key, spec.name.as_str()) {
            return Err(ConfigError::at(
                source,
                &spec.name,
                Some("path"),
                ConfigErrorKind::DuplicateRoute {
                    route: format!("{} {}", spec.method, spec.path),
                    first: first.to_string(),
                },
            ));
        }
    }
    Ok(())
}

/// Deserialize one optional field of a record, reporting the field name on error
fn field<T: DeserializeOwned>(
    source: &str,
    name: &str,
    record: &Mapping,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match record.get(key) {
        None | Some(YamlValue::Null) => Ok(None),
        Some(value) => serde_yaml::from_value(value.clone()).map(Some).map_err(|e| {
            ConfigError::at(
                source,
                name,
                Some(key),
                ConfigErrorKind::InvalidValue(e.to_string()),
            )
        }),
    }
}

fn required_str(source: &str, name: &str, record: &Mapping, key: &str) -> Result<String, ConfigError> {
    match field::<String>(source, name, record, key)? {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(ConfigError::at(
            source,
            name,
            Some(key),
            ConfigErrorKind::MissingField,
        )),
    }
}

fn parse_endpoint(source: &str, name: &str, record: &YamlValue) -> Result<EndpointSpec, ConfigError> {
    let record = record
        .as_mapping()
        .ok_or_else(|| ConfigError::at(source, name, None, ConfigErrorKind::NotAMapping))?;

    for key in record.keys() {
        if let Some(k) = key.as_str() {
            if !KNOWN_FIELDS.contains(&k) {
                debug!(endpoint = %name, field = %k, "Ignoring unknown endpoint field");
            }
        }
    }

    let path = required_str(source, name, record, "path")?;
    let method = parse_method(source, name, &required_str(source, name, record, "method")?)?;
    let handler_ref = required_str(source, name, record, "handler")?;
    validate_handler_ref(source, name, &handler_ref)?;

    let status_code = field::<u16>(source, name, record, "status_code")?.unwrap_or(200);
    if !(100..=599).contains(&status_code) {
        return Err(ConfigError::at(
            source,
            name,
            Some("status_code"),
            ConfigErrorKind::InvalidValue(format!("{status_code} is not an HTTP status code")),
        ));
    }

    let renderers = parse_renderers(source, name, record)?;
    let auth_required = field::<bool>(source, name, record, "auth_required")?.unwrap_or(false);
    let throttle_rates = parse_throttle_rates(source, name, record)?;

    let required_params: Vec<String> =
        field(source, name, record, "required_params")?.unwrap_or_default();
    let optional_params: BTreeMap<String, serde_json::Value> =
        field(source, name, record, "optional_params")?.unwrap_or_default();
    if let Some(overlap) = required_params
        .iter()
        .find(|p| optional_params.contains_key(p.as_str()))
    {
        return Err(ConfigError::at(
            source,
            name,
            Some("optional_params"),
            ConfigErrorKind::ParamOverlap(overlap.clone()),
        ));
    }

    let params_description = parse_params_description(source, name, record)?;
    let mut responses = parse_responses(source, name, record)?;
    if auth_required {
        responses.entry(401).or_insert_with(|| ResponseDoc {
            description: "Unauthorized: credentials were not provided".to_string(),
            example: Some(serde_json::json!({ "error": "unauthorized" })),
        });
        responses.entry(403).or_insert_with(|| ResponseDoc {
            description: "Forbidden: the supplied credentials were rejected".to_string(),
            example: Some(serde_json::json!({ "error": "forbidden" })),
        });
    }

    let tags = field::<Vec<String>>(source, name, record, "tags")?
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| vec![DEFAULT_TAG.to_string()]);
    let description = field::<String>(source, name, record, "description")?.unwrap_or_default();
    let max_upload_bytes =
        field::<u64>(source, name, record, "max_upload_bytes")?.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

    Ok(EndpointSpec {
        name: name.to_string(),
        path: normalize_path(&path),
        method,
        handler_ref,
        status_code,
        renderers,
        auth_required,
        throttle_rates,
        required_params,
        optional_params,
        params_description,
        responses,
        tags,
        description,
        max_upload_bytes,
    })
}

fn parse_method(source: &str, name: &str, raw: &str) -> Result<Method, ConfigError> {
    let upper = raw.to_ascii_uppercase();
    METHODS
        .iter()
        .find(|m| m.as_str() == upper)
        .cloned()
        .ok_or_else(|| {
            ConfigError::at(
                source,
                name,
                Some("method"),
                ConfigErrorKind::InvalidValue(format!("unsupported HTTP method '{raw}'")),
            )
        })
}

fn validate_handler_ref(source: &str, name: &str, reference: &str) -> Result<(), ConfigError> {
    let well_formed = reference.split('.').all(|seg| {
        !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    });
    if well_formed {
        Ok(())
    } else {
        Err(ConfigError::at(
            source,
            name,
            Some("handler"),
            ConfigErrorKind::InvalidValue(format!(
                "'{reference}' is not a dotted handler name"
            )),
        ))
    }
}

fn parse_renderers(source: &str, name: &str, record: &Mapping) -> Result<Vec<RendererKind>, ConfigError> {
    let names: Vec<String> = match record.get("renderers") {
        None | Some(YamlValue::Null) => Vec::new(),
        Some(YamlValue::String(s)) => s.split(',').map(|r| r.trim().to_string()).collect(),
        Some(YamlValue::Sequence(_)) => field::<Vec<String>>(source, name, record, "renderers")?
            .unwrap_or_default(),
        Some(_) => {
            return Err(ConfigError::at(
                source,
                name,
                Some("renderers"),
                ConfigErrorKind::InvalidValue(
                    "expected a comma-separated string or a list".to_string(),
                ),
            ))
        }
    };

    let mut kinds = Vec::new();
    for renderer in names.iter().filter(|r| !r.is_empty()) {
        match RendererKind::from_config_name(renderer) {
            Some(kind) if !kinds.contains(&kind) => kinds.push(kind),
            Some(_) => {}
            None => warn!(endpoint = %name, renderer = %renderer, "Unknown renderer ignored"),
        }
    }
    if kinds.is_empty() {
        kinds.push(RendererKind::Json);
    }
    Ok(kinds)
}

fn parse_throttle_rates(
    source: &str,
    name: &str,
    record: &Mapping,
) -> Result<BTreeMap<Scope, ThrottleRate>, ConfigError> {
    let raw: BTreeMap<String, Option<String>> =
        field(source, name, record, "throttle_rates")?.unwrap_or_default();
    let mut rates = BTreeMap::new();
    for (scope_name, rate) in raw {
        let field_name = format!("throttle_rates.{scope_name}");
        let scope: Scope = scope_name.parse().map_err(|e: String| {
            ConfigError::at(source, name, Some(&field_name), ConfigErrorKind::InvalidValue(e))
        })?;
        let Some(rate) = rate else { continue };
        let parsed: ThrottleRate = rate.parse().map_err(|reason: String| {
            ConfigError::at(
                source,
                name,
                Some(&field_name),
                ConfigErrorKind::InvalidThrottleRate {
                    rate: rate.clone(),
                    reason,
                },
            )
        })?;
        rates.insert(scope, parsed);
    }
    Ok(rates)
}

fn parse_params_description(
    source: &str,
    name: &str,
    record: &Mapping,
) -> Result<BTreeMap<String, ParamDoc>, ConfigError> {
    let raw: BTreeMap<String, YamlValue> =
        field(source, name, record, "params_description")?.unwrap_or_default();
    let mut docs = BTreeMap::new();
    for (param, value) in raw {
        let field_name = format!("params_description.{param}");
        let doc = match value {
            YamlValue::String(description) => ParamDoc {
                description,
                param_type: ParamType::String,
            },
            YamlValue::Mapping(m) => {
                let description = m
                    .get("description")
                    .and_then(YamlValue::as_str)
                    .unwrap_or_default()
                    .to_string();
                let param_type = match m.get("type") {
                    None | Some(YamlValue::Null) => ParamType::String,
                    Some(YamlValue::String(t)) => t.parse().map_err(|e: String| {
                        ConfigError::at(
                            source,
                            name,
                            Some(&field_name),
                            ConfigErrorKind::InvalidValue(e),
                        )
                    })?,
                    Some(_) => {
                        return Err(ConfigError::at(
                            source,
                            name,
                            Some(&field_name),
                            ConfigErrorKind::InvalidValue("type must be a string".to_string()),
                        ))
                    }
                };
                ParamDoc {
                    description,
                    param_type,
                }
            }
            _ => {
                return Err(ConfigError::at(
                    source,
                    name,
                    Some(&field_name),
                    ConfigErrorKind::InvalidValue(
                        "expected a description string or {description, type}".to_string(),
                    ),
                ))
            }
        };
        docs.insert(param, doc);
    }
    Ok(docs)
}

fn parse_responses(
    source: &str,
    name: &str,
    record: &Mapping,
) -> Result<BTreeMap<u16, ResponseDoc>, ConfigError> {
    let mapping = match record.get("responses") {
        None | Some(YamlValue::Null) => return Ok(BTreeMap::new()),
        Some(YamlValue::Mapping(m)) => m,
        Some(_) => {
            return Err(ConfigError::at(
                source,
                name,
                Some("responses"),
                ConfigErrorKind::NotAMapping,
            ))
        }
    };

    let mut responses = BTreeMap::new();
    for (key, value) in mapping {
        let status = match key {
            YamlValue::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            YamlValue::String(s) => s.trim().parse::<u16>().ok(),
            _ => None,
        }
        .filter(|s| (100..=599).contains(s))
        .ok_or_else(|| {
            ConfigError::at(
                source,
                name,
                Some("responses"),
                ConfigErrorKind::InvalidValue(format!("{key:?} is not an HTTP status code")),
            )
        })?;

        let field_name = format!("responses.{status}");
        let doc = match value {
            YamlValue::String(description) => ResponseDoc {
                description: description.clone(),
                example: None,
            },
            YamlValue::Mapping(m) => {
                let description = m
                    .get("description")
                    .and_then(YamlValue::as_str)
                    .unwrap_or_default()
                    .to_string();
                let example = match m.get("example") {
                    None => None,
                    Some(v) => Some(serde_yaml::from_value::<serde_json::Value>(v.clone()).map_err(
                        |e| {
                            ConfigError::at(
                                source,
                                name,
                                Some(&field_name),
                                ConfigErrorKind::InvalidValue(e.to_string()),
                            )
                        },
                    )?),
                };
                ResponseDoc {
                    description,
                    example,
                }
            }
            YamlValue::Null => ResponseDoc {
                description: String::new(),
                example: None,
            },
            _ => {
                return Err(ConfigError::at(
                    source,
                    name,
                    Some(&field_name),
                    ConfigErrorKind::InvalidValue(
                        "expected a description string or {description, example}".to_string(),
                    ),
                ))
            }
        };
        responses.insert(status, doc);
    }
    Ok(responses)
}
