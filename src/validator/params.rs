use crate::spec::{EndpointSpec, ParamType};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Bytes of an uploaded file together with the metadata the client sent
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl UploadedFile {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            filename: None,
            content_type: None,
            data,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// JSON summary used when parameters are echoed or logged; never carries the bytes
    #[must_use]
    pub fn summary(&self) -> Value {
        json!({
            "filename": self.filename,
            "content_type": self.content_type,
            "size": self.data.len(),
        })
    }
}

/// Parameters as extracted from the request, before the contract is applied
///
/// `values` merges query string, JSON body fields and path segments (later
/// sources overwrite earlier ones); `files` holds uploaded files by name.
#[derive(Debug, Clone, Default)]
pub struct RawParams {
    pub values: Map<String, Value>,
    pub files: BTreeMap<String, UploadedFile>,
}

impl RawParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn insert_file(&mut self, name: impl Into<String>, file: UploadedFile) {
        self.files.insert(name.into(), file);
    }

    /// Present means supplied and not `null`
    fn is_present(&self, name: &str) -> bool {
        self.files.contains_key(name)
            || self.values.get(name).map(|v| !v.is_null()).unwrap_or(false)
    }
}

/// Parameters after validation: defaults filled in, declared types enforced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedParams {
    values: Map<String, Value>,
    files: BTreeMap<String, UploadedFile>,
}

impl ValidatedParams {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    #[must_use]
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }

    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name) || self.files.contains_key(name)
    }

    #[must_use]
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    #[must_use]
    pub fn files(&self) -> &BTreeMap<String, UploadedFile> {
        &self.files
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len() + self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All parameters as one JSON object; files appear as their summary
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut out = self.values.clone();
        for (name, file) in &self.files {
            out.insert(name.clone(), file.summary());
        }
        Value::Object(out)
    }
}

/// Why a request's parameters do not satisfy the endpoint contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required parameter is absent or `null`
    MissingParam(String),
    /// A parameter could not be coerced to its declared type
    InvalidParamType { name: String, expected: ParamType },
    /// A file parameter exceeds the endpoint's upload ceiling
    PayloadTooLarge { name: String, limit: u64, actual: u64 },
}

impl ValidationError {
    /// Name of the offending parameter
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            ValidationError::MissingParam(name)
            | ValidationError::InvalidParamType { name, .. }
            | ValidationError::PayloadTooLarge { name, .. } => name,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingParam(name) => {
                write!(f, "missing required parameter '{name}'")
            }
            ValidationError::InvalidParamType { name, expected } => {
                write!(f, "parameter '{name}' must be of type {expected}")
            }
            ValidationError::PayloadTooLarge {
                name,
                limit,
                actual,
            } => write!(
                f,
                "file '{name}' is {actual} bytes, larger than the {limit} byte limit"
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Apply an endpoint's parameter contract to raw request parameters.
///
/// Checks run in a fixed order: every required parameter must be present,
/// absent optional parameters take their configured default, every present
/// parameter with a type in `params_description` is coerced to it and every
/// uploaded file is held to `max_upload_bytes`. Parameters with no declared
/// type pass through untouched.
pub fn validate(spec: &EndpointSpec, raw: RawParams) -> Result<ValidatedParams, ValidationError> {
    if let Some(missing) = spec.required_params.iter().find(|p| !raw.is_present(p)) {
        return Err(ValidationError::MissingParam(missing.clone()));
    }

    let RawParams {
        mut values,
        mut files,
    } = raw;
    // null counts as absent everywhere
    values.retain(|_, v| !v.is_null());

    // Contract names plus every parameter given a type in params_description
    let mut declared: Vec<&str> = Vec::new();
    for name in spec
        .required_params
        .iter()
        .chain(spec.optional_params.keys())
        .chain(spec.params_description.keys())
    {
        if !declared.contains(&name.as_str()) {
            declared.push(name.as_str());
        }
    }

    let mut out = ValidatedParams::default();
    for name in declared {
        let param_type = spec.param_type(name);
        if param_type == ParamType::File {
            let file = match (files.remove(name), values.remove(name)) {
                (Some(file), _) => Some(file),
                (None, Some(value)) => Some(coerce_file(name, &value)?),
                (None, None) => None,
            };
            match file {
                Some(file) => {
                    check_size(spec, name, &file)?;
                    out.files.insert(name.to_string(), file);
                }
                None => {
                    if let Some(default) = spec.optional_params.get(name) {
                        out.values.insert(name.to_string(), default.clone());
                    }
                }
            }
            continue;
        }

        match values.remove(name) {
            Some(value) => {
                let coerced = coerce(&value, param_type).ok_or_else(|| {
                    ValidationError::InvalidParamType {
                        name: name.to_string(),
                        expected: param_type,
                    }
                })?;
                out.values.insert(name.to_string(), coerced);
            }
            None => {
                // Defaults are inserted as configured, not coerced
                if let Some(default) = spec.optional_params.get(name) {
                    out.values.insert(name.to_string(), default.clone());
                }
            }
        }
    }

    if !values.is_empty() || !files.is_empty() {
        debug!(
            endpoint = %spec.name,
            undeclared = values.len() + files.len(),
            "Passing undeclared parameters through"
        );
    }
    out.values.extend(values);
    for (name, file) in files {
        check_size(spec, &name, &file)?;
        out.files.insert(name, file);
    }
    Ok(out)
}

fn check_size(spec: &EndpointSpec, name: &str, file: &UploadedFile) -> Result<(), ValidationError> {
    let actual = file.data.len() as u64;
    if actual > spec.max_upload_bytes {
        return Err(ValidationError::PayloadTooLarge {
            name: name.to_string(),
            limit: spec.max_upload_bytes,
            actual,
        });
    }
    Ok(())
}

fn coerce(value: &Value, param_type: ParamType) -> Option<Value> {
    match param_type {
        ParamType::String => match value {
            Value::String(_) => Some(value.clone()),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        ParamType::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
            Value::Number(n) => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| Value::from(f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
            _ => None,
        },
        ParamType::Number => match value {
            Value::Number(_) => Some(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            _ => None,
        },
        ParamType::Boolean => match value {
            Value::Bool(_) => Some(value.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Some(Value::Bool(false)),
                Some(1) => Some(Value::Bool(true)),
                _ => None,
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(Value::Bool(true)),
                "false" | "0" | "no" | "off" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        ParamType::Array => match value {
            Value::Array(_) => Some(value.clone()),
            Value::String(s) if s.trim().is_empty() => Some(Value::Array(Vec::new())),
            Value::String(s) => Some(Value::Array(
                s.split(',')
                    .map(|item| Value::String(item.trim().to_string()))
                    .collect(),
            )),
            Value::Object(_) => None,
            other => Some(Value::Array(vec![other.clone()])),
        },
        ParamType::Object => match value {
            Value::Object(_) => Some(value.clone()),
            Value::String(s) => serde_json::from_str::<Value>(s)
                .ok()
                .filter(Value::is_object),
            _ => None,
        },
        // Files never reach scalar coercion
        ParamType::File => None,
    }
}

/// A file parameter supplied inline: a base64 string or
/// `{"filename", "content_type", "data": <base64>}`
fn coerce_file(name: &str, value: &Value) -> Result<UploadedFile, ValidationError> {
    let invalid = || ValidationError::InvalidParamType {
        name: name.to_string(),
        expected: ParamType::File,
    };
    let decode = |s: &str| general_purpose::STANDARD.decode(s.trim()).map_err(|_| invalid());

    match value {
        Value::String(s) => Ok(UploadedFile::new(decode(s)?)),
        Value::Object(obj) => {
            let data = obj.get("data").and_then(Value::as_str).ok_or_else(invalid)?;
            Ok(UploadedFile {
                filename: obj.get("filename").and_then(Value::as_str).map(str::to_string),
                content_type: obj
                    .get("content_type")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                data: decode(data)?,
            })
        }
        _ => Err(invalid()),
    }
}
