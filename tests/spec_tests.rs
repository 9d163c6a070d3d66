mod common;

use autoroute::spec::{
    load_endpoint_dir, load_endpoints, ConfigErrorKind, ParamType, Period, RendererKind, Scope,
    ThrottleRate, DEFAULT_TAG,
};
use common::config_dir::with_files;
use http::Method;
use serde_json::json;

const REPORTS: &str = r#"
list_reports:
  path: reports/
  method: get
  handler: reports.list
  renderers: json, browsable
  throttle_rates:
    anon: 10/minute
    user: 1000/day
  optional_params:
    page: 1
  params_description:
    page: {type: integer, description: Page number}
  responses:
    200: A page of reports

upload_report:
  path: /reports
  method: POST
  handler: reports.upload
  status_code: 201
  auth_required: true
  required_params: [file]
  params_description:
    file: {type: file, description: The report}
  max_upload_bytes: 2048
  tags: [reports, uploads]
"#;

#[test]
fn test_directory_loads_in_file_order() {
    let dir = with_files(&[
        ("b_reports.yaml", REPORTS),
        ("a_health.yml", "health:\n  path: /healthz\n  method: GET\n  handler: ops.health\n"),
        ("notes.txt", "not: yaml endpoints"),
    ]);
    let specs = load_endpoint_dir(dir.path()).unwrap();
    let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["health", "list_reports", "upload_report"]);
}

#[test]
fn test_fields_and_defaults() {
    let dir = with_files(&[("reports.yaml", REPORTS)]);
    let specs = load_endpoints(dir.path().join("reports.yaml")).unwrap();

    let list = &specs[0];
    assert_eq!(list.path, "/reports");
    assert_eq!(list.method, Method::GET);
    assert_eq!(list.status_code, 200);
    assert_eq!(list.renderers, vec![RendererKind::Json, RendererKind::Browsable]);
    assert_eq!(list.rate_for(Scope::Anon), Some(&ThrottleRate::new(10, Period::Minute)));
    assert_eq!(list.rate_for(Scope::User), Some(&ThrottleRate::new(1000, Period::Day)));
    assert_eq!(list.optional_params.get("page"), Some(&json!(1)));
    assert_eq!(list.param_type("page"), ParamType::Integer);
    assert_eq!(list.tags, vec![DEFAULT_TAG.to_string()]);
    assert!(!list.auth_required);

    let upload = &specs[1];
    assert_eq!(upload.status_code, 201);
    assert_eq!(upload.max_upload_bytes, 2048);
    assert_eq!(upload.file_params().collect::<Vec<_>>(), vec!["file"]);
    assert!(upload.documents_status(401));
    assert!(upload.documents_status(403));
    assert_eq!(upload.tags, vec!["reports", "uploads"]);
}

#[test]
fn test_duplicate_route_across_files() {
    let dir = with_files(&[
        ("a.yaml", "first:\n  path: /x\n  method: GET\n  handler: a.b\n"),
        ("b.yaml", "second:\n  path: /x/\n  method: get\n  handler: a.c\n"),
    ]);
    let err = load_endpoint_dir(dir.path()).unwrap_err();
    assert_eq!(err.endpoint.as_deref(), Some("second"));
    assert!(matches!(
        err.kind,
        ConfigErrorKind::DuplicateRoute { ref first, .. } if first == "first"
    ));
}

#[test]
fn test_duplicate_name_across_files() {
    let dir = with_files(&[
        ("a.yaml", "same:\n  path: /x\n  method: GET\n  handler: a.b\n"),
        ("b.yaml", "same:\n  path: /y\n  method: GET\n  handler: a.b\n"),
    ]);
    let err = load_endpoint_dir(dir.path()).unwrap_err();
    assert_eq!(err.kind, ConfigErrorKind::DuplicateName);
}

#[test]
fn test_bad_rate_names_the_field() {
    let dir = with_files(&[(
        "bad.yaml",
        "limited:\n  path: /x\n  method: GET\n  handler: a.b\n  throttle_rates:\n    anon: lots/minute\n",
    )]);
    let err = load_endpoint_dir(dir.path()).unwrap_err();
    assert_eq!(err.endpoint.as_deref(), Some("limited"));
    assert_eq!(err.field.as_deref(), Some("throttle_rates.anon"));
    assert!(err.source.ends_with("bad.yaml"));
    assert!(matches!(err.kind, ConfigErrorKind::InvalidThrottleRate { .. }));
}

#[test]
fn test_missing_handler_field() {
    let dir = with_files(&[("bad.yaml", "orphan:\n  path: /x\n  method: GET\n")]);
    let err = load_endpoint_dir(dir.path()).unwrap_err();
    assert_eq!(err.field.as_deref(), Some("handler"));
    assert_eq!(err.kind, ConfigErrorKind::MissingField);
    assert!(err.to_string().contains("orphan"));
}

#[test]
fn test_missing_directory_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_endpoint_dir(dir.path().join("absent")).unwrap_err();
    assert!(matches!(err.kind, ConfigErrorKind::Io(_)));
}

#[test]
fn test_empty_directory_is_no_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_endpoint_dir(dir.path()).unwrap().is_empty());
}
