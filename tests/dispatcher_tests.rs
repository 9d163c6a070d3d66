mod common;

use autoroute::dispatcher::{ApiRequest, Dispatcher, Stage};
use autoroute::registry::Registry;
use autoroute::security::ApiKeyProvider;
use autoroute::spec::{EndpointSpec, ParamType, Period, RendererKind, Scope, ThrottleRate};
use autoroute::throttle::{InMemoryThrottleStore, ManualClock, ThrottleStore};
use common::test_handlers;
use http::Method;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn api_keys() -> Arc<ApiKeyProvider> {
    Arc::new(ApiKeyProvider::new(HashMap::new()).with_key("k-alice", "alice"))
}

fn dispatcher_for(specs: Vec<EndpointSpec>) -> (Dispatcher, Arc<InMemoryThrottleStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let store = Arc::new(InMemoryThrottleStore::with_clock(clock.clone()));
    let registry = Arc::new(Registry::build(specs, &test_handlers()).unwrap());
    let dispatcher = Dispatcher::new(registry)
        .with_identity_provider(api_keys())
        .with_throttle_store(store.clone() as Arc<dyn ThrottleStore>);
    (dispatcher, store, clock)
}

#[test]
fn test_anon_rate_allows_once_per_window() {
    let spec = EndpointSpec::new("ping", "/ping", Method::GET, "app.ping")
        .with_rate(Scope::Anon, ThrottleRate::new(1, Period::Minute));
    let (dispatcher, _store, clock) = dispatcher_for(vec![spec]);

    let first = dispatcher.dispatch(ApiRequest::new(Method::GET, "/ping"));
    assert_eq!(first.status, 200);
    assert_eq!(first.json_body().unwrap(), json!({"pong": true}));

    let second = dispatcher.execute(ApiRequest::new(Method::GET, "/ping"));
    assert_eq!(second.response.status, 429);
    assert_eq!(second.failed_at, Some(Stage::Throttle));
    let retry: u64 = second.response.get_header("Retry-After").unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry));
    assert_eq!(second.response.json_body().unwrap()["error"], "too_many_requests");

    clock.advance(Duration::from_secs(60));
    let third = dispatcher.dispatch(ApiRequest::new(Method::GET, "/ping"));
    assert_eq!(third.status, 200);
}

#[test]
fn test_authenticated_users_have_their_own_budget() {
    let spec = EndpointSpec::new("ping", "/ping", Method::GET, "app.ping")
        .with_rate(Scope::Anon, ThrottleRate::new(1, Period::Hour))
        .with_rate(Scope::User, ThrottleRate::new(2, Period::Hour));
    let (dispatcher, _store, _clock) = dispatcher_for(vec![spec]);

    let anon = || ApiRequest::new(Method::GET, "/ping");
    let alice = || ApiRequest::new(Method::GET, "/ping").header("X-API-Key", "k-alice");

    assert_eq!(dispatcher.dispatch(anon()).status, 200);
    assert_eq!(dispatcher.dispatch(anon()).status, 429);
    assert_eq!(dispatcher.dispatch(alice()).status, 200);
    assert_eq!(dispatcher.dispatch(alice()).status, 200);
    assert_eq!(dispatcher.dispatch(alice()).status, 429);
}

#[test]
fn test_forwarded_clients_are_counted_separately() {
    let spec = EndpointSpec::new("ping", "/ping", Method::GET, "app.ping")
        .with_rate(Scope::Anon, ThrottleRate::new(1, Period::Minute));
    let (dispatcher, store, _clock) = dispatcher_for(vec![spec]);

    let from = |ip: &str| ApiRequest::new(Method::GET, "/ping").header("X-Forwarded-For", format!("{ip}, 10.0.0.1"));
    assert_eq!(dispatcher.dispatch(from("203.0.113.7")).status, 200);
    assert_eq!(dispatcher.dispatch(from("203.0.113.8")).status, 200);
    assert_eq!(dispatcher.dispatch(from("203.0.113.7")).status, 429);
    assert_eq!(store.len(), 2);
}

fn upload_spec() -> EndpointSpec {
    let mut spec = EndpointSpec::new("upload", "/upload", Method::POST, "app.echo")
        .with_required("file")
        .with_param_doc("file", ParamType::File, "Document to store");
    spec.max_upload_bytes = 8;
    spec
}

#[test]
fn test_missing_file_names_the_field() {
    let (dispatcher, _, _) = dispatcher_for(vec![upload_spec()]);
    let outcome = dispatcher.execute(ApiRequest::new(Method::POST, "/upload").json(json!({"note": "x"})));
    assert_eq!(outcome.response.status, 400);
    assert_eq!(outcome.failed_at, Some(Stage::Validate));
    let body = outcome.response.json_body().unwrap();
    assert_eq!(body["error"], "bad_request");
    assert_eq!(body["field"], "file");
}

#[test]
fn test_oversized_file_is_413() {
    let (dispatcher, _, _) = dispatcher_for(vec![upload_spec()]);
    let req = ApiRequest::new(Method::POST, "/upload")
        .header("Content-Type", "application/octet-stream")
        .bytes(vec![7u8; 16]);
    let resp = dispatcher.dispatch(req);
    assert_eq!(resp.status, 413);
    let body = resp.json_body().unwrap();
    assert_eq!(body["field"], "file");
    assert_eq!(body["limit"], 8);
}

#[test]
fn test_raw_body_within_limit_reaches_handler() {
    let (dispatcher, _, _) = dispatcher_for(vec![upload_spec()]);
    let req = ApiRequest::new(Method::POST, "/upload")
        .header("Content-Type", "text/plain")
        .header("X-Filename", "a.txt")
        .bytes(b"hello".to_vec());
    let resp = dispatcher.dispatch(req);
    assert_eq!(resp.status, 200);
    let file = &resp.json_body().unwrap()["params"]["file"];
    assert_eq!(file["filename"], "a.txt");
    assert_eq!(file["size"], 5);
}

#[test]
fn test_described_file_param_is_held_to_limit() {
    let mut spec = EndpointSpec::new("attach", "/attach", Method::POST, "app.echo")
        .with_param_doc("file", ParamType::File, "Optional attachment");
    spec.max_upload_bytes = 8;
    let (dispatcher, _, _) = dispatcher_for(vec![spec]);
    let outcome = dispatcher.execute(
        ApiRequest::new(Method::POST, "/attach")
            .header("Content-Type", "application/octet-stream")
            .bytes(vec![1u8; 64]),
    );
    assert_eq!(outcome.response.status, 413);
    assert_eq!(outcome.failed_at, Some(Stage::Validate));
    assert_eq!(outcome.response.json_body().unwrap()["field"], "file");
}

#[test]
fn test_described_path_param_is_coerced() {
    let spec = EndpointSpec::new("item", "/items/{id}", Method::GET, "app.echo")
        .with_param_doc("id", ParamType::Integer, "Item id");
    let (dispatcher, _, _) = dispatcher_for(vec![spec]);

    let bad = dispatcher.execute(ApiRequest::new(Method::GET, "/items/abc"));
    assert_eq!(bad.response.status, 400);
    assert_eq!(bad.failed_at, Some(Stage::Validate));
    assert_eq!(bad.response.json_body().unwrap()["field"], "id");

    let ok = dispatcher.dispatch(ApiRequest::new(Method::GET, "/items/42"));
    assert_eq!(ok.status, 200);
    assert_eq!(ok.json_body().unwrap()["params"]["id"], 42);
}

#[test]
fn test_options_requires_same_auth_and_budget() {
    let spec = EndpointSpec::new("secret", "/secret", Method::GET, "app.echo")
        .with_auth(true)
        .with_rate(Scope::User, ThrottleRate::new(1, Period::Minute));
    let (dispatcher, _, _) = dispatcher_for(vec![spec]);

    let anon = dispatcher.execute(ApiRequest::new(Method::OPTIONS, "/secret"));
    assert_eq!(anon.response.status, 401);
    assert_eq!(anon.failed_at, Some(Stage::Auth));
    assert!(anon.response.get_header("Allow").is_none());

    let alice = || ApiRequest::new(Method::OPTIONS, "/secret").header("X-API-Key", "k-alice");
    let first = dispatcher.execute(alice());
    assert_eq!(first.response.status, 200);
    assert_eq!(first.user.as_deref(), Some("alice"));
    assert_eq!(first.response.json_body().unwrap()["name"], "secret");

    let second = dispatcher.execute(alice());
    assert_eq!(second.response.status, 429);
    assert_eq!(second.failed_at, Some(Stage::Throttle));
}

#[test]
fn test_auth_gate_runs_before_throttle_and_validation() {
    let spec = EndpointSpec::new("secret", "/secret", Method::POST, "app.echo")
        .with_auth(true)
        .with_rate(Scope::Anon, ThrottleRate::new(1, Period::Minute))
        .with_required("title");
    let (dispatcher, store, _) = dispatcher_for(vec![spec]);

    for _ in 0..3 {
        let outcome = dispatcher.execute(ApiRequest::new(Method::POST, "/secret"));
        assert_eq!(outcome.response.status, 401);
        assert_eq!(outcome.failed_at, Some(Stage::Auth));
    }
    assert!(store.is_empty(), "rejected requests must not be charged");

    let forbidden = dispatcher.execute(ApiRequest::new(Method::POST, "/secret").header("X-API-Key", "nope"));
    assert_eq!(forbidden.response.status, 403);
    assert_eq!(forbidden.failed_at, Some(Stage::Auth));

    let authed = dispatcher.execute(
        ApiRequest::new(Method::POST, "/secret")
            .header("X-API-Key", "k-alice")
            .json(json!({"title": "q3"})),
    );
    assert_eq!(authed.response.status, 200);
    assert_eq!(authed.failed_at, None);
    assert_eq!(authed.user.as_deref(), Some("alice"));
}

#[test]
fn test_rejected_key_on_public_endpoint_is_anonymous() {
    let spec = EndpointSpec::new("who", "/who", Method::GET, "app.echo");
    let (dispatcher, _, _) = dispatcher_for(vec![spec]);
    let resp = dispatcher.dispatch(ApiRequest::new(Method::GET, "/who").header("X-API-Key", "nope"));
    assert_eq!(resp.status, 200);
    assert_eq!(resp.json_body().unwrap()["user"], serde_json::Value::Null);
}

#[test]
fn test_handler_absence_is_404_despite_default_status() {
    let spec = EndpointSpec::new("process", "/processes/{process_id}", Method::GET, "app.process")
        .with_required("process_id");
    let (dispatcher, _, _) = dispatcher_for(vec![spec]);

    let missing = dispatcher.execute(ApiRequest::new(Method::GET, "/processes/ghost"));
    assert_eq!(missing.response.status, 404);
    assert_eq!(missing.failed_at, Some(Stage::Invoke));
    assert_eq!(missing.endpoint.as_deref(), Some("process"));

    let found = dispatcher.dispatch(ApiRequest::new(Method::GET, "/processes/known"));
    assert_eq!(found.status, 200);
    assert_eq!(found.json_body().unwrap()["state"], "running");
}

#[test]
fn test_unknown_route_is_404() {
    let (dispatcher, _, _) = dispatcher_for(vec![EndpointSpec::new("ping", "/ping", Method::GET, "app.ping")]);
    let outcome = dispatcher.execute(ApiRequest::new(Method::GET, "/nowhere"));
    assert_eq!(outcome.response.status, 404);
    assert_eq!(outcome.failed_at, Some(Stage::Route));
    assert_eq!(outcome.endpoint, None);

    let wrong_method = dispatcher.dispatch(ApiRequest::new(Method::DELETE, "/ping"));
    assert_eq!(wrong_method.status, 404);
}

#[test]
fn test_handler_panic_is_500_and_dispatcher_survives() {
    let specs = vec![
        EndpointSpec::new("boom", "/boom", Method::GET, "app.boom"),
        EndpointSpec::new("ping", "/ping", Method::GET, "app.ping"),
    ];
    let (dispatcher, _, _) = dispatcher_for(specs);

    let outcome = dispatcher.execute(ApiRequest::new(Method::GET, "/boom"));
    assert_eq!(outcome.response.status, 500);
    assert_eq!(outcome.failed_at, Some(Stage::Invoke));
    assert_eq!(outcome.response.json_body().unwrap()["error"], "internal_error");

    assert_eq!(dispatcher.dispatch(ApiRequest::new(Method::GET, "/ping")).status, 200);
}

#[test]
fn test_undocumented_status_is_rejected() {
    let (dispatcher, _, _) = dispatcher_for(vec![EndpointSpec::new("tea", "/tea", Method::GET, "app.teapot")]);
    let outcome = dispatcher.execute(ApiRequest::new(Method::GET, "/tea"));
    assert_eq!(outcome.response.status, 500);
    assert_eq!(outcome.failed_at, Some(Stage::Render));

    let documented = EndpointSpec::new("tea", "/tea", Method::GET, "app.teapot").with_response(418, "Short and stout");
    let (dispatcher, _, _) = dispatcher_for(vec![documented]);
    assert_eq!(dispatcher.dispatch(ApiRequest::new(Method::GET, "/tea")).status, 418);
}

#[test]
fn test_declared_status_code_is_used() {
    let mut spec = EndpointSpec::new("create", "/widgets", Method::POST, "app.ping");
    spec.status_code = 201;
    let (dispatcher, _, _) = dispatcher_for(vec![spec]);
    assert_eq!(dispatcher.dispatch(ApiRequest::new(Method::POST, "/widgets")).status, 201);
}

#[test]
fn test_defaults_and_coercion_reach_handler() {
    let spec = EndpointSpec::new("search", "/search", Method::GET, "app.echo")
        .with_required("q")
        .with_optional("limit", json!(10))
        .with_optional("exact", json!(false))
        .with_param_doc("limit", ParamType::Integer, "Page size")
        .with_param_doc("exact", ParamType::Boolean, "Exact match");
    let (dispatcher, _, _) = dispatcher_for(vec![spec]);

    let resp = dispatcher.dispatch(ApiRequest::new(Method::GET, "/search").query_param("q", "rust"));
    let params = &resp.json_body().unwrap()["params"];
    assert_eq!(params["q"], "rust");
    assert_eq!(params["limit"], 10);
    assert_eq!(params["exact"], false);

    let resp = dispatcher.dispatch(
        ApiRequest::new(Method::GET, "/search")
            .query_param("q", "rust")
            .query_param("limit", "25")
            .query_param("exact", "yes"),
    );
    let params = &resp.json_body().unwrap()["params"];
    assert_eq!(params["limit"], 25);
    assert_eq!(params["exact"], true);

    let bad = dispatcher.dispatch(
        ApiRequest::new(Method::GET, "/search")
            .query_param("q", "rust")
            .query_param("limit", "many"),
    );
    assert_eq!(bad.status, 400);
    assert_eq!(bad.json_body().unwrap()["field"], "limit");
}

#[test]
fn test_options_lists_allowed_methods() {
    let mut list = EndpointSpec::new("list_widgets", "/widgets", Method::GET, "app.ping");
    list.description = "Lists widgets".to_string();
    list.renderers = vec![RendererKind::Json, RendererKind::Browsable];
    let create = EndpointSpec::new("create_widget", "/widgets", Method::POST, "app.ping");
    let (dispatcher, _, _) = dispatcher_for(vec![list, create]);

    let resp = dispatcher.dispatch(ApiRequest::new(Method::OPTIONS, "/widgets"));
    assert_eq!(resp.status, 200);
    let body = resp.json_body().unwrap();
    assert_eq!(body["name"], "list_widgets");
    assert_eq!(body["description"], "Lists widgets");
    let methods: Vec<&str> = body["allowed_methods"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m.as_str())
        .collect();
    for m in ["GET", "POST", "OPTIONS"] {
        assert!(methods.contains(&m), "missing {m} in {methods:?}");
    }
    assert_eq!(body["renders"], json!(["application/json", "text/html; charset=utf-8"]));
    let allow = resp.get_header("Allow").unwrap();
    assert!(allow.contains("GET") && allow.contains("POST"));

    let nothing = dispatcher.dispatch(ApiRequest::new(Method::OPTIONS, "/gadgets"));
    assert_eq!(nothing.status, 404);
}

#[test]
fn test_browsable_rendering_on_request() {
    let mut spec = EndpointSpec::new("list_widgets", "/widgets", Method::GET, "app.ping")
        .with_optional("color", json!("blue"))
        .with_param_doc("color", ParamType::String, "Filter by colour");
    spec.description = "Lists widgets".to_string();
    spec.renderers = vec![RendererKind::Json, RendererKind::Browsable];
    let (dispatcher, _, _) = dispatcher_for(vec![spec]);

    let html = dispatcher.dispatch(ApiRequest::new(Method::GET, "/widgets").header("Accept", "text/html"));
    assert_eq!(html.status, 200);
    assert!(html.content_type.starts_with("text/html"));
    let page = String::from_utf8(html.body).unwrap();
    assert!(page.contains("list_widgets"));
    assert!(page.contains("Lists widgets"));
    assert!(page.contains("Filter by colour"));
    assert!(page.contains("pong"));

    let json_resp = dispatcher.dispatch(ApiRequest::new(Method::GET, "/widgets").query_param("format", "json"));
    assert_eq!(json_resp.content_type, "application/json");

    let default = dispatcher.dispatch(ApiRequest::new(Method::GET, "/widgets"));
    assert_eq!(default.content_type, "application/json");
}

#[test]
fn test_html_not_declared_falls_back_to_json() {
    let (dispatcher, _, _) = dispatcher_for(vec![EndpointSpec::new("ping", "/ping", Method::GET, "app.ping")]);
    let resp = dispatcher.dispatch(ApiRequest::new(Method::GET, "/ping").header("Accept", "text/html"));
    assert_eq!(resp.content_type, "application/json");
}

#[test]
fn test_binary_payload_sets_disposition() {
    let spec = EndpointSpec::new("download", "/reports/{name}", Method::GET, "app.download");
    let (dispatcher, _, _) = dispatcher_for(vec![spec]);
    let resp = dispatcher.dispatch(ApiRequest::new(Method::GET, "/reports/q3"));
    assert_eq!(resp.status, 200);
    assert_eq!(resp.content_type, "application/pdf");
    assert_eq!(resp.get_header("Content-Disposition"), Some("attachment; filename=\"q3.pdf\""));
    assert_eq!(resp.body, b"%PDF-1.4");
}

#[test]
fn test_every_response_carries_request_id() {
    let (dispatcher, _, _) = dispatcher_for(vec![EndpointSpec::new("ping", "/ping", Method::GET, "app.ping")]);
    let req = ApiRequest::new(Method::GET, "/missing");
    let id = req.request_id.to_string();
    let resp = dispatcher.dispatch(req);
    assert_eq!(resp.get_header("X-Request-Id"), Some(id.as_str()));
}
