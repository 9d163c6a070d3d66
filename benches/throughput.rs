use autoroute::dispatcher::{ApiRequest, Dispatcher};
use autoroute::handlers::{HandlerContext, HandlerError, HandlerOutcome, HandlerTable};
use autoroute::registry::Registry;
use autoroute::spec::{load_endpoints_from_str, Period, Scope, ThrottleRate};
use autoroute::throttle::{InMemoryThrottleStore, ThrottleStore};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use http::Method;
use serde_json::json;
use std::sync::Arc;

const ZOO: &str = r#"
root:
  path: /
  method: GET
  handler: zoo.ok
animals:
  path: /zoo/animals
  method: GET
  handler: zoo.ok
create_animal:
  path: /zoo/animals
  method: POST
  handler: zoo.ok
animal:
  path: /zoo/animals/{id}
  method: GET
  handler: zoo.ok
  optional_params:
    verbose: false
  params_description:
    verbose: {type: boolean, description: Include history}
animal_toy:
  path: /zoo/animals/{id}/toys/{toy_id}
  method: GET
  handler: zoo.ok
habitat_section:
  path: /zoo/{category}/animals/{id}/habitats/{habitat_id}/sections/{section_id}
  method: GET
  handler: zoo.ok
item_batch:
  path: /inventory/{warehouse_id}/feeds/{feed_id}/items/{item_id}/batches/{batch_id}
  method: POST
  handler: zoo.ok
"#;

fn registry() -> Registry {
    let mut handlers = HandlerTable::new();
    handlers.register("zoo.ok", |_: &HandlerContext| {
        Ok::<_, HandlerError>(HandlerOutcome::json(json!({"ok": true})))
    });
    let specs = load_endpoints_from_str(ZOO, "zoo.yaml").expect("bench endpoints");
    Registry::build(specs, &handlers).expect("bench registry")
}

fn bench_route_lookup(c: &mut Criterion) {
    let registry = registry();
    let paths = [
        (Method::GET, "/zoo/animals"),
        (Method::GET, "/zoo/animals/123"),
        (Method::GET, "/zoo/animals/123/toys/456"),
        (Method::GET, "/zoo/cats/animals/123/habitats/88/sections/5"),
        (Method::POST, "/inventory/1/feeds/2/items/3/batches/4"),
    ];
    c.bench_function("route_lookup", |b| {
        b.iter(|| {
            for (method, path) in &paths {
                black_box(registry.lookup(method, path));
            }
        })
    });
}

fn bench_throttle_check(c: &mut Criterion) {
    let store = InMemoryThrottleStore::new();
    let rate = ThrottleRate::new(u32::MAX, Period::Hour);
    let clients: Vec<String> = (0..64).map(|i| format!("10.0.0.{i}")).collect();
    c.bench_function("throttle_check", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let client = &clients[i % clients.len()];
            i += 1;
            black_box(store.check("animal", Scope::Anon, client, &rate))
        })
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let dispatcher = Dispatcher::new(Arc::new(registry()))
        .with_throttle_store(Arc::new(InMemoryThrottleStore::new()));
    c.bench_function("dispatch_templated_get", |b| {
        b.iter(|| {
            let req = ApiRequest::new(Method::GET, "/zoo/animals/42").query_param("verbose", "true");
            black_box(dispatcher.dispatch(req))
        })
    });
}

criterion_group!(benches, bench_route_lookup, bench_throttle_check, bench_dispatch);
criterion_main!(benches);
