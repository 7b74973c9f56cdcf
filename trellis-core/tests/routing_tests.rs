use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use trellis_core::{
    Application, Args, ComponentDescriptor, Error, ExceptionMapping, Failure, FrontFilter,
    HttpRequest, HttpResponse, Next, ParamSpec, RequestContext, ResponseSink, RouteMapping,
    TypeDescriptor,
};

fn body_json(response: &HttpResponse) -> Value {
    serde_json::from_slice(&response.body).unwrap()
}

// ---------- components ----------

#[derive(Default)]
struct Repo;

impl Repo {
    fn find(&self, id: u32) -> String {
        format!("item-{}", id)
    }
}

#[derive(Default)]
struct Service {
    repo: Option<Arc<Repo>>,
}

impl Service {
    fn describe(&self, id: u32) -> String {
        self.repo
            .as_ref()
            .map(|repo| repo.find(id))
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct Ctrl {
    service: Option<Arc<Service>>,
}

#[derive(Debug, Deserialize)]
struct NewItem {
    name: String,
    quantity: u32,
}

#[derive(Debug)]
struct OutOfStock(String);

impl std::fmt::Display for OutOfStock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} is out of stock", self.0)
    }
}

impl std::error::Error for OutOfStock {}

fn repo() -> TypeDescriptor {
    ComponentDescriptor::<Repo>::component().build()
}

fn service() -> TypeDescriptor {
    ComponentDescriptor::<Service>::component()
        .inject("repo", |s: &mut Service, r: Arc<Repo>| s.repo = Some(r))
        .build()
}

fn ctrl() -> TypeDescriptor {
    ComponentDescriptor::<Ctrl>::handler_group("/x")
        .inject("service", |c: &mut Ctrl, s: Arc<Service>| c.service = Some(s))
        .route(
            RouteMapping::get("/").also("/list"),
            ComponentDescriptor::<Ctrl>::method(
                "list",
                [
                    ParamSpec::scalar::<u32>().query("limit"),
                    ParamSpec::of::<RequestContext>(),
                ],
                |_ctrl: Arc<Ctrl>, mut args: Args| async move {
                    let limit: Option<u32> = args.take(0);
                    let ctx: RequestContext = args.require(1)?;
                    ctx.response().end_json(&json!({ "limit": limit }))?;
                    Ok(())
                },
            ),
        )
        .route(
            RouteMapping::get("/:id"),
            ComponentDescriptor::<Ctrl>::method(
                "show",
                [
                    ParamSpec::scalar::<u32>().path("id"),
                    ParamSpec::of::<Service>(),
                    ParamSpec::of::<RequestContext>(),
                ],
                |ctrl: Arc<Ctrl>, mut args: Args| async move {
                    let id: Option<u32> = args.take(0);
                    let service: Arc<Service> = args.require(1)?;
                    let ctx: RequestContext = args.require(2)?;
                    let injected = ctrl.service.as_ref().is_some_and(|s| Arc::ptr_eq(s, &service));
                    if !injected {
                        return Err(Error::Internal("bound service differs from the injected one".into()));
                    }
                    let body = match id {
                        Some(id) => json!({ "id": id, "item": service.describe(id) }),
                        None => json!({ "id": null }),
                    };
                    ctx.response().end_json(&body)?;
                    Ok(())
                },
            ),
        )
        .route(
            RouteMapping::post("/").consumes("application/json"),
            ComponentDescriptor::<Ctrl>::method(
                "create",
                [
                    ParamSpec::json::<NewItem>().body(),
                    ParamSpec::of::<RequestContext>(),
                    ParamSpec::of::<ResponseSink>(),
                ],
                |_ctrl: Arc<Ctrl>, mut args: Args| async move {
                    let item: NewItem = args.require(0)?;
                    let sink: ResponseSink = args.require(2)?;
                    if item.quantity == 0 {
                        return Err(Error::handler(OutOfStock(item.name)));
                    }
                    sink.set_status(201);
                    sink.end_json(&json!({ "created": item.name }))?;
                    Ok(())
                },
            ),
        )
        .route(
            RouteMapping::get("/report/csv").produces("text/csv"),
            ComponentDescriptor::<Ctrl>::method(
                "report",
                [ParamSpec::of::<RequestContext>()],
                |_ctrl: Arc<Ctrl>, mut args: Args| async move {
                    let ctx: RequestContext = args.require(0)?;
                    ctx.response().end("id,item\n");
                    Ok(())
                },
            ),
        )
        .build()
}

fn app(extra: Vec<TypeDescriptor>) -> Application {
    Application::builder()
        .component(ctrl())
        .component(service())
        .component(repo())
        .components(extra)
        .build()
        .unwrap()
}

// ---------- routing ----------

#[tokio::test]
async fn test_get_binds_path_and_component() {
    let app = app(Vec::new());
    let response = app.handle(HttpRequest::new("GET", "/x/42")).await;

    assert_eq!(response.status, 200);
    assert_eq!(body_json(&response), json!({ "id": 42, "item": "item-42" }));
    assert_eq!(
        response.headers.get("Content-Type").map(String::as_str),
        Some("application/json")
    );

    let ctrl = app.registry().get::<Ctrl>().unwrap();
    let service = app.registry().get::<Service>().unwrap();
    assert!(Arc::ptr_eq(ctrl.service.as_ref().unwrap(), &service));
}

#[tokio::test]
async fn test_unparsable_path_segment_binds_absent() {
    let app = app(Vec::new());
    let response = app.handle(HttpRequest::new("GET", "/x/abc")).await;

    assert_eq!(response.status, 200);
    assert_eq!(body_json(&response), json!({ "id": null }));
}

#[tokio::test]
async fn test_query_parameters() {
    let app = app(Vec::new());

    let response = app.handle(HttpRequest::new("GET", "/x/list?limit=5")).await;
    assert_eq!(body_json(&response), json!({ "limit": 5 }));

    let response = app.handle(HttpRequest::new("GET", "/x?limit=many")).await;
    assert_eq!(body_json(&response), json!({ "limit": null }));
}

#[tokio::test]
async fn test_post_json_body() {
    let app = app(Vec::new());
    let request = HttpRequest::new("POST", "/x")
        .with_json(&json!({ "name": "bolt", "quantity": 3 }))
        .unwrap();

    let response = app.handle(request).await;
    assert_eq!(response.status, 201);
    assert_eq!(body_json(&response), json!({ "created": "bolt" }));
}

#[tokio::test]
async fn test_malformed_body_is_a_bad_request() {
    let app = app(Vec::new());
    let request = HttpRequest::new("POST", "/x")
        .with_header("Content-Type", "application/json")
        .with_body("{not json");

    let response = app.handle(request).await;
    assert_eq!(response.status, 400);
    assert!(response.body_str().contains("Deserialization error"));
}

#[tokio::test]
async fn test_unsupported_media_type() {
    let app = app(Vec::new());
    let request = HttpRequest::new("POST", "/x")
        .with_header("Content-Type", "text/plain")
        .with_body("bolt");

    let response = app.handle(request).await;
    assert_eq!(response.status, 415);
    assert_eq!(body_json(&response)["status"], json!(415));
}

#[tokio::test]
async fn test_not_acceptable() {
    let app = app(Vec::new());
    let request = HttpRequest::new("GET", "/x/report/csv").with_header("Accept", "application/json");

    let response = app.handle(request).await;
    assert_eq!(response.status, 406);

    let request = HttpRequest::new("GET", "/x/report/csv").with_header("Accept", "text/*");
    let response = app.handle(request).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body_str(), "id,item\n");
    assert_eq!(response.headers.get("Content-Type").map(String::as_str), Some("text/csv"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = app(Vec::new());
    let response = app.handle(HttpRequest::new("DELETE", "/x/1")).await;

    assert_eq!(response.status, 404);
    assert_eq!(body_json(&response)["status"], json!(404));
}

// ---------- catch-all ----------

#[derive(Default)]
struct Fallback;

fn fallback() -> TypeDescriptor {
    ComponentDescriptor::<Fallback>::handler_group("")
        .route(
            RouteMapping::catch_all(),
            ComponentDescriptor::<Fallback>::method(
                "fallback",
                [ParamSpec::of::<RequestContext>()],
                |_f: Arc<Fallback>, mut args: Args| async move {
                    let ctx: RequestContext = args.require(0)?;
                    ctx.response().set_status(418);
                    ctx.response().end(format!("fallback for {}", ctx.request().path));
                    Ok(())
                },
            ),
        )
        .build()
}

#[tokio::test]
async fn test_catch_all_receives_unmatched_requests() {
    let app = app(vec![fallback()]);
    assert!(app.router().catch_all().is_some());

    let response = app.handle(HttpRequest::new("GET", "/nowhere")).await;
    assert_eq!(response.status, 418);
    assert_eq!(response.body_str(), "fallback for /nowhere");

    let response = app.handle(HttpRequest::new("GET", "/x/7")).await;
    assert_eq!(response.status, 200);
}

// ---------- registration ----------

#[derive(Default)]
struct Broken;

#[test]
fn test_route_without_context_parameter_is_rejected() {
    let broken = ComponentDescriptor::<Broken>::handler_group("/broken")
        .route(
            RouteMapping::get("/"),
            ComponentDescriptor::<Broken>::method(
                "orphan",
                [ParamSpec::of::<ResponseSink>(), ParamSpec::scalar::<u32>().query("page")],
                |_b: Arc<Broken>, _args: Args| async move { Ok(()) },
            ),
        )
        .build();

    match Application::builder().component(broken).build() {
        Err(Error::MalformedRegistration {
            method, parameters, ..
        }) => {
            assert_eq!(method, "orphan");
            assert!(parameters.contains("ResponseSink"));
            assert!(parameters.contains("u32"));
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("expected malformed registration"),
    }
}

#[test]
fn test_missing_dependency_aborts_build() {
    let result = Application::builder().component(ctrl()).component(service()).build();
    match result {
        Err(Error::UnsatisfiedDependency {
            component,
            requirement,
        }) => {
            assert!(component.ends_with("Ctrl"));
            assert!(requirement.ends_with("Service"));
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("expected unsatisfied dependency"),
    }
}

// ---------- front filter ----------

#[derive(Default)]
struct ApiKeyFilter {
    seen: AtomicUsize,
}

#[async_trait]
impl FrontFilter for ApiKeyFilter {
    async fn intercept(&self, ctx: RequestContext, next: Next) -> Result<(), Error> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        if ctx.request().header("x-api-key").is_none() {
            ctx.response().set_status(401);
            ctx.response().end("missing api key");
            return Ok(());
        }
        ctx.response().put_header("X-Filtered", "yes");
        next(ctx).await
    }
}

fn api_key_filter() -> TypeDescriptor {
    ComponentDescriptor::<ApiKeyFilter>::front_filter()
        .provides(|f: Arc<ApiKeyFilter>| f as Arc<dyn FrontFilter>)
        .build()
}

#[tokio::test]
async fn test_front_filter_wraps_every_request() {
    let app = app(vec![api_key_filter()]);
    assert!(app.router().has_front_filter());

    let response = app.handle(HttpRequest::new("GET", "/x/1")).await;
    assert_eq!(response.status, 401);
    assert_eq!(response.body_str(), "missing api key");

    let request = HttpRequest::new("GET", "/x/1").with_header("X-Api-Key", "secret");
    let response = app.handle(request).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.headers.get("X-Filtered").map(String::as_str), Some("yes"));

    let request = HttpRequest::new("GET", "/missing").with_header("X-Api-Key", "secret");
    let response = app.handle(request).await;
    assert_eq!(response.status, 404);

    let filter = app.registry().get::<ApiKeyFilter>().unwrap();
    assert_eq!(filter.seen.load(Ordering::SeqCst), 3);
}

// ---------- exception mapping ----------

#[derive(Default)]
struct StockAdvice;

fn stock_advice() -> TypeDescriptor {
    ComponentDescriptor::<StockAdvice>::error_handlers()
        .exception_handler(
            ExceptionMapping::of::<OutOfStock>(),
            ComponentDescriptor::<StockAdvice>::method(
                "out_of_stock",
                [ParamSpec::of::<Failure>(), ParamSpec::of::<ResponseSink>()],
                |_a: Arc<StockAdvice>, mut args: Args| async move {
                    let failure: Failure = args.require(0)?;
                    let sink: ResponseSink = args.require(1)?;
                    let message = failure
                        .downcast_ref::<OutOfStock>()
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    sink.set_status(409);
                    sink.end_json(&json!({ "conflict": message }))?;
                    Ok(())
                },
            ),
        )
        .exception_handler(
            ExceptionMapping::any(),
            ComponentDescriptor::<StockAdvice>::method(
                "anything",
                [ParamSpec::of::<ResponseSink>()],
                |_a: Arc<StockAdvice>, mut args: Args| async move {
                    let sink: ResponseSink = args.require(0)?;
                    sink.end("handled generically");
                    Ok(())
                },
            ),
        )
        .build()
}

#[tokio::test]
async fn test_exact_exception_mapping() {
    let app = app(vec![stock_advice()]);
    let request = HttpRequest::new("POST", "/x")
        .with_json(&json!({ "name": "nut", "quantity": 0 }))
        .unwrap();

    let response = app.handle(request).await;
    assert_eq!(response.status, 409);
    assert_eq!(body_json(&response), json!({ "conflict": "nut is out of stock" }));
}

#[tokio::test]
async fn test_generic_exception_mapping() {
    let app = app(vec![stock_advice()]);
    let request = HttpRequest::new("POST", "/x")
        .with_header("Content-Type", "application/json")
        .with_body("[]");

    let response = app.handle(request).await;
    assert_eq!(response.status, 400);
    assert_eq!(response.body_str(), "handled generically");
}

#[tokio::test]
async fn test_unmapped_failure_writes_message() {
    let app = app(Vec::new());
    let request = HttpRequest::new("POST", "/x")
        .with_json(&json!({ "name": "washer", "quantity": 0 }))
        .unwrap();

    let response = app.handle(request).await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body_str(), "washer is out of stock");
    assert!(
        response
            .headers
            .get("Content-Type")
            .is_some_and(|ct| ct.starts_with("text/plain"))
    );
}

#[derive(Default)]
struct ConflictAdvice;

#[derive(Default)]
struct CatchAllAdvice {
    invocations: AtomicUsize,
}

fn conflict_advice() -> TypeDescriptor {
    ComponentDescriptor::<ConflictAdvice>::error_handlers()
        .exception_handler(
            ExceptionMapping::of::<OutOfStock>(),
            ComponentDescriptor::<ConflictAdvice>::method(
                "conflict",
                [ParamSpec::of::<ResponseSink>()],
                |_a: Arc<ConflictAdvice>, mut args: Args| async move {
                    let sink: ResponseSink = args.require(0)?;
                    sink.set_status(409);
                    Ok(())
                },
            ),
        )
        .build()
}

fn catch_all_advice() -> TypeDescriptor {
    ComponentDescriptor::<CatchAllAdvice>::error_handlers()
        .exception_handler(
            ExceptionMapping::any(),
            ComponentDescriptor::<CatchAllAdvice>::method(
                "anything",
                [ParamSpec::of::<ResponseSink>()],
                |advice: Arc<CatchAllAdvice>, mut args: Args| async move {
                    let sink: ResponseSink = args.require(0)?;
                    advice.invocations.fetch_add(1, Ordering::SeqCst);
                    sink.end("handled by the second group");
                    Ok(())
                },
            ),
        )
        .build()
}

#[tokio::test]
async fn test_first_handling_group_stops_dispatch() {
    let app = app(vec![conflict_advice(), catch_all_advice()]);
    let request = HttpRequest::new("POST", "/x")
        .with_json(&json!({ "name": "rivet", "quantity": 0 }))
        .unwrap();

    let response = app.handle(request).await;
    assert_eq!(response.status, 409);
    assert!(response.body.is_empty());

    let second = app.registry().get::<CatchAllAdvice>().unwrap();
    assert_eq!(second.invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_later_group_handles_what_earlier_groups_skip() {
    let app = app(vec![conflict_advice(), catch_all_advice()]);
    let request = HttpRequest::new("POST", "/x")
        .with_header("Content-Type", "application/json")
        .with_body("[]");

    let response = app.handle(request).await;
    assert_eq!(response.status, 400);
    assert_eq!(response.body_str(), "handled by the second group");

    let second = app.registry().get::<CatchAllAdvice>().unwrap();
    assert_eq!(second.invocations.load(Ordering::SeqCst), 1);
}

// ---------- lifecycle ----------

#[derive(Default)]
struct Warmup {
    runs: AtomicUsize,
}

#[test]
fn test_application_runs_init_hooks() {
    let warmup = ComponentDescriptor::<Warmup>::component()
        .on_init("warm", |w, registry| {
            assert!(registry.contains::<Repo>());
            w.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build();

    let app = app(vec![warmup]);
    assert_eq!(app.invoke_init_hooks().ok(), Some(1));
    assert_eq!(app.registry().get::<Warmup>().unwrap().runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_application_reads_port_from_config() {
    let config: HashMap<String, String> =
        [("trellis.port".to_string(), "9191".to_string())].into_iter().collect();
    let app = Application::builder().config(config).build().unwrap();
    assert_eq!(app.options().port, 9191);
    assert!(!app.router().has_endpoints());
}

// ---------- server start ----------

#[tokio::test]
async fn test_start_callback_reports_bound_address() {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = std::sync::Mutex::new(Some(tx));
    let app = Application::builder()
        .component(ctrl())
        .component(service())
        .component(repo())
        .on_start(move |addr| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(addr);
            }
        })
        .build()
        .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let expected = listener.local_addr().unwrap();
    let server = tokio::spawn(app.serve(listener));

    assert_eq!(rx.await.unwrap(), expected);
    server.abort();
}

#[tokio::test]
async fn test_start_failure_callback_on_taken_port() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let config: HashMap<String, String> = [
        ("trellis.host".to_string(), "127.0.0.1".to_string()),
        ("trellis.port".to_string(), port.to_string()),
    ]
    .into_iter()
    .collect();

    let failures = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&failures);
    let app = Application::builder()
        .component(ctrl())
        .component(service())
        .component(repo())
        .config(config)
        .on_start_failure(move |e| {
            assert!(matches!(e, Error::Io(_)));
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    assert!(matches!(app.listen().await, Err(Error::Io(_))));
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    drop(taken);
}
