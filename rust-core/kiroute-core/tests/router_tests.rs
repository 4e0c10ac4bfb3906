//! End-to-end routing behavior driven through `App::handle_request`.

use hyper::{Method, StatusCode};
use kiroute_core::{App, Clock, Context, Dep, Error, Request, Result, Vars, Writer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct ManualClock(Mutex<Instant>);

impl ManualClock {
    fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Instant::now())))
    }

    fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.0.lock().unwrap()
    }
}

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    (Arc::clone(&calls), calls)
}

fn reply(body: &'static str) -> impl Fn(&mut Context) -> Result<()> + Send + Sync + 'static {
    move |ctx: &mut Context| ctx.text(StatusCode::OK, body)
}

#[test]
fn test_literal_beats_placeholder() {
    let app = App::new();
    app.get("/users/:id", reply("param")).unwrap();
    app.get("/users/me", reply("literal")).unwrap();

    assert_eq!(app.test_request(Method::GET, "/users/me").body_string(), "literal");
    assert_eq!(app.test_request(Method::GET, "/users/42").body_string(), "param");
}

#[test]
fn test_constraint_rejection_falls_through() {
    let app = App::new();
    app.get("/items/:id(\\d+)", |ctx: &mut Context| {
        let id = ctx.param("id").unwrap_or("").to_string();
        ctx.text(StatusCode::OK, &format!("number {id}"))
    })
    .unwrap();
    app.get("/items/:slug", |ctx: &mut Context| {
        let slug = ctx.param("slug").unwrap_or("").to_string();
        ctx.text(StatusCode::OK, &format!("slug {slug}"))
    })
    .unwrap();

    assert_eq!(app.test_request(Method::GET, "/items/17").body_string(), "number 17");
    assert_eq!(app.test_request(Method::GET, "/items/abc").body_string(), "slug abc");
}

#[test]
fn test_constraint_rejection_without_fallback_is_404() {
    let app = App::new();
    app.get("/items/:id(\\d+)", reply("number")).unwrap();

    let res = app.test_request(Method::GET, "/items/abc");
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body_string(), "404 page not found\n");
}

#[test]
fn test_regex_var_constrains_placeholder() {
    let app = App::new();
    app.path("/posts/:year")
        .regex_var("year", "[0-9]{4}")
        .method("get")
        .handle(reply("archive"))
        .unwrap();

    assert_eq!(app.test_request(Method::GET, "/posts/2024").status, StatusCode::OK);
    assert_eq!(app.test_request(Method::GET, "/posts/24").status, StatusCode::NOT_FOUND);
}

#[test]
fn test_prefix_route_matches_any_depth() {
    let app = App::new();
    app.path_prefix("/files/").method("GET").handle(reply("files")).unwrap();

    assert_eq!(app.test_request(Method::GET, "/files/abc/deep/path").body_string(), "files");
    assert_eq!(app.test_request(Method::GET, "/filesystem").status, StatusCode::NOT_FOUND);
}

#[test]
fn test_exact_route_beats_prefix_route() {
    let app = App::new();
    app.path_prefix("/static/").method("GET").handle(reply("prefix")).unwrap();
    app.get("/static/logo.png", reply("exact")).unwrap();

    assert_eq!(app.test_request(Method::GET, "/static/logo.png").body_string(), "exact");
    assert_eq!(app.test_request(Method::GET, "/static/app.js").body_string(), "prefix");
}

#[test]
fn test_method_domain_and_headers_filter() {
    let app = App::new();
    app.domain("api.example.com").get("/ping", reply("api")).unwrap();
    app.path("/ping")
        .headers(&[("X-Version", "2")])
        .method("GET")
        .handle(reply("v2"))
        .unwrap();

    let api = app.handle_request(Request::new(Method::GET, "/ping").with_host("api.example.com"));
    assert_eq!(api.body_string(), "api");

    let v2 = app.handle_request(Request::new(Method::GET, "/ping").with_header("x-version", "2"));
    assert_eq!(v2.body_string(), "v2");

    assert_eq!(app.test_request(Method::GET, "/ping").status, StatusCode::NOT_FOUND);
    assert_eq!(app.test_request(Method::POST, "/ping").status, StatusCode::NOT_FOUND);
}

#[test]
fn test_cache_hit_replays_without_calling_handler() {
    let app = App::new();
    let clock = ManualClock::new();
    let (calls, seen) = counter();
    app.path("/report")
        .cache_with_clock(Duration::from_secs(60), clock.clone())
        .method("GET")
        .handle(move |ctx: &mut Context| -> Result<()> {
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            ctx.set_header("X-Run", &n.to_string());
            ctx.text(StatusCode::CREATED, &format!("run {n}"))
        })
        .unwrap();

    let first = app.test_request(Method::GET, "/report");
    let second = app.test_request(Method::GET, "/report");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(second.status, first.status);
    assert_eq!(second.body, first.body);
    assert_eq!(second.header("x-run"), Some("1"));
    assert_eq!(second.header("content-type"), first.header("content-type"));
}

#[test]
fn test_cache_expiry_runs_handler_again() {
    let app = App::new();
    let clock = ManualClock::new();
    let (calls, seen) = counter();
    app.path("/report")
        .cache_with_clock(Duration::from_secs(10), clock.clone())
        .method("GET")
        .handle(move |ctx: &mut Context| -> Result<()> {
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            ctx.text(StatusCode::OK, &format!("run {n}"))
        })
        .unwrap();

    assert_eq!(app.test_request(Method::GET, "/report").body_string(), "run 1");
    clock.advance(Duration::from_secs(9));
    assert_eq!(app.test_request(Method::GET, "/report").body_string(), "run 1");
    clock.advance(Duration::from_secs(2));
    assert_eq!(app.test_request(Method::GET, "/report").body_string(), "run 2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_cached_route_failure_is_not_stored() {
    let app = App::new();
    let clock = ManualClock::new();
    let (calls, seen) = counter();
    app.path("/flaky")
        .cache_with_clock(Duration::from_secs(60), clock)
        .method("GET")
        .handle(move |ctx: &mut Context| -> Result<()> {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(Error::status(StatusCode::SERVICE_UNAVAILABLE, "warming up"));
            }
            ctx.text(StatusCode::OK, "ready")
        })
        .unwrap();

    assert_eq!(app.test_request(Method::GET, "/flaky").status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(app.test_request(Method::GET, "/flaky").body_string(), "ready");
    assert_eq!(app.test_request(Method::GET, "/flaky").body_string(), "ready");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_middleware_short_circuit() {
    let app = App::new();
    let (calls, seen) = counter();
    app.path("/admin")
        .use_middleware(|ctx: &mut Context| -> Result<()> {
            if ctx.header("x-admin").is_none() {
                return ctx.text(StatusCode::FORBIDDEN, "denied");
            }
            ctx.next()
        })
        .method("GET")
        .handle(move |ctx: &mut Context| -> Result<()> {
            seen.fetch_add(1, Ordering::SeqCst);
            ctx.text(StatusCode::OK, "welcome")
        })
        .unwrap();

    let denied = app.test_request(Method::GET, "/admin");
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let allowed = app.handle_request(Request::new(Method::GET, "/admin").with_header("X-Admin", "1"));
    assert_eq!(allowed.body_string(), "welcome");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_double_next_runs_handler_once_and_fails() {
    let app = App::new();
    let (calls, seen) = counter();
    app.use_middleware(|ctx: &mut Context| -> Result<()> {
        ctx.next()?;
        ctx.next()
    });
    app.get("/twice", move || {
        seen.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    let res = app.test_request(Method::GET, "/twice");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn test_middlewares_run_in_registration_order() {
    let app = App::new();
    let trace = Arc::new(Mutex::new(Vec::<&'static str>::new()));
    let (a, b, h) = (Arc::clone(&trace), Arc::clone(&trace), Arc::clone(&trace));
    app.use_middleware(move |ctx: &mut Context| -> Result<()> {
        a.lock().unwrap().push("global:in");
        ctx.next()?;
        a.lock().unwrap().push("global:out");
        Ok(())
    });
    app.group("/g")
        .use_middleware(move |ctx: &mut Context| -> Result<()> {
            b.lock().unwrap().push("local:in");
            ctx.next()?;
            b.lock().unwrap().push("local:out");
            Ok(())
        })
        .get("/x", move || h.lock().unwrap().push("handler"))
        .unwrap();

    let _ = app.test_request(Method::GET, "/g/x");
    assert_eq!(
        *trace.lock().unwrap(),
        vec!["global:in", "local:in", "handler", "local:out", "global:out"]
    );
}

#[test]
fn test_panic_is_recovered_and_after_each_runs_once() {
    let app = App::new();
    let (after, seen_after) = counter();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen_errors = Arc::clone(&errors);
    app.after_each(move |_: &mut Context| {
        seen_after.fetch_add(1, Ordering::SeqCst);
    });
    app.on_error(move |ctx: &mut Context, err: &Error| {
        seen_errors.lock().unwrap().push(err.to_string());
        let _ = ctx.text(StatusCode::INTERNAL_SERVER_ERROR, "recovered");
    });
    app.get("/panic", || -> Result<()> { panic!("kaboom") }).unwrap();

    let res = app.test_request(Method::GET, "/panic");
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body_string(), "recovered");
    assert_eq!(after.load(Ordering::SeqCst), 1);
    assert_eq!(*errors.lock().unwrap(), vec!["Handler panicked: kaboom".to_string()]);

    // the app keeps serving after a recovered panic
    app.get("/ok", reply("fine")).unwrap();
    assert_eq!(app.test_request(Method::GET, "/ok").body_string(), "fine");
}

#[test]
fn test_middleware_panic_is_recovered() {
    let app = App::new();
    let (after, seen_after) = counter();
    let (calls, seen_calls) = counter();
    app.after_each(move |_: &mut Context| {
        seen_after.fetch_add(1, Ordering::SeqCst);
    });
    app.group("/guarded")
        .use_middleware(|_: &mut Context| -> Result<()> { panic!("middleware down") })
        .get("/x", move || {
            seen_calls.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let res = app.test_request(Method::GET, "/guarded/x");
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body_string(), "Internal Server Error\n");
    assert_eq!(after.load(Ordering::SeqCst), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_panic_without_hook_is_500() {
    let app = App::new();
    app.get("/panic", || -> Result<()> { panic!("kaboom") }).unwrap();

    let res = app.test_request(Method::GET, "/panic");
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body_string(), "Internal Server Error\n");
}

#[test]
fn test_before_each_sees_request_first() {
    let app = App::new();
    app.before_each(|ctx: &mut Context| ctx.set("stage", "before".to_string()));
    app.get("/", |ctx: &mut Context| {
        let stage = ctx.get::<String>("stage").unwrap_or_default();
        ctx.text(StatusCode::OK, &stage)
    })
    .unwrap();

    assert_eq!(app.test_request(Method::GET, "/").body_string(), "before");
}

#[test]
fn test_fast_path_shapes_receive_arguments() {
    let app = App::new();
    app.get("/none", || {}).unwrap();
    app.get("/ctx", |ctx: &mut Context| ctx.text(StatusCode::OK, ctx.request().path.as_str()))
        .unwrap();
    app.get("/wr", |w: &Writer, r: &Request| -> Result<()> {
        w.write(format!("wr {}", r.path).as_bytes())?;
        Ok(())
    })
    .unwrap();
    app.get("/rw", |r: &Request, w: &Writer| -> Result<()> {
        w.write(format!("rw {}", r.path).as_bytes())?;
        Ok(())
    })
    .unwrap();
    app.get("/cwr", |ctx: &mut Context, w: &Writer, r: &Request| -> Result<()> {
        ctx.set("seen", r.path.clone());
        w.write(format!("cwr {}", ctx.get::<String>("seen").unwrap_or_default()).as_bytes())?;
        Ok(())
    })
    .unwrap();
    app.get("/crw", |ctx: &mut Context, r: &Request, w: &Writer| -> Result<()> {
        ctx.set("seen", r.path.clone());
        w.write(format!("crw {}", ctx.get::<String>("seen").unwrap_or_default()).as_bytes())?;
        Ok(())
    })
    .unwrap();

    let none = app.test_request(Method::GET, "/none");
    assert_eq!(none.status, StatusCode::OK);
    assert!(none.body.is_empty());
    assert_eq!(app.test_request(Method::GET, "/ctx").body_string(), "/ctx");
    assert_eq!(app.test_request(Method::GET, "/wr").body_string(), "wr /wr");
    assert_eq!(app.test_request(Method::GET, "/rw").body_string(), "rw /rw");
    assert_eq!(app.test_request(Method::GET, "/cwr").body_string(), "cwr /cwr");
    assert_eq!(app.test_request(Method::GET, "/crw").body_string(), "crw /crw");
}

#[test]
fn test_generic_handler_resolves_parameters() {
    struct Greeting(&'static str);

    let app = App::new();
    app.inject(Greeting("hello"));
    app.get("/greet/:name", |greeting: Dep<Greeting>, vars: Vars, w: Writer| -> Result<()> {
        let name = vars.get("name").unwrap_or("");
        w.write(format!("{} {name}", (*greeting).0).as_bytes())?;
        Ok(())
    })
    .unwrap();

    assert_eq!(app.test_request(Method::GET, "/greet/ana").body_string(), "hello ana");
}

#[test]
fn test_unresolved_parameter_is_error_without_call() {
    struct Missing;

    let app = App::new();
    let (calls, seen) = counter();
    let failures = Arc::new(Mutex::new(Vec::new()));
    let seen_failures = Arc::clone(&failures);
    app.on_error(move |ctx: &mut Context, err: &Error| {
        seen_failures
            .lock()
            .unwrap()
            .push(matches!(err, Error::Unresolved { .. }));
        let _ = ctx.text(StatusCode::INTERNAL_SERVER_ERROR, "unresolved");
    });
    app.get("/needs", move |_: Dep<Missing>| {
        seen.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    let res = app.test_request(Method::GET, "/needs");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(res.body_string(), "unresolved");
    assert_eq!(*failures.lock().unwrap(), vec![true]);
}

#[test]
fn test_group_scoped_not_found() {
    let app = App::new();
    let api = app.group("/api").not_found(|ctx: &mut Context| {
        let _ = ctx.json(StatusCode::NOT_FOUND, &serde_json::json!({"error": "no such endpoint"}));
    });
    api.get("/users", reply("users")).unwrap();

    let res = app.test_request(Method::GET, "/api/nothing");
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert!(res.body_string().contains("no such endpoint"));

    let plain = app.test_request(Method::GET, "/nothing");
    assert_eq!(plain.body_string(), "404 page not found\n");
}
