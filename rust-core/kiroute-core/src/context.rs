//! # Request Context
//!
//! Per-request state threaded from the matcher through the middleware chain
//! into the handler, plus the response helpers handlers write with.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Holds one request's state; response formats are thin helpers
//! - **O**: Extra per-request data goes in the value bag or the scope injector
//! - **D**: Sessions and templates are reached through traits only

use crate::chain::Continuation;
use crate::cookie::Cookie;
use crate::encoding::{to_csv_body, to_xml_body};
use crate::error::{Error, Result};
use crate::injector::Injector;
use crate::json::{parse_json, to_json_body};
use crate::request::Request;
use crate::route::Vars;
use crate::session::{MemorySession, Session};
use crate::template::TemplateEngine;
use crate::writer::Writer;
use hyper::header::{CONTENT_TYPE, LOCATION, SET_COOKIE};
use hyper::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Where the pipeline stands relative to the running stage
#[derive(Default)]
pub(crate) enum NextState {
    /// No stage left to run
    #[default]
    Idle,
    /// `next` will run the remaining stages
    Pending(Continuation),
    /// The running stage already called `next`
    Consumed,
}

/// Per-request context
pub struct Context {
    writer: Writer,
    request: Arc<Request>,
    params: Vars,
    pub(crate) next: NextState,
    scope: Injector,
    cancel: CancellationToken,
    session: Box<dyn Session>,
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
    templates: Option<Arc<dyn TemplateEngine>>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Writer::default(), Arc::new(Request::default()), Injector::new())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.request.method)
            .field("path", &self.request.path)
            .field("params", &self.params)
            .field("values", &self.values.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Create a context for one request
    #[must_use]
    pub fn new(writer: Writer, request: Arc<Request>, scope: Injector) -> Self {
        Self {
            writer,
            request,
            params: Vars::new(),
            next: NextState::Idle,
            scope,
            cancel: CancellationToken::new(),
            session: Box::new(MemorySession::new()),
            values: HashMap::new(),
            templates: None,
        }
    }

    /// Attach request-wide collaborators (used by the app and the pool)
    pub(crate) fn bind(
        &mut self,
        writer: Writer,
        request: Arc<Request>,
        scope: Injector,
        cancel: CancellationToken,
        session: Box<dyn Session>,
        templates: Option<Arc<dyn TemplateEngine>>,
    ) {
        self.writer = writer;
        self.request = request;
        self.scope = scope;
        self.cancel = cancel;
        self.session = session;
        self.templates = templates;
    }

    /// Drop everything tied to the finished request
    pub(crate) fn reset(&mut self, empty: &Arc<Request>) {
        self.writer = Writer::default();
        self.request = Arc::clone(empty);
        self.params.clear();
        self.next = NextState::Idle;
        self.scope = Injector::new();
        self.cancel = CancellationToken::new();
        self.session = Box::new(MemorySession::new());
        self.values.clear();
        self.templates = None;
    }

    // ---- pipeline ----

    /// Run the rest of the pipeline
    ///
    /// A no-op when no stage is left. Calling it twice from the same
    /// middleware fails without re-running anything.
    ///
    /// # Errors
    ///
    /// Returns `Error::NextAlreadyCalled` on a second call, otherwise the
    /// first error of the remaining stages.
    pub fn next(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.next, NextState::Consumed) {
            NextState::Pending(continuation) => continuation.run(self),
            NextState::Consumed => Err(Error::NextAlreadyCalled),
            NextState::Idle => {
                self.next = NextState::Idle;
                Ok(())
            }
        }
    }

    // ---- request side ----

    /// The request
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Shared handle to the request
    #[must_use]
    pub fn request_arc(&self) -> Arc<Request> {
        Arc::clone(&self.request)
    }

    /// Mutable request; clones it first if a handler still holds a handle
    pub fn request_mut(&mut self) -> &mut Request {
        Arc::make_mut(&mut self.request)
    }

    /// Replace the request
    pub fn set_request(&mut self, request: Request) {
        self.request = Arc::new(request);
    }

    /// Writer and request handles for the fast-path handler shapes
    pub(crate) fn io(&self) -> (Writer, Arc<Request>) {
        (self.writer.clone(), Arc::clone(&self.request))
    }

    /// Captured path parameters
    #[must_use]
    pub fn vars(&self) -> &Vars {
        &self.params
    }

    /// Mutable path parameters
    pub fn params_mut(&mut self) -> &mut Vars {
        &mut self.params
    }

    /// Path parameter by name
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Request header (first value)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    /// Request cookie by name
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.request.cookie(name)
    }

    /// Decode the request body as JSON
    ///
    /// # Errors
    ///
    /// Returns `Error::Decode` for an empty or malformed body.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T> {
        parse_json(self.request.body_bytes())
    }

    // ---- form and query values ----

    /// First form value for `key` (body values first, then query)
    #[must_use]
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.request
            .form()
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Whether `key` was sent in the body or the query
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.request.form().contains_key(key)
    }

    /// All values for `key`
    #[must_use]
    pub fn get_all(&self, key: &str) -> &[String] {
        self.request.form().get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Parse the value for `key`
    ///
    /// # Errors
    ///
    /// Returns `Error::Decode` when the key is missing or does not parse.
    pub fn form_get<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.form_value(key).ok_or_else(|| Error::Decode {
            reason: format!("missing form value `{key}`"),
        })?;
        raw.parse().map_err(|e| Error::Decode {
            reason: format!("form value `{key}`: {e}"),
        })
    }

    /// Parsed value for `key`, or `default` when missing or unparsable
    #[must_use]
    pub fn get_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get_opt(key).unwrap_or(default)
    }

    /// Parsed value for `key`, `None` when missing or unparsable
    #[must_use]
    pub fn get_opt<T: FromStr>(&self, key: &str) -> Option<T> {
        self.form_value(key).and_then(|raw| raw.parse().ok())
    }

    // ---- response side ----

    /// The response writer
    #[must_use]
    pub fn writer(&self) -> &Writer {
        &self.writer
    }

    /// Swap the response writer, returning the previous one
    pub fn replace_writer(&mut self, writer: Writer) -> Writer {
        std::mem::replace(&mut self.writer, writer)
    }

    /// Set a response header
    pub fn set_header(&self, name: &str, value: &str) {
        self.writer.set_header(name, value);
    }

    /// Append a response header value
    pub fn add_header(&self, name: &str, value: &str) {
        self.writer.add_header(name, value);
    }

    /// Add a `Set-Cookie` header
    pub fn set_cookie(&self, cookie: &Cookie) {
        self.writer.add_header(SET_COOKIE.as_str(), &cookie.to_string());
    }

    /// Expire a cookie on the client
    pub fn delete_cookie(&self, name: &str) {
        self.set_cookie(&Cookie::removal(name));
    }

    /// Write raw body bytes
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` when the sink fails.
    pub fn write(&self, body: &[u8]) -> Result<()> {
        self.writer.write(body)?;
        Ok(())
    }

    /// Write `body` with `status`
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` when the sink fails.
    pub fn text(&self, status: StatusCode, body: &str) -> Result<()> {
        self.writer.write_header(status);
        self.write(body.as_bytes())
    }

    /// Write an HTML body with `status`
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` when the sink fails.
    pub fn html(&self, status: StatusCode, body: &str) -> Result<()> {
        self.writer.set_header(CONTENT_TYPE.as_str(), "text/html; charset=utf-8");
        self.text(status, body)
    }

    /// Serialize `body` as JSON with `status`
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` when serialization fails, `Error::Io` when the
    /// sink fails.
    pub fn json<T: Serialize + ?Sized>(&self, status: StatusCode, body: &T) -> Result<()> {
        let encoded = to_json_body(body)?;
        self.writer.set_header(CONTENT_TYPE.as_str(), "application/json; charset=utf-8");
        self.writer.write_header(status);
        self.write(&encoded)
    }

    /// Serialize `body` as XML with `status`
    ///
    /// # Errors
    ///
    /// Returns `Error::Encode` when serialization fails; nothing is written
    /// then. `Error::Io` when the sink fails.
    pub fn xml<T: Serialize + ?Sized>(&self, status: StatusCode, body: &T) -> Result<()> {
        let encoded = to_xml_body(body)?;
        self.writer.set_header(CONTENT_TYPE.as_str(), "application/xml; charset=utf-8");
        self.writer.write_header(status);
        self.write(&encoded)
    }

    /// Write `records` as CSV with `status`
    ///
    /// # Errors
    ///
    /// Returns `Error::Encode` when records have different lengths; nothing
    /// is written then. `Error::Io` when the sink fails.
    pub fn csv<R, F>(&self, status: StatusCode, records: R) -> Result<()>
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = F>,
        F: AsRef<[u8]>,
    {
        let encoded = to_csv_body(records)?;
        self.writer.set_header(CONTENT_TYPE.as_str(), "text/csv; charset=utf-8");
        self.writer.write_header(status);
        self.write(&encoded)
    }

    /// `200` success envelope: `{"meta": {"success": true, "message": ..}, "body": ..}`
    ///
    /// # Errors
    ///
    /// Same as [`Context::json`].
    pub fn success<T: Serialize>(&self, message: &str, body: T) -> Result<()> {
        let body = serde_json::to_value(body)?;
        self.json(
            StatusCode::OK,
            &json!({
                "meta": { "success": true, "message": message },
                "body": body,
            }),
        )
    }

    /// Failure envelope with the error's message
    ///
    /// # Errors
    ///
    /// Same as [`Context::json`].
    pub fn fail<T: Serialize>(&self, status: StatusCode, err: &dyn Display, body: T) -> Result<()> {
        let body = serde_json::to_value(body)?;
        self.json(
            status,
            &json!({
                "meta": { "success": false, "message": err.to_string() },
                "body": body,
            }),
        )
    }

    /// Redirect with a `Location` header
    pub fn redirect(&self, url: &str, status: StatusCode) {
        self.writer.add_header(LOCATION.as_str(), url);
        self.writer.write_header(status);
    }

    /// `302` with an HTML page that redirects client-side
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` when the sink fails.
    pub fn redirect_html(&self, url: &str) -> Result<()> {
        let page = format!(
            "<!DOCTYPE HTML>\n<html lang=\"en-US\">\n<head>\n<meta charset=\"UTF-8\">\n\
             <meta http-equiv=\"refresh\" content=\"0; url={url}\">\n\
             <script type=\"text/javascript\">window.location.href = \"{url}\"</script>\n\
             <title>Page Redirection</title>\n</head>\n\
             <body><a href=\"{url}\">Redirection</a>.</body>\n</html>\n"
        );
        self.html(StatusCode::FOUND, &page)
    }

    /// Render a template with the app's engine
    ///
    /// # Errors
    ///
    /// Returns `Error::Template` when no engine is configured, or the
    /// engine's error.
    pub fn render<T: Serialize>(&self, status: StatusCode, name: &str, data: &T) -> Result<()> {
        let engine = self
            .templates
            .as_ref()
            .ok_or_else(|| Error::Template("no template engine configured".to_string()))?;
        let data = serde_json::to_value(data)?;
        self.writer.set_header(CONTENT_TYPE.as_str(), "text/html; charset=utf-8");
        self.writer.write_header(status);
        let mut out = self.writer.clone();
        engine.execute_template(&mut out, name, &data)
    }

    // ---- scope, values, session ----

    /// Request-scoped injector
    #[must_use]
    pub fn scope(&self) -> &Injector {
        &self.scope
    }

    /// Resolve a dependency from the request scope
    ///
    /// # Errors
    ///
    /// Returns `Error::Unresolved` when nothing provides `T`.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.scope.resolve::<T>()
    }

    /// Token cancelled when the request is abandoned (write timeout)
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the request was abandoned
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Store a request-local value
    pub fn set<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    /// Request-local value, if present with type `T`
    #[must_use]
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// The request's session
    #[must_use]
    pub fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    /// The request's session, mutably
    pub fn session_mut(&mut self) -> &mut dyn Session {
        self.session.as_mut()
    }

    /// Start the session for the bound request
    pub(crate) fn start_session(&mut self) -> Result<()> {
        self.session.start(&self.request, &self.writer)
    }

    /// Queue a flash message
    ///
    /// # Errors
    ///
    /// Returns the session's error.
    pub fn flash(&mut self, message: &str) -> Result<()> {
        self.session.flash(message)
    }

    /// Take queued flash messages
    ///
    /// # Errors
    ///
    /// Returns the session's error.
    pub fn flashes(&mut self) -> Result<Vec<String>> {
        self.session.flashes()
    }

    /// Extend the session lifetime
    ///
    /// # Errors
    ///
    /// Returns the session's error.
    pub fn refresh_session(&mut self) -> Result<()> {
        self.session.refresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Method;
    use serde::Deserialize;
    use serde_json::Value;

    fn body(ctx: &Context) -> String {
        ctx.writer().take_response().unwrap().body_string()
    }

    fn with_request(req: Request) -> Context {
        let mut ctx = Context::default();
        ctx.set_request(req);
        ctx
    }

    #[test]
    fn test_json_response() {
        let ctx = Context::default();
        ctx.json(StatusCode::CREATED, &json!({"id": 1})).unwrap();
        let res = ctx.writer().take_response().unwrap();
        assert_eq!(res.status, StatusCode::CREATED);
        assert_eq!(res.header("content-type"), Some("application/json; charset=utf-8"));
        assert_eq!(res.body_string(), "{\"id\":1}\n");
    }

    #[test]
    fn test_xml_response() {
        #[derive(Serialize)]
        struct Order {
            id: u32,
        }

        let ctx = Context::default();
        ctx.xml(StatusCode::OK, &Order { id: 7 }).unwrap();
        let res = ctx.writer().take_response().unwrap();
        assert_eq!(res.header("content-type"), Some("application/xml; charset=utf-8"));
        assert!(res.body_string().contains("<id>7</id>"));
    }

    #[test]
    fn test_xml_failure_writes_nothing() {
        struct Unencodable;
        impl Serialize for Unencodable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("not representable"))
            }
        }

        let ctx = Context::default();
        let err = ctx.xml(StatusCode::OK, &Unencodable).unwrap_err();
        assert!(matches!(err, Error::Encode { format: "XML", .. }));
        assert!(!ctx.writer().is_committed());
    }

    #[test]
    fn test_csv_response() {
        let ctx = Context::default();
        ctx.csv(StatusCode::OK, vec![vec!["name", "qty"], vec!["pear", "2"]])
            .unwrap();
        let res = ctx.writer().take_response().unwrap();
        assert_eq!(res.header("content-type"), Some("text/csv; charset=utf-8"));
        assert_eq!(res.body_string(), "name,qty\npear,2\n");
    }

    #[test]
    fn test_csv_failure_writes_nothing() {
        let ctx = Context::default();
        let err = ctx.csv(StatusCode::OK, [vec!["a", "b"], vec!["c"]]).unwrap_err();
        assert!(matches!(err, Error::Encode { format: "CSV", .. }));
        assert!(!ctx.writer().is_committed());
    }

    #[test]
    fn test_success_envelope() {
        let ctx = Context::default();
        ctx.success("ok", json!([1, 2])).unwrap();
        let value: Value = serde_json::from_str(&body(&ctx)).unwrap();
        assert_eq!(value["meta"]["success"], true);
        assert_eq!(value["meta"]["message"], "ok");
        assert_eq!(value["body"], json!([1, 2]));
    }

    #[test]
    fn test_fail_envelope_with_null_body() {
        let ctx = Context::default();
        let err = Error::Session("expired".to_string());
        ctx.fail(StatusCode::UNAUTHORIZED, &err, ()).unwrap();
        let res = ctx.writer().take_response().unwrap();
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        let value: Value = serde_json::from_slice(&res.body).unwrap();
        assert_eq!(value["meta"]["success"], false);
        assert_eq!(value["meta"]["message"], "Session error: expired");
        assert!(value["body"].is_null());
    }

    #[test]
    fn test_text_and_redirect() {
        let ctx = Context::default();
        ctx.redirect("/login", StatusCode::SEE_OTHER);
        let res = ctx.writer().take_response().unwrap();
        assert_eq!(res.status, StatusCode::SEE_OTHER);
        assert_eq!(res.header("location"), Some("/login"));

        let ctx = Context::default();
        ctx.text(StatusCode::ACCEPTED, "queued").unwrap();
        assert_eq!(body(&ctx), "queued");
    }

    #[test]
    fn test_redirect_html() {
        let ctx = Context::default();
        ctx.redirect_html("/home").unwrap();
        let res = ctx.writer().take_response().unwrap();
        assert_eq!(res.status, StatusCode::FOUND);
        assert!(res.body_string().contains("url=/home"));
    }

    #[test]
    fn test_decode_json() {
        #[derive(Deserialize)]
        struct Login {
            user: String,
        }
        let ctx = with_request(Request::new(Method::POST, "/").with_body(r#"{"user":"ana"}"#));
        let login: Login = ctx.decode_json().unwrap();
        assert_eq!(login.user, "ana");
    }

    #[test]
    fn test_form_getters() {
        let ctx = with_request(Request::new(Method::GET, "/?page=3&tag=a&tag=b&flag=yes"));
        assert_eq!(ctx.form_value("page"), Some("3"));
        assert!(ctx.has("tag"));
        assert!(!ctx.has("missing"));
        assert_eq!(ctx.get_all("tag"), ["a", "b"]);
        assert!(ctx.get_all("missing").is_empty());
        assert_eq!(ctx.get_or::<u32>("page", 1), 3);
        assert_eq!(ctx.get_or::<u32>("limit", 20), 20);
        assert_eq!(ctx.get_opt::<bool>("flag"), None);
        assert_eq!(ctx.form_get::<i64>("page").unwrap(), 3);
        assert!(matches!(ctx.form_get::<i64>("flag"), Err(Error::Decode { .. })));
    }

    #[test]
    fn test_value_bag() {
        let mut ctx = Context::default();
        ctx.set("user_id", 42u64);
        assert_eq!(ctx.get::<u64>("user_id"), Some(42));
        assert_eq!(ctx.get::<String>("user_id"), None);
        assert_eq!(ctx.get::<u64>("missing"), None);
    }

    #[test]
    fn test_cookies() {
        let ctx = with_request(Request::new(Method::GET, "/").with_header("Cookie", "theme=dark"));
        assert_eq!(ctx.cookie("theme"), Some("dark"));
        ctx.set_cookie(&Cookie::new("a", "1"));
        ctx.delete_cookie("theme");
        let res = ctx.writer().take_response().unwrap();
        let cookies: Vec<_> = res.headers.get_all("set-cookie").iter().collect();
        assert_eq!(cookies.len(), 2);
    }

    #[test]
    fn test_render_without_engine() {
        let ctx = Context::default();
        assert!(matches!(
            ctx.render(StatusCode::OK, "index.html", &()),
            Err(Error::Template(_))
        ));
    }

    #[test]
    fn test_render_with_engine() {
        struct Echo;
        impl TemplateEngine for Echo {
            fn execute_template(&self, out: &mut dyn std::io::Write, name: &str, data: &Value) -> Result<()> {
                write!(out, "{name}:{}", data["title"].as_str().unwrap_or(""))?;
                Ok(())
            }
        }
        let mut ctx = Context::default();
        let engine: Arc<dyn TemplateEngine> = Arc::new(Echo);
        ctx.bind(
            Writer::default(),
            Arc::new(Request::default()),
            Injector::new(),
            CancellationToken::new(),
            Box::new(MemorySession::new()),
            Some(engine),
        );
        ctx.render(StatusCode::OK, "page", &json!({"title": "Home"})).unwrap();
        assert_eq!(body(&ctx), "page:Home");
    }

    #[test]
    fn test_request_mut_copies_on_write() {
        let mut ctx = with_request(Request::new(Method::GET, "/"));
        let held = ctx.request_arc();
        ctx.request_mut().remote_addr = Some("10.0.0.1".to_string());
        assert_eq!(ctx.request().remote_addr.as_deref(), Some("10.0.0.1"));
        assert!(held.remote_addr.is_none());
    }

    #[test]
    fn test_session_passthrough() {
        let mut ctx = Context::default();
        ctx.start_session().unwrap();
        ctx.flash("hello").unwrap();
        assert_eq!(ctx.flashes().unwrap(), vec!["hello"]);
        ctx.refresh_session().unwrap();
    }
}
