//! Per-request context — the decorated request handed to route handlers.
//!
//! Dispatch builds a [`Context`] from the raw transport [`Request`] before
//! asking the router to respond. It carries every raw request field by
//! delegation plus a fixed set of derived, read-only fields: a non-owning
//! back-reference to the owning [`Router`], the query-string portion of the
//! raw path, and whether the request looks like an `XMLHttpRequest`. Path
//! parameters are filled in by the router when a route matches.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::http::{Extensions, Headers, Method, Request};
use crate::middleware::{FormBody, JsonBody};
use crate::router::Router;

/// Path parameters extracted from the matched route pattern.
#[derive(Default, Debug, Clone)]
pub struct Parameters {
    map: HashMap<String, String>,
}

impl Parameters {
    /// Creates an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a parameter value.
    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    /// Returns a parameter value by name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Returns `true` if no parameters were captured.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns an iterator over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The decorated request passed to route handlers.
pub struct Context {
    request: Request,
    router: Arc<Router>,
    is_xhr: bool,
    params: Parameters,
}

impl Context {
    /// Decorates a raw transport request.
    ///
    /// Derived fields are computed here once: `is_xhr` from the presence of
    /// the `x-requested-with` header, the search string lazily from the
    /// request's parsed query.
    pub fn decorate(router: Arc<Router>, request: Request) -> Self {
        let is_xhr = request.headers().contains("x-requested-with");
        Self {
            request,
            router,
            is_xhr,
            params: Parameters::new(),
        }
    }

    /// Returns the underlying request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Consumes the context, returning the underlying request.
    pub fn into_request(self) -> Request {
        self.request
    }

    /// Returns the owning router (non-owning back-reference).
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Returns the query-string portion of the raw request path
    /// (empty when the path carried no query).
    pub fn search(&self) -> &str {
        self.request.query_string().unwrap_or("")
    }

    /// Returns `true` if the request carried an `x-requested-with` header.
    pub fn is_xhr(&self) -> bool {
        self.is_xhr
    }

    /// Returns the path parameters captured by the matched route.
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: Parameters) {
        self.params = params;
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        self.request.path()
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        self.request.headers()
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        self.request.body()
    }

    /// Returns the per-request metadata map.
    pub fn extensions(&self) -> &Extensions {
        self.request.extensions()
    }

    /// Deserializes the request body as JSON into `T`.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] when the body is not
    /// valid JSON for `T`.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }

    /// Returns the form fields decoded by the form-parsing built-in
    /// middleware, if it ran on this request.
    pub fn form(&self) -> Option<&HashMap<String, String>> {
        self.request
            .extensions()
            .get::<FormBody>()
            .map(|form| &form.0)
    }

    /// Returns the JSON value decoded by the JSON-parsing built-in
    /// middleware, if it ran on this request.
    pub fn json_body(&self) -> Option<&serde_json::Value> {
        self.request
            .extensions()
            .get::<JsonBody>()
            .map(|json| &json.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(raw: &str) -> Request {
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    #[test]
    fn derives_xhr_from_header() {
        let router = Arc::new(Router::new());
        let req = make_request(
            "GET / HTTP/1.1\r\nHost: localhost\r\nX-Requested-With: XMLHttpRequest\r\n\r\n",
        );
        let ctx = Context::decorate(router.clone(), req);
        assert!(ctx.is_xhr());

        let req = make_request("GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let ctx = Context::decorate(router, req);
        assert!(!ctx.is_xhr());
    }

    #[test]
    fn search_is_the_query_string() {
        let router = Arc::new(Router::new());
        let req = make_request("GET /find?q=term&page=2 HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let ctx = Context::decorate(router.clone(), req);
        assert_eq!(ctx.search(), "q=term&page=2");
        assert_eq!(ctx.path(), "/find");

        let req = make_request("GET /find HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let ctx = Context::decorate(router, req);
        assert_eq!(ctx.search(), "");
    }

    #[test]
    fn into_request_returns_the_raw_request() {
        let router = Arc::new(Router::new());
        let req = make_request("GET /raw HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let ctx = Context::decorate(router, req);
        assert_eq!(ctx.into_request().path(), "/raw");
    }

    #[test]
    fn json_deserializes_body() {
        #[derive(serde::Deserialize)]
        struct Payload {
            name: String,
        }

        let router = Arc::new(Router::new());
        let body = r#"{"name":"ada"}"#;
        let raw = format!(
            "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let ctx = Context::decorate(router, make_request(&raw));
        let payload: Payload = ctx.json().unwrap();
        assert_eq!(payload.name, "ada");
    }

    #[test]
    fn form_and_json_body_read_middleware_extensions() {
        let router = Arc::new(Router::new());
        let mut req = make_request("POST / HTTP/1.1\r\nHost: localhost\r\n\r\n");

        let mut fields = HashMap::new();
        fields.insert("name".to_owned(), "ada".to_owned());
        req.extensions_mut().insert(FormBody(fields));
        req.extensions_mut()
            .insert(JsonBody(serde_json::json!({"ok": true})));

        let ctx = Context::decorate(router, req);
        assert_eq!(ctx.form().unwrap().get("name").map(String::as_str), Some("ada"));
        assert_eq!(ctx.json_body().unwrap()["ok"], true);
    }
}
