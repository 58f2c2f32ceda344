//! Middleware stacks — compose an ordered list of middleware constructors
//! into a single nested handler.
//!
//! A middleware constructor is a function from an optional inner [`Handler`]
//! to a new [`Handler`]. [`build`] collects constructors during a single
//! synchronous configuration phase, then folds the declaration list from the
//! inside out: the *last* declared constructor becomes the innermost handler
//! and the two built-ins ([`parse_form`], [`parse_json`]), declared before
//! the configuration closure runs, end up outermost — they execute first on
//! every request, followed by user middleware in declaration order.
//!
//! ```
//! use skiff::middleware::{self, Handler};
//! use skiff::http::Response;
//! use std::sync::Arc;
//!
//! let app: Handler = middleware::build(|stack| {
//!     stack.wrap(middleware::logger);
//!     stack.wrap(|_inner| -> Handler {
//!         Arc::new(|_req| Box::pin(async { Ok(Response::text("hello")) }))
//!     });
//! });
//! ```
//!
//! No error handling is added by the compositor: a failing middleware
//! propagates its error to whatever invokes the composed handler.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::http::{Request, Response, request::parse_query_string};

/// Type-erased error carried by failing handlers and middleware.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed future returned by a [`Handler`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response, BoxError>> + Send>>;

/// A type-erased, reference-counted request handler.
///
/// This is the uniform contract shared by composed middleware stacks, the
/// dispatch wrapper, and the transport adapter: take a [`Request`], produce a
/// [`Response`] or fail.
pub type Handler = Arc<dyn Fn(Request) -> HandlerFuture + Send + Sync + 'static>;

/// A middleware constructor, consumed exactly once at build time.
///
/// `None` is the terminal sentinel: the constructor at the bottom of the
/// stack receives no inner handler and must produce the response itself.
pub type Layer = Box<dyn FnOnce(Option<Handler>) -> Handler + Send>;

/// Failure raised at request time when the composed chain bottoms out
/// without any layer producing a response.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("middleware stack exhausted without producing a response")]
    Exhausted,
}

/// Forwards `req` to the inner handler, or fails with
/// [`StackError::Exhausted`] when the chain has bottomed out.
///
/// Delegating middleware call this instead of unwrapping their inner handler.
pub fn delegate(inner: Option<&Handler>, req: Request) -> HandlerFuture {
    match inner {
        Some(handler) => handler(req),
        None => Box::pin(async { Err(StackError::Exhausted.into()) }),
    }
}

/// The registrar handed to the configuration closure of [`build`].
///
/// Declarations are collected in order and consumed exactly once when the
/// stack is composed; the list is never reused or mutated afterwards.
pub struct Stack {
    layers: Vec<Layer>,
}

impl Stack {
    fn with_builtins() -> Self {
        let mut stack = Self { layers: Vec::new() };
        stack.wrap(parse_form);
        stack.wrap(parse_json);
        stack
    }

    /// Appends a middleware constructor to the declaration list.
    ///
    /// The last constructor wrapped becomes the innermost handler, closest
    /// to producing the response.
    pub fn wrap<C>(&mut self, constructor: C)
    where
        C: FnOnce(Option<Handler>) -> Handler + Send + 'static,
    {
        self.layers.push(Box::new(constructor));
    }

    /// Empties the declaration list.
    ///
    /// This removes *everything* declared so far — including the built-in
    /// [`parse_form`] and [`parse_json`] layers, which are declared before
    /// the configuration closure runs. A caller who only wants to drop their
    /// own earlier declarations must re-add the built-ins.
    pub fn clear(&mut self) {
        self.layers.clear();
    }

    fn compose(self) -> Handler {
        let mut current: Option<Handler> = None;
        for layer in self.layers.into_iter().rev() {
            current = Some(layer(current));
        }
        current.unwrap_or_else(|| {
            let fallback: Handler = Arc::new(|req| delegate(None, req));
            fallback
        })
    }
}

/// Builds a composed handler from a middleware configuration.
///
/// The stack is seeded with the two built-ins, `configure` registers any
/// further layers via [`Stack::wrap`] / [`Stack::clear`], and the resulting
/// declaration list is folded into a single immutable [`Handler`].
pub fn build<F>(configure: F) -> Handler
where
    F: FnOnce(&mut Stack),
{
    let mut stack = Stack::with_builtins();
    configure(&mut stack);
    stack.compose()
}

/// Decoded `application/x-www-form-urlencoded` request body, attached to the
/// request extensions by [`parse_form`].
#[derive(Debug, Clone)]
pub struct FormBody(pub HashMap<String, String>);

/// Decoded `application/json` request body, attached to the request
/// extensions by [`parse_json`].
#[derive(Debug, Clone)]
pub struct JsonBody(pub serde_json::Value);

fn content_type_is(req: &Request, expected: &str) -> bool {
    req.headers()
        .get("content-type")
        .is_some_and(|ct| ct.trim_start().starts_with(expected))
}

/// Built-in middleware: decodes URL-encoded form bodies into a [`FormBody`]
/// extension before delegating inward. Non-form requests pass through
/// untouched; undecodable payloads are skipped, not fatal.
pub fn parse_form(inner: Option<Handler>) -> Handler {
    Arc::new(move |mut req: Request| {
        if content_type_is(&req, "application/x-www-form-urlencoded") {
            let fields = match std::str::from_utf8(req.body()) {
                Ok(text) => Some(parse_query_string(text)),
                Err(e) => {
                    debug!(error = %e, "form body is not valid UTF-8 — skipping");
                    None
                }
            };
            if let Some(fields) = fields {
                req.extensions_mut().insert(FormBody(fields));
            }
        }
        delegate(inner.as_ref(), req)
    })
}

/// Built-in middleware: decodes JSON bodies into a [`JsonBody`] extension
/// before delegating inward. Non-JSON requests pass through untouched;
/// malformed JSON is skipped, not fatal.
pub fn parse_json(inner: Option<Handler>) -> Handler {
    Arc::new(move |mut req: Request| {
        if content_type_is(&req, "application/json") {
            let value = match serde_json::from_slice::<serde_json::Value>(req.body()) {
                Ok(value) => Some(value),
                Err(e) => {
                    debug!(error = %e, "malformed JSON body — skipping");
                    None
                }
            };
            if let Some(value) = value {
                req.extensions_mut().insert(JsonBody(value));
            }
        }
        delegate(inner.as_ref(), req)
    })
}

/// Middleware that logs each request's method, path, status, and duration
/// with a single `tracing::info!` line after the inner handler completes.
pub fn logger(inner: Option<Handler>) -> Handler {
    Arc::new(move |req: Request| {
        let method = req.method().as_str().to_owned();
        let path = req.path().to_owned();
        let fut = delegate(inner.as_ref(), req);

        Box::pin(async move {
            let start = Instant::now();
            let result = fut.await;
            let duration = start.elapsed();

            match &result {
                Ok(response) => {
                    let status = response.status().map_or(0, |s| s.as_u16());
                    info!("{} {} - {} ({:?})", method, path, status, duration);
                }
                Err(error) => {
                    info!("{} {} - failed: {} ({:?})", method, path, error, duration);
                }
            }

            result
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    fn make_form_request(body: &str) -> Request {
        let raw = format!(
            "POST /submit HTTP/1.1\r\nHost: localhost\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n\
             Content-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    fn make_json_request(body: &str) -> Request {
        let raw = format!(
            "POST /submit HTTP/1.1\r\nHost: localhost\r\n\
             Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    type Trace = Arc<Mutex<Vec<&'static str>>>;

    // A pass-through middleware that records its name before delegating.
    fn tracing_layer(
        name: &'static str,
        trace: Trace,
    ) -> impl FnOnce(Option<Handler>) -> Handler + Send + 'static {
        move |inner| {
            Arc::new(move |req| {
                trace.lock().unwrap().push(name);
                delegate(inner.as_ref(), req)
            })
        }
    }

    // A terminal middleware that records its name and answers without delegating.
    fn terminal_layer(
        name: &'static str,
        trace: Trace,
    ) -> impl FnOnce(Option<Handler>) -> Handler + Send + 'static {
        move |_inner| {
            Arc::new(move |_req| {
                trace.lock().unwrap().push(name);
                Box::pin(async { Ok(Response::text("done")) })
            })
        }
    }

    #[tokio::test]
    async fn user_middleware_run_in_declaration_order() {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));

        let app = build(|stack| {
            stack.wrap(tracing_layer("m1", trace.clone()));
            stack.wrap(tracing_layer("m2", trace.clone()));
            stack.wrap(terminal_layer("terminal", trace.clone()));
        });

        let response = app(make_request("GET", "/")).await.unwrap();
        assert_eq!(response.status(), Some(crate::http::StatusCode::Ok));
        assert_eq!(*trace.lock().unwrap(), vec!["m1", "m2", "terminal"]);
    }

    #[tokio::test]
    async fn builtins_run_before_user_middleware() {
        // The form built-in is declared before any user layer, so the first
        // user layer must already observe the decoded body.
        let app = build(|stack| {
            stack.wrap(|_inner| -> Handler {
                Arc::new(|req: Request| {
                    let form = req.extensions().get::<FormBody>().cloned();
                    Box::pin(async move {
                        let form = form.expect("form built-in did not run first");
                        Ok(Response::text(form.0["name"].clone()))
                    })
                })
            });
        });

        let response = app(make_form_request("name=ada&role=admin")).await.unwrap();
        let (_, _, body) = response.into_parts();
        assert_eq!(body.collect().await, "ada");
    }

    #[tokio::test]
    async fn json_builtin_decodes_body() {
        let app = build(|stack| {
            stack.wrap(|_inner| -> Handler {
                Arc::new(|req: Request| {
                    let json = req.extensions().get::<JsonBody>().cloned();
                    Box::pin(async move {
                        let json = json.expect("json built-in did not run");
                        Ok(Response::text(json.0["name"].as_str().unwrap().to_owned()))
                    })
                })
            });
        });

        let response = app(make_json_request(r#"{"name":"ada"}"#)).await.unwrap();
        let (_, _, body) = response.into_parts();
        assert_eq!(body.collect().await, "ada");
    }

    #[tokio::test]
    async fn malformed_json_is_skipped_not_fatal() {
        let app = build(|stack| {
            stack.wrap(|_inner| -> Handler {
                Arc::new(|req: Request| {
                    let has_json = req.extensions().get::<JsonBody>().is_some();
                    Box::pin(async move {
                        assert!(!has_json);
                        Ok(Response::text("ok"))
                    })
                })
            });
        });

        let response = app(make_json_request("{not json")).await;
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn clear_before_wrap_discards_builtins() {
        let app = build(|stack| {
            stack.clear();
            stack.wrap(|_inner| -> Handler {
                Arc::new(|req: Request| {
                    let has_form = req.extensions().get::<FormBody>().is_some();
                    Box::pin(async move {
                        assert!(!has_form, "built-in survived clear()");
                        Ok(Response::text("bare"))
                    })
                })
            });
        });

        let response = app(make_form_request("a=1")).await;
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn clear_discards_earlier_user_declarations() {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));

        let app = build(|stack| {
            stack.wrap(tracing_layer("dropped", trace.clone()));
            stack.clear();
            stack.wrap(terminal_layer("kept", trace.clone()));
        });

        app(make_request("GET", "/")).await.unwrap();
        assert_eq!(*trace.lock().unwrap(), vec!["kept"]);
    }

    #[tokio::test]
    async fn empty_stack_fails_with_exhausted() {
        let app = build(|stack| stack.clear());

        let err = app(make_request("GET", "/")).await.unwrap_err();
        assert!(err.to_string().contains("exhausted"));
    }

    #[tokio::test]
    async fn builtins_alone_cannot_produce_a_response() {
        // Both built-ins delegate; with nothing below them the chain bottoms out.
        let app = build(|_stack| {});

        let err = app(make_request("GET", "/")).await.unwrap_err();
        assert!(err.to_string().contains("exhausted"));
    }

    #[tokio::test]
    async fn logger_passes_responses_through() {
        let app = build(|stack| {
            stack.wrap(logger);
            stack.wrap(|_inner| -> Handler {
                Arc::new(|_req| Box::pin(async { Ok(Response::text("logged")) }))
            });
        });

        let response = app(make_request("GET", "/")).await.unwrap();
        let (_, _, body) = response.into_parts();
        assert_eq!(body.collect().await, "logged");
    }
}
