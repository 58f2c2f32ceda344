//! Route resolution — map URL patterns and HTTP methods to handler functions.
//!
//! [`Router`] is the resolver collaborator of the dispatch layer. Three
//! pattern styles are supported:
//!
//! | Pattern              | Example match              | Captured params                 |
//! |----------------------|----------------------------|---------------------------------|
//! | `/users`             | `/users`                   | *(none)*                        |
//! | `/users/:id`         | `/users/42`                | `id → "42"`                     |
//! | `/files/*`           | `/files/docs/readme.txt`   | `wildcard → "/docs/readme.txt"` |
//!
//! Trailing slashes are normalized on both patterns and incoming paths.
//! Routes are matched in registration order; the first route whose method
//! and pattern both match wins. Resolution is expressed as a
//! [`RouteOutcome`]: either a handler response or "no match", in which case
//! ownership of the context is handed back to the caller.

use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, Parameters};
use crate::http::{Method, Response};
use crate::middleware::BoxError;

/// Type-erased async route handler: takes the decorated request context and
/// produces a [`Response`] or fails.
pub type RouteHandler = Arc<
    dyn Fn(Context) -> Pin<Box<dyn Future<Output = Result<Response, BoxError>> + Send>>
        + Send
        + Sync
        + 'static,
>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Result<Response, BoxError>>`
/// that is also `Send + Sync + 'static` implements this automatically.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Result<Response, BoxError>> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Result<Response, BoxError>> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Result<Response, BoxError>> + Send>> {
        Box::pin((self)(ctx))
    }
}

/// The result of asking the router to respond to a request.
pub enum RouteOutcome {
    /// A route matched and its handler produced this response.
    Response(Response),
    /// No route matched; the context is handed back for the not-found path.
    NoMatch(Context),
}

impl std::fmt::Debug for RouteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteOutcome::Response(_) => f.write_str("RouteOutcome::Response(..)"),
            RouteOutcome::NoMatch(_) => f.write_str("RouteOutcome::NoMatch(..)"),
        }
    }
}

/// Path and parameter names of a registered route, as surfaced by the
/// `/routes` introspection listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub path: String,
    pub param_names: Vec<String>,
}

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
enum Pattern {
    // Matches one exact path string, e.g. `/users`.
    Exact(String),
    // Matches a fixed number of segments where some may be named captures, e.g. `/users/:id`.
    Parameterized { segments: Vec<Segment> },
    // Matches any path that starts with the given prefix, e.g. `/files/*`.
    Wildcard(String),
}

fn strip_trailing_slash(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

impl Pattern {
    /// Parse a route pattern string.
    ///
    /// Classified in order: ends with `/*` → wildcard; contains `:` →
    /// parameterized; otherwise exact. A trailing slash (other than on the
    /// root `/`) is stripped before classification.
    fn parse(pattern: &str) -> Self {
        let pattern = strip_trailing_slash(pattern);

        if let Some(prefix) = pattern.strip_suffix("/*") {
            return Pattern::Wildcard(prefix.to_string());
        }

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| {
                    if let Some(p) = s.strip_prefix(':') {
                        Segment::Parameter(p.to_string())
                    } else {
                        Segment::Static(s.to_string())
                    }
                })
                .collect();

            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_string())
    }

    // Try to match `path`, returning captured [`Parameters`] on success.
    fn matches(&self, path: &str) -> Option<Parameters> {
        let path = strip_trailing_slash(path);

        match self {
            Pattern::Exact(p) => {
                if p == path {
                    Some(Parameters::new())
                } else {
                    None
                }
            }
            Pattern::Parameterized { segments } => {
                let mut params = Parameters::new();
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

                if segments.len() != path_segments.len() {
                    return None;
                }

                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) => {
                            if s != path_seg {
                                return None;
                            }
                        }
                        Segment::Parameter(name) => {
                            params.insert(name.clone(), path_seg.to_string());
                        }
                    }
                }

                Some(params)
            }
            Pattern::Wildcard(prefix) => {
                if let Some(suffix) = path.strip_prefix(prefix.as_str()) {
                    let mut params = Parameters::new();
                    params.insert("wildcard".to_string(), suffix.to_string());
                    Some(params)
                } else {
                    None
                }
            }
        }
    }

    // Names of the parameters this pattern captures, in path order.
    fn param_names(&self) -> Vec<String> {
        match self {
            Pattern::Exact(_) => Vec::new(),
            Pattern::Parameterized { segments } => segments
                .iter()
                .filter_map(|seg| match seg {
                    Segment::Parameter(name) => Some(name.clone()),
                    Segment::Static(_) => None,
                })
                .collect(),
            Pattern::Wildcard(_) => vec!["wildcard".to_string()],
        }
    }
}

// A single registered route binding a method + pattern to a handler.
struct Route {
    method: Method,
    path: String,
    pattern: Pattern,
    handler: RouteHandler,
}

impl Route {
    fn new(method: Method, path: &str, handler: RouteHandler) -> Self {
        Self {
            method,
            path: path.to_owned(),
            pattern: Pattern::parse(path),
            handler,
        }
    }

    // Returns `Some(params)` when both the HTTP method and path pattern match.
    fn matches(&self, method: &Method, path: &str) -> Option<Parameters> {
        if &self.method == method {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

/// Route resolver mapping a decorated request to a handler response or
/// "no match".
///
/// # Examples
///
/// ```rust,no_run
/// use skiff::{Response, Router};
///
/// let mut router = Router::new();
///
/// router.get("/ping", |_ctx| async { Ok(Response::text("pong")) });
///
/// router.get("/users/:id", |ctx: skiff::Context| async move {
///     let id = ctx.params().get("id").unwrap_or("unknown").to_owned();
///     Ok(Response::text(id))
/// });
/// ```
pub struct Router {
    routes: Vec<Route>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates an empty router with no registered routes.
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registers a handler for `GET` requests matching `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Registers a handler for `POST` requests matching `path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    /// Registers a handler for `PUT` requests matching `path`.
    pub fn put(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Put, path, handler);
    }

    /// Registers a handler for `DELETE` requests matching `path`.
    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Delete, path, handler);
    }

    /// Registers a handler for `PATCH` requests matching `path`.
    pub fn patch(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Patch, path, handler);
    }

    /// Registers a handler for `OPTIONS` requests matching `path`.
    pub fn options(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Options, path, handler);
    }

    // Erase the concrete handler type and store it as a `RouteHandler` trait object.
    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: RouteHandler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route::new(method, path, handler));
    }

    /// Returns the number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Returns the path and parameter names of every route registered for
    /// `method`, in registration order.
    pub fn routes(&self, method: &Method) -> Vec<RouteInfo> {
        self.routes
            .iter()
            .filter(|route| &route.method == method)
            .map(|route| RouteInfo {
                path: route.path.clone(),
                param_names: route.pattern.param_names(),
            })
            .collect()
    }

    /// Resolves `ctx` against the registered routes.
    ///
    /// Routes are tested in registration order; the first route whose method
    /// and pattern both match receives the context (with its captured path
    /// parameters filled in) and its handler is awaited. When nothing
    /// matches, the context is handed back in [`RouteOutcome::NoMatch`].
    ///
    /// # Errors
    ///
    /// Propagates the matched handler's error untouched; converting failures
    /// into responses is the dispatch layer's job.
    pub async fn respond(&self, mut ctx: Context) -> Result<RouteOutcome, BoxError> {
        let path = ctx.path().to_owned();
        let method = ctx.method().clone();

        for route in &self.routes {
            if let Some(params) = route.matches(&method, &path) {
                ctx.set_params(params);
                let response = (route.handler)(ctx).await?;
                return Ok(RouteOutcome::Response(response));
            }
        }

        Ok(RouteOutcome::NoMatch(ctx))
    }
}
