//! Request dispatch — wraps a [`Router`] into a transport-facing [`Handler`].
//!
//! Per request, in strict order: decorate the raw request into a
//! [`Context`], ask the router to respond, then either validate the response
//! record, serve the reserved `/routes` introspection listing, or fall back
//! to the not-found path. Every failure along the way is converted into a
//! `500` response at this single boundary — the transport layer never
//! observes an error from a dispatch-produced handler.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::context::Context;
use crate::http::{Method, Request, Response, ResponseError, StatusCode};
use crate::middleware::{BoxError, Handler};
use crate::router::{RouteOutcome, Router};

/// Reserved introspection path, intercepted on the no-match path.
const ROUTES_PATH: &str = "/routes";

/// Failure raised while dispatching a single request. Never escapes the
/// dispatch boundary; [`handler`] converts it into a `500` response.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The resolved response record is missing a required field.
    #[error("invalid response: {0}")]
    Shape(ResponseError),

    /// The route handler (or a not-found handler) failed.
    #[error("{0}")]
    Handler(BoxError),
}

impl From<ResponseError> for DispatchError {
    fn from(err: ResponseError) -> Self {
        Self::Shape(err)
    }
}

impl From<BoxError> for DispatchError {
    fn from(err: BoxError) -> Self {
        Self::Handler(err)
    }
}

/// Wraps `router` into a handler conforming to the transport contract.
///
/// When no route matches, `not_found` is consulted if supplied; otherwise a
/// default `404` response naming the request path is returned. The produced
/// handler is infallible by construction: failures become `500` responses
/// whose body starts with the literal text `Error`, followed by the
/// failure's description and its cause chain.
pub fn handler(router: Router, not_found: Option<Handler>) -> Handler {
    let router = Arc::new(router);
    Arc::new(move |req: Request| {
        let router = Arc::clone(&router);
        let not_found = not_found.clone();
        Box::pin(async move { Ok(respond(router, not_found, req).await) })
    })
}

async fn respond(router: Arc<Router>, not_found: Option<Handler>, req: Request) -> Response {
    let method = req.method().as_str().to_owned();
    let path = req.path().to_owned();

    match try_respond(router, not_found, req).await {
        Ok(response) => response,
        Err(error) => {
            warn!(%method, %path, error = %error, "request failed — responding 500");
            Response::error(error_body(&error))
        }
    }
}

async fn try_respond(
    router: Arc<Router>,
    not_found: Option<Handler>,
    req: Request,
) -> Result<Response, DispatchError> {
    let ctx = Context::decorate(Arc::clone(&router), req);

    match router.respond(ctx).await? {
        RouteOutcome::Response(response) => {
            response.validate()?;
            Ok(response)
        }
        RouteOutcome::NoMatch(ctx) => {
            if ctx.path() == ROUTES_PATH {
                return Ok(route_listing(&router));
            }
            match &not_found {
                Some(handler) => handler(ctx.into_request()).await.map_err(DispatchError::from),
                None => Ok(default_not_found(ctx.path())),
            }
        }
    }
}

// 404 whose body names the request path, mirroring the default not-found
// response of the original toolkit.
fn default_not_found(path: &str) -> Response {
    let mut body = String::from("Not Found");
    if !path.is_empty() {
        body.push_str(": ");
        body.push_str(path);
    }
    Response::html(body).with_status(StatusCode::NotFound)
}

// HTML listing of every registered GET route's path and parameter names.
fn route_listing(router: &Router) -> Response {
    let mut listing = String::from("GET<br />");
    for route in router.routes(&Method::Get) {
        listing.push_str("<p>");
        listing.push_str(&format!(
            "path: {}<br />paramNames: {}",
            route.path,
            route.param_names.join(",")
        ));
        listing.push_str("</p>");
    }
    Response::html(listing)
}

fn error_body(error: &DispatchError) -> String {
    let mut body = format!("Error<br />{error}");
    let mut source = match error {
        DispatchError::Handler(inner) => inner.source(),
        DispatchError::Shape(_) => None,
    };
    while let Some(cause) = source {
        body.push_str(&format!("<br />caused by: {cause}"));
        source = cause.source();
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Body;
    use tokio::time::{Duration, sleep};

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    async fn body_text(response: Response) -> String {
        let (_, _, body) = response.into_parts();
        String::from_utf8(body.collect().await.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn no_match_yields_default_404_naming_the_path() {
        let app = handler(Router::new(), None);

        let response = app(make_request("GET", "/missing")).await.unwrap();
        assert_eq!(response.status(), Some(StatusCode::NotFound));
        assert!(body_text(response).await.contains("Not Found: /missing"));
    }

    #[tokio::test]
    async fn no_match_delegates_to_supplied_not_found_handler() {
        let not_found: Handler = Arc::new(|req: Request| {
            let path = req.path().to_owned();
            Box::pin(async move {
                Ok(Response::html(format!("gone: {path}")).with_status(StatusCode::NotFound))
            })
        });

        let app = handler(Router::new(), Some(not_found));
        let response = app(make_request("GET", "/vanished")).await.unwrap();
        assert_eq!(response.status(), Some(StatusCode::NotFound));
        assert_eq!(body_text(response).await, "gone: /vanished");
    }

    #[tokio::test]
    async fn asynchronously_resolved_response_passes_through_unchanged() {
        let mut router = Router::new();
        router.get("/slow", |_ctx| async {
            sleep(Duration::from_millis(10)).await;
            Ok(Response::new(StatusCode::Ok).body(Body::from_chunks(["ok"])))
        });

        let app = handler(router, None);
        let response = app(make_request("GET", "/slow")).await.unwrap();
        assert_eq!(response.status(), Some(StatusCode::Ok));
        assert!(response.headers().is_empty());
        assert_eq!(body_text(response).await, "ok");
    }

    #[tokio::test]
    async fn missing_body_is_a_shape_error_converted_to_500() {
        let mut router = Router::new();
        router.get("/headless", |_ctx| async { Ok(Response::new(StatusCode::Ok)) });

        let app = handler(router, None);
        let result = app(make_request("GET", "/headless")).await;
        let response = result.expect("dispatch must never fail");
        assert_eq!(response.status(), Some(StatusCode::InternalServerError));

        let body = body_text(response).await;
        assert!(body.starts_with("Error"));
        assert!(body.contains("must have a body"));
    }

    #[tokio::test]
    async fn missing_status_is_a_shape_error_converted_to_500() {
        let mut router = Router::new();
        router.get("/anonymous", |_ctx| async { Ok(Response::default().body("x")) });

        let app = handler(router, None);
        let response = app(make_request("GET", "/anonymous")).await.unwrap();
        assert_eq!(response.status(), Some(StatusCode::InternalServerError));
        assert!(body_text(response).await.contains("must have a status"));
    }

    #[tokio::test]
    async fn handler_failure_is_converted_to_500_never_rethrown() {
        let mut router = Router::new();
        router.get("/boom", |_ctx| async {
            Err::<Response, BoxError>("route handler exploded".into())
        });

        let app = handler(router, None);
        let result = app(make_request("GET", "/boom")).await;
        let response = result.expect("dispatch must never fail");
        assert_eq!(response.status(), Some(StatusCode::InternalServerError));
        assert_eq!(response.headers().get("content-type"), Some("text/html"));

        let body = body_text(response).await;
        assert!(body.contains("Error"));
        assert!(body.contains("route handler exploded"));
    }

    #[tokio::test]
    async fn routes_listing_names_get_routes_and_params() {
        let mut router = Router::new();
        router.get("/users/:id", |_ctx| async { Ok(Response::text("")) });
        router.get("/files/*", |_ctx| async { Ok(Response::text("")) });
        router.post("/users", |_ctx| async { Ok(Response::text("")) });

        let app = handler(router, None);
        let response = app(make_request("GET", "/routes")).await.unwrap();
        assert_eq!(response.status(), Some(StatusCode::Ok));

        let body = body_text(response).await;
        assert!(body.starts_with("GET<br />"));
        assert!(body.contains("path: /users/:id"));
        assert!(body.contains("paramNames: id"));
        assert!(body.contains("path: /files/*"));
        assert!(body.contains("paramNames: wildcard"));
        // POST routes are not part of the listing
        assert!(!body.contains("path: /users<"));
    }

    #[tokio::test]
    async fn routes_listing_wins_over_custom_not_found() {
        let not_found: Handler = Arc::new(|_req: Request| {
            Box::pin(async { Ok(Response::html("custom").with_status(StatusCode::NotFound)) })
        });

        let app = handler(Router::new(), Some(not_found));
        let response = app(make_request("GET", "/routes")).await.unwrap();
        assert_eq!(response.status(), Some(StatusCode::Ok));
        assert!(body_text(response).await.starts_with("GET<br />"));
    }

    #[tokio::test]
    async fn registered_routes_route_takes_precedence_over_introspection() {
        let mut router = Router::new();
        router.get("/routes", |_ctx| async { Ok(Response::text("mine")) });

        let app = handler(router, None);
        let response = app(make_request("GET", "/routes")).await.unwrap();
        assert_eq!(body_text(response).await, "mine");
    }

    #[tokio::test]
    async fn decorated_context_reaches_handlers() {
        let mut router = Router::new();
        router.get("/probe", |ctx: Context| async move {
            let summary = format!("xhr={} search={}", ctx.is_xhr(), ctx.search());
            Ok(Response::text(summary))
        });

        let app = handler(router, None);
        let raw = "GET /probe?a=1 HTTP/1.1\r\nHost: localhost\r\nX-Requested-With: XMLHttpRequest\r\n\r\n";
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        let response = app(req).await.unwrap();
        assert_eq!(body_text(response).await, "xhr=true search=a=1");
    }
}
