//! The response record — the canonical `{status, headers, body}` output of
//! every handler.
//!
//! A [`Response`] starts out blank and is not considered valid until both a
//! status and a body are present; the dispatch layer enforces this with
//! [`Response::validate`] before anything reaches the transport. The helper
//! constructors ([`text`](Response::text), [`html`](Response::html),
//! [`json`](Response::json), [`redirect`](Response::redirect), …) always
//! produce valid records.

use serde::Serialize;
use thiserror::Error;

use super::{Body, Headers, StatusCode};

/// A response record that is missing a required field.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResponseError {
    #[error("response must have a status")]
    MissingStatus,

    #[error("response must have a body")]
    MissingBody,
}

/// The canonical output of any handler.
///
/// # Examples
///
/// ```
/// use skiff::http::{Response, StatusCode};
///
/// let response = Response::html("<h1>hi</h1>");
/// assert_eq!(response.status(), Some(StatusCode::Ok));
/// assert_eq!(response.headers().get("content-type"), Some("text/html"));
/// assert!(response.validate().is_ok());
/// ```
#[derive(Debug, Default)]
pub struct Response {
    status: Option<StatusCode>,
    headers: Headers,
    body: Option<Body>,
}

impl Response {
    /// Creates a response with the given status and no body.
    ///
    /// The result does not [`validate`](Self::validate) until a body is set.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            headers: Headers::new(),
            body: None,
        }
    }

    /// Sets or replaces the status.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets a response header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a header in place. Intended for middleware that receives a
    /// `Response` from downstream and decorates it without consuming it.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets the response body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Returns the status, if one has been set.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Checks that this record has both a status and a body.
    ///
    /// # Errors
    ///
    /// [`ResponseError::MissingStatus`] or [`ResponseError::MissingBody`]
    /// when the corresponding field is absent.
    pub fn validate(&self) -> Result<(), ResponseError> {
        if self.status.is_none() {
            return Err(ResponseError::MissingStatus);
        }
        if self.body.is_none() {
            return Err(ResponseError::MissingBody);
        }
        Ok(())
    }

    /// Finalizes the record for the transport, defaulting absent fields to
    /// `200 OK` and an empty body. Dispatch validates before this runs, so
    /// the defaults only matter for responses built by the transport itself.
    pub fn into_parts(self) -> (StatusCode, Headers, Body) {
        (
            self.status.unwrap_or(StatusCode::Ok),
            self.headers,
            self.body.unwrap_or_else(Body::empty),
        )
    }

    /// Plain-text response: `200 OK`, `content-type: text/plain`, with the
    /// content length set up front.
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(StatusCode::Ok)
            .header("content-type", "text/plain")
            .header("content-length", text.len().to_string())
            .body(text)
    }

    /// HTML response: `200 OK`, `content-type: text/html`, with the content
    /// length set up front.
    pub fn html(html: impl Into<String>) -> Self {
        let html = html.into();
        Self::new(StatusCode::Ok)
            .header("content-type", "text/html")
            .header("content-length", html.len().to_string())
            .body(html)
    }

    /// JSON response: `200 OK`, `content-type: application/json`.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] when `value` cannot be
    /// serialized.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let text = serde_json::to_string(value)?;
        Ok(Self::new(StatusCode::Ok)
            .header("content-type", "application/json")
            .header("content-length", text.len().to_string())
            .body(text))
    }

    /// Temporary redirect: `302 Found` with a `location` header and an empty body.
    pub fn redirect(url: impl Into<String>) -> Self {
        Self::new(StatusCode::Found)
            .header("location", url)
            .body(Body::empty())
    }

    /// Permanent redirect: `301 Moved Permanently` with a `location` header
    /// and an empty body.
    pub fn permanent_redirect(url: impl Into<String>) -> Self {
        Self::new(StatusCode::MovedPermanently)
            .header("location", url)
            .body(Body::empty())
    }

    /// Not-modified response: `304` with an empty body.
    pub fn not_modified() -> Self {
        Self::new(StatusCode::NotModified).body(Body::empty())
    }

    /// Server-error response: `500`, `content-type: text/html`.
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(StatusCode::InternalServerError)
            .header("content-type", "text/html")
            .header("content-length", message.len().to_string())
            .body(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_response_is_invalid() {
        assert_eq!(
            Response::default().validate(),
            Err(ResponseError::MissingStatus)
        );
    }

    #[test]
    fn status_without_body_is_invalid() {
        let r = Response::new(StatusCode::Ok);
        assert_eq!(r.validate(), Err(ResponseError::MissingBody));
    }

    #[test]
    fn body_without_status_is_invalid() {
        let r = Response::default().body("hello");
        assert_eq!(r.validate(), Err(ResponseError::MissingStatus));
    }

    #[tokio::test]
    async fn text_helper() {
        let r = Response::text("hello");
        assert!(r.validate().is_ok());
        assert_eq!(r.status(), Some(StatusCode::Ok));
        assert_eq!(r.headers().get("content-type"), Some("text/plain"));
        assert_eq!(r.headers().get("content-length"), Some("5"));
        let (_, _, body) = r.into_parts();
        assert_eq!(body.collect().await, "hello");
    }

    #[test]
    fn html_helper_with_status_override() {
        let r = Response::html("nope").with_status(StatusCode::NotFound);
        assert_eq!(r.status(), Some(StatusCode::NotFound));
        assert_eq!(r.headers().get("content-type"), Some("text/html"));
    }

    #[tokio::test]
    async fn json_helper() {
        #[derive(serde::Serialize)]
        struct Payload {
            a: u32,
        }

        let r = Response::json(&Payload { a: 1 }).unwrap();
        assert_eq!(r.headers().get("content-type"), Some("application/json"));
        let (_, _, body) = r.into_parts();
        assert_eq!(body.collect().await, r#"{"a":1}"#);
    }

    #[test]
    fn redirect_helpers() {
        let r = Response::redirect("http://example.com");
        assert_eq!(r.status(), Some(StatusCode::Found));
        assert_eq!(r.headers().get("location"), Some("http://example.com"));
        assert!(r.validate().is_ok());

        let r = Response::permanent_redirect("http://example.com");
        assert_eq!(r.status(), Some(StatusCode::MovedPermanently));
    }

    #[test]
    fn not_modified_helper() {
        let r = Response::not_modified();
        assert_eq!(r.status(), Some(StatusCode::NotModified));
        assert!(r.validate().is_ok());
    }

    #[test]
    fn error_helper() {
        let r = Response::error("boom");
        assert_eq!(r.status(), Some(StatusCode::InternalServerError));
        assert_eq!(r.headers().get("content-type"), Some("text/html"));
    }

    #[test]
    fn into_parts_applies_defaults() {
        let (status, headers, body) = Response::default().into_parts();
        assert_eq!(status, StatusCode::Ok);
        assert!(headers.is_empty());
        assert_eq!(body.content_length(), Some(0));
    }
}
