//! Incrementally-produced response bodies.
//!
//! A [`Streamer`] is the producer-side handle for a response body that is
//! emitted over time instead of being known up front. Call
//! [`respond`](Streamer::respond) once to obtain the [`Response`] whose body
//! is fed by this streamer, then [`send`](Streamer::send) chunks and finish
//! with [`end`](Streamer::end):
//!
//! ```
//! use skiff::stream::Streamer;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut streamer = Streamer::new();
//! let response = streamer.respond();
//!
//! streamer.send("Hello, ");
//! streamer.send("world");
//! streamer.end();
//!
//! let (_, _, body) = response.into_parts();
//! assert_eq!(body.collect().await, "Hello, world");
//! # }
//! ```
//!
//! Chunks are delivered to the consumer in the exact order they were sent.
//! Chunks sent before the consumer starts enumerating the body are buffered
//! and replayed in order.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::http::{Body, Headers, Response, StatusCode};

/// Producer-side handle for a streamed response body.
///
/// Backed by a single-producer/single-consumer unbounded channel: the
/// [`Body`] handed out by [`respond`](Self::respond) holds the receiving
/// half, and the streamer keeps the sender until [`end`](Self::end) is
/// called (or the streamer is dropped, which ends the stream implicitly).
#[derive(Debug)]
pub struct Streamer {
    sender: Option<mpsc::UnboundedSender<Bytes>>,
    receiver: Option<mpsc::UnboundedReceiver<Bytes>>,
}

impl Streamer {
    /// Creates a streamer with an open, empty body channel.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Some(sender),
            receiver: Some(receiver),
        }
    }

    /// Emits one body chunk.
    ///
    /// Chunks sent after [`end`](Self::end), or after the consumer has gone
    /// away, are discarded.
    pub fn send(&self, chunk: impl Into<Bytes>) {
        match &self.sender {
            Some(sender) => {
                if sender.send(chunk.into()).is_err() {
                    debug!("stream chunk dropped: consumer is gone");
                }
            }
            None => debug!("stream chunk dropped: stream already ended"),
        }
    }

    /// Signals that no further chunks will be sent, completing the body.
    ///
    /// Idempotent. If `end` is never called the body never completes and the
    /// connection stays open, which is the intended behavior for long-lived
    /// push responses; dropping the `Streamer` also completes the body.
    pub fn end(&mut self) {
        self.sender = None;
    }

    /// Returns `true` once [`end`](Self::end) has been called.
    pub fn is_ended(&self) -> bool {
        self.sender.is_none()
    }

    /// Builds the response fed by this streamer: status `200`,
    /// `content-type: text/plain`, and no content-length (the body length is
    /// unknown at construction time).
    ///
    /// # Panics
    ///
    /// Panics when called more than once on the same streamer. The body
    /// channel has a single consuming end, so a second response could never
    /// observe the chunks; calling this twice is a caller error.
    pub fn respond(&mut self) -> Response {
        let mut headers = Headers::new();
        headers.insert("content-type", "text/plain");
        self.respond_with(StatusCode::Ok, headers)
    }

    /// Like [`respond`](Self::respond) with an explicit status and headers.
    ///
    /// # Panics
    ///
    /// Panics when the response has already been taken, as for `respond`.
    pub fn respond_with(&mut self, status: StatusCode, headers: Headers) -> Response {
        let receiver = self
            .receiver
            .take()
            .expect("Streamer::respond called more than once");

        let mut response = Response::new(status).body(Body::Streaming(receiver));
        for (name, value) in headers.iter() {
            response.add_header(name, value);
        }
        response
    }
}

impl Default for Streamer {
    fn default() -> Self {
        Self::new()
    }
}
