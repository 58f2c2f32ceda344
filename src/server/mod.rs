//! Async TCP transport adapter using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler.
//! Supports persistent connections (keep-alive) out of the box and writes
//! response bodies chunk by chunk: fully-known bodies use content-length
//! framing, streamed bodies use `Transfer-Encoding: chunked` and are
//! forwarded to the peer in emission order as chunks arrive.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    Response, StatusCode,
    request::{Request, RequestError},
};
use crate::middleware::{BoxError, Handler};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The TCP server feeding requests into a handler pipeline.
///
/// # Examples
///
/// ```rust,no_run
/// use skiff::{Response, Router, Server, dispatch};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut router = Router::new();
///     router.get("/", |_ctx| async { Ok(Response::html("Hello, World!")) });
///
///     let app = dispatch::handler(router, None);
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.serve(app).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts serving a composed [`Handler`] (e.g. the output of
    /// [`middleware::build`](crate::middleware::build) or
    /// [`dispatch::handler`](crate::dispatch::handler)).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn serve(self, handler: Handler) -> Result<(), ServerError> {
        self.run(move |req| handler(req)).await
    }

    /// Starts accepting connections and dispatching requests to `handler`.
    ///
    /// The handler receives a [`Request`] and must resolve to a
    /// [`Response`] or an error. A handler error is converted into a `500`
    /// at this layer — the pipeline below the dispatch wrapper is allowed to
    /// fail freely, the peer always sees a well-formed response.
    ///
    /// This method runs until the process is terminated or an unrecoverable
    /// listener error occurs.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Result<Response, BoxError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "skiff listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, reading one
/// request per iteration, until the peer closes the connection or signals
/// `Connection: close`.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Result<Response, BoxError>> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let bytes_read = stream.read_buf(&mut buf).await?;

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }

        // Guard against excessively large requests.
        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, "request too large — sending 413");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large");
            write_response(&mut stream, response, false).await?;
            break;
        }

        // Attempt to parse the buffered data as an HTTP request.
        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                // Headers not yet fully received — read more data.
                continue;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"));
                write_response(&mut stream, response, false).await?;
                break;
            }
        };

        // Wait for the full body to arrive if Content-Length is set.
        let content_length = request.content_length().unwrap_or(0);
        let total_needed = body_offset + content_length;
        if buf.len() < total_needed {
            continue;
        }

        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        // A handler error here means no dispatch wrapper was layered in
        // between; convert it at the transport boundary and close.
        let (response, keep_alive) = match handler(request).await {
            Ok(response) => (response, keep_alive),
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "handler failed — sending 500");
                (Response::error(format!("Error<br />{e}")), false)
            }
        };

        write_response(&mut stream, response, keep_alive).await?;

        // Drop the consumed request bytes from the buffer.
        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close — shutting down");
            break;
        }
    }

    Ok(())
}

/// Serializes a response onto the wire.
///
/// Automatically adds:
/// - `Content-Type: text/plain; charset=utf-8` if the body is non-empty and
///   no content type was set.
/// - `Content-Length: <n>` for fully-known bodies (unless a helper already
///   set one), `Transfer-Encoding: chunked` for streamed bodies.
/// - `Connection: keep-alive` or `Connection: close`.
async fn write_response(
    stream: &mut TcpStream,
    response: Response,
    keep_alive: bool,
) -> Result<(), std::io::Error> {
    let (status, mut headers, mut body) = response.into_parts();
    let streaming = body.is_streaming();

    match body.content_length() {
        Some(len) => {
            if len > 0 && !headers.contains("content-type") {
                headers.insert("Content-Type", "text/plain; charset=utf-8");
            }
            if !headers.contains("content-length") {
                headers.insert("Content-Length", len.to_string());
            }
        }
        None => {
            // Length unknown until the stream ends.
            headers.remove("content-length");
            headers.insert("Transfer-Encoding", "chunked");
        }
    }

    let connection = if keep_alive { "keep-alive" } else { "close" };
    headers.insert("Connection", connection);

    let mut head = BytesMut::with_capacity(128 + headers.len() * 64);
    head.put(format!("HTTP/1.1 {} {}\r\n", status.as_u16(), status.canonical_reason()).as_bytes());
    for (name, value) in headers.iter() {
        head.put(format!("{name}: {value}\r\n").as_bytes());
    }
    head.put(&b"\r\n"[..]);
    stream.write_all(&head).await?;

    if streaming {
        // Forward each chunk as it is emitted, flushing so long-lived
        // streams reach the peer promptly.
        while let Some(chunk) = body.next_chunk().await {
            if chunk.is_empty() {
                // A zero-length chunk would terminate the chunked stream early.
                continue;
            }
            stream
                .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
                .await?;
            stream.write_all(&chunk).await?;
            stream.write_all(b"\r\n").await?;
            stream.flush().await?;
        }
        stream.write_all(b"0\r\n\r\n").await?;
    } else {
        while let Some(chunk) = body.next_chunk().await {
            stream.write_all(&chunk).await?;
        }
    }

    stream.flush().await
}
