//! # skiff
//!
//! A minimal async web application toolkit: turn a declarative route
//! configuration into a request handler, compose handlers in layered
//! middleware stacks, and build protocol-conformant responses — including
//! incrementally-produced (streamed) ones.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skiff::{Response, Router, Server, dispatch, middleware};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.get("/", |_ctx| async { Ok(Response::html("Hello, World!")) });
//!
//!     let app = middleware::build(|stack| {
//!         stack.wrap(middleware::logger);
//!         stack.wrap(move |_inner| dispatch::handler(router, None));
//!     });
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     println!("Listening on http://127.0.0.1:8080");
//!     server.serve(app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Streaming
//!
//! A handler may return a body that is produced over time instead of all at
//! once:
//!
//! ```rust,no_run
//! use skiff::{Response, Router, stream::Streamer};
//!
//! let mut router = Router::new();
//! router.get("/events", |_ctx| async {
//!     let mut streamer = Streamer::new();
//!     let response = streamer.respond();
//!     tokio::spawn(async move {
//!         streamer.send("tick\n");
//!         streamer.send("tock\n");
//!         streamer.end();
//!     });
//!     Ok(response)
//! });
//! ```

pub mod context;
pub mod dispatch;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;
pub mod stream;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use context::Context;
pub use http::{Body, Headers, Method, Request, Response, StatusCode};
pub use middleware::{BoxError, Handler};
pub use router::Router;
pub use server::{Server, ServerError};
