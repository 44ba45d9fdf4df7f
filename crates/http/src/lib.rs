//! A non-blocking HTTP/1.x server engine
//!
//! The crate turns bytes arriving on an async transport into parsed requests,
//! hands each one to an application handler as an [`exchange::HttpServerExchange`],
//! and frames the handler's output back onto the transport. One connection
//! serves any number of keep-alive and pipelined requests through a pipeline
//! that is built once, when the connection is accepted.
//!
//! # Features
//!
//! - Pooled, reference-counted I/O buffers with a per-thread free list
//! - A resumable request parser that picks up exactly where a short read left it
//! - Content-Length and chunked request bodies, decoded on demand
//! - Fixed-length, chunked and close-delimited responses
//! - Keep-alive, pipelining and an optional write aggregator for pipelined responses
//! - `Expect: 100-continue`
//! - Dispatching an exchange to another executor, and protocol upgrades
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn};
//! use nio_http::connection::HttpOpenListener;
//! use nio_http::handler::make_handler;
//! use nio_http::protocol::HandlerError;
//!
//! #[tokio::main]
//! async fn main() {
//!     info!(port = 8080, "start listening");
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let handler = Arc::new(make_handler(|exchange| {
//!         Box::pin(async move {
//!             info!(path = exchange.request().request_path(), "receiving request");
//!             exchange.send("Hello World!\r\n").await.map_err(HandlerError::failed)
//!         })
//!     }));
//!     let open_listener = HttpOpenListener::new(handler);
//!
//!     loop {
//!         match tcp_listener.accept().await {
//!             Ok((tcp_stream, _remote_addr)) => {
//!                 open_listener.spawn(tcp_stream);
//!             }
//!             Err(e) => warn!(cause = %e, "failed to accept"),
//!         }
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`buffer`]: the buffer pool every read goes through
//! - [`codec`]: the request parser, body decoders and response encoders
//! - [`conduit`]: the per-connection I/O pipeline assembled from the codecs
//! - [`exchange`]: the request/response lifecycle seen by handlers
//! - [`handler`]: the handler contract
//! - [`connection`]: the driver tying a transport, its pipeline and the
//!   handler together
//! - [`protocol`]: options and error types shared by all of the above
//!
//! # Error handling
//!
//! - [`protocol::ParseError`]: malformed or oversized requests; the connection
//!   is closed without a response
//! - [`protocol::SendError`]: response framing and write failures
//! - [`protocol::HandlerError`]: a handler that failed, panicked or was lost;
//!   the connection is closed
//! - [`protocol::HttpError`]: everything a connection can end with
//!
//! # Limitations
//!
//! - HTTP/1.x only
//! - No TLS (terminate it in front of the server)

pub mod buffer;
pub mod codec;
pub mod conduit;
pub mod connection;
pub mod exchange;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
