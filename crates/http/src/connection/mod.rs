//! Connection handling.
//!
//! # Components
//!
//! - [`ServerConnection`]: the long-lived state of one transport, holding the
//!   conduit pipeline built when the connection was accepted
//! - [`HttpConnection`]: the driver that reads request heads, runs the
//!   handler on a fresh exchange per request and re-arms for the next one
//! - [`HttpOpenListener`]: builds connections for accepted streams from a
//!   shared buffer pool, options and root handler
//! - [`UpgradedConnection`] and [`UpgradeListener`]: the raw transport handed
//!   over after a `101 Switching Protocols` response
//!
//! A connection reads the transport only when no complete request is left in
//! the bytes it already holds, so pipelined requests are served in order
//! straight out of the buffer.

mod http_connection;
mod open_listener;
mod server_connection;
mod upgrade;

pub use http_connection::HttpConnection;
pub use open_listener::HttpOpenListener;
pub use server_connection::ServerConnection;
pub use upgrade::{UpgradeListener, UpgradedConnection};
