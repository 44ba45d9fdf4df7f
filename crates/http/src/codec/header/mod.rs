//! Response header serialisation.
//!
//! - [`HeaderEncoder`]: writes the status line, the framing header for the
//!   chosen payload size and the handler's headers into a `BytesMut`.
//!
//! Request headers are not decoded here; see [`crate::codec::parser`].

mod header_encoder;

pub use header_encoder::HeaderEncoder;
