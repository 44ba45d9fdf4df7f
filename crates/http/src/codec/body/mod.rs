//! Request body decoding and response body encoding.
//!
//! # Components
//!
//! ## Decoders
//! - [`ChunkedDecoder`]: chunked transfer encoded request bodies
//! - [`LengthDecoder`]: Content-Length delimited request bodies
//!
//! Decoders read from any [`bytes::Buf`] and copy body bytes straight into a
//! caller supplied slice, stopping exactly at the end of the body so the
//! bytes of a pipelined request are left in place.
//!
//! ## Encoders
//! - [`ChunkedEncoder`]: chunked transfer encoding
//! - [`LengthEncoder`]: fixed-length payloads, rejecting bodies of the wrong size
//! - [`PayloadEncoder`]: picks one of the above, or no body, or a close-delimited body

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_encoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::ChunkedEncoder;
pub use length_decoder::LengthDecoder;
pub use length_encoder::LengthEncoder;
pub use payload_encoder::PayloadEncoder;
