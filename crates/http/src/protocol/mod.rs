//! Core protocol types shared by every layer of the engine.
//!
//! # Components
//!
//! - [`HttpOptions`]: limits and switches read by the parser and the conduits
//! - [`PayloadItem`], [`PayloadSize`], [`Decoded`]: body framing vocabulary
//! - Error types:
//!   - [`HttpError`]: top-level error returned by a connection
//!   - [`ParseError`]: malformed request line, headers or body framing
//!   - [`SendError`]: response write failures
//!   - [`BufferError`]: buffer pool and handle misuse
//!   - [`HandlerError`]: failures caught at the dispatch boundary
//!   - [`ExchangeError`]: exchange API misuse and channel failures

mod error;
mod options;

pub use error::BufferError;
pub use error::ChannelKind;
pub use error::ExchangeError;
pub use error::HandlerError;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub use options::DEFAULT_MAX_HEADERS;
pub use options::DEFAULT_MAX_HEADER_SIZE;
pub use options::DEFAULT_MAX_PARAMETERS;
pub use options::DEFAULT_PIPELINING_BUFFER_SIZE;
pub use options::HttpOptions;
pub use options::UrlCharset;

mod message;

pub use message::Decoded;
pub use message::PayloadItem;
pub use message::PayloadSize;
