//! Wire codecs for HTTP/1.x
//!
//! - [`parser`]: the resumable request line and header parser
//! - [`body`]: request body decoders and response body encoders
//! - [`header`]: response header serialisation
//!
//! Everything here is free of I/O. The conduits in [`crate::conduit`] feed
//! these codecs from the transport and write their output back to it.
//!
//! # Example
//!
//! ```
//! use nio_http::codec::{HttpRequestParser, ParseState};
//! use nio_http::exchange::RequestHead;
//! use nio_http::protocol::HttpOptions;
//!
//! let parser = HttpRequestParser::new(&HttpOptions::default());
//! let mut state = ParseState::new();
//! let mut head = RequestHead::default();
//!
//! let mut first: &[u8] = b"GET /index.ht";
//! parser.handle(&mut first, &mut state, &mut head).unwrap();
//! assert!(!state.is_complete());
//!
//! let mut rest: &[u8] = b"ml HTTP/1.1\r\nHost: localhost\r\n\r\n";
//! parser.handle(&mut rest, &mut state, &mut head).unwrap();
//! assert!(state.is_complete());
//! assert_eq!(head.request_path(), "/index.html");
//! ```

pub mod body;
pub mod header;
pub mod parser;

pub use body::{ChunkedDecoder, ChunkedEncoder, LengthDecoder, LengthEncoder, PayloadEncoder};
pub use header::HeaderEncoder;
pub use parser::{HttpRequestParser, ParseStage, ParseState};
