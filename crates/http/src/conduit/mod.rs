//! The per-connection I/O pipeline.
//!
//! A connection builds its conduits once, when it is accepted:
//!
//! ```text
//! inbound:  transport -> SourceConduit (extra bytes) -> RequestConduit (body framing)
//! outbound: ResponseConduit (head + body framing) -> SinkConduit (staging, PipeliningBuffer) -> transport
//! ```
//!
//! For every request the framing conduits are [`reset`](RequestConduit::reset)
//! to the new exchange and re-derive their behaviour from its headers; nothing
//! in the pipeline is reallocated while a connection is kept alive. Each
//! conduit remembers the id of the exchange it serves and rejects I/O on
//! behalf of any other.

mod pipelining;
mod request;
mod response;
mod sink;
mod source;

pub use pipelining::PipeliningBuffer;
pub use request::{RequestConduit, RequestFraming};
pub use response::{ResponseConduit, select_response_framing};
pub use sink::SinkConduit;
pub use source::SourceConduit;
