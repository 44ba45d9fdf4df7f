use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

use crate::buffer::BufferPool;
use crate::codec::{HttpRequestParser, ParseState};
use crate::conduit::{PipeliningBuffer, RequestConduit, ResponseConduit, SinkConduit, SourceConduit};
use crate::connection::UpgradedConnection;
use crate::exchange::{Executor, RequestHead, WorkerPool};
use crate::protocol::{HttpError, HttpOptions, ParseError};

/// The per-connection state shared by every exchange on a transport.
///
/// Built once when the connection is accepted. Its conduits are reset for
/// each exchange and never rebuilt, so a keep-alive connection serves any
/// number of requests through the same pipeline.
pub struct ServerConnection {
    pub(crate) source: SourceConduit,
    pub(crate) request: RequestConduit,
    pub(crate) response: ResponseConduit,
    pub(crate) sink: SinkConduit,
    pub(crate) default_executor: Arc<dyn Executor>,
    parser: Arc<HttpRequestParser>,
    parse_state: ParseState,
    options: Arc<HttpOptions>,
    next_exchange_id: u64,
    armed: bool,
}

impl ServerConnection {
    pub(crate) fn new(
        reader: Box<dyn AsyncRead + Send + Unpin>,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        pool: BufferPool,
        options: Arc<HttpOptions>,
        parser: Arc<HttpRequestParser>,
    ) -> Self {
        let pipelining = PipeliningBuffer::new(options.buffer_pipelined_data(), options.pipelining_buffer_size());
        let high_water = pool.buffer_size();
        Self {
            source: SourceConduit::new(reader, pool),
            request: RequestConduit::new(),
            response: ResponseConduit::new(),
            sink: SinkConduit::new(writer, pipelining, high_water),
            default_executor: Arc::new(WorkerPool::new()),
            parser,
            parse_state: ParseState::new(),
            options,
            next_exchange_id: 0,
            armed: false,
        }
    }

    pub(crate) fn set_default_executor(&mut self, executor: Arc<dyn Executor>) {
        self.default_executor = executor;
    }

    pub fn request_conduit(&self) -> &RequestConduit {
        &self.request
    }

    pub fn response_conduit(&self) -> &ResponseConduit {
        &self.response
    }

    pub fn source(&self) -> &SourceConduit {
        &self.source
    }

    pub fn sink(&self) -> &SinkConduit {
        &self.sink
    }

    pub fn options(&self) -> &HttpOptions {
        &self.options
    }

    /// Whether bytes of a further request were read along with the current one.
    pub fn has_extra_bytes(&self) -> bool {
        self.source.has_extra()
    }

    /// Whether the connection is ready to read another request.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub(crate) fn set_armed(&mut self, armed: bool) {
        self.armed = armed;
    }

    pub(crate) fn next_exchange_id(&mut self) -> u64 {
        self.next_exchange_id += 1;
        self.next_exchange_id
    }

    /// Parses the next request head into `head`.
    ///
    /// Bytes left over from the previous request are parsed first; the
    /// transport is only read once they run out, after anything staged in
    /// the sink has been flushed. Returns `Ok(false)` when the peer closes
    /// the transport between requests.
    pub(crate) async fn read_request_head(&mut self, head: &mut RequestHead) -> Result<bool, HttpError> {
        self.parse_state.reset();
        loop {
            if let Some(buffered) = self.source.buffered() {
                self.parser.handle(buffered, &mut self.parse_state, head)?;
                self.source.release_consumed();
                if self.parse_state.is_complete() {
                    trace!(bytes = self.parse_state.bytes_read(), headers = self.parse_state.header_count(), "parsed request head");
                    return Ok(true);
                }
            }

            self.sink.flush().await?;
            if !self.source.fill().await? {
                if self.parse_state.is_fresh() {
                    return Ok(false);
                }
                return Err(ParseError::UnexpectedEof.into());
            }
        }
    }

    /// Flushes what is staged and releases the transport to a new protocol.
    pub(crate) async fn into_upgraded(mut self) -> Result<UpgradedConnection, HttpError> {
        self.sink.flush().await?;
        let (reader, extra) = self.source.into_parts();
        Ok(UpgradedConnection::new(reader, self.sink.into_writer(), extra))
    }

    /// Flushes and shuts the transport down.
    pub(crate) async fn shutdown(&mut self) -> Result<(), HttpError> {
        Ok(self.sink.shutdown().await?)
    }
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("source", &self.source)
            .field("request", &self.request)
            .field("response", &self.response)
            .field("sink", &self.sink)
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}
