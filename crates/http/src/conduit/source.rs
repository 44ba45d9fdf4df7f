use bytes::Buf;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::buffer::{BufferPool, PooledBuffer};
use crate::protocol::{ExchangeError, ParseError};

/// The inbound end of the pipeline: the transport plus the bytes read from it
/// but not yet consumed.
///
/// Whatever is left in the buffer after a request head or body has been taken
/// out belongs to the next pipelined request and is served before the
/// transport is read again. The buffer has a single owner and is never
/// duplicated.
pub struct SourceConduit {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    pool: BufferPool,
    extra: Option<PooledBuffer>,
}

impl SourceConduit {
    pub(crate) fn new(reader: Box<dyn AsyncRead + Send + Unpin>, pool: BufferPool) -> Self {
        Self { reader, pool, extra: None }
    }

    /// Whether unconsumed bytes are waiting.
    pub fn has_extra(&self) -> bool {
        self.extra.as_ref().is_some_and(Buf::has_remaining)
    }

    pub fn extra_len(&self) -> usize {
        self.extra.as_ref().map_or(0, Buf::remaining)
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// The unconsumed bytes, if there are any.
    pub(crate) fn buffered(&mut self) -> Option<&mut PooledBuffer> {
        self.extra.as_mut().filter(|buffer| buffer.has_remaining())
    }

    /// Returns the buffer to the pool once everything in it was consumed.
    pub(crate) fn release_consumed(&mut self) {
        if self.extra.as_ref().is_some_and(|buffer| !buffer.has_remaining()) {
            self.extra = None;
        }
    }

    /// Makes sure unconsumed bytes are available, reading the transport if needed.
    ///
    /// Returns `Ok(false)` when the peer closed the transport.
    pub(crate) async fn fill(&mut self) -> Result<bool, ExchangeError> {
        if self.has_extra() {
            return Ok(true);
        }

        let mut buffer = match self.extra.take() {
            Some(mut buffer) => {
                buffer.clear();
                buffer
            }
            None => self.pool.allocate()?,
        };

        let n = self.reader.read(buffer.spare_mut()?).await.map_err(ParseError::io)?;
        if n == 0 {
            trace!("transport reached end of stream");
            return Ok(false);
        }

        trace!(len = n, "read from transport");
        buffer.commit(n);
        self.extra = Some(buffer);
        Ok(true)
    }

    pub(crate) fn into_parts(self) -> (Box<dyn AsyncRead + Send + Unpin>, Option<PooledBuffer>) {
        let extra = self.extra.filter(|buffer| buffer.has_remaining());
        (self.reader, extra)
    }
}

impl std::fmt::Debug for SourceConduit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConduit").field("extra", &self.extra_len()).finish_non_exhaustive()
    }
}
