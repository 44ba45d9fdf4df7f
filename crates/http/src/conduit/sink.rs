use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::conduit::PipeliningBuffer;
use crate::protocol::SendError;

/// The outbound end of the pipeline: a staging buffer in front of the transport.
///
/// Encoders write into the staging buffer; bytes reach the transport when the
/// buffer grows past its high-water mark, when a response completes and the
/// [`PipeliningBuffer`] does not hold it, or on an explicit flush.
pub struct SinkConduit {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    buffer: BytesMut,
    pipelining: PipeliningBuffer,
    high_water: usize,
}

impl SinkConduit {
    pub(crate) fn new(writer: Box<dyn AsyncWrite + Send + Unpin>, pipelining: PipeliningBuffer, high_water: usize) -> Self {
        Self { writer, buffer: BytesMut::with_capacity(high_water), pipelining, high_water }
    }

    /// Bytes waiting in the staging buffer.
    pub fn staged(&self) -> usize {
        self.buffer.len()
    }

    pub fn pipelining(&self) -> &PipeliningBuffer {
        &self.pipelining
    }

    pub(crate) fn pipelining_mut(&mut self) -> &mut PipeliningBuffer {
        &mut self.pipelining
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Writes staged bytes out once they pass the high-water mark.
    pub(crate) async fn write_if_full(&mut self) -> Result<(), SendError> {
        if self.buffer.len() >= self.high_water && !self.pipelining.should_hold(self.buffer.len()) {
            self.write_staged().await?;
        }
        Ok(())
    }

    /// Called when a response is complete: flushes unless it is being aggregated.
    pub(crate) async fn complete_response(&mut self) -> Result<(), SendError> {
        if self.pipelining.should_hold(self.buffer.len()) {
            trace!(staged = self.buffer.len(), "holding pipelined response");
            return Ok(());
        }
        self.flush().await
    }

    /// Writes everything staged and flushes the transport.
    pub(crate) async fn flush(&mut self) -> Result<(), SendError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.write_staged().await?;
        Ok(self.writer.flush().await?)
    }

    async fn write_staged(&mut self) -> Result<(), SendError> {
        trace!(len = self.buffer.len(), "write to transport");
        self.writer.write_all_buf(&mut self.buffer).await?;
        Ok(())
    }

    /// Flushes and shuts the transport down.
    pub(crate) async fn shutdown(&mut self) -> Result<(), SendError> {
        self.flush().await?;
        Ok(self.writer.shutdown().await?)
    }

    /// Gives up the transport; staged bytes must have been flushed.
    pub(crate) fn into_writer(self) -> Box<dyn AsyncWrite + Send + Unpin> {
        self.writer
    }
}

impl std::fmt::Debug for SinkConduit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkConduit")
            .field("staged", &self.buffer.len())
            .field("pipelining", &self.pipelining)
            .finish_non_exhaustive()
    }
}
