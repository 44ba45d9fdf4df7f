use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Buf;
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::buffer::PooledBuffer;

/// Takes over a connection after a `101 Switching Protocols` response.
pub trait UpgradeListener: Send {
    fn handle_upgrade(self: Box<Self>, connection: UpgradedConnection) -> BoxFuture<'static, ()>;
}

impl<F> UpgradeListener for F
where
    F: FnOnce(UpgradedConnection) -> BoxFuture<'static, ()> + Send,
{
    fn handle_upgrade(self: Box<Self>, connection: UpgradedConnection) -> BoxFuture<'static, ()> {
        (*self)(connection)
    }
}

/// The raw transport of an upgraded connection.
///
/// Reads return the bytes that arrived after the upgrade request first, then
/// continue from the transport.
pub struct UpgradedConnection {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    extra: Option<PooledBuffer>,
}

impl UpgradedConnection {
    pub(crate) fn new(
        reader: Box<dyn AsyncRead + Send + Unpin>,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        extra: Option<PooledBuffer>,
    ) -> Self {
        Self { reader, writer, extra }
    }

    /// Bytes read past the upgrade request and not yet returned.
    pub fn extra_len(&self) -> usize {
        self.extra.as_ref().map_or(0, Buf::remaining)
    }
}

impl AsyncRead for UpgradedConnection {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if let Some(extra) = self.extra.as_mut() {
            let n = extra.remaining().min(buf.remaining());
            buf.put_slice(&extra.chunk()[..n]);
            extra.advance(n);
            if !extra.has_remaining() {
                self.extra = None;
            }
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for UpgradedConnection {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.writer).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.writer).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.writer).poll_shutdown(cx)
    }
}

impl std::fmt::Debug for UpgradedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradedConnection").field("extra", &self.extra_len()).finish_non_exhaustive()
    }
}
