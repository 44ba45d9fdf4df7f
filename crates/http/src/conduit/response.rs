use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Version, header};
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::codec::{HeaderEncoder, PayloadEncoder};
use crate::conduit::SinkConduit;
use crate::ensure;
use crate::exchange::ResponseHead;
use crate::protocol::{ExchangeError, PayloadItem, PayloadSize, SendError};

/// The response header writer.
///
/// The head is written lazily, on the first body write or at shutdown, with
/// the framing chosen then. Like [`RequestConduit`](crate::conduit::RequestConduit)
/// it is built once per connection and re-targeted with [`reset`](Self::reset).
#[derive(Debug, Default)]
pub struct ResponseConduit {
    exchange_id: u64,
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseConduit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self, exchange_id: u64) {
        self.exchange_id = exchange_id;
        self.payload_encoder = None;
    }

    pub fn exchange_id(&self) -> u64 {
        self.exchange_id
    }

    /// Whether the head of the current response has been written.
    pub fn is_head_written(&self) -> bool {
        self.payload_encoder.is_some()
    }

    /// Whether the body of the current response is complete.
    pub fn is_finished(&self) -> bool {
        self.payload_encoder.as_ref().is_some_and(PayloadEncoder::is_finish)
    }

    fn check(&self, exchange_id: u64) -> Result<(), ExchangeError> {
        ensure!(
            exchange_id == self.exchange_id,
            ExchangeError::StaleExchange { current: self.exchange_id, requested: exchange_id }
        );
        Ok(())
    }

    pub(crate) fn write_head(
        &mut self,
        exchange_id: u64,
        head: &ResponseHead,
        payload_size: PayloadSize,
        sink: &mut SinkConduit,
    ) -> Result<(), ExchangeError> {
        self.check(exchange_id)?;
        ensure!(self.payload_encoder.is_none(), ExchangeError::ResponseStarted);

        self.header_encoder.encode((head, payload_size), sink.buffer_mut())?;
        self.payload_encoder = Some(PayloadEncoder::from_size(payload_size));
        trace!(exchange = exchange_id, status = head.status().as_u16(), ?payload_size, "wrote response head");
        Ok(())
    }

    pub(crate) fn write_body(&mut self, exchange_id: u64, data: &[u8], sink: &mut SinkConduit) -> Result<(), ExchangeError> {
        self.check(exchange_id)?;
        let encoder = self
            .payload_encoder
            .as_mut()
            .ok_or_else(|| SendError::invalid_body("response body written before its head"))?;
        encoder.encode(PayloadItem::Chunk(data), sink.buffer_mut())?;
        Ok(())
    }

    /// Writes the end of the body, if the framing has one.
    pub(crate) fn finish(&mut self, exchange_id: u64, sink: &mut SinkConduit) -> Result<(), ExchangeError> {
        self.check(exchange_id)?;
        match self.payload_encoder.as_mut() {
            Some(encoder) if !encoder.is_finish() => Ok(encoder.encode(PayloadItem::<Bytes>::Eof, sink.buffer_mut())?),
            Some(_) => Ok(()),
            None => Err(SendError::invalid_body("response finished before its head").into()),
        }
    }
}

/// Picks the framing for a response.
///
/// - HEAD requests and 1xx, 204 and 304 responses carry no body
/// - a Content-Length set by the handler means a fixed-length body
/// - otherwise HTTP/1.1 clients get a chunked body
/// - older clients get a body delimited by closing the connection
pub fn select_response_framing(
    method: &Method,
    version: Version,
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<PayloadSize, SendError> {
    if method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return Ok(PayloadSize::Empty);
    }

    if let Some(value) = headers.get(header::CONTENT_LENGTH) {
        let size = value
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or_else(|| SendError::invalid_body(format!("invalid response content-length {value:?}")))?;
        return Ok(PayloadSize::Length(size));
    }

    if version == Version::HTTP_11 { Ok(PayloadSize::Chunked) } else { Ok(PayloadSize::CloseDelimited) }
}
