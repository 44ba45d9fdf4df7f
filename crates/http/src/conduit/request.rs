use bytes::Buf;
use http::{Method, header};
use tracing::trace;

use crate::codec::{ChunkedDecoder, LengthDecoder};
use crate::conduit::SourceConduit;
use crate::exchange::RequestHead;
use crate::protocol::{Decoded, ExchangeError, ParseError};
use crate::ensure;

/// How the body of the current request is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFraming {
    /// No body; the request is terminated as soon as its head is parsed
    Empty,
    /// Exactly `Content-Length` bytes
    FixedLength,
    /// Chunked transfer encoding
    Chunked,
    /// No usable framing: bytes are passed through and the connection can't be reused
    PassThrough,
}

/// The body framing selector.
///
/// Built once per connection. [`reset`](Self::reset) re-targets it at each
/// new exchange and picks the framing from that exchange's headers, reusing
/// the same decoders.
#[derive(Debug)]
pub struct RequestConduit {
    exchange_id: u64,
    framing: RequestFraming,
    length: LengthDecoder,
    chunked: ChunkedDecoder,
    finished: bool,
}

impl Default for RequestConduit {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestConduit {
    pub fn new() -> Self {
        Self {
            exchange_id: 0,
            framing: RequestFraming::Empty,
            length: LengthDecoder::new(0),
            chunked: ChunkedDecoder::new(),
            finished: true,
        }
    }

    /// Selects the framing for exchange `exchange_id` from its request head.
    ///
    /// A Content-Length alongside a Transfer-Encoding is rejected.
    pub fn reset(&mut self, exchange_id: u64, head: &RequestHead) -> Result<RequestFraming, ParseError> {
        self.exchange_id = exchange_id;
        self.framing = select_framing(head, &mut self.length, &mut self.chunked)?;
        self.finished = self.framing == RequestFraming::Empty;
        trace!(exchange = exchange_id, framing = ?self.framing, "request conduit reset");
        Ok(self.framing)
    }

    pub fn framing(&self) -> RequestFraming {
        self.framing
    }

    pub fn exchange_id(&self) -> u64 {
        self.exchange_id
    }

    /// Whether the end of the body has been read.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Reads body bytes of exchange `exchange_id` into `dst`.
    ///
    /// Returns `Ok(0)` at the end of the body. A transport closed before a
    /// framed body is complete is an error.
    pub(crate) async fn read(
        &mut self,
        exchange_id: u64,
        source: &mut SourceConduit,
        dst: &mut [u8],
    ) -> Result<usize, ExchangeError> {
        ensure!(
            exchange_id == self.exchange_id,
            ExchangeError::StaleExchange { current: self.exchange_id, requested: exchange_id }
        );

        loop {
            if self.finished || dst.is_empty() {
                return Ok(0);
            }

            let complete = match self.framing {
                RequestFraming::FixedLength => self.length.remaining() == 0,
                RequestFraming::Chunked => self.chunked.is_finished(),
                RequestFraming::Empty => true,
                RequestFraming::PassThrough => false,
            };
            if complete {
                self.finished = true;
                return Ok(0);
            }

            if let Some(buffered) = source.buffered() {
                let decoded = match self.framing {
                    RequestFraming::Empty => None,
                    RequestFraming::FixedLength => self.length.decode(buffered, dst)?,
                    RequestFraming::Chunked => self.chunked.decode(buffered, dst)?,
                    RequestFraming::PassThrough => {
                        let n = buffered.remaining().min(dst.len());
                        buffered.copy_to_slice(&mut dst[..n]);
                        Some(Decoded::Data(n))
                    }
                };
                source.release_consumed();

                match decoded {
                    Some(Decoded::Data(n)) if n > 0 => return Ok(n),
                    Some(Decoded::Eof) => {
                        self.finished = true;
                        return Ok(0);
                    }
                    Some(Decoded::Data(_)) | None => {}
                }
            }

            if !source.fill().await? {
                if self.framing == RequestFraming::PassThrough {
                    self.finished = true;
                    return Ok(0);
                }
                return Err(ParseError::UnexpectedEof.into());
            }
        }
    }
}

fn select_framing(
    head: &RequestHead,
    length: &mut LengthDecoder,
    chunked: &mut ChunkedDecoder,
) -> Result<RequestFraming, ParseError> {
    if has_no_body(head.method()) {
        return Ok(RequestFraming::Empty);
    }

    let headers = head.headers();
    let content_length = headers.get(header::CONTENT_LENGTH);
    let transfer_encoding = headers.get_all(header::TRANSFER_ENCODING).iter().last();

    match (content_length, transfer_encoding) {
        (Some(_), Some(_)) => Err(ParseError::invalid_body("both content-length and transfer-encoding present")),
        (Some(value), None) => {
            let size = value
                .to_str()
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .ok_or_else(|| ParseError::invalid_content_length(format!("{value:?}")))?;
            if size == 0 {
                return Ok(RequestFraming::Empty);
            }
            length.reset(size);
            Ok(RequestFraming::FixedLength)
        }
        (None, Some(value)) if is_chunked(value.as_bytes()) => {
            chunked.reset();
            Ok(RequestFraming::Chunked)
        }
        _ => Ok(RequestFraming::PassThrough),
    }
}

fn has_no_body(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

/// Whether `chunked` is the final transfer coding.
fn is_chunked(value: &[u8]) -> bool {
    value.rsplit(|&b| b == b',').next().is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}
