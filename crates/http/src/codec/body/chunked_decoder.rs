//! Decoder for HTTP chunked transfer encoding.
//!
//! Implements the chunked format of
//! [RFC 7230 Section 4.1](https://tools.ietf.org/html/rfc7230#section-4.1).
//! The decoder copies chunk data straight into the caller's buffer and keeps
//! its position in the framing between calls, so input may be split anywhere.

use std::task::Poll;

use bytes::Buf;
use tracing::trace;
use ChunkedState::*;

use crate::protocol::{Decoded, ParseError};

/// A decoder for chunked request bodies.
///
/// - Each chunk starts with its size in hexadecimal
/// - Followed by optional extensions and CRLF
/// - Then the chunk data and CRLF
/// - A zero-sized chunk, optional trailers and a CRLF end the body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    /// Creates a decoder ready to read the size of the first chunk.
    pub fn new() -> Self {
        Self { state: Size, remaining_size: 0 }
    }

    /// Rewinds the decoder so it can be reused for the next request.
    pub fn reset(&mut self) {
        self.state = Size;
        self.remaining_size = 0;
    }

    pub fn is_finished(&self) -> bool {
        self.state == End
    }

    /// Decodes from `src` into `dst`.
    ///
    /// # Returns
    /// - `Ok(Some(Decoded::Data(n)))` when `n` body bytes were copied into `dst`
    /// - `Ok(Some(Decoded::Eof))` once the terminating chunk was read
    /// - `Ok(None)` when `src` ran out before any body byte was found
    /// - `Err(ParseError)` if the chunked framing is invalid
    pub fn decode<B: Buf>(&mut self, src: &mut B, dst: &mut [u8]) -> Result<Option<Decoded>, ParseError> {
        if dst.is_empty() {
            return Ok(Some(Decoded::Data(0)));
        }

        loop {
            if self.state == End {
                trace!("finished reading chunked data");
                return Ok(Some(Decoded::Eof));
            }

            if !src.has_remaining() {
                return Ok(None);
            }

            let mut copied = 0;

            self.state = match self.state.step(src, &mut self.remaining_size, dst, &mut copied) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(e),
            };

            if copied > 0 {
                trace!(len = copied, "read chunked bytes");
                return Ok(Some(Decoded::Data(copied)));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the chunk size in hex
    Size,
    /// Whitespace after size
    SizeLws,
    /// Skip chunk extensions
    Extension,
    /// Read LF after chunk size
    SizeLf,
    /// Read chunk data
    Body,
    BodyCr,
    BodyLf,
    /// Skip a trailer field
    Trailer,
    TrailerLf,
    EndCr,
    EndLf,
    End,
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.has_remaining() {
            $src.get_u8()
        } else {
            return Poll::Pending;
        }
    }};
}

fn invalid(reason: &'static str) -> Poll<Result<ChunkedState, ParseError>> {
    Poll::Ready(Err(ParseError::invalid_body(reason)))
}

impl ChunkedState {
    fn step<B: Buf>(
        &self,
        src: &mut B,
        remaining_size: &mut u64,
        dst: &mut [u8],
        copied: &mut usize,
    ) -> Poll<Result<ChunkedState, ParseError>> {
        match self {
            Size => ChunkedState::read_size(src, remaining_size),
            SizeLws => ChunkedState::read_size_lws(src),
            Extension => ChunkedState::read_extension(src),
            SizeLf => ChunkedState::read_size_lf(src, remaining_size),
            Body => ChunkedState::read_body(src, remaining_size, dst, copied),
            BodyCr => ChunkedState::read_body_cr(src),
            BodyLf => ChunkedState::read_body_lf(src),
            Trailer => ChunkedState::read_trailer(src),
            TrailerLf => ChunkedState::read_trailer_lf(src),
            EndCr => ChunkedState::read_end_cr(src),
            EndLf => ChunkedState::read_end_lf(src),
            End => Poll::Ready(Ok(End)),
        }
    }

    /// Accumulates one hex digit of the chunk size.
    fn read_size<B: Buf>(src: &mut B, size_per_chunk: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
        macro_rules! or_overflow {
            ($e:expr) => {
                match $e {
                    Some(val) => val,
                    None => return invalid("chunk size overflow"),
                }
            };
        }

        let digit = match try_next_byte!(src) {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b + 10 - b'a',
            b @ b'A'..=b'F' => b + 10 - b'A',
            b'\t' | b' ' => return Poll::Ready(Ok(SizeLws)),
            b';' => return Poll::Ready(Ok(Extension)),
            b'\r' => return Poll::Ready(Ok(SizeLf)),
            _ => return invalid("invalid chunk size line"),
        };

        *size_per_chunk = or_overflow!(size_per_chunk.checked_mul(16));
        *size_per_chunk = or_overflow!(size_per_chunk.checked_add(u64::from(digit)));
        Poll::Ready(Ok(Size))
    }

    fn read_size_lws<B: Buf>(src: &mut B) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            // LWS can follow the chunk size, but no more digits can come
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => invalid("invalid chunk size linear white space"),
        }
    }

    /// Extensions are ignored up to the CRLF; a bare LF inside one is rejected.
    fn read_extension<B: Buf>(src: &mut B) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => invalid("chunk extension contains newline"),
            _ => Poll::Ready(Ok(Extension)),
        }
    }

    fn read_size_lf<B: Buf>(src: &mut B, size_per_chunk: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' if *size_per_chunk == 0 => Poll::Ready(Ok(EndCr)),
            b'\n' => Poll::Ready(Ok(Body)),
            _ => invalid("invalid chunk size LF"),
        }
    }

    fn read_body<B: Buf>(
        src: &mut B,
        size_per_chunk: &mut u64,
        dst: &mut [u8],
        copied: &mut usize,
    ) -> Poll<Result<ChunkedState, ParseError>> {
        if !src.has_remaining() {
            return Poll::Ready(Ok(Body));
        }

        if *size_per_chunk == 0 {
            return Poll::Ready(Ok(BodyCr));
        }

        let remaining = usize::try_from(*size_per_chunk).unwrap_or(usize::MAX);
        let read_size = remaining.min(src.chunk().len()).min(dst.len());

        dst[..read_size].copy_from_slice(&src.chunk()[..read_size]);
        src.advance(read_size);
        *size_per_chunk -= read_size as u64;
        *copied = read_size;

        if *size_per_chunk > 0 {
            Poll::Ready(Ok(Body))
        } else {
            Poll::Ready(Ok(BodyCr))
        }
    }

    fn read_body_cr<B: Buf>(src: &mut B) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(BodyLf)),
            _ => invalid("invalid chunk body CR"),
        }
    }

    fn read_body_lf<B: Buf>(src: &mut B) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(Size)),
            _ => invalid("invalid chunk body LF"),
        }
    }

    fn read_trailer<B: Buf>(src: &mut B) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(TrailerLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_trailer_lf<B: Buf>(src: &mut B) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(EndCr)),
            _ => invalid("invalid trailer end LF"),
        }
    }

    /// Anything but CR here starts a trailer field.
    fn read_end_cr<B: Buf>(src: &mut B) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(EndLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_end_lf<B: Buf>(src: &mut B) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(End)),
            _ => invalid("invalid chunk end LF"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Decodes everything in `src`, returning the body and whether EOF was seen.
    fn drain(decoder: &mut ChunkedDecoder, src: &mut &[u8]) -> (Vec<u8>, bool) {
        let mut body = Vec::new();
        let mut dst = [0u8; 64];
        loop {
            match decoder.decode(src, &mut dst).unwrap() {
                Some(Decoded::Data(n)) => body.extend_from_slice(&dst[..n]),
                Some(Decoded::Eof) => return (body, true),
                None => return (body, false),
            }
        }
    }

    #[test]
    fn test_basic() {
        let mut src: &[u8] = b"10\r\n1234567890abcdef\r\n0\r\n\r\n";
        let mut decoder = ChunkedDecoder::new();

        let mut dst = [0u8; 32];
        assert_eq!(decoder.decode(&mut src, &mut dst).unwrap(), Some(Decoded::Data(16)));
        assert_eq!(&dst[..16], b"1234567890abcdef");

        assert_eq!(decoder.decode(&mut src, &mut dst).unwrap(), Some(Decoded::Eof));
        assert!(decoder.is_finished());
        assert!(src.is_empty());
    }

    #[test]
    fn test_multiple_chunks_with_extensions_and_trailers() {
        let mut src: &[u8] = b"5;chunk-ext=value\r\nhello\r\n7\r\n, world\r\n0\r\nTrailer: value\r\n\r\n";
        let mut decoder = ChunkedDecoder::new();

        let (body, eof) = drain(&mut decoder, &mut src);
        assert_eq!(body, b"hello, world");
        assert!(eof);
    }

    #[test]
    fn test_small_destination() {
        let mut src: &[u8] = b"a\r\n0123456789\r\n0\r\n\r\n";
        let mut decoder = ChunkedDecoder::new();

        let mut dst = [0u8; 4];
        assert_eq!(decoder.decode(&mut src, &mut dst).unwrap(), Some(Decoded::Data(4)));
        assert_eq!(&dst, b"0123");
        assert_eq!(decoder.decode(&mut src, &mut dst).unwrap(), Some(Decoded::Data(4)));
        assert_eq!(decoder.decode(&mut src, &mut dst).unwrap(), Some(Decoded::Data(2)));
        assert_eq!(&dst[..2], b"89");
        assert_eq!(decoder.decode(&mut src, &mut dst).unwrap(), Some(Decoded::Eof));
    }

    #[test]
    fn test_split_at_every_byte() {
        let input = b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let mut decoder = ChunkedDecoder::new();
        let mut body = Vec::new();
        let mut eof = false;

        for byte in input.chunks(1) {
            let mut src = byte;
            let (part, done) = drain(&mut decoder, &mut src);
            body.extend(part);
            eof |= done;
        }

        assert_eq!(body, b"hello world");
        assert!(eof);
    }

    #[test]
    fn test_stops_at_end_of_body() {
        let mut src: &[u8] = b"0\r\n\r\nGET / HTTP/1.1\r\n";
        let mut decoder = ChunkedDecoder::new();

        let (body, eof) = drain(&mut decoder, &mut src);
        assert!(body.is_empty());
        assert!(eof);
        assert_eq!(src, b"GET / HTTP/1.1\r\n");
    }

    #[test]
    fn test_reset() {
        let mut decoder = ChunkedDecoder::new();
        let mut src: &[u8] = b"3\r\nabc\r\n0\r\n\r\n";
        assert!(drain(&mut decoder, &mut src).1);

        decoder.reset();
        let mut src: &[u8] = b"2\r\nxy\r\n0\r\n\r\n";
        let (body, eof) = drain(&mut decoder, &mut src);
        assert_eq!(body, b"xy");
        assert!(eof);
    }

    #[test]
    fn test_invalid_chunk_size() {
        let mut src: &[u8] = b"xyz\r\n";
        let mut decoder = ChunkedDecoder::new();
        assert!(decoder.decode(&mut src, &mut [0u8; 8]).is_err());
    }

    #[test]
    fn test_missing_crlf() {
        let mut src: &[u8] = b"5\r\nhelloBad";
        let mut decoder = ChunkedDecoder::new();
        let mut dst = [0u8; 8];

        assert_eq!(decoder.decode(&mut src, &mut dst).unwrap(), Some(Decoded::Data(5)));
        assert!(decoder.decode(&mut src, &mut dst).is_err());
    }

    #[test]
    fn test_size_overflow() {
        let mut src: &[u8] = b"fffffffffffffffff\r\n";
        let mut decoder = ChunkedDecoder::new();
        assert!(matches!(decoder.decode(&mut src, &mut [0u8; 8]), Err(ParseError::InvalidBody { .. })));
    }
}
