//! Decoder for request bodies delimited by a Content-Length header, as defined in
//! [RFC 7230 Section 3.3.2](https://tools.ietf.org/html/rfc7230#section-3.3.2).

use bytes::Buf;

use crate::protocol::{Decoded, ParseError};

/// A decoder for bodies with a known length.
///
/// Tracks the bytes still owed so that it never reads past the end of the
/// body into a pipelined request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    /// The number of bytes remaining to be read from the payload
    length: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { length }
    }

    pub fn reset(&mut self, length: u64) {
        self.length = length;
    }

    pub fn remaining(&self) -> u64 {
        self.length
    }

    /// Copies up to the remaining length from `src` into `dst`.
    ///
    /// # Returns
    /// * `Ok(Some(Decoded::Eof))` when all bytes have been read
    /// * `Ok(Some(Decoded::Data(n)))` when `n` bytes were copied
    /// * `Ok(None)` when more data is needed
    pub fn decode<B: Buf>(&mut self, src: &mut B, dst: &mut [u8]) -> Result<Option<Decoded>, ParseError> {
        if self.length == 0 {
            return Ok(Some(Decoded::Eof));
        }

        if !src.has_remaining() {
            return Ok(None);
        }

        let remaining = usize::try_from(self.length).unwrap_or(usize::MAX);
        let len = remaining.min(src.remaining()).min(dst.len());
        src.copy_to_slice(&mut dst[..len]);

        self.length -= len as u64;
        Ok(Some(Decoded::Data(len)))
    }
}
