//! Serialises a response status line and header block.
//!
//! The framing header matching the chosen [`PayloadSize`] is written by the
//! encoder itself; any Content-Length or Transfer-Encoding value the handler
//! set is replaced rather than duplicated.

use crate::exchange::ResponseHead;
use crate::protocol::{PayloadSize, SendError};

use bytes::{BufMut, BytesMut};

use http::{header, Version};
use std::io;
use std::io::{ErrorKind, Write};
use tokio_util::codec::Encoder;
use tracing::error;

/// Initial buffer size reserved for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Encoder for response heads.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderEncoder;

impl<'a> Encoder<(&'a ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    /// # Errors
    ///
    /// Returns an error if the response version is HTTP/2 or later.
    fn encode(&mut self, item: (&'a ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (head, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);
        let version = match head.version() {
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_10 | Version::HTTP_09 => "HTTP/1.0",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(ErrorKind::Unsupported).into());
            }
        };
        let status = head.status();
        write!(FastWrite(dst), "{version} {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or(""))?;

        let replaced = match payload_size {
            PayloadSize::Length(n) => {
                write!(FastWrite(dst), "content-length: {n}\r\n")?;
                true
            }
            PayloadSize::Chunked => {
                dst.put_slice(b"transfer-encoding: chunked\r\n");
                true
            }
            PayloadSize::Empty | PayloadSize::CloseDelimited => false,
        };

        for (header_name, header_value) in head.headers().iter() {
            if replaced && (header_name == header::CONTENT_LENGTH || header_name == header::TRANSFER_ENCODING) {
                continue;
            }
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// `io::Write` over a `BytesMut` that has already reserved room.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
