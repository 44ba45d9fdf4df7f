use std::hint::black_box;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use criterion::{Criterion, criterion_group, criterion_main};
use nio_http::codec::{ChunkedDecoder, HttpRequestParser, ParseState};
use nio_http::connection::HttpConnection;
use nio_http::exchange::RequestHead;
use nio_http::handler::make_handler;
use nio_http::protocol::{HandlerError, HttpOptions};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

const REQUEST: &[u8] = b"GET /index.html;jsessionid=abc?page=1&sort=desc HTTP/1.1\r\n\
Host: 127.0.0.1:8080\r\n\
User-Agent: curl/7.79.1\r\n\
Accept: */*\r\n\
Accept-Encoding: gzip, deflate\r\n\
Connection: keep-alive\r\n\r\n";

// Mock IO for benchmarking
struct MockIO {
    read_data: Vec<u8>,
    read_pos: usize,
}

impl AsyncRead for MockIO {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let remaining = &self.read_data[self.read_pos..];
        let amt = std::cmp::min(remaining.len(), buf.remaining());
        buf.put_slice(&remaining[..amt]);
        self.read_pos += amt;
        Poll::Ready(Ok(()))
    }
}

struct Discard;

impl AsyncWrite for Discard {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize, io::Error>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }
}

fn bench_parser(c: &mut Criterion) {
    let parser = HttpRequestParser::new(&HttpOptions::default());

    c.bench_function("parse_whole_buffer", |b| {
        b.iter(|| {
            let mut state = ParseState::new();
            let mut head = RequestHead::default();
            let mut input = REQUEST;
            parser.handle(&mut input, &mut state, &mut head).unwrap();
            black_box(head);
        });
    });

    c.bench_function("parse_byte_at_a_time", |b| {
        b.iter(|| {
            let mut state = ParseState::new();
            let mut head = RequestHead::default();
            for byte in REQUEST.chunks(1) {
                let mut input = byte;
                parser.handle(&mut input, &mut state, &mut head).unwrap();
            }
            black_box(head);
        });
    });
}

fn bench_chunked_decoder(c: &mut Criterion) {
    let body = b"400\r\n".iter().chain([b'x'; 0x400].iter()).chain(b"\r\n0\r\n\r\n".iter()).copied().collect::<Vec<u8>>();

    c.bench_function("decode_chunked_body", |b| {
        let mut dst = vec![0u8; 4096];
        b.iter(|| {
            let mut decoder = ChunkedDecoder::new();
            let mut src = &body[..];
            while let Some(decoded) = decoder.decode(&mut src, &mut dst).unwrap() {
                if decoded == nio_http::protocol::Decoded::Eof {
                    break;
                }
            }
            black_box(decoder.is_finished());
        });
    });
}

fn bench_http_connection(c: &mut Criterion) {
    let request = REQUEST.repeat(8);
    let handler = Arc::new(make_handler(|exchange| {
        Box::pin(async move { exchange.send("Hello World!").await.map_err(HandlerError::failed) })
    }));
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

    c.bench_function("process_keep_alive_requests", |b| {
        b.iter(|| {
            let reader = MockIO { read_data: request.clone(), read_pos: 0 };
            let connection = HttpConnection::new(reader, Discard);
            runtime.block_on(connection.process(Arc::clone(&handler))).unwrap();
        });
    });
}

criterion_group!(benches, bench_parser, bench_chunked_decoder, bench_http_connection);
criterion_main!(benches);
