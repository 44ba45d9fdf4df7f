use std::sync::{Arc, LazyLock};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, trace};

use crate::buffer::BufferPool;
use crate::codec::HttpRequestParser;
use crate::connection::ServerConnection;
use crate::exchange::{Executor, HttpServerExchange, NextListener, run_dispatched, run_handler};
use crate::handler::{DynHandler, Handler};
use crate::protocol::{HttpError, HttpOptions};

/// Backs connections built without an explicit pool.
static SHARED_POOL: LazyLock<BufferPool> = LazyLock::new(BufferPool::default);

/// Drives one HTTP connection: reads a request head, runs the handler on a
/// fresh exchange, ends the exchange and reads the next request once the
/// connection has been armed again.
///
/// Each request gets a new [`HttpServerExchange`] but the same
/// [`ServerConnection`], so the conduits built at accept time serve every
/// request on the connection.
#[derive(Debug)]
pub struct HttpConnection {
    connection: Box<ServerConnection>,
}

impl HttpConnection {
    /// Builds a connection with default options, reading through a pool
    /// shared by every connection built this way.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_options(reader, writer, SHARED_POOL.clone(), Arc::new(HttpOptions::default()))
    }

    pub fn with_options<R, W>(reader: R, writer: W, pool: BufferPool, options: Arc<HttpOptions>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let parser = Arc::new(HttpRequestParser::new(&options));
        Self::from_parts(Box::new(reader), Box::new(writer), pool, options, parser)
    }

    pub(crate) fn from_parts(
        reader: Box<dyn AsyncRead + Send + Unpin>,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        pool: BufferPool,
        options: Arc<HttpOptions>,
        parser: Arc<HttpRequestParser>,
    ) -> Self {
        Self { connection: Box::new(ServerConnection::new(reader, writer, pool, options, parser)) }
    }

    /// Sets where dispatched handlers run when neither the dispatch nor the
    /// exchange names an executor. Defaults to a [`WorkerPool`](crate::exchange::WorkerPool).
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.connection.set_default_executor(executor);
        self
    }

    pub fn connection(&self) -> &ServerConnection {
        &self.connection
    }

    pub async fn process<H>(self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler + Sync + 'static,
    {
        self.serve(handler).await
    }

    /// Serves requests until the peer closes, an exchange makes the
    /// connection non-persistent, or the connection is upgraded.
    ///
    /// Malformed requests and handler failures close the connection without
    /// a response and are returned as errors.
    pub async fn serve(self, handler: Arc<dyn DynHandler>) -> Result<(), HttpError> {
        let mut connection = self.connection;
        loop {
            connection.set_armed(false);
            let mut exchange = HttpServerExchange::new(connection);
            exchange.add_completion_listener(arm_connection);

            match exchange.read_request_head().await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("peer closed the connection");
                    return close(exchange.into_connection()).await;
                }
                Err(e) => {
                    log_abort(&e);
                    return Err(e);
                }
            }

            if let Err(e) = exchange.headers_parsed() {
                let e = HttpError::from(e);
                log_abort(&e);
                return Err(e);
            }
            trace!(exchange = exchange.id(), method = %exchange.method(), uri = exchange.request().request_uri(), "serving request");

            let mut exchange = run(Arc::clone(&handler), exchange).await?;
            if let Err(e) = exchange.end_exchange().await {
                let e = HttpError::from(e);
                log_abort(&e);
                return Err(e);
            }
            // completion listeners may have dispatched the exchange again
            if exchange.is_dispatched() {
                exchange = finish_dispatched(exchange).await?;
            }

            if let Some(listener) = exchange.take_upgrade_listener() {
                let upgraded = exchange.into_connection().into_upgraded().await?;
                info!("connection upgraded");
                listener.handle_upgrade(upgraded).await;
                return Ok(());
            }

            let persistent = exchange.is_persistent();
            connection = exchange.into_connection();
            if !persistent || !connection.is_armed() {
                return close(connection).await;
            }
        }
    }
}

fn arm_connection(exchange: &mut HttpServerExchange, next: NextListener) {
    exchange.connection_mut().set_armed(true);
    next.proceed(exchange);
}

async fn run(handler: Arc<dyn DynHandler>, exchange: HttpServerExchange) -> Result<HttpServerExchange, HttpError> {
    let (exchange, result) = run_handler(handler, exchange).await.inspect_err(|e| {
        error!(cause = %e, "dispatched handler was lost, closing connection");
    })?;
    if let Err(e) = result {
        error!(exchange = exchange.id(), cause = %e, "handler failed, closing connection");
        return Err(e.into());
    }
    Ok(exchange)
}

async fn finish_dispatched(exchange: HttpServerExchange) -> Result<HttpServerExchange, HttpError> {
    let (mut exchange, result) = run_dispatched(exchange).await?;
    if let Err(e) = result {
        error!(exchange = exchange.id(), cause = %e, "handler failed, closing connection");
        return Err(e.into());
    }
    exchange.end_exchange().await?;
    Ok(exchange)
}

async fn close(mut connection: Box<ServerConnection>) -> Result<(), HttpError> {
    match connection.shutdown().await {
        Ok(()) => {
            debug!("connection closed");
            Ok(())
        }
        Err(e) if e.is_transport() => {
            debug!(cause = %e, "transport failed while closing");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn log_abort(e: &HttpError) {
    if e.is_transport() {
        debug!(cause = %e, "transport failed, closing connection");
    } else {
        error!(cause = %e, "aborting connection");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    use bytes::Bytes;
    use futures::FutureExt;
    use http::{StatusCode, header};
    use indoc::indoc;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};

    use super::*;
    use crate::conduit::RequestFraming;
    use crate::connection::UpgradedConnection;
    use crate::exchange::{SameThreadExecutor, WorkerPool};
    use crate::handler::{into_dyn, make_handler};
    use crate::protocol::HandlerError;

    /// Serves scripted reads, one script entry per `poll_read`, then end of stream.
    struct MockReader {
        reads: VecDeque<Vec<u8>>,
        polls: Arc<AtomicUsize>,
    }

    impl AsyncRead for MockReader {
        fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if let Some(mut chunk) = self.reads.pop_front() {
                let n = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.reads.push_front(chunk.split_off(n));
                }
            }
            Poll::Ready(Ok(()))
        }
    }

    /// Records every `poll_write` as a separate entry.
    struct MockWriter {
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl AsyncWrite for MockWriter {
        fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            self.writes.lock().unwrap().push(buf.to_vec());
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    struct Transport {
        reads: Arc<AtomicUsize>,
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl Transport {
        /// Everything written, with CRLF shown as LF.
        fn output(&self) -> String {
            String::from_utf8(self.writes.lock().unwrap().concat()).unwrap().replace("\r\n", "\n")
        }

        fn write_count(&self) -> usize {
            self.writes.lock().unwrap().len()
        }

        fn read_count(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    fn connection(reads: &[&[u8]], options: HttpOptions) -> (HttpConnection, Transport) {
        let polls = Arc::new(AtomicUsize::new(0));
        let writes = Arc::new(Mutex::new(Vec::new()));
        let reader = MockReader { reads: reads.iter().map(|r| r.to_vec()).collect(), polls: Arc::clone(&polls) };
        let writer = MockWriter { writes: Arc::clone(&writes) };
        let connection = HttpConnection::with_options(reader, writer, BufferPool::default(), Arc::new(options));
        (connection, Transport { reads: polls, writes })
    }

    fn hello() -> Arc<dyn DynHandler> {
        into_dyn(make_handler(|exchange| {
            Box::pin(async move {
                let body = format!("hello {}", exchange.request().request_path());
                exchange.send(body).await.map_err(HandlerError::failed)
            })
        }))
    }

    #[tokio::test]
    async fn test_keep_alive_reuses_the_conduits() {
        let (connection, transport) = connection(
            &[
                b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n",
                b"POST /b HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc",
                b"POST /c HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n1\r\nz\r\n0\r\n\r\n",
            ],
            HttpOptions::default(),
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);
        let handler = into_dyn(make_handler(move |exchange| {
            let recorded = Arc::clone(&recorded);
            Box::pin(async move {
                let conduit = exchange.connection().request_conduit();
                let seen = (std::ptr::from_ref(conduit) as usize, conduit.framing(), exchange.id());
                recorded.lock().unwrap().push(seen);
                exchange.send(Bytes::new()).await.map_err(HandlerError::failed)
            })
        }));

        connection.serve(handler).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|(conduit, _, _)| *conduit == seen[0].0));
        let framings: Vec<_> = seen.iter().map(|(_, framing, _)| *framing).collect();
        assert_eq!(framings, [RequestFraming::Empty, RequestFraming::FixedLength, RequestFraming::Chunked]);
        let ids: Vec<_> = seen.iter().map(|(_, _, id)| *id).collect();
        assert_eq!(ids, [1, 2, 3]);
        assert_eq!(transport.output().matches("HTTP/1.1 200 OK\n").count(), 3);
    }

    #[tokio::test]
    async fn test_completion_listeners_run_newest_first() {
        let (connection, transport) = connection(&[b"GET / HTTP/1.1\r\n\r\n"], HttpOptions::default());

        let order = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&order);
        let handler = into_dyn(make_handler(move |exchange| {
            let recorded = Arc::clone(&recorded);
            Box::pin(async move {
                for name in ["L1", "L2", "L3"] {
                    let recorded = Arc::clone(&recorded);
                    exchange.add_completion_listener(move |exchange: &mut HttpServerExchange, next: NextListener| {
                        recorded.lock().unwrap().push(name);
                        next.proceed(exchange);
                    });
                }
                exchange.terminate_request();
                exchange.terminate_response();
                exchange.terminate_request();
                exchange.terminate_response();
                Ok(())
            })
        }));

        connection.serve(handler).await.unwrap();

        assert_eq!(*order.lock().unwrap(), ["L3", "L2", "L1"]);
        assert_eq!(transport.output(), "");
    }

    #[tokio::test]
    async fn test_default_constructor_shares_one_pool() {
        let (mut client, server) = tokio::io::duplex(4096);
        let (reader, writer) = tokio::io::split(server);
        let first = HttpConnection::new(reader, writer);

        client.write_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await.unwrap();
        first.serve(hello()).await.unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(response.starts_with(b"HTTP/1.1 200 OK"));

        // the read buffer of the first connection went back to the shared pool
        let second = HttpConnection::new(tokio::io::empty(), tokio::io::sink());
        assert!(second.connection().source().pool().stats().reclaimed >= 1);
    }

    #[tokio::test]
    async fn test_extra_bytes_are_parsed_before_reading_again() {
        let (connection, transport) =
            connection(&[b"POST /a HTTP/1.1\r\nContent-Length: 0\r\n\r\nGET /b HTTP/1.1\r\n\r\n"], HttpOptions::default());

        connection.serve(hello()).await.unwrap();

        // one read for both requests, one more to see the end of stream
        assert_eq!(transport.read_count(), 2);
        let output = transport.output();
        assert!(output.contains("hello /a"));
        assert!(output.contains("hello /b"));
    }

    #[tokio::test]
    async fn test_pipelined_responses_leave_in_one_write() {
        let options = HttpOptions::default().with_buffer_pipelined_data(true);
        let (connection, transport) = connection(&[b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n"], options);

        connection.serve(hello()).await.unwrap();

        assert_eq!(transport.write_count(), 1);
        let output = transport.output();
        let a = output.find("hello /a").unwrap();
        let b = output.find("hello /b").unwrap();
        assert!(a < b);
    }

    #[tokio::test]
    async fn test_pipelined_responses_without_aggregation() {
        let (connection, transport) =
            connection(&[b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n"], HttpOptions::default());

        connection.serve(hello()).await.unwrap();

        assert_eq!(transport.write_count(), 2);
    }

    #[tokio::test]
    async fn test_held_response_is_flushed_before_reading_a_body() {
        let options = HttpOptions::default().with_buffer_pipelined_data(true);
        let (connection, transport) = connection(
            &[b"GET /a HTTP/1.1\r\n\r\nPOST /b HTTP/1.1\r\nContent-Length: 5\r\n\r\n", b"hello"],
            options,
        );

        let writes = Arc::clone(&transport.writes);
        let before_body = Arc::new(Mutex::new(None));
        let recorded = Arc::clone(&before_body);
        let handler = into_dyn(make_handler(move |exchange| {
            let writes = Arc::clone(&writes);
            let recorded = Arc::clone(&recorded);
            Box::pin(async move {
                if exchange.request().request_path() != "/b" {
                    return exchange.send("held").await.map_err(HandlerError::failed);
                }
                let mut body = Vec::new();
                exchange.request_channel().map_err(HandlerError::failed)?.read_to_end(&mut body).await.map_err(HandlerError::failed)?;
                let written = String::from_utf8(writes.lock().unwrap().concat()).unwrap();
                *recorded.lock().unwrap() = Some(written);
                exchange.send(body).await.map_err(HandlerError::failed)
            })
        }));

        connection.serve(handler).await.unwrap();

        // the response to /a left before the body of /b was read from the transport
        let before_body = before_body.lock().unwrap().take().unwrap();
        assert_eq!(before_body, "HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\nheld");

        let expected = indoc! {"
            HTTP/1.1 200 OK
            content-length: 4

            heldHTTP/1.1 200 OK
            content-length: 5

            hello"};
        assert_eq!(transport.output(), expected);
    }

    #[tokio::test]
    async fn test_expect_continue_is_sent_on_first_read() {
        let (connection, transport) = connection(
            &[b"POST /upload HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 5\r\n\r\n", b"hello"],
            HttpOptions::default(),
        );

        let handler = into_dyn(make_handler(|exchange| {
            Box::pin(async move {
                let mut body = Vec::new();
                exchange.request_channel().map_err(HandlerError::failed)?.read_to_end(&mut body).await.map_err(HandlerError::failed)?;
                exchange.send(body).await.map_err(HandlerError::failed)
            })
        }));

        connection.serve(handler).await.unwrap();

        let expected = indoc! {"
            HTTP/1.1 100 Continue

            HTTP/1.1 200 OK
            content-length: 5

            hello"};
        assert_eq!(transport.output(), expected);
    }

    #[tokio::test]
    async fn test_unread_continue_body_closes_the_connection() {
        let (connection, transport) = connection(
            &[b"POST / HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 5\r\n\r\n", b"GET / HTTP/1.1\r\n\r\n"],
            HttpOptions::default(),
        );

        connection.serve(hello()).await.unwrap();

        let output = transport.output();
        assert!(!output.contains("100 Continue"));
        assert_eq!(output.matches("HTTP/1.1 200 OK").count(), 1);
        assert_eq!(transport.read_count(), 1);
    }

    #[tokio::test]
    async fn test_unread_body_is_drained() {
        let (connection, transport) = connection(
            &[b"POST /a HTTP/1.1\r\nContent-Length: 10\r\n\r\n01234", b"56789GET /b HTTP/1.1\r\n\r\n"],
            HttpOptions::default(),
        );

        connection.serve(hello()).await.unwrap();

        let output = transport.output();
        assert!(output.contains("hello /a"));
        assert!(output.contains("hello /b"));
    }

    #[tokio::test]
    async fn test_chunked_request_and_response() {
        let (connection, transport) = connection(
            &[b"POST /echo HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n", b"6\r\n world\r\n0\r\n\r\n"],
            HttpOptions::default(),
        );

        let handler = into_dyn(make_handler(|exchange| {
            Box::pin(async move {
                let mut body = Vec::new();
                exchange.request_channel().map_err(HandlerError::failed)?.read_to_end(&mut body).await.map_err(HandlerError::failed)?;
                let mut channel = exchange.response_channel().map_err(HandlerError::failed)?;
                channel.write_all(&body).await.map_err(HandlerError::failed)?;
                channel.shutdown().await.map_err(HandlerError::failed)
            })
        }));

        connection.serve(handler).await.unwrap();

        let expected = indoc! {"
            HTTP/1.1 200 OK
            transfer-encoding: chunked

            B
            hello world
            0

        "};
        assert_eq!(transport.output(), expected);
    }

    #[tokio::test]
    async fn test_http10_close_delimited_response() {
        let (connection, transport) = connection(&[b"GET / HTTP/1.0\r\n\r\n"], HttpOptions::default());

        let handler = into_dyn(make_handler(|exchange| {
            Box::pin(async move {
                let mut channel = exchange.response_channel().map_err(HandlerError::failed)?;
                channel.write_all(b"body").await.map_err(HandlerError::failed)?;
                channel.shutdown().await.map_err(HandlerError::failed)
            })
        }));

        connection.serve(handler).await.unwrap();

        let expected = indoc! {"
            HTTP/1.0 200 OK
            connection: close

            body"};
        assert_eq!(transport.output(), expected);
    }

    #[tokio::test]
    async fn test_connection_close_ends_the_loop() {
        let (connection, transport) = connection(
            &[b"GET /a HTTP/1.1\r\nConnection: close\r\n\r\nGET /b HTTP/1.1\r\n\r\n"],
            HttpOptions::default(),
        );

        connection.serve(hello()).await.unwrap();

        let output = transport.output();
        assert!(output.contains("connection: close\n"));
        assert!(!output.contains("hello /b"));
    }

    #[tokio::test]
    async fn test_malformed_request_closes_without_response() {
        let (connection, transport) = connection(&[b"GET / HTTP/9.9\r\n\r\n"], HttpOptions::default());

        let result = connection.serve(hello()).await;

        assert!(matches!(result, Err(HttpError::RequestError { .. })));
        assert_eq!(transport.output(), "");
    }

    #[tokio::test]
    async fn test_header_limit_closes_without_response() {
        let options = HttpOptions::default().with_max_headers(1);
        let (connection, transport) = connection(&[b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\n\r\n"], options);

        let result = connection.serve(hello()).await;

        assert!(matches!(result, Err(HttpError::RequestError { .. })));
        assert_eq!(transport.output(), "");
    }

    #[tokio::test]
    async fn test_truncated_body_aborts() {
        let (connection, _transport) =
            connection(&[b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc"], HttpOptions::default());

        let handler = into_dyn(make_handler(|exchange| {
            Box::pin(async move {
                let mut body = Vec::new();
                exchange.request_channel().map_err(HandlerError::failed)?.read_to_end(&mut body).await.map_err(HandlerError::failed)?;
                Ok(())
            })
        }));

        let result = connection.serve(handler).await;
        assert!(matches!(result, Err(HttpError::HandlerError { .. })));
    }

    #[tokio::test]
    async fn test_handler_panic_closes_the_connection() {
        let (connection, transport) = connection(&[b"GET / HTTP/1.1\r\n\r\n"], HttpOptions::default());

        let handler = into_dyn(make_handler(|exchange| {
            Box::pin(async move {
                assert_eq!(exchange.request().request_path(), "/elsewhere", "routed to the wrong handler");
                Ok(())
            })
        }));

        let result = connection.serve(handler).await;

        assert!(matches!(result, Err(HttpError::HandlerError { source: HandlerError::Panicked { .. } })));
        assert_eq!(transport.output(), "");
    }

    #[tokio::test]
    async fn test_default_response_listener() {
        let (connection, transport) = connection(&[b"GET /missing HTTP/1.1\r\n\r\n"], HttpOptions::default());

        let handler = into_dyn(make_handler(|exchange| {
            Box::pin(async move {
                exchange.add_default_response_listener(|_exchange: &mut HttpServerExchange| None::<Bytes>);
                exchange.add_default_response_listener(|exchange: &mut HttpServerExchange| {
                    exchange.set_status(StatusCode::NOT_FOUND).ok()?;
                    Some(Bytes::from_static(b"not found"))
                });
                Ok(())
            })
        }));

        connection.serve(handler).await.unwrap();

        let expected = indoc! {"
            HTTP/1.1 404 Not Found
            content-length: 9

            not found"};
        assert_eq!(transport.output(), expected);
    }

    #[tokio::test]
    async fn test_bodiless_status_gets_no_content_length() {
        let (connection, transport) = connection(&[b"GET /item HTTP/1.1\r\n\r\n"], HttpOptions::default());

        let handler = into_dyn(make_handler(|exchange| {
            Box::pin(async move {
                exchange.add_default_response_listener(|exchange: &mut HttpServerExchange| {
                    exchange.set_status(StatusCode::NO_CONTENT).ok()?;
                    Some(Bytes::from_static(b"ignored"))
                });
                Ok(())
            })
        }));

        connection.serve(handler).await.unwrap();

        assert_eq!(transport.output(), "HTTP/1.1 204 No Content\n\n");
    }

    #[tokio::test]
    async fn test_empty_response_by_default() {
        let (connection, transport) = connection(&[b"HEAD / HTTP/1.1\r\n\r\n"], HttpOptions::default());

        let handler = into_dyn(make_handler(|_exchange| Box::pin(async move { Ok(()) })));

        connection.serve(handler).await.unwrap();

        assert_eq!(transport.output(), "HTTP/1.1 200 OK\ncontent-length: 0\n\n");
    }

    #[tokio::test]
    async fn test_channels_are_handed_out_once() {
        let (connection, _transport) = connection(&[b"GET / HTTP/1.1\r\n\r\n"], HttpOptions::default());

        let handler = into_dyn(make_handler(|exchange| {
            Box::pin(async move {
                assert!(exchange.request_channel().is_ok());
                assert!(exchange.request_channel().is_err());
                assert!(exchange.response_channel().is_ok());
                assert!(exchange.response_channel().is_err());
                assert!(exchange.set_status(StatusCode::NOT_FOUND).is_err());
                Ok(())
            })
        }));

        connection.serve(handler).await.unwrap();
    }

    fn dispatching(executor: Option<Arc<dyn Executor>>) -> Arc<dyn DynHandler> {
        into_dyn(make_handler(move |exchange| {
            let executor = executor.clone();
            Box::pin(async move {
                exchange.response_headers_mut().insert(header::SERVER, "nio".parse().unwrap());
                exchange.dispatch(executor, hello());
                assert!(exchange.is_dispatched());
                Ok(())
            })
        }))
    }

    #[tokio::test]
    async fn test_dispatch_to_same_thread_executor() {
        let (connection, transport) = connection(&[b"GET /a HTTP/1.1\r\n\r\n"], HttpOptions::default());

        connection.serve(dispatching(Some(Arc::new(SameThreadExecutor)))).await.unwrap();

        let output = transport.output();
        assert!(output.contains("server: nio\n"));
        assert!(output.contains("hello /a"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dispatch_to_worker_pool_by_default() {
        let (connection, transport) =
            connection(&[b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n"], HttpOptions::default());

        connection.with_executor(Arc::new(WorkerPool::new())).serve(dispatching(None)).await.unwrap();

        let output = transport.output();
        assert!(output.find("hello /a").unwrap() < output.find("hello /b").unwrap());
    }

    #[tokio::test]
    async fn test_upgrade_hands_over_the_transport() {
        let (connection, transport) =
            connection(&[b"GET /ws HTTP/1.1\r\nUpgrade: echo\r\nConnection: Upgrade\r\n\r\nping"], HttpOptions::default());

        let handler = into_dyn(make_handler(|exchange| {
            Box::pin(async move {
                exchange.response_headers_mut().insert(header::UPGRADE, "echo".parse().unwrap());
                exchange
                    .upgrade_channel(|mut upgraded: UpgradedConnection| {
                        async move {
                            let mut buf = [0u8; 4];
                            upgraded.read_exact(&mut buf).await.unwrap();
                            upgraded.write_all(&buf).await.unwrap();
                            upgraded.flush().await.unwrap();
                        }
                        .boxed()
                    })
                    .map_err(HandlerError::failed)
            })
        }));

        connection.serve(handler).await.unwrap();

        let expected = indoc! {"
            HTTP/1.1 101 Switching Protocols
            upgrade: echo
            connection: upgrade

            ping"};
        assert_eq!(transport.output(), expected);
    }
}
