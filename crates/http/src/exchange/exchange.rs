use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode, Version, header};
use tracing::{debug, trace, warn};

use crate::conduit::{RequestFraming, select_response_framing};
use crate::connection::{ServerConnection, UpgradeListener};
use crate::ensure;
use crate::exchange::{
    DefaultResponseListener, ExchangeCompletionListener, Executor, NextListener, RequestChannel, RequestHead,
    ResponseChannel, ResponseHead,
};
use crate::handler::DynHandler;
use crate::protocol::{ChannelKind, ExchangeError, ParseError};
use crate::utils::contains_token;

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// A coarse view of where an exchange is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Created,
    HeadersParsed,
    Dispatched,
    ResponseStarted,
    RequestTerminated,
    ResponseTerminated,
    Complete,
}

#[derive(Debug, Clone, Copy, Default)]
struct Flags {
    headers_parsed: bool,
    dispatched: bool,
    persistent: bool,
    upgrade: bool,
    request_channel: bool,
    response_channel: bool,
    response_started: bool,
    request_terminated: bool,
    response_terminated: bool,
    continue_sent: bool,
}

struct PendingDispatch {
    executor: Option<Arc<dyn Executor>>,
    handler: Arc<dyn DynHandler>,
}

/// One request/response cycle on a connection.
///
/// The exchange owns its connection while it is alive, so it can be moved to
/// another task by [`dispatch`](Self::dispatch) and handed back afterwards.
///
/// Completion listeners fire exactly once, the moment both
/// [`terminate_request`](Self::terminate_request) and
/// [`terminate_response`](Self::terminate_response) have been called, in
/// reverse registration order.
pub struct HttpServerExchange {
    connection: Box<ServerConnection>,
    id: u64,
    request: RequestHead,
    response: ResponseHead,
    flags: Flags,
    dispatches: u32,
    listeners: Vec<Box<dyn ExchangeCompletionListener>>,
    default_listeners: Vec<Box<dyn DefaultResponseListener>>,
    pending_dispatch: Option<PendingDispatch>,
    dispatch_executor: Option<Arc<dyn Executor>>,
    upgrade_listener: Option<Box<dyn UpgradeListener>>,
}

impl HttpServerExchange {
    pub(crate) fn new(mut connection: Box<ServerConnection>) -> Self {
        let id = connection.next_exchange_id();
        Self {
            connection,
            id,
            request: RequestHead::default(),
            response: ResponseHead::default(),
            flags: Flags::default(),
            dispatches: 0,
            listeners: Vec::new(),
            default_listeners: Vec::new(),
            pending_dispatch: None,
            dispatch_executor: None,
            upgrade_listener: None,
        }
    }

    /// Reads the next request head from the connection.
    ///
    /// Returns `Ok(false)` if the peer closed the connection before sending one.
    pub(crate) async fn read_request_head(&mut self) -> Result<bool, crate::protocol::HttpError> {
        self.connection.read_request_head(&mut self.request).await
    }

    /// Resets the conduits to this exchange and settles persistence and framing.
    pub(crate) fn headers_parsed(&mut self) -> Result<(), ParseError> {
        self.flags.headers_parsed = true;
        self.flags.persistent = is_persistent(&self.request);
        self.response.set_version(match self.request.version() {
            Version::HTTP_11 => Version::HTTP_11,
            _ => Version::HTTP_10,
        });

        let connection = &mut *self.connection;
        let framing = connection.request.reset(self.id, &self.request)?;
        connection.response.reset(self.id);
        let pipelined = framing == RequestFraming::Empty && connection.source.has_extra();
        connection.sink.pipelining_mut().reset(pipelined);

        if framing == RequestFraming::PassThrough {
            self.flags.persistent = false;
        }
        trace!(exchange = self.id, ?framing, persistent = self.flags.persistent, "request headers parsed");

        if framing == RequestFraming::Empty {
            self.terminate_request();
        }
        Ok(())
    }

    pub(crate) fn into_connection(self) -> Box<ServerConnection> {
        self.connection
    }

    /// Identifies this exchange among those served by its connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn connection(&self) -> &ServerConnection {
        &self.connection
    }

    pub(crate) fn connection_mut(&mut self) -> &mut ServerConnection {
        &mut self.connection
    }

    pub fn request(&self) -> &RequestHead {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut RequestHead {
        &mut self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn request_headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    pub fn response(&self) -> &ResponseHead {
        &self.response
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// Fails once the response has started.
    pub fn set_status(&mut self, status: StatusCode) -> Result<(), ExchangeError> {
        ensure!(!self.flags.response_started, ExchangeError::ResponseStarted);
        self.response.set_status(status);
        Ok(())
    }

    pub fn set_status_code(&mut self, code: u16) -> Result<(), ExchangeError> {
        let status = StatusCode::from_u16(code).map_err(|_| ExchangeError::InvalidStatus { code })?;
        self.set_status(status)
    }

    /// The response headers; changes made after the head was written are not sent.
    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        self.response.headers_mut()
    }

    /// Whether the connection may carry another request after this one.
    pub fn is_persistent(&self) -> bool {
        self.flags.persistent
    }

    pub fn set_persistent(&mut self, persistent: bool) {
        self.flags.persistent = persistent;
    }

    pub fn is_upgrade(&self) -> bool {
        self.flags.upgrade
    }

    /// Whether a dispatch is pending.
    pub fn is_dispatched(&self) -> bool {
        self.flags.dispatched
    }

    /// How many times this exchange has been dispatched.
    pub fn dispatch_count(&self) -> u32 {
        self.dispatches
    }

    pub fn is_response_started(&self) -> bool {
        self.flags.response_started
    }

    pub fn is_request_terminated(&self) -> bool {
        self.flags.request_terminated
    }

    pub fn is_response_terminated(&self) -> bool {
        self.flags.response_terminated
    }

    pub fn is_complete(&self) -> bool {
        self.flags.request_terminated && self.flags.response_terminated
    }

    pub fn state(&self) -> ExchangeState {
        let flags = &self.flags;
        if flags.request_terminated && flags.response_terminated {
            ExchangeState::Complete
        } else if flags.response_terminated {
            ExchangeState::ResponseTerminated
        } else if flags.request_terminated && flags.response_started {
            ExchangeState::RequestTerminated
        } else if flags.response_started {
            ExchangeState::ResponseStarted
        } else if self.dispatches > 0 {
            ExchangeState::Dispatched
        } else if flags.headers_parsed {
            ExchangeState::HeadersParsed
        } else {
            ExchangeState::Created
        }
    }

    /// Registers a listener for the completion of this exchange.
    ///
    /// A listener added to a complete exchange runs immediately.
    pub fn add_completion_listener(&mut self, listener: impl ExchangeCompletionListener + 'static) {
        if self.is_complete() {
            warn!(exchange = self.id, "completion listener added to a complete exchange");
            let listener: Box<dyn ExchangeCompletionListener> = Box::new(listener);
            NextListener::new(vec![listener]).proceed(self);
            return;
        }
        self.listeners.push(Box::new(listener));
    }

    pub fn add_default_response_listener(&mut self, listener: impl DefaultResponseListener + 'static) {
        self.default_listeners.push(Box::new(listener));
    }

    /// Marks the request as fully read. Idempotent.
    pub fn terminate_request(&mut self) {
        if self.flags.request_terminated {
            return;
        }
        self.flags.request_terminated = true;
        trace!(exchange = self.id, "request terminated");
        if self.flags.response_terminated {
            self.complete();
        }
    }

    /// Marks the response as fully written. Idempotent.
    pub fn terminate_response(&mut self) {
        if self.flags.response_terminated {
            return;
        }
        self.flags.response_terminated = true;
        trace!(exchange = self.id, "response terminated");
        if self.flags.request_terminated {
            self.complete();
        }
    }

    fn complete(&mut self) {
        let listeners = std::mem::take(&mut self.listeners);
        trace!(exchange = self.id, listeners = listeners.len(), "exchange complete");
        NextListener::new(listeners).proceed(self);
    }

    /// Hands the exchange to `handler` once the current handler call returns.
    ///
    /// The running handler holds the exchange by `&mut`, so the dispatched one
    /// can only start after it returns. A dispatch requested from a completion
    /// listener starts as soon as the exchange has been ended.
    ///
    /// The handler runs on `executor`, else on the exchange's dispatch
    /// executor, else on the connection's worker pool. The exchange is not
    /// ended when the current call returns; the dispatched handler owns it.
    pub fn dispatch(&mut self, executor: Option<Arc<dyn Executor>>, handler: Arc<dyn DynHandler>) {
        if self.pending_dispatch.is_some() {
            warn!(exchange = self.id, "exchange dispatched twice in one call, the earlier dispatch is dropped");
        }
        self.flags.dispatched = true;
        self.dispatches += 1;
        self.pending_dispatch = Some(PendingDispatch { executor, handler });
    }

    pub(crate) fn take_dispatch(&mut self) -> Option<(Arc<dyn Executor>, Arc<dyn DynHandler>)> {
        let PendingDispatch { executor, handler } = self.pending_dispatch.take()?;
        self.flags.dispatched = false;
        let executor = executor
            .or_else(|| self.dispatch_executor.clone())
            .unwrap_or_else(|| Arc::clone(&self.connection.default_executor));
        Some((executor, handler))
    }

    pub fn dispatch_executor(&self) -> Option<&Arc<dyn Executor>> {
        self.dispatch_executor.as_ref()
    }

    pub fn set_dispatch_executor(&mut self, executor: Arc<dyn Executor>) {
        self.dispatch_executor = Some(executor);
    }

    /// Takes the request body channel. Available once per exchange.
    pub fn request_channel(&mut self) -> Result<RequestChannel<'_>, ExchangeError> {
        ensure!(!self.flags.request_channel, ExchangeError::unavailable(ChannelKind::Request));
        self.flags.request_channel = true;
        Ok(RequestChannel::new(self))
    }

    /// Takes the response body channel and starts the response. Available once per exchange.
    pub fn response_channel(&mut self) -> Result<ResponseChannel<'_>, ExchangeError> {
        ensure!(!self.flags.response_channel, ExchangeError::unavailable(ChannelKind::Response));
        self.flags.response_channel = true;
        self.flags.response_started = true;
        Ok(ResponseChannel::new(self))
    }

    /// Sends `body` as the whole response and terminates it.
    ///
    /// Sets Content-Length unless the handler already did or the status
    /// carries no body.
    pub async fn send(&mut self, body: impl Into<Bytes>) -> Result<(), ExchangeError> {
        let body = body.into();
        if !self.flags.response_channel
            && !is_bodiless(self.response.status())
            && !self.response.headers().contains_key(header::CONTENT_LENGTH)
        {
            self.response.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        }
        let mut channel = self.response_channel()?;
        channel.write_all(&body).await?;
        channel.shutdown().await
    }

    /// Switches the connection to another protocol once this exchange completes.
    ///
    /// Sets status 101; the handler adds the `Upgrade` header. After the 101
    /// response is written the transport and any bytes already read past this
    /// request go to `listener` instead of the HTTP parser.
    pub fn upgrade_channel(&mut self, listener: impl UpgradeListener + 'static) -> Result<(), ExchangeError> {
        self.set_status(StatusCode::SWITCHING_PROTOCOLS)?;
        self.response.headers_mut().insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
        self.flags.upgrade = true;
        self.upgrade_listener = Some(Box::new(listener));
        Ok(())
    }

    pub(crate) fn take_upgrade_listener(&mut self) -> Option<Box<dyn UpgradeListener>> {
        self.upgrade_listener.take()
    }

    pub(crate) async fn read_request(&mut self, dst: &mut [u8]) -> Result<usize, ExchangeError> {
        if self.flags.request_terminated {
            return Ok(0);
        }
        self.send_continue().await?;

        let connection = &mut *self.connection;
        if !connection.source.has_extra() {
            // responses held for pipelining must not wait on the transport
            connection.sink.flush().await?;
        }
        let n = connection.request.read(self.id, &mut connection.source, dst).await?;
        if n == 0 && !dst.is_empty() {
            self.terminate_request();
        }
        Ok(n)
    }

    fn expects_continue(&self) -> bool {
        self.request.version() == Version::HTTP_11
            && self.request.headers().get(header::EXPECT).is_some_and(|v| contains_token(v.as_bytes(), "100-continue"))
    }

    async fn send_continue(&mut self) -> Result<(), ExchangeError> {
        if self.flags.continue_sent || !self.expects_continue() || self.connection.response.is_head_written() {
            return Ok(());
        }
        self.flags.continue_sent = true;
        let sink = &mut self.connection.sink;
        sink.buffer_mut().extend_from_slice(CONTINUE);
        sink.flush().await?;
        debug!(exchange = self.id, "sent 100 continue");
        Ok(())
    }

    /// Writes the response head if it has not been written yet.
    fn start_response(&mut self) -> Result<(), ExchangeError> {
        if self.connection.response.is_head_written() {
            return Ok(());
        }
        ensure!(!self.flags.response_terminated, ExchangeError::ResponseTerminated);

        let payload_size = select_response_framing(
            self.request.method(),
            self.request.version(),
            self.response.status(),
            self.response.headers(),
        )?;
        if payload_size == crate::protocol::PayloadSize::CloseDelimited {
            self.flags.persistent = false;
        }
        self.set_connection_header();
        self.flags.response_started = true;

        let connection = &mut *self.connection;
        connection.response.write_head(self.id, &self.response, payload_size, &mut connection.sink)
    }

    fn set_connection_header(&mut self) {
        if self.flags.upgrade {
            return;
        }
        let headers = self.response.headers_mut();
        if headers.get(header::CONNECTION).is_some_and(|v| contains_token(v.as_bytes(), "close")) {
            self.flags.persistent = false;
        }
        if !self.flags.persistent {
            headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        } else if self.request.version() != Version::HTTP_11 {
            headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        }
    }

    pub(crate) async fn write_response(&mut self, data: &[u8]) -> Result<(), ExchangeError> {
        ensure!(!self.flags.response_terminated, ExchangeError::ResponseTerminated);
        self.start_response()?;
        let connection = &mut *self.connection;
        connection.response.write_body(self.id, data, &mut connection.sink)?;
        connection.sink.write_if_full().await?;
        Ok(())
    }

    pub(crate) async fn flush_response(&mut self) -> Result<(), ExchangeError> {
        ensure!(!self.flags.response_terminated, ExchangeError::ResponseTerminated);
        self.start_response()?;
        Ok(self.connection.sink.flush().await?)
    }

    pub(crate) async fn shutdown_response(&mut self) -> Result<(), ExchangeError> {
        if self.flags.response_terminated {
            return Ok(());
        }
        self.start_response()?;
        let connection = &mut *self.connection;
        connection.response.finish(self.id, &mut connection.sink)?;
        connection.sink.complete_response().await?;
        self.terminate_response();
        Ok(())
    }

    /// Finishes whatever the handler left undone.
    ///
    /// - an unread request body is drained, except when the client is still
    ///   waiting for `100 Continue` or the body has no framing; the connection
    ///   is then not reused
    /// - a response never started is first offered to the default response
    ///   listeners, newest first, and otherwise sent empty
    /// - the response is ended and flushed, unless it is held for pipelining
    pub async fn end_exchange(&mut self) -> Result<(), ExchangeError> {
        if self.is_complete() {
            return Ok(());
        }

        if !self.flags.request_terminated {
            let unframed = self.connection.request.framing() == RequestFraming::PassThrough;
            if unframed || (self.expects_continue() && !self.flags.continue_sent) {
                debug!(exchange = self.id, "request body left unread, connection will close");
                self.flags.persistent = false;
                self.terminate_request();
            } else {
                self.drain_request().await?;
            }
        }

        if !self.flags.response_started {
            let mut listeners = std::mem::take(&mut self.default_listeners);
            let body = listeners.iter_mut().rev().find_map(|listener| listener.handle_default_response(self));
            if let Some(body) = body {
                return self.send(body).await;
            }
            if !is_bodiless(self.response.status()) && !self.response.headers().contains_key(header::CONTENT_LENGTH) {
                self.response.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
            }
        }

        self.shutdown_response().await
    }

    async fn drain_request(&mut self) -> Result<(), ExchangeError> {
        let mut scratch = self.connection.source.pool().allocate()?;
        let mut drained = 0;
        loop {
            let n = self.read_request(scratch.spare_mut()?).await?;
            if n == 0 {
                break;
            }
            drained += n;
        }
        trace!(exchange = self.id, drained, "drained unread request body");
        Ok(())
    }
}

fn is_bodiless(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
}

/// HTTP/1.1 is persistent unless it asks to close; HTTP/1.0 only if it asks to keep alive.
fn is_persistent(request: &RequestHead) -> bool {
    let connection = request.headers().get(header::CONNECTION).map(HeaderValue::as_bytes);
    match request.version() {
        Version::HTTP_11 => !connection.is_some_and(|v| contains_token(v, "close")),
        Version::HTTP_10 => connection.is_some_and(|v| contains_token(v, "keep-alive")),
        _ => false,
    }
}

impl std::fmt::Debug for HttpServerExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServerExchange")
            .field("id", &self.id)
            .field("method", self.request.method())
            .field("uri", &self.request.request_uri())
            .field("status", &self.response.status())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::HeaderValue;

    use super::*;
    use crate::buffer::BufferPool;
    use crate::codec::HttpRequestParser;
    use crate::handler::{into_dyn, make_handler};
    use crate::protocol::HttpOptions;

    fn exchange(version: Version, headers: &[(header::HeaderName, &'static str)]) -> HttpServerExchange {
        let options = Arc::new(HttpOptions::default());
        let parser = Arc::new(HttpRequestParser::new(&options));
        let connection =
            ServerConnection::new(Box::new(tokio::io::empty()), Box::new(tokio::io::sink()), BufferPool::default(), options, parser);
        let mut exchange = HttpServerExchange::new(Box::new(connection));
        exchange.request.version = version;
        for (name, value) in headers {
            exchange.request.headers.insert(name.clone(), HeaderValue::from_static(value));
        }
        exchange
    }

    #[test]
    fn test_state_follows_the_lifecycle() {
        let mut exchange = exchange(Version::HTTP_11, &[]);
        assert_eq!(exchange.state(), ExchangeState::Created);

        exchange.headers_parsed().unwrap();
        assert_eq!(exchange.state(), ExchangeState::HeadersParsed);
        assert!(exchange.is_request_terminated());

        exchange.dispatch(None, into_dyn(make_handler(|_exchange| Box::pin(async move { Ok(()) }))));
        assert_eq!(exchange.state(), ExchangeState::Dispatched);
        assert_eq!(exchange.dispatch_count(), 1);

        let _ = exchange.response_channel().unwrap();
        assert_eq!(exchange.state(), ExchangeState::RequestTerminated);

        exchange.terminate_response();
        assert_eq!(exchange.state(), ExchangeState::Complete);
    }

    #[test]
    fn test_late_listener_runs_immediately() {
        let mut exchange = exchange(Version::HTTP_11, &[]);
        exchange.terminate_request();
        exchange.terminate_response();

        let fired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&fired);
        exchange.add_completion_listener(move |exchange: &mut HttpServerExchange, next: NextListener| {
            *counter.lock().unwrap() += 1;
            next.proceed(exchange);
        });
        exchange.terminate_response();

        assert_eq!(*fired.lock().unwrap(), 1);
    }

    fn record_listeners(exchange: &mut HttpServerExchange) -> Arc<Mutex<Vec<&'static str>>> {
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["L1", "L2", "L3"] {
            let recorded = Arc::clone(&order);
            exchange.add_completion_listener(move |exchange: &mut HttpServerExchange, next: NextListener| {
                recorded.lock().unwrap().push(name);
                next.proceed(exchange);
            });
        }
        order
    }

    fn exchange_with_body() -> HttpServerExchange {
        let mut exchange = exchange(Version::HTTP_11, &[(header::CONTENT_LENGTH, "5")]);
        exchange.request.method = Method::POST;
        exchange.headers_parsed().unwrap();
        assert_eq!(exchange.connection().request_conduit().framing(), RequestFraming::FixedLength);
        assert!(!exchange.is_request_terminated());
        exchange
    }

    #[test]
    fn test_listeners_wait_for_both_sides_response_first() {
        let mut exchange = exchange_with_body();
        let order = record_listeners(&mut exchange);

        exchange.terminate_response();
        assert!(order.lock().unwrap().is_empty());
        assert_eq!(exchange.state(), ExchangeState::ResponseTerminated);

        exchange.terminate_request();
        assert_eq!(*order.lock().unwrap(), ["L3", "L2", "L1"]);

        exchange.terminate_response();
        exchange.terminate_request();
        assert_eq!(order.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_listeners_wait_for_both_sides_request_first() {
        let mut exchange = exchange_with_body();
        let order = record_listeners(&mut exchange);

        exchange.terminate_request();
        assert!(order.lock().unwrap().is_empty());
        assert!(!exchange.is_complete());

        exchange.terminate_response();
        assert_eq!(*order.lock().unwrap(), ["L3", "L2", "L1"]);
        assert_eq!(exchange.state(), ExchangeState::Complete);

        exchange.terminate_request();
        assert_eq!(order.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_status_checks() {
        let mut exchange = exchange(Version::HTTP_11, &[]);
        assert!(matches!(exchange.set_status_code(1000), Err(ExchangeError::InvalidStatus { code: 1000 })));
        exchange.set_status_code(404).unwrap();
        assert_eq!(exchange.status(), StatusCode::NOT_FOUND);

        let _ = exchange.response_channel().unwrap();
        assert!(matches!(exchange.set_status(StatusCode::OK), Err(ExchangeError::ResponseStarted)));
    }

    #[test]
    fn test_persistence() {
        let cases = [
            (Version::HTTP_11, None, true),
            (Version::HTTP_11, Some("close"), false),
            (Version::HTTP_10, None, false),
            (Version::HTTP_10, Some("Keep-Alive"), true),
            (Version::HTTP_09, None, false),
        ];
        for (version, connection, persistent) in cases {
            let headers: Vec<_> = connection.into_iter().map(|value| (header::CONNECTION, value)).collect();
            let mut exchange = exchange(version, &headers);
            exchange.headers_parsed().unwrap();
            assert_eq!(exchange.is_persistent(), persistent, "{version:?} {connection:?}");
        }
    }

    #[test]
    fn test_unframed_body_is_not_persistent() {
        let mut exchange = exchange(Version::HTTP_11, &[(header::TRANSFER_ENCODING, "gzip")]);
        exchange.request.method = Method::POST;
        exchange.headers_parsed().unwrap();

        assert!(!exchange.is_persistent());
        assert!(!exchange.is_request_terminated());
    }
}
