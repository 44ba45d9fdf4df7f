use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::buffer::BufferPool;
use crate::codec::HttpRequestParser;
use crate::connection::HttpConnection;
use crate::exchange::Executor;
use crate::handler::{DynHandler, Handler};
use crate::protocol::HttpOptions;

/// Builds the HTTP stack for every accepted stream.
///
/// The buffer pool, options, parser and root handler are shared by all the
/// connections it opens.
pub struct HttpOpenListener {
    pool: BufferPool,
    options: Arc<HttpOptions>,
    parser: Arc<HttpRequestParser>,
    handler: Arc<dyn DynHandler>,
    executor: Option<Arc<dyn Executor>>,
}

impl HttpOpenListener {
    pub fn new<H>(handler: Arc<H>) -> Self
    where
        H: Handler + Sync + 'static,
    {
        Self::with_options(handler, BufferPool::default(), HttpOptions::default())
    }

    pub fn with_options(handler: Arc<dyn DynHandler>, pool: BufferPool, options: HttpOptions) -> Self {
        let parser = Arc::new(HttpRequestParser::new(&options));
        Self { pool, options: Arc::new(options), parser, handler, executor: None }
    }

    /// Sets the default executor of every connection opened from now on.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn options(&self) -> &HttpOptions {
        &self.options
    }

    pub fn handler(&self) -> &Arc<dyn DynHandler> {
        &self.handler
    }

    /// Builds the connection for one accepted transport.
    pub fn open<R, W>(&self, reader: R, writer: W) -> HttpConnection
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let connection = HttpConnection::from_parts(
            Box::new(reader),
            Box::new(writer),
            self.pool.clone(),
            Arc::clone(&self.options),
            Arc::clone(&self.parser),
        );
        match &self.executor {
            Some(executor) => connection.with_executor(Arc::clone(executor)),
            None => connection,
        }
    }

    /// Serves `stream` on a new task until the connection closes.
    pub fn spawn<S>(&self, stream: S) -> JoinHandle<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let connection = self.open(reader, writer);
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            match connection.serve(handler).await {
                Ok(()) => info!("finished process, connection shutdown"),
                Err(e) => debug!(cause = %e, "connection closed with error"),
            }
        })
    }
}

impl std::fmt::Debug for HttpOpenListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOpenListener")
            .field("pool", &self.pool)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
