//! The request handler contract.
//!
//! Once a request head is parsed the connection calls the root handler with
//! the [`HttpServerExchange`]. The handler reads the body through
//! [`request_channel`](HttpServerExchange::request_channel), writes the
//! response through [`response_channel`](HttpServerExchange::response_channel)
//! or [`send`](HttpServerExchange::send), and may hand the exchange to another
//! handler with [`dispatch`](HttpServerExchange::dispatch). Whatever it leaves
//! unfinished is completed by [`end_exchange`](HttpServerExchange::end_exchange)
//! once it returns.
//!
//! Handlers implement [`Handler`], or are built from closures with
//! [`make_handler`]. [`DynHandler`] is the object safe form used to store and
//! dispatch them.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::exchange::HttpServerExchange;
use crate::protocol::HandlerError;

#[trait_variant::make(Handler: Send)]
pub trait LocalHandler {
    async fn handle_request(&self, exchange: &mut HttpServerExchange) -> Result<(), HandlerError>;
}

/// Object safe form of [`Handler`].
pub trait DynHandler: Send + Sync {
    fn call<'a>(&'a self, exchange: &'a mut HttpServerExchange) -> BoxFuture<'a, Result<(), HandlerError>>;
}

impl<H> DynHandler for H
where
    H: Handler + Send + Sync,
{
    fn call<'a>(&'a self, exchange: &'a mut HttpServerExchange) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(self.handle_request(exchange))
    }
}

/// A handler backed by a closure returning a boxed future.
pub struct HandlerFn<F> {
    f: F,
}

impl<F> std::fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut HttpServerExchange) -> BoxFuture<'a, Result<(), HandlerError>> + Send + Sync,
{
    async fn handle_request(&self, exchange: &mut HttpServerExchange) -> Result<(), HandlerError> {
        (self.f)(exchange).await
    }
}

/// Wraps a closure as a [`Handler`].
///
/// ```
/// use nio_http::handler::make_handler;
///
/// let handler = make_handler(|exchange| {
///     Box::pin(async move {
///         exchange.send("Hello World!\r\n").await.map_err(nio_http::protocol::HandlerError::failed)
///     })
/// });
/// # let _ = handler;
/// ```
pub fn make_handler<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut HttpServerExchange) -> BoxFuture<'a, Result<(), HandlerError>> + Send + Sync,
{
    HandlerFn { f }
}

/// Boxes a handler for [`dispatch`](HttpServerExchange::dispatch).
pub fn into_dyn<H>(handler: H) -> Arc<dyn DynHandler>
where
    H: Handler + Send + Sync + 'static,
{
    Arc::new(handler)
}
