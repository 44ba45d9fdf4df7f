use bytes::Bytes;

use crate::exchange::HttpServerExchange;

/// Called once an exchange has terminated both its request and its response.
///
/// Listeners run in reverse registration order. Each one receives the rest of
/// the chain and must call [`NextListener::proceed`] for it to continue; the
/// connection's own listener, registered first and so run last, arms the
/// connection for the next request.
pub trait ExchangeCompletionListener: Send {
    fn exchange_event(self: Box<Self>, exchange: &mut HttpServerExchange, next: NextListener);
}

impl<F> ExchangeCompletionListener for F
where
    F: FnOnce(&mut HttpServerExchange, NextListener) + Send,
{
    fn exchange_event(self: Box<Self>, exchange: &mut HttpServerExchange, next: NextListener) {
        (*self)(exchange, next)
    }
}

/// The listeners still to run.
#[must_use = "the completion chain stops unless `proceed` is called"]
pub struct NextListener {
    remaining: Vec<Box<dyn ExchangeCompletionListener>>,
}

impl NextListener {
    pub(crate) fn new(listeners: Vec<Box<dyn ExchangeCompletionListener>>) -> Self {
        Self { remaining: listeners }
    }

    /// Runs the next listener, if any.
    pub fn proceed(mut self, exchange: &mut HttpServerExchange) {
        if let Some(listener) = self.remaining.pop() {
            listener.exchange_event(exchange, self);
        }
    }
}

impl std::fmt::Debug for NextListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NextListener").field("remaining", &self.remaining.len()).finish()
    }
}

/// Gets one chance to produce a response when an exchange ends without one.
///
/// Returning a body sends it, with whatever status and headers the listener
/// set on the exchange; returning `None` passes to the next listener.
pub trait DefaultResponseListener: Send {
    fn handle_default_response(&mut self, exchange: &mut HttpServerExchange) -> Option<Bytes>;
}

impl<F> DefaultResponseListener for F
where
    F: FnMut(&mut HttpServerExchange) -> Option<Bytes> + Send,
{
    fn handle_default_response(&mut self, exchange: &mut HttpServerExchange) -> Option<Bytes> {
        self(exchange)
    }
}
