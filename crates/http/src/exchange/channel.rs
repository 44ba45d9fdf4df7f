use crate::exchange::HttpServerExchange;
use crate::protocol::ExchangeError;

/// Access to the request body, handed out once per exchange.
///
/// The body is decoded according to the request's framing. The first read of
/// a request that expects `100-continue` sends the interim response.
#[derive(Debug)]
pub struct RequestChannel<'a> {
    exchange: &'a mut HttpServerExchange,
}

impl<'a> RequestChannel<'a> {
    pub(crate) fn new(exchange: &'a mut HttpServerExchange) -> Self {
        Self { exchange }
    }

    /// Reads body bytes into `dst`, returning `Ok(0)` at the end of the body.
    ///
    /// Once the request is terminated this returns `Ok(0)` without touching
    /// the connection.
    pub async fn read(&mut self, dst: &mut [u8]) -> Result<usize, ExchangeError> {
        self.exchange.read_request(dst).await
    }

    /// Reads the rest of the body into `dst`.
    pub async fn read_to_end(&mut self, dst: &mut Vec<u8>) -> Result<usize, ExchangeError> {
        let mut chunk = [0u8; 1024];
        let mut total = 0;
        loop {
            match self.read(&mut chunk).await? {
                0 => return Ok(total),
                n => {
                    dst.extend_from_slice(&chunk[..n]);
                    total += n;
                }
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.exchange.is_request_terminated()
    }

    pub fn exchange(&self) -> &HttpServerExchange {
        self.exchange
    }
}

/// Access to the response body, handed out once per exchange.
///
/// Taking it starts the response: the status and headers can no longer be
/// changed through the exchange, and the head is written before the first
/// body byte. After [`shutdown`](Self::shutdown) every write fails with
/// [`ExchangeError::ResponseTerminated`].
#[derive(Debug)]
pub struct ResponseChannel<'a> {
    exchange: &'a mut HttpServerExchange,
}

impl<'a> ResponseChannel<'a> {
    pub(crate) fn new(exchange: &'a mut HttpServerExchange) -> Self {
        Self { exchange }
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), ExchangeError> {
        self.exchange.write_response(data).await
    }

    /// Writes the head if needed and everything buffered so far to the transport.
    pub async fn flush(&mut self) -> Result<(), ExchangeError> {
        self.exchange.flush_response().await
    }

    /// Ends the response body and terminates the response.
    pub async fn shutdown(&mut self) -> Result<(), ExchangeError> {
        self.exchange.shutdown_response().await
    }

    pub fn is_finished(&self) -> bool {
        self.exchange.is_response_terminated()
    }

    pub fn exchange(&self) -> &HttpServerExchange {
        self.exchange
    }
}
