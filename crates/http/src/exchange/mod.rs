//! The request/response exchange and its lifecycle.
//!
//! # Components
//!
//! - [`HttpServerExchange`]: one request/response cycle, owning its connection
//!   while it is alive
//! - [`RequestHead`] and [`ResponseHead`]: the parsed request line and headers,
//!   and the status and headers to send back
//! - [`RequestChannel`] and [`ResponseChannel`]: body access, handed out once
//!   per exchange
//! - [`ExchangeCompletionListener`] and [`DefaultResponseListener`]: hooks run
//!   when the exchange completes or ends without a response
//! - [`Executor`]: where dispatched handlers run, with [`WorkerPool`],
//!   [`BlockingPool`] and [`SameThreadExecutor`] provided
//!
//! # Lifecycle
//!
//! ```text
//! Created -> HeadersParsed -> [Dispatched] -> ResponseStarted -> Request/ResponseTerminated -> Complete
//! ```
//!
//! An exchange completes once both its request and its response are
//! terminated, in either order. Completion listeners then run newest first;
//! the connection's own listener runs last and arms it for the next request.

mod channel;
mod dispatch;
#[allow(clippy::module_inception, reason = "the exchange type lives next to its parts")]
mod exchange;
mod listener;
mod request;
mod response;

pub use channel::{RequestChannel, ResponseChannel};
pub(crate) use dispatch::{run_dispatched, run_handler};
pub use dispatch::{BlockingPool, DispatchOutcome, DispatchTask, Executor, SameThreadExecutor, WorkerPool};
pub use exchange::{ExchangeState, HttpServerExchange};
pub use listener::{DefaultResponseListener, ExchangeCompletionListener, NextListener};
pub use request::{Parameters, RequestHead};
pub use response::ResponseHead;
