//! Moving an exchange off the connection's task.
//!
//! A handler that calls [`HttpServerExchange::dispatch`] only records the
//! request. The dispatched handler starts once the current call has returned
//! and released its borrow of the exchange, so two handlers never hold the
//! same exchange at once. It then runs on an
//! [`Executor`], which takes ownership of the exchange for the duration and
//! hands it back together with the handler's result.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tracing::{error, trace};

use crate::exchange::HttpServerExchange;
use crate::handler::DynHandler;
use crate::protocol::HandlerError;

/// The exchange together with the result of the handler that ran on it.
pub type DispatchOutcome = (HttpServerExchange, Result<(), HandlerError>);

/// A dispatched handler bound to its exchange.
pub type DispatchTask = BoxFuture<'static, DispatchOutcome>;

/// Runs dispatched handlers.
///
/// An `Err` means the task was lost, and the exchange with it; the connection
/// is closed.
pub trait Executor: Send + Sync {
    fn execute(&self, task: DispatchTask) -> BoxFuture<'static, Result<DispatchOutcome, HandlerError>>;
}

/// Runs each task as a separate tokio task.
#[derive(Debug, Clone, Default)]
pub struct WorkerPool {
    handle: Option<Handle>,
}

impl WorkerPool {
    /// Spawns onto the runtime current at dispatch time.
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Spawns onto the runtime behind `handle`.
    pub fn with_handle(handle: Handle) -> Self {
        Self { handle: Some(handle) }
    }
}

impl Executor for WorkerPool {
    fn execute(&self, task: DispatchTask) -> BoxFuture<'static, Result<DispatchOutcome, HandlerError>> {
        let join = match &self.handle {
            Some(handle) => handle.spawn(task),
            None => tokio::spawn(task),
        };
        Box::pin(async move { join.await.map_err(HandlerError::from) })
    }
}

/// Runs each task on tokio's blocking thread pool, where handlers may block.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockingPool;

impl Executor for BlockingPool {
    fn execute(&self, task: DispatchTask) -> BoxFuture<'static, Result<DispatchOutcome, HandlerError>> {
        let handle = Handle::current();
        let join = tokio::task::spawn_blocking(move || handle.block_on(task));
        Box::pin(async move { join.await.map_err(HandlerError::from) })
    }
}

/// Runs each task inline on the connection's own task.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameThreadExecutor;

impl Executor for SameThreadExecutor {
    fn execute(&self, task: DispatchTask) -> BoxFuture<'static, Result<DispatchOutcome, HandlerError>> {
        Box::pin(async move { Ok::<_, HandlerError>(task.await) })
    }
}

/// Calls `handler`, turning a panic into an error.
pub(crate) async fn invoke(handler: &dyn DynHandler, exchange: &mut HttpServerExchange) -> Result<(), HandlerError> {
    match AssertUnwindSafe(handler.call(exchange)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let e = HandlerError::panicked(payload.as_ref());
            error!(cause = %e, "handler panicked");
            Err(e)
        }
    }
}

fn bind(handler: Arc<dyn DynHandler>, mut exchange: HttpServerExchange) -> DispatchTask {
    Box::pin(async move {
        let result = invoke(handler.as_ref(), &mut exchange).await;
        (exchange, result)
    })
}

/// Runs the root handler, then every handler it dispatches to in turn.
pub(crate) async fn run_handler(
    root: Arc<dyn DynHandler>,
    mut exchange: HttpServerExchange,
) -> Result<DispatchOutcome, HandlerError> {
    let result = invoke(root.as_ref(), &mut exchange).await;
    if result.is_err() {
        return Ok((exchange, result));
    }
    run_dispatched(exchange).await
}

/// Runs pending dispatches until the exchange is no longer dispatched.
pub(crate) async fn run_dispatched(mut exchange: HttpServerExchange) -> Result<DispatchOutcome, HandlerError> {
    while let Some((executor, handler)) = exchange.take_dispatch() {
        trace!(exchange = exchange.id(), "running dispatched handler");
        let (returned, result) = executor.execute(bind(handler, exchange)).await?;
        exchange = returned;
        if result.is_err() {
            return Ok((exchange, result));
        }
    }

    Ok((exchange, Ok(())))
}
