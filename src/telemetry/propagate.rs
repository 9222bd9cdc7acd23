//! Handing the logger to code that was not given it explicitly.
//!
//! A mounted instance passes its [`ExceptionLogger`] to the wrapped
//! component directly. Everything below it can get the same logger three
//! ways:
//!
//! - ambient lookup: [`current_logger`] / [`consume`] return the innermost
//!   logger provided with [`provide`] (synchronous, per thread) or
//!   [`provide_async`] (per task), or a no-op logger outside any scope;
//! - pull access: [`exception_logger`] returns the same, except that outside
//!   any scope it records the premature access and returns a logger that
//!   buffers instead of discarding.
//!
//! Scopes nest and unwind with the closure or future that opened them;
//! there is no process-wide registration.

use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::telemetry::facade::ExceptionLogger;
use crate::telemetry::pending::PendingExceptions;

/// Message recorded when the pull accessor runs outside any scope.
pub const PREMATURE_ACCESS_MESSAGE: &str = "consumer called before initialization";

thread_local! {
    static SCOPES: RefCell<Vec<ExceptionLogger>> = const { RefCell::new(Vec::new()) };
}

tokio::task_local! {
    static TASK_LOGGER: ExceptionLogger;
}

struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        SCOPES.with(|scopes| {
            scopes.borrow_mut().pop();
        });
    }
}

/// Run `f` with `logger` as the ambient logger of this thread.
pub fn provide<R>(logger: &ExceptionLogger, f: impl FnOnce() -> R) -> R {
    SCOPES.with(|scopes| scopes.borrow_mut().push(logger.clone()));
    let _guard = ScopeGuard;
    f()
}

/// Run `fut` with `logger` as the ambient logger of the task polling it.
pub fn provide_async<F>(logger: ExceptionLogger, fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    TASK_LOGGER.scope(logger, fut)
}

/// The innermost provided logger, if any.
pub fn scoped_logger() -> Option<ExceptionLogger> {
    SCOPES
        .with(|scopes| scopes.borrow().last().cloned())
        .or_else(|| TASK_LOGGER.try_with(ExceptionLogger::clone).ok())
}

/// The innermost provided logger, or a no-op logger outside any scope.
pub fn current_logger() -> ExceptionLogger {
    scoped_logger().unwrap_or_default()
}

/// Call `f` with the ambient logger.
pub fn consume<R>(f: impl FnOnce(&ExceptionLogger) -> R) -> R {
    f(&current_logger())
}

/// Pull the ambient logger, falling back to the process-wide queue.
pub fn exception_logger() -> ExceptionLogger {
    exception_logger_or(&PendingExceptions::global())
}

/// Pull the ambient logger. Outside any scope, records the premature access
/// on `pending` and returns a logger that buffers onto it. Once the gate is
/// open both go out through the most recently attached client instead.
pub fn exception_logger_or(pending: &Arc<PendingExceptions>) -> ExceptionLogger {
    if let Some(logger) = scoped_logger() {
        return logger;
    }

    debug!("exception logger requested outside any provider scope");
    let logger = ExceptionLogger::buffering(pending.clone());
    logger.log(PREMATURE_ACCESS_MESSAGE);
    logger
}
