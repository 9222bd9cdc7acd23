//! Catching uncaught errors before the client is ready.
//!
//! The process-wide channel for uncaught errors is the panic hook.
//! [`install`] chains onto whatever hook is already set, so the usual panic
//! output still appears.
//!
//! While the gate is closed (or draining) every report becomes a `Critical`
//! record on the pending queue. Once the gate is open, reports are not
//! forwarded anywhere: live exceptions are expected to go through an
//! [`ExceptionLogger`](crate::telemetry::ExceptionLogger).

use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::PanicHookInfo;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::telemetry::facade::sending_on_this_thread;
use crate::telemetry::pending::PendingExceptions;
use crate::telemetry::record::{ExceptionError, ExceptionRecord, SeverityLevel};

/// An uncaught error as reported by the host environment.
#[derive(Debug, Clone, PartialEq)]
pub struct UncaughtError {
    pub message: String,
    pub source: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    /// Absent when the host could not produce an error object.
    pub error: Option<ExceptionError>,
}

impl UncaughtError {
    pub fn from_panic(info: &PanicHookInfo<'_>) -> Self {
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned());

        let location = info.location();
        let source = location.map(|l| l.file().to_string());
        let line = location.map(|l| l.line());
        let column = location.map(|l| l.column());

        let error = payload.as_ref().map(|message| {
            let backtrace = Backtrace::capture();
            let stack = match backtrace.status() {
                BacktraceStatus::Captured => backtrace.to_string(),
                _ => location
                    .map(|l| format!("at {}:{}:{}", l.file(), l.line(), l.column()))
                    .unwrap_or_default(),
            };
            let error = ExceptionError::new(message.clone()).with_kind("panic");
            if stack.is_empty() {
                error
            } else {
                error.with_stack(stack)
            }
        });

        Self {
            message: payload.unwrap_or_else(|| "Box<dyn Any>".to_string()),
            source,
            line,
            column,
            error,
        }
    }
}

/// Converts uncaught errors into pending records while the gate is closed.
#[derive(Debug, Clone)]
pub struct GlobalErrorInterceptor {
    pending: Arc<PendingExceptions>,
}

impl GlobalErrorInterceptor {
    pub fn new(pending: Arc<PendingExceptions>) -> Self {
        Self { pending }
    }

    /// Returns whether the report was buffered.
    pub fn report(&self, uncaught: UncaughtError) -> bool {
        let slot = uncaught
            .error
            .map(|error| ExceptionRecord::new(error, SeverityLevel::Critical, None));

        let buffered = self.pending.enqueue_unless_open(slot);
        if !buffered {
            debug!(
                message = %uncaught.message,
                "uncaught error after readiness, not forwarded"
            );
        }
        buffered
    }
}

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Register the interceptor with the panic hook. Only the first call in a
/// process installs anything; later calls return false.
pub fn install(pending: Arc<PendingExceptions>) -> bool {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return false;
    }

    let interceptor = GlobalErrorInterceptor::new(pending);
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        // A backend panicking inside `send` must not feed itself new records.
        if sending_on_this_thread() {
            debug!("panic inside telemetry client send, not intercepted");
        } else {
            interceptor.report(UncaughtError::from_panic(info));
        }
        previous(info);
    }));

    debug!("uncaught error interceptor installed");
    true
}
