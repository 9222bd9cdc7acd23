//! The `log_exception` entry point handed to application code.

use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{trace, warn};

use crate::telemetry::api::TelemetryClient;
use crate::telemetry::pending::PendingExceptions;
use crate::telemetry::record::{ExceptionError, ExceptionRecord, Properties, SeverityLevel};

thread_local! {
    static SENDING: Cell<bool> = const { Cell::new(false) };
}

/// True while this thread is inside a client's `send`.
pub(crate) fn sending_on_this_thread() -> bool {
    SENDING.with(Cell::get)
}

struct SendingGuard;

impl SendingGuard {
    fn enter() -> Self {
        SENDING.with(|sending| sending.set(true));
        SendingGuard
    }
}

impl Drop for SendingGuard {
    fn drop(&mut self) {
        SENDING.with(|sending| sending.set(false));
    }
}

/// Hand `record` to `client`. A panicking backend costs the record, never
/// the caller. Returns whether the send completed.
pub(crate) fn send_guarded(client: &dyn TelemetryClient, record: &ExceptionRecord) -> bool {
    let _sending = SendingGuard::enter();
    match panic::catch_unwind(AssertUnwindSafe(|| client.send(record))) {
        Ok(()) => true,
        Err(_) => {
            warn!(message = %record.error.message, "telemetry client panicked while sending, exception lost");
            false
        }
    }
}

/// Buffer-or-dispatch logic bound to one mounted instance.
///
/// The client handle is published once, by the owning lifecycle, right
/// before it drains the queue. After teardown the facade still buffers but
/// stops sending live.
pub struct LoggingFacade {
    pending: Arc<PendingExceptions>,
    client: OnceLock<Arc<dyn TelemetryClient>>,
    closed: AtomicBool,
}

impl LoggingFacade {
    pub fn new(pending: Arc<PendingExceptions>) -> Arc<Self> {
        Arc::new(Self {
            pending,
            client: OnceLock::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn pending(&self) -> &Arc<PendingExceptions> {
        &self.pending
    }

    pub fn has_client(&self) -> bool {
        self.client.get().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn client(&self) -> Option<&Arc<dyn TelemetryClient>> {
        self.client.get()
    }

    /// Publish the loaded client and register this facade as the queue's
    /// live route. Returns false if a client was already set.
    pub(crate) fn attach(self: &Arc<Self>, client: Arc<dyn TelemetryClient>) -> bool {
        if self.client.set(client).is_err() {
            return false;
        }
        self.pending.register(Arc::downgrade(self));
        true
    }

    /// Stop live dispatch. Idempotent.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Send without a handle buffers; with a handle it goes out live unless
    /// a drain is still in progress.
    pub fn dispatch(&self, record: ExceptionRecord) {
        let Some(client) = self.client.get() else {
            self.pending.enqueue(record);
            return;
        };

        if let Some(record) = self.pending.buffer_unless_open(record) {
            if self.is_closed() {
                warn!(message = %record.error.message, "exception logged after teardown, dropped");
                return;
            }
            trace!(severity = %record.severity_level, "exception sent live");
            send_guarded(client.as_ref(), &record);
        }
    }
}

#[derive(Clone)]
enum Target {
    Noop,
    Buffer(Arc<PendingExceptions>),
    Facade(Arc<LoggingFacade>),
}

/// Cheap, cloneable handle to `log_exception`.
///
/// What it does depends on where it came from: a mounted instance's logger
/// buffers or dispatches, the pre-initialization logger buffers until the
/// gate opens and then goes through the live facade, and the ambient
/// default does nothing.
#[derive(Clone)]
pub struct ExceptionLogger {
    target: Target,
}

impl ExceptionLogger {
    pub(crate) fn from_facade(facade: Arc<LoggingFacade>) -> Self {
        Self {
            target: Target::Facade(facade),
        }
    }

    /// A logger that only ever appends to `pending`.
    pub fn buffering(pending: Arc<PendingExceptions>) -> Self {
        Self {
            target: Target::Buffer(pending),
        }
    }

    /// A logger that discards everything.
    pub fn noop() -> Self {
        Self {
            target: Target::Noop,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.target, Target::Noop)
    }

    /// Log an exception. Severity defaults to [`SeverityLevel::Information`].
    ///
    /// Never fails: anything that cannot be sent yet is buffered.
    pub fn log_exception(
        &self,
        error: impl Into<ExceptionError>,
        severity_level: Option<SeverityLevel>,
        properties: Option<Properties>,
    ) {
        let record =
            ExceptionRecord::new(error, severity_level.unwrap_or_default(), properties);

        match &self.target {
            Target::Noop => {}
            Target::Buffer(pending) => {
                let Some(record) = pending.buffer_unless_open(record) else {
                    return;
                };
                match pending.live_facade() {
                    Some(facade) => facade.dispatch(record),
                    None => {
                        warn!(message = %record.error.message, "no live client behind an open gate, exception dropped")
                    }
                }
            }
            Target::Facade(facade) => facade.dispatch(record),
        }
    }

    /// [`log_exception`](Self::log_exception) with default severity and no
    /// properties.
    pub fn log(&self, error: impl Into<ExceptionError>) {
        self.log_exception(error, None, None);
    }
}

impl Default for ExceptionLogger {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for ExceptionLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.target {
            Target::Noop => "noop",
            Target::Buffer(_) => "buffering",
            Target::Facade(_) => "facade",
        };
        f.debug_struct("ExceptionLogger").field("kind", &kind).finish()
    }
}
