//! Creation, loading, draining and teardown of one client handle.
//!
//! ```text
//! Uninitialized -> Creating -> Draining -> Ready -> TornDown
//!                     |
//!                     +-> Failed -> TornDown
//! ```
//!
//! Any state may move to `TornDown`; nothing moves back. The state lives in
//! a `watch` channel so the creation task and `teardown` settle races with a
//! single compare-and-set.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::telemetry::api::{ClientFactory, TelemetryClient};
use crate::telemetry::config::ClientConfig;
use crate::telemetry::error::TelemetryError;
use crate::telemetry::facade::{send_guarded, LoggingFacade};
use crate::telemetry::pending::PendingSlot;
use crate::telemetry::record::{ExceptionRecord, SeverityLevel};

/// Message of the record sent in place of an empty queue slot.
pub const UNDEFINED_EXCEPTION_MESSAGE: &str = "Pending Queue Containing Undefined Exception";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Creating,
    Draining,
    Ready,
    Failed,
    TornDown,
}

impl LifecycleState {
    /// No further transition will happen without a teardown.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::TornDown)
    }
}

struct Shared {
    facade: Arc<LoggingFacade>,
    state: watch::Sender<LifecycleState>,
}

impl Shared {
    /// Move `from -> to` only if the state is still `from`.
    fn advance(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    fn resolve<C>(&self, created: Result<C, TelemetryError>)
    where
        C: TelemetryClient + 'static,
    {
        let client: Arc<dyn TelemetryClient> = match created {
            Ok(client) => Arc::new(client),
            Err(e) => {
                if self.advance(LifecycleState::Creating, LifecycleState::Failed) {
                    error!(error = %e, "telemetry client creation failed, exceptions stay buffered");
                }
                return;
            }
        };

        if !self.advance(LifecycleState::Creating, LifecycleState::Draining) {
            warn!("telemetry client resolved after teardown, discarding it");
            flush_quietly(client.as_ref());
            return;
        }

        if panic::catch_unwind(AssertUnwindSafe(|| client.load())).is_err() {
            if self.advance(LifecycleState::Draining, LifecycleState::Failed) {
                error!("telemetry client panicked while loading, exceptions stay buffered");
            }
            return;
        }

        if !self.facade.attach(client.clone()) {
            warn!("telemetry client already attached");
        }

        let drained = self
            .facade
            .pending()
            .drain_into(|slot| drain_one(client.as_ref(), slot));
        info!(drained, "pending exceptions drained");

        if !self.advance(LifecycleState::Draining, LifecycleState::Ready) {
            // Torn down mid-drain: push out what was just sent.
            flush_quietly(client.as_ref());
        }
    }
}

fn drain_one(client: &dyn TelemetryClient, slot: PendingSlot) {
    let record = match slot {
        Some(record) => record.mark_buffered(),
        None => {
            warn!("empty slot in pending exception queue");
            ExceptionRecord::new(UNDEFINED_EXCEPTION_MESSAGE, SeverityLevel::Information, None)
        }
    };
    send_guarded(client, &record);
}

fn flush_quietly(client: &dyn TelemetryClient) {
    match panic::catch_unwind(AssertUnwindSafe(|| client.flush())) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "telemetry client flush failed"),
        Err(_) => warn!("telemetry client panicked while flushing"),
    }
}

/// Owns the client handle of one mounted instance.
///
/// Dropping the lifecycle tears it down.
pub struct ClientLifecycle {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientLifecycle {
    pub fn new(facade: Arc<LoggingFacade>) -> Self {
        let (state, _) = watch::channel(LifecycleState::Uninitialized);
        Self {
            shared: Arc::new(Shared { facade, state }),
            task: Mutex::new(None),
        }
    }

    pub fn facade(&self) -> &Arc<LoggingFacade> {
        &self.shared.facade
    }

    pub fn state(&self) -> LifecycleState {
        *self.shared.state.borrow()
    }

    /// Begin creating the client on the current tokio runtime and return
    /// right away. Only the first call on an instance does anything.
    pub fn start<F: ClientFactory>(
        &self,
        factory: Arc<F>,
        config: ClientConfig,
    ) -> Result<(), TelemetryError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TelemetryError::Init(format!("no tokio runtime: {}", e)))?;

        if !self
            .shared
            .advance(LifecycleState::Uninitialized, LifecycleState::Creating)
        {
            warn!(state = ?self.state(), "client lifecycle already started");
            return Ok(());
        }

        debug!(connection_string = %config.connection_string, "creating telemetry client");

        let shared = self.shared.clone();
        let handle = runtime.spawn(async move {
            let created = factory.create(&config).await;
            shared.resolve(created);
        });

        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Wait until the instance is ready, failed or torn down.
    pub async fn ready(&self) -> LifecycleState {
        let mut rx = self.shared.state.subscribe();
        let state = match rx.wait_for(LifecycleState::is_settled).await {
            Ok(state) => *state,
            Err(_) => LifecycleState::TornDown,
        };
        state
    }

    /// Flush the handle if there is one, stop any pending creation and stop
    /// live sends. Idempotent, never blocks on creation and never panics.
    pub fn teardown(&self) {
        let previous = self.shared.state.send_replace(LifecycleState::TornDown);
        if previous == LifecycleState::TornDown {
            return;
        }

        self.shared.facade.close();

        if previous == LifecycleState::Creating {
            if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
                task.abort();
            }
        }

        // A drain in progress flushes on its own once it sees the teardown.
        if previous != LifecycleState::Draining {
            if let Some(client) = self.shared.facade.client() {
                flush_quietly(client.as_ref());
            }
        }

        info!(?previous, "client lifecycle torn down");
    }
}

impl Drop for ClientLifecycle {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::facade::ExceptionLogger;
    use crate::telemetry::interceptor::{GlobalErrorInterceptor, UncaughtError};
    use crate::telemetry::memory::{MemoryClient, MemoryClientFactory};
    use crate::telemetry::record::ExceptionError;
    use crate::telemetry::pending::PendingExceptions;
    use crate::telemetry::record::{Properties, PROVENANCE_KEY};
    use serde_json::json;

    fn setup() -> (Arc<PendingExceptions>, ClientLifecycle, ExceptionLogger) {
        let pending = PendingExceptions::new();
        let facade = LoggingFacade::new(pending.clone());
        let logger = ExceptionLogger::from_facade(facade.clone());
        (pending, ClientLifecycle::new(facade), logger)
    }

    fn config() -> ClientConfig {
        ClientConfig::new("memory://test", None)
    }

    #[tokio::test]
    async fn buffered_exception_is_sent_with_marker_after_load() {
        let (pending, lifecycle, logger) = setup();
        let factory = Arc::new(MemoryClientFactory::held());
        lifecycle.start(factory.clone(), config()).unwrap();

        logger.log("A");
        assert_eq!(pending.len(), 1);

        factory.release();
        assert_eq!(lifecycle.ready().await, LifecycleState::Ready);

        let sent = factory.client().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].error.message, "A");
        assert_eq!(sent[0].severity_level, SeverityLevel::Information);
        let mut expected = Properties::new();
        expected.insert(PROVENANCE_KEY.to_string(), json!("Yes"));
        assert_eq!(sent[0].properties, Some(expected));
        assert!(pending.is_empty());
        assert!(pending.is_open());
    }

    #[tokio::test]
    async fn buffered_exceptions_drain_in_call_order() {
        let (_pending, lifecycle, logger) = setup();
        let factory = Arc::new(MemoryClientFactory::held());
        lifecycle.start(factory.clone(), config()).unwrap();

        for i in 0..25 {
            logger.log(format!("error {}", i));
        }

        factory.release();
        lifecycle.ready().await;

        let sent = factory.client().sent();
        assert_eq!(sent.len(), 25);
        for (i, record) in sent.iter().enumerate() {
            assert_eq!(record.error.message, format!("error {}", i));
            assert!(record.is_buffered());
        }
    }

    #[tokio::test]
    async fn after_ready_exceptions_go_out_live() {
        let (_pending, lifecycle, logger) = setup();
        let factory = Arc::new(MemoryClientFactory::immediate());
        lifecycle.start(factory.clone(), config()).unwrap();
        lifecycle.ready().await;

        logger.log_exception("B", Some(SeverityLevel::Critical), None);
        logger.log("C");

        let sent = factory.client().sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].severity_level, SeverityLevel::Critical);
        assert_eq!(sent[1].severity_level, SeverityLevel::Information);
        assert!(sent.iter().all(|record| !record.is_buffered()));
        assert_eq!(factory.client().load_count(), 1);
    }

    #[tokio::test]
    async fn empty_slot_is_replaced_by_synthetic_record() {
        let (pending, lifecycle, _logger) = setup();
        pending.enqueue_slot(None);
        let factory = Arc::new(MemoryClientFactory::immediate());

        lifecycle.start(factory.clone(), config()).unwrap();
        lifecycle.ready().await;

        let sent = factory.client().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].error.message, UNDEFINED_EXCEPTION_MESSAGE);
        assert!(!sent[0].is_buffered());
    }

    #[tokio::test]
    async fn start_passes_config_through_once() {
        let (_pending, lifecycle, _logger) = setup();
        let factory = Arc::new(MemoryClientFactory::immediate());
        let mut options = crate::telemetry::config::ClientOptions::new();
        options.insert("serviceName".into(), json!("shop"));

        lifecycle
            .start(factory.clone(), ClientConfig::new("memory://a", Some(options)))
            .unwrap();
        lifecycle
            .start(factory.clone(), ClientConfig::new("memory://b", None))
            .unwrap();
        lifecycle.ready().await;

        let configs = factory.configs();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].connection_string, "memory://a");
        assert_eq!(configs[0].option_str("serviceName"), Some("shop"));
    }

    #[tokio::test]
    async fn failed_creation_keeps_exceptions_buffered() {
        let (pending, lifecycle, logger) = setup();
        logger.log("kept");

        lifecycle
            .start(Arc::new(MemoryClientFactory::failing()), config())
            .unwrap();

        assert_eq!(lifecycle.ready().await, LifecycleState::Failed);
        assert_eq!(pending.len(), 1);
        assert!(!pending.is_open());
    }

    #[tokio::test]
    async fn teardown_before_resolution_does_not_block_or_send() {
        let (_pending, lifecycle, logger) = setup();
        let factory = Arc::new(MemoryClientFactory::held());
        lifecycle.start(factory.clone(), config()).unwrap();
        logger.log("never sent");

        lifecycle.teardown();
        factory.release();
        tokio::task::yield_now().await;

        assert_eq!(lifecycle.state(), LifecycleState::TornDown);
        assert!(factory.client().sent().is_empty());
        assert_eq!(factory.client().flush_count(), 0);
    }

    #[tokio::test]
    async fn late_resolution_after_teardown_is_flushed_and_discarded() {
        let (pending, lifecycle, logger) = setup();
        let factory = Arc::new(MemoryClientFactory::held());
        lifecycle.start(factory.clone(), config()).unwrap();
        logger.log("still buffered");
        lifecycle.teardown();

        let client = MemoryClient::new();
        lifecycle.shared.resolve(Ok(client.clone()));

        assert!(client.sent().is_empty());
        assert_eq!(client.load_count(), 0);
        assert_eq!(client.flush_count(), 1);
        assert!(!lifecycle.facade().has_client());
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn teardown_flushes_a_ready_client_once() {
        let (_pending, lifecycle, _logger) = setup();
        let factory = Arc::new(MemoryClientFactory::immediate());
        lifecycle.start(factory.clone(), config()).unwrap();
        lifecycle.ready().await;

        lifecycle.teardown();
        lifecycle.teardown();
        drop(lifecycle);

        assert_eq!(factory.client().flush_count(), 1);
    }

    /// Wraps a [`MemoryClient`] and runs `on_send` before every send.
    struct HookClient {
        inner: Arc<MemoryClient>,
        on_send: Box<dyn Fn(&ExceptionRecord) + Send + Sync>,
    }

    impl TelemetryClient for HookClient {
        fn load(&self) {
            self.inner.load();
        }

        fn send(&self, record: &ExceptionRecord) {
            (self.on_send)(record);
            self.inner.send(record);
        }

        fn flush(&self) -> Result<(), TelemetryError> {
            self.inner.flush()
        }
    }

    fn resolve_with(lifecycle: &ClientLifecycle, client: HookClient) {
        assert!(lifecycle
            .shared
            .advance(LifecycleState::Uninitialized, LifecycleState::Creating));
        lifecycle.shared.resolve(Ok(client));
    }

    #[test]
    fn exception_logged_by_a_send_side_effect_is_drained_last() {
        let (pending, lifecycle, logger) = setup();
        logger.log("first");
        logger.log("second");

        let inner = MemoryClient::new();
        let reentrant = logger.clone();
        let client = HookClient {
            inner: inner.clone(),
            on_send: Box::new(move |record| {
                if record.error.message == "first" {
                    reentrant.log("during");
                }
            }),
        };
        resolve_with(&lifecycle, client);

        let messages: Vec<_> = inner.sent().into_iter().map(|r| r.error.message).collect();
        assert_eq!(messages, vec!["first", "second", "during"]);
        assert!(inner.sent().iter().all(ExceptionRecord::is_buffered));
        assert!(pending.is_empty());
        assert_eq!(lifecycle.state(), LifecycleState::Ready);
    }

    #[test]
    fn teardown_during_drain_finishes_the_drain_and_flushes_once() {
        let (pending, lifecycle, logger) = setup();
        logger.log("first");
        logger.log("second");
        let lifecycle = Arc::new(lifecycle);

        let inner = MemoryClient::new();
        let weak = Arc::downgrade(&lifecycle);
        let client = HookClient {
            inner: inner.clone(),
            on_send: Box::new(move |record| {
                if record.error.message == "first" {
                    if let Some(lifecycle) = weak.upgrade() {
                        lifecycle.teardown();
                    }
                }
            }),
        };
        resolve_with(&lifecycle, client);

        assert_eq!(inner.sent().len(), 2);
        assert_eq!(inner.flush_count(), 1);
        assert_eq!(lifecycle.state(), LifecycleState::TornDown);
        assert!(pending.is_empty());

        logger.log("after teardown");
        assert_eq!(inner.sent().len(), 2);
    }

    #[test]
    fn panicking_send_during_drain_still_settles() {
        let (pending, lifecycle, logger) = setup();
        logger.log("explodes");
        logger.log("survives");

        let inner = MemoryClient::new();
        let client = HookClient {
            inner: inner.clone(),
            on_send: Box::new(|record| {
                if record.error.message == "explodes" {
                    panic!("backend failure");
                }
            }),
        };
        resolve_with(&lifecycle, client);

        assert_eq!(lifecycle.state(), LifecycleState::Ready);
        assert!(pending.is_open());
        let sent = inner.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].error.message, "survives");

        logger.log("live");
        assert_eq!(inner.sent().len(), 2);
    }

    #[tokio::test]
    async fn panicking_load_fails_and_keeps_exceptions_buffered() {
        struct BrokenLoad;

        impl TelemetryClient for BrokenLoad {
            fn load(&self) {
                panic!("load failed");
            }

            fn send(&self, _record: &ExceptionRecord) {}

            fn flush(&self) -> Result<(), TelemetryError> {
                Ok(())
            }
        }

        let (pending, lifecycle, logger) = setup();
        logger.log("kept");

        assert!(lifecycle
            .shared
            .advance(LifecycleState::Uninitialized, LifecycleState::Creating));
        lifecycle.shared.resolve(Ok(BrokenLoad));

        assert_eq!(lifecycle.ready().await, LifecycleState::Failed);
        assert!(!lifecycle.facade().has_client());
        assert!(!pending.is_open());
        assert!(pending
            .snapshot()
            .iter()
            .flatten()
            .any(|record| record.error.message == "kept"));
    }

    #[tokio::test]
    async fn uncaught_error_before_ready_is_drained_as_critical() {
        let (_pending, lifecycle, _logger) = setup();
        let interceptor = GlobalErrorInterceptor::new(lifecycle.facade().pending().clone());
        let reported = interceptor.report(UncaughtError {
            message: "uncaught".to_string(),
            source: Some("src/main.rs".to_string()),
            line: Some(7),
            column: Some(3),
            error: Some(ExceptionError::new("uncaught")),
        });
        assert!(reported);

        let factory = Arc::new(MemoryClientFactory::immediate());
        lifecycle.start(factory.clone(), config()).unwrap();
        lifecycle.ready().await;

        let sent = factory.client().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].error.message, "uncaught");
        assert_eq!(sent[0].severity_level, SeverityLevel::Critical);
        assert!(sent[0].is_buffered());
    }

    #[tokio::test]
    async fn teardown_stops_live_sends_from_logger_clones() {
        let (_pending, lifecycle, logger) = setup();
        let factory = Arc::new(MemoryClientFactory::immediate());
        lifecycle.start(factory.clone(), config()).unwrap();
        lifecycle.ready().await;
        let clone = logger.clone();

        clone.log("while ready");
        lifecycle.teardown();
        clone.log("after teardown");

        let sent = factory.client().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].error.message, "while ready");
        assert_eq!(factory.client().flush_count(), 1);
    }

    #[test]
    fn teardown_of_unstarted_instance_is_safe() {
        let (_pending, lifecycle, _logger) = setup();

        lifecycle.teardown();

        assert_eq!(lifecycle.state(), LifecycleState::TornDown);
    }

    #[test]
    fn start_outside_runtime_is_an_init_error() {
        let (_pending, lifecycle, _logger) = setup();

        let result = lifecycle.start(Arc::new(MemoryClientFactory::immediate()), config());

        assert!(matches!(result, Err(TelemetryError::Init(_))));
        assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);
    }
}
