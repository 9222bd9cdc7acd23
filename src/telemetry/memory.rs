//! In-memory backend.
//!
//! Records every `load`, `send` and `flush` instead of talking to a
//! collector. The factory can resolve immediately, wait until
//! [`MemoryClientFactory::release`] is called, or fail, which is what the
//! lifecycle tests need to pin down ordering and teardown behaviour.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use crate::telemetry::api::{ClientFactory, TelemetryClient};
use crate::telemetry::config::ClientConfig;
use crate::telemetry::error::TelemetryError;
use crate::telemetry::record::ExceptionRecord;

/// Client that keeps everything it is sent.
#[derive(Debug, Default)]
pub struct MemoryClient {
    sent: Mutex<Vec<ExceptionRecord>>,
    loads: AtomicUsize,
    flushes: AtomicUsize,
}

impl MemoryClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<ExceptionRecord> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl TelemetryClient for MemoryClient {
    fn load(&self) {
        self.loads.fetch_add(1, Ordering::SeqCst);
    }

    fn send(&self, record: &ExceptionRecord) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }

    fn flush(&self) -> Result<(), TelemetryError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Immediate,
    Held,
    Failing,
}

/// Factory handing out one shared [`MemoryClient`].
#[derive(Debug)]
pub struct MemoryClientFactory {
    client: Arc<MemoryClient>,
    mode: Mode,
    release: Notify,
    configs: Mutex<Vec<ClientConfig>>,
}

impl MemoryClientFactory {
    fn with_mode(mode: Mode) -> Self {
        Self {
            client: MemoryClient::new(),
            mode,
            release: Notify::new(),
            configs: Mutex::new(Vec::new()),
        }
    }

    /// Creation resolves as soon as it is awaited.
    pub fn immediate() -> Self {
        Self::with_mode(Mode::Immediate)
    }

    /// Creation waits for [`release`](Self::release).
    pub fn held() -> Self {
        Self::with_mode(Mode::Held)
    }

    /// Creation always fails.
    pub fn failing() -> Self {
        Self::with_mode(Mode::Failing)
    }

    /// Let a held creation resolve. Safe to call before creation starts.
    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn client(&self) -> Arc<MemoryClient> {
        self.client.clone()
    }

    /// Every config `create` was called with.
    pub fn configs(&self) -> Vec<ClientConfig> {
        self.configs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ClientFactory for MemoryClientFactory {
    type Client = Arc<MemoryClient>;

    async fn create(&self, config: &ClientConfig) -> Result<Self::Client, TelemetryError> {
        self.configs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(config.clone());

        match self.mode {
            Mode::Immediate => {}
            Mode::Held => self.release.notified().await,
            Mode::Failing => {
                return Err(TelemetryError::Create(format!(
                    "in-memory backend refused {}",
                    config.connection_string
                )))
            }
        }

        Ok(self.client.clone())
    }
}
