// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Command-driven owning component of the bridge.
//!
//! All shared state (staging buffer, ready payload, identity cache, flush
//! gate) is constructed here and owned by one [`BridgeService`] instance;
//! nothing lives in statics, so tests can run several bridges side by side.
//! The collection daemon talks to the service through a [`BridgeHandle`]:
//! one `Flush` command per interval, `Status` on demand.

use crate::api::ApiClient;
use crate::buffer::{ReadyPayload, StagingBuffer};
use crate::config::BridgeConfig;
use crate::errors::TransportError;
use crate::flusher::Flusher;
use crate::metric::Batch;
use crate::resolver::IdentityResolver;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use ustr::Ustr;

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Observability counters surfaced through the status query. `last_flush`
/// is stamped on every inbound batch, `last_exception` on every HTTP error
/// response; both start at the service's startup time.
#[derive(Debug)]
pub struct BridgeStats {
    last_flush: AtomicI64,
    last_exception: AtomicI64,
}

impl BridgeStats {
    pub fn new(startup_time: i64) -> Self {
        BridgeStats {
            last_flush: AtomicI64::new(startup_time),
            last_exception: AtomicI64::new(startup_time),
        }
    }

    pub fn record_flush(&self) {
        self.last_flush.store(unix_now(), Ordering::Relaxed);
    }

    pub fn record_exception(&self) {
        self.last_exception.store(unix_now(), Ordering::Relaxed);
    }

    pub fn last_flush(&self) -> i64 {
        self.last_flush.load(Ordering::Relaxed)
    }

    pub fn last_exception(&self) -> i64 {
        self.last_exception.load(Ordering::Relaxed)
    }
}

/// One `(category, name, value)` line of the status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub category: &'static str,
    pub name: &'static str,
    pub value: i64,
}

#[derive(Debug)]
pub enum BridgeCommand {
    /// One interval's batch from the collection daemon.
    Flush { timestamp: i64, batch: Batch },
    /// On-demand status query.
    Status {
        response_tx: oneshot::Sender<Vec<StatusEntry>>,
    },
    Shutdown,
}

#[derive(Clone)]
pub struct BridgeHandle {
    tx: mpsc::UnboundedSender<BridgeCommand>,
}

impl BridgeHandle {
    pub fn flush(
        &self,
        timestamp: i64,
        batch: Batch,
    ) -> Result<(), mpsc::error::SendError<BridgeCommand>> {
        self.tx.send(BridgeCommand::Flush { timestamp, batch })
    }

    pub async fn status(&self) -> Result<Vec<StatusEntry>, String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(BridgeCommand::Status { response_tx })
            .map_err(|e| format!("Failed to send status command: {}", e))?;

        response_rx
            .await
            .map_err(|e| format!("Failed to receive status response: {}", e))
    }

    pub fn shutdown(&self) -> Result<(), mpsc::error::SendError<BridgeCommand>> {
        self.tx.send(BridgeCommand::Shutdown)
    }
}

pub struct BridgeService {
    config: BridgeConfig,
    staging: Arc<Mutex<StagingBuffer>>,
    flusher: Flusher,
    api: Arc<ApiClient>,
    stats: Arc<BridgeStats>,
    rx: mpsc::UnboundedReceiver<BridgeCommand>,
}

#[allow(clippy::expect_used)]
impl BridgeService {
    pub fn new(config: BridgeConfig) -> Result<(Self, BridgeHandle), TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(BridgeStats::new(unix_now()));
        let api = Arc::new(ApiClient::new(&config, Arc::clone(&stats))?);
        let resolver = Arc::new(IdentityResolver::new(Arc::clone(&api)));
        let staging = Arc::new(Mutex::new(StagingBuffer::default()));
        let ready = Arc::new(Mutex::new(ReadyPayload::default()));
        let default_host = Ustr::from(&config.hostname);

        let flusher = Flusher::new(
            Arc::clone(&staging),
            ready,
            resolver,
            Arc::clone(&api),
            default_host,
        );

        let service = Self {
            config,
            staging,
            flusher,
            api,
            stats,
            rx,
        };

        let handle = BridgeHandle { tx };

        Ok((service, handle))
    }

    pub async fn run(mut self) {
        debug!("Bridge service started");

        // Session warm-up; a failure here only defers auth to the first
        // 401-triggered re-login.
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            if let Err(e) = api.login().await {
                warn!("initial login failed: {e}");
            }
        });

        while let Some(command) = self.rx.recv().await {
            match command {
                BridgeCommand::Flush { timestamp, batch } => {
                    self.staging.lock().expect("lock poisoned").ingest(
                        timestamp,
                        &batch,
                        self.config.flush_interval,
                    );
                    self.stats.record_flush();
                    // Only appends while a pass is in flight; the buffered
                    // data rides along on the next pass.
                    self.flusher.try_start();
                }

                BridgeCommand::Status { response_tx } => {
                    let entries = vec![
                        StatusEntry {
                            category: "bridge",
                            name: "last_flush",
                            value: self.stats.last_flush(),
                        },
                        StatusEntry {
                            category: "bridge",
                            name: "last_exception",
                            value: self.stats.last_exception(),
                        },
                    ];
                    if response_tx.send(entries).is_err() {
                        debug!("Failed to send status response - receiver dropped");
                    }
                }

                BridgeCommand::Shutdown => {
                    debug!("Bridge service shutting down");
                    break;
                }
            }
        }

        debug!("Bridge service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            // Unroutable; these tests never need a live endpoint.
            api_url: "http://127.0.0.1:1".to_string(),
            access_token: "token".to_string(),
            app_id: "42".to_string(),
            flush_interval: Duration::from_secs(60),
            hostname: "WEB1".to_string(),
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_stats_start_at_startup_time() {
        let stats = BridgeStats::new(1234);
        assert_eq!(stats.last_flush(), 1234);
        assert_eq!(stats.last_exception(), 1234);
    }

    #[tokio::test]
    async fn test_status_reports_both_counters() {
        let (service, handle) = BridgeService::new(test_config()).expect("service creation");
        let service_task = tokio::spawn(service.run());

        let entries = handle.status().await.expect("status query");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].category, "bridge");
        assert_eq!(entries[0].name, "last_flush");
        assert_eq!(entries[1].name, "last_exception");

        handle.shutdown().expect("shutdown");
        service_task.await.expect("service task");
    }

    #[tokio::test]
    async fn test_flush_stamps_last_flush() {
        let (service, handle) = BridgeService::new(test_config()).expect("service creation");
        let before = unix_now();
        let service_task = tokio::spawn(service.run());

        handle.flush(1000, Batch::default()).expect("flush");

        let entries = handle.status().await.expect("status query");
        assert!(entries[0].value >= before);

        handle.shutdown().expect("shutdown");
        service_task.await.expect("service task");
    }
}
