// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sequential drain of the staging buffer into a single data submission.
//!
//! A pass takes one key at a time out of staging, resolves its server and
//! metric ids (strictly in that order, one key's full round trip before the
//! next; the remote create-or-reuse endpoints are not safe under concurrent
//! duplicate creation), and accumulates the resolved fragments in the ready
//! payload. A key the API rejects is set aside and retried next pass without
//! blocking the keys behind it; only a transport failure ends the pass early.
//! Once every kind is exhausted, all fragments go out in one POST.
//! The pass-in-flight invariant is the ownership of a semaphore permit: the
//! permit lives exactly as long as the pass task, including every abort path.

use crate::api::ApiClient;
use crate::buffer::{DrainItem, Fragment, ReadyPayload, StagingBuffer};
use crate::errors::ResolveError;
use crate::metric::MetricKey;
use crate::resolver::IdentityResolver;
use crate::service::unix_now;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, error, warn};
use ustr::Ustr;

#[derive(Clone)]
pub struct Flusher {
    staging: Arc<Mutex<StagingBuffer>>,
    ready: Arc<Mutex<ReadyPayload>>,
    resolver: Arc<IdentityResolver>,
    api: Arc<ApiClient>,
    default_host: Ustr,
    gate: Arc<Semaphore>,
}

#[allow(clippy::expect_used)]
impl Flusher {
    pub fn new(
        staging: Arc<Mutex<StagingBuffer>>,
        ready: Arc<Mutex<ReadyPayload>>,
        resolver: Arc<IdentityResolver>,
        api: Arc<ApiClient>,
        default_host: Ustr,
    ) -> Self {
        Flusher {
            staging,
            ready,
            resolver,
            api,
            default_host,
            gate: Arc::new(Semaphore::new(1)),
        }
    }

    /// Start a drain pass on a background task unless one is already in
    /// flight. Returns whether a pass was started.
    pub fn try_start(&self) -> bool {
        match Arc::clone(&self.gate).try_acquire_owned() {
            Ok(permit) => {
                let flusher = self.clone();
                tokio::spawn(async move { flusher.run_pass(permit).await });
                true
            }
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => false,
        }
    }

    /// Whether a drain pass is currently executing.
    pub fn in_flight(&self) -> bool {
        self.gate.available_permits() == 0
    }

    async fn run_pass(&self, _permit: OwnedSemaphorePermit) {
        // Failed keys are held out until the pass is done draining, so
        // take_next cannot hand the same key back within this pass.
        let mut failed: Vec<DrainItem> = Vec::new();
        loop {
            let item = self.staging.lock().expect("lock poisoned").take_next();
            let Some(item) = item else { break };

            match self.resolve(&item).await {
                Ok((metric_name, server_id, metric_id)) => {
                    let fragment = Fragment {
                        metric_id,
                        server_id,
                        points: item.points,
                    };
                    self.ready
                        .lock()
                        .expect("lock poisoned")
                        .push(metric_name, fragment);
                }
                Err(e @ ResolveError::Transport(_)) => {
                    // The API is unreachable; later keys would fail the same
                    // way, so end the pass and keep everything buffered.
                    warn!(key = %item.key, "identity resolution failed: {e}");
                    failed.push(item);
                    break;
                }
                Err(e) => {
                    // Rejection is specific to this key. Retry it next pass
                    // and keep draining the keys behind it.
                    warn!(key = %item.key, "identity resolution failed, skipping key: {e}");
                    failed.push(item);
                }
            }
        }

        if !failed.is_empty() {
            let mut staging = self.staging.lock().expect("lock poisoned");
            for item in failed {
                staging.restore(item.kind, item.key, item.points);
            }
        }

        let fragments = self.ready.lock().expect("lock poisoned").drain_all();
        if fragments.is_empty() {
            return;
        }

        match self.api.submit_data(&fragments, unix_now()).await {
            Ok(response) => {
                debug!(status = %response.status, count = fragments.len(), "submitted data");
            }
            Err(e) => {
                // Bounded-loss policy: fragments from this attempt are gone,
                // but everything still staged survives for the next pass.
                error!(count = fragments.len(), "data submission failed, dropping fragments: {e}");
            }
        }
    }

    /// Server id first, metric id second; the ordering keeps group creation
    /// and attachment consistent on the remote side.
    async fn resolve(&self, item: &DrainItem) -> Result<(Ustr, u64, u64), ResolveError> {
        let key = MetricKey::parse(&item.key);
        let host = key.host_or(self.default_host);
        let server_id = self.resolver.resolve_server(host).await?;
        let metric_id = self
            .resolver
            .resolve_metric(key.name, item.kind.data_type())
            .await?;
        Ok((key.name, server_id, metric_id))
    }
}
