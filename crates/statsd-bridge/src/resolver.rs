// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lazily-populated mapping from local names to remote identifiers.
//!
//! Servers and metrics are created on first use; both "created" and
//! "already exists" responses resolve the id. Once resolved, an id is cached
//! for the process lifetime and never invalidated. Group membership is a
//! best-effort side effect of fresh creation only: its failure is logged and
//! never affects the resolved id.

use crate::api::ApiClient;
use crate::errors::ResolveError;
use crate::metric::{DataType, FnvHashMap};
use std::sync::{Arc, Mutex};
use tracing::debug;
use ustr::Ustr;

pub struct IdentityResolver {
    api: Arc<ApiClient>,
    servers: Mutex<FnvHashMap<Ustr, u64>>,
    metrics: Mutex<FnvHashMap<Ustr, u64>>,
}

#[allow(clippy::expect_used)]
impl IdentityResolver {
    pub fn new(api: Arc<ApiClient>) -> Self {
        IdentityResolver {
            api,
            servers: Mutex::new(FnvHashMap::default()),
            metrics: Mutex::new(FnvHashMap::default()),
        }
    }

    /// Resolve a host name to its remote server id, registering the server
    /// on first use. A cached name resolves without touching the network.
    pub async fn resolve_server(&self, host: Ustr) -> Result<u64, ResolveError> {
        if let Some(id) = self.servers.lock().expect("lock poisoned").get(&host) {
            return Ok(*id);
        }

        let response = self.api.create_server(&host).await?;
        if !response.is_accepted() {
            return Err(ResolveError::Rejected {
                entity: "server",
                name: host.to_string(),
                status: response.status.as_u16(),
            });
        }
        let id = response.id().ok_or_else(|| ResolveError::MissingId {
            entity: "server",
            name: host.to_string(),
        })?;

        if !response.is_duplicate() {
            let api = Arc::clone(&self.api);
            tokio::spawn(async move {
                if let Err(e) = attach_server_to_default_group(&api, id).await {
                    debug!(server_id = id, "server group membership skipped: {e}");
                }
            });
        }

        self.servers.lock().expect("lock poisoned").insert(host, id);
        Ok(id)
    }

    /// Resolve a metric name to its remote metric id, registering the metric
    /// with the given data type on first use.
    pub async fn resolve_metric(
        &self,
        name: Ustr,
        data_type: DataType,
    ) -> Result<u64, ResolveError> {
        if let Some(id) = self.metrics.lock().expect("lock poisoned").get(&name) {
            return Ok(*id);
        }

        let response = self.api.create_metric(&name, data_type).await?;
        if !response.is_accepted() {
            return Err(ResolveError::Rejected {
                entity: "metric",
                name: name.to_string(),
                status: response.status.as_u16(),
            });
        }
        let id = response.id().ok_or_else(|| ResolveError::MissingId {
            entity: "metric",
            name: name.to_string(),
        })?;

        if !response.is_duplicate() {
            let api = Arc::clone(&self.api);
            tokio::spawn(async move {
                if let Err(e) = attach_metric_to_default_group(&api, id).await {
                    debug!(metric_id = id, "metric group membership skipped: {e}");
                }
            });
        }

        self.metrics.lock().expect("lock poisoned").insert(name, id);
        Ok(id)
    }
}

async fn attach_server_to_default_group(
    api: &ApiClient,
    server_id: u64,
) -> Result<(), crate::errors::TransportError> {
    let response = api.create_server_group().await?;
    if response.is_accepted() {
        if let Some(group_id) = response.id() {
            api.attach_server_to_group(group_id, server_id).await?;
        }
    }
    Ok(())
}

async fn attach_metric_to_default_group(
    api: &ApiClient,
    metric_id: u64,
) -> Result<(), crate::errors::TransportError> {
    let response = api.create_metric_group().await?;
    if response.is_accepted() {
        if let Some(group_id) = response.id() {
            api.attach_metric_to_group(group_id, metric_id).await?;
        }
    }
    Ok(())
}
