// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Authenticated HTTP transport to the remote monitoring API.
//!
//! Every request is a form-urlencoded POST answered with JSON. The session
//! token obtained from `login/` rides along in the `HTTPAuthorization`
//! header; a 401 anywhere triggers a transparent re-login and retry, bounded
//! by [`MAX_AUTH_ATTEMPTS`] with linear backoff. HTTP error statuses other
//! than 409 are counted against `last_exception` but still handed to the
//! caller as data; only connection-level failures surface as errors.

use crate::buffer::Fragment;
use crate::config::BridgeConfig;
use crate::constants::{API_BASE_PATH, GROUP_NAME, SOURCE};
use crate::errors::TransportError;
use crate::metric::DataType;
use crate::service::BridgeStats;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_AUTH_ATTEMPTS: u32 = 3;
const AUTH_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Raw status and parsed JSON body of one API response.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    /// Idempotent-create success: the entity now exists, whether this
    /// request created it or an earlier one did.
    pub fn is_accepted(&self) -> bool {
        self.status == StatusCode::OK || self.is_duplicate()
    }

    /// Duplicate responses come back as a 409 or as a 200 whose body is
    /// typed `DUPLICATE`, depending on the entity.
    pub fn is_duplicate(&self) -> bool {
        self.status == StatusCode::CONFLICT
            || self.body.get("type").and_then(Value::as_str) == Some("DUPLICATE")
    }

    pub fn id(&self) -> Option<u64> {
        self.body.get("id").and_then(Value::as_u64)
    }
}

pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    app_path: String,
    access_token: String,
    session_token: RwLock<Option<String>>,
    stats: Arc<BridgeStats>,
}

impl ApiClient {
    pub fn new(config: &BridgeConfig, stats: Arc<BridgeStats>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(TransportError::ClientBuild)?;
        Ok(ApiClient {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            app_path: format!("{API_BASE_PATH}/{}", config.app_id),
            access_token: config.access_token.clone(),
            session_token: RwLock::new(None),
            stats,
        })
    }

    /// Exchange the access token for a fresh session token. A rejected login
    /// leaves the old token in place; the bounded 401 retry in [`request`]
    /// turns a persistently bad access token into a hard failure.
    ///
    /// [`request`]: ApiClient::request
    pub async fn login(&self) -> Result<(), TransportError> {
        let url = format!("{}{}/login/", self.base_url, self.app_path);
        let response = self
            .client
            .post(url)
            .form(&[("accessToken", self.access_token.as_str())])
            .send()
            .await?;
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        if status == StatusCode::OK {
            if let Some(token) = body.get("token").and_then(Value::as_str) {
                *self.session_token.write().await = Some(token.to_string());
                debug!("obtained fresh session token");
            }
        } else {
            self.stats.record_exception();
            warn!(%status, "login rejected by api");
        }
        Ok(())
    }

    async fn request(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempts = 0;

        loop {
            let mut builder = self.client.post(&url).form(form);
            if let Some(token) = self.session_token.read().await.as_deref() {
                builder = builder.header("HTTPAuthorization", token);
            }
            let response = builder.send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                attempts += 1;
                if attempts >= MAX_AUTH_ATTEMPTS {
                    return Err(TransportError::Unauthorized { attempts });
                }
                debug!(path, attempts, "session expired, re-authenticating");
                sleep(AUTH_RETRY_DELAY * attempts).await;
                self.login().await?;
                continue;
            }

            let body = response.json::<Value>().await.unwrap_or(Value::Null);
            if status.as_u16() >= 400 && status != StatusCode::CONFLICT {
                self.stats.record_exception();
                debug!(path, %status, "error response from api");
            } else {
                debug!(path, %status, "api response");
            }
            return Ok(ApiResponse { status, body });
        }
    }

    pub async fn create_server(&self, name: &str) -> Result<ApiResponse, TransportError> {
        self.request(
            &format!("{}/servers/", self.app_path),
            &[
                ("name", name.to_string()),
                ("description", format!("Server {name}")),
                ("type", "type".to_string()),
                ("source", SOURCE.to_string()),
            ],
        )
        .await
    }

    pub async fn create_server_group(&self) -> Result<ApiResponse, TransportError> {
        self.request(
            &format!("{}/servergroups/", self.app_path),
            &[
                ("name", GROUP_NAME.to_string()),
                ("description", format!("Server group for {GROUP_NAME}")),
                ("type", "type".to_string()),
                ("source", GROUP_NAME.to_string()),
            ],
        )
        .await
    }

    pub async fn attach_server_to_group(
        &self,
        group_id: u64,
        server_id: u64,
    ) -> Result<ApiResponse, TransportError> {
        self.request(
            &format!("{}/servergroups/{group_id}/servers/{server_id}/", self.app_path),
            &[],
        )
        .await
    }

    pub async fn create_metric(
        &self,
        name: &str,
        data_type: DataType,
    ) -> Result<ApiResponse, TransportError> {
        self.request(
            &format!("{}/metrics/", self.app_path),
            &[
                ("name", name.to_string()),
                ("description", name.to_string()),
                ("dataType", data_type.to_string()),
                ("period", "60".to_string()),
                ("unit", String::new()),
                ("subject", "SERVER".to_string()),
                ("source", "StatsD".to_string()),
            ],
        )
        .await
    }

    pub async fn create_metric_group(&self) -> Result<ApiResponse, TransportError> {
        self.request(
            &format!("{}/metricgroups/", self.app_path),
            &[
                ("name", GROUP_NAME.to_string()),
                ("description", format!("Metric group for {GROUP_NAME}")),
                ("type", "type".to_string()),
                ("source", GROUP_NAME.to_string()),
                ("subjectType", "SERVER".to_string()),
            ],
        )
        .await
    }

    pub async fn attach_metric_to_group(
        &self,
        group_id: u64,
        metric_id: u64,
    ) -> Result<ApiResponse, TransportError> {
        self.request(
            &format!("{}/metricgroups/{group_id}/metrics/{metric_id}/", self.app_path),
            &[],
        )
        .await
    }

    /// Submit the flattened fragment list to the data endpoint, rewriting
    /// absolute timestamps to offsets relative to `now` (negative = past).
    pub async fn submit_data(
        &self,
        fragments: &[Fragment],
        now: i64,
    ) -> Result<ApiResponse, TransportError> {
        let payload = encode_payload(fragments, now);
        self.request(
            &format!("{}/data/", self.app_path),
            &[("data", payload.to_string())],
        )
        .await
    }
}

/// Wire shape of the data endpoint: an array of
/// `{m: metricId, s: "s{serverId}", d: [[relativeTimestamp, value], ...]}`.
pub fn encode_payload(fragments: &[Fragment], now: i64) -> Value {
    let entries: Vec<Value> = fragments
        .iter()
        .map(|fragment| {
            let points: Vec<Value> = fragment
                .points
                .iter()
                .map(|(timestamp, value)| json!([timestamp - now, value]))
                .collect();
            json!({
                "m": fragment.metric_id,
                "s": format!("s{}", fragment.server_id),
                "d": points,
            })
        })
        .collect();
    Value::Array(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::PointValue;
    use crate::percentile::TimerSummary;

    #[test]
    fn test_encode_payload_rewrites_timestamps() {
        let fragments = vec![Fragment {
            metric_id: 9,
            server_id: 7,
            points: vec![(1000, PointValue::Scalar(2.0))],
        }];
        let payload = encode_payload(&fragments, 1005);
        assert_eq!(
            payload.to_string(),
            r#"[{"d":[[-5,2.0]],"m":9,"s":"s7"}]"#
        );
    }

    #[test]
    fn test_encode_payload_timer_summary() {
        let fragments = vec![Fragment {
            metric_id: 3,
            server_id: 1,
            points: vec![(
                100,
                PointValue::Summary(TimerSummary {
                    count: 2,
                    percentile: 10.0,
                    buckets: vec![1.0, 2.0],
                }),
            )],
        }];
        let payload = encode_payload(&fragments, 100);
        assert_eq!(
            payload.to_string(),
            r#"[{"d":[[0,[2,10.0,[1.0,2.0]]]],"m":3,"s":"s1"}]"#
        );
    }

    #[test]
    fn test_duplicate_detection() {
        let conflict = ApiResponse {
            status: StatusCode::CONFLICT,
            body: Value::Null,
        };
        assert!(conflict.is_duplicate());
        assert!(conflict.is_accepted());

        let typed = ApiResponse {
            status: StatusCode::OK,
            body: json!({"id": 4, "type": "DUPLICATE"}),
        };
        assert!(typed.is_duplicate());
        assert_eq!(typed.id(), Some(4));

        let fresh = ApiResponse {
            status: StatusCode::OK,
            body: json!({"id": 4}),
        };
        assert!(!fresh.is_duplicate());
        assert!(fresh.is_accepted());

        let rejected = ApiResponse {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: Value::Null,
        };
        assert!(!rejected.is_accepted());
    }
}
