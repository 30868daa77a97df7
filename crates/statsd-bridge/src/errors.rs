// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Fatal startup conditions. Everything else in the bridge degrades
/// gracefully; a bad configuration aborts initialization.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing access token: set BRIDGE_ACCESS_TOKEN")]
    MissingAccessToken,

    #[error("missing application id: set BRIDGE_APP_ID")]
    MissingAppId,

    #[error("api url must start with http:// or https://, got '{0}'")]
    InvalidApiUrl(String),

    #[error("flush interval must be greater than zero")]
    ZeroFlushInterval,

    #[error("invalid log level '{0}'. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

/// Failures at the network boundary. HTTP error statuses are not transport
/// errors; they are returned to callers as data alongside the parsed body.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to build http client: {0}")]
    ClientBuild(reqwest::Error),

    #[error("failed to reach api: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("authentication failed after {attempts} attempts")]
    Unauthorized { attempts: u32 },
}

/// Failure to obtain a remote identifier for a local name. The owning key
/// stays in the staging buffer and is retried on the next drain pass.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{entity} '{name}' was rejected by the api (status {status})")]
    Rejected {
        entity: &'static str,
        name: String,
        status: u16,
    },

    #[error("api response for {entity} '{name}' did not contain an id")]
    MissingId { entity: &'static str, name: String },
}
