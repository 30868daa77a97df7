// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Default host name detection for keys without a host segment.

use std::env;
use tracing::warn;

/// Get the default host name, uppercased.
///
/// Tries, in order: the `HOSTNAME` environment variable (commonly set in
/// containers), the system hostname via `nix::unistd::gethostname()`, and
/// finally the literal `"UNKNOWN"`.
#[must_use]
pub fn default_hostname() -> String {
    if let Ok(hostname) = env::var("HOSTNAME") {
        if !hostname.is_empty() {
            return hostname.to_uppercase();
        }
    }

    match nix::unistd::gethostname() {
        Ok(hostname_osstr) => {
            if let Some(hostname_str) = hostname_osstr.to_str() {
                if !hostname_str.is_empty() {
                    return hostname_str.to_uppercase();
                }
            }
        }
        Err(e) => {
            warn!("Failed to get system hostname: {}", e);
        }
    }

    warn!("Could not determine hostname, using 'UNKNOWN'");
    "UNKNOWN".to_string()
}
