// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Percentile ladder applied to every timer sample population at ingestion.
pub const PERCENTILES: [f64; 13] = [
    0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 95.0, 99.0, 100.0,
];

/// Maximum points retained per buffered series; the oldest point is evicted
/// first. Bounds memory under sustained flush failure.
pub const MAX_BUFFERED_POINTS: usize = 10;

/// Maximum ready-to-send fragments retained per metric name.
pub const MAX_READY_FRAGMENTS: usize = 10;

/// Group both servers and metrics are attached to on first creation.
pub const GROUP_NAME: &str = "statsd";

/// Source tag sent with every entity registration.
pub const SOURCE: &str = "statsd";

/// Base path of the remote API, followed by the application id.
pub const API_BASE_PATH: &str = "/api/v1/app";
