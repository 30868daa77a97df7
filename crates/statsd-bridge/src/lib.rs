// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bridge between a StatsD-style collection daemon and a remote monitoring API.
//!
//! The collection daemon hands the bridge one batch of aggregated counters,
//! gauges and timers per flush interval. The bridge stages those batches in a
//! bounded in-memory buffer, resolves local host/metric names to remote-side
//! identifiers (creating them on first use), and drains the buffer into a
//! single data submission per pass. Buffered data survives transient network
//! and auth failures up to a fixed retention cap; at most one drain pass is
//! in flight at any time.

pub mod api;
pub mod buffer;
pub mod config;
pub mod constants;
pub mod errors;
pub mod flusher;
pub mod hostname;
pub mod metric;
pub mod percentile;
pub mod resolver;
pub mod service;
