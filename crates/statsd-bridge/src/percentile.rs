// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Nearest-rank percentile summarization of raw timer samples.

/// Percentile buckets computed from one timer sample population.
///
/// `percentile` carries the second configured percentile alongside the full
/// bucket array; the remote schema expects it next to the sample count.
#[derive(Clone, Debug, PartialEq)]
pub struct TimerSummary {
    pub count: usize,
    pub percentile: f64,
    pub buckets: Vec<f64>,
}

/// Compute percentile buckets over `samples` for each requested percentile.
///
/// Samples are sorted ascending and each bucket is picked by nearest rank
/// (`floor(count * p / 100)`), not interpolated. A percentile of 100 or more
/// maps to the maximum sample; an empty population yields all-zero buckets.
pub fn summarize(samples: &[f64], percentiles: &[f64]) -> TimerSummary {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let count = sorted.len();

    let mut buckets = Vec::with_capacity(percentiles.len());
    for &percentile in percentiles {
        if count == 0 {
            buckets.push(0.0);
        } else if percentile >= 100.0 {
            buckets.push(sorted[count - 1]);
        } else {
            let rank = (count as f64 * percentile / 100.0).floor() as usize;
            buckets.push(sorted[rank]);
        }
    }

    TimerSummary {
        count,
        percentile: percentiles.get(1).copied().unwrap_or(0.0),
        buckets,
    }
}
