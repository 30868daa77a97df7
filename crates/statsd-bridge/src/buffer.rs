// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded staging for unflushed points and resolved payload fragments.
//!
//! Incoming batches accumulate in a [`StagingBuffer`] until a drain pass
//! moves them, key by key, into a [`ReadyPayload`] of fully-resolved
//! fragments. Both stages cap retention at a fixed depth per entry and evict
//! oldest-first, so sustained flush failure costs bounded memory and the
//! oldest data, never the process.

use crate::constants::{MAX_BUFFERED_POINTS, MAX_READY_FRAGMENTS, PERCENTILES};
use crate::metric::{Batch, FnvHashMap, MetricKind, Point, PointValue};
use crate::percentile::summarize;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;
use ustr::Ustr;

/// One metric kind's worth of data pulled out of the staging buffer.
#[derive(Debug)]
pub struct DrainItem {
    pub kind: MetricKind,
    pub key: String,
    pub points: Vec<Point>,
}

/// Unflushed `(timestamp, value)` points, grouped by metric kind and then by
/// raw key. Mutated only by ingestion (append) and the drain pass (remove).
#[derive(Debug, Default)]
pub struct StagingBuffer {
    kinds: FnvHashMap<MetricKind, FnvHashMap<String, VecDeque<Point>>>,
}

impl StagingBuffer {
    /// Absorb one batch. Counters are normalized to per-second rates against
    /// the flush interval; gauges are stored as-is; timer sample populations
    /// are summarized into percentile buckets and never buffered raw.
    pub fn ingest(&mut self, timestamp: i64, batch: &Batch, flush_interval: Duration) {
        let interval_secs = flush_interval.as_secs_f64();

        for (key, value) in &batch.counters {
            let rate = value / interval_secs;
            self.push(MetricKind::Counter, key, (timestamp, PointValue::Scalar(rate)));
        }

        for (key, value) in &batch.gauges {
            self.push(MetricKind::Gauge, key, (timestamp, PointValue::Scalar(*value)));
        }

        for (key, samples) in &batch.timers {
            let summary = summarize(samples, &PERCENTILES);
            self.push(MetricKind::Timer, key, (timestamp, PointValue::Summary(summary)));
        }
    }

    fn push(&mut self, kind: MetricKind, key: &str, point: Point) {
        let series = self
            .kinds
            .entry(kind)
            .or_default()
            .entry_ref(key)
            .or_default();
        series.push_back(point);
        if series.len() > MAX_BUFFERED_POINTS {
            series.pop_front();
            debug!(%kind, key, "buffered series full, dropping oldest point");
        }
    }

    /// Remove and return the next key's entire point list, in arbitrary kind
    /// and key order. Kind entries are deleted once exhausted. Returns `None`
    /// when the buffer is empty.
    pub fn take_next(&mut self) -> Option<DrainItem> {
        loop {
            let kind = *self.kinds.keys().next()?;
            let Some(series) = self.kinds.get_mut(&kind) else {
                return None;
            };
            match series.keys().next().cloned() {
                Some(key) => {
                    let points = series.remove(&key).map(Vec::from)?;
                    if series.is_empty() {
                        self.kinds.remove(&kind);
                    }
                    return Some(DrainItem { kind, key, points });
                }
                None => {
                    self.kinds.remove(&kind);
                }
            }
        }
    }

    /// Put a drained key back, in front of anything ingested for the same
    /// key in the meantime. Used when identity resolution fails so the key
    /// is retried on the next pass. The retention cap still applies.
    pub fn restore(&mut self, kind: MetricKind, key: String, points: Vec<Point>) {
        let series = self.kinds.entry(kind).or_default().entry(key).or_default();
        for point in points.into_iter().rev() {
            series.push_front(point);
        }
        while series.len() > MAX_BUFFERED_POINTS {
            series.pop_front();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn is_kind_empty(&self, kind: MetricKind) -> bool {
        self.kinds.get(&kind).map_or(true, FnvHashMap::is_empty)
    }

    /// Points currently buffered for one raw key, oldest first.
    pub fn points(&self, kind: MetricKind, key: &str) -> Option<&VecDeque<Point>> {
        self.kinds.get(&kind)?.get(key)
    }
}

/// One fully-resolved slice of a series, ready for the data endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub metric_id: u64,
    pub server_id: u64,
    pub points: Vec<Point>,
}

/// Resolved fragments awaiting the single send at the end of a drain pass,
/// grouped by metric name with the same oldest-first eviction as staging.
#[derive(Debug, Default)]
pub struct ReadyPayload {
    fragments: FnvHashMap<Ustr, VecDeque<Fragment>>,
}

impl ReadyPayload {
    pub fn push(&mut self, metric_name: Ustr, fragment: Fragment) {
        let slot = self.fragments.entry(metric_name).or_default();
        slot.push_back(fragment);
        if slot.len() > MAX_READY_FRAGMENTS {
            slot.pop_front();
            debug!(metric = %metric_name, "ready payload full, dropping oldest fragment");
        }
    }

    /// Flatten all fragments into one list, clearing the payload.
    pub fn drain_all(&mut self) -> Vec<Fragment> {
        self.fragments
            .drain()
            .flat_map(|(_, fragments)| fragments)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use ustr::ustr;

    fn batch_with_counter(key: &str, value: f64) -> Batch {
        let mut batch = Batch::default();
        batch.counters.insert(key.to_string(), value);
        batch
    }

    #[test]
    fn test_counter_rate_normalization() {
        let mut staging = StagingBuffer::default();
        let batch = batch_with_counter("web1.requests", 120.0);
        staging.ingest(1000, &batch, Duration::from_millis(60_000));

        let points = staging
            .points(MetricKind::Counter, "web1.requests")
            .expect("series should exist");
        assert_eq!(points.len(), 1);
        assert_eq!(points[0], (1000, PointValue::Scalar(2.0)));
    }

    #[test]
    fn test_gauge_stored_as_is() {
        let mut staging = StagingBuffer::default();
        let mut batch = Batch::default();
        batch.gauges.insert("mem".to_string(), 512.0);
        staging.ingest(1000, &batch, Duration::from_secs(60));

        let points = staging
            .points(MetricKind::Gauge, "mem")
            .expect("series should exist");
        assert_eq!(points[0], (1000, PointValue::Scalar(512.0)));
    }

    #[test]
    fn test_timers_buffer_summaries_not_samples() {
        let mut staging = StagingBuffer::default();
        let mut batch = Batch::default();
        batch
            .timers
            .insert("web1.latency".to_string(), vec![5.0, 1.0, 3.0]);
        staging.ingest(1000, &batch, Duration::from_secs(60));

        let points = staging
            .points(MetricKind::Timer, "web1.latency")
            .expect("series should exist");
        match &points[0].1 {
            PointValue::Summary(summary) => {
                assert_eq!(summary.count, 3);
                assert_eq!(summary.buckets.len(), PERCENTILES.len());
            }
            other => panic!("expected summary, got {other:?}"),
        }
    }

    #[test]
    fn test_take_next_drains_everything() {
        let mut staging = StagingBuffer::default();
        let mut batch = Batch::default();
        batch.counters.insert("a".to_string(), 60.0);
        batch.gauges.insert("b".to_string(), 1.0);
        batch.timers.insert("c".to_string(), vec![1.0]);
        staging.ingest(1000, &batch, Duration::from_secs(60));

        let mut drained = 0;
        while staging.take_next().is_some() {
            drained += 1;
        }
        assert_eq!(drained, 3);
        assert!(staging.is_empty());
        assert!(staging.is_kind_empty(MetricKind::Counter));
    }

    #[test]
    fn test_restore_puts_points_before_newer_ones() {
        let mut staging = StagingBuffer::default();
        staging.ingest(1000, &batch_with_counter("a", 60.0), Duration::from_secs(60));
        let item = staging.take_next().expect("one item");

        // A new interval ticks while the old points are out for resolution.
        staging.ingest(1060, &batch_with_counter("a", 120.0), Duration::from_secs(60));
        staging.restore(item.kind, item.key, item.points);

        let points = staging
            .points(MetricKind::Counter, "a")
            .expect("series should exist");
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].0, 1000);
        assert_eq!(points[1].0, 1060);
    }

    #[test]
    fn test_ready_payload_cap() {
        let mut ready = ReadyPayload::default();
        for i in 0..12u64 {
            ready.push(
                ustr("cpu"),
                Fragment {
                    metric_id: i,
                    server_id: 1,
                    points: vec![],
                },
            );
        }
        let fragments = ready.drain_all();
        assert_eq!(fragments.len(), MAX_READY_FRAGMENTS);
        // Oldest two were evicted.
        assert_eq!(fragments[0].metric_id, 2);
        assert!(ready.is_empty());
    }

    proptest! {
        #[test]
        fn prop_series_never_exceeds_cap(count in 11usize..40) {
            let mut staging = StagingBuffer::default();
            for i in 0..count {
                let batch = batch_with_counter("web1.requests", i as f64);
                staging.ingest(i as i64, &batch, Duration::from_secs(1));
            }

            let points = staging
                .points(MetricKind::Counter, "web1.requests")
                .expect("series should exist");
            prop_assert_eq!(points.len(), MAX_BUFFERED_POINTS);
            // The ten most recent points, in arrival order.
            for (offset, point) in points.iter().enumerate() {
                prop_assert_eq!(point.0, (count - MAX_BUFFERED_POINTS + offset) as i64);
            }
        }
    }
}
