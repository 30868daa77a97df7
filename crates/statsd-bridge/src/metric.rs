// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Core data model: metric kinds, keys, batches and buffered point values.

use crate::percentile::TimerSummary;
use serde::ser::{Serialize, SerializeSeq, Serializer};
use ustr::Ustr;

pub type FnvHashMap<K, V> = hashbrown::HashMap<K, V, fnv::FnvBuildHasher>;

/// The three metric kinds delivered by the collection daemon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub enum MetricKind {
    #[display("counter")]
    Counter,
    #[display("gauge")]
    Gauge,
    #[display("timer")]
    Timer,
}

impl MetricKind {
    /// Remote-side data type for metrics of this kind.
    pub fn data_type(self) -> DataType {
        match self {
            MetricKind::Timer => DataType::Histogram,
            _ => DataType::Double,
        }
    }
}

/// Data type field of the remote metric-registration endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
pub enum DataType {
    #[display("DOUBLE")]
    Double,
    #[display("HISTOGRAM")]
    Histogram,
}

/// One flush interval's worth of aggregated metrics, keyed by the raw
/// dotted key as produced by the daemon.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub counters: FnvHashMap<String, f64>,
    pub gauges: FnvHashMap<String, f64>,
    pub timers: FnvHashMap<String, Vec<f64>>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.gauges.is_empty() && self.timers.is_empty()
    }
}

/// A raw key split into its optional host segment and metric name.
///
/// Only the exactly-two-segment form `"host1.cpu"` carries a host. A key
/// with no dot is all metric name, and a key with two or more dots keeps
/// just its first segment as the metric name, host unset. Keys with empty
/// segments are kept whole rather than producing empty names. A key without
/// a host segment falls back to the process-wide default host name at drain
/// time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetricKey {
    pub host: Option<Ustr>,
    pub name: Ustr,
}

impl MetricKey {
    pub fn parse(raw: &str) -> Self {
        let mut segments = raw.split('.');
        match (segments.next(), segments.next(), segments.next()) {
            (Some(host), Some(name), None) if !host.is_empty() && !name.is_empty() => MetricKey {
                host: Some(Ustr::from(host)),
                name: Ustr::from(name),
            },
            (Some(first), Some(_), Some(_)) if !first.is_empty() => MetricKey {
                host: None,
                name: Ustr::from(first),
            },
            _ => MetricKey {
                host: None,
                name: Ustr::from(raw),
            },
        }
    }

    pub fn host_or(&self, default: Ustr) -> Ustr {
        self.host.unwrap_or(default)
    }
}

/// Value of one buffered point. Counters and gauges buffer a scalar; timers
/// buffer the percentile summary computed at ingestion, never raw samples.
#[derive(Clone, Debug, PartialEq)]
pub enum PointValue {
    Scalar(f64),
    Summary(TimerSummary),
}

impl Serialize for PointValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PointValue::Scalar(value) => serializer.serialize_f64(*value),
            PointValue::Summary(summary) => summary.serialize(serializer),
        }
    }
}

/// `(unix timestamp seconds, value)` pair as held by a buffered series.
pub type Point = (i64, PointValue);

impl Serialize for TimerSummary {
    // Wire shape: [count, percentile, [buckets...]]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&self.count)?;
        seq.serialize_element(&self.percentile)?;
        seq.serialize_element(&self.buckets)?;
        seq.end()
    }
}
