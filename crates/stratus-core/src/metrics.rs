//! Uniform metric query model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Resource family a metric query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricResourceKind {
    Server,
    Rds,
    Redis,
    Bucket,
    LoadBalancer,
    Kubernetes,
}

impl fmt::Display for MetricResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricResourceKind::Server => "server",
            MetricResourceKind::Rds => "rds",
            MetricResourceKind::Redis => "redis",
            MetricResourceKind::Bucket => "bucket",
            MetricResourceKind::LoadBalancer => "loadbalancer",
            MetricResourceKind::Kubernetes => "kubernetes",
        };
        f.write_str(s)
    }
}

/// Provider-independent metric names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricType {
    CpuUsage,
    MemUsage,
    DiskUsage,
    NetBpsRx,
    NetBpsTx,
    DiskReadIops,
    DiskWriteIops,
    DiskReadBps,
    DiskWriteBps,
    ConnCount,
    CacheHit,
    CacheMiss,
    OpsPerSec,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::CpuUsage => "cpu-usage",
            MetricType::MemUsage => "mem-usage",
            MetricType::DiskUsage => "disk-usage",
            MetricType::NetBpsRx => "net-bps-rx",
            MetricType::NetBpsTx => "net-bps-tx",
            MetricType::DiskReadIops => "disk-read-iops",
            MetricType::DiskWriteIops => "disk-write-iops",
            MetricType::DiskReadBps => "disk-read-bps",
            MetricType::DiskWriteBps => "disk-write-bps",
            MetricType::ConnCount => "conn-count",
            MetricType::CacheHit => "cache-hit",
            MetricType::CacheMiss => "cache-miss",
            MetricType::OpsPerSec => "ops-per-sec",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric query over a closed time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricQuery {
    pub resource_kind: MetricResourceKind,
    pub resource_id: String,
    /// Region hosting the resource; adapters fall back to their default region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_id: Option<String>,
    pub metric_type: MetricType,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MetricQuery {
    pub fn new(
        resource_kind: MetricResourceKind,
        resource_id: &str,
        metric_type: MetricType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            resource_kind,
            resource_id: resource_id.to_string(),
            region_id: None,
            metric_type,
            start,
            end,
        }
    }

    pub fn in_region(mut self, region_id: &str) -> Self {
        self.region_id = Some(region_id.to_string());
        self
    }
}

/// One data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// All data points of one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValues {
    pub resource_id: String,
    pub metric_type: MetricType,
    pub values: Vec<MetricValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_type_names_match_serde() {
        for t in [MetricType::DiskReadIops, MetricType::NetBpsRx, MetricType::CpuUsage] {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn query_region_builder() {
        let now = Utc::now();
        let q = MetricQuery::new(MetricResourceKind::Server, "i-1", MetricType::CpuUsage, now, now)
            .in_region("eu-west-1");
        assert_eq!(q.region_id.as_deref(), Some("eu-west-1"));
    }
}
