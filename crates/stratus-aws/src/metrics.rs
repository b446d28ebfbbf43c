//! Uniform metric queries answered from CloudWatch.
//!
//! Each resource kind owns a namespace, the dimension that binds the
//! resource id, and a table from [`MetricType`] to provider metric names.
//! A table entry may carry a `key:value` tag after the metric name
//! (`EBSReadOps:disk_type:disk_type`); the tag is attached to every value
//! read from that metric.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use std::collections::BTreeMap;
use stratus_core::{CloudError, CloudResult, MetricQuery, MetricResourceKind, MetricType, MetricValue, MetricValues};

use crate::cloudwatch::{CloudWatchClient, Datapoint, Dimension, Statistic};

/// Statistics period, in seconds.
const PERIOD: u32 = 1;

struct ResourceTable {
    namespace: &'static str,
    dimension: &'static str,
    metrics: &'static [(MetricType, &'static [&'static str])],
}

const SERVER: ResourceTable = ResourceTable {
    namespace: "AWS/EC2",
    dimension: "InstanceId",
    metrics: &[
        (MetricType::CpuUsage, &["CPUUtilization"]),
        (MetricType::NetBpsRx, &["NetworkIn"]),
        (MetricType::NetBpsTx, &["NetworkOut"]),
        (MetricType::DiskReadIops, &["DiskReadOps", "EBSReadOps:disk_type:disk_type"]),
        (MetricType::DiskWriteIops, &["DiskWriteOps", "EBSWriteOps:disk_type:disk_type"]),
        (MetricType::DiskReadBps, &["DiskReadBytes", "EBSReadBytes:disk_type:disk_type"]),
        (MetricType::DiskWriteBps, &["DiskWriteBytes", "EBSWriteBytes:disk_type:disk_type"]),
    ],
};

const RDS: ResourceTable = ResourceTable {
    namespace: "AWS/RDS",
    dimension: "DBInstanceIdentifier",
    metrics: &[
        (MetricType::CpuUsage, &["CPUUtilization"]),
        (MetricType::ConnCount, &["DatabaseConnections"]),
        (MetricType::NetBpsRx, &["NetworkReceiveThroughput"]),
        (MetricType::NetBpsTx, &["NetworkTransmitThroughput"]),
        (MetricType::DiskReadIops, &["ReadIOPS"]),
        (MetricType::DiskWriteIops, &["WriteIOPS"]),
        (MetricType::DiskReadBps, &["ReadThroughput"]),
        (MetricType::DiskWriteBps, &["WriteThroughput"]),
    ],
};

const REDIS: ResourceTable = ResourceTable {
    namespace: "AWS/ElastiCache",
    dimension: "CacheClusterId",
    metrics: &[
        (MetricType::CpuUsage, &["CPUUtilization"]),
        (MetricType::MemUsage, &["DatabaseMemoryUsagePercentage"]),
        (MetricType::ConnCount, &["CurrConnections"]),
        (MetricType::CacheHit, &["CacheHits"]),
        (MetricType::CacheMiss, &["CacheMisses"]),
        (MetricType::NetBpsRx, &["NetworkBytesIn"]),
        (MetricType::NetBpsTx, &["NetworkBytesOut"]),
    ],
};

fn table(kind: MetricResourceKind) -> Option<&'static ResourceTable> {
    match kind {
        MetricResourceKind::Server => Some(&SERVER),
        MetricResourceKind::Rds => Some(&RDS),
        MetricResourceKind::Redis => Some(&REDIS),
        _ => None,
    }
}

/// `Name` or `Name:key:value` → (metric name, tags).
fn parse_descriptor(descriptor: &str) -> (&str, BTreeMap<String, String>) {
    let mut parts = descriptor.splitn(3, ':');
    let name = parts.next().unwrap_or(descriptor);
    let mut tags = BTreeMap::new();
    if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
        tags.insert(key.to_string(), value.to_string());
    }
    (name, tags)
}

/// Only one of average, minimum and sum is populated per statistic family.
fn point_value(point: &Datapoint) -> f64 {
    point.average.unwrap_or_default() + point.minimum.unwrap_or_default() + point.sum.unwrap_or_default()
}

pub struct MetricsClient {
    cloudwatch: CloudWatchClient,
}

impl MetricsClient {
    pub fn new(cloudwatch: CloudWatchClient) -> Self {
        Self { cloudwatch }
    }

    /// Values of `query`, one provider metric per table entry, fetched concurrently.
    pub async fn get_metrics(&self, query: &MetricQuery) -> CloudResult<MetricValues> {
        let table = table(query.resource_kind).ok_or_else(|| {
            CloudError::NotImplemented(format!("metrics for resource kind {}", query.resource_kind))
        })?;
        let descriptors = table
            .metrics
            .iter()
            .find(|(t, _)| *t == query.metric_type)
            .map(|(_, names)| *names)
            .ok_or_else(|| {
                CloudError::NotSupported(format!("{} metric {}", query.resource_kind, query.metric_type))
            })?;

        let dimensions = [Dimension::new(table.dimension, &query.resource_id)];
        let fetches = descriptors.iter().map(|descriptor| {
            let dimensions = &dimensions;
            async move {
                let (name, tags) = parse_descriptor(descriptor);
                self.fetch(table.namespace, name, query.start, query.end, dimensions, tags)
                    .await
            }
        });
        let batches = try_join_all(fetches).await?;

        Ok(MetricValues {
            resource_id: query.resource_id.clone(),
            metric_type: query.metric_type,
            values: batches.into_iter().flatten().collect(),
        })
    }

    async fn fetch(
        &self,
        namespace: &str,
        metric_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        dimensions: &[Dimension],
        tags: BTreeMap<String, String>,
    ) -> CloudResult<Vec<MetricValue>> {
        let points = self
            .cloudwatch
            .get_metric_statistics(namespace, metric_name, start, end, PERIOD, &[Statistic::Average], dimensions)
            .await?;
        points
            .iter()
            .map(|p| {
                Ok(MetricValue {
                    timestamp: p.timestamp()?,
                    value: point_value(p),
                    tags: tags.clone(),
                })
            })
            .collect()
    }
}
