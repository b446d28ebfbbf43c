//! Amazon CloudWatch metric statistics.
//!
//! Query protocol, API version 2010-08-01, endpoint prefix `monitoring`.
//!
//! Reference: <https://docs.aws.amazon.com/AmazonCloudWatch/latest/APIReference/>

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use stratus_core::{CloudError, CloudResult, ResultExt};

use crate::dispatch::Dispatcher;
use crate::params::Params;
use crate::service::CLOUDWATCH;
use crate::xml::MemberList;

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Statistic {
    SampleCount,
    Average,
    Sum,
    Minimum,
    Maximum,
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SampleCount => write!(f, "SampleCount"),
            Self::Average => write!(f, "Average"),
            Self::Sum => write!(f, "Sum"),
            Self::Minimum => write!(f, "Minimum"),
            Self::Maximum => write!(f, "Maximum"),
        }
    }
}

/// One statistics bucket. Only the requested statistics are populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Datapoint {
    pub timestamp: String,
    pub sample_count: Option<f64>,
    pub average: Option<f64>,
    pub sum: Option<f64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub unit: Option<String>,
}

impl Datapoint {
    pub fn timestamp(&self) -> CloudResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| CloudError::Codec(format!("datapoint timestamp {:?}: {}", self.timestamp, e)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetMetricStatisticsResult {
    #[serde(default)]
    label: String,
    #[serde(default)]
    datapoints: MemberList<Datapoint>,
}

/// ISO 8601 in UTC, as the Query protocol expects timestamps.
fn timestamp_param(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ── CloudWatch Client ───────────────────────────────────────────────────

pub struct CloudWatchClient {
    dispatcher: Arc<Dispatcher>,
    region: String,
}

impl CloudWatchClient {
    pub fn new(dispatcher: Arc<Dispatcher>, region: &str) -> Self {
        Self {
            dispatcher,
            region: region.to_string(),
        }
    }

    /// Statistics of one metric over `[start, end]`, bucketed by `period` seconds.
    #[allow(clippy::too_many_arguments)]
    pub async fn get_metric_statistics(
        &self,
        namespace: &str,
        metric_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period: u32,
        statistics: &[Statistic],
        dimensions: &[Dimension],
    ) -> CloudResult<Vec<Datapoint>> {
        let mut params = Params::new();
        params
            .set("Namespace", namespace)
            .set("MetricName", metric_name)
            .set("StartTime", timestamp_param(&start))
            .set("EndTime", timestamp_param(&end))
            .set("Period", period.to_string());
        let stats: Vec<String> = statistics.iter().map(Statistic::to_string).collect();
        params.members("Statistics.member", &stats);
        for (i, dim) in dimensions.iter().enumerate() {
            params.set(format!("Dimensions.member.{}.Name", i + 1), dim.name.as_str());
            params.set(format!("Dimensions.member.{}.Value", i + 1), dim.value.as_str());
        }
        let result: GetMetricStatisticsResult = self
            .dispatcher
            .query(&CLOUDWATCH, &self.region, "GetMetricStatistics", &params)
            .await
            .with_context(|| format!("GetMetricStatistics {}/{}", namespace, metric_name))?;
        log::debug!(
            "metric {} ({}): {} datapoints",
            metric_name,
            result.label,
            result.datapoints.member.len()
        );
        Ok(result.datapoints.member)
    }
}
