//! Amazon Kinesis Data Streams.
//!
//! JSON 1.1 protocol, target prefix `Kinesis_20131202`.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use stratus_core::{CloudResult, ResultExt};

use crate::dispatch::Dispatcher;
use crate::paginator::{paginate, Page};
use crate::params::Params;
use crate::service::KINESIS;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamModeDetails {
    /// `PROVISIONED` or `ON_DEMAND`.
    #[serde(default)]
    pub stream_mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamSummary {
    #[serde(rename = "StreamName")]
    pub name: String,
    #[serde(rename = "StreamARN", default)]
    pub arn: String,
    #[serde(rename = "StreamStatus", default)]
    pub status: String,
    #[serde(default)]
    pub stream_mode_details: StreamModeDetails,
    /// Epoch seconds.
    pub stream_creation_timestamp: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamDescriptionSummary {
    pub stream_name: String,
    #[serde(rename = "StreamARN", default)]
    pub stream_arn: String,
    #[serde(default)]
    pub stream_status: String,
    #[serde(default)]
    pub stream_mode_details: StreamModeDetails,
    #[serde(default)]
    pub retention_period_hours: u32,
    #[serde(default)]
    pub open_shard_count: u32,
    #[serde(default)]
    pub consumer_count: u32,
    /// `NONE` or `KMS`.
    #[serde(default)]
    pub encryption_type: String,
    pub key_id: Option<String>,
    pub stream_creation_timestamp: Option<f64>,
}

impl StreamDescriptionSummary {
    pub fn is_active(&self) -> bool {
        self.stream_status == "ACTIVE"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListStreamsResponse {
    #[serde(default)]
    stream_summaries: Vec<StreamSummary>,
    #[serde(default)]
    has_more_streams: bool,
    next_token: Option<String>,
}

impl Page for ListStreamsResponse {
    type Item = StreamSummary;

    fn into_parts(self) -> (Vec<StreamSummary>, Option<String>) {
        let next = if self.has_more_streams { self.next_token } else { None };
        (self.stream_summaries, next)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStreamSummaryResponse {
    stream_description_summary: StreamDescriptionSummary,
}

pub struct KinesisClient {
    dispatcher: Arc<Dispatcher>,
    region: String,
}

impl KinesisClient {
    pub fn new(dispatcher: Arc<Dispatcher>, region: &str) -> Self {
        Self {
            dispatcher,
            region: region.to_string(),
        }
    }

    pub async fn list_streams(&self) -> CloudResult<Vec<StreamSummary>> {
        let mut params = Params::new();
        paginate::<ListStreamsResponse, _, _>(&mut params, "NextToken", |p| async move {
            let body = match p.get("NextToken") {
                Some(token) => json!({ "NextToken": token }),
                None => json!({ "Limit": 100 }),
            };
            self.dispatcher.json(&KINESIS, &self.region, "ListStreams", &body).await
        })
        .await
        .context("ListStreams")
    }

    pub async fn describe_stream_summary(&self, name: &str) -> CloudResult<StreamDescriptionSummary> {
        let resp: DescribeStreamSummaryResponse = self
            .dispatcher
            .json(&KINESIS, &self.region, "DescribeStreamSummary", &json!({ "StreamName": name }))
            .await
            .with_context(|| format!("DescribeStreamSummary {}", name))?;
        Ok(resp.stream_description_summary)
    }
}
