//! AWS ECS (Elastic Container Service) clusters.
//!
//! JSON 1.1 protocol, target prefix `AmazonEC2ContainerServiceV20141113`.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use stratus_core::{CloudResult, ResultExt};

use crate::dispatch::Dispatcher;
use crate::paginator::{paginate, Page};
use crate::params::Params;
use crate::service::ECS;

/// `DescribeClusters` accepts at most this many clusters per call.
const DESCRIBE_BATCH: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcsTag {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub cluster_arn: String,
    pub cluster_name: String,
    /// `ACTIVE`, `PROVISIONING`, `DEPROVISIONING`, `FAILED` or `INACTIVE`.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub registered_container_instances_count: i32,
    #[serde(default)]
    pub running_tasks_count: i32,
    #[serde(default)]
    pub pending_tasks_count: i32,
    #[serde(default)]
    pub active_services_count: i32,
    #[serde(default)]
    pub capacity_providers: Vec<String>,
    #[serde(default)]
    pub tags: Vec<EcsTag>,
}

impl Cluster {
    pub fn is_active(&self) -> bool {
        self.status == "ACTIVE"
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.iter().find(|t| t.key == key).map(|t| t.value.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub arn: Option<String>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListClustersResponse {
    #[serde(default)]
    cluster_arns: Vec<String>,
    next_token: Option<String>,
}

impl Page for ListClustersResponse {
    type Item = String;

    fn into_parts(self) -> (Vec<String>, Option<String>) {
        (self.cluster_arns, self.next_token)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeClustersResponse {
    #[serde(default)]
    clusters: Vec<Cluster>,
    #[serde(default)]
    failures: Vec<Failure>,
}

pub struct EcsClient {
    dispatcher: Arc<Dispatcher>,
    region: String,
}

impl EcsClient {
    pub fn new(dispatcher: Arc<Dispatcher>, region: &str) -> Self {
        Self {
            dispatcher,
            region: region.to_string(),
        }
    }

    /// ARNs of every cluster in the region.
    pub async fn list_clusters(&self) -> CloudResult<Vec<String>> {
        let mut params = Params::new();
        paginate::<ListClustersResponse, _, _>(&mut params, "nextToken", |p| async move {
            let mut body = json!({});
            if let Some(token) = p.get("nextToken") {
                body["nextToken"] = json!(token);
            }
            self.dispatcher.json(&ECS, &self.region, "ListClusters", &body).await
        })
        .await
        .context("ListClusters")
    }

    /// Clusters with statistics and tags. Unknown ARNs are logged and skipped.
    pub async fn describe_clusters<S: AsRef<str>>(&self, arns: &[S]) -> CloudResult<Vec<Cluster>> {
        let mut clusters = Vec::new();
        for chunk in arns.chunks(DESCRIBE_BATCH) {
            let names: Vec<&str> = chunk.iter().map(AsRef::as_ref).collect();
            let body = json!({ "clusters": names, "include": ["STATISTICS", "TAGS"] });
            let resp: DescribeClustersResponse = self
                .dispatcher
                .json(&ECS, &self.region, "DescribeClusters", &body)
                .await
                .context("DescribeClusters")?;
            for failure in &resp.failures {
                log::warn!(
                    "describe ecs cluster {}: {}",
                    failure.arn.as_deref().unwrap_or_default(),
                    failure.reason
                );
            }
            clusters.extend(resp.clusters);
        }
        Ok(clusters)
    }

    pub async fn get_clusters(&self) -> CloudResult<Vec<Cluster>> {
        let arns = self.list_clusters().await?;
        if arns.is_empty() {
            return Ok(Vec::new());
        }
        self.describe_clusters(&arns).await
    }
}
