//! Amazon ElastiCache service client.
//!
//! Query protocol, API version 2015-02-02. Redis deployments are modelled as
//! replication groups; the member cache clusters carry engine version,
//! maintenance window and security groups.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use stratus_core::{CloudError, CloudResult, ResultExt};

use crate::dispatch::Dispatcher;
use crate::paginator::{exactly_one, paginate, Page};
use crate::params::Params;
use crate::service::ELASTICACHE;
use crate::tags::{ArnTagger, TagSet};
use crate::xml::MemberList;

pub const CACHE_STATUS_DEPLOYING: &str = "deploying";
pub const CACHE_STATUS_RUNNING: &str = "running";
pub const CACHE_STATUS_CHANGING: &str = "changing";
pub const CACHE_STATUS_DELETING: &str = "deleting";
pub const CACHE_STATUS_CREATE_FAILED: &str = "create_failed";
pub const CACHE_STATUS_SNAPSHOTTING: &str = "snapshotting";

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CacheEndpoint {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeGroupMember {
    pub cache_cluster_id: String,
    pub cache_node_id: Option<String>,
    pub current_role: Option<String>,
    pub preferred_availability_zone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NodeGroupMembers {
    #[serde(rename = "NodeGroupMember", default)]
    member: Vec<NodeGroupMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeGroup {
    pub node_group_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub primary_endpoint: CacheEndpoint,
    #[serde(rename = "ReaderEndpoint", alias = "ReadEndpoint", default)]
    pub reader_endpoint: CacheEndpoint,
    #[serde(default)]
    node_group_members: NodeGroupMembers,
}

impl NodeGroup {
    pub fn members(&self) -> &[NodeGroupMember] {
        &self.node_group_members.member
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NodeGroups {
    #[serde(rename = "NodeGroup", default)]
    group: Vec<NodeGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MemberClusters {
    #[serde(rename = "ClusterId", default)]
    cluster_id: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReplicationGroup {
    pub replication_group_id: String,
    #[serde(rename = "ARN", default)]
    pub arn: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub cache_node_type: String,
    #[serde(default)]
    pub cluster_enabled: bool,
    #[serde(default)]
    pub configuration_endpoint: CacheEndpoint,
    pub automatic_failover: Option<String>,
    #[serde(rename = "MultiAZ")]
    pub multi_az: Option<String>,
    #[serde(default)]
    pub auth_token_enabled: bool,
    #[serde(default)]
    pub transit_encryption_enabled: bool,
    #[serde(default)]
    pub at_rest_encryption_enabled: bool,
    #[serde(default)]
    pub snapshot_retention_limit: u32,
    pub snapshot_window: Option<String>,
    #[serde(default)]
    member_clusters: MemberClusters,
    #[serde(default)]
    node_groups: NodeGroups,
}

impl ReplicationGroup {
    /// Normalized lifecycle status; unknown states pass through.
    pub fn status(&self) -> &str {
        match self.status.as_str() {
            "creating" => CACHE_STATUS_DEPLOYING,
            "available" | "rebooting cluster nodes" => CACHE_STATUS_RUNNING,
            "modifying" => CACHE_STATUS_CHANGING,
            "deleting" | "deleted" => CACHE_STATUS_DELETING,
            "create-failed" => CACHE_STATUS_CREATE_FAILED,
            "snapshotting" => CACHE_STATUS_SNAPSHOTTING,
            other => other,
        }
    }

    pub fn node_groups(&self) -> &[NodeGroup] {
        &self.node_groups.group
    }

    pub fn member_clusters(&self) -> &[String] {
        &self.member_clusters.cluster_id
    }

    /// single, double, ... up to six shards; the plain count beyond that.
    pub fn node_type(&self) -> String {
        const NAMES: [&str; 6] = ["single", "double", "three", "four", "five", "six"];
        let n = self.node_groups.group.len();
        match n {
            1..=6 => NAMES[n - 1].to_string(),
            _ => n.to_string(),
        }
    }

    /// Configuration endpoint in cluster mode, else the first primary endpoint.
    pub fn private_endpoint(&self) -> Option<&CacheEndpoint> {
        if !self.configuration_endpoint.address.is_empty() {
            return Some(&self.configuration_endpoint);
        }
        self.node_groups.group.iter().find_map(|g| {
            if !g.primary_endpoint.address.is_empty() {
                Some(&g.primary_endpoint)
            } else if !g.reader_endpoint.address.is_empty() {
                Some(&g.reader_endpoint)
            } else {
                None
            }
        })
    }

    /// First cache cluster backing this group.
    pub fn first_member_cluster(&self) -> Option<&str> {
        self.node_groups
            .group
            .iter()
            .flat_map(|g| g.members())
            .map(|m| m.cache_cluster_id.as_str())
            .next()
            .or_else(|| self.member_clusters.cluster_id.first().map(String::as_str))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityGroupMembership {
    pub security_group_id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CacheNode {
    pub cache_node_id: String,
    #[serde(default)]
    pub cache_node_status: String,
    #[serde(default)]
    pub endpoint: CacheEndpoint,
    pub customer_availability_zone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheNodes {
    #[serde(rename = "CacheNode", default)]
    node: Vec<CacheNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CacheCluster {
    pub cache_cluster_id: String,
    #[serde(rename = "ARN", default)]
    pub arn: String,
    #[serde(default)]
    pub cache_cluster_status: String,
    #[serde(default)]
    pub cache_node_type: String,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub engine_version: String,
    #[serde(default)]
    pub num_cache_nodes: u32,
    pub preferred_availability_zone: Option<String>,
    #[serde(default)]
    pub preferred_maintenance_window: String,
    #[serde(default)]
    pub cache_subnet_group_name: String,
    pub replication_group_id: Option<String>,
    #[serde(default)]
    security_groups: MemberList<SecurityGroupMembership>,
    #[serde(default)]
    cache_nodes: CacheNodes,
}

impl CacheCluster {
    /// Distinct security group ids, in order.
    pub fn security_group_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for sg in &self.security_groups.member {
            if !ids.contains(&sg.security_group_id.as_str()) {
                ids.push(&sg.security_group_id);
            }
        }
        ids
    }

    pub fn cache_nodes(&self) -> &[CacheNode] {
        &self.cache_nodes.node
    }

    /// Raw start of `PreferredMaintenanceWindow` (`sun:05:00-sun:06:00`).
    pub fn maintain_start_time(&self) -> &str {
        split_window(&self.preferred_maintenance_window).0
    }

    pub fn maintain_end_time(&self) -> &str {
        split_window(&self.preferred_maintenance_window).1
    }
}

/// Both halves of a `start-end` window, or two empty strings when it is malformed.
fn split_window(window: &str) -> (&str, &str) {
    let mut parts = window.split('-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(start), Some(end), None) => (start, end),
        _ => ("", ""),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CacheSubnet {
    pub subnet_identifier: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheSubnets {
    #[serde(rename = "Subnet", default)]
    subnet: Vec<CacheSubnet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CacheSubnetGroup {
    pub cache_subnet_group_name: String,
    #[serde(default)]
    pub cache_subnet_group_description: String,
    #[serde(default)]
    pub vpc_id: String,
    #[serde(rename = "ARN", alias = "Arn")]
    pub arn: Option<String>,
    #[serde(default)]
    subnets: CacheSubnets,
}

impl CacheSubnetGroup {
    pub fn subnet_ids(&self) -> Vec<&str> {
        self.subnets.subnet.iter().map(|s| s.subnet_identifier.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CacheParameterGroup {
    pub cache_parameter_group_name: String,
    #[serde(default)]
    pub cache_parameter_group_family: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_global: bool,
    #[serde(rename = "ARN")]
    pub arn: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeSnapshot {
    pub cache_cluster_id: Option<String>,
    pub cache_node_id: Option<String>,
    /// e.g. `6 MB`.
    pub cache_size: Option<String>,
    pub snapshot_create_time: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NodeSnapshots {
    #[serde(rename = "NodeSnapshot", default)]
    snapshot: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CacheSnapshot {
    pub snapshot_name: String,
    pub replication_group_id: Option<String>,
    pub cache_cluster_id: Option<String>,
    #[serde(default)]
    pub snapshot_status: String,
    /// `automated` or `manual`.
    #[serde(default)]
    pub snapshot_source: String,
    #[serde(default)]
    pub cache_node_type: String,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub engine_version: String,
    #[serde(rename = "ARN")]
    pub arn: Option<String>,
    #[serde(default)]
    node_snapshots: NodeSnapshots,
}

impl CacheSnapshot {
    pub fn node_snapshots(&self) -> &[NodeSnapshot] {
        &self.node_snapshots.snapshot
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserAuthentication {
    #[serde(default)]
    pub r#type: String,
    #[serde(default)]
    pub password_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CacheUser {
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub access_string: String,
    #[serde(rename = "ARN")]
    pub arn: Option<String>,
    #[serde(default)]
    pub authentication: UserAuthentication,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CacheEngineVersion {
    pub engine: String,
    pub engine_version: String,
    #[serde(default)]
    pub cache_parameter_group_family: String,
    pub cache_engine_description: Option<String>,
    pub cache_engine_version_description: Option<String>,
}

// ── Responses ───────────────────────────────────────────────────────────

macro_rules! marker_page {
    ($page:ident, $list:ident, $item:ty, $list_tag:literal, $elem:literal) => {
        #[derive(Debug, Default, Deserialize)]
        struct $list {
            #[serde(rename = $elem, default)]
            items: Vec<$item>,
        }

        #[derive(Debug, Deserialize)]
        struct $page {
            #[serde(rename = $list_tag, default)]
            list: $list,
            #[serde(rename = "Marker")]
            marker: Option<String>,
        }

        impl Page for $page {
            type Item = $item;

            fn into_parts(self) -> (Vec<$item>, Option<String>) {
                (self.list.items, self.marker)
            }
        }
    };
}

marker_page!(ReplicationGroupsPage, ReplicationGroupList, ReplicationGroup, "ReplicationGroups", "ReplicationGroup");
marker_page!(CacheClustersPage, CacheClusterList, CacheCluster, "CacheClusters", "CacheCluster");
marker_page!(SubnetGroupsPage, SubnetGroupList, CacheSubnetGroup, "CacheSubnetGroups", "CacheSubnetGroup");
marker_page!(ParameterGroupsPage, ParameterGroupList, CacheParameterGroup, "CacheParameterGroups", "CacheParameterGroup");
marker_page!(SnapshotsPage, SnapshotList, CacheSnapshot, "Snapshots", "Snapshot");
marker_page!(UsersPage, UserList, CacheUser, "Users", "member");
marker_page!(EngineVersionsPage, EngineVersionList, CacheEngineVersion, "CacheEngineVersions", "CacheEngineVersion");

// ── ElastiCache Client ──────────────────────────────────────────────────

pub struct ElastiCacheClient {
    dispatcher: Arc<Dispatcher>,
    region: String,
}

impl ElastiCacheClient {
    pub fn new(dispatcher: Arc<Dispatcher>, region: &str) -> Self {
        Self {
            dispatcher,
            region: region.to_string(),
        }
    }

    async fn list<P>(&self, action: &str, mut params: Params) -> CloudResult<Vec<P::Item>>
    where
        P: Page + DeserializeOwned,
    {
        paginate::<P, _, _>(&mut params, "Marker", |p| async move {
            self.dispatcher.query::<P>(&ELASTICACHE, &self.region, action, &p).await
        })
        .await
        .context(action)
    }

    pub async fn get_replication_groups(&self, id: &str) -> CloudResult<Vec<ReplicationGroup>> {
        let mut params = Params::new();
        params.set_opt("ReplicationGroupId", id);
        self.list::<ReplicationGroupsPage>("DescribeReplicationGroups", params).await
    }

    pub async fn get_replication_group(&self, id: &str) -> CloudResult<ReplicationGroup> {
        exactly_one(self.get_replication_groups(id).await?, "replication group", id)
    }

    /// Cache clusters with node info. `standalone` keeps only clusters outside
    /// any replication group (memcached).
    pub async fn get_cache_clusters(&self, id: &str, standalone: bool) -> CloudResult<Vec<CacheCluster>> {
        let mut params = Params::new();
        params.set_opt("CacheClusterId", id).set("ShowCacheNodeInfo", "true");
        if standalone {
            params.set("ShowCacheClustersNotInReplicationGroups", "true");
        }
        self.list::<CacheClustersPage>("DescribeCacheClusters", params).await
    }

    /// The first cache cluster behind a replication group.
    pub async fn get_group_cluster(&self, group: &ReplicationGroup) -> CloudResult<CacheCluster> {
        let cluster_id = group.first_member_cluster().ok_or_else(|| {
            CloudError::NotFound(format!("replication group {} has no member clusters", group.replication_group_id))
        })?;
        exactly_one(self.get_cache_clusters(cluster_id, false).await?, "cache cluster", cluster_id)
    }

    pub async fn get_cache_subnet_groups(&self, name: &str) -> CloudResult<Vec<CacheSubnetGroup>> {
        let mut params = Params::new();
        params.set_opt("CacheSubnetGroupName", name);
        self.list::<SubnetGroupsPage>("DescribeCacheSubnetGroups", params).await
    }

    pub async fn get_cache_parameter_groups(&self, name: &str) -> CloudResult<Vec<CacheParameterGroup>> {
        let mut params = Params::new();
        params.set_opt("CacheParameterGroupName", name);
        self.list::<ParameterGroupsPage>("DescribeCacheParameterGroups", params).await
    }

    /// Snapshots of a replication group, optionally one by name. An empty page
    /// ends the listing with whatever was gathered so far.
    pub async fn get_cache_snapshots(&self, replication_group_id: &str, name: &str) -> CloudResult<Vec<CacheSnapshot>> {
        let mut params = Params::new();
        params
            .set_opt("ReplicationGroupId", replication_group_id)
            .set_opt("SnapshotName", name);
        self.list::<SnapshotsPage>("DescribeSnapshots", params).await
    }

    pub async fn get_users(&self, engine: &str) -> CloudResult<Vec<CacheUser>> {
        let mut params = Params::new();
        params.set_opt("Engine", engine);
        self.list::<UsersPage>("DescribeUsers", params).await
    }

    pub async fn get_engine_versions(&self, engine: &str) -> CloudResult<Vec<CacheEngineVersion>> {
        let mut params = Params::new();
        params.set_opt("Engine", engine);
        self.list::<EngineVersionsPage>("DescribeCacheEngineVersions", params).await
    }

    pub async fn delete_replication_group(&self, id: &str) -> CloudResult<()> {
        let mut params = Params::new();
        params.set("ReplicationGroupId", id);
        self.dispatcher
            .query_unit(&ELASTICACHE, &self.region, "DeleteReplicationGroup", &params)
            .await
            .context("DeleteReplicationGroup")
    }

    /// Raw start of the maintenance window of the group's first cluster.
    pub async fn maintain_start_time(&self, group: &ReplicationGroup) -> CloudResult<String> {
        let cluster = self.get_group_cluster(group).await?;
        Ok(cluster.maintain_start_time().to_string())
    }

    /// AWS has no flush API.
    pub async fn flush_instance(&self, id: &str) -> CloudResult<()> {
        Err(CloudError::NotSupported(format!("flush elasticache {}", id)))
    }

    fn tagger(&self) -> ArnTagger<'_> {
        ArnTagger::new(&self.dispatcher, &ELASTICACHE, &self.region)
    }

    pub async fn list_tags(&self, arn: &str) -> CloudResult<TagSet> {
        self.tagger().list(arn).await
    }

    pub async fn set_tags(&self, arn: &str, desired: &BTreeMap<String, String>, replace: bool) -> CloudResult<()> {
        self.tagger().set(arn, desired, replace).await
    }
}
