//! Amazon RDS (Relational Database Service) service client.
//!
//! Query protocol, API version 2014-10-31. Instances are addressed by their
//! `DbiResourceId`; tag calls take the instance ARN.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use stratus_core::{CloudResult, ResultExt};

use crate::dispatch::Dispatcher;
use crate::paginator::{exactly_one, paginate, Page};
use crate::params::Params;
use crate::service::RDS;
use crate::tags::{de_tag_list, ArnTagger, TagSet};

pub const DBINSTANCE_DEPLOYING: &str = "deploying";
pub const DBINSTANCE_RUNNING: &str = "running";
pub const DBINSTANCE_DELETING: &str = "deleting";
pub const DBINSTANCE_REBOOTING: &str = "rebooting";
pub const DBINSTANCE_UNKNOWN: &str = "unknown";

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbEndpoint {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: u16,
    pub hosted_zone_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbSubnet {
    pub subnet_identifier: String,
    #[serde(default)]
    pub subnet_status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DbSubnets {
    #[serde(rename = "Subnet", default)]
    subnet: Vec<DbSubnet>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbSubnetGroup {
    #[serde(default)]
    pub vpc_id: String,
    #[serde(rename = "DBSubnetGroupName", default)]
    pub db_subnet_group_name: String,
    #[serde(default)]
    subnets: DbSubnets,
}

impl DbSubnetGroup {
    pub fn subnet_ids(&self) -> Vec<&str> {
        self.subnets.subnet.iter().map(|s| s.subnet_identifier.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcSecurityGroupMembership {
    pub vpc_security_group_id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct VpcSecurityGroups {
    #[serde(rename = "VpcSecurityGroupMembership", default)]
    membership: Vec<VpcSecurityGroupMembership>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbInstance {
    #[serde(rename = "DBInstanceIdentifier")]
    pub db_instance_identifier: String,
    pub dbi_resource_id: String,
    #[serde(rename = "DBInstanceArn", default)]
    pub db_instance_arn: String,
    #[serde(rename = "DBInstanceClass", default)]
    pub db_instance_class: String,
    #[serde(rename = "DBInstanceStatus", default)]
    pub db_instance_status: String,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub engine_version: String,
    #[serde(rename = "DBName")]
    pub db_name: Option<String>,
    /// GiB.
    #[serde(default)]
    pub allocated_storage: u32,
    #[serde(default)]
    pub storage_type: String,
    #[serde(default)]
    pub availability_zone: String,
    pub secondary_availability_zone: Option<String>,
    #[serde(rename = "MultiAZ", default)]
    pub multi_az: bool,
    #[serde(default)]
    pub endpoint: DbEndpoint,
    #[serde(default)]
    pub publicly_accessible: bool,
    #[serde(default)]
    pub storage_encrypted: bool,
    #[serde(default)]
    pub deletion_protection: bool,
    pub preferred_maintenance_window: Option<String>,
    pub preferred_backup_window: Option<String>,
    pub instance_create_time: Option<String>,
    pub master_username: Option<String>,
    #[serde(rename = "DBSubnetGroup", default)]
    pub db_subnet_group: DbSubnetGroup,
    #[serde(default)]
    vpc_security_groups: VpcSecurityGroups,
    #[serde(rename = "TagList", default, deserialize_with = "de_tag_list")]
    pub tags: TagSet,
}

impl DbInstance {
    /// Normalized lifecycle status.
    pub fn status(&self) -> &'static str {
        match self.db_instance_status.as_str() {
            "creating" | "backing-up" => DBINSTANCE_DEPLOYING,
            "available" => DBINSTANCE_RUNNING,
            "deleting" => DBINSTANCE_DELETING,
            "rebooting" => DBINSTANCE_REBOOTING,
            other => {
                log::error!("unknown db instance status: {}", other);
                DBINSTANCE_UNKNOWN
            }
        }
    }

    /// Engine family: aurora, oracle, sqlserver, mariadb, mysql, postgresql.
    pub fn engine_family(&self) -> &str {
        let engine = self.engine.as_str();
        if engine.contains("aurora") {
            "aurora"
        } else if engine.contains("oracle") {
            "oracle"
        } else if engine.contains("sqlserver") {
            "sqlserver"
        } else if engine == "postgres" {
            "postgresql"
        } else {
            engine
        }
    }

    pub fn category(&self) -> &'static str {
        match self.engine.as_str() {
            "aurora" | "aurora-mysql" => "mysql",
            "aurora-postgresql" => "postgresql",
            "oracle-ee" | "sqlserver-ee" => "enterprise-edition",
            "oracle-se2" => "standard-edition-two",
            "sqlserver-se" => "standard-edition",
            "sqlserver-ex" => "express-edition",
            "sqlserver-web" => "web-edition",
            _ => {
                let class = self.db_instance_class.as_str();
                if ["db.r", "db.x", "db.d"].iter().any(|p| class.starts_with(p)) {
                    "memory-optimized"
                } else {
                    "general-purpose"
                }
            }
        }
    }

    pub fn vpc_id(&self) -> &str {
        &self.db_subnet_group.vpc_id
    }

    pub fn security_group_ids(&self) -> Vec<&str> {
        self.vpc_security_groups
            .membership
            .iter()
            .map(|m| m.vpc_security_group_id.as_str())
            .collect()
    }

    /// `address:port`, empty while the instance has no endpoint yet.
    pub fn connection_str(&self) -> String {
        if self.endpoint.address.is_empty() {
            return String::new();
        }
        format!("{}:{}", self.endpoint.address, self.endpoint.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GlobalClusterMember {
    #[serde(rename = "DBClusterArn")]
    pub db_cluster_arn: String,
    #[serde(default)]
    pub is_writer: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GlobalClusterMembers {
    #[serde(rename = "GlobalClusterMember", default)]
    member: Vec<GlobalClusterMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GlobalCluster {
    pub global_cluster_identifier: String,
    #[serde(default)]
    pub global_cluster_resource_id: String,
    #[serde(default)]
    pub global_cluster_arn: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub engine_version: String,
    pub database_name: Option<String>,
    #[serde(default)]
    pub storage_encrypted: bool,
    #[serde(default)]
    pub deletion_protection: bool,
    #[serde(default)]
    global_cluster_members: GlobalClusterMembers,
}

impl GlobalCluster {
    pub fn members(&self) -> &[GlobalClusterMember] {
        &self.global_cluster_members.member
    }
}

// ── Responses ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct DbInstanceList {
    #[serde(rename = "DBInstance", default)]
    instance: Vec<DbInstance>,
}

#[derive(Debug, Deserialize)]
struct DescribeDbInstancesResult {
    #[serde(rename = "DBInstances", default)]
    instances: DbInstanceList,
    #[serde(rename = "Marker")]
    marker: Option<String>,
}

impl Page for DescribeDbInstancesResult {
    type Item = DbInstance;

    fn into_parts(self) -> (Vec<DbInstance>, Option<String>) {
        (self.instances.instance, self.marker)
    }
}

#[derive(Debug, Default, Deserialize)]
struct GlobalClusterList {
    #[serde(rename = "GlobalClusterMember", default)]
    member: Vec<GlobalCluster>,
}

#[derive(Debug, Deserialize)]
struct DescribeGlobalClustersResult {
    #[serde(rename = "GlobalClusters", default)]
    clusters: GlobalClusterList,
    #[serde(rename = "Marker")]
    marker: Option<String>,
}

impl Page for DescribeGlobalClustersResult {
    type Item = GlobalCluster;

    fn into_parts(self) -> (Vec<GlobalCluster>, Option<String>) {
        (self.clusters.member, self.marker)
    }
}

// ── RDS Client ──────────────────────────────────────────────────────────

pub struct RdsClient {
    dispatcher: Arc<Dispatcher>,
    region: String,
}

impl RdsClient {
    pub fn new(dispatcher: Arc<Dispatcher>, region: &str) -> Self {
        Self {
            dispatcher,
            region: region.to_string(),
        }
    }

    /// DescribeDBInstances, optionally narrowed to one `DbiResourceId`.
    pub async fn get_db_instances(&self, resource_id: &str) -> CloudResult<Vec<DbInstance>> {
        let mut params = Params::new();
        if !resource_id.is_empty() {
            params.rds_filter("dbi-resource-id", &[resource_id]);
        }
        paginate::<DescribeDbInstancesResult, _, _>(&mut params, "Marker", |p| async move {
            self.dispatcher
                .query(&RDS, &self.region, "DescribeDBInstances", &p)
                .await
        })
        .await
        .context("DescribeDBInstances")
    }

    pub async fn get_db_instance(&self, resource_id: &str) -> CloudResult<DbInstance> {
        exactly_one(self.get_db_instances(resource_id).await?, "db instance", resource_id)
    }

    pub async fn get_global_clusters(&self) -> CloudResult<Vec<GlobalCluster>> {
        let mut params = Params::new();
        paginate::<DescribeGlobalClustersResult, _, _>(&mut params, "Marker", |p| async move {
            self.dispatcher
                .query(&RDS, &self.region, "DescribeGlobalClusters", &p)
                .await
        })
        .await
        .context("DescribeGlobalClusters")
    }

    /// DeleteDBInstance without a final snapshot.
    pub async fn delete_db_instance(&self, identifier: &str) -> CloudResult<()> {
        let mut params = Params::new();
        params
            .set("DBInstanceIdentifier", identifier)
            .set("SkipFinalSnapshot", "true");
        self.dispatcher
            .query_unit(&RDS, &self.region, "DeleteDBInstance", &params)
            .await
            .context("DeleteDBInstance")
    }

    pub async fn reboot_db_instance(&self, identifier: &str) -> CloudResult<()> {
        let mut params = Params::new();
        params.set("DBInstanceIdentifier", identifier);
        self.dispatcher
            .query_unit(&RDS, &self.region, "RebootDBInstance", &params)
            .await
            .context("RebootDBInstance")
    }

    fn tagger(&self) -> ArnTagger<'_> {
        ArnTagger::new(&self.dispatcher, &RDS, &self.region)
    }

    pub async fn list_tags(&self, arn: &str) -> CloudResult<TagSet> {
        self.tagger().list(arn).await
    }

    pub async fn set_tags(&self, arn: &str, desired: &BTreeMap<String, String>, replace: bool) -> CloudResult<()> {
        self.tagger().set(arn, desired, replace).await
    }
}
