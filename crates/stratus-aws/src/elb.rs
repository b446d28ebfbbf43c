//! Elastic Load Balancing v2 (application / network / gateway load balancers).
//!
//! Query protocol, API version 2015-12-01. Lists continue on `Marker` and
//! answer with `NextMarker`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use stratus_core::{CloudResult, ResultExt};

use crate::dispatch::Dispatcher;
use crate::paginator::{exactly_one, paginate, Page};
use crate::params::Params;
use crate::service::ELB;
use crate::tags::{de_members, TagSet};
use crate::xml::MemberList;

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadBalancerState {
    #[serde(default)]
    pub code: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadBalancerAddress {
    pub ip_address: Option<String>,
    pub allocation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LbAvailabilityZone {
    pub zone_name: String,
    pub subnet_id: Option<String>,
    #[serde(default)]
    load_balancer_addresses: MemberList<LoadBalancerAddress>,
}

impl LbAvailabilityZone {
    pub fn addresses(&self) -> &[LoadBalancerAddress] {
        &self.load_balancer_addresses.member
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadBalancer {
    pub load_balancer_arn: String,
    #[serde(default)]
    pub load_balancer_name: String,
    #[serde(rename = "DNSName", default)]
    pub dns_name: String,
    /// `application`, `network` or `gateway`.
    #[serde(rename = "Type", default)]
    pub lb_type: String,
    /// `internet-facing` or `internal`.
    #[serde(default)]
    pub scheme: String,
    #[serde(default)]
    pub vpc_id: String,
    #[serde(default)]
    pub state: LoadBalancerState,
    pub created_time: Option<String>,
    pub ip_address_type: Option<String>,
    #[serde(default)]
    availability_zones: MemberList<LbAvailabilityZone>,
    #[serde(default)]
    security_groups: MemberList<String>,
}

impl LoadBalancer {
    pub fn is_internet_facing(&self) -> bool {
        self.scheme == "internet-facing"
    }

    pub fn zones(&self) -> &[LbAvailabilityZone] {
        &self.availability_zones.member
    }

    pub fn subnet_ids(&self) -> Vec<&str> {
        self.availability_zones
            .member
            .iter()
            .filter_map(|z| z.subnet_id.as_deref())
            .collect()
    }

    pub fn security_group_ids(&self) -> &[String] {
        &self.security_groups.member
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadBalancerAttribute {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TagDescription {
    resource_arn: String,
    #[serde(default, deserialize_with = "de_members")]
    tags: TagSet,
}

// ── Responses ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeLoadBalancersResult {
    #[serde(default)]
    load_balancers: MemberList<LoadBalancer>,
    next_marker: Option<String>,
}

impl Page for DescribeLoadBalancersResult {
    type Item = LoadBalancer;

    fn into_parts(self) -> (Vec<LoadBalancer>, Option<String>) {
        (self.load_balancers.member, self.next_marker)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeLoadBalancerAttributesResult {
    #[serde(default)]
    attributes: MemberList<LoadBalancerAttribute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeTagsResult {
    #[serde(default)]
    tag_descriptions: MemberList<TagDescription>,
}

// ── ELB Client ──────────────────────────────────────────────────────────

pub struct ElbClient {
    dispatcher: Arc<Dispatcher>,
    region: String,
}

impl ElbClient {
    pub fn new(dispatcher: Arc<Dispatcher>, region: &str) -> Self {
        Self {
            dispatcher,
            region: region.to_string(),
        }
    }

    /// Load balancers of the region, or the ones named by ARN.
    pub async fn get_load_balancers<S: AsRef<str>>(&self, arns: &[S]) -> CloudResult<Vec<LoadBalancer>> {
        let mut params = Params::new();
        params.members("LoadBalancerArns.member", arns);
        paginate::<DescribeLoadBalancersResult, _, _>(&mut params, "Marker", |p| async move {
            self.dispatcher
                .query(&ELB, &self.region, "DescribeLoadBalancers", &p)
                .await
        })
        .await
        .context("DescribeLoadBalancers")
    }

    pub async fn get_load_balancer(&self, arn: &str) -> CloudResult<LoadBalancer> {
        exactly_one(self.get_load_balancers(&[arn]).await?, "load balancer", arn)
    }

    /// Attributes as a key → value map (`deletion_protection.enabled`, ...).
    pub async fn get_load_balancer_attributes(&self, arn: &str) -> CloudResult<BTreeMap<String, String>> {
        let mut params = Params::new();
        params.set("LoadBalancerArn", arn);
        let result: DescribeLoadBalancerAttributesResult = self
            .dispatcher
            .query(&ELB, &self.region, "DescribeLoadBalancerAttributes", &params)
            .await
            .context("DescribeLoadBalancerAttributes")?;
        Ok(result
            .attributes
            .member
            .into_iter()
            .map(|a| (a.key, a.value))
            .collect())
    }

    /// Tags per ARN; at most 20 ARNs per call.
    pub async fn get_tags<S: AsRef<str>>(&self, arns: &[S]) -> CloudResult<BTreeMap<String, TagSet>> {
        let mut out = BTreeMap::new();
        for chunk in arns.chunks(20) {
            let mut params = Params::new();
            params.members("ResourceArns.member", chunk);
            let result: DescribeTagsResult = self
                .dispatcher
                .query(&ELB, &self.region, "DescribeTags", &params)
                .await
                .context("DescribeTags")?;
            out.extend(
                result
                    .tag_descriptions
                    .member
                    .into_iter()
                    .map(|d| (d.resource_arn, d.tags)),
            );
        }
        Ok(out)
    }

    pub async fn delete_load_balancer(&self, arn: &str) -> CloudResult<()> {
        let mut params = Params::new();
        params.set("LoadBalancerArn", arn);
        self.dispatcher
            .query_unit(&ELB, &self.region, "DeleteLoadBalancer", &params)
            .await
            .context("DeleteLoadBalancer")
    }
}
