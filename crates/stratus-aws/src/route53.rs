//! Amazon Route 53 (hosted zones and traffic policies).
//!
//! REST-XML protocol under `/2013-04-01`. Route 53 is partition-global; the
//! region argument of the dispatcher only matters for the endpoint override.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stratus_core::{CloudResult, ResultExt};

use crate::dispatch::Dispatcher;
use crate::paginator::{paginate, Page};
use crate::params::Params;
use crate::service::ROUTE53;

const API_PREFIX: &str = "/2013-04-01";

/// `Z123` from either `Z123` or `/hostedzone/Z123`.
pub fn zone_id(id: &str) -> &str {
    id.trim_start_matches("/hostedzone/")
}

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostedZoneConfig {
    pub comment: Option<String>,
    #[serde(default)]
    pub private_zone: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostedZone {
    /// `/hostedzone/{id}` as returned by the API.
    pub id: String,
    /// Fully qualified, with the trailing dot.
    pub name: String,
    #[serde(default)]
    pub caller_reference: String,
    #[serde(default)]
    pub config: HostedZoneConfig,
    #[serde(default)]
    pub resource_record_set_count: u64,
}

impl HostedZone {
    pub fn zone_id(&self) -> &str {
        zone_id(&self.id)
    }

    /// Zone name without the trailing dot.
    pub fn domain(&self) -> &str {
        self.name.trim_end_matches('.')
    }

    pub fn is_private(&self) -> bool {
        self.config.private_zone
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneVpc {
    #[serde(rename = "VPCRegion")]
    pub region: String,
    #[serde(rename = "VPCId")]
    pub vpc_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NameServers {
    #[serde(rename = "NameServer", default)]
    name_server: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DelegationSet {
    #[serde(rename = "NameServers", default)]
    name_servers: NameServers,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ZoneVpcs {
    #[serde(rename = "VPC", default)]
    vpc: Vec<ZoneVpc>,
}

/// A hosted zone with its delegation set and associated VPCs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostedZoneDetail {
    pub hosted_zone: HostedZone,
    #[serde(default)]
    delegation_set: DelegationSet,
    #[serde(rename = "VPCs", default)]
    vpcs: ZoneVpcs,
}

impl HostedZoneDetail {
    pub fn name_servers(&self) -> &[String] {
        &self.delegation_set.name_servers.name_server
    }

    pub fn vpcs(&self) -> &[ZoneVpc] {
        &self.vpcs.vpc
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrafficPolicySummary {
    pub id: String,
    pub name: String,
    /// Record type the policy answers with (`A`, `CNAME`, ...).
    #[serde(rename = "Type", default)]
    pub record_type: String,
    #[serde(default)]
    pub latest_version: u32,
    #[serde(default)]
    pub traffic_policy_count: u32,
}

// ── Responses ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct HostedZones {
    #[serde(rename = "HostedZone", default)]
    zone: Vec<HostedZone>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListHostedZonesResponse {
    #[serde(default)]
    hosted_zones: HostedZones,
    #[serde(default)]
    is_truncated: bool,
    next_marker: Option<String>,
}

impl Page for ListHostedZonesResponse {
    type Item = HostedZone;

    fn into_parts(self) -> (Vec<HostedZone>, Option<String>) {
        let next = if self.is_truncated { self.next_marker } else { None };
        (self.hosted_zones.zone, next)
    }
}

#[derive(Debug, Default, Deserialize)]
struct TrafficPolicySummaries {
    #[serde(rename = "TrafficPolicySummary", default)]
    summary: Vec<TrafficPolicySummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListTrafficPoliciesResponse {
    #[serde(default)]
    traffic_policy_summaries: TrafficPolicySummaries,
    #[serde(default)]
    is_truncated: bool,
    traffic_policy_id_marker: Option<String>,
}

impl Page for ListTrafficPoliciesResponse {
    type Item = TrafficPolicySummary;

    fn into_parts(self) -> (Vec<TrafficPolicySummary>, Option<String>) {
        let next = if self.is_truncated {
            self.traffic_policy_id_marker
        } else {
            None
        };
        (self.traffic_policy_summaries.summary, next)
    }
}

// ── Route 53 Client ─────────────────────────────────────────────────────

pub struct Route53Client {
    dispatcher: Arc<Dispatcher>,
    region: String,
}

impl Route53Client {
    pub fn new(dispatcher: Arc<Dispatcher>, region: &str) -> Self {
        Self {
            dispatcher,
            region: region.to_string(),
        }
    }

    pub async fn list_hosted_zones(&self) -> CloudResult<Vec<HostedZone>> {
        let mut params = Params::new();
        let path = format!("{}/hostedzone", API_PREFIX);
        paginate::<ListHostedZonesResponse, _, _>(&mut params, "marker", |p| {
            let path = path.clone();
            async move {
                self.dispatcher
                    .rest_xml_get(&ROUTE53, &self.region, &path, &p)
                    .await
            }
        })
        .await
        .context("ListHostedZones")
    }

    pub async fn get_hosted_zone(&self, id: &str) -> CloudResult<HostedZoneDetail> {
        let path = format!("{}/hostedzone/{}", API_PREFIX, zone_id(id));
        self.dispatcher
            .rest_xml_get(&ROUTE53, &self.region, &path, &Params::new())
            .await
            .with_context(|| format!("GetHostedZone {}", id))
    }

    pub async fn list_traffic_policies(&self) -> CloudResult<Vec<TrafficPolicySummary>> {
        let mut params = Params::new();
        let path = format!("{}/trafficpolicies", API_PREFIX);
        paginate::<ListTrafficPoliciesResponse, _, _>(&mut params, "trafficpolicyid", |p| {
            let path = path.clone();
            async move {
                self.dispatcher
                    .rest_xml_get(&ROUTE53, &self.region, &path, &p)
                    .await
            }
        })
        .await
        .context("ListTrafficPolicies")
    }
}
