//! Amazon EC2 (Elastic Compute Cloud) service client.
//!
//! EC2 uses its own flavour of the Query protocol: lowercase camel-case
//! element names, `<xxxSet><item>` lists and no `{Action}Result` wrapper, so
//! responses are decoded whole. List calls page with `NextToken`/`nextToken`.
//!
//! Reference: <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/>

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use stratus_core::{CloudError, CloudResult, ResultExt};

use crate::dispatch::Dispatcher;
use crate::paginator::{exactly_one, paginate, Page};
use crate::params::Params;
use crate::service::EC2;
use crate::tags::{de_tag_set, TagSet};
use crate::xml::ItemSet;

pub const INSTANCE_STATE_TERMINATED: &str = "terminated";
pub const VOLUME_STATUS_AVAILABLE: &str = "available";

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionInfo {
    pub region_name: String,
    #[serde(default)]
    pub region_endpoint: String,
    pub opt_in_status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityZone {
    pub zone_name: String,
    pub zone_id: Option<String>,
    #[serde(default)]
    pub zone_state: String,
    #[serde(default)]
    pub region_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vpc {
    pub vpc_id: String,
    #[serde(default)]
    pub cidr_block: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub is_default: bool,
    pub owner_id: Option<String>,
    pub instance_tenancy: Option<String>,
    #[serde(rename = "tagSet", default, deserialize_with = "de_tag_set")]
    pub tags: TagSet,
}

impl Vpc {
    pub fn name(&self) -> &str {
        self.tags.name().unwrap_or(&self.vpc_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub subnet_id: String,
    pub vpc_id: String,
    #[serde(default)]
    pub cidr_block: String,
    #[serde(default)]
    pub availability_zone: String,
    #[serde(default)]
    pub available_ip_address_count: u32,
    #[serde(default)]
    pub map_public_ip_on_launch: bool,
    #[serde(default)]
    pub default_for_az: bool,
    #[serde(default)]
    pub state: String,
    #[serde(rename = "tagSet", default, deserialize_with = "de_tag_set")]
    pub tags: TagSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub destination_cidr_block: Option<String>,
    pub destination_prefix_list_id: Option<String>,
    pub gateway_id: Option<String>,
    pub instance_id: Option<String>,
    pub nat_gateway_id: Option<String>,
    pub network_interface_id: Option<String>,
    pub vpc_peering_connection_id: Option<String>,
    pub transit_gateway_id: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub origin: String,
}

impl Route {
    /// The id of whatever the route forwards to.
    pub fn next_hop(&self) -> Option<&str> {
        self.gateway_id
            .as_deref()
            .or(self.instance_id.as_deref())
            .or(self.nat_gateway_id.as_deref())
            .or(self.network_interface_id.as_deref())
            .or(self.vpc_peering_connection_id.as_deref())
            .or(self.transit_gateway_id.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTableAssociation {
    pub route_table_association_id: Option<String>,
    #[serde(default)]
    pub main: bool,
    pub subnet_id: Option<String>,
    pub gateway_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTable {
    pub route_table_id: String,
    pub vpc_id: String,
    #[serde(rename = "routeSet", default)]
    routes: ItemSet<Route>,
    #[serde(rename = "associationSet", default)]
    associations: ItemSet<RouteTableAssociation>,
    #[serde(rename = "tagSet", default, deserialize_with = "de_tag_set")]
    pub tags: TagSet,
}

impl RouteTable {
    pub fn routes(&self) -> &[Route] {
        &self.routes.item
    }

    pub fn associations(&self) -> &[RouteTableAssociation] {
        &self.associations.item
    }

    pub fn is_main(&self) -> bool {
        self.associations.item.iter().any(|a| a.main)
    }
}

/// Next hop of a route, derived from the target's id prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    Gateway(String),
    Instance(String),
    NatGateway(String),
    NetworkInterface(String),
    VpcPeering(String),
    TransitGateway(String),
}

impl RouteTarget {
    pub fn from_id(id: &str) -> Self {
        let id_owned = id.to_string();
        match id.split('-').next().unwrap_or_default() {
            "i" => RouteTarget::Instance(id_owned),
            "nat" => RouteTarget::NatGateway(id_owned),
            "eni" => RouteTarget::NetworkInterface(id_owned),
            "pcx" => RouteTarget::VpcPeering(id_owned),
            "tgw" => RouteTarget::TransitGateway(id_owned),
            _ => RouteTarget::Gateway(id_owned),
        }
    }

    /// Request parameter name and value.
    fn param(&self) -> (&'static str, &str) {
        match self {
            RouteTarget::Gateway(id) => ("GatewayId", id),
            RouteTarget::Instance(id) => ("InstanceId", id),
            RouteTarget::NatGateway(id) => ("NatGatewayId", id),
            RouteTarget::NetworkInterface(id) => ("NetworkInterfaceId", id),
            RouteTarget::VpcPeering(id) => ("VpcPeeringConnectionId", id),
            RouteTarget::TransitGateway(id) => ("TransitGatewayId", id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternetGatewayAttachment {
    pub vpc_id: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternetGateway {
    pub internet_gateway_id: String,
    #[serde(rename = "attachmentSet", default)]
    attachments: ItemSet<InternetGatewayAttachment>,
    #[serde(rename = "tagSet", default, deserialize_with = "de_tag_set")]
    pub tags: TagSet,
}

impl InternetGateway {
    pub fn attachments(&self) -> &[InternetGatewayAttachment] {
        &self.attachments.item
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeAttachment {
    pub instance_id: String,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub delete_on_termination: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub volume_id: String,
    /// GiB.
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub volume_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub availability_zone: String,
    pub iops: Option<u32>,
    pub throughput: Option<u32>,
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub encrypted: bool,
    pub create_time: Option<String>,
    #[serde(rename = "attachmentSet", default)]
    attachments: ItemSet<VolumeAttachment>,
    #[serde(rename = "tagSet", default, deserialize_with = "de_tag_set")]
    pub tags: TagSet,
}

impl Volume {
    pub fn attachments(&self) -> &[VolumeAttachment] {
        &self.attachments.item
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub snapshot_id: String,
    #[serde(default)]
    pub volume_id: String,
    #[serde(default)]
    pub volume_size: u32,
    #[serde(default)]
    pub status: String,
    pub start_time: Option<String>,
    pub progress: Option<String>,
    pub description: Option<String>,
    pub owner_id: Option<String>,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(rename = "tagSet", default, deserialize_with = "de_tag_set")]
    pub tags: TagSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroup {
    pub group_id: String,
    pub group_name: String,
    #[serde(default)]
    pub group_description: String,
    pub vpc_id: Option<String>,
    pub owner_id: Option<String>,
    #[serde(rename = "tagSet", default, deserialize_with = "de_tag_set")]
    pub tags: TagSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceState {
    /// 0 pending, 16 running, 32 shutting-down, 48 terminated, 64 stopping, 80 stopped.
    pub code: u16,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    #[serde(default)]
    pub availability_zone: String,
    pub tenancy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuOptions {
    pub core_count: u32,
    pub threads_per_core: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupIdentifier {
    pub group_id: String,
    #[serde(default)]
    pub group_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EbsInstanceBlockDevice {
    pub volume_id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceBlockDeviceMapping {
    pub device_name: String,
    pub ebs: Option<EbsInstanceBlockDevice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceAssociation {
    pub public_ip: Option<String>,
    pub ip_owner_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceNetworkInterface {
    pub network_interface_id: String,
    pub mac_address: Option<String>,
    pub private_ip_address: Option<String>,
    pub association: Option<NetworkInterfaceAssociation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub instance_id: String,
    #[serde(default)]
    pub image_id: String,
    #[serde(default)]
    pub instance_type: String,
    pub instance_state: InstanceState,
    #[serde(default)]
    pub placement: Placement,
    pub key_name: Option<String>,
    pub launch_time: Option<String>,
    pub platform: Option<String>,
    pub architecture: Option<String>,
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
    pub private_ip_address: Option<String>,
    pub ip_address: Option<String>,
    pub root_device_name: Option<String>,
    #[serde(default)]
    pub ebs_optimized: bool,
    pub cpu_options: Option<CpuOptions>,
    #[serde(rename = "groupSet", default)]
    groups: ItemSet<GroupIdentifier>,
    #[serde(rename = "blockDeviceMapping", default)]
    block_devices: ItemSet<InstanceBlockDeviceMapping>,
    #[serde(rename = "networkInterfaceSet", default)]
    network_interfaces: ItemSet<InstanceNetworkInterface>,
    #[serde(rename = "tagSet", default, deserialize_with = "de_tag_set")]
    pub tags: TagSet,
}

impl Instance {
    pub fn name(&self) -> &str {
        self.tags.name().unwrap_or(&self.instance_id)
    }

    pub fn zone_id(&self) -> &str {
        &self.placement.availability_zone
    }

    pub fn is_terminated(&self) -> bool {
        self.instance_state.name == INSTANCE_STATE_TERMINATED
    }

    pub fn security_group_ids(&self) -> Vec<&str> {
        self.groups.item.iter().map(|g| g.group_id.as_str()).collect()
    }

    /// EBS volume ids in device-mapping order.
    pub fn volume_ids(&self) -> Vec<&str> {
        self.block_devices
            .item
            .iter()
            .filter_map(|d| d.ebs.as_ref().map(|e| e.volume_id.as_str()))
            .collect()
    }

    pub fn network_interfaces(&self) -> &[InstanceNetworkInterface] {
        &self.network_interfaces.item
    }

    /// The first public address that is not an auto-assigned Amazon one.
    pub fn eip(&self) -> Option<&str> {
        self.network_interfaces
            .item
            .iter()
            .filter_map(|n| n.association.as_ref())
            .filter(|a| a.ip_owner_id.as_deref() != Some("amazon"))
            .find_map(|a| a.public_ip.as_deref().filter(|ip| !ip.is_empty()))
    }

    pub fn vcpu_count(&self) -> u32 {
        self.cpu_options
            .as_ref()
            .map(|c| c.core_count * c.threads_per_core)
            .unwrap_or_default()
    }

    /// `windows` for Windows platforms, `Linux` otherwise.
    pub fn os_type(&self) -> &str {
        match self.platform.as_deref() {
            Some(p) if !p.is_empty() => p,
            _ => "Linux",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub image_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image_state: String,
    pub architecture: Option<String>,
    pub platform: Option<String>,
    pub owner_id: Option<String>,
    pub image_owner_alias: Option<String>,
    pub description: Option<String>,
    pub creation_date: Option<String>,
    pub root_device_type: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(rename = "tagSet", default, deserialize_with = "de_tag_set")]
    pub tags: TagSet,
}

impl Image {
    /// Distribution family when the owner is a known system publisher.
    pub fn publisher(&self) -> Option<&'static str> {
        self.owner_id.as_deref().and_then(image_publisher)
    }
}

/// Whose images to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOwner {
    /// The calling account.
    Own,
    /// Every known distribution publisher.
    System,
    /// A raw account id or alias.
    Account(String),
}

/// Account ids of the distribution publishers, both partitions.
const IMAGE_PUBLISHERS: &[(&str, &str)] = &[
    ("841258680906", "rhel"),
    ("309956199498", "rhel"),
    ("673060587306", "debian"),
    ("379101102735", "debian"),
    ("718707510307", "centos"),
    ("410186602215", "centos"),
    ("837727238323", "ubuntu"),
    ("099720109477", "ubuntu"),
    ("841869936221", "suse"),
    ("013907871322", "suse"),
    ("280032941352", "coreos"),
    ("595879546273", "coreos"),
    ("016951021795", "windows"),
    ("801119661308", "windows"),
    ("141808717104", "amazon"),
    ("137112412989", "amazon"),
];

pub fn image_publisher(owner_id: &str) -> Option<&'static str> {
    IMAGE_PUBLISHERS
        .iter()
        .find(|(id, _)| *id == owner_id)
        .map(|(_, distro)| *distro)
}

/// `Owner.N` values for a set of owner selectors.
pub fn image_owner_ids(owners: &[ImageOwner]) -> Vec<String> {
    let mut ids = Vec::new();
    for owner in owners {
        match owner {
            ImageOwner::Own => ids.push("self".to_string()),
            ImageOwner::System => ids.extend(IMAGE_PUBLISHERS.iter().map(|(id, _)| id.to_string())),
            ImageOwner::Account(id) => ids.push(id.clone()),
        }
    }
    ids
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeeringVpcInfo {
    pub vpc_id: String,
    pub owner_id: Option<String>,
    pub region: Option<String>,
    pub cidr_block: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeeringStatus {
    pub code: String,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcPeeringConnection {
    pub vpc_peering_connection_id: String,
    pub status: PeeringStatus,
    pub requester_vpc_info: PeeringVpcInfo,
    pub accepter_vpc_info: PeeringVpcInfo,
    #[serde(rename = "tagSet", default, deserialize_with = "de_tag_set")]
    pub tags: TagSet,
}

// ── Responses ───────────────────────────────────────────────────────────

macro_rules! ec2_page {
    ($page:ident, $item:ty, $set:literal) => {
        #[derive(Debug, Deserialize)]
        struct $page {
            #[serde(rename = $set, default)]
            set: ItemSet<$item>,
            #[serde(rename = "nextToken")]
            next_token: Option<String>,
        }

        impl Page for $page {
            type Item = $item;

            fn into_parts(self) -> (Vec<$item>, Option<String>) {
                (self.set.item, self.next_token)
            }
        }
    };
}

ec2_page!(RegionsPage, RegionInfo, "regionInfo");
ec2_page!(ZonesPage, AvailabilityZone, "availabilityZoneInfo");
ec2_page!(VpcsPage, Vpc, "vpcSet");
ec2_page!(SubnetsPage, Subnet, "subnetSet");
ec2_page!(RouteTablesPage, RouteTable, "routeTableSet");
ec2_page!(InternetGatewaysPage, InternetGateway, "internetGatewaySet");
ec2_page!(VolumesPage, Volume, "volumeSet");
ec2_page!(SnapshotsPage, Snapshot, "snapshotSet");
ec2_page!(SecurityGroupsPage, SecurityGroup, "securityGroupInfo");
ec2_page!(ImagesPage, Image, "imagesSet");
ec2_page!(PeeringPage, VpcPeeringConnection, "vpcPeeringConnectionSet");

#[derive(Debug, Deserialize)]
struct Reservation {
    #[serde(rename = "instancesSet", default)]
    instances: ItemSet<Instance>,
}

ec2_page!(ReservationsPage, Reservation, "reservationSet");

// ── EC2 Client ──────────────────────────────────────────────────────────

/// Region-bound EC2 calls.
pub struct Ec2Client {
    dispatcher: Arc<Dispatcher>,
    region: String,
}

impl Ec2Client {
    pub fn new(dispatcher: Arc<Dispatcher>, region: &str) -> Self {
        Self {
            dispatcher,
            region: region.to_string(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    async fn call<T: DeserializeOwned>(&self, action: &str, params: &Params) -> CloudResult<T> {
        self.dispatcher.query(&EC2, &self.region, action, params).await
    }

    async fn call_unit(&self, action: &str, params: &Params) -> CloudResult<()> {
        self.dispatcher
            .query_unit(&EC2, &self.region, action, params)
            .await
            .context(action)
    }

    async fn list<P>(&self, action: &str, mut params: Params) -> CloudResult<Vec<P::Item>>
    where
        P: Page + DeserializeOwned,
    {
        paginate::<P, _, _>(&mut params, "NextToken", |p| async move { self.call::<P>(action, &p).await })
            .await
            .context(action)
    }

    /// DescribeRegions. Issued without the assumed role, since it bootstraps the client.
    pub async fn describe_regions(&self) -> CloudResult<Vec<RegionInfo>> {
        let page: RegionsPage = self
            .dispatcher
            .query(&EC2.without_assume_role(), &self.region, "DescribeRegions", &Params::new())
            .await
            .context("DescribeRegions")?;
        Ok(page.into_parts().0)
    }

    pub async fn describe_availability_zones(&self) -> CloudResult<Vec<AvailabilityZone>> {
        let page: ZonesPage = self
            .call("DescribeAvailabilityZones", &Params::new())
            .await
            .context("DescribeAvailabilityZones")?;
        Ok(page.into_parts().0)
    }

    // ── VPCs ────────────────────────────────────────────────────────────

    pub async fn get_vpcs<S: AsRef<str>>(&self, vpc_ids: &[S]) -> CloudResult<Vec<Vpc>> {
        let mut params = Params::new();
        params.members("VpcId", vpc_ids);
        self.list::<VpcsPage>("DescribeVpcs", params).await
    }

    pub async fn get_vpc(&self, vpc_id: &str) -> CloudResult<Vpc> {
        exactly_one(self.get_vpcs(&[vpc_id]).await?, "vpc", vpc_id)
    }

    pub async fn delete_vpc(&self, vpc_id: &str) -> CloudResult<()> {
        let mut params = Params::new();
        params.set("VpcId", vpc_id);
        self.call_unit("DeleteVpc", &params).await
    }

    /// Detach and delete the VPC's internet gateways, drop its non-main
    /// route tables, then delete the VPC itself.
    pub async fn delete_vpc_with_dependencies(&self, vpc_id: &str) -> CloudResult<()> {
        for igw in self.get_internet_gateways(vpc_id).await? {
            self.detach_internet_gateway(&igw.internet_gateway_id, vpc_id).await?;
            self.delete_internet_gateway(&igw.internet_gateway_id).await?;
        }
        for table in self.get_route_tables(vpc_id, false).await? {
            if table.is_main() {
                log::debug!("skipping main route table {} of {}", table.route_table_id, vpc_id);
                continue;
            }
            self.delete_route_table(&table.route_table_id).await?;
        }
        self.delete_vpc(vpc_id).await
    }

    pub async fn get_subnets<S: AsRef<str>>(&self, subnet_ids: &[S], vpc_id: &str) -> CloudResult<Vec<Subnet>> {
        let mut params = Params::new();
        params.members("SubnetId", subnet_ids);
        if !vpc_id.is_empty() {
            params.filter("vpc-id", &[vpc_id]);
        }
        self.list::<SubnetsPage>("DescribeSubnets", params).await
    }

    /// Toggle public IP auto-assignment. Anything but `true` writes `false`.
    pub async fn modify_subnet_attribute(&self, subnet_id: &str, map_public_ip: bool) -> CloudResult<()> {
        let mut params = Params::new();
        params
            .set("SubnetId", subnet_id)
            .set("MapPublicIpOnLaunch.Value", "false");
        if map_public_ip {
            params.set("MapPublicIpOnLaunch.Value", "true");
        }
        self.call_unit("ModifySubnetAttribute", &params).await
    }

    // ── Routes ──────────────────────────────────────────────────────────

    /// Route tables of a VPC; `main_only` keeps the main table alone.
    pub async fn get_route_tables(&self, vpc_id: &str, main_only: bool) -> CloudResult<Vec<RouteTable>> {
        let mut params = Params::new();
        params.filter("vpc-id", &[vpc_id]);
        if main_only {
            params.filter("association.main", &["true"]);
        }
        self.list::<RouteTablesPage>("DescribeRouteTables", params).await
    }

    pub async fn get_route_table(&self, route_table_id: &str) -> CloudResult<RouteTable> {
        let mut params = Params::new();
        params.set("RouteTableId.1", route_table_id);
        let tables = self.list::<RouteTablesPage>("DescribeRouteTables", params).await?;
        exactly_one(tables, "route table", route_table_id)
    }

    fn route_params(route_table_id: &str, cidr: &str, target: Option<&RouteTarget>) -> Params {
        let mut params = Params::new();
        params
            .set("RouteTableId", route_table_id)
            .set("DestinationCidrBlock", cidr);
        if let Some(target) = target {
            let (key, id) = target.param();
            params.set(key, id);
        }
        params
    }

    pub async fn create_route(&self, route_table_id: &str, cidr: &str, target: &RouteTarget) -> CloudResult<()> {
        let params = Self::route_params(route_table_id, cidr, Some(target));
        self.call_unit("CreateRoute", &params).await
    }

    pub async fn replace_route(&self, route_table_id: &str, cidr: &str, target: &RouteTarget) -> CloudResult<()> {
        let params = Self::route_params(route_table_id, cidr, Some(target));
        self.call_unit("ReplaceRoute", &params).await
    }

    pub async fn delete_route(&self, route_table_id: &str, cidr: &str) -> CloudResult<()> {
        let params = Self::route_params(route_table_id, cidr, None);
        self.call_unit("DeleteRoute", &params).await
    }

    pub async fn delete_route_table(&self, route_table_id: &str) -> CloudResult<()> {
        let mut params = Params::new();
        params.set("RouteTableId", route_table_id);
        self.call_unit("DeleteRouteTable", &params).await
    }

    // ── Internet gateways ───────────────────────────────────────────────

    pub async fn get_internet_gateways(&self, vpc_id: &str) -> CloudResult<Vec<InternetGateway>> {
        let mut params = Params::new();
        if !vpc_id.is_empty() {
            params.filter("attachment.vpc-id", &[vpc_id]);
        }
        self.list::<InternetGatewaysPage>("DescribeInternetGateways", params).await
    }

    pub async fn detach_internet_gateway(&self, igw_id: &str, vpc_id: &str) -> CloudResult<()> {
        let mut params = Params::new();
        params.set("InternetGatewayId", igw_id).set("VpcId", vpc_id);
        self.call_unit("DetachInternetGateway", &params).await
    }

    pub async fn delete_internet_gateway(&self, igw_id: &str) -> CloudResult<()> {
        let mut params = Params::new();
        params.set("InternetGatewayId", igw_id);
        self.call_unit("DeleteInternetGateway", &params).await
    }

    // ── Volumes & snapshots ─────────────────────────────────────────────

    /// Volumes by id, zone and type; empty selectors are not sent.
    pub async fn get_volumes<S: AsRef<str>>(
        &self,
        volume_ids: &[S],
        zone_id: &str,
        volume_type: &str,
    ) -> CloudResult<Vec<Volume>> {
        let mut params = Params::new();
        params.members("VolumeId", volume_ids);
        if !zone_id.is_empty() {
            params.filter("availability-zone", &[zone_id]);
        }
        if !volume_type.is_empty() {
            params.filter("volume-type", &[volume_type]);
        }
        self.list::<VolumesPage>("DescribeVolumes", params).await
    }

    pub async fn get_volume(&self, volume_id: &str) -> CloudResult<Volume> {
        exactly_one(self.get_volumes(&[volume_id], "", "").await?, "volume", volume_id)
    }

    pub async fn delete_volume(&self, volume_id: &str) -> CloudResult<()> {
        let mut params = Params::new();
        params.set("VolumeId", volume_id);
        self.call_unit("DeleteVolume", &params).await
    }

    /// Snapshots owned by this account, optionally narrowed to one volume.
    pub async fn get_snapshots<S: AsRef<str>>(&self, snapshot_ids: &[S], volume_id: &str) -> CloudResult<Vec<Snapshot>> {
        let mut params = Params::new();
        params.set("Owner.1", "self");
        params.members("SnapshotId", snapshot_ids);
        if !volume_id.is_empty() {
            params.filter("volume-id", &[volume_id]);
        }
        self.list::<SnapshotsPage>("DescribeSnapshots", params).await
    }

    pub async fn get_snapshot(&self, snapshot_id: &str) -> CloudResult<Snapshot> {
        exactly_one(self.get_snapshots(&[snapshot_id], "").await?, "snapshot", snapshot_id)
    }

    /// CreateSnapshot; `name` lands in the `Name` tag.
    pub async fn create_snapshot(&self, volume_id: &str, name: &str, description: &str) -> CloudResult<Snapshot> {
        let mut params = Params::new();
        params.set("VolumeId", volume_id).set_opt("Description", description);
        if !name.is_empty() {
            let tags: BTreeMap<String, String> = [("Name".to_string(), name.to_string())].into();
            params.tag_specification(1, "snapshot", &tags);
        }
        self.call("CreateSnapshot", &params).await.context("CreateSnapshot")
    }

    pub async fn delete_snapshot(&self, snapshot_id: &str) -> CloudResult<()> {
        let mut params = Params::new();
        params.set("SnapshotId", snapshot_id);
        self.call_unit("DeleteSnapshot", &params).await
    }

    // ── Security groups ─────────────────────────────────────────────────

    pub async fn get_security_groups<S: AsRef<str>>(
        &self,
        vpc_id: &str,
        group_ids: &[S],
    ) -> CloudResult<Vec<SecurityGroup>> {
        let mut params = Params::new();
        params.members("GroupId", group_ids);
        if !vpc_id.is_empty() {
            params.filter("vpc-id", &[vpc_id]);
        }
        self.list::<SecurityGroupsPage>("DescribeSecurityGroups", params).await
    }

    pub async fn get_security_group(&self, group_id: &str) -> CloudResult<SecurityGroup> {
        let groups = self.get_security_groups("", &[group_id]).await?;
        exactly_one(groups, "security group", group_id)
    }

    pub async fn delete_security_group(&self, group_id: &str) -> CloudResult<()> {
        let mut params = Params::new();
        params.set("GroupId", group_id);
        self.call_unit("DeleteSecurityGroup", &params).await
    }

    // ── Instances & images ──────────────────────────────────────────────

    /// Instances of a zone (or every zone when empty). Terminated instances are skipped.
    pub async fn get_instances<S: AsRef<str>>(&self, zone_id: &str, instance_ids: &[S]) -> CloudResult<Vec<Instance>> {
        let mut params = Params::new();
        params.members("InstanceId", instance_ids);
        if !zone_id.is_empty() {
            params.filter("availability-zone", &[zone_id]);
        }
        let reservations = self.list::<ReservationsPage>("DescribeInstances", params).await?;
        Ok(reservations
            .into_iter()
            .flat_map(|r| r.instances.item)
            .filter(|i| !i.is_terminated())
            .collect())
    }

    pub async fn get_instance(&self, instance_id: &str) -> CloudResult<Instance> {
        if instance_id.is_empty() {
            return Err(CloudError::NotFound("empty instance id".to_string()));
        }
        exactly_one(self.get_instances("", &[instance_id]).await?, "instance", instance_id)
    }

    pub async fn get_images<S: AsRef<str>>(&self, owners: &[ImageOwner], image_ids: &[S]) -> CloudResult<Vec<Image>> {
        let mut params = Params::new();
        params.members("Owner", &image_owner_ids(owners));
        params.members("ImageId", image_ids);
        self.list::<ImagesPage>("DescribeImages", params).await
    }

    pub async fn get_image(&self, image_id: &str) -> CloudResult<Image> {
        exactly_one(self.get_images(&[], &[image_id]).await?, "image", image_id)
    }

    // ── Peering ─────────────────────────────────────────────────────────

    /// Peering connections requested by (or, with `accepter`, accepted by) a VPC.
    pub async fn get_vpc_peering_connections(&self, vpc_id: &str, accepter: bool) -> CloudResult<Vec<VpcPeeringConnection>> {
        let mut params = Params::new();
        if !vpc_id.is_empty() {
            let filter = if accepter {
                "accepter-vpc-info.vpc-id"
            } else {
                "requester-vpc-info.vpc-id"
            };
            params.filter(filter, &[vpc_id]);
        }
        self.list::<PeeringPage>("DescribeVpcPeeringConnections", params).await
    }

    // ── Tags ────────────────────────────────────────────────────────────

    pub async fn create_tags(&self, resource_id: &str, tags: &BTreeMap<String, String>) -> CloudResult<()> {
        if tags.is_empty() {
            return Ok(());
        }
        let mut params = Params::new();
        params.set("ResourceId.1", resource_id).tags("Tag", tags);
        self.call_unit("CreateTags", &params).await
    }

    pub async fn delete_tags<S: AsRef<str>>(&self, resource_id: &str, keys: &[S]) -> CloudResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut params = Params::new();
        params.set("ResourceId.1", resource_id);
        for (i, key) in keys.iter().enumerate() {
            params.set(format!("Tag.{}.Key", i + 1), key.as_ref());
        }
        self.call_unit("DeleteTags", &params).await
    }

    /// Bring a resource's user tags to `desired`. With `replace`, tags missing
    /// from `desired` are removed too.
    pub async fn set_tags(
        &self,
        resource_id: &str,
        current: &TagSet,
        desired: &BTreeMap<String, String>,
        replace: bool,
    ) -> CloudResult<()> {
        let (upserts, removed) = current.diff(desired);
        if replace {
            self.delete_tags(resource_id, &removed).await?;
        }
        self.create_tags(resource_id, &upserts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AwsClientConfig;
    use crate::testing::{form, MockTransport};
    use stratus_core::{ErrorKind, ProviderConfig};

    fn client(mock: Arc<MockTransport>, read_only: bool) -> Ec2Client {
        let cfg = AwsClientConfig::new("InternationalCloud", "AKID", "secret", "")
            .provider_config(ProviderConfig::new("p", "prod").read_only(read_only))
            .transport(mock);
        Ec2Client::new(Arc::new(Dispatcher::new(&cfg).unwrap()), "eu-west-1")
    }

    const VPCS: &str = r#"<DescribeVpcsResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
  <requestId>7a62c49f</requestId>
  <vpcSet>
    <item>
      <vpcId>vpc-1a2b3c4d</vpcId>
      <state>available</state>
      <cidrBlock>10.0.0.0/16</cidrBlock>
      <isDefault>false</isDefault>
      <tagSet><item><key>Name</key><value>prod</value></item></tagSet>
    </item>
  </vpcSet>
</DescribeVpcsResponse>"#;

    #[tokio::test]
    async fn get_vpc_decodes_ec2_shape() {
        let mock = MockTransport::new();
        mock.push_ok(VPCS);
        let vpc = client(mock.clone(), false).get_vpc("vpc-1a2b3c4d").await.unwrap();
        assert_eq!(vpc.cidr_block, "10.0.0.0/16");
        assert_eq!(vpc.name(), "prod");
        let f = form(&mock.requests()[0]);
        assert_eq!(f["Action"], "DescribeVpcs");
        assert_eq!(f["Version"], "2016-11-15");
        assert_eq!(f["VpcId.1"], "vpc-1a2b3c4d");
    }

    #[tokio::test]
    async fn get_vpc_empty_set_is_not_found() {
        let mock = MockTransport::new();
        mock.push_ok("<DescribeVpcsResponse><vpcSet/></DescribeVpcsResponse>");
        let err = client(mock, false).get_vpc("vpc-x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn volumes_follow_next_token() {
        let mock = MockTransport::new();
        mock.push_ok(
            "<DescribeVolumesResponse><volumeSet><item><volumeId>vol-1</volumeId><size>8</size><volumeType>gp3</volumeType></item></volumeSet><nextToken>abc</nextToken></DescribeVolumesResponse>",
        );
        mock.push_ok(
            "<DescribeVolumesResponse><volumeSet><item><volumeId>vol-2</volumeId><size>100</size><volumeType>io2</volumeType><iops>3000</iops></item></volumeSet></DescribeVolumesResponse>",
        );
        let vols = client(mock.clone(), false)
            .get_volumes::<&str>(&[], "eu-west-1a", "")
            .await
            .unwrap();
        assert_eq!(vols.iter().map(|v| v.volume_id.as_str()).collect::<Vec<_>>(), ["vol-1", "vol-2"]);
        assert_eq!(vols[1].iops, Some(3000));

        let second = form(&mock.requests()[1]);
        assert_eq!(second["NextToken"], "abc");
        assert_eq!(second["Filter.1.Name"], "availability-zone");
        assert_eq!(second["Filter.1.Value.1"], "eu-west-1a");
    }

    #[tokio::test]
    async fn delete_volume_refused_when_read_only() {
        let mock = MockTransport::new();
        let err = client(mock.clone(), true).delete_volume("vol-1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadOnly);
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn terminated_instances_are_skipped() {
        let mock = MockTransport::new();
        mock.push_ok(
            r#"<DescribeInstancesResponse><reservationSet><item><instancesSet>
<item><instanceId>i-live</instanceId><instanceState><code>16</code><name>running</name></instanceState>
<placement><availabilityZone>eu-west-1a</availabilityZone></placement>
<cpuOptions><coreCount>2</coreCount><threadsPerCore>2</threadsPerCore></cpuOptions>
<blockDeviceMapping><item><deviceName>/dev/xvda</deviceName><ebs><volumeId>vol-9</volumeId><status>attached</status></ebs></item></blockDeviceMapping>
<networkInterfaceSet><item><networkInterfaceId>eni-1</networkInterfaceId><association><publicIp>54.1.2.3</publicIp><ipOwnerId>123</ipOwnerId></association></item></networkInterfaceSet>
</item>
<item><instanceId>i-dead</instanceId><instanceState><code>48</code><name>terminated</name></instanceState></item>
</instancesSet></item></reservationSet></DescribeInstancesResponse>"#,
        );
        let instances = client(mock.clone(), false)
            .get_instances::<&str>("eu-west-1a", &[])
            .await
            .unwrap();
        assert_eq!(instances.len(), 1);
        let i = &instances[0];
        assert_eq!(i.instance_id, "i-live");
        assert_eq!(i.vcpu_count(), 4);
        assert_eq!(i.volume_ids(), ["vol-9"]);
        assert_eq!(i.eip(), Some("54.1.2.3"));
        assert_eq!(i.os_type(), "Linux");
    }

    #[tokio::test]
    async fn subnet_public_ip_defaults_to_false() {
        let mock = MockTransport::new();
        mock.push_ok("<ModifySubnetAttributeResponse><return>true</return></ModifySubnetAttributeResponse>");
        mock.push_ok("<ModifySubnetAttributeResponse><return>true</return></ModifySubnetAttributeResponse>");
        let ec2 = client(mock.clone(), false);
        ec2.modify_subnet_attribute("subnet-1", false).await.unwrap();
        ec2.modify_subnet_attribute("subnet-1", true).await.unwrap();
        let reqs = mock.requests();
        assert_eq!(form(&reqs[0])["MapPublicIpOnLaunch.Value"], "false");
        assert_eq!(form(&reqs[1])["MapPublicIpOnLaunch.Value"], "true");
    }

    #[tokio::test]
    async fn replace_route_action_and_target() {
        let mock = MockTransport::new();
        mock.push_ok("<ReplaceRouteResponse><return>true</return></ReplaceRouteResponse>");
        client(mock.clone(), false)
            .replace_route("rtb-1", "0.0.0.0/0", &RouteTarget::from_id("nat-0abc"))
            .await
            .unwrap();
        let f = form(&mock.requests()[0]);
        assert_eq!(f["Action"], "ReplaceRoute");
        assert_eq!(f["NatGatewayId"], "nat-0abc");
        assert_eq!(f["DestinationCidrBlock"], "0.0.0.0/0");
    }

    #[test]
    fn route_target_prefixes() {
        assert_eq!(RouteTarget::from_id("igw-1"), RouteTarget::Gateway("igw-1".into()));
        assert_eq!(RouteTarget::from_id("i-1"), RouteTarget::Instance("i-1".into()));
        assert_eq!(RouteTarget::from_id("pcx-1"), RouteTarget::VpcPeering("pcx-1".into()));
        assert_eq!(RouteTarget::from_id("vgw-1"), RouteTarget::Gateway("vgw-1".into()));
    }

    #[tokio::test]
    async fn create_snapshot_tags_name() {
        let mock = MockTransport::new();
        mock.push_ok(
            "<CreateSnapshotResponse><requestId>r</requestId><snapshotId>snap-1</snapshotId><volumeId>vol-1</volumeId><status>pending</status><volumeSize>8</volumeSize></CreateSnapshotResponse>",
        );
        let snap = client(mock.clone(), false)
            .create_snapshot("vol-1", "nightly", "")
            .await
            .unwrap();
        assert_eq!(snap.snapshot_id, "snap-1");
        let f = form(&mock.requests()[0]);
        assert_eq!(f["TagSpecification.1.ResourceType"], "snapshot");
        assert_eq!(f["TagSpecification.1.Tag.1.Value"], "nightly");
        assert!(!f.contains_key("Description"));
    }

    #[tokio::test]
    async fn set_tags_replace_removes_stale_keys() {
        let mock = MockTransport::new();
        mock.push_ok("<DeleteTagsResponse><return>true</return></DeleteTagsResponse>");
        mock.push_ok("<CreateTagsResponse><return>true</return></CreateTagsResponse>");
        let current = TagSet::from_pairs([("old".to_string(), "1".to_string())]);
        let desired: BTreeMap<String, String> = [("new".to_string(), "2".to_string())].into();
        client(mock.clone(), false)
            .set_tags("i-1", &current, &desired, true)
            .await
            .unwrap();
        assert_eq!(mock.actions(), ["DeleteTags", "CreateTags"]);
        assert_eq!(form(&mock.requests()[0])["Tag.1.Key"], "old");
        assert_eq!(form(&mock.requests()[1])["Tag.1.Key"], "new");
    }

    #[tokio::test]
    async fn delete_vpc_keeps_main_route_table() {
        let mock = MockTransport::new();
        mock.on_action(
            "DescribeInternetGateways",
            200,
            "<r><internetGatewaySet><item><internetGatewayId>igw-1</internetGatewayId><attachmentSet><item><vpcId>vpc-1</vpcId><state>available</state></item></attachmentSet></item></internetGatewaySet></r>",
        );
        mock.on_action(
            "DescribeRouteTables",
            200,
            "<r><routeTableSet><item><routeTableId>rtb-main</routeTableId><vpcId>vpc-1</vpcId><associationSet><item><main>true</main></item></associationSet></item><item><routeTableId>rtb-2</routeTableId><vpcId>vpc-1</vpcId></item></routeTableSet></r>",
        );
        for action in ["DetachInternetGateway", "DeleteInternetGateway", "DeleteRouteTable", "DeleteVpc"] {
            mock.on_action(action, 200, "<r><return>true</return></r>");
        }
        client(mock.clone(), false)
            .delete_vpc_with_dependencies("vpc-1")
            .await
            .unwrap();
        assert_eq!(
            mock.actions(),
            [
                "DescribeInternetGateways",
                "DetachInternetGateway",
                "DeleteInternetGateway",
                "DescribeRouteTables",
                "DeleteRouteTable",
                "DeleteVpc"
            ]
        );
        let delete_rt = mock
            .requests()
            .into_iter()
            .find(|r| form(r)["Action"] == "DeleteRouteTable")
            .unwrap();
        assert_eq!(form(&delete_rt)["RouteTableId"], "rtb-2");
    }

    #[test]
    fn image_owner_expansion() {
        let ids = image_owner_ids(&[ImageOwner::Own, ImageOwner::Account("amazon".into())]);
        assert_eq!(ids, ["self", "amazon"]);
        let system = image_owner_ids(&[ImageOwner::System]);
        assert!(system.contains(&"099720109477".to_string()));
        assert_eq!(image_publisher("099720109477"), Some("ubuntu"));
    }
}
