//! One AWS region: lazily fetched zones and VPCs, regional service clients
//! and the region's share of the account's buckets.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use stratus_core::resource::{CloudResource, REGION_STATUS_INSERVICE};
use stratus_core::{CannedAcl, CloudError, CloudResult, RegionLookup, ResultExt};
use tokio::sync::OnceCell;

use crate::buckets::BucketCache;
use crate::cloudwatch::CloudWatchClient;
use crate::config::{region_name, region_name_en, CLOUD_PROVIDER_AWS};
use crate::dispatch::Dispatcher;
use crate::ec2::{Ec2Client, Vpc};
use crate::ecs::EcsClient;
use crate::elasticache::ElastiCacheClient;
use crate::elb::ElbClient;
use crate::kinesis::KinesisClient;
use crate::lambda::LambdaClient;
use crate::rds::RdsClient;
use crate::s3::{Bucket, S3Client};
use crate::wafv2::Wafv2Client;
use crate::zone::{Host, Storage, Zone};

/// Display-name prefix of every region.
const REGION_NAME_PREFIX: &str = "AWS";

pub struct Region {
    id: String,
    provider_id: String,
    dispatcher: Arc<Dispatcher>,
    buckets: Arc<BucketCache>,
    zones: OnceCell<Vec<Zone>>,
    vpcs: OnceCell<Vec<Vpc>>,
}

impl Region {
    pub(crate) fn new(id: &str, provider_id: &str, dispatcher: Arc<Dispatcher>, buckets: Arc<BucketCache>) -> Self {
        Self {
            id: id.to_string(),
            provider_id: provider_id.to_string(),
            dispatcher,
            buckets,
            zones: OnceCell::new(),
            vpcs: OnceCell::new(),
        }
    }

    /// Display names keyed by locale.
    pub fn i18n_name(&self) -> BTreeMap<&'static str, String> {
        let mut names = BTreeMap::new();
        names.insert("zh_CN", self.name());
        names.insert("en", format!("{} {}", REGION_NAME_PREFIX, region_name_en(&self.id)));
        names
    }

    // ── Service clients ─────────────────────────────────────────────────

    pub fn ec2(&self) -> Ec2Client {
        Ec2Client::new(self.dispatcher.clone(), &self.id)
    }

    pub fn rds(&self) -> RdsClient {
        RdsClient::new(self.dispatcher.clone(), &self.id)
    }

    pub fn elasticache(&self) -> ElastiCacheClient {
        ElastiCacheClient::new(self.dispatcher.clone(), &self.id)
    }

    pub fn elb(&self) -> ElbClient {
        ElbClient::new(self.dispatcher.clone(), &self.id)
    }

    pub fn s3(&self) -> S3Client {
        S3Client::new(self.dispatcher.clone(), &self.id)
    }

    pub fn cloudwatch(&self) -> CloudWatchClient {
        CloudWatchClient::new(self.dispatcher.clone(), &self.id)
    }

    pub fn wafv2(&self) -> Wafv2Client {
        Wafv2Client::new(self.dispatcher.clone(), &self.id)
    }

    pub fn kinesis(&self) -> KinesisClient {
        KinesisClient::new(self.dispatcher.clone(), &self.id)
    }

    pub fn ecs(&self) -> EcsClient {
        EcsClient::new(self.dispatcher.clone(), &self.id)
    }

    pub fn lambda(&self) -> LambdaClient {
        LambdaClient::new(self.dispatcher.clone(), &self.id)
    }

    // ── Infrastructure ──────────────────────────────────────────────────

    pub async fn zones(&self) -> CloudResult<&[Zone]> {
        let zones = self
            .zones
            .get_or_try_init(|| async {
                let zones = self.ec2().describe_availability_zones().await?;
                Ok::<_, CloudError>(
                    zones
                        .iter()
                        .map(|z| Zone::new(&self.provider_id, &self.id, z))
                        .collect(),
                )
            })
            .await
            .with_context(|| format!("zones of {}", self.id))?;
        Ok(zones.as_slice())
    }

    pub async fn zone_by_id(&self, global_id: &str) -> CloudResult<&Zone> {
        self.zones()
            .await?
            .iter()
            .find(|z| z.global_id() == global_id)
            .ok_or_else(|| CloudError::NotFound(format!("zone {}", global_id)))
    }

    pub async fn vpcs(&self) -> CloudResult<&[Vpc]> {
        let vpcs = self
            .vpcs
            .get_or_try_init(|| async { self.ec2().get_vpcs::<&str>(&[]).await })
            .await
            .with_context(|| format!("vpcs of {}", self.id))?;
        Ok(vpcs.as_slice())
    }

    pub async fn hosts(&self) -> CloudResult<Vec<Host>> {
        Ok(self.zones().await?.iter().map(Zone::host).collect())
    }

    pub async fn storages(&self) -> CloudResult<Vec<Storage>> {
        Ok(self.zones().await?.iter().flat_map(Zone::storages).collect())
    }

    // ── Buckets ─────────────────────────────────────────────────────────

    /// Buckets located in this region.
    pub async fn buckets(&self) -> CloudResult<Vec<Bucket>> {
        let all = self.buckets.get().await.context("buckets")?;
        Ok(all.iter().filter(|b| b.location == self.id).cloned().collect())
    }

    pub async fn bucket_by_name(&self, name: &str) -> CloudResult<Bucket> {
        self.buckets()
            .await?
            .into_iter()
            .find(|b| b.name == name)
            .ok_or_else(|| CloudError::NotFound(format!("bucket {} in {}", name, self.id)))
    }

    pub async fn create_bucket(&self, name: &str, acl: Option<CannedAcl>) -> CloudResult<()> {
        self.s3().create_bucket(name, acl).await?;
        self.buckets.invalidate();
        Ok(())
    }

    pub async fn delete_bucket(&self, name: &str) -> CloudResult<()> {
        self.s3().delete_bucket(name).await?;
        self.buckets.invalidate();
        Ok(())
    }

    pub async fn bucket_exists(&self, name: &str) -> CloudResult<bool> {
        self.s3().head_bucket(name).await
    }
}

impl CloudResource for Region {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> String {
        format!("{} {}", REGION_NAME_PREFIX, region_name(&self.id))
    }

    fn global_id(&self) -> String {
        format!("{}/{}", CLOUD_PROVIDER_AWS, self.id)
    }

    fn status(&self) -> String {
        REGION_STATUS_INSERVICE.to_string()
    }
}

#[async_trait]
impl RegionLookup for Region {
    type Host = Host;
    type Vpc = Vpc;
    type Storage = Storage;

    fn region_id(&self) -> &str {
        &self.id
    }

    async fn host_by_id(&self, id: &str) -> CloudResult<Host> {
        for zone in self.zones().await? {
            match zone.host_by_id(id) {
                Ok(host) => return Ok(host),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(CloudError::NotFound(format!("host {} in {}", id, self.id)))
    }

    async fn vpc_by_id(&self, id: &str) -> CloudResult<Vpc> {
        self.vpcs()
            .await?
            .iter()
            .find(|v| v.vpc_id == id)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(format!("vpc {} in {}", id, self.id)))
    }

    async fn storage_by_id(&self, id: &str) -> CloudResult<Storage> {
        for zone in self.zones().await? {
            match zone.storage_by_id(id) {
                Ok(storage) => return Ok(storage),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(CloudError::NotFound(format!("storage {} in {}", id, self.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AwsClientConfig;
    use crate::testing::MockTransport;
    use stratus_core::ErrorKind;

    const ZONES: &str = r#"<DescribeAvailabilityZonesResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
  <availabilityZoneInfo>
    <item><zoneName>eu-west-1a</zoneName><zoneState>available</zoneState><regionName>eu-west-1</regionName></item>
    <item><zoneName>eu-west-1b</zoneName><zoneState>available</zoneState><regionName>eu-west-1</regionName></item>
  </availabilityZoneInfo>
</DescribeAvailabilityZonesResponse>"#;

    const VPCS: &str = r#"<DescribeVpcsResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
  <vpcSet><item><vpcId>vpc-x</vpcId><state>available</state><cidrBlock>10.0.0.0/16</cidrBlock><isDefault>true</isDefault></item></vpcSet>
</DescribeVpcsResponse>"#;

    fn region(mock: Arc<MockTransport>, id: &str) -> Region {
        let cfg = AwsClientConfig::new("InternationalCloud", "AKID", "secret", "").transport(mock);
        let dispatcher = Arc::new(Dispatcher::new(&cfg).unwrap());
        let buckets = Arc::new(BucketCache::new(dispatcher.clone(), vec![id.to_string()]));
        Region::new(id, "acc-1", dispatcher, buckets)
    }

    #[test]
    fn names_and_ids() {
        let r = region(MockTransport::new(), "eu-west-1");
        assert_eq!(r.global_id(), "Aws/eu-west-1");
        assert_eq!(r.name(), "AWS 欧洲(爱尔兰)");
        assert_eq!(r.i18n_name()["en"], "AWS Europe (Ireland)");
        assert_eq!(r.status(), REGION_STATUS_INSERVICE);
    }

    #[tokio::test]
    async fn zones_fetched_once() {
        let mock = MockTransport::new();
        mock.on_action("DescribeAvailabilityZones", 200, ZONES);
        let r = region(mock.clone(), "eu-west-1");
        assert_eq!(r.zones().await.unwrap().len(), 2);
        assert_eq!(r.storages().await.unwrap().len(), 14);
        let host = r.host_by_id("acc-1-eu-west-1b").await.unwrap();
        assert_eq!(host.zone_id, "eu-west-1b");
        assert!(r.storage_by_id("acc-1-eu-west-1a-st1").await.is_ok());
        assert_eq!(r.zone_by_id("Aws/eu-west-1/eu-west-1a").await.unwrap().id(), "eu-west-1a");
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn vpc_lookup() {
        let mock = MockTransport::new();
        mock.on_action("DescribeVpcs", 200, VPCS);
        let r = region(mock.clone(), "eu-west-1");
        assert!(r.vpc_by_id("vpc-x").await.unwrap().is_default);
        let err = r.vpc_by_id("vpc-y").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn failed_zone_fetch_is_retried() {
        let mock = MockTransport::new();
        mock.push_status(500, "<Response><Errors><Error><Code>InternalError</Code><Message>x</Message></Error></Errors></Response>");
        mock.push_ok(ZONES);
        let r = region(mock.clone(), "eu-west-1");
        assert_eq!(r.zones().await.unwrap_err().kind(), ErrorKind::Provider);
        assert_eq!(r.zones().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn bucket_mutations_invalidate_the_cache() {
        let mock = MockTransport::new();
        mock.route(|req| {
            let body = match (req.method.as_str(), req.url.path(), req.url.query()) {
                ("GET", "/", None) => "<ListAllMyBucketsResult><Buckets><Bucket><Name>b1</Name></Bucket></Buckets></ListAllMyBucketsResult>",
                ("GET", "/b1", Some("location")) => "<LocationConstraint>eu-west-1</LocationConstraint>",
                ("PUT", "/b2", None) => "",
                _ => return None,
            };
            Some(crate::testing::response(200, body))
        });
        let r = region(mock.clone(), "eu-west-1");
        assert_eq!(r.buckets().await.unwrap().len(), 1);
        assert_eq!(r.bucket_by_name("b1").await.unwrap().location, "eu-west-1");
        let before = mock.request_count();
        r.create_bucket("b2", Some(CannedAcl::Private)).await.unwrap();
        r.buckets().await.unwrap();
        // PUT plus a fresh listing and location lookup.
        assert_eq!(mock.request_count(), before + 3);
    }
}
