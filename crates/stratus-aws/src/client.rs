//! The account-level AWS client.
//!
//! Construction fetches the region list (with the account's own keys) and
//! the caller identity; both stay fixed for the client's lifetime. Lookups
//! by an id that does not name its region scan the regions in order.

use std::sync::Arc;
use stratus_core::capability::{
    read_only, CAPABILITY_CACHE, CAPABILITY_CDN, CAPABILITY_CLOUDID, CAPABILITY_COMPUTE, CAPABILITY_CONTAINER,
    CAPABILITY_DNSZONE, CAPABILITY_EIP, CAPABILITY_EVENT, CAPABILITY_LOADBALANCER, CAPABILITY_NAT,
    CAPABILITY_NETWORK, CAPABILITY_OBJECTSTORE, CAPABILITY_RDS, CAPABILITY_SAML_AUTH, CAPABILITY_SECURITY_GROUP,
    CAPABILITY_VPC_PEER, CAPABILITY_WAF,
};
use stratus_core::resource::CloudResource;
use stratus_core::{CannedAcl, CloudError, CloudResult, MetricQuery, MetricValues, ResultExt};

use crate::buckets::BucketCache;
use crate::cloudfront::CloudFrontClient;
use crate::cloudwatch::CloudWatchClient;
use crate::config::{AccessEnv, AwsClientConfig};
use crate::dispatch::Dispatcher;
use crate::ec2::{Ec2Client, Vpc};
use crate::iam::{self, IamClient};
use crate::metrics::MetricsClient;
use crate::organizations::OrganizationsClient;
use crate::region::Region;
use crate::resolver;
use crate::route53::Route53Client;
use crate::s3::Bucket;
use crate::sts::{CallerIdentity, StsClient};
use crate::zone::{Host, Storage};

pub struct AwsClient {
    provider_id: String,
    env: AccessEnv,
    /// Cross-account target, when configured.
    target_account: Option<String>,
    dispatcher: Arc<Dispatcher>,
    identity: CallerIdentity,
    regions: Vec<Region>,
    buckets: Arc<BucketCache>,
}

impl AwsClient {
    pub async fn new(config: AwsClientConfig) -> CloudResult<Self> {
        let env = config.access_env;
        let dispatcher = Arc::new(Dispatcher::new(&config)?);

        let infos = Ec2Client::new(dispatcher.clone(), env.default_region())
            .describe_regions()
            .await
            .context("fetch regions")?;
        let identity = StsClient::new(dispatcher.clone(), env.default_region())
            .get_caller_identity()
            .await
            .context("fetch caller identity")?;
        log::debug!(
            "aws account {} ({}): {} regions",
            identity.account,
            env,
            infos.len()
        );

        let region_ids: Vec<String> = infos.into_iter().map(|r| r.region_name).collect();
        let buckets = Arc::new(BucketCache::new(dispatcher.clone(), region_ids.clone()));
        let regions = region_ids
            .iter()
            .map(|id| Region::new(id, &config.provider.id, dispatcher.clone(), buckets.clone()))
            .collect();

        Ok(Self {
            provider_id: config.provider.id.clone(),
            env,
            target_account: config.account_id.clone(),
            dispatcher,
            identity,
            regions,
            buckets,
        })
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn access_env(&self) -> AccessEnv {
        self.env
    }

    pub fn caller_identity(&self) -> &CallerIdentity {
        &self.identity
    }

    /// The account resources belong to: the cross-account target when one is
    /// configured, the caller's own account otherwise.
    pub fn account_id(&self) -> &str {
        self.target_account.as_deref().unwrap_or(&self.identity.account)
    }

    // ── Regions ─────────────────────────────────────────────────────────

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Region by id; an empty id selects the environment's default region.
    pub fn region(&self, id: &str) -> CloudResult<&Region> {
        let id = if id.is_empty() { self.env.default_region() } else { id };
        self.regions
            .iter()
            .find(|r| r.id() == id)
            .ok_or_else(|| CloudError::NotFound(format!("region {}", id)))
    }

    pub fn region_by_global_id(&self, global_id: &str) -> CloudResult<&Region> {
        self.regions
            .iter()
            .find(|r| r.global_id() == global_id)
            .ok_or_else(|| CloudError::NotFound(format!("region {}", global_id)))
    }

    pub async fn host_by_id(&self, id: &str) -> CloudResult<Host> {
        resolver::host_by_id(&self.regions, id).await
    }

    pub async fn vpc_by_id(&self, id: &str) -> CloudResult<Vpc> {
        resolver::vpc_by_id(&self.regions, id).await
    }

    pub async fn storage_by_id(&self, id: &str) -> CloudResult<Storage> {
        resolver::storage_by_id(&self.regions, id).await
    }

    // ── Buckets ─────────────────────────────────────────────────────────

    /// Every bucket of the account located in a known region.
    pub async fn buckets(&self) -> CloudResult<Arc<Vec<Bucket>>> {
        self.buckets.get().await
    }

    pub fn invalidate_buckets(&self) {
        self.buckets.invalidate();
    }

    // ── Partition-global services ───────────────────────────────────────

    pub fn iam(&self) -> IamClient {
        IamClient::new(self.dispatcher.clone(), self.env.default_region())
    }

    pub fn sts(&self) -> StsClient {
        StsClient::new(self.dispatcher.clone(), self.env.default_region())
    }

    pub fn route53(&self) -> Route53Client {
        Route53Client::new(self.dispatcher.clone(), self.env.default_region())
    }

    pub fn cloudfront(&self) -> CloudFrontClient {
        CloudFrontClient::new(self.dispatcher.clone(), self.env.default_region())
    }

    pub fn organizations(&self) -> OrganizationsClient {
        OrganizationsClient::new(self.dispatcher.clone(), self.env.default_region())
    }

    // ── Capabilities ────────────────────────────────────────────────────

    pub fn capabilities(&self) -> Vec<String> {
        vec![
            CAPABILITY_COMPUTE.to_string(),
            CAPABILITY_NETWORK.to_string(),
            CAPABILITY_SECURITY_GROUP.to_string(),
            CAPABILITY_EIP.to_string(),
            CAPABILITY_LOADBALANCER.to_string(),
            CAPABILITY_OBJECTSTORE.to_string(),
            CAPABILITY_RDS.to_string(),
            CAPABILITY_CACHE.to_string(),
            read_only(CAPABILITY_NAT),
            CAPABILITY_EVENT.to_string(),
            CAPABILITY_CLOUDID.to_string(),
            CAPABILITY_DNSZONE.to_string(),
            CAPABILITY_SAML_AUTH.to_string(),
            CAPABILITY_WAF.to_string(),
            CAPABILITY_VPC_PEER.to_string(),
            CAPABILITY_CONTAINER.to_string(),
            read_only(CAPABILITY_CDN),
        ]
    }

    pub fn iam_login_url(&self) -> String {
        self.env.iam_login_url(&self.identity.account)
    }

    pub fn saml_entity_id(&self) -> &'static str {
        self.env.saml_entity_id()
    }

    pub fn bucket_canned_acls(&self) -> Vec<CannedAcl> {
        self.env.canned_acls()
    }

    pub fn object_canned_acls(&self) -> Vec<CannedAcl> {
        self.env.canned_acls()
    }

    pub fn iam_arn(&self, policy: &str) -> String {
        iam::iam_arn(self.env, policy)
    }

    pub fn iam_common_arn(&self, arn: &str) -> String {
        iam::iam_common_arn(self.env, arn)
    }

    pub async fn query_account_balance(&self) -> CloudResult<f64> {
        Err(CloudError::NotSupported("QueryAccountBalance".to_string()))
    }

    pub async fn projects(&self) -> CloudResult<Vec<String>> {
        Err(CloudError::NotImplemented("GetProjects".to_string()))
    }

    // ── Metrics ─────────────────────────────────────────────────────────

    /// Answer `query` from CloudWatch in the query's region (default region when unset).
    pub async fn metrics(&self, query: &MetricQuery) -> CloudResult<MetricValues> {
        let region = query.region_id.as_deref().unwrap_or(self.env.default_region());
        MetricsClient::new(CloudWatchClient::new(self.dispatcher.clone(), region))
            .get_metrics(query)
            .await
            .with_context(|| format!("metrics of {} {}", query.resource_kind, query.resource_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{form, response, MockTransport};
    use std::sync::Mutex;
    use stratus_core::capability::{is_supported, SAML_ENTITY_ID_AWS_CN};
    use stratus_core::{ErrorKind, ProviderConfig, RegionLookup};

    const REGIONS: &str = r#"<DescribeRegionsResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
  <regionInfo>
    <item><regionName>us-east-1</regionName><regionEndpoint>ec2.us-east-1.amazonaws.com</regionEndpoint></item>
    <item><regionName>us-west-1</regionName><regionEndpoint>ec2.us-west-1.amazonaws.com</regionEndpoint></item>
    <item><regionName>eu-west-1</regionName><regionEndpoint>ec2.eu-west-1.amazonaws.com</regionEndpoint></item>
  </regionInfo>
</DescribeRegionsResponse>"#;

    const IDENTITY: &str = r#"<GetCallerIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <GetCallerIdentityResult><Arn>arn:aws:iam::111122223333:user/ops</Arn><UserId>AIDA</UserId><Account>111122223333</Account></GetCallerIdentityResult>
</GetCallerIdentityResponse>"#;

    fn bootstrap(mock: &MockTransport) {
        mock.on_action("DescribeRegions", 200, REGIONS);
        mock.on_action("GetCallerIdentity", 200, IDENTITY);
    }

    async fn client(mock: Arc<MockTransport>, env: &str, account: &str, provider: ProviderConfig) -> AwsClient {
        let cfg = AwsClientConfig::new(env, "AKID", "secret", account)
            .provider_config(provider)
            .transport(mock);
        AwsClient::new(cfg).await.unwrap()
    }

    #[tokio::test]
    async fn construction_fetches_regions_and_identity() {
        let mock = MockTransport::new();
        bootstrap(&mock);
        let c = client(mock.clone(), "InternationalCloud", "", ProviderConfig::new("acc-1", "prod")).await;
        let ids: Vec<String> = c.regions().iter().map(|r| r.id()).collect();
        assert_eq!(ids, ["us-east-1", "us-west-1", "eu-west-1"]);
        assert_eq!(c.account_id(), "111122223333");
        assert_eq!(c.region("").unwrap().id(), "us-west-1");
        assert_eq!(c.region_by_global_id("Aws/eu-west-1").unwrap().region_id(), "eu-west-1");
        assert!(c.region("ap-south-1").err().unwrap().is_not_found());
        assert_eq!(mock.actions(), ["DescribeRegions", "GetCallerIdentity"]);
        assert_eq!(mock.requests()[0].url.host_str(), Some("ec2.us-west-1.amazonaws.com"));
    }

    #[tokio::test]
    async fn read_only_bucket_listing_is_allowed() {
        let mock = MockTransport::new();
        bootstrap(&mock);
        mock.route(|req| {
            (req.method == reqwest::Method::GET && req.url.path() == "/" && req.url.query().is_none()).then(|| {
                response(
                    200,
                    "<ListAllMyBucketsResult><Buckets><Bucket><Name>b</Name></Bucket></Buckets></ListAllMyBucketsResult>",
                )
            })
        });
        mock.route(|req| {
            (req.url.query() == Some("location")).then(|| response(200, "<LocationConstraint>eu-west-1</LocationConstraint>"))
        });
        let c = client(mock, "InternationalCloud", "", ProviderConfig::new("acc-1", "prod").read_only(true)).await;
        let buckets = c.buckets().await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].location, "eu-west-1");
    }

    #[tokio::test]
    async fn denied_bucket_listing_reports_permission() {
        let mock = MockTransport::new();
        bootstrap(&mock);
        mock.route(|req| {
            (req.url.path() == "/" && req.url.query().is_none()).then(|| {
                response(403, "<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>")
            })
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let provider = ProviderConfig::new("acc-1", "prod")
            .read_only(true)
            .on_permission_denied(Arc::new(move |s: &str, a: &str| {
                sink.lock().unwrap().push((s.to_string(), a.to_string()));
            }));
        let c = client(mock, "InternationalCloud", "", provider).await;
        let err = c.buckets().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(seen.lock().unwrap().as_slice(), [("s3".to_string(), "GET /".to_string())]);
    }

    #[tokio::test]
    async fn iam_calls_assume_the_organization_role() {
        let mock = MockTransport::new();
        bootstrap(&mock);
        mock.on_action(
            "AssumeRole",
            200,
            r#"<AssumeRoleResponse><AssumeRoleResult><Credentials><AccessKeyId>ASIA</AccessKeyId>
<SecretAccessKey>s</SecretAccessKey><SessionToken>tok</SessionToken><Expiration>2099-01-01T00:00:00Z</Expiration>
</Credentials></AssumeRoleResult></AssumeRoleResponse>"#,
        );
        mock.on_action(
            "GetUser",
            200,
            r#"<GetUserResponse><GetUserResult><User><UserName>ops</UserName><UserId>AIDA</UserId>
<Arn>arn:aws:iam::123456789012:user/ops</Arn></User></GetUserResult></GetUserResponse>"#,
        );
        let c = client(mock.clone(), "InternationalCloud", "123456789012", ProviderConfig::new("acc-1", "prod")).await;
        assert_eq!(c.account_id(), "123456789012");
        c.iam().get_user("ops").await.unwrap();

        let reqs = mock.requests();
        let assume = reqs.iter().find(|r| form(r).get("Action").map(String::as_str) == Some("AssumeRole")).unwrap();
        assert_eq!(
            form(assume)["RoleArn"],
            "arn:aws:iam::123456789012:role/OrganizationAccountAccessRole"
        );
        let get_user = reqs.last().unwrap();
        assert_eq!(get_user.url.host_str(), Some("iam.amazonaws.com"));
        assert_eq!(get_user.headers["x-amz-security-token"], "tok");
    }

    #[tokio::test]
    async fn china_role_arn_partition() {
        let cfg = AwsClientConfig::new("ChinaCloud", "AKID", "secret", "123456789012");
        assert_eq!(
            cfg.role_arn().as_deref(),
            Some("arn:aws-cn:iam::123456789012:role/OrganizationAccountAccessRole")
        );
    }

    #[tokio::test]
    async fn empty_location_resolves_to_us_east_1() {
        let mock = MockTransport::new();
        bootstrap(&mock);
        mock.route(|req| {
            let body = match (req.url.path(), req.url.query()) {
                ("/", None) => "<ListAllMyBucketsResult><Buckets><Bucket><Name>legacy</Name></Bucket></Buckets></ListAllMyBucketsResult>",
                ("/legacy", Some("location")) => r#"<?xml version="1.0" encoding="UTF-8"?>
<LocationConstraint xmlns="http://s3.amazonaws.com/doc/2006-03-01/"/>"#,
                _ => return None,
            };
            Some(response(200, body))
        });
        let c = client(mock, "InternationalCloud", "", ProviderConfig::new("acc-1", "prod")).await;
        let all = c.buckets().await.unwrap();
        assert_eq!(all[0].location, "us-east-1");
        let in_region = c.region("us-east-1").unwrap().buckets().await.unwrap();
        assert_eq!(in_region.len(), 1);
        assert_eq!(in_region[0].name, "legacy");
        assert!(c.region("eu-west-1").unwrap().buckets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn vpc_resolved_across_regions() {
        let mock = MockTransport::new();
        bootstrap(&mock);
        mock.route(|req| {
            if form(req).get("Action").map(String::as_str) != Some("DescribeVpcs") {
                return None;
            }
            let body = if req.url.host_str() == Some("ec2.eu-west-1.amazonaws.com") {
                "<DescribeVpcsResponse><vpcSet><item><vpcId>vpc-x</vpcId></item></vpcSet></DescribeVpcsResponse>"
            } else {
                "<DescribeVpcsResponse><vpcSet/></DescribeVpcsResponse>"
            };
            Some(response(200, body))
        });
        let c = client(mock.clone(), "InternationalCloud", "", ProviderConfig::new("acc-1", "prod")).await;
        let vpc = c.vpc_by_id("vpc-x").await.unwrap();
        assert_eq!(vpc.vpc_id, "vpc-x");
        assert_eq!(mock.actions().iter().filter(|a| *a == "DescribeVpcs").count(), 3);
        assert!(c.vpc_by_id("vpc-none").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn capability_surface_by_environment() {
        let mock = MockTransport::new();
        bootstrap(&mock);
        let c = client(mock, "ChinaCloud", "", ProviderConfig::new("acc-1", "prod")).await;
        let caps = c.capabilities();
        assert!(caps.contains(&"nat+read_only".to_string()));
        assert!(caps.contains(&"cdn+read_only".to_string()));
        assert!(is_supported(&caps, CAPABILITY_WAF));
        assert_eq!(c.iam_login_url(), "https://111122223333.signin.amazonaws.cn/console/");
        assert_eq!(c.saml_entity_id(), SAML_ENTITY_ID_AWS_CN);
        assert_eq!(c.object_canned_acls(), [CannedAcl::Private]);
        assert_eq!(c.iam_arn("ReadOnlyAccess"), "arn:aws-cn:iam::aws:policy/ReadOnlyAccess");
        assert_eq!(c.iam_common_arn("arn:aws-cn:iam::aws:policy/ReadOnlyAccess"), "ReadOnlyAccess");
        assert_eq!(c.query_account_balance().await.unwrap_err().kind(), ErrorKind::NotSupported);
        assert!(c.projects().await.unwrap_err().kind().is_capability_miss());
    }

    #[tokio::test]
    async fn bootstrap_failure_is_reported() {
        let mock = MockTransport::new();
        mock.push_status(
            401,
            "<Response><Errors><Error><Code>AuthFailure</Code><Message>bad key</Message></Error></Errors></Response>",
        );
        let cfg = AwsClientConfig::new("InternationalCloud", "AKID", "secret", "").transport(mock);
        let err = AwsClient::new(cfg).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidAccessKey);
    }
}
