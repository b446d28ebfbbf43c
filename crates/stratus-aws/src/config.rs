//! Access environment, credentials and client configuration.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use stratus_core::capability::{SAML_ENTITY_ID_AWS, SAML_ENTITY_ID_AWS_CN};
use stratus_core::{CannedAcl, ProviderConfig};

use crate::transport::HttpTransport;

pub const CLOUD_PROVIDER_AWS: &str = "Aws";

pub const AWS_INTERNATIONAL_CLOUDENV: &str = "InternationalCloud";
pub const AWS_CHINA_CLOUDENV: &str = "ChinaCloud";

pub const AWS_INTERNATIONAL_DEFAULT_REGION: &str = "us-west-1";
pub const AWS_CHINA_DEFAULT_REGION: &str = "cn-north-1";

pub const AWS_GLOBAL_ARN_PREFIX: &str = "arn:aws:iam::aws:policy/";
pub const AWS_CHINA_ARN_PREFIX: &str = "arn:aws-cn:iam::aws:policy/";

pub const DEFAULT_ASSUME_ROLE_NAME: &str = "OrganizationAccountAccessRole";

/// Lifetime requested for assumed-role sessions.
pub const ASSUME_ROLE_DURATION_SECS: u32 = 3600;

// ── Access environment ──────────────────────────────────────────────────

/// AWS partition the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AccessEnv {
    #[default]
    #[serde(rename = "InternationalCloud")]
    International,
    #[serde(rename = "ChinaCloud")]
    China,
}

impl AccessEnv {
    /// Parse an `access-url` value; anything unrecognised selects the global partition.
    pub fn parse(access_url: &str) -> Self {
        match access_url {
            AWS_CHINA_CLOUDENV => AccessEnv::China,
            _ => AccessEnv::International,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessEnv::International => AWS_INTERNATIONAL_CLOUDENV,
            AccessEnv::China => AWS_CHINA_CLOUDENV,
        }
    }

    pub fn is_china(&self) -> bool {
        matches!(self, AccessEnv::China)
    }

    pub fn default_region(&self) -> &'static str {
        match self {
            AccessEnv::International => AWS_INTERNATIONAL_DEFAULT_REGION,
            AccessEnv::China => AWS_CHINA_DEFAULT_REGION,
        }
    }

    /// ARN partition: `aws` or `aws-cn`.
    pub fn partition(&self) -> &'static str {
        match self {
            AccessEnv::International => "aws",
            AccessEnv::China => "aws-cn",
        }
    }

    pub fn domain_suffix(&self) -> &'static str {
        match self {
            AccessEnv::International => "amazonaws.com",
            AccessEnv::China => "amazonaws.com.cn",
        }
    }

    pub fn arn_prefix(&self) -> &'static str {
        match self {
            AccessEnv::International => AWS_GLOBAL_ARN_PREFIX,
            AccessEnv::China => AWS_CHINA_ARN_PREFIX,
        }
    }

    /// Region used for partition-wide calls such as the S3 bucket listing.
    pub fn global_signing_region(&self) -> &'static str {
        match self {
            AccessEnv::International => "us-east-1",
            AccessEnv::China => "cn-north-1",
        }
    }

    pub fn role_arn(&self, account_id: &str, role_name: &str) -> String {
        format!("arn:{}:iam::{}:role/{}", self.partition(), account_id, role_name)
    }

    pub fn iam_login_url(&self, account_id: &str) -> String {
        match self {
            AccessEnv::International => {
                format!("https://{}.signin.aws.amazon.com/console/", account_id)
            }
            AccessEnv::China => format!("https://{}.signin.amazonaws.cn/console/", account_id),
        }
    }

    pub fn saml_entity_id(&self) -> &'static str {
        match self {
            AccessEnv::International => SAML_ENTITY_ID_AWS,
            AccessEnv::China => SAML_ENTITY_ID_AWS_CN,
        }
    }

    /// China regions only offer private buckets and objects.
    pub fn canned_acls(&self) -> Vec<CannedAcl> {
        match self {
            AccessEnv::International => CannedAcl::ALL.to_vec(),
            AccessEnv::China => vec![CannedAcl::Private],
        }
    }
}

impl fmt::Display for AccessEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Credentials ─────────────────────────────────────────────────────────

/// Signing credentials, either the static account keys or an assumed-role session.
#[derive(Clone, Serialize, Deserialize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Present for temporary credentials issued by STS.
    pub session_token: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl AwsCredentials {
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: None,
            expiration: None,
        }
    }

    pub fn new_temporary(
        access_key_id: &str,
        secret_access_key: &str,
        session_token: &str,
        expiration: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: Some(session_token.to_string()),
            expiration,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::zero())
    }

    /// True when the credentials lapse within `window` from now.
    pub fn expires_within(&self, window: Duration) -> bool {
        match self.expiration {
            Some(exp) => Utc::now() + window >= exp,
            None => false,
        }
    }

    pub fn is_temporary(&self) -> bool {
        self.session_token.is_some()
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expiration", &self.expiration)
            .finish()
    }
}

// ── Client configuration ────────────────────────────────────────────────

/// Everything needed to build an [`AwsClient`](crate::AwsClient).
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsClientConfig {
    pub access_env: AccessEnv,
    pub access_key: String,
    pub access_secret: String,
    /// Target account for cross-account role assumption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub assume_role_name: String,
    #[serde(default)]
    pub debug: bool,
    /// Replace every service host, e.g. `http://localhost:4566`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_override: Option<String>,
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Injected transport; a reqwest transport is built from `provider.http` otherwise.
    #[serde(skip)]
    pub transport: Option<Arc<dyn HttpTransport>>,
}

impl AwsClientConfig {
    pub fn new(access_url: &str, access_key: &str, access_secret: &str, account_id: &str) -> Self {
        Self {
            access_env: AccessEnv::parse(access_url),
            access_key: access_key.to_string(),
            access_secret: access_secret.to_string(),
            account_id: Some(account_id.to_string()).filter(|id| !id.is_empty()),
            assume_role_name: DEFAULT_ASSUME_ROLE_NAME.to_string(),
            debug: false,
            endpoint_override: None,
            provider: ProviderConfig::default(),
            transport: None,
        }
    }

    pub fn provider_config(mut self, provider: ProviderConfig) -> Self {
        self.provider = provider;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Empty names keep the default role.
    pub fn assume_role_name(mut self, name: &str) -> Self {
        if !name.is_empty() {
            self.assume_role_name = name.to_string();
        }
        self
    }

    pub fn endpoint_override(mut self, url: &str) -> Self {
        self.endpoint_override = Some(url.trim_end_matches('/').to_string());
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn credentials(&self) -> AwsCredentials {
        AwsCredentials::new(&self.access_key, &self.access_secret)
    }

    /// Role ARN to assume, when a cross-account id is configured.
    pub fn role_arn(&self) -> Option<String> {
        self.account_id
            .as_deref()
            .map(|id| self.access_env.role_arn(id, &self.assume_role_name))
    }
}

impl fmt::Debug for AwsClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsClientConfig")
            .field("access_env", &self.access_env)
            .field("access_key", &self.access_key)
            .field("access_secret", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("assume_role_name", &self.assume_role_name)
            .field("debug", &self.debug)
            .field("endpoint_override", &self.endpoint_override)
            .field("provider", &self.provider)
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

// ── Region names ────────────────────────────────────────────────────────

/// Chinese display name of a region, falling back to the id.
pub fn region_name(region_id: &str) -> &str {
    match region_id {
        "us-east-2" => "美国东部(俄亥俄州)",
        "us-east-1" => "美国东部(弗吉尼亚北部)",
        "us-west-1" => "美国西部(加利福尼亚北部)",
        "us-west-2" => "美国西部(俄勒冈)",
        "af-south-1" => "非洲(开普敦)",
        "ap-east-1" => "亚太区域(香港)",
        "ap-south-1" => "亚太地区(孟买)",
        "ap-northeast-1" => "亚太区域(东京)",
        "ap-northeast-2" => "亚太区域(首尔)",
        "ap-northeast-3" => "亚太区域(大阪)",
        "ap-southeast-1" => "亚太区域(新加坡)",
        "ap-southeast-2" => "亚太区域(悉尼)",
        "ca-central-1" => "加拿大(中部)",
        "cn-north-1" => "中国(北京)",
        "cn-northwest-1" => "中国(宁夏)",
        "eu-central-1" => "欧洲(法兰克福)",
        "eu-west-1" => "欧洲(爱尔兰)",
        "eu-west-2" => "欧洲(伦敦)",
        "eu-west-3" => "欧洲(巴黎)",
        "eu-south-1" => "欧洲(米兰)",
        "eu-north-1" => "欧洲(斯德哥尔摩)",
        "me-south-1" => "中东(巴林)",
        "sa-east-1" => "南美洲(圣保罗)",
        "us-gov-west-1" => "AWS GovCloud(美国)",
        other => other,
    }
}

/// English display name of a region, falling back to the id.
pub fn region_name_en(region_id: &str) -> &str {
    match region_id {
        "us-east-2" => "US East (Ohio)",
        "us-east-1" => "US East (N. Virginia)",
        "us-west-1" => "US West (N. California)",
        "us-west-2" => "US West (Oregon)",
        "af-south-1" => "Africa (Cape Town)",
        "ap-east-1" => "Asia Pacific (Hong Kong)",
        "ap-south-1" => "Asia Pacific (Mumbai)",
        "ap-northeast-1" => "Asia Pacific (Tokyo)",
        "ap-northeast-2" => "Asia Pacific (Seoul)",
        "ap-northeast-3" => "Asia Pacific (Osaka)",
        "ap-southeast-1" => "Asia Pacific (Singapore)",
        "ap-southeast-2" => "Asia Pacific (Sydney)",
        "ca-central-1" => "Canada (Central)",
        "cn-north-1" => "China (Beijing)",
        "cn-northwest-1" => "China (Ningxia)",
        "eu-central-1" => "Europe (Frankfurt)",
        "eu-west-1" => "Europe (Ireland)",
        "eu-west-2" => "Europe (London)",
        "eu-west-3" => "Europe (Paris)",
        "eu-south-1" => "Europe (Milan)",
        "eu-north-1" => "Europe (Stockholm)",
        "me-south-1" => "Middle East (Bahrain)",
        "sa-east-1" => "South America (Sao Paulo)",
        "us-gov-west-1" => "AWS GovCloud (US-West)",
        other => other,
    }
}
