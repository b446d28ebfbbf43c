//! Capability tags, canned ACLs and SAML entity ids.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const CAPABILITY_PROJECT: &str = "project";
pub const CAPABILITY_COMPUTE: &str = "compute";
pub const CAPABILITY_NETWORK: &str = "network";
pub const CAPABILITY_SECURITY_GROUP: &str = "security_group";
pub const CAPABILITY_EIP: &str = "eip";
pub const CAPABILITY_LOADBALANCER: &str = "loadbalancer";
pub const CAPABILITY_OBJECTSTORE: &str = "objectstore";
pub const CAPABILITY_RDS: &str = "rds";
pub const CAPABILITY_CACHE: &str = "cache";
pub const CAPABILITY_NAT: &str = "nat";
pub const CAPABILITY_EVENT: &str = "event";
pub const CAPABILITY_CLOUDID: &str = "cloudid";
pub const CAPABILITY_DNSZONE: &str = "dnszone";
pub const CAPABILITY_SAML_AUTH: &str = "saml_auth";
pub const CAPABILITY_WAF: &str = "waf";
pub const CAPABILITY_VPC_PEER: &str = "vpcpeer";
pub const CAPABILITY_CONTAINER: &str = "container";
pub const CAPABILITY_CDN: &str = "cdn";

/// Appended to a capability tag when the family is exposed read-only.
pub const READ_ONLY_SUFFIX: &str = "+read_only";

pub const SAML_ENTITY_ID_AWS: &str = "urn:amazon:webservices";
pub const SAML_ENTITY_ID_AWS_CN: &str = "urn:amazon:webservices:cn-north-1";

/// `capability + READ_ONLY_SUFFIX`.
pub fn read_only(capability: &str) -> String {
    format!("{}{}", capability, READ_ONLY_SUFFIX)
}

/// Whether `capabilities` exposes `capability`, either fully or read-only.
pub fn is_supported(capabilities: &[String], capability: &str) -> bool {
    let ro = read_only(capability);
    capabilities.iter().any(|c| c == capability || *c == ro)
}

/// Bucket and object canned ACLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CannedAcl {
    #[serde(rename = "private")]
    Private,
    #[serde(rename = "auth-read")]
    AuthRead,
    #[serde(rename = "public-read")]
    PublicRead,
    #[serde(rename = "public-read-write")]
    PublicReadWrite,
}

impl CannedAcl {
    pub const ALL: [CannedAcl; 4] = [
        CannedAcl::Private,
        CannedAcl::AuthRead,
        CannedAcl::PublicRead,
        CannedAcl::PublicReadWrite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CannedAcl::Private => "private",
            CannedAcl::AuthRead => "auth-read",
            CannedAcl::PublicRead => "public-read",
            CannedAcl::PublicReadWrite => "public-read-write",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        CannedAcl::ALL.into_iter().find(|acl| acl.as_str() == s)
    }
}

impl fmt::Display for CannedAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
