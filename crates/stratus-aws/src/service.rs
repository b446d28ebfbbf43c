//! Service descriptors: wire protocol, API version and endpoint rules per AWS service.

use stratus_core::{CloudError, CloudResult};

use crate::config::AccessEnv;

/// Wire encoding of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Form-encoded `Action`/`Version` body, XML `{Action}Result` response.
    Query,
    /// Query encoding whose responses are not wrapped in a result element.
    Ec2Query,
    /// `X-Amz-Target: {prefix}.{Action}` with a JSON body.
    Json { target_prefix: &'static str },
    /// Method + path, JSON bodies.
    RestJson,
    /// Method + path + query string, XML bodies.
    RestXml,
}

/// Where a service's endpoint lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Regional,
    /// One endpoint per partition; the request region is ignored.
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// First host label and SigV4 service name.
    pub endpoint_prefix: &'static str,
    pub service_id: &'static str,
    pub api_version: &'static str,
    pub protocol: Protocol,
    pub scope: Scope,
    /// Sign with the assumed cross-account role when one is configured.
    pub assume_role: bool,
}

impl ServiceDescriptor {
    /// The same service called with the account's own credentials.
    pub const fn without_assume_role(self) -> Self {
        Self {
            assume_role: false,
            ..self
        }
    }

    pub fn endpoint(
        &self,
        env: AccessEnv,
        region: &str,
        endpoint_override: Option<&str>,
    ) -> CloudResult<Endpoint> {
        let (host, signing_region) = match self.scope {
            Scope::Regional => (
                format!("{}.{}.{}", self.endpoint_prefix, region, env.domain_suffix()),
                region.to_string(),
            ),
            Scope::Global => {
                let (host, signing_region) = global_endpoint(self.endpoint_prefix, env);
                (host, signing_region.to_string())
            }
        };
        let base = match endpoint_override {
            Some(url) => url.to_string(),
            None => format!("https://{}", host),
        };
        let base = url::Url::parse(&base)
            .map_err(|e| CloudError::Codec(format!("invalid endpoint {}: {}", base, e)))?;
        Ok(Endpoint {
            base,
            signing_region,
            signing_name: self.endpoint_prefix,
        })
    }
}

/// Host and signing region of a partition-global service.
fn global_endpoint(prefix: &str, env: AccessEnv) -> (String, &'static str) {
    match (prefix, env) {
        ("iam", AccessEnv::International) => ("iam.amazonaws.com".into(), "us-east-1"),
        ("iam", AccessEnv::China) => ("iam.cn-north-1.amazonaws.com.cn".into(), "cn-north-1"),
        ("route53", AccessEnv::International) => ("route53.amazonaws.com".into(), "us-east-1"),
        ("route53", AccessEnv::China) => ("route53.amazonaws.com.cn".into(), "cn-northwest-1"),
        ("cloudfront", AccessEnv::International) => {
            ("cloudfront.amazonaws.com".into(), "us-east-1")
        }
        ("cloudfront", AccessEnv::China) => (
            "cloudfront.cn-northwest-1.amazonaws.com.cn".into(),
            "cn-northwest-1",
        ),
        ("organizations", AccessEnv::International) => {
            ("organizations.us-east-1.amazonaws.com".into(), "us-east-1")
        }
        ("organizations", AccessEnv::China) => (
            "organizations.cn-northwest-1.amazonaws.com.cn".into(),
            "cn-northwest-1",
        ),
        (other, env) => {
            let region = env.global_signing_region();
            (format!("{}.{}.{}", other, region, env.domain_suffix()), region)
        }
    }
}

/// A resolved endpoint: base URL plus SigV4 scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base: url::Url,
    pub signing_region: String,
    pub signing_name: &'static str,
}

impl Endpoint {
    /// Base URL joined with an absolute path and an already-encoded query string.
    pub fn url(&self, path: &str, query: &str) -> url::Url {
        let mut url = self.base.clone();
        let prefix = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}{}", prefix, path));
        url.set_query(if query.is_empty() { None } else { Some(query) });
        url
    }

    /// `host[:port]` for the `host` header.
    pub fn authority(&self) -> String {
        let host = self.base.host_str().unwrap_or_default();
        match self.base.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }
}

// ── Descriptors ─────────────────────────────────────────────────────────

pub const EC2: ServiceDescriptor = ServiceDescriptor {
    endpoint_prefix: "ec2",
    service_id: "EC2",
    api_version: "2016-11-15",
    protocol: Protocol::Ec2Query,
    scope: Scope::Regional,
    assume_role: true,
};

pub const RDS: ServiceDescriptor = ServiceDescriptor {
    endpoint_prefix: "rds",
    service_id: "RDS",
    api_version: "2014-10-31",
    protocol: Protocol::Query,
    scope: Scope::Regional,
    assume_role: true,
};

pub const ELASTICACHE: ServiceDescriptor = ServiceDescriptor {
    endpoint_prefix: "elasticache",
    service_id: "ElastiCache",
    api_version: "2015-02-02",
    protocol: Protocol::Query,
    scope: Scope::Regional,
    assume_role: true,
};

pub const ELB: ServiceDescriptor = ServiceDescriptor {
    endpoint_prefix: "elasticloadbalancing",
    service_id: "Elastic Load Balancing v2",
    api_version: "2015-12-01",
    protocol: Protocol::Query,
    scope: Scope::Regional,
    assume_role: true,
};

pub const IAM: ServiceDescriptor = ServiceDescriptor {
    endpoint_prefix: "iam",
    service_id: "IAM",
    api_version: "2010-05-08",
    protocol: Protocol::Query,
    scope: Scope::Global,
    assume_role: true,
};

pub const STS: ServiceDescriptor = ServiceDescriptor {
    endpoint_prefix: "sts",
    service_id: "STS",
    api_version: "2011-06-15",
    protocol: Protocol::Query,
    scope: Scope::Regional,
    assume_role: false,
};

pub const CLOUDWATCH: ServiceDescriptor = ServiceDescriptor {
    endpoint_prefix: "monitoring",
    service_id: "CloudWatch",
    api_version: "2010-08-01",
    protocol: Protocol::Query,
    scope: Scope::Regional,
    assume_role: true,
};

pub const ROUTE53: ServiceDescriptor = ServiceDescriptor {
    endpoint_prefix: "route53",
    service_id: "Route 53",
    api_version: "2013-04-01",
    protocol: Protocol::RestXml,
    scope: Scope::Global,
    assume_role: true,
};

pub const CLOUDFRONT: ServiceDescriptor = ServiceDescriptor {
    endpoint_prefix: "cloudfront",
    service_id: "CloudFront",
    api_version: "2020-05-31",
    protocol: Protocol::RestXml,
    scope: Scope::Global,
    assume_role: true,
};

pub const S3: ServiceDescriptor = ServiceDescriptor {
    endpoint_prefix: "s3",
    service_id: "S3",
    api_version: "2006-03-01",
    protocol: Protocol::RestXml,
    scope: Scope::Regional,
    assume_role: true,
};

pub const WAFV2: ServiceDescriptor = ServiceDescriptor {
    endpoint_prefix: "wafv2",
    service_id: "WAFV2",
    api_version: "2019-07-29",
    protocol: Protocol::Json {
        target_prefix: "AWSWAF_20190729",
    },
    scope: Scope::Regional,
    assume_role: true,
};

pub const KINESIS: ServiceDescriptor = ServiceDescriptor {
    endpoint_prefix: "kinesis",
    service_id: "Kinesis",
    api_version: "2013-12-02",
    protocol: Protocol::Json {
        target_prefix: "Kinesis_20131202",
    },
    scope: Scope::Regional,
    assume_role: true,
};

pub const ECS: ServiceDescriptor = ServiceDescriptor {
    endpoint_prefix: "ecs",
    service_id: "ECS",
    api_version: "2014-11-13",
    protocol: Protocol::Json {
        target_prefix: "AmazonEC2ContainerServiceV20141113",
    },
    scope: Scope::Regional,
    assume_role: true,
};

pub const LAMBDA: ServiceDescriptor = ServiceDescriptor {
    endpoint_prefix: "lambda",
    service_id: "Lambda",
    api_version: "2015-03-31",
    protocol: Protocol::RestJson,
    scope: Scope::Regional,
    assume_role: true,
};

pub const ORGANIZATIONS: ServiceDescriptor = ServiceDescriptor {
    endpoint_prefix: "organizations",
    service_id: "Organizations",
    api_version: "2016-11-28",
    protocol: Protocol::Json {
        target_prefix: "AWSOrganizationsV20161128",
    },
    scope: Scope::Global,
    assume_role: false,
};
