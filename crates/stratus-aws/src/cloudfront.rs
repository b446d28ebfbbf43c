//! Amazon CloudFront distributions (read-only).
//!
//! REST-XML protocol under `/2020-05-31`.

use bytes::Bytes;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use stratus_core::{CloudResult, ResultExt};

use crate::dispatch::Dispatcher;
use crate::paginator::{paginate, Page};
use crate::params::Params;
use crate::service::CLOUDFRONT;
use crate::xml;

const API_PREFIX: &str = "/2020-05-31";

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Cnames {
    #[serde(rename = "CNAME", default)]
    cname: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Aliases {
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    items: Cnames,
}

impl Aliases {
    pub fn names(&self) -> &[String] {
        &self.items.cname
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Origin {
    pub id: String,
    pub domain_name: String,
    #[serde(default)]
    pub origin_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OriginItems {
    #[serde(rename = "Origin", default)]
    origin: Vec<Origin>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Origins {
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    items: OriginItems,
}

impl Origins {
    pub fn list(&self) -> &[Origin] {
        &self.items.origin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DistributionSummary {
    pub id: String,
    #[serde(rename = "ARN", default)]
    pub arn: String,
    /// `Deployed` or `InProgress`.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub domain_name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub price_class: String,
    #[serde(rename = "WebACLId", default)]
    pub web_acl_id: String,
    pub last_modified_time: Option<String>,
    #[serde(default)]
    pub aliases: Aliases,
    #[serde(default)]
    pub origins: Origins,
}

impl DistributionSummary {
    pub fn is_deployed(&self) -> bool {
        self.status == "Deployed"
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DistributionConfig {
    #[serde(default)]
    pub caller_reference: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub price_class: String,
    #[serde(rename = "WebACLId", default)]
    pub web_acl_id: String,
    pub default_root_object: Option<String>,
    #[serde(default)]
    pub aliases: Aliases,
    #[serde(default)]
    pub origins: Origins,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Distribution {
    pub id: String,
    #[serde(rename = "ARN", default)]
    pub arn: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub domain_name: String,
    pub last_modified_time: Option<String>,
    #[serde(default)]
    pub distribution_config: DistributionConfig,
    /// `ETag` response header, required by update and delete calls.
    #[serde(skip)]
    pub etag: Option<String>,
}

// ── Responses ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct SummaryItems {
    #[serde(rename = "DistributionSummary", default)]
    summary: Vec<DistributionSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DistributionList {
    #[serde(default)]
    items: SummaryItems,
    #[serde(default)]
    is_truncated: bool,
    next_marker: Option<String>,
}

impl Page for DistributionList {
    type Item = DistributionSummary;

    fn into_parts(self) -> (Vec<DistributionSummary>, Option<String>) {
        let next = if self.is_truncated { self.next_marker } else { None };
        (self.items.summary, next)
    }
}

// ── CloudFront Client ───────────────────────────────────────────────────

pub struct CloudFrontClient {
    dispatcher: Arc<Dispatcher>,
    region: String,
}

impl CloudFrontClient {
    pub fn new(dispatcher: Arc<Dispatcher>, region: &str) -> Self {
        Self {
            dispatcher,
            region: region.to_string(),
        }
    }

    pub async fn list_distributions(&self) -> CloudResult<Vec<DistributionSummary>> {
        let mut params = Params::new();
        let path = format!("{}/distribution", API_PREFIX);
        paginate::<DistributionList, _, _>(&mut params, "Marker", |p| {
            let path = path.clone();
            async move {
                self.dispatcher
                    .rest_xml_get(&CLOUDFRONT, &self.region, &path, &p)
                    .await
            }
        })
        .await
        .context("ListDistributions")
    }

    pub async fn get_distribution(&self, id: &str) -> CloudResult<Distribution> {
        let path = format!("{}/distribution/{}", API_PREFIX, id);
        let response = self
            .dispatcher
            .rest_xml(&CLOUDFRONT, &self.region, Method::GET, &path, &Params::new(), BTreeMap::new(), Bytes::new())
            .await
            .with_context(|| format!("GetDistribution {}", id))?;
        let mut distribution: Distribution = xml::decode(&response.text())?;
        distribution.etag = response.headers.get("etag").cloned();
        Ok(distribution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AwsClientConfig;
    use crate::testing::{response, MockTransport};
    use stratus_core::ErrorKind;

    fn client(mock: Arc<MockTransport>) -> CloudFrontClient {
        let cfg = AwsClientConfig::new("InternationalCloud", "AKID", "secret", "").transport(mock);
        CloudFrontClient::new(Arc::new(Dispatcher::new(&cfg).unwrap()), "us-east-1")
    }

    #[tokio::test]
    async fn list_follows_next_marker() {
        let mock = MockTransport::new();
        mock.push_ok(
            r#"<DistributionList><Marker></Marker><NextMarker>E2</NextMarker><IsTruncated>true</IsTruncated>
<Items><DistributionSummary><Id>E1</Id><ARN>arn:aws:cloudfront::1:distribution/E1</ARN><Status>Deployed</Status>
<DomainName>d1.cloudfront.net</DomainName><Enabled>true</Enabled>
<Aliases><Quantity>1</Quantity><Items><CNAME>cdn.example.com</CNAME></Items></Aliases>
<Origins><Quantity>1</Quantity><Items><Origin><Id>s3</Id><DomainName>b.s3.amazonaws.com</DomainName></Origin></Items></Origins>
</DistributionSummary></Items></DistributionList>"#,
        );
        mock.push_ok(
            r#"<DistributionList><IsTruncated>false</IsTruncated><Items><DistributionSummary><Id>E2</Id>
<Status>InProgress</Status></DistributionSummary></Items></DistributionList>"#,
        );
        let list = client(mock.clone()).list_distributions().await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[0].is_deployed());
        assert_eq!(list[0].aliases.names(), ["cdn.example.com"]);
        assert_eq!(list[0].origins.list()[0].id, "s3");
        assert!(!list[1].is_deployed());
        let reqs = mock.requests();
        assert_eq!(reqs[0].url.host_str(), Some("cloudfront.amazonaws.com"));
        assert_eq!(reqs[1].url.query(), Some("Marker=E2"));
    }

    #[tokio::test]
    async fn get_keeps_etag() {
        let mock = MockTransport::new();
        mock.route(|req| {
            (req.url.path() == "/2020-05-31/distribution/E1").then(|| {
                let mut resp = response(
                    200,
                    "<Distribution><Id>E1</Id><Status>Deployed</Status><DistributionConfig>\
                     <CallerReference>r</CallerReference><Enabled>false</Enabled><Comment>old</Comment>\
                     </DistributionConfig></Distribution>",
                );
                resp.headers.insert("etag".into(), "E3ABC".into());
                resp
            })
        });
        let dist = client(mock).get_distribution("E1").await.unwrap();
        assert_eq!(dist.etag.as_deref(), Some("E3ABC"));
        assert!(!dist.distribution_config.enabled);
        assert_eq!(dist.distribution_config.comment, "old");
    }

    #[tokio::test]
    async fn missing_distribution() {
        let mock = MockTransport::new();
        mock.push_status(
            404,
            "<ErrorResponse><Error><Code>NoSuchDistribution</Code><Message>gone</Message></Error></ErrorResponse>",
        );
        let err = client(mock).get_distribution("E9").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
