//! Amazon S3 bucket-level operations.
//!
//! REST-XML, path-style addressing (`https://s3.{region}.{suffix}/{bucket}`).
//! The bucket listing is partition-wide; every other call is signed for the
//! bucket's own region.

use bytes::Bytes;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use stratus_core::{CannedAcl, CloudError, CloudResult, ResultExt};

use crate::dispatch::Dispatcher;
use crate::params::Params;
use crate::service::S3;
use crate::tags::{TagList, TagSet};
use crate::xml;

/// Region of buckets whose `LocationConstraint` is empty.
pub const DEFAULT_S3_REGION_ID: &str = "us-east-1";

/// `x-amz-acl` value of a canned ACL.
pub fn acl_header(acl: CannedAcl) -> &'static str {
    match acl {
        CannedAcl::Private => "private",
        CannedAcl::AuthRead => "authenticated-read",
        CannedAcl::PublicRead => "public-read",
        CannedAcl::PublicReadWrite => "public-read-write",
    }
}

/// Region named by a `GetBucketLocation` answer.
pub fn location_region(constraint: &str) -> &str {
    match constraint.trim() {
        "" => DEFAULT_S3_REGION_ID,
        // Legacy answer for buckets created in eu-west-1.
        "EU" => "eu-west-1",
        other => other,
    }
}

// ── Types ───────────────────────────────────────────────────────────────

/// Entry of `ListBuckets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketEntry {
    pub name: String,
    pub creation_date: Option<String>,
}

/// A bucket with its resolved region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    /// Region id; `us-east-1` when S3 reports no constraint.
    pub location: String,
    pub creation_date: Option<String>,
}

impl Bucket {
    pub fn global_id(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Default, Deserialize)]
struct BucketEntries {
    #[serde(rename = "Bucket", default)]
    bucket: Vec<BucketEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListAllMyBucketsResult {
    #[serde(default)]
    buckets: BucketEntries,
}

#[derive(Debug, Deserialize)]
struct Tagging {
    #[serde(rename = "TagSet", default)]
    tag_set: TagList,
}

fn create_bucket_body(region: &str) -> Bytes {
    if region == DEFAULT_S3_REGION_ID {
        return Bytes::new();
    }
    Bytes::from(format!(
        "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
         <LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
        region
    ))
}

// ── S3 Client ───────────────────────────────────────────────────────────

pub struct S3Client {
    dispatcher: Arc<Dispatcher>,
    region: String,
}

impl S3Client {
    pub fn new(dispatcher: Arc<Dispatcher>, region: &str) -> Self {
        Self {
            dispatcher,
            region: region.to_string(),
        }
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        query: &Params,
        headers: BTreeMap<String, String>,
        body: Bytes,
    ) -> CloudResult<String> {
        let response = self
            .dispatcher
            .rest_xml(&S3, &self.region, method, path, query, headers, body)
            .await?;
        Ok(response.text())
    }

    /// Every bucket of the account, whatever its region.
    pub async fn list_buckets(&self) -> CloudResult<Vec<BucketEntry>> {
        let body = self
            .call(Method::GET, "/", &Params::new(), BTreeMap::new(), Bytes::new())
            .await
            .context("ListBuckets")?;
        let result: ListAllMyBucketsResult = xml::decode(&body)?;
        Ok(result.buckets.bucket)
    }

    /// Region id of `bucket`; an empty constraint means `us-east-1`.
    pub async fn get_bucket_location(&self, bucket: &str) -> CloudResult<String> {
        let mut query = Params::new();
        query.set("location", "");
        let body = self
            .call(Method::GET, &format!("/{}", bucket), &query, BTreeMap::new(), Bytes::new())
            .await
            .with_context(|| format!("GetBucketLocation {}", bucket))?;
        let constraint = xml::element_text(&body, "LocationConstraint").unwrap_or_default();
        Ok(location_region(&constraint).to_string())
    }

    /// Create `bucket` in this client's region.
    pub async fn create_bucket(&self, bucket: &str, acl: Option<CannedAcl>) -> CloudResult<()> {
        let mut headers = BTreeMap::new();
        if let Some(acl) = acl {
            headers.insert("x-amz-acl".to_string(), acl_header(acl).to_string());
        }
        let body = create_bucket_body(&self.region);
        self.call(Method::PUT, &format!("/{}", bucket), &Params::new(), headers, body)
            .await
            .with_context(|| format!("CreateBucket {}", bucket))?;
        Ok(())
    }

    /// Delete `bucket`; a bucket that is already gone counts as deleted.
    pub async fn delete_bucket(&self, bucket: &str) -> CloudResult<()> {
        match self
            .call(Method::DELETE, &format!("/{}", bucket), &Params::new(), BTreeMap::new(), Bytes::new())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                log::debug!("delete bucket {}: {}", bucket, e);
                Ok(())
            }
            Err(e) => Err(e.context(format!("DeleteBucket {}", bucket))),
        }
    }

    pub async fn head_bucket(&self, bucket: &str) -> CloudResult<bool> {
        match self
            .call(Method::HEAD, &format!("/{}", bucket), &Params::new(), BTreeMap::new(), Bytes::new())
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.context(format!("HeadBucket {}", bucket))),
        }
    }

    /// Bucket tags; a bucket without a tag set has none.
    pub async fn get_bucket_tags(&self, bucket: &str) -> CloudResult<TagSet> {
        let mut query = Params::new();
        query.set("tagging", "");
        match self
            .call(Method::GET, &format!("/{}", bucket), &query, BTreeMap::new(), Bytes::new())
            .await
        {
            Ok(body) => {
                let tagging: Tagging = xml::decode(&body)?;
                Ok(tagging.tag_set.into())
            }
            Err(e) if matches!(e.root(), CloudError::Provider { code, .. } if code == "NoSuchTagSet") => {
                Ok(TagSet::default())
            }
            Err(e) => Err(e.context(format!("GetBucketTagging {}", bucket))),
        }
    }
}
