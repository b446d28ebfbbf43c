//! Account-wide bucket list, cached until explicitly invalidated.

use std::sync::{Arc, RwLock};
use stratus_core::{CloudResult, ResultExt};

use crate::dispatch::Dispatcher;
use crate::s3::{Bucket, S3Client};

pub struct BucketCache {
    dispatcher: Arc<Dispatcher>,
    /// Buckets located outside these regions are dropped.
    regions: Vec<String>,
    cache: RwLock<Option<Arc<Vec<Bucket>>>>,
}

impl BucketCache {
    pub fn new(dispatcher: Arc<Dispatcher>, regions: Vec<String>) -> Self {
        Self {
            dispatcher,
            regions,
            cache: RwLock::new(None),
        }
    }

    /// The cached list, fetched on first use.
    pub async fn get(&self) -> CloudResult<Arc<Vec<Bucket>>> {
        if let Some(buckets) = self.cache.read().ok().and_then(|c| c.clone()) {
            return Ok(buckets);
        }
        let buckets = Arc::new(self.fetch().await?);
        if let Ok(mut slot) = self.cache.write() {
            *slot = Some(buckets.clone());
        }
        Ok(buckets)
    }

    pub fn invalidate(&self) {
        if let Ok(mut slot) = self.cache.write() {
            *slot = None;
        }
    }

    async fn fetch(&self) -> CloudResult<Vec<Bucket>> {
        let s3 = S3Client::new(self.dispatcher.clone(), self.dispatcher.env().global_signing_region());
        let entries = s3.list_buckets().await.context("list buckets")?;
        let mut buckets = Vec::with_capacity(entries.len());
        for entry in entries {
            let location = match s3.get_bucket_location(&entry.name).await {
                Ok(location) => location,
                Err(e) => {
                    log::error!("get location of bucket {}: {}", entry.name, e);
                    continue;
                }
            };
            if !self.regions.iter().any(|r| *r == location) {
                log::error!("bucket {} is in unknown region {}", entry.name, location);
                continue;
            }
            buckets.push(Bucket {
                name: entry.name,
                location,
                creation_date: entry.creation_date,
            });
        }
        Ok(buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AwsClientConfig;
    use crate::testing::{response, MockTransport};

    const LIST: &str = r#"<ListAllMyBucketsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Owner><ID>o</ID></Owner>
  <Buckets>
    <Bucket><Name>logs</Name><CreationDate>2023-01-01T00:00:00.000Z</CreationDate></Bucket>
    <Bucket><Name>media</Name><CreationDate>2023-02-01T00:00:00.000Z</CreationDate></Bucket>
    <Bucket><Name>far-away</Name><CreationDate>2023-03-01T00:00:00.000Z</CreationDate></Bucket>
  </Buckets>
</ListAllMyBucketsResult>"#;

    fn routed() -> Arc<MockTransport> {
        let mock = MockTransport::new();
        mock.route(|req| {
            let body = match (req.url.path(), req.url.query()) {
                ("/", None) => LIST.to_string(),
                ("/logs", Some("location")) => r#"<LocationConstraint xmlns="http://s3.amazonaws.com/doc/2006-03-01/"/>"#.to_string(),
                ("/media", Some("location")) => "<LocationConstraint>eu-west-1</LocationConstraint>".to_string(),
                ("/far-away", Some("location")) => "<LocationConstraint>me-central-1</LocationConstraint>".to_string(),
                _ => return None,
            };
            Some(response(200, &body))
        });
        mock
    }

    fn cache(mock: Arc<MockTransport>) -> BucketCache {
        let cfg = AwsClientConfig::new("InternationalCloud", "AKID", "secret", "").transport(mock);
        BucketCache::new(
            Arc::new(Dispatcher::new(&cfg).unwrap()),
            vec!["us-east-1".into(), "eu-west-1".into()],
        )
    }

    #[tokio::test]
    async fn resolves_locations_and_drops_unknown_regions() {
        let mock = routed();
        let buckets = cache(mock.clone()).get().await.unwrap();
        let located: Vec<(&str, &str)> = buckets
            .iter()
            .map(|b| (b.name.as_str(), b.location.as_str()))
            .collect();
        assert_eq!(located, [("logs", "us-east-1"), ("media", "eu-west-1")]);
        assert_eq!(mock.requests()[0].url.host_str(), Some("s3.us-east-1.amazonaws.com"));
    }

    #[tokio::test]
    async fn cached_until_invalidated() {
        let mock = routed();
        let cache = cache(mock.clone());
        cache.get().await.unwrap();
        let after_first = mock.request_count();
        assert_eq!(after_first, 4);
        cache.get().await.unwrap();
        assert_eq!(mock.request_count(), after_first);
        cache.invalidate();
        cache.get().await.unwrap();
        assert_eq!(mock.request_count(), after_first * 2);
    }
}
