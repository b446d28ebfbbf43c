//! Cross-region lookups for ids that do not name their region.
//!
//! Regions are tried in order. A NotFound answer moves on to the next region;
//! any other error ends the scan and is returned as is.

use std::future::Future;
use stratus_core::{CloudError, CloudResult, RegionLookup};

/// First region for which `lookup` succeeds.
pub async fn scan<'a, R, T, F, Fut>(regions: &'a [R], what: &str, id: &str, lookup: F) -> CloudResult<T>
where
    R: RegionLookup,
    F: Fn(&'a R) -> Fut,
    Fut: Future<Output = CloudResult<T>>,
{
    for region in regions {
        match lookup(region).await {
            Ok(found) => return Ok(found),
            Err(e) if e.is_not_found() => continue,
            Err(e) => {
                log::error!("find {} {} in region {}: {}", what, id, region.region_id(), e);
                return Err(e);
            }
        }
    }
    Err(CloudError::NotFound(format!("{} {}", what, id)))
}

pub async fn host_by_id<R: RegionLookup>(regions: &[R], id: &str) -> CloudResult<R::Host> {
    scan(regions, "host", id, |r| r.host_by_id(id)).await
}

pub async fn vpc_by_id<R: RegionLookup>(regions: &[R], id: &str) -> CloudResult<R::Vpc> {
    scan(regions, "vpc", id, |r| r.vpc_by_id(id)).await
}

pub async fn storage_by_id<R: RegionLookup>(regions: &[R], id: &str) -> CloudResult<R::Storage> {
    scan(regions, "storage", id, |r| r.storage_by_id(id)).await
}
