//! Interfaces that provider resource adapters present to callers.

use async_trait::async_trait;

use crate::error::CloudResult;

pub const REGION_STATUS_INSERVICE: &str = "inservice";
pub const ZONE_STATUS_ENABLE: &str = "enable";
pub const ZONE_STATUS_SOLDOUT: &str = "soldout";
pub const HOST_STATUS_RUNNING: &str = "running";
pub const STORAGE_STATUS_ONLINE: &str = "online";
pub const STORAGE_STATUS_OFFLINE: &str = "offline";

/// Identity and status shared by every cloud resource.
pub trait CloudResource {
    fn id(&self) -> String;

    fn name(&self) -> String {
        self.id()
    }

    /// Identifier that is unique across the whole provider account.
    fn global_id(&self) -> String {
        self.id()
    }

    fn status(&self) -> String;

    /// Emulated resources have no native provider counterpart.
    fn is_emulated(&self) -> bool {
        false
    }
}

/// Region-scoped lookups the cross-region resolver fans out over.
///
/// Each method returns a NotFound-kind error when the region does not host
/// the resource.
#[async_trait]
pub trait RegionLookup: Send + Sync {
    type Host: Send;
    type Vpc: Send;
    type Storage: Send;

    fn region_id(&self) -> &str;

    async fn host_by_id(&self, id: &str) -> CloudResult<Self::Host>;

    async fn vpc_by_id(&self, id: &str) -> CloudResult<Self::Vpc>;

    async fn storage_by_id(&self, id: &str) -> CloudResult<Self::Storage>;
}
