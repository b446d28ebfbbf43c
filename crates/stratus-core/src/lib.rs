//! # stratus-core – shared multi-cloud model
//!
//! Provider-agnostic types consumed by the provider adapters: the
//! kind-tagged error taxonomy, provider configuration (read-only flag,
//! permission callback, HTTP settings), capability tags, canned ACLs, the
//! metric query model and the resource lookup interfaces.

pub mod capability;
pub mod config;
pub mod error;
pub mod metrics;
pub mod resource;

pub use capability::CannedAcl;
pub use config::{HttpConfig, PermissionCallback, ProviderConfig};
pub use error::{CloudError, CloudResult, ErrorKind, ResultExt};
pub use metrics::{MetricQuery, MetricResourceKind, MetricType, MetricValue, MetricValues};
pub use resource::{CloudResource, RegionLookup};
