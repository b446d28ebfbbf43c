//! # stratus-aws – AWS provider adapter
//!
//! Talks to AWS over its HTTP APIs with SigV4 signing, optionally through an
//! assumed cross-account role, and enforces the provider's read-only policy
//! before any request leaves the process.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  AwsClient  (client.rs)                          │
//! │  ├── regions, caller identity, capabilities      │
//! │  ├── BucketCache (buckets.rs)                    │
//! │  ├── cross-region lookups (resolver.rs)          │
//! │  └── Region (region.rs) ── Zone (zone.rs)        │
//! │       Ec2Client · RdsClient · ElastiCacheClient  │
//! │       ElbClient · S3Client · CloudWatchClient    │
//! │       Wafv2Client · KinesisClient · EcsClient    │
//! │       LambdaClient · MetricsClient               │
//! ├──────────────────────────────────────────────────┤
//! │  Dispatcher  (dispatch.rs)                       │
//! │  ├── SessionFactory: static keys / AssumeRole    │
//! │  ├── query · json · rest_json · rest_xml         │
//! │  └── Paginator on continuation tokens            │
//! ├──────────────────────────────────────────────────┤
//! │  SigV4Signer  (signing.rs)                       │
//! ├──────────────────────────────────────────────────┤
//! │  PolicyTransport ─► ReqwestTransport (transport) │
//! │  └── read-only gate · permission-denied reports  │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## API Protocols
//!
//! | Protocol    | Services                                              |
//! |-------------|-------------------------------------------------------|
//! | Query + XML | EC2, IAM, STS, CloudWatch, RDS, ElastiCache, ELBv2    |
//! | JSON 1.1    | Organizations, WAFv2, Kinesis, ECS                    |
//! | REST + JSON | Lambda                                                |
//! | REST + XML  | S3, Route 53, CloudFront                              |

// ── Sub-modules ─────────────────────────────────────────────────────────

pub mod config;
pub mod dispatch;
pub mod error;
pub mod paginator;
pub mod params;
pub mod service;
pub mod session;
pub mod signing;
pub mod tags;
pub mod transport;
pub mod xml;

// Service clients
pub mod cloudfront;
pub mod cloudwatch;
pub mod ec2;
pub mod ecs;
pub mod elasticache;
pub mod elb;
pub mod iam;
pub mod kinesis;
pub mod lambda;
pub mod organizations;
pub mod rds;
pub mod route53;
pub mod s3;
pub mod sts;
pub mod wafv2;

// Account model
pub mod buckets;
pub mod client;
pub mod metrics;
pub mod region;
pub mod resolver;
pub mod zone;

#[cfg(test)]
mod testing;

// ── Re-exports for ergonomic access ─────────────────────────────────────

pub use client::AwsClient;
pub use config::{AccessEnv, AwsClientConfig, AwsCredentials};
pub use dispatch::Dispatcher;
pub use error::AwsError;
pub use region::Region;
pub use transport::{HttpRequest, HttpResponse, HttpTransport};
pub use zone::{Host, Storage, Zone};
