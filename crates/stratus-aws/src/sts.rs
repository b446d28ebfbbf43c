//! AWS STS (Security Token Service).
//!
//! Query protocol, API version 2011-06-15. STS calls never assume the
//! cross-account role; `AssumeRole` itself is issued by the session factory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stratus_core::{CloudError, CloudResult, ResultExt};

use crate::config::AwsCredentials;
use crate::dispatch::Dispatcher;
use crate::params::Params;
use crate::service::STS;

/// Temporary credentials as returned by `AssumeRole`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: String,
}

impl StsCredentials {
    pub fn into_credentials(self) -> CloudResult<AwsCredentials> {
        let expiration = DateTime::parse_from_rfc3339(&self.expiration)
            .map_err(|e| CloudError::Codec(format!("credential expiration {}: {}", self.expiration, e)))?
            .with_timezone(&Utc);
        Ok(AwsCredentials::new_temporary(
            &self.access_key_id,
            &self.secret_access_key,
            &self.session_token,
            Some(expiration),
        ))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssumedRoleUser {
    pub arn: String,
    pub assumed_role_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssumeRoleResult {
    pub credentials: StsCredentials,
    pub assumed_role_user: Option<AssumedRoleUser>,
}

/// Response of `GetCallerIdentity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
    pub user_id: String,
}

pub struct StsClient {
    dispatcher: Arc<Dispatcher>,
    region: String,
}

impl StsClient {
    pub fn new(dispatcher: Arc<Dispatcher>, region: &str) -> Self {
        Self {
            dispatcher,
            region: region.to_string(),
        }
    }

    pub async fn get_caller_identity(&self) -> CloudResult<CallerIdentity> {
        self.dispatcher
            .query(&STS, &self.region, "GetCallerIdentity", &Params::new())
            .await
            .context("GetCallerIdentity")
    }
}
