//! Per-call sessions and the assumed-role credential cache.

use chrono::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use stratus_core::{CloudResult, ResultExt};

use crate::config::{AccessEnv, AwsClientConfig, AwsCredentials, ASSUME_ROLE_DURATION_SECS};
use crate::dispatch::{send_signed, Outbound};
use crate::params::Params;
use crate::service::STS;
use crate::sts::AssumeRoleResult;
use crate::transport::HttpTransport;
use crate::xml;

/// Assumed-role credentials are refreshed this long before they expire.
const REFRESH_WINDOW_MINUTES: i64 = 5;

/// Credentials bound to one region for the lifetime of a single call.
#[derive(Debug, Clone)]
pub struct Session {
    pub region: String,
    pub credentials: AwsCredentials,
    /// True when `credentials` belong to the assumed cross-account role.
    pub assumed: bool,
}

/// Mints sessions from the static account keys, assuming the configured role on demand.
pub struct SessionFactory {
    env: AccessEnv,
    base: AwsCredentials,
    role_arn: Option<String>,
    endpoint_override: Option<String>,
    debug: bool,
    /// Bypasses the policy middleware: fetching credentials is not a mutation.
    raw: Arc<dyn HttpTransport>,
    cache: Mutex<HashMap<String, AwsCredentials>>,
}

impl SessionFactory {
    pub fn new(config: &AwsClientConfig, raw: Arc<dyn HttpTransport>) -> Self {
        Self {
            env: config.access_env,
            base: config.credentials(),
            role_arn: config.role_arn(),
            endpoint_override: config.endpoint_override.clone(),
            debug: config.debug,
            raw,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn role_arn(&self) -> Option<&str> {
        self.role_arn.as_deref()
    }

    /// A session for `region`, using the assumed role when requested and configured.
    pub async fn session(&self, region: &str, assume_role: bool) -> CloudResult<Session> {
        let region = if region.is_empty() {
            self.env.default_region()
        } else {
            region
        };
        let role_arn = match self.role_arn {
            Some(ref arn) if assume_role => arn,
            _ => {
                return Ok(Session {
                    region: region.to_string(),
                    credentials: self.base.clone(),
                    assumed: false,
                })
            }
        };
        let credentials = self
            .assumed_credentials(role_arn)
            .await
            .with_context(|| format!("assume role {}", role_arn))?;
        Ok(Session {
            region: region.to_string(),
            credentials,
            assumed: true,
        })
    }

    fn cached(&self, role_arn: &str) -> Option<AwsCredentials> {
        let cache = self.cache.lock().ok()?;
        cache
            .get(role_arn)
            .filter(|c| !c.expires_within(Duration::minutes(REFRESH_WINDOW_MINUTES)))
            .cloned()
    }

    async fn assumed_credentials(&self, role_arn: &str) -> CloudResult<AwsCredentials> {
        if let Some(creds) = self.cached(role_arn) {
            return Ok(creds);
        }

        log::debug!("assuming role {}", role_arn);
        let mut params = Params::new();
        params
            .set("RoleArn", role_arn)
            .set("RoleSessionName", format!("stratus-{}", uuid::Uuid::new_v4()))
            .set("DurationSeconds", ASSUME_ROLE_DURATION_SECS.to_string());
        let endpoint = STS.endpoint(
            self.env,
            self.env.global_signing_region(),
            self.endpoint_override.as_deref(),
        )?;
        let out = Outbound::query(&STS, endpoint, "AssumeRole", &params);
        let response = send_signed(self.raw.as_ref(), &self.base, out, self.debug).await?;
        let result: AssumeRoleResult = xml::decode_result(&response.text(), "AssumeRole")?;
        let creds = result.credentials.into_credentials()?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(role_arn.to_string(), creds.clone());
        }
        Ok(creds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{form, MockTransport};
    use chrono::Utc;
    use stratus_core::{ErrorKind, ProviderConfig};

    fn assume_role_body(token: &str, expires: chrono::DateTime<Utc>) -> String {
        format!(
            r#"<AssumeRoleResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <AssumeRoleResult>
    <Credentials>
      <AccessKeyId>ASIATEMP</AccessKeyId>
      <SecretAccessKey>tempsecret</SecretAccessKey>
      <SessionToken>{}</SessionToken>
      <Expiration>{}</Expiration>
    </Credentials>
    <AssumedRoleUser><Arn>arn:aws:sts::123456789012:assumed-role/OrganizationAccountAccessRole/s</Arn><AssumedRoleId>AROA:s</AssumedRoleId></AssumedRoleUser>
  </AssumeRoleResult>
</AssumeRoleResponse>"#,
            token,
            expires.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        )
    }

    fn factory(mock: Arc<MockTransport>, access_url: &str, account: &str) -> SessionFactory {
        let cfg = AwsClientConfig::new(access_url, "AKIDBASE", "basesecret", account)
            .provider_config(ProviderConfig::new("p", "n").read_only(true));
        SessionFactory::new(&cfg, mock)
    }

    #[tokio::test]
    async fn no_account_uses_static_keys() {
        let mock = MockTransport::new();
        let f = factory(mock.clone(), "InternationalCloud", "");
        let s = f.session("", true).await.unwrap();
        assert_eq!(s.region, "us-west-1");
        assert_eq!(s.credentials.access_key_id, "AKIDBASE");
        assert!(!s.assumed);
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn assume_role_builds_partition_arn() {
        let mock = MockTransport::new();
        mock.push_ok(&assume_role_body("tok", Utc::now() + Duration::hours(1)));
        let f = factory(mock.clone(), "InternationalCloud", "123456789012");
        let s = f.session("eu-west-1", true).await.unwrap();
        assert!(s.assumed);
        assert_eq!(s.credentials.session_token.as_deref(), Some("tok"));

        let req = &mock.requests()[0];
        assert_eq!(req.host(), "sts.us-east-1.amazonaws.com");
        let form = form(req);
        assert_eq!(form["Action"], "AssumeRole");
        assert_eq!(
            form["RoleArn"],
            "arn:aws:iam::123456789012:role/OrganizationAccountAccessRole"
        );
        assert!(form["RoleSessionName"].starts_with("stratus-"));
        assert_eq!(form["DurationSeconds"], "3600");
    }

    #[tokio::test]
    async fn china_partition_arn() {
        let mock = MockTransport::new();
        mock.push_ok(&assume_role_body("tok", Utc::now() + Duration::hours(1)));
        let f = factory(mock.clone(), "ChinaCloud", "123456789012");
        assert_eq!(
            f.role_arn(),
            Some("arn:aws-cn:iam::123456789012:role/OrganizationAccountAccessRole")
        );
        f.session("cn-north-1", true).await.unwrap();
        assert_eq!(mock.requests()[0].host(), "sts.cn-north-1.amazonaws.com.cn");
    }

    #[tokio::test]
    async fn credentials_are_cached_until_refresh_window() {
        let mock = MockTransport::new();
        mock.push_ok(&assume_role_body("first", Utc::now() + Duration::hours(1)));
        mock.push_ok(&assume_role_body("second", Utc::now() + Duration::hours(1)));
        let f = factory(mock.clone(), "InternationalCloud", "42");
        f.session("us-east-1", true).await.unwrap();
        let s = f.session("eu-west-1", true).await.unwrap();
        assert_eq!(s.credentials.session_token.as_deref(), Some("first"));
        assert_eq!(mock.request_count(), 1);

        let mock = MockTransport::new();
        mock.push_ok(&assume_role_body("stale", Utc::now() + Duration::minutes(2)));
        mock.push_ok(&assume_role_body("fresh", Utc::now() + Duration::hours(1)));
        let f = factory(mock.clone(), "InternationalCloud", "42");
        f.session("us-east-1", true).await.unwrap();
        let s = f.session("us-east-1", true).await.unwrap();
        assert_eq!(s.credentials.session_token.as_deref(), Some("fresh"));
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn without_assume_role_flag_skips_sts() {
        let mock = MockTransport::new();
        let f = factory(mock.clone(), "InternationalCloud", "42");
        let s = f.session("us-east-1", false).await.unwrap();
        assert!(!s.assumed);
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn assume_role_failure_surfaces_with_context() {
        let mock = MockTransport::new();
        mock.push_status(
            403,
            "<ErrorResponse><Error><Code>AccessDenied</Code><Message>not allowed</Message></Error></ErrorResponse>",
        );
        let f = factory(mock, "InternationalCloud", "42");
        let err = f.session("us-east-1", true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(err.to_string().starts_with("assume role arn:aws:iam::42:role/"));
    }
}
