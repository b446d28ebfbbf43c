//! AWS IAM (Identity and Access Management) service client.
//!
//! IAM uses the Query protocol with XML responses and has one endpoint per
//! partition. Calls always run under the assumed role when one is configured.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stratus_core::{CloudResult, ResultExt};

use crate::config::AccessEnv;
use crate::dispatch::Dispatcher;
use crate::paginator::{paginate, Page};
use crate::params::Params;
use crate::service::IAM;
use crate::tags::{de_members, TagSet};
use crate::xml::MemberList;

/// Full ARN of an AWS managed policy (`ReadOnlyAccess` → `arn:aws:iam::aws:policy/ReadOnlyAccess`).
pub fn iam_arn(env: AccessEnv, policy: &str) -> String {
    format!("{}{}", env.arn_prefix(), policy)
}

/// Strip the managed-policy prefix of `env`; other ARNs are returned unchanged.
pub fn iam_common_arn(env: AccessEnv, arn: &str) -> String {
    arn.strip_prefix(env.arn_prefix()).unwrap_or(arn).to_string()
}

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    pub user_name: String,
    pub user_id: String,
    pub arn: String,
    #[serde(default)]
    pub path: String,
    pub create_date: Option<String>,
    pub password_last_used: Option<String>,
    #[serde(default, deserialize_with = "de_members")]
    pub tags: TagSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VirtualMfaDevice {
    pub serial_number: String,
    pub enable_date: Option<String>,
    pub user: Option<User>,
}

impl VirtualMfaDevice {
    pub fn is_assigned(&self) -> bool {
        self.user.is_some()
    }
}

/// `AssignmentStatus` filter of `ListVirtualMFADevices`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MfaAssignment {
    Assigned,
    Unassigned,
    Any,
}

impl MfaAssignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            MfaAssignment::Assigned => "Assigned",
            MfaAssignment::Unassigned => "Unassigned",
            MfaAssignment::Any => "Any",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetUserResult {
    user: User,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListVirtualMfaDevicesResult {
    #[serde(rename = "VirtualMFADevices", default)]
    devices: MemberList<VirtualMfaDevice>,
    #[serde(default)]
    is_truncated: bool,
    marker: Option<String>,
}

impl Page for ListVirtualMfaDevicesResult {
    type Item = VirtualMfaDevice;

    fn into_parts(self) -> (Vec<VirtualMfaDevice>, Option<String>) {
        let marker = if self.is_truncated { self.marker } else { None };
        (self.devices.member, marker)
    }
}

// ── IAM Client ──────────────────────────────────────────────────────────

pub struct IamClient {
    dispatcher: Arc<Dispatcher>,
    region: String,
}

impl IamClient {
    pub fn new(dispatcher: Arc<Dispatcher>, region: &str) -> Self {
        Self {
            dispatcher,
            region: region.to_string(),
        }
    }

    /// The named user, or the caller when `user_name` is empty.
    pub async fn get_user(&self, user_name: &str) -> CloudResult<User> {
        let mut params = Params::new();
        params.set_opt("UserName", user_name);
        let result: GetUserResult = self
            .dispatcher
            .query(&IAM, &self.region, "GetUser", &params)
            .await
            .context("GetUser")?;
        Ok(result.user)
    }

    pub async fn list_virtual_mfa_devices(&self, assignment: MfaAssignment) -> CloudResult<Vec<VirtualMfaDevice>> {
        let mut params = Params::new();
        params.set("AssignmentStatus", assignment.as_str());
        paginate::<ListVirtualMfaDevicesResult, _, _>(&mut params, "Marker", |p| async move {
            self.dispatcher
                .query(&IAM, &self.region, "ListVirtualMFADevices", &p)
                .await
        })
        .await
        .context("ListVirtualMFADevices")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AwsClientConfig;
    use crate::testing::{form, MockTransport};
    use stratus_core::ErrorKind;

    fn client(mock: Arc<MockTransport>) -> IamClient {
        let cfg = AwsClientConfig::new("InternationalCloud", "AKID", "secret", "").transport(mock);
        IamClient::new(Arc::new(Dispatcher::new(&cfg).unwrap()), "us-west-1")
    }

    #[test]
    fn policy_arn_helpers() {
        assert_eq!(
            iam_arn(AccessEnv::International, "ReadOnlyAccess"),
            "arn:aws:iam::aws:policy/ReadOnlyAccess"
        );
        assert_eq!(
            iam_arn(AccessEnv::China, "ReadOnlyAccess"),
            "arn:aws-cn:iam::aws:policy/ReadOnlyAccess"
        );
        assert_eq!(
            iam_common_arn(AccessEnv::China, "arn:aws-cn:iam::aws:policy/ReadOnlyAccess"),
            "ReadOnlyAccess"
        );
        let custom = "arn:aws:iam::123456789012:policy/mine";
        assert_eq!(iam_common_arn(AccessEnv::International, custom), custom);
    }

    #[tokio::test]
    async fn get_user_hits_global_endpoint() {
        let mock = MockTransport::new();
        mock.push_ok(
            r#"<GetUserResponse xmlns="https://iam.amazonaws.com/doc/2010-05-08/">
  <GetUserResult>
    <User>
      <UserId>AIDA1</UserId><Path>/</Path><UserName>ops</UserName>
      <Arn>arn:aws:iam::123456789012:user/ops</Arn><CreateDate>2020-01-01T00:00:00Z</CreateDate>
      <Tags><member><Key>team</Key><Value>infra</Value></member></Tags>
    </User>
  </GetUserResult>
</GetUserResponse>"#,
        );
        let user = client(mock.clone()).get_user("").await.unwrap();
        assert_eq!(user.user_name, "ops");
        assert_eq!(user.tags.tags["team"], "infra");
        let req = &mock.requests()[0];
        assert_eq!(req.url.host_str(), Some("iam.amazonaws.com"));
        let f = form(req);
        assert_eq!(f["Action"], "GetUser");
        assert!(!f.contains_key("UserName"));
    }

    #[tokio::test]
    async fn mfa_devices_follow_truncation() {
        let mock = MockTransport::new();
        mock.push_ok(
            "<R><ListVirtualMFADevicesResult><VirtualMFADevices><member><SerialNumber>arn:mfa/a</SerialNumber>\
             <User><UserName>a</UserName><UserId>1</UserId><Arn>arn:user/a</Arn></User></member></VirtualMFADevices>\
             <IsTruncated>true</IsTruncated><Marker>m1</Marker></ListVirtualMFADevicesResult></R>",
        );
        mock.push_ok(
            "<R><ListVirtualMFADevicesResult><VirtualMFADevices><member><SerialNumber>arn:mfa/b</SerialNumber></member>\
             </VirtualMFADevices><IsTruncated>false</IsTruncated><Marker>stale</Marker></ListVirtualMFADevicesResult></R>",
        );
        let devices = client(mock.clone())
            .list_virtual_mfa_devices(MfaAssignment::Any)
            .await
            .unwrap();
        assert_eq!(devices.len(), 2);
        assert!(devices[0].is_assigned());
        assert!(!devices[1].is_assigned());
        assert_eq!(mock.request_count(), 2);
        assert_eq!(form(&mock.requests()[1])["Marker"], "m1");
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let mock = MockTransport::new();
        mock.push_status(
            404,
            "<ErrorResponse><Error><Code>NoSuchEntity</Code><Message>no user</Message></Error></ErrorResponse>",
        );
        let err = client(mock).get_user("ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
