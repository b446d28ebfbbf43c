//! AWS WAFv2 web ACLs.
//!
//! JSON 1.1 protocol, target prefix `AWSWAF_20190729`. Regional ACLs are
//! listed with `Scope=REGIONAL`; CloudFront ACLs live in us-east-1 under
//! `Scope=CLOUDFRONT`.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use stratus_core::{CloudResult, ResultExt};

use crate::dispatch::Dispatcher;
use crate::paginator::{paginate, Page};
use crate::params::Params;
use crate::service::WAFV2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WafScope {
    Regional,
    Cloudfront,
}

impl WafScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            WafScope::Regional => "REGIONAL",
            WafScope::Cloudfront => "CLOUDFRONT",
        }
    }
}

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WebAclSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "ARN", default)]
    pub arn: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub lock_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VisibilityConfig {
    #[serde(default)]
    pub metric_name: String,
    #[serde(default)]
    pub sampled_requests_enabled: bool,
    #[serde(default)]
    pub cloud_watch_metrics_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WafRule {
    pub name: String,
    #[serde(default)]
    pub priority: i64,
    /// `Allow`, `Block`, `Count` or `Captcha`, when the rule carries an action.
    #[serde(default)]
    pub action: serde_json::Map<String, serde_json::Value>,
    /// Set instead of `action` on rule-group references.
    #[serde(default)]
    pub override_action: serde_json::Map<String, serde_json::Value>,
    /// Match statement as returned by the API.
    #[serde(default)]
    pub statement: serde_json::Value,
    pub visibility_config: Option<VisibilityConfig>,
}

impl WafRule {
    /// The rule action name (`Allow`, `Block`, ...), or the override action.
    pub fn action_name(&self) -> Option<&str> {
        self.action
            .keys()
            .next()
            .or_else(|| self.override_action.keys().next())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WebAcl {
    pub id: String,
    pub name: String,
    #[serde(rename = "ARN", default)]
    pub arn: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default_action: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub rules: Vec<WafRule>,
    #[serde(default)]
    pub capacity: u64,
    pub visibility_config: Option<VisibilityConfig>,
}

impl WebAcl {
    pub fn default_action_name(&self) -> Option<&str> {
        self.default_action.keys().next().map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListWebAclsResponse {
    #[serde(rename = "WebACLs", default)]
    web_acls: Vec<WebAclSummary>,
    next_marker: Option<String>,
}

impl Page for ListWebAclsResponse {
    type Item = WebAclSummary;

    fn into_parts(self) -> (Vec<WebAclSummary>, Option<String>) {
        (self.web_acls, self.next_marker)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetWebAclResponse {
    #[serde(rename = "WebACL")]
    web_acl: WebAcl,
    #[serde(default)]
    lock_token: String,
}

// ── WAFv2 Client ────────────────────────────────────────────────────────

pub struct Wafv2Client {
    dispatcher: Arc<Dispatcher>,
    region: String,
}

impl Wafv2Client {
    pub fn new(dispatcher: Arc<Dispatcher>, region: &str) -> Self {
        Self {
            dispatcher,
            region: region.to_string(),
        }
    }

    pub async fn list_web_acls(&self, scope: WafScope) -> CloudResult<Vec<WebAclSummary>> {
        let mut params = Params::new();
        paginate::<ListWebAclsResponse, _, _>(&mut params, "NextMarker", |p| async move {
            let mut body = json!({ "Scope": scope.as_str(), "Limit": 100 });
            if let Some(marker) = p.get("NextMarker") {
                body["NextMarker"] = json!(marker);
            }
            self.dispatcher.json(&WAFV2, &self.region, "ListWebACLs", &body).await
        })
        .await
        .context("ListWebACLs")
    }

    /// The ACL with its rules; `lock_token` is the token the API answered with.
    pub async fn get_web_acl(&self, scope: WafScope, name: &str, id: &str) -> CloudResult<(WebAcl, String)> {
        let body = json!({ "Scope": scope.as_str(), "Name": name, "Id": id });
        let resp: GetWebAclResponse = self
            .dispatcher
            .json(&WAFV2, &self.region, "GetWebACL", &body)
            .await
            .with_context(|| format!("GetWebACL {}", name))?;
        Ok((resp.web_acl, resp.lock_token))
    }
}
