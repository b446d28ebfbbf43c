//! AWS Organizations member accounts.
//!
//! JSON 1.1 protocol, target prefix `AWSOrganizationsV20161128`. Called with
//! the account's own credentials and always allowed for read-only accounts.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use stratus_core::{CloudResult, ResultExt};

use crate::dispatch::Dispatcher;
use crate::paginator::{paginate, Page};
use crate::params::Params;
use crate::service::ORGANIZATIONS;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub arn: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// `ACTIVE`, `SUSPENDED` or `PENDING_CLOSURE`.
    #[serde(default)]
    pub status: String,
    /// `INVITED` or `CREATED`.
    #[serde(default)]
    pub joined_method: String,
    pub joined_timestamp: Option<f64>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == "ACTIVE"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListAccountsResponse {
    #[serde(default)]
    accounts: Vec<Account>,
    next_token: Option<String>,
}

impl Page for ListAccountsResponse {
    type Item = Account;

    fn into_parts(self) -> (Vec<Account>, Option<String>) {
        (self.accounts, self.next_token)
    }
}

pub struct OrganizationsClient {
    dispatcher: Arc<Dispatcher>,
    region: String,
}

impl OrganizationsClient {
    pub fn new(dispatcher: Arc<Dispatcher>, region: &str) -> Self {
        Self {
            dispatcher,
            region: region.to_string(),
        }
    }

    pub async fn list_accounts(&self) -> CloudResult<Vec<Account>> {
        let mut params = Params::new();
        paginate::<ListAccountsResponse, _, _>(&mut params, "NextToken", |p| async move {
            let mut body = json!({});
            if let Some(token) = p.get("NextToken") {
                body["NextToken"] = json!(token);
            }
            self.dispatcher
                .json(&ORGANIZATIONS, &self.region, "ListAccounts", &body)
                .await
        })
        .await
        .context("ListAccounts")
    }
}
