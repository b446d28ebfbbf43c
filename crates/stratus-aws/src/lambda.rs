//! AWS Lambda functions.
//!
//! REST-JSON protocol under `/2015-03-31`.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use stratus_core::{CloudResult, ResultExt};

use crate::dispatch::Dispatcher;
use crate::paginator::{paginate, Page};
use crate::params::Params;
use crate::service::LAMBDA;

const API_PREFIX: &str = "/2015-03-31";

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcConfig {
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    pub vpc_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionConfiguration {
    pub function_name: String,
    pub function_arn: String,
    pub runtime: Option<String>,
    #[serde(default)]
    pub role: String,
    pub handler: Option<String>,
    #[serde(default)]
    pub code_size: i64,
    pub description: Option<String>,
    #[serde(default)]
    pub timeout: u32,
    #[serde(default)]
    pub memory_size: u32,
    #[serde(default)]
    pub last_modified: String,
    #[serde(default)]
    pub version: String,
    pub vpc_config: Option<VpcConfig>,
    /// `Pending`, `Active`, `Inactive` or `Failed`.
    pub state: Option<String>,
    /// `Zip` or `Image`.
    pub package_type: Option<String>,
    #[serde(default)]
    pub architectures: Vec<String>,
}

impl FunctionConfiguration {
    /// VPC the function is attached to, if any.
    pub fn vpc_id(&self) -> Option<&str> {
        self.vpc_config
            .as_ref()
            .and_then(|v| v.vpc_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionCodeLocation {
    pub repository_type: Option<String>,
    pub location: Option<String>,
    pub image_uri: Option<String>,
}

/// Response of `GetFunction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionDetail {
    pub configuration: FunctionConfiguration,
    pub code: Option<FunctionCodeLocation>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListFunctionsResponse {
    #[serde(default)]
    functions: Vec<FunctionConfiguration>,
    next_marker: Option<String>,
}

impl Page for ListFunctionsResponse {
    type Item = FunctionConfiguration;

    fn into_parts(self) -> (Vec<FunctionConfiguration>, Option<String>) {
        (self.functions, self.next_marker)
    }
}

// ── Lambda Client ───────────────────────────────────────────────────────

pub struct LambdaClient {
    dispatcher: Arc<Dispatcher>,
    region: String,
}

impl LambdaClient {
    pub fn new(dispatcher: Arc<Dispatcher>, region: &str) -> Self {
        Self {
            dispatcher,
            region: region.to_string(),
        }
    }

    pub async fn list_functions(&self) -> CloudResult<Vec<FunctionConfiguration>> {
        let mut params = Params::new();
        params.set("MaxItems", "50");
        let path = format!("{}/functions/", API_PREFIX);
        paginate::<ListFunctionsResponse, _, _>(&mut params, "Marker", |p| {
            let path = path.clone();
            async move {
                self.dispatcher
                    .rest_json(&LAMBDA, &self.region, Method::GET, &path, &p)
                    .await
            }
        })
        .await
        .context("ListFunctions")
    }

    /// Function configuration, code location and tags. `name` may be a name or an ARN.
    pub async fn get_function(&self, name: &str) -> CloudResult<FunctionDetail> {
        let path = format!("{}/functions/{}", API_PREFIX, name);
        self.dispatcher
            .rest_json(&LAMBDA, &self.region, Method::GET, &path, &Params::new())
            .await
            .with_context(|| format!("GetFunction {}", name))
    }
}
