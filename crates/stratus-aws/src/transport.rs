//! HTTP transport and the policy middleware wrapped around it.
//!
//! ```text
//!   Dispatcher ── signed HttpRequest ──► PolicyTransport ──► ReqwestTransport ──► AWS
//!                                        │ read-only gate (refuse before I/O)
//!                                        └ 403 → permission callback
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use stratus_core::{CloudError, CloudResult, HttpConfig, ProviderConfig};

use crate::error::transport_error;

const USER_AGENT: &str = concat!("stratus-aws/", env!("CARGO_PKG_VERSION"));

/// A fully signed outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Signing name of the target service (`ec2`, `s3`, `organizations`, ...).
    pub service: &'static str,
    pub method: Method,
    pub url: url::Url,
    /// Lowercase header names.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.headers
            .get("x-amz-request-id")
            .or_else(|| self.headers.get("x-amzn-requestid"))
            .map(String::as_str)
    }
}

/// Round-trips one request. Implementations must be safe for concurrent use.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> CloudResult<HttpResponse>;
}

// ── reqwest ─────────────────────────────────────────────────────────────

/// Network transport backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn from_config(config: &HttpConfig) -> CloudResult<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(USER_AGENT);
        if let Some(ref proxy) = config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.as_str()).map_err(transport_error)?);
        }
        let http = builder.build().map_err(transport_error)?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> CloudResult<HttpResponse> {
        let mut req = self.http.request(request.method, request.url);
        for (key, value) in &request.headers {
            if key == "host" {
                continue;
            }
            req = req.header(key.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            req = req.body(request.body);
        }

        let resp = req.send().await.map_err(transport_error)?;
        let status = resp.status().as_u16();
        let mut headers = BTreeMap::new();
        for (key, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.as_str().to_string(), v.to_string());
            }
        }
        let body = resp.bytes().await.map_err(transport_error)?;
        Ok(HttpResponse { status, headers, body })
    }
}

// ── Policy middleware ───────────────────────────────────────────────────

/// Service and action a request is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestAction {
    pub service: String,
    /// Query `Action` or JSON target operation; empty for REST calls.
    pub action: String,
    pub method: String,
    pub path: String,
}

impl RequestAction {
    /// The action, or `METHOD /path` when the request carries none.
    pub fn label(&self) -> String {
        if self.action.is_empty() {
            format!("{} {}", self.method, self.path)
        } else {
            self.action.clone()
        }
    }

    fn is_read(&self) -> bool {
        if self.service == "organizations" {
            return true;
        }
        if self.action.is_empty() {
            return self.method == "GET" || self.method == "HEAD";
        }
        ["Get", "List", "Describe"]
            .iter()
            .any(|prefix| self.action.starts_with(prefix))
    }
}

/// Attribute a request to `(service, action)`.
///
/// The service is the signing name, independent of the endpoint host. Non-S3 form bodies carry `Action`; JSON-protocol calls name the operation
/// in `X-Amz-Target` (`Prefix.Operation`).
pub fn extract_action(request: &HttpRequest) -> RequestAction {
    let service = request.service.to_string();
    let mut action = String::new();
    if service != "s3" && !request.body.is_empty() {
        if let Some((_, v)) = url::form_urlencoded::parse(&request.body[..]).find(|(k, _)| k == "Action") {
            action = v.into_owned();
        }
    }
    if action.is_empty() {
        if let Some(target) = request.headers.get("x-amz-target") {
            action = target.rsplit('.').next().unwrap_or_default().to_string();
        }
    }
    RequestAction {
        service,
        action,
        method: request.method.as_str().to_string(),
        path: request.url.path().to_string(),
    }
}

/// Enforces read-only mode and reports 403s to the permission callback.
pub struct PolicyTransport {
    inner: Arc<dyn HttpTransport>,
    config: ProviderConfig,
}

impl PolicyTransport {
    pub fn new(inner: Arc<dyn HttpTransport>, config: ProviderConfig) -> Self {
        Self { inner, config }
    }

    fn check(&self, request: &HttpRequest) -> CloudResult<RequestAction> {
        let action = extract_action(request);
        if self.config.read_only && !action.is_read() {
            return Err(CloudError::ReadOnly(format!(
                "{} {} refused for read-only account {}",
                action.service,
                action.label(),
                self.config.name
            )));
        }
        Ok(action)
    }
}

#[async_trait]
impl HttpTransport for PolicyTransport {
    async fn send(&self, request: HttpRequest) -> CloudResult<HttpResponse> {
        let action = self.check(&request)?;
        let response = self.inner.send(request).await?;
        if response.status == 403 {
            log::warn!(
                "permission denied: {} {} (account {})",
                action.service,
                action.label(),
                self.config.id
            );
            let config = self.config.clone();
            let label = action.label();
            let report = tokio::task::spawn_blocking(move || config.report_denied(&action.service, &label));
            if let Err(e) = report.await {
                log::error!("permission callback of account {} failed: {}", self.config.id, e);
            }
        }
        Ok(response)
    }
}
