//! Provider-level configuration handed to every adapter by the outer framework.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Callback invoked with `(service, action)` whenever the provider answers 403.
pub type PermissionCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// HTTP client settings used to build the shared transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
    /// Optional HTTPS proxy URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            connect_timeout_secs: 10,
            pool_max_idle_per_host: 10,
            proxy: None,
        }
    }
}

/// Configuration shared by all provider adapters.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Cloud account id in the outer framework.
    pub id: String,
    /// Display name of the cloud account.
    pub name: String,
    /// Refuse every mutating request before it reaches the network.
    #[serde(default)]
    pub read_only: bool,
    /// Receives `(service, action)` for each permission denial.
    #[serde(skip)]
    pub update_permission: Option<PermissionCallback>,
    #[serde(default)]
    pub http: HttpConfig,
}

impl ProviderConfig {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn on_permission_denied(mut self, callback: PermissionCallback) -> Self {
        self.update_permission = Some(callback);
        self
    }

    pub fn http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Report a denied `(service, action)` pair to the callback, if any.
    pub fn report_denied(&self, service: &str, action: &str) {
        log::debug!("provider {}: permission denied for {} {}", self.id, service, action);
        if let Some(ref cb) = self.update_permission {
            cb(service, action);
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("read_only", &self.read_only)
            .field("update_permission", &self.update_permission.is_some())
            .field("http", &self.http)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn report_denied_invokes_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cfg = ProviderConfig::new("acc-1", "prod").on_permission_denied(Arc::new(
            move |service: &str, action: &str| {
                sink.lock().unwrap().push(format!("{service}:{action}"));
            },
        ));
        cfg.report_denied("ec2", "DescribeVpcs");
        assert_eq!(seen.lock().unwrap().as_slice(), ["ec2:DescribeVpcs"]);
    }

    #[test]
    fn report_denied_without_callback_is_noop() {
        ProviderConfig::default().report_denied("s3", "GET /");
    }

    #[test]
    fn serde_skips_callback() {
        let cfg = ProviderConfig::new("acc-1", "prod")
            .read_only(true)
            .on_permission_denied(Arc::new(|_: &str, _: &str| {}));
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"readOnly\":true"));
        let back: ProviderConfig = serde_json::from_str(&json).unwrap();
        assert!(back.read_only);
        assert!(back.update_permission.is_none());
        assert_eq!(back.http, HttpConfig::default());
    }

    #[test]
    fn debug_hides_callback() {
        let cfg = ProviderConfig::new("a", "b").on_permission_denied(Arc::new(|_: &str, _: &str| {}));
        let s = format!("{:?}", cfg);
        assert!(s.contains("update_permission: true"));
    }
}
