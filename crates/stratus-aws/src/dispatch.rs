//! Multi-protocol request dispatcher.
//!
//! One entry per wire protocol; the [`ServiceDescriptor`] picks endpoint,
//! API version and credential scope, so service modules stay schema-only.

use bytes::Bytes;
use chrono::Utc;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use stratus_core::{CloudError, CloudResult};

use crate::config::{AccessEnv, AwsClientConfig, AwsCredentials};
use crate::error::AwsError;
use crate::params::Params;
use crate::service::{Endpoint, Protocol, ServiceDescriptor};
use crate::session::SessionFactory;
use crate::signing::{encode_form, uri_encode, SigV4Signer};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, PolicyTransport, ReqwestTransport};
use crate::xml;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";
const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// An unsigned request bound to a resolved endpoint.
#[derive(Debug, Clone)]
pub(crate) struct Outbound {
    pub endpoint: Endpoint,
    pub method: Method,
    pub path: String,
    /// Already encoded.
    pub query: String,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    /// Operation name for error attribution and logs.
    pub action: String,
}

impl Outbound {
    /// `POST /` with a form body carrying `Action` and `Version`.
    pub fn query(svc: &ServiceDescriptor, endpoint: Endpoint, action: &str, params: &Params) -> Self {
        let mut form = params.as_map().clone();
        form.insert("Action".to_string(), action.to_string());
        form.insert("Version".to_string(), svc.api_version.to_string());
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), FORM_CONTENT_TYPE.to_string());
        Self {
            endpoint,
            method: Method::POST,
            path: "/".to_string(),
            query: String::new(),
            headers,
            body: Bytes::from(encode_form(&form)),
            action: action.to_string(),
        }
    }
}

/// `k=v&k` in key order; empty values render as bare keys (`?location`).
pub fn encode_query(params: &Params) -> String {
    params
        .as_map()
        .iter()
        .map(|(k, v)| {
            if v.is_empty() {
                uri_encode(k)
            } else {
                format!("{}={}", uri_encode(k), uri_encode(v))
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Sign `out` with `credentials`, send it and turn non-2xx answers into errors.
pub(crate) async fn send_signed(
    transport: &dyn HttpTransport,
    credentials: &AwsCredentials,
    out: Outbound,
    debug: bool,
) -> CloudResult<HttpResponse> {
    let url = out.endpoint.url(&out.path, &out.query);
    let mut headers = out.headers;
    headers.insert("host".to_string(), out.endpoint.authority());
    SigV4Signer::new(credentials, &out.endpoint.signing_region, out.endpoint.signing_name).sign(
        out.method.as_str(),
        &url,
        &mut headers,
        &out.body,
        Utc::now(),
    );

    let service = out.endpoint.signing_name;
    if debug {
        log::debug!(
            "[{}] {} {} {} body: {}",
            service,
            out.action,
            out.method,
            url,
            String::from_utf8_lossy(&out.body)
        );
    }

    let request = HttpRequest {
        service,
        method: out.method,
        url,
        headers,
        body: out.body,
    };
    let response = transport.send(request).await?;

    if debug {
        log::debug!(
            "[{}] {} response {}: {}",
            service,
            out.action,
            response.status,
            String::from_utf8_lossy(&response.body)
        );
    }

    if response.is_success() {
        return Ok(response);
    }
    let mut err = AwsError::from_response(service, response.status, &response.text());
    // REST-JSON services name the error in a header (`ResourceNotFoundException:http://...`).
    if let Some(kind) = response.headers.get("x-amzn-errortype") {
        if err.code == "UnknownError" {
            err.code = kind.split(':').next().unwrap_or(kind).to_string();
        }
    }
    if err.request_id.is_none() {
        err.request_id = response.request_id().map(str::to_string);
    }
    Err(err.with_action(&out.action).into())
}

/// Signs and sends calls for every service of one account.
pub struct Dispatcher {
    env: AccessEnv,
    endpoint_override: Option<String>,
    debug: bool,
    transport: Arc<dyn HttpTransport>,
    sessions: SessionFactory,
}

impl Dispatcher {
    /// Build the transport stack: network (or injected) transport, wrapped in the policy middleware.
    pub fn new(config: &AwsClientConfig) -> CloudResult<Self> {
        let raw: Arc<dyn HttpTransport> = match config.transport {
            Some(ref t) => t.clone(),
            None => Arc::new(ReqwestTransport::from_config(&config.provider.http)?),
        };
        let transport: Arc<dyn HttpTransport> =
            Arc::new(PolicyTransport::new(raw.clone(), config.provider.clone()));
        Ok(Self {
            env: config.access_env,
            endpoint_override: config.endpoint_override.clone(),
            debug: config.debug,
            transport,
            sessions: SessionFactory::new(config, raw),
        })
    }

    pub fn env(&self) -> AccessEnv {
        self.env
    }

    pub fn sessions(&self) -> &SessionFactory {
        &self.sessions
    }

    fn endpoint(&self, svc: &ServiceDescriptor, region: &str) -> CloudResult<Endpoint> {
        svc.endpoint(self.env, region, self.endpoint_override.as_deref())
    }

    async fn send(&self, svc: &ServiceDescriptor, region: &str, out: Outbound) -> CloudResult<HttpResponse> {
        let session = self.sessions.session(region, svc.assume_role).await?;
        send_signed(self.transport.as_ref(), &session.credentials, out, self.debug).await
    }

    async fn query_raw(
        &self,
        svc: &ServiceDescriptor,
        region: &str,
        action: &str,
        params: &Params,
    ) -> CloudResult<HttpResponse> {
        let endpoint = self.endpoint(svc, region)?;
        self.send(svc, region, Outbound::query(svc, endpoint, action, params))
            .await
    }

    /// Query-protocol call decoded into `T`.
    ///
    /// EC2 responses are decoded whole; other services from their `{Action}Result` block.
    pub async fn query<T: DeserializeOwned>(
        &self,
        svc: &ServiceDescriptor,
        region: &str,
        action: &str,
        params: &Params,
    ) -> CloudResult<T> {
        let response = self.query_raw(svc, region, action, params).await?;
        let body = response.text();
        match svc.protocol {
            Protocol::Ec2Query => xml::decode(&body),
            _ => xml::decode_result(&body, action),
        }
    }

    /// Query-protocol call whose response carries nothing of interest.
    pub async fn query_unit(
        &self,
        svc: &ServiceDescriptor,
        region: &str,
        action: &str,
        params: &Params,
    ) -> CloudResult<()> {
        self.query_raw(svc, region, action, params).await.map(|_| ())
    }

    /// JSON 1.1 call: `X-Amz-Target` names the operation.
    pub async fn json<T: DeserializeOwned>(
        &self,
        svc: &ServiceDescriptor,
        region: &str,
        action: &str,
        body: &serde_json::Value,
    ) -> CloudResult<T> {
        let target_prefix = match svc.protocol {
            Protocol::Json { target_prefix } => target_prefix,
            _ => {
                return Err(CloudError::Codec(format!(
                    "{} does not speak the JSON protocol",
                    svc.service_id
                )))
            }
        };
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), JSON_CONTENT_TYPE.to_string());
        headers.insert("x-amz-target".to_string(), format!("{}.{}", target_prefix, action));
        let out = Outbound {
            endpoint: self.endpoint(svc, region)?,
            method: Method::POST,
            path: "/".to_string(),
            query: String::new(),
            headers,
            body: Bytes::from(body.to_string()),
            action: action.to_string(),
        };
        let response = self.send(svc, region, out).await?;
        decode_json(&response.body)
    }

    /// REST-JSON call (Lambda).
    pub async fn rest_json<T: DeserializeOwned>(
        &self,
        svc: &ServiceDescriptor,
        region: &str,
        method: Method,
        path: &str,
        query: &Params,
    ) -> CloudResult<T> {
        let out = Outbound {
            endpoint: self.endpoint(svc, region)?,
            method,
            path: path.to_string(),
            query: encode_query(query),
            headers: BTreeMap::new(),
            body: Bytes::new(),
            action: String::new(),
        };
        let response = self.send(svc, region, out).await?;
        decode_json(&response.body)
    }

    /// REST-XML call (Route 53, CloudFront, S3) returning the raw response.
    #[allow(clippy::too_many_arguments)]
    pub async fn rest_xml(
        &self,
        svc: &ServiceDescriptor,
        region: &str,
        method: Method,
        path: &str,
        query: &Params,
        headers: BTreeMap<String, String>,
        body: Bytes,
    ) -> CloudResult<HttpResponse> {
        let out = Outbound {
            endpoint: self.endpoint(svc, region)?,
            method,
            path: path.to_string(),
            query: encode_query(query),
            headers,
            body,
            action: String::new(),
        };
        self.send(svc, region, out).await
    }

    /// `GET` a REST-XML resource and decode it into `T`.
    pub async fn rest_xml_get<T: DeserializeOwned>(
        &self,
        svc: &ServiceDescriptor,
        region: &str,
        path: &str,
        query: &Params,
    ) -> CloudResult<T> {
        let response = self
            .rest_xml(svc, region, Method::GET, path, query, BTreeMap::new(), Bytes::new())
            .await?;
        xml::decode(&response.text())
    }
}

/// Empty bodies decode as `{}`.
fn decode_json<T: DeserializeOwned>(body: &[u8]) -> CloudResult<T> {
    let body: &[u8] = if body.is_empty() { b"{}" } else { body };
    serde_json::from_slice(body).map_err(|e| CloudError::Codec(format!("json decode: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{EC2, IAM, KINESIS, LAMBDA, ORGANIZATIONS, RDS, S3};
    use crate::testing::{form, response, MockTransport};
    use serde::Deserialize;
    use std::sync::Mutex;
    use stratus_core::{ErrorKind, ProviderConfig};

    fn dispatcher(mock: Arc<MockTransport>, read_only: bool) -> Dispatcher {
        let cfg = AwsClientConfig::new("InternationalCloud", "AKID", "secret", "")
            .provider_config(ProviderConfig::new("p1", "prod").read_only(read_only))
            .transport(mock);
        Dispatcher::new(&cfg).unwrap()
    }

    #[derive(Debug, Deserialize)]
    struct DbInstances {
        #[serde(rename = "DBInstances", default)]
        list: DbList,
    }

    #[derive(Debug, Default, Deserialize)]
    struct DbList {
        #[serde(rename = "DBInstance", default)]
        items: Vec<Db>,
    }

    #[derive(Debug, Deserialize)]
    struct Db {
        #[serde(rename = "DBInstanceIdentifier")]
        id: String,
    }

    #[tokio::test]
    async fn query_posts_signed_form() {
        let mock = MockTransport::new();
        mock.push_ok(
            r#"<DescribeDBInstancesResponse><DescribeDBInstancesResult><DBInstances><DBInstance><DBInstanceIdentifier>db-1</DBInstanceIdentifier></DBInstance></DBInstances></DescribeDBInstancesResult></DescribeDBInstancesResponse>"#,
        );
        let d = dispatcher(mock.clone(), false);
        let mut params = Params::new();
        params.set("MaxRecords", "100");
        let out: DbInstances = d.query(&RDS, "eu-west-1", "DescribeDBInstances", &params).await.unwrap();
        assert_eq!(out.list.items[0].id, "db-1");

        let req = &mock.requests()[0];
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.host(), "rds.eu-west-1.amazonaws.com");
        assert_eq!(req.headers["content-type"], FORM_CONTENT_TYPE);
        assert!(req.headers["authorization"].contains("/eu-west-1/rds/aws4_request"));
        let form = form(req);
        assert_eq!(form["Action"], "DescribeDBInstances");
        assert_eq!(form["Version"], "2014-10-31");
        assert_eq!(form["MaxRecords"], "100");
    }

    #[tokio::test]
    async fn provider_errors_are_classified() {
        let mock = MockTransport::new();
        mock.push_status(
            400,
            "<Response><Errors><Error><Code>InvalidVolume.NotFound</Code><Message>gone</Message></Error></Errors></Response>",
        );
        let d = dispatcher(mock, false);
        let err = d
            .query_unit(&EC2, "us-east-1", "DeleteVolume", &Params::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn read_only_blocks_before_io() {
        let mock = MockTransport::new();
        let d = dispatcher(mock.clone(), true);
        let mut params = Params::new();
        params.set("VolumeId", "vol-1");
        let err = d
            .query_unit(&EC2, "us-east-1", "DeleteVolume", &params)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadOnly);
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn endpoint_override_keeps_service_attribution() {
        let mock = MockTransport::new();
        mock.route(|req| {
            (req.service == "s3").then(|| response(403, "<Error><Code>AccessDenied</Code><Message>no</Message></Error>"))
        });
        mock.route(|req| (req.service == "organizations").then(|| response(200, "{}")));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let provider = ProviderConfig::new("p1", "prod")
            .read_only(true)
            .on_permission_denied(Arc::new(move |s: &str, a: &str| {
                sink.lock().unwrap().push((s.to_string(), a.to_string()));
            }));
        let cfg = AwsClientConfig::new("InternationalCloud", "AKID", "secret", "")
            .provider_config(provider)
            .endpoint_override("http://localhost:4566")
            .transport(mock.clone());
        let d = Dispatcher::new(&cfg).unwrap();

        let _: serde_json::Value = d
            .json(&ORGANIZATIONS, "us-east-1", "EnableAllFeatures", &serde_json::json!({}))
            .await
            .unwrap();
        let err = d
            .rest_xml_get::<serde_json::Value>(&S3, "us-east-1", "/", &Params::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let reqs = mock.requests();
        assert!(reqs.iter().all(|r| r.host() == "localhost"));
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            [("s3".to_string(), "GET /".to_string())]
        );
    }

    #[derive(Debug, Deserialize)]
    struct Streams {
        #[serde(rename = "StreamNames", default)]
        names: Vec<String>,
    }

    #[tokio::test]
    async fn json_protocol_target_and_read_only_list() {
        let mock = MockTransport::new();
        mock.push_ok(r#"{"StreamNames":["s1"],"HasMoreStreams":false}"#);
        let d = dispatcher(mock.clone(), true);
        let out: Streams = d
            .json(&KINESIS, "us-east-1", "ListStreams", &serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(out.names, ["s1"]);
        let req = &mock.requests()[0];
        assert_eq!(req.headers["x-amz-target"], "Kinesis_20131202.ListStreams");
        assert_eq!(req.headers["content-type"], JSON_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn json_protocol_rejects_other_services() {
        let d = dispatcher(MockTransport::new(), false);
        let err = d
            .json::<serde_json::Value>(&IAM, "us-east-1", "GetUser", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec);
    }

    #[tokio::test]
    async fn rest_json_path_and_empty_body() {
        let mock = MockTransport::new();
        mock.push_ok("");
        let d = dispatcher(mock.clone(), false);
        let v: serde_json::Value = d
            .rest_json(&LAMBDA, "ap-south-1", Method::GET, "/2015-03-31/functions/", &Params::new())
            .await
            .unwrap();
        assert!(v.as_object().unwrap().is_empty());
        assert_eq!(
            mock.requests()[0].url.as_str(),
            "https://lambda.ap-south-1.amazonaws.com/2015-03-31/functions/"
        );
    }

    #[test]
    fn encode_query_bare_keys() {
        let mut p = Params::new();
        p.set("location", "").set("max-keys", "10");
        assert_eq!(encode_query(&p), "location&max-keys=10");
    }
}
