//! AWS wire errors and their translation into kind-tagged cloud errors.
//!
//! Every AWS service reports failures as either an XML `<Error>` document
//! (Query and REST-XML services) or a JSON object carrying `__type` (JSON
//! services). [`AwsError`] holds the parsed form; [`AwsError::kind`] maps the
//! provider code onto the shared [`ErrorKind`] taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use stratus_core::{CloudError, ErrorKind};

/// Error returned by an AWS endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsError {
    /// The AWS error code (e.g., "InvalidVpcID.NotFound", "AccessDenied").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// The HTTP status code returned by the AWS API.
    pub status_code: u16,
    /// AWS request ID for tracing.
    pub request_id: Option<String>,
    /// The endpoint prefix of the service that failed (e.g., "ec2", "s3").
    pub service: String,
    /// The API action that failed, when known.
    pub action: Option<String>,
}

impl fmt::Display for AwsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AWS {} error [{}]: {} (HTTP {})",
            self.service, self.code, self.message, self.status_code
        )?;
        if let Some(ref req_id) = self.request_id {
            write!(f, " [RequestId: {}]", req_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for AwsError {}

impl AwsError {
    pub fn new(service: &str, code: &str, message: &str, status_code: u16) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            status_code,
            request_id: None,
            service: service.to_string(),
            action: None,
        }
    }

    pub fn with_action(mut self, action: &str) -> Self {
        if !action.is_empty() {
            self.action = Some(action.to_string());
        }
        self
    }

    /// Parse the body of a failed response, choosing XML or JSON by its first byte.
    pub fn from_response(service: &str, status_code: u16, body: &str) -> Self {
        let trimmed = body.trim_start();
        if trimmed.is_empty() {
            // HEAD and some DELETE responses carry no body at all.
            let code = match status_code {
                301 => "PermanentRedirect",
                403 => "AccessDenied",
                404 => "NotFound",
                _ => "UnknownError",
            };
            return Self::new(service, code, &format!("HTTP {} from {}", status_code, service), status_code);
        }
        if trimmed.starts_with('<') {
            Self::parse_xml_error(service, status_code, body)
        } else {
            Self::parse_json_error(service, status_code, body)
        }
    }

    /// Parse an AWS XML error response.
    ///
    /// ```xml
    /// <ErrorResponse>
    ///   <Error>
    ///     <Code>InvalidParameterValue</Code>
    ///     <Message>The filter ...</Message>
    ///   </Error>
    ///   <RequestId>abc-123</RequestId>
    /// </ErrorResponse>
    /// ```
    pub fn parse_xml_error(service: &str, status_code: u16, body: &str) -> Self {
        let code = crate::xml::element_text(body, "Code")
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "UnknownError".to_string());
        let message = crate::xml::element_text(body, "Message")
            .unwrap_or_else(|| format!("HTTP {} from {}", status_code, service));
        let request_id = crate::xml::element_text(body, "RequestId")
            .or_else(|| crate::xml::element_text(body, "RequestID"));

        let mut err = Self::new(service, &code, &message, status_code);
        err.request_id = request_id;
        err
    }

    /// Parse an AWS JSON error response.
    ///
    /// ```json
    /// { "__type": "com.amazonaws.waf#WAFNonexistentItemException", "message": "..." }
    /// ```
    pub fn parse_json_error(service: &str, status_code: u16, body: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(val) => {
                let code = val
                    .get("__type")
                    .or_else(|| val.get("code"))
                    .or_else(|| val.get("Code"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.rsplit('#').next().unwrap_or(s).to_string())
                    .unwrap_or_else(|| "UnknownError".to_string());
                let message = val
                    .get("message")
                    .or_else(|| val.get("Message"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("Unknown error")
                    .to_string();
                Self::new(service, &code, &message, status_code)
            }
            Err(_) => {
                let snippet: String = body.chars().take(200).collect();
                Self::new(
                    service,
                    "UnknownError",
                    &format!("unparseable error response: {}", snippet),
                    status_code,
                )
            }
        }
    }

    /// Map the provider code onto the shared error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        classify_code(&self.code)
    }
}

/// Provider error code → error kind.
pub fn classify_code(code: &str) -> ErrorKind {
    match code {
        "AuthFailure"
        | "SignatureDoesNotMatch"
        | "IncompleteSignature"
        | "InvalidClientTokenId"
        | "InvalidAccessKeyId"
        | "UnrecognizedClientException"
        | "InvalidSignatureException" => ErrorKind::InvalidAccessKey,
        "AccessDenied" | "AccessDeniedException" | "UnauthorizedOperation" => ErrorKind::Forbidden,
        "NoSuchEntity"
        | "NoSuchBucket"
        | "NoSuchHostedZone"
        | "NoSuchDistribution"
        | "WAFNonexistentItemException" => ErrorKind::NotFound,
        c if c.contains("NotAuthorized") => ErrorKind::Forbidden,
        c if c.contains("NotFound") => ErrorKind::NotFound,
        _ => ErrorKind::Provider,
    }
}

impl From<AwsError> for CloudError {
    fn from(err: AwsError) -> Self {
        let kind = err.kind();
        if kind == ErrorKind::Provider {
            let opaque = CloudError::Provider {
                service: err.service,
                code: err.code,
                message: err.message,
                status: err.status_code,
                request_id: err.request_id,
            };
            return match err.action {
                Some(action) => opaque.context(action),
                None => opaque,
            };
        }
        let detail = match err.action {
            Some(ref action) => format!("{} {}: [{}] {}", err.service, action, err.code, err.message),
            None => format!("{}: [{}] {}", err.service, err.code, err.message),
        };
        CloudError::of_kind(kind, detail)
    }
}

/// Transport failures (connect, timeout, cancellation) stay opaque.
pub fn transport_error(err: reqwest::Error) -> CloudError {
    CloudError::Transport(err.to_string())
}
