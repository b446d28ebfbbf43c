//! Kind-tagged cloud errors shared by every provider adapter.
//!
//! Provider adapters translate their native error codes into one of the
//! [`ErrorKind`]s below. Anything that does not fit a kind is carried as an
//! opaque [`CloudError::Provider`] error that keeps the provider's code and
//! message. Every layer wraps errors with the operation name through
//! [`ResultExt::context`], so the root cause and its kind survive the trip
//! back to the caller.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a [`CloudError`], independent of any context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    DuplicateId,
    InvalidAccessKey,
    Forbidden,
    ReadOnly,
    InvalidStatus,
    NotSupported,
    NotImplemented,
    /// Provider error without a dedicated kind.
    Provider,
    /// Network failure, timeout or cancellation of the HTTP call.
    Transport,
    /// Malformed response or request that could not be encoded.
    Codec,
}

impl ErrorKind {
    /// Capability-style kinds declare that a feature is absent; callers may skip them.
    pub fn is_capability_miss(&self) -> bool {
        matches!(self, ErrorKind::NotSupported | ErrorKind::NotImplemented)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::DuplicateId => "DuplicateIdError",
            ErrorKind::InvalidAccessKey => "InvalidAccessKey",
            ErrorKind::Forbidden => "ForbiddenError",
            ErrorKind::ReadOnly => "AccountReadOnlyError",
            ErrorKind::InvalidStatus => "InvalidStatus",
            ErrorKind::NotSupported => "NotSupportedError",
            ErrorKind::NotImplemented => "NotImplementedError",
            ErrorKind::Provider => "ProviderError",
            ErrorKind::Transport => "TransportError",
            ErrorKind::Codec => "CodecError",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by cloud adapters.
#[derive(Debug, Clone, Error)]
pub enum CloudError {
    #[error("NotFoundError: {0}")]
    NotFound(String),

    #[error("DuplicateIdError: {0}")]
    DuplicateId(String),

    #[error("InvalidAccessKey: {0}")]
    InvalidAccessKey(String),

    #[error("ForbiddenError: {0}")]
    Forbidden(String),

    /// The account is read-only and the request would mutate state.
    #[error("AccountReadOnlyError: {0}")]
    ReadOnly(String),

    #[error("InvalidStatus: {0}")]
    InvalidStatus(String),

    #[error("NotSupportedError: {0}")]
    NotSupported(String),

    #[error("NotImplementedError: {0}")]
    NotImplemented(String),

    /// Provider error preserving the native code and message.
    #[error("{service} error [{code}]: {message} (HTTP {status})")]
    Provider {
        service: String,
        code: String,
        message: String,
        status: u16,
        request_id: Option<String>,
    },

    #[error("TransportError: {0}")]
    Transport(String),

    #[error("CodecError: {0}")]
    Codec(String),

    /// An operation name wrapped around an inner error.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<CloudError>,
    },
}

impl CloudError {
    /// The kind of the root cause, looking through any context wrapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CloudError::NotFound(_) => ErrorKind::NotFound,
            CloudError::DuplicateId(_) => ErrorKind::DuplicateId,
            CloudError::InvalidAccessKey(_) => ErrorKind::InvalidAccessKey,
            CloudError::Forbidden(_) => ErrorKind::Forbidden,
            CloudError::ReadOnly(_) => ErrorKind::ReadOnly,
            CloudError::InvalidStatus(_) => ErrorKind::InvalidStatus,
            CloudError::NotSupported(_) => ErrorKind::NotSupported,
            CloudError::NotImplemented(_) => ErrorKind::NotImplemented,
            CloudError::Provider { .. } => ErrorKind::Provider,
            CloudError::Transport(_) => ErrorKind::Transport,
            CloudError::Codec(_) => ErrorKind::Codec,
            CloudError::Context { source, .. } => source.kind(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// The innermost error of a context chain.
    pub fn root(&self) -> &CloudError {
        match self {
            CloudError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Wrap this error with the name of the operation that produced it.
    pub fn context(self, context: impl Into<String>) -> Self {
        CloudError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Build an error of the given kind with a free-form message.
    pub fn of_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::NotFound => CloudError::NotFound(message),
            ErrorKind::DuplicateId => CloudError::DuplicateId(message),
            ErrorKind::InvalidAccessKey => CloudError::InvalidAccessKey(message),
            ErrorKind::Forbidden => CloudError::Forbidden(message),
            ErrorKind::ReadOnly => CloudError::ReadOnly(message),
            ErrorKind::InvalidStatus => CloudError::InvalidStatus(message),
            ErrorKind::NotSupported => CloudError::NotSupported(message),
            ErrorKind::NotImplemented => CloudError::NotImplemented(message),
            ErrorKind::Transport => CloudError::Transport(message),
            ErrorKind::Codec => CloudError::Codec(message),
            ErrorKind::Provider => CloudError::Provider {
                service: String::new(),
                code: "Unknown".to_string(),
                message,
                status: 0,
                request_id: None,
            },
        }
    }
}

/// Convenience result type for cloud operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Attach operation names to errors flowing through a `CloudResult`.
pub trait ResultExt<T> {
    fn context(self, context: &str) -> CloudResult<T>;

    fn with_context<F, S>(self, f: F) -> CloudResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for CloudResult<T> {
    fn context(self, context: &str) -> CloudResult<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F, S>(self, f: F) -> CloudResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}
