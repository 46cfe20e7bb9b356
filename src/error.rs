use std::collections::BTreeMap;
use std::time::Duration;

use http::{HeaderMap, Method, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::util::truncate_body;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidUri,
    InvalidConfig,
    NoEndpoints,
    SerializeBody,
    UnsupportedContentType,
    RequestBuild,
    InvalidHeaderName,
    InvalidHeaderValue,
    Transport,
    Timeout,
    ReadBody,
    ResponseBodyTooLarge,
    Remote,
    HttpStatus,
    Deserialize,
    Throttled,
    Unavailable,
    Cancelled,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUri => "invalid_uri",
            Self::InvalidConfig => "invalid_config",
            Self::NoEndpoints => "no_endpoints",
            Self::SerializeBody => "serialize_body",
            Self::UnsupportedContentType => "unsupported_content_type",
            Self::RequestBuild => "request_build",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::ReadBody => "read_body",
            Self::ResponseBodyTooLarge => "response_body_too_large",
            Self::Remote => "remote",
            Self::HttpStatus => "http_status",
            Self::Deserialize => "deserialize",
            Self::Throttled => "throttled",
            Self::Unavailable => "unavailable",
            Self::Cancelled => "cancelled",
        }
    }

    pub const fn all() -> &'static [ErrorCode] {
        &[
            Self::InvalidUri,
            Self::InvalidConfig,
            Self::NoEndpoints,
            Self::SerializeBody,
            Self::UnsupportedContentType,
            Self::RequestBuild,
            Self::InvalidHeaderName,
            Self::InvalidHeaderValue,
            Self::Transport,
            Self::Timeout,
            Self::ReadBody,
            Self::ResponseBodyTooLarge,
            Self::Remote,
            Self::HttpStatus,
            Self::Deserialize,
            Self::Throttled,
            Self::Unavailable,
            Self::Cancelled,
        ]
    }
}

/// Structured error decoded from a failing response body.
///
/// Carries both the typed identity (`error_code`/`error_name`) and the raw
/// parameter map, so callers that match on names and callers that read legacy
/// parameters keep working.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RemoteError {
    #[serde(skip)]
    pub status: u16,
    #[serde(rename = "errorCode")]
    pub error_code: String,
    #[serde(rename = "errorName")]
    pub error_name: String,
    #[serde(rename = "errorInstanceId", default)]
    pub error_instance_id: Option<String>,
    #[serde(rename = "parameters", default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{} ({}) status={}",
            self.error_name, self.error_code, self.status
        )?;
        if let Some(instance) = &self.error_instance_id {
            write!(formatter, " instance={instance}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid uri: {uri}")]
    InvalidUri { uri: String },
    #[error("invalid client configuration: {message}")]
    InvalidConfig { message: String },
    #[error("endpoint pool is empty")]
    NoEndpoints,
    #[error("failed to serialize request body: {source}")]
    SerializeBody {
        #[source]
        source: serde_json::Error,
    },
    #[error("no codec registered for content type {content_type}")]
    UnsupportedContentType { content_type: String },
    #[error("failed to build http request: {source}")]
    RequestBuild {
        #[source]
        source: http::Error,
    },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("transport error ({kind}) for {method} {uri}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("request timed out after {timeout_ms}ms for {method} {uri}")]
    Timeout {
        timeout_ms: u128,
        method: Method,
        uri: String,
    },
    #[error("failed to read response body: {source}")]
    ReadBody {
        #[source]
        source: BoxError,
    },
    #[error(
        "response body too large ({actual_bytes} bytes > {limit_bytes} bytes) for {method} {uri}"
    )]
    ResponseBodyTooLarge {
        limit_bytes: usize,
        actual_bytes: usize,
        method: Method,
        uri: String,
    },
    #[error("remote error for {method} {uri}: {error}")]
    Remote {
        method: Method,
        uri: String,
        error: RemoteError,
    },
    #[error("http status error {status} for {method} {uri}: {body}")]
    HttpStatus {
        status: u16,
        method: Method,
        uri: String,
        body: String,
    },
    #[error("failed to decode response json: {source}; body={body}")]
    Deserialize {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("throttled by remote after {attempts} attempts for {method} {uri}")]
    Throttled {
        method: Method,
        uri: String,
        attempts: usize,
        retry_after: Option<Duration>,
    },
    #[error("no endpoint available after {attempts} attempts for {method} {uri}")]
    Unavailable {
        method: Method,
        uri: String,
        attempts: usize,
    },
    #[error("request cancelled for {method} {uri}")]
    Cancelled { method: Method, uri: String },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUri { .. } => ErrorCode::InvalidUri,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::NoEndpoints => ErrorCode::NoEndpoints,
            Self::SerializeBody { .. } => ErrorCode::SerializeBody,
            Self::UnsupportedContentType { .. } => ErrorCode::UnsupportedContentType,
            Self::RequestBuild { .. } => ErrorCode::RequestBuild,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::ReadBody { .. } => ErrorCode::ReadBody,
            Self::ResponseBodyTooLarge { .. } => ErrorCode::ResponseBodyTooLarge,
            Self::Remote { .. } => ErrorCode::Remote,
            Self::HttpStatus { .. } => ErrorCode::HttpStatus,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::Throttled { .. } => ErrorCode::Throttled,
            Self::Unavailable { .. } => ErrorCode::Unavailable,
            Self::Cancelled { .. } => ErrorCode::Cancelled,
        }
    }

    /// Whether the engine classified this outcome as retryable-transient
    /// before giving up. Application errors and cancellation return false.
    pub const fn is_exhaustion(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::Unavailable { .. })
    }

    pub(crate) const fn is_attempt_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::ReadBody { .. }
        )
    }
}

/// Decodes a failing response into a typed error. Invoked only on the Fail
/// transition, never for successful responses.
pub trait ErrorDecoder: Send + Sync {
    fn decode(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
        method: &Method,
        uri: &str,
    ) -> Error;
}

/// Default decoder for the structured wire-error shape
/// (`errorCode`/`errorName`/`errorInstanceId`/`parameters`). Bodies that do
/// not parse fall back to a generic status error carrying the raw body.
#[derive(Debug, Default)]
pub struct WireErrorDecoder;

impl ErrorDecoder for WireErrorDecoder {
    fn decode(
        &self,
        status: StatusCode,
        _headers: &HeaderMap,
        body: &[u8],
        method: &Method,
        uri: &str,
    ) -> Error {
        match serde_json::from_slice::<RemoteError>(body) {
            Ok(mut error) => {
                error.status = status.as_u16();
                Error::Remote {
                    method: method.clone(),
                    uri: uri.to_owned(),
                    error,
                }
            }
            Err(_) => Error::HttpStatus {
                status: status.as_u16(),
                method: method.clone(),
                uri: uri.to_owned(),
                body: truncate_body(body),
            },
        }
    }
}
