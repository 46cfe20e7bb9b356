use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use crate::error::{Error, TransportErrorKind};
use crate::response::Response;
use crate::util::redact_uri_for_logs;

const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;
const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 8 * 1024 * 1024;

/// The wire seam under the interceptor pipeline: one buffered request in, one
/// buffered response out. The engine applies timeout and cancellation around
/// the call; implementations only translate transport failures into
/// [`Error::Transport`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: http::Request<Bytes>) -> Result<Response, Error>;
}

/// Connection-level pass-through knobs; everything else about pooling is left
/// to the underlying client.
#[derive(Clone, Copy, Debug)]
pub struct TransportOptions {
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub http2_only: bool,
    pub max_response_body_bytes: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            http2_only: false,
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
        }
    }
}

type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;

/// Default transport: hyper over rustls (ring provider, webpki roots), plain
/// http allowed for local targets.
pub struct HyperTransport {
    client: HyperClient<HttpsConnector, Full<Bytes>>,
    max_response_body_bytes: usize,
}

impl HyperTransport {
    pub fn new(options: TransportOptions) -> Result<Self, Error> {
        let https = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|source| Error::InvalidConfig {
                message: format!("failed to initialize tls provider: {source}"),
            })?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(options.pool_idle_timeout)
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .http2_only(options.http2_only)
            .build(https);
        Ok(Self {
            client,
            max_response_body_bytes: options.max_response_body_bytes,
        })
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: http::Request<Bytes>) -> Result<Response, Error> {
        let method = request.method().clone();
        let redacted_uri = redact_uri_for_logs(&request.uri().to_string());

        let (parts, body) = request.into_parts();
        let request = http::Request::from_parts(parts, Full::new(body));

        let response = self
            .client
            .request(request)
            .await
            .map_err(|source| Error::Transport {
                kind: classify_transport_error(&source),
                method: method.clone(),
                uri: redacted_uri.clone(),
                source: Box::new(source),
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let collected = response
            .into_body()
            .collect()
            .await
            .map_err(|source| Error::ReadBody {
                source: Box::new(source),
            })?;
        let body = collected.to_bytes();
        if body.len() > self.max_response_body_bytes {
            return Err(Error::ResponseBodyTooLarge {
                limit_bytes: self.max_response_body_bytes,
                actual_bytes: body.len(),
                method,
                uri: redacted_uri,
            });
        }

        Ok(Response::new(status, headers, body))
    }
}

pub(crate) fn classify_transport_error(
    error: &hyper_util::client::legacy::Error,
) -> TransportErrorKind {
    if error.is_connect() {
        let text = error.to_string().to_ascii_lowercase();
        if text.contains("dns")
            || text.contains("name or service not known")
            || text.contains("failed to lookup address")
        {
            return TransportErrorKind::Dns;
        }
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return TransportErrorKind::Tls;
        }
        return TransportErrorKind::Connect;
    }

    let text = error.to_string().to_ascii_lowercase();
    if text.contains("read")
        || text.contains("connection reset")
        || text.contains("broken pipe")
        || text.contains("unexpected eof")
    {
        return TransportErrorKind::Read;
    }

    TransportErrorKind::Other
}
