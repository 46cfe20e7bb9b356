use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};
use tokio::time::{sleep, timeout};
use tracing::{Instrument, debug, info_span, warn};

use crate::backoff;
use crate::codec::CodecRegistry;
use crate::config::{ClientConfig, ConfigSnapshot, LiveConfig};
use crate::endpoint::{Endpoint, PoolRotation, RotationCursor};
use crate::error::{Error, ErrorDecoder, WireErrorDecoder};
use crate::interceptor::{Next, RequestContext};
use crate::metrics::{ClientMetrics, ClientMetricsSnapshot};
use crate::qos::{self, QosVerdict};
use crate::request::{Request, RequestBuilder};
use crate::response::Response;
use crate::transport::{HyperTransport, Transport, TransportOptions};
use crate::util::{
    append_query_pairs, merge_headers, parse_header_name, parse_header_value, redact_uri_for_logs,
};

const DEFAULT_CLIENT_NAME: &str = "rpcx";

pub struct ClientBuilder {
    config: Option<ClientConfig>,
    live_config: Option<LiveConfig>,
    codecs: CodecRegistry,
    error_decoder: Arc<dyn ErrorDecoder>,
    transport: Option<Arc<dyn Transport>>,
    transport_options: TransportOptions,
    client_name: String,
    default_headers: HeaderMap,
}

impl ClientBuilder {
    pub(crate) fn new() -> Self {
        Self {
            config: None,
            live_config: None,
            codecs: CodecRegistry::default(),
            error_decoder: Arc::new(WireErrorDecoder),
            transport: None,
            transport_options: TransportOptions::default(),
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
            default_headers: HeaderMap::new(),
        }
    }

    /// Fixed initial configuration; the client owns the resulting live handle
    /// and exposes it through [`Client::live_config`].
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Externally owned live configuration, shared with whatever layer
    /// refreshes it. Takes precedence over [`ClientBuilder::config`].
    pub fn live_config(mut self, live_config: LiveConfig) -> Self {
        self.live_config = Some(live_config);
        self
    }

    pub fn codec_registry(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn error_decoder(mut self, error_decoder: Arc<dyn ErrorDecoder>) -> Self {
        self.error_decoder = error_decoder;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn transport_options(mut self, transport_options: TransportOptions) -> Self {
        self.transport_options = transport_options;
        self
    }

    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn try_default_header(self, name: &str, value: &str) -> Result<Self, Error> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.default_header(name, value))
    }

    pub fn try_build(self) -> Result<Client, Error> {
        let live = match (self.live_config, self.config) {
            (Some(live), _) => live,
            (None, Some(config)) => LiveConfig::new(config)?,
            (None, None) => {
                return Err(Error::InvalidConfig {
                    message: "client requires a configuration or a live configuration handle"
                        .to_owned(),
                });
            }
        };
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new(self.transport_options)?),
        };

        Ok(Client {
            live,
            transport,
            codecs: Arc::new(self.codecs),
            error_decoder: self.error_decoder,
            cursor: Arc::new(RotationCursor::default()),
            client_name: self.client_name,
            default_headers: self.default_headers,
            metrics: ClientMetrics::default(),
        })
    }
}

/// Request execution engine for one logical client. Constructed once and
/// shared across concurrent calls; all call state lives on the caller's
/// frame, the rotation cursor is the only shared mutable piece.
///
/// The engine does not inspect method semantics to suppress retries:
/// non-idempotent calls that must not be replayed are the caller's
/// responsibility to guard.
#[derive(Clone)]
pub struct Client {
    live: LiveConfig,
    transport: Arc<dyn Transport>,
    codecs: Arc<CodecRegistry>,
    error_decoder: Arc<dyn ErrorDecoder>,
    cursor: Arc<RotationCursor>,
    client_name: String,
    default_headers: HeaderMap,
    metrics: ClientMetrics,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn request(&self, method: Method, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, method, path.into())
    }

    pub fn get(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::POST, path)
    }

    pub fn put(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::PUT, path)
    }

    pub fn patch(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::PATCH, path)
    }

    pub fn delete(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::DELETE, path)
    }

    pub fn live_config(&self) -> &LiveConfig {
        &self.live
    }

    pub fn metrics_snapshot(&self) -> ClientMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub(crate) fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Executes one logical call: reads one configuration snapshot, then
    /// loops `SelectEndpoint → Send → Classify` until the call succeeds,
    /// fails with an application error, exhausts its retry budget, or is
    /// cancelled.
    pub async fn execute(&self, request: Request) -> Result<Response, Error> {
        let snapshot = self.live.current();
        self.metrics.record_request_started();
        let _in_flight = self.metrics.enter_in_flight();
        let result = self.execute_with_snapshot(&snapshot, request).await;
        match &result {
            Ok(_) => self.metrics.record_success(),
            Err(Error::Cancelled { .. }) => self.metrics.record_cancelled(),
            Err(_) => self.metrics.record_failure(),
        }
        result
    }

    async fn execute_with_snapshot(
        &self,
        snapshot: &ConfigSnapshot,
        request: Request,
    ) -> Result<Response, Error> {
        let Request {
            method,
            path,
            query_pairs,
            headers,
            body,
            timeout: timeout_override,
            retry_budget,
            cancel,
        } = request;
        let budget = retry_budget.unwrap_or_else(|| snapshot.retry());
        let attempt_timeout = timeout_override.unwrap_or_else(|| snapshot.request_timeout());
        let cancel = cancel.unwrap_or_default();
        let path_and_query = append_query_pairs(&path, &query_pairs);
        let merged_headers = merge_headers(&self.default_headers, &headers);
        let body = body.unwrap_or_default();

        let rotation = PoolRotation::begin(&self.cursor, snapshot.endpoints())?;
        let max_attempts = budget.max_retries().saturating_add(1);
        let mut redirect: Option<Endpoint> = None;

        for attempt in 0..max_attempts {
            let endpoint = match redirect.take() {
                Some(endpoint) => endpoint,
                None => rotation.select(&self.cursor, attempt).clone(),
            };
            let uri_text = endpoint.join(&path_and_query);
            let redacted_uri = redact_uri_for_logs(&uri_text);
            let uri: Uri = uri_text.parse().map_err(|_| Error::InvalidUri {
                uri: uri_text.clone(),
            })?;

            let span = info_span!(
                "rpcx.request",
                client = %self.client_name,
                method = %method,
                uri = %redacted_uri,
                attempt = attempt,
                max_attempts = max_attempts
            );

            let http_request =
                build_attempt_request(&method, &uri, &merged_headers, body.clone())?;
            let context = RequestContext::new(
                method.clone(),
                redacted_uri.clone(),
                endpoint.clone(),
                attempt,
                max_attempts,
            );
            let pipeline = Next::new(snapshot.interceptors(), self.transport.as_ref(), &context);

            // None marks a cancellation observed mid-send or while queued.
            let outcome = async {
                debug!(config_version = snapshot.version(), "sending request");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    sent = timeout(attempt_timeout, pipeline.run(http_request)) => Some(match sent {
                        Ok(result) => result,
                        Err(_) => Err(Error::Timeout {
                            timeout_ms: attempt_timeout.as_millis(),
                            method: method.clone(),
                            uri: redacted_uri.clone(),
                        }),
                    }),
                }
            }
            .instrument(span)
            .await;
            let Some(outcome) = outcome else {
                return Err(Error::Cancelled {
                    method,
                    uri: redacted_uri,
                });
            };

            let verdict = match &outcome {
                Ok(response) => qos::classify(response.status(), response.headers()),
                Err(error) if error.is_attempt_failure() => QosVerdict::Unavailable,
                Err(_) => return outcome,
            };

            if let QosVerdict::Normal = verdict {
                let response = outcome?;
                if response.status().is_success() {
                    debug!(status = response.status().as_u16(), "request completed");
                    return Ok(response);
                }
                return Err(self.error_decoder.decode(
                    response.status(),
                    response.headers(),
                    response.body(),
                    &method,
                    &redacted_uri,
                ));
            }

            let mandated_wait = match &verdict {
                QosVerdict::Throttle { retry_after } => {
                    self.metrics.record_throttled();
                    *retry_after
                }
                QosVerdict::Unavailable => {
                    self.metrics.record_unavailable();
                    None
                }
                QosVerdict::RetryOther { .. } => {
                    self.metrics.record_redirect();
                    None
                }
                QosVerdict::Normal => None,
            };

            if attempt + 1 >= max_attempts {
                return Err(exhausted_error(verdict, method, redacted_uri, max_attempts));
            }

            if let QosVerdict::RetryOther { location } = &verdict {
                redirect = location.clone();
            }

            let wait = backoff::delay_for(attempt + 1, &budget)
                .max(mandated_wait.unwrap_or(Duration::ZERO));
            warn!(
                method = %method,
                uri = %redacted_uri,
                attempt = attempt,
                verdict = verdict_label(&verdict),
                delay_ms = wait.as_millis() as u64,
                "retrying request"
            );
            self.metrics.record_retry();
            if !wait.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(Error::Cancelled {
                            method,
                            uri: redacted_uri,
                        });
                    }
                    _ = sleep(wait) => {}
                }
            }
        }

        // max_attempts >= 1, so the loop always returns before falling out.
        Err(Error::Unavailable {
            method,
            uri: path_and_query,
            attempts: max_attempts,
        })
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Client")
            .field("client_name", &self.client_name)
            .field("config", &self.live.current())
            .finish()
    }
}

fn build_attempt_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<http::Request<Bytes>, Error> {
    let mut request = http::Request::builder()
        .method(method.clone())
        .uri(uri.clone())
        .body(body)
        .map_err(|source| Error::RequestBuild { source })?;
    *request.headers_mut() = headers.clone();
    Ok(request)
}

fn exhausted_error(verdict: QosVerdict, method: Method, uri: String, attempts: usize) -> Error {
    match verdict {
        QosVerdict::Throttle { retry_after } => Error::Throttled {
            method,
            uri,
            attempts,
            retry_after,
        },
        _ => Error::Unavailable {
            method,
            uri,
            attempts,
        },
    }
}

fn verdict_label(verdict: &QosVerdict) -> &'static str {
    match verdict {
        QosVerdict::Normal => "normal",
        QosVerdict::Throttle { .. } => "throttle",
        QosVerdict::Unavailable => "unavailable",
        QosVerdict::RetryOther { .. } => "retry_other",
    }
}
