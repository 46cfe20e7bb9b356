use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::backoff::RetryBudget;
use crate::client::Client;
use crate::error::Error;
use crate::response::Response;
use crate::util::{parse_header_name, parse_header_value};

/// One logical call: what generated clients hand to [`Client::execute`].
/// Endpoint selection, retries, and redirects happen inside the engine; the
/// request only describes the call and its per-call overrides.
#[derive(Clone, Debug, Default)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query_pairs: Vec<(String, String)>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<Bytes>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) retry_budget: Option<RetryBudget>,
    pub(crate) cancel: Option<CancellationToken>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn set_body(&mut self, content_type: HeaderValue, body: impl Into<Bytes>) {
        self.headers.insert(CONTENT_TYPE, content_type);
        self.body = Some(body.into());
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    pub fn set_retry_budget(&mut self, retry_budget: RetryBudget) {
        self.retry_budget = Some(retry_budget);
    }

    /// Attaches a caller-owned cancellation token. Cancelling it aborts the
    /// call at the next transition boundary, including mid-backoff and
    /// mid-send.
    pub fn set_cancellation_token(&mut self, cancel: CancellationToken) {
        self.cancel = Some(cancel);
    }
}

#[doc(hidden)]
pub struct RequestBuilder<'a> {
    client: &'a Client,
    request: Request,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(client: &'a Client, method: Method, path: String) -> Self {
        Self {
            client,
            request: Request::new(method, path),
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.request.headers.insert(name, value);
        self
    }

    pub fn try_header(self, name: &str, value: &str) -> Result<Self, Error> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.header(name, value))
    }

    pub fn query_pair(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.query_pairs.push((name.into(), value.into()));
        self
    }

    pub fn query_pairs<K, V, I>(mut self, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.request.query_pairs.extend(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into())),
        );
        self
    }

    pub fn body(mut self, content_type: HeaderValue, body: impl Into<Bytes>) -> Self {
        self.request.headers.insert(CONTENT_TYPE, content_type);
        self.request.body = Some(body.into());
        self
    }

    pub fn json<T>(mut self, payload: &T) -> Result<Self, Error>
    where
        T: Serialize + ?Sized,
    {
        let body =
            serde_json::to_vec(payload).map_err(|source| Error::SerializeBody { source })?;
        self.request.body = Some(Bytes::from(body));
        self.request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    /// Encodes the payload through the client's codec registry, chosen by the
    /// caller-specified content type.
    pub fn encoded_body<T>(mut self, content_type: &str, payload: &T) -> Result<Self, Error>
    where
        T: Serialize + ?Sized,
    {
        let value =
            serde_json::to_value(payload).map_err(|source| Error::SerializeBody { source })?;
        let codec = self.client.codecs().for_request(content_type)?;
        let body = codec.encode(&value)?;
        let content_type = parse_header_value("content-type", content_type)?;
        self.request.headers.insert(CONTENT_TYPE, content_type);
        self.request.body = Some(body);
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = Some(timeout.max(Duration::from_millis(1)));
        self
    }

    pub fn retry_budget(mut self, retry_budget: RetryBudget) -> Self {
        self.request.retry_budget = Some(retry_budget);
        self
    }

    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.request.cancel = Some(cancel);
        self
    }

    pub fn into_request(self) -> Request {
        self.request
    }

    pub async fn send(self) -> Result<Response, Error> {
        let Self { client, request } = self;
        client.execute(request).await
    }
}
