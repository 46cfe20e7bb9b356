use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;

use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::response::Response;
use crate::transport::Transport;

/// Per-attempt view of the call handed to interceptors. Retries re-run the
/// whole pipeline, so `attempt` distinguishes re-evaluations of per-attempt
/// concerns (token refresh, trace spans, timing).
#[derive(Clone, Debug)]
pub struct RequestContext {
    method: Method,
    uri: String,
    endpoint: Endpoint,
    attempt: usize,
    max_attempts: usize,
}

impl RequestContext {
    pub(crate) fn new(
        method: Method,
        uri: String,
        endpoint: Endpoint,
        attempt: usize,
        max_attempts: usize,
    ) -> Self {
        Self {
            method,
            uri,
            endpoint,
            attempt,
            max_attempts,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Redacted request uri, safe to log.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn attempt(&self) -> usize {
        self.attempt
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }
}

/// One step of the request pipeline. The first-registered interceptor sees
/// the outgoing request first and the inbound result last; later-registered
/// interceptors sit closer to the wire. An implementation may mutate the
/// request before `next.run`, return early without calling onward, or
/// post-process the result. One instance serves all concurrent calls, so
/// implementations hold no per-call state.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(
        &self,
        request: http::Request<Bytes>,
        next: Next<'_>,
    ) -> Result<Response, Error>;
}

/// Remainder of the pipeline: the interceptors after the current one, ending
/// at the transport send.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Interceptor>],
    transport: &'a dyn Transport,
    context: &'a RequestContext,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        chain: &'a [Arc<dyn Interceptor>],
        transport: &'a dyn Transport,
        context: &'a RequestContext,
    ) -> Self {
        Self {
            chain,
            transport,
            context,
        }
    }

    pub fn context(&self) -> &RequestContext {
        self.context
    }

    pub async fn run(self, request: http::Request<Bytes>) -> Result<Response, Error> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    chain: rest,
                    transport: self.transport,
                    context: self.context,
                };
                head.intercept(request, next).await
            }
            None => self.transport.send(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use http::{HeaderValue, Method, StatusCode};

    use super::{Interceptor, Next, RequestContext};
    use crate::endpoint::Endpoint;
    use crate::error::Error;
    use crate::response::Response;
    use crate::transport::Transport;

    struct EchoTransport;

    #[async_trait]
    impl Transport for EchoTransport {
        async fn send(&self, request: http::Request<Bytes>) -> Result<Response, Error> {
            let headers = request.headers().clone();
            Ok(Response::new(StatusCode::OK, headers, request.into_body()))
        }
    }

    struct TagInterceptor {
        tag: &'static str,
        order: Arc<AtomicUsize>,
        seen_at: AtomicUsize,
    }

    #[async_trait]
    impl Interceptor for TagInterceptor {
        async fn intercept(
            &self,
            mut request: http::Request<Bytes>,
            next: Next<'_>,
        ) -> Result<Response, Error> {
            self.seen_at
                .store(self.order.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
            request
                .headers_mut()
                .append("x-tag", HeaderValue::from_static(self.tag));
            next.run(request).await
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl Interceptor for ShortCircuit {
        async fn intercept(
            &self,
            _request: http::Request<Bytes>,
            _next: Next<'_>,
        ) -> Result<Response, Error> {
            Ok(Response::new(
                StatusCode::NO_CONTENT,
                http::HeaderMap::new(),
                Bytes::new(),
            ))
        }
    }

    fn context() -> RequestContext {
        RequestContext::new(
            Method::GET,
            "http://node.test:1/v1/items".to_owned(),
            Endpoint::parse("http://node.test:1").expect("endpoint should parse"),
            0,
            3,
        )
    }

    fn request() -> http::Request<Bytes> {
        http::Request::builder()
            .method(Method::GET)
            .uri("http://node.test:1/v1/items")
            .body(Bytes::from_static(b"payload"))
            .expect("request should build")
    }

    #[tokio::test]
    async fn first_registered_interceptor_runs_outermost() {
        let order = Arc::new(AtomicUsize::new(0));
        let outer = Arc::new(TagInterceptor {
            tag: "outer",
            order: Arc::clone(&order),
            seen_at: AtomicUsize::new(usize::MAX),
        });
        let inner = Arc::new(TagInterceptor {
            tag: "inner",
            order: Arc::clone(&order),
            seen_at: AtomicUsize::new(usize::MAX),
        });
        let chain: Vec<Arc<dyn Interceptor>> =
            vec![Arc::clone(&outer) as _, Arc::clone(&inner) as _];

        let context = context();
        let transport = EchoTransport;
        let response = Next::new(&chain, &transport, &context)
            .run(request())
            .await
            .expect("pipeline should succeed");

        assert_eq!(outer.seen_at.load(Ordering::SeqCst), 0);
        assert_eq!(inner.seen_at.load(Ordering::SeqCst), 1);
        let tags: Vec<_> = response
            .headers()
            .get_all("x-tag")
            .iter()
            .map(|value| value.to_str().unwrap_or_default())
            .collect();
        assert_eq!(tags, vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn interceptor_can_short_circuit_without_reaching_the_wire() {
        let chain: Vec<Arc<dyn Interceptor>> = vec![Arc::new(ShortCircuit)];
        let context = context();
        let transport = EchoTransport;
        let response = Next::new(&chain, &transport, &context)
            .run(request())
            .await
            .expect("short circuit should succeed");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.body().is_empty());
    }

    #[tokio::test]
    async fn empty_chain_reaches_the_transport() {
        let chain: Vec<Arc<dyn Interceptor>> = Vec::new();
        let context = context();
        let transport = EchoTransport;
        let response = Next::new(&chain, &transport, &context)
            .run(request())
            .await
            .expect("bare pipeline should succeed");
        assert_eq!(response.body().as_ref(), b"payload");
    }
}
