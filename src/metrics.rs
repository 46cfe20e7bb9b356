use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the client counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientMetricsSnapshot {
    pub requests_started: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub retries: u64,
    pub throttled_responses: u64,
    pub unavailable_responses: u64,
    pub redirects_followed: u64,
    pub cancelled: u64,
    pub in_flight: u64,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ClientMetrics {
    inner: Arc<ClientMetricsInner>,
}

#[derive(Debug, Default)]
struct ClientMetricsInner {
    requests_started: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_failed: AtomicU64,
    retries: AtomicU64,
    throttled_responses: AtomicU64,
    unavailable_responses: AtomicU64,
    redirects_followed: AtomicU64,
    cancelled: AtomicU64,
    in_flight: AtomicU64,
}

pub(crate) struct InFlightGuard {
    metrics: ClientMetrics,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.inner.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ClientMetrics {
    pub(crate) fn record_request_started(&self) {
        self.inner.requests_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn enter_in_flight(&self) -> InFlightGuard {
        self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            metrics: self.clone(),
        }
    }

    pub(crate) fn record_retry(&self) {
        self.inner.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_throttled(&self) {
        self.inner.throttled_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unavailable(&self) {
        self.inner
            .unavailable_responses
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_redirect(&self) {
        self.inner.redirects_followed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.inner.requests_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.inner.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self) {
        self.inner.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ClientMetricsSnapshot {
        ClientMetricsSnapshot {
            requests_started: self.inner.requests_started.load(Ordering::Relaxed),
            requests_succeeded: self.inner.requests_succeeded.load(Ordering::Relaxed),
            requests_failed: self.inner.requests_failed.load(Ordering::Relaxed),
            retries: self.inner.retries.load(Ordering::Relaxed),
            throttled_responses: self.inner.throttled_responses.load(Ordering::Relaxed),
            unavailable_responses: self.inner.unavailable_responses.load(Ordering::Relaxed),
            redirects_followed: self.inner.redirects_followed.load(Ordering::Relaxed),
            cancelled: self.inner.cancelled.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
        }
    }
}
