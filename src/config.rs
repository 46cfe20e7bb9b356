use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;

use crate::backoff::RetryBudget;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::interceptor::Interceptor;

pub(crate) const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(250);
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Engine parameters as supplied by the caller. Validation happens in one
/// place (`validate`), which turns this into an immutable [`ConfigSnapshot`];
/// invalid combinations never reach the execution path.
#[derive(Clone, Default)]
pub struct ClientConfig {
    endpoints: Vec<String>,
    max_retries: Option<usize>,
    initial_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    request_timeout: Option<Duration>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl ClientConfig {
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Defaults to twice the endpoint count when unset.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = Some(initial_backoff);
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = Some(max_backoff);
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = Some(request_timeout);
        self
    }

    /// Appends an interceptor; the first registered sits outermost in the
    /// pipeline.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub(crate) fn validate(&self, version: u64) -> Result<ConfigSnapshot, Error> {
        if self.endpoints.is_empty() {
            return Err(Error::NoEndpoints);
        }
        let endpoints = self
            .endpoints
            .iter()
            .map(|text| Endpoint::parse(text))
            .collect::<Result<Vec<_>, _>>()?;

        let initial_backoff = self.initial_backoff.unwrap_or(DEFAULT_INITIAL_BACKOFF);
        if initial_backoff.is_zero() {
            return Err(Error::InvalidConfig {
                message: "initial backoff must be greater than zero".to_owned(),
            });
        }
        if let Some(max_backoff) = self.max_backoff {
            if max_backoff < initial_backoff {
                return Err(Error::InvalidConfig {
                    message: format!(
                        "max backoff {max_backoff:?} must be >= initial backoff {initial_backoff:?}"
                    ),
                });
            }
        }

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        if request_timeout.is_zero() {
            return Err(Error::InvalidConfig {
                message: "request timeout must be greater than zero".to_owned(),
            });
        }

        let max_retries = self.max_retries.unwrap_or(endpoints.len() * 2);

        Ok(ConfigSnapshot {
            version,
            endpoints: endpoints.into(),
            retry: RetryBudget::new(max_retries, initial_backoff, self.max_backoff),
            request_timeout,
            interceptors: self.interceptors.clone().into(),
        })
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ClientConfig")
            .field("endpoints", &self.endpoints)
            .field("max_retries", &self.max_retries)
            .field("initial_backoff", &self.initial_backoff)
            .field("max_backoff", &self.max_backoff)
            .field("request_timeout", &self.request_timeout)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

/// One immutable, version-stamped view of the engine parameters. A call reads
/// exactly one snapshot at its start and never observes a mix of endpoint
/// list and retry budget from different versions.
#[derive(Clone)]
pub struct ConfigSnapshot {
    version: u64,
    endpoints: Arc<[Endpoint]>,
    retry: RetryBudget,
    request_timeout: Duration,
    interceptors: Arc<[Arc<dyn Interceptor>]>,
}

impl ConfigSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn retry(&self) -> RetryBudget {
        self.retry
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub(crate) fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }
}

impl std::fmt::Debug for ConfigSnapshot {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ConfigSnapshot")
            .field("version", &self.version)
            .field("endpoints", &self.endpoints)
            .field("retry", &self.retry)
            .field("request_timeout", &self.request_timeout)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

struct LiveConfigShared {
    sender: watch::Sender<Arc<ConfigSnapshot>>,
    version: AtomicU64,
}

/// Externally updatable engine configuration. Updates validate first, then
/// publish a whole snapshot by atomic swap; in-flight calls keep the snapshot
/// they started with.
#[derive(Clone)]
pub struct LiveConfig {
    shared: Arc<LiveConfigShared>,
}

impl LiveConfig {
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let snapshot = config.validate(0)?;
        let (sender, _) = watch::channel(Arc::new(snapshot));
        Ok(Self {
            shared: Arc::new(LiveConfigShared {
                sender,
                version: AtomicU64::new(0),
            }),
        })
    }

    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.shared.sender.borrow().clone()
    }

    /// Validates and publishes a replacement snapshot, returning its version.
    /// A rejected update leaves the previous snapshot in place.
    pub fn update(&self, config: ClientConfig) -> Result<u64, Error> {
        let version = self.shared.version.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot = config.validate(version)?;
        self.shared.sender.send_replace(Arc::new(snapshot));
        Ok(version)
    }

    /// For layers that rebuild configuration from external change sources;
    /// the engine itself only ever reads `current()`.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ConfigSnapshot>> {
        self.shared.sender.subscribe()
    }
}

impl std::fmt::Debug for LiveConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("LiveConfig")
            .field("current", &self.current())
            .finish()
    }
}
