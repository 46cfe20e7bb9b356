//! `rpcx` is the request-execution core used by generated RPC service
//! clients: given a logical request and a pool of candidate endpoints, it
//! produces a response or a definitive failure, applying endpoint failover,
//! retry with full-jitter backoff, QoS-directed retry behavior (308/429/503),
//! and a composable interceptor pipeline.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use rpcx::prelude::{Client, ClientConfig};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct CreateItemResponse {
//!     id: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new([
//!         "https://node-1.example.com:8443",
//!         "https://node-2.example.com:8443",
//!     ])
//!     .with_max_retries(4)
//!     .with_initial_backoff(Duration::from_millis(250))
//!     .with_request_timeout(Duration::from_secs(10));
//!
//!     let client = Client::builder()
//!         .client_name("my-sdk")
//!         .config(config)
//!         .try_build()?;
//!
//!     let created: CreateItemResponse = client
//!         .post("/v1/items")
//!         .json(&serde_json::json!({ "name": "demo" }))?
//!         .send()
//!         .await?
//!         .json()?;
//!
//!     println!("created id={}", created.id);
//!     Ok(())
//! }
//! ```
//!
//! # Retry Semantics
//!
//! - 308 responses redirect exactly the next attempt to the `Location`
//!   address without advancing pool rotation.
//! - 429 responses back off for at least the server-mandated wait when a
//!   numeric `Retry-After` is present.
//! - 503 responses and transport failures rotate to the next endpoint.
//! - Any other failing status is decoded once and returned, never retried.
//!
//! The engine retries without inspecting method semantics: callers are
//! responsible for not replaying non-idempotent calls they cannot afford to
//! run twice.

mod backoff;
mod client;
mod codec;
mod config;
mod endpoint;
mod error;
mod interceptor;
mod metrics;
mod qos;
mod request;
mod response;
mod transport;
mod util;

pub use crate::backoff::RetryBudget;
pub use crate::client::{Client, ClientBuilder};
pub use crate::codec::{Codec, CodecRegistry, JsonCodec};
pub use crate::config::{ClientConfig, ConfigSnapshot, LiveConfig};
pub use crate::endpoint::Endpoint;
pub use crate::error::{
    Error, ErrorCode, ErrorDecoder, RemoteError, TransportErrorKind, WireErrorDecoder,
};
pub use crate::interceptor::{Interceptor, Next, RequestContext};
pub use crate::metrics::ClientMetricsSnapshot;
pub use crate::qos::QosVerdict;
pub use crate::request::{Request, RequestBuilder};
pub use crate::response::Response;
pub use crate::transport::{HyperTransport, Transport, TransportOptions};

pub type RpcxResult<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        Client, ClientConfig, ClientMetricsSnapshot, Codec, CodecRegistry, Endpoint, Error,
        ErrorCode, ErrorDecoder, Interceptor, LiveConfig, Next, QosVerdict, RemoteError, Request,
        RequestContext, Response, RetryBudget, RpcxResult, Transport, TransportErrorKind,
        TransportOptions,
    };
}

#[cfg(test)]
mod tests;
