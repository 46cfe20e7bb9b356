use std::time::Duration;

use http::header::{LOCATION, RETRY_AFTER};
use http::{HeaderMap, StatusCode};

use crate::endpoint::Endpoint;

/// Server-directed retry classification of one response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QosVerdict {
    /// Success, or an application error for the error decoder. Not retried.
    Normal,
    /// 429: back off, honoring a server-mandated minimum wait when present.
    Throttle { retry_after: Option<Duration> },
    /// 503 or a transport-level failure: rotate away and retry.
    Unavailable,
    /// 308: the next attempt targets `location` directly, bypassing pool
    /// selection for that one attempt, without advancing rotation.
    RetryOther { location: Option<Endpoint> },
}

pub(crate) fn classify(status: StatusCode, headers: &HeaderMap) -> QosVerdict {
    match status {
        StatusCode::PERMANENT_REDIRECT => QosVerdict::RetryOther {
            location: redirect_location(headers),
        },
        StatusCode::TOO_MANY_REQUESTS => QosVerdict::Throttle {
            retry_after: retry_after_seconds(headers),
        },
        StatusCode::SERVICE_UNAVAILABLE => QosVerdict::Unavailable,
        _ => QosVerdict::Normal,
    }
}

/// The wire convention is numeric seconds; anything else is ignored and the
/// backoff policy decides the wait.
fn retry_after_seconds(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?;
    let seconds = value.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

fn redirect_location(headers: &HeaderMap) -> Option<Endpoint> {
    let value = headers.get(LOCATION)?;
    Endpoint::parse(value.to_str().ok()?).ok()
}
