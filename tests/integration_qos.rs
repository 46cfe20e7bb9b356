mod common;

use std::time::{Duration, Instant};

use rpcx::prelude::{Client, ClientConfig, Error, ErrorCode};
use tokio_util::sync::CancellationToken;

use common::{MockEndpoint, ResponseSpec};

fn client_for(endpoints: &[&MockEndpoint], config: impl FnOnce(ClientConfig) -> ClientConfig) -> Client {
    let bases: Vec<String> = endpoints
        .iter()
        .map(|endpoint| endpoint.base_url().to_owned())
        .collect();
    Client::builder()
        .client_name("rpcx-test")
        .config(config(
            ClientConfig::new(bases).with_initial_backoff(Duration::from_millis(10)),
        ))
        .try_build()
        .expect("client should build")
}

#[tokio::test(flavor = "multi_thread")]
async fn throttle_with_mandated_wait_delays_the_retry() {
    let server = MockEndpoint::start(vec![
        ResponseSpec::new(429, vec![("retry-after", "1")], Vec::new()),
        ResponseSpec::new(200, Vec::<(String, String)>::new(), b"ok".to_vec()),
    ]);
    let client = client_for(&[&server], |config| {
        config
            .with_max_retries(2)
            .with_max_backoff(Duration::from_millis(50))
    });

    let started = Instant::now();
    let response = client
        .get("/v1/items")
        .send()
        .await
        .expect("retry after throttle should succeed");
    assert_eq!(response.status(), 200);
    assert!(
        started.elapsed() >= Duration::from_secs(1),
        "mandated wait must be honored, waited {:?}",
        started.elapsed()
    );
    assert_eq!(server.served_count(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn persistent_throttle_exhausts_into_a_throttled_error() {
    let server = MockEndpoint::start(vec![ResponseSpec::new(
        429,
        vec![("retry-after", "1")],
        Vec::new(),
    )]);
    let client = client_for(&[&server], |config| config.with_max_retries(1));

    let started = Instant::now();
    let error = client
        .get("/v1/items")
        .send()
        .await
        .expect_err("second 429 should exhaust the budget");
    assert!(
        started.elapsed() >= Duration::from_secs(1),
        "the single retry must wait the mandated second"
    );
    match error {
        Error::Throttled { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("unexpected error variant: {other}"),
    }
    assert_eq!(server.served_count(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn permanent_redirect_targets_the_location_on_the_next_attempt() {
    let target = MockEndpoint::start(vec![ResponseSpec::new(
        200,
        Vec::<(String, String)>::new(),
        b"moved".to_vec(),
    )]);
    let origin = MockEndpoint::start(vec![ResponseSpec::new(
        308,
        vec![("location", target.base_url().to_owned())],
        Vec::new(),
    )]);
    let client = client_for(&[&origin], |config| config.with_max_retries(2));

    let response = client
        .get("/v1/items/item-1")
        .send()
        .await
        .expect("redirected call should succeed");
    assert_eq!(response.body().as_ref(), b"moved");
    assert_eq!(origin.served_count(), 1);
    assert_eq!(target.served_count(), 1);

    // The redirected attempt re-issues the same logical request.
    let lines = target.request_lines();
    assert!(
        lines[0].starts_with("GET /v1/items/item-1"),
        "got {}",
        lines[0]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_during_backoff_returns_promptly() {
    let server = MockEndpoint::start(vec![ResponseSpec::new(
        429,
        vec![("retry-after", "30")],
        Vec::new(),
    )]);
    let client = client_for(&[&server], |config| config.with_max_retries(3));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let error = client
        .get("/v1/items")
        .cancellation_token(cancel)
        .send()
        .await
        .expect_err("cancellation should abort the wait");
    assert_eq!(error.code(), ErrorCode::Cancelled);
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "cancellation must not wait out the mandated delay, waited {:?}",
        started.elapsed()
    );
    assert_eq!(server.served_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_response_times_out_and_fails_over() {
    let slow = MockEndpoint::start(vec![
        ResponseSpec::new(200, Vec::<(String, String)>::new(), b"late".to_vec())
            .with_delay(Duration::from_secs(2)),
    ]);
    let fast = MockEndpoint::start(vec![ResponseSpec::new(
        200,
        Vec::<(String, String)>::new(),
        b"fast".to_vec(),
    )]);
    let client = client_for(&[&slow, &fast], |config| config.with_max_retries(2));

    let response = client
        .get("/v1/items")
        .timeout(Duration::from_millis(250))
        .send()
        .await
        .expect("timeout should rotate to the fast endpoint");
    assert_eq!(response.body().as_ref(), b"fast");
    assert_eq!(fast.served_count(), 1);
}
