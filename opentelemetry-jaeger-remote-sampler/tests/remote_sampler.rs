#![cfg(feature = "testing")]

use http::StatusCode;
use opentelemetry::trace::{SamplingDecision, SpanKind, TraceId};
use opentelemetry_jaeger_remote_sampler::remote::{
    OperationSamplingStrategy, PerOperationSamplingStrategies, ProbabilisticSamplingStrategy,
    SamplingStrategyResponse,
};
use opentelemetry_jaeger_remote_sampler::testing::MockSamplingServer;
use opentelemetry_jaeger_remote_sampler::{
    RemoteSamplerError, RemotelyControlledSampler, SamplerMetrics, SamplerOptions,
    SamplingStrategy,
};
use opentelemetry_sdk::trace::ShouldSample;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Clone, Debug, Default)]
struct Counts {
    query_failures: Arc<AtomicU64>,
    retrieved: Arc<AtomicU64>,
    update_failures: Arc<AtomicU64>,
    updated: Arc<AtomicU64>,
}

impl SamplerMetrics for Counts {
    fn sampler_query_failure(&self, count: u64) {
        self.query_failures.fetch_add(count, Ordering::SeqCst);
    }
    fn sampler_retrieved(&self, count: u64) {
        self.retrieved.fetch_add(count, Ordering::SeqCst);
    }
    fn sampler_update_failure(&self, count: u64) {
        self.update_failures.fetch_add(count, Ordering::SeqCst);
    }
    fn sampler_updated(&self, count: u64) {
        self.updated.fetch_add(count, Ordering::SeqCst);
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        thread::sleep(Duration::from_millis(5));
    }
}

fn trace_id() -> TraceId {
    TraceId::from(rand::rng().random::<u128>())
}

fn options(server: &MockSamplingServer, counts: &Counts, interval: Duration) -> SamplerOptions {
    SamplerOptions::default()
        .with_endpoint(server.endpoint())
        .with_polling_interval(interval)
        .with_request_timeout(Duration::from_secs(1))
        .with_initial_strategy(SamplingStrategy::probabilistic(1.0))
        .with_metrics(counts.clone())
}

#[test]
fn installs_strategy_served_for_service() {
    let server = MockSamplingServer::start().unwrap();
    server.add_sampling_strategy("checkout", SamplingStrategyResponse::probabilistic(0.25));
    let counts = Counts::default();

    let sampler = RemotelyControlledSampler::new(
        "checkout",
        options(&server, &counts, Duration::from_secs(3600)),
    )
    .unwrap();
    wait_until(|| counts.updated.load(Ordering::SeqCst) == 1);
    sampler.close().unwrap();

    assert_eq!(counts.retrieved.load(Ordering::SeqCst), 1);
    assert_eq!(counts.query_failures.load(Ordering::SeqCst), 0);
    match sampler.current_strategy() {
        SamplingStrategy::Probabilistic(probabilistic) => {
            assert_eq!(probabilistic.sampling_rate(), 0.25)
        }
        other => panic!("unexpected strategy {:?}", other),
    }
    assert_eq!(server.requests(), vec!["/?service=checkout".to_string()]);
}

#[test]
fn unknown_service_gets_default_strategy() {
    let server = MockSamplingServer::start().unwrap();
    let counts = Counts::default();

    let sampler = RemotelyControlledSampler::new(
        "a b/c",
        options(&server, &counts, Duration::from_secs(3600)),
    )
    .unwrap();
    wait_until(|| counts.updated.load(Ordering::SeqCst) == 1);
    sampler.close().unwrap();

    assert_eq!(server.requests(), vec!["/?service=a%20b%2Fc".to_string()]);
    match sampler.current_strategy() {
        SamplingStrategy::Probabilistic(probabilistic) => {
            assert_eq!(probabilistic.sampling_rate(), 0.001)
        }
        other => panic!("unexpected strategy {:?}", other),
    }
}

#[test]
fn server_errors_keep_current_strategy() {
    let server = MockSamplingServer::start().unwrap();
    server.respond_with(StatusCode::INTERNAL_SERVER_ERROR, "boom");
    let counts = Counts::default();

    let sampler =
        RemotelyControlledSampler::new("svc", options(&server, &counts, Duration::from_secs(3600)))
            .unwrap();
    wait_until(|| counts.query_failures.load(Ordering::SeqCst) == 1);

    for _ in 0..100 {
        assert!(sampler.is_sampled(trace_id(), "op").sampled);
    }
    sampler.close().unwrap();
    assert_eq!(counts.retrieved.load(Ordering::SeqCst), 0);
    assert_eq!(counts.updated.load(Ordering::SeqCst), 0);
}

#[test]
fn unparsable_body_is_a_query_failure() {
    let server = MockSamplingServer::start().unwrap();
    server.respond_with(StatusCode::OK, "{not json");
    let counts = Counts::default();

    let sampler =
        RemotelyControlledSampler::new("svc", options(&server, &counts, Duration::from_secs(3600)))
            .unwrap();
    wait_until(|| counts.query_failures.load(Ordering::SeqCst) == 1);
    sampler.close().unwrap();

    assert_eq!(sampler.current_strategy().kind(), "probabilistic");
}

#[test]
fn empty_strategy_is_an_update_failure() {
    let server = MockSamplingServer::start().unwrap();
    server.respond_with(StatusCode::OK, r#"{"strategyType":"RATE_LIMITING"}"#);
    let counts = Counts::default();

    let sampler =
        RemotelyControlledSampler::new("svc", options(&server, &counts, Duration::from_secs(3600)))
            .unwrap();
    wait_until(|| counts.update_failures.load(Ordering::SeqCst) == 1);
    sampler.close().unwrap();

    assert_eq!(counts.retrieved.load(Ordering::SeqCst), 1);
    assert_eq!(counts.updated.load(Ordering::SeqCst), 0);
    assert_eq!(sampler.current_strategy().kind(), "probabilistic");
}

#[test]
fn follows_strategy_changes() {
    let server = MockSamplingServer::start().unwrap();
    server.add_sampling_strategy("svc", SamplingStrategyResponse::rate_limiting(2.0));
    let counts = Counts::default();

    let sampler =
        RemotelyControlledSampler::new("svc", options(&server, &counts, Duration::from_millis(20)))
            .unwrap();
    wait_until(|| sampler.current_strategy().kind() == "ratelimiting");

    server.add_sampling_strategy(
        "svc",
        SamplingStrategyResponse::per_operation(PerOperationSamplingStrategies {
            default_sampling_probability: 0.0,
            default_lower_bound_traces_per_second: 0.0,
            per_operation_strategies: vec![OperationSamplingStrategy {
                operation: "GET /health".to_string(),
                probabilistic_sampling: ProbabilisticSamplingStrategy { sampling_rate: 1.0 },
            }],
            default_upper_bound_traces_per_second: None,
        }),
    );
    wait_until(|| sampler.current_strategy().kind() == "adaptive");

    assert!(sampler.is_sampled(trace_id(), "GET /health").sampled);
    // the lower bound admits the first trace of an operation, then nothing
    assert!(sampler.is_sampled(trace_id(), "GET /orders").sampled);
    assert!(!sampler.is_sampled(trace_id(), "GET /orders").sampled);

    // later polls of the same table keep the state of every operation
    let polls = server.requests().len();
    wait_until(|| server.requests().len() >= polls + 2);
    assert!(!sampler.is_sampled(trace_id(), "GET /orders").sampled);
    sampler.close().unwrap();

    let result =
        sampler.should_sample(None, trace_id(), "GET /health", &SpanKind::Server, &[], &[]);
    assert_eq!(result.decision, SamplingDecision::RecordAndSample);
    assert!(!result.attributes.is_empty());

    assert!(server.requests().len() >= 2);
    assert_eq!(counts.query_failures.load(Ordering::SeqCst), 0);
}

#[test]
fn close_returns_before_the_interval_elapses() {
    let server = MockSamplingServer::start().unwrap();
    let counts = Counts::default();
    let sampler =
        RemotelyControlledSampler::new("svc", options(&server, &counts, Duration::from_secs(3600)))
            .unwrap();

    let start = Instant::now();
    sampler.close().unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(matches!(sampler.close(), Err(RemoteSamplerError::AlreadyShutdown)));
}
