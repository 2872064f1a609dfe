use opentelemetry::trace::{Tracer, TracerProvider as _};
use opentelemetry_jaeger_remote_sampler::remote::{
    OperationSamplingStrategy, PerOperationSamplingStrategies, ProbabilisticSamplingStrategy,
    SamplingStrategyResponse,
};
use opentelemetry_jaeger_remote_sampler::testing::MockSamplingServer;
use opentelemetry_jaeger_remote_sampler::{
    RemotelyControlledSampler, SamplerOptions, SamplingStrategy,
};
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::error::Error;
use std::thread;
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

const SERVICE_NAME: &str = "remote-sampler-demo";
const POLLING_INTERVAL: Duration = Duration::from_millis(500);

fn main() -> Result<(), Box<dyn Error>> {
    // show the sampler's own diagnostics
    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(LevelFilter::DEBUG))
        .init();

    // stands in for a Jaeger agent on localhost:5778
    let agent = MockSamplingServer::start()?;
    agent.add_sampling_strategy(SERVICE_NAME, SamplingStrategyResponse::probabilistic(0.0));

    let sampler = RemotelyControlledSampler::new(
        SERVICE_NAME,
        SamplerOptions::default()
            .with_endpoint(agent.endpoint())
            .with_polling_interval(POLLING_INTERVAL)
            .with_initial_strategy(SamplingStrategy::probabilistic(1.0)),
    )?;
    let provider = SdkTracerProvider::builder()
        .with_sampler(sampler.clone())
        .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
        .build();
    let tracer = provider.tracer("remote-sampler-demo");

    thread::sleep(POLLING_INTERVAL);
    println!("strategy: {:?}", sampler.current_strategy().kind());
    tracer.in_span("checkout", |_cx| {});

    agent.add_sampling_strategy(
        SERVICE_NAME,
        SamplingStrategyResponse::per_operation(PerOperationSamplingStrategies {
            default_sampling_probability: 0.0,
            default_lower_bound_traces_per_second: 0.5,
            per_operation_strategies: vec![OperationSamplingStrategy {
                operation: "checkout".to_string(),
                probabilistic_sampling: ProbabilisticSamplingStrategy { sampling_rate: 1.0 },
            }],
            default_upper_bound_traces_per_second: None,
        }),
    );
    thread::sleep(POLLING_INTERVAL * 2);
    println!("strategy: {:?}", sampler.current_strategy().kind());
    tracer.in_span("checkout", |_cx| {});
    for _ in 0..3 {
        // only the first one gets through the lower bound
        tracer.in_span("healthcheck", |_cx| {});
    }

    sampler.close()?;
    provider.shutdown()?;
    println!("requests served by the agent: {:?}", agent.requests());
    Ok(())
}
