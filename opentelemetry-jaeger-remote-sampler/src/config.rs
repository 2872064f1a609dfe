//! Sampler configuration.
//!
//! [`SamplerOptions::default`] starts from the defaults below, then applies
//! the `OTEL_TRACES_SAMPLER_ARG` environment variable in the format the
//! OpenTelemetry specification defines for the `jaeger_remote` sampler, e.g.
//! `endpoint=http://localhost:5778/sampling,pollingIntervalMs=5000,initialSamplingRate=0.25`.
//! Values set through the `with_*` methods take precedence.
use crate::metrics::{NoopSamplerMetrics, SamplerMetrics};
use crate::sampler::SamplingStrategy;
use opentelemetry::otel_warn;
use std::env;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_REMOTE_SAMPLER_ENDPOINT: &str = "http://localhost:5778/sampling";
const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_OPERATIONS: usize = 2000;
const DEFAULT_INITIAL_SAMPLING_RATE: f64 = 0.001;

pub(crate) const OTEL_TRACES_SAMPLER_ARG: &str = "OTEL_TRACES_SAMPLER_ARG";

/// Configuration of a [`RemotelyControlledSampler`].
///
/// [`RemotelyControlledSampler`]: crate::RemotelyControlledSampler
#[derive(Clone, Debug)]
pub struct SamplerOptions {
    endpoint: String,
    polling_interval: Duration,
    request_timeout: Duration,
    max_operations: usize,
    initial_strategy: SamplingStrategy,
    metrics: Arc<dyn SamplerMetrics>,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        let mut options = SamplerOptions {
            endpoint: DEFAULT_REMOTE_SAMPLER_ENDPOINT.to_string(),
            polling_interval: DEFAULT_POLLING_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_operations: DEFAULT_MAX_OPERATIONS,
            initial_strategy: SamplingStrategy::probabilistic(DEFAULT_INITIAL_SAMPLING_RATE),
            metrics: Arc::new(NoopSamplerMetrics),
        };
        if let Ok(arg) = env::var(OTEL_TRACES_SAMPLER_ARG) {
            options.apply_sampler_arg(&arg);
        }
        options
    }
}

impl SamplerOptions {
    fn apply_sampler_arg(&mut self, arg: &str) {
        for pair in arg.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
            let Some((key, value)) = pair.split_once('=') else {
                otel_warn!(
                    name: "JaegerRemoteSampler.Config.InvalidSamplerArgument",
                    message = "Ignoring OTEL_TRACES_SAMPLER_ARG entry that is not a key=value pair",
                    entry = pair.to_string()
                );
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "endpoint" if !value.is_empty() => self.endpoint = value.to_string(),
                "pollingIntervalMs" => match value.parse::<u64>() {
                    Ok(ms) if ms > 0 => self.polling_interval = Duration::from_millis(ms),
                    _ => {
                        otel_warn!(
                            name: "JaegerRemoteSampler.Config.InvalidSamplerArgument",
                            message = "pollingIntervalMs must be a positive integer",
                            value = value.to_string()
                        );
                    }
                },
                "initialSamplingRate" => match value.parse::<f64>() {
                    Ok(rate) if (0.0..=1.0).contains(&rate) => {
                        self.initial_strategy = SamplingStrategy::probabilistic(rate)
                    }
                    _ => {
                        otel_warn!(
                            name: "JaegerRemoteSampler.Config.InvalidSamplerArgument",
                            message = "initialSamplingRate must be between 0.0 and 1.0",
                            value = value.to_string()
                        );
                    }
                },
                _ => {
                    otel_warn!(
                        name: "JaegerRemoteSampler.Config.UnknownSamplerArgument",
                        message = "Ignoring unknown OTEL_TRACES_SAMPLER_ARG entry",
                        entry = pair.to_string()
                    );
                }
            }
        }
    }

    /// URL of the sampling strategy service. Only `http` is supported.
    ///
    /// Defaults to `http://localhost:5778/sampling`.
    pub fn with_endpoint<S: Into<String>>(self, endpoint: S) -> Self {
        SamplerOptions {
            endpoint: endpoint.into(),
            ..self
        }
    }

    /// Time between two polls of the strategy service.
    ///
    /// Zero is ignored. Defaults to 60 seconds.
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.polling_interval = interval;
        }
        self
    }

    /// Connect and read timeout of each request to the strategy service.
    ///
    /// Zero is ignored. Defaults to 5 seconds.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.request_timeout = timeout;
        }
        self
    }

    /// Maximum number of operations sampled on their own by per-operation
    /// strategies. Defaults to 2000.
    pub fn with_max_operations(self, max_operations: usize) -> Self {
        SamplerOptions {
            max_operations,
            ..self
        }
    }

    /// Strategy used until the first strategy is fetched.
    ///
    /// Defaults to probabilistic sampling at 0.001.
    pub fn with_initial_strategy<S: Into<SamplingStrategy>>(self, strategy: S) -> Self {
        SamplerOptions {
            initial_strategy: strategy.into(),
            ..self
        }
    }

    /// Sink for the outcome of every poll. Defaults to [`NoopSamplerMetrics`].
    pub fn with_metrics<M: SamplerMetrics + 'static>(self, metrics: M) -> Self {
        SamplerOptions {
            metrics: Arc::new(metrics),
            ..self
        }
    }

    /// URL of the sampling strategy service.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Time between two polls.
    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    /// Timeout of each request.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Maximum number of tracked operations.
    pub fn max_operations(&self) -> usize {
        self.max_operations
    }

    /// Strategy used until the first strategy is fetched.
    pub fn initial_strategy(&self) -> &SamplingStrategy {
        &self.initial_strategy
    }

    pub(crate) fn metrics(&self) -> Arc<dyn SamplerMetrics> {
        self.metrics.clone()
    }
}
