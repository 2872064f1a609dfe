//! Outcome counters of the poll cycles.
use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::KeyValue;
use std::fmt::{self, Debug};

/// Receives the outcome of every poll cycle of a [`RemotelyControlledSampler`].
///
/// Only the poll thread calls into the sink.
///
/// [`RemotelyControlledSampler`]: crate::RemotelyControlledSampler
pub trait SamplerMetrics: Debug + Send + Sync {
    /// The strategy could not be fetched or decoded.
    fn sampler_query_failure(&self, count: u64);
    /// A strategy was fetched and decoded.
    fn sampler_retrieved(&self, count: u64);
    /// A fetched strategy could not be installed.
    fn sampler_update_failure(&self, count: u64);
    /// A fetched strategy was installed.
    fn sampler_updated(&self, count: u64);
}

/// Discards every count.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSamplerMetrics;

impl SamplerMetrics for NoopSamplerMetrics {
    fn sampler_query_failure(&self, _count: u64) {}
    fn sampler_retrieved(&self, _count: u64) {}
    fn sampler_update_failure(&self, _count: u64) {}
    fn sampler_updated(&self, _count: u64) {}
}

/// Records counts on OpenTelemetry counters.
///
/// Queries are counted on `jaeger.sampler.queries`, updates on
/// `jaeger.sampler.updates`, both with a `result` attribute of `ok` or `err`.
#[derive(Clone)]
pub struct MeterSamplerMetrics {
    queries: Counter<u64>,
    updates: Counter<u64>,
}

impl MeterSamplerMetrics {
    /// Create the counters on `meter`.
    pub fn new(meter: &Meter) -> Self {
        MeterSamplerMetrics {
            queries: meter
                .u64_counter("jaeger.sampler.queries")
                .with_description("Number of times the sampler polled the strategy service")
                .build(),
            updates: meter
                .u64_counter("jaeger.sampler.updates")
                .with_description("Number of times the sampler tried to install a fetched strategy")
                .build(),
        }
    }
}

impl fmt::Debug for MeterSamplerMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterSamplerMetrics").finish()
    }
}

const RESULT_KEY: &str = "result";

impl SamplerMetrics for MeterSamplerMetrics {
    fn sampler_query_failure(&self, count: u64) {
        self.queries.add(count, &[KeyValue::new(RESULT_KEY, "err")]);
    }

    fn sampler_retrieved(&self, count: u64) {
        self.queries.add(count, &[KeyValue::new(RESULT_KEY, "ok")]);
    }

    fn sampler_update_failure(&self, count: u64) {
        self.updates.add(count, &[KeyValue::new(RESULT_KEY, "err")]);
    }

    fn sampler_updated(&self, count: u64) {
        self.updates.add(count, &[KeyValue::new(RESULT_KEY, "ok")]);
    }
}
