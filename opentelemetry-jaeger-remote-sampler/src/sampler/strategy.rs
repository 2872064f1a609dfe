use super::{AdaptiveSampler, ProbabilisticSampler, RateLimitingSampler, Sampler, SamplingStatus};
use crate::error::RemoteSamplerResult;
use crate::remote::{RemoteStrategy, SamplingStrategyResponse};
use opentelemetry::trace::TraceId;

/// The sampler a [`RemotelyControlledSampler`] currently decides with.
///
/// [`RemotelyControlledSampler`]: crate::RemotelyControlledSampler
#[derive(Clone, Debug)]
pub enum SamplingStrategy {
    /// Sample a fixed fraction of traces.
    Probabilistic(ProbabilisticSampler),
    /// Sample at most a fixed number of traces per second.
    RateLimiting(RateLimitingSampler),
    /// Sample each operation on its own.
    Adaptive(AdaptiveSampler),
}

impl SamplingStrategy {
    /// Shorthand for a [`ProbabilisticSampler`] strategy.
    pub fn probabilistic(sampling_rate: f64) -> Self {
        SamplingStrategy::Probabilistic(ProbabilisticSampler::new(sampling_rate))
    }

    /// Shorthand for a [`RateLimitingSampler`] strategy.
    pub fn rate_limiting(max_traces_per_second: f64) -> Self {
        SamplingStrategy::RateLimiting(RateLimitingSampler::new(max_traces_per_second))
    }

    /// Name of the strategy kind, as used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            SamplingStrategy::Probabilistic(_) => "probabilistic",
            SamplingStrategy::RateLimiting(_) => "ratelimiting",
            SamplingStrategy::Adaptive(_) => "adaptive",
        }
    }

    /// Bring the strategy in line with a response from the strategy service.
    ///
    /// A per-operation table takes precedence over the other two strategies.
    /// When the kind of strategy does not change, the current sampler is
    /// updated in place so that rate limiters keep their credit; otherwise
    /// it is replaced. On error `self` is left untouched.
    pub fn reconcile(
        &mut self,
        response: SamplingStrategyResponse,
        max_operations: usize,
    ) -> RemoteSamplerResult<()> {
        let strategy = RemoteStrategy::try_from(response)?;
        self.apply(strategy, max_operations);
        Ok(())
    }

    fn apply(&mut self, strategy: RemoteStrategy, max_operations: usize) {
        match (self, strategy) {
            (SamplingStrategy::Adaptive(sampler), RemoteStrategy::PerOperation(table)) => {
                sampler.update(&table)
            }
            (current, RemoteStrategy::PerOperation(table)) => {
                *current = SamplingStrategy::Adaptive(AdaptiveSampler::new(&table, max_operations))
            }
            (SamplingStrategy::Probabilistic(sampler), RemoteStrategy::Probabilistic(p)) => {
                sampler.update(p.sampling_rate);
            }
            (current, RemoteStrategy::Probabilistic(p)) => {
                *current = SamplingStrategy::probabilistic(p.sampling_rate)
            }
            (SamplingStrategy::RateLimiting(sampler), RemoteStrategy::RateLimiting(r)) => {
                sampler.update(r.max_traces_per_second);
            }
            (current, RemoteStrategy::RateLimiting(r)) => {
                *current = SamplingStrategy::rate_limiting(r.max_traces_per_second)
            }
        }
    }
}

impl Sampler for SamplingStrategy {
    fn is_sampled(&mut self, trace_id: TraceId, operation: &str) -> SamplingStatus {
        match self {
            SamplingStrategy::Probabilistic(sampler) => sampler.is_sampled(trace_id, operation),
            SamplingStrategy::RateLimiting(sampler) => sampler.is_sampled(trace_id, operation),
            SamplingStrategy::Adaptive(sampler) => sampler.is_sampled(trace_id, operation),
        }
    }
}

impl From<ProbabilisticSampler> for SamplingStrategy {
    fn from(sampler: ProbabilisticSampler) -> Self {
        SamplingStrategy::Probabilistic(sampler)
    }
}

impl From<RateLimitingSampler> for SamplingStrategy {
    fn from(sampler: RateLimitingSampler) -> Self {
        SamplingStrategy::RateLimiting(sampler)
    }
}

impl From<AdaptiveSampler> for SamplingStrategy {
    fn from(sampler: AdaptiveSampler) -> Self {
        SamplingStrategy::Adaptive(sampler)
    }
}
