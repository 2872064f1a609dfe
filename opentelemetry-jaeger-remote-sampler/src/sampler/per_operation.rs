use super::probabilistic::ProbabilisticSampler;
use super::rate_limit::{bucket_size_for, LeakyBucket};
use super::{sampler_tags, Sampler, SamplingStatus, SAMPLER_TYPE_LOWER_BOUND};
use crate::remote::PerOperationSamplingStrategies;
use opentelemetry::trace::TraceId;
use opentelemetry::KeyValue;
use std::collections::{HashMap, HashSet};

/// Probabilistic sampler that still samples at least `lower_bound` traces
/// per second.
///
/// Rarely called operations would almost never be sampled at a probability
/// tuned for busy ones; the lower bound guarantees they still show up.
#[derive(Clone, Debug)]
pub struct GuaranteedThroughputSampler {
    probabilistic: ProbabilisticSampler,
    lower_bound: LeakyBucket,
    lower_bound_tags: Vec<KeyValue>,
}

impl GuaranteedThroughputSampler {
    /// Create a sampler sampling `sampling_rate` of the traces, and at least
    /// `lower_bound` traces per second.
    pub fn new(sampling_rate: f64, lower_bound: f64) -> Self {
        let probabilistic = ProbabilisticSampler::new(sampling_rate);
        let lower_bound = lower_bound.max(0.0);
        GuaranteedThroughputSampler {
            lower_bound_tags: sampler_tags(SAMPLER_TYPE_LOWER_BOUND, probabilistic.sampling_rate()),
            probabilistic,
            lower_bound: LeakyBucket::new(lower_bound, bucket_size_for(lower_bound), 1.0),
        }
    }

    /// The probability applied before the lower bound.
    pub fn sampling_rate(&self) -> f64 {
        self.probabilistic.sampling_rate()
    }

    /// The guaranteed number of traces per second.
    pub fn lower_bound(&self) -> f64 {
        self.lower_bound.credits_per_sec()
    }

    /// Apply new parameters. The lower bound limiter keeps its accumulated
    /// credit.
    pub fn update(&mut self, sampling_rate: f64, lower_bound: f64) {
        if self.probabilistic.update(sampling_rate) {
            self.lower_bound_tags =
                sampler_tags(SAMPLER_TYPE_LOWER_BOUND, self.probabilistic.sampling_rate());
        }
        let lower_bound = lower_bound.max(0.0);
        if self.lower_bound.credits_per_sec() != lower_bound {
            self.lower_bound
                .update(lower_bound, bucket_size_for(lower_bound));
        }
    }
}

impl Sampler for GuaranteedThroughputSampler {
    fn is_sampled(&mut self, trace_id: TraceId, _operation: &str) -> SamplingStatus {
        if self.probabilistic.decide(trace_id) {
            // sampled traces count against the lower bound as well
            self.lower_bound.check_credit();
            return SamplingStatus::new(true, self.probabilistic.tags());
        }
        SamplingStatus::new(self.lower_bound.check_credit(), &self.lower_bound_tags)
    }
}

/// Samples each operation with its own [`GuaranteedThroughputSampler`].
///
/// Operations named in the per-operation table use the table's probability.
/// Other operations get an entry at the default probability the first time
/// they are seen, as long as fewer than `max_operations` are tracked. Past
/// that bound they share the default probabilistic sampler.
#[derive(Clone, Debug)]
pub struct AdaptiveSampler {
    samplers: HashMap<String, GuaranteedThroughputSampler>,
    // operations whose entry came from the last table
    table_operations: HashSet<String>,
    default_sampler: ProbabilisticSampler,
    lower_bound: f64,
    max_operations: usize,
}

impl AdaptiveSampler {
    /// Create a sampler from a per-operation table, tracking at most
    /// `max_operations` operations.
    pub fn new(strategies: &PerOperationSamplingStrategies, max_operations: usize) -> Self {
        let mut sampler = AdaptiveSampler {
            samplers: HashMap::new(),
            table_operations: HashSet::new(),
            default_sampler: ProbabilisticSampler::new(strategies.default_sampling_probability),
            lower_bound: strategies.default_lower_bound_traces_per_second,
            max_operations,
        };
        sampler.update(strategies);
        sampler
    }

    /// Merge a new per-operation table.
    ///
    /// Operations dropped from the table are evicted. Every other tracked
    /// operation keeps its rate limiter state and only takes the new
    /// parameters: its table entry, or the defaults for operations first
    /// seen by [`is_sampled`](Sampler::is_sampled).
    pub fn update(&mut self, strategies: &PerOperationSamplingStrategies) {
        self.lower_bound = strategies.default_lower_bound_traces_per_second;
        self.default_sampler
            .update(strategies.default_sampling_probability);

        let table: HashMap<&str, f64> = strategies
            .per_operation_strategies
            .iter()
            .map(|strategy| {
                (
                    strategy.operation.as_str(),
                    strategy.probabilistic_sampling.sampling_rate,
                )
            })
            .collect();

        let previous_table = std::mem::take(&mut self.table_operations);
        let default_rate = self.default_sampler.sampling_rate();
        let lower_bound = self.lower_bound;
        self.samplers.retain(|operation, sampler| {
            match table.get(operation.as_str()) {
                Some(sampling_rate) => sampler.update(*sampling_rate, lower_bound),
                None if previous_table.contains(operation) => return false,
                None => sampler.update(default_rate, lower_bound),
            }
            true
        });

        for strategy in &strategies.per_operation_strategies {
            let operation = &strategy.operation;
            if !self.samplers.contains_key(operation) {
                if self.samplers.len() >= self.max_operations {
                    continue;
                }
                self.samplers.insert(
                    operation.clone(),
                    GuaranteedThroughputSampler::new(
                        strategy.probabilistic_sampling.sampling_rate,
                        lower_bound,
                    ),
                );
            }
            self.table_operations.insert(operation.clone());
        }
    }

    /// Maximum number of operations with their own sampler.
    pub fn max_operations(&self) -> usize {
        self.max_operations
    }

    /// Probability applied to operations without their own sampler.
    pub fn default_sampling_rate(&self) -> f64 {
        self.default_sampler.sampling_rate()
    }

    /// Lower bound applied to every tracked operation.
    pub fn lower_bound(&self) -> f64 {
        self.lower_bound
    }

    /// The sampler tracking `operation`, if any.
    pub fn operation(&self, operation: &str) -> Option<&GuaranteedThroughputSampler> {
        self.samplers.get(operation)
    }

    /// Number of operations with their own sampler.
    pub fn operation_count(&self) -> usize {
        self.samplers.len()
    }
}

impl Sampler for AdaptiveSampler {
    fn is_sampled(&mut self, trace_id: TraceId, operation: &str) -> SamplingStatus {
        if let Some(sampler) = self.samplers.get_mut(operation) {
            return sampler.is_sampled(trace_id, operation);
        }
        if self.samplers.len() >= self.max_operations {
            return self.default_sampler.is_sampled(trace_id, operation);
        }
        let mut sampler = GuaranteedThroughputSampler::new(
            self.default_sampler.sampling_rate(),
            self.lower_bound,
        );
        let status = sampler.is_sampled(trace_id, operation);
        self.samplers.insert(operation.to_string(), sampler);
        status
    }
}
