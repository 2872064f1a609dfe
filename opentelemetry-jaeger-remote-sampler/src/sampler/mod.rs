//! Sampling decisions.
//!
//! A [`Sampler`] decides, for a trace id and the name of the operation that
//! starts the trace, whether the trace should be recorded. The decision comes
//! back as a [`SamplingStatus`] carrying tags that describe which sampler made
//! it and with which parameter, so that backends can re-weight sampled data.
//!
//! Three samplers are provided:
//!
//! * [`ProbabilisticSampler`] samples a fixed fraction of traces.
//! * [`RateLimitingSampler`] samples at most a fixed number of traces per second.
//! * [`AdaptiveSampler`] keeps one probabilistic sampler with a guaranteed lower
//!   bound rate per operation.
//!
//! [`SamplingStrategy`] is the closed set of the three, which is what the
//! [`RemotelyControlledSampler`] swaps when a new strategy arrives.
//!
//! [`RemotelyControlledSampler`]: crate::RemotelyControlledSampler
use opentelemetry::trace::TraceId;
use opentelemetry::KeyValue;
use std::fmt::Debug;

mod per_operation;
mod probabilistic;
mod rate_limit;
mod strategy;

pub use per_operation::{AdaptiveSampler, GuaranteedThroughputSampler};
pub use probabilistic::ProbabilisticSampler;
pub use rate_limit::RateLimitingSampler;
pub use strategy::SamplingStrategy;

/// Tag key naming the kind of sampler that made the decision.
pub const SAMPLER_TYPE_TAG_KEY: &str = "sampler.type";
/// Tag key holding the parameter of the sampler that made the decision.
pub const SAMPLER_PARAM_TAG_KEY: &str = "sampler.param";

/// `sampler.type` value of [`ProbabilisticSampler`].
pub const SAMPLER_TYPE_PROBABILISTIC: &str = "probabilistic";
/// `sampler.type` value of [`RateLimitingSampler`].
pub const SAMPLER_TYPE_RATE_LIMITING: &str = "ratelimiting";
/// `sampler.type` value used when the lower bound of a
/// [`GuaranteedThroughputSampler`] made the decision.
pub const SAMPLER_TYPE_LOWER_BOUND: &str = "lowerbound";

/// Result of a sampling decision.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingStatus {
    /// Whether the trace should be recorded.
    pub sampled: bool,
    /// Tags describing the sampler that made the decision.
    pub tags: Vec<KeyValue>,
}

impl SamplingStatus {
    pub(crate) fn new(sampled: bool, tags: &[KeyValue]) -> Self {
        SamplingStatus {
            sampled,
            tags: tags.to_vec(),
        }
    }
}

/// Decides whether a trace should be sampled.
///
/// Samplers may keep state that changes on every decision (rate limiters do),
/// so the decision takes `&mut self`. Callers sharing a sampler between
/// threads serialize access, the way [`RemotelyControlledSampler`] does with
/// its strategy lock.
///
/// [`RemotelyControlledSampler`]: crate::RemotelyControlledSampler
pub trait Sampler: Debug + Send {
    /// Returns the sampling decision for the trace `trace_id` started by
    /// `operation`.
    fn is_sampled(&mut self, trace_id: TraceId, operation: &str) -> SamplingStatus;
}

fn sampler_tags(sampler_type: &'static str, param: f64) -> Vec<KeyValue> {
    vec![
        KeyValue::new(SAMPLER_TYPE_TAG_KEY, sampler_type),
        KeyValue::new(SAMPLER_PARAM_TAG_KEY, param),
    ]
}
