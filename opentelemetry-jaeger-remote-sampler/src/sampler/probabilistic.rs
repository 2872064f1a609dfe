use super::{sampler_tags, Sampler, SamplingStatus, SAMPLER_TYPE_PROBABILISTIC};
use opentelemetry::trace::TraceId;
use opentelemetry::KeyValue;

/// Samples a fixed fraction of traces.
///
/// The decision is derived from the lower 64 bits of the trace id, so every
/// process sampling the same trace with the same rate reaches the same
/// decision.
#[derive(Clone, Debug)]
pub struct ProbabilisticSampler {
    sampling_rate: f64,
    upper_bound: u64,
    tags: Vec<KeyValue>,
}

impl ProbabilisticSampler {
    /// Create a sampler that samples `sampling_rate` of all traces.
    ///
    /// Rates are clamped into `[0.0, 1.0]`.
    pub fn new(sampling_rate: f64) -> Self {
        let sampling_rate = clamp_rate(sampling_rate);
        ProbabilisticSampler {
            sampling_rate,
            upper_bound: (sampling_rate * (1u64 << 63) as f64) as u64,
            tags: sampler_tags(SAMPLER_TYPE_PROBABILISTIC, sampling_rate),
        }
    }

    /// The configured sampling rate.
    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    /// Replace the sampling rate, returning whether it changed.
    pub fn update(&mut self, sampling_rate: f64) -> bool {
        if self.sampling_rate == clamp_rate(sampling_rate) {
            return false;
        }
        *self = ProbabilisticSampler::new(sampling_rate);
        true
    }

    pub(crate) fn decide(&self, trace_id: TraceId) -> bool {
        if self.sampling_rate >= 1.0 {
            return true;
        }
        let bytes = trace_id.to_bytes();
        let mut low = [0u8; 8];
        low.copy_from_slice(&bytes[8..]);
        (u64::from_be_bytes(low) >> 1) < self.upper_bound
    }

    pub(crate) fn tags(&self) -> &[KeyValue] {
        &self.tags
    }
}

fn clamp_rate(sampling_rate: f64) -> f64 {
    if sampling_rate.is_nan() {
        0.0
    } else {
        sampling_rate.clamp(0.0, 1.0)
    }
}

impl Sampler for ProbabilisticSampler {
    fn is_sampled(&mut self, trace_id: TraceId, _operation: &str) -> SamplingStatus {
        SamplingStatus::new(self.decide(trace_id), &self.tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::tests::random_trace_id;
    use crate::sampler::{SAMPLER_PARAM_TAG_KEY, SAMPLER_TYPE_TAG_KEY};
    use opentelemetry::Value;

    #[test]
    fn sampled_fraction_converges_to_rate() {
        let total = 10_000;
        for expectation in [0.0, 0.1, 0.25, 0.5, 0.75, 1.0] {
            let mut sampler = ProbabilisticSampler::new(expectation);
            let sampled = (0..total)
                .filter(|_| sampler.is_sampled(random_trace_id(), "op").sampled)
                .count();

            let got = sampled as f64 / total as f64;
            let mut tolerance = 0.0;
            if expectation > 0.0 && expectation < 1.0 {
                // See https://en.wikipedia.org/wiki/Binomial_proportion_confidence_interval
                let z = 4.75342; // This should succeed 99.9999% of the time
                tolerance = z * (got * (1.0 - got) / total as f64).sqrt();
            }
            let diff = (got - expectation).abs();
            assert!(
                diff <= tolerance,
                "got {:?} (diff: {}), expected {} (w/tolerance: {})",
                got,
                diff,
                expectation,
                tolerance
            );
        }
    }

    #[test]
    fn few_decisions_do_not_panic() {
        let mut sampler = ProbabilisticSampler::new(0.5);
        let _ = sampler.is_sampled(TraceId::INVALID, "");
        let _ = sampler.is_sampled(TraceId::from(u128::MAX), "op");
    }

    #[test]
    fn decision_is_deterministic_per_trace_id() {
        let mut sampler = ProbabilisticSampler::new(0.5);
        for _ in 0..100 {
            let trace_id = random_trace_id();
            let first = sampler.is_sampled(trace_id, "a").sampled;
            assert_eq!(first, sampler.is_sampled(trace_id, "b").sampled);
        }
    }

    #[test]
    fn out_of_range_rates_are_clamped() {
        assert_eq!(ProbabilisticSampler::new(-1.0).sampling_rate(), 0.0);
        assert_eq!(ProbabilisticSampler::new(2.0).sampling_rate(), 1.0);
        assert_eq!(ProbabilisticSampler::new(f64::NAN).sampling_rate(), 0.0);
        assert!(ProbabilisticSampler::new(2.0).decide(TraceId::from(u128::MAX)));
        assert!(!ProbabilisticSampler::new(0.0).decide(TraceId::from(0)));
    }

    #[test]
    fn tags_describe_sampler() {
        let status = ProbabilisticSampler::new(0.25).is_sampled(random_trace_id(), "op");
        assert_eq!(status.tags.len(), 2);
        assert_eq!(status.tags[0].key.as_str(), SAMPLER_TYPE_TAG_KEY);
        assert_eq!(status.tags[0].value, Value::from("probabilistic"));
        assert_eq!(status.tags[1].key.as_str(), SAMPLER_PARAM_TAG_KEY);
        assert_eq!(status.tags[1].value, Value::F64(0.25));
    }

    #[test]
    fn update_reports_change() {
        let mut sampler = ProbabilisticSampler::new(0.25);
        assert!(!sampler.update(0.25));
        assert!(sampler.update(0.5));
        assert_eq!(sampler.sampling_rate(), 0.5);
    }

    #[test]
    fn update_compares_clamped_rate() {
        let mut sampler = ProbabilisticSampler::new(1.0);
        assert!(!sampler.update(2.0));
        assert!(!sampler.update(1.0));
        assert!(sampler.update(0.5));

        let mut sampler = ProbabilisticSampler::new(0.0);
        assert!(!sampler.update(-1.0));
        assert!(!sampler.update(f64::NAN));
        assert_eq!(sampler.sampling_rate(), 0.0);
    }
}
