use super::{sampler_tags, Sampler, SamplingStatus, SAMPLER_TYPE_RATE_LIMITING};
use opentelemetry::trace::TraceId;
use opentelemetry::KeyValue;
use std::time::Instant;

// leaky bucket based rate limit
// credits accrue continuously at `credits_per_sec` up to `bucket_size`
#[derive(Clone, Debug)]
pub(crate) struct LeakyBucket {
    credits_per_sec: f64,
    available: f64,
    bucket_size: f64,
    last_time: Instant,
}

impl LeakyBucket {
    pub(crate) fn new(credits_per_sec: f64, bucket_size: f64, available: f64) -> LeakyBucket {
        LeakyBucket {
            credits_per_sec,
            available: available.min(bucket_size),
            bucket_size,
            last_time: Instant::now(),
        }
    }

    pub(crate) fn credits_per_sec(&self) -> f64 {
        self.credits_per_sec
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> f64 {
        self.available
    }

    // keeps the accumulated balance, scaled to the new bucket size
    pub(crate) fn update(&mut self, credits_per_sec: f64, bucket_size: f64) {
        if self.bucket_size > 0.0 {
            self.available = self.available * bucket_size / self.bucket_size;
        }
        self.credits_per_sec = credits_per_sec;
        self.bucket_size = bucket_size;
    }

    pub(crate) fn check_credit(&mut self) -> bool {
        self.check_availability(Instant::now)
    }

    fn check_availability<F>(&mut self, now: F) -> bool
    where
        F: Fn() -> Instant,
    {
        let cur_time = now();
        // a clock going backwards adds nothing and does not move last_time back
        let elapsed = cur_time.saturating_duration_since(self.last_time);
        self.last_time = self.last_time.max(cur_time);
        self.available = f64::min(
            elapsed.as_secs_f64() * self.credits_per_sec + self.available,
            self.bucket_size,
        );

        if self.available >= 1.0 {
            self.available -= 1.0;
            true
        } else {
            false
        }
    }
}

pub(crate) fn bucket_size_for(rate: f64) -> f64 {
    rate.max(1.0)
}

// a single credit, so a burst after idling cannot exceed the ceiling
const RATE_LIMITING_BUCKET_SIZE: f64 = 1.0;

/// Samples at most a fixed number of traces per second.
///
/// The limiter starts without credit and never holds more than one, so the
/// ceiling holds in every one-second window, including right after a quiet
/// period.
#[derive(Clone, Debug)]
pub struct RateLimitingSampler {
    max_traces_per_second: f64,
    bucket: LeakyBucket,
    tags: Vec<KeyValue>,
}

impl RateLimitingSampler {
    /// Create a sampler that samples at most `max_traces_per_second` traces
    /// per second. Negative and non-finite rates are treated as zero.
    pub fn new(max_traces_per_second: f64) -> Self {
        let rate = sanitize_rate(max_traces_per_second);
        RateLimitingSampler {
            max_traces_per_second: rate,
            bucket: LeakyBucket::new(rate, RATE_LIMITING_BUCKET_SIZE, 0.0),
            tags: sampler_tags(SAMPLER_TYPE_RATE_LIMITING, rate),
        }
    }

    /// The configured ceiling.
    pub fn max_traces_per_second(&self) -> f64 {
        self.max_traces_per_second
    }

    /// Replace the ceiling while keeping the accumulated credit. Returns
    /// whether the ceiling changed.
    pub fn update(&mut self, max_traces_per_second: f64) -> bool {
        let rate = sanitize_rate(max_traces_per_second);
        if self.max_traces_per_second == rate {
            return false;
        }
        self.max_traces_per_second = rate;
        self.bucket.update(rate, RATE_LIMITING_BUCKET_SIZE);
        self.tags = sampler_tags(SAMPLER_TYPE_RATE_LIMITING, rate);
        true
    }
}

fn sanitize_rate(rate: f64) -> f64 {
    if rate.is_finite() {
        rate.max(0.0)
    } else {
        0.0
    }
}

impl Sampler for RateLimitingSampler {
    fn is_sampled(&mut self, _trace_id: TraceId, _operation: &str) -> SamplingStatus {
        SamplingStatus::new(self.bucket.check_credit(), &self.tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_leaky_bucket() {
        // maximum bucket size 2, add 1 allowance every 10 seconds
        let mut leaky_bucket = LeakyBucket::new(0.1, 2.0, 2.0);
        let current_time = Instant::now();
        leaky_bucket.last_time = current_time;

        let test_cases = vec![
            (0, vec![true, true, false]),
            (1, vec![false]),
            (5, vec![false]),
            (10, vec![true, false]),
            (60, vec![true, true, false]), // maximum allowance is 2
        ];

        for (elapsed_sec, cases) in test_cases.into_iter() {
            for should_pass in cases {
                let now = current_time + Duration::from_secs(elapsed_sec);
                assert_eq!(should_pass, leaky_bucket.check_availability(|| now))
            }
        }
    }

    #[test]
    fn test_clock_going_backwards_does_not_add_credit() {
        let mut leaky_bucket = LeakyBucket::new(1.0, 1.0, 0.0);
        let current_time = Instant::now() + Duration::from_secs(10);
        leaky_bucket.last_time = current_time;

        assert!(!leaky_bucket.check_availability(|| current_time - Duration::from_secs(5)));
    }

    #[test]
    fn idle_time_is_credited_once() {
        let mut leaky_bucket = LeakyBucket::new(1.0, 1.0, 1.0);
        let current_time = Instant::now();
        leaky_bucket.last_time = current_time;

        let later = current_time + Duration::from_secs(10);
        assert!(leaky_bucket.check_availability(|| later));
        assert!(!leaky_bucket.check_availability(|| later));
        assert!(leaky_bucket.check_availability(|| later + Duration::from_secs(1)));
    }

    #[test]
    fn update_rescales_balance() {
        let mut leaky_bucket = LeakyBucket::new(2.0, 2.0, 2.0);
        leaky_bucket.update(4.0, 4.0);
        assert_eq!(leaky_bucket.available, 4.0);
        leaky_bucket.update(1.0, 1.0);
        assert_eq!(leaky_bucket.available, 1.0);
        assert_eq!(leaky_bucket.credits_per_sec(), 1.0);
    }

    fn sampled_at(sampler: &mut RateLimitingSampler, start: Instant, calls_ms: &[u64]) -> Vec<u64> {
        calls_ms
            .iter()
            .copied()
            .filter(|ms| {
                sampler
                    .bucket
                    .check_availability(|| start + Duration::from_millis(*ms))
            })
            .collect()
    }

    fn assert_within_rate(rate: f64, sampled_at: &[u64]) {
        for (i, first) in sampled_at.iter().enumerate() {
            let in_window = sampled_at[i..]
                .iter()
                .take_while(|ms| **ms < first + 1_000)
                .count();
            assert!(
                in_window as f64 <= rate,
                "rate {} sampled {} traces within one second",
                rate,
                in_window
            );
        }
    }

    #[test]
    fn never_exceeds_rate_in_any_one_second_window() {
        for rate in [1.0, 2.0, 4.0, 8.0] {
            for idle_ms in [0, 10_000] {
                let mut sampler = RateLimitingSampler::new(rate);
                let start = Instant::now();
                sampler.bucket.last_time = start;

                // continuous decisions, one every 125ms for ten seconds
                let calls: Vec<u64> = (0..80u64).map(|step| idle_ms + step * 125).collect();
                let sampled = sampled_at(&mut sampler, start, &calls);

                assert!(!sampled.is_empty());
                assert_within_rate(rate, &sampled);
            }
        }
    }

    #[test]
    fn burst_after_idle_stays_within_rate() {
        let mut sampler = RateLimitingSampler::new(2.0);
        let start = Instant::now();
        sampler.bucket.last_time = start;

        // idle for ten seconds, then a call every 10ms for a second
        let calls: Vec<u64> = (0..100u64).map(|step| 10_000 + step * 10).collect();
        let sampled = sampled_at(&mut sampler, start, &calls);

        assert_eq!(sampled.first(), Some(&10_000));
        assert!(sampled.len() <= 2, "sampled {:?}", sampled);
        assert_within_rate(2.0, &sampled);
    }

    #[test]
    fn update_keeps_accumulated_credit() {
        let mut sampler = RateLimitingSampler::new(2.0);
        let start = Instant::now();
        sampler.bucket.last_time = start;
        let half_a_credit = start + Duration::from_millis(250);
        assert!(!sampler.bucket.check_availability(|| half_a_credit));
        assert_eq!(sampler.bucket.available, 0.5);

        assert!(!sampler.update(2.0));
        assert_eq!(sampler.bucket.available, 0.5);

        assert!(sampler.update(4.0));
        assert_eq!(sampler.bucket.available, 0.5);
        assert_eq!(sampler.max_traces_per_second(), 4.0);
        assert_eq!(sampler.bucket.credits_per_sec(), 4.0);
    }

    #[test]
    fn zero_rate_never_samples() {
        let mut sampler = RateLimitingSampler::new(0.0);
        let start = Instant::now();
        sampler.bucket.last_time = start;
        assert!(!sampler
            .bucket
            .check_availability(|| start + Duration::from_secs(3600)));
        assert_eq!(RateLimitingSampler::new(-3.0).max_traces_per_second(), 0.0);
        assert_eq!(RateLimitingSampler::new(f64::INFINITY).max_traces_per_second(), 0.0);
    }
}
