//! Types of the Jaeger remote sampling protocol, as served in JSON by the
//! `/sampling` endpoint of the Jaeger agent and collector.
//!
//! The proto definition can be found
//! [here](https://github.com/jaegertracing/jaeger-idl/blob/main/proto/api_v2/sampling.proto).
use crate::error::{RemoteSamplerError, RemoteSamplerResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// ProbabilisticSamplingStrategy samples traces with a fixed probability.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProbabilisticSamplingStrategy {
    /// samplingRate is the sampling probability in the range [0.0, 1.0].
    pub sampling_rate: f64,
}

/// RateLimitingSamplingStrategy samples a fixed number of traces per time interval.
/// The typical implementations use the leaky bucket algorithm.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitingSamplingStrategy {
    /// maxTracesPerSecond is the ceiling of sampled traces per second. Integer
    /// and fractional values are accepted.
    pub max_traces_per_second: f64,
}

/// OperationSamplingStrategy is a sampling strategy for a given operation
/// (aka endpoint, span name). Only probabilistic sampling is currently supported.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationSamplingStrategy {
    /// Name of the operation.
    pub operation: String,
    /// Probability applied to the operation.
    pub probabilistic_sampling: ProbabilisticSamplingStrategy,
}

/// PerOperationSamplingStrategies is a combination of strategies for different endpoints
/// as well as some service-wide defaults. It is particularly useful for services whose
/// endpoints receive vastly different traffic, so that any single rate of sampling would
/// result in either too much data for some endpoints or almost no data for other endpoints.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PerOperationSamplingStrategies {
    /// defaultSamplingProbability is the sampling probability for spans that do not match
    /// any of the perOperationStrategies.
    pub default_sampling_probability: f64,
    /// defaultLowerBoundTracesPerSecond defines a lower-bound rate limit used to ensure that
    /// there is some minimal amount of traces sampled for an endpoint that might otherwise
    /// be never sampled via probabilistic strategies. The limit is local to a service instance,
    /// so if a service is deployed with many (N) instances, the effective minimum rate of sampling
    /// will be N times higher. This setting applies to ALL operations, whether or not they match
    /// one of the perOperationStrategies.
    pub default_lower_bound_traces_per_second: f64,
    /// perOperationStrategies describes sampling strategies for individual operations within
    /// a given service.
    pub per_operation_strategies: Vec<OperationSamplingStrategy>,
    /// defaultUpperBoundTracesPerSecond defines an upper bound rate limit.
    /// It is carried for completeness and not enforced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_upper_bound_traces_per_second: Option<f64>,
}

/// SamplingStrategyResponse contains an overall sampling strategy for a given service.
/// This type should be treated as a union where only one of the strategy field is present.
///
/// Use [`RemoteStrategy::try_from`] to collapse it into the strategy it carries.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingStrategyResponse {
    /// Legacy field that was meant to indicate which one of the strategy fields
    /// below is present. It was not extended when per-operation strategy was
    /// introduced, so it is only used to name the strategy in errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_type: Option<SamplingStrategyType>,
    /// Service wide probabilistic strategy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilistic_sampling: Option<ProbabilisticSamplingStrategy>,
    /// Service wide rate limiting strategy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limiting_sampling: Option<RateLimitingSamplingStrategy>,
    /// Per operation strategies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_sampling: Option<PerOperationSamplingStrategies>,
}

impl SamplingStrategyResponse {
    /// A response carrying a service wide probabilistic strategy.
    pub fn probabilistic(sampling_rate: f64) -> Self {
        SamplingStrategyResponse {
            strategy_type: Some(SamplingStrategyType::Probabilistic),
            probabilistic_sampling: Some(ProbabilisticSamplingStrategy { sampling_rate }),
            ..Default::default()
        }
    }

    /// A response carrying a service wide rate limiting strategy.
    pub fn rate_limiting(max_traces_per_second: f64) -> Self {
        SamplingStrategyResponse {
            strategy_type: Some(SamplingStrategyType::RateLimiting),
            rate_limiting_sampling: Some(RateLimitingSamplingStrategy {
                max_traces_per_second,
            }),
            ..Default::default()
        }
    }

    /// A response carrying per operation strategies.
    pub fn per_operation(strategies: PerOperationSamplingStrategies) -> Self {
        SamplingStrategyResponse {
            strategy_type: Some(SamplingStrategyType::Probabilistic),
            operation_sampling: Some(strategies),
            ..Default::default()
        }
    }
}

/// See description of the SamplingStrategyResponse.strategyType field.
///
/// Servers encode it either by name or by ordinal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SamplingStrategyType {
    /// `PROBABILISTIC`, ordinal 0.
    Probabilistic,
    /// `RATE_LIMITING`, ordinal 1.
    RateLimiting,
    /// Anything else, kept verbatim.
    Unknown(String),
}

impl fmt::Display for SamplingStrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingStrategyType::Probabilistic => f.write_str("PROBABILISTIC"),
            SamplingStrategyType::RateLimiting => f.write_str("RATE_LIMITING"),
            SamplingStrategyType::Unknown(name) => f.write_str(name),
        }
    }
}

impl Serialize for SamplingStrategyType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SamplingStrategyType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Ordinal(i64),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Name(name) => match name.as_str() {
                "PROBABILISTIC" => SamplingStrategyType::Probabilistic,
                "RATE_LIMITING" => SamplingStrategyType::RateLimiting,
                _ => SamplingStrategyType::Unknown(name),
            },
            Repr::Ordinal(0) => SamplingStrategyType::Probabilistic,
            Repr::Ordinal(1) => SamplingStrategyType::RateLimiting,
            Repr::Ordinal(other) => SamplingStrategyType::Unknown(other.to_string()),
        })
    }
}

/// The single strategy carried by a [`SamplingStrategyResponse`].
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteStrategy {
    /// Service wide probabilistic strategy.
    Probabilistic(ProbabilisticSamplingStrategy),
    /// Service wide rate limiting strategy.
    RateLimiting(RateLimitingSamplingStrategy),
    /// Per operation strategies.
    PerOperation(PerOperationSamplingStrategies),
}

impl TryFrom<SamplingStrategyResponse> for RemoteStrategy {
    type Error = RemoteSamplerError;

    /// Picks `operationSampling` when present, then `probabilisticSampling`,
    /// then `rateLimitingSampling`. Parameters are validated so that a bad
    /// response is rejected before anything is installed.
    fn try_from(response: SamplingStrategyResponse) -> RemoteSamplerResult<Self> {
        if let Some(strategies) = response.operation_sampling {
            check_probability(strategies.default_sampling_probability)?;
            check_rate(strategies.default_lower_bound_traces_per_second)?;
            for strategy in &strategies.per_operation_strategies {
                check_probability(strategy.probabilistic_sampling.sampling_rate)?;
            }
            return Ok(RemoteStrategy::PerOperation(strategies));
        }
        if let Some(probabilistic) = response.probabilistic_sampling {
            check_probability(probabilistic.sampling_rate)?;
            return Ok(RemoteStrategy::Probabilistic(probabilistic));
        }
        if let Some(rate_limiting) = response.rate_limiting_sampling {
            check_rate(rate_limiting.max_traces_per_second)?;
            return Ok(RemoteStrategy::RateLimiting(rate_limiting));
        }
        Err(RemoteSamplerError::UnsupportedStrategyType(
            response
                .strategy_type
                .map(|strategy_type| strategy_type.to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
        ))
    }
}

fn check_probability(probability: f64) -> RemoteSamplerResult<()> {
    if (0.0..=1.0).contains(&probability) {
        Ok(())
    } else {
        Err(RemoteSamplerError::InvalidStrategy(format!(
            "sampling rate {} is not within [0.0, 1.0]",
            probability
        )))
    }
}

fn check_rate(rate: f64) -> RemoteSamplerResult<()> {
    if rate.is_finite() && rate >= 0.0 {
        Ok(())
    } else {
        Err(RemoteSamplerError::InvalidStrategy(format!(
            "traces per second {} is not a non-negative number",
            rate
        )))
    }
}

/// Decode the body of a strategy service response.
pub fn decode(body: &[u8]) -> RemoteSamplerResult<SamplingStrategyResponse> {
    Ok(serde_json::from_slice(body)?)
}
