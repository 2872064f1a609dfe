use std::io;
use thiserror::Error;

/// A specialized `Result` type for remote sampler operations.
pub type RemoteSamplerResult<T> = Result<T, RemoteSamplerError>;

/// Errors returned by the remote sampler.
///
/// Only [`InvalidEndpoint`] and [`Resolve`] ever reach the creator of a
/// [`RemotelyControlledSampler`]. Every other variant describes the outcome
/// of a single poll cycle; those are counted through
/// [`SamplerMetrics`] and otherwise swallowed by the poll thread.
///
/// [`InvalidEndpoint`]: RemoteSamplerError::InvalidEndpoint
/// [`Resolve`]: RemoteSamplerError::Resolve
/// [`RemotelyControlledSampler`]: crate::RemotelyControlledSampler
/// [`SamplerMetrics`]: crate::SamplerMetrics
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RemoteSamplerError {
    /// The configured strategy service URL is not usable.
    #[error("invalid sampling endpoint: {0}")]
    InvalidEndpoint(String),

    /// None of the addresses the strategy service host resolves to accepted
    /// a connection.
    #[error("failed to resolve sampling server {endpoint}: {source}")]
    Resolve {
        /// Host and port that were resolved.
        endpoint: String,
        /// Last error seen while resolving or connecting.
        #[source]
        source: io::Error,
    },

    /// A [`StrategyFetcher`] failed to reach the strategy service.
    ///
    /// [`StrategyFetcher`]: crate::StrategyFetcher
    #[error("failed to fetch sampling strategy: {0}")]
    Fetch(#[from] io::Error),

    /// The HTTP exchange with the strategy service failed, including
    /// responses that are not valid HTTP.
    #[error("sampling strategy request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The strategy service answered with something that is not a sampling
    /// strategy.
    #[error("failed to decode sampling strategy: {0}")]
    Decode(String),

    /// The decoded response carries none of the known strategies.
    #[error("unsupported sampling strategy type: {0}")]
    UnsupportedStrategyType(String),

    /// The decoded response carries a strategy with out of range parameters.
    #[error("invalid sampling strategy: {0}")]
    InvalidStrategy(String),

    /// `close` was already called on this sampler.
    #[error("remote sampler already shut down")]
    AlreadyShutdown,

    /// The poll thread could not be started.
    #[error("failed to spawn sampling poll thread: {0}")]
    ThreadSpawn(#[source] io::Error),

    /// The poll thread panicked before it could be joined.
    #[error("sampling poll thread panicked")]
    ThreadPanicked,
}

impl RemoteSamplerError {
    /// Whether the error belongs to the fetch or decode stage of a poll cycle.
    pub fn is_query_failure(&self) -> bool {
        matches!(
            self,
            RemoteSamplerError::Fetch(_)
                | RemoteSamplerError::Http(_)
                | RemoteSamplerError::Decode(_)
        )
    }

    /// Whether the error belongs to the reconciliation stage of a poll cycle.
    pub fn is_update_failure(&self) -> bool {
        matches!(
            self,
            RemoteSamplerError::UnsupportedStrategyType(_)
                | RemoteSamplerError::InvalidStrategy(_)
        )
    }
}

impl From<serde_json::Error> for RemoteSamplerError {
    fn from(err: serde_json::Error) -> Self {
        RemoteSamplerError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_poll_cycle_errors() {
        let fetch = RemoteSamplerError::Fetch(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(fetch.is_query_failure());
        assert!(!fetch.is_update_failure());

        let decode: RemoteSamplerError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(decode.is_query_failure());

        let unsupported = RemoteSamplerError::UnsupportedStrategyType("UNKNOWN".into());
        assert!(unsupported.is_update_failure());
        assert!(!unsupported.is_query_failure());
        assert_eq!(
            unsupported.to_string(),
            "unsupported sampling strategy type: UNKNOWN"
        );

        assert!(!RemoteSamplerError::AlreadyShutdown.is_query_failure());
        assert!(!RemoteSamplerError::AlreadyShutdown.is_update_failure());
    }
}
