//! # OpenTelemetry Jaeger Remote Sampler
//!
//! A sampler whose sampling strategy is controlled by a Jaeger agent or
//! collector. The [`RemotelyControlledSampler`] polls the strategy service
//! for the strategy of its service on a dedicated thread and decides with
//! whatever strategy it last received:
//!
//! * probabilistic: a fixed fraction of traces, derived from the trace id,
//! * rate limiting: at most a fixed number of traces per second,
//! * per operation: a probability per operation name with a guaranteed lower
//!   bound of traces per second for each operation.
//!
//! Decisions never wait on the network. When the strategy service cannot be
//! reached or sends something unusable, the previous strategy stays in place
//! and the outcome is reported through [`SamplerMetrics`].
//!
//! ```no_run
//! use opentelemetry_jaeger_remote_sampler::{
//!     MeterSamplerMetrics, RemotelyControlledSampler, SamplerOptions, SamplingStrategy,
//! };
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let meter = opentelemetry::global::meter("jaeger-remote-sampler");
//! let options = SamplerOptions::default()
//!     .with_endpoint("http://localhost:5778/sampling")
//!     .with_polling_interval(Duration::from_secs(30))
//!     .with_initial_strategy(SamplingStrategy::probabilistic(0.01))
//!     .with_metrics(MeterSamplerMetrics::new(&meter));
//! let sampler = RemotelyControlledSampler::new("checkout", options)?;
//!
//! let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
//!     .with_sampler(sampler.clone())
//!     .build();
//! // ...
//! sampler.close()?;
//! # drop(provider);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! [`SamplerOptions::default`] honours `OTEL_TRACES_SAMPLER_ARG` with the
//! keys `endpoint`, `pollingIntervalMs` and `initialSamplingRate`.
//!
//! ## Crate Feature Flags
//!
//! * `internal-logs` (default): diagnostics through `tracing`.
//! * `testing`: [`testing::MockSamplingServer`], a strategy service to test
//!   against.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

mod config;
mod controller;
mod error;
mod fetcher;
mod metrics;
pub mod remote;
pub mod sampler;
#[cfg(feature = "testing")]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;

pub use config::SamplerOptions;
pub use controller::RemotelyControlledSampler;
pub use error::{RemoteSamplerError, RemoteSamplerResult};
pub use fetcher::{HttpStrategyFetcher, StrategyFetcher};
pub use metrics::{MeterSamplerMetrics, NoopSamplerMetrics, SamplerMetrics};
pub use sampler::{Sampler, SamplingStatus, SamplingStrategy};
