use crate::config::SamplerOptions;
use crate::error::{RemoteSamplerError, RemoteSamplerResult};
use crate::fetcher::{HttpStrategyFetcher, StrategyFetcher};
use crate::metrics::SamplerMetrics;
use crate::sampler::{Sampler, SamplingStatus, SamplingStrategy};
use opentelemetry::trace::{
    Link, SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState,
};
use opentelemetry::{otel_debug, otel_info, otel_warn, Context, KeyValue};
use opentelemetry_sdk::trace::ShouldSample;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Sampler whose strategy is polled from a Jaeger-compatible strategy service.
///
/// Until the first strategy arrives, decisions are made by the initial
/// strategy of the [`SamplerOptions`]. A dedicated thread then polls the
/// service every polling interval; a failed poll leaves the current strategy
/// in place.
///
/// The sampler is cheap to clone and can be installed on a tracer provider
/// directly:
///
/// ```no_run
/// use opentelemetry_jaeger_remote_sampler::{RemotelyControlledSampler, SamplerOptions};
/// use opentelemetry_sdk::trace::SdkTracerProvider;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let sampler = RemotelyControlledSampler::new("my-service", SamplerOptions::default())?;
/// let provider = SdkTracerProvider::builder()
///     .with_sampler(sampler.clone())
///     .build();
/// // ...
/// sampler.close()?;
/// # drop(provider);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RemotelyControlledSampler {
    inner: Arc<Inner>,
}

struct Inner {
    service_name: String,
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// State shared with the poll thread.
struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

struct State {
    strategy: SamplingStrategy,
    running: bool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // samplers never leave the state half updated, so a panic elsewhere
        // does not make it unusable
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn stop(&self) {
        self.lock().running = false;
        self.wake.notify_all();
    }
}

impl RemotelyControlledSampler {
    /// Create a sampler for `service_name` polling the strategy service at
    /// the endpoint of `options`.
    ///
    /// The endpoint is resolved right away; an endpoint that cannot be
    /// reached at all is an error.
    pub fn new<S: Into<String>>(
        service_name: S,
        options: SamplerOptions,
    ) -> RemoteSamplerResult<Self> {
        let fetcher = HttpStrategyFetcher::new(options.endpoint(), options.request_timeout())?;
        Self::with_fetcher(service_name, options, fetcher)
    }

    /// Create a sampler for `service_name` retrieving strategies through
    /// `fetcher`. The endpoint of `options` is ignored.
    pub fn with_fetcher<S, F>(
        service_name: S,
        options: SamplerOptions,
        fetcher: F,
    ) -> RemoteSamplerResult<Self>
    where
        S: Into<String>,
        F: StrategyFetcher + 'static,
    {
        let service_name = service_name.into();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                strategy: options.initial_strategy().clone(),
                running: true,
            }),
            wake: Condvar::new(),
        });

        let poller = Poller {
            service_name: service_name.clone(),
            fetcher,
            metrics: options.metrics(),
            max_operations: options.max_operations(),
            interval: options.polling_interval(),
            shared: shared.clone(),
        };
        let handle = thread::Builder::new()
            .name("OpenTelemetry.JaegerRemoteSampler".to_string())
            .spawn(move || poller.run())
            .map_err(RemoteSamplerError::ThreadSpawn)?;

        Ok(RemotelyControlledSampler {
            inner: Arc::new(Inner {
                service_name,
                shared,
                handle: Mutex::new(Some(handle)),
            }),
        })
    }

    /// The service whose strategy is polled.
    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    /// Decide whether the trace `trace_id` started by `operation` is sampled.
    ///
    /// Never performs I/O.
    pub fn is_sampled(&self, trace_id: TraceId, operation: &str) -> SamplingStatus {
        self.inner.shared.lock().strategy.is_sampled(trace_id, operation)
    }

    /// A copy of the strategy decisions are currently made with.
    pub fn current_strategy(&self) -> SamplingStrategy {
        self.inner.shared.lock().strategy.clone()
    }

    /// Stop polling and wait for the poll thread to exit.
    ///
    /// A wait between two polls is interrupted; a poll in flight is allowed to
    /// finish, which the request timeout bounds. Decisions keep using the last
    /// strategy afterwards. Only the first call does anything; later calls
    /// return [`RemoteSamplerError::AlreadyShutdown`].
    pub fn close(&self) -> RemoteSamplerResult<()> {
        let handle = self
            .inner
            .handle
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take()
            .ok_or(RemoteSamplerError::AlreadyShutdown)?;

        self.inner.shared.stop();
        handle.join().map_err(|_| RemoteSamplerError::ThreadPanicked)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let handle = self.handle.get_mut().unwrap_or_else(|err| err.into_inner());
        if handle.is_some() {
            otel_debug!(
                name: "JaegerRemoteSampler.DroppedWithoutClose",
                message = "Sampler dropped without close, signalling the poll thread to stop"
            );
            self.shared.stop();
        }
    }
}

impl fmt::Debug for RemotelyControlledSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemotelyControlledSampler")
            .field("service_name", &self.inner.service_name)
            .field("strategy", &self.inner.shared.lock().strategy.kind())
            .finish()
    }
}

impl ShouldSample for RemotelyControlledSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        _span_kind: &SpanKind,
        _attributes: &[KeyValue],
        _links: &[Link],
    ) -> SamplingResult {
        let status = self.is_sampled(trace_id, name);
        let (decision, attributes) = if status.sampled {
            (SamplingDecision::RecordAndSample, status.tags)
        } else {
            (SamplingDecision::Drop, Vec::new())
        };
        SamplingResult {
            decision,
            attributes,
            trace_state: match parent_context {
                Some(ctx) => ctx.span().span_context().trace_state().clone(),
                None => TraceState::default(),
            },
        }
    }
}

/// The poll thread.
struct Poller<F> {
    service_name: String,
    fetcher: F,
    metrics: Arc<dyn SamplerMetrics>,
    max_operations: usize,
    interval: Duration,
    shared: Arc<Shared>,
}

impl<F: StrategyFetcher> Poller<F> {
    fn run(self) {
        otel_info!(
            name: "JaegerRemoteSampler.PollThreadStarted",
            service_name = self.service_name.clone(),
            interval = self.interval.as_millis()
        );
        loop {
            self.update_sampler();

            let state = self.shared.lock();
            let (state, _) = self
                .shared
                .wake
                .wait_timeout_while(state, self.interval, |state| state.running)
                .unwrap_or_else(|err| err.into_inner());
            if !state.running {
                break;
            }
        }
        otel_info!(
            name: "JaegerRemoteSampler.PollThreadStopped",
            service_name = self.service_name.clone()
        );
    }

    /// One poll cycle. The fetch happens without holding the strategy lock.
    fn update_sampler(&self) {
        let response = match self.fetcher.fetch(&self.service_name) {
            Ok(response) => response,
            Err(err) => {
                self.metrics.sampler_query_failure(1);
                otel_warn!(
                    name: "JaegerRemoteSampler.QueryFailed",
                    service_name = self.service_name.clone(),
                    error = err.to_string()
                );
                return;
            }
        };
        self.metrics.sampler_retrieved(1);

        let mut state = self.shared.lock();
        match state.strategy.reconcile(response, self.max_operations) {
            Ok(()) => {
                self.metrics.sampler_updated(1);
                otel_debug!(
                    name: "JaegerRemoteSampler.StrategyInstalled",
                    service_name = self.service_name.clone(),
                    strategy = state.strategy.kind()
                );
            }
            Err(err) => {
                self.metrics.sampler_update_failure(1);
                otel_warn!(
                    name: "JaegerRemoteSampler.UpdateFailed",
                    service_name = self.service_name.clone(),
                    error = err.to_string()
                );
            }
        }
    }
}
