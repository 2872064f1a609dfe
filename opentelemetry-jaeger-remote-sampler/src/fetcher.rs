//! Retrieval of sampling strategies from the strategy service.
use crate::error::{RemoteSamplerError, RemoteSamplerResult};
use crate::remote::{decode, SamplingStrategyResponse};
use http::header::CONNECTION;
use opentelemetry::otel_debug;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt::Debug;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use url::Url;

/// Everything but the unreserved characters of RFC 3986 is escaped.
const SERVICE_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Fetches the sampling strategy of a service.
///
/// Only the poll thread of a [`RemotelyControlledSampler`] calls `fetch`,
/// so implementations are free to block.
///
/// [`RemotelyControlledSampler`]: crate::RemotelyControlledSampler
pub trait StrategyFetcher: Debug + Send + Sync {
    /// Retrieve and decode the strategy of `service_name`.
    fn fetch(&self, service_name: &str) -> RemoteSamplerResult<SamplingStrategyResponse>;
}

/// [`StrategyFetcher`] querying a Jaeger agent or collector over HTTP with a
/// blocking [`reqwest`] client.
///
/// The server address is resolved once, when the fetcher is created, and
/// pinned in the client. Idle connections are not pooled, so each fetch
/// opens a fresh connection.
#[derive(Clone, Debug)]
pub struct HttpStrategyFetcher {
    client: reqwest::blocking::Client,
    server_addr: SocketAddr,
    url: Url,
}

impl HttpStrategyFetcher {
    /// Create a fetcher for the strategy service at `endpoint`.
    ///
    /// The host of `endpoint` is resolved and each address is tried with a
    /// connection in turn; the first one that accepts is used for every
    /// fetch. Fails with [`RemoteSamplerError::InvalidEndpoint`] if the URL is
    /// not a usable `http` URL and with [`RemoteSamplerError::Resolve`] if no
    /// address accepts a connection.
    pub fn new(endpoint: &str, timeout: Duration) -> RemoteSamplerResult<Self> {
        let invalid =
            |reason: String| RemoteSamplerError::InvalidEndpoint(format!("{endpoint}: {reason}"));
        let mut url = Url::parse(endpoint).map_err(|err| invalid(err.to_string()))?;
        if url.scheme() != "http" {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host".to_string()))?
            .to_string();
        url.set_fragment(None);

        let server_addr = resolve(&url, &host, timeout)?;
        otel_debug!(
            name: "JaegerRemoteSampler.Fetcher.Resolved",
            endpoint = endpoint.to_string(),
            address = server_addr.to_string()
        );

        let client = reqwest::blocking::Client::builder()
            .resolve(&host, server_addr)
            .no_proxy()
            .pool_max_idle_per_host(0)
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(HttpStrategyFetcher {
            client,
            server_addr,
            url,
        })
    }

    /// The address every fetch connects to.
    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    fn request_url(&self, service_name: &str) -> Url {
        let service = utf8_percent_encode(service_name, SERVICE_NAME);
        let query = match self.url.query().filter(|query| !query.is_empty()) {
            Some(query) => format!("{query}&service={service}"),
            None => format!("service={service}"),
        };
        let mut url = self.url.clone();
        url.set_query(Some(&query));
        url
    }
}

fn resolve(url: &Url, host: &str, timeout: Duration) -> RemoteSamplerResult<SocketAddr> {
    let resolve_error = |source| RemoteSamplerError::Resolve {
        endpoint: match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        },
        source,
    };
    let candidates = url.socket_addrs(|| None).map_err(resolve_error)?;

    let mut last_error = io::Error::new(io::ErrorKind::NotFound, "host resolved to no address");
    for candidate in candidates {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(_) => return Ok(candidate),
            Err(err) => {
                otel_debug!(
                    name: "JaegerRemoteSampler.Fetcher.AddressUnreachable",
                    address = candidate.to_string(),
                    error = err.to_string()
                );
                last_error = err;
            }
        }
    }
    Err(resolve_error(last_error))
}

impl StrategyFetcher for HttpStrategyFetcher {
    fn fetch(&self, service_name: &str) -> RemoteSamplerResult<SamplingStrategyResponse> {
        otel_debug!(
            name: "JaegerRemoteSampler.Fetcher.Send",
            service = service_name.to_string()
        );
        let response = self
            .client
            .get(self.request_url(service_name))
            .header(CONNECTION, "close")
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RemoteSamplerError::Decode(format!(
                "strategy service responded {}: {}",
                status,
                body.trim()
            )));
        }
        decode(&response.bytes()?)
    }
}
