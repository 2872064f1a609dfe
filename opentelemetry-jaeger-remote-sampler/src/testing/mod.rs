//! In-process strategy service for tests.
//!
//! [`MockSamplingServer`] answers `GET <path>?service=<name>` the way the
//! Jaeger agent does: a registered service gets its strategy, any other
//! service gets probabilistic sampling at 0.001.
use crate::remote::SamplingStrategyResponse;
use http::StatusCode;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const DEFAULT_SAMPLING_RATE: f64 = 0.001;
const MAX_REQUEST_SIZE: usize = 16 * 1024;

#[derive(Debug, Default)]
struct ServerState {
    strategies: HashMap<String, SamplingStrategyResponse>,
    requests: Vec<String>,
    response_override: Option<(StatusCode, String)>,
}

/// A strategy service bound to an ephemeral port on `127.0.0.1`.
///
/// Connections are served one at a time on a dedicated thread, which is
/// stopped and joined when the server is dropped.
#[derive(Debug)]
pub struct MockSamplingServer {
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MockSamplingServer {
    /// Bind and start serving.
    pub fn start() -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(ServerState::default()));
        let running = Arc::new(AtomicBool::new(true));

        let handle = thread::Builder::new()
            .name("MockSamplingServer".to_string())
            .spawn({
                let state = state.clone();
                let running = running.clone();
                move || {
                    for stream in listener.incoming() {
                        if !running.load(Ordering::Acquire) {
                            break;
                        }
                        if let Ok(stream) = stream {
                            // a client going away mid-request is not the server's problem
                            let _ = serve(stream, &state);
                        }
                    }
                }
            })?;

        Ok(MockSamplingServer {
            addr,
            state,
            running,
            handle: Some(handle),
        })
    }

    /// Address the server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Endpoint URL to configure a sampler with.
    pub fn endpoint(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Serve `response` to requests for `service_name`.
    pub fn add_sampling_strategy(&self, service_name: &str, response: SamplingStrategyResponse) {
        self.lock()
            .strategies
            .insert(service_name.to_string(), response);
    }

    /// Answer every request with `status` and `body`, whatever it asks for.
    pub fn respond_with(&self, status: StatusCode, body: impl Into<String>) {
        self.lock().response_override = Some((status, body.into()));
    }

    /// Go back to serving registered strategies.
    pub fn reset_response(&self) {
        self.lock().response_override = None;
    }

    /// Request targets received so far, oldest first.
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }
}

impl Drop for MockSamplingServer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        // unblock the accept loop
        let _ = TcpStream::connect(self.addr);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve(mut stream: TcpStream, state: &Mutex<ServerState>) -> io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(1)))?;

    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        let n = stream.read(&mut buf)?;
        if n == 0 || request.len() > MAX_REQUEST_SIZE {
            // reachability checks close without sending anything
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    let request = String::from_utf8_lossy(&request);
    let target = request
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_string();

    let (status, body) = {
        let mut state = state.lock().unwrap_or_else(|err| err.into_inner());
        state.requests.push(target.clone());
        match &state.response_override {
            Some(response) => response.clone(),
            None => respond(&target, &state.strategies),
        }
    };

    let response = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{}",
        status.as_u16(),
        status.canonical_reason().unwrap_or_default(),
        body.len(),
        body
    );
    stream.write_all(response.as_bytes())?;
    stream.flush()
}

fn respond(
    target: &str,
    strategies: &HashMap<String, SamplingStrategyResponse>,
) -> (StatusCode, String) {
    let query = target.split_once('?').map(|(_, query)| query).unwrap_or_default();
    let services: Vec<String> = url::form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| key == "service")
        .map(|(_, value)| value.into_owned())
        .collect();

    let service = match services.as_slice() {
        [] => return (StatusCode::BAD_REQUEST, "no 'service' parameter".to_string()),
        [service] => service,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                "'service' parameter must occur only once".to_string(),
            )
        }
    };

    let default_strategy = SamplingStrategyResponse::probabilistic(DEFAULT_SAMPLING_RATE);
    let strategy = strategies.get(service).unwrap_or(&default_strategy);
    match serde_json::to_string(strategy) {
        Ok(body) => (StatusCode::OK, body),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}
