//! Request/response shapes shared by every provider transport, plus a
//! scripted transport used by adapter and engine tests.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use listwise_util::redact_sensitive;
use thiserror::Error;

use crate::ProviderTransport;

/// One outbound GET request.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub api_key_header: String,
    api_key: String,
}

impl ProviderRequest {
    pub fn get(path: impl Into<String>, api_key_header: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
            api_key_header: api_key_header.into(),
            api_key: api_key.into(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for ProviderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRequest")
            .field("path", &self.path)
            .field("query", &self.query)
            .field("api_key_header", &self.api_key_header)
            .finish_non_exhaustive()
    }
}

/// Status and body of a completed request. Non-2xx statuses are not errors
/// at this layer; adapters decide what a failed status means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub status: u16,
    pub body: String,
}

impl ProviderResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failures that prevented a response from arriving at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    pub(crate) fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            return TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            };
        }
        if error.is_builder() {
            return TransportError::InvalidRequest(redact_sensitive(&error.to_string()));
        }
        TransportError::Network(redact_sensitive(&error.to_string()))
    }
}

/// A request as observed by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub api_key_header: String,
}

impl RecordedRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
enum ScriptedReply {
    Response(ProviderResponse),
    Error(TransportError),
    Delayed(Duration, ProviderResponse),
}

#[derive(Debug, Clone)]
struct Route {
    path: String,
    required_param: Option<String>,
    reply: ScriptedReply,
}

impl Route {
    fn matches(&self, request: &ProviderRequest) -> bool {
        self.path == request.path
            && self
                .required_param
                .as_deref()
                .is_none_or(|name| request.param(name).is_some())
    }
}

/// In-memory transport primarily used for testing.
///
/// Replies are matched by path, optionally narrowed to requests carrying a
/// given query parameter. The first matching route wins; unmatched requests
/// receive a 404. Every request is recorded for later assertions, along with
/// the highest number of requests that were in flight at once.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<RecordedRequest>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Decrements the in-flight count even when the caller drops the request.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_route(&self, path: &str, required_param: Option<&str>, reply: ScriptedReply) {
        self.routes.lock().expect("routes lock poisoned").push(Route {
            path: path.to_string(),
            required_param: required_param.map(str::to_string),
            reply,
        });
    }

    /// Reply to every request for `path` with `status` and `body`.
    pub fn respond(&self, path: &str, status: u16, body: impl Into<String>) {
        let response = ProviderResponse {
            status,
            body: body.into(),
        };
        self.push_route(path, None, ScriptedReply::Response(response));
    }

    /// Reply only when the request carries query parameter `param`.
    pub fn respond_with_param(&self, path: &str, param: &str, status: u16, body: impl Into<String>) {
        let response = ProviderResponse {
            status,
            body: body.into(),
        };
        self.push_route(path, Some(param), ScriptedReply::Response(response));
    }

    /// Fail every request for `path` before a response arrives.
    pub fn fail(&self, path: &str, error: TransportError) {
        self.push_route(path, None, ScriptedReply::Error(error));
    }

    /// Reply after sleeping for `delay`, to exercise caller-side timeouts.
    pub fn respond_after(&self, path: &str, delay: Duration, status: u16, body: impl Into<String>) {
        let response = ProviderResponse {
            status,
            body: body.into(),
        };
        self.push_route(path, None, ScriptedReply::Delayed(delay, response));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock poisoned").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock poisoned").len()
    }

    /// Most requests observed inside `get` at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderTransport for ScriptedTransport {
    async fn get(&self, request: &ProviderRequest) -> Result<ProviderResponse, TransportError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        self.requests.lock().expect("requests lock poisoned").push(RecordedRequest {
            path: request.path.clone(),
            query: request.query.clone(),
            api_key_header: request.api_key_header.clone(),
        });

        let reply = self
            .routes
            .lock()
            .expect("routes lock poisoned")
            .iter()
            .find(|route| route.matches(request))
            .map(|route| route.reply.clone());

        match reply {
            Some(ScriptedReply::Response(response)) => Ok(response),
            Some(ScriptedReply::Error(error)) => Err(error),
            Some(ScriptedReply::Delayed(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            None => Ok(ProviderResponse {
                status: 404,
                body: format!("no route for {}", request.path),
            }),
        }
    }
}
