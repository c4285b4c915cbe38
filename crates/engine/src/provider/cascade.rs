//! Endpoint fallback cascade.
//!
//! Providers expose the same data behind several endpoint shapes with
//! different parameter rules. A cascade holds those shapes as an ordered list
//! of [`EndpointVariant`] strategies and tries them in turn: the first variant
//! whose response parses wins, and every failure (non-2xx status, transport
//! error, timeout, malformed payload, or a variant that does not apply to the
//! input) moves on to the next one. Only when the list is exhausted does the
//! caller see [`ProviderError::Unavailable`], carrying the last failure.

use std::fmt;
use std::time::{Duration, Instant};

use listwise_api::{ProviderRequest, ProviderTransport, TransportError};
use listwise_util::{parse_response_json_strict, redact_sensitive, status_error_message, truncate_response_preview};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::ProviderError;

/// Maps an operation input onto one endpoint's query parameters.
///
/// Returning `None` means the variant cannot serve this input (for example a
/// postal-code endpoint for a target without a zip); no request is issued.
pub trait EndpointVariant<I: ?Sized>: Send + Sync {
    fn name(&self) -> &str;
    fn path(&self) -> &str;
    fn query(&self, input: &I) -> Option<Vec<(String, String)>>;
}

/// An [`EndpointVariant`] backed by a plain parameter-mapping function.
pub struct QueryVariant<I: ?Sized> {
    name: &'static str,
    path: &'static str,
    params: fn(&I) -> Option<Vec<(String, String)>>,
}

impl<I: ?Sized> QueryVariant<I> {
    pub const fn new(name: &'static str, path: &'static str, params: fn(&I) -> Option<Vec<(String, String)>>) -> Self {
        Self { name, path, params }
    }
}

impl<I: ?Sized> EndpointVariant<I> for QueryVariant<I> {
    fn name(&self) -> &str {
        self.name
    }

    fn path(&self) -> &str {
        self.path
    }

    fn query(&self, input: &I) -> Option<Vec<(String, String)>> {
        (self.params)(input)
    }
}

/// Why a single variant attempt did not produce a result.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VariantFailure {
    #[error("not applicable: {0}")]
    NotApplicable(String),

    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("status {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Outcome of one variant within a cascade run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum AttemptOutcome {
    Succeeded,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantAttempt {
    pub variant: String,
    pub outcome: AttemptOutcome,
    pub duration_ms: u64,
}

/// Per-invocation record of which variants ran and how each ended.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub provider: String,
    pub operation: String,
    pub attempts: Vec<VariantAttempt>,
}

impl CascadeReport {
    /// Name of the variant that produced the result, if any.
    pub fn winner(&self) -> Option<&str> {
        self.attempts
            .iter()
            .find(|attempt| attempt.outcome == AttemptOutcome::Succeeded)
            .map(|attempt| attempt.variant.as_str())
    }

    fn record(&mut self, variant: &str, outcome: AttemptOutcome, started: Instant) {
        self.attempts.push(VariantAttempt {
            variant: variant.to_string(),
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }
}

/// Successful cascade output: the parsed value, the winning variant and the
/// diagnostics report.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub value: T,
    pub variant: String,
    pub report: CascadeReport,
}

/// Everything a cascade run needs from its adapter.
pub struct CascadeContext<'a> {
    pub provider: &'a str,
    pub transport: &'a dyn ProviderTransport,
    pub api_key_header: &'a str,
    pub api_key: &'a str,
    pub timeout: Duration,
    pub limiter: &'a Semaphore,
}

impl fmt::Debug for CascadeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CascadeContext")
            .field("provider", &self.provider)
            .field("api_key_header", &self.api_key_header)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Ordered endpoint variants for one provider operation.
pub struct EndpointCascade<I: ?Sized> {
    operation: &'static str,
    variants: Vec<Box<dyn EndpointVariant<I>>>,
}

impl<I: ?Sized> EndpointCascade<I> {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            variants: Vec::new(),
        }
    }

    pub fn with_variant(mut self, variant: impl EndpointVariant<I> + 'static) -> Self {
        self.variants.push(Box::new(variant));
        self
    }

    pub fn variant_names(&self) -> Vec<&str> {
        self.variants.iter().map(|variant| variant.name()).collect()
    }

    /// Try each variant in order and return the first parsed result.
    pub async fn execute<T, P>(&self, ctx: &CascadeContext<'_>, input: &I, parse: P) -> Result<Fetched<T>, ProviderError>
    where
        P: Fn(&Value) -> Result<T, String>,
    {
        let mut report = CascadeReport {
            provider: ctx.provider.to_string(),
            operation: self.operation.to_string(),
            attempts: Vec::with_capacity(self.variants.len()),
        };
        let mut last_error: Option<String> = None;

        for variant in &self.variants {
            let started = Instant::now();
            let Some(query) = variant.query(input) else {
                let failure = VariantFailure::NotApplicable("input lacks the parameters this endpoint needs".into());
                debug!(provider = %ctx.provider, variant = %variant.name(), "endpoint variant skipped");
                report.record(variant.name(), AttemptOutcome::Skipped(failure.to_string()), started);
                last_error = Some(format!("{}: {failure}", variant.name()));
                continue;
            };

            let mut request = ProviderRequest::get(variant.path(), ctx.api_key_header, ctx.api_key);
            for (name, value) in query {
                request = request.with_param(name, value);
            }

            debug!(provider = %ctx.provider, variant = %variant.name(), path = %variant.path(), "endpoint variant attempt");
            match attempt(ctx, &request)
                .await
                .and_then(|payload| parse(&payload).map_err(VariantFailure::Malformed))
            {
                Ok(value) => {
                    report.record(variant.name(), AttemptOutcome::Succeeded, started);
                    info!(
                        provider = %ctx.provider,
                        operation = %self.operation,
                        variant = %variant.name(),
                        attempts = report.attempts.len(),
                        duration_ms = started.elapsed().as_millis(),
                        "endpoint cascade succeeded"
                    );
                    return Ok(Fetched {
                        value,
                        variant: variant.name().to_string(),
                        report,
                    });
                }
                Err(failure) => {
                    let message = redact_sensitive(&failure.to_string());
                    warn!(provider = %ctx.provider, variant = %variant.name(), error = %message, "endpoint variant failed");
                    report.record(variant.name(), AttemptOutcome::Failed(message.clone()), started);
                    last_error = Some(format!("{}: {message}", variant.name()));
                }
            }
        }

        debug!(provider = %ctx.provider, operation = %self.operation, report = ?report, "endpoint cascade exhausted");
        Err(ProviderError::Unavailable {
            provider: ctx.provider.to_string(),
            operation: self.operation.to_string(),
            attempts: report.attempts.len(),
            last_error: last_error.unwrap_or_else(|| "no endpoint variants configured".into()),
        })
    }
}

/// Issue one request under the adapter's in-flight limit and time bound.
async fn attempt(ctx: &CascadeContext<'_>, request: &ProviderRequest) -> Result<Value, VariantFailure> {
    let _permit = ctx
        .limiter
        .acquire()
        .await
        .map_err(|_| TransportError::InvalidRequest("provider request limiter closed".into()))?;

    let response = tokio::time::timeout(ctx.timeout, ctx.transport.get(request))
        .await
        .map_err(|_| VariantFailure::Timeout {
            timeout_ms: ctx.timeout.as_millis() as u64,
        })??;

    if !response.is_success() {
        let detail = status_error_message(response.status).unwrap_or_else(|| truncate_response_preview(&response.body, 120));
        return Err(VariantFailure::Status {
            status: response.status,
            detail,
        });
    }

    parse_response_json_strict(&response.body, Some(response.status)).map_err(|error| VariantFailure::Malformed(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use listwise_api::ScriptedTransport;
    use serde_json::json;

    fn by_zip(zip: &Option<String>) -> Option<Vec<(String, String)>> {
        zip.as_ref().map(|zip| vec![("postalcode".to_string(), zip.clone())])
    }

    fn always(_: &Option<String>) -> Option<Vec<(String, String)>> {
        Some(vec![("city".to_string(), "Canton".to_string())])
    }

    fn cascade() -> EndpointCascade<Option<String>> {
        EndpointCascade::new("market statistics")
            .with_variant(QueryVariant::new("postal_code", "/zip", by_zip))
            .with_variant(QueryVariant::new("city_state", "/city", always))
            .with_variant(QueryVariant::new("legacy", "/legacy", always))
    }

    fn context<'a>(transport: &'a ScriptedTransport, limiter: &'a Semaphore, timeout: Duration) -> CascadeContext<'a> {
        CascadeContext {
            provider: "test_provider",
            transport,
            api_key_header: "apikey",
            api_key: "k",
            timeout,
            limiter,
        }
    }

    fn read_value(payload: &Value) -> Result<u64, String> {
        payload
            .get("value")
            .and_then(Value::as_u64)
            .ok_or_else(|| "missing value".to_string())
    }

    #[tokio::test]
    async fn first_successful_variant_wins_and_later_ones_are_not_called() {
        let transport = ScriptedTransport::new();
        transport.respond("/zip", 200, json!({"value": 1}).to_string());
        transport.respond("/city", 200, json!({"value": 2}).to_string());
        let limiter = Semaphore::new(1);

        let fetched = cascade()
            .execute(&context(&transport, &limiter, Duration::from_secs(1)), &Some("30115".into()), read_value)
            .await
            .unwrap();

        assert_eq!(fetched.value, 1);
        assert_eq!(fetched.variant, "postal_code");
        assert_eq!(transport.request_count(), 1);
        assert_eq!(fetched.report.winner(), Some("postal_code"));
    }

    #[tokio::test]
    async fn inapplicable_variant_is_skipped_without_a_request() {
        let transport = ScriptedTransport::new();
        transport.respond("/city", 200, json!({"value": 2}).to_string());
        let limiter = Semaphore::new(1);

        let fetched = cascade()
            .execute(&context(&transport, &limiter, Duration::from_secs(1)), &None, read_value)
            .await
            .unwrap();

        assert_eq!(fetched.variant, "city_state");
        assert_eq!(transport.request_count(), 1);
        assert!(matches!(fetched.report.attempts[0].outcome, AttemptOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn status_malformed_and_transport_failures_all_fall_through() {
        let transport = ScriptedTransport::new();
        transport.respond("/zip", 500, "internal error");
        transport.respond("/city", 200, "{not json");
        transport.fail("/legacy", TransportError::Network("connection reset".into()));
        let limiter = Semaphore::new(1);

        let error = cascade()
            .execute(&context(&transport, &limiter, Duration::from_secs(1)), &Some("30115".into()), read_value)
            .await
            .unwrap_err();

        match error {
            ProviderError::Unavailable {
                attempts, last_error, ..
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.starts_with("legacy:"), "{last_error}");
                assert!(last_error.contains("connection reset"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn payload_that_fails_parsing_is_a_variant_failure() {
        let transport = ScriptedTransport::new();
        transport.respond("/zip", 200, json!({"other": true}).to_string());
        transport.respond("/city", 200, json!({"value": 7}).to_string());
        let limiter = Semaphore::new(1);

        let fetched = cascade()
            .execute(&context(&transport, &limiter, Duration::from_secs(1)), &Some("30115".into()), read_value)
            .await
            .unwrap();

        assert_eq!(fetched.value, 7);
        assert_eq!(
            fetched.report.attempts[0].outcome,
            AttemptOutcome::Failed("malformed payload: missing value".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_variant_times_out_and_cascade_continues() {
        let transport = ScriptedTransport::new();
        transport.respond_after("/zip", Duration::from_secs(30), 200, json!({"value": 1}).to_string());
        transport.respond("/city", 200, json!({"value": 2}).to_string());
        let limiter = Semaphore::new(1);

        let fetched = cascade()
            .execute(&context(&transport, &limiter, Duration::from_secs(2)), &Some("30115".into()), read_value)
            .await
            .unwrap();

        assert_eq!(fetched.value, 2);
        assert_eq!(
            fetched.report.attempts[0].outcome,
            AttemptOutcome::Failed("timed out after 2000ms".into())
        );
    }

    #[tokio::test]
    async fn empty_cascade_reports_unavailable() {
        let transport = ScriptedTransport::new();
        let limiter = Semaphore::new(1);
        let empty: EndpointCascade<Option<String>> = EndpointCascade::new("nothing");
        let error = empty
            .execute(&context(&transport, &limiter, Duration::from_secs(1)), &None, read_value)
            .await
            .unwrap_err();
        assert!(error.to_string().contains("no endpoint variants configured"));
    }
}
