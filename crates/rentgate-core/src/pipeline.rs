//! Instrumented execution pipeline.
//!
//! A [`Pipeline`] wraps a transport in an ordered interceptor chain. The
//! default chain for an operation is
//!
//! ```text
//! LoggingInterceptor -> LedgerInterceptor -> deadline -> HttpClient
//! ```
//!
//! Each interceptor delegates to the next through [`Next::run`]. The deadline
//! stage enforces the operation's resolved phase timeout around the transport
//! call, so every attempt completes (or times out) inside the ledger stage and
//! produces exactly one [`CallRecord`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::classify::classify;
use crate::error::ClassifiedError;
use crate::http_client::{HttpClient, HttpError, HttpFuture, HttpRequest, HttpResponse};
use crate::ledger::{CallRecord, OperationLedgers, RecordedRequest, RecordedResponse};
use crate::operation::{OperationContext, OperationTag};
use crate::UtcDateTime;

const REDACTED: &str = "<redacted>";

/// Per-call context handed to every interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub operation: OperationTag,
    pub timeout: Duration,
}

impl CallContext {
    pub fn from_operation(ctx: &OperationContext) -> Self {
        Self {
            operation: ctx.tag,
            timeout: ctx.timeout(),
        }
    }
}

/// One link of the chain around the transport.
pub trait Interceptor: Send + Sync {
    fn intercept<'a>(
        &'a self,
        call: &'a CallContext,
        request: HttpRequest,
        next: Next<'a>,
    ) -> HttpFuture<'a>;
}

/// The remainder of the chain after the current interceptor.
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    transport: &'a dyn HttpClient,
    call: &'a CallContext,
}

impl<'a> Next<'a> {
    pub fn run(self, request: HttpRequest) -> HttpFuture<'a> {
        match self.interceptors.split_first() {
            Some((current, rest)) => current.intercept(
                self.call,
                request,
                Next {
                    interceptors: rest,
                    transport: self.transport,
                    call: self.call,
                },
            ),
            None => {
                let transport = self.transport;
                let timeout = self.call.timeout;
                Box::pin(async move {
                    match tokio::time::timeout(timeout, transport.execute(request)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(HttpError::timeout(format!(
                            "deadline exceeded after {} ms",
                            timeout.as_millis()
                        ))),
                    }
                })
            }
        }
    }
}

/// Emits one structured event per outbound call.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn intercept<'a>(
        &'a self,
        call: &'a CallContext,
        request: HttpRequest,
        next: Next<'a>,
    ) -> HttpFuture<'a> {
        Box::pin(async move {
            let method = request.method;
            let url = request.url.clone();
            let started_at = UtcDateTime::now();
            let started = Instant::now();
            tracing::debug!(
                operation = %call.operation,
                %method,
                %url,
                started_at = %started_at,
                "supplier call started"
            );

            let outcome = next.run(request).await;
            let duration_ms = elapsed_ms(started);
            match &outcome {
                Ok(response) if response.is_success() => tracing::debug!(
                    operation = %call.operation,
                    %method,
                    %url,
                    status = response.status,
                    duration_ms,
                    "supplier call completed"
                ),
                Ok(response) => tracing::warn!(
                    operation = %call.operation,
                    %method,
                    %url,
                    status = response.status,
                    duration_ms,
                    "supplier call returned non-success status"
                ),
                Err(error) => tracing::warn!(
                    operation = %call.operation,
                    %method,
                    %url,
                    error = %error,
                    duration_ms,
                    "supplier call failed"
                ),
            }
            outcome
        })
    }
}

/// Appends a [`CallRecord`] for every attempted call, success or failure.
#[derive(Debug, Clone)]
pub struct LedgerInterceptor {
    ledgers: Arc<OperationLedgers>,
}

impl LedgerInterceptor {
    pub fn new(ledgers: Arc<OperationLedgers>) -> Self {
        Self { ledgers }
    }
}

impl Interceptor for LedgerInterceptor {
    fn intercept<'a>(
        &'a self,
        call: &'a CallContext,
        request: HttpRequest,
        next: Next<'a>,
    ) -> HttpFuture<'a> {
        Box::pin(async move {
            let mut guard = RecordGuard {
                ledgers: &self.ledgers,
                request: Some(recorded_request(call.operation, &request)),
                operation: call.operation,
                started: Instant::now(),
            };

            let outcome = next.run(request).await;
            guard.complete(&outcome);
            outcome
        })
    }
}

/// Guarantees the record is written even if the call future is dropped or unwinds.
struct RecordGuard<'a> {
    ledgers: &'a OperationLedgers,
    request: Option<RecordedRequest>,
    operation: OperationTag,
    started: Instant,
}

impl RecordGuard<'_> {
    fn complete(&mut self, outcome: &Result<HttpResponse, HttpError>) {
        let Some(request) = self.request.take() else {
            return;
        };
        let (response, error) = match outcome {
            Ok(response) => (
                Some(RecordedResponse {
                    status_code: response.status,
                    headers: redact_headers(&response.headers),
                    body: response.body.clone(),
                }),
                None,
            ),
            Err(error) => (None, Some(error.message().to_owned())),
        };
        self.ledgers.calls.add(CallRecord {
            operation: self.operation,
            request,
            response,
            duration_ms: elapsed_ms(self.started),
            error,
        });
    }
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            self.ledgers.calls.add(CallRecord {
                operation: self.operation,
                request,
                response: None,
                duration_ms: elapsed_ms(self.started),
                error: Some(String::from("call abandoned before completion")),
            });
        }
    }
}

fn recorded_request(operation: OperationTag, request: &HttpRequest) -> RecordedRequest {
    // Token requests carry client secrets in the body.
    let body = if operation == OperationTag::Auth {
        request.body.as_ref().map(|_| String::from(REDACTED))
    } else {
        request.body.clone()
    };

    RecordedRequest {
        method: request.method,
        url: request.url.clone(),
        headers: redact_headers(&request.headers),
        body,
        started_at: UtcDateTime::now(),
    }
}

fn redact_headers(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            if is_sensitive_header(name) {
                (name.clone(), String::from(REDACTED))
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}

fn is_sensitive_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    matches!(name.as_str(), "authorization" | "cookie" | "set-cookie")
        || name.contains("key")
        || name.contains("secret")
        || name.contains("token")
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// A time-bounded transport wrapped in an interceptor chain.
#[derive(Clone)]
pub struct Pipeline {
    call: CallContext,
    transport: Arc<dyn HttpClient>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Pipeline {
    pub fn builder(transport: Arc<dyn HttpClient>, call: CallContext) -> PipelineBuilder {
        PipelineBuilder {
            call,
            transport,
            interceptors: Vec::new(),
        }
    }

    /// Standard chain for one operation: logging outermost, ledger recording innermost.
    pub fn for_operation(
        ctx: &OperationContext,
        transport: Arc<dyn HttpClient>,
        ledgers: Arc<OperationLedgers>,
    ) -> Self {
        Self::builder(transport, CallContext::from_operation(ctx))
            .with_interceptor(LoggingInterceptor)
            .with_interceptor(LedgerInterceptor::new(ledgers))
            .build()
    }

    pub fn call_context(&self) -> &CallContext {
        &self.call
    }

    /// Runs the request through the chain without classifying the outcome.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let request = request.with_timeout(self.call.timeout);
        Next {
            interceptors: &self.interceptors,
            transport: self.transport.as_ref(),
            call: &self.call,
        }
        .run(request)
        .await
    }

    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ClassifiedError> {
        classify(self.send(request).await)
    }

    /// Executes, classifies, then hands the body to `decode`.
    pub async fn execute_decoded<T, D>(
        &self,
        request: HttpRequest,
        decode: D,
    ) -> Result<T, ClassifiedError>
    where
        D: FnOnce(&str) -> Result<T, ClassifiedError>,
    {
        let response = self.execute(request).await?;
        decode(&response.body)
    }
}

pub struct PipelineBuilder {
    call: CallContext,
    transport: Arc<dyn HttpClient>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl PipelineBuilder {
    /// Appends an interceptor; earlier interceptors wrap later ones.
    pub fn with_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            call: self.call,
            transport: self.transport,
            interceptors: self.interceptors,
        }
    }
}
