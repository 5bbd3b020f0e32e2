//! Operation orchestration.
//!
//! Every canonical operation runs the same state machine:
//!
//! ```text
//! Init -> Authenticate -> Execute -> Classify & Map -> Aggregate -> Done
//!              |                                                    ^
//!              +------------- no token obtained --------------------+
//! ```
//!
//! [`Orchestrator`] provides the steps; [`Gateway`] strings them together for
//! locations, rates, booking, status and cancel over one [`SupplierAdapter`].
//! Authentication is the only phase whose failure aborts an operation. Every
//! other failure is recorded in the error ledger and the operation carries on.

use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;
use uuid::Uuid;

use crate::adapters::{BuildResult, SupplierAdapter};
use crate::config::{FanOutSettings, GatewayConfig};
use crate::credential_cache::{credential_cache_key, CachedCredential, CredentialCache};
use crate::domain::{
    BookingConfirmation, BookingRequest, Cancellation, Location, RateRequest, VehicleCandidate,
    VehicleRate,
};
use crate::envelope::Envelope;
use crate::error::{ClassifiedError, CoreError};
use crate::fan_out::{FanOut, FanOutOptions};
use crate::http_client::{HttpAuth, HttpClient};
use crate::ledger::OperationLedgers;
use crate::operation::{
    CredentialMaterial, OperationContext, OperationTag, SupplierEndpoint, TimeoutConfig,
};
use crate::pipeline::Pipeline;

/// What happens to an operation's payload once any error has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailurePolicy {
    pub discard_all_on_error: bool,
}

impl FailurePolicy {
    /// Keep whatever succeeded.
    pub const KEEP_PARTIAL: Self = Self {
        discard_all_on_error: false,
    };
    /// All or nothing, for data that must be internally consistent.
    pub const DISCARD_ALL_ON_ERROR: Self = Self {
        discard_all_on_error: true,
    };
}

/// State of one in-flight operation, created by [`Orchestrator::begin`].
pub struct OperationRun {
    id: Uuid,
    ctx: OperationContext,
    ledgers: Arc<OperationLedgers>,
    auth: HttpAuth,
    span: tracing::Span,
    started: Instant,
}

impl OperationRun {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn context(&self) -> &OperationContext {
        &self.ctx
    }

    pub fn ledgers(&self) -> &OperationLedgers {
        &self.ledgers
    }

    pub fn auth(&self) -> &HttpAuth {
        &self.auth
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    transport: Arc<dyn HttpClient>,
    cache: CredentialCache,
    fan_out: FanOut,
}

impl Orchestrator {
    pub fn new(transport: Arc<dyn HttpClient>) -> Self {
        Self {
            transport,
            cache: CredentialCache::default(),
            fan_out: FanOut::default(),
        }
    }

    pub fn with_cache(mut self, cache: CredentialCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_fan_out(mut self, options: FanOutOptions) -> Self {
        self.fan_out = FanOut::new(options);
        self
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    /// Init: fresh ledgers and the static part of the request authorization.
    pub fn begin(&self, ctx: OperationContext) -> OperationRun {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("operation", operation_id = %id, operation = %ctx.tag);
        let auth = match &ctx.credentials {
            CredentialMaterial::ApiKey { header, value } => HttpAuth::Header {
                name: header.clone(),
                value: value.clone(),
            },
            CredentialMaterial::None | CredentialMaterial::ClientCredentials { .. } => {
                HttpAuth::None
            }
        };
        span.in_scope(|| tracing::debug!(endpoint = %ctx.endpoint, "operation started"));

        OperationRun {
            id,
            ctx,
            ledgers: Arc::new(OperationLedgers::new()),
            auth,
            span,
            started: Instant::now(),
        }
    }

    /// Obtains a bearer token through the credential cache, authenticating on a miss.
    ///
    /// The token call runs as a nested `Auth` sub-operation with its own
    /// ledgers, which are merged into `run` whether or not it succeeds.
    pub async fn authenticate<A>(&self, run: &mut OperationRun, adapter: &A) -> Result<(), ClassifiedError>
    where
        A: SupplierAdapter + ?Sized,
    {
        if !run.ctx.credentials.requires_token() {
            return Ok(());
        }

        let key = credential_cache_key(&run.ctx.endpoint, &run.ctx.credentials);
        let auth_ctx = run.ctx.derive(OperationTag::Auth);
        let parent = Arc::clone(&run.ledgers);
        let transport = Arc::clone(&self.transport);
        let credential_key = key.clone();

        let loaded = self
            .cache
            .fetch_or_load::<CachedCredential, ClassifiedError, _, _>(&key, move || async move {
                let child = Arc::new(OperationLedgers::new());
                let pipeline = Pipeline::for_operation(&auth_ctx, transport, Arc::clone(&child));
                let outcome = match adapter.token_request(&auth_ctx.endpoint, &auth_ctx.credentials) {
                    Ok(request) => {
                        pipeline
                            .execute_decoded(request, |body| adapter.decode_token(body))
                            .await
                    }
                    Err(error) => Err(error),
                };
                if let Err(error) = &outcome {
                    child.record_error(error.clone());
                }
                parent.merge(&child);

                outcome.map(|issued| {
                    let ttl = issued.expires_in;
                    let credential = CachedCredential {
                        token: issued.token,
                        key: credential_key,
                        ttl,
                    };
                    (credential, ttl)
                })
            })
            .await;

        match loaded {
            Ok(credential) => {
                run.auth = HttpAuth::BearerToken(credential.token);
                Ok(())
            }
            Err(error) => {
                tracing::warn!(%error, "authentication failed; aborting operation");
                Err(error)
            }
        }
    }

    fn pipeline(&self, run: &OperationRun, tag: OperationTag) -> Pipeline {
        Pipeline::for_operation(
            &run.ctx.derive(tag),
            Arc::clone(&self.transport),
            Arc::clone(&run.ledgers),
        )
    }

    /// Executes one call; a failure is recorded and yields `None`.
    pub async fn call<T, D>(
        &self,
        run: &OperationRun,
        tag: OperationTag,
        request: BuildResult,
        decode: D,
    ) -> Option<T>
    where
        D: FnOnce(&str) -> Result<T, ClassifiedError>,
    {
        let outcome = match request {
            Ok(request) => {
                self.pipeline(run, tag)
                    .execute_decoded(request.with_auth(&run.auth), decode)
                    .await
            }
            Err(error) => Err(error),
        };

        match outcome {
            Ok(value) => Some(value),
            Err(error) => {
                run.ledgers.record_error(error);
                None
            }
        }
    }

    /// Executes one call per unit concurrently; failures are recorded, successes returned in unit order.
    pub async fn fan_out<U, T, B, D>(
        &self,
        run: &OperationRun,
        tag: OperationTag,
        units: Vec<U>,
        build: B,
        decode: D,
    ) -> Vec<T>
    where
        U: Send + 'static,
        T: Send + 'static,
        B: Fn(&U) -> BuildResult + Send + Sync + 'static,
        D: Fn(&str) -> Result<T, ClassifiedError> + Send + Sync + 'static,
    {
        let pipeline = self.pipeline(run, tag);
        let auth = run.auth.clone();
        let decode = Arc::new(decode);

        let report = self
            .fan_out
            .run(units, move |unit| {
                let request = build(&unit).map(|request| request.with_auth(&auth));
                let pipeline = pipeline.clone();
                let decode = Arc::clone(&decode);
                async move {
                    match request {
                        Ok(request) => {
                            pipeline
                                .execute_decoded(request, |body| (*decode)(body))
                                .await
                        }
                        Err(error) => Err(error),
                    }
                }
            })
            .await;

        let (values, errors) = report.into_parts();
        run.ledgers.errors.add_all(errors);
        values
    }

    /// Done: applies the failure policy and snapshots both ledgers.
    pub fn finish<T: Default>(&self, run: OperationRun, payload: T, policy: FailurePolicy) -> Envelope<T> {
        let errors = run.ledgers.errors.snapshot();
        let supplier_requests = run.ledgers.calls.snapshot();
        let discarded = policy.discard_all_on_error && !errors.is_empty();
        let payload = if discarded { T::default() } else { payload };

        run.span.in_scope(|| {
            tracing::info!(
                calls = supplier_requests.len(),
                errors = errors.len(),
                discarded,
                duration_ms = run.started.elapsed().as_millis() as u64,
                "operation finished"
            )
        });

        Envelope::new(payload, supplier_requests, errors)
    }
}

/// Canonical operations over one supplier deployment.
pub struct Gateway<A> {
    orchestrator: Orchestrator,
    adapter: Arc<A>,
    endpoint: SupplierEndpoint,
    credentials: CredentialMaterial,
    timeouts: TimeoutConfig,
    max_pages: u32,
}

impl<A: SupplierAdapter> Gateway<A> {
    pub fn new(
        adapter: A,
        orchestrator: Orchestrator,
        endpoint: SupplierEndpoint,
        credentials: CredentialMaterial,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            orchestrator,
            adapter: Arc::new(adapter),
            endpoint,
            credentials,
            timeouts,
            max_pages: FanOutSettings::default().max_pages,
        }
    }

    pub fn from_config(
        config: &GatewayConfig,
        adapter: A,
        transport: Arc<dyn HttpClient>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let orchestrator = Orchestrator::new(transport)
            .with_cache(CredentialCache::default().with_single_flight(config.cache.single_flight))
            .with_fan_out(config.fan_out_options());

        Ok(Self::new(
            adapter,
            orchestrator,
            config.endpoint()?,
            config.auth.clone(),
            config.timeout_config(),
        )
        .with_max_pages(config.fan_out.max_pages))
    }

    /// Upper bound on the page count a supplier may report for one catalogue.
    pub fn with_max_pages(mut self, pages: u32) -> Self {
        self.max_pages = pages;
        self
    }

    /// Shares a credential cache, e.g. between gateways for different operations of one tenant.
    pub fn with_cache(mut self, cache: CredentialCache) -> Self {
        self.orchestrator = self.orchestrator.with_cache(cache);
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    fn context(&self, tag: OperationTag) -> OperationContext {
        OperationContext::new(
            self.timeouts.clone(),
            self.endpoint.clone(),
            self.credentials.clone(),
            tag,
        )
    }

    /// Full location catalogue: page 1, then the remaining pages in parallel.
    ///
    /// All or nothing: any failed page empties the payload. A reported page
    /// count above the configured limit is a supplier error and no further
    /// pages are requested.
    pub async fn locations(&self) -> Envelope<Vec<Location>> {
        let orchestrator = &self.orchestrator;
        let policy = FailurePolicy::DISCARD_ALL_ON_ERROR;
        let mut run = orchestrator.begin(self.context(OperationTag::Locations));
        let span = run.span().clone();

        async move {
            if orchestrator.authenticate(&mut run, self.adapter.as_ref()).await.is_err() {
                return orchestrator.finish(run, Vec::new(), policy);
            }

            let first = orchestrator
                .call(
                    &run,
                    OperationTag::Locations,
                    self.adapter.locations_page(&self.endpoint, 1),
                    |body| self.adapter.decode_locations_page(body),
                )
                .await;
            let Some(first) = first else {
                return orchestrator.finish(run, Vec::new(), policy);
            };

            if first.total_pages > self.max_pages {
                tracing::warn!(
                    total_pages = first.total_pages,
                    max_pages = self.max_pages,
                    "supplier page count exceeds limit; skipping remaining pages"
                );
                run.ledgers.record_error(ClassifiedError::supplier(format!(
                    "supplier reported {} pages, limit is {}",
                    first.total_pages, self.max_pages
                )));
                return orchestrator.finish(run, Vec::new(), policy);
            }

            let mut locations = first.locations;
            if first.total_pages > 1 {
                let builder = Arc::clone(&self.adapter);
                let decoder = Arc::clone(&self.adapter);
                let endpoint = self.endpoint.clone();
                let pages = orchestrator
                    .fan_out(
                        &run,
                        OperationTag::Locations,
                        (2..=first.total_pages).collect(),
                        move |page: &u32| builder.locations_page(&endpoint, *page),
                        move |body| decoder.decode_locations_page(body),
                    )
                    .await;
                locations.extend(pages.into_iter().flat_map(|page| page.locations));
            }

            orchestrator.finish(run, locations, policy)
        }
        .instrument(span)
        .await
    }

    /// Availability, then one quote per vehicle class in parallel.
    ///
    /// Keeps every quote that succeeded.
    pub async fn rates(&self, request: RateRequest) -> Envelope<Vec<VehicleRate>> {
        let orchestrator = &self.orchestrator;
        let policy = FailurePolicy::KEEP_PARTIAL;
        let mut run = orchestrator.begin(self.context(OperationTag::Rates));
        let span = run.span().clone();

        async move {
            if orchestrator.authenticate(&mut run, self.adapter.as_ref()).await.is_err() {
                return orchestrator.finish(run, Vec::new(), policy);
            }

            let candidates: Vec<VehicleCandidate> = orchestrator
                .call(
                    &run,
                    OperationTag::Rates,
                    self.adapter.availability(&self.endpoint, &request),
                    |body| self.adapter.decode_availability(body),
                )
                .await
                .unwrap_or_default();
            if candidates.is_empty() {
                return orchestrator.finish(run, Vec::new(), policy);
            }

            let builder = Arc::clone(&self.adapter);
            let decoder = Arc::clone(&self.adapter);
            let endpoint = self.endpoint.clone();
            let rates = orchestrator
                .fan_out(
                    &run,
                    OperationTag::Quote,
                    candidates,
                    move |candidate: &VehicleCandidate| {
                        builder.quote(&endpoint, &request, candidate)
                    },
                    move |body| decoder.decode_quote(body),
                )
                .await;

            orchestrator.finish(run, rates, policy)
        }
        .instrument(span)
        .await
    }

    pub async fn book(&self, request: BookingRequest) -> Envelope<Option<BookingConfirmation>> {
        let build = self.adapter.booking(&self.endpoint, &request);
        self.single_call(OperationTag::Booking, build, |adapter, body| {
            adapter.decode_booking(body)
        })
        .await
    }

    pub async fn booking_status(&self, reference: &str) -> Envelope<Option<BookingConfirmation>> {
        let build = self.adapter.booking_status(&self.endpoint, reference);
        self.single_call(OperationTag::BookingStatus, build, |adapter, body| {
            adapter.decode_booking_status(body)
        })
        .await
    }

    pub async fn cancel(&self, reference: &str) -> Envelope<Option<Cancellation>> {
        let build = self.adapter.cancel(&self.endpoint, reference);
        self.single_call(OperationTag::Cancel, build, |adapter, body| {
            adapter.decode_cancel(body)
        })
        .await
    }

    async fn single_call<T, D>(
        &self,
        tag: OperationTag,
        request: BuildResult,
        decode: D,
    ) -> Envelope<Option<T>>
    where
        D: FnOnce(&A, &str) -> Result<T, ClassifiedError>,
    {
        let orchestrator = &self.orchestrator;
        let policy = FailurePolicy::KEEP_PARTIAL;
        let mut run = orchestrator.begin(self.context(tag));
        let span = run.span().clone();

        async move {
            if orchestrator.authenticate(&mut run, self.adapter.as_ref()).await.is_err() {
                return orchestrator.finish(run, None, policy);
            }

            let adapter = self.adapter.as_ref();
            let payload = orchestrator
                .call(&run, tag, request, |body| decode(adapter, body))
                .await;
            orchestrator.finish(run, payload, policy)
        }
        .instrument(span)
        .await
    }
}
