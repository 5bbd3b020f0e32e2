//! Request orchestration and resilience core for rentgate.
//!
//! rentgate exposes one canonical car-rental operation set (locations, rates,
//! booking, status, cancel) over heterogeneous supplier APIs. This crate holds
//! the layer every supplier adapter shares:
//!
//! | Module | Role |
//! |--------|------|
//! | [`classify`] | Collapses call outcomes into timeout / connection / supplier errors |
//! | [`credential_cache`] | Gzip-compressed cache-aside token storage |
//! | [`ledger`] | Lock-protected, mergeable call and error ledgers |
//! | [`pipeline`] | Time-bounded transport wrapped in logging and ledger interceptors |
//! | [`fan_out`] | Concurrent fan-out / fan-in with fault containment |
//! | [`orchestrator`] | Per-operation state machine and the [`Gateway`] operations |
//! | [`adapters`] | Supplier boundary and the reference JSON/REST adapter |
//! | [`config`] | `RENTGATE_*` environment and JSON file configuration |
//!
//! ```text
//! Gateway ──> Orchestrator ──> FanOut (0..n) ──> Pipeline ──> HttpClient
//!                 │                                 │
//!                 ├── CredentialCache               ├── LoggingInterceptor
//!                 └── OperationLedgers <────────────┴── LedgerInterceptor
//! ```

pub mod adapters;
pub mod classify;
pub mod config;
pub mod credential_cache;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod fan_out;
pub mod http_client;
pub mod ledger;
pub mod operation;
pub mod orchestrator;
pub mod pipeline;
pub mod telemetry;

pub use adapters::{IssuedToken, JsonRestSupplier, SupplierAdapter};
pub use classify::{classify, classify_domain};
pub use config::{CacheSettings, FanOutSettings, GatewayConfig, TimeoutSettings};
pub use credential_cache::{
    credential_cache_key, CacheBackend, CacheError, CachedCredential, CredentialCache,
    MemoryCacheBackend,
};
pub use domain::{
    BookingConfirmation, BookingRequest, BookingState, Cancellation, Location, LocationPage,
    RateRequest, UtcDateTime, VehicleCandidate, VehicleRate,
};
pub use envelope::Envelope;
pub use error::{ClassifiedError, CoreError, ErrorKind, ValidationError};
pub use fan_out::{FanOut, FanOutOptions, FanOutReport, Scheduling, UnitFailure, UnitSuccess};
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpMethod, HttpRequest, HttpResponse,
    ReqwestHttpClient, ScriptedHttpClient, ScriptedReply,
};
pub use ledger::{
    CallLedger, CallRecord, ErrorLedger, Ledger, OperationLedgers, RecordedRequest,
    RecordedResponse,
};
pub use operation::{
    CredentialMaterial, OperationContext, OperationTag, SupplierEndpoint, TimeoutConfig,
};
pub use orchestrator::{FailurePolicy, Gateway, OperationRun, Orchestrator};
pub use pipeline::{
    CallContext, Interceptor, LedgerInterceptor, LoggingInterceptor, Next, Pipeline,
};
