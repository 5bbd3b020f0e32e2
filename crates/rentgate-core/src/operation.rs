//! Per-operation context: logical tag, timeout budget, endpoint and credentials.

use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Logical label attached to every outbound call an operation triggers.
///
/// Doubles as the phase key for timeout overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OperationTag {
    Auth,
    Locations,
    Rates,
    Booking,
    BookingStatus,
    Cancel,
    Extras,
    Quote,
}

impl OperationTag {
    pub const ALL: [Self; 8] = [
        Self::Auth,
        Self::Locations,
        Self::Rates,
        Self::Booking,
        Self::BookingStatus,
        Self::Cancel,
        Self::Extras,
        Self::Quote,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "Auth",
            Self::Locations => "Locations",
            Self::Rates => "Rates",
            Self::Booking => "Booking",
            Self::BookingStatus => "BookingStatus",
            Self::Cancel => "Cancel",
            Self::Extras => "Extras",
            Self::Quote => "Quote",
        }
    }
}

impl Display for OperationTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationTag {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ValidationError::InvalidOperationTag {
                value: value.to_owned(),
            })
    }
}

/// Default call timeout plus optional per-phase overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub default: Duration,
    pub per_phase: HashMap<OperationTag, Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl TimeoutConfig {
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            per_phase: HashMap::new(),
        }
    }

    pub fn with_phase(mut self, phase: OperationTag, timeout: Duration) -> Self {
        self.per_phase.insert(phase, timeout);
        self
    }

    /// Phase override when present, otherwise the default.
    pub fn resolve(&self, phase: OperationTag) -> Duration {
        self.per_phase.get(&phase).copied().unwrap_or(self.default)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.default.is_zero() {
            return Err(ValidationError::ZeroTimeout);
        }
        if let Some((phase, _)) = self.per_phase.iter().find(|(_, timeout)| timeout.is_zero()) {
            return Err(ValidationError::ZeroPhaseTimeout {
                phase: phase.to_string(),
            });
        }
        Ok(())
    }
}

/// Base address of one supplier deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierEndpoint(String);

impl SupplierEndpoint {
    pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let trimmed = value.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyBaseUrl);
        }
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ValidationError::InvalidBaseUrl { value });
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Joins a path onto the base url; `path` is expected to start with `/`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.0, path)
    }
}

impl Display for SupplierEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credential material for one supplier tenant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialMaterial {
    #[default]
    None,
    ApiKey {
        header: String,
        value: String,
    },
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
}

impl CredentialMaterial {
    /// Whether operations must obtain a bearer token before the main call.
    pub const fn requires_token(&self) -> bool {
        matches!(self, Self::ClientCredentials { .. })
    }

    /// Stable material identifying the tenant; hashed before it is used as a cache key.
    pub fn fingerprint(&self) -> String {
        match self {
            Self::None => String::from("none"),
            Self::ApiKey { header, value } => {
                format!("api_key\u{0}{}\u{0}{value}", header.to_ascii_lowercase())
            }
            Self::ClientCredentials {
                client_id,
                client_secret,
            } => format!("client_credentials\u{0}{client_id}\u{0}{client_secret}"),
        }
    }
}

impl Debug for CredentialMaterial {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .field("value", &"<redacted>")
                .finish(),
            Self::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
        }
    }
}

/// Immutable context of one top-level operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    pub timeouts: TimeoutConfig,
    pub endpoint: SupplierEndpoint,
    pub credentials: CredentialMaterial,
    pub tag: OperationTag,
}

impl OperationContext {
    pub fn new(
        timeouts: TimeoutConfig,
        endpoint: SupplierEndpoint,
        credentials: CredentialMaterial,
        tag: OperationTag,
    ) -> Self {
        Self {
            timeouts,
            endpoint,
            credentials,
            tag,
        }
    }

    /// Context for a nested sub-operation, e.g. the authentication phase.
    pub fn derive(&self, tag: OperationTag) -> Self {
        Self {
            tag,
            ..self.clone()
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeouts.resolve(self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_phase_override_then_default() {
        let timeouts = TimeoutConfig::new(Duration::from_secs(10))
            .with_phase(OperationTag::Booking, Duration::from_secs(45));

        assert_eq!(timeouts.resolve(OperationTag::Booking), Duration::from_secs(45));
        assert_eq!(timeouts.resolve(OperationTag::Rates), Duration::from_secs(10));
    }

    #[test]
    fn derived_context_keeps_budget_but_switches_tag() {
        let ctx = OperationContext::new(
            TimeoutConfig::new(Duration::from_secs(10))
                .with_phase(OperationTag::Auth, Duration::from_secs(2)),
            SupplierEndpoint::parse("https://supplier.test/").expect("valid endpoint"),
            CredentialMaterial::None,
            OperationTag::Locations,
        );

        let auth = ctx.derive(OperationTag::Auth);
        assert_eq!(auth.tag, OperationTag::Auth);
        assert_eq!(auth.timeout(), Duration::from_secs(2));
        assert_eq!(ctx.timeout(), Duration::from_secs(10));
        assert_eq!(auth.endpoint.as_str(), "https://supplier.test");
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let material = CredentialMaterial::ClientCredentials {
            client_id: String::from("tenant-a"),
            client_secret: String::from("s3cret"),
        };

        let rendered = format!("{material:?}");
        assert!(rendered.contains("tenant-a"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn parses_tags_case_insensitively() {
        assert_eq!(
            "bookingstatus".parse::<OperationTag>().expect("valid tag"),
            OperationTag::BookingStatus
        );
        assert!("refund".parse::<OperationTag>().is_err());
    }

    #[test]
    fn rejects_endpoints_without_scheme() {
        assert!(matches!(
            SupplierEndpoint::parse("supplier.test"),
            Err(ValidationError::InvalidBaseUrl { .. })
        ));
        assert_eq!(SupplierEndpoint::parse("  "), Err(ValidationError::EmptyBaseUrl));
    }
}
