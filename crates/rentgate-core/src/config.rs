//! Gateway configuration loaded from `RENTGATE_*` environment variables or a JSON file.

use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::fan_out::{FanOutOptions, Scheduling};
use crate::operation::{CredentialMaterial, OperationTag, SupplierEndpoint, TimeoutConfig};
use crate::ValidationError;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_API_KEY_HEADER: &str = "x-api-key";
const DEFAULT_MAX_PAGES: u32 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub default_ms: u64,
    pub per_phase: BTreeMap<OperationTag, u64>,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            default_ms: DEFAULT_TIMEOUT_MS,
            per_phase: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub single_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanOutSettings {
    /// `None` spawns one task per unit.
    pub max_workers: Option<usize>,
    pub fail_fast: bool,
    /// Largest page count a supplier may report before pagination is refused.
    pub max_pages: u32,
}

impl Default for FanOutSettings {
    fn default() -> Self {
        Self {
            max_workers: None,
            fail_fast: false,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

/// Everything needed to talk to one supplier deployment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub auth: CredentialMaterial,
    pub timeouts: TimeoutSettings,
    pub cache: CacheSettings,
    pub fan_out: FanOutSettings,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_auth(mut self, auth: CredentialMaterial) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.default_ms = duration_ms(timeout);
        self
    }

    pub fn with_phase_timeout(mut self, phase: OperationTag, timeout: Duration) -> Self {
        self.timeouts.per_phase.insert(phase, duration_ms(timeout));
        self
    }

    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.cache.single_flight = enabled;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.fan_out.max_workers = Some(workers);
        self
    }

    pub fn with_fail_fast(mut self, enabled: bool) -> Self {
        self.fan_out.fail_fast = enabled;
        self
    }

    pub fn with_max_pages(mut self, pages: u32) -> Self {
        self.fan_out.max_pages = pages;
        self
    }

    /// Reads and validates configuration from the process environment.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`GatewayConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::new(var("RENTGATE_SUPPLIER_URL").unwrap_or_default());

        config.auth = match (var("RENTGATE_CLIENT_ID"), var("RENTGATE_API_KEY")) {
            (Some(client_id), _) => CredentialMaterial::ClientCredentials {
                client_id,
                client_secret: var("RENTGATE_CLIENT_SECRET").ok_or(CoreError::InvalidEnv {
                    name: "RENTGATE_CLIENT_SECRET",
                    reason: String::from("required when RENTGATE_CLIENT_ID is set"),
                })?,
            },
            (None, Some(value)) => CredentialMaterial::ApiKey {
                header: var("RENTGATE_API_KEY_HEADER")
                    .unwrap_or_else(|| String::from(DEFAULT_API_KEY_HEADER)),
                value,
            },
            (None, None) => CredentialMaterial::None,
        };

        if let Some(value) = var("RENTGATE_TIMEOUT_MS") {
            config.timeouts.default_ms = parse_env("RENTGATE_TIMEOUT_MS", &value)?;
        }
        for (name, phase) in [
            ("RENTGATE_AUTH_TIMEOUT_MS", OperationTag::Auth),
            ("RENTGATE_BOOKING_TIMEOUT_MS", OperationTag::Booking),
        ] {
            if let Some(value) = var(name) {
                config
                    .timeouts
                    .per_phase
                    .insert(phase, parse_env(name, &value)?);
            }
        }

        if let Some(value) = var("RENTGATE_MAX_WORKERS") {
            config.fan_out.max_workers = Some(parse_env("RENTGATE_MAX_WORKERS", &value)?);
        }
        if let Some(value) = var("RENTGATE_MAX_PAGES") {
            config.fan_out.max_pages = parse_env("RENTGATE_MAX_PAGES", &value)?;
        }
        if let Some(value) = var("RENTGATE_FAIL_FAST") {
            config.fan_out.fail_fast = parse_flag("RENTGATE_FAIL_FAST", &value)?;
        }
        if let Some(value) = var("RENTGATE_SINGLE_FLIGHT") {
            config.cache.single_flight = parse_flag("RENTGATE_SINGLE_FLIGHT", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.endpoint()?;
        self.timeout_config().validate()?;
        if self.fan_out.max_workers == Some(0) {
            return Err(ValidationError::ZeroWorkers);
        }
        if self.fan_out.max_pages == 0 {
            return Err(ValidationError::ZeroPageLimit);
        }

        match &self.auth {
            CredentialMaterial::None => {}
            CredentialMaterial::ApiKey { header, value } => {
                require("auth.header", header)?;
                require("auth.value", value)?;
            }
            CredentialMaterial::ClientCredentials {
                client_id,
                client_secret,
            } => {
                require("auth.client_id", client_id)?;
                require("auth.client_secret", client_secret)?;
            }
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Result<SupplierEndpoint, ValidationError> {
        SupplierEndpoint::parse(self.base_url.as_str())
    }

    pub fn timeout_config(&self) -> TimeoutConfig {
        self.timeouts.per_phase.iter().fold(
            TimeoutConfig::new(Duration::from_millis(self.timeouts.default_ms)),
            |config, (phase, ms)| config.with_phase(*phase, Duration::from_millis(*ms)),
        )
    }

    pub fn fan_out_options(&self) -> FanOutOptions {
        FanOutOptions {
            scheduling: self
                .fan_out
                .max_workers
                .map_or(Scheduling::Unbounded, Scheduling::Bounded),
            fail_fast: self.fan_out.fail_fast,
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(())
}

fn parse_env<T>(name: &'static str, value: &str) -> Result<T, CoreError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|error: T::Err| CoreError::InvalidEnv {
            name,
            reason: error.to_string(),
        })
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, CoreError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CoreError::InvalidEnv {
            name,
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_the_url_is_set() {
        let config = GatewayConfig::from_lookup(lookup(&[(
            "RENTGATE_SUPPLIER_URL",
            "https://supplier.test/",
        )]))
        .expect("valid config");

        assert_eq!(config.auth, CredentialMaterial::None);
        assert_eq!(config.timeout_config().default, Duration::from_secs(30));
        assert_eq!(config.fan_out_options(), FanOutOptions::default());
        assert!(!config.cache.single_flight);
        assert_eq!(
            config.endpoint().expect("endpoint").as_str(),
            "https://supplier.test"
        );
    }

    #[test]
    fn reads_credentials_timeouts_and_fan_out_settings() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("RENTGATE_SUPPLIER_URL", "https://supplier.test"),
            ("RENTGATE_CLIENT_ID", "tenant-a"),
            ("RENTGATE_CLIENT_SECRET", "s3cret"),
            ("RENTGATE_TIMEOUT_MS", "5000"),
            ("RENTGATE_BOOKING_TIMEOUT_MS", "45000"),
            ("RENTGATE_MAX_WORKERS", "4"),
            ("RENTGATE_FAIL_FAST", "yes"),
            ("RENTGATE_SINGLE_FLIGHT", "true"),
        ]))
        .expect("valid config");

        let timeouts = config.timeout_config();
        assert!(config.auth.requires_token());
        assert_eq!(timeouts.resolve(OperationTag::Booking), Duration::from_secs(45));
        assert_eq!(timeouts.resolve(OperationTag::Rates), Duration::from_secs(5));
        assert_eq!(
            config.fan_out_options(),
            FanOutOptions::bounded(4).with_fail_fast(true)
        );
        assert!(config.cache.single_flight);
    }

    #[test]
    fn api_key_header_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("RENTGATE_SUPPLIER_URL", "https://supplier.test"),
            ("RENTGATE_API_KEY", "k-123"),
        ]))
        .expect("valid config");

        assert_eq!(
            config.auth,
            CredentialMaterial::ApiKey {
                header: String::from("x-api-key"),
                value: String::from("k-123"),
            }
        );
    }

    #[test]
    fn client_id_without_secret_is_rejected() {
        let error = GatewayConfig::from_lookup(lookup(&[
            ("RENTGATE_SUPPLIER_URL", "https://supplier.test"),
            ("RENTGATE_CLIENT_ID", "tenant-a"),
        ]))
        .expect_err("missing secret");

        assert!(matches!(
            error,
            CoreError::InvalidEnv {
                name: "RENTGATE_CLIENT_SECRET",
                ..
            }
        ));
    }

    #[test]
    fn malformed_numbers_and_flags_are_rejected() {
        let bad_timeout = GatewayConfig::from_lookup(lookup(&[
            ("RENTGATE_SUPPLIER_URL", "https://supplier.test"),
            ("RENTGATE_TIMEOUT_MS", "soon"),
        ]));
        let bad_flag = GatewayConfig::from_lookup(lookup(&[
            ("RENTGATE_SUPPLIER_URL", "https://supplier.test"),
            ("RENTGATE_FAIL_FAST", "maybe"),
        ]));

        assert!(matches!(bad_timeout, Err(CoreError::InvalidEnv { .. })));
        assert!(matches!(bad_flag, Err(CoreError::InvalidEnv { .. })));
    }

    #[test]
    fn validation_rejects_empty_url_zero_timeout_and_zero_limits() {
        assert_eq!(
            GatewayConfig::default().validate(),
            Err(ValidationError::EmptyBaseUrl)
        );
        assert_eq!(
            GatewayConfig::new("https://supplier.test")
                .with_default_timeout(Duration::ZERO)
                .validate(),
            Err(ValidationError::ZeroTimeout)
        );
        assert_eq!(
            GatewayConfig::new("https://supplier.test")
                .with_max_workers(0)
                .validate(),
            Err(ValidationError::ZeroWorkers)
        );
        assert_eq!(
            GatewayConfig::new("https://supplier.test")
                .with_max_pages(0)
                .validate(),
            Err(ValidationError::ZeroPageLimit)
        );
    }

    #[test]
    fn page_limit_defaults_and_reads_from_env() {
        let defaulted = GatewayConfig::from_lookup(lookup(&[(
            "RENTGATE_SUPPLIER_URL",
            "https://supplier.test",
        )]))
        .expect("valid config");
        let overridden = GatewayConfig::from_lookup(lookup(&[
            ("RENTGATE_SUPPLIER_URL", "https://supplier.test"),
            ("RENTGATE_MAX_PAGES", "25"),
        ]))
        .expect("valid config");

        assert_eq!(defaulted.fan_out.max_pages, 1_000);
        assert_eq!(overridden.fan_out.max_pages, 25);
    }

    #[test]
    fn loads_json_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{
                "base_url": "https://supplier.test",
                "auth": {{"type": "api_key", "header": "X-Key", "value": "abc"}},
                "timeouts": {{"default_ms": 2000, "per_phase": {{"Auth": 500}}}},
                "fan_out": {{"max_workers": 8}}
            }}"#
        )
        .expect("write config");

        let config = GatewayConfig::from_json_file(file.path()).expect("valid config");

        assert_eq!(
            config.timeout_config().resolve(OperationTag::Auth),
            Duration::from_millis(500)
        );
        assert_eq!(config.fan_out_options().scheduling, Scheduling::Bounded(8));
        assert!(!config.fan_out.fail_fast);
    }

    #[test]
    fn missing_json_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let error = GatewayConfig::from_json_file(dir.path().join("missing.json"))
            .expect_err("missing file");

        assert!(matches!(error, CoreError::Io(_)));
    }
}
