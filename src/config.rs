//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::onboarding::phone::{CODE_LEN, is_complete_phone};

/// Reserved demo identity used to exercise onboarding without an SMS carrier.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Whether the demo sentinel is honoured at all.
    pub enabled: bool,
    /// Sentinel phone number, in display format.
    pub phone: String,
    /// Fixed one-time code accepted for the sentinel phone.
    pub code: String,
    /// Shared demo account credential.
    pub email: String,
    pub password: SecretString,
    /// Number stored on the demo profile (distinct from the display sentinel).
    pub canonical_phone: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            phone: "(123) 456-7890".to_string(),
            code: "123456".to_string(),
            email: "demo@noteshub.app".to_string(),
            password: SecretString::from("demo123456"),
            canonical_phone: "+11234567890".to_string(),
        }
    }
}

impl DemoConfig {
    /// Build from `NOTESHUB_DEMO_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let enabled = match std::env::var("NOTESHUB_DEMO_ENABLED") {
            Ok(v) => parse_bool("NOTESHUB_DEMO_ENABLED", &v)?,
            Err(_) => defaults.enabled,
        };

        let config = Self {
            enabled,
            phone: std::env::var("NOTESHUB_DEMO_PHONE").unwrap_or(defaults.phone),
            code: std::env::var("NOTESHUB_DEMO_CODE").unwrap_or(defaults.code),
            email: std::env::var("NOTESHUB_DEMO_EMAIL").unwrap_or(defaults.email),
            password: std::env::var("NOTESHUB_DEMO_PASSWORD")
                .map(SecretString::from)
                .unwrap_or(defaults.password),
            canonical_phone: std::env::var("NOTESHUB_DEMO_CANONICAL_PHONE")
                .unwrap_or(defaults.canonical_phone),
        };
        config.validate()?;
        Ok(config)
    }

    /// The sentinel must be enterable: a masked 10-digit phone and a 6-digit code.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if !is_complete_phone(&self.phone) {
            return Err(ConfigError::InvalidValue {
                key: "NOTESHUB_DEMO_PHONE".into(),
                message: format!("expected (AAA) BBB-CCCC, got {:?}", self.phone),
            });
        }
        if self.code.len() != CODE_LEN || !self.code.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidValue {
                key: "NOTESHUB_DEMO_CODE".into(),
                message: format!("expected {CODE_LEN} digits, got {:?}", self.code),
            });
        }
        Ok(())
    }
}

/// Rules the onboarding flow runs under.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    /// Country calling code prepended when normalising to E.164 (digits only).
    pub country_code: String,
    /// Rejected codes allowed before the session must request a new one.
    pub max_verify_attempts: u32,
    pub demo: DemoConfig,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            country_code: "1".to_string(),
            max_verify_attempts: 5,
            demo: DemoConfig::default(),
        }
    }
}

impl OnboardingConfig {
    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let country_code =
            std::env::var("NOTESHUB_COUNTRY_CODE").unwrap_or(defaults.country_code);
        if country_code.is_empty() || !country_code.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidValue {
                key: "NOTESHUB_COUNTRY_CODE".into(),
                message: format!("expected digits, got {country_code:?}"),
            });
        }

        let max_verify_attempts = match std::env::var("NOTESHUB_MAX_VERIFY_ATTEMPTS") {
            Ok(v) => match v.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "NOTESHUB_MAX_VERIFY_ATTEMPTS".into(),
                        message: format!("expected a positive integer, got {v:?}"),
                    });
                }
            },
            Err(_) => defaults.max_verify_attempts,
        };

        Ok(Self {
            country_code,
            max_verify_attempts,
            demo: DemoConfig::from_env()?,
        })
    }
}

/// Hosted auth service endpoint.
#[derive(Debug, Clone)]
pub struct AuthServiceConfig {
    /// Base URL, e.g. `https://project.supabase.co`.
    pub url: String,
    /// Public anon key sent as the `apikey` header.
    pub anon_key: SecretString,
}

impl AuthServiceConfig {
    /// Returns `None` if `NOTESHUB_AUTH_URL` is not set (in-memory directory is used).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(url) = std::env::var("NOTESHUB_AUTH_URL") else {
            return Ok(None);
        };
        let anon_key = std::env::var("NOTESHUB_AUTH_ANON_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("NOTESHUB_AUTH_ANON_KEY".into()))?;
        Ok(Some(Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key: SecretString::from(anon_key),
        }))
    }
}

/// HTTP host configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Sessions idle this long are dropped.
    pub session_ttl: Duration,
    pub auth: Option<AuthServiceConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/noteshub.db"),
            session_ttl: Duration::from_secs(30 * 60),
            auth: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let port = match std::env::var("NOTESHUB_PORT") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "NOTESHUB_PORT".into(),
                message: format!("expected a port number, got {v:?}"),
            })?,
            Err(_) => defaults.port,
        };
        let session_ttl = match std::env::var("NOTESHUB_SESSION_TTL_SECS") {
            Ok(v) => match v.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "NOTESHUB_SESSION_TTL_SECS".into(),
                        message: format!("expected a positive number of seconds, got {v:?}"),
                    });
                }
            },
            Err(_) => defaults.session_ttl,
        };

        Ok(Self {
            port,
            session_ttl,
            db_path: std::env::var("NOTESHUB_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            auth: AuthServiceConfig::from_env()?,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}
