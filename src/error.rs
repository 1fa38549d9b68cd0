//! Error types for NotesHub onboarding.

use crate::onboarding::state::Step;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors reported by the identity/auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Failed to dispatch verification code: {0}")]
    DispatchFailed(String),

    #[error("Invalid or expired verification code")]
    InvalidCode,

    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("User already registered: {0}")]
    UserAlreadyExists(String),

    #[error("Auth request failed: {0}")]
    Request(String),

    #[error("Invalid response from auth service: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by the onboarding flow to its host.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OnboardingError {
    #[error("Phone number must have 10 digits formatted as (AAA) BBB-CCCC")]
    InvalidPhone,

    #[error("Incomplete profile: {0}")]
    ProfileValidation(String),

    #[error("Failed to send verification code: {0}")]
    DispatchFailed(String),

    #[error("Invalid or expired verification code: {0}")]
    VerifyFailed(String),

    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Auth service unavailable: {0}")]
    AuthUnavailable(String),

    #[error("Too many failed verification attempts ({max}); request a new code")]
    TooManyAttempts { max: u32 },

    #[error("Failed to provision demo identity: {0}")]
    DemoProvisioningFailed(String),

    #[error("Failed to check for an existing profile: {0}")]
    ProfileFetchFailed(String),

    #[error("Failed to create profile: {0}")]
    ProfileInsertFailed(String),

    #[error("Cannot handle {event} while in step {step}")]
    InvalidTransition { step: Step, event: String },

    #[error("A request for this session is already in flight")]
    RequestInFlight,

    #[error("Unexpected onboarding state: {0}")]
    Invariant(String),
}

impl OnboardingError {
    /// Rejected locally, before any remote call.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidPhone | Self::ProfileValidation(_))
    }

    /// The flow cannot continue and should be abandoned.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
