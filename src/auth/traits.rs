//! Auth collaborator interface.

use async_trait::async_trait;

use crate::error::AuthError;
use crate::onboarding::model::{Credential, Identity};

/// Identity service the onboarding flow verifies against.
///
/// Implementations hold the "current" identity for one client: a successful
/// `verify_code`, `sign_in`, or `sign_up` replaces it.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Send a one-time code to an E.164 number.
    async fn dispatch_code(&self, phone_e164: &str) -> Result<(), AuthError>;

    /// Check a code against the challenge last dispatched to `phone_e164`.
    async fn verify_code(&self, phone_e164: &str, code: &str) -> Result<Identity, AuthError>;

    /// Password sign-in. Unknown accounts report `InvalidCredentials`.
    async fn sign_in(&self, credential: &Credential) -> Result<Identity, AuthError>;

    /// Create an account and sign into it.
    async fn sign_up(&self, credential: &Credential) -> Result<Identity, AuthError>;

    /// The identity this client is signed in as, if any.
    async fn current_identity(&self) -> Option<Identity>;
}
