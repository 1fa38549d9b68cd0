//! In-process identity directory for local runs and tests.
//!
//! Codes are generated locally and logged instead of sent over SMS, so this
//! backend must never face real users.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use secrecy::ExposeSecret;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AuthError;
use crate::onboarding::model::{Credential, Identity};
use crate::onboarding::phone::mask_for_log;

use super::traits::AuthProvider;

struct Account {
    password: String,
    identity: Identity,
}

#[derive(Default)]
struct DirectoryInner {
    /// Outstanding challenge per E.164 number.
    pending_codes: HashMap<String, String>,
    by_phone: HashMap<String, Identity>,
    by_email: HashMap<String, Account>,
}

/// Identities and outstanding codes shared by every [`InMemoryAuth`] handle.
#[derive(Default)]
pub struct IdentityDirectory {
    inner: Mutex<DirectoryInner>,
}

impl IdentityDirectory {
    /// The code most recently dispatched to `phone_e164`, if still unused.
    pub async fn pending_code(&self, phone_e164: &str) -> Option<String> {
        self.inner.lock().await.pending_codes.get(phone_e164).cloned()
    }

    pub async fn identity_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.by_phone.len() + inner.by_email.len()
    }
}

/// One client's view of an [`IdentityDirectory`].
pub struct InMemoryAuth {
    directory: Arc<IdentityDirectory>,
    current: RwLock<Option<Identity>>,
}

impl InMemoryAuth {
    pub fn new(directory: Arc<IdentityDirectory>) -> Self {
        Self {
            directory,
            current: RwLock::new(None),
        }
    }

    async fn set_current(&self, identity: &Identity) {
        *self.current.write().await = Some(identity.clone());
    }
}

fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

#[async_trait]
impl AuthProvider for InMemoryAuth {
    async fn dispatch_code(&self, phone_e164: &str) -> Result<(), AuthError> {
        let digits = phone_e164.strip_prefix('+').unwrap_or_default();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(AuthError::DispatchFailed(format!(
                "Invalid phone number: {phone_e164}"
            )));
        }

        let code = generate_code();
        self.directory
            .inner
            .lock()
            .await
            .pending_codes
            .insert(phone_e164.to_string(), code.clone());
        warn!(
            phone = %mask_for_log(phone_e164),
            code = %code,
            "Verification code generated locally (no SMS carrier configured)"
        );
        Ok(())
    }

    async fn verify_code(&self, phone_e164: &str, code: &str) -> Result<Identity, AuthError> {
        let identity = {
            let mut inner = self.directory.inner.lock().await;
            match inner.pending_codes.get(phone_e164) {
                Some(expected) if expected == code => {}
                _ => return Err(AuthError::InvalidCode),
            }
            inner.pending_codes.remove(phone_e164);
            inner
                .by_phone
                .entry(phone_e164.to_string())
                .or_insert_with(|| Identity {
                    id: Uuid::new_v4().to_string(),
                    phone: Some(phone_e164.to_string()),
                    email: None,
                })
                .clone()
        };
        info!(identity_id = %identity.id, "Phone verified");
        self.set_current(&identity).await;
        Ok(identity)
    }

    async fn sign_in(&self, credential: &Credential) -> Result<Identity, AuthError> {
        let identity = {
            let inner = self.directory.inner.lock().await;
            match inner.by_email.get(&credential.email) {
                Some(account) if account.password == credential.password.expose_secret() => {
                    account.identity.clone()
                }
                _ => return Err(AuthError::InvalidCredentials),
            }
        };
        self.set_current(&identity).await;
        Ok(identity)
    }

    async fn sign_up(&self, credential: &Credential) -> Result<Identity, AuthError> {
        let identity = {
            let mut inner = self.directory.inner.lock().await;
            if inner.by_email.contains_key(&credential.email) {
                return Err(AuthError::UserAlreadyExists(credential.email.clone()));
            }
            let identity = Identity {
                id: Uuid::new_v4().to_string(),
                phone: None,
                email: Some(credential.email.clone()),
            };
            inner.by_email.insert(
                credential.email.clone(),
                Account {
                    password: credential.password.expose_secret().to_string(),
                    identity: identity.clone(),
                },
            );
            identity
        };
        self.set_current(&identity).await;
        Ok(identity)
    }

    async fn current_identity(&self) -> Option<Identity> {
        self.current.read().await.clone()
    }
}
