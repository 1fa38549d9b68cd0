//! HTTP client for a hosted GoTrue-compatible auth service.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::AuthServiceConfig;
use crate::error::AuthError;
use crate::onboarding::model::{Credential, Identity};
use crate::onboarding::phone::mask_for_log;

use super::traits::AuthProvider;

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl From<UserPayload> for Identity {
    fn from(user: UserPayload) -> Self {
        Identity {
            id: user.id,
            // GoTrue reports an empty string rather than null for unset contacts.
            phone: user.phone.filter(|p| !p.is_empty()),
            email: user.email.filter(|e| !e.is_empty()),
        }
    }
}

/// Session response; sign-up without auto-confirm returns the bare user instead.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AuthResponse {
    Session { user: UserPayload },
    User(UserPayload),
}

impl AuthResponse {
    fn into_identity(self) -> Identity {
        match self {
            Self::Session { user } | Self::User(user) => user.into(),
        }
    }
}

/// Per-client handle; holds the identity signed in through it.
pub struct GoTrueAuth {
    client: reqwest::Client,
    base_url: String,
    anon_key: SecretString,
    current: RwLock<Option<Identity>>,
}

impl GoTrueAuth {
    pub fn new(client: reqwest::Client, config: &AuthServiceConfig) -> Self {
        Self {
            client,
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            current: RwLock::new(None),
        }
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<(reqwest::StatusCode, serde_json::Value), AuthError> {
        let url = format!("{}/auth/v1/{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .header("apikey", self.anon_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Request(format!("{path}: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AuthError::Request(format!("{path}: {e}")))?;
        let value = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|e| AuthError::InvalidResponse(format!("{path}: {e}")))?
        };
        debug!(path, status = status.as_u16(), "Auth service responded");
        Ok((status, value))
    }

    async fn establish(&self, value: serde_json::Value) -> Result<Identity, AuthError> {
        let identity = serde_json::from_value::<AuthResponse>(value)
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?
            .into_identity();
        *self.current.write().await = Some(identity.clone());
        Ok(identity)
    }
}

/// Pull a human-readable message out of a GoTrue error body.
fn error_message(value: &serde_json::Value) -> String {
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .unwrap_or("unknown error")
        .to_string()
}

#[async_trait]
impl AuthProvider for GoTrueAuth {
    async fn dispatch_code(&self, phone_e164: &str) -> Result<(), AuthError> {
        let (status, value) = self
            .post("otp", serde_json::json!({ "phone": phone_e164 }))
            .await
            .map_err(|e| AuthError::DispatchFailed(e.to_string()))?;
        if !status.is_success() {
            let message = error_message(&value);
            warn!(phone = %mask_for_log(phone_e164), %message, "OTP dispatch refused");
            return Err(AuthError::DispatchFailed(message));
        }
        Ok(())
    }

    async fn verify_code(&self, phone_e164: &str, code: &str) -> Result<Identity, AuthError> {
        let (status, value) = self
            .post(
                "verify",
                serde_json::json!({ "type": "sms", "phone": phone_e164, "token": code }),
            )
            .await?;
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!(phone = %mask_for_log(phone_e164), "OTP verification rate limited");
            return Err(AuthError::Request(error_message(&value)));
        }
        if status.is_client_error() {
            debug!(message = %error_message(&value), "OTP verification refused");
            return Err(AuthError::InvalidCode);
        }
        if !status.is_success() {
            return Err(AuthError::Request(error_message(&value)));
        }
        self.establish(value).await
    }

    async fn sign_in(&self, credential: &Credential) -> Result<Identity, AuthError> {
        let (status, value) = self
            .post(
                "token?grant_type=password",
                serde_json::json!({
                    "email": credential.email,
                    "password": credential.password.expose_secret(),
                }),
            )
            .await?;
        if status == reqwest::StatusCode::BAD_REQUEST {
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(AuthError::Request(error_message(&value)));
        }
        self.establish(value).await
    }

    async fn sign_up(&self, credential: &Credential) -> Result<Identity, AuthError> {
        let (status, value) = self
            .post(
                "signup",
                serde_json::json!({
                    "email": credential.email,
                    "password": credential.password.expose_secret(),
                }),
            )
            .await?;
        if !status.is_success() {
            let message = error_message(&value);
            if message.to_ascii_lowercase().contains("already registered") {
                return Err(AuthError::UserAlreadyExists(credential.email.clone()));
            }
            return Err(AuthError::Request(message));
        }
        self.establish(value).await
    }

    async fn current_identity(&self) -> Option<Identity> {
        self.current.read().await.clone()
    }
}
