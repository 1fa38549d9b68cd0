//! Test identity providers used by the demo sentinel path.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::DemoConfig;
use crate::error::AuthError;
use crate::onboarding::model::{Credential, Identity};

use super::traits::AuthProvider;

/// Identity obtained without a carrier round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub identity: Identity,
    /// True when the identity did not exist before this call.
    pub newly_created: bool,
}

/// Strategy for establishing an identity once the demo code is accepted.
#[async_trait]
pub trait TestIdentityProvider: Send + Sync {
    async fn resolve(&self) -> Result<ResolvedIdentity, AuthError>;
}

/// One shared account for every demo user, provisioned on first use.
pub struct SharedDemoAccount {
    auth: Arc<dyn AuthProvider>,
    credential: Credential,
}

impl SharedDemoAccount {
    pub fn new(auth: Arc<dyn AuthProvider>, credential: Credential) -> Self {
        Self { auth, credential }
    }

    pub fn from_config(auth: Arc<dyn AuthProvider>, demo: &DemoConfig) -> Self {
        Self::new(
            auth,
            Credential {
                email: demo.email.clone(),
                password: demo.password.clone(),
            },
        )
    }
}

#[async_trait]
impl TestIdentityProvider for SharedDemoAccount {
    async fn resolve(&self) -> Result<ResolvedIdentity, AuthError> {
        match self.auth.sign_in(&self.credential).await {
            Ok(identity) => {
                info!(identity_id = %identity.id, "Demo identity signed in");
                Ok(ResolvedIdentity {
                    identity,
                    newly_created: false,
                })
            }
            Err(AuthError::InvalidCredentials) => {
                info!("Demo identity not found, provisioning");
                let identity = self.auth.sign_up(&self.credential).await?;
                info!(identity_id = %identity.id, "Demo identity created");
                Ok(ResolvedIdentity {
                    identity,
                    newly_created: true,
                })
            }
            Err(e) => Err(e),
        }
    }
}
