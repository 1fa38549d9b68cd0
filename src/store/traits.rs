//! Profile store interface.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::onboarding::model::{NewProfile, Profile};

/// Backend-agnostic storage for platform profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the profile owned by `identity_id`. `Ok(None)` means not found.
    async fn get_profile(&self, identity_id: &str) -> Result<Option<Profile>, DatabaseError>;

    /// Insert a new profile.
    ///
    /// Fails with [`DatabaseError::Constraint`] if the identity already has one.
    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile, DatabaseError>;
}
