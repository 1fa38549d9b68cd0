//! NotesHub onboarding — phone sign-in and profile provisioning service.

pub mod auth;
pub mod config;
pub mod error;
pub mod onboarding;
pub mod store;
