//! Onboarding — phone verification to profile provisioning.
//!
//! A session walks `phone` → `verify` → `profile` → `complete`. The demo
//! sentinel number short-circuits the SMS round-trip and signs into a shared
//! demo identity. A profile is provisioned at most once per identity; an
//! identity that already has one skips the `profile` step.

pub mod controller;
pub mod model;
pub mod phone;
pub mod routes;
pub mod state;

pub use controller::{CompletionCallback, OnboardingController, OnboardingStatus};
pub use model::{AcademicLevel, Credential, Identity, NewProfile, Profile, ProfileDraft};
pub use phone::format_phone_number;
pub use routes::{ControllerFactory, OnboardingRouteState, onboarding_routes};
pub use state::{Effect, Event, Step, Transition, VerificationSession, transition};
