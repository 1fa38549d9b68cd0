//! OnboardingController — runs the state machine against the auth and
//! profile collaborators.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::auth::{AuthProvider, ResolvedIdentity, SharedDemoAccount, TestIdentityProvider};
use crate::config::OnboardingConfig;
use crate::error::{AuthError, OnboardingError};
use crate::store::ProfileStore;

use super::model::{Identity, NewProfile, ProfileDraft};
use super::phone::mask_for_log;
use super::state::{Effect, Event, Step, Transition, VerificationSession, transition};

/// Invoked once a profile is confirmed for the current identity.
pub type CompletionCallback = Arc<dyn Fn() + Send + Sync>;

/// Snapshot of a session for the host.
#[derive(Debug, Clone, Serialize)]
pub struct OnboardingStatus {
    pub step: Step,
    pub phone: String,
    pub demo: bool,
    pub failed_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
    /// Message to surface to the user, e.g. the demo code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

/// Drives one onboarding session.
///
/// Every method takes `&mut self`, so a session can only have one request in
/// flight; hosts sharing a controller must serialise access.
pub struct OnboardingController {
    config: Arc<OnboardingConfig>,
    auth: Arc<dyn AuthProvider>,
    test_identity: Arc<dyn TestIdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    session: VerificationSession,
    on_complete: Option<CompletionCallback>,
}

impl OnboardingController {
    /// Build a controller whose demo path signs into the shared demo account.
    pub fn new(
        config: Arc<OnboardingConfig>,
        auth: Arc<dyn AuthProvider>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        let test_identity = Arc::new(SharedDemoAccount::from_config(
            Arc::clone(&auth),
            &config.demo,
        ));
        Self {
            config,
            auth,
            test_identity,
            profiles,
            session: VerificationSession::new(),
            on_complete: None,
        }
    }

    /// Replace the strategy used to establish the demo identity.
    pub fn with_test_identity(mut self, provider: Arc<dyn TestIdentityProvider>) -> Self {
        self.test_identity = provider;
        self
    }

    pub fn on_complete(mut self, callback: CompletionCallback) -> Self {
        self.on_complete = Some(callback);
        self
    }

    pub fn session(&self) -> &VerificationSession {
        &self.session
    }

    pub fn step(&self) -> Step {
        self.session.step
    }

    pub fn status(&self) -> OnboardingStatus {
        self.status_with(None)
    }

    fn status_with(&self, notice: Option<String>) -> OnboardingStatus {
        OnboardingStatus {
            step: self.session.step,
            phone: self.session.phone.clone(),
            demo: self.session.is_demo(&self.config),
            failed_attempts: self.session.failed_attempts,
            identity_id: self.session.identity.as_ref().map(|i| i.id.clone()),
            notice,
        }
    }

    /// Submit the masked phone number from the `phone` step.
    pub async fn submit_phone(&mut self, phone: &str) -> Result<OnboardingStatus, OnboardingError> {
        let notice = self.run(Event::PhoneSubmitted(phone.to_string())).await?;
        Ok(self.status_with(notice))
    }

    /// Submit a one-time code from the `verify` step.
    ///
    /// Rejected codes count towards the attempt limit.
    pub async fn submit_code(&mut self, code: &str) -> Result<OnboardingStatus, OnboardingError> {
        match self.run(Event::CodeSubmitted(code.to_string())).await {
            Ok(notice) => Ok(self.status_with(notice)),
            Err(e @ (OnboardingError::InvalidCode | OnboardingError::VerifyFailed(_))) => {
                if let Ok(Transition { session, .. }) =
                    transition(&self.session, Event::CodeRejected, &self.config)
                {
                    self.session = session;
                }
                warn!(
                    phone = %mask_for_log(&self.session.phone),
                    failed_attempts = self.session.failed_attempts,
                    "Verification code rejected"
                );
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Submit the profile draft from the `profile` step.
    pub async fn submit_profile(
        &mut self,
        draft: ProfileDraft,
    ) -> Result<OnboardingStatus, OnboardingError> {
        let notice = self.run(Event::ProfileSubmitted(draft)).await?;
        Ok(self.status_with(notice))
    }

    /// "Change phone number": back to `phone`, keeping the draft number.
    pub async fn reset_to_phone(&mut self) -> Result<OnboardingStatus, OnboardingError> {
        let notice = self.run(Event::ResetToPhone).await?;
        Ok(self.status_with(notice))
    }

    /// Apply an event and every follow-up event its effects produce.
    ///
    /// Each transition is committed before its effects run, so a failing
    /// effect leaves the session at the step it had reached.
    async fn run(&mut self, event: Event) -> Result<Option<String>, OnboardingError> {
        let mut notice = None;
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let name = event.name();
            let Transition { session, effects } =
                match transition(&self.session, event, &self.config) {
                    Ok(t) => t,
                    Err(e) => return Err(self.fail(e)),
                };
            let from = self.session.step;
            self.session = session;
            if from != self.session.step {
                info!(event = name, from = %from, to = %self.session.step, "Onboarding step changed");
            }

            for effect in effects {
                let outcome = self.execute(effect).await;
                match outcome {
                    Ok(EffectOutcome::Event(next)) => pending.push_back(next),
                    Ok(EffectOutcome::Notice(text)) => notice = Some(text),
                    Ok(EffectOutcome::Done) => {}
                    Err(e) => return Err(self.fail(e)),
                }
            }
        }

        Ok(notice)
    }

    /// Fatal errors abandon the session; anything else leaves it where it is.
    fn fail(&mut self, e: OnboardingError) -> OnboardingError {
        if e.is_fatal() {
            error!(error = %e, "Onboarding aborted");
            self.session = VerificationSession::new();
        }
        e
    }

    async fn execute(&self, effect: Effect) -> Result<EffectOutcome, OnboardingError> {
        match effect {
            Effect::ShowDemoCode(code) => {
                info!("Demo phone submitted, skipping SMS dispatch");
                Ok(EffectOutcome::Notice(format!("Demo verification code: {code}")))
            }

            Effect::DispatchCode { phone_e164 } => {
                self.auth.dispatch_code(&phone_e164).await.map_err(|e| {
                    warn!(phone = %mask_for_log(&phone_e164), error = %e, "Code dispatch failed");
                    OnboardingError::DispatchFailed(e.to_string())
                })?;
                info!(phone = %mask_for_log(&phone_e164), "Verification code sent");
                Ok(EffectOutcome::Event(Event::CodeDispatched))
            }

            Effect::ResolveDemoIdentity => {
                let ResolvedIdentity {
                    identity,
                    newly_created,
                } = self.test_identity.resolve().await.map_err(|e| {
                    error!(error = %e, "Demo identity resolution failed");
                    OnboardingError::DemoProvisioningFailed(e.to_string())
                })?;
                // A freshly provisioned identity cannot own a profile yet.
                let has_profile = if newly_created {
                    false
                } else {
                    self.profile_exists(&identity).await?
                };
                Ok(EffectOutcome::Event(Event::IdentityResolved {
                    identity,
                    has_profile,
                }))
            }

            Effect::VerifyCode { phone_e164, code } => {
                let identity = self
                    .auth
                    .verify_code(&phone_e164, &code)
                    .await
                    .map_err(|e| match e {
                        AuthError::InvalidCode => OnboardingError::VerifyFailed(e.to_string()),
                        // Not a verdict on the code, so no attempt is spent.
                        other => {
                            warn!(
                                phone = %mask_for_log(&phone_e164),
                                error = %other,
                                "Code verification unavailable"
                            );
                            OnboardingError::AuthUnavailable(other.to_string())
                        }
                    })?;
                info!(identity_id = %identity.id, "Phone verified");
                let has_profile = self.profile_exists(&identity).await?;
                Ok(EffectOutcome::Event(Event::IdentityResolved {
                    identity,
                    has_profile,
                }))
            }

            Effect::InsertProfile(profile) => {
                self.ensure_signed_in_as(&profile).await?;
                self.profiles.insert_profile(&profile).await.map_err(|e| {
                    warn!(identity_id = %profile.id, error = %e, "Profile insert failed");
                    OnboardingError::ProfileInsertFailed(e.to_string())
                })?;
                info!(identity_id = %profile.id, "Profile created");
                Ok(EffectOutcome::Event(Event::ProfileCreated))
            }

            Effect::Complete => {
                info!(
                    identity_id = ?self.session.identity.as_ref().map(|i| i.id.as_str()),
                    "Onboarding complete"
                );
                if let Some(callback) = &self.on_complete {
                    callback();
                }
                Ok(EffectOutcome::Done)
            }
        }
    }

    async fn profile_exists(&self, identity: &Identity) -> Result<bool, OnboardingError> {
        self.profiles
            .get_profile(&identity.id)
            .await
            .map(|profile| profile.is_some())
            .map_err(|e| {
                warn!(identity_id = %identity.id, error = %e, "Profile lookup failed");
                OnboardingError::ProfileFetchFailed(e.to_string())
            })
    }

    /// The auth collaborator must still be signed in as the session's identity.
    async fn ensure_signed_in_as(&self, profile: &NewProfile) -> Result<(), OnboardingError> {
        match self.auth.current_identity().await {
            Some(current) if current.id == profile.id => Ok(()),
            Some(current) => Err(OnboardingError::Invariant(format!(
                "signed in as {} but provisioning {}",
                current.id, profile.id
            ))),
            None => Err(OnboardingError::Invariant(
                "no authenticated identity found".into(),
            )),
        }
    }
}

enum EffectOutcome {
    Event(Event),
    Notice(String),
    Done,
}
