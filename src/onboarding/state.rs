//! Onboarding state machine — steps, events, and the pure transition table.
//!
//! [`transition`] never touches a collaborator. It validates an event against
//! the current [`VerificationSession`] and returns the next session together
//! with the [`Effect`]s the controller must carry out. Outcomes of those
//! effects come back in as further events.

use serde::{Deserialize, Serialize};

use crate::config::OnboardingConfig;
use crate::error::OnboardingError;

use super::model::{Identity, NewProfile, ProfileDraft};
use super::phone::{CODE_LEN, is_complete_phone, sanitize_code, to_e164};

/// The steps of the onboarding flow.
///
/// Progresses Phone → Verify → Profile → Complete. The only way back is an
/// explicit Verify → Phone reset; Verify may jump straight to Complete when
/// the identity already has a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Phone,
    Verify,
    Profile,
    Complete,
}

impl Step {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: Step) -> bool {
        use Step::*;
        matches!(
            (self, target),
            (Phone, Verify)
                | (Verify, Phone)
                | (Verify, Profile)
                | (Verify, Complete)
                | (Profile, Complete)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl Default for Step {
    fn default() -> Self {
        Self::Phone
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Phone => "phone",
            Self::Verify => "verify",
            Self::Profile => "profile",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// Ephemeral state for one onboarding screen instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerificationSession {
    pub step: Step,
    /// Phone draft in `(AAA) BBB-CCCC` form; survives a reset to `phone`.
    pub phone: String,
    pub code: String,
    pub draft: ProfileDraft,
    pub identity: Option<Identity>,
    /// Rejected codes since the last reset.
    pub failed_attempts: u32,
}

impl VerificationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the phone draft is the reserved demo sentinel.
    pub fn is_demo(&self, config: &OnboardingConfig) -> bool {
        config.demo.enabled && self.phone == config.demo.phone
    }

    fn move_to(&mut self, target: Step) -> Result<(), OnboardingError> {
        if !self.step.can_transition_to(target) {
            return Err(OnboardingError::Invariant(format!(
                "illegal step change {} -> {}",
                self.step, target
            )));
        }
        self.step = target;
        Ok(())
    }
}

/// Inputs to the state machine: user actions and collaborator outcomes.
#[derive(Debug, Clone)]
pub enum Event {
    PhoneSubmitted(String),
    /// The auth collaborator accepted the dispatch request.
    CodeDispatched,
    CodeSubmitted(String),
    /// A code was refused, locally or by the auth collaborator.
    CodeRejected,
    IdentityResolved {
        identity: Identity,
        has_profile: bool,
    },
    ProfileSubmitted(ProfileDraft),
    ProfileCreated,
    ResetToPhone,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PhoneSubmitted(_) => "phone_submitted",
            Self::CodeDispatched => "code_dispatched",
            Self::CodeSubmitted(_) => "code_submitted",
            Self::CodeRejected => "code_rejected",
            Self::IdentityResolved { .. } => "identity_resolved",
            Self::ProfileSubmitted(_) => "profile_submitted",
            Self::ProfileCreated => "profile_created",
            Self::ResetToPhone => "reset_to_phone",
        }
    }
}

/// Work the controller performs after a transition is committed.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Surface the fixed demo code instead of sending an SMS.
    ShowDemoCode(String),
    DispatchCode { phone_e164: String },
    /// Sign in to (or provision) the shared demo identity.
    ResolveDemoIdentity,
    VerifyCode { phone_e164: String, code: String },
    InsertProfile(NewProfile),
    /// Fire the completion callback.
    Complete,
}

/// Result of an accepted event.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub session: VerificationSession,
    pub effects: Vec<Effect>,
}

/// Apply `event` to `session`.
///
/// Returns `Err` when the event is rejected; the caller's session is then
/// left untouched.
pub fn transition(
    session: &VerificationSession,
    event: Event,
    config: &OnboardingConfig,
) -> Result<Transition, OnboardingError> {
    let mut next = session.clone();
    let mut effects = Vec::new();

    match (session.step, event) {
        (Step::Phone, Event::PhoneSubmitted(phone)) => {
            if !is_complete_phone(&phone) {
                return Err(OnboardingError::InvalidPhone);
            }
            next.phone = phone;
            next.code.clear();
            next.identity = None;
            next.failed_attempts = 0;

            if next.is_demo(config) {
                next.move_to(Step::Verify)?;
                effects.push(Effect::ShowDemoCode(config.demo.code.clone()));
            } else {
                effects.push(Effect::DispatchCode {
                    phone_e164: to_e164(&next.phone, &config.country_code),
                });
            }
        }

        (Step::Phone, Event::CodeDispatched) => {
            if !is_complete_phone(&session.phone) {
                return Err(OnboardingError::Invariant(
                    "code dispatched without a phone number".into(),
                ));
            }
            next.move_to(Step::Verify)?;
        }

        (Step::Verify, Event::CodeSubmitted(code)) => {
            if session.failed_attempts >= config.max_verify_attempts {
                return Err(OnboardingError::TooManyAttempts {
                    max: config.max_verify_attempts,
                });
            }
            let code = sanitize_code(&code);
            if code.len() != CODE_LEN {
                return Err(OnboardingError::InvalidCode);
            }

            if session.is_demo(config) {
                if code != config.demo.code {
                    return Err(OnboardingError::InvalidCode);
                }
                effects.push(Effect::ResolveDemoIdentity);
            } else {
                effects.push(Effect::VerifyCode {
                    phone_e164: to_e164(&session.phone, &config.country_code),
                    code: code.clone(),
                });
            }
            next.code = code;
        }

        (Step::Verify, Event::CodeRejected) => {
            next.code.clear();
            next.failed_attempts = session.failed_attempts.saturating_add(1);
        }

        (
            Step::Verify,
            Event::IdentityResolved {
                identity,
                has_profile,
            },
        ) => {
            next.identity = Some(identity);
            if has_profile {
                next.move_to(Step::Complete)?;
                effects.push(Effect::Complete);
            } else {
                next.move_to(Step::Profile)?;
            }
        }

        (Step::Verify, Event::ResetToPhone) => {
            next.move_to(Step::Phone)?;
            next.code.clear();
            next.failed_attempts = 0;
        }

        (Step::Profile, Event::ProfileSubmitted(draft)) => {
            let profile = build_profile(session, &draft, config)?;
            next.draft = draft;
            effects.push(Effect::InsertProfile(profile));
        }

        (Step::Profile, Event::ProfileCreated) => {
            next.move_to(Step::Complete)?;
            effects.push(Effect::Complete);
        }

        (step, event) => {
            return Err(OnboardingError::InvalidTransition {
                step,
                event: event.name().to_string(),
            });
        }
    }

    Ok(Transition {
        session: next,
        effects,
    })
}

/// Validate a draft and derive the row to insert for the session's identity.
fn build_profile(
    session: &VerificationSession,
    draft: &ProfileDraft,
    config: &OnboardingConfig,
) -> Result<NewProfile, OnboardingError> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(OnboardingError::ProfileValidation("name is required".into()));
    }
    let Some(academic_level) = draft.academic_level else {
        return Err(OnboardingError::ProfileValidation(
            "academic level is required".into(),
        ));
    };
    let Some(identity) = session.identity.as_ref() else {
        return Err(OnboardingError::Invariant(
            "profile step reached without a resolved identity".into(),
        ));
    };

    let demo = session.is_demo(config);
    let phone = if demo {
        config.demo.canonical_phone.clone()
    } else {
        to_e164(&session.phone, &config.country_code)
    };
    let email = identity
        .email
        .clone()
        .or_else(|| demo.then(|| config.demo.email.clone()));

    Ok(NewProfile {
        id: identity.id.clone(),
        name: name.to_string(),
        academic_level,
        bio: non_blank(draft.bio.as_deref()),
        avatar_url: non_blank(draft.avatar_url.as_deref()),
        phone,
        email,
        rating: NewProfile::INITIAL_RATING,
        total_reviews: 0,
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
