//! Controller tests against counting stub collaborators.
//!
//! The stubs record every call so each test can assert exactly which
//! remote operations a submission triggered.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use noteshub_onboarding::auth::{AuthProvider, ResolvedIdentity, TestIdentityProvider};
use noteshub_onboarding::config::OnboardingConfig;
use noteshub_onboarding::error::{AuthError, DatabaseError, OnboardingError};
use noteshub_onboarding::onboarding::{
    AcademicLevel, Credential, Identity, NewProfile, OnboardingController, Profile, ProfileDraft,
    Step,
};
use noteshub_onboarding::store::ProfileStore;

const DEMO_PHONE: &str = "(123) 456-7890";
const REAL_PHONE: &str = "(555) 123-4567";
const REAL_CODE: &str = "424242";
/// Code the stub answers with a service failure rather than a verdict.
const THROTTLED_CODE: &str = "503503";

// ── Stub auth ───────────────────────────────────────────────────────

#[derive(Default)]
struct StubAuth {
    demo_account: Mutex<Option<Identity>>,
    current: Mutex<Option<Identity>>,
    fail_dispatch: bool,
    fail_sign_up: bool,
    sign_in_unavailable: bool,
    dispatched_to: Mutex<Vec<String>>,
    verifies: AtomicUsize,
    sign_ins: AtomicUsize,
    sign_ups: AtomicUsize,
}

impl StubAuth {
    fn with_demo_account() -> Self {
        let auth = Self::default();
        *auth.demo_account.lock().unwrap() = Some(demo_identity());
        auth
    }

    fn forget_current(&self) {
        *self.current.lock().unwrap() = None;
    }

    fn set_current(&self, identity: &Identity) {
        *self.current.lock().unwrap() = Some(identity.clone());
    }
}

fn demo_identity() -> Identity {
    Identity {
        id: "demo-user".into(),
        phone: None,
        email: Some("demo@noteshub.app".into()),
    }
}

fn phone_identity() -> Identity {
    Identity {
        id: "phone-user".into(),
        phone: Some("+15551234567".into()),
        email: None,
    }
}

#[async_trait]
impl AuthProvider for StubAuth {
    async fn dispatch_code(&self, phone_e164: &str) -> Result<(), AuthError> {
        self.dispatched_to.lock().unwrap().push(phone_e164.to_string());
        if self.fail_dispatch {
            return Err(AuthError::DispatchFailed("carrier unavailable".into()));
        }
        Ok(())
    }

    async fn verify_code(&self, _phone_e164: &str, code: &str) -> Result<Identity, AuthError> {
        self.verifies.fetch_add(1, Ordering::SeqCst);
        if code == THROTTLED_CODE {
            return Err(AuthError::Request("too many requests".into()));
        }
        if code != REAL_CODE {
            return Err(AuthError::InvalidCode);
        }
        let identity = phone_identity();
        self.set_current(&identity);
        Ok(identity)
    }

    async fn sign_in(&self, _credential: &Credential) -> Result<Identity, AuthError> {
        self.sign_ins.fetch_add(1, Ordering::SeqCst);
        if self.sign_in_unavailable {
            return Err(AuthError::Request("connection refused".into()));
        }
        let account = self.demo_account.lock().unwrap().clone();
        match account {
            Some(identity) => {
                self.set_current(&identity);
                Ok(identity)
            }
            None => Err(AuthError::InvalidCredentials),
        }
    }

    async fn sign_up(&self, credential: &Credential) -> Result<Identity, AuthError> {
        self.sign_ups.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_up {
            return Err(AuthError::Request("signups are disabled".into()));
        }
        let identity = Identity {
            email: Some(credential.email.clone()),
            ..demo_identity()
        };
        *self.demo_account.lock().unwrap() = Some(identity.clone());
        self.set_current(&identity);
        Ok(identity)
    }

    async fn current_identity(&self) -> Option<Identity> {
        self.current.lock().unwrap().clone()
    }
}

// ── Stub profile store ──────────────────────────────────────────────

#[derive(Default)]
struct StubProfiles {
    rows: Mutex<HashMap<String, Profile>>,
    fail_get: bool,
    gets: AtomicUsize,
    inserts: Mutex<Vec<NewProfile>>,
}

fn stored(profile: &NewProfile) -> Profile {
    Profile {
        id: profile.id.clone(),
        name: profile.name.clone(),
        avatar_url: profile.avatar_url.clone(),
        academic_level: profile.academic_level,
        bio: profile.bio.clone(),
        phone: profile.phone.clone(),
        email: profile.email.clone(),
        rating: profile.rating,
        total_reviews: profile.total_reviews,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

impl StubProfiles {
    fn with_profile(id: &str) -> Self {
        let store = Self::default();
        store.seed(id);
        store
    }

    fn seed(&self, id: &str) {
        let row = stored(&NewProfile {
            id: id.to_string(),
            name: "Existing".into(),
            academic_level: AcademicLevel::Grade12,
            bio: None,
            avatar_url: None,
            phone: "+10000000000".into(),
            email: None,
            rating: 4.2,
            total_reviews: 7,
        });
        self.rows.lock().unwrap().insert(id.to_string(), row);
    }
}

#[async_trait]
impl ProfileStore for StubProfiles {
    async fn get_profile(&self, identity_id: &str) -> Result<Option<Profile>, DatabaseError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get {
            return Err(DatabaseError::Query("connection reset".into()));
        }
        Ok(self.rows.lock().unwrap().get(identity_id).cloned())
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile, DatabaseError> {
        self.inserts.lock().unwrap().push(profile.clone());
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&profile.id) {
            return Err(DatabaseError::Constraint(format!(
                "duplicate key value violates unique constraint \"profiles_pkey\" ({})",
                profile.id
            )));
        }
        let row = stored(profile);
        rows.insert(profile.id.clone(), row.clone());
        Ok(row)
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    auth: Arc<StubAuth>,
    profiles: Arc<StubProfiles>,
    completions: Arc<AtomicUsize>,
    controller: OnboardingController,
}

fn harness(auth: StubAuth, profiles: StubProfiles) -> Harness {
    let auth = Arc::new(auth);
    let profiles = Arc::new(profiles);
    let completions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&completions);
    let controller = OnboardingController::new(
        Arc::new(OnboardingConfig::default()),
        auth.clone(),
        profiles.clone(),
    )
    .on_complete(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    Harness {
        auth,
        profiles,
        completions,
        controller,
    }
}

impl Harness {
    fn completed(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }
}

fn draft() -> ProfileDraft {
    ProfileDraft {
        name: "Jordan Reyes".into(),
        academic_level: Some(AcademicLevel::CollegeSophomore),
        bio: Some("Calc II notes, happy to tutor".into()),
        avatar_url: None,
    }
}

// ── Demo path ───────────────────────────────────────────────────────

#[tokio::test]
async fn demo_phone_moves_to_verify_without_dispatch() {
    let mut h = harness(StubAuth::default(), StubProfiles::default());

    let status = h.controller.submit_phone(DEMO_PHONE).await.unwrap();

    assert_eq!(status.step, Step::Verify);
    assert!(status.demo);
    assert_eq!(status.notice.as_deref(), Some("Demo verification code: 123456"));
    assert!(h.auth.dispatched_to.lock().unwrap().is_empty());
}

#[tokio::test]
async fn demo_code_without_identity_signs_up_once() {
    let mut h = harness(StubAuth::default(), StubProfiles::default());
    h.controller.submit_phone(DEMO_PHONE).await.unwrap();

    let status = h.controller.submit_code("123456").await.unwrap();

    assert_eq!(status.step, Step::Profile);
    assert_eq!(status.identity_id.as_deref(), Some("demo-user"));
    assert_eq!(h.auth.sign_ins.load(Ordering::SeqCst), 1);
    assert_eq!(h.auth.sign_ups.load(Ordering::SeqCst), 1);
    assert_eq!(h.profiles.gets.load(Ordering::SeqCst), 0);
    assert_eq!(h.completed(), 0);
}

#[tokio::test]
async fn demo_identity_without_profile_checks_once() {
    let mut h = harness(StubAuth::with_demo_account(), StubProfiles::default());
    h.controller.submit_phone(DEMO_PHONE).await.unwrap();

    let status = h.controller.submit_code("123456").await.unwrap();

    assert_eq!(status.step, Step::Profile);
    assert_eq!(h.auth.sign_ins.load(Ordering::SeqCst), 1);
    assert_eq!(h.auth.sign_ups.load(Ordering::SeqCst), 0);
    assert_eq!(h.profiles.gets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn demo_identity_with_profile_completes_directly() {
    let mut h = harness(
        StubAuth::with_demo_account(),
        StubProfiles::with_profile("demo-user"),
    );
    h.controller.submit_phone(DEMO_PHONE).await.unwrap();

    let status = h.controller.submit_code("123456").await.unwrap();

    assert_eq!(status.step, Step::Complete);
    assert_eq!(h.completed(), 1);
    assert!(h.profiles.inserts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn wrong_code_stays_in_verify() {
    let mut h = harness(StubAuth::default(), StubProfiles::default());
    h.controller.submit_phone(DEMO_PHONE).await.unwrap();

    let err = h.controller.submit_code("000000").await.unwrap_err();

    assert_eq!(err, OnboardingError::InvalidCode);
    assert_eq!(h.controller.step(), Step::Verify);
    assert_eq!(h.controller.session().failed_attempts, 1);
    assert_eq!(h.auth.sign_ins.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn demo_profile_is_inserted_once_with_defaults() {
    let mut h = harness(StubAuth::default(), StubProfiles::default());
    h.controller.submit_phone(DEMO_PHONE).await.unwrap();
    h.controller.submit_code("123456").await.unwrap();

    let status = h.controller.submit_profile(draft()).await.unwrap();

    assert_eq!(status.step, Step::Complete);
    assert_eq!(h.completed(), 1);
    let inserts = h.profiles.inserts.lock().unwrap();
    assert_eq!(inserts.len(), 1);
    let row = &inserts[0];
    assert_eq!(row.id, "demo-user");
    assert_eq!(row.rating, 5.0);
    assert_eq!(row.total_reviews, 0);
    assert_eq!(row.phone, "+11234567890");
    assert_eq!(row.email.as_deref(), Some("demo@noteshub.app"));
    assert_eq!(row.academic_level, AcademicLevel::CollegeSophomore);
}

#[tokio::test]
async fn duplicate_profile_is_surfaced_without_completion() {
    let mut h = harness(StubAuth::default(), StubProfiles::default());
    h.controller.submit_phone(DEMO_PHONE).await.unwrap();
    h.controller.submit_code("123456").await.unwrap();

    // Another session provisions the shared demo profile first.
    h.profiles.seed("demo-user");

    let err = h.controller.submit_profile(draft()).await.unwrap_err();

    assert!(matches!(err, OnboardingError::ProfileInsertFailed(_)));
    assert_eq!(h.controller.step(), Step::Profile);
    assert_eq!(h.completed(), 0);
}

#[tokio::test]
async fn profile_lookup_failure_holds_at_verify() {
    let profiles = StubProfiles {
        fail_get: true,
        ..Default::default()
    };
    let mut h = harness(StubAuth::with_demo_account(), profiles);
    h.controller.submit_phone(DEMO_PHONE).await.unwrap();

    let err = h.controller.submit_code("123456").await.unwrap_err();

    assert!(matches!(err, OnboardingError::ProfileFetchFailed(_)));
    assert_eq!(h.controller.step(), Step::Verify);
    // Store failures are not code rejections.
    assert_eq!(h.controller.session().failed_attempts, 0);
}

#[tokio::test]
async fn demo_sign_up_failure_holds_at_verify() {
    let auth = StubAuth {
        fail_sign_up: true,
        ..Default::default()
    };
    let mut h = harness(auth, StubProfiles::default());
    h.controller.submit_phone(DEMO_PHONE).await.unwrap();

    let err = h.controller.submit_code("123456").await.unwrap_err();

    assert_eq!(
        err,
        OnboardingError::DemoProvisioningFailed("Auth request failed: signups are disabled".into())
    );
    assert_eq!(h.controller.step(), Step::Verify);
    assert_eq!(h.controller.session().failed_attempts, 0);
    assert_eq!(h.auth.sign_ups.load(Ordering::SeqCst), 1);
    assert_eq!(h.completed(), 0);
}

#[tokio::test]
async fn demo_sign_in_outage_does_not_sign_up() {
    let auth = StubAuth {
        sign_in_unavailable: true,
        ..Default::default()
    };
    let mut h = harness(auth, StubProfiles::default());
    h.controller.submit_phone(DEMO_PHONE).await.unwrap();

    let err = h.controller.submit_code("123456").await.unwrap_err();

    assert!(matches!(err, OnboardingError::DemoProvisioningFailed(_)));
    assert_eq!(h.controller.step(), Step::Verify);
    assert_eq!(h.controller.session().failed_attempts, 0);
    assert_eq!(h.auth.sign_ins.load(Ordering::SeqCst), 1);
    assert_eq!(h.auth.sign_ups.load(Ordering::SeqCst), 0);
    assert_eq!(h.profiles.gets.load(Ordering::SeqCst), 0);
}

struct FixedIdentity {
    resolves: AtomicUsize,
}

#[async_trait]
impl TestIdentityProvider for FixedIdentity {
    async fn resolve(&self) -> Result<ResolvedIdentity, AuthError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        Ok(ResolvedIdentity {
            identity: Identity {
                id: "fixture".into(),
                phone: None,
                email: None,
            },
            newly_created: false,
        })
    }
}

#[tokio::test]
async fn test_identity_strategy_is_swappable() {
    let provider = Arc::new(FixedIdentity {
        resolves: AtomicUsize::new(0),
    });
    let h = harness(StubAuth::default(), StubProfiles::with_profile("fixture"));
    let mut controller = h.controller.with_test_identity(provider.clone());

    controller.submit_phone(DEMO_PHONE).await.unwrap();
    let status = controller.submit_code("123456").await.unwrap();

    assert_eq!(status.step, Step::Complete);
    assert_eq!(provider.resolves.load(Ordering::SeqCst), 1);
    assert_eq!(h.auth.sign_ins.load(Ordering::SeqCst), 0);
    assert_eq!(h.completions.load(Ordering::SeqCst), 1);
}

// ── Real phone path ─────────────────────────────────────────────────

#[tokio::test]
async fn real_phone_full_flow() {
    let mut h = harness(StubAuth::default(), StubProfiles::default());

    let status = h.controller.submit_phone(REAL_PHONE).await.unwrap();
    assert_eq!(status.step, Step::Verify);
    assert!(!status.demo);
    assert!(status.notice.is_none());
    assert_eq!(*h.auth.dispatched_to.lock().unwrap(), vec!["+15551234567"]);

    let status = h.controller.submit_code(REAL_CODE).await.unwrap();
    assert_eq!(status.step, Step::Profile);
    assert_eq!(h.auth.verifies.load(Ordering::SeqCst), 1);
    assert_eq!(h.profiles.gets.load(Ordering::SeqCst), 1);

    h.controller.submit_profile(draft()).await.unwrap();
    let inserts = h.profiles.inserts.lock().unwrap();
    assert_eq!(inserts[0].id, "phone-user");
    assert_eq!(inserts[0].phone, "+15551234567");
    assert!(inserts[0].email.is_none());
    assert_eq!(h.completions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn returning_phone_user_skips_profile() {
    let mut h = harness(StubAuth::default(), StubProfiles::with_profile("phone-user"));
    h.controller.submit_phone(REAL_PHONE).await.unwrap();

    let status = h.controller.submit_code(REAL_CODE).await.unwrap();

    assert_eq!(status.step, Step::Complete);
    assert_eq!(h.completed(), 1);
}

#[tokio::test]
async fn dispatch_failure_stays_in_phone() {
    let auth = StubAuth {
        fail_dispatch: true,
        ..Default::default()
    };
    let mut h = harness(auth, StubProfiles::default());

    let err = h.controller.submit_phone(REAL_PHONE).await.unwrap_err();

    assert_eq!(
        err,
        OnboardingError::DispatchFailed(
            "Failed to dispatch verification code: carrier unavailable".into()
        )
    );
    assert_eq!(h.controller.step(), Step::Phone);
}

#[tokio::test]
async fn malformed_phone_makes_no_remote_call() {
    let mut h = harness(StubAuth::default(), StubProfiles::default());

    let err = h.controller.submit_phone("555123456").await.unwrap_err();

    assert!(err.is_validation());
    assert!(h.auth.dispatched_to.lock().unwrap().is_empty());
    assert_eq!(h.controller.step(), Step::Phone);
}

#[tokio::test]
async fn rejected_real_code_counts_and_locks() {
    let mut h = harness(StubAuth::default(), StubProfiles::default());
    h.controller.submit_phone(REAL_PHONE).await.unwrap();

    for attempt in 1..=5 {
        let err = h.controller.submit_code("111111").await.unwrap_err();
        assert!(matches!(err, OnboardingError::VerifyFailed(_)));
        assert_eq!(h.controller.session().failed_attempts, attempt);
    }

    let err = h.controller.submit_code(REAL_CODE).await.unwrap_err();
    assert_eq!(err, OnboardingError::TooManyAttempts { max: 5 });
    assert_eq!(h.auth.verifies.load(Ordering::SeqCst), 5);

    // Requesting a new code clears the lock.
    h.controller.reset_to_phone().await.unwrap();
    h.controller.submit_phone(REAL_PHONE).await.unwrap();
    let status = h.controller.submit_code(REAL_CODE).await.unwrap();
    assert_eq!(status.step, Step::Profile);
    assert_eq!(h.auth.dispatched_to.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn service_failure_during_verify_spends_no_attempt() {
    let mut h = harness(StubAuth::default(), StubProfiles::default());
    h.controller.submit_phone(REAL_PHONE).await.unwrap();

    let err = h.controller.submit_code(THROTTLED_CODE).await.unwrap_err();

    assert!(matches!(err, OnboardingError::AuthUnavailable(_)));
    assert_eq!(h.controller.step(), Step::Verify);
    assert_eq!(h.controller.session().failed_attempts, 0);

    let status = h.controller.submit_code(REAL_CODE).await.unwrap();
    assert_eq!(status.step, Step::Profile);
}

#[tokio::test]
async fn reset_preserves_phone_digits() {
    let mut h = harness(StubAuth::default(), StubProfiles::default());
    h.controller.submit_phone(REAL_PHONE).await.unwrap();

    let status = h.controller.reset_to_phone().await.unwrap();

    assert_eq!(status.step, Step::Phone);
    assert_eq!(status.phone, REAL_PHONE);
    assert!(h.controller.session().code.is_empty());
}

// ── Profile step ────────────────────────────────────────────────────

#[tokio::test]
async fn incomplete_draft_makes_no_insert() {
    let mut h = harness(StubAuth::default(), StubProfiles::default());
    h.controller.submit_phone(DEMO_PHONE).await.unwrap();
    h.controller.submit_code("123456").await.unwrap();

    let err = h
        .controller
        .submit_profile(ProfileDraft {
            academic_level: None,
            ..draft()
        })
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert!(h.profiles.inserts.lock().unwrap().is_empty());
    assert_eq!(h.controller.step(), Step::Profile);
}

#[tokio::test]
async fn lost_auth_session_aborts_the_flow() {
    let mut h = harness(StubAuth::default(), StubProfiles::default());
    h.controller.submit_phone(DEMO_PHONE).await.unwrap();
    h.controller.submit_code("123456").await.unwrap();
    h.auth.forget_current();

    let err = h.controller.submit_profile(draft()).await.unwrap_err();

    assert!(err.is_fatal());
    assert!(h.profiles.inserts.lock().unwrap().is_empty());
    assert_eq!(h.controller.step(), Step::Phone);
    assert_eq!(h.completed(), 0);
}

#[tokio::test]
async fn out_of_step_submissions_are_refused() {
    let mut h = harness(StubAuth::default(), StubProfiles::default());

    let err = h.controller.submit_profile(draft()).await.unwrap_err();
    assert!(matches!(
        err,
        OnboardingError::InvalidTransition {
            step: Step::Phone,
            ..
        }
    ));
    assert!(matches!(
        h.controller.reset_to_phone().await,
        Err(OnboardingError::InvalidTransition { .. })
    ));
}
