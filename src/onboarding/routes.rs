//! REST endpoints exposing onboarding sessions to the web client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::OnboardingError;
use crate::store::ProfileStore;

use super::controller::{OnboardingController, OnboardingStatus};
use super::model::{AcademicLevel, ProfileDraft};

/// Builds a fresh controller (with its own auth client) per session.
pub type ControllerFactory = Arc<dyn Fn() -> OnboardingController + Send + Sync>;

/// Upper bound on how often idle sessions are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Session {
    controller: OnboardingController,
    last_active: Instant,
}

type SessionHandle = Arc<Mutex<Session>>;

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    factory: ControllerFactory,
    profiles: Arc<dyn ProfileStore>,
    sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
}

impl OnboardingRouteState {
    pub fn new(factory: ControllerFactory, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            factory,
            profiles,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions untouched for at least `ttl`. Sessions with a request
    /// in flight are kept.
    pub async fn sweep_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| match handle.try_lock() {
            Ok(session) => session.last_active.elapsed() < ttl,
            Err(_) => true,
        });
        let removed = before - sessions.len();
        if removed > 0 {
            info!(
                removed,
                remaining = sessions.len(),
                "Idle onboarding sessions dropped"
            );
        }
        removed
    }

    /// Periodically drop sessions idle for longer than `ttl`.
    pub fn spawn_idle_sweeper(&self, ttl: Duration) -> JoinHandle<()> {
        let state = self.clone();
        let period = ttl.min(SWEEP_INTERVAL).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // Skip immediate first tick
            loop {
                interval.tick().await;
                state.sweep_idle(ttl).await;
            }
        })
    }
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/onboarding/sessions", post(create_session))
        .route(
            "/api/onboarding/sessions/{id}",
            get(get_session).delete(delete_session),
        )
        .route("/api/onboarding/sessions/{id}/phone", post(submit_phone))
        .route("/api/onboarding/sessions/{id}/code", post(submit_code))
        .route("/api/onboarding/sessions/{id}/reset", post(reset_to_phone))
        .route("/api/onboarding/sessions/{id}/profile", post(submit_profile))
        .route("/api/profiles/{id}", get(get_profile))
        .with_state(state)
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn error_json(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.to_string() })),
    )
        .into_response()
}

fn status_code_for(err: &OnboardingError) -> StatusCode {
    use OnboardingError::*;
    match err {
        InvalidPhone | ProfileValidation(_) => StatusCode::BAD_REQUEST,
        InvalidCode | VerifyFailed(_) => StatusCode::UNAUTHORIZED,
        TooManyAttempts { .. } => StatusCode::TOO_MANY_REQUESTS,
        InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RequestInFlight | ProfileInsertFailed(_) => StatusCode::CONFLICT,
        DispatchFailed(_)
        | AuthUnavailable(_)
        | DemoProvisioningFailed(_)
        | ProfileFetchFailed(_) => StatusCode::BAD_GATEWAY,
        Invariant(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn parse_session_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id).map_err(|_| error_json(StatusCode::BAD_REQUEST, "Invalid session ID"))
}

async fn find_session(state: &OnboardingRouteState, id: Uuid) -> Result<SessionHandle, Response> {
    state
        .sessions
        .read()
        .await
        .get(&id)
        .cloned()
        .ok_or_else(|| error_json(StatusCode::NOT_FOUND, "Session not found"))
}

/// Take exclusive hold of a session, refusing if another request has it.
async fn claim_session(
    state: &OnboardingRouteState,
    id: &str,
) -> Result<(Uuid, OwnedMutexGuard<Session>), Response> {
    let id = parse_session_id(id)?;
    let handle = find_session(state, id).await?;
    match handle.try_lock_owned() {
        Ok(guard) => Ok((id, guard)),
        Err(_) => {
            warn!(session_id = %id, "Concurrent onboarding request refused");
            let err = OnboardingError::RequestInFlight;
            Err(error_json(status_code_for(&err), &err))
        }
    }
}

/// Release a claimed session and render the outcome. Completed sessions are
/// discarded.
async fn finish(
    state: &OnboardingRouteState,
    id: Uuid,
    mut session: OwnedMutexGuard<Session>,
    result: Result<OnboardingStatus, OnboardingError>,
) -> Response {
    session.last_active = Instant::now();
    drop(session);

    match result {
        Ok(status) => {
            if status.step.is_terminal() {
                state.sessions.write().await.remove(&id);
                info!(session_id = %id, "Onboarding session closed");
            }
            (StatusCode::OK, Json(status)).into_response()
        }
        Err(e) => error_json(status_code_for(&e), &e),
    }
}

// ── Handlers ────────────────────────────────────────────────────────────

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "noteshub-onboarding"
    }))
}

/// POST /api/onboarding/sessions
///
/// Starts a session at the `phone` step and returns its id with the
/// initial status.
async fn create_session(State(state): State<OnboardingRouteState>) -> Response {
    let id = Uuid::new_v4();
    let controller = (state.factory)().on_complete(Arc::new(move || {
        info!(session_id = %id, "Onboarding session completed");
    }));
    let status = controller.status();
    let session = Session {
        controller,
        last_active: Instant::now(),
    };
    state
        .sessions
        .write()
        .await
        .insert(id, Arc::new(Mutex::new(session)));
    info!(session_id = %id, "Onboarding session created");

    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": id, "status": status })),
    )
        .into_response()
}

/// GET /api/onboarding/sessions/{id}
async fn get_session(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> Response {
    let handle = match parse_session_id(&id) {
        Ok(id) => find_session(&state, id).await,
        Err(resp) => Err(resp),
    };
    match handle {
        Ok(handle) => {
            let status = handle.lock().await.controller.status();
            (StatusCode::OK, Json(status)).into_response()
        }
        Err(resp) => resp,
    }
}

/// DELETE /api/onboarding/sessions/{id}
///
/// Abandons the session. Nothing remote needs cleaning up.
async fn delete_session(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> Response {
    let uuid = match parse_session_id(&id) {
        Ok(uuid) => uuid,
        Err(resp) => return resp,
    };
    if state.sessions.write().await.remove(&uuid).is_some() {
        info!(session_id = %uuid, "Onboarding session abandoned");
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_json(StatusCode::NOT_FOUND, "Session not found")
    }
}

#[derive(Deserialize)]
struct PhoneRequest {
    phone: String,
}

/// POST /api/onboarding/sessions/{id}/phone
///
/// Validates the masked number and sends a code, or surfaces the demo code.
async fn submit_phone(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(body): Json<PhoneRequest>,
) -> Response {
    let (id, mut session) = match claim_session(&state, &id).await {
        Ok(claimed) => claimed,
        Err(resp) => return resp,
    };
    let result = session.controller.submit_phone(&body.phone).await;
    finish(&state, id, session, result).await
}

#[derive(Deserialize)]
struct CodeRequest {
    code: String,
}

/// POST /api/onboarding/sessions/{id}/code
async fn submit_code(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(body): Json<CodeRequest>,
) -> Response {
    let (id, mut session) = match claim_session(&state, &id).await {
        Ok(claimed) => claimed,
        Err(resp) => return resp,
    };
    let result = session.controller.submit_code(&body.code).await;
    finish(&state, id, session, result).await
}

/// POST /api/onboarding/sessions/{id}/reset
///
/// "Change phone number": back to `phone` with the number kept.
async fn reset_to_phone(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> Response {
    let (id, mut session) = match claim_session(&state, &id).await {
        Ok(claimed) => claimed,
        Err(resp) => return resp,
    };
    let result = session.controller.reset_to_phone().await;
    finish(&state, id, session, result).await
}

/// Profile form as posted; the level is parsed here so a bad value gets the
/// usual error body.
#[derive(Deserialize)]
struct ProfileRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    academic_level: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

impl ProfileRequest {
    fn into_draft(self) -> Result<ProfileDraft, OnboardingError> {
        let academic_level = self
            .academic_level
            .map(|level| level.parse::<AcademicLevel>())
            .transpose()
            .map_err(OnboardingError::ProfileValidation)?;
        Ok(ProfileDraft {
            name: self.name,
            academic_level,
            bio: self.bio,
            avatar_url: self.avatar_url,
        })
    }
}

/// POST /api/onboarding/sessions/{id}/profile
///
/// Creates the profile for the verified identity and completes the session.
async fn submit_profile(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(body): Json<ProfileRequest>,
) -> Response {
    let (id, mut session) = match claim_session(&state, &id).await {
        Ok(claimed) => claimed,
        Err(resp) => return resp,
    };
    let result = match body.into_draft() {
        Ok(draft) => session.controller.submit_profile(draft).await,
        Err(e) => Err(e),
    };
    finish(&state, id, session, result).await
}

/// GET /api/profiles/{id}
///
/// Returns the profile owned by an identity, or 404 if none exists yet.
async fn get_profile(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> Response {
    match state.profiles.get_profile(&id).await {
        Ok(Some(profile)) => (StatusCode::OK, Json(profile)).into_response(),
        Ok(None) => error_json(StatusCode::NOT_FOUND, "No profile exists yet"),
        Err(e) => {
            warn!(identity_id = %id, error = %e, "Profile lookup failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}
