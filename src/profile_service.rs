//!
//! Reference profile service
//! -------------------------
//! Axum implementation of the two profile endpoints the session engine talks to:
//! - `GET /profile`: 200 `{ user }`, or 404 when the subject has no profile yet.
//! - `POST /select-role`: 201 `{ user }` on creation, 409 `{ error, existingProfile }` when one exists.
//!
//! Bearer tokens are checked through a [`CredentialVerifier`]. Profiles live in memory; uniqueness on
//! subject id is enforced under a single write lock, which is what makes role assignment exactly-once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::profile::{ConflictBody, ErrorBody, ProfileEnvelope, Role, SelectRoleRequest, UserProfile};

/// Who a bearer token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedSubject {
    pub subject_id: String,
    pub email: String,
    pub display_name: Option<String>,
}

pub trait CredentialVerifier: Send + Sync + 'static {
    fn verify(&self, token: &str) -> Option<VerifiedSubject>;
}

/// Shared service state injected into all handlers.
#[derive(Clone)]
pub struct ProfileServiceState {
    verifier: Arc<dyn CredentialVerifier>,
    /// Subject id -> profile
    profiles: Arc<RwLock<HashMap<String, UserProfile>>>,
    select_role_requests: Arc<AtomicU64>,
}

impl ProfileServiceState {
    pub fn new(verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self {
            verifier,
            profiles: Arc::new(RwLock::new(HashMap::new())),
            select_role_requests: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn profile(&self, subject_id: &str) -> Option<UserProfile> {
        self.profiles.read().await.get(subject_id).cloned()
    }

    pub async fn profile_count(&self) -> usize {
        self.profiles.read().await.len()
    }

    /// Authenticated `POST /select-role` requests seen so far.
    pub fn select_role_requests(&self) -> u64 {
        self.select_role_requests.load(Ordering::SeqCst)
    }

    /// Create the profile for `subject` unless one exists. Returns the stored profile and whether it was
    /// created by this call.
    pub async fn create_if_absent(&self, subject: &VerifiedSubject, role: Role) -> (UserProfile, bool) {
        let mut map = self.profiles.write().await;
        if let Some(existing) = map.get(&subject.subject_id) {
            return (existing.clone(), false);
        }
        let now = chrono::Utc::now();
        let profile = UserProfile {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject.subject_id.clone(),
            role,
            display_name: subject.display_name.clone().unwrap_or_else(|| display_name_from_email(&subject.email)),
            email: subject.email.clone(),
            created_at: now,
            updated_at: now,
            extra: Default::default(),
        };
        map.insert(subject.subject_id.clone(), profile.clone());
        (profile, true)
    }
}

fn display_name_from_email(email: &str) -> String {
    email.split('@').next().unwrap_or_default().to_string()
}

pub fn router(state: ProfileServiceState) -> Router {
    Router::new()
        .route("/profile", get(get_profile))
        .route("/select-role", post(select_role))
        .with_state(state)
}

/// Serve the router on an already-bound listener until the task is aborted.
pub async fn serve(listener: tokio::net::TcpListener, state: ProfileServiceState) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(target: "classroom::profile_service", "profile service listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") { return None; }
    let token = token.trim();
    if token.is_empty() { None } else { Some(token) }
}

fn error(status: StatusCode, code: &str) -> Response {
    (status, Json(ErrorBody { error: code.to_string() })).into_response()
}

fn authenticate(state: &ProfileServiceState, headers: &HeaderMap) -> Result<VerifiedSubject, Response> {
    let Some(token) = bearer(headers) else {
        return Err(error(StatusCode::UNAUTHORIZED, "missing_bearer_token"));
    };
    state.verifier.verify(token).ok_or_else(|| error(StatusCode::UNAUTHORIZED, "invalid_credential"))
}

async fn get_profile(State(state): State<ProfileServiceState>, headers: HeaderMap) -> Response {
    let subject = match authenticate(&state, &headers) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match state.profile(&subject.subject_id).await {
        Some(user) => (StatusCode::OK, Json(ProfileEnvelope { user })).into_response(),
        None => {
            debug!(target: "classroom::profile_service", subject = %subject.subject_id, "profile not found");
            error(StatusCode::NOT_FOUND, "profile_not_found")
        }
    }
}

async fn select_role(
    State(state): State<ProfileServiceState>,
    headers: HeaderMap,
    Json(payload): Json<SelectRoleRequest>,
) -> Response {
    let subject = match authenticate(&state, &headers) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    state.select_role_requests.fetch_add(1, Ordering::SeqCst);
    let (profile, created) = state.create_if_absent(&subject, payload.role).await;
    if created {
        info!(target: "classroom::profile_service", subject = %subject.subject_id, role = %profile.role, "profile created");
        return (StatusCode::CREATED, Json(ProfileEnvelope { user: profile })).into_response();
    }
    debug!(
        target: "classroom::profile_service",
        subject = %subject.subject_id,
        requested = %payload.role,
        existing = %profile.role,
        "role already assigned"
    );
    let body = ConflictBody { error: "role_already_assigned".to_string(), existing_profile: Some(profile) };
    (StatusCode::CONFLICT, Json(body)).into_response()
}
