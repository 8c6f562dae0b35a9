use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::phase::{derive_phase, IdentityInput, PhaseInputs, SessionPhase};
use crate::config::EngineConfig;
use crate::error::{ErrorReason, SessionError, SessionResult};
use crate::gateway::ProfileGateway;
use crate::identity::{IdentityProvider, IdentityProviderAdapter, TransientIdentity};
use crate::profile::{fetch_profile, Role, UserProfile};
use crate::role_assignment::RoleAssignmentProtocol;

/// Everything a renderer needs, published on every input change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub profile: Option<UserProfile>,
    pub error: Option<SessionError>,
    pub generation: u64,
}

#[derive(Default)]
struct EngineState {
    /// Bumped on every identity change; results tagged with an older value are dropped.
    generation: u64,
    /// Bumped on every fetch start; only the latest fetch of a generation may land.
    fetch_seq: u64,
    identity_input: IdentityInput,
    identity: Option<TransientIdentity>,
    fetch_in_flight: bool,
    fetch_failed: bool,
    profile: Option<UserProfile>,
    error: Option<SessionError>,
}

impl EngineState {
    fn phase(&self) -> SessionPhase {
        derive_phase(&PhaseInputs {
            identity: self.identity_input,
            fetch_in_flight: self.fetch_in_flight,
            fetch_failed: self.fetch_failed,
            profile_present: self.profile.is_some(),
        })
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase(),
            profile: self.profile.clone(),
            error: self.error.clone(),
            generation: self.generation,
        }
    }

    fn sign_out(&mut self) {
        self.identity_input = IdentityInput::Absent;
        self.identity = None;
        self.fetch_in_flight = false;
        self.fetch_failed = false;
        self.profile = None;
    }
}

struct EngineInner {
    identity: Arc<IdentityProviderAdapter>,
    gateway: Arc<ProfileGateway>,
    roles: RoleAssignmentProtocol,
    state: Mutex<EngineState>,
    snapshots: watch::Sender<SessionSnapshot>,
    /// Serializes `select_role` within this instance.
    assigning: tokio::sync::Mutex<()>,
}

impl EngineInner {
    fn publish(&self, st: &EngineState) {
        let snap = st.snapshot();
        debug!(target: "classroom::session", phase = %snap.phase, generation = snap.generation, "phase");
        self.snapshots.send_replace(snap);
    }

    fn on_identity_changed(self: &Arc<Self>, identity: Option<TransientIdentity>) {
        let mut st = self.state.lock();
        st.generation += 1;
        st.error = None;
        let Some(identity) = identity else {
            info!(target: "classroom::session", generation = st.generation, "identity signed out");
            st.sign_out();
            self.publish(&st);
            return;
        };
        info!(
            target: "classroom::session",
            subject = %identity.subject_id,
            verified = identity.email_verified,
            generation = st.generation,
            "identity signed in"
        );
        st.identity_input = IdentityInput::Present { email_verified: identity.email_verified };
        st.identity = Some(identity.clone());
        st.profile = None;
        self.start_fetch(st, identity);
    }

    /// Mark a fetch in flight under the current generation and spawn it. Consumes the lock guard.
    fn start_fetch(self: &Arc<Self>, mut st: parking_lot::MutexGuard<'_, EngineState>, identity: TransientIdentity) {
        st.fetch_seq += 1;
        st.fetch_in_flight = true;
        if st.fetch_failed {
            // The error came from the fetch being retried.
            st.error = None;
        }
        st.fetch_failed = false;
        let tag = (st.generation, st.fetch_seq);
        self.publish(&st);
        drop(st);

        let inner = self.clone();
        tokio::spawn(async move {
            let res = fetch_profile(&inner.gateway, &identity).await;
            inner.finish_fetch(tag, &identity, res);
        });
    }

    fn finish_fetch(&self, tag: (u64, u64), identity: &TransientIdentity, res: SessionResult<Option<UserProfile>>) {
        let mut st = self.state.lock();
        if (st.generation, st.fetch_seq) != tag {
            debug!(
                target: "classroom::session",
                subject = %identity.subject_id,
                fetched_generation = tag.0,
                current_generation = st.generation,
                "discarding superseded profile fetch"
            );
            return;
        }
        st.fetch_in_flight = false;
        match res {
            Ok(profile) => {
                st.profile = profile;
                st.error = None;
            }
            Err(e) if e.reason() == ErrorReason::ProviderUnavailable => {
                warn!(target: "classroom::session", error = %e, "identity provider unavailable, treating session as signed out");
                st.sign_out();
                st.error = Some(e);
            }
            Err(e) => {
                warn!(target: "classroom::session", subject = %identity.subject_id, error = %e, "profile fetch failed");
                st.fetch_failed = true;
                st.error = Some(e);
            }
        }
        self.publish(&st);
    }
}

/// The session coordinator. Construct once at application start, call [`SessionEngine::init`], and hand
/// `Arc<SessionEngine>` to UI consumers.
pub struct SessionEngine {
    inner: Arc<EngineInner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionEngine {
    pub fn new(config: &EngineConfig, provider: Arc<dyn IdentityProvider>) -> SessionResult<Self> {
        let identity = Arc::new(IdentityProviderAdapter::new(provider, config.credential_timeout));
        let gateway = Arc::new(ProfileGateway::new(config, identity.clone())?);
        let roles = RoleAssignmentProtocol::new(gateway.clone());
        let state = EngineState::default();
        let (snapshots, _) = watch::channel(state.snapshot());
        Ok(Self {
            inner: Arc::new(EngineInner {
                identity,
                gateway,
                roles,
                state: Mutex::new(state),
                snapshots,
                assigning: tokio::sync::Mutex::new(()),
            }),
            listener: Mutex::new(None),
        })
    }

    /// Subscribe to the identity provider and start tracking. Idempotent while running.
    /// A provider that failed to initialize leaves the engine `SignedOut` with a `ProviderUnavailable` error.
    pub fn init(&self) -> SessionResult<()> {
        let mut listener = self.listener.lock();
        if listener.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }
        match self.inner.identity.on_identity_changed() {
            Ok(mut sub) => {
                let inner = self.inner.clone();
                *listener = Some(tokio::spawn(async move {
                    while let Some(identity) = sub.next().await {
                        inner.on_identity_changed(identity);
                    }
                    debug!(target: "classroom::session", "identity subscription ended");
                }));
                info!(target: "classroom::session", "session engine started");
            }
            Err(e) => {
                warn!(target: "classroom::session", error = %e, "identity provider unavailable, session is signed out");
                let mut st = self.inner.state.lock();
                st.generation += 1;
                st.sign_out();
                st.error = Some(e);
                self.inner.publish(&st);
            }
        }
        Ok(())
    }

    /// Stop listening and drop all session state. In-flight fetches still complete on the wire but their
    /// results are discarded. The engine reads `SignedOut` until `init` is called again.
    pub fn dispose(&self) {
        if let Some(h) = self.listener.lock().take() {
            h.abort();
        }
        let mut st = self.inner.state.lock();
        st.generation += 1;
        st.sign_out();
        st.error = None;
        self.inner.publish(&st);
        info!(target: "classroom::session", "session engine disposed");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.lock().snapshot()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.lock().phase()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.inner.state.lock().profile.clone()
    }

    pub fn error(&self) -> Option<SessionError> {
        self.inner.state.lock().error.clone()
    }

    pub fn identity(&self) -> Option<TransientIdentity> {
        self.inner.state.lock().identity.clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn clear_error(&self) {
        let mut st = self.inner.state.lock();
        if st.error.take().is_some() {
            self.inner.publish(&st);
        }
    }

    /// Re-fetch the profile for the current identity, superseding any fetch in flight.
    pub fn refresh(&self) {
        let st = self.inner.state.lock();
        let Some(identity) = st.identity.clone() else {
            return;
        };
        debug!(target: "classroom::session", subject = %identity.subject_id, "refreshing profile");
        self.inner.start_fetch(st, identity);
    }

    /// Claim `role` for the signed-in subject. Returns the canonical profile, which may carry a different
    /// role if another caller got there first. Once a profile is cached this never touches the network.
    pub async fn select_role(&self, role: Role) -> SessionResult<UserProfile> {
        let _turn = self.inner.assigning.lock().await;

        let (generation, identity) = {
            let st = self.inner.state.lock();
            let phase = st.phase();
            if phase != SessionPhase::Active && !phase.accepts_role_selection() {
                return Err(SessionError::NotReady { phase });
            }
            if let Some(p) = &st.profile {
                debug!(target: "classroom::session", requested = %role, existing = %p.role, "profile already cached");
                return Ok(p.clone());
            }
            match st.identity.clone() {
                Some(i) => (st.generation, i),
                None => return Err(SessionError::NotReady { phase }),
            }
        };

        let res = self.inner.roles.assign_role(&identity, role).await;

        let mut st = self.inner.state.lock();
        let current = st.generation == generation;
        match res {
            Ok(assignment) => {
                if current {
                    st.profile = Some(assignment.profile.clone());
                    // Anything fetched before this point predates the assignment.
                    st.fetch_seq += 1;
                    st.fetch_in_flight = false;
                    st.fetch_failed = false;
                    st.error = None;
                    self.inner.publish(&st);
                } else {
                    debug!(target: "classroom::session", subject = %identity.subject_id, "identity changed during role selection, not caching");
                }
                Ok(assignment.profile)
            }
            Err(e) => {
                if current {
                    st.error = Some(e.clone());
                    self.inner.publish(&st);
                }
                Err(e)
            }
        }
    }
}

impl Drop for SessionEngine {
    fn drop(&mut self) {
        if let Some(h) = self.listener.lock().take() {
            h.abort();
        }
    }
}
