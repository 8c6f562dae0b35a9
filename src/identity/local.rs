use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use base64::Engine;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::provider::{IdentityProvider, IdentityStream};
use super::transient::TransientIdentity;
use crate::error::{SessionError, SessionResult};
use crate::profile_service::{CredentialVerifier, VerifiedSubject};

#[derive(Debug)]
struct IssuedCredential {
    identity: TransientIdentity,
    expires_at: Instant,
}

#[derive(Default)]
struct LocalState {
    current: Option<TransientIdentity>,
    watchers: Vec<mpsc::UnboundedSender<Option<TransientIdentity>>>,
    issued: HashMap<String, IssuedCredential>,
    cached: HashMap<String, String>,
    revoked: HashSet<String>,
    minted: u64,
}

fn gen_token() -> String {
    // 256-bit random token base64url without padding
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// In-process identity provider: holds the signed-in identity and mints short-lived bearer tokens.
/// Also verifies its own tokens so a co-located profile service can authenticate requests.
pub struct LocalIdentityProvider {
    configured: bool,
    ttl: Duration,
    state: RwLock<LocalState>,
}

impl Default for LocalIdentityProvider {
    fn default() -> Self { Self::new() }
}

impl LocalIdentityProvider {
    pub fn new() -> Self {
        Self { configured: true, ttl: Duration::from_secs(60 * 60), state: RwLock::new(LocalState::default()) }
    }

    /// A provider whose initialization failed; every call reports `ProviderUnavailable`.
    pub fn unconfigured() -> Self {
        Self { configured: false, ..Self::new() }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn notify(state: &mut LocalState) {
        let current = state.current.clone();
        state.watchers.retain(|tx| tx.send(current.clone()).is_ok());
    }

    fn evict(state: &mut LocalState, subject_id: &str) {
        if let Some(tok) = state.cached.remove(subject_id) {
            state.issued.remove(&tok);
        }
    }

    pub fn sign_in(&self, identity: TransientIdentity) {
        let mut st = self.state.write();
        info!(target: "classroom::identity", subject = %identity.subject_id, verified = identity.email_verified, "local.sign_in");
        if let Some(prev) = st.current.take() {
            if prev.subject_id != identity.subject_id {
                Self::evict(&mut st, &prev.subject_id);
            }
        }
        st.current = Some(identity);
        Self::notify(&mut st);
    }

    pub fn sign_out(&self) {
        let mut st = self.state.write();
        if let Some(prev) = st.current.take() {
            info!(target: "classroom::identity", subject = %prev.subject_id, "local.sign_out");
            Self::evict(&mut st, &prev.subject_id);
        }
        Self::notify(&mut st);
    }

    pub fn current(&self) -> Option<TransientIdentity> {
        self.state.read().current.clone()
    }

    /// Expire the cached credential for `subject_id` while leaving it cached, so the next
    /// non-forced credential call hands out a token the verifier rejects.
    pub fn expire_cached(&self, subject_id: &str) {
        let mut st = self.state.write();
        if let Some(tok) = st.cached.get(subject_id).cloned() {
            if let Some(c) = st.issued.get_mut(&tok) {
                c.expires_at = Instant::now();
            }
        }
    }

    /// No credential for `subject_id`, past or future, will verify.
    pub fn revoke(&self, subject_id: &str) {
        let mut st = self.state.write();
        st.revoked.insert(subject_id.to_string());
        debug!(target: "classroom::identity", subject = %subject_id, "local.revoke");
    }

    /// Number of credentials minted so far.
    pub fn minted(&self) -> u64 {
        self.state.read().minted
    }

    fn issue(&self, identity: &TransientIdentity, force_refresh: bool) -> SessionResult<String> {
        if !self.configured {
            return Err(SessionError::provider_unavailable("local identity provider is not configured"));
        }
        let mut st = self.state.write();
        let current = match &st.current {
            Some(cur) if cur.subject_id == identity.subject_id => cur.clone(),
            _ => return Err(SessionError::credential_invalid(format!("'{}' is no longer signed in", identity.subject_id))),
        };
        if !force_refresh {
            if let Some(tok) = st.cached.get(&identity.subject_id) {
                // Hand back whatever is cached, even if stale; only a forced refresh rotates.
                if st.issued.contains_key(tok) {
                    return Ok(tok.clone());
                }
            }
        }
        let token = gen_token();
        if let Some(old) = st.cached.insert(identity.subject_id.clone(), token.clone()) {
            st.issued.remove(&old);
        }
        st.issued.insert(token.clone(), IssuedCredential { identity: current, expires_at: Instant::now() + self.ttl });
        st.minted += 1;
        debug!(target: "classroom::identity", subject = %identity.subject_id, force_refresh, minted = st.minted, "local.mint");
        Ok(token)
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn watch(&self) -> SessionResult<IdentityStream> {
        if !self.configured {
            return Err(SessionError::provider_unavailable("local identity provider is not configured"));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let mut st = self.state.write();
        let _ = tx.send(st.current.clone());
        st.watchers.push(tx);
        Ok(rx)
    }

    fn credential<'a>(
        &'a self,
        identity: &'a TransientIdentity,
        force_refresh: bool,
    ) -> BoxFuture<'a, SessionResult<String>> {
        let res = self.issue(identity, force_refresh);
        async move { res }.boxed()
    }
}

impl CredentialVerifier for LocalIdentityProvider {
    fn verify(&self, token: &str) -> Option<VerifiedSubject> {
        let st = self.state.read();
        let cred = st.issued.get(token)?;
        if cred.expires_at <= Instant::now() || st.revoked.contains(&cred.identity.subject_id) {
            return None;
        }
        Some(VerifiedSubject {
            subject_id: cred.identity.subject_id.clone(),
            email: cred.identity.email.clone(),
            display_name: cred.identity.display_name.clone(),
        })
    }
}
