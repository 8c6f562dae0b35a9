use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::transient::TransientIdentity;
use crate::error::{SessionError, SessionResult};

/// Presence notifications from a provider, in emission order. `None` means signed out.
pub type IdentityStream = mpsc::UnboundedReceiver<Option<TransientIdentity>>;

/// The external identity provider seam.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Start delivering identity presence changes. The current identity (or `None`) is delivered first.
    /// A provider that failed to initialize returns `ProviderUnavailable`.
    fn watch(&self) -> SessionResult<IdentityStream>;

    /// A bearer credential for `identity`. `force_refresh` must bypass any cached token.
    fn credential<'a>(
        &'a self,
        identity: &'a TransientIdentity,
        force_refresh: bool,
    ) -> BoxFuture<'a, SessionResult<String>>;
}

/// Wraps a provider: keeps at most one live subscription and bounds credential calls by a timeout.
pub struct IdentityProviderAdapter {
    provider: Arc<dyn IdentityProvider>,
    credential_timeout: Duration,
    /// Id of the live subscription, if any.
    active: Arc<watch::Sender<Option<u64>>>,
    next_id: AtomicU64,
}

impl IdentityProviderAdapter {
    pub fn new(provider: Arc<dyn IdentityProvider>, credential_timeout: Duration) -> Self {
        let (active, _) = watch::channel(None);
        Self { provider, credential_timeout, active: Arc::new(active), next_id: AtomicU64::new(1) }
    }

    /// Subscribe to identity changes. Any earlier subscription from this adapter ends.
    pub fn on_identity_changed(&self) -> SessionResult<IdentitySubscription> {
        let rx = self.provider.watch()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let current = self.active.subscribe();
        if let Some(prev) = self.active.send_replace(Some(id)) {
            debug!(target: "classroom::identity", prev, id, "superseding identity subscription");
        }
        Ok(IdentitySubscription { id, rx, active: self.active.clone(), current })
    }

    pub fn has_active_subscription(&self) -> bool {
        self.active.borrow().is_some()
    }

    pub async fn credential(&self, identity: &TransientIdentity, force_refresh: bool) -> SessionResult<String> {
        match tokio::time::timeout(self.credential_timeout, self.provider.credential(identity, force_refresh)).await {
            Ok(res) => res,
            Err(_) => {
                warn!(
                    target: "classroom::identity",
                    subject = %identity.subject_id,
                    force_refresh,
                    timeout_ms = self.credential_timeout.as_millis() as u64,
                    "credential fetch timed out"
                );
                Err(SessionError::timed_out("credential fetch"))
            }
        }
    }
}

/// Resolves once `id` is no longer the live subscription.
async fn superseded(current: &mut watch::Receiver<Option<u64>>, id: u64) {
    loop {
        if *current.borrow_and_update() != Some(id) {
            return;
        }
        if current.changed().await.is_err() {
            return;
        }
    }
}

/// Handle for one identity subscription. Dropping it unsubscribes.
pub struct IdentitySubscription {
    id: u64,
    rx: IdentityStream,
    active: Arc<watch::Sender<Option<u64>>>,
    current: watch::Receiver<Option<u64>>,
}

impl IdentitySubscription {
    fn is_current(&self) -> bool {
        *self.active.borrow() == Some(self.id)
    }

    /// Next presence change. `None` once unsubscribed, superseded, or the provider hung up.
    /// A superseded subscription returns promptly, without waiting for the provider's next emission.
    pub async fn next(&mut self) -> Option<Option<TransientIdentity>> {
        let id = self.id;
        let item = tokio::select! {
            item = self.rx.recv() => item,
            _ = superseded(&mut self.current, id) => None,
        };
        let item = item?;
        if !self.is_current() {
            return None;
        }
        Some(item)
    }

    pub fn unsubscribe(self) {
        drop(self)
    }
}

impl Drop for IdentitySubscription {
    fn drop(&mut self) {
        let id = self.id;
        self.active.send_if_modified(|cur| {
            if *cur == Some(id) {
                *cur = None;
                true
            } else {
                false
            }
        });
        self.rx.close();
    }
}
