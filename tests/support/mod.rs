// Shared helpers for the integration tests: in-process HTTP servers on ephemeral ports and phase waiting.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::task::JoinHandle;

use classroom_session::identity::{IdentityProviderAdapter, TransientIdentity};
use classroom_session::gateway::ProfileGateway;
use classroom_session::profile_service::{self, ProfileServiceState};
use classroom_session::{EngineConfig, LocalIdentityProvider, SessionEngine, SessionPhase, SessionSnapshot};

/// A running server; aborted on drop.
pub struct TestServer {
    pub base: String,
    handle: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn spawn_router(app: Router) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind 127.0.0.1:0");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("test server error: {e:?}");
        }
    });
    TestServer { base: format!("http://{}", addr), handle }
}

/// Local provider plus the reference profile service trusting it.
pub struct LocalStack {
    pub provider: Arc<LocalIdentityProvider>,
    pub service: ProfileServiceState,
    pub server: TestServer,
}

pub async fn local_stack() -> LocalStack {
    let provider = Arc::new(LocalIdentityProvider::new());
    let service = ProfileServiceState::new(provider.clone());
    let server = spawn_router(profile_service::router(service.clone())).await;
    LocalStack { provider, service, server }
}

pub fn config(base: &str) -> EngineConfig {
    EngineConfig {
        request_timeout: Duration::from_secs(2),
        credential_timeout: Duration::from_secs(2),
        ..EngineConfig::with_base_url(base)
    }
}

pub fn gateway(base: &str, provider: Arc<LocalIdentityProvider>) -> Arc<ProfileGateway> {
    let adapter = Arc::new(IdentityProviderAdapter::new(provider, Duration::from_secs(2)));
    Arc::new(ProfileGateway::new(&config(base), adapter).expect("gateway"))
}

pub fn engine(cfg: &EngineConfig, provider: Arc<LocalIdentityProvider>) -> SessionEngine {
    let engine = SessionEngine::new(cfg, provider).expect("engine");
    engine.init().expect("init");
    engine
}

pub fn verified(subject: &str) -> TransientIdentity {
    TransientIdentity::new(subject.to_string(), format!("{subject}@example.edu"), true)
}

pub fn unverified(subject: &str) -> TransientIdentity {
    TransientIdentity::new(subject.to_string(), format!("{subject}@example.edu"), false)
}

pub async fn wait_for_snapshot(engine: &SessionEngine, what: &str, f: impl FnMut(&SessionSnapshot) -> bool) -> SessionSnapshot {
    let mut rx = engine.subscribe();
    let res = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(f)).await;
    match res {
        Ok(Ok(snap)) => snap.clone(),
        _ => panic!("timed out waiting for {}; last snapshot: {:?}", what, engine.snapshot()),
    }
}

pub async fn wait_for_phase(engine: &SessionEngine, want: SessionPhase) -> SessionSnapshot {
    wait_for_snapshot(engine, want.as_str(), |s| s.phase == want).await
}
