//!
//! classroom-session demo
//! ----------------------
//! Wires an in-process identity provider, the reference profile service and a session engine together,
//! then walks one user from sign-in to an active session. Useful for eyeballing logs with `RUST_LOG=debug`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use classroom_session::profile_service::{self, ProfileServiceState};
use classroom_session::{EngineConfig, LocalIdentityProvider, Role, SessionEngine, SessionPhase, TransientIdentity};

async fn wait_for_phase(engine: &SessionEngine, want: SessionPhase) -> Result<()> {
    let mut rx = engine.subscribe();
    tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|s| s.phase == want))
        .await
        .map_err(|_| anyhow!("timed out waiting for phase {}", want))?
        .map_err(|_| anyhow!("session engine went away"))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let role: Role = std::env::var("CLASSROOM_DEMO_ROLE")
        .unwrap_or_else(|_| "teacher".to_string())
        .parse()
        .context("CLASSROOM_DEMO_ROLE")?;
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());

    let provider = Arc::new(LocalIdentityProvider::new());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.context("bind profile service")?;
    let addr = listener.local_addr()?;
    let service = ProfileServiceState::new(provider.clone());
    tokio::spawn(profile_service::serve(listener, service.clone()));

    let mut config = EngineConfig::from_env().context("engine configuration")?;
    config.profile_base_url = format!("http://{}", addr);
    info!(
        target: "classroom",
        "classroom-session demo starting: RUST_LOG='{}', profile_service={}, role={}",
        rust_log, config.profile_base_url, role
    );

    let engine = SessionEngine::new(&config, provider.clone())?;
    engine.init()?;
    wait_for_phase(&engine, SessionPhase::SignedOut).await?;

    provider.sign_in(TransientIdentity::new("demo-subject", "demo@example.edu", true).with_display_name("Demo User"));
    wait_for_phase(&engine, SessionPhase::PendingRoleSelection).await?;
    info!(target: "classroom", phase = %engine.phase(), "signed in, no profile yet");

    let profile = engine.select_role(role).await?;
    info!(target: "classroom", phase = %engine.phase(), role = %profile.role, id = %profile.id, "role selected");

    // A second click after the session is active is answered from the cached profile.
    let again = engine.select_role(Role::Student).await?;
    info!(
        target: "classroom",
        role = %again.role,
        creation_requests = service.select_role_requests(),
        "repeated selection"
    );

    provider.sign_out();
    wait_for_phase(&engine, SessionPhase::SignedOut).await?;
    engine.dispose();
    info!(target: "classroom", "demo finished");
    Ok(())
}
