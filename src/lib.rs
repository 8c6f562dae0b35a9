pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod profile;
pub mod profile_service;
pub mod role_assignment;
pub mod session;

pub use config::EngineConfig;
pub use error::{ErrorReason, SessionError, SessionResult};
pub use identity::{IdentityProvider, LocalIdentityProvider, TransientIdentity};
pub use profile::{Role, UserProfile};
pub use session::{SessionEngine, SessionPhase, SessionSnapshot};
