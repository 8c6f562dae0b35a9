//! Identity provider integration for the session engine.
//! Keep the public surface thin and split implementation across sub-modules.

mod transient;
mod provider;
mod local;

pub use transient::TransientIdentity;
pub use provider::{IdentityProvider, IdentityProviderAdapter, IdentityStream, IdentitySubscription};
pub use local::LocalIdentityProvider;
