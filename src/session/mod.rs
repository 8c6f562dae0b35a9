//! Session phase derivation and the coordinator that keeps it current.

mod phase;
mod machine;

pub use phase::{derive_phase, IdentityInput, PhaseInputs, SessionPhase};
pub use machine::{SessionEngine, SessionSnapshot};
