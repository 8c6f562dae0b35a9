use serde::Serialize;

/// What the UI should currently show. Never stored; always recomputed through [`derive_phase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Initial phase, and while a profile fetch for the current identity is in flight.
    Resolving,
    SignedOut,
    /// Signed in, but the provider has not verified the email address yet.
    PendingVerification,
    /// Signed in and verified, no durable profile exists yet.
    PendingRoleSelection,
    Active,
    /// Signed in and verified, but the profile fetch failed (non-404) or timed out.
    Unreachable,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Resolving => "resolving",
            SessionPhase::SignedOut => "signed_out",
            SessionPhase::PendingVerification => "pending_verification",
            SessionPhase::PendingRoleSelection => "pending_role_selection",
            SessionPhase::Active => "active",
            SessionPhase::Unreachable => "unreachable",
        }
    }

    /// Phases from which `select_role` may run the assignment protocol.
    pub fn accepts_role_selection(&self) -> bool {
        matches!(self, SessionPhase::PendingRoleSelection | SessionPhase::Unreachable)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity as seen by the phase table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityInput {
    /// No provider notification received yet.
    #[default]
    Unknown,
    Absent,
    Present { email_verified: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseInputs {
    pub identity: IdentityInput,
    pub fetch_in_flight: bool,
    pub fetch_failed: bool,
    pub profile_present: bool,
}

/// The phase table. Rows are checked top to bottom; the first match wins.
pub fn derive_phase(inputs: &PhaseInputs) -> SessionPhase {
    let email_verified = match inputs.identity {
        IdentityInput::Unknown => return SessionPhase::Resolving,
        IdentityInput::Absent => return SessionPhase::SignedOut,
        IdentityInput::Present { email_verified } => email_verified,
    };
    if inputs.fetch_in_flight {
        return SessionPhase::Resolving;
    }
    if !email_verified {
        return SessionPhase::PendingVerification;
    }
    if inputs.fetch_failed {
        return SessionPhase::Unreachable;
    }
    if inputs.profile_present {
        SessionPhase::Active
    } else {
        SessionPhase::PendingRoleSelection
    }
}
