//! First-time role assignment.
//!
//! Check-then-act reduced to best effort: a pre-check skips creation when a profile already exists, and a
//! 409 carrying the winner's profile is adopted verbatim. The profile service's unique constraint on subject
//! id is what actually guarantees a single winner; this protocol makes every caller converge on it.

use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::error::{SessionError, SessionResult};
use crate::gateway::ProfileGateway;
use crate::identity::TransientIdentity;
use crate::profile::{error_message, fetch_profile, ConflictBody, ProfileEnvelope, Role, SelectRoleRequest, UserProfile};

/// How an assignment resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOutcome {
    /// The pre-check found a profile; no creation request was sent.
    AlreadyAssigned,
    /// The creation request succeeded.
    Created,
    /// Creation lost a race; the server's existing profile was adopted.
    Adopted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleAssignment {
    pub profile: UserProfile,
    pub outcome: AssignmentOutcome,
}

pub struct RoleAssignmentProtocol {
    gateway: Arc<ProfileGateway>,
}

impl RoleAssignmentProtocol {
    pub fn new(gateway: Arc<ProfileGateway>) -> Self {
        Self { gateway }
    }

    pub async fn assign_role(&self, identity: &TransientIdentity, role: Role) -> SessionResult<RoleAssignment> {
        let subject = identity.subject_id.as_str();

        if let Some(profile) = fetch_profile(&self.gateway, identity).await? {
            debug!(target: "classroom::roles", subject, requested = %role, existing = %profile.role, "profile exists, skipping creation");
            return Ok(RoleAssignment { profile, outcome: AssignmentOutcome::AlreadyAssigned });
        }

        let resp = self
            .gateway
            .post_json(self.gateway.select_role_path(), Some(identity), &SelectRoleRequest { role })
            .await?;
        let status = resp.status();

        if status.is_success() {
            let env: ProfileEnvelope = resp.json()?;
            check_subject(&env.user, identity)?;
            if env.user.role != role {
                // The service resolved the request idempotently to an earlier winner.
                info!(target: "classroom::roles", subject, requested = %role, assigned = %env.user.role, "server returned existing role");
                return Ok(RoleAssignment { profile: env.user, outcome: AssignmentOutcome::Adopted });
            }
            info!(target: "classroom::roles", subject, role = %role, "role assigned");
            return Ok(RoleAssignment { profile: env.user, outcome: AssignmentOutcome::Created });
        }

        if status == StatusCode::CONFLICT {
            let body: Option<ConflictBody> = serde_json::from_str(resp.text()).ok();
            return match body.and_then(|b| b.existing_profile) {
                Some(existing) => {
                    check_subject(&existing, identity)?;
                    info!(
                        target: "classroom::roles",
                        subject,
                        requested = %role,
                        adopted = %existing.role,
                        "lost role assignment race, adopting existing profile"
                    );
                    Ok(RoleAssignment { profile: existing, outcome: AssignmentOutcome::Adopted })
                }
                None => {
                    warn!(target: "classroom::roles", subject, "409 without existing profile payload");
                    Err(SessionError::conflict(error_message(resp.text())))
                }
            };
        }

        warn!(target: "classroom::roles", subject, status = status.as_u16(), "role assignment failed");
        Err(SessionError::server(status.as_u16(), error_message(resp.text())))
    }
}

fn check_subject(profile: &UserProfile, identity: &TransientIdentity) -> SessionResult<()> {
    if profile.subject_id != identity.subject_id {
        return Err(SessionError::invalid_response(format!(
            "profile belongs to '{}', expected '{}'",
            profile.subject_id, identity.subject_id
        )));
    }
    Ok(())
}
