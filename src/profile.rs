//! Durable profile record and the wire bodies of the profile service.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::gateway::ProfileGateway;
use crate::identity::TransientIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Teacher, Role::Student];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => Err(SessionError::config(format!("unknown role '{}'", other))),
        }
    }
}

/// The application's own record for a subject. `role` never changes once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub subject_id: String,
    pub role: Role,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Free-form fields the profile service attaches (bio, school, ...).
    #[serde(flatten, default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// `{ "user": UserProfile }`, the success body of both profile endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileEnvelope {
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectRoleRequest {
    pub role: Role,
}

/// Body of a 409 from `POST /select-role`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictBody {
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_profile: Option<UserProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Extract a short message from an error body, falling back to the raw text.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(b) => b.error,
        Err(_) => body.trim().chars().take(200).collect(),
    }
}

/// `GET` the durable profile for `identity`. A 404 is the ordinary "no profile yet" answer.
pub async fn fetch_profile(
    gateway: &ProfileGateway,
    identity: &TransientIdentity,
) -> SessionResult<Option<UserProfile>> {
    let resp = gateway.get(gateway.profile_path(), Some(identity)).await?;
    if resp.status().as_u16() == 404 {
        debug!(target: "classroom::profile", subject = %identity.subject_id, "no profile yet");
        return Ok(None);
    }
    if !resp.status().is_success() {
        return Err(SessionError::server(resp.status().as_u16(), error_message(resp.text())));
    }
    let env: ProfileEnvelope = resp.json()?;
    if env.user.subject_id != identity.subject_id {
        return Err(SessionError::invalid_response(format!(
            "profile belongs to '{}', expected '{}'",
            env.user.subject_id, identity.subject_id
        )));
    }
    Ok(Some(env.user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_wire_format_is_camel_case_and_keeps_extra_fields() {
        let raw = serde_json::json!({
            "id": "p1",
            "subjectId": "uid-1",
            "role": "teacher",
            "displayName": "Ada",
            "email": "ada@example.edu",
            "createdAt": "2026-01-02T03:04:05Z",
            "updatedAt": "2026-01-02T03:04:05Z",
            "school": "Analytical Academy"
        });
        let p: UserProfile = serde_json::from_value(raw).unwrap();
        assert_eq!(p.role, Role::Teacher);
        assert_eq!(p.subject_id, "uid-1");
        assert_eq!(p.extra.get("school").and_then(|v| v.as_str()), Some("Analytical Academy"));

        let back = serde_json::to_value(&p).unwrap();
        assert_eq!(back["subjectId"], "uid-1");
        assert_eq!(back["school"], "Analytical Academy");
    }

    #[test]
    fn conflict_body_payload_is_optional() {
        let c: ConflictBody = serde_json::from_str(r#"{"error":"role_already_assigned"}"#).unwrap();
        assert!(c.existing_profile.is_none());
        assert_eq!(c.error, "role_already_assigned");
    }

    #[test]
    fn role_parsing() {
        assert_eq!("Teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert_eq!(" student ".parse::<Role>().unwrap(), Role::Student);
        assert!("admin".parse::<Role>().is_err());
        assert_eq!(serde_json::to_value(SelectRoleRequest { role: Role::Student }).unwrap(), serde_json::json!({"role": "student"}));
    }

    #[test]
    fn error_message_prefers_json_error_field() {
        assert_eq!(error_message(r#"{"error":"profile_not_found"}"#), "profile_not_found");
        assert_eq!(error_message("  bad gateway "), "bad gateway");
    }
}
