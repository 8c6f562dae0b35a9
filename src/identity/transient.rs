use serde::{Deserialize, Serialize};

/// A currently signed-in subject as reported by the identity provider.
/// Owned by the provider; the engine only observes it through notifications.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransientIdentity {
    pub subject_id: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl TransientIdentity {
    pub fn new<S: Into<String>>(subject_id: S, email: S, email_verified: bool) -> Self {
        Self { subject_id: subject_id.into(), email: email.into(), email_verified, display_name: None }
    }

    pub fn with_display_name<S: Into<String>>(mut self, name: S) -> Self {
        self.display_name = Some(name.into());
        self
    }
}
