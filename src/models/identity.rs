use serde::{Deserialize, Serialize};

/// The signed-in user as reported by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub email: Option<String>,
}
