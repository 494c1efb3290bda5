use serde::{Deserialize, Serialize};

use crate::types::UpdateEvent;

/// Wire shape of `POST /api/log`. Every field is optional so older or
/// partial clients are still recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogReport {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub society_code: Option<String>,
    #[serde(default)]
    pub society_name: Option<String>,
    #[serde(default)]
    pub union_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub version_file_name: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl LogReport {
    pub fn from_event(event: &UpdateEvent, machine: &str) -> Self {
        Self {
            client_id: Some(event.identity.client_id(machine)),
            society_code: Some(event.identity.code.clone()),
            society_name: Some(event.identity.name.clone()),
            union_name: Some(event.identity.group.clone()),
            status: Some(event.status.as_str().to_string()),
            version_file_name: Some(event.artifact.clone()),
            error_message: Some(event.error.clone().unwrap_or_default()),
        }
    }
}

/// Body of `GET /api/file-sha/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestResponse {
    pub file: String,
    pub sha256: String,
    pub size: u64,
}
