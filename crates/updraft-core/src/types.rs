use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, UpdraftError};
use crate::paths;

// ---------------------------------------------------------------------------
// ClientIdentity
// ---------------------------------------------------------------------------

/// Who this client is, as read from the local data store once per cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub code: String,
    pub name: String,
    pub group: String,
}

impl ClientIdentity {
    pub fn new(code: impl Into<String>, name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            group: group.into(),
        }
    }

    /// Identity used when the local store is unreadable.
    pub fn fallback(default_group: &str) -> Self {
        Self::new("DEFAULT", "Default Society", default_group)
    }

    /// Machine-scoped id reported to the server: `<machine>_<code>`.
    pub fn client_id(&self, machine: &str) -> String {
        format!("{machine}_{}", self.code)
    }
}

// ---------------------------------------------------------------------------
// ArtifactReference
// ---------------------------------------------------------------------------

/// The bundle a group should receive on a given day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReference {
    pub file_name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

impl ArtifactReference {
    /// `<prefix>_<group>_<ddMMyyyy>.zip`
    pub fn for_day(prefix: &str, group: &str, day: NaiveDate) -> Self {
        Self {
            file_name: format!("{prefix}_{group}_{}.zip", day.format("%d%m%Y")),
            size: None,
            digest: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ForceScope
// ---------------------------------------------------------------------------

/// Reach of a forced rollout. Each scope maps to exactly one flag file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ForceScope {
    Global,
    Group(String),
    Identity(String),
}

impl ForceScope {
    /// Flag file name, shared by server (writer) and client (reader).
    pub fn flag_file_name(&self) -> String {
        match self {
            ForceScope::Global => paths::GLOBAL_FORCE_FLAG.to_string(),
            ForceScope::Group(g) => format!("union_{g}_force.flag"),
            ForceScope::Identity(c) => format!("society_{c}_force.flag"),
        }
    }

    /// Lookup order: most specific first.
    pub fn lookup_order(identity: &ClientIdentity) -> [ForceScope; 3] {
        [
            ForceScope::Identity(identity.code.clone()),
            ForceScope::Group(identity.group.clone()),
            ForceScope::Global,
        ]
    }

    /// Build a scope from the admin request shape `{type, union?, societyCode?}`.
    pub fn from_request(
        kind: &str,
        group: Option<&str>,
        identity_code: Option<&str>,
    ) -> Result<Self> {
        let scope = match kind {
            "global" => ForceScope::Global,
            "union" => match non_empty(group) {
                Some(g) => ForceScope::Group(g.to_string()),
                None => return Err(UpdraftError::InvalidScope("union name missing".into())),
            },
            "society" => match non_empty(identity_code) {
                Some(c) => ForceScope::Identity(c.to_string()),
                None => return Err(UpdraftError::InvalidScope("society code missing".into())),
            },
            other => return Err(UpdraftError::InvalidScope(format!("unknown type '{other}'"))),
        };
        match &scope {
            ForceScope::Group(v) | ForceScope::Identity(v) => paths::validate_name(v)?,
            ForceScope::Global => {}
        }
        Ok(scope)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ForceScope::Global => "global",
            ForceScope::Group(_) => "union",
            ForceScope::Identity(_) => "society",
        }
    }

    pub fn target(&self) -> &str {
        match self {
            ForceScope::Global => "ALL",
            ForceScope::Group(v) | ForceScope::Identity(v) => v,
        }
    }
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

impl fmt::Display for ForceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForceScope::Global => f.write_str("global"),
            ForceScope::Group(g) => write!(f, "group:{g}"),
            ForceScope::Identity(c) => write!(f, "identity:{c}"),
        }
    }
}

// ---------------------------------------------------------------------------
// UpdateStatus / UpdateEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateStatus {
    Started,
    Success,
    Failed,
    Skipped,
}

impl UpdateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateStatus::Started => "Started",
            UpdateStatus::Success => "Success",
            UpdateStatus::Failed => "Failed",
            UpdateStatus::Skipped => "Skipped",
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UpdateStatus {
    type Err = UpdraftError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Started" => Ok(UpdateStatus::Started),
            "Success" => Ok(UpdateStatus::Success),
            "Failed" => Ok(UpdateStatus::Failed),
            "Skipped" => Ok(UpdateStatus::Skipped),
            other => Err(UpdraftError::History(format!("unknown status '{other}'"))),
        }
    }
}

/// One terminal transition of an update cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub identity: ClientIdentity,
    pub artifact: String,
    pub status: UpdateStatus,
    pub error: Option<String>,
    pub at: NaiveDateTime,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
