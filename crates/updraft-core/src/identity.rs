use serde::Deserialize;
use std::path::PathBuf;
use tracing::warn;

use crate::types::ClientIdentity;

/// Read-only lookup of who this client is. `None` means unavailable; the
/// caller falls back to a default identity rather than blocking.
pub trait IdentitySource {
    fn read(&self) -> Option<ClientIdentity>;
}

#[derive(Debug, Deserialize)]
struct IdentityFile {
    code: Option<String>,
    name: Option<String>,
    group: Option<String>,
}

/// Identity kept in a YAML document `{code, name, group}` maintained by the
/// host application.
pub struct FileIdentitySource {
    path: PathBuf,
}

impl FileIdentitySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl IdentitySource for FileIdentitySource {
    fn read(&self) -> Option<ClientIdentity> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "identity store unreadable");
                return None;
            }
        };
        let parsed: IdentityFile = match serde_yaml::from_str(&data) {
            Ok(p) => p,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "identity store malformed");
                return None;
            }
        };
        let code = parsed.code.filter(|c| !c.trim().is_empty())?;
        Some(ClientIdentity {
            code,
            name: parsed.name.unwrap_or_default(),
            group: parsed.group.unwrap_or_default(),
        })
    }
}

/// Fixed identity, for one-shot commands and tests.
impl IdentitySource for ClientIdentity {
    fn read(&self) -> Option<ClientIdentity> {
        Some(self.clone())
    }
}
