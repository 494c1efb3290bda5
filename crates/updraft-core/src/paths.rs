use crate::error::{Result, UpdraftError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Local state file names (inside the agent's state directory)
// ---------------------------------------------------------------------------

pub const FIRST_RUN_FLAG: &str = "firstrun.flag";
pub const LAST_FORCE_FLAG: &str = "lastforce.flag";
pub const APPLIED_FLAG: &str = "applied.flag";
pub const HISTORY_DB: &str = "history.db";

// ---------------------------------------------------------------------------
// Server-side layout
// ---------------------------------------------------------------------------

pub const GLOBAL_FORCE_FLAG: &str = "global_force.flag";

/// URL path segment under which artifacts and flags are served.
pub const FILES_ROUTE: &str = "files";

pub fn first_run_flag(state_dir: &Path) -> PathBuf {
    state_dir.join(FIRST_RUN_FLAG)
}

pub fn last_force_flag(state_dir: &Path) -> PathBuf {
    state_dir.join(LAST_FORCE_FLAG)
}

pub fn applied_flag(state_dir: &Path) -> PathBuf {
    state_dir.join(APPLIED_FLAG)
}

pub fn history_db(state_dir: &Path) -> PathBuf {
    state_dir.join(HISTORY_DB)
}

/// `<install>_<suffix>`: sibling of the install directory used as backup.
pub fn backup_dir(install_dir: &Path, suffix: &str) -> PathBuf {
    let mut name = install_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push("_");
    name.push(suffix);
    install_dir.with_file_name(name)
}

/// `<path><suffix>` without replacing an existing extension.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._ \-]*$").unwrap())
}

/// Validate a file, group or identity name that ends up as a path component
/// on the server. Rejects separators and parent references.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 128 || name.contains("..") || !name_re().is_match(name) {
        return Err(UpdraftError::InvalidName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
