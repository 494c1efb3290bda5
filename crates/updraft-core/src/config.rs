use crate::error::{Result, UpdraftError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "updraft.yaml";

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_server_url() -> String {
    "http://localhost:10000/".to_string()
}

fn default_artifact_prefix() -> String {
    "DebugSocietyManager".to_string()
}

fn default_group() -> String {
    "Porbandar".to_string()
}

fn default_scheduled_day() -> u32 {
    2
}

/// Per-user data directory. Hosts without one fall back to the temp dir.
fn data_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("updraft")
}

fn default_install_dir() -> PathBuf {
    data_root().join("SocietyManager").join("Debug")
}

fn default_main_executable() -> String {
    "DebugSocietyManager.exe".to_string()
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_state_dir() -> PathBuf {
    data_root().join("state")
}

fn default_identity_file() -> PathBuf {
    PathBuf::from("identity.yaml")
}

fn default_self_update_name() -> String {
    "SocietyManagerDebugUpdater.exe".to_string()
}

fn default_cycle_interval() -> u64 {
    30 * 60
}

fn default_error_backoff() -> u64 {
    5 * 60
}

fn default_startup_delay() -> u64 {
    5 * 60
}

fn default_connectivity_attempts() -> u32 {
    90
}

fn default_connectivity_interval() -> u64 {
    20
}

fn default_transfer_timeout() -> u64 {
    60
}

fn default_check_timeout() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// AgentConfig
// ---------------------------------------------------------------------------

/// Settings for the unattended update agent, read from `updraft.yaml`.
/// Every field has a default so a missing or partial file still yields a
/// runnable agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the delivery server, e.g. `https://updates.example.org/`.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_artifact_prefix")]
    pub artifact_prefix: String,
    /// Group used when the identity store does not name one.
    #[serde(default = "default_group")]
    pub default_group: String,
    /// Day of month on which every client attempts an update.
    #[serde(default = "default_scheduled_day")]
    pub scheduled_day: u32,
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,
    #[serde(default = "default_main_executable")]
    pub main_executable: String,
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Holds marker files and the local history database.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_identity_file")]
    pub identity_file: PathBuf,
    #[serde(default = "default_self_update_name")]
    pub self_update_name: String,
    /// Overrides the machine name used in the reported client id.
    #[serde(default)]
    pub machine_name: Option<String>,
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
    #[serde(default = "default_startup_delay")]
    pub startup_delay_secs: u64,
    #[serde(default = "default_connectivity_attempts")]
    pub connectivity_attempts: u32,
    #[serde(default = "default_connectivity_interval")]
    pub connectivity_interval_secs: u64,
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_secs: u64,
    #[serde(default = "default_check_timeout")]
    pub check_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub verify_digest: bool,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            artifact_prefix: default_artifact_prefix(),
            default_group: default_group(),
            scheduled_day: default_scheduled_day(),
            install_dir: default_install_dir(),
            main_executable: default_main_executable(),
            staging_dir: default_staging_dir(),
            state_dir: default_state_dir(),
            identity_file: default_identity_file(),
            self_update_name: default_self_update_name(),
            machine_name: None,
            cycle_interval_secs: default_cycle_interval(),
            error_backoff_secs: default_error_backoff(),
            startup_delay_secs: default_startup_delay(),
            connectivity_attempts: default_connectivity_attempts(),
            connectivity_interval_secs: default_connectivity_interval(),
            transfer_timeout_secs: default_transfer_timeout(),
            check_timeout_secs: default_check_timeout(),
            verify_digest: default_true(),
            log_file: None,
        }
    }
}

impl AgentConfig {
    /// Load from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: AgentConfig = serde_yaml::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=31).contains(&self.scheduled_day) {
            return Err(UpdraftError::InvalidConfig(format!(
                "scheduled_day must be 1-31, got {}",
                self.scheduled_day
            )));
        }
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(UpdraftError::InvalidConfig(format!(
                "server_url must be http(s): {}",
                self.server_url
            )));
        }
        paths::validate_name(&self.artifact_prefix)?;
        paths::validate_name(&self.self_update_name)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Derived URLs
    // -----------------------------------------------------------------------

    fn base(&self) -> String {
        format!("{}/", self.server_url.trim_end_matches('/'))
    }

    /// `<server>/files/<name>`
    pub fn file_url(&self, name: &str) -> String {
        format!("{}{}/{name}", self.base(), paths::FILES_ROUTE)
    }

    /// `<server>/api/file-sha/<name>`
    pub fn digest_url(&self, name: &str) -> String {
        format!("{}api/file-sha/{name}", self.base())
    }

    pub fn log_url(&self) -> String {
        format!("{}api/log", self.base())
    }

    pub fn health_url(&self) -> String {
        format!("{}health", self.base())
    }

    // -----------------------------------------------------------------------
    // Derived paths and durations
    // -----------------------------------------------------------------------

    /// Where an artifact is staged while downloading. Keyed by name so a
    /// stale partial from another day is never resumed into today's bundle.
    pub fn staged_artifact(&self, name: &str) -> PathBuf {
        self.staging_dir.join(name)
    }

    pub fn machine(&self) -> String {
        self.machine_name
            .clone()
            .or_else(|| std::env::var("COMPUTERNAME").ok())
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
