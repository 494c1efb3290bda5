//! Install a downloaded bundle.
//!
//! The previous install is renamed aside to `<install>_<ddMMyyyy_HHmmss>`
//! before anything is extracted and is never deleted. If extraction fails
//! after the rename, the half-written install directory is removed and the
//! error names the backup so an operator (or the next successful cycle) can
//! resolve it.

use chrono::NaiveDateTime;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error, info, warn};
use zip::ZipArchive;

use crate::config::AgentConfig;
use crate::error::ApplyError;
use crate::paths;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub install_dir: PathBuf,
    pub backup: Option<PathBuf>,
    pub files: usize,
    pub launched: bool,
}

pub struct ApplyEngine {
    install_dir: PathBuf,
    main_executable: String,
}

impl ApplyEngine {
    pub fn new(install_dir: impl Into<PathBuf>, main_executable: impl Into<String>) -> Self {
        Self {
            install_dir: install_dir.into(),
            main_executable: main_executable.into(),
        }
    }

    pub fn from_config(cfg: &AgentConfig) -> Self {
        Self::new(cfg.install_dir.clone(), cfg.main_executable.clone())
    }

    /// Back up, extract, clean up and launch. `now` stamps the backup name.
    pub fn apply(
        &self,
        artifact: &Path,
        group: &str,
        now: NaiveDateTime,
    ) -> Result<ApplyReport, ApplyError> {
        // Reject unreadable archives before the current install is touched.
        let mut archive = ZipArchive::new(File::open(artifact)?)
            .map_err(|e| ApplyError::InvalidArchive(e.to_string()))?;

        let backup = self.back_up(now)?;

        if let Some(parent) = self.install_dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Err(e) = archive.extract(&self.install_dir) {
            error!(group, error = %e, "extraction failed");
            if self.install_dir.exists() {
                if let Err(rm) = std::fs::remove_dir_all(&self.install_dir) {
                    warn!(error = %rm, "could not remove partial install");
                }
            }
            return Err(ApplyError::Extract {
                backup,
                reason: e.to_string(),
            });
        }
        let files = archive.len();
        drop(archive);
        info!(group, files, dir = %self.install_dir.display(), "bundle extracted");

        if let Err(e) = std::fs::remove_file(artifact) {
            warn!(error = %e, "could not remove applied artifact");
        }

        let launched = self.launch();
        Ok(ApplyReport {
            install_dir: self.install_dir.clone(),
            backup,
            files,
            launched,
        })
    }

    fn back_up(&self, now: NaiveDateTime) -> Result<Option<PathBuf>, ApplyError> {
        if !self.install_dir.exists() {
            return Ok(None);
        }
        let stamp = now.format("%d%m%Y_%H%M%S").to_string();
        let mut backup = paths::backup_dir(&self.install_dir, &stamp);
        let mut n = 1;
        while backup.exists() {
            backup = paths::backup_dir(&self.install_dir, &format!("{stamp}_{n}"));
            n += 1;
        }
        std::fs::rename(&self.install_dir, &backup).map_err(|source| ApplyError::Backup {
            install: self.install_dir.clone(),
            backup: backup.clone(),
            source,
        })?;
        info!(backup = %backup.display(), "previous install backed up");
        Ok(Some(backup))
    }

    /// Start the main executable if the bundle shipped one. Failure only
    /// warns: the install is valid without an interactive session.
    fn launch(&self) -> bool {
        let exe = self.install_dir.join(&self.main_executable);
        if !exe.is_file() {
            debug!(exe = %exe.display(), "no main executable to launch");
            return false;
        }
        match Command::new(&exe).current_dir(&self.install_dir).spawn() {
            Ok(_) => {
                info!(exe = %exe.display(), "application launched");
                true
            }
            Err(e) => {
                warn!(exe = %exe.display(), error = %e, "application launch failed");
                false
            }
        }
    }
}
