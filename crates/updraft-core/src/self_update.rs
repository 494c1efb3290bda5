//! Replace the running agent executable with a newer published build.
//!
//! ```text
//! HEAD  files/<self name>        absent ─▶ UpToDate
//! GET   api/file-sha/<self name> equal to running exe ─▶ UpToDate
//! GET   files/<self name>  ─▶ <exe>.new            (same directory as exe)
//! rename <exe>     ─▶ <exe>.old                    (stale .old removed first)
//! rename <exe>.new ─▶ <exe>                        (on failure: .old ─▶ exe)
//! spawn <exe> <relaunch args>, caller exits
//! ```
//!
//! Both renames stay inside one directory, so they are atomic on the
//! filesystems the agent is deployed to. The file is never deleted and then
//! rewritten in place.

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error, info};

use crate::config::AgentConfig;
use crate::digest;
use crate::error::SelfUpdateError;
use crate::paths;
use crate::report::DigestResponse;
use crate::transfer::TransferEngine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfUpdateOutcome {
    UpToDate,
    /// The executable on disk was replaced; the process should relaunch it.
    Replaced { exe: PathBuf },
}

pub struct SelfUpdater<'a> {
    transfer: &'a TransferEngine,
    config: &'a AgentConfig,
    exe: PathBuf,
}

impl<'a> SelfUpdater<'a> {
    /// Updater for the currently running executable.
    pub fn new(
        transfer: &'a TransferEngine,
        config: &'a AgentConfig,
    ) -> Result<Self, SelfUpdateError> {
        let exe = std::env::current_exe().map_err(SelfUpdateError::CurrentExe)?;
        Ok(Self::for_executable(transfer, config, exe))
    }

    pub fn for_executable(
        transfer: &'a TransferEngine,
        config: &'a AgentConfig,
        exe: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transfer,
            config,
            exe: exe.into(),
        }
    }

    pub fn check(&self) -> Result<SelfUpdateOutcome, SelfUpdateError> {
        let name = &self.config.self_update_name;
        let url = self.config.file_url(name);
        if !self.transfer.is_published(&url) {
            debug!(name = %name, "no agent build published");
            return Ok(SelfUpdateOutcome::UpToDate);
        }

        let current = digest::digest_file(&self.exe).ok();
        if let (Some(current), Ok(remote)) = (
            current.as_deref(),
            self.transfer
                .get_json::<DigestResponse>(&self.config.digest_url(name)),
        ) {
            if remote.sha256.eq_ignore_ascii_case(current) {
                debug!("agent already matches published build");
                return Ok(SelfUpdateOutcome::UpToDate);
            }
        }

        let staged = paths::with_suffix(&self.exe, ".new");
        // A leftover .new may belong to an older build; never resume into it.
        if staged.exists() {
            std::fs::remove_file(&staged)?;
        }
        info!(url = %url, staged = %staged.display(), "downloading new agent build");
        self.transfer.fetch(&url, &staged)?;

        // Without a published digest, compare the download itself.
        if current.is_some() && digest::digest_file(&staged).ok() == current {
            std::fs::remove_file(&staged)?;
            debug!("downloaded build is identical to the running one");
            return Ok(SelfUpdateOutcome::UpToDate);
        }

        mark_executable(&staged)?;
        self.swap(&staged)?;
        info!(exe = %self.exe.display(), "agent executable replaced");
        Ok(SelfUpdateOutcome::Replaced {
            exe: self.exe.clone(),
        })
    }

    fn swap(&self, staged: &Path) -> Result<(), SelfUpdateError> {
        let old = paths::with_suffix(&self.exe, ".old");
        if old.exists() {
            std::fs::remove_file(&old)?;
        }
        rename(&self.exe, &old)?;
        if let Err(e) = rename(staged, &self.exe) {
            error!(error = %e, "could not move new build into place, restoring");
            if let Err(restore) = std::fs::rename(&old, &self.exe) {
                error!(error = %restore, old = %old.display(), "restore failed");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Start the replaced executable with `args`. The caller exits
    /// afterwards.
    pub fn relaunch(&self, args: &[String]) -> Result<(), SelfUpdateError> {
        Command::new(&self.exe)
            .args(args)
            .spawn()
            .map_err(|source| SelfUpdateError::Relaunch {
                exe: self.exe.clone(),
                source,
            })?;
        info!(exe = %self.exe.display(), "relaunched new agent build");
        Ok(())
    }
}

fn rename(from: &Path, to: &Path) -> Result<(), SelfUpdateError> {
    std::fs::rename(from, to).map_err(|source| SelfUpdateError::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn mark_executable(path: &Path) -> std::io::Result<()> {
    if !path.is_file() {
        tracing::warn!(path = %path.display(), "staged build missing");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn engine() -> TransferEngine {
        TransferEngine::new(Duration::from_secs(5), Duration::from_secs(5)).unwrap()
    }

    fn config(server: &mockito::Server) -> AgentConfig {
        AgentConfig {
            server_url: server.url(),
            self_update_name: "agent-next".into(),
            ..AgentConfig::default()
        }
    }

    #[test]
    fn nothing_published_is_up_to_date() {
        let server = mockito::Server::new();
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("agent");
        std::fs::write(&exe, b"v1").unwrap();
        let (t, c) = (engine(), config(&server));

        let outcome = SelfUpdater::for_executable(&t, &c, &exe).check().unwrap();
        assert_eq!(outcome, SelfUpdateOutcome::UpToDate);
        assert_eq!(std::fs::read(&exe).unwrap(), b"v1");
    }

    #[test]
    fn matching_published_digest_skips_download() {
        let mut server = mockito::Server::new();
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("agent");
        std::fs::write(&exe, b"v1").unwrap();
        let sha = digest::digest_file(&exe).unwrap();
        let _head = server
            .mock("HEAD", "/files/agent-next")
            .with_status(200)
            .create();
        let _sha = server
            .mock("GET", "/api/file-sha/agent-next")
            .with_body(format!(r#"{{"file":"agent-next","sha256":"{sha}","size":2}}"#))
            .create();
        let get = server.mock("GET", "/files/agent-next").expect(0).create();
        let (t, c) = (engine(), config(&server));

        let outcome = SelfUpdater::for_executable(&t, &c, &exe).check().unwrap();
        assert_eq!(outcome, SelfUpdateOutcome::UpToDate);
        get.assert();
    }

    #[test]
    fn new_build_replaces_executable_and_keeps_old() {
        let mut server = mockito::Server::new();
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("agent");
        std::fs::write(&exe, b"v1").unwrap();
        std::fs::write(dir.path().join("agent.old"), b"v0").unwrap();
        std::fs::write(dir.path().join("agent.new"), b"half of something").unwrap();
        let _head = server
            .mock("HEAD", "/files/agent-next")
            .with_status(200)
            .create();
        let _get = server
            .mock("GET", "/files/agent-next")
            .with_status(200)
            .with_body("v2")
            .create();
        let (t, c) = (engine(), config(&server));

        let outcome = SelfUpdater::for_executable(&t, &c, &exe).check().unwrap();
        assert_eq!(outcome, SelfUpdateOutcome::Replaced { exe: exe.clone() });
        assert_eq!(std::fs::read(&exe).unwrap(), b"v2");
        assert_eq!(std::fs::read(dir.path().join("agent.old")).unwrap(), b"v1");
        assert!(!dir.path().join("agent.new").exists());
    }

    #[test]
    fn identical_download_is_discarded() {
        let mut server = mockito::Server::new();
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("agent");
        std::fs::write(&exe, b"v1").unwrap();
        let _head = server
            .mock("HEAD", "/files/agent-next")
            .with_status(200)
            .create();
        let _get = server
            .mock("GET", "/files/agent-next")
            .with_status(200)
            .with_body("v1")
            .create();
        let (t, c) = (engine(), config(&server));

        let outcome = SelfUpdater::for_executable(&t, &c, &exe).check().unwrap();
        assert_eq!(outcome, SelfUpdateOutcome::UpToDate);
        assert!(!dir.path().join("agent.new").exists());
        assert!(!dir.path().join("agent.old").exists());
    }

    #[test]
    fn failed_download_leaves_executable_alone() {
        let mut server = mockito::Server::new();
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("agent");
        std::fs::write(&exe, b"v1").unwrap();
        let _head = server
            .mock("HEAD", "/files/agent-next")
            .with_status(200)
            .create();
        let _get = server
            .mock("GET", "/files/agent-next")
            .with_status(503)
            .create();
        let (t, c) = (engine(), config(&server));

        let err = SelfUpdater::for_executable(&t, &c, &exe)
            .check()
            .unwrap_err();
        assert!(matches!(err, SelfUpdateError::Download(_)));
        assert_eq!(std::fs::read(&exe).unwrap(), b"v1");
        assert!(!dir.path().join("agent.old").exists());
    }

    #[test]
    fn failed_swap_restores_running_executable() {
        let server = mockito::Server::new();
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("agent");
        std::fs::write(&exe, b"v1").unwrap();
        let (t, c) = (engine(), config(&server));
        let updater = SelfUpdater::for_executable(&t, &c, &exe);

        // The staged build vanished, so moving it into place fails after the
        // running executable was already moved aside.
        let err = updater.swap(&dir.path().join("agent.new")).unwrap_err();

        match err {
            SelfUpdateError::Rename { to, .. } => assert_eq!(to, exe),
            other => panic!("expected rename error, got {other:?}"),
        }
        assert_eq!(std::fs::read(&exe).unwrap(), b"v1");
        assert!(!dir.path().join("agent.old").exists());
    }
}
