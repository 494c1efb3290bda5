//! Client-side update loop.
//!
//! One cycle:
//!
//! ```text
//! identity ─▶ artifact name ─▶ force check ─▶ decide ─┬─ Idle
//!                                                     └─ Attempt ─▶ [exists?] ─▶ fetch ─▶ verify ─▶ apply
//!                                                                     │
//!                                                      markers ◀──────┴──▶ history (+ push)
//! ─▶ history sync sweep ─▶ next wake
//! ```
//!
//! Every cycle error is caught by [`UpdateOrchestrator::tick`], logged, and
//! answered with a shorter backoff. The loop never exits on its own.

pub mod decision;
pub mod scheduler;

pub use decision::{decide, Decision, Plan, Trigger};
pub use scheduler::{Clock, CycleEnd, ManualClock, Scheduler, SystemClock};

use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::apply::ApplyEngine;
use crate::config::AgentConfig;
use crate::digest;
use crate::error::{Result, TransferError};
use crate::history::HistoryStore;
use crate::identity::{FileIdentitySource, IdentitySource};
use crate::markers::{FileMarkerStore, MarkerStore};
use crate::paths;
use crate::report::{DigestResponse, LogReport};
use crate::rollout::RolloutSignal;
use crate::transfer::TransferEngine;
use crate::types::{ArtifactReference, ClientIdentity, UpdateEvent, UpdateStatus};

// ---------------------------------------------------------------------------
// Stage outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transfer,
    Integrity,
    Apply,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Transfer => "transfer",
            FailureKind::Integrity => "integrity",
            FailureKind::Apply => "apply",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Success,
    Failed(FailureKind, String),
    Skipped(String),
}

impl StageOutcome {
    fn failed(kind: FailureKind, err: impl fmt::Display) -> Self {
        StageOutcome::Failed(kind, err.to_string())
    }

    pub fn status(&self) -> UpdateStatus {
        match self {
            StageOutcome::Success => UpdateStatus::Success,
            StageOutcome::Failed(..) => UpdateStatus::Failed,
            StageOutcome::Skipped(_) => UpdateStatus::Skipped,
        }
    }

    /// Error text stored with the event.
    pub fn detail(&self) -> Option<String> {
        match self {
            StageOutcome::Success => None,
            StageOutcome::Failed(kind, detail) => Some(format!("{kind}: {detail}")),
            StageOutcome::Skipped(reason) => Some(reason.clone()),
        }
    }
}

/// What one cycle saw and did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub identity: ClientIdentity,
    pub artifact: ArtifactReference,
    pub decision: Decision,
    pub outcome: Option<StageOutcome>,
    pub synced: usize,
}

// ---------------------------------------------------------------------------
// UpdateOrchestrator
// ---------------------------------------------------------------------------

pub struct UpdateOrchestrator {
    config: AgentConfig,
    transfer: TransferEngine,
    apply: ApplyEngine,
    identity: Box<dyn IdentitySource>,
    markers: Box<dyn MarkerStore>,
    history: HistoryStore,
    clock: Arc<dyn Clock>,
    scheduler: Scheduler,
    machine: String,
}

impl UpdateOrchestrator {
    pub fn new(
        config: AgentConfig,
        transfer: TransferEngine,
        identity: Box<dyn IdentitySource>,
        markers: Box<dyn MarkerStore>,
        history: HistoryStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            apply: ApplyEngine::from_config(&config),
            scheduler: Scheduler::new(config.cycle_interval(), config.error_backoff()),
            machine: config.machine(),
            config,
            transfer,
            identity,
            markers,
            history,
            clock,
        }
    }

    /// Wire the file-backed ports named by `config`.
    pub fn from_config(config: AgentConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let transfer = TransferEngine::from_config(&config)?;
        let identity = Box::new(FileIdentitySource::new(config.identity_file.clone()));
        let markers = Box::new(FileMarkerStore::new(config.state_dir.clone()));
        let history = HistoryStore::open(&paths::history_db(&config.state_dir))?;
        Ok(Self::new(config, transfer, identity, markers, history, clock))
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn transfer(&self) -> &TransferEngine {
        &self.transfer
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    // -----------------------------------------------------------------------
    // Loop
    // -----------------------------------------------------------------------

    /// Block until the agent should start: an optional fixed delay, then a
    /// bounded wait for the server's health endpoint. Returns whether the
    /// server answered; the agent starts either way.
    pub fn wait_for_startup(&self) -> bool {
        let delay = Duration::from_secs(self.config.startup_delay_secs);
        if !delay.is_zero() {
            info!(secs = delay.as_secs(), "startup delay");
            self.sleep_for(delay);
        }

        let attempts = self.config.connectivity_attempts;
        if attempts == 0 {
            return true;
        }
        let url = self.config.health_url();
        let interval = Duration::from_secs(self.config.connectivity_interval_secs);
        for attempt in 1..=attempts {
            if self.transfer.is_published(&url) {
                info!(attempt, "delivery server reachable");
                return true;
            }
            debug!(attempt, attempts, "delivery server not reachable yet");
            if attempt < attempts {
                self.sleep_for(interval);
            }
        }
        warn!(attempts, "delivery server unreachable, starting anyway");
        false
    }

    /// Run one cycle, absorbing any error. Returns the next wake time.
    pub fn tick(&self) -> NaiveDateTime {
        let end = match self.run_cycle() {
            Ok(report) => {
                debug!(artifact = %report.artifact.file_name, synced = report.synced, "cycle complete");
                CycleEnd::Completed
            }
            Err(e) => {
                error!(error = %e, "update cycle failed");
                CycleEnd::Errored
            }
        };
        self.scheduler.next_wake(self.clock.now(), end)
    }

    pub fn run_forever(&self) -> ! {
        loop {
            let wake = self.tick();
            info!(%wake, "next update check");
            self.clock.sleep_until(wake);
        }
    }

    fn sleep_for(&self, wait: Duration) {
        self.clock.sleep_until(scheduler::add(self.clock.now(), wait));
    }

    // -----------------------------------------------------------------------
    // Cycle
    // -----------------------------------------------------------------------

    pub fn run_cycle(&self) -> Result<CycleReport> {
        let today = self.clock.now().date();
        let identity = self.resolve_identity();
        let mut artifact =
            ArtifactReference::for_day(&self.config.artifact_prefix, &identity.group, today);
        let state = self.markers.load()?;

        let force = RolloutSignal::new(&self.transfer, &self.config).should_force(
            &identity,
            state.last_forced_on,
            today,
        );
        let decision = decide(
            &state,
            &force,
            today,
            self.config.scheduled_day,
            &artifact.file_name,
        );

        let outcome = match &decision {
            Decision::Idle(reason) => {
                debug!(artifact = %artifact.file_name, reason, "no update this cycle");
                None
            }
            Decision::Attempt(plan) => Some(self.attempt(&identity, &mut artifact, plan, today)?),
        };

        let synced = self.sync_history()?;
        Ok(CycleReport {
            identity,
            artifact,
            decision,
            outcome,
            synced,
        })
    }

    fn resolve_identity(&self) -> ClientIdentity {
        match self.identity.read() {
            Some(mut identity) => {
                if identity.group.trim().is_empty() {
                    identity.group = self.config.default_group.clone();
                }
                identity
            }
            None => {
                warn!(
                    group = %self.config.default_group,
                    "identity unavailable, using fallback"
                );
                ClientIdentity::fallback(&self.config.default_group)
            }
        }
    }

    fn attempt(
        &self,
        identity: &ClientIdentity,
        artifact: &mut ArtifactReference,
        plan: &Plan,
        today: NaiveDate,
    ) -> Result<StageOutcome> {
        let name = artifact.file_name.clone();
        let name = name.as_str();
        let url = self.config.file_url(name);
        info!(artifact = name, trigger = ?plan.trigger, "update eligible");

        let outcome = if plan.check_first && !self.transfer.is_published(&url) {
            info!(artifact = name, "no bundle published");
            StageOutcome::Skipped("File not found".to_string())
        } else {
            self.record(identity, name, UpdateStatus::Started, None, false)?;
            self.run_stages(identity, artifact, &url)
        };

        if plan.forced.is_some() {
            self.markers.record_forced_on(today)?;
        }
        if outcome == StageOutcome::Success {
            self.markers.mark_first_run_done()?;
            self.markers.record_applied(name)?;
        }
        self.record(identity, name, outcome.status(), outcome.detail(), true)?;
        Ok(outcome)
    }

    fn run_stages(
        &self,
        identity: &ClientIdentity,
        artifact: &mut ArtifactReference,
        url: &str,
    ) -> StageOutcome {
        let name = artifact.file_name.clone();
        let name = name.as_str();
        let staged = self.config.staged_artifact(name);

        match self.transfer.fetch(url, &staged) {
            Ok(state) => artifact.size = state.total.or(Some(state.bytes_on_disk)),
            Err(e) => {
                warn!(artifact = name, error = %e, "download failed");
                return StageOutcome::failed(FailureKind::Transfer, e);
            }
        }

        if self.config.verify_digest {
            if let Some(failed) = self.verify(artifact, &staged) {
                discard(&staged);
                return failed;
            }
        }

        match self.apply.apply(&staged, &identity.group, self.clock.now()) {
            Ok(report) => {
                info!(
                    artifact = name,
                    size = ?artifact.size,
                    sha256 = ?artifact.digest,
                    files = report.files,
                    launched = report.launched,
                    "update applied"
                );
                StageOutcome::Success
            }
            Err(e) => {
                error!(artifact = name, error = %e, "apply failed");
                discard(&staged);
                StageOutcome::failed(FailureKind::Apply, e)
            }
        }
    }

    /// Compare against the server's digest and keep it on the reference.
    /// A server that cannot produce one does not block the update.
    fn verify(&self, artifact: &mut ArtifactReference, staged: &Path) -> Option<StageOutcome> {
        let name = artifact.file_name.clone();
        let name = name.as_str();
        match self
            .transfer
            .get_json::<DigestResponse>(&self.config.digest_url(name))
        {
            Ok(remote) => match digest::verify_file(staged, &remote.sha256) {
                Ok(()) => {
                    debug!(artifact = name, "digest verified");
                    artifact.digest = Some(remote.sha256);
                    None
                }
                Err(e) => {
                    error!(artifact = name, error = %e, "integrity check failed");
                    Some(StageOutcome::failed(FailureKind::Integrity, e))
                }
            },
            Err(e) => {
                warn!(artifact = name, error = %e, "digest unavailable, skipping verification");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    fn record(
        &self,
        identity: &ClientIdentity,
        artifact: &str,
        status: UpdateStatus,
        error: Option<String>,
        push: bool,
    ) -> Result<()> {
        let event = UpdateEvent {
            identity: identity.clone(),
            artifact: artifact.to_string(),
            status,
            error,
            at: self.clock.now(),
        };
        let id = self.history.append(&event)?;
        if push {
            match self.push(&event) {
                Ok(()) => {
                    self.history.mark_delivered(id)?;
                }
                Err(e) => warn!(%status, error = %e, "status report not delivered, will retry"),
            }
        }
        Ok(())
    }

    /// Push undelivered records oldest first, stopping at the first failure.
    /// Returns how many were delivered.
    pub fn sync_history(&self) -> Result<usize> {
        let pending = self.history.undelivered()?;
        let mut delivered = 0;
        for record in &pending {
            match self.push(&record.event) {
                Ok(()) => {
                    self.history.mark_delivered(record.id)?;
                    delivered += 1;
                }
                Err(e) => {
                    warn!(
                        remaining = pending.len() - delivered,
                        error = %e,
                        "history sync interrupted"
                    );
                    break;
                }
            }
        }
        if delivered > 0 {
            info!(delivered, "history synced");
        }
        Ok(delivered)
    }

    fn push(&self, event: &UpdateEvent) -> std::result::Result<(), TransferError> {
        self.transfer.post_json(
            &self.config.log_url(),
            &LogReport::from_event(event, &self.machine),
        )
    }
}

fn discard(staged: &Path) {
    if let Err(e) = std::fs::remove_file(staged) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %staged.display(), error = %e, "could not discard staged artifact");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpdraftError;
    use crate::markers::CycleState;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const ARTIFACT_PATH: &str = "/files/DebugSocietyManager_Porbandar_02062024.zip";

    fn june(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn bundle() -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("app.txt", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"new version").unwrap();
        zip.finish().unwrap().into_inner()
    }

    struct Harness {
        dir: TempDir,
        clock: Arc<ManualClock>,
        orch: UpdateOrchestrator,
    }

    impl Harness {
        fn new(server: &mockito::Server, start: NaiveDateTime) -> Self {
            let dir = TempDir::new().unwrap();
            let config = AgentConfig {
                server_url: server.url(),
                install_dir: dir.path().join("app/Debug"),
                staging_dir: dir.path().join("staging"),
                state_dir: dir.path().join("state"),
                machine_name: Some("PC1".into()),
                startup_delay_secs: 0,
                connectivity_attempts: 0,
                ..AgentConfig::default()
            };
            let clock = Arc::new(ManualClock::new(start));
            let orch = UpdateOrchestrator::new(
                config.clone(),
                TransferEngine::new(Duration::from_secs(5), Duration::from_secs(5)).unwrap(),
                Box::new(ClientIdentity::new("S1", "Society One", "Porbandar")),
                Box::new(FileMarkerStore::new(&config.state_dir)),
                HistoryStore::open_in_memory().unwrap(),
                clock.clone(),
            );
            Self { dir, clock, orch }
        }

        fn markers(&self) -> FileMarkerStore {
            FileMarkerStore::new(self.dir.path().join("state"))
        }

        fn statuses(&self) -> Vec<UpdateStatus> {
            let mut v: Vec<UpdateStatus> = self
                .orch
                .history()
                .recent(50)
                .unwrap()
                .into_iter()
                .map(|r| r.event.status)
                .collect();
            v.reverse();
            v
        }
    }

    fn accept_logs(server: &mut mockito::Server) -> mockito::Mock {
        server
            .mock("POST", "/api/log")
            .with_status(200)
            .with_body(r#"{"success":true}"#)
            .create()
    }

    #[test]
    fn first_run_with_missing_artifact_fails_without_existence_check() {
        let mut server = mockito::Server::new();
        let path = "/files/DebugSocietyManager_Porbandar_17062024.zip";
        let head = server.mock("HEAD", path).expect(0).create();
        let _get = server.mock("GET", path).with_status(404).create();
        let _log = accept_logs(&mut server);

        let h = Harness::new(&server, june(17, 9));
        let report = h.orch.run_cycle().unwrap();

        head.assert();
        assert!(matches!(
            report.outcome,
            Some(StageOutcome::Failed(FailureKind::Transfer, _))
        ));
        assert_eq!(
            h.statuses(),
            vec![UpdateStatus::Started, UpdateStatus::Failed]
        );
        assert!(!h.markers().load().unwrap().first_run_done);
        assert_eq!(h.orch.history().count_undelivered().unwrap(), 0);
    }

    #[test]
    fn scheduled_day_checks_fetches_verifies_and_applies() {
        let data = bundle();
        let sha = digest::digest_reader(&data[..]).unwrap();
        let mut server = mockito::Server::new();
        let head = server
            .mock("HEAD", ARTIFACT_PATH)
            .with_status(200)
            .expect(1)
            .create();
        let _get = server
            .mock("GET", ARTIFACT_PATH)
            .with_status(200)
            .with_body(&data)
            .create();
        let _sha = server
            .mock(
                "GET",
                "/api/file-sha/DebugSocietyManager_Porbandar_02062024.zip",
            )
            .with_status(200)
            .with_body(format!(
                r#"{{"file":"x","sha256":"{sha}","size":{}}}"#,
                data.len()
            ))
            .create();
        let _log = accept_logs(&mut server);

        let h = Harness::new(&server, june(2, 9));
        h.markers().mark_first_run_done().unwrap();
        let report = h.orch.run_cycle().unwrap();

        head.assert();
        assert_eq!(report.outcome, Some(StageOutcome::Success));
        assert_eq!(report.artifact.size, Some(data.len() as u64));
        assert_eq!(report.artifact.digest.as_deref(), Some(sha.as_str()));
        assert_eq!(
            std::fs::read(h.dir.path().join("app/Debug/app.txt")).unwrap(),
            b"new version"
        );
        let state = h.markers().load().unwrap();
        assert_eq!(
            state.last_applied.as_deref(),
            Some("DebugSocietyManager_Porbandar_02062024.zip")
        );
        assert_eq!(state.last_forced_on, None);
        assert_eq!(
            h.statuses(),
            vec![UpdateStatus::Started, UpdateStatus::Success]
        );
        assert_eq!(h.orch.history().count_undelivered().unwrap(), 0);

        // Later the same day the applied artifact is not attempted again.
        h.clock.set(june(2, 15));
        let again = h.orch.run_cycle().unwrap();
        assert_eq!(again.decision, Decision::Idle("artifact already applied"));
    }

    #[test]
    fn scheduled_day_without_bundle_is_skipped() {
        let mut server = mockito::Server::new();
        let _head = server.mock("HEAD", ARTIFACT_PATH).with_status(404).create();
        let get = server.mock("GET", ARTIFACT_PATH).expect(0).create();
        let _log = accept_logs(&mut server);

        let h = Harness::new(&server, june(2, 9));
        h.markers().mark_first_run_done().unwrap();
        let report = h.orch.run_cycle().unwrap();

        get.assert();
        assert_eq!(
            report.outcome,
            Some(StageOutcome::Skipped("File not found".into()))
        );
        assert_eq!(h.statuses(), vec![UpdateStatus::Skipped]);
    }

    #[test]
    fn forced_cycle_is_suppressed_for_the_rest_of_the_day() {
        let path = "/files/DebugSocietyManager_Porbandar_05062024.zip";
        let data = bundle();
        let mut server = mockito::Server::new();
        let _flag = server
            .mock("HEAD", "/files/global_force.flag")
            .with_status(200)
            .create();
        let _get = server
            .mock("GET", path)
            .with_status(200)
            .with_body(&data)
            .expect(1)
            .create();
        let _sha = server
            .mock(
                "GET",
                "/api/file-sha/DebugSocietyManager_Porbandar_05062024.zip",
            )
            .with_status(200)
            .with_body(format!(
                r#"{{"file":"x","sha256":"{}","size":1}}"#,
                "0".repeat(64)
            ))
            .create();
        let _log = accept_logs(&mut server);

        let h = Harness::new(&server, june(5, 9));
        h.markers().mark_first_run_done().unwrap();

        let first = h.orch.run_cycle().unwrap();
        assert!(matches!(
            first.outcome,
            Some(StageOutcome::Failed(FailureKind::Integrity, _))
        ));
        assert!(!h
            .dir
            .path()
            .join("staging/DebugSocietyManager_Porbandar_05062024.zip")
            .exists());
        assert!(!h.dir.path().join("app/Debug").exists());
        assert_eq!(
            h.markers().load().unwrap().last_forced_on,
            Some(june(5, 9).date())
        );

        h.clock.set(june(5, 9) + chrono::Duration::minutes(30));
        let second = h.orch.run_cycle().unwrap();
        assert_eq!(
            second.decision,
            Decision::Idle("forced update already ran today")
        );
        assert_eq!(second.outcome, None);
    }

    #[test]
    fn undelivered_history_is_swept_once_server_accepts() {
        let mut server = mockito::Server::new();
        let path = "/files/DebugSocietyManager_Porbandar_17062024.zip";
        let _get = server.mock("GET", path).with_status(404).create();
        let refusing = server.mock("POST", "/api/log").with_status(500).create();

        let h = Harness::new(&server, june(17, 9));
        let report = h.orch.run_cycle().unwrap();
        assert_eq!(report.synced, 0);
        assert_eq!(h.orch.history().count_undelivered().unwrap(), 2);

        refusing.remove();
        let accepting = server
            .mock("POST", "/api/log")
            .with_status(200)
            .with_body(r#"{"success":true}"#)
            .expect(2)
            .create();
        assert_eq!(h.orch.sync_history().unwrap(), 2);
        assert_eq!(h.orch.sync_history().unwrap(), 0);
        accepting.assert();
    }

    #[test]
    fn empty_group_falls_back_to_default() {
        let server = mockito::Server::new();
        let dir = TempDir::new().unwrap();
        let config = AgentConfig {
            server_url: server.url(),
            default_group: "Sabar".into(),
            state_dir: dir.path().join("state"),
            ..AgentConfig::default()
        };
        let orch = UpdateOrchestrator::new(
            config.clone(),
            TransferEngine::new(Duration::from_secs(5), Duration::from_secs(5)).unwrap(),
            Box::new(ClientIdentity::new("S9", "Nine", " ")),
            Box::new(FileMarkerStore::new(&config.state_dir)),
            HistoryStore::open_in_memory().unwrap(),
            Arc::new(ManualClock::new(june(3, 9))),
        );
        assert_eq!(orch.resolve_identity().group, "Sabar");
    }

    struct BrokenMarkers;

    impl MarkerStore for BrokenMarkers {
        fn load(&self) -> Result<CycleState> {
            Err(UpdraftError::InvalidConfig("state dir gone".into()))
        }
        fn mark_first_run_done(&self) -> Result<()> {
            Ok(())
        }
        fn record_forced_on(&self, _: NaiveDate) -> Result<()> {
            Ok(())
        }
        fn record_applied(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn tick_backs_off_after_error_and_waits_full_interval_otherwise() {
        let server = mockito::Server::new();
        let mut h = Harness::new(&server, june(3, 9));
        h.markers().mark_first_run_done().unwrap();
        assert_eq!(
            h.orch.tick(),
            june(3, 9) + chrono::Duration::minutes(30)
        );

        h.orch.markers = Box::new(BrokenMarkers);
        assert_eq!(h.orch.tick(), june(3, 9) + chrono::Duration::minutes(5));
    }

    #[test]
    fn startup_gate_gives_up_after_bounded_attempts() {
        let server = mockito::Server::new();
        let mut h = Harness::new(&server, june(3, 9));
        h.orch.config.startup_delay_secs = 300;
        h.orch.config.connectivity_attempts = 3;
        h.orch.config.connectivity_interval_secs = 20;

        assert!(!h.orch.wait_for_startup());
        assert_eq!(
            h.clock.now(),
            june(3, 9) + chrono::Duration::seconds(300 + 2 * 20)
        );
    }

    #[test]
    fn startup_gate_returns_once_health_answers() {
        let mut server = mockito::Server::new();
        let _health = server.mock("HEAD", "/health").with_status(200).create();
        let mut h = Harness::new(&server, june(3, 9));
        h.orch.config.connectivity_attempts = 90;

        assert!(h.orch.wait_for_startup());
        assert_eq!(h.clock.now(), june(3, 9));
    }
}
