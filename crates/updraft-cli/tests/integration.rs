#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

fn updraft(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("updraft").unwrap();
    cmd.current_dir(dir.path())
        .env("UPDRAFT_CONFIG", dir.path().join("updraft.yaml"))
        .env_remove("RUST_LOG");
    cmd
}

/// Config pointing at a port nothing listens on, with all state in `dir`.
fn offline_config(dir: &TempDir) {
    let config = serde_yaml::to_string(&serde_yaml::Value::Mapping(
        [
            ("server_url", "http://127.0.0.1:9/".to_string()),
            ("install_dir", dir.path().join("app/Debug").display().to_string()),
            ("staging_dir", dir.path().join("staging").display().to_string()),
            ("state_dir", dir.path().join("state").display().to_string()),
            ("identity_file", dir.path().join("identity.yaml").display().to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect(),
    ))
    .unwrap();
    std::fs::write(dir.path().join("updraft.yaml"), config).unwrap();
    std::fs::create_dir_all(dir.path().join("state")).unwrap();
    std::fs::write(dir.path().join("state/firstrun.flag"), "done").unwrap();
}

// ---------------------------------------------------------------------------
// updraft --help
// ---------------------------------------------------------------------------

#[test]
fn help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    updraft(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("agent"))
        .stdout(predicate::str::contains("cycle"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("fetch"))
        .stdout(predicate::str::contains("digest"));
}

// ---------------------------------------------------------------------------
// updraft digest
// ---------------------------------------------------------------------------

#[test]
fn digest_prints_sha256() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("abc.txt"), b"abc").unwrap();

    updraft(&dir)
        .args(["digest", "abc.txt"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(ABC_SHA256));
}

#[test]
fn digest_json_includes_size() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("abc.txt"), b"abc").unwrap();

    let out = updraft(&dir)
        .args(["--json", "digest", "abc.txt"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["sha256"], ABC_SHA256);
    assert_eq!(json["size"], 3);
}

#[test]
fn digest_of_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    updraft(&dir)
        .args(["digest", "nope.bin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: cannot hash"));
}

// ---------------------------------------------------------------------------
// updraft cycle
// ---------------------------------------------------------------------------

#[test]
fn cycle_off_schedule_is_idle() {
    let dir = TempDir::new().unwrap();
    offline_config(&dir);

    updraft(&dir)
        .args(["cycle", "--on", "2024-06-05"])
        .assert()
        .success()
        .stdout(predicate::str::contains("idle: not the scheduled day"))
        .stdout(predicate::str::contains(
            "DebugSocietyManager_Porbandar_05062024.zip",
        ));
    assert!(!dir.path().join("app").exists());
}

#[test]
fn cycle_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("updraft.yaml"), "scheduled_day: 40\n").unwrap();

    updraft(&dir)
        .arg("cycle")
        .assert()
        .failure()
        .stderr(predicate::str::contains("scheduled_day"));
}

// ---------------------------------------------------------------------------
// updraft fetch / serve
// ---------------------------------------------------------------------------

#[test]
fn fetch_from_unreachable_server_fails() {
    let dir = TempDir::new().unwrap();
    offline_config(&dir);

    updraft(&dir)
        .args(["fetch", "http://127.0.0.1:9/files/a.zip", "a.zip"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: fetch"));
}

#[test]
fn serve_requires_both_admin_credentials() {
    let dir = TempDir::new().unwrap();
    updraft(&dir)
        .args(["serve", "--port", "0", "--admin-user", "admin"])
        .env_remove("ADMIN_PASS")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--admin-pass"));
}
