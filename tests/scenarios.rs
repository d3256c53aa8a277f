//! End-to-end walkthroughs of the hub's main flows

mod common;

use std::sync::Arc;
use std::time::Duration;

use bloxpiece_hub_lib::bank::{BankError, BankStore};
use bloxpiece_hub_lib::status::{ServiceState, StatusPoller};
use bloxpiece_hub_lib::storage::BankFile;
use bloxpiece_hub_lib::updater::SelfUpdater;
use bloxpiece_hub_lib::version::{CheckOutcome, UpdatePhase, VersionInfo, VersionPoller};
use common::{RecordingRelauncher, StaticRemote};
use semver::Version;

const MAIN: &str = "Main Bank";

fn open_store(dir: &tempfile::TempDir) -> BankStore {
    BankStore::load(BankFile::new(dir.path().join("key_banks.json")), MAIN)
}

fn read_file(dir: &tempfile::TempDir) -> serde_json::Value {
    let raw = std::fs::read(dir.path().join("key_banks.json")).unwrap();
    serde_json::from_slice(&raw).unwrap()
}

#[test]
fn added_keys_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("key_banks.json"), r#"{"Main Bank": []}"#).unwrap();

    let store = open_store(&dir);
    assert_eq!(store.add_keys(MAIN, ["K1", "K2", "K3"]).unwrap(), 3);
    drop(store);

    let reloaded = open_store(&dir);
    assert_eq!(reloaded.keys(MAIN).unwrap(), vec!["K1", "K2", "K3"]);
}

#[test]
fn drawn_key_is_gone_from_memory_and_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.add_keys(MAIN, ["K1", "K2", "K3"]).unwrap();

    let key = store.draw_key(MAIN).unwrap();
    assert!(["K1", "K2", "K3"].contains(&key.as_str()));

    let remaining = store.keys(MAIN).unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(!remaining.contains(&key));

    let file = read_file(&dir);
    let on_disk = file[MAIN].as_array().unwrap();
    assert_eq!(on_disk.len(), 2);
    assert!(!on_disk.iter().any(|k| k == key.as_str()));
}

#[test]
fn rejected_operations_change_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store.create_bank("Alt").unwrap();
    let before = read_file(&dir);

    assert!(matches!(store.draw_key("Alt"), Err(BankError::EmptyBank(_))));
    assert!(matches!(store.create_bank("Alt"), Err(BankError::DuplicateName(_))));
    assert_eq!(store.bank_names(), vec!["Alt", MAIN]);
    assert_eq!(read_file(&dir), before);

    store.delete_bank("Alt").unwrap();
    assert!(matches!(store.delete_bank(MAIN), Err(BankError::LastBank(_))));
    assert_eq!(store.bank_names(), vec![MAIN]);
    assert_eq!(read_file(&dir), serde_json::json!({ "Main Bank": [] }));
}

#[tokio::test]
async fn status_document_drives_indicators() {
    let mut remote = StaticRemote::new();
    remote.status = Ok(r#"{"Arsenal":"online","BloxFruits":"offline"}"#.into());

    let poller = StatusPoller::new(Arc::new(remote), Duration::from_secs(120));
    poller.poll().await.unwrap();

    let snapshot = poller.snapshot();
    assert_eq!(snapshot.state("Arsenal"), ServiceState::Online);
    assert_eq!(snapshot.state("BloxFruits"), ServiceState::Offline);
    assert_eq!(snapshot.state("AutoFarm"), ServiceState::Unknown);
}

struct UpdateFixture {
    dir: tempfile::TempDir,
    target: std::path::PathBuf,
    relauncher: Arc<RecordingRelauncher>,
}

impl UpdateFixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("bloxpiece-hub");
        std::fs::write(&target, b"running 2.0.2").unwrap();
        Self {
            dir,
            target,
            relauncher: Arc::new(RecordingRelauncher::default()),
        }
    }

    fn poller(&self, remote: StaticRemote) -> VersionPoller {
        VersionPoller::with_current(
            Arc::new(remote),
            Arc::new(open_store(&self.dir)),
            SelfUpdater::new(&self.target, self.relauncher.clone()),
            Duration::from_secs(6 * 3600),
            VersionInfo::new(Version::new(2, 0, 2)),
        )
    }
}

#[tokio::test]
async fn older_remote_version_starts_no_update() {
    let fx = UpdateFixture::new();
    let mut remote = StaticRemote::new();
    remote.version = Ok("1.9.0".into());
    remote.artifact = Ok(b"should not be fetched".to_vec());
    let poller = fx.poller(remote);

    assert!(matches!(poller.check_once().await, Ok(CheckOutcome::UpToDate)));
    assert_eq!(std::fs::read(&fx.target).unwrap(), b"running 2.0.2");
    assert!(fx.relauncher.spawned.lock().unwrap().is_empty());
}

#[tokio::test]
async fn newer_remote_version_replaces_and_relaunches() {
    let fx = UpdateFixture::new();
    let mut remote = StaticRemote::new();
    remote.version = Ok("2.1.0".into());
    remote.artifact = Ok(b"running 2.1.0".to_vec());
    let poller = fx.poller(remote);

    let outcome = poller.check_once().await.unwrap();
    assert!(matches!(outcome, CheckOutcome::Relaunched(_)));
    assert_eq!(poller.phase(), UpdatePhase::Relaunching);
    assert_eq!(std::fs::read(&fx.target).unwrap(), b"running 2.1.0");
    assert_eq!(*fx.relauncher.spawned.lock().unwrap(), vec![fx.target.clone()]);
}

#[tokio::test]
async fn failed_download_keeps_running_program_identical() {
    let fx = UpdateFixture::new();
    let before = std::fs::read(&fx.target).unwrap();
    let mut remote = StaticRemote::new();
    remote.version = Ok("2.1.0".into());
    remote.artifact = Err(500);
    let poller = fx.poller(remote);

    assert!(poller.check_once().await.is_err());
    assert_eq!(poller.phase(), UpdatePhase::Idle);
    assert_eq!(std::fs::read(&fx.target).unwrap(), before);
    assert!(fx.relauncher.spawned.lock().unwrap().is_empty());
}
