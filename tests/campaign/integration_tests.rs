use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fuzzman::types::{AppError, SpawnError};
use fuzzman::{Campaign, CampaignSettings};
use nix::sys::signal::Signal;
use pretty_assertions::assert_eq;
use tempfile::{TempDir, tempdir};

/// Writes a stats file the way the fuzzer would, then keeps printing
const FAKE_FUZZER: &str = r#"#!/bin/sh
out=""
name=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
    -M|-S) name="$2"; shift ;;
    --) break ;;
  esac
  shift
done
mkdir -p "$out/$name"
now=$(date +%s)
cat > "$out/$name/fuzzer_stats" <<STATS
start_time        : $now
execs_done        : 1000
corpus_count      : 10
corpus_found      : 4
saved_crashes     : 1
saved_hangs       : 0
last_find         : $now
last_crash        : $now
last_hang         : 0
STATS
while true; do
  echo "$name alive"
  sleep 0.1
done
"#;

fn executable(path: &Path, body: &str) -> PathBuf {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

fn settings(tmp: &TempDir) -> CampaignSettings {
    let fuzzer = executable(&tmp.path().join("fake-fuzz"), FAKE_FUZZER);
    let target = executable(&tmp.path().join("app"), "#!/bin/sh\nexit 0\n");
    CampaignSettings {
        fuzzer_binary: fuzzer.to_string_lossy().to_string(),
        input_dir: tmp.path().join("in"),
        output_dir: tmp.path().join("out"),
        program: vec![target.to_string_lossy().to_string(), "@@".to_string()],
        instances: Some(3),
        ..Default::default()
    }
}

#[test]
fn single_program_plan() {
    let tmp = tempdir().unwrap();
    let campaign = Campaign::new(settings(&tmp));
    let plans = campaign.plan_workers().unwrap();

    assert_eq!(
        plans.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        vec!["m1", "s2", "s3"]
    );
    assert!(plans.iter().all(|p| p.group.is_none()));
    assert!(plans[0].argv.windows(2).any(|w| w == ["-M", "m1"]));
    assert!(plans[2].argv.windows(2).any(|w| w == ["-S", "s3"]));
    assert_eq!(plans[1].argv.last().map(String::as_str), Some("@@"));
}

#[test]
fn builds_plan_follows_allocation() {
    let tmp = tempdir().unwrap();
    for dir in ["plain", "asan"] {
        fs::create_dir(tmp.path().join(dir)).unwrap();
        executable(&tmp.path().join(dir).join("app"), "#!/bin/sh\nexit 0\n");
    }

    let mut settings = settings(&tmp);
    settings.instances = Some(4);
    settings.program = vec!["app".to_string()];
    settings.builds = vec![
        format!("plain:{}", tmp.path().join("plain").display()),
        format!("asan:{}:1", tmp.path().join("asan").display()),
    ];

    let plans = Campaign::new(settings).plan_workers().unwrap();
    let groups: Vec<_> = plans.iter().map(|p| p.group.as_deref()).collect();
    assert_eq!(
        groups,
        vec![Some("plain"), Some("plain"), Some("plain"), Some("asan")]
    );

    let asan_target = tmp.path().join("asan").join("app");
    assert_eq!(
        plans[3].argv.last().map(String::as_str),
        Some(asan_target.to_string_lossy().as_ref())
    );
}

#[test]
fn command_file_plan() {
    let tmp = tempdir().unwrap();
    let cmd_file = tmp.path().join("cmds.txt");
    fs::write(&cmd_file, "first : echo one\nsecond : echo two\n").unwrap();

    let mut settings = settings(&tmp);
    settings.cmd_file = Some(cmd_file);
    settings.instances = None;

    let plans = Campaign::new(settings).plan_workers().unwrap();
    assert_eq!(plans.len(), 2);
    assert_eq!(plans[1].name, "second");
    assert_eq!(plans[1].group.as_deref(), Some("custom"));
    assert_eq!(plans[1].argv, vec!["echo", "two"]);
}

#[test]
fn missing_program_is_reported() {
    let tmp = tempdir().unwrap();
    let mut settings = settings(&tmp);
    settings.program = vec![tmp.path().join("nope").to_string_lossy().to_string()];

    assert!(matches!(
        Campaign::new(settings).plan_workers(),
        Err(AppError::Spawn(SpawnError::ProgramNotFound(_)))
    ));
}

#[test]
fn directories_are_prepared() {
    let tmp = tempdir().unwrap();
    let mut settings = settings(&tmp);
    settings.cleanup = true;
    fs::create_dir_all(settings.output_dir.join("m1")).unwrap();

    let campaign = Campaign::new(settings.clone());
    campaign.prepare_directories().unwrap();

    assert_eq!(fs::read(settings.input_dir.join("1")).unwrap(), b"12345");
    assert!(!settings.output_dir.exists());

    // an existing corpus is left alone
    fs::remove_file(settings.input_dir.join("1")).unwrap();
    fs::write(settings.input_dir.join("seed"), b"x").unwrap();
    campaign.prepare_directories().unwrap();
    assert!(!settings.input_dir.join("1").exists());
}

#[tokio::test]
async fn missing_fuzzer_aborts_start() {
    let tmp = tempdir().unwrap();
    let mut settings = settings(&tmp);
    settings.fuzzer_binary = tmp.path().join("afl-none").to_string_lossy().to_string();

    let mut campaign = Campaign::new(settings);
    assert!(matches!(
        campaign.start().await,
        Err(AppError::Spawn(SpawnError::FuzzerNotFound(_)))
    ));
    assert!(campaign.workers().is_empty());
}

#[tokio::test]
async fn campaign_runs_and_stops() {
    let tmp = tempdir().unwrap();
    let mut settings = settings(&tmp);
    settings.instances = Some(2);
    let output_dir = settings.output_dir.clone();

    let mut campaign = Campaign::new(settings);
    campaign.start().await.unwrap();
    assert_eq!(campaign.workers().len(), 2);

    let stats_ready = |dir: &Path| {
        ["m1", "s2"]
            .iter()
            .all(|name| dir.join(name).join("fuzzer_stats").is_file())
    };
    for _ in 0..100 {
        if stats_ready(&output_dir) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    // give the script time to finish writing
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(campaign.health_check());
    let stats = campaign.collect_stats();
    assert_eq!(stats.workers_reporting, 2);
    assert_eq!(stats.execs_done, 2000);
    assert_eq!(stats.unique_crashes, 2);
    assert!(stats.newest_path.is_some());
    assert!(!campaign.job_status_check(true));

    assert!(campaign.workers()[0].output().len() > 0);

    campaign.stop(Signal::SIGINT).await;
    assert!(campaign.workers().is_empty());
    campaign.stop(Signal::SIGINT).await;
}
