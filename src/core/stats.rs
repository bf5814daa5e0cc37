use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::warn;
use strum::Display;

use crate::types::{CampaignStats, WorkerStats, WorkerSummary};

/// Raw `key: value` pairs of one `fuzzer_stats` file
pub type StatsMap = HashMap<String, String>;

/// Counters and timestamps the campaign reads from stats files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKey {
    LastPath,
    LastCrash,
    LastHang,
    PathsFound,
    PathsTotal,
    UniqueCrashes,
    UniqueHangs,
    ExecsDone,
}

/// Stats key naming: AFL and AFL++ before 4.00 vs. AFL++ 4.00 and later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StatsScheme {
    #[strum(serialize = "legacy")]
    Legacy,
    #[strum(serialize = "modern")]
    Modern,
}

impl StatsScheme {
    pub fn key(self, stat: StatKey) -> &'static str {
        match (self, stat) {
            (StatsScheme::Legacy, StatKey::LastPath) => "last_path",
            (StatsScheme::Modern, StatKey::LastPath) => "last_find",
            (_, StatKey::LastCrash) => "last_crash",
            (_, StatKey::LastHang) => "last_hang",
            (StatsScheme::Legacy, StatKey::PathsFound) => "paths_found",
            (StatsScheme::Modern, StatKey::PathsFound) => "corpus_found",
            (StatsScheme::Legacy, StatKey::PathsTotal) => "paths_total",
            (StatsScheme::Modern, StatKey::PathsTotal) => "corpus_count",
            (StatsScheme::Legacy, StatKey::UniqueCrashes) => "unique_crashes",
            (StatsScheme::Modern, StatKey::UniqueCrashes) => "saved_crashes",
            (StatsScheme::Legacy, StatKey::UniqueHangs) => "unique_hangs",
            (StatsScheme::Modern, StatKey::UniqueHangs) => "saved_hangs",
            (_, StatKey::ExecsDone) => "execs_done",
        }
    }

    fn detect(stats: &StatsMap) -> Option<Self> {
        is_legacy_schema(stats).map(|legacy| {
            if legacy {
                StatsScheme::Legacy
            } else {
                StatsScheme::Modern
            }
        })
    }
}

/// Split `key: value` lines at the first colon; lines without one are ignored
pub fn parse_stats(text: &str) -> StatsMap {
    text.lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Read a worker's stats file. Missing, unreadable or empty files yield `None`.
pub fn parse_stats_file(path: &Path) -> Option<StatsMap> {
    if !path.is_file() {
        warn!(
            "Wasn't able to get stats from '{}': no such file",
            path.display()
        );
        return None;
    }

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!("Wasn't able to read stats file '{}': {e}", path.display());
            return None;
        }
    };

    let stats = parse_stats(&text);
    if stats.is_empty() {
        warn!("Stats file '{}' is empty", path.display());
        return None;
    }
    Some(stats)
}

/// `Some(true)` for pre-4.00 key names, `Some(false)` for current ones,
/// `None` when the file doesn't tell yet.
pub fn is_legacy_schema(stats: &StatsMap) -> Option<bool> {
    if stats.is_empty() {
        return None;
    }
    if stats.contains_key("last_path") {
        return Some(true);
    }
    if stats.contains_key("last_find") {
        return Some(false);
    }
    None
}

fn counter(stats: &StatsMap, key: &str) -> u64 {
    stats
        .get(key)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
}

fn timestamp(stats: &StatsMap, key: &str) -> Option<i64> {
    stats
        .get(key)
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|stamp| *stamp > 0)
}

impl WorkerStats {
    pub fn from_map(stats: &StatsMap, scheme: StatsScheme) -> Self {
        Self {
            execs_done: counter(stats, scheme.key(StatKey::ExecsDone)),
            paths_found: counter(stats, scheme.key(StatKey::PathsFound)),
            paths_total: counter(stats, scheme.key(StatKey::PathsTotal)),
            unique_crashes: counter(stats, scheme.key(StatKey::UniqueCrashes)),
            unique_hangs: counter(stats, scheme.key(StatKey::UniqueHangs)),
            last_path: timestamp(stats, scheme.key(StatKey::LastPath)),
            last_crash: timestamp(stats, scheme.key(StatKey::LastCrash)),
            last_hang: timestamp(stats, scheme.key(StatKey::LastHang)),
        }
    }
}

/// What the campaign knows about one worker at aggregation time
#[derive(Debug, Clone)]
pub struct WorkerSample {
    pub name: String,
    pub group: Option<String>,
    pub running: bool,
    pub total_restarts: u32,
    pub stats: Option<StatsMap>,
}

fn newest(current: Option<i64>, candidate: Option<i64>) -> Option<i64> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Sum counters over all workers that reported stats and keep the newest
/// path/crash/hang timestamps.
pub fn aggregate(samples: &[WorkerSample], start_time: i64, now: i64) -> CampaignStats {
    let scheme = samples
        .iter()
        .filter_map(|s| s.stats.as_ref())
        .find_map(StatsScheme::detect)
        .unwrap_or(StatsScheme::Modern);

    let mut campaign = CampaignStats {
        start_time,
        now,
        ..Default::default()
    };

    for sample in samples {
        let Some(raw) = &sample.stats else {
            continue;
        };
        let stats = WorkerStats::from_map(raw, scheme);

        campaign.workers_reporting += 1;
        campaign.total_restarts += u64::from(sample.total_restarts);
        campaign.execs_done += stats.execs_done;
        campaign.paths_total += stats.paths_total;
        campaign.paths_found += stats.paths_found;
        campaign.unique_crashes += stats.unique_crashes;
        campaign.unique_hangs += stats.unique_hangs;
        campaign.newest_path = newest(campaign.newest_path, stats.last_path);
        campaign.newest_crash = newest(campaign.newest_crash, stats.last_crash);
        campaign.newest_hang = newest(campaign.newest_hang, stats.last_hang);

        campaign.workers.push(WorkerSummary {
            name: sample.name.clone(),
            group: sample.group.clone(),
            running: sample.running,
            stats,
        });
    }

    campaign
}

/// Stop rule evaluated against the current wall clock
pub fn should_stop(
    stats: &CampaignStats,
    no_progress_threshold: Option<u64>,
    min_duration: Option<u64>,
) -> bool {
    should_stop_at(
        stats,
        chrono::Utc::now().timestamp(),
        no_progress_threshold,
        min_duration,
    )
}

/// Stop when no new path was found for `no_progress_threshold` seconds and the
/// campaign ran for at least `min_duration` seconds. Never stops before the
/// first path timestamp shows up.
pub fn should_stop_at(
    stats: &CampaignStats,
    now: i64,
    no_progress_threshold: Option<u64>,
    min_duration: Option<u64>,
) -> bool {
    let (Some(threshold), Some(newest_path)) = (no_progress_threshold, stats.newest_path) else {
        return false;
    };

    let delta = now - newest_path;
    if delta < threshold as i64 {
        return false;
    }

    match min_duration {
        Some(min) => now - stats.start_time >= min as i64,
        None => true,
    }
}
