use serde::Serialize;

/// Progress counters of one worker, read from its `fuzzer_stats` file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkerStats {
    pub execs_done: u64,
    pub paths_found: u64,
    pub paths_total: u64,
    pub unique_crashes: u64,
    pub unique_hangs: u64,
    /// Unix timestamps; `None` until the fuzzer reports the first event
    pub last_path: Option<i64>,
    pub last_crash: Option<i64>,
    pub last_hang: Option<i64>,
}

/// Per-worker line of a campaign report
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSummary {
    pub name: String,
    pub group: Option<String>,
    pub running: bool,
    pub stats: WorkerStats,
}

/// Campaign-wide aggregate of all workers that reported stats
#[derive(Debug, Clone, Default, Serialize)]
pub struct CampaignStats {
    pub start_time: i64,
    pub now: i64,
    pub workers_reporting: usize,
    pub execs_done: u64,
    pub paths_total: u64,
    pub paths_found: u64,
    pub unique_crashes: u64,
    pub unique_hangs: u64,
    pub total_restarts: u64,
    pub newest_path: Option<i64>,
    pub newest_crash: Option<i64>,
    pub newest_hang: Option<i64>,
    pub workers: Vec<WorkerSummary>,
}

impl CampaignStats {
    /// Seconds since the campaign started
    pub fn duration(&self) -> i64 {
        self.now - self.start_time
    }
}
