use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, error, info, warn};
use nix::sys::signal::Signal;
use serde::Serialize;

use crate::core::alloc::{allocate, parse_build_spec, resolve_build_paths};
use crate::core::cmdfile::load_command_file;
use crate::core::format::{format_big_number, format_seconds};
use crate::core::stats::{WorkerSample, aggregate, parse_stats_file, should_stop_at};
use crate::core::term::{self, TERM};
use crate::core::utils::{display_path, find_executable};
use crate::core::worker::WorkerProcess;
use crate::types::{AppError, AppResult, CampaignStats, ResolvedBuild, SpawnError};

/// Time between health check, status screen and stats check
const CHECK_INTERVAL: Duration = Duration::from_secs(5);
/// A status screen is shown for FRAMES * FRAME_DELAY
const FRAMES: usize = 100;
const FRAME_DELAY: Duration = Duration::from_millis(50);
const SCREEN_LINES: usize = 24;
const DEAD_SCREEN_LINES: usize = 29;
const LEFTOVER_WAIT: Duration = Duration::from_secs(1);
const SECONDARY_SCHEDULES: [&str; 2] = ["seek", "fast"];

/// Everything a campaign needs, resolved from config and command line
#[derive(Debug, Clone, Serialize)]
pub struct CampaignSettings {
    pub fuzzer_binary: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub memory_limit: String,
    pub dict: Option<String>,
    pub more_args: Vec<String>,
    pub power_schedules: bool,
    /// Target program and its arguments
    pub program: Vec<String>,
    /// Raw `--builds` descriptors
    pub builds: Vec<String>,
    /// Instance count given with `-n`; `None` means one per CPU
    pub instances: Option<usize>,
    pub cmd_file: Option<PathBuf>,
    pub cmd_file_allow_duplicates: bool,
    pub cleanup: bool,
    pub no_paths_stop: Option<u64>,
    pub minimal_job_duration: Option<u64>,
    pub drawing_workaround: bool,
    pub dump_screens: bool,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            fuzzer_binary: "afl-fuzz".to_string(),
            input_dir: PathBuf::from("./in"),
            output_dir: PathBuf::from("./out"),
            memory_limit: "none".to_string(),
            dict: None,
            more_args: Vec::new(),
            power_schedules: true,
            program: Vec::new(),
            builds: Vec::new(),
            instances: None,
            cmd_file: None,
            cmd_file_allow_duplicates: false,
            cleanup: false,
            no_paths_stop: None,
            minimal_job_duration: None,
            drawing_workaround: true,
            dump_screens: false,
        }
    }
}

impl CampaignSettings {
    /// Instance budget and whether the user asked for it explicitly
    pub fn instance_budget(&self) -> (usize, bool) {
        match self.instances {
            Some(n) => (n.max(1), true),
            None => (
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1),
                false,
            ),
        }
    }
}

/// A worker that is about to be started
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerPlan {
    pub name: String,
    pub group: Option<String>,
    pub argv: Vec<String>,
    /// Variables on top of the inherited environment
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignOutcome {
    StopConditionMet,
    NoHealthyWorkers,
    Interrupted,
}

impl CampaignOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            CampaignOutcome::StopConditionMet | CampaignOutcome::Interrupted => 0,
            CampaignOutcome::NoHealthyWorkers => 1,
        }
    }
}

/// Sleep in short steps while `running` stays set. Returns the final flag.
pub async fn pause(duration: Duration, running: &AtomicBool) -> bool {
    let step = Duration::from_millis(100);
    let mut left = duration;
    while !left.is_zero() {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let nap = left.min(step);
        tokio::time::sleep(nap).await;
        left -= nap;
    }
    running.load(Ordering::SeqCst)
}

/// Variables every worker gets on top of the inherited environment
fn worker_env() -> HashMap<String, String> {
    HashMap::from([("AFL_FORCE_UI".to_string(), "1".to_string())])
}

pub struct Campaign {
    settings: CampaignSettings,
    workers: Vec<WorkerProcess>,
    last_shown: usize,
    start_time: i64,
}

impl Campaign {
    pub fn new(settings: CampaignSettings) -> Self {
        Self {
            settings,
            workers: Vec::new(),
            last_shown: 0,
            start_time: chrono::Utc::now().timestamp(),
        }
    }

    pub fn workers(&self) -> &[WorkerProcess] {
        &self.workers
    }

    /// Turn `--builds` into per-build core counts
    pub fn resolve_builds(&self) -> AppResult<Vec<ResolvedBuild>> {
        let program = self.target_program()?;
        let specs = self
            .settings
            .builds
            .iter()
            .map(|raw| parse_build_spec(raw))
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Params of --builds: {specs:?}");

        let specs = resolve_build_paths(specs, program)?;
        let (total, explicit) = self.settings.instance_budget();
        let resolved = allocate(&specs, total, explicit)?;
        debug!("Adjusted params: {resolved:?}");
        Ok(resolved)
    }

    fn target_program(&self) -> AppResult<&str> {
        self.settings
            .program
            .first()
            .map(|p| p.as_str())
            .ok_or_else(|| {
                AppError::Custom(
                    "Error: you didn't specify PROGRAM you want to run. See examples: -h/--help"
                        .to_string(),
                )
            })
    }

    /// Fuzzer command line of the worker with index `idx` fuzzing `target`
    fn fuzzer_argv(&self, idx: usize, target: &str) -> (String, Vec<String>) {
        let s = &self.settings;
        let main = idx == 0;
        let name = format!("{}{}", if main { "m" } else { "s" }, idx + 1);

        let mut argv = vec![
            s.fuzzer_binary.clone(),
            "-i".to_string(),
            s.input_dir.to_string_lossy().to_string(),
            "-o".to_string(),
            s.output_dir.to_string_lossy().to_string(),
            "-m".to_string(),
            s.memory_limit.clone(),
        ];
        if main && let Some(dict) = &s.dict {
            argv.extend(["-x".to_string(), dict.clone()]);
        }
        argv.extend([if main { "-M" } else { "-S" }.to_string(), name.clone()]);
        if s.power_schedules {
            let schedule = if main {
                "exploit"
            } else {
                SECONDARY_SCHEDULES[(idx - 1) % SECONDARY_SCHEDULES.len()]
            };
            argv.extend(["-p".to_string(), schedule.to_string()]);
        }
        argv.extend(s.more_args.iter().cloned());
        argv.push("--".to_string());
        argv.push(target.to_string());
        argv.extend(s.program.iter().skip(1).cloned());

        (name, argv)
    }

    /// Decide which workers to start: from the command file if one is given,
    /// otherwise one per allocated core.
    pub fn plan_workers(&self) -> AppResult<Vec<WorkerPlan>> {
        if let Some(path) = &self.settings.cmd_file {
            let expected = self.settings.instances;
            let cmds =
                load_command_file(path, self.settings.cmd_file_allow_duplicates, expected)?;
            return Ok(cmds
                .into_iter()
                .map(|cmd| WorkerPlan {
                    name: cmd.name,
                    group: Some("custom".to_string()),
                    argv: cmd.argv,
                    env: Vec::new(),
                })
                .collect());
        }

        let slots: Vec<(Option<String>, String)> = if self.settings.builds.is_empty() {
            let program = self.target_program()?;
            if find_executable(program).is_none() {
                return Err(SpawnError::ProgramNotFound(program.to_string()).into());
            }
            let (total, _) = self.settings.instance_budget();
            vec![(None, program.to_string()); total]
        } else {
            self.resolve_builds()?
                .into_iter()
                .flat_map(|build| {
                    let path = build.path.to_string_lossy().to_string();
                    std::iter::repeat_n((build.name, path), build.cores)
                })
                .collect()
        };
        debug!("Builds in use: {slots:?}");

        Ok(slots
            .into_iter()
            .enumerate()
            .map(|(idx, (group, target))| {
                let (name, argv) = self.fuzzer_argv(idx, &target);
                WorkerPlan {
                    name,
                    group,
                    argv,
                    env: Vec::new(),
                }
            })
            .collect())
    }

    /// Make sure there is an input corpus and optionally wipe the output dir
    pub fn prepare_directories(&self) -> AppResult<()> {
        let input = &self.settings.input_dir;
        if !input.exists() {
            fs::create_dir_all(input).map_err(|e| {
                AppError::Custom(format!(
                    "Can't create input directory {}: {e}",
                    input.display()
                ))
            })?;
        } else if !input.is_dir() {
            return Err(AppError::Custom(format!(
                "Can't use {} as input directory",
                input.display()
            )));
        }

        let pattern = input.join("*");
        let has_inputs = glob::glob(&pattern.to_string_lossy())
            .map(|mut paths| paths.next().is_some())
            .unwrap_or(false);
        if !has_inputs {
            let seed = input.join("1");
            info!("Creating simple input corpus: {}", display_path(&seed));
            fs::write(&seed, b"12345").map_err(|e| {
                AppError::Custom(format!("Wasn't able to create input corpus: {e}"))
            })?;
        }

        let output = &self.settings.output_dir;
        if self.settings.cleanup && output.is_dir() {
            warn!("Removing directory '{}'", output.display());
            fs::remove_dir_all(output).map_err(|e| {
                AppError::Custom(format!(
                    "Wasn't able to remove output directory '{}': {e}",
                    output.display()
                ))
            })?;
        }

        Ok(())
    }

    /// Spawn all planned workers. Failing to start the first worker aborts
    /// the campaign; later failures only lose that worker.
    pub async fn start(&mut self) -> AppResult<()> {
        if find_executable(&self.settings.fuzzer_binary).is_none() {
            return Err(SpawnError::FuzzerNotFound(self.settings.fuzzer_binary.clone()).into());
        }

        self.prepare_directories()?;
        let plans = self.plan_workers()?;
        for (idx, plan) in plans.into_iter().enumerate() {
            let mut env = worker_env();
            env.extend(plan.env.iter().cloned());

            info!(
                "Starting worker #{} {{{}}}: {}",
                idx + 1,
                plan.name,
                plan.argv.join(" ")
            );
            match WorkerProcess::spawn(
                idx,
                &plan.name,
                plan.group.as_deref(),
                plan.argv,
                env,
            ) {
                Ok(worker) => self.workers.push(worker),
                Err(e) if self.workers.is_empty() => return Err(e.into()),
                Err(e) => error!("Worker {} was not started: {e}", plan.name),
            }
        }

        if self.workers.is_empty() {
            return Err(AppError::Custom("No workers to run".to_string()));
        }

        self.start_time = chrono::Utc::now().timestamp();
        Ok(())
    }

    /// Check every worker; true while at least one of them is OK
    pub fn health_check(&mut self) -> bool {
        if self.workers.is_empty() {
            return false;
        }

        info!("Checking status of workers");
        let num_ok = self
            .workers
            .iter_mut()
            .map(|worker| worker.health_check())
            .filter(|ok| *ok)
            .count();

        info!(
            "{}/{} workers report OK status",
            num_ok,
            self.workers.len()
        );
        num_ok > 0
    }

    /// Relay the live output of the next worker in turn for a few seconds
    pub async fn display_next_status_screen(&mut self, running: &AtomicBool) -> io::Result<()> {
        if self.workers.is_empty() {
            info!("No status screen to show");
            return Ok(());
        }

        let idx = self.last_shown % self.workers.len();
        self.last_shown = (idx + 1) % self.workers.len();

        let workaround = self.settings.drawing_workaround;
        let mut out = io::stdout();
        let worker = &mut self.workers[idx];

        if worker.is_running() {
            out.write_all(TERM.cursor_hide)?;
            for _ in 0..FRAMES {
                let data = worker.recent_output(SCREEN_LINES);
                term::draw_frame(&mut out, &data, workaround)?;
                if !pause(FRAME_DELAY, running).await {
                    break;
                }
            }
            out.write_all(TERM.cursor_show)?;
        } else {
            let data = worker.recent_output(DEAD_SCREEN_LINES);
            term::draw_frame(&mut out, &data, false)?;
            pause(CHECK_INTERVAL, running).await;
        }

        term::restore_terminal(&mut out)
    }

    /// Print one frame of every worker's output
    pub fn dump_status_screens(&mut self, out: &mut impl Write) -> io::Result<()> {
        let workaround = self.settings.drawing_workaround;
        for worker in self.workers.iter_mut() {
            out.write_all(&[b'\n'; 40])?;
            if worker.is_running() {
                out.write_all(TERM.cursor_hide)?;
                term::draw_frame(out, &worker.recent_output(SCREEN_LINES), workaround)?;
            } else {
                term::draw_frame(out, &worker.recent_output(DEAD_SCREEN_LINES), false)?;
            }
            term::restore_terminal(out)?;
        }
        out.write_all(b"\n\n")?;
        out.flush()
    }

    /// Read every worker's stats file and aggregate
    pub fn collect_stats(&mut self) -> CampaignStats {
        let output_dir = self.settings.output_dir.clone();
        let samples: Vec<WorkerSample> = self
            .workers
            .iter_mut()
            .map(|worker| WorkerSample {
                name: worker.name().to_string(),
                group: worker.group().map(|g| g.to_string()),
                running: worker.is_running(),
                total_restarts: worker.total_restarts(),
                stats: parse_stats_file(&output_dir.join(worker.name()).join("fuzzer_stats")),
            })
            .collect();

        aggregate(&samples, self.start_time, chrono::Utc::now().timestamp())
    }

    /// Print stats of the job; true when the stop condition is met
    pub fn job_status_check(&mut self, only_stats: bool) -> bool {
        let stats = self.collect_stats();
        print_stats(&stats, only_stats);
        should_stop_at(
            &stats,
            stats.now,
            self.settings.no_paths_stop,
            self.settings.minimal_job_duration,
        )
    }

    /// Supervise workers until the stop rule fires, every worker is dead or
    /// `running` is cleared. Workers are stopped before returning.
    pub async fn run(&mut self, running: Arc<AtomicBool>) -> AppResult<CampaignOutcome> {
        let mut out = io::stdout();
        let outcome = loop {
            if !running.load(Ordering::SeqCst) {
                break CampaignOutcome::Interrupted;
            }

            term::clear_screen(&mut out)?;
            if !self.health_check() {
                break CampaignOutcome::NoHealthyWorkers;
            }
            if !pause(CHECK_INTERVAL, &running).await {
                break CampaignOutcome::Interrupted;
            }

            term::clear_screen(&mut out)?;
            if let Err(e) = self.display_next_status_screen(&running).await {
                warn!("Failed to display status screen: {e}");
            }
            if !running.load(Ordering::SeqCst) {
                break CampaignOutcome::Interrupted;
            }

            term::clear_screen(&mut out)?;
            if self.job_status_check(false) {
                info!("STOP CONDITION MET. Stopping current fuzzing job...");
                break CampaignOutcome::StopConditionMet;
            }
            if !pause(CHECK_INTERVAL, &running).await {
                break CampaignOutcome::Interrupted;
            }
        };

        self.stop(Signal::SIGINT).await;
        Ok(outcome)
    }

    /// Stop every worker: gracefully first, then by force. Idempotent.
    pub async fn stop(&mut self, grace: Signal) {
        if self.workers.is_empty() {
            return;
        }

        if self.settings.dump_screens {
            info!("Dumping status screens");
            if let Err(e) = self.dump_status_screens(&mut io::stdout()) {
                warn!("Failed to dump status screens: {e}");
            }
        } else {
            info!("Stopping processes");
        }

        self.job_status_check(true);

        for worker in self.workers.iter_mut() {
            worker.stop(false, grace).await;
        }

        debug!(
            "Waiting {:.1} seconds to check for leftover processes",
            LEFTOVER_WAIT.as_secs_f64()
        );
        tokio::time::sleep(LEFTOVER_WAIT).await;

        for worker in self.workers.iter_mut() {
            worker.stop(true, grace).await;
        }
        self.workers.clear();
    }
}

/// Campaign report in the style of the fuzzer's own status screen
pub fn print_stats(stats: &CampaignStats, only_stats: bool) {
    if !only_stats {
        for worker in &stats.workers {
            let status = if worker.running { "" } else { "NOT " };
            match &worker.group {
                Some(group) => info!(
                    "Worker {} of group {} is {}running",
                    worker.name, group, status
                ),
                None => info!("Worker {} is {}running", worker.name, status),
            }

            let s = &worker.stats;
            info!(
                "\tcrashes: {}, hangs: {}, paths total: {}",
                s.unique_crashes, s.unique_hangs, s.paths_total
            );
            let share = if s.paths_total > 0 {
                100.0 * s.paths_found as f64 / s.paths_total as f64
            } else {
                0.0
            };
            info!(
                "\tpaths discovered: {} ({:.2}% of total paths)",
                s.paths_found, share
            );
        }
    }

    info!("");
    info!("Stats of this fuzzing job:");
    info!("Duration: {}", format_seconds(stats.duration()));

    let Some(newest_path) = stats.newest_path else {
        if !only_stats {
            info!("");
            info!("No more stats to display (yet)");
        }
        return;
    };

    info!("   Execs: {}", format_big_number(stats.execs_done));
    info!(
        "   Paths: {}.\tLast new path: {} ago",
        stats.paths_total,
        format_seconds(stats.now - newest_path)
    );

    match stats.newest_hang {
        Some(stamp) if stats.unique_hangs > 0 => info!(
            "   Hangs: {}.\tLast new hang: {} ago",
            stats.unique_hangs,
            format_seconds(stats.now - stamp)
        ),
        _ => info!("   Hangs: {}", stats.unique_hangs),
    }

    match stats.newest_crash {
        Some(stamp) if stats.unique_crashes > 0 => info!(
            " Crashes: {}.\tLast new crash: {} ago",
            stats.unique_crashes,
            format_seconds(stats.now - stamp)
        ),
        _ => info!(" Crashes: {}", stats.unique_crashes),
    }

    if stats.total_restarts > 0 {
        info!("Fuzzer restarts: {}", stats.total_restarts);
    }
}
