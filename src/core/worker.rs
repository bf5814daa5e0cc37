use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use strum::Display;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::types::SpawnError;

/// Lines of fuzzer output kept per worker
pub const OUTPUT_CAPACITY: usize = 100;
/// Each failed check adds this to the restart score, each good one takes 5 off
const RESTART_PENALTY: u32 = 10;
const RESTART_COOLDOWN: u32 = 5;
/// Three failed restarts in a row
const RESTART_GIVE_UP: u32 = 29;
const STOP_TIMEOUT: Duration = Duration::from_secs(3);
/// The reader only sees its stop flag after the next line arrives
const READER_STOP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum WorkerState {
    #[strum(serialize = "running")]
    Running,
    #[strum(serialize = "failed")]
    Failed,
    #[strum(serialize = "stopped")]
    Stopped,
}

/// Bounded buffer of the most recent output lines of one worker
#[derive(Debug, Clone, Default)]
pub struct OutputRing {
    lines: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl OutputRing {
    pub fn push(&self, line: Vec<u8>) {
        let mut lines = match self.lines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if lines.len() == OUTPUT_CAPACITY {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Copy of the newest `max_lines` lines (at most 100), oldest first
    pub fn snapshot(&self, max_lines: usize) -> Vec<Vec<u8>> {
        let lines = match self.lines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let n = max_lines.min(OUTPUT_CAPACITY).min(lines.len());
        lines.iter().skip(lines.len() - n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().map(|lines| lines.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct ReaderTask {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

async fn read_output(stdout: ChildStdout, ring: OutputRing, stop: Arc<AtomicBool>) {
    let mut reader = BufReader::new(stdout);
    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                ring.push(line);
            }
            Err(e) => {
                debug!("Output reader stopped: {e}");
                break;
            }
        }
    }
}

/// One supervised fuzzer process with live output capture and auto-restart
pub struct WorkerProcess {
    id: usize,
    name: String,
    group: Option<String>,
    argv: Vec<String>,
    /// Set on top of the inherited environment
    env: HashMap<String, String>,
    child: Option<Child>,
    reader: Option<ReaderTask>,
    output: OutputRing,
    restart_score: u32,
    total_restarts: u32,
    state: WorkerState,
}

impl WorkerProcess {
    /// Start the process and its output reader. The child inherits our
    /// environment plus `env`. Must run inside a tokio runtime.
    pub fn spawn(
        id: usize,
        name: &str,
        group: Option<&str>,
        argv: Vec<String>,
        env: HashMap<String, String>,
    ) -> Result<Self, SpawnError> {
        let mut worker = Self {
            id,
            name: name.to_string(),
            group: group.map(|g| g.to_string()),
            argv,
            env,
            child: None,
            reader: None,
            output: OutputRing::default(),
            restart_score: 0,
            total_restarts: 0,
            state: WorkerState::Running,
        };
        worker.launch(false)?;
        Ok(worker)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn restart_score(&self) -> u32 {
        self.restart_score
    }

    pub fn total_restarts(&self) -> u32 {
        self.total_restarts
    }

    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Arguments for a resumed run: the input corpus becomes "-"
    fn resume_argv(&self) -> Result<Vec<String>, SpawnError> {
        let mut argv = self.argv.clone();
        let idx = argv
            .iter()
            .position(|arg| arg == "-i")
            .filter(|idx| idx + 1 < argv.len())
            .ok_or_else(|| SpawnError::NoInputDir(self.name.clone()))?;
        argv[idx + 1] = "-".to_string();
        Ok(argv)
    }

    fn launch(&mut self, resume: bool) -> Result<(), SpawnError> {
        let argv = if resume {
            self.env
                .insert("AFL_AUTORESUME".to_string(), "1".to_string());
            self.resume_argv()?
        } else {
            self.argv.clone()
        };

        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SpawnError::EmptyCommand(self.name.clone()))?;

        let mut child = Command::new(program)
            .args(args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpawnError::Launch {
                command: argv.join(" "),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SpawnError::NoStdout(self.name.clone()))?;
        let stop = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(read_output(
            stdout,
            self.output.clone(),
            Arc::clone(&stop),
        ));

        debug!(
            "Worker {} started with pid {:?}",
            self.name,
            child.id()
        );
        self.child = Some(child);
        self.reader = Some(ReaderTask { handle, stop });
        self.state = WorkerState::Running;
        Ok(())
    }

    /// Whether the process is still alive; reaps it if it exited
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut().map(|child| child.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(_))) | None => false,
            Some(Err(e)) => {
                warn!("Failed to poll worker {}: {e}", self.name);
                false
            }
        }
    }

    pub fn reader_alive(&self) -> bool {
        self.reader
            .as_ref()
            .is_some_and(|reader| !reader.handle.is_finished())
    }

    /// Check the worker, restarting it when it died. Returns false when the
    /// worker is no longer useful.
    pub fn health_check(&mut self) -> bool {
        let mut quality: i32 = 2;
        info!("Worker {} [{}] status:", self.name, self.command_line());

        if self.is_running() {
            info!("\tRunning. Process Id: {}", self.pid().unwrap_or_default());
            self.restart_score = self.restart_score.saturating_sub(RESTART_COOLDOWN);
        } else {
            self.restart_score += RESTART_PENALTY;
            if self.restart_score > RESTART_GIVE_UP {
                error!("\tNot running, gave up on restarting");
                self.state = WorkerState::Failed;
                quality = 0;
            } else {
                warn!("\tNot running, restarting..");
                self.total_restarts += 1;
                quality -= 1;
                if let Err(e) = self.launch(true) {
                    error!("\t{e}");
                    self.state = WorkerState::Failed;
                    self.restart_score = RESTART_GIVE_UP + RESTART_PENALTY;
                    quality = 0;
                }
            }
        }

        if !self.reader_alive() {
            warn!("\tOutput reader is not running. Realtime output not available");
            quality -= 1;
        }

        match quality {
            q if q < 1 => error!("\tWorker is not working"),
            1 => debug!("\tWorker working without realtime output report"),
            _ => debug!("\tWorker seems to be working normally"),
        }

        quality > 0
    }

    /// Newest output lines, capped at 100
    pub fn recent_output(&self, max_lines: usize) -> Vec<Vec<u8>> {
        self.output.snapshot(max_lines)
    }

    pub fn output(&self) -> &OutputRing {
        &self.output
    }

    /// Stop the reader and the process. `force` kills and waits unconditionally,
    /// otherwise `grace` is sent and the process gets a few seconds to exit.
    pub async fn stop(&mut self, force: bool, grace: Signal) {
        if let Some(reader) = self.reader.take() {
            reader.stop.store(true, Ordering::SeqCst);
            let mut handle = reader.handle;
            if timeout(READER_STOP_TIMEOUT, &mut handle).await.is_err() {
                warn!(
                    "Output reader of worker {} is still running, abandoning it",
                    self.name
                );
                handle.abort();
            }
        }

        if self.is_running()
            && let Some(child) = self.child.as_mut()
        {
            if force {
                warn!(
                    "Killing worker '{}' (pid {})",
                    self.name,
                    child.id().unwrap_or_default()
                );
                if let Err(e) = child.kill().await {
                    error!("Failed to kill worker {}: {e}", self.name);
                }
            } else if let Some(pid) = child.id() {
                if let Err(e) = signal::kill(Pid::from_raw(pid as i32), grace) {
                    warn!("Failed to send {grace} to worker {}: {e}", self.name);
                }
                if timeout(STOP_TIMEOUT, child.wait()).await.is_err() {
                    debug!("Worker {} didn't exit after {grace}", self.name);
                }
            }
        }

        if !self.is_running() && self.state == WorkerState::Running {
            self.state = WorkerState::Stopped;
        }
    }
}
