use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LogConfig {
    pub level: Option<String>,
    pub color: Option<bool>, // None = auto-detect (semantic)
}

impl LogConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or("info")
    }

    pub fn color(&self) -> Option<bool> {
        self.color // None has semantic meaning (auto-detect)
    }

    pub fn to_effective(&self) -> Self {
        Self {
            level: Some(self.level().to_string()),
            color: self.color,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FuzzerConfig {
    pub binary: Option<String>,
    pub input_dir: Option<String>,
    pub output_dir: Option<String>,
    pub memory_limit: Option<String>,
    pub dict: Option<String>,
    pub more_args: Option<String>,
    pub power_schedules: Option<bool>,
}

impl FuzzerConfig {
    pub fn binary(&self) -> &str {
        self.binary.as_deref().unwrap_or("afl-fuzz")
    }

    pub fn input_dir(&self) -> &str {
        self.input_dir.as_deref().unwrap_or("./in")
    }

    pub fn output_dir(&self) -> &str {
        self.output_dir.as_deref().unwrap_or("./out")
    }

    pub fn memory_limit(&self) -> &str {
        self.memory_limit.as_deref().unwrap_or("none")
    }

    pub fn dict(&self) -> Option<&str> {
        self.dict.as_deref()
    }

    pub fn more_args(&self) -> Option<&str> {
        self.more_args.as_deref()
    }

    pub fn power_schedules(&self) -> bool {
        self.power_schedules.unwrap_or(true)
    }

    pub fn to_effective(&self) -> Self {
        Self {
            binary: Some(self.binary().to_string()),
            input_dir: Some(self.input_dir().to_string()),
            output_dir: Some(self.output_dir().to_string()),
            memory_limit: Some(self.memory_limit().to_string()),
            dict: self.dict.clone(),
            more_args: self.more_args.clone(),
            power_schedules: Some(self.power_schedules()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StopConfig {
    pub no_paths_stop: Option<u64>,        // None = never stop on stalled progress
    pub minimal_job_duration: Option<u64>, // None = no lower bound
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DisplayConfig {
    pub drawing_workaround: Option<bool>,
    pub dump_screens: Option<bool>,
}

impl DisplayConfig {
    pub fn drawing_workaround(&self) -> bool {
        self.drawing_workaround.unwrap_or(true)
    }

    pub fn dump_screens(&self) -> bool {
        self.dump_screens.unwrap_or(false)
    }

    pub fn to_effective(&self) -> Self {
        Self {
            drawing_workaround: Some(self.drawing_workaround()),
            dump_screens: Some(self.dump_screens()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    pub log: Option<LogConfig>,
    pub fuzzer: Option<FuzzerConfig>,
    pub stop: Option<StopConfig>,
    pub display: Option<DisplayConfig>,
}

impl Config {
    pub fn log(&self) -> LogConfig {
        self.log.clone().unwrap_or_default()
    }

    pub fn fuzzer(&self) -> FuzzerConfig {
        self.fuzzer.clone().unwrap_or_default()
    }

    pub fn stop(&self) -> StopConfig {
        self.stop.clone().unwrap_or_default()
    }

    pub fn display(&self) -> DisplayConfig {
        self.display.clone().unwrap_or_default()
    }

    pub fn to_effective(&self) -> Self {
        Self {
            log: Some(self.log().to_effective()),
            fuzzer: Some(self.fuzzer().to_effective()),
            stop: Some(self.stop()),
            display: Some(self.display().to_effective()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub log_level: Option<String>,
    pub log_color: Option<String>, // "on" | "off"
    pub fuzzer_binary: Option<String>,
    pub input_dir: Option<String>,
    pub output_dir: Option<String>,
    pub memory_limit: Option<String>,
    pub dict: Option<String>,
    pub more_args: Option<String>,
    pub no_power_schedules: bool,
    pub no_paths_stop: Option<u64>,
    pub minimal_job_duration: Option<u64>,
    pub no_drawing_workaround: bool,
    pub dump_screens: bool,
}

const CONFIG_FILENAME: &str = "fuzzman.toml";
static CONFIG: OnceCell<Config> = OnceCell::new();

pub fn get_config_filename() -> &'static str {
    CONFIG_FILENAME
}

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        let mut cfg = Config::default();
        // Apply nearest config file found by walking up from cwd
        if let Some(path) = find_nearest_config_file()
            && let Some(file_cfg) = read_config_file(&path)
        {
            apply_file_config(&mut cfg, &file_cfg);
        }
        cfg
    })
}

pub fn init_with_overrides(overrides: &CliOverrides) {
    let mut cfg = Config::default();

    // 1) Config file: walk up from cwd and use the first config file found
    if let Some(path) = find_nearest_config_file()
        && let Some(file_cfg) = read_config_file(&path)
    {
        apply_file_config(&mut cfg, &file_cfg);
    }

    // 2) CLI arguments (highest priority). Only override if user specified.
    apply_cli_overrides(&mut cfg, overrides);

    let _ = CONFIG.set(cfg);
}

fn read_config_file(path: &Path) -> Option<Config> {
    match fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents),
        Err(_) => None,
    }
}

pub fn parse_config(contents: &str) -> Option<Config> {
    toml::from_str::<Config>(contents).ok()
}

pub fn apply_file_config(cfg: &mut Config, file: &Config) {
    if let Some(file_log) = &file.log {
        let mut log = cfg.log.clone().unwrap_or_default();
        if file_log.level.is_some() {
            log.level = file_log.level.clone();
        }
        if file_log.color.is_some() {
            log.color = file_log.color;
        }
        cfg.log = Some(log);
    }

    if let Some(file_fuzzer) = &file.fuzzer {
        let mut fuzzer = cfg.fuzzer.clone().unwrap_or_default();
        macro_rules! take {
            ($($field:ident),*) => {
                $(
                    if file_fuzzer.$field.is_some() {
                        fuzzer.$field = file_fuzzer.$field.clone();
                    }
                )*
            };
        }
        take!(
            binary,
            input_dir,
            output_dir,
            memory_limit,
            dict,
            more_args,
            power_schedules
        );
        cfg.fuzzer = Some(fuzzer);
    }

    if let Some(file_stop) = &file.stop {
        let mut stop = cfg.stop.clone().unwrap_or_default();
        if file_stop.no_paths_stop.is_some() {
            stop.no_paths_stop = file_stop.no_paths_stop;
        }
        if file_stop.minimal_job_duration.is_some() {
            stop.minimal_job_duration = file_stop.minimal_job_duration;
        }
        cfg.stop = Some(stop);
    }

    if let Some(file_display) = &file.display {
        let mut display = cfg.display.clone().unwrap_or_default();
        if file_display.drawing_workaround.is_some() {
            display.drawing_workaround = file_display.drawing_workaround;
        }
        if file_display.dump_screens.is_some() {
            display.dump_screens = file_display.dump_screens;
        }
        cfg.display = Some(display);
    }
}

pub fn apply_cli_overrides(cfg: &mut Config, overrides: &CliOverrides) {
    // Log overrides
    let mut log = cfg.log.clone().unwrap_or_default();
    if let Some(level) = &overrides.log_level
        && !level.trim().is_empty()
    {
        log.level = Some(level.trim().to_string());
    }
    if let Some(color_str) = &overrides.log_color {
        match color_str.to_lowercase().as_str() {
            "on" => log.color = Some(true),
            "off" => log.color = Some(false),
            _ => {}
        }
    }
    if overrides.log_level.is_some() || overrides.log_color.is_some() {
        cfg.log = Some(log);
    }

    // Fuzzer overrides
    let mut fuzzer = cfg.fuzzer.clone().unwrap_or_default();
    let mut fuzzer_touched = false;
    for (target, value) in [
        (&mut fuzzer.binary, &overrides.fuzzer_binary),
        (&mut fuzzer.input_dir, &overrides.input_dir),
        (&mut fuzzer.output_dir, &overrides.output_dir),
        (&mut fuzzer.memory_limit, &overrides.memory_limit),
        (&mut fuzzer.dict, &overrides.dict),
        (&mut fuzzer.more_args, &overrides.more_args),
    ] {
        if let Some(v) = value
            && !v.trim().is_empty()
        {
            *target = Some(v.clone());
            fuzzer_touched = true;
        }
    }
    if overrides.no_power_schedules {
        fuzzer.power_schedules = Some(false);
        fuzzer_touched = true;
    }
    if fuzzer_touched {
        cfg.fuzzer = Some(fuzzer);
    }

    // Stop overrides
    if overrides.no_paths_stop.is_some() || overrides.minimal_job_duration.is_some() {
        let mut stop = cfg.stop.clone().unwrap_or_default();
        if overrides.no_paths_stop.is_some() {
            stop.no_paths_stop = overrides.no_paths_stop;
        }
        if overrides.minimal_job_duration.is_some() {
            stop.minimal_job_duration = overrides.minimal_job_duration;
        }
        cfg.stop = Some(stop);
    }

    // Display overrides
    if overrides.no_drawing_workaround || overrides.dump_screens {
        let mut display = cfg.display.clone().unwrap_or_default();
        if overrides.no_drawing_workaround {
            display.drawing_workaround = Some(false);
        }
        if overrides.dump_screens {
            display.dump_screens = Some(true);
        }
        cfg.display = Some(display);
    }
}

fn find_nearest_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let config_filename = get_config_filename();
    for dir in cwd.ancestors() {
        let candidate = dir.join(config_filename);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

pub fn colors_enabled() -> bool {
    match config().log().color() {
        Some(force) => force,
        None => console::colors_enabled(),
    }
}
