use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// All relative paths will be interpreted relative to this directory.
    /// All child processes will be run in this directory.
    #[arg(long, global = true)]
    pub cwd: Option<String>,

    /// Logging level (overrides config). One of: trace, debug, info, warn, error
    #[arg(long = "log.level", global = true)]
    pub log_level: Option<String>,

    /// Logging color control: "on" to force colors, "off" to disable; omit for auto
    #[arg(long = "log.color", global = true)]
    pub log_color: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write an example config file into the current directory
    Init,

    /// Run a fuzzing campaign until the stop condition is met or Ctrl-C
    Run(RunArgs),

    /// Print the fuzzer commands a campaign would run, in --cmd-file format
    Plan(RunArgs),

    /// Print aggregated stats of an existing output directory
    Stats(StatsArgs),

    /// Print the effective configuration
    Config(PrintConfigArgs),
}

/// Arguments shared by `run` and `plan`
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Program to fuzz and its arguments (use @@ for the input file)
    #[arg(value_name = "PROGRAM", trailing_var_arg = true, allow_hyphen_values = true)]
    pub program: Vec<String>,

    /// Number of fuzzer instances to run. Defaults to the number of CPUs.
    #[arg(short = 'n', long)]
    pub instances: Option<usize>,

    /// Input corpus directory.
    /// Replaces config [fuzzer].input_dir if provided.
    #[arg(short = 'i', long = "input-dir")]
    pub input_dir: Option<String>,

    /// Output directory shared by all instances.
    /// Replaces config [fuzzer].output_dir if provided.
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: Option<String>,

    /// Dictionary passed to the main instance only
    #[arg(short = 'x', long)]
    pub dict: Option<String>,

    /// Memory limit for each fuzzer instance, e.g. "none" or "200"
    #[arg(short = 'm', long = "memory-limit")]
    pub memory_limit: Option<String>,

    /// Build descriptors: PATH, NAME:PATH or NAME:PATH:CORES where CORES is
    /// a count or a percentage like 25%. PATH is either a binary or a
    /// directory containing PROGRAM.
    #[arg(long, num_args = 1..)]
    pub builds: Vec<String>,

    /// File with one "name : command" line per worker to run instead of
    /// generating fuzzer commands
    #[arg(long = "cmd-file")]
    pub cmd_file: Option<String>,

    /// Accept identical commands in --cmd-file
    #[arg(long = "cmd-file-allow-duplicates")]
    pub cmd_file_allow_duplicates: bool,

    /// Remove the output directory before starting
    #[arg(short = 'C', long)]
    pub cleanup: bool,

    /// Don't pass power schedules (-p) to the fuzzer instances
    #[arg(short = 'P', long = "no-power-schedules")]
    pub no_power_schedules: bool,

    /// Relay status screens exactly as captured
    #[arg(short = 'W', long = "no-drawing-workaround")]
    pub no_drawing_workaround: bool,

    /// Extra arguments for every fuzzer instance, shell quoted
    #[arg(long = "more-args", allow_hyphen_values = true)]
    pub more_args: Option<String>,

    /// Fuzzer executable.
    /// Replaces config [fuzzer].binary if provided.
    #[arg(long = "fuzzer-binary")]
    pub fuzzer_binary: Option<String>,

    /// Stop once no new paths were found for this many seconds
    #[arg(long = "no-paths-stop")]
    pub no_paths_stop: Option<u64>,

    /// Never stop before the job ran for this many seconds
    #[arg(long = "minimal-job-duration")]
    pub minimal_job_duration: Option<u64>,

    /// Print the last status screen of every worker when stopping
    #[arg(long = "dump-screens")]
    pub dump_screens: bool,
}

/// Arguments for the stats command
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Output directory of a campaign.
    /// Replaces config [fuzzer].output_dir if provided.
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: Option<String>,

    /// Output format: "table" (default) or "json"
    #[arg(long, default_value = "table")]
    pub format: String,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct PrintConfigArgs {
    /// Output format: "table" (default) or "json"
    #[arg(long, default_value = "table")]
    pub format: String,
}
