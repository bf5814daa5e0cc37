use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use log::{debug, warn};

use crate::core::cli::{Args, Commands, RunArgs};
use crate::core::cmds;
use crate::core::logging::init_logging;
use crate::core::term::RESTORE;
use crate::types::config::{CliOverrides, init_with_overrides};
use crate::types::{AppError, AppResult};

fn run_overrides(args: &Args, run: &RunArgs) -> CliOverrides {
    CliOverrides {
        log_level: args.log_level.clone(),
        log_color: args.log_color.clone(),
        fuzzer_binary: run.fuzzer_binary.clone(),
        input_dir: run.input_dir.clone(),
        output_dir: run.output_dir.clone(),
        memory_limit: run.memory_limit.clone(),
        dict: run.dict.clone(),
        more_args: run.more_args.clone(),
        no_power_schedules: run.no_power_schedules,
        no_paths_stop: run.no_paths_stop,
        minimal_job_duration: run.minimal_job_duration,
        no_drawing_workaround: run.no_drawing_workaround,
        dump_screens: run.dump_screens,
    }
}

fn install_interrupt_handler(running: Arc<AtomicBool>) -> AppResult<()> {
    ctrlc::set_handler(move || {
        let mut out = std::io::stdout();
        let _ = out.write_all(&RESTORE);
        let _ = out.flush();
        warn!("Received Ctrl-C, stopping workers..");
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|e| AppError::Custom(format!("Error creating a Ctrl-C handler: {e}")))
}

pub async fn run_main() -> AppResult<()> {
    let args = Args::parse();

    // Handle global arguments
    if let Some(cwd_arg) = args.cwd.as_ref() {
        let cwd = PathBuf::from(cwd_arg).canonicalize()?;
        env::set_current_dir(&cwd)?;
    }

    // Build CLI overrides for config precedence
    let cli_overrides = match &args.command {
        Commands::Run(run) | Commands::Plan(run) => run_overrides(&args, run),
        Commands::Stats(stats) => CliOverrides {
            log_level: args.log_level.clone(),
            log_color: args.log_color.clone(),
            output_dir: stats.output_dir.clone(),
            ..Default::default()
        },
        Commands::Init | Commands::Config(_) => CliOverrides {
            log_level: args.log_level.clone(),
            log_color: args.log_color.clone(),
            ..Default::default()
        },
    };

    // Initialize configuration (file, then CLI overrides)
    init_with_overrides(&cli_overrides);

    // Initialize logging after config so level/color are applied
    init_logging();
    debug!("Current working directory: {}", env::current_dir()?.display());

    // Dispatch to appropriate command
    let exit_code = match args.command {
        Commands::Run(run_args) => {
            let running = Arc::new(AtomicBool::new(true));
            install_interrupt_handler(Arc::clone(&running))?;
            cmds::execute_run(run_args, running).await?.exit_code()
        }
        Commands::Plan(run_args) => {
            cmds::execute_plan(run_args).await?;
            0
        }
        Commands::Stats(stats_args) => {
            cmds::execute_stats(stats_args.output_dir, stats_args.format).await?;
            0
        }
        Commands::Config(config_args) => {
            cmds::execute_config(config_args.format).await?;
            0
        }
        Commands::Init => {
            cmds::execute_init().await?;
            0
        }
    };

    // Exit with appropriate code
    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}
