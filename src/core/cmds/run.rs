use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use log::{debug, info};
use nix::sys::signal::Signal;

use crate::core::campaign::{Campaign, CampaignOutcome, CampaignSettings};
use crate::core::cli::RunArgs;
use crate::types::config::{Config, config};
use crate::types::{AppError, AppResult};

/// Combine the effective config with the command-specific arguments and
/// reject combinations that can't work.
pub fn build_settings(cfg: &Config, args: RunArgs) -> AppResult<CampaignSettings> {
    let fuzzer = cfg.fuzzer();
    let stop = cfg.stop();
    let display = cfg.display();

    if args.cmd_file.is_none() && args.program.is_empty() {
        return Err(AppError::Custom(
            "Error: you didn't specify PROGRAM you want to run. See examples: -h/--help"
                .to_string(),
        ));
    }
    if args.cmd_file.is_some() && !args.builds.is_empty() {
        return Err(AppError::Custom(
            "Error: options --builds and --cmd-file are not compatible".to_string(),
        ));
    }
    if stop.no_paths_stop == Some(0) {
        return Err(AppError::Custom(
            "Error: bad value used for --no-paths-stop. You should specify number of seconds \
             (e.g. --no-paths-stop 600)"
                .to_string(),
        ));
    }
    if stop.minimal_job_duration == Some(0) {
        return Err(AppError::Custom(
            "Error: bad value used for --minimal-job-duration. You should specify number of \
             seconds (e.g. --minimal-job-duration 3600)"
                .to_string(),
        ));
    }
    if args.instances == Some(0) {
        return Err(AppError::Custom(
            "Error: number of instances (-n) should be at least 1".to_string(),
        ));
    }

    let more_args = match fuzzer.more_args() {
        Some(raw) => shlex::split(raw).ok_or_else(|| {
            AppError::Custom(format!("Error: can't split --more-args into words: {raw}"))
        })?,
        None => Vec::new(),
    };

    Ok(CampaignSettings {
        fuzzer_binary: fuzzer.binary().to_string(),
        input_dir: PathBuf::from(fuzzer.input_dir()),
        output_dir: PathBuf::from(fuzzer.output_dir()),
        memory_limit: fuzzer.memory_limit().to_string(),
        dict: fuzzer.dict().map(|d| d.to_string()),
        more_args,
        power_schedules: fuzzer.power_schedules(),
        program: args.program,
        builds: args.builds,
        instances: args.instances,
        cmd_file: args.cmd_file.map(PathBuf::from),
        cmd_file_allow_duplicates: args.cmd_file_allow_duplicates,
        cleanup: args.cleanup,
        no_paths_stop: stop.no_paths_stop,
        minimal_job_duration: stop.minimal_job_duration,
        drawing_workaround: display.drawing_workaround(),
        dump_screens: display.dump_screens(),
    })
}

pub async fn execute_run(args: RunArgs, running: Arc<AtomicBool>) -> AppResult<CampaignOutcome> {
    let settings = build_settings(config(), args)?;
    debug!("Campaign settings: {settings:?}");

    let mut campaign = Campaign::new(settings);
    campaign.start().await?;
    info!("Started {} workers", campaign.workers().len());

    match campaign.run(running).await {
        Ok(outcome) => {
            info!("Campaign finished: {outcome:?}");
            Ok(outcome)
        }
        Err(e) => {
            campaign.stop(Signal::SIGINT).await;
            Err(e)
        }
    }
}
