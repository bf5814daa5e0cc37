use log::info;

use crate::types::AppResult;
use crate::types::config::config;

fn show(value: Option<&str>) -> &str {
    value.unwrap_or("(not set)")
}

pub async fn execute_config(format: String) -> AppResult<()> {
    let effective_config = config().to_effective();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&effective_config)?);
        return Ok(());
    }

    info!("Effective Configuration:");

    info!("");
    info!("Log:");
    let log = effective_config.log();
    info!("  level: {}", log.level());
    match log.color() {
        Some(true) => info!("  color: on"),
        Some(false) => info!("  color: off"),
        None => info!("  color: auto"),
    }

    info!("");
    info!("Fuzzer:");
    let fuzzer = effective_config.fuzzer();
    info!("  binary: {}", fuzzer.binary());
    info!("  input_dir: {}", fuzzer.input_dir());
    info!("  output_dir: {}", fuzzer.output_dir());
    info!("  memory_limit: {}", fuzzer.memory_limit());
    info!("  dict: {}", show(fuzzer.dict()));
    info!("  more_args: {}", show(fuzzer.more_args()));
    info!("  power_schedules: {}", fuzzer.power_schedules());

    info!("");
    info!("Stop:");
    let stop = effective_config.stop();
    match stop.no_paths_stop {
        Some(secs) => info!("  no_paths_stop: {secs}s"),
        None => info!("  no_paths_stop: never"),
    }
    match stop.minimal_job_duration {
        Some(secs) => info!("  minimal_job_duration: {secs}s"),
        None => info!("  minimal_job_duration: (not set)"),
    }

    info!("");
    info!("Display:");
    let display = effective_config.display();
    info!("  drawing_workaround: {}", display.drawing_workaround());
    info!("  dump_screens: {}", display.dump_screens());

    Ok(())
}
