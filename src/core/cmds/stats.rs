use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::core::campaign::print_stats;
use crate::core::stats::{WorkerSample, aggregate, parse_stats_file};
use crate::types::config::config;
use crate::types::{AppError, AppResult, CampaignStats};

/// Aggregate the stats files under an existing output directory. Workers are
/// the subdirectories that carry a `fuzzer_stats` file; the campaign start is
/// the earliest `start_time` among them.
pub fn collect_output_dir(output_dir: &Path, now: i64) -> AppResult<CampaignStats> {
    if !output_dir.is_dir() {
        return Err(AppError::Custom(format!(
            "Output directory '{}' doesn't exist",
            output_dir.display()
        )));
    }

    let mut entries: Vec<_> = fs::read_dir(output_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.join("fuzzer_stats").is_file())
        .collect();
    entries.sort();

    let samples: Vec<WorkerSample> = entries
        .iter()
        .map(|path| WorkerSample {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            group: None,
            running: false,
            total_restarts: 0,
            stats: parse_stats_file(&path.join("fuzzer_stats")),
        })
        .collect();

    let start_time = samples
        .iter()
        .filter_map(|s| s.stats.as_ref()?.get("start_time")?.parse::<i64>().ok())
        .filter(|t| *t > 0)
        .min()
        .unwrap_or(now);

    Ok(aggregate(&samples, start_time, now))
}

pub async fn execute_stats(output_dir: Option<String>, format: String) -> AppResult<()> {
    let output_dir = output_dir.unwrap_or_else(|| config().fuzzer().output_dir().to_string());
    let stats = collect_output_dir(Path::new(&output_dir), chrono::Utc::now().timestamp())?;

    if stats.workers.is_empty() {
        warn!("No fuzzer stats found in '{output_dir}'");
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        info!("Output directory: {output_dir}");
        print_stats(&stats, false);
    }
    Ok(())
}
