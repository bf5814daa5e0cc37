use std::io;

use console::style;
use log::{Level, LevelFilter};

use crate::types::config::{colors_enabled, config};

fn level_filter(level: &str) -> LevelFilter {
    match level.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

fn level_tag(level: Level, colors: bool) -> String {
    let tag = format!("[{level}]");
    if !colors {
        return tag;
    }
    match level {
        Level::Error => style(tag).red().bold().to_string(),
        Level::Warn => style(tag).yellow().to_string(),
        Level::Info => style(tag).green().to_string(),
        Level::Debug => style(tag).cyan().to_string(),
        Level::Trace => style(tag).dim().to_string(),
    }
}

/// Configure the global logger from the effective config. Warnings and errors
/// go to stderr, everything else to stdout.
pub fn init_logging() {
    let colors = colors_enabled();
    let level = level_filter(config().log().level());

    let base = fern::Dispatch::new()
        .level(level)
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} {} {}",
                chrono::Local::now().format("%H:%M:%S"),
                level_tag(record.level(), colors),
                message
            ))
        });

    let stdout = fern::Dispatch::new()
        .filter(|meta| meta.level() > Level::Warn)
        .chain(io::stdout());
    let stderr = fern::Dispatch::new()
        .filter(|meta| meta.level() <= Level::Warn)
        .chain(io::stderr());

    // A second init (tests) keeps the first logger
    let _ = base.chain(stdout).chain(stderr).apply();
}
