use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    CommandFile(#[from] CommandFileError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("{0}")]
    Custom(String),
}

/// Problems turning `--builds` descriptors into per-build core counts
#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("Error in --builds argument: '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },
    #[error("Error: --builds should point EITHER to directories OR to binaries")]
    MixedBuildKinds,
    #[error(
        "Error in --builds argument: directory '{dir}' does not contain '{program}' (path checked: '{checked}')"
    )]
    MissingBinary {
        dir: PathBuf,
        program: String,
        checked: PathBuf,
    },
    #[error("Error in --builds argument: file {0} not found so it cannot be tested")]
    BinaryNotFound(PathBuf),
    #[error("Error in --builds argument: build '{0}' requests zero cores")]
    ZeroCores(String),
    #[error(
        "Error in --builds argument: not enough processor cores to fit desired configuration ({requested} requested, {available} available)"
    )]
    NotEnoughCores { requested: i64, available: usize },
    #[error(
        "Error in --builds argument: less cores specified in --builds ({allocated}) than in -n ({requested})"
    )]
    CoreCountMismatch { allocated: usize, requested: usize },
    #[error(
        "Core allocation could not be reconciled: error with delta of {delta} cores. Please specify a different percent/amount of cores"
    )]
    Inconsistent { delta: i64 },
}

#[derive(Debug, Error)]
pub enum CommandFileError {
    #[error("Error: file '{0}' doesn't exist or it's not a file")]
    NotAFile(PathBuf),
    #[error("Error: failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Error: bad command in line {line}: {text}\nCorrect format:\n  name : command")]
    BadLine { line: usize, text: String },
    #[error(
        "Error: empty worker name or command in line {line}: {text}\nCorrect format:\n  name : command"
    )]
    EmptyField { line: usize, text: String },
    #[error("Error: unbalanced quotes in command of worker '{0}'")]
    BadQuoting(String),
    #[error("Error: custom commands file doesn't contain any commands to run")]
    Empty,
    #[error("Error: custom commands file shouldn't contain duplicate names ('{0}')")]
    DuplicateName(String),
    #[error(
        "Error: custom commands file shouldn't contain duplicate commands ('{0}'), use --cmd-file-allow-duplicates to override"
    )]
    DuplicateCommand(String),
    #[error(
        "Error: you have specified number of cores = {requested} but custom commands file contains {found} commands"
    )]
    CountMismatch { requested: usize, found: usize },
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("File {0} not found so it cannot be used as fuzzer")]
    FuzzerNotFound(String),
    #[error("File {0} not found so it cannot be tested")]
    ProgramNotFound(String),
    #[error("Can't start worker '{0}' with an empty command")]
    EmptyCommand(String),
    #[error("Failed to restart worker '{0}': no '-i' option passed")]
    NoInputDir(String),
    #[error("Wasn't able to start process with command '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Worker '{0}' has no stdout pipe to read from")]
    NoStdout(String),
}
