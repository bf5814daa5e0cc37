use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::debug;

use crate::types::CommandFileError;

/// One `name : command` line of a custom command file
#[derive(Debug, Clone, PartialEq)]
pub struct CustomCommand {
    pub name: String,
    pub command: String,
    pub argv: Vec<String>,
}

pub fn load_command_file(
    path: &Path,
    allow_duplicates: bool,
    expected: Option<usize>,
) -> Result<Vec<CustomCommand>, CommandFileError> {
    if !path.is_file() {
        return Err(CommandFileError::NotAFile(path.to_path_buf()));
    }
    let text = fs::read_to_string(path).map_err(|source| CommandFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_command_file(&text, allow_duplicates, expected)
}

/// Parse and validate a command file. `expected` is the instance count the
/// user asked for explicitly, if any.
pub fn parse_command_file(
    text: &str,
    allow_duplicates: bool,
    expected: Option<usize>,
) -> Result<Vec<CustomCommand>, CommandFileError> {
    let mut cmds = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((name, command)) = line.split_once(':') else {
            return Err(CommandFileError::BadLine {
                line: idx + 1,
                text: line.to_string(),
            });
        };
        let (name, command) = (name.trim(), command.trim());
        if name.is_empty() || command.is_empty() {
            return Err(CommandFileError::EmptyField {
                line: idx + 1,
                text: line.to_string(),
            });
        }

        let argv =
            shlex::split(command).ok_or_else(|| CommandFileError::BadQuoting(name.to_string()))?;
        debug!("Loaded custom command: {name} : {command}");
        cmds.push(CustomCommand {
            name: name.to_string(),
            command: command.to_string(),
            argv,
        });
    }

    if cmds.is_empty() {
        return Err(CommandFileError::Empty);
    }

    let mut names = HashSet::new();
    if let Some(dup) = cmds.iter().find(|c| !names.insert(c.name.as_str())) {
        return Err(CommandFileError::DuplicateName(dup.name.clone()));
    }

    if !allow_duplicates {
        let mut commands = HashSet::new();
        if let Some(dup) = cmds.iter().find(|c| !commands.insert(c.command.as_str())) {
            return Err(CommandFileError::DuplicateCommand(dup.command.clone()));
        }
    }

    if let Some(requested) = expected
        && requested != cmds.len()
    {
        return Err(CommandFileError::CountMismatch {
            requested,
            found: cmds.len(),
        });
    }

    Ok(cmds)
}

/// Render planned workers in the command file format, environment first
pub fn render_command_file<'a>(
    entries: impl IntoIterator<Item = (&'a str, &'a [(String, String)], &'a [String])>,
) -> String {
    let mut out = String::from("# Fuzzer commands for use with --cmd-file option of fuzzman\n");
    for (name, env, argv) in entries {
        let mut words: Vec<String> = Vec::new();
        if !env.is_empty() {
            words.push("env".to_string());
            words.extend(env.iter().map(|(k, v)| quote(&format!("{k}={v}"))));
        }
        words.extend(argv.iter().map(|arg| quote(arg)));
        out.push_str(&format!("{name} : {}\n", words.join(" ")));
    }
    out
}

fn quote(word: &str) -> String {
    shlex::try_quote(word)
        .map(|q| q.into_owned())
        .unwrap_or_else(|_| word.to_string())
}
