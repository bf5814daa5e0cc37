use std::fs;

use fuzzman::core::cmdfile::{load_command_file, parse_command_file};
use fuzzman::types::CommandFileError;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

const COMMANDS: &str = "\
# Fuzzer commands for use with --cmd-file option of fuzzman
m1 : afl-fuzz -i in -o out -M m1 -- ./app @@

s2 : env AFL_NO_UI=1 afl-fuzz -i in -o out -S s2 -- './my app' @@
";

#[test]
fn comments_and_blank_lines_are_skipped() {
    let cmds = parse_command_file(COMMANDS, false, None).unwrap();
    assert_eq!(cmds.len(), 2);
    assert_eq!(cmds[0].name, "m1");
    assert_eq!(cmds[0].command, "afl-fuzz -i in -o out -M m1 -- ./app @@");
    assert_eq!(cmds[1].argv[0], "env");
    assert_eq!(cmds[1].argv.last().map(String::as_str), Some("@@"));
    assert!(cmds[1].argv.contains(&"./my app".to_string()));
}

#[test]
fn instance_count_must_match() {
    assert!(parse_command_file(COMMANDS, false, Some(2)).is_ok());
    assert!(matches!(
        parse_command_file(COMMANDS, false, Some(3)),
        Err(CommandFileError::CountMismatch {
            requested: 3,
            found: 2
        })
    ));
}

#[test]
fn duplicate_names_always_fail() {
    let text = "w : cmd one\nw : cmd two\n";
    assert!(matches!(
        parse_command_file(text, true, None),
        Err(CommandFileError::DuplicateName(name)) if name == "w"
    ));
}

#[test]
fn duplicate_commands_need_permission() {
    let text = "a : afl-fuzz -S x\nb : afl-fuzz -S x\n";
    assert!(matches!(
        parse_command_file(text, false, None),
        Err(CommandFileError::DuplicateCommand(_))
    ));
    assert_eq!(parse_command_file(text, true, None).unwrap().len(), 2);
}

#[test]
fn malformed_lines_report_their_number() {
    assert!(matches!(
        parse_command_file("# header\nno separator here\n", false, None),
        Err(CommandFileError::BadLine { line: 2, .. })
    ));
    assert!(matches!(
        parse_command_file(" : afl-fuzz\n", false, None),
        Err(CommandFileError::EmptyField { line: 1, .. })
    ));
    assert!(matches!(
        parse_command_file("# nothing\n\n", false, None),
        Err(CommandFileError::Empty)
    ));
}

#[test]
fn files_are_loaded_from_disk() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("cmds.txt");
    fs::write(&path, COMMANDS).unwrap();

    assert_eq!(load_command_file(&path, false, None).unwrap().len(), 2);
    assert!(matches!(
        load_command_file(tmp.path(), false, None),
        Err(CommandFileError::NotAFile(_))
    ));
}
