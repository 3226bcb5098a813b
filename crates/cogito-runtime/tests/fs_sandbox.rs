//! Filesystem built-ins confined to a sandbox root

mod common;

use common::*;
use common::assert_eq;
use cogito_runtime::{Cogito, Status};
use std::fs;
use tempfile::TempDir;

fn run_in(dir: &TempDir, source: &str) -> Vec<String> {
    let mut execution = Cogito::new().with_fs_root(dir.path()).start(source).unwrap();
    let state = execution.run();
    assert_eq!(state.status, Status::Completed, "{:?}", state.error);
    state.output.clone()
}

#[test]
fn test_list_read_write() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("b.txt"), "bee").unwrap();
    fs::write(dir.path().join("a.txt"), "ay").unwrap();

    let output = run_in(
        &dir,
        "print(listFiles('.'));
         print(writeFile('c.txt', readFile('a.txt') + '!'));
         print(readFile('c.txt'));",
    );
    assert_eq!(output, vec!["[\"a.txt\",\"b.txt\"]", "true", "ay!"]);
    assert_eq!(fs::read_to_string(dir.path().join("c.txt")).unwrap(), "ay!");
}

#[test]
fn test_paths_outside_root_yield_null() {
    let dir = TempDir::new().unwrap();
    let output = run_in(
        &dir,
        "print(readFile('../secret'), readFile('/etc/hostname'), writeFile('../x', 'y'));",
    );
    assert_eq!(output, vec!["null null null"]);
}

#[test]
fn test_missing_file_yields_null() {
    let dir = TempDir::new().unwrap();
    assert_eq!(run_in(&dir, "print(readFile('nope.txt'), listFiles('nope'));"), vec!["null null"]);
}
