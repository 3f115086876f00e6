use std::io::Write;

use super::file_io::create_parent_dir_if_not_exist;
use super::file_io::open_file_for_append;

/// Passed: "/tmp/logs/watcher.log"
/// Expected: "/tmp/logs" created, file not created
#[test]
fn create_parent_dir_for_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let file_path = temp_dir.path().join("logs").join("watcher.log");

    create_parent_dir_if_not_exist(&file_path).unwrap();

    assert!(file_path.parent().unwrap().is_dir());
    assert!(!file_path.exists());
}

#[test]
fn open_file_for_append_keeps_existing_content() {
    let temp_dir = tempfile::tempdir().unwrap();
    let file_path = temp_dir.path().join("nested").join("dir").join("watcher.log");

    let mut file = open_file_for_append(&file_path).unwrap();
    file.write_all(b"first\n").unwrap();
    drop(file);
    let mut file = open_file_for_append(&file_path).unwrap();
    file.write_all(b"second\n").unwrap();
    drop(file);

    assert_eq!(std::fs::read_to_string(&file_path).unwrap(), "first\nsecond\n");
}

#[test]
fn open_file_for_append_fails_when_parent_is_a_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let blocker = temp_dir.path().join("blocker");
    std::fs::write(&blocker, b"x").unwrap();

    assert!(open_file_for_append(&blocker.join("watcher.log")).is_err());
}
