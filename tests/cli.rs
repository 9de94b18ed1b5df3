use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

const LAUNCH_LINK: &str = "https://counter.example/?endDate=20990101T000000Z&digits=d,h&title=Launch";

#[test]
fn show_prints_decoded_configuration_and_counter() {
    let dir = tempdir().expect("tempdir");

    let mut cmd = cargo_bin_cmd!("tminus");
    cmd.arg("--history")
        .arg(dir.path())
        .arg("show")
        .arg(LAUNCH_LINK)
        .assert()
        .success()
        .stdout(predicate::str::contains("Title: Launch"))
        .stdout(predicate::str::contains("End date: 20990101T000000Z"))
        .stdout(predicate::str::contains("Digits: d,h"))
        .stdout(predicate::str::contains("Remaining days"))
        .stdout(predicate::str::contains("T-"));

    let stored = fs::read_to_string(dir.path().join("history.json")).expect("history written");
    assert!(stored.contains(r#""title":"Launch""#));
}

#[test]
fn past_end_date_counts_up() {
    let dir = tempdir().expect("tempdir");

    let mut cmd = cargo_bin_cmd!("tminus");
    cmd.arg("--history")
        .arg(dir.path())
        .arg("show")
        .arg("endDate=20000101T000000Z&digits=s")
        .assert()
        .success()
        .stdout(predicate::str::contains("Elapsed seconds"))
        .stdout(predicate::str::contains("T+"));
}

#[test]
fn set_rewrites_only_patched_keys() {
    let dir = tempdir().expect("tempdir");

    let mut cmd = cargo_bin_cmd!("tminus");
    cmd.arg("--history")
        .arg(dir.path())
        .arg("set")
        .arg("title=Launch&title=Dup&ref=mail")
        .arg("--title")
        .arg("Landing day")
        .arg("--digits")
        .arg("m,s")
        .assert()
        .success()
        .stdout(predicate::str::diff("?ref=mail&digits=m%2Cs&title=Landing+day\n"));
}

#[test]
fn set_rejects_unknown_digits() {
    let dir = tempdir().expect("tempdir");

    let mut cmd = cargo_bin_cmd!("tminus");
    cmd.arg("--history")
        .arg(dir.path())
        .arg("set")
        .arg("title=Launch")
        .arg("--digits")
        .arg("d,w")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid digit 'w'"));
}

#[test]
fn history_lists_recorded_titles_newest_first() {
    let dir = tempdir().expect("tempdir");

    for title in ["First", "Second"] {
        let mut cmd = cargo_bin_cmd!("tminus");
        cmd.arg("--history")
            .arg(dir.path())
            .arg("show")
            .arg(format!("title={title}&endDate=20990101T000000Z"))
            .assert()
            .success();
    }

    let mut cmd = cargo_bin_cmd!("tminus");
    cmd.arg("--history")
        .arg(dir.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::is_match("(?s)Second.*First").expect("regex"));
}

#[test]
fn corrupt_history_is_treated_as_empty() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("history.json"), "{not json").expect("seed corrupt history");

    let mut cmd = cargo_bin_cmd!("tminus");
    cmd.arg("--history")
        .arg(dir.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("No history yet"));
}
