use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn digitization(tmp: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("digitization");
    cmd.current_dir(tmp)
        .env("DIGITIZE_HOME", tmp.join("home"))
        .env("DIGITIZE_CONFIG_PATH", tmp.join("home/digitize.toml"));
    cmd
}

#[test]
fn default_chunking_splits_501_records_into_two_files() {
    let tmp = tempdir().expect("tempdir");
    let input = tmp.path().join("records");
    fs::create_dir_all(&input).expect("mkdir");
    for i in 0..501 {
        fs::write(
            input.join(format!("{i:04}.xml")),
            format!("<collection><record><controlfield tag=\"001\">{i}</controlfield></record></collection>\n"),
        )
        .expect("record");
    }
    let output = tmp.path().join("collections");

    digitization(tmp.path())
        .arg("create-collection-file")
        .arg("-d")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("inputs=501"))
        .stdout(predicate::str::contains("members=500"))
        .stdout(predicate::str::contains("members=1 "));

    let first = fs::read_to_string(output.join("1.xml")).expect("1.xml");
    let second = fs::read_to_string(output.join("2.xml")).expect("2.xml");
    assert_eq!(first.matches("<record>").count(), 500);
    assert_eq!(second.matches("<record>").count(), 1);
    assert!(second.starts_with("<collection><record>"));
    assert!(second.ends_with("</collection>"));
    assert_eq!(second.matches("<collection>").count(), 1);
    assert!(!output.join("3.xml").exists());
}

#[test]
fn whitespace_fix_runs_before_merging() {
    let tmp = tempdir().expect("tempdir");
    let input = tmp.path().join("records");
    fs::create_dir_all(input.join("box one")).expect("mkdir");
    fs::write(input.join("box one/rec 1.xml"), "<record>1</record>").expect("record");
    fs::write(input.join("box one/original_rec 1.xml"), "<record>old</record>").expect("backup");
    let output = tmp.path().join("collections");

    digitization(tmp.path())
        .arg("create-collection-file")
        .arg("-d")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .args(["--chunk-size", "10", "--fix-white-spaces"])
        .assert()
        .success()
        .stdout(predicate::str::contains("renamed=3"));

    assert!(input.join("box_one/rec_1.xml").is_file());
    assert_eq!(
        fs::read_to_string(output.join("1.xml")).expect("1.xml"),
        "<collection><record>1</record></collection>"
    );
}

#[test]
fn uncreatable_output_dir_fails_the_run() {
    let tmp = tempdir().expect("tempdir");
    let input = tmp.path().join("records");
    fs::create_dir_all(&input).expect("mkdir");
    fs::write(input.join("a.xml"), "<record/>").expect("record");
    let blocker = tmp.path().join("blocker");
    fs::write(&blocker, "x").expect("blocker");

    digitization(tmp.path())
        .arg("create-collection-file")
        .arg("-d")
        .arg(&input)
        .arg("-o")
        .arg(blocker.join("out"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("destination directory not creatable"));
}

#[test]
fn fix_white_spaces_command_renames_tree() {
    let tmp = tempdir().expect("tempdir");
    let dir = tmp.path().join("scans");
    fs::create_dir_all(dir.join("a b")).expect("mkdir");
    fs::write(dir.join("a b/c d.pdf"), "%PDF").expect("file");

    digitization(tmp.path())
        .args(["--json", "fix-white-spaces", "-d"])
        .arg(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"command\": \"fix-white-spaces\""));

    assert!(dir.join("a_b/c_d.pdf").is_file());

    let renamed = fs::read_to_string(tmp.path().join("home/logs/renamed.log")).expect("log");
    assert_eq!(renamed.lines().count(), 2);
    assert!(renamed.lines().all(|line| line.contains(" -> ")));
    assert_eq!(
        fs::read_to_string(tmp.path().join("home/logs/rename_errors.log")).expect("log"),
        ""
    );
}

#[test]
fn unreadable_member_lands_in_collection_error_log() {
    let tmp = tempdir().expect("tempdir");
    let input = tmp.path().join("records");
    fs::create_dir_all(&input).expect("mkdir");
    fs::write(input.join("good.xml"), "<record>ok</record>").expect("good");
    fs::write(input.join("bad.xml"), [0xff, 0xfe, 0x00]).expect("bad");

    digitization(tmp.path())
        .arg("create-collection-file")
        .arg("-d")
        .arg(&input)
        .arg("-o")
        .arg(tmp.path().join("collections"))
        .assert()
        .success()
        .stdout(predicate::str::contains("failures.io_failure=1"));

    let errors =
        fs::read_to_string(tmp.path().join("home/logs/collection_errors.log")).expect("log");
    assert_eq!(errors.lines().count(), 1);
    assert!(errors.starts_with("E104_IO_FAILURE "));
    assert!(errors.contains("bad.xml"));
}
