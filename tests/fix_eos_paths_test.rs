use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const LEGACY_RECORD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<record>
  <controlfield tag="001">42</controlfield>
  <datafield tag="FFT" ind1=" " ind2=" ">
    <subfield code="a">[PATH]/scan.pdf</subfield>
  </datafield>
  <datafield tag="FFT" ind1=" " ind2=" ">
    <subfield code="a">[EOS_PATH]/tiff</subfield>
    <subfield code="d">scans</subfield>
    <subfield code="t">Additional</subfield>
  </datafield>
</record>
"#;

fn seed_leaf(root: &Path, rel: &str, with_xml: bool) {
    let dir = root.join(rel);
    fs::create_dir_all(&dir).expect("mkdir leaf");
    fs::write(dir.join("scan.pdf"), b"%PDF-1.4").expect("pdf");
    fs::write(dir.join("0001.tif"), b"II*").expect("tif");
    if with_xml {
        fs::write(dir.join("record.xml"), LEGACY_RECORD).expect("xml");
    }
}

fn fix_eos_paths(tmp: &Path, root: &Path, report_dir: &Path) -> assert_cmd::assert::Assert {
    assert_cmd::cargo::cargo_bin_cmd!("digitization")
        .current_dir(tmp)
        .env("DIGITIZE_HOME", tmp.join("home"))
        .env("DIGITIZE_CONFIG_PATH", tmp.join("home/digitize.toml"))
        .env("DIGITIZE_LEGACY_STORAGE_ROOT", root)
        .env("DIGITIZE_PUBLIC_URL", "https://digitization.example")
        .arg("fix-eos-paths")
        .arg("-d")
        .arg(root)
        .arg("-r")
        .arg(report_dir)
        .assert()
}

#[test]
fn rewrite_is_stable_across_runs() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("www");
    seed_leaf(&root, "BOX_1/REC_42", true);
    let reports = tmp.path().join("reports");

    fix_eos_paths(tmp.path(), &root, &reports)
        .success()
        .stdout(predicate::str::contains("rewritten=1"));
    let live = root.join("BOX_1/REC_42/record.xml");
    let first = fs::read(&live).expect("live after first run");

    fix_eos_paths(tmp.path(), &root, &reports).success();
    let second = fs::read(&live).expect("live after second run");

    assert_eq!(first, second);
    let text = String::from_utf8(second).expect("utf8");
    assert!(text.contains("https://digitization.example/BOX_1/REC_42/scan.pdf"));
    assert!(text.contains(r#"<datafield tag="856" ind1="4" ind2=" ">"#));
    assert!(text.contains("https://digitization.example/BOX_1/REC_42/0001.tif"));
    assert!(!text.contains("scans"));
    assert_eq!(
        fs::read_to_string(root.join("BOX_1/REC_42/original_record.xml")).expect("backup"),
        LEGACY_RECORD
    );
}

#[test]
fn missing_metadata_is_logged_and_run_succeeds() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("www");
    seed_leaf(&root, "BOX_1/REC_1", true);
    seed_leaf(&root, "BOX_1/REC_2", false);
    fs::write(root.join("BOX_1/REC_2/test.xml"), "probe").expect("probe");
    let reports = tmp.path().join("reports");

    fix_eos_paths(tmp.path(), &root, &reports)
        .success()
        .stdout(predicate::str::contains("missing_metadata=1"))
        .stdout(predicate::str::contains("failures.malformed_legacy_xml=0"));

    let missing = fs::read_to_string(reports.join("missing_metadata.log")).expect("log");
    assert_eq!(missing.lines().count(), 1);
    assert!(missing.trim_end().ends_with("REC_2"));
    assert!(!root.join("BOX_1/REC_2/test.xml").exists());
}

#[test]
fn malformed_record_is_reported_and_others_still_rewritten() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("www");
    seed_leaf(&root, "BOX_1/A", false);
    fs::write(
        root.join("BOX_1/A/record.xml"),
        r#"<record><datafield tag="FFT"><subfield code="t">x</subfield></datafield></record>"#,
    )
    .expect("bad xml");
    seed_leaf(&root, "BOX_1/B", true);
    let reports = tmp.path().join("reports");

    fix_eos_paths(tmp.path(), &root, &reports)
        .success()
        .stdout(predicate::str::contains("rewritten=1"))
        .stdout(predicate::str::contains("failures.malformed_legacy_xml=1"))
        .stderr(predicate::str::contains("code=E103_MALFORMED_LEGACY_XML"));

    let errors = fs::read_to_string(reports.join("transform_errors.log")).expect("log");
    assert!(errors.starts_with("E103_MALFORMED_LEGACY_XML "));
}

#[test]
fn relative_root_maps_artifacts_under_absolute_storage_root() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("www");
    seed_leaf(&root, "BOX_1/REC_42", true);

    assert_cmd::cargo::cargo_bin_cmd!("digitization")
        .current_dir(tmp.path())
        .env("DIGITIZE_HOME", tmp.path().join("home"))
        .env("DIGITIZE_CONFIG_PATH", tmp.path().join("home/digitize.toml"))
        .env("DIGITIZE_LEGACY_STORAGE_ROOT", &root)
        .env("DIGITIZE_PUBLIC_URL", "https://digitization.example")
        .args(["fix-eos-paths", "-d", "www", "-r", "reports"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rewritten=1"))
        .stdout(predicate::str::contains("failures.io_failure=0"));

    let text = fs::read_to_string(root.join("BOX_1/REC_42/record.xml")).expect("live");
    assert!(text.contains("https://digitization.example/BOX_1/REC_42/scan.pdf"));
    assert_eq!(
        fs::read_to_string(tmp.path().join("reports/transform_errors.log")).expect("log"),
        ""
    );
}

#[test]
fn root_outside_storage_root_fails_before_rewriting() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("scratch");
    seed_leaf(&root, "BOX_1/REC_42", true);
    fs::create_dir_all(tmp.path().join("www")).expect("www");

    assert_cmd::cargo::cargo_bin_cmd!("digitization")
        .current_dir(tmp.path())
        .env("DIGITIZE_HOME", tmp.path().join("home"))
        .env("DIGITIZE_CONFIG_PATH", tmp.path().join("home/digitize.toml"))
        .env("DIGITIZE_LEGACY_STORAGE_ROOT", tmp.path().join("www"))
        .args(["fix-eos-paths", "-d", "scratch"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("outside legacy storage root"));

    assert_eq!(
        fs::read_to_string(root.join("BOX_1/REC_42/record.xml")).expect("live"),
        LEGACY_RECORD
    );
}
