//! Per-box import: locate artifacts, build the box export, reconcile the
//! inventory against storage and collect findings.

use crate::digitization::box_id::{NormalizedBoxId, normalize};
use crate::digitization::config::DigitizeConfig;
use crate::digitization::inventory::{BoxInventory, list_inventory_files, read_inventory};
use crate::digitization::locator::{Locator, Resolution, ResolvedRecord};
use crate::digitization::metadata::build_collection;
use crate::digitization::reconcile::{ReconciliationReport, reconcile};
use crate::digitization::util::{ensure_dir, sha256_hex, write_atomic, write_lines};
use crate::digitization::warn::{self, WarnEvent};
use crate::error::{FailureCounts, FailureKind};
use crate::storage::ObjectStore;
use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const MISSING_IN_INVENTORY_LOG: &str = "missing_in_inventory.log";
pub const MISSING_IN_STORAGE_LOG: &str = "missing_in_storage.log";
pub const MISSING_ARTIFACTS_LOG: &str = "missing_artifacts.log";
pub const STORAGE_FAILURES_LOG: &str = "storage_failures.log";
pub const NAME_MISMATCHES_LOG: &str = "name_mismatches.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Box exports plus reconciliation.
    Full,
    /// Reconciliation logs only; no storage URLs are generated.
    ReconcileOnly,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Findings {
    pub missing_in_inventory: Vec<String>,
    pub missing_in_storage: Vec<String>,
    pub missing_artifacts: Vec<String>,
    pub storage_failures: Vec<String>,
    /// Rows reconciliation counts as present whose stored spelling differs,
    /// so artifact lookup by the listed name finds nothing.
    pub name_mismatches: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoxOutcome {
    pub box_id: NormalizedBoxId,
    pub rows: usize,
    pub records_written: usize,
    pub metadata: Option<PathBuf>,
    pub digest: Option<String>,
    pub reconciliation: ReconciliationReport,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub boxes: Vec<BoxOutcome>,
    pub findings: Findings,
    pub logs: Vec<PathBuf>,
    pub counts: FailureCounts,
}

impl ImportReport {
    fn fail(&mut self, event: WarnEvent<'_>) {
        warn::emit(event);
        self.counts.record(event.kind);
    }
}

fn record_resolution_findings(
    box_id: &NormalizedBoxId,
    records: &[ResolvedRecord],
    report: &mut ImportReport,
) {
    for record in records {
        for (ft, resolution) in &record.artifacts {
            match resolution {
                Resolution::Found(_) => {}
                Resolution::Missing => {
                    report.fail(WarnEvent {
                        kind: FailureKind::MissingArtifact,
                        stage: "locate",
                        box_id: box_id.as_str(),
                        record: &record.record_name,
                        path: ft.as_str(),
                        reason: "no-object-under-prefix",
                        err: "",
                    });
                    report.findings.missing_artifacts.push(format!(
                        "{box_id} {} {} {}",
                        ft.as_str(),
                        record.record_id,
                        record.record_name
                    ));
                }
                Resolution::Failed(err) => {
                    report.fail(WarnEvent {
                        kind: FailureKind::StorageQueryFailure,
                        stage: "locate",
                        box_id: box_id.as_str(),
                        record: &record.record_name,
                        path: ft.as_str(),
                        reason: "list-failed",
                        err,
                    });
                    report.findings.storage_failures.push(format!(
                        "{box_id} {} {} {err}",
                        ft.as_str(),
                        record.record_name
                    ));
                }
            }
        }
    }
}

fn record_reconciliation(reconciliation: &ReconciliationReport, report: &mut ImportReport) {
    let box_id = reconciliation.box_id.as_str();
    report
        .findings
        .missing_in_inventory
        .extend(reconciliation.missing_in_inventory_lines());
    report
        .findings
        .missing_in_storage
        .extend(reconciliation.missing_in_storage_lines());
    for line in reconciliation.name_mismatch_lines() {
        tracing::warn!(finding = %line, "inventory name differs from storage spelling");
        report.findings.name_mismatches.push(line);
    }
    for (ft, err) in reconciliation.indeterminate() {
        report.fail(WarnEvent {
            kind: FailureKind::StorageQueryFailure,
            stage: "reconcile",
            box_id,
            record: "",
            path: ft.as_str(),
            reason: "box-listing-failed",
            err,
        });
        report
            .findings
            .storage_failures
            .push(format!("{box_id} {} indeterminate {err}", ft.as_str()));
    }
}

fn process_box(
    locator: &Locator<'_>,
    cfg: &DigitizeConfig,
    inventory: &BoxInventory,
    out_dir: &Path,
    mode: ImportMode,
    report: &mut ImportReport,
) {
    let box_id = normalize(&inventory.box_name);
    tracing::info!(box_id = %box_id, rows = inventory.rows.len(), "processing box");

    let mut metadata = None;
    let mut digest = None;
    let mut records_written = 0usize;
    if mode == ImportMode::Full {
        let records = locator.resolve_all(&box_id, &inventory.rows, cfg.import.workers);
        record_resolution_findings(&box_id, &records, report);

        match build_collection(&records) {
            Ok(built) => {
                let path = out_dir.join(format!("{box_id}.xml"));
                match write_atomic(&path, &built.xml) {
                    Ok(()) => {
                        records_written = built.records_written;
                        digest = Some(sha256_hex(&built.xml));
                        metadata = Some(path);
                    }
                    Err(err) => report.fail(WarnEvent {
                        kind: FailureKind::IoFailure,
                        stage: "export",
                        box_id: box_id.as_str(),
                        record: "",
                        path: &path.display().to_string(),
                        reason: "write-failed",
                        err: &format!("{err:#}"),
                    }),
                }
                if !built.skipped.is_empty() {
                    tracing::debug!(box_id = %box_id, skipped = built.skipped.len(), "records without artifacts left out");
                }
            }
            Err(err) => report.fail(WarnEvent {
                kind: FailureKind::IoFailure,
                stage: "export",
                box_id: box_id.as_str(),
                record: "",
                path: "",
                reason: "serialize-failed",
                err: &format!("{err:#}"),
            }),
        }
    }

    let reconciliation = reconcile(locator, &box_id, &inventory.rows);
    record_reconciliation(&reconciliation, report);

    report.boxes.push(BoxOutcome {
        box_id,
        rows: inventory.rows.len(),
        records_written,
        metadata,
        digest,
        reconciliation,
    });
}

fn write_finding_logs(out_dir: &Path, mode: ImportMode, report: &mut ImportReport) {
    let mut logs: Vec<(&str, &[String])> = vec![
        (MISSING_IN_INVENTORY_LOG, report.findings.missing_in_inventory.as_slice()),
        (MISSING_IN_STORAGE_LOG, report.findings.missing_in_storage.as_slice()),
        (STORAGE_FAILURES_LOG, report.findings.storage_failures.as_slice()),
        (NAME_MISMATCHES_LOG, report.findings.name_mismatches.as_slice()),
    ];
    if mode == ImportMode::Full {
        logs.push((MISSING_ARTIFACTS_LOG, report.findings.missing_artifacts.as_slice()));
    }

    let mut written = Vec::new();
    let mut failed = Vec::new();
    for (name, lines) in logs {
        let path = out_dir.join(name);
        match write_lines(&path, lines) {
            Ok(()) => written.push(path),
            Err(err) => failed.push((path, format!("{err:#}"))),
        }
    }

    report.logs = written;
    for (path, err) in failed {
        report.fail(WarnEvent {
            kind: FailureKind::IoFailure,
            stage: "findings",
            box_id: "",
            record: "",
            path: &path.display().to_string(),
            reason: "write-failed",
            err: &err,
        });
    }
}

/// Runs every inventory file under `data_dir`. Only an unreadable data
/// directory or an uncreatable output directory stops the run.
pub fn run(
    store: &dyn ObjectStore,
    cfg: &DigitizeConfig,
    data_dir: &Path,
    out_dir: &Path,
    mode: ImportMode,
) -> Result<ImportReport> {
    let files = list_inventory_files(data_dir)?;
    ensure_dir(out_dir)?;

    let locator = Locator::new(
        store,
        &cfg.storage.bucket,
        &cfg.ttl,
        cfg.import.pdf_text_suffix,
    );
    let mut report = ImportReport::default();
    for file in files {
        let inventory = match read_inventory(&file) {
            Ok(inventory) => inventory,
            Err(err) => {
                report.fail(WarnEvent {
                    kind: FailureKind::IoFailure,
                    stage: "inventory",
                    box_id: "",
                    record: "",
                    path: &file.display().to_string(),
                    reason: "read-failed",
                    err: &format!("{err:#}"),
                });
                continue;
            }
        };
        process_box(&locator, cfg, &inventory, out_dir, mode, &mut report);
    }

    write_finding_logs(out_dir, mode, &mut report);
    Ok(report)
}

impl BoxOutcome {
    pub fn summary(&self) -> String {
        format!(
            "box={} rows={} records_written={} types_indeterminate={}",
            self.box_id,
            self.rows,
            self.records_written,
            self.reconciliation.indeterminate().len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::local::LocalStore;
    use crate::storage::testing::FaultyStore;
    use std::fs;
    use tempfile::tempdir;

    fn put(root: &Path, rel: &str) {
        let path = root.join("store/bucket").join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, b"%PDF-1.4\n%%EOF").expect("write");
    }

    fn config() -> DigitizeConfig {
        let mut cfg = DigitizeConfig::default();
        cfg.storage.bucket = "bucket".to_string();
        cfg
    }

    /// The `<record>` block whose `001` control field is `id`.
    fn record_block<'a>(xml: &'a str, id: &str) -> &'a str {
        let marker = format!("<controlfield tag=\"001\">{id}</controlfield>");
        xml.split("<record>")
            .skip(1)
            .find(|block| block.contains(&marker))
            .and_then(|block| block.split("</record>").next())
            .unwrap_or_else(|| panic!("no record {id} in {xml}"))
    }

    fn seed_inventory(root: &Path) -> PathBuf {
        let data = root.join("data");
        fs::create_dir_all(&data).expect("mkdir");
        fs::write(data.join("B-001.csv"), "id,name\n1,REC1\n2,REC2\n").expect("inventory");
        data
    }

    #[test]
    fn one_reference_per_record_of_the_right_type() {
        let tmp = tempdir().expect("tempdir");
        put(tmp.path(), "raw/PDF/B_001/REC1/REC1.pdf");
        put(tmp.path(), "raw/TIFF/B_001/REC2/0001.tif");
        let data = seed_inventory(tmp.path());
        let out = tmp.path().join("out");
        let store = LocalStore::new(tmp.path().join("store"), "https://s3.example", 1000);

        let report = run(&store, &config(), &data, &out, ImportMode::Full).expect("import");
        let xml = fs::read_to_string(out.join("B_001.xml")).expect("export");
        assert_eq!(xml.matches("<record>").count(), 2);

        let rec1 = record_block(&xml, "1");
        assert_eq!(rec1.matches("<datafield").count(), 1);
        assert!(rec1.contains("raw/PDF/B_001/REC1/REC1.pdf"));
        assert!(rec1.contains("<subfield code=\"q\">PDF</subfield>"));
        assert!(!rec1.contains("TIFF"));

        let rec2 = record_block(&xml, "2");
        assert_eq!(rec2.matches("<datafield").count(), 1);
        assert!(rec2.contains("raw/TIFF/B_001/REC2/0001.tif"));
        assert!(rec2.contains("<subfield code=\"q\">TIFF</subfield>"));
        assert!(!rec2.contains("PDF"));

        assert_eq!(report.boxes[0].records_written, 2);
        assert_eq!(
            report.findings.missing_in_storage,
            vec![
                "B_001 PDF REC2".to_string(),
                "B_001 PDF_TEXT REC1".to_string(),
                "B_001 PDF_TEXT REC2".to_string(),
                "B_001 TIFF_SET REC1".to_string(),
            ]
        );
        assert!(report.findings.missing_in_inventory.is_empty());
        assert_eq!(report.counts.get(FailureKind::MissingArtifact), 4);
        assert!(out.join(MISSING_ARTIFACTS_LOG).is_file());
    }

    #[test]
    fn storage_extras_are_missing_in_inventory() {
        let tmp = tempdir().expect("tempdir");
        put(tmp.path(), "raw/PDF/B_001/REC1/a.pdf");
        put(tmp.path(), "raw/PDF/B_001/REC9/a.pdf");
        let data = seed_inventory(tmp.path());
        let out = tmp.path().join("out");
        let store = LocalStore::new(tmp.path().join("store"), "https://s3.example", 1000);

        let report = run(&store, &config(), &data, &out, ImportMode::ReconcileOnly).expect("run");
        assert_eq!(report.findings.missing_in_inventory, vec!["B_001 PDF REC9".to_string()]);
        assert_eq!(
            fs::read_to_string(out.join(MISSING_IN_INVENTORY_LOG)).expect("log"),
            "B_001 PDF REC9\n"
        );
        assert!(!out.join("B_001.xml").exists());
        assert!(!out.join(MISSING_ARTIFACTS_LOG).exists());
    }

    #[test]
    fn spelling_variant_is_reported_alongside_the_missing_artifact() {
        let tmp = tempdir().expect("tempdir");
        put(tmp.path(), "raw/PDF/B_001/REC_1/a.pdf");
        let data = tmp.path().join("data");
        fs::create_dir_all(&data).expect("mkdir");
        fs::write(data.join("B-001.csv"), "id,name\n1,rec-1\n").expect("inventory");
        let out = tmp.path().join("out");
        let store = LocalStore::new(tmp.path().join("store"), "https://s3.example", 1000);

        let report = run(&store, &config(), &data, &out, ImportMode::Full).expect("import");
        assert!(
            !report
                .findings
                .missing_in_storage
                .iter()
                .any(|line| line.starts_with("B_001 PDF "))
        );
        assert!(
            report
                .findings
                .missing_artifacts
                .contains(&"B_001 PDF 1 rec-1".to_string())
        );
        assert_eq!(
            fs::read_to_string(out.join(NAME_MISMATCHES_LOG)).expect("log"),
            "B_001 PDF rec-1 stored as REC_1\n"
        );
    }

    #[test]
    fn failed_type_is_indeterminate_not_missing() {
        let tmp = tempdir().expect("tempdir");
        put(tmp.path(), "raw/PDF/B_001/REC1/a.pdf");
        let data = seed_inventory(tmp.path());
        let out = tmp.path().join("out");
        let store = FaultyStore {
            inner: LocalStore::new(tmp.path().join("store"), "https://s3.example", 1000),
            failing_prefixes: vec!["raw/TIFF/".to_string()],
        };

        let report = run(&store, &config(), &data, &out, ImportMode::Full).expect("import");
        assert!(
            !report
                .findings
                .missing_in_storage
                .iter()
                .any(|line| line.contains("TIFF_SET"))
        );
        assert!(
            report
                .findings
                .storage_failures
                .contains(&"B_001 TIFF_SET indeterminate storage unavailable: injected fault for raw/TIFF/B_001/".to_string())
        );
        // two per-record failures plus the box listing
        assert_eq!(report.counts.get(FailureKind::StorageQueryFailure), 3);
        assert_eq!(report.boxes[0].records_written, 1);
    }

    #[test]
    fn uncreatable_output_directory_aborts() {
        let tmp = tempdir().expect("tempdir");
        let data = seed_inventory(tmp.path());
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, "x").expect("blocker");
        fs::create_dir_all(tmp.path().join("store/bucket")).expect("bucket");
        let store = LocalStore::new(tmp.path().join("store"), "https://s3.example", 1000);

        assert!(run(&store, &config(), &data, &blocker.join("out"), ImportMode::Full).is_err());
    }
}
