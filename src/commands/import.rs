use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, open_store, record_audit};
use crate::digitization::config::load_config;
use crate::digitization::import::{self, ImportMode, ImportReport};
use crate::digitization::paths::resolve_paths;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub data_dir: PathBuf,
    pub out_dir: PathBuf,
}

pub(crate) fn describe(report: &mut CommandReport, outcome: &ImportReport) {
    for b in &outcome.boxes {
        report.detail(b.summary());
        if let Some(path) = &b.metadata {
            report.detail(format!("export={}", path.display()));
        }
    }
    report.detail(format!(
        "missing_in_inventory={}",
        outcome.findings.missing_in_inventory.len()
    ));
    report.detail(format!(
        "missing_in_storage={}",
        outcome.findings.missing_in_storage.len()
    ));
    for log in &outcome.logs {
        report.detail(format!("log={}", log.display()));
    }
    report.failure_summary(&outcome.counts);
}

pub fn run(opts: &ImportOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let store = open_store(&cfg)?;
    let mut report = CommandReport::new("import");

    report.detail(format!("data_dir={}", opts.data_dir.display()));
    report.detail(format!("out_dir={}", opts.out_dir.display()));
    report.detail(format!("bucket={}", cfg.storage.bucket));

    let outcome = import::run(&store, &cfg, &opts.data_dir, &opts.out_dir, ImportMode::Full)?;
    if outcome.boxes.is_empty() {
        report.issue("no inventory files (.csv, .tsv, .txt) found in data dir");
    }
    describe(&mut report, &outcome);

    record_audit(&paths, &report);
    Ok(report)
}
