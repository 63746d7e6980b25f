use anyhow::Result;

use crate::commands::import::{ImportOptions, describe};
use crate::commands::{CommandReport, open_store, record_audit};
use crate::digitization::config::load_config;
use crate::digitization::import::{self, ImportMode};
use crate::digitization::paths::resolve_paths;

pub fn run(opts: &ImportOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let store = open_store(&cfg)?;
    let mut report = CommandReport::new("reconcile");

    report.detail(format!("data_dir={}", opts.data_dir.display()));
    report.detail(format!("out_dir={}", opts.out_dir.display()));

    let outcome = import::run(
        &store,
        &cfg,
        &opts.data_dir,
        &opts.out_dir,
        ImportMode::ReconcileOnly,
    )?;
    if outcome.boxes.is_empty() {
        report.issue("no inventory files (.csv, .tsv, .txt) found in data dir");
    }
    describe(&mut report, &outcome);

    record_audit(&paths, &report);
    Ok(report)
}
