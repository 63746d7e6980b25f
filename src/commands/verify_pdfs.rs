use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, open_store, record_audit};
use crate::digitization::config::load_config;
use crate::digitization::paths::resolve_paths;
use crate::digitization::pdf_check::{CheckMode, check_prefix};
use crate::digitization::util::{ensure_dir, write_lines};

const DEFAULT_LOG_FILE: &str = "pdf_issues.log";

#[derive(Debug, Clone)]
pub struct VerifyPdfsOptions {
    pub prefix: String,
    pub flat: bool,
    pub log_file: Option<PathBuf>,
}

pub fn run(opts: &VerifyPdfsOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let store = open_store(&cfg)?;
    let mut report = CommandReport::new("verify-pdfs");

    let prefix = if opts.prefix.is_empty() || opts.prefix.ends_with('/') {
        opts.prefix.clone()
    } else {
        format!("{}/", opts.prefix)
    };
    let mode = if opts.flat {
        CheckMode::Flat
    } else {
        CheckMode::Folder
    };
    report.detail(format!("bucket={}", cfg.storage.bucket));
    report.detail(format!("prefix={prefix}"));

    let outcome = check_prefix(&store, &cfg.storage.bucket, &prefix, mode);
    report.detail(format!("checked={}", outcome.checked));
    report.detail(format!("valid={}", outcome.valid));
    report.detail(format!("findings={}", outcome.findings.len()));

    let log_file = match &opts.log_file {
        Some(path) => path.clone(),
        None => {
            ensure_dir(&paths.logs_dir)?;
            paths.logs_dir.join(DEFAULT_LOG_FILE)
        }
    };
    write_lines(&log_file, &outcome.lines())?;
    report.detail(format!("log={}", log_file.display()));
    report.failure_summary(&outcome.counts);

    record_audit(&paths, &report);
    Ok(report)
}
