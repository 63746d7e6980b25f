use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::commands::{CommandReport, record_audit, write_run_log};
use crate::digitization::config::load_config;
use crate::digitization::legacy::rewrite_tree;
use crate::digitization::paths::resolve_paths;
use crate::digitization::util::ensure_dir;
use crate::error::DigitizeError;

const REWRITE_LOCK_FILE: &str = "rewrite.lock";
pub const MISSING_METADATA_LOG: &str = "missing_metadata.log";
pub const TRANSFORM_ERRORS_LOG: &str = "transform_errors.log";

#[derive(Debug, Clone, Default)]
pub struct FixEosPathsOptions {
    pub root: Option<PathBuf>,
    pub report_dir: Option<PathBuf>,
}

/// Held for the whole walk; released when the file is dropped.
fn acquire_rewrite_lock(logs_dir: &Path) -> Result<File> {
    fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create {}", logs_dir.display()))?;
    let path = logs_dir.join(REWRITE_LOCK_FILE);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("failed to open rewrite lock {}", path.display()))?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(err) if err.kind() == ErrorKind::WouldBlock => Err(DigitizeError::Locked(path).into()),
        Err(err) => Err(err).with_context(|| format!("failed to lock {}", path.display())),
    }
}

pub fn run(opts: &FixEosPathsOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let root = opts
        .root
        .clone()
        .unwrap_or_else(|| cfg.legacy.storage_root.clone());
    let report_dir = opts
        .report_dir
        .clone()
        .unwrap_or_else(|| paths.logs_dir.clone());
    let mut report = CommandReport::new("fix-eos-paths");

    report.detail(format!("root={}", root.display()));
    report.detail(format!("public_url={}", cfg.legacy.public_url));

    let _lock = acquire_rewrite_lock(&paths.logs_dir)?;
    ensure_dir(&report_dir)?;
    let outcome = rewrite_tree(&root, &cfg.legacy)?;

    report.detail(format!("directories_visited={}", outcome.directories_visited));
    report.detail(format!("rewritten={}", outcome.rewritten.len()));
    report.detail(format!("missing_metadata={}", outcome.missing_metadata.len()));
    report.detail(format!("probes_removed={}", outcome.probes_removed.len()));
    for file in &outcome.rewritten {
        tracing::debug!(path = %file.path.display(), digest = %file.digest, "rewrite digest");
    }

    let logs = [
        (MISSING_METADATA_LOG, outcome.missing_metadata_lines()),
        (TRANSFORM_ERRORS_LOG, outcome.failure_lines()),
    ];
    for (name, lines) in logs {
        write_run_log(&mut report, &report_dir, name, &lines);
    }
    report.failure_summary(&outcome.counts);

    record_audit(&paths, &report);
    Ok(report)
}
