pub mod create_collection;
pub mod fix_eos_paths;
pub mod fix_white_spaces;
pub mod import;
pub mod reconcile;
pub mod status;
pub mod verify_pdfs;

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::digitization::audit;
use crate::digitization::config::DigitizeConfig;
use crate::digitization::paths::DigitizePaths;
use crate::digitization::util::{ensure_dir, write_lines};
use crate::error::{DigitizeError, FailureCounts};
use crate::storage::local::LocalStore;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    /// Recovered failures are counted, not treated as issues.
    pub fn failure_summary(&mut self, counts: &FailureCounts) {
        for line in counts.summary_lines() {
            self.detail(line);
        }
    }
}

/// Writes one per-run log under `dir`. A write failure becomes a report
/// issue rather than ending the command.
pub fn write_run_log(report: &mut CommandReport, dir: &Path, name: &str, lines: &[String]) {
    let path = dir.join(name);
    let written = ensure_dir(dir)
        .map_err(anyhow::Error::from)
        .and_then(|()| write_lines(&path, lines));
    match written {
        Ok(()) => report.detail(format!("log={}", path.display())),
        Err(err) => report.issue(format!("failed to write {}: {err:#}", path.display())),
    }
}

pub fn open_store(cfg: &DigitizeConfig) -> Result<LocalStore> {
    let Some(root) = cfg.storage.store_root.as_ref() else {
        return Err(DigitizeError::InvalidConfig(
            "no object store configured; set DIGITIZE_STORE_ROOT or [storage].store_root".into(),
        )
        .into());
    };
    Ok(LocalStore::new(
        root.clone(),
        cfg.storage.url_base.clone(),
        cfg.storage.page_size,
    ))
}

/// Appends one audit line for the finished command. An audit write failure
/// is reported on stderr and never fails the command.
pub fn record_audit(paths: &DigitizePaths, report: &CommandReport) {
    let status = if report.ok { "ok" } else { "issues" };
    let message = format!(
        "details={} issues={}",
        report.details.len(),
        report.issues.len()
    );
    if let Err(err) = audit::append_event(paths, &report.command, status, &message) {
        tracing::warn!(error = %format!("{err:#}"), "audit log append failed");
    }
}
