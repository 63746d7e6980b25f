//! Replaces spaces in file and directory names with underscores.

use crate::digitization::warn::{self, WarnEvent};
use crate::error::{FailureCounts, FailureKind};
use anyhow::Result;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize)]
pub struct Rename {
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WhitespaceReport {
    pub renamed: Vec<Rename>,
    pub failures: Vec<String>,
    pub counts: FailureCounts,
}

impl WhitespaceReport {
    fn fail(&mut self, path: &Path, message: String) {
        warn::emit(WarnEvent {
            kind: FailureKind::IoFailure,
            stage: "fix-white-spaces",
            box_id: "",
            record: "",
            path: &path.display().to_string(),
            reason: "rename-failed",
            err: &message,
        });
        self.counts.record(FailureKind::IoFailure);
        self.failures.push(format!("{} {message}", path.display()));
    }

    pub fn rename_lines(&self) -> Vec<String> {
        self.renamed
            .iter()
            .map(|r| format!("{} -> {}", r.from.display(), r.to.display()))
            .collect()
    }

    pub fn failure_lines(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|line| format!("{} {line}", FailureKind::IoFailure.as_str()))
            .collect()
    }
}

fn underscored(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    if !name.contains(' ') {
        return None;
    }
    Some(path.with_file_name(name.replace(' ', "_")))
}

/// Renames every entry below `root` whose name holds a space, deepest
/// entries first. An existing target is never overwritten.
pub fn fix_white_spaces(root: &Path) -> Result<WhitespaceReport> {
    if !root.is_dir() {
        anyhow::bail!("not a directory: {}", root.display());
    }

    let mut report = WhitespaceReport::default();
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                report.fail(&path, err.to_string());
                continue;
            }
        };
        let from = entry.path();
        let Some(to) = underscored(from) else {
            continue;
        };
        if to.symlink_metadata().is_ok() {
            report.fail(from, format!("target already exists: {}", to.display()));
            continue;
        }
        match fs::rename(from, &to) {
            Ok(()) => {
                tracing::debug!(from = %from.display(), to = %to.display(), "renamed");
                report.renamed.push(Rename {
                    from: from.to_path_buf(),
                    to,
                });
            }
            Err(err) => report.fail(from, err.to_string()),
        }
    }
    Ok(report)
}
