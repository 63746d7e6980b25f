use anyhow::Result;
use std::path::Path;

use crate::commands::{CommandReport, record_audit, write_run_log};
use crate::digitization::paths::resolve_paths;
use crate::digitization::whitespace::fix_white_spaces;

pub const RENAMED_LOG: &str = "renamed.log";
pub const RENAME_ERRORS_LOG: &str = "rename_errors.log";

pub fn run(dir: &Path) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("fix-white-spaces");
    report.detail(format!("dir={}", dir.display()));

    let outcome = fix_white_spaces(dir)?;
    for rename in &outcome.renamed {
        report.detail(format!(
            "renamed {} -> {}",
            rename.from.display(),
            rename.to.display()
        ));
    }
    write_run_log(&mut report, &paths.logs_dir, RENAMED_LOG, &outcome.rename_lines());
    write_run_log(&mut report, &paths.logs_dir, RENAME_ERRORS_LOG, &outcome.failure_lines());
    report.failure_summary(&outcome.counts);

    record_audit(&paths, &report);
    Ok(report)
}
