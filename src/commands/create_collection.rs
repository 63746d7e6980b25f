use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, record_audit, write_run_log};
use crate::digitization::collect::merge;
use crate::digitization::config::load_config;
use crate::digitization::paths::resolve_paths;
use crate::digitization::whitespace::fix_white_spaces;
use crate::error::FailureCounts;

pub const COLLECTION_ERRORS_LOG: &str = "collection_errors.log";

#[derive(Debug, Clone)]
pub struct CreateCollectionOptions {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub chunk_size: Option<usize>,
    pub fix_white_spaces: bool,
}

pub fn run(opts: &CreateCollectionOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let chunk_size = opts.chunk_size.unwrap_or(cfg.collect.chunk_size);
    let mut report = CommandReport::new("create-collection-file");
    let mut counts = FailureCounts::default();
    let mut failure_lines = Vec::new();

    report.detail(format!("input_dir={}", opts.input_dir.display()));
    report.detail(format!("output_dir={}", opts.output_dir.display()));
    report.detail(format!("chunk_size={chunk_size}"));

    if opts.fix_white_spaces {
        let renamed = fix_white_spaces(&opts.input_dir)?;
        report.detail(format!("renamed={}", renamed.renamed.len()));
        counts.merge(&renamed.counts);
        failure_lines.extend(renamed.failure_lines());
    }

    let outcome = merge(
        &opts.input_dir,
        &opts.output_dir,
        chunk_size,
        &cfg.legacy.backup_prefix,
    )?;
    report.detail(format!("inputs={}", outcome.inputs));
    for chunk in &outcome.chunks {
        report.detail(format!(
            "collection={} members={} sha256={}",
            chunk.path.display(),
            chunk.members,
            chunk.digest
        ));
    }
    counts.merge(&outcome.counts);
    failure_lines.extend(outcome.failure_lines());
    write_run_log(&mut report, &paths.logs_dir, COLLECTION_ERRORS_LOG, &failure_lines);
    report.failure_summary(&counts);

    record_audit(&paths, &report);
    Ok(report)
}
