//! Merges single-record XML files into numbered collection files.

use crate::digitization::util::{ensure_dir, sha256_hex, write_atomic};
use crate::digitization::warn::{self, WarnEvent};
use crate::error::{FailureCounts, FailureKind};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const OPEN_TAG: &str = "<collection>";
const CLOSE_TAG: &str = "</collection>";

#[derive(Debug, Clone, Serialize)]
pub struct ChunkOutcome {
    pub index: usize,
    pub path: PathBuf,
    pub members: usize,
    pub digest: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeFailure {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub inputs: usize,
    pub chunks: Vec<ChunkOutcome>,
    pub failures: Vec<MergeFailure>,
    pub counts: FailureCounts,
}

impl MergeReport {
    fn fail(&mut self, path: &Path, reason: &str, message: String) {
        warn::emit(WarnEvent {
            kind: FailureKind::IoFailure,
            stage: "collect",
            box_id: "",
            record: "",
            path: &path.display().to_string(),
            reason,
            err: &message,
        });
        self.counts.record(FailureKind::IoFailure);
        self.failures.push(MergeFailure {
            path: path.to_path_buf(),
            message,
        });
    }

    pub fn failure_lines(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|f| {
                format!(
                    "{} {} {}",
                    FailureKind::IoFailure.as_str(),
                    f.path.display(),
                    f.message
                )
            })
            .collect()
    }
}

fn is_member(path: &Path, backup_prefix: &str) -> bool {
    let is_xml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
    let is_backup = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with(backup_prefix));
    is_xml && !is_backup
}

/// Record files under `input_dir` in path order. Anything under
/// `output_dir` is left out so a rerun never folds its own output back in.
pub fn list_members(input_dir: &Path, output_dir: &Path, backup_prefix: &str) -> Result<Vec<PathBuf>> {
    if !input_dir.is_dir() {
        anyhow::bail!("input is not a directory: {}", input_dir.display());
    }
    let output_dir = fs::canonicalize(output_dir).unwrap_or_else(|_| output_dir.to_path_buf());

    let mut members = Vec::new();
    let walker = WalkDir::new(input_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let path = fs::canonicalize(entry.path()).unwrap_or_else(|_| entry.path().to_path_buf());
            !path.starts_with(&output_dir)
        });
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", input_dir.display()))?;
        if entry.file_type().is_file() && is_member(entry.path(), backup_prefix) {
            members.push(entry.into_path());
        }
    }
    Ok(members)
}

/// Member text with every literal collection tag stripped.
pub fn strip_collection_tags(raw: &str) -> String {
    raw.replace(OPEN_TAG, "").replace(CLOSE_TAG, "")
}

fn assemble(members: &[PathBuf], report: &mut MergeReport) -> (String, usize) {
    let mut body = String::from(OPEN_TAG);
    let mut included = 0usize;
    for member in members {
        match fs::read_to_string(member) {
            Ok(raw) => {
                body.push_str(&strip_collection_tags(&raw));
                included += 1;
            }
            Err(err) => report.fail(member, "read-failed", err.to_string()),
        }
    }
    body.push_str(CLOSE_TAG);
    (body, included)
}

/// Writes `{output_dir}/{k}.xml` for each consecutive group of
/// `chunk_size` members, numbering from 1.
pub fn merge(
    input_dir: &Path,
    output_dir: &Path,
    chunk_size: usize,
    backup_prefix: &str,
) -> Result<MergeReport> {
    if chunk_size == 0 {
        anyhow::bail!("chunk size must be >= 1");
    }
    ensure_dir(output_dir)?;
    let members = list_members(input_dir, output_dir, backup_prefix)?;

    let mut report = MergeReport {
        inputs: members.len(),
        ..MergeReport::default()
    };
    for (i, chunk) in members.chunks(chunk_size).enumerate() {
        let index = i + 1;
        let path = output_dir.join(format!("{index}.xml"));
        let (body, included) = assemble(chunk, &mut report);

        match write_atomic(&path, body.as_bytes()) {
            Ok(()) => {
                tracing::info!(path = %path.display(), members = included, "collection written");
                report.chunks.push(ChunkOutcome {
                    index,
                    path,
                    members: included,
                    digest: sha256_hex(body.as_bytes()),
                });
            }
            Err(err) => {
                let message = format!("{err:#}");
                report.fail(&path, "write-failed", message);
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seed(dir: &Path, count: usize) {
        fs::create_dir_all(dir).expect("mkdir");
        for i in 0..count {
            fs::write(
                dir.join(format!("{i:04}.xml")),
                format!("<collection><record><controlfield tag=\"001\">{i}</controlfield></record></collection>"),
            )
            .expect("write");
        }
    }

    #[test]
    fn five_hundred_and_one_members_make_two_files() {
        let tmp = tempdir().expect("tempdir");
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        seed(&input, 501);

        let report = merge(&input, &output, 500, "original_").expect("merge");
        assert_eq!(report.inputs, 501);
        assert_eq!(report.chunks.len(), 2);
        assert_eq!(report.chunks[0].members, 500);
        assert_eq!(report.chunks[1].members, 1);

        let first = fs::read_to_string(output.join("1.xml")).expect("1.xml");
        let second = fs::read_to_string(output.join("2.xml")).expect("2.xml");
        assert_eq!(first.matches("<record>").count(), 500);
        assert_eq!(
            second,
            "<collection><record><controlfield tag=\"001\">500</controlfield></record></collection>"
        );
        assert!(!output.join("3.xml").exists());
    }

    #[test]
    fn backups_and_own_output_are_not_members() {
        let tmp = tempdir().expect("tempdir");
        let input = tmp.path().join("tree");
        fs::create_dir_all(input.join("B/R1")).expect("mkdir");
        fs::write(input.join("B/R1/record.xml"), "<record/>").expect("live");
        fs::write(input.join("B/R1/original_record.xml"), "<record/>").expect("backup");
        fs::write(input.join("B/R1/scan.pdf"), "%PDF").expect("pdf");
        let output = input.join("merged");
        fs::create_dir_all(&output).expect("mkdir");
        fs::write(output.join("1.xml"), "<collection></collection>").expect("stale");

        let members = list_members(&input, &output, "original_").expect("list");
        assert_eq!(members, vec![input.join("B/R1/record.xml")]);
    }

    #[test]
    fn members_are_taken_in_path_order() {
        let tmp = tempdir().expect("tempdir");
        let input = tmp.path().join("in");
        fs::create_dir_all(input.join("b")).expect("mkdir");
        fs::create_dir_all(input.join("a")).expect("mkdir");
        fs::write(input.join("b/x.xml"), "<record>b</record>").expect("b");
        fs::write(input.join("a/y.xml"), "<record>a</record>").expect("a");

        let out = tmp.path().join("out");
        merge(&input, &out, 10, "original_").expect("merge");
        assert_eq!(
            fs::read_to_string(out.join("1.xml")).expect("1.xml"),
            "<collection><record>a</record><record>b</record></collection>"
        );
    }

    #[test]
    fn unreadable_member_is_skipped() {
        let tmp = tempdir().expect("tempdir");
        let input = tmp.path().join("in");
        fs::create_dir_all(&input).expect("mkdir");
        fs::write(input.join("good.xml"), "<record>ok</record>").expect("good");
        fs::write(input.join("bad.xml"), [0xff, 0xfe, 0x00]).expect("bad");

        let report = merge(&input, &tmp.path().join("out"), 10, "original_").expect("merge");
        assert_eq!(report.chunks[0].members, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.counts.get(FailureKind::IoFailure), 1);
        let lines = report.failure_lines();
        assert!(lines[0].starts_with(&format!(
            "E104_IO_FAILURE {} ",
            input.join("bad.xml").display()
        )));
    }

    #[test]
    fn uncreatable_output_aborts() {
        let tmp = tempdir().expect("tempdir");
        let input = tmp.path().join("in");
        seed(&input, 1);
        let blocker = tmp.path().join("file");
        fs::write(&blocker, "x").expect("blocker");

        assert!(merge(&input, &blocker.join("out"), 10, "original_").is_err());
    }
}
