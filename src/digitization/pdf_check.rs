//! Integrity sweep over PDFs already uploaded to storage.

use crate::digitization::warn::{self, WarnEvent};
use crate::error::{FailureCounts, FailureKind};
use crate::storage::{ObjectStore, list_all};
use serde::Serialize;

const PDF_MAGIC: &[u8] = b"%PDF-";
const EOF_MARKER: &[u8] = b"%%EOF";
const TRAILER_WINDOW: usize = 20;

/// Header magic plus an `%%EOF` marker within the trailing bytes.
pub fn is_pdf_valid(bytes: &[u8]) -> bool {
    if !bytes.starts_with(PDF_MAGIC) {
        return false;
    }
    let tail = &bytes[bytes.len().saturating_sub(TRAILER_WINDOW)..];
    tail.windows(EOF_MARKER.len()).any(|w| w == EOF_MARKER)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// One folder per record under the prefix.
    Folder,
    /// PDFs sit directly under the prefix.
    Flat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PdfFinding {
    EmptyFolder(String),
    Corrupted(String),
    Unreadable { key: String, error: String },
}

impl PdfFinding {
    pub fn line(&self) -> String {
        match self {
            Self::EmptyFolder(prefix) => format!("Empty subfolder: {prefix}"),
            Self::Corrupted(key) => format!("Corrupted PDF: {key}"),
            Self::Unreadable { key, error } => format!("Unreadable PDF: {key} ({error})"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PdfCheckReport {
    pub checked: usize,
    pub valid: usize,
    pub findings: Vec<PdfFinding>,
    pub counts: FailureCounts,
}

impl PdfCheckReport {
    fn storage_failure(&mut self, key: &str, error: String) {
        warn::emit(WarnEvent {
            kind: FailureKind::StorageQueryFailure,
            stage: "verify-pdfs",
            box_id: "",
            record: "",
            path: key,
            reason: "storage-query-failed",
            err: &error,
        });
        self.counts.record(FailureKind::StorageQueryFailure);
        self.findings.push(PdfFinding::Unreadable {
            key: key.to_string(),
            error,
        });
    }

    pub fn lines(&self) -> Vec<String> {
        self.findings.iter().map(PdfFinding::line).collect()
    }
}

fn is_pdf_key(key: &str) -> bool {
    key.to_ascii_lowercase().ends_with(".pdf")
}

fn check_keys(store: &dyn ObjectStore, bucket: &str, keys: &[String], report: &mut PdfCheckReport) {
    for key in keys {
        report.checked += 1;
        match store.fetch(bucket, key) {
            Ok(bytes) if is_pdf_valid(&bytes) => {
                tracing::debug!(key = %key, "pdf valid");
                report.valid += 1;
            }
            Ok(_) => {
                tracing::warn!(key = %key, "pdf corrupted");
                report.findings.push(PdfFinding::Corrupted(key.clone()));
            }
            Err(err) => report.storage_failure(key, err.to_string()),
        }
    }
}

/// Fetches and validates every PDF under `prefix`.
pub fn check_prefix(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    mode: CheckMode,
) -> PdfCheckReport {
    let mut report = PdfCheckReport::default();
    let top = match list_all(store, bucket, prefix, Some("/")) {
        Ok(listing) => listing,
        Err(err) => {
            report.storage_failure(prefix, err.to_string());
            return report;
        }
    };

    match mode {
        CheckMode::Flat => {
            let keys = top
                .files
                .into_iter()
                .filter(|k| is_pdf_key(k))
                .collect::<Vec<_>>();
            check_keys(store, bucket, &keys, &mut report);
        }
        CheckMode::Folder => {
            for folder in top.folders.iter().filter(|f| *f != prefix) {
                let keys = match list_all(store, bucket, folder, None) {
                    Ok(listing) => listing
                        .files
                        .into_iter()
                        .filter(|k| is_pdf_key(k))
                        .collect::<Vec<_>>(),
                    Err(err) => {
                        report.storage_failure(folder, err.to_string());
                        continue;
                    }
                };
                if keys.is_empty() {
                    tracing::warn!(folder = %folder, "no pdf in record folder");
                    report.findings.push(PdfFinding::EmptyFolder(folder.clone()));
                    continue;
                }
                check_keys(store, bucket, &keys, &mut report);
            }
        }
    }
    report
}
