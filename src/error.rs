use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DigitizeError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("destination directory not creatable: {path}: {source}")]
    DestinationUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("another rewrite run holds the lock at {0}")]
    Locked(PathBuf),
}

/// Recoverable failure kinds. Every occurrence is logged and counted; none
/// of them stops a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum FailureKind {
    MissingArtifact,
    StorageQueryFailure,
    MalformedLegacyXml,
    IoFailure,
}

impl FailureKind {
    pub const ALL: [FailureKind; 4] = [
        Self::MissingArtifact,
        Self::StorageQueryFailure,
        Self::MalformedLegacyXml,
        Self::IoFailure,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingArtifact => "E101_MISSING_ARTIFACT",
            Self::StorageQueryFailure => "E102_STORAGE_QUERY_FAILURE",
            Self::MalformedLegacyXml => "E103_MALFORMED_LEGACY_XML",
            Self::IoFailure => "E104_IO_FAILURE",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::MissingArtifact => "missing_artifact",
            Self::StorageQueryFailure => "storage_query_failure",
            Self::MalformedLegacyXml => "malformed_legacy_xml",
            Self::IoFailure => "io_failure",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailureCounts {
    counts: BTreeMap<FailureKind, usize>,
}

impl FailureCounts {
    pub fn record(&mut self, kind: FailureKind) {
        *self.counts.entry(kind).or_default() += 1;
    }

    pub fn get(&self, kind: FailureKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn merge(&mut self, other: &FailureCounts) {
        for (kind, count) in &other.counts {
            *self.counts.entry(*kind).or_default() += count;
        }
    }

    /// One `failures.<label>=<n>` line per kind, zeros included.
    pub fn summary_lines(&self) -> Vec<String> {
        FailureKind::ALL
            .iter()
            .map(|kind| format!("failures.{}={}", kind.label(), self.get(*kind)))
            .collect()
    }
}
