//! In-place rewrite of legacy per-record XML.
//!
//! Each leaf directory holds one live record file, optionally an
//! `original_`-prefixed backup of it, and the record's PDF and TIFF
//! artifacts. The backup is written once and never touched again; every run
//! rebuilds the live file from it, so repeated runs produce identical bytes.

use crate::digitization::config::LegacyConfig;
use crate::digitization::util::{sha256_hex, write_atomic};
use crate::digitization::warn::{self, WarnEvent};
use crate::digitization::xml_tree::{self, Document, Element, Node};
use crate::error::{DigitizeError, FailureCounts, FailureKind};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

const ATTACHMENT_TAG: &str = "FFT";
const WEB_LINK_TAG: &str = "856";
const WEB_LINK_IND1: &str = "4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttachmentAction {
    /// Keep the field, point `$a` at the public PDF URL.
    PointAtPdf,
    /// Turn the field into an `856 4_` web link to the TIFF set.
    RetagAsTiffLink,
}

struct AttachmentRule {
    marker: &'static str,
    action: AttachmentAction,
}

const ATTACHMENT_RULES: &[AttachmentRule] = &[
    AttachmentRule {
        marker: "[PATH]",
        action: AttachmentAction::PointAtPdf,
    },
    AttachmentRule {
        marker: "[EOS_PATH]",
        action: AttachmentAction::RetagAsTiffLink,
    },
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("{tag} field has no ${code} subfield")]
    MissingSubfield { tag: &'static str, code: &'static str },
    #[error("{tag} field has an empty ${code} subfield")]
    EmptySubfield { tag: &'static str, code: &'static str },
    #[error("placeholder {marker} needs a {artifact} artifact in the directory")]
    MissingArtifact {
        marker: &'static str,
        artifact: &'static str,
    },
    #[error("artifact {} lies outside storage root {}", path.display(), root.display())]
    OutsideStorageRoot { path: PathBuf, root: PathBuf },
    #[error("artifact path {} is not valid UTF-8", path.display())]
    UnmappablePath { path: PathBuf },
}

/// Public URLs of the directory's artifacts, when present.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    pub pdf_url: Option<String>,
    pub tiff_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransformStats {
    pub paths_replaced: usize,
    pub links_retagged: usize,
}

fn is_subfield(el: &Element, code: &str) -> bool {
    el.local_name() == "subfield" && el.attr("code") == Some(code)
}

fn is_attachment(el: &Element) -> bool {
    el.local_name() == "datafield" && el.attr("tag") == Some(ATTACHMENT_TAG)
}

fn point_at_pdf(field: &Element, url: &str) -> Element {
    let mut replaced = false;
    let children = field
        .children
        .iter()
        .map(|node| match node {
            Node::Element(sf) if !replaced && is_subfield(sf, "a") => {
                replaced = true;
                Node::Element(sf.clone().with_text(url))
            }
            other => other.clone(),
        })
        .collect();
    Element {
        name: field.name.clone(),
        attributes: field.attributes.clone(),
        children,
    }
}

fn retag_as_tiff_link(field: &Element, url: &str) -> Element {
    let mut children = Vec::with_capacity(field.children.len());
    let mut after_dropped = false;
    for node in &field.children {
        match node {
            Node::Element(sf) if is_subfield(sf, "d") => {
                after_dropped = true;
                continue;
            }
            Node::Text(t) if after_dropped && t.trim().is_empty() => {
                after_dropped = false;
                continue;
            }
            Node::Element(sf) if is_subfield(sf, "a") => {
                children.push(Node::Element(sf.clone().with_attr("code", "u").with_text(url)));
            }
            Node::Element(sf) if is_subfield(sf, "t") => {
                children.push(Node::Element(sf.clone().with_attr("code", "q").with_text("TIFF")));
            }
            other => children.push(other.clone()),
        }
        after_dropped = false;
    }

    Element {
        name: field.name.clone(),
        attributes: field.attributes.clone(),
        children,
    }
    .with_attr("tag", WEB_LINK_TAG)
    .with_attr("ind1", WEB_LINK_IND1)
}

fn rewrite_attachment(
    field: &Element,
    artifacts: &Artifacts,
    stats: &mut TransformStats,
) -> Result<Element, TransformError> {
    let path_text = field
        .child_elements()
        .find(|sf| is_subfield(sf, "a"))
        .map(Element::text)
        .ok_or(TransformError::MissingSubfield {
            tag: ATTACHMENT_TAG,
            code: "a",
        })?;
    if path_text.trim().is_empty() {
        return Err(TransformError::EmptySubfield {
            tag: ATTACHMENT_TAG,
            code: "a",
        });
    }

    let Some(rule) = ATTACHMENT_RULES
        .iter()
        .find(|rule| path_text.trim_start().starts_with(rule.marker))
    else {
        return Ok(field.clone());
    };

    match rule.action {
        AttachmentAction::PointAtPdf => {
            let url = artifacts
                .pdf_url
                .as_deref()
                .ok_or(TransformError::MissingArtifact {
                    marker: rule.marker,
                    artifact: "PDF",
                })?;
            stats.paths_replaced += 1;
            Ok(point_at_pdf(field, url))
        }
        AttachmentAction::RetagAsTiffLink => {
            let url = artifacts
                .tiff_url
                .as_deref()
                .ok_or(TransformError::MissingArtifact {
                    marker: rule.marker,
                    artifact: "TIFF",
                })?;
            stats.links_retagged += 1;
            Ok(retag_as_tiff_link(field, url))
        }
    }
}

fn rewrite_element(
    el: &Element,
    artifacts: &Artifacts,
    stats: &mut TransformStats,
) -> Result<Element, TransformError> {
    let mut children = Vec::with_capacity(el.children.len());
    for node in &el.children {
        let rebuilt = match node {
            Node::Element(child) if is_attachment(child) => {
                Node::Element(rewrite_attachment(child, artifacts, stats)?)
            }
            Node::Element(child) => Node::Element(rewrite_element(child, artifacts, stats)?),
            other => other.clone(),
        };
        children.push(rebuilt);
    }
    Ok(Element {
        name: el.name.clone(),
        attributes: el.attributes.clone(),
        children,
    })
}

/// Builds the rewritten document; the input is left untouched.
pub fn rewrite_document(
    doc: &Document,
    artifacts: &Artifacts,
) -> Result<(Document, TransformStats), TransformError> {
    let mut stats = TransformStats::default();
    let root = if is_attachment(&doc.root) {
        rewrite_attachment(&doc.root, artifacts, &mut stats)?
    } else {
        rewrite_element(&doc.root, artifacts, &mut stats)?
    };
    Ok((Document { root }, stats))
}

/// Maps artifact paths under the storage root to public URLs. Paths are
/// compared in canonical form, so `www`, `./www` and `/eos/.../www` all land
/// under the same configured root.
#[derive(Debug, Clone)]
pub struct PublicUrls {
    storage_root: PathBuf,
    base: String,
}

impl PublicUrls {
    pub fn new(cfg: &LegacyConfig) -> Self {
        Self {
            storage_root: fs::canonicalize(&cfg.storage_root)
                .unwrap_or_else(|_| cfg.storage_root.clone()),
            base: cfg.public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn url_for(&self, artifact: &Path) -> Result<String, TransformError> {
        let resolved = resolve_parent(artifact);
        let rel = resolved
            .strip_prefix(&self.storage_root)
            .map_err(|_| TransformError::OutsideStorageRoot {
                path: artifact.to_path_buf(),
                root: self.storage_root.clone(),
            })?;
        let parts = rel
            .components()
            .map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| TransformError::UnmappablePath {
                path: artifact.to_path_buf(),
            })?;
        Ok(format!("{}/{}", self.base, parts.join("/")))
    }
}

/// Canonicalizes the containing directory and keeps the file name as found,
/// so a symlinked artifact maps by where it sits, not where it points.
fn resolve_parent(path: &Path) -> PathBuf {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return path.to_path_buf();
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    match fs::canonicalize(parent) {
        Ok(dir) => dir.join(name),
        Err(_) => path.to_path_buf(),
    }
}

fn resolve_artifacts(
    contents: &LeafContents,
    urls: &PublicUrls,
) -> Result<Artifacts, TransformError> {
    Ok(Artifacts {
        pdf_url: contents.pdfs.first().map(|p| urls.url_for(p)).transpose()?,
        tiff_url: contents.tiffs.first().map(|p| urls.url_for(p)).transpose()?,
    })
}

#[derive(Debug, Default)]
struct LeafContents {
    live: Vec<PathBuf>,
    backups: Vec<PathBuf>,
    pdfs: Vec<PathBuf>,
    tiffs: Vec<PathBuf>,
    probe: Option<PathBuf>,
}

impl LeafContents {
    fn holds_metadata(&self) -> bool {
        !(self.live.is_empty()
            && self.backups.is_empty()
            && self.pdfs.is_empty()
            && self.tiffs.is_empty())
    }
}

fn has_extension(path: &Path, wanted: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| wanted.iter().any(|w| ext.eq_ignore_ascii_case(w)))
}

fn scan_directory(dir: &Path, cfg: &LegacyConfig) -> std::io::Result<LeafContents> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();

    let mut out = LeafContents::default();
    for path in files {
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if name == cfg.probe_file {
            out.probe = Some(path);
        } else if has_extension(&path, &["xml"]) {
            if name.starts_with(&cfg.backup_prefix) {
                out.backups.push(path);
            } else {
                out.live.push(path);
            }
        } else if has_extension(&path, &["pdf"]) {
            out.pdfs.push(path);
        } else if has_extension(&path, &["tif", "tiff"]) {
            out.tiffs.push(path);
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BackupState {
    NoBackup,
    HasBackup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryOutcome {
    Rewritten {
        live: PathBuf,
        prior: BackupState,
        digest: String,
        stats: TransformStats,
    },
    MissingMetadata {
        dir: PathBuf,
    },
    Failed {
        path: PathBuf,
        kind: FailureKind,
        message: String,
    },
}

fn failed(path: &Path, kind: FailureKind, message: impl Into<String>) -> DirectoryOutcome {
    DirectoryOutcome::Failed {
        path: path.to_path_buf(),
        kind,
        message: message.into(),
    }
}

fn backup_path_for(live: &Path, cfg: &LegacyConfig) -> Option<PathBuf> {
    let name = live.file_name()?.to_str()?;
    Some(live.with_file_name(format!("{}{name}", cfg.backup_prefix)))
}

/// Brings the live file back to its pristine content and returns that
/// content, creating the backup on first contact.
fn reset_to_pristine(live: &Path, backup: &Path) -> Result<(BackupState, String)> {
    if backup.is_file() {
        let pristine = fs::read(backup)
            .with_context(|| format!("failed to read backup {}", backup.display()))?;
        write_atomic(live, &pristine)?;
        let text = String::from_utf8(pristine)
            .with_context(|| format!("backup {} is not valid UTF-8", backup.display()))?;
        return Ok((BackupState::HasBackup, text));
    }

    fs::copy(live, backup).with_context(|| {
        format!("failed to copy {} to {}", live.display(), backup.display())
    })?;
    let text = fs::read_to_string(backup)
        .with_context(|| format!("failed to read backup {}", backup.display()))?;
    Ok((BackupState::NoBackup, text))
}

fn rewrite_leaf(
    dir: &Path,
    contents: &LeafContents,
    cfg: &LegacyConfig,
    urls: &PublicUrls,
) -> DirectoryOutcome {
    let live = match contents.live.as_slice() {
        [] => {
            return DirectoryOutcome::MissingMetadata {
                dir: dir.to_path_buf(),
            };
        }
        [one] => one,
        many => {
            let names = many
                .iter()
                .filter_map(|p| p.file_name().and_then(|s| s.to_str()))
                .collect::<Vec<_>>()
                .join(", ");
            return failed(
                dir,
                FailureKind::MalformedLegacyXml,
                format!("expected one live record file, found {names}"),
            );
        }
    };
    let Some(backup) = backup_path_for(live, cfg) else {
        return failed(live, FailureKind::IoFailure, "live file name is not valid UTF-8");
    };

    let (prior, pristine) = match reset_to_pristine(live, &backup) {
        Ok(out) => out,
        Err(err) => return failed(live, FailureKind::IoFailure, format!("{err:#}")),
    };
    tracing::debug!(path = %live.display(), ?prior, "live record reset to pristine");

    let doc = match xml_tree::parse(&pristine) {
        Ok(doc) => doc,
        Err(err) => return failed(live, FailureKind::MalformedLegacyXml, err.to_string()),
    };

    let artifacts = match resolve_artifacts(contents, urls) {
        Ok(artifacts) => artifacts,
        Err(err) => return failed(live, FailureKind::IoFailure, err.to_string()),
    };
    let (rewritten, stats) = match rewrite_document(&doc, &artifacts) {
        Ok(out) => out,
        Err(err) => return failed(live, FailureKind::MalformedLegacyXml, err.to_string()),
    };

    let bytes = match xml_tree::serialize(&rewritten) {
        Ok(bytes) => bytes,
        Err(err) => return failed(live, FailureKind::IoFailure, err.to_string()),
    };
    if let Err(err) = write_atomic(live, &bytes) {
        return failed(live, FailureKind::IoFailure, format!("{err:#}"));
    }

    DirectoryOutcome::Rewritten {
        live: live.clone(),
        prior,
        digest: sha256_hex(&bytes),
        stats,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RewrittenFile {
    pub path: PathBuf,
    pub prior: BackupState,
    pub digest: String,
    pub stats: TransformStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct RewriteFailure {
    pub path: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RewriteReport {
    pub directories_visited: usize,
    pub rewritten: Vec<RewrittenFile>,
    pub missing_metadata: Vec<PathBuf>,
    pub failures: Vec<RewriteFailure>,
    pub probes_removed: Vec<PathBuf>,
    pub counts: FailureCounts,
}

impl RewriteReport {
    fn fail(&mut self, path: PathBuf, kind: FailureKind, message: String) {
        warn::emit(WarnEvent {
            kind,
            stage: "rewrite",
            box_id: "",
            record: "",
            path: &path.display().to_string(),
            reason: "directory-skipped",
            err: &message,
        });
        self.counts.record(kind);
        self.failures.push(RewriteFailure {
            path,
            kind,
            message,
        });
    }

    pub fn missing_metadata_lines(&self) -> Vec<String> {
        self.missing_metadata
            .iter()
            .map(|p| p.display().to_string())
            .collect()
    }

    pub fn failure_lines(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|f| format!("{} {} {}", f.kind.as_str(), f.path.display(), f.message))
            .collect()
    }
}

/// Walks `root` in path order and rewrites every leaf directory that holds
/// record metadata. Per-directory problems land in the report; a root that
/// is not under the storage root ends the run before anything is touched.
pub fn rewrite_tree(root: &Path, cfg: &LegacyConfig) -> Result<RewriteReport> {
    if !root.is_dir() {
        anyhow::bail!("rewrite root is not a directory: {}", root.display());
    }
    let urls = PublicUrls::new(cfg);
    let resolved_root = fs::canonicalize(root)
        .with_context(|| format!("failed to resolve rewrite root {}", root.display()))?;
    if !resolved_root.starts_with(urls.storage_root()) {
        return Err(DigitizeError::InvalidConfig(format!(
            "rewrite root {} is outside legacy storage root {}",
            resolved_root.display(),
            urls.storage_root().display()
        ))
        .into());
    }

    let mut report = RewriteReport::default();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                report.fail(path, FailureKind::IoFailure, err.to_string());
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        let dir = entry.path();
        let contents = match scan_directory(dir, cfg) {
            Ok(contents) => contents,
            Err(err) => {
                report.fail(dir.to_path_buf(), FailureKind::IoFailure, err.to_string());
                continue;
            }
        };

        if contents.holds_metadata() {
            report.directories_visited += 1;
            match rewrite_leaf(dir, &contents, cfg, &urls) {
                DirectoryOutcome::Rewritten {
                    live,
                    prior,
                    digest,
                    stats,
                } => {
                    tracing::info!(path = %live.display(), "record rewritten");
                    report.rewritten.push(RewrittenFile {
                        path: live,
                        prior,
                        digest,
                        stats,
                    });
                }
                DirectoryOutcome::MissingMetadata { dir } => {
                    tracing::warn!(dir = %dir.display(), "record metadata missing");
                    report.missing_metadata.push(dir);
                }
                DirectoryOutcome::Failed {
                    path,
                    kind,
                    message,
                } => report.fail(path, kind, message),
            }
        }

        if let Some(probe) = contents.probe {
            match fs::remove_file(&probe) {
                Ok(()) => report.probes_removed.push(probe),
                Err(err) => report.fail(probe, FailureKind::IoFailure, err.to_string()),
            }
        }
    }

    Ok(report)
}
