use crate::digitization::box_id::{NormalizedBoxId, canonical_id};
use crate::digitization::config::TtlConfig;
use crate::digitization::inventory::InventoryRow;
use crate::storage::{ObjectStore, StorageError, list_all};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FileType {
    Pdf,
    PdfText,
    TiffSet,
}

/// How a file type's artifacts are laid out under the box prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One folder per record, artifacts inside it.
    Folder,
    /// One object per record, named after the record.
    File,
}

impl FileType {
    pub const ALL: [FileType; 3] = [Self::Pdf, Self::PdfText, Self::TiffSet];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::PdfText => "PDF_TEXT",
            Self::TiffSet => "TIFF_SET",
        }
    }

    fn storage_dir(self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::PdfText => "PDF_LATEX",
            Self::TiffSet => "TIFF",
        }
    }

    pub fn layout(self) -> Layout {
        match self {
            Self::Pdf | Self::TiffSet => Layout::Folder,
            Self::PdfText => Layout::File,
        }
    }

    /// `None` means unbounded.
    pub fn max_urls(self) -> Option<usize> {
        match self {
            Self::Pdf | Self::PdfText => Some(1),
            Self::TiffSet => None,
        }
    }
}

/// Object name ending for text-layer PDFs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfTextSuffix {
    #[default]
    Plain,
    Latex,
}

impl PdfTextSuffix {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => ".pdf",
            Self::Latex => "_latex.pdf",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "plain" | "pdf" => Some(Self::Plain),
            "latex" | "_latex" => Some(Self::Latex),
            _ => None,
        }
    }
}

pub fn box_prefix(file_type: FileType, box_id: &NormalizedBoxId) -> String {
    format!("raw/{}/{}/", file_type.storage_dir(), box_id)
}

pub fn resolve(
    file_type: FileType,
    box_id: &NormalizedBoxId,
    record_name: &str,
    suffix: PdfTextSuffix,
) -> String {
    let base = box_prefix(file_type, box_id);
    match file_type.layout() {
        Layout::Folder => format!("{base}{record_name}/"),
        Layout::File => format!("{base}{record_name}{}", suffix.as_str()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(Vec<String>),
    Missing,
    /// The storage query itself failed; the record's state is unknown.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ResolvedRecord {
    pub record_id: String,
    pub record_name: String,
    pub artifacts: BTreeMap<FileType, Resolution>,
}

impl ResolvedRecord {
    pub fn urls(&self, file_type: FileType) -> &[String] {
        match self.artifacts.get(&file_type) {
            Some(Resolution::Found(urls)) => urls,
            _ => &[],
        }
    }

    pub fn has_any_url(&self) -> bool {
        FileType::ALL.iter().any(|ft| !self.urls(*ft).is_empty())
    }
}

pub struct Locator<'a> {
    store: &'a dyn ObjectStore,
    bucket: &'a str,
    ttl: &'a TtlConfig,
    suffix: PdfTextSuffix,
}

impl<'a> Locator<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        bucket: &'a str,
        ttl: &'a TtlConfig,
        suffix: PdfTextSuffix,
    ) -> Self {
        Self {
            store,
            bucket,
            ttl,
            suffix,
        }
    }

    /// Object keys for one record, capped at the type's URL cardinality.
    /// Lookup uses the record name exactly as the inventory spells it;
    /// reconciliation compares canonical ids, so a row whose spelling only
    /// matches storage after canonicalization shows up there as a name
    /// mismatch rather than here.
    pub fn keys_for(
        &self,
        file_type: FileType,
        box_id: &NormalizedBoxId,
        record_name: &str,
    ) -> Result<Vec<String>, StorageError> {
        let prefix = resolve(file_type, box_id, record_name, self.suffix);
        let listing = list_all(self.store, self.bucket, &prefix, Some("/"))?;
        let mut keys = match file_type.layout() {
            Layout::Folder => listing.files,
            Layout::File => listing.files.into_iter().filter(|k| *k == prefix).collect(),
        };
        if let Some(max) = file_type.max_urls()
            && keys.len() > max
        {
            tracing::debug!(
                file_type = file_type.as_str(),
                prefix = %prefix,
                found = keys.len(),
                "keeping first object only"
            );
            keys.truncate(max);
        }
        Ok(keys)
    }

    pub fn resolve_type(
        &self,
        file_type: FileType,
        box_id: &NormalizedBoxId,
        record_name: &str,
    ) -> Resolution {
        let keys = match self.keys_for(file_type, box_id, record_name) {
            Ok(keys) => keys,
            Err(err) => return Resolution::Failed(err.to_string()),
        };
        if keys.is_empty() {
            return Resolution::Missing;
        }

        let ttl = self.ttl.for_type(file_type);
        let urls = keys
            .iter()
            .map(|key| self.store.url_for(self.bucket, key, ttl))
            .collect::<Result<Vec<_>, _>>();
        match urls {
            Ok(urls) => Resolution::Found(urls),
            Err(err) => Resolution::Failed(err.to_string()),
        }
    }

    pub fn resolve_record(&self, box_id: &NormalizedBoxId, row: &InventoryRow) -> ResolvedRecord {
        let artifacts = FileType::ALL
            .iter()
            .map(|ft| (*ft, self.resolve_type(*ft, box_id, &row.record_name)))
            .collect();
        ResolvedRecord {
            record_id: row.record_id.clone(),
            record_name: row.record_name.clone(),
            artifacts,
        }
    }

    /// Resolves every row, in row order, using up to `workers` threads.
    pub fn resolve_all(
        &self,
        box_id: &NormalizedBoxId,
        rows: &[InventoryRow],
        workers: usize,
    ) -> Vec<ResolvedRecord> {
        if workers <= 1 || rows.len() <= 1 {
            return rows
                .iter()
                .map(|row| self.resolve_record(box_id, row))
                .collect();
        }

        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<ResolvedRecord>>> = Mutex::new(vec![None; rows.len()]);
        thread::scope(|scope| {
            for _ in 0..workers.min(rows.len()) {
                scope.spawn(|| {
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(row) = rows.get(i) else {
                            break;
                        };
                        let resolved = self.resolve_record(box_id, row);
                        slots.lock().unwrap_or_else(PoisonError::into_inner)[i] = Some(resolved);
                    }
                });
            }
        });

        slots
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .flatten()
            .collect()
    }

    /// Record names present in storage for one box, grouped by canonical id.
    pub fn storage_names(
        &self,
        file_type: FileType,
        box_id: &NormalizedBoxId,
    ) -> Result<BTreeMap<String, BTreeSet<String>>, StorageError> {
        let prefix = box_prefix(file_type, box_id);
        let listing = list_all(self.store, self.bucket, &prefix, Some("/"))?;
        let names: Vec<&str> = match file_type.layout() {
            Layout::Folder => listing
                .folders
                .iter()
                .filter(|folder| **folder != prefix)
                .filter_map(|folder| folder.strip_prefix(&prefix))
                .map(|name| name.trim_end_matches('/'))
                .filter(|name| !name.is_empty())
                .collect(),
            Layout::File => listing
                .files
                .iter()
                .filter_map(|key| key.strip_prefix(&prefix))
                .filter_map(|name| name.strip_suffix(self.suffix.as_str()))
                .filter(|name| !name.is_empty())
                .collect(),
        };

        let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for name in names {
            out.entry(canonical_id(name))
                .or_default()
                .insert(name.to_string());
        }
        Ok(out)
    }

    /// Canonical record identifiers present in storage for one box.
    pub fn storage_ids(
        &self,
        file_type: FileType,
        box_id: &NormalizedBoxId,
    ) -> Result<BTreeSet<String>, StorageError> {
        Ok(self.storage_names(file_type, box_id)?.into_keys().collect())
    }
}
