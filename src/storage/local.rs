use crate::storage::{ListPage, ObjectStore, StorageError};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Unreserved URL characters plus `/`, which separates key segments.
const KEY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Directory-backed store: object `key` of `bucket` lives at
/// `{root}/{bucket}/{key}`. Empty directories surface as `/`-terminated
/// marker keys, the way S3 consoles create folders.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    url_base: String,
    page_size: usize,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, url_base: impl Into<String>, page_size: usize) -> Self {
        Self {
            root: root.into(),
            url_base: url_base.into(),
            page_size: page_size.max(1),
        }
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        let dir = self.root.join(bucket);
        if !dir.is_dir() {
            return Err(StorageError::Unavailable(format!(
                "bucket `{bucket}` not found under {}",
                self.root.display()
            )));
        }
        Ok(dir)
    }

    /// Every key under `prefix`, with `true` for folder entries.
    fn entries(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<BTreeMap<String, bool>, StorageError> {
        let bucket_dir = self.bucket_dir(bucket)?;
        let walk_base = match prefix.rfind('/') {
            Some(pos) => bucket_dir.join(&prefix[..pos]),
            None => bucket_dir.clone(),
        };

        let mut out = BTreeMap::new();
        if !walk_base.is_dir() {
            return Ok(out);
        }

        for entry in WalkDir::new(&walk_base).sort_by_file_name() {
            let entry = entry.map_err(|err| StorageError::Io {
                key: prefix.to_string(),
                source: err.into(),
            })?;
            let Some(mut key) = relative_key(&bucket_dir, entry.path()) else {
                continue;
            };
            if entry.file_type().is_dir() {
                let is_empty = fs::read_dir(entry.path())
                    .map_err(|source| StorageError::Io {
                        key: key.clone(),
                        source,
                    })?
                    .next()
                    .is_none();
                if !is_empty {
                    continue;
                }
                key.push('/');
            }
            if !key.starts_with(prefix) {
                continue;
            }

            let rest = &key[prefix.len()..];
            match delimiter.and_then(|d| rest.find(d).map(|pos| pos + d.len())) {
                Some(end) => {
                    out.insert(format!("{prefix}{}", &rest[..end]), true);
                }
                None => {
                    out.insert(key, false);
                }
            }
        }
        Ok(out)
    }
}

fn relative_key(bucket_dir: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(bucket_dir).ok()?;
    let parts = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn object_path(bucket_dir: &Path, key: &str) -> Option<PathBuf> {
    let rel = Path::new(key);
    if rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(bucket_dir.join(rel))
}

impl ObjectStore for LocalStore {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        continuation: Option<&str>,
    ) -> Result<ListPage, StorageError> {
        let entries = self.entries(bucket, prefix, delimiter)?;
        let mut remaining = entries
            .into_iter()
            .filter(|(key, _)| continuation.is_none_or(|token| key.as_str() > token));

        let mut page = ListPage::default();
        let mut last = None;
        for (key, is_folder) in remaining.by_ref().take(self.page_size) {
            last = Some(key.clone());
            if is_folder {
                page.folders.push(key);
            } else {
                page.files.push(key);
            }
        }
        if remaining.next().is_some() {
            page.next = last;
        }
        Ok(page)
    }

    fn url_for(&self, bucket: &str, key: &str, ttl_secs: u64) -> Result<String, StorageError> {
        Ok(format!(
            "{}/{}/{}?ttl={}",
            self.url_base.trim_end_matches('/'),
            bucket,
            utf8_percent_encode(key, KEY_SET),
            ttl_secs
        ))
    }

    fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let bucket_dir = self.bucket_dir(bucket)?;
        let path =
            object_path(&bucket_dir, key).ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        if !path.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        fs::read(&path).map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })
    }
}
