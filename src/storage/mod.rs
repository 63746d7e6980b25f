//! Object-storage capability.
//!
//! The rest of the crate only sees [`ObjectStore`]; transport, credentials
//! and retries belong to implementations. A failed query is always an
//! `Err`, never an empty listing, so callers can tell "service unreachable"
//! apart from "nothing stored under this prefix".

pub mod local;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage read failed for `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("listing of `{prefix}` returned a continuation token that does not advance")]
    StalledPagination { prefix: String },
}

/// One page of a delimited listing. `next` is the continuation token for
/// the following page, absent on the last page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub files: Vec<String>,
    pub folders: Vec<String>,
    pub next: Option<String>,
}

/// A fully drained listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub files: Vec<String>,
    pub folders: Vec<String>,
}

pub trait ObjectStore: Send + Sync {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        continuation: Option<&str>,
    ) -> Result<ListPage, StorageError>;

    fn url_for(&self, bucket: &str, key: &str, ttl_secs: u64) -> Result<String, StorageError>;

    fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// Follows continuation tokens until the listing is exhausted. Folder
/// marker keys (ending in `/`) are dropped from `files`.
pub fn list_all(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    delimiter: Option<&str>,
) -> Result<Listing, StorageError> {
    let mut out = Listing::default();
    let mut token: Option<String> = None;

    loop {
        let page = store.list_page(bucket, prefix, delimiter, token.as_deref())?;
        out.files.extend(page.files.into_iter().filter(|key| !key.ends_with('/')));
        out.folders.extend(page.folders);

        match page.next {
            None => break,
            Some(next) if token.as_deref() == Some(next.as_str()) => {
                return Err(StorageError::StalledPagination {
                    prefix: prefix.to_string(),
                });
            }
            Some(next) => token = Some(next),
        }
    }

    out.files.sort();
    out.folders.sort();
    out.folders.dedup();
    Ok(out)
}


#[cfg(test)]
mod tests {
    use super::testing::StuckStore;
    use super::{StorageError, list_all};

    #[test]
    fn non_advancing_token_is_an_error_not_a_loop() {
        let err = list_all(&StuckStore, "bucket", "raw/", Some("/")).unwrap_err();
        assert!(matches!(err, StorageError::StalledPagination { .. }));
    }
}
