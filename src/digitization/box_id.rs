use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Box name in its storage-prefix form (`BOITE_O0454`, `B_001`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NormalizedBoxId(String);

impl NormalizedBoxId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedBoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical comparison form shared by box names and record identifiers.
pub fn canonical_id(raw: &str) -> String {
    raw.trim().to_uppercase().replace('-', "_")
}

/// Takes the file name of `box_name`, drops everything from the first `.`
/// and canonicalizes the rest.
pub fn normalize(box_name: &str) -> NormalizedBoxId {
    let file_name = Path::new(box_name.trim())
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(box_name);
    let stem = file_name.split('.').next().unwrap_or(file_name);
    NormalizedBoxId(canonical_id(stem))
}
