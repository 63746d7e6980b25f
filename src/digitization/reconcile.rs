use crate::digitization::box_id::{NormalizedBoxId, canonical_id};
use crate::digitization::inventory::InventoryRow;
use crate::digitization::locator::{FileType, Locator};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeDiff {
    /// In storage, absent from the spreadsheet.
    pub missing_in_inventory: BTreeSet<String>,
    /// In the spreadsheet, absent from storage.
    pub missing_in_storage: BTreeSet<String>,
    /// Inventory spelling to stored spelling, for rows that only match
    /// storage after canonicalization. Artifact lookup misses these rows.
    pub name_mismatches: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TypeReconciliation {
    Compared(TypeDiff),
    /// The storage listing failed, so nothing can be said about this type.
    Indeterminate { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub box_id: NormalizedBoxId,
    pub by_type: BTreeMap<FileType, TypeReconciliation>,
}

pub fn diff(storage_ids: &BTreeSet<String>, inventory_ids: &BTreeSet<String>) -> TypeDiff {
    TypeDiff {
        missing_in_inventory: storage_ids.difference(inventory_ids).cloned().collect(),
        missing_in_storage: inventory_ids.difference(storage_ids).cloned().collect(),
        name_mismatches: BTreeMap::new(),
    }
}

fn name_mismatches(
    rows: &[InventoryRow],
    stored: &BTreeMap<String, BTreeSet<String>>,
) -> BTreeMap<String, String> {
    rows.iter()
        .filter_map(|row| {
            let spellings = stored.get(&canonical_id(&row.record_name))?;
            if spellings.contains(&row.record_name) {
                return None;
            }
            let first = spellings.iter().next()?;
            Some((row.record_name.clone(), first.clone()))
        })
        .collect()
}

pub fn inventory_ids(rows: &[InventoryRow]) -> BTreeSet<String> {
    rows.iter().map(|row| canonical_id(&row.record_name)).collect()
}

pub fn reconcile(
    locator: &Locator<'_>,
    box_id: &NormalizedBoxId,
    rows: &[InventoryRow],
) -> ReconciliationReport {
    let expected = inventory_ids(rows);
    let by_type = FileType::ALL
        .iter()
        .map(|ft| {
            let outcome = match locator.storage_names(*ft, box_id) {
                Ok(stored) => {
                    let actual = stored.keys().cloned().collect();
                    let mut compared = diff(&actual, &expected);
                    compared.name_mismatches = name_mismatches(rows, &stored);
                    TypeReconciliation::Compared(compared)
                }
                Err(err) => TypeReconciliation::Indeterminate {
                    error: err.to_string(),
                },
            };
            (*ft, outcome)
        })
        .collect();

    ReconciliationReport {
        box_id: box_id.clone(),
        by_type,
    }
}

impl ReconciliationReport {
    fn lines(&self, pick: impl Fn(&TypeDiff) -> &BTreeSet<String>) -> Vec<String> {
        let mut out = Vec::new();
        for (ft, outcome) in &self.by_type {
            if let TypeReconciliation::Compared(d) = outcome {
                for id in pick(d) {
                    out.push(format!("{} {} {}", self.box_id, ft.as_str(), id));
                }
            }
        }
        out
    }

    pub fn missing_in_inventory_lines(&self) -> Vec<String> {
        self.lines(|d| &d.missing_in_inventory)
    }

    pub fn missing_in_storage_lines(&self) -> Vec<String> {
        self.lines(|d| &d.missing_in_storage)
    }

    pub fn name_mismatch_lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (ft, outcome) in &self.by_type {
            if let TypeReconciliation::Compared(d) = outcome {
                for (listed, stored) in &d.name_mismatches {
                    out.push(format!(
                        "{} {} {listed} stored as {stored}",
                        self.box_id,
                        ft.as_str()
                    ));
                }
            }
        }
        out
    }

    pub fn indeterminate(&self) -> Vec<(FileType, &str)> {
        self.by_type
            .iter()
            .filter_map(|(ft, outcome)| match outcome {
                TypeReconciliation::Indeterminate { error } => Some((*ft, error.as_str())),
                TypeReconciliation::Compared(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digitization::box_id::normalize;
    use crate::digitization::config::TtlConfig;
    use crate::digitization::locator::PdfTextSuffix;
    use crate::storage::local::LocalStore;
    use crate::storage::testing::FaultyStore;
    use proptest::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join("bucket").join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, b"x").expect("write");
    }

    fn rows(names: &[&str]) -> Vec<InventoryRow> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| InventoryRow {
                record_id: (i + 1).to_string(),
                record_name: name.to_string(),
            })
            .collect()
    }

    proptest! {
        #[test]
        fn diff_sides_are_disjoint_and_cover_symmetric_difference(
            storage in prop::collection::btree_set("[A-E]{1,2}", 0..24),
            inventory in prop::collection::btree_set("[A-E]{1,2}", 0..24),
        ) {
            let d = diff(&storage, &inventory);
            prop_assert!(d.missing_in_inventory.is_disjoint(&d.missing_in_storage));

            let symmetric: BTreeSet<String> =
                storage.symmetric_difference(&inventory).cloned().collect();
            let union: BTreeSet<String> = d
                .missing_in_inventory
                .union(&d.missing_in_storage)
                .cloned()
                .collect();
            prop_assert_eq!(symmetric, union);
        }
    }

    #[test]
    fn ids_are_compared_in_canonical_form() {
        let tmp = tempdir().expect("tempdir");
        touch(tmp.path(), "raw/PDF/B_001/rec-1/a.pdf");
        touch(tmp.path(), "raw/PDF/B_001/EXTRA/a.pdf");
        touch(tmp.path(), "raw/TIFF/B_001/REC_1/001.tif");
        touch(tmp.path(), "raw/PDF_LATEX/B_001/REC_1.pdf");
        let store = LocalStore::new(tmp.path(), "https://s3.example", 100);
        let ttl = TtlConfig::default();
        let locator = Locator::new(&store, "bucket", &ttl, PdfTextSuffix::Plain);

        let report = reconcile(&locator, &normalize("b-001.csv"), &rows(&["REC-1", "REC2"]));
        let Some(TypeReconciliation::Compared(pdf)) = report.by_type.get(&FileType::Pdf) else {
            panic!("pdf should be compared");
        };
        assert_eq!(pdf.missing_in_inventory.iter().collect::<Vec<_>>(), vec!["EXTRA"]);
        assert_eq!(pdf.missing_in_storage.iter().collect::<Vec<_>>(), vec!["REC2"]);

        assert_eq!(
            report.missing_in_inventory_lines(),
            vec!["B_001 PDF EXTRA".to_string()]
        );
        assert_eq!(
            report.missing_in_storage_lines(),
            vec![
                "B_001 PDF REC2".to_string(),
                "B_001 PDF_TEXT REC2".to_string(),
                "B_001 TIFF_SET REC2".to_string(),
            ]
        );
        assert_eq!(
            report.name_mismatch_lines(),
            vec![
                "B_001 PDF REC-1 stored as rec-1".to_string(),
                "B_001 PDF_TEXT REC-1 stored as REC_1".to_string(),
                "B_001 TIFF_SET REC-1 stored as REC_1".to_string(),
            ]
        );
    }

    #[test]
    fn exact_spelling_is_not_a_mismatch_even_beside_a_variant() {
        let tmp = tempdir().expect("tempdir");
        touch(tmp.path(), "raw/PDF/B_001/rec-1/a.pdf");
        touch(tmp.path(), "raw/PDF/B_001/REC_1/a.pdf");
        let store = LocalStore::new(tmp.path(), "https://s3.example", 100);
        let ttl = TtlConfig::default();
        let locator = Locator::new(&store, "bucket", &ttl, PdfTextSuffix::Plain);

        let report = reconcile(&locator, &normalize("B_001"), &rows(&["rec-1"]));
        assert!(report.name_mismatch_lines().is_empty());
    }

    #[test]
    fn failing_type_is_indeterminate_without_touching_others() {
        let tmp = tempdir().expect("tempdir");
        touch(tmp.path(), "raw/PDF/B_001/REC1/a.pdf");
        let store = FaultyStore {
            inner: LocalStore::new(tmp.path(), "https://s3.example", 100),
            failing_prefixes: vec!["raw/TIFF/".to_string()],
        };
        let ttl = TtlConfig::default();
        let locator = Locator::new(&store, "bucket", &ttl, PdfTextSuffix::Plain);

        let report = reconcile(&locator, &normalize("B_001"), &rows(&["REC1"]));
        assert_eq!(
            report.by_type.get(&FileType::Pdf),
            Some(&TypeReconciliation::Compared(TypeDiff::default()))
        );
        let indeterminate = report.indeterminate();
        assert_eq!(indeterminate.len(), 1);
        assert_eq!(indeterminate[0].0, FileType::TiffSet);
        assert!(
            !report
                .missing_in_storage_lines()
                .iter()
                .any(|line| line.contains("TIFF_SET"))
        );
    }
}
