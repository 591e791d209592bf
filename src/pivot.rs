//! Pivot long-format sample annotations into a dense per-sample table.
//!
//! Annotations are stored as (sample_accession, key, val) rows. Exports want
//! one row per sample with one column per key, so the sparse rows are cast
//! into a table whose columns are the union of all keys seen, in order of
//! first appearance, with missing cells filled by a default token.

use std::collections::HashMap;

use crate::models::Annotation;

/// Cell value used wherever a sample has no annotation for a column
pub const MISSING: &str = "NA";

/// Row storage of the pivoted table, keyed by sample accession
pub type PivotRows = HashMap<i32, HashMap<String, String>>;

/// Group annotation rows by sample accession, preserving input order within
/// each group.
pub fn group_by_accession(annotations: Vec<Annotation>) -> HashMap<i32, Vec<Annotation>> {
    let mut grouped: HashMap<i32, Vec<Annotation>> = HashMap::new();
    for a in annotations {
        grouped.entry(a.sample_accession).or_insert_with(Vec::new).push(a);
    }
    grouped
}

/// Cast sparse annotations into a dense table with one row per accession in
/// `accessions`.
///
/// Returns the ordered column list and the row table. Rows exist for every
/// requested accession, annotated or not. When a key is first encountered,
/// the column is appended to the column list and every row is back-filled
/// with `default`, so each row holds a value for each returned column.
/// Annotations whose accession is not in `accessions` are dropped.
pub fn pivot(
    annotations: &[Annotation],
    accessions: &[i32],
    default: &str,
) -> (Vec<String>, PivotRows) {
    let mut columns: Vec<String> = Vec::new();
    let mut table: PivotRows = HashMap::new();
    for acc in accessions {
        table.insert(*acc, HashMap::new());
    }

    for a in annotations {
        if !table.contains_key(&a.sample_accession) {
            continue;
        }
        if !columns.iter().any(|c| c == &a.key) {
            // New column: back-fill every existing row before taking values
            for row in table.values_mut() {
                row.insert(a.key.clone(), default.to_string());
            }
            columns.push(a.key.clone());
        }
        if let Some(row) = table.get_mut(&a.sample_accession) {
            row.insert(a.key.clone(), a.val.clone());
        }
    }

    (columns, table)
}
