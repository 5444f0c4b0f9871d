//! The canonical wide-format table shared by every data source.
//!
//! A temporal table has one row per calendar date and one column per
//! `(region, item)` pair; a geographical table has one row per region and
//! one column per item. Columns are kept in a `BTreeMap`, so column order is
//! always sorted and duplicate column keys are impossible by construction:
//! merges keep the first occurrence.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use vigia_common::{Result, VigiaError};

use crate::types::Classification;

/// A single cell. Absent cells have no entry at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(_) => None,
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// Row indexer: a calendar date for temporal tables, a region name for
/// geographical ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RowKey {
    Date(NaiveDate),
    Region(String),
}

impl RowKey {
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            RowKey::Date(d) => Some(*d),
            RowKey::Region(_) => None,
        }
    }
}

/// An item name plus an optional sub-item variant.
///
/// Sources that split one dataset into sub-categories (age bands, activity
/// sectors) report columns like "EmploymentRate (Industry)". The variant is
/// kept as a structured field so display-name translation stays an exact
/// lookup on `name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemLabel {
    pub name: String,
    pub variant: Option<String>,
}

impl ItemLabel {
    pub fn new(name: impl Into<String>) -> Self {
        ItemLabel { name: name.into(), variant: None }
    }

    pub fn with_variant(name: impl Into<String>, variant: impl Into<String>) -> Self {
        ItemLabel { name: name.into(), variant: Some(variant.into()) }
    }

    /// The label with `name` replaced and the variant preserved.
    pub fn renamed(&self, name: &str) -> ItemLabel {
        ItemLabel { name: name.to_string(), variant: self.variant.clone() }
    }
}

impl std::fmt::Display for ItemLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{} ({})", self.name, variant),
            None => f.write_str(&self.name),
        }
    }
}

/// Column indexer: `(region, item)` for temporal tables, bare item for
/// geographical ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnKey {
    pub region: Option<String>,
    pub item: ItemLabel,
}

impl ColumnKey {
    pub fn temporal(region: impl Into<String>, item: ItemLabel) -> Self {
        ColumnKey { region: Some(region.into()), item }
    }

    pub fn geographical(item: ItemLabel) -> Self {
        ColumnKey { region: None, item }
    }
}

/// The canonical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    classification: Classification,
    columns: BTreeMap<ColumnKey, BTreeMap<RowKey, CellValue>>,
    rows: BTreeSet<RowKey>,
}

impl DataTable {
    pub fn new(classification: Classification) -> Self {
        DataTable { classification, columns: BTreeMap::new(), rows: BTreeSet::new() }
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    /// Insert one cell, registering the row.
    pub fn set(&mut self, row: RowKey, column: ColumnKey, value: CellValue) {
        self.rows.insert(row.clone());
        self.columns.entry(column).or_default().insert(row, value);
    }

    pub fn get(&self, row: &RowKey, column: &ColumnKey) -> Option<&CellValue> {
        self.columns.get(column)?.get(row)
    }

    pub fn row_keys(&self) -> impl Iterator<Item = &RowKey> {
        self.rows.iter()
    }

    pub fn column_keys(&self) -> impl Iterator<Item = &ColumnKey> {
        self.columns.keys()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// True when no cell holds a value.
    pub fn is_empty(&self) -> bool {
        self.columns.values().all(|cells| cells.is_empty())
    }

    /// First date of the row index (temporal tables).
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.iter().next().and_then(RowKey::as_date)
    }

    /// Last date of the row index (temporal tables).
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.iter().next_back().and_then(RowKey::as_date)
    }

    /// Column-wise outer join. Columns already present win; rows are the
    /// union of both row indexes. Disjoint merges therefore commute.
    pub fn merge(&mut self, other: DataTable) -> Result<()> {
        if other.classification != self.classification {
            return Err(VigiaError::Validation(format!(
                "cannot merge a {} table into a {} table",
                other.classification, self.classification
            )));
        }
        for (column, cells) in other.columns {
            self.columns.entry(column).or_insert(cells);
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Force the row index to exactly one row per calendar day in
    /// `[start, end]`, dropping cells outside the range. Days without data
    /// stay as rows with absent cells.
    pub fn reindex_dates(&mut self, start: NaiveDate, end: NaiveDate) {
        self.rows = start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(RowKey::Date)
            .collect();
        let rows = &self.rows;
        for cells in self.columns.values_mut() {
            cells.retain(|row, _| rows.contains(row));
        }
    }

    /// Keep only rows inside `[start, end]`.
    pub fn retain_dates(&mut self, start: NaiveDate, end: NaiveDate) {
        let in_range = |row: &RowKey| match row.as_date() {
            Some(d) => d >= start && d <= end,
            None => false,
        };
        self.rows.retain(in_range);
        for cells in self.columns.values_mut() {
            cells.retain(|row, _| in_range(row));
        }
    }

    /// Keep only the given regions: filters columns for temporal tables and
    /// rows for geographical ones.
    pub fn retain_regions(&mut self, regions: &[String]) {
        match self.classification {
            Classification::Temporal => {
                self.columns.retain(|column, _| {
                    column.region.as_deref().is_some_and(|r| regions.iter().any(|x| x == r))
                });
            }
            Classification::Geographical => {
                let keep = |row: &RowKey| match row {
                    RowKey::Region(r) => regions.iter().any(|x| x == r),
                    RowKey::Date(_) => false,
                };
                self.rows.retain(keep);
                for cells in self.columns.values_mut() {
                    cells.retain(|row, _| keep(row));
                }
            }
        }
    }

    /// Keep only columns whose item name is in `names`.
    pub fn retain_item_names(&mut self, names: &BTreeSet<String>) {
        self.columns.retain(|column, _| names.contains(&column.item.name));
    }

    /// Rename item names through an exact mapping, dropping unmapped
    /// columns. Variants are preserved. Collisions keep the first column.
    pub fn rename_items(&mut self, mapping: &BTreeMap<String, String>) {
        let old = std::mem::take(&mut self.columns);
        for (column, cells) in old {
            if let Some(new_name) = mapping.get(&column.item.name) {
                let renamed = ColumnKey {
                    region: column.region,
                    item: column.item.renamed(new_name),
                };
                self.columns.entry(renamed).or_insert(cells);
            }
        }
    }

    /// Row-wise append: every row present in `newer` fully replaces the same
    /// row here (newest row per date wins), and new columns are added.
    pub fn upsert_rows(&mut self, newer: DataTable) {
        for row in &newer.rows {
            for cells in self.columns.values_mut() {
                cells.remove(row);
            }
        }
        for (column, cells) in newer.columns {
            let target = self.columns.entry(column).or_default();
            for (row, value) in cells {
                target.insert(row, value);
            }
        }
        self.rows.extend(newer.rows);
    }
}
