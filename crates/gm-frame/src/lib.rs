#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use gm_columnar::{Column, ColumnError};
use gm_index::{Index, IndexLabel};
use gm_types::Scalar;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("index length ({index_len}) does not match column length ({column_len})")]
    LengthMismatch { index_len: usize, column_len: usize },
    #[error("column '{0}' not found in data")]
    UnknownColumn(String),
    #[error("duplicate column name: '{0}'")]
    DuplicateColumn(String),
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// Attribute table of a feature collection: one row per feature, keyed by a
/// stable index label, with named columns in an observable order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    index: Index,
    columns: BTreeMap<String, Column>,
    column_order: Vec<String>,
}

impl FeatureTable {
    fn validate_column_lengths(
        index: &Index,
        columns: &BTreeMap<String, Column>,
    ) -> Result<(), FrameError> {
        for column in columns.values() {
            if column.len() != index.len() {
                return Err(FrameError::LengthMismatch {
                    index_len: index.len(),
                    column_len: column.len(),
                });
            }
        }
        Ok(())
    }

    pub fn new(index: Index, columns: BTreeMap<String, Column>) -> Result<Self, FrameError> {
        let column_order = columns.keys().cloned().collect();
        Self::new_with_column_order(index, columns, column_order)
    }

    /// Construct with an explicit column order. Names missing from
    /// `column_order` are appended in name order.
    pub fn new_with_column_order(
        index: Index,
        columns: BTreeMap<String, Column>,
        column_order: Vec<String>,
    ) -> Result<Self, FrameError> {
        Self::validate_column_lengths(&index, &columns)?;

        let mut normalized = Vec::with_capacity(columns.len());
        let mut seen = BTreeSet::new();
        for name in column_order {
            if !columns.contains_key(&name) {
                return Err(FrameError::UnknownColumn(name));
            }
            if !seen.insert(name.clone()) {
                return Err(FrameError::DuplicateColumn(name));
            }
            normalized.push(name);
        }
        for name in columns.keys() {
            if !seen.contains(name) {
                normalized.push(name.clone());
            }
        }

        Ok(Self {
            index,
            columns,
            column_order: normalized,
        })
    }

    /// Build a table from index labels and `(name, values)` pairs; column
    /// order follows the input and dtypes are inferred.
    pub fn from_columns(
        labels: Vec<IndexLabel>,
        data: Vec<(&str, Vec<Scalar>)>,
    ) -> Result<Self, FrameError> {
        let index = Index::new(labels);
        let mut columns = BTreeMap::new();
        let mut order = Vec::with_capacity(data.len());
        for (name, values) in data {
            if values.len() != index.len() {
                return Err(FrameError::LengthMismatch {
                    index_len: index.len(),
                    column_len: values.len(),
                });
            }
            if columns
                .insert(name.to_owned(), Column::from_values(values)?)
                .is_some()
            {
                return Err(FrameError::DuplicateColumn(name.to_owned()));
            }
            order.push(name.to_owned());
        }

        Self::new_with_column_order(index, columns, order)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn columns(&self) -> &BTreeMap<String, Column> {
        &self.columns
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&String> {
        self.column_order.iter().collect()
    }

    #[must_use]
    pub fn column_set(&self) -> BTreeSet<String> {
        self.columns.keys().cloned().collect()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Columns in observable order.
    pub fn iter_columns(&self) -> impl Iterator<Item = (&String, &Column)> + '_ {
        self.column_order
            .iter()
            .filter_map(|name| self.columns.get_key_value(name))
    }
}
