#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::mem::size_of;

use bumpalo::{Bump, collections::Vec as BumpVec};
use gm_columnar::{Column, ColumnError};
use gm_frame::{FeatureTable, FrameError};
use gm_index::{Index, IndexLabel, JoinKind, count_join_rows, visit_join_rows};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Text appended to overlapping column names, `(left, right)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Suffixes(pub String, pub String);

impl Suffixes {
    #[must_use]
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self(left.into(), right.into())
    }

    #[must_use]
    pub fn left(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn right(&self) -> &str {
        &self.1
    }
}

impl Default for Suffixes {
    fn default() -> Self {
        Self::new("", "_right")
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum JoinError {
    #[error("suffixed column name '{column}' is produced more than once")]
    SuffixCollision { column: String },
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// Column names produced by merging tables with the given column sets.
///
/// Names unique to one side pass through; every shared name `c` becomes
/// `c + left_suffix` and `c + right_suffix`. Independent of the join kind.
#[must_use]
pub fn merged_column_names(
    left: &BTreeSet<String>,
    right: &BTreeSet<String>,
    suffixes: &Suffixes,
) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = left.symmetric_difference(right).cloned().collect();
    for shared in left.intersection(right) {
        names.insert(format!("{shared}{}", suffixes.left()));
        names.insert(format!("{shared}{}", suffixes.right()));
    }
    names
}

pub const DEFAULT_ARENA_BUDGET_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinExecutionOptions {
    pub use_arena: bool,
    pub arena_budget_bytes: usize,
}

impl Default for JoinExecutionOptions {
    fn default() -> Self {
        Self {
            use_arena: true,
            arena_budget_bytes: DEFAULT_ARENA_BUDGET_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JoinExecutionTrace {
    used_arena: bool,
    output_rows: usize,
    estimated_bytes: usize,
}

/// Merge two feature tables on their index labels.
pub fn merge_on_index(
    left: &FeatureTable,
    right: &FeatureTable,
    kind: JoinKind,
    suffixes: &Suffixes,
) -> Result<FeatureTable, JoinError> {
    merge_on_index_with_options(left, right, kind, suffixes, JoinExecutionOptions::default())
}

pub fn merge_on_index_with_options(
    left: &FeatureTable,
    right: &FeatureTable,
    kind: JoinKind,
    suffixes: &Suffixes,
    options: JoinExecutionOptions,
) -> Result<FeatureTable, JoinError> {
    let (merged, _) = merge_with_trace(left, right, kind, suffixes, options)?;
    Ok(merged)
}

fn merge_with_trace(
    left: &FeatureTable,
    right: &FeatureTable,
    kind: JoinKind,
    suffixes: &Suffixes,
    options: JoinExecutionOptions,
) -> Result<(FeatureTable, JoinExecutionTrace), JoinError> {
    let layout = ColumnLayout::resolve(left, right, suffixes)?;

    let output_rows = count_join_rows(left.index(), right.index(), kind);
    let estimated_bytes = estimate_intermediate_bytes(output_rows);
    let use_arena = options.use_arena && estimated_bytes <= options.arena_budget_bytes;

    let merged = if use_arena {
        merge_with_arena(left, right, kind, &layout, output_rows)?
    } else {
        merge_with_global_allocator(left, right, kind, &layout, output_rows)?
    };

    let trace = JoinExecutionTrace {
        used_arena: use_arena,
        output_rows,
        estimated_bytes,
    };
    debug!(
        join = %kind,
        left_rows = left.len(),
        right_rows = right.len(),
        output_rows = trace.output_rows,
        used_arena = trace.used_arena,
        estimated_bytes = trace.estimated_bytes,
        duplicate_labels = left.index().has_duplicates() || right.index().has_duplicates(),
        "merged feature tables on index"
    );

    Ok((merged, trace))
}

fn estimate_intermediate_bytes(output_rows: usize) -> usize {
    output_rows.saturating_mul(
        size_of::<Option<usize>>()
            .saturating_mul(2)
            .saturating_add(size_of::<IndexLabel>()),
    )
}

/// Output name of every input column, in output order.
struct ColumnLayout {
    left: Vec<(String, String)>,
    right: Vec<(String, String)>,
}

impl ColumnLayout {
    fn resolve(
        left: &FeatureTable,
        right: &FeatureTable,
        suffixes: &Suffixes,
    ) -> Result<Self, JoinError> {
        let left_names = left.column_set();
        let right_names = right.column_set();
        let rename = |name: &String, shared_with: &BTreeSet<String>, suffix: &str| {
            if shared_with.contains(name) {
                format!("{name}{suffix}")
            } else {
                name.clone()
            }
        };

        let left_layout: Vec<(String, String)> = left
            .column_names()
            .into_iter()
            .map(|name| (name.clone(), rename(name, &right_names, suffixes.left())))
            .collect();
        let right_layout: Vec<(String, String)> = right
            .column_names()
            .into_iter()
            .map(|name| (name.clone(), rename(name, &left_names, suffixes.right())))
            .collect();

        let mut seen = BTreeSet::new();
        for (_, output) in left_layout.iter().chain(&right_layout) {
            if !seen.insert(output.as_str()) {
                return Err(JoinError::SuffixCollision {
                    column: output.clone(),
                });
            }
        }

        Ok(Self {
            left: left_layout,
            right: right_layout,
        })
    }
}

fn assemble(
    left: &FeatureTable,
    right: &FeatureTable,
    layout: &ColumnLayout,
    labels: Vec<IndexLabel>,
    left_positions: &[Option<usize>],
    right_positions: &[Option<usize>],
) -> Result<FeatureTable, JoinError> {
    let mut columns = BTreeMap::<String, Column>::new();
    let mut order = Vec::with_capacity(layout.left.len() + layout.right.len());

    for (table, names, positions) in [
        (left, &layout.left, left_positions),
        (right, &layout.right, right_positions),
    ] {
        for (input, output) in names {
            let Some(column) = table.column(input) else {
                return Err(FrameError::UnknownColumn(input.clone()).into());
            };
            columns.insert(output.clone(), column.reindex_by_positions(positions)?);
            order.push(output.clone());
        }
    }

    Ok(FeatureTable::new_with_column_order(
        Index::new(labels),
        columns,
        order,
    )?)
}

fn merge_with_global_allocator(
    left: &FeatureTable,
    right: &FeatureTable,
    kind: JoinKind,
    layout: &ColumnLayout,
    output_rows: usize,
) -> Result<FeatureTable, JoinError> {
    let mut labels = Vec::with_capacity(output_rows);
    let mut left_positions = Vec::<Option<usize>>::with_capacity(output_rows);
    let mut right_positions = Vec::<Option<usize>>::with_capacity(output_rows);

    visit_join_rows(left.index(), right.index(), kind, |label, left_pos, right_pos| {
        labels.push(label.clone());
        left_positions.push(left_pos);
        right_positions.push(right_pos);
    });

    assemble(
        left,
        right,
        layout,
        labels,
        &left_positions,
        &right_positions,
    )
}

fn merge_with_arena(
    left: &FeatureTable,
    right: &FeatureTable,
    kind: JoinKind,
    layout: &ColumnLayout,
    output_rows: usize,
) -> Result<FeatureTable, JoinError> {
    let arena = Bump::new();
    let mut labels = Vec::with_capacity(output_rows);
    let mut left_positions = BumpVec::<Option<usize>>::with_capacity_in(output_rows, &arena);
    let mut right_positions = BumpVec::<Option<usize>>::with_capacity_in(output_rows, &arena);

    visit_join_rows(left.index(), right.index(), kind, |label, left_pos, right_pos| {
        labels.push(label.clone());
        left_positions.push(left_pos);
        right_positions.push(right_pos);
    });

    assemble(
        left,
        right,
        layout,
        labels,
        left_positions.as_slice(),
        right_positions.as_slice(),
    )
}
