#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identity of a feature row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IndexLabel {
    Int64(i64),
    Utf8(String),
}

impl From<i64> for IndexLabel {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<&str> for IndexLabel {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for IndexLabel {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl fmt::Display for IndexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    labels: Vec<IndexLabel>,
    #[serde(skip)]
    duplicate_cache: OnceLock<bool>,
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

impl Eq for Index {}

fn detect_duplicates(labels: &[IndexLabel]) -> bool {
    let mut seen = HashSet::<&IndexLabel>::with_capacity(labels.len());
    labels.iter().any(|label| !seen.insert(label))
}

impl Index {
    #[must_use]
    pub fn new(labels: Vec<IndexLabel>) -> Self {
        Self {
            labels,
            duplicate_cache: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn labels(&self) -> &[IndexLabel] {
        &self.labels
    }

    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        *self
            .duplicate_cache
            .get_or_init(|| detect_duplicates(&self.labels))
    }

    /// Every position at which each label occurs, in ascending order.
    #[must_use]
    pub fn position_groups(&self) -> HashMap<&IndexLabel, Vec<usize>> {
        let mut groups = HashMap::<&IndexLabel, Vec<usize>>::with_capacity(self.labels.len());
        for (pos, label) in self.labels.iter().enumerate() {
            groups.entry(label).or_default().push(pos);
        }
        groups
    }

    /// Distinct labels as an ordered set.
    #[must_use]
    pub fn label_set(&self) -> BTreeSet<&IndexLabel> {
        self.labels.iter().collect()
    }
}

/// Row-reconciliation discipline of an index-keyed merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    /// All left labels; right side fills with missing values.
    Left,
    /// All right labels; left side fills with missing values.
    Right,
    /// Only labels present on both sides.
    #[default]
    Inner,
    /// Union of both label sets.
    Outer,
}

impl JoinKind {
    pub const ALL: [Self; 4] = [Self::Left, Self::Right, Self::Outer, Self::Inner];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Inner => "inner",
            Self::Outer => "outer",
        }
    }

    /// Comma separated list of the accepted spellings.
    #[must_use]
    pub fn valid_names() -> String {
        Self::ALL
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JoinKind {
    type Err = IndexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| IndexError::UnsupportedJoinKind {
                given: value.to_owned(),
            })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("'{given}' is not part of the list of operations: {}", JoinKind::valid_names())]
    UnsupportedJoinKind { given: String },
}

/// Enumerate the output rows of an index-keyed merge as
/// `(label, left_position, right_position)`.
///
/// Duplicate labels match many-to-many. `Left` and `Inner` follow left row
/// order, `Right` follows right row order and `Outer` emits the sorted union.
pub fn visit_join_rows<F>(left: &Index, right: &Index, kind: JoinKind, mut emit: F)
where
    F: FnMut(&IndexLabel, Option<usize>, Option<usize>),
{
    match kind {
        JoinKind::Left | JoinKind::Inner => {
            let right_groups = right.position_groups();
            for (left_pos, label) in left.labels().iter().enumerate() {
                match right_groups.get(label) {
                    Some(matches) => {
                        for right_pos in matches {
                            emit(label, Some(left_pos), Some(*right_pos));
                        }
                    }
                    None if kind == JoinKind::Left => emit(label, Some(left_pos), None),
                    None => {}
                }
            }
        }
        JoinKind::Right => {
            let left_groups = left.position_groups();
            for (right_pos, label) in right.labels().iter().enumerate() {
                match left_groups.get(label) {
                    Some(matches) => {
                        for left_pos in matches {
                            emit(label, Some(*left_pos), Some(right_pos));
                        }
                    }
                    None => emit(label, None, Some(right_pos)),
                }
            }
        }
        JoinKind::Outer => {
            let left_groups = left.position_groups();
            let right_groups = right.position_groups();
            let union: BTreeSet<&IndexLabel> = left
                .label_set()
                .union(&right.label_set())
                .copied()
                .collect();

            for label in union {
                match (left_groups.get(label), right_groups.get(label)) {
                    (Some(lefts), Some(rights)) => {
                        for left_pos in lefts {
                            for right_pos in rights {
                                emit(label, Some(*left_pos), Some(*right_pos));
                            }
                        }
                    }
                    (Some(lefts), None) => {
                        for left_pos in lefts {
                            emit(label, Some(*left_pos), None);
                        }
                    }
                    (None, Some(rights)) => {
                        for right_pos in rights {
                            emit(label, None, Some(*right_pos));
                        }
                    }
                    (None, None) => {}
                }
            }
        }
    }
}

/// Number of rows `visit_join_rows` will emit, without materialising them.
#[must_use]
pub fn count_join_rows(left: &Index, right: &Index, kind: JoinKind) -> usize {
    let left_groups = left.position_groups();
    let right_groups = right.position_groups();
    let matched = |groups: &HashMap<&IndexLabel, Vec<usize>>, label: &IndexLabel| {
        groups.get(label).map_or(0, Vec::len)
    };

    match kind {
        JoinKind::Inner => left
            .labels()
            .iter()
            .map(|label| matched(&right_groups, label))
            .sum(),
        JoinKind::Left => left
            .labels()
            .iter()
            .map(|label| matched(&right_groups, label).max(1))
            .sum(),
        JoinKind::Right => right
            .labels()
            .iter()
            .map(|label| matched(&left_groups, label).max(1))
            .sum(),
        JoinKind::Outer => left
            .label_set()
            .union(&right.label_set())
            .map(|label| {
                let lefts = matched(&left_groups, *label);
                let rights = matched(&right_groups, *label);
                match (lefts, rights) {
                    (0, n) | (n, 0) => n,
                    (l, r) => l * r,
                }
            })
            .sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Index, IndexError, IndexLabel, JoinKind, count_join_rows, visit_join_rows};

    type Row = (IndexLabel, Option<usize>, Option<usize>);

    fn ints(values: &[i64]) -> Index {
        Index::new(values.iter().copied().map(IndexLabel::from).collect())
    }

    fn rows(left: &Index, right: &Index, kind: JoinKind) -> Vec<Row> {
        let mut out = Vec::new();
        visit_join_rows(left, right, kind, |label, left_pos, right_pos| {
            out.push((label.clone(), left_pos, right_pos));
        });
        out
    }

    fn row(label: i64, left: Option<usize>, right: Option<usize>) -> Row {
        (IndexLabel::from(label), left, right)
    }

    #[test]
    fn left_rows_keep_every_left_row_in_order() {
        assert_eq!(
            rows(&ints(&[3, 1, 2]), &ints(&[2, 4]), JoinKind::Left),
            vec![
                row(3, Some(0), None),
                row(1, Some(1), None),
                row(2, Some(2), Some(0)),
            ]
        );
    }

    #[test]
    fn right_rows_follow_right_order() {
        assert_eq!(
            rows(&ints(&[1, 2]), &ints(&[2, 5]), JoinKind::Right),
            vec![row(2, Some(1), Some(0)), row(5, None, Some(1))]
        );
    }

    #[test]
    fn inner_rows_drop_unmatched_labels() {
        assert_eq!(
            rows(&ints(&[1, 2, 3]), &ints(&[3, 2, 9]), JoinKind::Inner),
            vec![row(2, Some(1), Some(1)), row(3, Some(2), Some(0))]
        );
    }

    #[test]
    fn outer_rows_emit_sorted_union() {
        assert_eq!(
            rows(&ints(&[4, 1]), &ints(&[3, 1]), JoinKind::Outer),
            vec![
                row(1, Some(1), Some(1)),
                row(3, None, Some(0)),
                row(4, Some(0), None),
            ]
        );
    }

    #[test]
    fn duplicate_labels_match_many_to_many() {
        let left = Index::new(vec!["k".into(), "k".into(), "x".into()]);
        let right = Index::new(vec!["k".into(), "k".into()]);
        let positions: Vec<_> = rows(&left, &right, JoinKind::Inner)
            .into_iter()
            .map(|(_, l, r)| (l, r))
            .collect();
        assert_eq!(
            positions,
            vec![
                (Some(0), Some(0)),
                (Some(0), Some(1)),
                (Some(1), Some(0)),
                (Some(1), Some(1)),
            ]
        );
    }

    #[test]
    fn row_count_matches_visited_rows_for_every_kind() {
        let left = Index::new(vec!["k".into(), "k".into(), "x".into(), "y".into()]);
        let right = Index::new(vec!["k".into(), "z".into(), "k".into(), "y".into()]);
        for kind in JoinKind::ALL {
            assert_eq!(
                count_join_rows(&left, &right, kind),
                rows(&left, &right, kind).len(),
                "{kind}"
            );
        }
    }

    #[test]
    fn empty_side_yields_no_inner_rows() {
        assert!(rows(&ints(&[1, 2]), &ints(&[]), JoinKind::Inner).is_empty());
    }

    #[test]
    fn join_kind_parses_known_names_only() {
        assert_eq!("outer".parse::<JoinKind>(), Ok(JoinKind::Outer));
        let err = "bogus".parse::<JoinKind>().expect_err("unknown join kind");
        assert_eq!(
            err,
            IndexError::UnsupportedJoinKind {
                given: "bogus".to_owned()
            }
        );
        assert_eq!(
            err.to_string(),
            "'bogus' is not part of the list of operations: left, right, outer, inner"
        );
    }

    #[test]
    fn duplicate_detection_is_cached_but_not_compared() {
        let cached = Index::new(vec!["a".into(), "a".into(), "b".into()]);
        assert!(cached.has_duplicates());
        let fresh = Index::new(vec!["a".into(), "a".into(), IndexLabel::from("b")]);
        assert_eq!(cached, fresh);
    }
}
