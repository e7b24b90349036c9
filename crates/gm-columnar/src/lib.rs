#![forbid(unsafe_code)]

use gm_types::{DType, Scalar, TypeError, cast_scalar_owned, infer_dtype};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One attribute column of a feature table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    dtype: DType,
    values: Vec<Scalar>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColumnError {
    #[error("row position {position} out of bounds for column length {len}")]
    PositionOutOfBounds { position: usize, len: usize },
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl Column {
    /// Construct a column, coercing values to `dtype`. Nulls are remapped to
    /// the dtype-specific missing marker.
    pub fn new(dtype: DType, values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let coerced = values
            .into_iter()
            .map(|value| cast_scalar_owned(value, dtype))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            dtype,
            values: coerced,
        })
    }

    pub fn from_values(values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let dtype = infer_dtype(&values)?;
        Self::new(dtype, values)
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    /// Gather rows by position. `None` slots become the missing marker for
    /// this column's dtype; an out-of-range position is an error.
    pub fn reindex_by_positions(&self, positions: &[Option<usize>]) -> Result<Self, ColumnError> {
        let values = positions
            .iter()
            .map(|slot| match slot {
                Some(idx) => {
                    self.values
                        .get(*idx)
                        .cloned()
                        .ok_or(ColumnError::PositionOutOfBounds {
                            position: *idx,
                            len: self.len(),
                        })
                }
                None => Ok(Scalar::missing_for_dtype(self.dtype)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(self.dtype, values)
    }
}
