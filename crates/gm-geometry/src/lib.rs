#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("extent coordinates must be finite, got ({minx}, {miny}, {maxx}, {maxy})")]
    NonFinite {
        minx: f64,
        miny: f64,
        maxx: f64,
        maxy: f64,
    },
    #[error("extent minimum exceeds maximum on the {axis} axis ({min} > {max})")]
    Inverted { axis: char, min: f64, max: f64 },
}

/// Axis-aligned bounding box `(minx, miny, maxx, maxy)`.
///
/// Zero width or height is a valid extent; "no extent" is expressed as
/// `Option<Extent>::None` by callers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct Extent {
    minx: f64,
    miny: f64,
    maxx: f64,
    maxy: f64,
}

impl Extent {
    pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Result<Self, GeometryError> {
        if ![minx, miny, maxx, maxy].iter().all(|v| v.is_finite()) {
            return Err(GeometryError::NonFinite {
                minx,
                miny,
                maxx,
                maxy,
            });
        }
        if minx > maxx {
            return Err(GeometryError::Inverted {
                axis: 'x',
                min: minx,
                max: maxx,
            });
        }
        if miny > maxy {
            return Err(GeometryError::Inverted {
                axis: 'y',
                min: miny,
                max: maxy,
            });
        }
        Ok(Self {
            minx,
            miny,
            maxx,
            maxy,
        })
    }

    #[must_use]
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        (self.minx, self.miny, self.maxx, self.maxy)
    }

    /// Common part of both boxes, `None` when they do not meet. Boxes that
    /// only touch share a zero-area extent.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let minx = self.minx.max(other.minx);
        let miny = self.miny.max(other.miny);
        let maxx = self.maxx.min(other.maxx);
        let maxy = self.maxy.min(other.maxy);
        if minx > maxx || miny > maxy {
            return None;
        }
        Some(Self {
            minx,
            miny,
            maxx,
            maxy,
        })
    }

    /// Smallest box covering both.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            minx: self.minx.min(other.minx),
            miny: self.miny.min(other.miny),
            maxx: self.maxx.max(other.maxx),
            maxy: self.maxy.max(other.maxy),
        }
    }
}

impl TryFrom<[f64; 4]> for Extent {
    type Error = GeometryError;

    fn try_from([minx, miny, maxx, maxy]: [f64; 4]) -> Result<Self, Self::Error> {
        Self::new(minx, miny, maxx, maxy)
    }
}

impl From<Extent> for [f64; 4] {
    fn from(extent: Extent) -> Self {
        [extent.minx, extent.miny, extent.maxx, extent.maxy]
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.minx, self.miny, self.maxx, self.maxy
        )
    }
}

/// Opaque coordinate reference system token such as `EPSG:28992`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Projection(String);

impl Projection {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
