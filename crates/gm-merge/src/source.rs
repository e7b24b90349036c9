use std::collections::BTreeSet;
use std::fmt;

use gm_frame::FeatureTable;
use gm_geometry::{Extent, Projection};

use crate::error::NodeError;
use crate::request::{Request, RequestMode};
use crate::response::Response;

/// Capability every upstream of a merge must provide.
///
/// Implementations are shared between threads by the graph executor, so
/// both methods take `&self` and must not depend on call order.
pub trait GeometrySource: fmt::Debug + Send + Sync {
    /// Attribute columns this source produces, known without evaluation.
    fn columns(&self) -> BTreeSet<String>;

    /// Answer a request with a response shaped by `request.mode`.
    fn evaluate(&self, request: &Request) -> Result<Response, NodeError>;
}

/// Source backed by an attribute table and an optional extent held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySource {
    features: FeatureTable,
    extent: Option<Extent>,
    projection: Projection,
}

impl MemorySource {
    #[must_use]
    pub fn new(features: FeatureTable, projection: Projection) -> Self {
        Self {
            features,
            extent: None,
            projection,
        }
    }

    #[must_use]
    pub fn with_extent(mut self, extent: Option<Extent>) -> Self {
        self.extent = extent;
        self
    }

    #[must_use]
    pub fn features(&self) -> &FeatureTable {
        &self.features
    }
}

impl GeometrySource for MemorySource {
    fn columns(&self) -> BTreeSet<String> {
        self.features.column_set()
    }

    fn evaluate(&self, request: &Request) -> Result<Response, NodeError> {
        Ok(match request.mode {
            RequestMode::Intersects | RequestMode::Centroid => {
                Response::features(self.features.clone(), self.projection.clone())
            }
            RequestMode::Extent => Response::extent(self.extent, self.projection.clone()),
        })
    }
}
