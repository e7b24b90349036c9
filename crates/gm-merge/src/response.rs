use gm_frame::FeatureTable;
use gm_geometry::{Extent, Projection};
use serde::{Deserialize, Serialize};

use crate::request::RequestMode;

/// Payload a node returns; the variant follows the request mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    /// Answer to `intersects` and `centroid` requests.
    Features {
        features: FeatureTable,
        projection: Projection,
    },
    /// Answer to `extent` requests; `None` when there is nothing to bound.
    Extent {
        extent: Option<Extent>,
        projection: Projection,
    },
}

impl Response {
    #[must_use]
    pub fn features(features: FeatureTable, projection: Projection) -> Self {
        Self::Features {
            features,
            projection,
        }
    }

    #[must_use]
    pub fn extent(extent: Option<Extent>, projection: Projection) -> Self {
        Self::Extent { extent, projection }
    }

    #[must_use]
    pub fn projection(&self) -> &Projection {
        match self {
            Self::Features { projection, .. } | Self::Extent { projection, .. } => projection,
        }
    }

    /// Whether this payload is the shape `mode` asks for.
    #[must_use]
    pub fn answers(&self, mode: RequestMode) -> bool {
        match self {
            Self::Features { .. } => matches!(mode, RequestMode::Intersects | RequestMode::Centroid),
            Self::Extent { .. } => mode == RequestMode::Extent,
        }
    }

    #[must_use]
    pub fn feature_table(&self) -> Option<&FeatureTable> {
        match self {
            Self::Features { features, .. } => Some(features),
            Self::Extent { .. } => None,
        }
    }

    /// `Some(None)` is an extent response without an extent.
    #[must_use]
    pub fn bounding_box(&self) -> Option<Option<Extent>> {
        match self {
            Self::Extent { extent, .. } => Some(*extent),
            Self::Features { .. } => None,
        }
    }
}
