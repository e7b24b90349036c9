use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::args::json_type_name;
use crate::error::NodeError;

/// Representation a caller asks a node for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    /// Attribute table of the features intersecting the request geometry.
    Intersects,
    /// Attribute table of the features whose centroid lies in the request geometry.
    Centroid,
    /// Bounding box of the features.
    Extent,
}

impl RequestMode {
    pub const ALL: [Self; 3] = [Self::Intersects, Self::Centroid, Self::Extent];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intersects => "intersects",
            Self::Centroid => "centroid",
            Self::Extent => "extent",
        }
    }

    #[must_use]
    pub fn valid_names() -> String {
        Self::ALL
            .iter()
            .map(|mode| mode.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for RequestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestMode {
    type Err = NodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == value)
            .ok_or_else(|| NodeError::UnsupportedRequestMode {
                given: value.to_owned(),
                valid: Self::valid_names(),
            })
    }
}

/// A request: the wanted mode plus parameters (spatial filter, resolution,
/// ...) that are opaque to the merge node and forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct Request {
    pub mode: RequestMode,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl Request {
    #[must_use]
    pub fn new(mode: RequestMode) -> Self {
        Self {
            mode,
            params: Map::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Parse a request mapping. The `mode` key is mandatory and must name
    /// one of the known modes; all other keys are kept as parameters.
    pub fn from_json(value: Value) -> Result<Self, NodeError> {
        Self::try_from(value)
    }
}

impl TryFrom<Value> for Request {
    type Error = NodeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut params) = value else {
            return Err(NodeError::TypeConstraint {
                argument: "request",
                actual: json_type_name(&value).to_owned(),
            });
        };
        let mode = match params.remove("mode") {
            Some(Value::String(mode)) => mode.parse()?,
            Some(other) => {
                return Err(NodeError::TypeConstraint {
                    argument: "mode",
                    actual: json_type_name(&other).to_owned(),
                });
            }
            None => return Err(NodeError::MissingMode),
        };
        Ok(Self { mode, params })
    }
}
