use gm_index::JoinKind;
use gm_join::{JoinExecutionOptions, Suffixes};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::args::{json_type_name, parse_join_kind, suffixes_from_value};
use crate::error::NodeError;

/// Validated, immutable settings of a merge node.
///
/// Deserialization goes through the same checks as [`MergeConfig::from_json`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct MergeConfig {
    pub how: JoinKind,
    pub suffixes: Suffixes,
    pub execution: JoinExecutionOptions,
}

impl MergeConfig {
    #[must_use]
    pub fn new(how: JoinKind, suffixes: Suffixes) -> Self {
        Self {
            how,
            suffixes,
            execution: JoinExecutionOptions::default(),
        }
    }

    /// Parse a JSON config document such as
    /// `{"how": "left", "suffixes": ["", "_soil"]}`. Missing keys take their
    /// defaults; a bad `how` or `suffixes` fails like the node constructor.
    pub fn from_json(text: &str) -> Result<Self, NodeError> {
        let value: Value = serde_json::from_str(text)?;
        Self::try_from(value)
    }
}

impl TryFrom<Value> for MergeConfig {
    type Error = NodeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut fields) = value else {
            return Err(NodeError::TypeConstraint {
                argument: "config",
                actual: json_type_name(&value).to_owned(),
            });
        };

        let how = match fields.remove("how") {
            None => JoinKind::default(),
            Some(Value::String(how)) => parse_join_kind(&how)?,
            Some(other) => {
                return Err(NodeError::TypeConstraint {
                    argument: "how",
                    actual: json_type_name(&other).to_owned(),
                });
            }
        };
        let suffixes = match fields.remove("suffixes") {
            None => Suffixes::default(),
            Some(value) => suffixes_from_value(&value)?,
        };
        let execution = match fields.remove("execution") {
            None => JoinExecutionOptions::default(),
            Some(value) => serde_json::from_value(value)?,
        };
        if let Some(unknown) = fields.keys().next() {
            return Err(NodeError::TypeConstraint {
                argument: "config",
                actual: format!("object with unknown key '{unknown}'"),
            });
        }

        Ok(Self {
            how,
            suffixes,
            execution,
        })
    }
}
