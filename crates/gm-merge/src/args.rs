use std::sync::Arc;

use gm_index::JoinKind;
use gm_join::Suffixes;
use serde_json::Value;

use crate::error::NodeError;
use crate::source::GeometrySource;

/// Positional constructor argument as handed over by a graph builder.
#[derive(Debug, Clone)]
pub enum NodeArg {
    Source(Arc<dyn GeometrySource>),
    Value(Value),
}

impl NodeArg {
    /// Name of the argument's runtime type, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Source(_) => "geometry_source",
            Self::Value(value) => json_type_name(value),
        }
    }
}

impl From<Arc<dyn GeometrySource>> for NodeArg {
    fn from(source: Arc<dyn GeometrySource>) -> Self {
        Self::Source(source)
    }
}

impl From<Value> for NodeArg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for NodeArg {
    fn from(value: &str) -> Self {
        Self::Value(Value::String(value.to_owned()))
    }
}

#[must_use]
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn expect_source(
    argument: &'static str,
    arg: NodeArg,
) -> Result<Arc<dyn GeometrySource>, NodeError> {
    match arg {
        NodeArg::Source(source) => Ok(source),
        other => Err(NodeError::TypeConstraint {
            argument,
            actual: other.type_name().to_owned(),
        }),
    }
}

pub(crate) fn parse_join_kind(value: &str) -> Result<JoinKind, NodeError> {
    value
        .parse()
        .map_err(|_| NodeError::UnsupportedJoinKind {
            given: value.to_owned(),
            valid: JoinKind::valid_names(),
        })
}

pub(crate) fn join_kind_from_arg(arg: NodeArg) -> Result<JoinKind, NodeError> {
    match arg {
        NodeArg::Value(Value::String(how)) => parse_join_kind(&how),
        other => Err(NodeError::TypeConstraint {
            argument: "how",
            actual: other.type_name().to_owned(),
        }),
    }
}

/// Accept exactly two strings.
pub(crate) fn suffixes_from_slice<S: AsRef<str>>(values: &[S]) -> Result<Suffixes, NodeError> {
    match values {
        [left, right] => Ok(Suffixes::new(left.as_ref(), right.as_ref())),
        other => Err(NodeError::TypeConstraint {
            argument: "suffixes",
            actual: format!("sequence of length {}", other.len()),
        }),
    }
}

pub(crate) fn suffixes_from_value(value: &Value) -> Result<Suffixes, NodeError> {
    let Value::Array(items) = value else {
        return Err(NodeError::TypeConstraint {
            argument: "suffixes",
            actual: json_type_name(value).to_owned(),
        });
    };
    let strings = items
        .iter()
        .map(|item| {
            item.as_str().ok_or_else(|| NodeError::TypeConstraint {
                argument: "suffixes",
                actual: format!("array containing {}", json_type_name(item)),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    suffixes_from_slice(strings.as_slice())
}

pub(crate) fn suffixes_from_arg(arg: NodeArg) -> Result<Suffixes, NodeError> {
    match arg {
        NodeArg::Value(value) => suffixes_from_value(&value),
        other => Err(NodeError::TypeConstraint {
            argument: "suffixes",
            actual: other.type_name().to_owned(),
        }),
    }
}
