use gm_geometry::GeometryError;
use gm_join::JoinError;
use thiserror::Error;

use crate::request::RequestMode;

#[derive(Debug, Error)]
pub enum NodeError {
    /// An argument does not have the required capability or shape.
    #[error("'{actual}' object is not allowed as '{argument}'")]
    TypeConstraint {
        argument: &'static str,
        actual: String,
    },
    #[error("'{given}' is not part of the list of operations: {valid}")]
    UnsupportedJoinKind { given: String, valid: String },
    #[error("'{given}' is not a supported request mode: {valid}")]
    UnsupportedRequestMode { given: String, valid: String },
    #[error("request does not contain a 'mode' key")]
    MissingMode,
    #[error("missing required argument '{0}'")]
    MissingArgument(&'static str),
    #[error("merge accepts at most 4 arguments, got {0}")]
    TooManyArguments(usize),
    #[error("{side} response does not have the shape of a '{mode}' response")]
    ResponseShape {
        mode: RequestMode,
        side: &'static str,
    },
    /// Raised by a source while answering a request.
    #[error("source evaluation failed: {0}")]
    Upstream(String),
    #[error(transparent)]
    Join(#[from] JoinError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
