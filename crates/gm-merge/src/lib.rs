#![forbid(unsafe_code)]

//! Merge node of a lazy geometry pipeline.
//!
//! A [`MergeNode`] combines two [`GeometrySource`]s that describe the same
//! features with different attribute columns. Requests are forwarded to both
//! upstreams unchanged and the two responses are reconciled per request mode:
//! attribute tables are merged on their feature index, bounding boxes are
//! intersected or unioned according to the join kind.

mod args;
mod config;
mod error;
mod merge;
mod request;
mod response;
mod source;

pub use args::{NodeArg, json_type_name};
pub use config::MergeConfig;
pub use error::NodeError;
pub use merge::{MergeNode, MergeParams, SourceRequests};
pub use request::{Request, RequestMode};
pub use response::Response;
pub use source::{GeometrySource, MemorySource};

pub use gm_frame::FeatureTable;
pub use gm_geometry::{Extent, Projection};
pub use gm_index::{IndexLabel, JoinKind};
pub use gm_join::{JoinExecutionOptions, Suffixes};
pub use gm_types::Scalar;
