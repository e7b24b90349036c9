use std::collections::BTreeSet;
use std::sync::Arc;

use gm_geometry::{Extent, Projection};
use gm_index::JoinKind;
use gm_join::{JoinExecutionOptions, Suffixes, merge_on_index_with_options, merged_column_names};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, trace};

use crate::args::{
    NodeArg, expect_source, join_kind_from_arg, parse_join_kind, suffixes_from_arg,
    suffixes_from_slice,
};
use crate::config::MergeConfig;
use crate::error::NodeError;
use crate::request::{Request, RequestMode};
use crate::response::Response;
use crate::source::GeometrySource;

/// Merge two geometry sources that share a feature index into one.
///
/// The attribute columns of both sources are combined row by row on the
/// index; `how` decides which rows survive and `suffixes` disambiguates
/// column names present on both sides. For extent requests the two bounding
/// boxes are combined with the same discipline.
#[derive(Debug, Clone)]
pub struct MergeNode {
    left: Arc<dyn GeometrySource>,
    right: Arc<dyn GeometrySource>,
    config: MergeConfig,
}

/// Side-channel carried next to the two upstream responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeParams {
    pub how: JoinKind,
    pub suffixes: Suffixes,
    pub mode: RequestMode,
    pub execution: JoinExecutionOptions,
}

/// What a merge asks of its upstreams for one request.
#[derive(Debug, Clone)]
pub struct SourceRequests {
    pub left: (Arc<dyn GeometrySource>, Request),
    pub right: (Arc<dyn GeometrySource>, Request),
    pub params: MergeParams,
}

impl MergeNode {
    #[must_use]
    pub fn new(
        left: Arc<dyn GeometrySource>,
        right: Arc<dyn GeometrySource>,
        how: JoinKind,
        suffixes: Suffixes,
    ) -> Self {
        Self::from_config(left, right, MergeConfig::new(how, suffixes))
    }

    #[must_use]
    pub fn from_config(
        left: Arc<dyn GeometrySource>,
        right: Arc<dyn GeometrySource>,
        config: MergeConfig,
    ) -> Self {
        Self {
            left,
            right,
            config,
        }
    }

    /// Construct from a join kind name and a suffix sequence.
    pub fn try_new<S: AsRef<str>>(
        left: Arc<dyn GeometrySource>,
        right: Arc<dyn GeometrySource>,
        how: &str,
        suffixes: &[S],
    ) -> Result<Self, NodeError> {
        let how = parse_join_kind(how)?;
        let suffixes = suffixes_from_slice(suffixes)?;
        Ok(Self::new(left, right, how, suffixes))
    }

    /// Construct from positional arguments `(left, right, how, suffixes)`;
    /// `how` defaults to `"inner"` and `suffixes` to `["", "_right"]`.
    pub fn from_args(args: Vec<NodeArg>) -> Result<Self, NodeError> {
        if args.len() > 4 {
            return Err(NodeError::TooManyArguments(args.len()));
        }
        let mut args = args.into_iter();
        let left = expect_source("left", args.next().ok_or(NodeError::MissingArgument("left"))?)?;
        let right =
            expect_source("right", args.next().ok_or(NodeError::MissingArgument("right"))?)?;
        let how = args
            .next()
            .map(join_kind_from_arg)
            .transpose()?
            .unwrap_or_default();
        let suffixes = args
            .next()
            .map(suffixes_from_arg)
            .transpose()?
            .unwrap_or_default();

        Ok(Self::new(left, right, how, suffixes))
    }

    #[must_use]
    pub fn left(&self) -> &Arc<dyn GeometrySource> {
        &self.left
    }

    #[must_use]
    pub fn right(&self) -> &Arc<dyn GeometrySource> {
        &self.right
    }

    #[must_use]
    pub fn how(&self) -> JoinKind {
        self.config.how
    }

    #[must_use]
    pub fn suffixes(&self) -> &Suffixes {
        &self.config.suffixes
    }

    #[must_use]
    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// The validated arguments in constructor order.
    #[must_use]
    pub fn args(&self) -> Vec<NodeArg> {
        vec![
            NodeArg::Source(Arc::clone(&self.left)),
            NodeArg::Source(Arc::clone(&self.right)),
            NodeArg::Value(Value::String(self.how().as_str().to_owned())),
            NodeArg::Value(Value::Array(vec![
                Value::String(self.suffixes().left().to_owned()),
                Value::String(self.suffixes().right().to_owned()),
            ])),
        ]
    }

    /// Forward `request` unchanged to both upstreams and bundle the merge
    /// parameters for [`MergeNode::process`].
    #[must_use]
    pub fn get_sources_and_requests(&self, request: &Request) -> SourceRequests {
        SourceRequests {
            left: (Arc::clone(&self.left), request.clone()),
            right: (Arc::clone(&self.right), request.clone()),
            params: MergeParams {
                how: self.config.how,
                suffixes: self.config.suffixes.clone(),
                mode: request.mode,
                execution: self.config.execution,
            },
        }
    }

    /// Combine the two upstream responses. Pure in its inputs. The result
    /// carries the left projection, except a right-join extent which is
    /// returned as the right source produced it.
    #[instrument(
        name = "merge::process",
        level = "trace",
        skip_all,
        fields(mode = %params.mode, how = %params.how)
    )]
    pub fn process(
        left: Response,
        right: Response,
        params: &MergeParams,
    ) -> Result<Response, NodeError> {
        match params.mode {
            RequestMode::Intersects | RequestMode::Centroid => {
                let (left_table, projection) = match left {
                    Response::Features {
                        features,
                        projection,
                    } => (features, projection),
                    Response::Extent { .. } => return Err(shape_error(params.mode, "left")),
                };
                let Response::Features {
                    features: right_table,
                    ..
                } = right
                else {
                    return Err(shape_error(params.mode, "right"));
                };

                let merged = merge_on_index_with_options(
                    &left_table,
                    &right_table,
                    params.how,
                    &params.suffixes,
                    params.execution,
                )?;
                debug!(rows = merged.len(), columns = merged.num_columns(), "merged features");
                Ok(Response::features(merged, projection))
            }
            RequestMode::Extent => match params.how {
                JoinKind::Left => pass_through(left, params.mode, "left"),
                JoinKind::Right => pass_through(right, params.mode, "right"),
                JoinKind::Inner => {
                    let (left_extent, projection) = extent_parts(left, "left")?;
                    let (right_extent, _) = extent_parts(right, "right")?;
                    let extent = match (left_extent, right_extent) {
                        (Some(a), Some(b)) => a.intersection(&b),
                        _ => {
                            trace!("extent missing on one side; inner extent is absent");
                            None
                        }
                    };
                    Ok(Response::extent(extent, projection))
                }
                JoinKind::Outer => {
                    let (left_extent, projection) = extent_parts(left, "left")?;
                    let (right_extent, _) = extent_parts(right, "right")?;
                    let extent = match (left_extent, right_extent) {
                        (Some(a), Some(b)) => Some(a.union(&b)),
                        (Some(only), None) | (None, Some(only)) => Some(only),
                        (None, None) => None,
                    };
                    Ok(Response::extent(extent, projection))
                }
            },
        }
    }
}

fn shape_error(mode: RequestMode, side: &'static str) -> NodeError {
    NodeError::ResponseShape { mode, side }
}

fn pass_through(
    response: Response,
    mode: RequestMode,
    side: &'static str,
) -> Result<Response, NodeError> {
    if !response.answers(mode) {
        return Err(shape_error(mode, side));
    }
    Ok(response)
}

fn extent_parts(
    response: Response,
    side: &'static str,
) -> Result<(Option<Extent>, Projection), NodeError> {
    match response {
        Response::Extent { extent, projection } => Ok((extent, projection)),
        Response::Features { .. } => Err(shape_error(RequestMode::Extent, side)),
    }
}

impl GeometrySource for MergeNode {
    fn columns(&self) -> BTreeSet<String> {
        merged_column_names(
            &self.left.columns(),
            &self.right.columns(),
            &self.config.suffixes,
        )
    }

    #[instrument(
        name = "merge::evaluate",
        level = "debug",
        skip(self, request),
        fields(mode = %request.mode, how = %self.config.how)
    )]
    fn evaluate(&self, request: &Request) -> Result<Response, NodeError> {
        let SourceRequests {
            left: (left_source, left_request),
            right: (right_source, right_request),
            params,
        } = self.get_sources_and_requests(request);

        let left = left_source.evaluate(&left_request)?;
        let right = right_source.evaluate(&right_request)?;
        Self::process(left, right, &params)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::{Arc, Mutex};

    use gm_frame::FeatureTable;
    use gm_geometry::{Extent, Projection};
    use gm_index::{IndexLabel, JoinKind};
    use gm_join::{JoinExecutionOptions, Suffixes};
    use gm_types::{NullKind, Scalar};
    use serde_json::json;

    use super::{MergeNode, MergeParams};
    use crate::args::NodeArg;
    use crate::error::NodeError;
    use crate::request::{Request, RequestMode};
    use crate::response::Response;
    use crate::source::{GeometrySource, MemorySource};

    #[derive(Debug, Default)]
    struct RecordingSource {
        seen: Mutex<Vec<Request>>,
    }

    impl GeometrySource for RecordingSource {
        fn columns(&self) -> BTreeSet<String> {
            BTreeSet::new()
        }

        fn evaluate(&self, request: &Request) -> Result<Response, NodeError> {
            self.seen.lock().expect("lock").push(request.clone());
            Ok(Response::extent(None, Projection::new("EPSG:4326")))
        }
    }

    #[derive(Debug)]
    struct FailingSource;

    impl GeometrySource for FailingSource {
        fn columns(&self) -> BTreeSet<String> {
            BTreeSet::new()
        }

        fn evaluate(&self, _request: &Request) -> Result<Response, NodeError> {
            Err(NodeError::Upstream("file not found".to_owned()))
        }
    }

    fn table(labels: &[i64], data: Vec<(&str, Vec<Scalar>)>) -> FeatureTable {
        FeatureTable::from_columns(labels.iter().copied().map(IndexLabel::from).collect(), data)
            .expect("table")
    }

    fn source(labels: &[i64], column: &str, extent: Option<Extent>) -> Arc<dyn GeometrySource> {
        let values = labels.iter().map(|v| Scalar::Int64(v * 10)).collect();
        Arc::new(
            MemorySource::new(
                table(labels, vec![(column, values)]),
                Projection::new("EPSG:28992"),
            )
            .with_extent(extent),
        )
    }

    fn extent(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Extent {
        Extent::new(minx, miny, maxx, maxy).expect("extent")
    }

    fn params(how: JoinKind, mode: RequestMode) -> MergeParams {
        MergeParams {
            how,
            suffixes: Suffixes::default(),
            mode,
            execution: JoinExecutionOptions::default(),
        }
    }

    fn extent_response(extent: Option<Extent>, projection: &str) -> Response {
        Response::extent(extent, Projection::new(projection))
    }

    #[test]
    fn request_is_forwarded_verbatim_to_both_sides() {
        let left = Arc::new(RecordingSource::default());
        let right = Arc::new(RecordingSource::default());
        let node = MergeNode::new(left.clone(), right.clone(), JoinKind::Outer, Suffixes::default());
        let request = Request::new(RequestMode::Extent)
            .with_param("geometry", "POINT (1 1)")
            .with_param("min_size", 0.5);

        let asks = node.get_sources_and_requests(&request);
        assert_eq!(asks.left.1, request);
        assert_eq!(asks.right.1, request);
        assert_eq!(asks.params.mode, RequestMode::Extent);
        assert_eq!(asks.params.how, JoinKind::Outer);

        node.evaluate(&request).expect("evaluate");
        assert_eq!(*left.seen.lock().expect("lock"), vec![request.clone()]);
        assert_eq!(*right.seen.lock().expect("lock"), vec![request]);
    }

    #[test]
    fn columns_follow_schema_rule_without_evaluation() {
        let recorder = Arc::new(RecordingSource::default());
        let node = MergeNode::new(
            source(&[1], "a", None),
            recorder.clone(),
            JoinKind::Left,
            Suffixes::new("_l", "_r"),
        );
        let expected: BTreeSet<String> = ["a"].into_iter().map(String::from).collect();
        assert_eq!(node.columns(), expected);
        assert!(recorder.seen.lock().expect("lock").is_empty());

        let overlapping = MergeNode::new(
            source(&[1], "a", None),
            source(&[1], "a", None),
            JoinKind::Left,
            Suffixes::new("_l", "_r"),
        );
        let expected: BTreeSet<String> = ["a_l", "a_r"].into_iter().map(String::from).collect();
        assert_eq!(overlapping.columns(), expected);
    }

    #[test]
    fn feature_modes_merge_on_index_and_keep_left_projection() {
        let node = MergeNode::new(
            source(&[1, 2], "landuse", None),
            Arc::new(MemorySource::new(
                table(&[2, 3], vec![("soil", vec![Scalar::from("clay"), Scalar::from("sand")])]),
                Projection::new("EPSG:4326"),
            )),
            JoinKind::Left,
            Suffixes::default(),
        );
        for mode in [RequestMode::Intersects, RequestMode::Centroid] {
            let response = node.evaluate(&Request::new(mode)).expect("evaluate");
            assert_eq!(response.projection().as_str(), "EPSG:28992");
            let features = response.feature_table().expect("features");
            assert_eq!(
                features.index().labels(),
                &[IndexLabel::from(1_i64), IndexLabel::from(2_i64)]
            );
            assert_eq!(
                features.column("soil").expect("soil").values(),
                &[Scalar::Null(NullKind::Null), Scalar::from("clay")]
            );
        }
    }

    #[test]
    fn extent_left_and_right_pass_through_unmodified() {
        let left = extent_response(None, "EPSG:28992");
        let right = extent_response(Some(extent(0.0, 0.0, 1.0, 1.0)), "EPSG:4326");

        let out = MergeNode::process(
            left.clone(),
            right.clone(),
            &params(JoinKind::Left, RequestMode::Extent),
        )
        .expect("left");
        assert_eq!(out, left);

        let out = MergeNode::process(
            left,
            right.clone(),
            &params(JoinKind::Right, RequestMode::Extent),
        )
        .expect("right");
        assert_eq!(out, right);
    }

    #[test]
    fn extent_inner_intersects_boxes() {
        let a = extent_response(Some(extent(0.0, 0.0, 10.0, 10.0)), "EPSG:28992");
        let b = extent_response(Some(extent(5.0, 5.0, 15.0, 15.0)), "EPSG:4326");
        let out = MergeNode::process(a, b, &params(JoinKind::Inner, RequestMode::Extent))
            .expect("inner");
        assert_eq!(
            out,
            extent_response(Some(extent(5.0, 5.0, 10.0, 10.0)), "EPSG:28992")
        );
    }

    #[test]
    fn extent_inner_of_disjoint_or_absent_boxes_is_absent() {
        let p = params(JoinKind::Inner, RequestMode::Extent);
        let disjoint = MergeNode::process(
            extent_response(Some(extent(0.0, 0.0, 1.0, 1.0)), "EPSG:28992"),
            extent_response(Some(extent(10.0, 10.0, 11.0, 11.0)), "EPSG:28992"),
            &p,
        )
        .expect("disjoint");
        assert_eq!(disjoint.bounding_box(), Some(None));

        let absent = MergeNode::process(
            extent_response(Some(extent(0.0, 0.0, 1.0, 1.0)), "EPSG:28992"),
            extent_response(None, "EPSG:28992"),
            &p,
        )
        .expect("absent");
        assert_eq!(absent.bounding_box(), Some(None));
    }

    #[test]
    fn extent_outer_covers_present_boxes() {
        let p = params(JoinKind::Outer, RequestMode::Extent);
        let a = Some(extent(0.0, 0.0, 10.0, 10.0));
        let b = Some(extent(5.0, 5.0, 15.0, 15.0));

        let both = MergeNode::process(
            extent_response(a, "EPSG:28992"),
            extent_response(b, "EPSG:28992"),
            &p,
        )
        .expect("both");
        assert_eq!(both.bounding_box(), Some(Some(extent(0.0, 0.0, 15.0, 15.0))));

        let right_only = MergeNode::process(
            extent_response(None, "EPSG:28992"),
            extent_response(b, "EPSG:4326"),
            &p,
        )
        .expect("right only");
        assert_eq!(right_only, extent_response(b, "EPSG:28992"));

        let neither = MergeNode::process(
            extent_response(None, "EPSG:28992"),
            extent_response(None, "EPSG:28992"),
            &p,
        )
        .expect("neither");
        assert_eq!(neither.bounding_box(), Some(None));
    }

    #[test]
    fn mismatched_response_shape_is_reported() {
        let features = Response::features(table(&[1], vec![]), Projection::new("EPSG:28992"));
        let err = MergeNode::process(
            extent_response(None, "EPSG:28992"),
            features.clone(),
            &params(JoinKind::Inner, RequestMode::Extent),
        )
        .expect_err("shape");
        assert!(matches!(
            err,
            NodeError::ResponseShape {
                mode: RequestMode::Extent,
                side: "right"
            }
        ));

        let err = MergeNode::process(
            extent_response(None, "EPSG:28992"),
            features,
            &params(JoinKind::Left, RequestMode::Centroid),
        )
        .expect_err("shape");
        assert!(matches!(err, NodeError::ResponseShape { side: "left", .. }));
    }

    #[test]
    fn upstream_errors_propagate_unchanged() {
        let node = MergeNode::new(
            source(&[1], "a", None),
            Arc::new(FailingSource),
            JoinKind::Outer,
            Suffixes::default(),
        );
        let err = node
            .evaluate(&Request::new(RequestMode::Intersects))
            .expect_err("upstream failure");
        assert!(matches!(err, NodeError::Upstream(ref msg) if msg == "file not found"));
    }

    #[test]
    fn try_new_validates_join_kind_and_suffixes() {
        let err = MergeNode::try_new(
            source(&[1], "a", None),
            source(&[1], "b", None),
            "bogus",
            &["", "_right"],
        )
        .expect_err("bogus join kind");
        assert!(matches!(err, NodeError::UnsupportedJoinKind { ref given, .. } if given == "bogus"));

        let err = MergeNode::try_new(source(&[1], "a", None), source(&[1], "b", None), "left", &["a"])
            .expect_err("one suffix");
        assert!(matches!(err, NodeError::TypeConstraint { argument: "suffixes", .. }));

        let node = MergeNode::try_new(
            source(&[1], "a", None),
            source(&[1], "b", None),
            "right",
            &["_x", "_y"],
        )
        .expect("valid");
        assert_eq!(node.how(), JoinKind::Right);
        assert_eq!(node.suffixes(), &Suffixes::new("_x", "_y"));
    }

    #[test]
    fn from_args_applies_defaults_and_rejects_non_sources() {
        let node = MergeNode::from_args(vec![
            NodeArg::Source(source(&[1], "a", None)),
            NodeArg::Source(source(&[1], "b", None)),
        ])
        .expect("defaults");
        assert_eq!(node.how(), JoinKind::Inner);
        assert_eq!(node.suffixes(), &Suffixes::new("", "_right"));
        assert_eq!(node.args().len(), 4);

        let err = MergeNode::from_args(vec![
            NodeArg::Value(json!(42)),
            NodeArg::Source(source(&[1], "b", None)),
        ])
        .expect_err("non-source left");
        assert!(matches!(
            err,
            NodeError::TypeConstraint { argument: "left", ref actual } if actual == "number"
        ));
        assert_eq!(err.to_string(), "'number' object is not allowed as 'left'");

        let err = MergeNode::from_args(vec![
            NodeArg::Source(source(&[1], "a", None)),
            NodeArg::Source(source(&[1], "b", None)),
            NodeArg::from("bogus"),
        ])
        .expect_err("bogus how");
        assert!(matches!(err, NodeError::UnsupportedJoinKind { .. }));

        let err = MergeNode::from_args(vec![
            NodeArg::Source(source(&[1], "a", None)),
            NodeArg::Source(source(&[1], "b", None)),
            NodeArg::from("left"),
            NodeArg::Value(json!(["a"])),
        ])
        .expect_err("short suffixes");
        assert!(matches!(err, NodeError::TypeConstraint { argument: "suffixes", .. }));

        let err = MergeNode::from_args(vec![NodeArg::Source(source(&[1], "a", None))])
            .expect_err("missing right");
        assert!(matches!(err, NodeError::MissingArgument("right")));
    }

    #[test]
    fn args_round_trip_through_from_args() {
        let node = MergeNode::new(
            source(&[1], "a", None),
            source(&[1], "b", None),
            JoinKind::Outer,
            Suffixes::new("_l", "_r"),
        );
        let rebuilt = MergeNode::from_args(node.args()).expect("rebuild");
        assert_eq!(rebuilt.config(), node.config());
        assert!(Arc::ptr_eq(rebuilt.left(), node.left()));
    }
}
