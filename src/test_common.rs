#![cfg(test)]

use std::collections::HashMap;

use crate::in_app_message::InAppMessage;
use crate::remote_config::RemoteConfigParameter;
use crate::target::{Condition, KeyType, Match, MatchType, Operator, TargetKey, ValueType};
use crate::workspace::{Bucket, Container, Experiment, ExperimentType, Segment, Workspace};
use crate::HackleValue;

/// A running AB test whose default rule allocates through bucket 500.
pub(crate) const RUNNING_AB_TEST_JSON: &str = r#"{
    "id": 5,
    "key": 42,
    "type": "AB_TEST",
    "identifierType": "$id",
    "status": "RUNNING",
    "variations": [{"id": 1001, "key": "A"}, {"id": 1002, "key": "B"}],
    "defaultRule": {"type": "bucket", "bucketId": 500}
}"#;

/// Bucket 500 with its whole range assigned to variation 1002: every user is
/// allocated.
pub(crate) const FULL_BUCKET_JSON: &str = r#"{
    "id": 500,
    "seed": 875758774,
    "slotSize": 10000,
    "slots": [{"startInclusive": 0, "endExclusive": 10000, "variationId": 1002}]
}"#;

/// Bucket 500 with no slots: no user is allocated.
pub(crate) const EMPTY_BUCKET_JSON: &str = r#"{
    "id": 500,
    "seed": 875758774,
    "slotSize": 10000,
    "slots": []
}"#;

pub(crate) fn condition(
    key_type: KeyType,
    name: &str,
    match_type: MatchType,
    operator: Operator,
    value_type: ValueType,
    values: Vec<HackleValue>,
) -> Condition {
    Condition {
        key: TargetKey {
            key_type,
            name: name.to_string(),
        },
        matcher: Match::new(match_type, operator, value_type, values),
    }
}

/// An in-memory [Workspace] built up from JSON fragments, mirroring the
/// shapes the config service serves.
#[derive(Debug, Default)]
pub(crate) struct TestWorkspace {
    experiments: HashMap<i64, Experiment>,
    feature_flags: HashMap<i64, Experiment>,
    segments: HashMap<String, Segment>,
    containers: HashMap<i64, Container>,
    buckets: HashMap<i64, Bucket>,
    parameters: HashMap<String, RemoteConfigParameter>,
    in_app_messages: HashMap<i64, InAppMessage>,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_experiment(mut self, json: &str) -> Self {
        let experiment: Experiment = serde_json::from_str(json).expect("invalid experiment json");
        assert_eq!(experiment.experiment_type, ExperimentType::AbTest);
        self.experiments.insert(experiment.key, experiment);
        self
    }

    pub fn with_feature_flag(mut self, json: &str) -> Self {
        let feature_flag: Experiment =
            serde_json::from_str(json).expect("invalid feature flag json");
        assert_eq!(feature_flag.experiment_type, ExperimentType::FeatureFlag);
        self.feature_flags.insert(feature_flag.key, feature_flag);
        self
    }

    pub fn with_segment(mut self, json: &str) -> Self {
        let segment: Segment = serde_json::from_str(json).expect("invalid segment json");
        self.segments.insert(segment.key.clone(), segment);
        self
    }

    pub fn with_container(mut self, json: &str) -> Self {
        let container: Container = serde_json::from_str(json).expect("invalid container json");
        self.containers.insert(container.id, container);
        self
    }

    pub fn with_bucket(mut self, json: &str) -> Self {
        let bucket: Bucket = serde_json::from_str(json).expect("invalid bucket json");
        self.buckets.insert(bucket.id, bucket);
        self
    }

    pub fn with_parameter(mut self, json: &str) -> Self {
        let parameter: RemoteConfigParameter =
            serde_json::from_str(json).expect("invalid parameter json");
        self.parameters.insert(parameter.key.clone(), parameter);
        self
    }

    pub fn with_in_app_message(mut self, json: &str) -> Self {
        let message: InAppMessage = serde_json::from_str(json).expect("invalid message json");
        self.in_app_messages.insert(message.key, message);
        self
    }
}

impl Workspace for TestWorkspace {
    fn experiment(&self, experiment_key: i64) -> Option<&Experiment> {
        self.experiments.get(&experiment_key)
    }

    fn feature_flag(&self, feature_key: i64) -> Option<&Experiment> {
        self.feature_flags.get(&feature_key)
    }

    fn segment(&self, segment_key: &str) -> Option<&Segment> {
        self.segments.get(segment_key)
    }

    fn container(&self, container_id: i64) -> Option<&Container> {
        self.containers.get(&container_id)
    }

    fn bucket(&self, bucket_id: i64) -> Option<&Bucket> {
        self.buckets.get(&bucket_id)
    }

    fn remote_config_parameter(&self, parameter_key: &str) -> Option<&RemoteConfigParameter> {
        self.parameters.get(parameter_key)
    }

    fn in_app_message(&self, in_app_message_key: i64) -> Option<&InAppMessage> {
        self.in_app_messages.get(&in_app_message_key)
    }
}
