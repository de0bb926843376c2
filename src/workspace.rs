use std::collections::HashMap;

use serde::Deserialize;

use crate::in_app_message::InAppMessage;
use crate::remote_config::RemoteConfigParameter;
use crate::target::Target;

/// Workspace is an interface for the immutable configuration snapshot the
/// evaluation engine reads: experiments, feature flags, segments, mutual
/// exclusion containers, buckets, remote-config parameters and in-app
/// messages.
///
/// The snapshot is fetched and atomically swapped by the host; the engine
/// never mutates it and tolerates a stale-but-consistent snapshot for the
/// duration of one evaluation call.
pub trait Workspace {
    /// Retrieve the AB-test experiment with key `experiment_key`.
    fn experiment(&self, experiment_key: i64) -> Option<&Experiment>;

    /// Retrieve the feature flag with key `feature_key`.
    fn feature_flag(&self, feature_key: i64) -> Option<&Experiment>;

    /// Retrieve the segment with key `segment_key`.
    fn segment(&self, segment_key: &str) -> Option<&Segment>;

    /// Retrieve the mutual-exclusion container with id `container_id`.
    fn container(&self, container_id: i64) -> Option<&Container>;

    /// Retrieve the bucket with id `bucket_id`.
    fn bucket(&self, bucket_id: i64) -> Option<&Bucket>;

    /// Retrieve the remote-config parameter with key `parameter_key`.
    fn remote_config_parameter(&self, parameter_key: &str) -> Option<&RemoteConfigParameter>;

    /// Retrieve the in-app message with key `in_app_message_key`.
    fn in_app_message(&self, in_app_message_key: i64) -> Option<&InAppMessage>;
}

/// An experiment: either an AB test or a feature flag, depending on
/// [Experiment::experiment_type]. Both share the same structure; their
/// evaluation flows differ.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub id: i64,
    pub key: i64,
    #[serde(rename = "type")]
    pub experiment_type: ExperimentType,
    pub identifier_type: String,
    pub status: ExperimentStatus,
    #[serde(default)]
    pub version: i64,

    pub variations: Vec<Variation>,

    /// Manual QA overrides: identifier value (of `identifier_type`) to
    /// variation id.
    #[serde(default)]
    pub user_overrides: HashMap<String, i64>,
    #[serde(default)]
    pub segment_overrides: Vec<TargetRule>,

    /// Audience restriction. Empty means no restriction.
    #[serde(default)]
    pub target_audiences: Vec<Target>,
    #[serde(default)]
    pub target_rules: Vec<TargetRule>,
    pub default_rule: Action,

    #[serde(default)]
    pub container_id: Option<i64>,
    #[serde(default)]
    pub winner_variation_id: Option<i64>,
}

impl Experiment {
    pub fn variation_by_id(&self, variation_id: i64) -> Option<&Variation> {
        self.variations.iter().find(|v| v.id == variation_id)
    }

    pub fn variation_by_key(&self, variation_key: &str) -> Option<&Variation> {
        self.variations.iter().find(|v| v.key == variation_key)
    }

    pub fn winner_variation(&self) -> Option<&Variation> {
        self.winner_variation_id
            .and_then(|id| self.variation_by_id(id))
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentType {
    AbTest,
    FeatureFlag,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentStatus {
    Draft,
    Running,
    Paused,
    Completed,
}

/// A named arm of an experiment a user can be assigned to.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    pub id: i64,
    pub key: String,
    #[serde(default)]
    pub is_dropped: bool,
}

/// A targeting rule pairing a predicate with the action to take when it
/// matches.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetRule {
    pub target: Target,
    pub action: Action,
}

/// How a matched rule decides a variation: a fixed variation, or a
/// deterministic bucket-slot assignment.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    #[serde(rename_all = "camelCase")]
    Variation { variation_id: i64 },
    #[serde(rename_all = "camelCase")]
    Bucket { bucket_id: i64 },
}

/// A deterministic hash-range partition. Slots partition `[0, slot_size)`
/// for the ranges they cover; uncovered ranges mean "not allocated".
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub id: i64,
    pub seed: i32,
    pub slot_size: i32,
    pub slots: Vec<Slot>,
}

impl Bucket {
    pub fn slot(&self, slot_number: i32) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.contains(slot_number))
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub start_inclusive: i32,
    pub end_exclusive: i32,
    pub variation_id: i64,
}

impl Slot {
    pub fn contains(&self, slot_number: i32) -> bool {
        self.start_inclusive <= slot_number && slot_number < self.end_exclusive
    }
}

/// A mutual-exclusion grouping: a user participates in at most one
/// experiment among the container's member experiments.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: i64,
    pub bucket_id: i64,
    pub groups: Vec<ContainerGroup>,
}

impl Container {
    pub fn group(&self, group_id: i64) -> Option<&ContainerGroup> {
        self.groups.iter().find(|group| group.id == group_id)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerGroup {
    pub id: i64,
    pub experiments: Vec<i64>,
}

/// A named, reusable target definition evaluated against the current user.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: i64,
    pub key: String,
    #[serde(default)]
    pub targets: Vec<Target>,
}
