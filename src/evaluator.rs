use serde::Serialize;

use crate::bucketer::{Bucketer, Sha1Bucketer};
use crate::clock::{Clock, SystemClock};
use crate::in_app_message::{InAppMessage, InAppMessageEvaluation};
use crate::remote_config::{RemoteConfigEvaluation, RemoteConfigParameter};
use crate::target::KeyType;
use crate::user::{Event, HackleUser};
use crate::workspace::{Experiment, ExperimentType, Variation, Workspace};
use crate::HackleValue;

/// DecisionReason explains why a particular decision was reached. It is used
/// both for analytics and for business logic: targeting conditions that
/// reference another experiment's outcome filter on the referenced
/// evaluation's reason.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionReason {
    /// The workspace snapshot was not available yet.
    SdkNotReady,
    /// An unexpected error stopped the evaluation; the default was returned.
    Exception,
    /// The requested experiment key does not exist in the workspace.
    ExperimentNotFound,
    /// The experiment has not started yet.
    ExperimentDraft,
    /// The experiment is paused.
    ExperimentPaused,
    /// The experiment finished; the winner variation was returned.
    ExperimentCompleted,
    /// A manual override decided the variation.
    Overridden,
    /// The user's slot is outside the experiment's allocated traffic.
    TrafficNotAllocated,
    /// Traffic allocation decided the variation.
    TrafficAllocated,
    /// Traffic allocation decided the variation, triggered by another
    /// experiment's targeting rule referencing this experiment.
    TrafficAllocatedByTargeting,
    /// The user was assigned to a different group of the experiment's
    /// mutual-exclusion container.
    NotInMutualExclusionExperiment,
    /// The user has no identifier of the experiment's identifier type.
    IdentifierNotFound,
    /// The allocated variation has been dropped.
    VariationDropped,
    /// The user did not match the experiment's audience targets.
    NotInExperimentTarget,
    /// The requested feature flag key does not exist in the workspace.
    FeatureFlagNotFound,
    /// The feature flag is paused.
    FeatureFlagInactive,
    /// An individual target (user or segment override) decided the flag.
    IndividualTargetMatch,
    /// A feature-flag target rule decided the variation.
    TargetRuleMatch,
    /// The feature-flag or remote-config default rule decided the value.
    DefaultRule,
    /// The requested remote-config parameter key does not exist.
    RemoteConfigParameterNotFound,
    /// The decided remote-config value did not have the requested type.
    TypeMismatch,
    /// The requested in-app message key does not exist.
    InAppMessageNotFound,
    /// The in-app message has not started yet.
    InAppMessageDraft,
    /// The in-app message is paused.
    InAppMessagePaused,
    /// The current time is outside the message's display period.
    NotInInAppMessagePeriod,
    /// The user did not match the message's audience.
    NotInInAppMessageTarget,
    /// The user matched the message's audience.
    InAppMessageTarget,
}

impl DecisionReason {
    /// Whether an AB-test evaluation reached via this reason counts as a
    /// concrete variation assignment for targeting purposes. Evaluations
    /// that bailed out (e.g. not in target, not allocated) never satisfy a
    /// condition referencing the experiment, whatever their variation key.
    pub(crate) fn is_ab_test_assignment(&self) -> bool {
        matches!(
            self,
            DecisionReason::Overridden
                | DecisionReason::TrafficAllocated
                | DecisionReason::TrafficAllocatedByTargeting
                | DecisionReason::ExperimentCompleted
        )
    }
}

/// An error that aborts a single evaluation call.
///
/// Every variant indicates a workspace data anomaly or an internal
/// misrouting, not a user-data condition: the public decision API catches
/// these at the boundary and degrades to an `EXCEPTION`-reasoned default.
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum EvaluatorError {
    #[error("circular evaluation detected: {chain}")]
    CircularEvaluation { chain: String },
    #[error("experiment must be of type {expected:?} (experiment: {experiment_id})")]
    WrongExperimentType {
        experiment_id: i64,
        expected: ExperimentType,
    },
    #[error("experiment must be running (experiment: {0})")]
    ExperimentNotRunning(i64),
    #[error("winner variation is not configured for completed experiment (experiment: {0})")]
    WinnerVariationNotFound(i64),
    #[error("variation not found (variation: {0})")]
    VariationNotFound(i64),
    #[error("feature flag must decide a variation (experiment: {0})")]
    VariationNotDecided(i64),
    #[error("bucket not found (bucket: {0})")]
    BucketNotFound(i64),
    #[error("container not found (container: {0})")]
    ContainerNotFound(i64),
    #[error("container group not found (container: {container_id}, group: {group_id})")]
    ContainerGroupNotFound { container_id: i64, group_id: i64 },
    #[error("segment not found (segment: {0})")]
    SegmentNotFound(String),
    #[error("segment key must be a string value")]
    InvalidSegmentKey,
    #[error("experiment key must be an integer (got: {0})")]
    InvalidExperimentKey(String),
    #[error("invalid event-count aggregation key: {0}")]
    InvalidAggregationKey(String),
    #[error("day window out of range: {0} days")]
    DayWindowOutOfRange(i64),
    #[error("unsupported condition key type for this matcher: {key_type:?}")]
    UnsupportedKeyType { key_type: KeyType },
    #[error("request type cannot be evaluated directly")]
    UnsupportedRequest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EvaluatorType {
    Experiment,
    RemoteConfig,
    InAppMessage,
    Event,
}

/// The identity of a request within one evaluation call tree, used for
/// memoization and cycle detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EvaluatorKey {
    pub evaluator_type: EvaluatorType,
    pub id: i64,
}

#[derive(Clone, Copy)]
pub struct ExperimentRequest<'a> {
    pub workspace: &'a dyn Workspace,
    pub user: &'a HackleUser,
    pub experiment: &'a Experiment,
    pub default_variation_key: &'a str,
}

impl<'a> ExperimentRequest<'a> {
    pub fn of(
        workspace: &'a dyn Workspace,
        user: &'a HackleUser,
        experiment: &'a Experiment,
        default_variation_key: &'a str,
    ) -> Self {
        Self {
            workspace,
            user,
            experiment,
            default_variation_key,
        }
    }

    /// A nested request created while matching another request's targeting
    /// conditions. The referenced experiment is always evaluated against the
    /// control variation as default.
    pub(crate) fn by(parent: &EvaluatorRequest<'a>, experiment: &'a Experiment) -> Self {
        Self {
            workspace: parent.workspace(),
            user: parent.user(),
            experiment,
            default_variation_key: "A",
        }
    }
}

#[derive(Clone)]
pub struct RemoteConfigRequest<'a> {
    pub workspace: &'a dyn Workspace,
    pub user: &'a HackleUser,
    pub parameter: &'a RemoteConfigParameter,
    pub default_value: HackleValue,
}

#[derive(Clone, Copy)]
pub struct InAppMessageRequest<'a> {
    pub workspace: &'a dyn Workspace,
    pub user: &'a HackleUser,
    pub in_app_message: &'a InAppMessage,
    /// The triggering event, when eligibility is evaluated at track time.
    pub event: Option<&'a Event>,
}

/// A request that only contextualizes condition matching for a tracked
/// event; it is never evaluated on its own.
#[derive(Clone, Copy)]
pub struct EventRequest<'a> {
    pub workspace: &'a dyn Workspace,
    pub user: &'a HackleUser,
    pub event: &'a Event,
}

/// The closed set of request variants the evaluator can receive.
#[derive(Clone)]
pub enum EvaluatorRequest<'a> {
    Experiment(ExperimentRequest<'a>),
    RemoteConfig(RemoteConfigRequest<'a>),
    InAppMessage(InAppMessageRequest<'a>),
    Event(EventRequest<'a>),
}

impl<'a> EvaluatorRequest<'a> {
    pub fn workspace(&self) -> &'a dyn Workspace {
        match self {
            EvaluatorRequest::Experiment(r) => r.workspace,
            EvaluatorRequest::RemoteConfig(r) => r.workspace,
            EvaluatorRequest::InAppMessage(r) => r.workspace,
            EvaluatorRequest::Event(r) => r.workspace,
        }
    }

    pub fn user(&self) -> &'a HackleUser {
        match self {
            EvaluatorRequest::Experiment(r) => r.user,
            EvaluatorRequest::RemoteConfig(r) => r.user,
            EvaluatorRequest::InAppMessage(r) => r.user,
            EvaluatorRequest::Event(r) => r.user,
        }
    }

    /// The triggering event, for event-triggered requests only.
    pub fn event(&self) -> Option<&'a Event> {
        match self {
            EvaluatorRequest::InAppMessage(r) => r.event,
            EvaluatorRequest::Event(r) => Some(r.event),
            _ => None,
        }
    }

    pub fn key(&self) -> EvaluatorKey {
        match self {
            EvaluatorRequest::Experiment(r) => EvaluatorKey {
                evaluator_type: EvaluatorType::Experiment,
                id: r.experiment.id,
            },
            EvaluatorRequest::RemoteConfig(r) => EvaluatorKey {
                evaluator_type: EvaluatorType::RemoteConfig,
                id: r.parameter.id,
            },
            EvaluatorRequest::InAppMessage(r) => EvaluatorKey {
                evaluator_type: EvaluatorType::InAppMessage,
                id: r.in_app_message.id,
            },
            EvaluatorRequest::Event(_) => EvaluatorKey {
                evaluator_type: EvaluatorType::Event,
                id: 0,
            },
        }
    }
}

/// The closed set of evaluation results.
#[derive(Clone, Debug, PartialEq)]
pub enum EvaluatorEvaluation {
    Experiment(ExperimentEvaluation),
    RemoteConfig(RemoteConfigEvaluation),
    InAppMessage(InAppMessageEvaluation),
}

impl EvaluatorEvaluation {
    pub fn reason(&self) -> DecisionReason {
        match self {
            EvaluatorEvaluation::Experiment(e) => e.reason,
            EvaluatorEvaluation::RemoteConfig(e) => e.reason,
            EvaluatorEvaluation::InAppMessage(e) => e.reason,
        }
    }

    pub fn key(&self) -> EvaluatorKey {
        match self {
            EvaluatorEvaluation::Experiment(e) => EvaluatorKey {
                evaluator_type: EvaluatorType::Experiment,
                id: e.experiment_id,
            },
            EvaluatorEvaluation::RemoteConfig(e) => EvaluatorKey {
                evaluator_type: EvaluatorType::RemoteConfig,
                id: e.parameter_id,
            },
            EvaluatorEvaluation::InAppMessage(e) => EvaluatorKey {
                evaluator_type: EvaluatorType::InAppMessage,
                id: e.in_app_message_id,
            },
        }
    }
}

/// The result of evaluating one experiment or feature flag.
#[derive(Clone, Debug, PartialEq)]
pub struct ExperimentEvaluation {
    pub reason: DecisionReason,
    /// Sub-evaluations triggered while matching targeting conditions,
    /// collected for event emission by the caller.
    pub target_evaluations: Vec<EvaluatorEvaluation>,
    pub experiment_id: i64,
    pub experiment_key: i64,
    pub experiment_type: ExperimentType,
    pub experiment_version: i64,
    pub variation_id: Option<i64>,
    pub variation_key: String,
}

impl ExperimentEvaluation {
    pub(crate) fn of(
        request: &ExperimentRequest,
        context: &EvaluatorContext,
        variation: &Variation,
        reason: DecisionReason,
    ) -> Self {
        Self {
            reason,
            target_evaluations: context.evaluations().to_vec(),
            experiment_id: request.experiment.id,
            experiment_key: request.experiment.key,
            experiment_type: request.experiment.experiment_type,
            experiment_version: request.experiment.version,
            variation_id: Some(variation.id),
            variation_key: variation.key.clone(),
        }
    }

    /// A decision falling back to the caller-supplied default variation.
    /// The default key may not correspond to any configured variation, in
    /// which case the evaluation carries the key with no variation id.
    pub(crate) fn of_default(
        request: &ExperimentRequest,
        context: &EvaluatorContext,
        reason: DecisionReason,
    ) -> Self {
        let variation = request
            .experiment
            .variation_by_key(request.default_variation_key);
        Self {
            reason,
            target_evaluations: context.evaluations().to_vec(),
            experiment_id: request.experiment.id,
            experiment_key: request.experiment.key,
            experiment_type: request.experiment.experiment_type,
            experiment_version: request.experiment.version,
            variation_id: variation.map(|v| v.id),
            variation_key: variation
                .map(|v| v.key.clone())
                .unwrap_or_else(|| request.default_variation_key.to_string()),
        }
    }

    pub(crate) fn with_reason(mut self, reason: DecisionReason) -> Self {
        self.reason = reason;
        self
    }
}

/// Per-call evaluation state: a memoization map from request identity to
/// completed evaluation, and the in-flight request stack used for cycle
/// detection.
///
/// A context is created fresh for every public API invocation and discarded
/// when the call completes; concurrent calls each get their own.
#[derive(Clone, Debug, Default)]
pub struct EvaluatorContext {
    stack: Vec<EvaluatorKey>,
    evaluations: Vec<EvaluatorEvaluation>,
}

impl EvaluatorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains_request(&self, key: &EvaluatorKey) -> bool {
        self.stack.contains(key)
    }

    pub(crate) fn push_request(&mut self, key: EvaluatorKey) {
        self.stack.push(key);
    }

    pub(crate) fn pop_request(&mut self) {
        self.stack.pop();
    }

    pub(crate) fn request_chain(&self, next: &EvaluatorKey) -> String {
        let mut chain = self
            .stack
            .iter()
            .map(|key| format!("{:?}({})", key.evaluator_type, key.id))
            .collect::<Vec<_>>()
            .join(" -> ");
        chain.push_str(&format!(" -> {:?}({})", next.evaluator_type, next.id));
        chain
    }

    /// The memoized evaluation for `key`, if one completed within this call
    /// tree.
    pub fn get(&self, key: &EvaluatorKey) -> Option<&EvaluatorEvaluation> {
        self.evaluations
            .iter()
            .find(|evaluation| evaluation.key() == *key)
    }

    pub fn add(&mut self, evaluation: EvaluatorEvaluation) {
        self.evaluations.push(evaluation);
    }

    pub fn evaluations(&self) -> &[EvaluatorEvaluation] {
        &self.evaluations
    }

    #[cfg(test)]
    pub(crate) fn in_flight_len(&self) -> usize {
        self.stack.len()
    }
}

/// The single recursive evaluation entry point.
///
/// Used both by the top-level decision API and by targeting conditions that
/// reference another experiment's outcome. Evaluation is synchronous,
/// CPU-bound and free of side effects on shared state: it reads the request's
/// workspace snapshot and mutates only the per-call [EvaluatorContext].
pub struct Evaluator {
    pub(crate) bucketer: Box<dyn Bucketer + Send + Sync>,
    pub(crate) clock: Box<dyn Clock + Send + Sync>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(Box::new(Sha1Bucketer), Box::new(SystemClock))
    }
}

impl Evaluator {
    pub fn new(
        bucketer: Box<dyn Bucketer + Send + Sync>,
        clock: Box<dyn Clock + Send + Sync>,
    ) -> Self {
        Self { bucketer, clock }
    }

    pub fn evaluate(
        &self,
        request: &EvaluatorRequest<'_>,
        context: &mut EvaluatorContext,
    ) -> Result<EvaluatorEvaluation, EvaluatorError> {
        let key = request.key();
        if context.contains_request(&key) {
            return Err(EvaluatorError::CircularEvaluation {
                chain: context.request_chain(&key),
            });
        }
        context.push_request(key);
        let result = self.dispatch(request, context);
        context.pop_request();
        result
    }

    fn dispatch(
        &self,
        request: &EvaluatorRequest<'_>,
        context: &mut EvaluatorContext,
    ) -> Result<EvaluatorEvaluation, EvaluatorError> {
        match request {
            EvaluatorRequest::Experiment(experiment_request) => self
                .evaluate_experiment(experiment_request, context)
                .map(EvaluatorEvaluation::Experiment),
            EvaluatorRequest::RemoteConfig(remote_config_request) => self
                .evaluate_remote_config(remote_config_request, context)
                .map(EvaluatorEvaluation::RemoteConfig),
            EvaluatorRequest::InAppMessage(in_app_message_request) => self
                .evaluate_in_app_message(in_app_message_request, context)
                .map(EvaluatorEvaluation::InAppMessage),
            EvaluatorRequest::Event(_) => Err(EvaluatorError::UnsupportedRequest),
        }
    }
}
