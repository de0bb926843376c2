use log::warn;

use crate::evaluator::{
    DecisionReason, Evaluator, EvaluatorContext, EvaluatorEvaluation, EvaluatorRequest,
    ExperimentEvaluation, ExperimentRequest, InAppMessageRequest, RemoteConfigRequest,
};
use crate::target::ValueType;
use crate::user::{Event, HackleUser};
use crate::workspace::Workspace;
use crate::HackleValue;

/// Provides the current workspace snapshot, if one has been fetched yet.
///
/// The returned reference must stay consistent for the duration of one
/// decision call; hosts typically back this with an atomically-swapped
/// snapshot.
pub trait WorkspaceFetcher {
    fn fetch(&self) -> Option<&dyn Workspace>;
}

/// The decision returned for an experiment call.
#[derive(Clone, Debug, PartialEq)]
pub struct ExperimentDecision {
    pub variation_key: String,
    pub reason: DecisionReason,
    /// Absent when no evaluation ran (SDK not ready, unknown key, error).
    pub evaluation: Option<ExperimentEvaluation>,
}

impl ExperimentDecision {
    fn default_of(variation_key: &str, reason: DecisionReason) -> Self {
        Self {
            variation_key: variation_key.to_string(),
            reason,
            evaluation: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FeatureFlagDecision {
    pub is_on: bool,
    pub reason: DecisionReason,
    pub evaluation: Option<ExperimentEvaluation>,
}

impl FeatureFlagDecision {
    fn off(reason: DecisionReason) -> Self {
        Self {
            is_on: false,
            reason,
            evaluation: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RemoteConfigDecision {
    pub value: HackleValue,
    pub reason: DecisionReason,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InAppMessageDecision {
    pub is_eligible: bool,
    pub reason: DecisionReason,
}

/// The public decision surface. Every method degrades to a sensible default
/// instead of failing: a missing workspace, an unknown key or an internal
/// evaluation error all map onto a default decision with an explanatory
/// reason.
pub struct HackleCore {
    workspace_fetcher: Box<dyn WorkspaceFetcher + Send + Sync>,
    evaluator: Evaluator,
}

impl HackleCore {
    pub fn new(workspace_fetcher: Box<dyn WorkspaceFetcher + Send + Sync>) -> Self {
        Self::with_evaluator(workspace_fetcher, Evaluator::default())
    }

    pub fn with_evaluator(
        workspace_fetcher: Box<dyn WorkspaceFetcher + Send + Sync>,
        evaluator: Evaluator,
    ) -> Self {
        Self {
            workspace_fetcher,
            evaluator,
        }
    }

    /// Decide the variation of the AB test `experiment_key` for `user`.
    pub fn experiment(
        &self,
        user: &HackleUser,
        experiment_key: i64,
        default_variation_key: &str,
    ) -> ExperimentDecision {
        let workspace = match self.workspace_fetcher.fetch() {
            Some(workspace) => workspace,
            None => {
                return ExperimentDecision::default_of(
                    default_variation_key,
                    DecisionReason::SdkNotReady,
                )
            }
        };
        let experiment = match workspace.experiment(experiment_key) {
            Some(experiment) => experiment,
            None => {
                return ExperimentDecision::default_of(
                    default_variation_key,
                    DecisionReason::ExperimentNotFound,
                )
            }
        };

        let request = EvaluatorRequest::Experiment(ExperimentRequest::of(
            workspace,
            user,
            experiment,
            default_variation_key,
        ));
        match self.evaluate_experiment(&request) {
            Ok(evaluation) => ExperimentDecision {
                variation_key: evaluation.variation_key.clone(),
                reason: evaluation.reason,
                evaluation: Some(evaluation),
            },
            Err(e) => {
                warn!("experiment {} evaluation failed: {}", experiment_key, e);
                ExperimentDecision::default_of(default_variation_key, DecisionReason::Exception)
            }
        }
    }

    /// Decide whether the feature flag `feature_key` is on for `user`.
    pub fn feature_flag(&self, user: &HackleUser, feature_key: i64) -> FeatureFlagDecision {
        let workspace = match self.workspace_fetcher.fetch() {
            Some(workspace) => workspace,
            None => return FeatureFlagDecision::off(DecisionReason::SdkNotReady),
        };
        let feature_flag = match workspace.feature_flag(feature_key) {
            Some(feature_flag) => feature_flag,
            None => return FeatureFlagDecision::off(DecisionReason::FeatureFlagNotFound),
        };

        let request =
            EvaluatorRequest::Experiment(ExperimentRequest::of(workspace, user, feature_flag, "A"));
        match self.evaluate_experiment(&request) {
            Ok(evaluation) => FeatureFlagDecision {
                // the control variation means off; anything else is on
                is_on: evaluation.variation_key != "A",
                reason: evaluation.reason,
                evaluation: Some(evaluation),
            },
            Err(e) => {
                warn!("feature flag {} evaluation failed: {}", feature_key, e);
                FeatureFlagDecision::off(DecisionReason::Exception)
            }
        }
    }

    /// Decide the value of the remote-config parameter `parameter_key`,
    /// coerced to `required_type`. A decided value of any other type serves
    /// the caller's default instead.
    pub fn remote_config(
        &self,
        user: &HackleUser,
        parameter_key: &str,
        required_type: ValueType,
        default_value: HackleValue,
    ) -> RemoteConfigDecision {
        let default_of = |reason| RemoteConfigDecision {
            value: default_value.clone(),
            reason,
        };

        let workspace = match self.workspace_fetcher.fetch() {
            Some(workspace) => workspace,
            None => return default_of(DecisionReason::SdkNotReady),
        };
        let parameter = match workspace.remote_config_parameter(parameter_key) {
            Some(parameter) => parameter,
            None => return default_of(DecisionReason::RemoteConfigParameterNotFound),
        };

        let request = EvaluatorRequest::RemoteConfig(RemoteConfigRequest {
            workspace,
            user,
            parameter,
            default_value: default_value.clone(),
        });
        let mut context = EvaluatorContext::new();
        let evaluation = match self.evaluator.evaluate(&request, &mut context) {
            Ok(EvaluatorEvaluation::RemoteConfig(evaluation)) => evaluation,
            Ok(_) => return default_of(DecisionReason::Exception),
            Err(e) => {
                warn!("remote config {} evaluation failed: {}", parameter_key, e);
                return default_of(DecisionReason::Exception);
            }
        };

        if type_matches(required_type, &evaluation.value) {
            RemoteConfigDecision {
                value: evaluation.value,
                reason: evaluation.reason,
            }
        } else {
            default_of(DecisionReason::TypeMismatch)
        }
    }

    /// Decide whether the in-app message `in_app_message_key` may be shown
    /// to `user`, optionally in response to a tracked event.
    pub fn in_app_message(
        &self,
        user: &HackleUser,
        in_app_message_key: i64,
        event: Option<&Event>,
    ) -> InAppMessageDecision {
        let not_shown = |reason| InAppMessageDecision {
            is_eligible: false,
            reason,
        };

        let workspace = match self.workspace_fetcher.fetch() {
            Some(workspace) => workspace,
            None => return not_shown(DecisionReason::SdkNotReady),
        };
        let in_app_message = match workspace.in_app_message(in_app_message_key) {
            Some(in_app_message) => in_app_message,
            None => return not_shown(DecisionReason::InAppMessageNotFound),
        };

        let request = EvaluatorRequest::InAppMessage(InAppMessageRequest {
            workspace,
            user,
            in_app_message,
            event,
        });
        let mut context = EvaluatorContext::new();
        match self.evaluator.evaluate(&request, &mut context) {
            Ok(EvaluatorEvaluation::InAppMessage(evaluation)) => InAppMessageDecision {
                is_eligible: evaluation.is_eligible,
                reason: evaluation.reason,
            },
            Ok(_) => not_shown(DecisionReason::Exception),
            Err(e) => {
                warn!(
                    "in-app message {} evaluation failed: {}",
                    in_app_message_key, e
                );
                not_shown(DecisionReason::Exception)
            }
        }
    }

    fn evaluate_experiment(
        &self,
        request: &EvaluatorRequest<'_>,
    ) -> Result<ExperimentEvaluation, crate::evaluator::EvaluatorError> {
        let mut context = EvaluatorContext::new();
        match self.evaluator.evaluate(request, &mut context)? {
            EvaluatorEvaluation::Experiment(evaluation) => Ok(evaluation),
            _ => unreachable!("experiment requests evaluate to experiment evaluations"),
        }
    }
}

fn type_matches(required_type: ValueType, value: &HackleValue) -> bool {
    matches!(
        (required_type, value),
        (ValueType::String, HackleValue::String(_))
            | (ValueType::Number, HackleValue::Number(_))
            | (ValueType::Bool, HackleValue::Bool(_))
    )
}
