use serde::Deserialize;

use crate::evaluator::{
    DecisionReason, Evaluator, EvaluatorContext, EvaluatorError, EvaluatorRequest,
    RemoteConfigRequest,
};
use crate::target::{Target, ValueType};
use crate::workspace::Workspace;
use crate::HackleValue;

/// A remote-config parameter: an ordered list of targeted value rules with a
/// fallback default value.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfigParameter {
    pub id: i64,
    pub key: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub identifier_type: String,
    #[serde(default)]
    pub target_rules: Vec<RemoteConfigTargetRule>,
    pub default_value: RemoteConfigValue,
}

/// A rule serves its value to users who match the target and fall inside the
/// rule's rollout bucket.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfigTargetRule {
    pub key: String,
    pub name: String,
    pub target: Target,
    pub bucket_id: i64,
    pub value: RemoteConfigValue,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfigValue {
    pub id: i64,
    pub raw_value: HackleValue,
}

/// The result of evaluating one remote-config parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteConfigEvaluation {
    pub reason: DecisionReason,
    pub target_evaluations: Vec<crate::evaluator::EvaluatorEvaluation>,
    pub parameter_id: i64,
    pub parameter_key: String,
    /// The id of the decided [RemoteConfigValue], absent when the caller's
    /// default was served.
    pub value_id: Option<i64>,
    pub value: HackleValue,
}

impl RemoteConfigEvaluation {
    fn of(
        request: &RemoteConfigRequest<'_>,
        context: &EvaluatorContext,
        value_id: Option<i64>,
        value: HackleValue,
        reason: DecisionReason,
    ) -> Self {
        Self {
            reason,
            target_evaluations: context.evaluations().to_vec(),
            parameter_id: request.parameter.id,
            parameter_key: request.parameter.key.clone(),
            value_id,
            value,
        }
    }
}

impl Evaluator {
    pub(crate) fn evaluate_remote_config(
        &self,
        request: &RemoteConfigRequest<'_>,
        context: &mut EvaluatorContext,
    ) -> Result<RemoteConfigEvaluation, EvaluatorError> {
        let parameter = request.parameter;

        let identifier = match request.user.identifier(&parameter.identifier_type) {
            Some(identifier) => identifier,
            None => {
                return Ok(RemoteConfigEvaluation::of(
                    request,
                    context,
                    None,
                    request.default_value.clone(),
                    DecisionReason::IdentifierNotFound,
                ))
            }
        };

        let eval_request = EvaluatorRequest::RemoteConfig(request.clone());
        for rule in &parameter.target_rules {
            if !self.target_matches(&eval_request, context, &rule.target)? {
                continue;
            }
            let bucket = request
                .workspace
                .bucket(rule.bucket_id)
                .ok_or(EvaluatorError::BucketNotFound(rule.bucket_id))?;
            // the rule applies only to the rolled-out share of matching users
            if self.bucketer.bucketing(bucket, identifier).is_none() {
                continue;
            }
            return Ok(RemoteConfigEvaluation::of(
                request,
                context,
                Some(rule.value.id),
                rule.value.raw_value.clone(),
                DecisionReason::TargetRuleMatch,
            ));
        }

        Ok(RemoteConfigEvaluation::of(
            request,
            context,
            Some(parameter.default_value.id),
            parameter.default_value.raw_value.clone(),
            DecisionReason::DefaultRule,
        ))
    }
}
