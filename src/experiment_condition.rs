use crate::evaluator::{
    DecisionReason, Evaluator, EvaluatorContext, EvaluatorError, EvaluatorEvaluation, EvaluatorKey,
    EvaluatorRequest, EvaluatorType, ExperimentEvaluation, ExperimentRequest,
};
use crate::matcher::value_operator_matches;
use crate::target::{Condition, KeyType};
use crate::value::UserValue;
use crate::workspace::{Experiment, Workspace};
use crate::HackleValue;

impl Evaluator {
    /// Match a condition whose key references another experiment's outcome.
    ///
    /// The referenced experiment is evaluated through the same entry point
    /// as a top-level request, with the evaluation memoized in the per-call
    /// context so repeated references within one call tree see one result.
    pub(crate) fn experiment_condition_matches(
        &self,
        request: &EvaluatorRequest<'_>,
        context: &mut EvaluatorContext,
        condition: &Condition,
    ) -> Result<bool, EvaluatorError> {
        let experiment_key: i64 = condition
            .key
            .name
            .parse()
            .map_err(|_| EvaluatorError::InvalidExperimentKey(condition.key.name.clone()))?;

        match condition.key.key_type {
            KeyType::AbTest => {
                let experiment = match request.workspace().experiment(experiment_key) {
                    Some(experiment) => experiment,
                    None => return Ok(false),
                };
                let evaluation = self.referenced_evaluation(request, context, experiment)?;
                Ok(ab_test_matches(&evaluation, condition))
            }
            KeyType::FeatureFlag => {
                let feature_flag = match request.workspace().feature_flag(experiment_key) {
                    Some(feature_flag) => feature_flag,
                    None => return Ok(false),
                };
                let evaluation = self.referenced_evaluation(request, context, feature_flag)?;
                // a flag is on when any variation other than the control is
                // decided
                let on = evaluation.variation_key != "A";
                Ok(value_operator_matches(
                    Some(&UserValue::Single(HackleValue::Bool(on))),
                    &condition.matcher,
                ))
            }
            key_type => Err(EvaluatorError::UnsupportedKeyType { key_type }),
        }
    }

    /// The memoized evaluation of a referenced experiment, evaluating it now
    /// if this call tree has not seen it yet.
    fn referenced_evaluation(
        &self,
        request: &EvaluatorRequest<'_>,
        context: &mut EvaluatorContext,
        experiment: &Experiment,
    ) -> Result<ExperimentEvaluation, EvaluatorError> {
        let key = EvaluatorKey {
            evaluator_type: EvaluatorType::Experiment,
            id: experiment.id,
        };
        if let Some(EvaluatorEvaluation::Experiment(cached)) = context.get(&key) {
            return Ok(cached.clone());
        }

        let sub_request = ExperimentRequest::by(request, experiment);
        let mut evaluation =
            match self.evaluate(&EvaluatorRequest::Experiment(sub_request), context)? {
                EvaluatorEvaluation::Experiment(evaluation) => evaluation,
                _ => unreachable!("experiment requests evaluate to experiment evaluations"),
            };

        // an allocation that happened only because a top-level experiment's
        // targeting asked for it is reported distinctly
        if matches!(request, EvaluatorRequest::Experiment(_))
            && evaluation.reason == DecisionReason::TrafficAllocated
        {
            evaluation = evaluation.with_reason(DecisionReason::TrafficAllocatedByTargeting);
        }

        context.add(EvaluatorEvaluation::Experiment(evaluation.clone()));
        Ok(evaluation)
    }
}

/// An AB-test reference matches only when the referenced evaluation is a
/// concrete assignment; bail-out reasons never match, whatever variation key
/// they carry.
fn ab_test_matches(evaluation: &ExperimentEvaluation, condition: &Condition) -> bool {
    if !evaluation.reason.is_ab_test_assignment() {
        return false;
    }
    value_operator_matches(
        Some(&UserValue::from(evaluation.variation_key.as_str())),
        &condition.matcher,
    )
}
