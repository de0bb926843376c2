use crate::bucketer::resolve_variation;
use crate::evaluator::{
    DecisionReason, Evaluator, EvaluatorContext, EvaluatorError, EvaluatorRequest,
    ExperimentEvaluation, ExperimentRequest,
};
use crate::workspace::{ExperimentStatus, ExperimentType, Workspace};

/// One step of an evaluation flow. Each step either decides the evaluation
/// or defers to the remaining steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FlowStep {
    Override,
    Identifier,
    Container,
    ExperimentTarget,
    Draft,
    Paused,
    Completed,
    TrafficAllocate,
    TargetRule,
    DefaultRule,
}

/// AB tests honor overrides before anything else, then winnow by identifier,
/// mutual exclusion, audience and status before allocating traffic.
pub(crate) const AB_TEST_FLOW: &[FlowStep] = &[
    FlowStep::Override,
    FlowStep::Identifier,
    FlowStep::Container,
    FlowStep::ExperimentTarget,
    FlowStep::Draft,
    FlowStep::Paused,
    FlowStep::Completed,
    FlowStep::TrafficAllocate,
];

/// Feature flags resolve status first: a draft or paused flag is off even
/// for individually-targeted users.
pub(crate) const FEATURE_FLAG_FLOW: &[FlowStep] = &[
    FlowStep::Draft,
    FlowStep::Paused,
    FlowStep::Completed,
    FlowStep::Override,
    FlowStep::Identifier,
    FlowStep::TargetRule,
    FlowStep::DefaultRule,
];

impl Evaluator {
    pub(crate) fn evaluate_experiment(
        &self,
        request: &ExperimentRequest<'_>,
        context: &mut EvaluatorContext,
    ) -> Result<ExperimentEvaluation, EvaluatorError> {
        let flow = match request.experiment.experiment_type {
            ExperimentType::AbTest => AB_TEST_FLOW,
            ExperimentType::FeatureFlag => FEATURE_FLAG_FLOW,
        };
        self.evaluate_flow(request, context, flow)
    }

    fn evaluate_flow(
        &self,
        request: &ExperimentRequest<'_>,
        context: &mut EvaluatorContext,
        flow: &[FlowStep],
    ) -> Result<ExperimentEvaluation, EvaluatorError> {
        match flow.split_first() {
            None => Ok(ExperimentEvaluation::of_default(
                request,
                context,
                DecisionReason::TrafficNotAllocated,
            )),
            Some((step, rest)) => match step {
                FlowStep::Override => self.override_step(request, context, rest),
                FlowStep::Identifier => self.identifier_step(request, context, rest),
                FlowStep::Container => self.container_step(request, context, rest),
                FlowStep::ExperimentTarget => self.experiment_target_step(request, context, rest),
                FlowStep::Draft => self.draft_step(request, context, rest),
                FlowStep::Paused => self.paused_step(request, context, rest),
                FlowStep::Completed => self.completed_step(request, context, rest),
                FlowStep::TrafficAllocate => self.traffic_allocate_step(request, context),
                FlowStep::TargetRule => self.target_rule_step(request, context, rest),
                FlowStep::DefaultRule => self.default_rule_step(request, context),
            },
        }
    }

    /// Manual overrides take precedence: first a direct identifier override,
    /// then segment-scoped override rules in order.
    fn override_step(
        &self,
        request: &ExperimentRequest<'_>,
        context: &mut EvaluatorContext,
        rest: &[FlowStep],
    ) -> Result<ExperimentEvaluation, EvaluatorError> {
        let experiment = request.experiment;
        let reason = match experiment.experiment_type {
            ExperimentType::AbTest => DecisionReason::Overridden,
            ExperimentType::FeatureFlag => DecisionReason::IndividualTargetMatch,
        };

        if let Some(identifier) = request.user.identifier(&experiment.identifier_type) {
            if let Some(variation_id) = experiment.user_overrides.get(identifier) {
                let variation = experiment
                    .variation_by_id(*variation_id)
                    .ok_or(EvaluatorError::VariationNotFound(*variation_id))?;
                return Ok(ExperimentEvaluation::of(request, context, variation, reason));
            }
        }

        let eval_request = EvaluatorRequest::Experiment(*request);
        for rule in &experiment.segment_overrides {
            if !self.target_matches(&eval_request, context, &rule.target)? {
                continue;
            }
            let variation = resolve_variation(
                request.workspace,
                experiment,
                request.user,
                &rule.action,
                self.bucketer.as_ref(),
            )?;
            return match variation {
                Some(variation) => {
                    Ok(ExperimentEvaluation::of(request, context, variation, reason))
                }
                None => self.evaluate_flow(request, context, rest),
            };
        }

        self.evaluate_flow(request, context, rest)
    }

    fn identifier_step(
        &self,
        request: &ExperimentRequest<'_>,
        context: &mut EvaluatorContext,
        rest: &[FlowStep],
    ) -> Result<ExperimentEvaluation, EvaluatorError> {
        match request.user.identifier(&request.experiment.identifier_type) {
            Some(_) => self.evaluate_flow(request, context, rest),
            None => Ok(ExperimentEvaluation::of_default(
                request,
                context,
                DecisionReason::IdentifierNotFound,
            )),
        }
    }

    /// Mutual exclusion: the container's bucket assigns the user to one
    /// group; the experiment proceeds only if it belongs to that group.
    fn container_step(
        &self,
        request: &ExperimentRequest<'_>,
        context: &mut EvaluatorContext,
        rest: &[FlowStep],
    ) -> Result<ExperimentEvaluation, EvaluatorError> {
        let experiment = request.experiment;
        let container_id = match experiment.container_id {
            Some(container_id) => container_id,
            None => return self.evaluate_flow(request, context, rest),
        };
        let container = request
            .workspace
            .container(container_id)
            .ok_or(EvaluatorError::ContainerNotFound(container_id))?;
        let bucket = request
            .workspace
            .bucket(container.bucket_id)
            .ok_or(EvaluatorError::BucketNotFound(container.bucket_id))?;

        let identifier = match request.user.identifier(&experiment.identifier_type) {
            Some(identifier) => identifier,
            None => {
                return Ok(ExperimentEvaluation::of_default(
                    request,
                    context,
                    DecisionReason::NotInMutualExclusionExperiment,
                ))
            }
        };
        let slot = match self.bucketer.bucketing(bucket, identifier) {
            Some(slot) => slot,
            None => {
                return Ok(ExperimentEvaluation::of_default(
                    request,
                    context,
                    DecisionReason::NotInMutualExclusionExperiment,
                ))
            }
        };

        // container slots carry the group id in the variation-id field
        let group = container.group(slot.variation_id).ok_or(
            EvaluatorError::ContainerGroupNotFound {
                container_id,
                group_id: slot.variation_id,
            },
        )?;
        if group.experiments.contains(&experiment.id) {
            self.evaluate_flow(request, context, rest)
        } else {
            Ok(ExperimentEvaluation::of_default(
                request,
                context,
                DecisionReason::NotInMutualExclusionExperiment,
            ))
        }
    }

    fn experiment_target_step(
        &self,
        request: &ExperimentRequest<'_>,
        context: &mut EvaluatorContext,
        rest: &[FlowStep],
    ) -> Result<ExperimentEvaluation, EvaluatorError> {
        let experiment = request.experiment;
        if experiment.experiment_type != ExperimentType::AbTest {
            return Err(EvaluatorError::WrongExperimentType {
                experiment_id: experiment.id,
                expected: ExperimentType::AbTest,
            });
        }
        let eval_request = EvaluatorRequest::Experiment(*request);
        if self.any_target_matches(&eval_request, context, &experiment.target_audiences)? {
            self.evaluate_flow(request, context, rest)
        } else {
            Ok(ExperimentEvaluation::of_default(
                request,
                context,
                DecisionReason::NotInExperimentTarget,
            ))
        }
    }

    fn draft_step(
        &self,
        request: &ExperimentRequest<'_>,
        context: &mut EvaluatorContext,
        rest: &[FlowStep],
    ) -> Result<ExperimentEvaluation, EvaluatorError> {
        if request.experiment.status == ExperimentStatus::Draft {
            Ok(ExperimentEvaluation::of_default(
                request,
                context,
                DecisionReason::ExperimentDraft,
            ))
        } else {
            self.evaluate_flow(request, context, rest)
        }
    }

    fn paused_step(
        &self,
        request: &ExperimentRequest<'_>,
        context: &mut EvaluatorContext,
        rest: &[FlowStep],
    ) -> Result<ExperimentEvaluation, EvaluatorError> {
        if request.experiment.status != ExperimentStatus::Paused {
            return self.evaluate_flow(request, context, rest);
        }
        let reason = match request.experiment.experiment_type {
            ExperimentType::AbTest => DecisionReason::ExperimentPaused,
            ExperimentType::FeatureFlag => DecisionReason::FeatureFlagInactive,
        };
        Ok(ExperimentEvaluation::of_default(request, context, reason))
    }

    fn completed_step(
        &self,
        request: &ExperimentRequest<'_>,
        context: &mut EvaluatorContext,
        rest: &[FlowStep],
    ) -> Result<ExperimentEvaluation, EvaluatorError> {
        let experiment = request.experiment;
        if experiment.status != ExperimentStatus::Completed {
            return self.evaluate_flow(request, context, rest);
        }
        let winner = experiment
            .winner_variation()
            .ok_or(EvaluatorError::WinnerVariationNotFound(experiment.id))?;
        Ok(ExperimentEvaluation::of(
            request,
            context,
            winner,
            DecisionReason::ExperimentCompleted,
        ))
    }

    /// Terminal step of the AB-test flow.
    fn traffic_allocate_step(
        &self,
        request: &ExperimentRequest<'_>,
        context: &mut EvaluatorContext,
    ) -> Result<ExperimentEvaluation, EvaluatorError> {
        let experiment = request.experiment;
        if experiment.experiment_type != ExperimentType::AbTest {
            return Err(EvaluatorError::WrongExperimentType {
                experiment_id: experiment.id,
                expected: ExperimentType::AbTest,
            });
        }
        if experiment.status != ExperimentStatus::Running {
            return Err(EvaluatorError::ExperimentNotRunning(experiment.id));
        }

        let variation = resolve_variation(
            request.workspace,
            experiment,
            request.user,
            &experiment.default_rule,
            self.bucketer.as_ref(),
        )?;
        let variation = match variation {
            Some(variation) => variation,
            None => {
                return Ok(ExperimentEvaluation::of_default(
                    request,
                    context,
                    DecisionReason::TrafficNotAllocated,
                ))
            }
        };
        if variation.is_dropped {
            return Ok(ExperimentEvaluation::of_default(
                request,
                context,
                DecisionReason::VariationDropped,
            ));
        }
        Ok(ExperimentEvaluation::of(
            request,
            context,
            variation,
            DecisionReason::TrafficAllocated,
        ))
    }

    fn target_rule_step(
        &self,
        request: &ExperimentRequest<'_>,
        context: &mut EvaluatorContext,
        rest: &[FlowStep],
    ) -> Result<ExperimentEvaluation, EvaluatorError> {
        let experiment = request.experiment;
        if experiment.experiment_type != ExperimentType::FeatureFlag {
            return Err(EvaluatorError::WrongExperimentType {
                experiment_id: experiment.id,
                expected: ExperimentType::FeatureFlag,
            });
        }
        if experiment.status != ExperimentStatus::Running {
            return Err(EvaluatorError::ExperimentNotRunning(experiment.id));
        }
        if request.user.identifier(&experiment.identifier_type).is_none() {
            return self.evaluate_flow(request, context, rest);
        }

        let eval_request = EvaluatorRequest::Experiment(*request);
        for rule in &experiment.target_rules {
            if !self.target_matches(&eval_request, context, &rule.target)? {
                continue;
            }
            let variation = resolve_variation(
                request.workspace,
                experiment,
                request.user,
                &rule.action,
                self.bucketer.as_ref(),
            )?
            .ok_or(EvaluatorError::VariationNotDecided(experiment.id))?;
            return Ok(ExperimentEvaluation::of(
                request,
                context,
                variation,
                DecisionReason::TargetRuleMatch,
            ));
        }
        self.evaluate_flow(request, context, rest)
    }

    /// Terminal step of the feature-flag flow. A flag must always decide a
    /// variation; an undecidable default rule is a workspace data bug.
    fn default_rule_step(
        &self,
        request: &ExperimentRequest<'_>,
        context: &mut EvaluatorContext,
    ) -> Result<ExperimentEvaluation, EvaluatorError> {
        let experiment = request.experiment;
        if experiment.experiment_type != ExperimentType::FeatureFlag {
            return Err(EvaluatorError::WrongExperimentType {
                experiment_id: experiment.id,
                expected: ExperimentType::FeatureFlag,
            });
        }
        if experiment.status != ExperimentStatus::Running {
            return Err(EvaluatorError::ExperimentNotRunning(experiment.id));
        }
        if request.user.identifier(&experiment.identifier_type).is_none() {
            return Ok(ExperimentEvaluation::of_default(
                request,
                context,
                DecisionReason::DefaultRule,
            ));
        }

        let variation = resolve_variation(
            request.workspace,
            experiment,
            request.user,
            &experiment.default_rule,
            self.bucketer.as_ref(),
        )?
        .ok_or(EvaluatorError::VariationNotDecided(experiment.id))?;
        Ok(ExperimentEvaluation::of(
            request,
            context,
            variation,
            DecisionReason::DefaultRule,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::EvaluatorEvaluation;
    use crate::test_common::{TestWorkspace, EMPTY_BUCKET_JSON, FULL_BUCKET_JSON};
    use crate::user::HackleUser;

    fn evaluate(
        workspace: &TestWorkspace,
        user: &HackleUser,
        experiment_key: i64,
    ) -> Result<ExperimentEvaluation, EvaluatorError> {
        let experiment = workspace
            .experiment(experiment_key)
            .or_else(|| workspace.feature_flag(experiment_key))
            .expect("experiment should be configured");
        let request =
            EvaluatorRequest::Experiment(ExperimentRequest::of(workspace, user, experiment, "A"));
        let mut context = EvaluatorContext::new();
        match Evaluator::default().evaluate(&request, &mut context)? {
            EvaluatorEvaluation::Experiment(evaluation) => Ok(evaluation),
            _ => panic!("expected an experiment evaluation"),
        }
    }

    fn ab_test(status: &str, extra: &str) -> String {
        format!(
            r#"{{
                "id": 5,
                "key": 42,
                "type": "AB_TEST",
                "identifierType": "$id",
                "status": "{status}",
                "variations": [{{"id": 1001, "key": "A"}}, {{"id": 1002, "key": "B"}}],
                "defaultRule": {{"type": "bucket", "bucketId": 500}}{extra}
            }}"#
        )
    }

    fn feature_flag(status: &str, extra: &str) -> String {
        format!(
            r#"{{
                "id": 8,
                "key": 70,
                "type": "FEATURE_FLAG",
                "identifierType": "$id",
                "status": "{status}",
                "variations": [{{"id": 4001, "key": "A"}}, {{"id": 4002, "key": "B"}}],
                "defaultRule": {{"type": "variation", "variationId": 4001}}{extra}
            }}"#
        )
    }

    #[test]
    fn flow_step_order() {
        assert_eq!(
            AB_TEST_FLOW,
            &[
                FlowStep::Override,
                FlowStep::Identifier,
                FlowStep::Container,
                FlowStep::ExperimentTarget,
                FlowStep::Draft,
                FlowStep::Paused,
                FlowStep::Completed,
                FlowStep::TrafficAllocate,
            ]
        );
        assert_eq!(
            FEATURE_FLAG_FLOW,
            &[
                FlowStep::Draft,
                FlowStep::Paused,
                FlowStep::Completed,
                FlowStep::Override,
                FlowStep::Identifier,
                FlowStep::TargetRule,
                FlowStep::DefaultRule,
            ]
        );
    }

    #[test]
    fn running_ab_test_allocates_traffic() {
        let workspace = TestWorkspace::new()
            .with_bucket(FULL_BUCKET_JSON)
            .with_experiment(&ab_test("RUNNING", ""));
        let user = HackleUser::with_id("user-1").build();

        let evaluation = evaluate(&workspace, &user, 42).unwrap();
        assert_eq!(evaluation.reason, DecisionReason::TrafficAllocated);
        assert_eq!(evaluation.variation_key, "B");
        assert_eq!(evaluation.variation_id, Some(1002));
    }

    #[test]
    fn unallocated_user_gets_default_variation() {
        let workspace = TestWorkspace::new()
            .with_bucket(EMPTY_BUCKET_JSON)
            .with_experiment(&ab_test("RUNNING", ""));
        let user = HackleUser::with_id("user-1").build();

        let evaluation = evaluate(&workspace, &user, 42).unwrap();
        assert_eq!(evaluation.reason, DecisionReason::TrafficNotAllocated);
        assert_eq!(evaluation.variation_key, "A");
    }

    #[test]
    fn user_override_takes_precedence() {
        let workspace = TestWorkspace::new()
            .with_bucket(FULL_BUCKET_JSON)
            .with_experiment(&ab_test("RUNNING", r#", "userOverrides": {"user-1": 1001}"#));

        let overridden = evaluate(&workspace, &HackleUser::with_id("user-1").build(), 42).unwrap();
        assert_eq!(overridden.reason, DecisionReason::Overridden);
        assert_eq!(overridden.variation_key, "A");

        let other = evaluate(&workspace, &HackleUser::with_id("user-2").build(), 42).unwrap();
        assert_eq!(other.reason, DecisionReason::TrafficAllocated);
    }

    #[test]
    fn ab_test_override_applies_even_when_paused() {
        let workspace = TestWorkspace::new()
            .with_experiment(&ab_test("PAUSED", r#", "userOverrides": {"user-1": 1002}"#));

        let overridden = evaluate(&workspace, &HackleUser::with_id("user-1").build(), 42).unwrap();
        assert_eq!(overridden.reason, DecisionReason::Overridden);
        assert_eq!(overridden.variation_key, "B");

        let other = evaluate(&workspace, &HackleUser::with_id("user-2").build(), 42).unwrap();
        assert_eq!(other.reason, DecisionReason::ExperimentPaused);
        assert_eq!(other.variation_key, "A");
    }

    #[test]
    fn segment_override_rule() {
        let workspace = TestWorkspace::new()
            .with_bucket(FULL_BUCKET_JSON)
            .with_experiment(&ab_test(
                "RUNNING",
                r#", "segmentOverrides": [
                    {
                        "target": {
                            "conditions": [
                                {
                                    "key": {"type": "userProperty", "name": "internal"},
                                    "match": {
                                        "type": "match",
                                        "operator": "in",
                                        "valueType": "bool",
                                        "values": [true]
                                    }
                                }
                            ]
                        },
                        "action": {"type": "variation", "variationId": 1001}
                    }
                ]"#,
            ));

        let internal = HackleUser::with_id("user-1").property("internal", true).build();
        let evaluation = evaluate(&workspace, &internal, 42).unwrap();
        assert_eq!(evaluation.reason, DecisionReason::Overridden);
        assert_eq!(evaluation.variation_key, "A");

        let external = HackleUser::with_id("user-1").build();
        let evaluation = evaluate(&workspace, &external, 42).unwrap();
        assert_eq!(evaluation.reason, DecisionReason::TrafficAllocated);
    }

    #[test]
    fn draft_experiment() {
        let workspace = TestWorkspace::new().with_experiment(&ab_test("DRAFT", ""));
        let user = HackleUser::with_id("user-1").build();

        let evaluation = evaluate(&workspace, &user, 42).unwrap();
        assert_eq!(evaluation.reason, DecisionReason::ExperimentDraft);
        assert_eq!(evaluation.variation_key, "A");
    }

    #[test]
    fn completed_experiment_returns_winner() {
        let workspace = TestWorkspace::new()
            .with_experiment(&ab_test("COMPLETED", r#", "winnerVariationId": 1002"#));
        let user = HackleUser::with_id("user-1").build();

        let evaluation = evaluate(&workspace, &user, 42).unwrap();
        assert_eq!(evaluation.reason, DecisionReason::ExperimentCompleted);
        assert_eq!(evaluation.variation_key, "B");
    }

    #[test]
    fn completed_experiment_without_winner_fails() {
        let workspace = TestWorkspace::new().with_experiment(&ab_test("COMPLETED", ""));
        let user = HackleUser::with_id("user-1").build();

        assert_eq!(
            evaluate(&workspace, &user, 42),
            Err(EvaluatorError::WinnerVariationNotFound(5))
        );
    }

    #[test]
    fn missing_identifier() {
        let workspace = TestWorkspace::new()
            .with_bucket(FULL_BUCKET_JSON)
            .with_experiment(&ab_test("RUNNING", "").replace("$id", "$deviceId"));
        let user = HackleUser::with_id("user-1").build();

        let evaluation = evaluate(&workspace, &user, 42).unwrap();
        assert_eq!(evaluation.reason, DecisionReason::IdentifierNotFound);
        assert_eq!(evaluation.variation_key, "A");
    }

    #[test]
    fn audience_restriction() {
        let workspace = TestWorkspace::new()
            .with_bucket(FULL_BUCKET_JSON)
            .with_experiment(&ab_test(
                "RUNNING",
                r#", "targetAudiences": [
                    {
                        "conditions": [
                            {
                                "key": {"type": "userProperty", "name": "age"},
                                "match": {
                                    "type": "match",
                                    "operator": "gte",
                                    "valueType": "number",
                                    "values": [18]
                                }
                            }
                        ]
                    }
                ]"#,
            ));

        let adult = HackleUser::with_id("user-1").property("age", 25_i64).build();
        let evaluation = evaluate(&workspace, &adult, 42).unwrap();
        assert_eq!(evaluation.reason, DecisionReason::TrafficAllocated);

        let minor = HackleUser::with_id("user-1").property("age", 15_i64).build();
        let evaluation = evaluate(&workspace, &minor, 42).unwrap();
        assert_eq!(evaluation.reason, DecisionReason::NotInExperimentTarget);
        assert_eq!(evaluation.variation_key, "A");
    }

    #[test]
    fn dropped_variation() {
        let workspace = TestWorkspace::new()
            .with_bucket(FULL_BUCKET_JSON)
            .with_experiment(&ab_test("RUNNING", "").replace(
                r#"{"id": 1002, "key": "B"}"#,
                r#"{"id": 1002, "key": "B", "isDropped": true}"#,
            ));
        let user = HackleUser::with_id("user-1").build();

        let evaluation = evaluate(&workspace, &user, 42).unwrap();
        assert_eq!(evaluation.reason, DecisionReason::VariationDropped);
        assert_eq!(evaluation.variation_key, "A");
    }

    #[test]
    fn mutual_exclusion_container() {
        // the container bucket assigns everyone to group 1
        let workspace = TestWorkspace::new()
            .with_bucket(FULL_BUCKET_JSON)
            .with_bucket(
                r#"{"id": 600, "seed": 875758774, "slotSize": 10000,
                    "slots": [{"startInclusive": 0, "endExclusive": 10000, "variationId": 1}]}"#,
            )
            .with_container(
                r#"{"id": 9, "bucketId": 600,
                    "groups": [{"id": 1, "experiments": [5]}, {"id": 2, "experiments": [6]}]}"#,
            )
            .with_experiment(&ab_test("RUNNING", r#", "containerId": 9"#))
            .with_experiment(
                &ab_test("RUNNING", r#", "containerId": 9"#)
                    .replace(r#""id": 5"#, r#""id": 6"#)
                    .replace(r#""key": 42"#, r#""key": 43"#),
            );
        let user = HackleUser::with_id("user-1").build();

        let member = evaluate(&workspace, &user, 42).unwrap();
        assert_eq!(member.reason, DecisionReason::TrafficAllocated);

        let excluded = evaluate(&workspace, &user, 43).unwrap();
        assert_eq!(
            excluded.reason,
            DecisionReason::NotInMutualExclusionExperiment
        );
        assert_eq!(excluded.variation_key, "A");
    }

    #[test]
    fn missing_container_fails() {
        let workspace = TestWorkspace::new()
            .with_bucket(FULL_BUCKET_JSON)
            .with_experiment(&ab_test("RUNNING", r#", "containerId": 9"#));
        let user = HackleUser::with_id("user-1").build();

        assert_eq!(
            evaluate(&workspace, &user, 42),
            Err(EvaluatorError::ContainerNotFound(9))
        );
    }

    #[test]
    fn feature_flag_default_rule() {
        let workspace = TestWorkspace::new().with_feature_flag(&feature_flag("RUNNING", ""));
        let user = HackleUser::with_id("user-1").build();

        let evaluation = evaluate(&workspace, &user, 70).unwrap();
        assert_eq!(evaluation.reason, DecisionReason::DefaultRule);
        assert_eq!(evaluation.variation_key, "A");
    }

    #[test]
    fn feature_flag_target_rule() {
        let workspace = TestWorkspace::new().with_feature_flag(&feature_flag(
            "RUNNING",
            r#", "targetRules": [
                {
                    "target": {
                        "conditions": [
                            {
                                "key": {"type": "userProperty", "name": "grade"},
                                "match": {
                                    "type": "match",
                                    "operator": "in",
                                    "valueType": "string",
                                    "values": ["gold"]
                                }
                            }
                        ]
                    },
                    "action": {"type": "variation", "variationId": 4002}
                }
            ]"#,
        ));

        let gold = HackleUser::with_id("user-1").property("grade", "gold").build();
        let evaluation = evaluate(&workspace, &gold, 70).unwrap();
        assert_eq!(evaluation.reason, DecisionReason::TargetRuleMatch);
        assert_eq!(evaluation.variation_key, "B");

        let silver = HackleUser::with_id("user-1").property("grade", "silver").build();
        let evaluation = evaluate(&workspace, &silver, 70).unwrap();
        assert_eq!(evaluation.reason, DecisionReason::DefaultRule);
        assert_eq!(evaluation.variation_key, "A");
    }

    #[test]
    fn feature_flag_individual_target() {
        let workspace = TestWorkspace::new()
            .with_feature_flag(&feature_flag("RUNNING", r#", "userOverrides": {"user-1": 4002}"#));

        let targeted = evaluate(&workspace, &HackleUser::with_id("user-1").build(), 70).unwrap();
        assert_eq!(targeted.reason, DecisionReason::IndividualTargetMatch);
        assert_eq!(targeted.variation_key, "B");
    }

    #[test]
    fn paused_feature_flag_is_inactive_even_for_targeted_users() {
        let workspace = TestWorkspace::new()
            .with_feature_flag(&feature_flag("PAUSED", r#", "userOverrides": {"user-1": 4002}"#));
        let user = HackleUser::with_id("user-1").build();

        let evaluation = evaluate(&workspace, &user, 70).unwrap();
        assert_eq!(evaluation.reason, DecisionReason::FeatureFlagInactive);
        assert_eq!(evaluation.variation_key, "A");
    }

    #[test]
    fn feature_flag_without_identifier_uses_default() {
        let workspace = TestWorkspace::new()
            .with_feature_flag(&feature_flag("RUNNING", "").replace("$id", "$deviceId"));
        let user = HackleUser::with_id("user-1").build();

        let evaluation = evaluate(&workspace, &user, 70).unwrap();
        assert_eq!(evaluation.reason, DecisionReason::DefaultRule);
        assert_eq!(evaluation.variation_key, "A");
    }

    #[test]
    fn circular_experiment_references_fail() {
        // 42 and 43 reference each other's outcomes
        let reference = |other: i64| {
            format!(
                r#", "targetAudiences": [
                    {{
                        "conditions": [
                            {{
                                "key": {{"type": "abTest", "name": "{other}"}},
                                "match": {{
                                    "type": "match",
                                    "operator": "in",
                                    "valueType": "string",
                                    "values": ["B"]
                                }}
                            }}
                        ]
                    }}
                ]"#
            )
        };
        let workspace = TestWorkspace::new()
            .with_bucket(FULL_BUCKET_JSON)
            .with_experiment(&ab_test("RUNNING", &reference(43)))
            .with_experiment(
                &ab_test("RUNNING", &reference(42))
                    .replace(r#""id": 5"#, r#""id": 6"#)
                    .replace(r#""key": 42"#, r#""key": 43"#),
            );
        let user = HackleUser::with_id("user-1").build();

        match evaluate(&workspace, &user, 42) {
            Err(EvaluatorError::CircularEvaluation { chain }) => {
                assert_eq!(chain, "Experiment(5) -> Experiment(6) -> Experiment(5)");
            }
            other => panic!("expected circular evaluation error, got {:?}", other),
        }
    }
}
